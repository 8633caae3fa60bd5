use camino::Utf8PathBuf;
use tracing::{error, info, warn};

use crate::domain::{ReadId, Run};
use crate::error::IngestError;
use crate::fs_util;
use crate::store::{RecordStore, StorageLayout};

/// How much of a run a failed ingestion takes down with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackScope {
    /// The run was created by the failed call: records and storage subtree go.
    WholeRun,
    /// Files were being added to an existing run: only this batch's reads,
    /// the files it stored and their quality reports are removed.
    Batch {
        reads: Vec<ReadId>,
        files: Vec<Utf8PathBuf>,
        reports: Vec<Utf8PathBuf>,
    },
}

/// Leftovers of a failed batch that live outside the run directory.
#[derive(Debug, Clone, Default)]
pub struct Leftovers {
    pub temp_files: Vec<Utf8PathBuf>,
}

/// Discards persisted state for a failed ingestion.
///
/// Every step is attempted even when an earlier one fails. Failures are
/// logged; the first one is returned so callers can report it next to the
/// error that triggered the rollback.
pub fn rollback<S: RecordStore + ?Sized>(
    records: &S,
    layout: &StorageLayout,
    run: &Run,
    scope: RollbackScope,
    leftovers: &Leftovers,
) -> Option<IngestError> {
    let mut first_failure = None;
    let mut note = |result: Result<(), IngestError>, what: &str| {
        if let Err(err) = result {
            error!(run = %run.safe_name, step = what, error = %err, "rollback step failed");
            if first_failure.is_none() {
                first_failure = Some(err);
            }
        }
    };

    match scope {
        RollbackScope::WholeRun => {
            match records.reads_for_run(run.id) {
                Ok(reads) => {
                    for read in reads {
                        note(records.delete_read(read.id), "delete read");
                    }
                }
                Err(err) => note(Err(err), "list reads"),
            }
            match records.additional_for_run(run.id) {
                Ok(files) => {
                    for file in files {
                        note(records.delete_additional(file.id), "delete attachment");
                    }
                }
                Err(err) => note(Err(err), "list attachments"),
            }
            note(records.delete_run(run.id), "delete run");

            let run_dir = layout.run_dir(run);
            note(fs_util::remove_tree(&run_dir), "remove run folder");
            info!(run = %run.safe_name, path = %run_dir, "deleted run");
        }
        RollbackScope::Batch {
            reads,
            files,
            reports,
        } => {
            for read in reads {
                note(records.delete_read(read), "delete read");
            }
            for file in &files {
                note(fs_util::remove_file_if_exists(file), "remove stored file");
            }
            for report in &reports {
                note(fs_util::remove_file_if_exists(report), "remove quality report");
            }
            warn!(run = %run.safe_name, "discarded failed batch, earlier reads kept");
        }
    }

    for temp in &leftovers.temp_files {
        note(fs_util::remove_file_if_exists(temp), "remove temporary file");
    }

    first_failure
}
