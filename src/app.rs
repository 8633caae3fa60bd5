use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::compression;
use crate::domain::{
    AdditionalFile, AdditionalFileId, AttachmentOwner, LibraryMetadata, Read, ReadId, ReadKind,
    Run, RunId, SafeName, SampleLocation,
};
use crate::error::{IngestError, IngestFailure};
use crate::fs_util;
use crate::grouping::{self, ReadGroups};
use crate::naming::NameRegistry;
use crate::pairing::PairLinker;
use crate::qc::QcRunner;
use crate::rollback::{self, Leftovers, RollbackScope};
use crate::store::{RecordStore, StorageLayout};
use crate::upload::{self, AdditionalUpload, UploadRequest, VerifiedRead};

/// Details of a run to be created, as entered on the new-run form.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub name: String,
    pub sample: SampleLocation,
    pub library: LibraryMetadata,
    pub submission_to_galaxy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestPhase {
    Collecting,
    Verifying,
    Processing(usize),
    Done,
    Failed,
}

impl IngestPhase {
    fn label(self) -> String {
        match self {
            IngestPhase::Collecting => "Collecting".to_string(),
            IngestPhase::Verifying => "Verifying".to_string(),
            IngestPhase::Processing(index) => format!("Processing({index})"),
            IngestPhase::Done => "Done".to_string(),
            IngestPhase::Failed => "Failed".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub run: Run,
    pub url: String,
    pub reads: Vec<Read>,
    pub additional: Vec<AdditionalFile>,
    pub additional_failures: Vec<String>,
    pub unpaired_mates: Vec<ReadId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunView {
    pub run: Run,
    pub url: String,
    pub groups: ReadGroups,
    pub additional: Vec<AdditionalFile>,
}

/// Accumulator threaded through the per-file steps of one batch.
#[derive(Debug, Default)]
struct BatchState {
    names: NameRegistry,
    linker: PairLinker,
    reads: Vec<Read>,
    stored_files: Vec<Utf8PathBuf>,
    reports: Vec<Utf8PathBuf>,
    temp_files: Vec<Utf8PathBuf>,
}

impl BatchState {
    fn read_ids(&self) -> Vec<ReadId> {
        self.reads.iter().map(|read| read.id).collect()
    }

    fn leftovers(&self) -> Leftovers {
        Leftovers {
            temp_files: self.temp_files.clone(),
        }
    }
}

pub struct App<S: RecordStore, Q: QcRunner> {
    layout: StorageLayout,
    records: S,
    qc: Q,
    raw_extensions: Vec<String>,
}

impl<S: RecordStore, Q: QcRunner> App<S, Q> {
    pub fn new(layout: StorageLayout, records: S, qc: Q, raw_extensions: Vec<String>) -> Self {
        Self {
            layout,
            records,
            qc,
            raw_extensions,
        }
    }

    pub fn records(&self) -> &S {
        &self.records
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    pub fn qc(&self) -> &Q {
        &self.qc
    }

    /// Creates a run from an upload of raw reads.
    ///
    /// The run record only exists once every digest has checked out. Any
    /// later failure removes the run, its reads and its storage folder.
    pub fn create_run(
        &self,
        new_run: NewRun,
        request: &UploadRequest,
        sink: &dyn ProgressSink,
    ) -> Result<IngestResult, IngestFailure> {
        let started = Instant::now();
        let (verified, additional) = self.collect_and_verify(request, sink)?;

        let safe_name = self.unique_safe_name(&new_run.sample, &new_run.name)?;
        let run = Run {
            id: RunId::new(),
            name: new_run.name,
            safe_name,
            sample: new_run.sample,
            library: new_run.library,
            submission_to_galaxy: new_run.submission_to_galaxy,
            created_at: iso_timestamp(),
        };
        self.records.insert_run(&run)?;
        info!(run = %run.safe_name, files = verified.len(), "created run");

        let mut state = BatchState::default();
        if let Err(err) = self.process_batch(&run, ReadKind::Raw, verified, &mut state, sink) {
            return Err(self.fail(&run, RollbackScope::WholeRun, &state, err, sink));
        }

        Ok(self.finish(run, state, &additional, started, sink))
    }

    /// Adds post-processing reads to an existing run.
    ///
    /// A failure discards only the reads and files of this call; the run and
    /// its earlier reads stay as they were.
    pub fn add_processed(
        &self,
        location: &SampleLocation,
        run_name: &SafeName,
        request: &UploadRequest,
        sink: &dyn ProgressSink,
    ) -> Result<IngestResult, IngestFailure> {
        let started = Instant::now();
        let run = self.find_run(location, run_name)?;
        let (verified, additional) = self.collect_and_verify(request, sink)?;

        let mut state = BatchState::default();
        if let Err(err) =
            self.process_batch(&run, ReadKind::Processed, verified, &mut state, sink)
        {
            let scope = RollbackScope::Batch {
                reads: state.read_ids(),
                files: state.stored_files.clone(),
                reports: state.reports.clone(),
            };
            return Err(self.fail(&run, scope, &state, err, sink));
        }

        Ok(self.finish(run, state, &additional, started, sink))
    }

    /// The run with its reads grouped for display.
    pub fn show(
        &self,
        location: &SampleLocation,
        run_name: &SafeName,
    ) -> Result<RunView, IngestError> {
        let run = self.find_run(location, run_name)?;
        let reads = self.records.reads_for_run(run.id)?;
        let additional = self.records.additional_for_run(run.id)?;
        Ok(RunView {
            url: StorageLayout::run_url(&run),
            groups: grouping::reconstruct(&reads),
            run,
            additional,
        })
    }

    pub fn find_run(
        &self,
        location: &SampleLocation,
        run_name: &SafeName,
    ) -> Result<Run, IngestError> {
        self.records.find_run(location, run_name)?.ok_or_else(|| {
            IngestError::RunNotFound(format!(
                "/{}/{}/{}/{run_name}",
                location.group, location.project, location.sample
            ))
        })
    }

    fn collect_and_verify(
        &self,
        request: &UploadRequest,
        sink: &dyn ProgressSink,
    ) -> Result<(Vec<VerifiedRead>, Vec<AdditionalUpload>), IngestError> {
        let rejected = |err: IngestError| {
            warn!(error = %err, "upload rejected");
            phase(sink, IngestPhase::Failed, &err.to_string());
            err
        };

        phase(sink, IngestPhase::Collecting, "partitioning upload fields");
        let collected = upload::collect(request).map_err(rejected)?;

        phase(
            sink,
            IngestPhase::Verifying,
            &format!("checking {} md5 sums", collected.reads.len()),
        );
        let verified = upload::verify_all(collected.reads).map_err(rejected)?;
        Ok((verified, collected.additional))
    }

    fn unique_safe_name(
        &self,
        sample: &SampleLocation,
        name: &str,
    ) -> Result<SafeName, IngestError> {
        let base = SafeName::derive(name)?;
        let taken = self
            .records
            .runs_for_sample(sample)?
            .into_iter()
            .map(|run| run.safe_name)
            .collect::<Vec<_>>();
        if !taken.contains(&base) {
            return Ok(base);
        }
        let mut counter = 1;
        loop {
            let candidate = base.with_suffix(counter);
            if !taken.contains(&candidate) {
                return Ok(candidate);
            }
            counter += 1;
        }
    }

    fn process_batch(
        &self,
        run: &Run,
        kind: ReadKind,
        verified: Vec<VerifiedRead>,
        state: &mut BatchState,
        sink: &dyn ProgressSink,
    ) -> Result<(), IngestError> {
        let reads_dir = self.layout.reads_dir(run, kind);
        fs_util::ensure_dir(&reads_dir)?;

        for (index, read) in verified.into_iter().enumerate() {
            phase(
                sink,
                IngestPhase::Processing(index + 1),
                &format!("storing {}", read.upload.original_name),
            );
            self.process_one(run, kind, read, state)?;
        }
        Ok(())
    }

    fn process_one(
        &self,
        run: &Run,
        kind: ReadKind,
        verified: VerifiedRead,
        state: &mut BatchState,
    ) -> Result<(), IngestError> {
        let VerifiedRead { upload, md5 } = verified;
        let file_name = state.names.claim(&upload.original_name);

        let normalized = compression::ensure_compressed(
            &upload.staged_path,
            &file_name,
            &md5,
            &self.raw_extensions,
        )?;
        if normalized.compressed_here {
            state.temp_files.push(normalized.path.clone());
            if let Err(err) = fs_util::remove_file_if_exists(&upload.staged_path) {
                warn!(file = %upload.original_name, error = %err, "staged upload left behind");
            }
        }

        let reads_dir = self.layout.reads_dir(run, kind);
        let stored =
            fs_util::safe_move(&normalized.path, &reads_dir.join(&normalized.file_name))?;
        state.stored_files.push(stored.clone());

        let report_dir = self.layout.report_dir(run, kind);
        fs_util::ensure_dir(&report_dir)?;

        let read = Read {
            id: ReadId::new(),
            name: normalized.file_name,
            run_id: run.id,
            md5: normalized.md5,
            fastqc_location: report_dir.clone(),
            path: stored.clone(),
            processed: kind.is_processed(),
            sibling: None,
            created_at: iso_timestamp(),
        };
        self.records.insert_read(&read)?;
        state.reads.push(read.clone());

        if let Some(sibling) = state.linker.observe(upload.key, read.id) {
            self.records.set_sibling(read.id, sibling)?;
            self.records.set_sibling(sibling, read.id)?;
            for existing in state.reads.iter_mut() {
                if existing.id == sibling {
                    existing.sibling = Some(read.id);
                } else if existing.id == read.id {
                    existing.sibling = Some(sibling);
                }
            }
            debug!(read = %read.name, %sibling, "linked mates");
        }

        state
            .reports
            .extend(self.qc.report_files(&stored, &report_dir));
        if let Err(err) = self.qc.run(&stored, &report_dir) {
            warn!(read = %read.name, error = %err, "quality report not generated");
        }
        Ok(())
    }

    fn attach_additional(
        &self,
        run: &Run,
        uploads: &[AdditionalUpload],
    ) -> (Vec<AdditionalFile>, Vec<String>) {
        let mut attached = Vec::new();
        let mut failures = Vec::new();
        let dir = self.layout.additional_dir(run);

        for upload in uploads {
            let result = fs_util::safe_move(&upload.staged_path, &dir.join(&upload.original_name))
                .and_then(|path| {
                    let file = AdditionalFile {
                        id: AdditionalFileId::new(),
                        owner: AttachmentOwner::Run(run.id),
                        path,
                    };
                    self.records.insert_additional(&file)?;
                    Ok(file)
                });
            match result {
                Ok(file) => attached.push(file),
                Err(err) => {
                    warn!(file = %upload.original_name, error = %err, "could not attach file");
                    failures.push(format!("{}: {err}", upload.original_name));
                }
            }
        }
        (attached, failures)
    }

    fn finish(
        &self,
        run: Run,
        state: BatchState,
        additional: &[AdditionalUpload],
        started: Instant,
        sink: &dyn ProgressSink,
    ) -> IngestResult {
        let (attached, additional_failures) = self.attach_additional(&run, additional);
        let unpaired_mates = state.linker.unmatched();
        for read in &unpaired_mates {
            warn!(%read, "paired read uploaded without its mate");
        }

        sink.event(ProgressEvent {
            message: format!(
                "phase={}; stored {} reads",
                IngestPhase::Done.label(),
                state.reads.len()
            ),
            elapsed: Some(started.elapsed()),
        });
        info!(run = %run.safe_name, reads = state.reads.len(), "ingestion complete");

        IngestResult {
            url: StorageLayout::run_url(&run),
            run,
            reads: state.reads,
            additional: attached,
            additional_failures,
            unpaired_mates,
        }
    }

    fn fail(
        &self,
        run: &Run,
        scope: RollbackScope,
        state: &BatchState,
        err: IngestError,
        sink: &dyn ProgressSink,
    ) -> IngestFailure {
        warn!(run = %run.safe_name, error = %err, "ingestion failed, rolling back");
        phase(sink, IngestPhase::Failed, &err.to_string());
        let cleanup =
            rollback::rollback(&self.records, &self.layout, run, scope, &state.leftovers());
        IngestFailure::new(err, cleanup)
    }
}

fn phase(sink: &dyn ProgressSink, phase: IngestPhase, detail: &str) {
    sink.event(ProgressEvent {
        message: format!("phase={}; {detail}", phase.label()),
        elapsed: None,
    });
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
