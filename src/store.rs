use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::{
    AdditionalFile, AdditionalFileId, AttachmentOwner, Read, ReadId, ReadKind, Run, RunId,
    SafeName, SampleLocation,
};
use crate::error::IngestError;

pub const FASTQC_DIR: &str = ".fastqc";
pub const ADDITIONAL_DIR: &str = "additional";

/// Canonical on-disk layout below the configured data directory.
#[derive(Debug, Clone)]
pub struct StorageLayout {
    data_dir: Utf8PathBuf,
}

impl StorageLayout {
    pub fn new(data_dir: Utf8PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn data_dir(&self) -> &Utf8Path {
        &self.data_dir
    }

    pub fn sample_dir(&self, location: &SampleLocation) -> Utf8PathBuf {
        self.data_dir
            .join(location.group.as_str())
            .join(location.project.as_str())
            .join(location.sample.as_str())
    }

    pub fn run_dir(&self, run: &Run) -> Utf8PathBuf {
        self.sample_dir(&run.sample).join(run.safe_name.as_str())
    }

    pub fn reads_dir(&self, run: &Run, kind: ReadKind) -> Utf8PathBuf {
        self.run_dir(run).join(kind.dir_name())
    }

    pub fn report_dir(&self, run: &Run, kind: ReadKind) -> Utf8PathBuf {
        self.reads_dir(run, kind).join(FASTQC_DIR)
    }

    pub fn additional_dir(&self, run: &Run) -> Utf8PathBuf {
        self.run_dir(run).join(ADDITIONAL_DIR)
    }

    /// Redirect target for a run, `/group/project/sample/run`.
    pub fn run_url(run: &Run) -> String {
        format!(
            "/{}/{}/{}/{}",
            run.sample.group, run.sample.project, run.sample.sample, run.safe_name
        )
    }
}

/// Persistence collaborator for run, read and attachment records.
pub trait RecordStore: Send + Sync {
    fn insert_run(&self, run: &Run) -> Result<(), IngestError>;
    fn get_run(&self, id: RunId) -> Result<Option<Run>, IngestError>;
    fn delete_run(&self, id: RunId) -> Result<(), IngestError>;
    fn runs_for_sample(&self, location: &SampleLocation) -> Result<Vec<Run>, IngestError>;

    fn insert_read(&self, read: &Read) -> Result<(), IngestError>;
    fn get_read(&self, id: ReadId) -> Result<Option<Read>, IngestError>;
    fn delete_read(&self, id: ReadId) -> Result<(), IngestError>;
    fn reads_for_run(&self, run: RunId) -> Result<Vec<Read>, IngestError>;
    fn set_sibling(&self, read: ReadId, sibling: ReadId) -> Result<(), IngestError>;

    fn insert_additional(&self, file: &AdditionalFile) -> Result<(), IngestError>;
    fn additional_for_run(&self, run: RunId) -> Result<Vec<AdditionalFile>, IngestError>;
    fn delete_additional(&self, id: AdditionalFileId) -> Result<(), IngestError>;

    fn find_run(
        &self,
        location: &SampleLocation,
        safe_name: &SafeName,
    ) -> Result<Option<Run>, IngestError> {
        Ok(self
            .runs_for_sample(location)?
            .into_iter()
            .find(|run| &run.safe_name == safe_name))
    }
}

/// Record store keeping one pretty-printed JSON document per record.
#[derive(Debug, Clone)]
pub struct JsonRecordStore {
    root: Utf8PathBuf,
}

impl JsonRecordStore {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn run_path(&self, id: RunId) -> Utf8PathBuf {
        self.root.join("runs").join(format!("{id}.json"))
    }

    fn read_path(&self, id: ReadId) -> Utf8PathBuf {
        self.root.join("reads").join(format!("{id}.json"))
    }

    fn additional_path(&self, id: AdditionalFileId) -> Utf8PathBuf {
        self.root.join("additional").join(format!("{id}.json"))
    }

    fn list<T: DeserializeOwned>(&self, kind: &str) -> Result<Vec<T>, IngestError> {
        let dir = self.root.join(kind);
        let entries = match fs::read_dir(dir.as_std_path()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(IngestError::Persistence(format!("list {dir}: {err}"))),
        };
        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| IngestError::Persistence(err.to_string()))?;
            let path = entry.path();
            if path.extension().map(|ext| ext == "json").unwrap_or(false) {
                let content = fs::read_to_string(&path)
                    .map_err(|err| IngestError::Persistence(err.to_string()))?;
                let record = serde_json::from_str(&content)
                    .map_err(|err| IngestError::Persistence(err.to_string()))?;
                records.push(record);
            }
        }
        Ok(records)
    }
}

impl RecordStore for JsonRecordStore {
    fn insert_run(&self, run: &Run) -> Result<(), IngestError> {
        write_record(&self.run_path(run.id), run)
    }

    fn get_run(&self, id: RunId) -> Result<Option<Run>, IngestError> {
        read_record(&self.run_path(id))
    }

    fn delete_run(&self, id: RunId) -> Result<(), IngestError> {
        delete_record(&self.run_path(id))
    }

    fn runs_for_sample(&self, location: &SampleLocation) -> Result<Vec<Run>, IngestError> {
        let mut runs = self
            .list::<Run>("runs")?
            .into_iter()
            .filter(|run| &run.sample == location)
            .collect::<Vec<_>>();
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(runs)
    }

    fn insert_read(&self, read: &Read) -> Result<(), IngestError> {
        write_record(&self.read_path(read.id), read)
    }

    fn get_read(&self, id: ReadId) -> Result<Option<Read>, IngestError> {
        read_record(&self.read_path(id))
    }

    fn delete_read(&self, id: ReadId) -> Result<(), IngestError> {
        delete_record(&self.read_path(id))
    }

    fn reads_for_run(&self, run: RunId) -> Result<Vec<Read>, IngestError> {
        let mut reads = self
            .list::<Read>("reads")?
            .into_iter()
            .filter(|read| read.run_id == run)
            .collect::<Vec<_>>();
        reads.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.name.cmp(&b.name)));
        Ok(reads)
    }

    fn set_sibling(&self, read: ReadId, sibling: ReadId) -> Result<(), IngestError> {
        let mut record = self
            .get_read(read)?
            .ok_or_else(|| IngestError::Persistence(format!("read {read} does not exist")))?;
        record.sibling = Some(sibling);
        write_record(&self.read_path(read), &record)
    }

    fn insert_additional(&self, file: &AdditionalFile) -> Result<(), IngestError> {
        write_record(&self.additional_path(file.id), file)
    }

    fn additional_for_run(&self, run: RunId) -> Result<Vec<AdditionalFile>, IngestError> {
        Ok(self
            .list::<AdditionalFile>("additional")?
            .into_iter()
            .filter(|file| file.owner == AttachmentOwner::Run(run))
            .collect())
    }

    fn delete_additional(&self, id: AdditionalFileId) -> Result<(), IngestError> {
        delete_record(&self.additional_path(id))
    }
}

fn write_record<T: Serialize>(path: &Utf8Path, record: &T) -> Result<(), IngestError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| IngestError::Persistence(err.to_string()))?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let content =
        serde_json::to_vec_pretty(record).map_err(|err| IngestError::Persistence(err.to_string()))?;
    fs::write(tmp_path.as_std_path(), &content)
        .map_err(|err| IngestError::Persistence(err.to_string()))?;
    fs::rename(tmp_path.as_std_path(), path.as_std_path())
        .map_err(|err| IngestError::Persistence(err.to_string()))?;
    Ok(())
}

fn read_record<T: DeserializeOwned>(path: &Utf8Path) -> Result<Option<T>, IngestError> {
    let content = match fs::read_to_string(path.as_std_path()) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(IngestError::Persistence(format!("read {path}: {err}"))),
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|err| IngestError::Persistence(format!("parse {path}: {err}")))
}

fn delete_record(path: &Utf8Path) -> Result<(), IngestError> {
    match fs::remove_file(path.as_std_path()) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(IngestError::Persistence(format!("delete {path}: {err}"))),
    }
}
