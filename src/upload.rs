use std::collections::{BTreeMap, HashSet};
use std::fs;

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{debug, warn};

use crate::checksum;
use crate::domain::{ReadKey, UploadField};
use crate::error::IngestError;

/// One file part of a multipart upload, already staged on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPart {
    pub field: String,
    pub original_name: String,
    pub staged_path: Utf8PathBuf,
}

/// Everything a client submitted for one ingestion call.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub files: Vec<UploadPart>,
    pub fields: Vec<(String, String)>,
}

impl UploadRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(
        mut self,
        field: impl Into<String>,
        original_name: impl Into<String>,
        staged_path: impl Into<Utf8PathBuf>,
    ) -> Self {
        self.files.push(UploadPart {
            field: field.into(),
            original_name: original_name.into(),
            staged_path: staged_path.into(),
        });
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }
}

/// A read file with the digest its client claimed for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadUpload {
    pub key: ReadKey,
    pub original_name: String,
    pub staged_path: Utf8PathBuf,
    pub claimed_md5: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdditionalUpload {
    pub field: String,
    pub original_name: String,
    pub staged_path: Utf8PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedUpload {
    pub reads: Vec<ReadUpload>,
    pub additional: Vec<AdditionalUpload>,
}

/// A read whose recomputed digest agreed with the claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedRead {
    pub upload: ReadUpload,
    pub md5: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Mismatch {
    pub file: String,
    pub claimed: Option<String>,
    pub computed: String,
}

/// Splits file parts into read files and attachments, pairing each read with
/// its `md5-<key>` field. Unknown file fields and repeated read keys are
/// rejected; text fields other than digests are left to the caller.
pub fn collect(request: &UploadRequest) -> Result<CollectedUpload, IngestError> {
    let mut claims = BTreeMap::new();
    for (name, value) in &request.fields {
        if let UploadField::Checksum(key) = UploadField::parse(name)? {
            if claims.insert(key, value.trim().to_string()).is_some() {
                return Err(IngestError::DuplicateField(name.clone()));
            }
        }
    }

    let mut seen = HashSet::new();
    let mut collected = CollectedUpload::default();
    for part in &request.files {
        check_file_name(&part.original_name)?;
        match UploadField::parse(&part.field)? {
            UploadField::Read(key) => {
                if !seen.insert(key) {
                    return Err(IngestError::DuplicateField(part.field.clone()));
                }
                collected.reads.push(ReadUpload {
                    key,
                    original_name: part.original_name.clone(),
                    staged_path: part.staged_path.clone(),
                    claimed_md5: claims.remove(&key),
                });
            }
            UploadField::Additional(field) => collected.additional.push(AdditionalUpload {
                field,
                original_name: part.original_name.clone(),
                staged_path: part.staged_path.clone(),
            }),
            UploadField::Checksum(_) => {
                return Err(IngestError::InvalidField(format!(
                    "{} is a digest field but carries a file",
                    part.field
                )));
            }
            UploadField::Unknown(field) => return Err(IngestError::UnknownField(field)),
        }
    }

    for key in claims.keys() {
        warn!(key = %key, "digest supplied for a file that was not uploaded");
    }
    Ok(collected)
}

/// Client supplied names end up in storage paths, so they must be bare names.
fn check_file_name(name: &str) -> Result<(), IngestError> {
    let bare = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if !bare {
        return Err(IngestError::InvalidField(format!("invalid file name: {name:?}")));
    }
    Ok(())
}

/// Recomputes every read's digest before anything touches storage.
///
/// A single mismatch rejects the whole batch; an empty accepted set is
/// reported as no files.
pub fn verify_all(reads: Vec<ReadUpload>) -> Result<Vec<VerifiedRead>, IngestError> {
    let mut matched = Vec::with_capacity(reads.len());
    let mut mismatched = Vec::new();

    for upload in reads {
        let content = fs::read(upload.staged_path.as_std_path()).map_err(|err| {
            IngestError::Filesystem(format!("read {}: {err}", upload.staged_path))
        })?;
        let outcome = checksum::verify(&content, upload.claimed_md5.as_deref());
        if outcome.matched {
            debug!(file = %upload.original_name, md5 = %outcome.computed, "checksum ok");
            matched.push(VerifiedRead {
                upload,
                md5: outcome.computed,
            });
        } else {
            mismatched.push(Mismatch {
                file: upload.original_name.clone(),
                claimed: upload.claimed_md5.clone(),
                computed: outcome.computed,
            });
        }
    }

    if !mismatched.is_empty() {
        for mismatch in &mismatched {
            warn!(
                file = %mismatch.file,
                claimed = mismatch.claimed.as_deref().unwrap_or("<none>"),
                computed = %mismatch.computed,
                "bad md5 sum"
            );
        }
        return Err(IngestError::ChecksumMismatch {
            files: mismatched.into_iter().map(|mismatch| mismatch.file).collect(),
        });
    }

    if matched.is_empty() {
        return Err(IngestError::NoFilesProvided);
    }
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::domain::Mate;

    #[test]
    fn collect_pairs_digests_by_full_key() {
        let request = UploadRequest::new()
            .file("file-1-1", "s_R1.fq", "/tmp/a")
            .file("file-1-2", "s_R2.fq", "/tmp/b")
            .file("additional-sheet", "sheet.csv", "/tmp/c")
            .field("md5-1-1", "aaa")
            .field("md5-1-2", " bbb ")
            .field("name", "run one");

        let collected = collect(&request).unwrap();
        assert_eq!(collected.reads.len(), 2);
        assert_eq!(collected.reads[0].key.mate, Some(Mate::First));
        assert_eq!(collected.reads[0].claimed_md5.as_deref(), Some("aaa"));
        assert_eq!(collected.reads[1].claimed_md5.as_deref(), Some("bbb"));
        assert_eq!(collected.additional.len(), 1);
    }

    #[test]
    fn collect_rejects_unknown_file_field() {
        let request = UploadRequest::new().file("avatar", "me.png", "/tmp/a");
        let err = collect(&request).unwrap_err();
        assert_matches!(err, IngestError::UnknownField(field) if field == "avatar");
    }

    #[test]
    fn collect_rejects_repeated_key() {
        let request = UploadRequest::new()
            .file("file-1", "a.fq", "/tmp/a")
            .file("file-1", "b.fq", "/tmp/b");
        let err = collect(&request).unwrap_err();
        assert_matches!(err, IngestError::DuplicateField(_));
    }

    #[test]
    fn collect_rejects_path_in_file_name() {
        let request = UploadRequest::new().file("file-1", "../../etc/a.fq", "/tmp/a");
        let err = collect(&request).unwrap_err();
        assert_matches!(err, IngestError::InvalidField(_));
    }

    #[test]
    fn verify_all_rejects_empty_batch() {
        let err = verify_all(Vec::new()).unwrap_err();
        assert_matches!(err, IngestError::NoFilesProvided);
    }
}
