use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use camino::Utf8PathBuf;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IngestError;

static UNSAFE_CHARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReadId(Uuid);

impl ReadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdditionalFileId(Uuid);

impl AdditionalFileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AdditionalFileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AdditionalFileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// URL and path safe form of a human readable name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SafeName(String);

impl SafeName {
    pub fn derive(name: &str) -> Result<Self, IngestError> {
        let lowered = name.trim().to_lowercase();
        let collapsed = UNSAFE_CHARS.replace_all(&lowered, "-");
        let trimmed = collapsed.trim_matches('-');
        if trimmed.is_empty() {
            return Err(IngestError::InvalidName(name.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn with_suffix(&self, counter: usize) -> Self {
        Self(format!("{}-{counter}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SafeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SafeName {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let derived = Self::derive(value)?;
        if derived.as_str() != value {
            return Err(IngestError::InvalidName(value.to_string()));
        }
        Ok(derived)
    }
}

/// Position of a sample in the group/project/sample hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SampleLocation {
    pub group: SafeName,
    pub project: SafeName,
    pub sample: SafeName,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryMetadata {
    pub sequencing_provider: Option<String>,
    pub sequencing_technology: Option<String>,
    pub insert_size: Option<String>,
    pub library_type: Option<String>,
    pub library_source: Option<String>,
    pub library_selection: Option<String>,
    pub library_strategy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub name: String,
    pub safe_name: SafeName,
    pub sample: SampleLocation,
    pub library: LibraryMetadata,
    pub submission_to_galaxy: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Read {
    pub id: ReadId,
    pub name: String,
    pub run_id: RunId,
    pub md5: String,
    pub fastqc_location: Utf8PathBuf,
    pub path: Utf8PathBuf,
    pub processed: bool,
    pub sibling: Option<ReadId>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum AttachmentOwner {
    Run(RunId),
    Sample(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalFile {
    pub id: AdditionalFileId,
    pub owner: AttachmentOwner,
    pub path: Utf8PathBuf,
}

/// Which storage subtree of a run a batch of reads lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadKind {
    Raw,
    Processed,
}

impl ReadKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            ReadKind::Raw => "raw",
            ReadKind::Processed => "processed",
        }
    }

    pub fn is_processed(self) -> bool {
        matches!(self, ReadKind::Processed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Mate {
    First,
    Second,
}

impl FromStr for Mate {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "1" => Ok(Mate::First),
            "2" => Ok(Mate::Second),
            _ => Err(IngestError::InvalidField(format!("mate must be 1 or 2: {value}"))),
        }
    }
}

impl fmt::Display for Mate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mate::First => write!(f, "1"),
            Mate::Second => write!(f, "2"),
        }
    }
}

/// Identity of one read slot in an upload form: `<index>` or `<index>-<mate>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReadKey {
    pub index: u32,
    pub mate: Option<Mate>,
}

impl fmt::Display for ReadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mate {
            Some(mate) => write!(f, "{}-{mate}", self.index),
            None => write!(f, "{}", self.index),
        }
    }
}

impl FromStr for ReadKey {
    type Err = IngestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (index, mate) = match value.split_once('-') {
            Some((index, mate)) => (index, Some(mate.parse::<Mate>()?)),
            None => (value, None),
        };
        let index = index.parse::<u32>().map_err(|_| {
            IngestError::InvalidField(format!("read index is not a number: {value}"))
        })?;
        Ok(Self { index, mate })
    }
}

/// Parsed multipart field identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadField {
    Read(ReadKey),
    Checksum(ReadKey),
    Additional(String),
    Unknown(String),
}

impl UploadField {
    pub fn parse(field: &str) -> Result<Self, IngestError> {
        let trimmed = field.trim();
        if let Some(rest) = trimmed.strip_prefix("file-") {
            return Ok(UploadField::Read(rest.parse()?));
        }
        if let Some(rest) = trimmed.strip_prefix("md5-") {
            return Ok(UploadField::Checksum(rest.parse()?));
        }
        if trimmed == "additional" || trimmed.starts_with("additional-") {
            return Ok(UploadField::Additional(trimmed.to_string()));
        }
        Ok(UploadField::Unknown(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn safe_name_collapses_punctuation() {
        let name = SafeName::derive("  MiSeq Run #4 (2024) ").unwrap();
        assert_eq!(name.as_str(), "miseq-run-4-2024");
    }

    #[test]
    fn safe_name_rejects_empty() {
        let err = SafeName::derive("!!!").unwrap_err();
        assert_matches!(err, IngestError::InvalidName(_));
    }

    #[test]
    fn parse_paired_read_field() {
        let field = UploadField::parse("file-3-2").unwrap();
        assert_eq!(
            field,
            UploadField::Read(ReadKey {
                index: 3,
                mate: Some(Mate::Second)
            })
        );
    }

    #[test]
    fn parse_checksum_and_additional_fields() {
        assert_eq!(
            UploadField::parse("md5-7").unwrap(),
            UploadField::Checksum(ReadKey {
                index: 7,
                mate: None
            })
        );
        assert_matches!(
            UploadField::parse("additional-notes").unwrap(),
            UploadField::Additional(_)
        );
        assert_matches!(UploadField::parse("avatar").unwrap(), UploadField::Unknown(_));
    }

    #[test]
    fn parse_bad_mate() {
        let err = UploadField::parse("file-1-3").unwrap_err();
        assert_matches!(err, IngestError::InvalidField(_));
    }
}
