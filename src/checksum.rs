use std::fs;

use camino::Utf8Path;

use crate::error::IngestError;

/// Hex md5 of an in-memory buffer, the digest clients declare for uploads.
pub fn md5_hex(content: &[u8]) -> String {
    format!("{:x}", md5::compute(content))
}

pub fn md5_file(path: &Utf8Path) -> Result<String, IngestError> {
    let content = fs::read(path.as_std_path())
        .map_err(|err| IngestError::Filesystem(format!("read {path}: {err}")))?;
    Ok(md5_hex(&content))
}

/// Outcome of checking one upload against the digest its client declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub computed: String,
    pub matched: bool,
}

/// Claimed digests are compared case-insensitively; a missing claim never matches.
pub fn verify(content: &[u8], claimed: Option<&str>) -> Verification {
    let computed = md5_hex(content);
    let matched = claimed
        .map(|claim| claim.trim().eq_ignore_ascii_case(&computed))
        .unwrap_or(false);
    Verification { computed, matched }
}
