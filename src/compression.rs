use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::debug;

use crate::checksum;
use crate::error::IngestError;

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const BZIP2_MAGIC: [u8; 3] = *b"BZh";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Gzip,
    Bzip2,
}

/// A staged file after compression normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub path: Utf8PathBuf,
    pub file_name: String,
    pub md5: String,
    pub compressed_here: bool,
}

/// Detects a compressed container by magic bytes; the file name is ignored.
pub fn sniff(path: &Utf8Path) -> Result<Option<Container>, IngestError> {
    let mut file = File::open(path.as_std_path())
        .map_err(|err| IngestError::Filesystem(format!("open {path}: {err}")))?;
    let mut magic = [0u8; 3];
    let mut filled = 0;
    while filled < magic.len() {
        let read = file
            .read(&mut magic[filled..])
            .map_err(|err| IngestError::Filesystem(format!("read {path}: {err}")))?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(detect(&magic[..filled]))
}

pub fn detect(magic: &[u8]) -> Option<Container> {
    if magic.starts_with(&GZIP_MAGIC) {
        Some(Container::Gzip)
    } else if magic.starts_with(&BZIP2_MAGIC) {
        Some(Container::Bzip2)
    } else {
        None
    }
}

/// Ensures the staged file is stored compressed.
///
/// Already compressed files pass through with their verified digest and name.
/// Plain files with an accepted extension are gzipped next to the staged file
/// and re-digested; the stored name gains a `.gz` suffix. Anything else is
/// rejected as an unsupported format.
pub fn ensure_compressed(
    staged: &Utf8Path,
    file_name: &str,
    verified_md5: &str,
    raw_extensions: &[String],
) -> Result<Normalized, IngestError> {
    if let Some(container) = sniff(staged)? {
        debug!(file = file_name, ?container, "already compressed");
        return Ok(Normalized {
            path: staged.to_path_buf(),
            file_name: file_name.to_string(),
            md5: verified_md5.to_string(),
            compressed_here: false,
        });
    }

    let accepted = Utf8Path::new(file_name)
        .extension()
        .map(|ext| {
            raw_extensions
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false);
    if !accepted {
        return Err(IngestError::UnsupportedFormat(file_name.to_string()));
    }

    let compressed_path = Utf8PathBuf::from(format!("{staged}.gz"));
    gzip_file(staged, &compressed_path)?;
    let md5 = checksum::md5_file(&compressed_path)?;
    debug!(file = file_name, path = %compressed_path, "compressed upload");

    Ok(Normalized {
        path: compressed_path,
        file_name: format!("{file_name}.gz"),
        md5,
        compressed_here: true,
    })
}

pub fn gzip_file(source: &Utf8Path, dest: &Utf8Path) -> Result<(), IngestError> {
    let input = File::open(source.as_std_path())
        .map_err(|err| IngestError::Filesystem(format!("open {source}: {err}")))?;
    let output = File::create(dest.as_std_path())
        .map_err(|err| IngestError::Filesystem(format!("create {dest}: {err}")))?;
    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
    let result = io::copy(&mut BufReader::new(input), &mut encoder)
        .and_then(|_| encoder.finish())
        .and_then(|mut writer| io::Write::flush(&mut writer));
    if let Err(err) = result {
        let _ = fs::remove_file(dest.as_std_path());
        return Err(IngestError::Filesystem(format!("compress {source}: {err}")));
    }
    Ok(())
}
