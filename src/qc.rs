use std::path::{Path, PathBuf};
use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::error::IngestError;

/// External quality-control report generator.
pub trait QcRunner: Send + Sync {
    fn run(&self, read_path: &Utf8Path, report_dir: &Utf8Path) -> Result<(), IngestError>;
    fn tool_info(&self) -> ToolInfo;

    /// Files `run` writes into `report_dir` for `read_path`.
    fn report_files(&self, read_path: &Utf8Path, report_dir: &Utf8Path) -> Vec<Utf8PathBuf> {
        fastqc_report_files(read_path, report_dir)
    }
}

/// FastQC names its outputs after the input with known read suffixes removed.
const FASTQC_STRIPPED_SUFFIXES: &[&str] = &[
    ".gz", ".bz2", ".txt", ".fastq", ".fq", ".csfastq", ".sam", ".bam",
];

pub fn fastqc_report_files(read_path: &Utf8Path, report_dir: &Utf8Path) -> Vec<Utf8PathBuf> {
    let Some(file_name) = read_path.file_name() else {
        return Vec::new();
    };
    let mut stem = file_name;
    for suffix in FASTQC_STRIPPED_SUFFIXES {
        stem = stem.strip_suffix(suffix).unwrap_or(stem);
    }
    vec![
        report_dir.join(format!("{stem}_fastqc.html")),
        report_dir.join(format!("{stem}_fastqc.zip")),
    ]
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub fastqc: Option<String>,
}

#[derive(Debug, Clone)]
pub enum QcToolStatus {
    Ready,
    Missing { message: String },
}

#[derive(Clone)]
pub struct FastqcRunner {
    fastqc: Option<PathBuf>,
}

impl FastqcRunner {
    /// Uses `explicit` when given, otherwise looks `fastqc` up on `PATH`.
    pub fn new(explicit: Option<&Utf8Path>) -> Self {
        let fastqc = match explicit {
            Some(path) => Some(path.as_std_path().to_path_buf()),
            None => find_in_path("fastqc"),
        };
        Self { fastqc }
    }

    pub fn tool_status(&self) -> QcToolStatus {
        match &self.fastqc {
            Some(path) if path.exists() => QcToolStatus::Ready,
            Some(path) => QcToolStatus::Missing {
                message: format!("fastqc not found at {}", path.display()),
            },
            None => QcToolStatus::Missing {
                message: "missing fastqc".to_string(),
            },
        }
    }

    fn require_fastqc(&self) -> Result<&PathBuf, IngestError> {
        self.fastqc
            .as_ref()
            .ok_or_else(|| IngestError::MissingTool("fastqc".to_string()))
    }
}

impl QcRunner for FastqcRunner {
    fn run(&self, read_path: &Utf8Path, report_dir: &Utf8Path) -> Result<(), IngestError> {
        let fastqc = self.require_fastqc()?;
        let args = vec![
            "--quiet".to_string(),
            "--outdir".to_string(),
            report_dir.to_string(),
            read_path.to_string(),
        ];
        run_cmd(fastqc, &args)
    }

    fn tool_info(&self) -> ToolInfo {
        ToolInfo {
            fastqc: self
                .fastqc
                .as_ref()
                .and_then(|path| tool_version(path, &["--version"])),
        }
    }
}

/// Runner for deployments without a report generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoQc;

impl QcRunner for NoQc {
    fn run(&self, _read_path: &Utf8Path, _report_dir: &Utf8Path) -> Result<(), IngestError> {
        Ok(())
    }

    fn tool_info(&self) -> ToolInfo {
        ToolInfo { fastqc: None }
    }
}

fn run_cmd(program: &Path, args: &[String]) -> Result<(), IngestError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|err| IngestError::QcFailed(err.to_string()))?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let message = if stderr.is_empty() {
        format!("command failed: {}", program.display())
    } else {
        stderr
    };
    Err(IngestError::QcFailed(message))
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.exists() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.exists() {
            return Some(plain);
        }
    }
    None
}

fn tool_version(path: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new(path).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        None
    } else {
        Some(stdout)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn missing_binary_is_reported() {
        let runner = FastqcRunner { fastqc: None };
        let err = runner
            .run(Utf8Path::new("a.fq.gz"), Utf8Path::new(".fastqc"))
            .unwrap_err();
        assert_matches!(err, IngestError::MissingTool(_));
        assert_matches!(runner.tool_status(), QcToolStatus::Missing { .. });
    }

    #[test]
    fn explicit_path_that_does_not_exist() {
        let runner = FastqcRunner::new(Some(Utf8Path::new("/nonexistent/fastqc")));
        assert_matches!(runner.tool_status(), QcToolStatus::Missing { .. });
        assert!(runner.tool_info().fastqc.is_none());
    }

    #[test]
    fn report_names_drop_read_suffixes() {
        let files = fastqc_report_files(
            Utf8Path::new("/data/run/processed/trim.fq.gz"),
            Utf8Path::new("/data/run/processed/.fastqc"),
        );
        assert_eq!(
            files,
            vec![
                Utf8PathBuf::from("/data/run/processed/.fastqc/trim_fastqc.html"),
                Utf8PathBuf::from("/data/run/processed/.fastqc/trim_fastqc.zip"),
            ]
        );
    }

    #[test]
    fn report_names_keep_unknown_suffixes() {
        let files = fastqc_report_files(Utf8Path::new("a.reads.bz2"), Utf8Path::new("qc"));
        assert_eq!(files[0], Utf8PathBuf::from("qc/a.reads_fastqc.html"));
    }
}
