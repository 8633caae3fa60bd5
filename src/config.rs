use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::IngestError;

pub const CONFIG_FILE: &str = "readvault.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub data_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub tmp_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub records_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub raw_extensions: Option<Vec<String>>,
    #[serde(default)]
    pub fastqc: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub data_dir: Utf8PathBuf,
    pub tmp_dir: Utf8PathBuf,
    pub records_dir: Utf8PathBuf,
    pub raw_extensions: Vec<String>,
    pub fastqc: Option<Utf8PathBuf>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `readvault.json` from the working directory. With no
    /// explicit path and no file present, platform defaults are used.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, IngestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            debug!("no {CONFIG_FILE} found, using defaults");
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| IngestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| IngestError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, IngestError> {
        let data_dir = match config.data_dir {
            Some(dir) => dir,
            None => default_data_dir()?,
        };
        let tmp_dir = config.tmp_dir.unwrap_or_else(|| data_dir.join(".tmp"));
        let records_dir = config
            .records_dir
            .unwrap_or_else(|| data_dir.join(".records"));

        let raw_extensions = config
            .raw_extensions
            .unwrap_or_else(default_raw_extensions)
            .into_iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect::<Vec<_>>();
        if raw_extensions.is_empty() {
            return Err(IngestError::ConfigParse(
                "raw_extensions must name at least one extension".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            data_dir,
            tmp_dir,
            records_dir,
            raw_extensions,
            fastqc: config.fastqc,
        })
    }

    pub fn ensure_base_folders(config: &ResolvedConfig) -> Result<(), IngestError> {
        for dir in [&config.data_dir, &config.tmp_dir, &config.records_dir] {
            if !dir.as_std_path().exists() {
                warn!(path = %dir, "creating missing directory");
            }
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| IngestError::Filesystem(format!("create {dir}: {err}")))?;
        }
        Ok(())
    }
}

pub fn default_raw_extensions() -> Vec<String> {
    vec!["fq".to_string(), "fastq".to_string()]
}

fn default_data_dir() -> Result<Utf8PathBuf, IngestError> {
    BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().join("readvault")).ok())
        .ok_or_else(|| IngestError::Filesystem("unable to resolve data directory".to_string()))
}
