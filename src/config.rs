use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::{ColumnSelection, CrsPolicy, WGS84_CODE};
use crate::error::PointpackError;

pub const CONFIG_FILE_NAME: &str = "pointpack.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub latitude: Option<String>,
    #[serde(default)]
    pub longitude: Option<String>,
    #[serde(default)]
    pub crs: Option<String>,
    #[serde(default)]
    pub crs_policy: Option<CrsPolicy>,
    #[serde(default)]
    pub workspace_root: Option<String>,
    #[serde(default)]
    pub base_name_max_len: Option<usize>,
    #[serde(default)]
    pub delimiter: Option<char>,
    #[serde(default)]
    pub sources: Vec<SourceEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum SourceEntry {
    Shorthand(String),
    Detailed(SourceEntryObject),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SourceEntryObject {
    pub path: String,
    #[serde(default)]
    pub latitude: Option<String>,
    #[serde(default)]
    pub longitude: Option<String>,
    #[serde(default)]
    pub crs: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceRequest {
    pub path: PathBuf,
    pub columns: ColumnSelection,
    pub crs: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub columns: ColumnSelection,
    pub crs: String,
    pub crs_policy: CrsPolicy,
    pub workspace_root: Option<Utf8PathBuf>,
    pub base_name_max_len: Option<usize>,
    pub delimiter: Option<u8>,
    pub sources: Vec<SourceRequest>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            columns: ColumnSelection::default(),
            crs: WGS84_CODE.to_string(),
            crs_policy: CrsPolicy::default(),
            workspace_root: None,
            base_name_max_len: None,
            delimiter: None,
            sources: Vec::new(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or the discovered default config when `path` is `None`.
    ///
    /// An explicit path must exist; a missing default yields `MissingConfig`.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, PointpackError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => Self::discover().ok_or(PointpackError::MissingConfig)?,
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PointpackError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| PointpackError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    /// Like [`ConfigLoader::resolve`], falling back to defaults when no config
    /// file is present.
    pub fn resolve_or_default(path: Option<&str>) -> Result<ResolvedConfig, PointpackError> {
        match Self::resolve(path) {
            Err(PointpackError::MissingConfig) => Ok(ResolvedConfig::default()),
            other => other,
        }
    }

    /// `./pointpack.json`, then the platform config directory.
    pub fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return Some(local);
        }
        ProjectDirs::from("", "", "pointpack")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .filter(|path| path.exists())
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, PointpackError> {
        let defaults = ResolvedConfig::default();
        let schema_version = config.schema_version.unwrap_or(1);
        let columns = ColumnSelection::new(
            config.latitude.unwrap_or(defaults.columns.latitude),
            config.longitude.unwrap_or(defaults.columns.longitude),
        );

        let delimiter = config
            .delimiter
            .map(|ch| {
                ch.is_ascii().then_some(ch as u8).ok_or_else(|| {
                    PointpackError::ConfigParse(format!("delimiter must be ASCII, got {ch:?}"))
                })
            })
            .transpose()?;

        let sources = config
            .sources
            .into_iter()
            .map(|entry| match entry {
                SourceEntry::Shorthand(path) => SourceRequest {
                    path: PathBuf::from(path),
                    columns: columns.clone(),
                    crs: None,
                },
                SourceEntry::Detailed(obj) => SourceRequest {
                    path: PathBuf::from(obj.path),
                    columns: ColumnSelection::new(
                        obj.latitude.unwrap_or_else(|| columns.latitude.clone()),
                        obj.longitude.unwrap_or_else(|| columns.longitude.clone()),
                    ),
                    crs: obj.crs,
                },
            })
            .collect();

        Ok(ResolvedConfig {
            schema_version,
            columns,
            crs: config.crs.unwrap_or(defaults.crs),
            crs_policy: config.crs_policy.unwrap_or(defaults.crs_policy),
            workspace_root: config.workspace_root.map(Utf8PathBuf::from),
            base_name_max_len: config.base_name_max_len,
            delimiter,
            sources,
        })
    }
}
