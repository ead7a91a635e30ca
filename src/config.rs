use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::dblp::DEFAULT_BASE_URL;
use crate::error::KiraError;

pub const CONFIG_FILE: &str = "kira-ss.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub vault: Option<String>,
    #[serde(default)]
    pub folders: FolderEntry,
    #[serde(default)]
    pub dblp_base_url: Option<String>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub affiliation_prefixes: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FolderEntry {
    #[serde(default)]
    pub people: Option<String>,
    #[serde(default)]
    pub organizations: Option<String>,
    #[serde(default)]
    pub conferences: Option<String>,
    #[serde(default)]
    pub journals: Option<String>,
    #[serde(default)]
    pub informal: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folders {
    pub people: String,
    pub organizations: String,
    pub conferences: String,
    pub journals: String,
    pub informal: String,
}

impl Default for Folders {
    fn default() -> Self {
        Self {
            people: "People".to_string(),
            organizations: "Organizations".to_string(),
            conferences: "Conference".to_string(),
            journals: "Journal".to_string(),
            informal: "Informal".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub vault: Option<Utf8PathBuf>,
    pub folders: Folders,
    pub dblp_base_url: String,
    pub concurrency: usize,
    pub affiliation_prefixes: Vec<String>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ConfigLoader::resolve_config(Config::default())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        let config_path = match path {
            Some(path) => Some(PathBuf::from(path)),
            None => Self::discover(),
        };
        let Some(config_path) = config_path else {
            return Ok(ResolvedConfig::default());
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;

        Ok(Self::resolve_config(config))
    }

    fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        ProjectDirs::from("", "", "kira-scholar-sync")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
            .filter(|path| path.exists())
    }

    pub fn resolve_config(config: Config) -> ResolvedConfig {
        let defaults = Folders::default();
        let folders = Folders {
            people: config.folders.people.unwrap_or(defaults.people),
            organizations: config.folders.organizations.unwrap_or(defaults.organizations),
            conferences: config.folders.conferences.unwrap_or(defaults.conferences),
            journals: config.folders.journals.unwrap_or(defaults.journals),
            informal: config.folders.informal.unwrap_or(defaults.informal),
        };

        ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            vault: config.vault.map(Utf8PathBuf::from),
            folders,
            dblp_base_url: config
                .dblp_base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            concurrency: config.concurrency.unwrap_or(4).max(1),
            affiliation_prefixes: config.affiliation_prefixes,
        }
    }
}
