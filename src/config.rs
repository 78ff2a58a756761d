use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server address (e.g., "0.0.0.0:8080")
    #[serde(default = "default_addr")]
    pub addr: String,
    /// Root directory of the blob store
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Externally visible base URL, used to build notification links
    #[serde(default = "default_public_url")]
    pub public_url: String,
    /// Maximum upload file size in bytes (default: 500MB)
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
    /// Lower-case file extensions accepted on upload
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: BTreeSet<String>,
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Folder export limits
    #[serde(default)]
    pub export: ExportConfig,
    /// Session cookie settings
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Connection URL, postgres:// in production, sqlite:// for local runs
    #[serde(default = "default_db_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExportConfig {
    /// Upper bound on the summed size of files in one archive
    #[serde(default = "default_export_max_bytes")]
    pub max_bytes: u64,
    /// Wall-clock budget for streaming one archive
    #[serde(default = "default_export_max_seconds")]
    pub max_seconds: u64,
    /// Skip sub-folders the requester cannot read individually
    #[serde(default)]
    pub recheck_descendant_read: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_export_max_bytes(),
            max_seconds: default_export_max_seconds(),
            recheck_descendant_read: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Mark the session cookie Secure (requires HTTPS)
    #[serde(default)]
    pub secure: bool,
}

// Default value functions
fn default_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_public_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_max_upload_size() -> usize {
    500 * 1024 * 1024 // 500MB
}

fn default_allowed_extensions() -> BTreeSet<String> {
    [
        // office documents
        "pdf", "doc", "docx", "dotx", "xls", "xlsx", "xlsm", "xlsb", "ppt", "pptx", "ppsx",
        "odt", "ods", "odp", "rtf",
        // statistics packages
        "sav", "por", "zsav", "dta", "rda", "rdata", "sas7bdat", "sas7bcat", "xpt", "dcf",
        // databases
        "dbf", "mdb", "accdb", "sqlite", "db", "sqlite3", "sql",
        // raw data and text
        "csv", "tsv", "txt", "dat", "tab", "json", "xml", "html", "htm", "md",
        // images
        "jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp", "svg", "eps",
        // archives
        "zip", "rar", "7z", "tar", "gz", "bz2",
        // media
        "mp4", "avi", "mkv", "mov", "wmv", "mp3", "wav",
        // GIS
        "kml", "kmz", "shp", "shx", "prj", "cpg", "gpkg", "geojson",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_db_url() -> String {
    "postgres://postgres@localhost:5432/docportal".to_string()
}

fn default_max_connections() -> u32 {
    20
}

fn default_export_max_bytes() -> u64 {
    2 * 1024 * 1024 * 1024 // 2GB
}

fn default_export_max_seconds() -> u64 {
    600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            upload_dir: default_upload_dir(),
            public_url: default_public_url(),
            max_upload_size: default_max_upload_size(),
            allowed_extensions: default_allowed_extensions(),
            log: LogConfig::default(),
            database: DatabaseConfig::default(),
            export: ExportConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.allowed_extensions = config
            .allowed_extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_lowercase())
            .collect();
        Ok(config)
    }

    /// Whether an uploaded file name carries an accepted extension
    pub fn is_allowed_extension(&self, file_name: &str) -> bool {
        match file_name.rsplit_once('.') {
            Some((_, ext)) => self.allowed_extensions.contains(&ext.to_lowercase()),
            None => false,
        }
    }

    /// Absolute link to a folder page, used as the notification target
    pub fn folder_url(&self, folder_id: i32) -> String {
        format!("{}/drive/folder/{}", self.public_url.trim_end_matches('/'), folder_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.addr, "0.0.0.0:8080");
        assert_eq!(config.max_upload_size, 500 * 1024 * 1024);
        assert!(!config.export.recheck_descendant_read);
    }

    #[test]
    fn test_toml_parse() {
        let toml_str = r#"
            addr = "127.0.0.1:9000"
            upload_dir = "/data/blobs"
            allowed_extensions = ["pdf", "csv"]

            [database]
            url = "sqlite::memory:"

            [export]
            max_bytes = 1024
            recheck_descendant_read = true
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.addr, "127.0.0.1:9000");
        assert_eq!(config.upload_dir, PathBuf::from("/data/blobs"));
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.export.max_bytes, 1024);
        assert_eq!(config.export.max_seconds, 600);
        assert!(config.export.recheck_descendant_read);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_allowed_extension() {
        let config = Config::default();
        assert!(config.is_allowed_extension("report.PDF"));
        assert!(config.is_allowed_extension("census.tar.gz"));
        assert!(!config.is_allowed_extension("setup.exe"));
        assert!(!config.is_allowed_extension("README"));
    }

    #[test]
    fn test_folder_url() {
        let mut config = Config::default();
        config.public_url = "https://portal.example/".to_string();
        assert_eq!(config.folder_url(7), "https://portal.example/drive/folder/7");
    }
}
