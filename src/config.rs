// ABOUTME: Parses the optional snapdump.toml config document into request fragments
// ABOUTME: CLI flags always take precedence over whatever the config file sets

use crate::request::Compression;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Deserialize, Default)]
pub struct ConnConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub dbname: Option<String>,
    pub sqlite: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialTableConfig {
    pub table: String,
    #[serde(rename = "where")]
    pub predicate: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct SnapdumpConfig {
    #[serde(default)]
    pub source: ConnConfig,
    #[serde(default)]
    pub target: ConnConfig,
    #[serde(default)]
    pub full_tables: Vec<String>,
    #[serde(default)]
    pub partial_tables: Vec<PartialTableConfig>,
    pub compression: Option<String>,
    pub cleanup: Option<String>,
}

impl SnapdumpConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at '{}'", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse TOML config at '{}'", path.display()))
    }

    pub fn compression(&self) -> Result<Option<Compression>> {
        self.compression
            .as_deref()
            .map(Compression::from_str)
            .transpose()
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn parses_sample_config() {
        let mut tmp = NamedTempFile::new().unwrap();
        let contents = r#"
            compression = "bzip2"

            [source]
            host = "localhost"
            port = 5432
            user = "snapdump"
            dbname = "app"

            [target]
            sqlite = "/tmp/snapshot.sqlite3"

            full_tables = ["groups"]

            [[partial_tables]]
            table = "employees"
            where = "department = 'eng'"
        "#;
        write!(tmp, "{contents}").unwrap();

        let config = SnapdumpConfig::load(tmp.path()).unwrap();
        assert_eq!(config.source.host.as_deref(), Some("localhost"));
        assert_eq!(config.target.sqlite.as_deref(), Some("/tmp/snapshot.sqlite3"));
        assert_eq!(config.full_tables, vec!["groups".to_string()]);
        assert_eq!(config.partial_tables[0].table, "employees");
        assert_eq!(config.partial_tables[0].predicate, "department = 'eng'");
        assert_eq!(config.compression().unwrap(), Some(Compression::Bzip2));
    }
}
