use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration (loaded from veilkv.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VeilConfig {
    pub db: DbConfig,
    pub store: StoreConfig,
}

/// Session behavior for an open database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Run the recovery scanner automatically during load
    pub recover_on_load: bool,
    /// Persist the index automatically after every mutation
    /// (put/del/import). If false, callers must invoke save_index.
    pub autosave_index: bool,
    /// Deadline for callers waiting on a concurrent load, in milliseconds
    pub load_timeout_ms: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            recover_on_load: false,
            autosave_index: true,
            load_timeout_ms: 30_000,
        }
    }
}

/// Physical backend selection for the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend service: "fs", "memory", or "s3"
    pub service: String,
    /// Root directory for the fs service
    pub root: PathBuf,
    /// S3 endpoint (s3 service only)
    pub endpoint: String,
    /// S3 region
    pub region: String,
    /// S3 bucket
    pub bucket: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            service: "fs".into(),
            root: PathBuf::from("~/.local/share/veilkv"),
            endpoint: "http://localhost:9000".into(),
            region: "us-east-1".into(),
            bucket: "veilkv".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[db]
recover_on_load = true
autosave_index = false
load_timeout_ms = 5000

[store]
service = "s3"
endpoint = "https://s3.example.com"
region = "eu-west-1"
bucket = "secrets"
"#;
        let config: VeilConfig = toml::from_str(toml_str).unwrap();

        assert!(config.db.recover_on_load);
        assert!(!config.db.autosave_index);
        assert_eq!(config.db.load_timeout_ms, 5000);
        assert_eq!(config.store.service, "s3");
        assert_eq!(config.store.bucket, "secrets");
        assert_eq!(config.store.region, "eu-west-1");
    }

    #[test]
    fn test_parse_defaults() {
        let config: VeilConfig = toml::from_str("").unwrap();

        assert!(!config.db.recover_on_load);
        assert!(config.db.autosave_index);
        assert_eq!(config.db.load_timeout_ms, 30_000);
        assert_eq!(config.store.service, "fs");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[store]
root = "/var/lib/veilkv"
"#;
        let config: VeilConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.store.root, PathBuf::from("/var/lib/veilkv"));
        // Defaults
        assert_eq!(config.store.service, "fs");
        assert!(config.db.autosave_index);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = VeilConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: VeilConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.db.load_timeout_ms, parsed.db.load_timeout_ms);
        assert_eq!(config.store.bucket, parsed.store.bucket);
    }
}
