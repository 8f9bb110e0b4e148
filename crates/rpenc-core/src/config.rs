use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{RpencError, RpencResult};

/// Top-level configuration (loaded from rpenc.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpencConfig {
    pub encryption: EncryptionConfig,
    pub packs: PacksConfig,
    pub logging: LoggingConfig,
    /// Warn if the config file is world-readable (default: true)
    pub config_file_mode_check: bool,
}

impl Default for RpencConfig {
    fn default() -> Self {
        Self {
            encryption: EncryptionConfig::default(),
            packs: PacksConfig::default(),
            logging: LoggingConfig::default(),
            config_file_mode_check: true,
        }
    }
}

/// Master key source. `key` wins over `key_file`; with neither set the key is
/// derived from the machine identifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionConfig {
    /// Inline 32-byte master key
    pub key: Option<String>,
    /// File holding the 32-byte master key (trailing newline ignored)
    pub key_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacksConfig {
    /// Base directory for scratch directories and unfinalized archives
    pub working_dir: PathBuf,
    /// Where encrypted packs are written (default: ./encrypted)
    pub output_dir: PathBuf,
    /// File extensions recognised as pack archives by `batch`
    pub extensions: Vec<String>,
    /// Concurrent pack encryptions in `batch` (0 = available parallelism)
    pub jobs: usize,
    /// Skip archives that already carry an encrypted contents.json
    pub skip_encrypted: bool,
    /// Write `<archive>.key` next to each encrypted pack
    pub write_key_files: bool,
}

impl Default for PacksConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("~/.local/share/rpenc"),
            output_dir: PathBuf::from("encrypted"),
            extensions: vec!["zip".into(), "mcpack".into()],
            jobs: 0,
            skip_encrypted: true,
            write_key_files: true,
        }
    }
}

impl PacksConfig {
    /// Whether `ext` (without the dot) names a pack archive. Case-insensitive.
    pub fn is_pack_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

impl RpencConfig {
    /// Reject settings that parse but cannot be acted on.
    pub fn validate(&self) -> RpencResult<()> {
        if self.encryption.key.is_some() && self.encryption.key_file.is_some() {
            return Err(RpencError::Config(
                "encryption.key and encryption.key_file are mutually exclusive".into(),
            ));
        }
        if self.packs.extensions.is_empty() {
            return Err(RpencError::Config("packs.extensions must not be empty".into()));
        }
        if !matches!(self.logging.format.as_str(), "json" | "text") {
            return Err(RpencError::Config(format!(
                "logging.format must be \"json\" or \"text\" (got \"{}\")",
                self.logging.format
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
config_file_mode_check = false

[encryption]
key = "0123456789abcdef0123456789abcdef"

[packs]
working_dir = "/var/lib/rpenc"
output_dir = "/srv/packs"
extensions = ["zip"]
jobs = 4
skip_encrypted = false
write_key_files = false

[logging]
level = "debug"
format = "json"
"#;
        let config: RpencConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(
            config.encryption.key.as_deref(),
            Some("0123456789abcdef0123456789abcdef")
        );
        assert!(config.encryption.key_file.is_none());
        assert_eq!(config.packs.working_dir, PathBuf::from("/var/lib/rpenc"));
        assert_eq!(config.packs.output_dir, PathBuf::from("/srv/packs"));
        assert_eq!(config.packs.extensions, vec!["zip".to_string()]);
        assert_eq!(config.packs.jobs, 4);
        assert!(!config.packs.skip_encrypted);
        assert!(!config.packs.write_key_files);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        assert!(!config.config_file_mode_check);
    }

    #[test]
    fn test_parse_defaults() {
        let config: RpencConfig = toml::from_str("").unwrap();

        assert!(config.encryption.key.is_none());
        assert_eq!(config.packs.output_dir, PathBuf::from("encrypted"));
        assert_eq!(config.packs.jobs, 0);
        assert!(config.packs.skip_encrypted);
        assert!(config.packs.write_key_files);
        assert_eq!(config.logging.level, "info");
        assert!(config.config_file_mode_check);
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[encryption]
key_file = "/etc/rpenc/master.key"
"#;
        let config: RpencConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(
            config.encryption.key_file,
            Some(PathBuf::from("/etc/rpenc/master.key"))
        );
        // Defaults
        assert!(config.packs.is_pack_extension("mcpack"));
        assert_eq!(config.logging.format, "text");
    }

    #[test]
    fn test_pack_extension_case_insensitive() {
        let packs = PacksConfig::default();
        assert!(packs.is_pack_extension("ZIP"));
        assert!(packs.is_pack_extension("McPack"));
        assert!(!packs.is_pack_extension("json"));
    }

    #[test]
    fn test_validate() {
        assert!(RpencConfig::default().validate().is_ok());

        let mut both = RpencConfig::default();
        both.encryption.key = Some("0123456789abcdef0123456789abcdef".into());
        both.encryption.key_file = Some(PathBuf::from("/etc/rpenc/master.key"));
        assert!(matches!(both.validate(), Err(RpencError::Config(_))));

        let mut no_ext = RpencConfig::default();
        no_ext.packs.extensions.clear();
        assert!(matches!(no_ext.validate(), Err(RpencError::Config(_))));

        let mut bad_format = RpencConfig::default();
        bad_format.logging.format = "yaml".into();
        let err = bad_format.validate().unwrap_err();
        assert!(err.to_string().contains("yaml"));
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = RpencConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: RpencConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.packs.working_dir, parsed.packs.working_dir);
        assert_eq!(config.packs.extensions, parsed.packs.extensions);
        assert_eq!(config.logging.level, parsed.logging.level);
    }
}
