use crate::artifact::ArtifactFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "loas.yaml";

const MAX_CONFIG_FILE_SIZE: usize = 256 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    pub definitions_dir: PathBuf,
    pub output_dir: PathBuf,
    pub index_path: PathBuf,
    pub layer_path: PathBuf,
    pub docs_dir: PathBuf,
    pub formats: Vec<ArtifactFormat>,
    pub jobs: Option<usize>,
    pub tool_timeout_secs: u64,
    pub strict: bool,
    pub fail_fast: bool,
    pub toolchain: ToolchainConfig,
    pub layer: LayerConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            definitions_dir: PathBuf::from("yaml"),
            output_dir: PathBuf::from("releases"),
            index_path: PathBuf::from("docs/public/data/scripts.json"),
            layer_path: PathBuf::from("docs/public/data/layer.json"),
            docs_dir: PathBuf::from("docs/content/docs"),
            formats: ArtifactFormat::ALL.to_vec(),
            jobs: None,
            tool_timeout_secs: 120,
            strict: false,
            fail_fast: false,
            toolchain: ToolchainConfig::default(),
            layer: LayerConfig::default(),
        }
    }
}

impl BuildConfig {
    pub fn load(path: Option<&Path>, base_dir: &Path) -> Result<Self, ConfigError> {
        let resolved = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let candidate = base_dir.join(DEFAULT_CONFIG_FILE);
                if !candidate.is_file() {
                    log::debug!("no {DEFAULT_CONFIG_FILE} found, using defaults");
                    return Ok(Self::default());
                }
                candidate
            }
        };
        log::info!("loading configuration from {}", resolved.display());

        let bytes = fs::read(&resolved)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", resolved.display())))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid(
                "config file exceeds size limit".to_string(),
            ));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_yaml(content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        // An empty document deserializes as unit, not as an empty mapping.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self =
            serde_yaml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.formats.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one artifact format must be selected".to_string(),
            ));
        }
        if self.jobs == Some(0) {
            return Err(ConfigError::Invalid("jobs must be at least 1".to_string()));
        }
        if self.tool_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "tool_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn wants(&self, format: ArtifactFormat) -> bool {
        self.formats.contains(&format)
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn worker_count(&self) -> usize {
        self.jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|count| count.get())
                .unwrap_or(1)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolchainConfig {
    pub script_compiler: String,
    pub archiver: String,
    pub native_compiler: String,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            script_compiler: "osacompile".to_string(),
            archiver: "ditto".to_string(),
            native_compiler: "swiftc -O".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayerConfig {
    pub name: String,
    pub description: String,
    pub attack_version: String,
    pub navigator_version: String,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            name: "LOAS coverage".to_string(),
            description: "macOS techniques covered by Living Off AppleScript test definitions"
                .to_string(),
            attack_version: "16".to_string(),
            navigator_version: "5.1.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}
