#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

pub const CONFIG_DIR: &str = ".gitex";
pub const CONFIG_FILENAME: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Extension (without the dot) of files that take part in the analysis.
    pub source_extension: String,
    /// File name that turns its directory into an importable package.
    pub package_marker: String,
    /// Glob patterns skipped by directory discovery.
    pub exclude: Vec<String>,
    /// Files larger than this are reported unreadable instead of parsed.
    pub max_file_size: u64,
    /// Extract files on the rayon pool.
    pub parallel: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            source_extension: "py".to_string(),
            package_marker: "__init__.py".to_string(),
            exclude: default_exclude_patterns(),
            max_file_size: 1024 * 1024,
            parallel: true,
        }
    }
}

impl AnalyzerConfig {
    pub fn is_source_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == self.source_extension)
    }
}

pub fn config_path(project_root: &Path) -> PathBuf {
    project_root.join(CONFIG_DIR).join(CONFIG_FILENAME)
}

pub fn load_config(project_root: &Path) -> Result<AnalyzerConfig> {
    let path = config_path(project_root);
    if !path.exists() {
        return Ok(AnalyzerConfig::default());
    }

    let raw = fs::read_to_string(&path).map_err(|source| AnalysisError::Io {
        path: path.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| AnalysisError::Config { path, source })
}

pub fn save_config(project_root: &Path, config: &AnalyzerConfig) -> Result<()> {
    let path = config_path(project_root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| AnalysisError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let raw = serde_json::to_string_pretty(config).map_err(|source| AnalysisError::Config {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, raw).map_err(|source| AnalysisError::Io { path, source })
}

pub fn add_exclude_patterns(config: &mut AnalyzerConfig, patterns: &[String]) {
    for pattern in patterns {
        if !config.exclude.contains(pattern) {
            config.exclude.push(pattern.clone());
        }
    }
}

pub fn default_exclude_patterns() -> Vec<String> {
    vec![
        "**/.git/**",
        "**/.hg/**",
        "**/__pycache__/**",
        "**/.venv/**",
        "**/venv/**",
        "**/.env/**",
        "**/.pytest_cache/**",
        "**/.mypy_cache/**",
        "**/.ruff_cache/**",
        "**/.tox/**",
        "**/.nox/**",
        "**/*.egg-info/**",
        "**/.eggs/**",
        "**/site-packages/**",
        "**/node_modules/**",
        "**/.gitex/**",
    ]
    .into_iter()
    .map(std::string::ToString::to_string)
    .collect()
}
