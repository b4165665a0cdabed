#![forbid(unsafe_code)]

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("cannot read {}: {reason}", path.display())]
    FileUnreadable { path: PathBuf, reason: String },

    #[error("cannot parse {}: syntax error at line {line}", path.display())]
    FileUnparsable { path: PathBuf, line: usize },

    #[error("symbol '{symbol}' not found in {}", path.display())]
    SymbolNotFound { path: PathBuf, symbol: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load Python grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),

    #[error("invalid config {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl AnalysisError {
    /// Path of the file the error is about, when there is one.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::FileUnreadable { path, .. }
            | Self::FileUnparsable { path, .. }
            | Self::SymbolNotFound { path, .. }
            | Self::Io { path, .. }
            | Self::Config { path, .. } => Some(path),
            Self::Language(_) => None,
        }
    }
}
