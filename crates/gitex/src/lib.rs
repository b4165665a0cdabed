#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod extraction;
pub mod logging;
pub mod namespace;
pub mod outline;
pub mod render;
pub mod resolution;
pub mod slice;
pub mod syntax;
pub mod types;

pub use config::AnalyzerConfig;
pub use error::{AnalysisError, Result};
pub use extraction::{analyze, scan_directory};
pub use outline::extract_outline;
pub use render::format_dependency_analysis;
pub use slice::resolve_slice;
pub use types::{DependencyAnalysis, Diagnostic, DiagnosticKind, SliceResult};
