#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    Ok,
    Unreadable,
    Unparsable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceFile {
    /// Project-relative path with `/` separators.
    pub path: String,
    pub absolute_path: PathBuf,
    /// Dotted module name, empty for a root-level package marker.
    pub module: String,
    pub status: ParseStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub file_path: String,
    pub module: String,
    pub alias: Option<String>,
    pub imported_names: Vec<String>,
    pub is_from_import: bool,
    /// Leading dots of a relative `from` import.
    pub level: usize,
    pub is_external: bool,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassEntity {
    pub key: String,
    pub name: String,
    pub file_path: String,
    pub bases: Vec<String>,
    pub methods: Vec<String>,
    pub line: usize,
}

impl ClassEntity {
    pub fn qualified_key(file_path: &str, name: &str) -> String {
        format!("{file_path}::{name}")
    }
}

/// One call site as written in a function body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalleeToken {
    pub name: String,
    /// Written as `self.<name>(...)` inside a class.
    pub via_self: bool,
}

impl CalleeToken {
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            via_self: false,
        }
    }

    pub fn on_self(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            via_self: true,
        }
    }
}

impl fmt::Display for CalleeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.via_self {
            write!(f, "self.{}", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionEntity {
    pub key: String,
    pub name: String,
    pub file_path: String,
    pub class_name: Option<String>,
    pub calls: Vec<CalleeToken>,
    pub called_by: Vec<String>,
    pub line: usize,
}

impl FunctionEntity {
    pub fn qualified_name(class_name: Option<&str>, name: &str) -> String {
        match class_name {
            Some(class_name) => format!("{class_name}.{name}"),
            None => name.to_string(),
        }
    }

    pub fn qualified_key(file_path: &str, class_name: Option<&str>, name: &str) -> String {
        format!(
            "{file_path}::{}",
            Self::qualified_name(class_name, name)
        )
    }

    pub fn is_method(&self) -> bool {
        self.class_name.is_some()
    }

    /// `Class.name` for methods, `name` otherwise.
    pub fn display_name(&self) -> String {
        Self::qualified_name(self.class_name.as_deref(), &self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InheritanceEdge {
    pub base: String,
    pub derived: String,
    /// Base token as written in the derived class header.
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CallEdge {
    pub caller: String,
    pub callee: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    FileUnreadable,
    FileUnparsable,
    SymbolNotFound,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::FileUnreadable => "file unreadable",
            Self::FileUnparsable => "file unparsable",
            Self::SymbolNotFound => "symbol not found",
        };
        f.write_str(label)
    }
}

/// Advisory notice for a file that was skipped or only partly used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub path: String,
    pub message: String,
}

impl From<&AnalysisError> for Diagnostic {
    fn from(err: &AnalysisError) -> Self {
        let kind = match err {
            AnalysisError::FileUnparsable { .. } => DiagnosticKind::FileUnparsable,
            AnalysisError::SymbolNotFound { .. } => DiagnosticKind::SymbolNotFound,
            _ => DiagnosticKind::FileUnreadable,
        };
        Self {
            kind,
            path: err
                .path()
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyAnalysis {
    pub files: Vec<SourceFile>,
    /// Imports of every successfully parsed file, keyed by project-relative path.
    pub imports: BTreeMap<String, Vec<ImportRecord>>,
    /// Sorted by file path, then qualified name.
    pub classes: Vec<ClassEntity>,
    /// Sorted by file path, then qualified name.
    pub functions: Vec<FunctionEntity>,
    /// Internal modules imported by each file.
    pub file_dependencies: BTreeMap<String, BTreeSet<String>>,
    pub inheritance_edges: BTreeSet<InheritanceEdge>,
    pub call_edges: BTreeSet<CallEdge>,
    pub diagnostics: Vec<Diagnostic>,
}

impl DependencyAnalysis {
    pub fn class(&self, key: &str) -> Option<&ClassEntity> {
        self.classes.iter().find(|class| class.key == key)
    }

    pub fn function(&self, key: &str) -> Option<&FunctionEntity> {
        self.functions.iter().find(|func| func.key == key)
    }

    pub fn file(&self, path: &str) -> Option<&SourceFile> {
        self.files.iter().find(|file| file.path == path)
    }

    /// Base class key → derived class keys.
    pub fn inheritance_tree(&self) -> BTreeMap<&str, BTreeSet<&str>> {
        let mut tree: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for edge in &self.inheritance_edges {
            tree.entry(edge.base.as_str())
                .or_default()
                .insert(edge.derived.as_str());
        }
        tree
    }

    /// Caller key → callee keys.
    pub fn call_graph(&self) -> BTreeMap<&str, BTreeSet<&str>> {
        let mut graph: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
        for edge in &self.call_edges {
            graph
                .entry(edge.caller.as_str())
                .or_default()
                .insert(edge.callee.as_str());
        }
        graph
    }

    pub fn parsed_file_count(&self) -> usize {
        self.files
            .iter()
            .filter(|file| file.status == ParseStatus::Ok)
            .count()
    }

    /// Root package names of every external import, sorted.
    pub fn external_packages(&self) -> BTreeSet<&str> {
        self.imports
            .values()
            .flatten()
            .filter(|import| import.is_external)
            .filter_map(|import| import.module.split('.').next())
            .filter(|root| !root.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SliceResult {
    /// Absolute paths; always holds the start file.
    pub files: BTreeSet<PathBuf>,
    pub diagnostics: Vec<Diagnostic>,
}
