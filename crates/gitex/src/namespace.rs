#![forbid(unsafe_code)]

//! Mapping from file locations to dotted module names.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use crate::config::AnalyzerConfig;

/// Path of `file` relative to `root`. A relative `file` that does not start with `root` is taken
/// as already root-relative.
pub fn relative_to_root(root: &Path, file: &Path) -> Option<PathBuf> {
    if let Ok(rel) = file.strip_prefix(root) {
        return Some(rel.to_path_buf());
    }
    if file.is_relative() {
        return Some(file.to_path_buf());
    }

    let root = root.canonicalize().ok()?;
    let file = file.canonicalize().ok()?;
    file.strip_prefix(&root).ok().map(Path::to_path_buf)
}

/// Project-relative path rendered with `/` separators.
pub fn display_path(rel: &Path) -> String {
    path_components(rel).join("/")
}

fn path_components(rel: &Path) -> Vec<String> {
    rel.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect()
}

/// Namespace path segments for a root-relative file. A package marker names its directory.
pub fn module_parts(rel: &Path, package_marker: &str) -> Vec<String> {
    let mut parts = path_components(rel);
    let Some(last) = parts.pop() else {
        return parts;
    };

    if last != package_marker {
        let stem = Path::new(&last)
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or(last);
        parts.push(stem);
    }
    parts
}

pub fn module_name(rel: &Path, package_marker: &str) -> String {
    module_parts(rel, package_marker).join(".")
}

/// Every module name defined by the analyzed files, including ancestor packages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectModules {
    names: BTreeSet<String>,
}

impl ProjectModules {
    pub fn build(root: &Path, files: &[PathBuf], config: &AnalyzerConfig) -> Self {
        let mut modules = Self::default();
        for file in files {
            if !config.is_source_file(file) {
                continue;
            }
            if let Some(rel) = relative_to_root(root, file) {
                modules.insert_module(&module_name(&rel, &config.package_marker));
            }
        }
        modules
    }

    /// Registers `name` and each of its ancestor prefixes.
    pub fn insert_module(&mut self, name: &str) {
        if name.is_empty() {
            return;
        }

        let parts: Vec<&str> = name.split('.').collect();
        for end in 1..=parts.len() {
            self.names.insert(parts[..end].join("."));
        }
    }

    pub fn contains(&self, module: &str) -> bool {
        self.names.contains(module)
    }

    pub fn is_external(&self, module: &str) -> bool {
        !self.contains(module)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}
