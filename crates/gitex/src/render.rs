#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{DependencyAnalysis, ImportRecord, SliceResult};

const MAX_EXTERNAL_NAMES: usize = 3;
const MAX_LISTED_METHODS: usize = 5;
const MAX_LISTED_PACKAGES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Focus {
    Imports,
    Inheritance,
    Calls,
}

impl FromStr for Focus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "imports" => Ok(Self::Imports),
            "inheritance" => Ok(Self::Inheritance),
            "calls" => Ok(Self::Calls),
            other => Err(format!(
                "unknown focus '{other}' (expected imports, inheritance or calls)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Markdown,
    Json,
}

pub fn render_analysis(
    analysis: &DependencyAnalysis,
    focus: Option<Focus>,
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Markdown => format_dependency_analysis(analysis, focus),
        OutputFormat::Json => serde_json::to_string_pretty(analysis).unwrap_or_default(),
    }
}

/// Markdown summary of an analysis. `focus` limits output to one section plus the summary.
pub fn format_dependency_analysis(analysis: &DependencyAnalysis, focus: Option<Focus>) -> String {
    let mut lines = Vec::new();
    let wants = |section: Focus| focus.is_none_or(|f| f == section);

    if wants(Focus::Imports) {
        format_imports(analysis, &mut lines);
    }
    if wants(Focus::Inheritance) {
        format_inheritance(analysis, &mut lines);
    }
    if wants(Focus::Calls) {
        format_calls(analysis, &mut lines);
    }
    format_summary(analysis, &mut lines);

    lines.join("\n")
}

fn format_imports(analysis: &DependencyAnalysis, lines: &mut Vec<String>) {
    lines.push("## Import Dependencies".to_string());
    lines.push(String::new());

    for (file_path, imports) in &analysis.imports {
        if imports.is_empty() {
            continue;
        }
        let (internal, external): (Vec<&ImportRecord>, Vec<&ImportRecord>) =
            imports.iter().partition(|import| !import.is_external);

        lines.push(format!("**{file_path}** imports:"));
        if !internal.is_empty() {
            lines.push("  Internal:".to_string());
            for import in internal {
                lines.push(format!("    - {}", import_statement(import, None)));
            }
        }
        if !external.is_empty() {
            lines.push("  External:".to_string());
            for import in external {
                lines.push(format!(
                    "    - {}",
                    import_statement(import, Some(MAX_EXTERNAL_NAMES))
                ));
            }
        }
        lines.push(String::new());
    }
}

fn import_statement(import: &ImportRecord, name_limit: Option<usize>) -> String {
    if import.is_from_import && !import.imported_names.is_empty() {
        let limit = name_limit.unwrap_or(usize::MAX);
        let mut names = import
            .imported_names
            .iter()
            .take(limit)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        if import.imported_names.len() > limit {
            names.push_str("...");
        }
        let dots = ".".repeat(import.level);
        return format!("from {dots}{} import {names}", import.module);
    }

    match &import.alias {
        Some(alias) => format!("import {} as {alias}", import.module),
        None => format!("import {}", import.module),
    }
}

fn format_inheritance(analysis: &DependencyAnalysis, lines: &mut Vec<String>) {
    lines.push("## Class Inheritance Hierarchy".to_string());
    lines.push(String::new());

    let tree = analysis.inheritance_tree();
    let derived: HashSet<&str> = tree.values().flatten().copied().collect();
    let roots: BTreeSet<&str> = analysis
        .classes
        .iter()
        .map(|class| class.key.as_str())
        .filter(|key| !derived.contains(key))
        .collect();

    if roots.is_empty() {
        lines.push("No class inheritance relationships found.".to_string());
        lines.push(String::new());
        return;
    }

    for root in roots {
        let mut path = Vec::new();
        format_class_tree(analysis, &tree, root, 0, &mut path, lines);
        lines.push(String::new());
    }
}

fn format_class_tree<'a>(
    analysis: &'a DependencyAnalysis,
    tree: &BTreeMap<&'a str, BTreeSet<&'a str>>,
    key: &'a str,
    level: usize,
    path: &mut Vec<&'a str>,
    lines: &mut Vec<String>,
) {
    let Some(class) = analysis.class(key) else {
        return;
    };
    // An inheritance cycle would otherwise recurse forever.
    if path.contains(&key) {
        return;
    }

    let indent = "  ".repeat(level);
    let connector = if level > 0 { "├── " } else { "" };
    let extends = if class.bases.is_empty() {
        String::new()
    } else {
        format!(" extends {}", class.bases.join(", "))
    };
    lines.push(format!(
        "{indent}{connector}**{}** ({}){extends}",
        class.name, class.file_path
    ));

    if !class.methods.is_empty() {
        let mut methods = class
            .methods
            .iter()
            .take(MAX_LISTED_METHODS)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        if class.methods.len() > MAX_LISTED_METHODS {
            methods.push_str("...");
        }
        lines.push(format!("{indent}    Methods: {methods}"));
    }

    path.push(key);
    for child in tree.get(key).into_iter().flatten() {
        format_class_tree(analysis, tree, *child, level + 1, path, lines);
    }
    path.pop();
}

fn format_calls(analysis: &DependencyAnalysis, lines: &mut Vec<String>) {
    lines.push("## Function Call Relationships".to_string());
    lines.push(String::new());

    let graph = analysis.call_graph();
    let mut functions: Vec<_> = analysis
        .functions
        .iter()
        .filter(|func| !func.calls.is_empty() || graph.contains_key(func.key.as_str()))
        .collect();
    functions.sort_by(|a, b| a.key.cmp(&b.key));

    if functions.is_empty() {
        lines.push("No function call relationships found.".to_string());
        lines.push(String::new());
        return;
    }

    for func in functions {
        lines.push(format!("**{}()** ({})", func.display_name(), func.file_path));

        if let Some(callees) = graph.get(func.key.as_str()) {
            lines.push("  Calls:".to_string());
            for callee in callees.iter().filter_map(|key| analysis.function(key)) {
                lines.push(format!(
                    "    - {}() in {}",
                    callee.display_name(),
                    callee.file_path
                ));
            }
        }

        if !func.called_by.is_empty() {
            lines.push("  Called by:".to_string());
            let callers: BTreeSet<&str> = func.called_by.iter().map(String::as_str).collect();
            for caller in callers.into_iter().filter_map(|key| analysis.function(key)) {
                lines.push(format!(
                    "    - {}() in {}",
                    caller.display_name(),
                    caller.file_path
                ));
            }
        }
        lines.push(String::new());
    }
}

fn format_summary(analysis: &DependencyAnalysis, lines: &mut Vec<String>) {
    lines.push("## Summary Statistics".to_string());
    lines.push(String::new());

    let packages = analysis.external_packages();
    let mut listed = packages
        .iter()
        .take(MAX_LISTED_PACKAGES)
        .copied()
        .collect::<Vec<_>>()
        .join(", ");
    if packages.len() > MAX_LISTED_PACKAGES {
        listed.push_str("...");
    }

    lines.push(format!("- **Files analyzed**: {}", analysis.parsed_file_count()));
    if !analysis.diagnostics.is_empty() {
        lines.push(format!("- **Files skipped**: {}", analysis.diagnostics.len()));
    }
    lines.push(format!("- **Classes found**: {}", analysis.classes.len()));
    lines.push(format!("- **Functions found**: {}", analysis.functions.len()));
    lines.push(format!(
        "- **External dependencies**: {} ({listed})",
        packages.len()
    ));
}

/// One line per sliced file, relative to `root` where possible.
pub fn format_slice(result: &SliceResult, root: &Path) -> String {
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    result
        .files
        .iter()
        .map(|file| {
            file.strip_prefix(&root)
                .map(crate::namespace::display_path)
                .unwrap_or_else(|_| file.display().to_string())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(module: &str, names: &[&str], external: bool) -> ImportRecord {
        ImportRecord {
            file_path: "a.py".to_string(),
            module: module.to_string(),
            alias: None,
            imported_names: names.iter().map(|n| (*n).to_string()).collect(),
            is_from_import: !names.is_empty(),
            level: 0,
            is_external: external,
            line: 1,
        }
    }

    #[test]
    fn test_focus_parsing() {
        assert_eq!("Calls".parse::<Focus>(), Ok(Focus::Calls));
        assert!("everything".parse::<Focus>().is_err());
    }

    #[test]
    fn test_external_names_are_truncated() {
        let import = record("typing", &["List", "Dict", "Set", "Optional"], true);
        assert_eq!(
            import_statement(&import, Some(MAX_EXTERNAL_NAMES)),
            "from typing import List, Dict, Set..."
        );
        assert_eq!(
            import_statement(&import, None),
            "from typing import List, Dict, Set, Optional"
        );
    }

    #[test]
    fn test_alias_and_relative_forms() {
        let mut aliased = record("numpy", &[], true);
        aliased.alias = Some("np".to_string());
        assert_eq!(import_statement(&aliased, None), "import numpy as np");

        let mut relative = record("models", &["User"], false);
        relative.level = 1;
        assert_eq!(import_statement(&relative, None), "from .models import User");
    }

    #[test]
    fn test_empty_analysis_renders_placeholders() {
        let output = format_dependency_analysis(&DependencyAnalysis::default(), None);
        assert!(output.contains("No class inheritance relationships found."));
        assert!(output.contains("No function call relationships found."));
        assert!(output.contains("- **Files analyzed**: 0"));
        assert!(output.contains("- **External dependencies**: 0 ()"));
    }

    #[test]
    fn test_focus_limits_sections() {
        let output = format_dependency_analysis(&DependencyAnalysis::default(), Some(Focus::Calls));
        assert!(output.contains("## Function Call Relationships"));
        assert!(!output.contains("## Import Dependencies"));
        assert!(!output.contains("## Class Inheritance Hierarchy"));
        assert!(output.contains("## Summary Statistics"));
    }
}
