#![forbid(unsafe_code)]

//! Symbol slicing: the internal files one top-level symbol needs, found by a breadth-first walk
//! over import statements.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use tree_sitter::{Node as TsNode, Parser};

use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, Result};
use crate::extraction::scan_directory;
use crate::namespace;
use crate::syntax::{self, ParsedSource};
use crate::types::{Diagnostic, SliceResult};

/// Local name → fully qualified module candidates.
pub type ImportTable = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone)]
struct ModuleClaim {
    path: PathBuf,
    /// Claimed through the file's full dotted name rather than a shorter suffix.
    exact: bool,
}

/// Dotted module suffix → file, private to the slicer.
#[derive(Debug, Clone, Default)]
pub struct ModuleIndex {
    entries: HashMap<String, ModuleClaim>,
}

impl ModuleIndex {
    /// Registers every file in order; the first file to claim a suffix keeps it, except that a
    /// file's full dotted name always displaces a suffix claim.
    pub fn build(root: &Path, files: &[PathBuf], config: &AnalyzerConfig) -> Self {
        let mut index = Self::default();
        for file in files {
            let Some(rel) = namespace::relative_to_root(root, file) else {
                continue;
            };
            let parts = namespace::module_parts(&rel, &config.package_marker);
            index.register(&parts, file);
        }
        index
    }

    /// Index over every source file discovered under `root`.
    pub fn from_root(root: &Path, config: &AnalyzerConfig) -> Self {
        Self::build(root, &scan_directory(root, config), config)
    }

    pub fn register(&mut self, parts: &[String], path: &Path) {
        for start in 0..parts.len() {
            let name = parts[start..].join(".");
            let exact = start == 0;
            match self.entries.get(&name) {
                Some(existing) if existing.exact || !exact => {}
                _ => {
                    self.entries.insert(
                        name,
                        ModuleClaim {
                            path: path.to_path_buf(),
                            exact,
                        },
                    );
                }
            }
        }
    }

    pub fn resolve(&self, module: &str) -> Option<&Path> {
        self.entries.get(module).map(|claim| claim.path.as_path())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Computes the files needed to keep `symbol` from `start_file` working.
///
/// The result always contains the start file. A missing symbol or an unreadable start file
/// yields just the start file plus a diagnostic. Dependencies pulled in by the walk have all of
/// their imports followed, used or not, so the set can be larger than strictly needed.
pub fn resolve_slice(
    root: &Path,
    start_file: &Path,
    symbol: &str,
    config: &AnalyzerConfig,
) -> Result<SliceResult> {
    let mut parser = syntax::python_parser()?;
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let start = absolute_path(start_file);
    info!(symbol, start = %start.display(), "resolving slice");

    let mut result = SliceResult::default();
    result.files.insert(start.clone());

    let parsed = match syntax::load_source(&mut parser, &start, Some(config.max_file_size)) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(error = %err, "cannot read slice start file");
            result.diagnostics.push(Diagnostic::from(&err));
            return Ok(result);
        }
    };

    let Some(target) = find_top_level_symbol(&parsed, symbol) else {
        let err = AnalysisError::SymbolNotFound {
            path: start.clone(),
            symbol: symbol.to_string(),
        };
        warn!(error = %err, "slice target missing");
        result.diagnostics.push(Diagnostic::from(&err));
        return Ok(result);
    };

    let used = used_names(target, &parsed.source);
    debug!(symbol, ?used, "names used by symbol");

    let package = package_parts(&root, &start);
    let mut queue = VecDeque::new();
    for (name, modules) in import_table(&parsed, &package) {
        if used.contains(&name) {
            debug!(name = %name, ?modules, "import used by symbol");
            queue.extend(modules);
        }
    }

    let index = ModuleIndex::from_root(&root, config);
    walk_imports(&mut parser, &root, &index, queue, config, &mut result);

    info!(files = result.files.len(), "slice resolved");
    Ok(result)
}

fn walk_imports(
    parser: &mut Parser,
    root: &Path,
    index: &ModuleIndex,
    mut queue: VecDeque<String>,
    config: &AnalyzerConfig,
    result: &mut SliceResult,
) {
    let mut processed = HashSet::new();

    while let Some(module) = queue.pop_front() {
        if !processed.insert(module.clone()) {
            continue;
        }
        let Some(path) = index.resolve(&module) else {
            continue;
        };
        if !result.files.insert(path.to_path_buf()) {
            continue;
        }
        debug!(module = %module, file = %path.display(), "adding dependency");

        match syntax::load_source(parser, path, Some(config.max_file_size)) {
            Ok(parsed) => {
                let package = package_parts(root, path);
                queue.extend(import_table(&parsed, &package).into_values().flatten());
            }
            Err(err) => {
                warn!(error = %err, "dependency kept but not expanded");
                result.diagnostics.push(Diagnostic::from(&err));
            }
        }
    }
}

fn absolute_path(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Directory segments of `file` below `root`; empty when `file` is outside it.
fn package_parts(root: &Path, file: &Path) -> Vec<String> {
    file.parent()
        .and_then(|dir| dir.strip_prefix(root).ok())
        .map(|dir| {
            dir.components()
                .filter_map(|c| match c {
                    std::path::Component::Normal(part) => Some(part.to_string_lossy().to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Names of the classes and functions declared at the top level of `path`.
pub fn top_level_symbols(path: &Path) -> Result<Vec<String>> {
    let mut parser = syntax::python_parser()?;
    let parsed = syntax::load_source(&mut parser, path, None)?;
    Ok(syntax::named_children(parsed.root())
        .into_iter()
        .filter_map(syntax::unwrap_definition)
        .filter_map(|def| syntax::definition_name(def, &parsed.source))
        .collect())
}

/// The top-level statement declaring `name`, decorators included.
pub fn find_top_level_symbol<'p>(parsed: &'p ParsedSource, name: &str) -> Option<TsNode<'p>> {
    syntax::named_children(parsed.root())
        .into_iter()
        .find(|node| {
            syntax::unwrap_definition(*node)
                .and_then(|def| syntax::definition_name(def, &parsed.source))
                .is_some_and(|declared| declared == name)
        })
}

/// Identifiers referenced anywhere under `node`.
///
/// Member names after a dot, keyword-argument names, parameter names, declared names and
/// names inside import statements are bindings or labels, not references.
pub fn used_names(node: TsNode<'_>, source: &str) -> BTreeSet<String> {
    let mut used = BTreeSet::new();
    let mut stack = vec![node];

    while let Some(current) = stack.pop() {
        if matches!(current.kind(), "import_statement" | "import_from_statement") {
            continue;
        }

        for child in syntax::children(current) {
            if child.kind() == "identifier" {
                if is_reference(current, child) {
                    used.insert(syntax::node_text(child, source).to_string());
                }
            } else {
                stack.push(child);
            }
        }
    }
    used
}

fn is_reference(parent: TsNode<'_>, identifier: TsNode<'_>) -> bool {
    let field_is = |field: &str| parent.child_by_field_name(field) == Some(identifier);
    match parent.kind() {
        "attribute" => !field_is("attribute"),
        "keyword_argument" | "function_definition" | "class_definition" => !field_is("name"),
        "default_parameter" | "typed_default_parameter" => !field_is("name"),
        "parameters" | "lambda_parameters" | "typed_parameter" => false,
        "list_splat_pattern" | "dictionary_splat_pattern" => false,
        _ => true,
    }
}

/// Maps each name bound by a top-level import to the modules it may refer to.
///
/// Relative imports resolve against `package`, the importing file's directory path, dropping
/// one trailing segment for each dot beyond the first.
pub fn import_table(parsed: &ParsedSource, package: &[String]) -> ImportTable {
    let mut table = ImportTable::new();
    let mut bind = |name: &str, module: String| {
        if name.is_empty() || module.is_empty() {
            return;
        }
        let candidates = table.entry(name.to_string()).or_default();
        if !candidates.contains(&module) {
            candidates.push(module);
        }
    };

    for statement in syntax::named_children(parsed.root()) {
        match statement.kind() {
            "import_statement" => {
                for name_node in syntax::children_by_field(statement, "name") {
                    if name_node.kind() == "aliased_import" {
                        let module = name_node
                            .child_by_field_name("name")
                            .map(|n| syntax::compact_text(n, &parsed.source))
                            .unwrap_or_default();
                        if let Some(alias) = name_node.child_by_field_name("alias") {
                            bind(parsed.text(alias), module);
                        }
                        continue;
                    }

                    let module = syntax::compact_text(name_node, &parsed.source);
                    bind(&module, module.clone());
                    if let Some((head, _)) = module.split_once('.') {
                        bind(head, module.clone());
                    }
                    if let Some((_, tail)) = module.rsplit_once('.') {
                        bind(tail, module.clone());
                    }
                }
            }
            "import_from_statement" => {
                let (module, level) = from_import_target(statement, parsed, package);
                for name_node in syntax::children_by_field(statement, "name") {
                    let (name, local) = match name_node.kind() {
                        "aliased_import" => {
                            let name = name_node
                                .child_by_field_name("name")
                                .map(|n| syntax::compact_text(n, &parsed.source))
                                .unwrap_or_default();
                            let local = name_node
                                .child_by_field_name("alias")
                                .map(|n| parsed.text(n).to_string())
                                .unwrap_or_else(|| name.clone());
                            (name, local)
                        }
                        _ => {
                            let name = syntax::compact_text(name_node, &parsed.source);
                            (name.clone(), name)
                        }
                    };
                    // `from . import sub` may name a submodule rather than an attribute.
                    if level > 0 && !module.is_empty() && !has_module_name(statement) {
                        bind(&local, format!("{module}.{name}"));
                    }
                    bind(&local, module.clone());
                }
            }
            _ => {}
        }
    }
    table
}

fn has_module_name(statement: TsNode<'_>) -> bool {
    statement
        .child_by_field_name("module_name")
        .is_some_and(|module| match module.kind() {
            "relative_import" => syntax::children(module)
                .iter()
                .any(|part| part.kind() == "dotted_name"),
            _ => true,
        })
}

/// Absolute module named by a `from` import, plus its relative level.
fn from_import_target(
    statement: TsNode<'_>,
    parsed: &ParsedSource,
    package: &[String],
) -> (String, usize) {
    let Some(module_node) = statement.child_by_field_name("module_name") else {
        return (String::new(), 0);
    };
    if module_node.kind() != "relative_import" {
        return (syntax::compact_text(module_node, &parsed.source), 0);
    }

    let mut level = 0;
    let mut module = String::new();
    for part in syntax::children(module_node) {
        match part.kind() {
            "import_prefix" => level = parsed.text(part).chars().filter(|c| *c == '.').count(),
            "dotted_name" => module = syntax::compact_text(part, &parsed.source),
            _ => {}
        }
    }

    let keep = package.len().saturating_sub(level.saturating_sub(1));
    let base = package[..keep].join(".");
    let target = match (base.is_empty(), module.is_empty()) {
        (false, false) => format!("{base}.{module}"),
        (false, true) => base,
        (true, _) => module,
    };
    (target, level)
}
