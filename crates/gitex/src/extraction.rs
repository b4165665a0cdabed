#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use tree_sitter::{Node as TsNode, Parser};

use crate::config::AnalyzerConfig;
use crate::error::{AnalysisError, Result};
use crate::namespace::{self, ProjectModules};
use crate::resolution;
use crate::syntax::{self, ParsedSource};
use crate::types::{
    CalleeToken, ClassEntity, DependencyAnalysis, Diagnostic, FunctionEntity, ImportRecord,
    ParseStatus, SourceFile,
};

/// Receiver name that refers to the current instance inside a method body.
const SELF_RECEIVER: &str = "self";

#[derive(Debug, Clone)]
struct Candidate {
    rel: String,
    abs: PathBuf,
    module: String,
}

/// Everything pulled out of one file, before cross-file resolution.
#[derive(Debug, Clone)]
pub struct FileExtraction {
    pub file: SourceFile,
    pub imports: Vec<ImportRecord>,
    pub classes: Vec<ClassEntity>,
    pub functions: Vec<FunctionEntity>,
    pub diagnostic: Option<Diagnostic>,
}

/// Analyzes `files` under `root`: namespace set, per-file extraction, then resolution.
///
/// Files outside `root` or without the configured extension are ignored. A file that cannot be
/// read or parsed is kept with its status and a diagnostic; it contributes no entities.
pub fn analyze(
    root: &Path,
    files: &[PathBuf],
    config: &AnalyzerConfig,
) -> Result<DependencyAnalysis> {
    let start = Instant::now();
    // Fail early on a grammar/ABI mismatch instead of once per file.
    syntax::python_parser()?;

    let candidates = collect_candidates(root, files, config);
    let modules = ProjectModules::build(root, files, config);
    debug!(
        files = candidates.len(),
        modules = modules.len(),
        "built project namespace"
    );

    let extractions: Vec<FileExtraction> = if config.parallel {
        candidates
            .par_iter()
            .map_init(syntax::python_parser, |parser, candidate| {
                extract_candidate(parser, candidate, &modules, config)
            })
            .collect()
    } else {
        let mut parser = syntax::python_parser();
        candidates
            .iter()
            .map(|candidate| extract_candidate(&mut parser, candidate, &modules, config))
            .collect()
    };

    let mut analysis = merge_extractions(extractions);
    let stats = resolution::resolve_relationships(&mut analysis);

    info!(
        files = analysis.files.len(),
        failed = analysis.diagnostics.len(),
        classes = analysis.classes.len(),
        functions = analysis.functions.len(),
        inheritance_edges = stats.inheritance_edges,
        call_edges = stats.call_edges,
        duration_ms = start.elapsed().as_millis() as u64,
        "dependency analysis complete"
    );
    Ok(analysis)
}

fn collect_candidates(root: &Path, files: &[PathBuf], config: &AnalyzerConfig) -> Vec<Candidate> {
    let mut by_path = BTreeMap::new();
    for file in files {
        if !config.is_source_file(file) {
            continue;
        }
        let Some(rel) = namespace::relative_to_root(root, file) else {
            debug!(file = %file.display(), "skipping file outside analysis root");
            continue;
        };
        let located = if file.is_absolute() || file.starts_with(root) {
            file.clone()
        } else {
            root.join(&rel)
        };
        let abs = std::path::absolute(&located).unwrap_or(located);
        let module = namespace::module_name(&rel, &config.package_marker);
        let rel = namespace::display_path(&rel);
        by_path
            .entry(rel.clone())
            .or_insert(Candidate { rel, abs, module });
    }
    by_path.into_values().collect()
}

fn extract_candidate(
    parser: &mut Result<Parser>,
    candidate: &Candidate,
    modules: &ProjectModules,
    config: &AnalyzerConfig,
) -> FileExtraction {
    let parsed = match parser {
        Ok(parser) => syntax::load_source(parser, &candidate.abs, Some(config.max_file_size)),
        Err(err) => Err(AnalysisError::FileUnreadable {
            path: candidate.abs.clone(),
            reason: format!("python parser unavailable: {err}"),
        }),
    };

    let mut file = SourceFile {
        path: candidate.rel.clone(),
        absolute_path: candidate.abs.clone(),
        module: candidate.module.clone(),
        status: ParseStatus::Ok,
    };

    match parsed {
        Ok(parsed) => {
            let (imports, classes, functions) = extract_parsed(&candidate.rel, &parsed, modules);
            FileExtraction {
                file,
                imports,
                classes,
                functions,
                diagnostic: None,
            }
        }
        Err(err) => {
            warn!(file = %candidate.rel, error = %err, "skipping file");
            file.status = match err {
                AnalysisError::FileUnparsable { .. } => ParseStatus::Unparsable,
                _ => ParseStatus::Unreadable,
            };
            let mut diagnostic = Diagnostic::from(&err);
            diagnostic.path = candidate.rel.clone();
            FileExtraction {
                file,
                imports: Vec::new(),
                classes: Vec::new(),
                functions: Vec::new(),
                diagnostic: Some(diagnostic),
            }
        }
    }
}

/// Extracts entities from an already parsed file.
pub fn extract_parsed(
    file_path: &str,
    parsed: &ParsedSource,
    modules: &ProjectModules,
) -> (Vec<ImportRecord>, Vec<ClassEntity>, Vec<FunctionEntity>) {
    let mut extractor = FileExtractor::new(file_path, &parsed.source, modules);
    extractor.run(parsed.root());
    extractor.finish()
}

fn merge_extractions(extractions: Vec<FileExtraction>) -> DependencyAnalysis {
    let mut analysis = DependencyAnalysis::default();

    for extraction in extractions {
        if extraction.file.status == ParseStatus::Ok {
            let internal: BTreeSet<String> = extraction
                .imports
                .iter()
                .filter(|import| !import.is_external)
                .map(|import| import.module.clone())
                .collect();
            if !internal.is_empty() {
                analysis
                    .file_dependencies
                    .insert(extraction.file.path.clone(), internal);
            }
            analysis
                .imports
                .insert(extraction.file.path.clone(), extraction.imports);
        }
        analysis.classes.extend(extraction.classes);
        analysis.functions.extend(extraction.functions);
        analysis.diagnostics.extend(extraction.diagnostic);
        analysis.files.push(extraction.file);
    }

    analysis.files.sort_by(|a, b| a.path.cmp(&b.path));
    analysis
        .classes
        .sort_by(|a, b| (&a.file_path, &a.name).cmp(&(&b.file_path, &b.name)));
    analysis.functions.sort_by(|a, b| {
        (&a.file_path, a.display_name()).cmp(&(&b.file_path, b.display_name()))
    });
    analysis
}

/// Worklist walk over one syntax tree.
struct FileExtractor<'a> {
    file_path: &'a str,
    source: &'a str,
    modules: &'a ProjectModules,
    imports: Vec<ImportRecord>,
    /// Keyed by qualified name so a later declaration replaces an earlier one.
    classes: BTreeMap<String, ClassEntity>,
    functions: BTreeMap<String, FunctionEntity>,
}

impl<'a> FileExtractor<'a> {
    fn new(file_path: &'a str, source: &'a str, modules: &'a ProjectModules) -> Self {
        Self {
            file_path,
            source,
            modules,
            imports: Vec::new(),
            classes: BTreeMap::new(),
            functions: BTreeMap::new(),
        }
    }

    fn finish(self) -> (Vec<ImportRecord>, Vec<ClassEntity>, Vec<FunctionEntity>) {
        (
            self.imports,
            self.classes.into_values().collect(),
            self.functions.into_values().collect(),
        )
    }

    fn run(&mut self, root: TsNode<'_>) {
        let mut stack: Vec<(TsNode<'_>, Option<String>)> = vec![(root, None)];

        while let Some((node, class_name)) = stack.pop() {
            let mut child_class = class_name.clone();
            match node.kind() {
                "import_statement" => {
                    self.add_plain_import(node);
                    continue;
                }
                "import_from_statement" => {
                    self.add_from_import(node);
                    continue;
                }
                "class_definition" => {
                    if let Some(name) = self.add_class(node) {
                        child_class = Some(name);
                    }
                }
                "function_definition" => self.add_function(node, class_name.as_deref()),
                _ => {}
            }

            for child in syntax::children(node).into_iter().rev() {
                stack.push((child, child_class.clone()));
            }
        }
    }

    fn text(&self, node: TsNode<'_>) -> &'a str {
        syntax::node_text(node, self.source)
    }

    fn add_plain_import(&mut self, node: TsNode<'_>) {
        let line = syntax::line_of(node);
        for name_node in syntax::children_by_field(node, "name") {
            let (module, alias) = match name_node.kind() {
                "aliased_import" => (
                    name_node
                        .child_by_field_name("name")
                        .map(|n| syntax::compact_text(n, self.source)),
                    name_node
                        .child_by_field_name("alias")
                        .map(|n| self.text(n).to_string()),
                ),
                _ => (Some(syntax::compact_text(name_node, self.source)), None),
            };
            let Some(module) = module.filter(|m| !m.is_empty()) else {
                continue;
            };

            self.imports.push(ImportRecord {
                file_path: self.file_path.to_string(),
                is_external: self.modules.is_external(&module),
                module,
                alias,
                imported_names: Vec::new(),
                is_from_import: false,
                level: 0,
                line,
            });
        }
    }

    fn add_from_import(&mut self, node: TsNode<'_>) {
        let Some(module_node) = node.child_by_field_name("module_name") else {
            return;
        };
        let (module, level) = match module_node.kind() {
            "relative_import" => {
                let mut level = 0;
                let mut module = None;
                for part in syntax::children(module_node) {
                    match part.kind() {
                        "import_prefix" => {
                            level = self.text(part).chars().filter(|c| *c == '.').count();
                        }
                        "dotted_name" => module = Some(syntax::compact_text(part, self.source)),
                        _ => {}
                    }
                }
                (module, level)
            }
            _ => (Some(syntax::compact_text(module_node, self.source)), 0),
        };
        // `from . import x` names no module of its own.
        let Some(module) = module.filter(|m| !m.is_empty()) else {
            return;
        };

        let mut imported_names: Vec<String> = syntax::children_by_field(node, "name")
            .into_iter()
            .filter_map(|name_node| match name_node.kind() {
                "aliased_import" => name_node
                    .child_by_field_name("name")
                    .map(|n| syntax::compact_text(n, self.source)),
                _ => Some(syntax::compact_text(name_node, self.source)),
            })
            .collect();
        if syntax::children(node)
            .iter()
            .any(|child| child.kind() == "wildcard_import")
        {
            imported_names.push("*".to_string());
        }

        self.imports.push(ImportRecord {
            file_path: self.file_path.to_string(),
            is_external: self.modules.is_external(&module),
            module,
            alias: None,
            imported_names,
            is_from_import: true,
            level,
            line: syntax::line_of(node),
        });
    }

    fn add_class(&mut self, node: TsNode<'_>) -> Option<String> {
        let name = syntax::definition_name(node, self.source)?;

        let bases = node
            .child_by_field_name("superclasses")
            .map(|args| {
                syntax::named_children(args)
                    .into_iter()
                    .filter(|base| matches!(base.kind(), "identifier" | "attribute"))
                    .map(|base| syntax::compact_text(base, self.source))
                    .collect()
            })
            .unwrap_or_default();

        let methods = node
            .child_by_field_name("body")
            .map(|body| {
                syntax::named_children(body)
                    .into_iter()
                    .filter_map(syntax::unwrap_definition)
                    .filter(|def| def.kind() == "function_definition")
                    .filter_map(|def| syntax::definition_name(def, self.source))
                    .collect()
            })
            .unwrap_or_default();

        self.classes.insert(
            name.clone(),
            ClassEntity {
                key: ClassEntity::qualified_key(self.file_path, &name),
                name: name.clone(),
                file_path: self.file_path.to_string(),
                bases,
                methods,
                line: syntax::line_of(node),
            },
        );
        Some(name)
    }

    fn add_function(&mut self, node: TsNode<'_>, class_name: Option<&str>) {
        let Some(name) = syntax::definition_name(node, self.source) else {
            return;
        };

        let calls = syntax::descendants(node)
            .filter(|child| child.kind() == "call")
            .filter_map(|call| self.callee_token(call, class_name))
            .collect();

        self.functions.insert(
            FunctionEntity::qualified_name(class_name, &name),
            FunctionEntity {
                key: FunctionEntity::qualified_key(self.file_path, class_name, &name),
                name,
                file_path: self.file_path.to_string(),
                class_name: class_name.map(str::to_string),
                calls,
                called_by: Vec::new(),
                line: syntax::line_of(node),
            },
        );
    }

    fn callee_token(&self, call: TsNode<'_>, class_name: Option<&str>) -> Option<CalleeToken> {
        let function = call.child_by_field_name("function")?;
        match function.kind() {
            "identifier" => Some(CalleeToken::bare(self.text(function))),
            "attribute" => {
                let receiver = function.child_by_field_name("object")?;
                let member = function.child_by_field_name("attribute")?;
                if receiver.kind() != "identifier" {
                    return None;
                }
                let receiver = self.text(receiver);
                let member = self.text(member);
                if receiver == SELF_RECEIVER && class_name.is_some() {
                    Some(CalleeToken::on_self(member))
                } else {
                    Some(CalleeToken::bare(format!("{receiver}.{member}")))
                }
            }
            _ => None,
        }
    }
}

/// Source files under `root`, absolute and sorted, honoring the exclude globs.
pub fn scan_directory(root: &Path, config: &AnalyzerConfig) -> Vec<PathBuf> {
    let excludes = build_globset(&config.exclude);
    let mut files = Vec::new();

    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!(dir = %dir.display(), error = %err, "cannot list directory");
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(rel_path) = path.strip_prefix(root) else {
                continue;
            };
            let rel_str = namespace::display_path(rel_path);
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            if file_type.is_symlink() {
                continue;
            }
            if file_type.is_dir() {
                let dir_pattern = format!("{rel_str}/");
                if excludes.is_match(&dir_pattern) || excludes.is_match(format!("{rel_str}/x")) {
                    continue;
                }
                stack.push(path);
            } else if file_type.is_file()
                && config.is_source_file(&path)
                && !excludes.is_match(&rel_str)
            {
                files.push(path);
            }
        }
    }

    files.sort();
    files
}

fn build_globset(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(err) => warn!(pattern = %pattern, error = %err, "ignoring invalid exclude pattern"),
        }
    }
    builder.build().unwrap_or_else(|err| {
        warn!(error = %err, "exclude patterns unusable, scanning everything");
        GlobSet::empty()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(source: &str) -> (Vec<ImportRecord>, Vec<ClassEntity>, Vec<FunctionEntity>) {
        let mut modules = ProjectModules::default();
        modules.insert_module("pkg.models");
        let mut parser = syntax::python_parser().unwrap();
        let parsed =
            syntax::parse_source(&mut parser, Path::new("app.py"), source.to_string()).unwrap();
        extract_parsed("app.py", &parsed, &modules)
    }

    #[test]
    fn test_plain_import_one_record_per_name() {
        let (imports, _, _) = extract("import os, pkg.models as m\n");
        assert_eq!(imports.len(), 2);
        assert_eq!(imports[0].module, "os");
        assert!(imports[0].is_external);
        assert_eq!(imports[1].module, "pkg.models");
        assert_eq!(imports[1].alias.as_deref(), Some("m"));
        assert!(!imports[1].is_external);
    }

    #[test]
    fn test_from_import_single_record() {
        let (imports, _, _) = extract("from pkg.models import User, Group as G\n");
        assert_eq!(imports.len(), 1);
        assert!(imports[0].is_from_import);
        assert_eq!(imports[0].imported_names, vec!["User", "Group"]);
        assert!(!imports[0].is_external);
        assert_eq!(imports[0].line, 1);
    }

    #[test]
    fn test_relative_imports() {
        let (imports, _, _) = extract("from . import sibling\nfrom ..pkg import models\n");
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].module, "pkg");
        assert_eq!(imports[0].level, 2);
        assert!(!imports[0].is_external);
    }

    #[test]
    fn test_wildcard_import() {
        let (imports, _, _) = extract("from os.path import *\n");
        assert_eq!(imports[0].imported_names, vec!["*"]);
    }

    #[test]
    fn test_class_bases_and_methods() {
        let source = "\
class Dog(Animal, zoo.Pet, metaclass=Meta):
    def bark(self):
        pass

    @property
    def name(self):
        return 'rex'

    class Inner:
        def hidden(self):
            pass
";
        let (_, classes, functions) = extract(source);
        let dog = classes.iter().find(|c| c.name == "Dog").unwrap();
        assert_eq!(dog.key, "app.py::Dog");
        assert_eq!(dog.bases, vec!["Animal", "zoo.Pet"]);
        assert_eq!(dog.methods, vec!["bark", "name"]);
        assert!(classes.iter().any(|c| c.key == "app.py::Inner"));

        let hidden = functions.iter().find(|f| f.name == "hidden").unwrap();
        assert_eq!(hidden.class_name.as_deref(), Some("Inner"));
        assert_eq!(hidden.key, "app.py::Inner.hidden");
    }

    #[test]
    fn test_call_tokens_cover_whole_body() {
        let source = "\
class Service:
    def run(self):
        if ready():
            for item in self.items():
                log.info(item)
        helper()
        make()()
";
        let (_, _, functions) = extract(source);
        let run = functions.iter().find(|f| f.name == "run").unwrap();
        let tokens: Vec<String> = run.calls.iter().map(ToString::to_string).collect();
        assert_eq!(tokens, vec!["ready", "self.items", "log.info", "helper", "make"]);
        assert!(run.calls[1].via_self);
        assert_eq!(run.calls[1].name, "items");
    }

    #[test]
    fn test_self_outside_class_is_plain_attribute() {
        let (_, _, functions) = extract("def f(self):\n    self.go()\n");
        assert_eq!(functions[0].calls, vec![CalleeToken::bare("self.go")]);
    }

    #[test]
    fn test_later_declaration_overwrites() {
        let (_, classes, functions) =
            extract("class A:\n    pass\nclass A(Base):\n    pass\ndef f():\n    pass\ndef f():\n    g()\n");
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].bases, vec!["Base"]);
        assert_eq!(classes[0].line, 3);
        assert_eq!(functions.len(), 1);
        assert_eq!(functions[0].calls, vec![CalleeToken::bare("g")]);
    }

    #[test]
    fn test_nested_function_keeps_enclosing_class() {
        let source = "\
class C:
    def outer(self):
        def inner():
            work()
        return inner
";
        let (_, _, functions) = extract(source);
        let keys: Vec<&str> = functions.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["app.py::C.inner", "app.py::C.outer"]);
        let outer = functions.iter().find(|f| f.name == "outer").unwrap();
        assert_eq!(outer.calls, vec![CalleeToken::bare("work")]);
    }
}
