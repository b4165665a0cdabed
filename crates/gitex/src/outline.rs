#![forbid(unsafe_code)]

//! Signature and docstring outlines of a source file, optionally narrowed to one symbol.

use std::path::Path;

use tree_sitter::Node as TsNode;

use crate::error::{AnalysisError, Result};
use crate::namespace;
use crate::syntax::{self, ParsedSource};

const INDENT: &str = "    ";

/// A class or function header with its docstring and nested definitions.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OutlineEntry {
    decorators: Vec<String>,
    signature: String,
    docstring: Option<String>,
    children: Vec<OutlineEntry>,
}

impl OutlineEntry {
    fn is_documented(&self) -> bool {
        self.docstring.is_some() || self.children.iter().any(Self::is_documented)
    }

    fn render(&self, level: usize, include_undocumented: bool, out: &mut Vec<String>) {
        let indent = INDENT.repeat(level);
        for decorator in &self.decorators {
            out.push(format!("{indent}{decorator}"));
        }
        out.push(format!("{indent}{}", self.signature));
        if let Some(doc) = &self.docstring {
            out.push(quote_docstring(doc, &format!("{indent}{INDENT}")));
        }
        for child in &self.children {
            if include_undocumented || child.is_documented() {
                child.render(level + 1, include_undocumented, out);
            }
        }
    }
}

/// Outline of `path`, or of the definition named by `symbol_path` within it.
///
/// `symbol_path` may carry the module path as a prefix (`pkg.mod.Class.method`); the longest
/// prefix that matches the end of `path` is dropped before lookup.
pub fn extract_outline(
    path: &Path,
    symbol_path: Option<&str>,
    include_undocumented: bool,
) -> Result<String> {
    let mut parser = syntax::python_parser()?;
    let parsed = syntax::load_source(&mut parser, path, None)?;

    let symbol_parts = symbol_path
        .map(|symbol| strip_file_prefix(path, symbol))
        .unwrap_or_default();

    if symbol_parts.is_empty() {
        return Ok(outline_module(&parsed, include_undocumented));
    }

    let Some(target) = find_symbol(&parsed, &symbol_parts) else {
        return Err(AnalysisError::SymbolNotFound {
            path: path.to_path_buf(),
            symbol: symbol_path.unwrap_or_default().to_string(),
        });
    };

    let mut lines = Vec::new();
    // The requested symbol is shown even without a docstring.
    outline_entry(target, &parsed).render(0, include_undocumented, &mut lines);
    Ok(lines.join("\n"))
}

fn outline_module(parsed: &ParsedSource, include_undocumented: bool) -> String {
    let mut lines = Vec::new();
    if let Some(doc) = docstring(parsed.root(), parsed) {
        lines.push(quote_docstring(&doc, ""));
        lines.push(String::new());
    }
    for entry in definitions(parsed.root(), parsed) {
        if include_undocumented || entry.is_documented() {
            entry.render(0, include_undocumented, &mut lines);
        }
    }
    lines.join("\n")
}

fn strip_file_prefix(path: &Path, symbol: &str) -> Vec<String> {
    let parts: Vec<&str> = symbol.split('.').filter(|part| !part.is_empty()).collect();
    let file = namespace::display_path(path);

    let skip = (1..=parts.len())
        .rev()
        .find(|&count| {
            let candidate = format!("{}.py", parts[..count].join("/"));
            file == candidate || file.ends_with(&format!("/{candidate}"))
        })
        .unwrap_or(0);

    parts[skip..].iter().map(|part| (*part).to_string()).collect()
}

fn find_symbol<'p>(parsed: &'p ParsedSource, parts: &[String]) -> Option<TsNode<'p>> {
    let mut scope = parsed.root();
    let mut found = None;
    for part in parts {
        let def = statements(scope)
            .into_iter()
            .filter_map(syntax::unwrap_definition)
            .find(|def| syntax::definition_name(*def, &parsed.source).as_deref() == Some(part.as_str()))?;
        found = Some(def);
        scope = def.child_by_field_name("body")?;
    }
    found
}

/// Non-comment statements of a module or block.
fn statements(node: TsNode<'_>) -> Vec<TsNode<'_>> {
    syntax::named_children(node)
        .into_iter()
        .filter(|child| child.kind() != "comment")
        .collect()
}

fn definitions(scope: TsNode<'_>, parsed: &ParsedSource) -> Vec<OutlineEntry> {
    statements(scope)
        .into_iter()
        .filter_map(syntax::unwrap_definition)
        .map(|def| outline_entry(def, parsed))
        .collect()
}

fn outline_entry(def: TsNode<'_>, parsed: &ParsedSource) -> OutlineEntry {
    let decorators = def
        .parent()
        .filter(|parent| parent.kind() == "decorated_definition")
        .map(|parent| {
            syntax::named_children(parent)
                .into_iter()
                .filter(|child| child.kind() == "decorator")
                .map(|child| syntax::normalized_text(child, &parsed.source))
                .collect()
        })
        .unwrap_or_default();

    let body = def.child_by_field_name("body");
    let children = match (def.kind(), body) {
        ("class_definition", Some(body)) => definitions(body, parsed),
        _ => Vec::new(),
    };

    OutlineEntry {
        decorators,
        signature: signature(def, parsed),
        docstring: body.and_then(|body| docstring(body, parsed)),
        children,
    }
}

fn signature(def: TsNode<'_>, parsed: &ParsedSource) -> String {
    let name = syntax::definition_name(def, &parsed.source).unwrap_or_default();

    if def.kind() == "class_definition" {
        let bases = def
            .child_by_field_name("superclasses")
            .filter(|args| args.named_child_count() > 0)
            .map(|args| syntax::normalized_text(args, &parsed.source))
            .unwrap_or_default();
        return format!("class {name}{bases}:");
    }

    let is_async = syntax::children(def)
        .first()
        .is_some_and(|first| first.kind() == "async");
    let params = def
        .child_by_field_name("parameters")
        .map(|params| syntax::normalized_text(params, &parsed.source))
        .unwrap_or_else(|| "()".to_string());
    let returns = def
        .child_by_field_name("return_type")
        .map(|ret| format!(" -> {}", syntax::normalized_text(ret, &parsed.source)))
        .unwrap_or_default();
    let prefix = if is_async { "async def" } else { "def" };
    format!("{prefix} {name}{params}{returns}:")
}

/// Docstring of a module or block: a lone string literal as its first statement.
fn docstring(scope: TsNode<'_>, parsed: &ParsedSource) -> Option<String> {
    let first = statements(scope).into_iter().next()?;
    if first.kind() != "expression_statement" || first.named_child_count() != 1 {
        return None;
    }
    let literal = first.named_child(0)?;
    if literal.kind() != "string" {
        return None;
    }

    let raw = parsed.text(literal);
    let prefix_len = raw.find(['"', '\'']).unwrap_or(0);
    let prefix = raw[..prefix_len].to_ascii_lowercase();
    // f-strings and bytes are not docstrings.
    if prefix.contains('f') || prefix.contains('b') {
        return None;
    }
    let quoted = &raw[prefix_len..];
    let quote_len = if quoted.starts_with("\"\"\"") || quoted.starts_with("'''") {
        3
    } else {
        1
    };
    if quoted.len() < quote_len * 2 {
        return None;
    }
    let body = &quoted[quote_len..quoted.len() - quote_len];

    let cleaned = clean_docstring(body);
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Strips the common indentation of every line after the first and blank edges.
pub fn clean_docstring(raw: &str) -> String {
    let expanded = raw.replace('\t', "        ");
    let lines: Vec<&str> = expanded.lines().collect();

    let margin = lines
        .iter()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<String> = lines
        .iter()
        .enumerate()
        .map(|(idx, line)| {
            if idx == 0 {
                line.trim().to_string()
            } else if line.len() >= margin {
                line[margin..].trim_end().to_string()
            } else {
                line.trim().to_string()
            }
        })
        .collect();

    while cleaned.first().is_some_and(|line| line.is_empty()) {
        cleaned.remove(0);
    }
    while cleaned.last().is_some_and(|line| line.is_empty()) {
        cleaned.pop();
    }
    cleaned.join("\n")
}

fn quote_docstring(doc: &str, indent: &str) -> String {
    let body = doc
        .lines()
        .enumerate()
        .map(|(idx, line)| {
            if idx == 0 || line.is_empty() {
                line.to_string()
            } else {
                format!("{indent}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("{indent}\"\"\"{body}\"\"\"")
}
