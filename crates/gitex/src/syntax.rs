#![forbid(unsafe_code)]

//! Parser setup and tree helpers shared by the extractor, the slicer and the outliner.

use std::fs;
use std::path::Path;

use tree_sitter::{Node as TsNode, Parser, Tree};

use crate::error::{AnalysisError, Result};

pub fn python_language() -> tree_sitter::Language {
    tree_sitter::Language::new(tree_sitter_python::LANGUAGE)
}

pub fn python_parser() -> Result<Parser> {
    let mut parser = Parser::new();
    parser.set_language(&python_language())?;
    Ok(parser)
}

/// A decoded source file together with its syntax tree.
pub struct ParsedSource {
    pub source: String,
    pub tree: Tree,
}

impl ParsedSource {
    pub fn root(&self) -> TsNode<'_> {
        self.tree.root_node()
    }

    pub fn text(&self, node: TsNode<'_>) -> &str {
        node_text(node, &self.source)
    }
}

/// Reads `path` as UTF-8. Oversized files count as unreadable.
pub fn read_source(path: &Path, max_file_size: Option<u64>) -> Result<String> {
    let bytes = fs::read(path).map_err(|err| AnalysisError::FileUnreadable {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    if let Some(limit) = max_file_size
        && bytes.len() as u64 > limit
    {
        return Err(AnalysisError::FileUnreadable {
            path: path.to_path_buf(),
            reason: format!("{} bytes exceeds the {limit} byte limit", bytes.len()),
        });
    }

    String::from_utf8(bytes).map_err(|err| AnalysisError::FileUnreadable {
        path: path.to_path_buf(),
        reason: format!(
            "invalid UTF-8 after byte {}",
            err.utf8_error().valid_up_to()
        ),
    })
}

/// Parses `source`; any error or missing node makes the whole file unparsable.
pub fn parse_source(parser: &mut Parser, path: &Path, source: String) -> Result<ParsedSource> {
    let Some(tree) = parser.parse(&source, None) else {
        return Err(AnalysisError::FileUnparsable {
            path: path.to_path_buf(),
            line: 1,
        });
    };

    if tree.root_node().has_error() {
        let line = first_error_line(tree.root_node()).unwrap_or(1);
        return Err(AnalysisError::FileUnparsable {
            path: path.to_path_buf(),
            line,
        });
    }

    Ok(ParsedSource { source, tree })
}

pub fn load_source(
    parser: &mut Parser,
    path: &Path,
    max_file_size: Option<u64>,
) -> Result<ParsedSource> {
    let source = read_source(path, max_file_size)?;
    parse_source(parser, path, source)
}

fn first_error_line(root: TsNode<'_>) -> Option<usize> {
    descendants(root)
        .find(|node| node.is_error() || node.is_missing())
        .map(line_of)
}

/// Pre-order traversal driven by an explicit stack.
pub fn descendants<'tree>(root: TsNode<'tree>) -> impl Iterator<Item = TsNode<'tree>> {
    let mut stack = vec![root];
    std::iter::from_fn(move || {
        let node = stack.pop()?;
        stack.extend(children(node).into_iter().rev());
        Some(node)
    })
}

pub fn children(node: TsNode<'_>) -> Vec<TsNode<'_>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

pub fn named_children(node: TsNode<'_>) -> Vec<TsNode<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

pub fn children_by_field<'tree>(node: TsNode<'tree>, field: &str) -> Vec<TsNode<'tree>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

pub fn node_text<'s>(node: TsNode<'_>, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// Node text with all whitespace removed, for dotted names split across lines.
pub fn compact_text(node: TsNode<'_>, source: &str) -> String {
    node_text(node, source).split_whitespace().collect()
}

/// Node text with runs of whitespace collapsed to one space.
pub fn normalized_text(node: TsNode<'_>, source: &str) -> String {
    node_text(node, source)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn line_of(node: TsNode<'_>) -> usize {
    node.start_position().row + 1
}

pub fn definition_name(node: TsNode<'_>, source: &str) -> Option<String> {
    node.child_by_field_name("name")
        .map(|name| node_text(name, source).to_string())
}

/// The class or function behind `node`, looking through decorators.
pub fn unwrap_definition(node: TsNode<'_>) -> Option<TsNode<'_>> {
    match node.kind() {
        "class_definition" | "function_definition" => Some(node),
        "decorated_definition" => node
            .child_by_field_name("definition")
            .filter(|def| matches!(def.kind(), "class_definition" | "function_definition")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Result<ParsedSource> {
        let mut parser = python_parser()?;
        parse_source(&mut parser, Path::new("test.py"), source.to_string())
    }

    #[test]
    fn test_parse_valid_source() {
        let parsed = parse("def f():\n    return 1\n").unwrap();
        assert_eq!(parsed.root().kind(), "module");
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let err = parse("x = 1\ndef broken(:\n    pass\n").err().unwrap();
        match err {
            AnalysisError::FileUnparsable { line, .. } => assert!(line >= 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_descendants_is_preorder() {
        let parsed = parse("def a():\n    pass\ndef b():\n    pass\n").unwrap();
        let names: Vec<String> = descendants(parsed.root())
            .filter(|node| node.kind() == "function_definition")
            .filter_map(|node| definition_name(node, &parsed.source))
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_unwrap_decorated_definition() {
        let parsed = parse("@decorator\ndef wrapped():\n    pass\n").unwrap();
        let top = named_children(parsed.root());
        let def = unwrap_definition(top[0]).unwrap();
        assert_eq!(def.kind(), "function_definition");
        assert_eq!(definition_name(def, &parsed.source).as_deref(), Some("wrapped"));
    }

    #[test]
    fn test_invalid_utf8_is_unreadable() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("latin.py");
        fs::write(&path, [b'x', b'=', 0xff, 0xfe]).unwrap();

        let err = read_source(&path, None).unwrap_err();
        assert!(matches!(err, AnalysisError::FileUnreadable { .. }));
    }

    #[test]
    fn test_oversized_file_is_unreadable() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("big.py");
        fs::write(&path, "x = 1\n".repeat(10)).unwrap();

        assert!(read_source(&path, Some(1024)).is_ok());
        let err = read_source(&path, Some(8)).unwrap_err();
        assert!(matches!(err, AnalysisError::FileUnreadable { .. }));
    }
}
