#![forbid(unsafe_code)]

//! Heuristic cross-file resolution of base classes and call targets.
//!
//! Matching is purely syntactic: names are compared as text, with no model of shadowing,
//! overloads, imports in scope, or receiver types. Edges are therefore approximate; a missing
//! edge usually means an external or builtin target, and a present edge is a best guess.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{
    CallEdge, CalleeToken, ClassEntity, DependencyAnalysis, FunctionEntity, InheritanceEdge,
};

/// Call matching rules, tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallRule {
    /// Same file, same owning class (or both top level), same name.
    SameScope,
    /// Same file, neither side inside a class, same name.
    SameFileTopLevel,
    /// Another file, candidate key ends in `::<token>`.
    CrossFileSuffix,
}

impl CallRule {
    pub const ORDERED: [Self; 3] = [
        Self::SameScope,
        Self::SameFileTopLevel,
        Self::CrossFileSuffix,
    ];

    /// `self.<name>` calls stay inside their class and never fall through to other files.
    pub fn accepts(self, token: &CalleeToken) -> bool {
        !token.via_self || self == Self::SameScope
    }

    pub fn matches(
        self,
        caller: &FunctionEntity,
        token: &CalleeToken,
        candidate: &FunctionEntity,
    ) -> bool {
        let same_file = caller.file_path == candidate.file_path;
        match self {
            Self::SameScope => {
                same_file && caller.class_name == candidate.class_name && candidate.name == token.name
            }
            Self::SameFileTopLevel => {
                same_file
                    && caller.class_name.is_none()
                    && candidate.class_name.is_none()
                    && candidate.name == token.name
            }
            Self::CrossFileSuffix => {
                !same_file && candidate.key.ends_with(&format!("::{}", token.name))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub inheritance_edges: usize,
    pub call_edges: usize,
    pub unresolved_bases: usize,
    pub unresolved_calls: usize,
}

/// Index of the first class in enumeration order that `token` names.
pub fn resolve_base(token: &str, classes: &[ClassEntity]) -> Option<usize> {
    let suffix = format!(".{token}");
    classes
        .iter()
        .position(|class| class.name == token || class.key.ends_with(&suffix))
}

/// First rule with a match wins; within a rule, the first candidate in enumeration order.
pub fn resolve_call(
    caller: &FunctionEntity,
    token: &CalleeToken,
    functions: &[FunctionEntity],
) -> Option<(CallRule, usize)> {
    CallRule::ORDERED
        .into_iter()
        .filter(|rule| rule.accepts(token))
        .find_map(|rule| {
            functions
                .iter()
                .position(|candidate| rule.matches(caller, token, candidate))
                .map(|idx| (rule, idx))
        })
}

/// Fills the inheritance and call edges of `analysis` and the callers of each function.
///
/// Expects `classes` and `functions` sorted by file path, then qualified name, so that ties
/// always break the same way.
pub fn resolve_relationships(analysis: &mut DependencyAnalysis) -> ResolveStats {
    let mut stats = ResolveStats::default();

    let mut inheritance_edges = BTreeSet::new();
    let mut seen_bases = HashSet::new();
    for class in &analysis.classes {
        for token in &class.bases {
            if !seen_bases.insert((token.as_str(), class.key.as_str())) {
                continue;
            }
            match resolve_base(token, &analysis.classes) {
                Some(idx) => {
                    inheritance_edges.insert(InheritanceEdge {
                        base: analysis.classes[idx].key.clone(),
                        derived: class.key.clone(),
                        token: token.clone(),
                    });
                }
                None => stats.unresolved_bases += 1,
            }
        }
    }

    let mut call_edges = BTreeSet::new();
    let mut callers: Vec<Vec<String>> = vec![Vec::new(); analysis.functions.len()];
    for caller in &analysis.functions {
        for token in &caller.calls {
            let Some((rule, idx)) = resolve_call(caller, token, &analysis.functions) else {
                stats.unresolved_calls += 1;
                continue;
            };
            let edge = CallEdge {
                caller: caller.key.clone(),
                callee: analysis.functions[idx].key.clone(),
            };
            if call_edges.insert(edge) {
                debug!(caller = %caller.key, callee = %analysis.functions[idx].key, ?rule, "resolved call");
                callers[idx].push(caller.key.clone());
            }
        }
    }

    for (func, found) in analysis.functions.iter_mut().zip(callers) {
        func.called_by = found;
    }

    stats.inheritance_edges = inheritance_edges.len();
    stats.call_edges = call_edges.len();
    analysis.inheritance_edges = inheritance_edges;
    analysis.call_edges = call_edges;
    stats
}
