//! Matched-chain resolution.
//!
//! Every navigation resolves its target path **once** into the ordered chain
//! of records it matched, root first. Plugins diff these chains instead of
//! re-walking the route tree: keep-alive adds the target chain on forward
//! navigation and drops origin-only records on backward navigation.
//!
//! # Example
//!
//! Given routes:
//! ```text
//! /              (root layout)
//!   dashboard    (has children)
//!     ""         (index → overview)
//!     :id        (param leaf)
//! ```
//!
//! `/dashboard/42` resolves to `["/", "dashboard", ":id"]` with `id = 42`,
//! and `/dashboard` resolves to `["/", "dashboard", ""]`.

use crate::params::RouteParams;
use crate::route::RouteRecord;
use std::rc::Rc;

/// Maximum nesting depth to prevent infinite recursion
const MAX_DEPTH: usize = 16;

/// Result of resolving a path against the route tree.
#[derive(Debug, Clone, Default)]
pub struct MatchedChain {
    /// Matched records, root first.
    pub records: Vec<Rc<RouteRecord>>,
    /// Params accumulated over the whole chain.
    pub params: RouteParams,
}

impl MatchedChain {
    /// Check if nothing matched
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Name of the deepest named record
    pub fn name(&self) -> Option<String> {
        self.records
            .iter()
            .rev()
            .find_map(|r| r.route_name().map(str::to_string))
    }
}

/// Resolve the matched chain for a normalized `path`.
///
/// Returns an empty chain when no route matches.
pub fn resolve_matched(routes: &[Rc<RouteRecord>], path: &str) -> MatchedChain {
    let trimmed = path.trim_matches('/');
    let segments: Vec<&str> = if trimmed.is_empty() {
        vec![]
    } else {
        trimmed.split('/').collect()
    };

    let mut chain = MatchedChain::default();
    if !resolve_recursive(routes, &segments, 0, &RouteParams::new(), &mut chain) {
        chain = MatchedChain::default();
    }

    crate::trace_log!(
        "Resolved '{}' → [{}]",
        path,
        chain
            .records
            .iter()
            .map(|r| format!("\"{}\"", r.path()))
            .collect::<Vec<_>>()
            .join(" → ")
    );

    chain
}

fn resolve_recursive(
    routes: &[Rc<RouteRecord>],
    remaining: &[&str],
    depth: usize,
    inherited: &RouteParams,
    chain: &mut MatchedChain,
) -> bool {
    if depth >= MAX_DEPTH {
        crate::warn_log!(
            "Maximum route nesting depth ({}) exceeded. Check for circular routes.",
            MAX_DEPTH
        );
        return false;
    }

    for record in routes {
        let pattern = record.path().trim_matches('/');
        let pattern_segments: Vec<&str> = if pattern.is_empty() {
            vec![]
        } else {
            pattern.split('/').collect()
        };

        // Empty-path record: index route when nothing remains, layout otherwise
        if pattern_segments.is_empty() {
            if remaining.is_empty() {
                chain.records.push(Rc::clone(record));
                chain.params = inherited.clone();
                try_index_route(record.child_records(), depth + 1, chain);
                return true;
            }

            if !record.child_records().is_empty() {
                chain.records.push(Rc::clone(record));
                if resolve_recursive(record.child_records(), remaining, depth + 1, inherited, chain)
                {
                    return true;
                }
                chain.records.pop();
            }
            continue;
        }

        if pattern_segments.len() > remaining.len() {
            continue;
        }

        let Some(params) = match_segments(&pattern_segments, remaining, inherited) else {
            continue;
        };

        let after = &remaining[pattern_segments.len()..];
        chain.records.push(Rc::clone(record));

        if after.is_empty() {
            chain.params = params;
            try_index_route(record.child_records(), depth + 1, chain);
            return true;
        }

        if resolve_recursive(record.child_records(), after, depth + 1, &params, chain) {
            return true;
        }

        chain.records.pop();
    }

    false
}

/// Match pattern segments against the head of `remaining`, extending `inherited`.
fn match_segments(
    pattern: &[&str],
    remaining: &[&str],
    inherited: &RouteParams,
) -> Option<RouteParams> {
    let mut params = inherited.clone();
    for (segment, value) in pattern.iter().zip(remaining) {
        if let Some(name) = segment.strip_prefix(':') {
            params.insert(name, *value);
        } else if segment != value {
            return None;
        }
    }
    Some(params)
}

/// Append the index (empty-path) child, and its own index chain, if present.
fn try_index_route(children: &[Rc<RouteRecord>], depth: usize, chain: &mut MatchedChain) {
    if depth >= MAX_DEPTH {
        return;
    }
    if let Some(index) = children
        .iter()
        .find(|c| c.path().trim_matches('/').is_empty())
    {
        chain.records.push(Rc::clone(index));
        try_index_route(index.child_records(), depth + 1, chain);
    }
}
