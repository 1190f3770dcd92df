//! Condition evaluation against the current event.
//!
//! Each axis (branch, tag, changed paths) is checked independently and every
//! axis must pass. Within an axis include patterns are OR'd and exclude
//! patterns are AND-NOT'd; an empty include list matches everything. Patterns
//! use `glob` syntax where `*` stays within one path segment and `**` crosses
//! segments.

use conductor_config::ConditionSpec;
use glob::{MatchOptions, Pattern};
use tracing::{trace, warn};

use crate::context::EventFacts;

const CONDITION_TARGET: &str = "conductor_handlers::condition";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Decides whether a handler runs for `facts`.
///
/// An absent condition always passes.
#[must_use]
pub fn check(condition: Option<&ConditionSpec>, facts: &EventFacts) -> bool {
    let Some(spec) = condition else {
        return true;
    };
    let branch = axis_passes(spec.branches(), spec.branches_ignore(), facts.branch());
    let tag = axis_passes(spec.tags(), spec.tags_ignore(), facts.tag());
    let paths = paths_pass(spec, &facts.changed_paths);
    trace!(
        target: CONDITION_TARGET,
        event = %facts.name,
        branch,
        tag,
        paths,
        "condition evaluated"
    );
    branch && tag && paths
}

fn axis_passes(include: &[String], exclude: &[String], value: Option<&str>) -> bool {
    if include.is_empty() && exclude.is_empty() {
        return true;
    }
    let Some(candidate) = value else {
        return include.is_empty();
    };
    passes(include, exclude, candidate)
}

fn paths_pass(spec: &ConditionSpec, changed: &[String]) -> bool {
    if spec.paths().is_empty() && (spec.paths_ignore().is_empty() || changed.is_empty()) {
        return true;
    }
    changed
        .iter()
        .any(|path| passes(spec.paths(), spec.paths_ignore(), path))
}

fn passes(include: &[String], exclude: &[String], candidate: &str) -> bool {
    let included = include.is_empty() || include.iter().any(|p| matches(p, candidate));
    included && !exclude.iter().any(|p| matches(p, candidate))
}

fn matches(pattern: &str, candidate: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(compiled) => compiled.matches_with(candidate, MATCH_OPTIONS),
        Err(err) => {
            warn!(
                target: CONDITION_TARGET,
                pattern,
                error = %err,
                "invalid glob pattern never matches"
            );
            false
        }
    }
}
