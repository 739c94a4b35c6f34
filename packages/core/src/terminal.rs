//! Terminal event detection.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Predicate deciding whether an event type ends a task's streams.
pub type TerminalPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Decides which event types signal job completion or failure.
///
/// Connections watching a task close once a terminal event for that task is
/// delivered to them.
#[derive(Clone)]
pub enum TerminalPolicy {
    /// A closed set of event types.
    Types(HashSet<String>),
    /// A caller-supplied predicate.
    Predicate(TerminalPredicate),
}

impl TerminalPolicy {
    /// Build a policy from a list of event types.
    pub fn types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Types(types.into_iter().map(Into::into).collect())
    }

    /// Build a policy from a predicate.
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(f))
    }

    /// A policy under which no event is terminal.
    pub fn never() -> Self {
        Self::Types(HashSet::new())
    }

    pub fn is_terminal(&self, event_type: &str) -> bool {
        match self {
            TerminalPolicy::Types(types) => types.contains(event_type),
            TerminalPolicy::Predicate(f) => f(event_type),
        }
    }
}

impl fmt::Debug for TerminalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalPolicy::Types(types) => {
                let mut sorted: Vec<_> = types.iter().collect();
                sorted.sort();
                f.debug_tuple("Types").field(&sorted).finish()
            }
            TerminalPolicy::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_set_matches_exactly() {
        let policy = TerminalPolicy::types(["completed", "failed"]);
        assert!(policy.is_terminal("completed"));
        assert!(policy.is_terminal("failed"));
        assert!(!policy.is_terminal("progress"));
        assert!(!policy.is_terminal("Completed"));
    }

    #[test]
    fn predicate_is_consulted() {
        let policy = TerminalPolicy::predicate(|t| t.ends_with(".done"));
        assert!(policy.is_terminal("training.done"));
        assert!(!policy.is_terminal("training.step"));
    }

    #[test]
    fn never_matches_nothing() {
        assert!(!TerminalPolicy::never().is_terminal("completed"));
    }
}
