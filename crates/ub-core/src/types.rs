//! Core type definitions for UserBlocker
//!
//! These types are shared between the matcher, the store, and the
//! reconciliation engine.

use crate::pattern::Pattern;

// =============================================================================
// Pattern Classification
// =============================================================================

/// Classification of a stored pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatternKind {
    /// No wildcard tokens - compared with exact case-insensitive equality
    Exact,
    /// Contains `*` or `?` - compiled to a matcher
    Wildcard,
}

// =============================================================================
// Match Result
// =============================================================================

/// Result of evaluating an identifier against the pattern list.
///
/// Carries the winning pattern so callers can surface it (placeholder
/// transparency text names the wildcard that hid a comment).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Did any pattern match?
    pub matched: bool,
    /// The earliest-inserted pattern that matched, if any
    pub pattern: Option<Pattern>,
}

impl MatchResult {
    /// A hit on the given pattern.
    pub fn hit(pattern: Pattern) -> Self {
        Self {
            matched: true,
            pattern: Some(pattern),
        }
    }

    /// No pattern matched.
    pub fn miss() -> Self {
        Self {
            matched: false,
            pattern: None,
        }
    }
}

impl Default for MatchResult {
    fn default() -> Self {
        Self::miss()
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Validation and compilation errors for a single pattern.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatternError {
    #[error("pattern is empty after normalization")]
    Empty,
    #[error("pattern is malformed: {0}")]
    Malformed(&'static str),
    #[error("pattern failed to compile: {0}")]
    Compile(String),
}
