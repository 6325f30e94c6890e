//! Wildcard pattern matching
//!
//! Exact patterns are compared with folded equality and never build a
//! matcher. Wildcard patterns compile to an anchored case-insensitive regex
//! with every metacharacter escaped except the wildcard tokens. Compilation
//! failure falls back to literal containment - the match path never errors.

use regex::{Regex, RegexBuilder};

use crate::pattern::{fold, Pattern, WILDCARD_ANY, WILDCARD_ONE};
use crate::types::{MatchResult, PatternError};

/// Upper bound on the compiled size of a single wildcard matcher.
const REGEX_SIZE_LIMIT: usize = 1 << 18;

// =============================================================================
// CompiledMatcher
// =============================================================================

/// A pattern compiled for repeated evaluation.
#[derive(Debug, Clone)]
pub enum CompiledMatcher {
    /// Folded equality - unambiguous exact semantics
    Exact(String),
    /// Anchored case-insensitive regex built from the wildcard pattern
    Wildcard(Regex),
    /// Fail-open fallback: containment of the folded pattern with wildcard
    /// tokens stripped
    Literal(String),
}

impl CompiledMatcher {
    /// Evaluate against an already-folded identifier.
    pub fn matches(&self, folded_identifier: &str) -> bool {
        match self {
            Self::Exact(folded) => folded_identifier == folded,
            Self::Wildcard(regex) => regex.is_match(folded_identifier),
            // An empty literal would match everything; prefer visibility.
            Self::Literal(literal) => {
                !literal.is_empty() && folded_identifier.contains(literal.as_str())
            }
        }
    }
}

// =============================================================================
// Compilation
// =============================================================================

/// Compile a pattern, falling back to literal containment if the matcher
/// cannot be built. Never fails.
pub fn compile(pattern: &Pattern) -> CompiledMatcher {
    match compile_checked(pattern) {
        Ok(matcher) => matcher,
        Err(err) => {
            log::warn!(
                "matcher for pattern {:?} failed to compile ({err}); falling back to literal containment",
                pattern.as_str()
            );
            CompiledMatcher::Literal(strip_wildcards(&pattern.folded()))
        }
    }
}

/// Compile a pattern, surfacing the failure. Used by import validation;
/// the match path goes through [`compile`] instead.
pub fn compile_checked(pattern: &Pattern) -> Result<CompiledMatcher, PatternError> {
    if !pattern.is_wildcard() {
        return Ok(CompiledMatcher::Exact(pattern.folded()));
    }

    let source = wildcard_to_regex(pattern.as_str());
    let regex = RegexBuilder::new(&source)
        .case_insensitive(true)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|err| PatternError::Compile(err.to_string()))?;
    Ok(CompiledMatcher::Wildcard(regex))
}

/// Map `*` to any-run and `?` to exactly-one, escaping every other
/// metacharacter, anchored at both ends.
fn wildcard_to_regex(pattern: &str) -> String {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    for ch in pattern.chars() {
        match ch {
            WILDCARD_ANY => source.push_str(".*"),
            WILDCARD_ONE => source.push('.'),
            ch if is_regex_meta(ch) => {
                source.push('\\');
                source.push(ch);
            }
            ch => source.push(ch),
        }
    }
    source.push('$');
    source
}

fn is_regex_meta(ch: char) -> bool {
    matches!(
        ch,
        '\\' | '.' | '+' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$' | '#' | '&' | '-'
            | '~'
    )
}

fn strip_wildcards(folded: &str) -> String {
    folded
        .chars()
        .filter(|&ch| ch != WILDCARD_ANY && ch != WILDCARD_ONE)
        .collect()
}

// =============================================================================
// Single evaluation
// =============================================================================

/// One-off evaluation of an identifier against a single pattern.
pub fn matches(identifier: &str, pattern: &Pattern) -> bool {
    compile(pattern).matches(&fold(identifier))
}

// =============================================================================
// PatternSet
// =============================================================================

/// An ordered pattern list compiled for repeated first-match evaluation.
#[derive(Debug, Default)]
pub struct PatternSet {
    entries: Vec<(Pattern, CompiledMatcher)>,
}

impl PatternSet {
    pub fn new(patterns: Vec<Pattern>) -> Self {
        let entries = patterns
            .into_iter()
            .map(|pattern| {
                let matcher = compile(&pattern);
                (pattern, matcher)
            })
            .collect();
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &Pattern> {
        self.entries.iter().map(|(pattern, _)| pattern)
    }

    /// Evaluate patterns in stored order; the earliest-inserted match wins.
    pub fn first_match(&self, identifier: &str) -> MatchResult {
        let folded = fold(identifier);
        for (pattern, matcher) in &self.entries {
            if matcher.matches(&folded) {
                return MatchResult::hit(pattern.clone());
            }
        }
        MatchResult::miss()
    }
}
