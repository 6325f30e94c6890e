//! Pattern normalization and the ordered block list
//!
//! A pattern is stored exactly as the user wrote it modulo normalization:
//! trimmed, percent-decoded when the decoding is safely reversible, and
//! NFC-canonicalized. Case is preserved in storage; dedup, lookup, and exact
//! matching all go through [`fold`].

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

use percent_encoding::percent_decode_str;
use unicode_normalization::UnicodeNormalization;

use crate::types::{PatternError, PatternKind};

/// Wildcard token matching any run of characters.
pub const WILDCARD_ANY: char = '*';

/// Wildcard token matching exactly one character.
pub const WILDCARD_ONE: char = '?';

// =============================================================================
// Pattern
// =============================================================================

/// A normalized blocking pattern, literal or wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Pattern(String);

impl Pattern {
    /// Normalize and validate a raw pattern.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let normalized = normalize(raw);
        if normalized.is_empty() {
            return Err(PatternError::Empty);
        }
        if let Some(reason) = malformed_reason(&normalized) {
            return Err(PatternError::Malformed(reason));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-folded form used for dedup, lookup, and exact matching.
    pub fn folded(&self) -> String {
        self.0.to_lowercase()
    }

    /// True if the pattern contains a wildcard token.
    pub fn is_wildcard(&self) -> bool {
        self.0.contains(WILDCARD_ANY) || self.0.contains(WILDCARD_ONE)
    }

    pub fn kind(&self) -> PatternKind {
        if self.is_wildcard() {
            PatternKind::Wildcard
        } else {
            PatternKind::Exact
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Pattern {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Normalization
// =============================================================================

/// Normalize a raw pattern or identifier: trim, percent-decode if safely
/// reversible, NFC.
pub fn normalize(raw: &str) -> String {
    let trimmed = raw.trim();
    let decoded = decode_if_reversible(trimmed);
    decoded.nfc().collect()
}

/// Case fold an already-raw identifier for comparison: NFC plus lowercase.
pub fn fold(raw: &str) -> String {
    raw.nfc().collect::<String>().to_lowercase()
}

/// Percent-decode when the result is valid UTF-8 and actually differs;
/// otherwise the input is returned unchanged. A lone `%` or an invalid
/// escape sequence keeps the stored entry as-is.
fn decode_if_reversible(input: &str) -> Cow<'_, str> {
    if !input.contains('%') {
        return Cow::Borrowed(input);
    }
    match percent_decode_str(input).decode_utf8() {
        Ok(decoded) if decoded != input => Cow::Owned(decoded.into_owned()),
        _ => Cow::Borrowed(input),
    }
}

/// Reject entries that can never name a user. Balanced brackets pass (they
/// are escaped to literals at compile time); unbalanced bracket syntax is the
/// classic corrupt line in an import file.
fn malformed_reason(normalized: &str) -> Option<&'static str> {
    if normalized.chars().any(char::is_control) {
        return Some("contains control characters");
    }

    let mut depth = 0i32;
    for ch in normalized.chars() {
        match ch {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth < 0 {
                    return Some("unbalanced bracket syntax");
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Some("unbalanced bracket syntax");
    }

    None
}

// =============================================================================
// BlockList
// =============================================================================

/// Ordered, deduplicated set of patterns.
///
/// Insertion order is preserved for display and for deterministic first-match
/// evaluation. The dedup key is the case fold, so `Alice` and `alice` are a
/// single entry.
#[derive(Debug, Clone, Default)]
pub struct BlockList {
    entries: Vec<Pattern>,
    seen: HashSet<String>,
}

impl BlockList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from already-normalized patterns, keeping the first occurrence
    /// of each folded key.
    pub fn from_patterns(patterns: impl IntoIterator<Item = Pattern>) -> Self {
        let mut list = Self::new();
        for pattern in patterns {
            list.insert(pattern);
        }
        list
    }

    /// Append a pattern. Returns false if an equivalent entry already exists.
    pub fn insert(&mut self, pattern: Pattern) -> bool {
        if !self.seen.insert(pattern.folded()) {
            return false;
        }
        self.entries.push(pattern);
        true
    }

    /// Remove the entry equivalent to `pattern`. Returns false if absent.
    pub fn remove(&mut self, pattern: &Pattern) -> bool {
        let key = pattern.folded();
        if !self.seen.remove(&key) {
            return false;
        }
        self.entries.retain(|entry| entry.folded() != key);
        true
    }

    pub fn contains(&self, pattern: &Pattern) -> bool {
        self.seen.contains(&pattern.folded())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pattern> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Pattern] {
        &self.entries
    }

    pub fn into_vec(self) -> Vec<Pattern> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_trims_and_nfc() {
        assert_eq!(normalize("  alice  "), "alice");
        // U+0065 U+0301 (e + combining acute) composes to U+00E9
        assert_eq!(normalize("cafe\u{301}"), "caf\u{e9}");
    }

    #[test]
    fn test_normalize_percent_decoding() {
        // Safely reversible: decoded
        assert_eq!(normalize("r%C3%A9my"), "r\u{e9}my");
        // Invalid UTF-8 after decoding: kept as-is
        assert_eq!(normalize("bad%FFseq"), "bad%FFseq");
        // Literal percent with no escape: kept as-is
        assert_eq!(normalize("100%"), "100%");
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(Pattern::parse(""), Err(PatternError::Empty));
        assert_eq!(Pattern::parse("   "), Err(PatternError::Empty));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            Pattern::parse("troll[abc"),
            Err(PatternError::Malformed(_))
        ));
        assert!(matches!(
            Pattern::parse("ab]cd"),
            Err(PatternError::Malformed(_))
        ));
        assert!(matches!(
            Pattern::parse("tab\there"),
            Err(PatternError::Malformed(_))
        ));
        // Balanced brackets are a literal, not malformed
        assert!(Pattern::parse("[alice]").is_ok());
    }

    #[test]
    fn test_pattern_kind() {
        assert_eq!(Pattern::parse("alice").unwrap().kind(), PatternKind::Exact);
        assert_eq!(
            Pattern::parse("troll*").unwrap().kind(),
            PatternKind::Wildcard
        );
        assert_eq!(Pattern::parse("a?c").unwrap().kind(), PatternKind::Wildcard);
    }

    #[test]
    fn test_block_list_dedup_preserves_first_seen_order() {
        let mut list = BlockList::new();
        assert!(list.insert(Pattern::parse("Bob").unwrap()));
        assert!(list.insert(Pattern::parse("alice").unwrap()));
        assert!(!list.insert(Pattern::parse("bob").unwrap()));
        assert!(!list.insert(Pattern::parse("ALICE").unwrap()));

        let names: Vec<&str> = list.iter().map(Pattern::as_str).collect();
        assert_eq!(names, ["Bob", "alice"]);
    }

    #[test]
    fn test_block_list_remove_is_case_insensitive() {
        let mut list = BlockList::new();
        list.insert(Pattern::parse("Alice").unwrap());
        assert!(list.remove(&Pattern::parse("ALICE").unwrap()));
        assert!(list.is_empty());
        assert!(!list.remove(&Pattern::parse("alice").unwrap()));
    }
}
