//! UserBlocker Core Library
//!
//! This crate provides the pattern model and matching engine for the
//! UserBlocker comment blocker. It has no I/O: persistence lives in
//! `ub-store` and DOM reconciliation in `ub-engine`.
//!
//! # Architecture
//!
//! Patterns are stored normalized (trimmed, safely percent-decoded, NFC) with
//! case preserved; every comparison goes through the case fold. Exact
//! patterns never build a matcher. Wildcard patterns (`*` any run, `?` one
//! character) compile to an anchored case-insensitive regex, and a pattern
//! whose matcher cannot be built falls back to literal containment rather
//! than surfacing an error to the match path.
//!
//! # Modules
//!
//! - `pattern`: normalization, validation, and the ordered `BlockList`
//! - `matcher`: wildcard compilation and first-match evaluation
//! - `types`: shared type definitions

pub mod matcher;
pub mod pattern;
pub mod types;

// Re-export commonly used types
pub use matcher::{compile, compile_checked, matches, CompiledMatcher, PatternSet};
pub use pattern::{fold, normalize, BlockList, Pattern};
pub use types::{MatchResult, PatternError, PatternKind};
