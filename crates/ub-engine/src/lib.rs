//! UserBlocker Reconciliation Engine
//!
//! Walks and observes a live document tree, extracts an author identifier
//! per candidate node, consults the pattern set, and idempotently hides or
//! restores matching nodes with an optional placeholder.
//!
//! The engine is single-threaded and cooperative: the host mutates the
//! [`dom::Document`], then calls [`reconciler::Reconciler::pump`] with the
//! current instant. Newly appeared nodes are processed after a short
//! debounce window that restarts on further mutations; a pattern-set change
//! signal triggers re-evaluation of everything against the then-current
//! list.
//!
//! # Modules
//!
//! - `dom`: arena document model with mutation observation
//! - `extract`: author identifier extraction
//! - `reconciler`: the classify/hide/restore state machine

pub mod dom;
pub mod extract;
pub mod reconciler;

// Re-export commonly used types
pub use dom::{Document, NodeId};
pub use reconciler::{Reconciler, ReconcilerConfig};
