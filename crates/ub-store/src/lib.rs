//! UserBlocker Persistence Layer
//!
//! Durable, deduplicated, order-preserving storage for the block list on top
//! of a size-constrained key-value backend. The list is persisted as an
//! arena of fixed-capacity chunks indexed by a metadata record; reads are
//! self-healing and migrate the legacy unchunked record on first contact.
//!
//! # Modules
//!
//! - `backend`: the key-value backend trait plus memory and JSON-file
//!   implementations
//! - `layout`: storage keys, chunk capacity, and the metadata record
//! - `store`: the `PatternStore` read-modify-write operations
//! - `broadcast`: change fan-out to live reconciler instances
//! - `interchange`: export/import file formats
//! - `service`: the tagged-union message surface for UI collaborators

pub mod backend;
pub mod broadcast;
pub mod interchange;
pub mod layout;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use backend::{JsonFileBackend, MemoryBackend, StorageBackend, StorageError};
pub use broadcast::{ChangeBroadcaster, ChangeListener, RefreshSignal};
pub use layout::ChunkMeta;
pub use store::{ImportReport, PatternStore, StoreError};
