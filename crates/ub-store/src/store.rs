//! The PatternStore: atomic read-modify-write operations over chunked storage
//!
//! Every read reconstructs the list from the metadata record and its chunks,
//! migrating the legacy unchunked record on first contact and healing any
//! entry that no longer matches the current normalization. Every successful
//! mutation persists the full layout and notifies the change broadcaster.

use std::rc::Rc;

use serde_json::Value;

use ub_core::{compile_checked, BlockList, Pattern, PatternError};

use crate::backend::{StorageBackend, StorageError};
use crate::broadcast::ChangeBroadcaster;
use crate::layout::{
    chunk_key, parse_chunk_key, ChunkMeta, DEFAULT_CHUNK_CAPACITY, LEGACY_KEY, META_KEY,
};

/// Error type for store operations. Duplicate and not-found are expected
/// outcomes the message surface turns into structured results.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("pattern already blocked: {pattern}")]
    Duplicate { pattern: String, total_count: usize },
    #[error("pattern not found: {pattern}")]
    NotFound { pattern: String, total_count: usize },
}

/// Outcome of a batch import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportReport {
    pub added: usize,
    pub duplicates: usize,
    pub invalid: usize,
    pub total_count: usize,
}

// =============================================================================
// PatternStore
// =============================================================================

/// Durable, deduplicated, order-preserving pattern list over a key-value
/// backend.
pub struct PatternStore<B> {
    backend: B,
    chunk_capacity: usize,
    broadcaster: Option<Rc<ChangeBroadcaster>>,
}

impl<B: StorageBackend> PatternStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
            broadcaster: None,
        }
    }

    pub fn with_chunk_capacity(mut self, capacity: usize) -> Self {
        self.chunk_capacity = capacity.max(1);
        self
    }

    pub fn with_broadcaster(mut self, broadcaster: Rc<ChangeBroadcaster>) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Load the full list: reconstruct from chunks in index order, migrating
    /// the legacy record if no metadata exists yet, and write back any
    /// correction the read uncovered (self-healing).
    pub fn get_all(&mut self) -> Result<Vec<Pattern>, StoreError> {
        let meta = match self.read_meta()? {
            Some(meta) => meta,
            None => {
                if let Some(legacy) = self.backend.get(LEGACY_KEY)? {
                    return self.migrate_legacy(legacy);
                }
                return Ok(Vec::new());
            }
        };

        // A legacy record alongside valid metadata is a leftover from a
        // migration whose final delete did not land. The chunks are
        // authoritative; retry the cleanup.
        if self.backend.get(LEGACY_KEY)?.is_some() {
            if let Err(err) = self.backend.remove(LEGACY_KEY) {
                log::warn!("failed to remove stale legacy record: {err}");
            }
        }

        let (raw, degraded) = self.read_chunks(&meta)?;
        self.heal(raw, degraded)
    }

    /// Replace the whole list. Normalizes, drops entries that fail
    /// validation, deduplicates preserving first-seen order, and persists.
    pub fn set_all<I, S>(&mut self, raws: I) -> Result<Vec<Pattern>, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = BlockList::new();
        for raw in raws {
            match Pattern::parse(raw.as_ref()) {
                Ok(pattern) => {
                    list.insert(pattern);
                }
                Err(err) => {
                    log::debug!("set_all dropping {:?}: {err}", raw.as_ref());
                }
            }
        }
        self.write_list(list.as_slice())?;
        self.notify();
        Ok(list.into_vec())
    }

    /// Append one pattern. Fails with [`StoreError::Duplicate`] if an
    /// equivalent entry exists. Returns the new total count.
    pub fn add(&mut self, raw: &str) -> Result<usize, StoreError> {
        let pattern = Pattern::parse(raw)?;
        let mut list = BlockList::from_patterns(self.get_all()?);
        if !list.insert(pattern.clone()) {
            return Err(StoreError::Duplicate {
                pattern: pattern.as_str().to_string(),
                total_count: list.len(),
            });
        }
        self.write_list(list.as_slice())?;
        self.notify();
        Ok(list.len())
    }

    /// Remove one pattern. The input is normalized identically to stored
    /// entries, so raw or percent-encoded input resolves. Returns the new
    /// total count.
    pub fn remove(&mut self, raw: &str) -> Result<usize, StoreError> {
        let pattern = Pattern::parse(raw)?;
        let mut list = BlockList::from_patterns(self.get_all()?);
        if !list.remove(&pattern) {
            return Err(StoreError::NotFound {
                pattern: pattern.as_str().to_string(),
                total_count: list.len(),
            });
        }
        self.write_list(list.as_slice())?;
        self.notify();
        Ok(list.len())
    }

    /// Import a batch. Every entry is validated independently: an invalid
    /// entry is excluded without aborting the rest, and duplicates (already
    /// present or repeated within the batch) are counted separately.
    pub fn import_many<I, S>(&mut self, raws: I) -> Result<ImportReport, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list = BlockList::from_patterns(self.get_all()?);
        let mut report = ImportReport::default();

        for raw in raws {
            let pattern = match Pattern::parse(raw.as_ref()) {
                Ok(pattern) => pattern,
                Err(err) => {
                    log::debug!("import rejecting {:?}: {err}", raw.as_ref());
                    report.invalid += 1;
                    continue;
                }
            };
            if let Err(err) = compile_checked(&pattern) {
                log::debug!("import rejecting {:?}: {err}", pattern.as_str());
                report.invalid += 1;
                continue;
            }
            if list.insert(pattern) {
                report.added += 1;
            } else {
                report.duplicates += 1;
            }
        }

        if report.added > 0 {
            self.write_list(list.as_slice())?;
            self.notify();
        }
        report.total_count = list.len();
        Ok(report)
    }

    /// Current metadata record, if the chunked layout exists.
    pub fn metadata(&self) -> Result<Option<ChunkMeta>, StoreError> {
        self.read_meta()
    }

    /// Total count without materializing the list.
    pub fn total_count(&mut self) -> Result<usize, StoreError> {
        match self.read_meta()? {
            Some(meta) => Ok(meta.total_count),
            None => Ok(self.get_all()?.len()),
        }
    }

    // -------------------------------------------------------------------------
    // Read path
    // -------------------------------------------------------------------------

    fn read_meta(&self) -> Result<Option<ChunkMeta>, StoreError> {
        let value = match self.backend.get(META_KEY)? {
            Some(value) => value,
            None => return Ok(None),
        };
        match serde_json::from_value(value) {
            Ok(meta) => Ok(Some(meta)),
            Err(err) => {
                log::warn!("metadata record is malformed, treating as absent: {err}");
                Ok(None)
            }
        }
    }

    fn read_chunks(&self, meta: &ChunkMeta) -> Result<(Vec<String>, bool), StoreError> {
        let mut entries = Vec::with_capacity(meta.total_count);
        let mut degraded = false;

        for index in 0..meta.chunk_count {
            let key = chunk_key(index);
            match self.backend.get(&key)? {
                Some(value) => match serde_json::from_value::<Vec<String>>(value) {
                    Ok(chunk) => entries.extend(chunk),
                    Err(err) => {
                        log::warn!("chunk {key} is malformed, skipping: {err}");
                        degraded = true;
                    }
                },
                None => {
                    log::warn!("chunk {key} is missing, skipping");
                    degraded = true;
                }
            }
        }

        if !degraded && entries.len() != meta.total_count {
            degraded = true;
        }
        Ok((entries, degraded))
    }

    /// Re-normalize, drop entries that fail validation, and deduplicate. If
    /// anything changed the corrected set is written back before returning;
    /// a failed write-back is logged and healing retries on the next read.
    fn heal(&mut self, raw: Vec<String>, mut changed: bool) -> Result<Vec<Pattern>, StoreError> {
        let mut list = BlockList::new();
        for entry in &raw {
            match Pattern::parse(entry) {
                Ok(pattern) => {
                    if pattern.as_str() != entry {
                        changed = true;
                    }
                    if !list.insert(pattern) {
                        changed = true;
                    }
                }
                Err(err) => {
                    log::warn!("dropping stored entry {entry:?}: {err}");
                    changed = true;
                }
            }
        }

        if changed {
            match self.write_list(list.as_slice()) {
                Ok(()) => self.notify(),
                Err(err) => {
                    log::warn!("self-healing write-back failed, returning corrected list: {err}");
                }
            }
        }
        Ok(list.into_vec())
    }

    /// One-time migration of the legacy unchunked record. The metadata write
    /// is the commit point: a failure before it leaves the legacy record
    /// authoritative and the migration retries on the next read.
    fn migrate_legacy(&mut self, legacy: Value) -> Result<Vec<Pattern>, StoreError> {
        let raw: Vec<String> = match serde_json::from_value(legacy) {
            Ok(raw) => raw,
            Err(err) => {
                // Keep the record for manual recovery; nothing to migrate.
                log::warn!("legacy record is malformed, leaving it in place: {err}");
                return Ok(Vec::new());
            }
        };

        let mut list = BlockList::new();
        for entry in &raw {
            match Pattern::parse(entry) {
                Ok(pattern) => {
                    list.insert(pattern);
                }
                Err(err) => {
                    log::warn!("dropping legacy entry {entry:?}: {err}");
                }
            }
        }

        self.write_list(list.as_slice())?;
        if let Err(err) = self.backend.remove(LEGACY_KEY) {
            // Chunks and metadata landed, so the stale record is only
            // cosmetic; the next read retries the cleanup.
            log::warn!("failed to remove legacy record after migration: {err}");
        }
        log::debug!("migrated {} legacy entries to chunked layout", list.len());
        self.notify();
        Ok(list.into_vec())
    }

    // -------------------------------------------------------------------------
    // Write path
    // -------------------------------------------------------------------------

    /// Persist the full layout: chunks first, stale higher-index chunks
    /// removed, metadata last.
    fn write_list(&mut self, patterns: &[Pattern]) -> Result<(), StoreError> {
        let chunks: Vec<Vec<String>> = patterns
            .chunks(self.chunk_capacity)
            .map(|chunk| chunk.iter().map(|p| p.as_str().to_string()).collect())
            .collect();

        for (index, chunk) in chunks.iter().enumerate() {
            self.backend
                .set(&chunk_key(index), serde_json::to_value(chunk).map_err(StorageError::from)?)?;
        }

        for key in self.backend.keys()? {
            if let Some(index) = parse_chunk_key(&key) {
                if index >= chunks.len() {
                    if let Err(err) = self.backend.remove(&key) {
                        // Bounded by chunkCount on read, so a leftover is
                        // invisible; still worth knowing about.
                        log::warn!("failed to remove stale chunk {key}: {err}");
                    }
                }
            }
        }

        let meta = ChunkMeta::new(patterns.len(), chunks.len());
        self.backend
            .set(META_KEY, serde_json::to_value(&meta).map_err(StorageError::from)?)?;
        Ok(())
    }

    fn notify(&self) {
        if let Some(broadcaster) = &self.broadcaster {
            broadcaster.notify_changed();
        }
    }
}
