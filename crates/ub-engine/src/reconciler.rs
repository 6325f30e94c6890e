//! The classify/hide/restore reconciliation pass
//!
//! Per-node state machine: unseen -> processed-allowed or processed-blocked;
//! a pattern-set change sends a processed-blocked node whose identifier no
//! longer matches back to unseen, where it is immediately re-classified.
//! State lives in an explicit map owned by the reconciler, not in the tree.
//!
//! The pass is idempotent: re-running it with an unchanged pattern set and
//! an unchanged tree performs zero document mutations.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use ub_core::{Pattern, PatternSet};
use ub_store::backend::StorageBackend;
use ub_store::broadcast::{ChangeBroadcaster, ChangeListener, RefreshSignal};
use ub_store::store::{PatternStore, StoreError};

use crate::dom::{Document, NodeId, ObserverHandle};
use crate::extract;

/// Class attribute of inserted placeholders.
pub const PLACEHOLDER_CLASS: &str = "blocked-placeholder";

/// Default width of the mutation batch window.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Insert a human-readable placeholder where content was hidden.
    pub show_placeholders: bool,
    /// Batch window for newly appeared nodes; restarts on further
    /// mutations.
    pub debounce: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            show_placeholders: true,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

/// Everything needed to put a blocked node back exactly as it was.
#[derive(Debug)]
struct BlockRecord {
    identifier: String,
    pattern: Pattern,
    /// Hidden regions with their prior inline display values.
    hidden: Vec<(NodeId, Option<String>)>,
    placeholder: Option<NodeId>,
}

#[derive(Debug)]
enum NodeState {
    Allowed,
    Blocked(BlockRecord),
}

struct Binding {
    document: Rc<RefCell<Document>>,
    observer: ObserverHandle,
}

// =============================================================================
// Reconciler
// =============================================================================

pub struct Reconciler {
    config: ReconcilerConfig,
    patterns: PatternSet,
    states: HashMap<NodeId, NodeState>,
    binding: Option<Binding>,
    pending: Vec<NodeId>,
    deadline: Option<Instant>,
    signal: Rc<RefreshSignal>,
}

impl Reconciler {
    pub fn new(config: ReconcilerConfig) -> Self {
        Self {
            config,
            patterns: PatternSet::empty(),
            states: HashMap::new(),
            binding: None,
            pending: Vec::new(),
            deadline: None,
            signal: RefreshSignal::new(),
        }
    }

    /// Receive pattern-set change signals from the store's broadcaster.
    pub fn subscribe(&self, broadcaster: &ChangeBroadcaster) {
        broadcaster.register(&self.signal);
    }

    /// Bind to a document context, replacing any previous binding. The
    /// prior observer is disconnected first so a stale observer never fires
    /// against a replaced tree - last navigation wins.
    pub fn attach(&mut self, document: Rc<RefCell<Document>>) {
        if let Some(previous) = self.binding.take() {
            previous
                .document
                .borrow_mut()
                .disconnect(previous.observer.id());
        }
        self.states.clear();
        self.pending.clear();
        self.deadline = None;

        let observer = document.borrow_mut().observe();
        log::debug!("bound to new document context, observer {:?}", observer.id());
        self.binding = Some(Binding { document, observer });
        self.scan();
    }

    /// Swap in a new pattern set and re-derive visibility for every node.
    pub fn set_patterns(&mut self, patterns: Vec<Pattern>) {
        self.patterns = PatternSet::new(patterns);
        self.refresh();
    }

    /// One cooperative turn: consume a pending change signal (reloading the
    /// list from the store), drain observed mutations, and process the
    /// batch once its window has expired.
    pub fn pump<B: StorageBackend>(
        &mut self,
        now: Instant,
        store: &mut PatternStore<B>,
    ) -> Result<(), StoreError> {
        if self.signal.take() {
            // The list may have changed while we were suspended; derive
            // everything from it as it is now.
            match store.get_all() {
                Ok(patterns) => self.set_patterns(patterns),
                Err(err) => {
                    // Re-arm so the reload is retried on the next pump.
                    self.signal.pattern_set_changed();
                    return Err(err);
                }
            }
        }
        self.collect_mutations(now);
        self.flush_due(now);
        Ok(())
    }

    pub fn blocked_count(&self) -> usize {
        self.states
            .values()
            .filter(|state| matches!(state, NodeState::Blocked(_)))
            .count()
    }

    pub fn is_blocked(&self, id: NodeId) -> bool {
        matches!(self.states.get(&id), Some(NodeState::Blocked(_)))
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    // -------------------------------------------------------------------------
    // Re-evaluation
    // -------------------------------------------------------------------------

    /// Restore tracked blocked nodes that no longer match, send every other
    /// processed node back through classification, and pick up anything new.
    fn refresh(&mut self) {
        let document = match &self.binding {
            Some(binding) => binding.document.clone(),
            None => return,
        };

        let blocked: Vec<NodeId> = self
            .states
            .iter()
            .filter(|(_, state)| matches!(state, NodeState::Blocked(_)))
            .map(|(&id, _)| id)
            .collect();

        for id in blocked {
            // A node the document dropped just loses its tracking state.
            if !document.borrow().is_attached(id) {
                self.states.remove(&id);
                continue;
            }
            let still_matches = match self.states.get(&id) {
                Some(NodeState::Blocked(record)) => {
                    self.patterns.first_match(&record.identifier).matched
                }
                _ => true,
            };
            if !still_matches {
                if let Some(NodeState::Blocked(record)) = self.states.remove(&id) {
                    log::debug!("restoring node {id:?}, {:?} no longer matches", record.identifier);
                    restore(&mut document.borrow_mut(), &record);
                }
            }
        }

        // Allowed nodes re-enter evaluation: a new pattern may match them.
        self.states
            .retain(|_, state| matches!(state, NodeState::Blocked(_)));
        self.scan();
    }

    /// Classify every candidate in the tree that is not already processed.
    fn scan(&mut self) {
        let document = match &self.binding {
            Some(binding) => binding.document.clone(),
            None => return,
        };
        let candidates: Vec<NodeId> = {
            let doc = document.borrow();
            doc.descendants(doc.root())
                .into_iter()
                .filter(|&id| extract::is_candidate(&doc, id))
                .collect()
        };
        for id in candidates {
            self.classify(&document, id);
        }
    }

    fn classify(&mut self, document: &Rc<RefCell<Document>>, id: NodeId) {
        if self.states.contains_key(&id) {
            return;
        }

        let identifier = match extract::extract_identifier(&document.borrow(), id) {
            Some(identifier) => identifier,
            // No identifier: leave visible, never attempt a match.
            None => {
                self.states.insert(id, NodeState::Allowed);
                return;
            }
        };

        let result = self.patterns.first_match(&identifier);
        match result.pattern {
            Some(pattern) if result.matched => {
                let record = self.hide(document, id, identifier, pattern);
                self.states.insert(id, NodeState::Blocked(record));
            }
            _ => {
                self.states.insert(id, NodeState::Allowed);
            }
        }
    }

    // -------------------------------------------------------------------------
    // Suppression
    // -------------------------------------------------------------------------

    /// Hide the node's displayable regions, keeping nested replies visible,
    /// and insert the placeholder. Prior display values are recorded for
    /// exact restoration.
    fn hide(
        &self,
        document: &Rc<RefCell<Document>>,
        id: NodeId,
        identifier: String,
        pattern: Pattern,
    ) -> BlockRecord {
        let mut doc = document.borrow_mut();

        let regions = if doc.children(id).is_empty() {
            // Childless node: hide the node itself.
            vec![id]
        } else {
            extract::own_regions(&doc, id)
        };

        let mut hidden = Vec::with_capacity(regions.len());
        for region in regions {
            hidden.push((region, doc.display(region).map(String::from)));
            doc.set_display(region, Some("none"));
        }

        let placeholder = if self.config.show_placeholders {
            insert_placeholder(
                &mut doc,
                id,
                &identifier,
                &pattern,
                hidden.first().map(|&(region, _)| region),
            )
        } else {
            None
        };

        BlockRecord {
            identifier,
            pattern,
            hidden,
            placeholder,
        }
    }

    // -------------------------------------------------------------------------
    // Mutation batching
    // -------------------------------------------------------------------------

    fn collect_mutations(&mut self, now: Instant) {
        let added = match &self.binding {
            Some(binding) => binding.observer.take_added(),
            None => return,
        };
        if added.is_empty() {
            return;
        }
        self.pending.extend(added);
        // The window restarts on every burst rather than queueing
        // indefinitely.
        self.deadline = Some(now + self.config.debounce);
    }

    fn flush_due(&mut self, now: Instant) {
        if !self.deadline.is_some_and(|deadline| deadline <= now) {
            return;
        }
        self.deadline = None;

        let roots = std::mem::take(&mut self.pending);
        let document = match &self.binding {
            Some(binding) => binding.document.clone(),
            None => return,
        };

        for root in roots {
            let candidates: Vec<NodeId> = {
                let doc = document.borrow();
                if doc.is_attached(root) {
                    doc.descendants(root)
                        .into_iter()
                        .filter(|&id| extract::is_candidate(&doc, id))
                        .collect()
                } else {
                    Vec::new()
                }
            };
            for id in candidates {
                self.classify(&document, id);
            }
        }
    }
}

// =============================================================================
// Free helpers
// =============================================================================

/// Put a blocked node back exactly as recorded: prior display values, no
/// placeholder. Regions the document dropped are ignored.
fn restore(doc: &mut Document, record: &BlockRecord) {
    for &(region, ref previous) in &record.hidden {
        doc.set_display(region, previous.as_deref());
    }
    if let Some(placeholder) = record.placeholder {
        doc.remove(placeholder);
    }
}

fn insert_placeholder(
    doc: &mut Document,
    id: NodeId,
    identifier: &str,
    pattern: &Pattern,
    anchor: Option<NodeId>,
) -> Option<NodeId> {
    // Whole-node hides place the placeholder beside the node; partial hides
    // place it inside, before the first hidden region, so nested replies
    // render below it.
    let (parent, reference) = match anchor {
        Some(region) if region == id => (doc.parent(id)?, Some(id)),
        Some(region) => (id, Some(region)),
        None => (id, None),
    };

    let node = doc.create("div");
    doc.set_attr(node, "class", PLACEHOLDER_CLASS);
    doc.set_text(node, &placeholder_text(identifier, pattern));
    doc.insert_before(parent, node, reference);
    Some(node)
}

/// Transparency requirement: a wildcard hit names the pattern that matched;
/// an exact hit already names the user.
fn placeholder_text(identifier: &str, pattern: &Pattern) -> String {
    if pattern.is_wildcard() {
        format!(
            "Comment from blocked user \"u/{identifier}\" hidden (matched pattern \"{pattern}\")"
        )
    } else {
        format!("Comment from blocked user \"u/{identifier}\" hidden")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ub_store::backend::MemoryBackend;

    fn new_document() -> Rc<RefCell<Document>> {
        Rc::new(RefCell::new(Document::new()))
    }

    /// Build a comment node: header with an author link, plus a body.
    fn comment(doc: &mut Document, author: &str) -> NodeId {
        let comment = doc.create(extract::COMMENT_TAG);
        let header = doc.create("div");
        let link = doc.create("a");
        doc.set_attr(link, "slot", "userLink");
        doc.set_attr(link, "href", &format!("/user/{author}"));
        doc.append_child(header, link);
        let body = doc.create("div");
        doc.set_text(body, "comment text");
        doc.append_child(comment, header);
        doc.append_child(comment, body);
        comment
    }

    struct Fixture {
        document: Rc<RefCell<Document>>,
        reconciler: Reconciler,
        store: PatternStore<MemoryBackend>,
    }

    fn fixture(patterns: &[&str]) -> Fixture {
        let broadcaster = ChangeBroadcaster::new();
        let mut store =
            PatternStore::new(MemoryBackend::new()).with_broadcaster(broadcaster.clone());
        store.set_all(patterns.iter().copied()).unwrap();

        let mut reconciler = Reconciler::new(ReconcilerConfig::default());
        reconciler.subscribe(&broadcaster);
        reconciler.set_patterns(store.get_all().unwrap());

        Fixture {
            document: new_document(),
            reconciler,
            store,
        }
    }

    fn placeholder_of(doc: &Document, comment: NodeId) -> Option<NodeId> {
        doc.children(comment)
            .iter()
            .copied()
            .find(|&child| doc.attr(child, "class") == Some(PLACEHOLDER_CLASS))
    }

    #[test]
    fn test_attach_hides_matching_comments() {
        let mut fx = fixture(&["troll"]);
        let (blocked, allowed) = {
            let mut doc = fx.document.borrow_mut();
            let blocked = comment(&mut doc, "troll");
            let allowed = comment(&mut doc, "alice");
            let root = doc.root();
            doc.append_child(root, blocked);
            doc.append_child(root, allowed);
            (blocked, allowed)
        };

        fx.reconciler.attach(fx.document.clone());

        let doc = fx.document.borrow();
        assert!(fx.reconciler.is_blocked(blocked));
        assert!(!fx.reconciler.is_blocked(allowed));

        // Own regions hidden, placeholder inserted first.
        let placeholder = placeholder_of(&doc, blocked).expect("placeholder inserted");
        assert_eq!(doc.children(blocked)[0], placeholder);
        for &child in &doc.children(blocked)[1..] {
            assert_eq!(doc.display(child), Some("none"));
        }
        assert!(doc
            .text(placeholder)
            .contains("Comment from blocked user \"u/troll\" hidden"));

        // The allowed comment is untouched.
        assert!(placeholder_of(&doc, allowed).is_none());
        for &child in doc.children(allowed) {
            assert_eq!(doc.display(child), None);
        }
    }

    #[test]
    fn test_wildcard_match_names_the_pattern() {
        let mut fx = fixture(&["troll*"]);
        let blocked = {
            let mut doc = fx.document.borrow_mut();
            let blocked = comment(&mut doc, "trollmaster");
            let root = doc.root();
            doc.append_child(root, blocked);
            blocked
        };

        fx.reconciler.attach(fx.document.clone());

        let doc = fx.document.borrow();
        let placeholder = placeholder_of(&doc, blocked).expect("placeholder inserted");
        let text = doc.text(placeholder);
        assert!(text.contains("u/trollmaster"));
        assert!(text.contains("(matched pattern \"troll*\")"));
    }

    #[test]
    fn test_second_pass_makes_zero_mutations() {
        let mut fx = fixture(&["troll", "spam*"]);
        {
            let mut doc = fx.document.borrow_mut();
            let a = comment(&mut doc, "troll");
            let b = comment(&mut doc, "spammer");
            let c = comment(&mut doc, "alice");
            let root = doc.root();
            doc.append_child(root, a);
            doc.append_child(root, b);
            doc.append_child(root, c);
        }

        fx.reconciler.attach(fx.document.clone());
        let after_first = fx.document.borrow().mutation_count();

        // Unchanged pattern set, unchanged tree: the pass must not touch
        // the document.
        fx.reconciler
            .set_patterns(fx.store.get_all().unwrap());
        let now = Instant::now();
        fx.reconciler.pump(now, &mut fx.store).unwrap();
        fx.reconciler
            .pump(now + DEFAULT_DEBOUNCE * 2, &mut fx.store)
            .unwrap();

        assert_eq!(fx.document.borrow().mutation_count(), after_first);
    }

    #[test]
    fn test_removing_pattern_restores_exact_state() {
        let mut fx = fixture(&["bob*"]);
        let blocked = {
            let mut doc = fx.document.borrow_mut();
            let blocked = comment(&mut doc, "bobby");
            let root = doc.root();
            doc.append_child(root, blocked);
            blocked
        };

        let (children_before, displays_before) = {
            let doc = fx.document.borrow();
            let children = doc.children(blocked).to_vec();
            let displays: Vec<Option<String>> = children
                .iter()
                .map(|&c| doc.display(c).map(String::from))
                .collect();
            (children, displays)
        };

        fx.reconciler.attach(fx.document.clone());
        assert!(fx.reconciler.is_blocked(blocked));

        fx.store.remove("bob*").unwrap();
        fx.reconciler
            .pump(Instant::now(), &mut fx.store)
            .unwrap();

        assert!(!fx.reconciler.is_blocked(blocked));
        let doc = fx.document.borrow();
        assert_eq!(doc.children(blocked), children_before.as_slice());
        let displays_after: Vec<Option<String>> = children_before
            .iter()
            .map(|&c| doc.display(c).map(String::from))
            .collect();
        assert_eq!(displays_after, displays_before);
        assert!(placeholder_of(&doc, blocked).is_none());
    }

    #[test]
    fn test_newly_added_pattern_hides_processed_node() {
        let mut fx = fixture(&[]);
        let target = {
            let mut doc = fx.document.borrow_mut();
            let target = comment(&mut doc, "lurker");
            let root = doc.root();
            doc.append_child(root, target);
            target
        };

        fx.reconciler.attach(fx.document.clone());
        assert!(!fx.reconciler.is_blocked(target));

        fx.store.add("lurker").unwrap();
        fx.reconciler
            .pump(Instant::now(), &mut fx.store)
            .unwrap();
        assert!(fx.reconciler.is_blocked(target));
    }

    #[test]
    fn test_debounce_window_restarts_on_new_mutations() {
        let mut fx = fixture(&["troll"]);
        fx.reconciler.attach(fx.document.clone());
        let start = Instant::now();

        let first = {
            let mut doc = fx.document.borrow_mut();
            let first = comment(&mut doc, "troll");
            let root = doc.root();
            doc.append_child(root, first);
            first
        };
        fx.reconciler.pump(start, &mut fx.store).unwrap();
        assert!(!fx.reconciler.is_blocked(first), "inside the batch window");

        // A second mutation half-way through restarts the window.
        let second = {
            let mut doc = fx.document.borrow_mut();
            let second = comment(&mut doc, "troll");
            let root = doc.root();
            doc.append_child(root, second);
            second
        };
        let half = start + DEFAULT_DEBOUNCE / 2;
        fx.reconciler.pump(half, &mut fx.store).unwrap();

        // The original deadline has passed, but the restarted one has not.
        fx.reconciler
            .pump(start + DEFAULT_DEBOUNCE, &mut fx.store)
            .unwrap();
        assert!(!fx.reconciler.is_blocked(first));

        fx.reconciler
            .pump(half + DEFAULT_DEBOUNCE, &mut fx.store)
            .unwrap();
        assert!(fx.reconciler.is_blocked(first));
        assert!(fx.reconciler.is_blocked(second));
    }

    #[test]
    fn test_navigation_disconnects_previous_observer() {
        let mut fx = fixture(&["troll"]);
        let old_document = fx.document.clone();
        fx.reconciler.attach(old_document.clone());

        let new_document = new_document();
        fx.reconciler.attach(new_document.clone());
        assert_eq!(old_document.borrow().observer_count(), 0);

        // Mutations in the replaced tree are never processed.
        let stale = {
            let mut doc = old_document.borrow_mut();
            let stale = comment(&mut doc, "troll");
            let root = doc.root();
            doc.append_child(root, stale);
            stale
        };
        fx.reconciler
            .pump(Instant::now() + DEFAULT_DEBOUNCE * 2, &mut fx.store)
            .unwrap();
        assert!(!fx.reconciler.is_blocked(stale));
        assert_eq!(old_document.borrow().display(stale), None);
    }

    #[test]
    fn test_vanished_blocked_node_drops_tracking() {
        let mut fx = fixture(&["troll"]);
        let blocked = {
            let mut doc = fx.document.borrow_mut();
            let blocked = comment(&mut doc, "troll");
            let root = doc.root();
            doc.append_child(root, blocked);
            blocked
        };
        fx.reconciler.attach(fx.document.clone());
        assert_eq!(fx.reconciler.blocked_count(), 1);

        fx.document.borrow_mut().remove(blocked);
        fx.store.remove("troll").unwrap();
        fx.reconciler
            .pump(Instant::now(), &mut fx.store)
            .unwrap();
        assert_eq!(fx.reconciler.blocked_count(), 0);
    }

    #[test]
    fn test_nested_replies_stay_visible() {
        let mut fx = fixture(&["troll"]);
        let (blocked, reply) = {
            let mut doc = fx.document.borrow_mut();
            let blocked = comment(&mut doc, "troll");
            let replies = doc.create(extract::REPLIES_TAG);
            doc.append_child(blocked, replies);
            let reply = comment(&mut doc, "alice");
            doc.append_child(replies, reply);
            let root = doc.root();
            doc.append_child(root, blocked);
            (blocked, reply)
        };

        fx.reconciler.attach(fx.document.clone());

        let doc = fx.document.borrow();
        assert!(fx.reconciler.is_blocked(blocked));
        assert!(!fx.reconciler.is_blocked(reply));

        // The replies container and the reply itself keep their display.
        for &child in doc.children(blocked) {
            if doc.tag(child) == extract::REPLIES_TAG {
                assert_eq!(doc.display(child), None);
            }
        }
        assert_eq!(doc.display(reply), None);
        for &child in doc.children(reply) {
            assert_eq!(doc.display(child), None);
        }
    }

    #[test]
    fn test_node_without_identifier_is_left_visible() {
        let mut fx = fixture(&["troll"]);
        let anonymous = {
            let mut doc = fx.document.borrow_mut();
            let anonymous = doc.create(extract::COMMENT_TAG);
            let body = doc.create("div");
            doc.set_text(body, "no author link here");
            doc.append_child(anonymous, body);
            let root = doc.root();
            doc.append_child(root, anonymous);
            anonymous
        };

        fx.reconciler.attach(fx.document.clone());

        let doc = fx.document.borrow();
        assert!(!fx.reconciler.is_blocked(anonymous));
        assert!(placeholder_of(&doc, anonymous).is_none());
    }

    #[test]
    fn test_placeholders_disabled() {
        let mut fx = fixture(&["troll"]);
        fx.reconciler = Reconciler::new(ReconcilerConfig {
            show_placeholders: false,
            ..ReconcilerConfig::default()
        });
        fx.reconciler.set_patterns(fx.store.get_all().unwrap());

        let blocked = {
            let mut doc = fx.document.borrow_mut();
            let blocked = comment(&mut doc, "troll");
            let root = doc.root();
            doc.append_child(root, blocked);
            blocked
        };
        fx.reconciler.attach(fx.document.clone());

        let doc = fx.document.borrow();
        assert!(fx.reconciler.is_blocked(blocked));
        assert!(placeholder_of(&doc, blocked).is_none());
        for &child in doc.children(blocked) {
            assert_eq!(doc.display(child), Some("none"));
        }
    }
}
