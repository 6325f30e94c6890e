//! Author identifier extraction
//!
//! Two strategies, first success wins: a structured author link whose href
//! carries a canonical profile reference, then the textual `u/` prefix
//! convention. A node yielding neither is left visible without attempting a
//! match.

use std::sync::OnceLock;

use regex::Regex;

use ub_core::normalize;

use crate::dom::{Document, NodeId};

/// Tag carried by candidate content nodes.
pub const COMMENT_TAG: &str = "comment";

/// Tag of the child container holding nested replies; its subtree is never
/// hidden and never searched for the author link.
pub const REPLIES_TAG: &str = "comment-tree";

/// Slot attribute value marking the structured author link.
const AUTHOR_SLOT: &str = "userLink";

/// Textual convention marker for usernames.
const TEXT_PREFIX: &str = "u/";

fn profile_href_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "/user/name" or "/u/name", absolute or relative, stopping at the next
    // path or query delimiter.
    RE.get_or_init(|| Regex::new(r"(?:^|/)(?:user|u)/([^/?#]+)").unwrap())
}

/// Is this node a unit of content the reconciler should classify?
pub fn is_candidate(doc: &Document, id: NodeId) -> bool {
    doc.tag(id) == COMMENT_TAG
}

/// Children of a candidate that belong to the node itself rather than to
/// nested replies.
pub fn own_regions(doc: &Document, id: NodeId) -> Vec<NodeId> {
    doc.children(id)
        .iter()
        .copied()
        .filter(|&child| doc.tag(child) != REPLIES_TAG)
        .collect()
}

/// Extract the author identifier for a candidate node, if any.
pub fn extract_identifier(doc: &Document, id: NodeId) -> Option<String> {
    let link = find_author_link(doc, id)?;

    if let Some(href) = doc.attr(link, "href") {
        if let Some(captures) = profile_href_regex().captures(href) {
            // Hrefs arrive URL-encoded; normalize the same way stored
            // patterns are normalized so the two sides stay comparable.
            let name = normalize(&captures[1]);
            if !name.is_empty() {
                return Some(name);
            }
        }
    }

    let text = doc.text(link).trim();
    if let Some(name) = text.strip_prefix(TEXT_PREFIX) {
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }

    None
}

/// First `a` element in the node's own regions that looks like an author
/// link. Nested reply subtrees are skipped so a reply's author is never
/// attributed to its parent.
fn find_author_link(doc: &Document, id: NodeId) -> Option<NodeId> {
    let mut stack: Vec<NodeId> = own_regions(doc, id);
    stack.reverse();
    while let Some(current) = stack.pop() {
        if doc.tag(current) == "a" && is_author_link(doc, current) {
            return Some(current);
        }
        for &child in doc.children(current).iter().rev() {
            if doc.tag(child) != REPLIES_TAG {
                stack.push(child);
            }
        }
    }
    None
}

fn is_author_link(doc: &Document, id: NodeId) -> bool {
    if doc.attr(id, "slot") == Some(AUTHOR_SLOT) {
        return true;
    }
    doc.attr(id, "href")
        .is_some_and(|href| href.contains("/user/") || href.contains("/u/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment_with_link(doc: &mut Document, href: Option<&str>, text: &str) -> NodeId {
        let comment = doc.create(COMMENT_TAG);
        let body = doc.create("div");
        let link = doc.create("a");
        if let Some(href) = href {
            doc.set_attr(link, "href", href);
        }
        doc.set_text(link, text);
        doc.append_child(comment, body);
        doc.append_child(body, link);
        let root = doc.root();
        doc.append_child(root, comment);
        comment
    }

    #[test]
    fn test_href_takes_priority_over_text() {
        let mut doc = Document::new();
        let comment = comment_with_link(
            &mut doc,
            Some("https://example.com/user/alice?context=3"),
            "u/displayed",
        );
        assert_eq!(extract_identifier(&doc, comment).as_deref(), Some("alice"));
    }

    #[test]
    fn test_short_profile_path() {
        let mut doc = Document::new();
        let comment = comment_with_link(&mut doc, Some("/u/bob/"), "");
        assert_eq!(extract_identifier(&doc, comment).as_deref(), Some("bob"));
    }

    #[test]
    fn test_text_prefix_fallback() {
        let mut doc = Document::new();
        let comment = doc.create(COMMENT_TAG);
        let link = doc.create("a");
        doc.set_attr(link, "slot", AUTHOR_SLOT);
        doc.set_text(link, "  u/carol  ");
        doc.append_child(comment, link);
        let root = doc.root();
        doc.append_child(root, comment);

        assert_eq!(extract_identifier(&doc, comment).as_deref(), Some("carol"));
    }

    #[test]
    fn test_no_identifier_without_link_or_prefix() {
        let mut doc = Document::new();
        let comment = doc.create(COMMENT_TAG);
        let body = doc.create("div");
        doc.set_text(body, "orphaned content");
        doc.append_child(comment, body);
        let root = doc.root();
        doc.append_child(root, comment);

        assert_eq!(extract_identifier(&doc, comment), None);
    }

    #[test]
    fn test_nested_reply_author_is_not_attributed_to_parent() {
        let mut doc = Document::new();
        let comment = doc.create(COMMENT_TAG);
        let replies = doc.create(REPLIES_TAG);
        doc.append_child(comment, replies);
        let reply = comment_with_link(&mut doc, Some("/user/inner"), "");
        doc.remove(reply);
        doc.append_child(replies, reply);
        let root = doc.root();
        doc.append_child(root, comment);

        // The outer comment has no author link of its own.
        assert_eq!(extract_identifier(&doc, comment), None);
        // The nested reply still resolves for itself.
        assert_eq!(extract_identifier(&doc, reply).as_deref(), Some("inner"));
    }
}
