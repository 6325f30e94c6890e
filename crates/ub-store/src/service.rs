//! Message surface for external collaborators
//!
//! The settings UI, context-menu trigger, and import/export chooser talk to
//! the core exclusively through these commands. The action tag is an
//! exhaustive union with a defined unknown fallback; storage failures are
//! caught here, logged, and returned as generic failure outcomes.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use ub_core::{MatchResult, PatternSet};

use crate::backend::StorageBackend;
use crate::store::{PatternStore, StoreError};

// =============================================================================
// Requests
// =============================================================================

/// Commands collaborators may send.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Request {
    GetList,
    Add { pattern: String },
    Remove { pattern: String },
    ImportBatch { patterns: Vec<String> },
    CheckMatch { identifier: String },
    /// Any unrecognized action tag.
    #[serde(other)]
    Unknown,
}

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Response {
    List(ListResponse),
    Mutation(MutationResponse),
    Import(ImportResponse),
    Match(MatchResponse),
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ListResponse {
    pub patterns: Vec<String>,
    pub total_count: usize,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MutationResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub total_count: usize,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ImportResponse {
    pub added: usize,
    pub duplicates: usize,
    pub invalid: usize,
    pub total_count: usize,
}

#[derive(Debug, Clone, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MatchResponse {
    pub matched: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

// =============================================================================
// Dispatch
// =============================================================================

/// Execute one command against the store.
pub fn dispatch<B: StorageBackend>(store: &mut PatternStore<B>, request: Request) -> Response {
    match request {
        Request::GetList => match store.get_all() {
            Ok(patterns) => Response::List(ListResponse {
                total_count: patterns.len(),
                patterns: patterns.iter().map(|p| p.as_str().to_string()).collect(),
            }),
            Err(err) => failure(store, err),
        },
        Request::Add { pattern } => match store.add(&pattern) {
            Ok(total_count) => success(total_count),
            Err(err) => failure(store, err),
        },
        Request::Remove { pattern } => match store.remove(&pattern) {
            Ok(total_count) => success(total_count),
            Err(err) => failure(store, err),
        },
        Request::ImportBatch { patterns } => match store.import_many(patterns) {
            Ok(report) => Response::Import(ImportResponse {
                added: report.added,
                duplicates: report.duplicates,
                invalid: report.invalid,
                total_count: report.total_count,
            }),
            Err(err) => failure(store, err),
        },
        Request::CheckMatch { identifier } => {
            // Fail open: a storage failure reads as not-matched.
            let result = match store.get_all() {
                Ok(patterns) => PatternSet::new(patterns).first_match(&identifier),
                Err(err) => {
                    log::error!("checkMatch failing open: {err}");
                    MatchResult::miss()
                }
            };
            Response::Match(MatchResponse {
                matched: result.matched,
                pattern: result.pattern.map(|p| p.as_str().to_string()),
            })
        }
        Request::Unknown => Response::Mutation(MutationResponse {
            success: false,
            reason: Some("Unknown action".to_string()),
            total_count: 0,
        }),
    }
}

fn success(total_count: usize) -> Response {
    Response::Mutation(MutationResponse {
        success: true,
        reason: None,
        total_count,
    })
}

/// Convert an expected outcome or a boundary failure into a structured
/// result. Storage failures never propagate past this surface.
fn failure<B: StorageBackend>(store: &mut PatternStore<B>, err: StoreError) -> Response {
    let (reason, total_count) = match err {
        StoreError::Duplicate {
            pattern,
            total_count,
        } => (format!("\"{pattern}\" is already blocked"), total_count),
        StoreError::NotFound {
            pattern,
            total_count,
        } => (format!("\"{pattern}\" is not in the block list"), total_count),
        StoreError::Pattern(err) => (err.to_string(), store.total_count().unwrap_or(0)),
        StoreError::Storage(err) => {
            log::error!("storage failure behind the message surface: {err}");
            ("Storage failure, please retry".to_string(), 0)
        }
    };
    Response::Mutation(MutationResponse {
        success: false,
        reason: Some(reason),
        total_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;

    fn store() -> PatternStore<MemoryBackend> {
        PatternStore::new(MemoryBackend::new())
    }

    fn parse(json: &str) -> Request {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_action_tags_round_trip() {
        assert!(matches!(
            parse(r#"{"action": "getList"}"#),
            Request::GetList
        ));
        assert!(matches!(
            parse(r#"{"action": "add", "pattern": "alice"}"#),
            Request::Add { .. }
        ));
        assert!(matches!(
            parse(r#"{"action": "checkMatch", "identifier": "alice"}"#),
            Request::CheckMatch { .. }
        ));
    }

    #[test]
    fn test_unknown_action_falls_back() {
        let request = parse(r#"{"action": "selfDestruct"}"#);
        assert!(matches!(request, Request::Unknown));

        let response = dispatch(&mut store(), request);
        match response {
            Response::Mutation(m) => {
                assert!(!m.success);
                assert_eq!(m.reason.as_deref(), Some("Unknown action"));
            }
            other => panic!("expected Mutation, got {other:?}"),
        }
    }

    #[test]
    fn test_add_list_remove_flow() {
        let mut store = store();

        let response = dispatch(
            &mut store,
            Request::Add {
                pattern: "alice".to_string(),
            },
        );
        assert!(matches!(
            response,
            Response::Mutation(MutationResponse {
                success: true,
                total_count: 1,
                ..
            })
        ));

        // Duplicate is a distinguishable failure, not an error.
        let response = dispatch(
            &mut store,
            Request::Add {
                pattern: "Alice".to_string(),
            },
        );
        match response {
            Response::Mutation(m) => {
                assert!(!m.success);
                assert!(m.reason.unwrap().contains("already blocked"));
                assert_eq!(m.total_count, 1);
            }
            other => panic!("expected Mutation, got {other:?}"),
        }

        let response = dispatch(&mut store, Request::GetList);
        match response {
            Response::List(list) => {
                assert_eq!(list.patterns, ["alice"]);
                assert_eq!(list.total_count, 1);
            }
            other => panic!("expected List, got {other:?}"),
        }
    }

    #[test]
    fn test_check_match_reports_pattern() {
        let mut store = store();
        store.add("troll*").unwrap();

        let response = dispatch(
            &mut store,
            Request::CheckMatch {
                identifier: "TrollMaster".to_string(),
            },
        );
        match response {
            Response::Match(m) => {
                assert!(m.matched);
                assert_eq!(m.pattern.as_deref(), Some("troll*"));
            }
            other => panic!("expected Match, got {other:?}"),
        }
    }

    #[test]
    fn test_mutation_response_serialization() {
        let response = success(4);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["totalCount"], 4);
        assert!(value.get("reason").is_none());
    }
}
