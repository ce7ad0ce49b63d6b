//! Suggestion ranking for payee and category fields.
//!
//! Merges AI-produced suggestions with the user's existing reference data
//! into one deterministically ordered candidate list. Used during manual
//! entry and bulk import review. A failing suggestion call degrades to
//! existing-only items; it never blocks the form.

use crate::api::{ApiError, BackendApi};
use crate::models::{Category, Payee, SuggestionItem, SuggestionKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Tunables for relevance scoring and list shape. The token-length and
/// threshold values are heuristics carried over from observed usage, exposed
/// here rather than hardcoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankParams {
    /// Name tokens shorter than this never count as matches.
    pub min_token_len: usize,
    /// Relevance above this tags an item Historical instead of Existing.
    pub historical_threshold: f64,
    /// At most this many AI suggestions survive into the ranked list.
    pub max_ai_suggestions: usize,
    /// Ceiling for relevance-derived confidence.
    pub relevance_cap: f64,
}

impl Default for RankParams {
    fn default() -> Self {
        Self {
            min_token_len: 3,
            historical_threshold: 0.3,
            max_ai_suggestions: 5,
            relevance_cap: 0.8,
        }
    }
}

/// Reference item fed into ranking, payee or category alike.
#[derive(Debug, Clone)]
pub struct ExistingItem {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub usage_count: Option<u32>,
}

impl From<&Payee> for ExistingItem {
    fn from(payee: &Payee) -> Self {
        Self {
            id: payee.id.clone(),
            name: payee.name.clone(),
            color: None,
            usage_count: payee.usage_count,
        }
    }
}

impl From<&Category> for ExistingItem {
    fn from(category: &Category) -> Self {
        Self {
            id: category.id.clone(),
            name: category.name.clone(),
            color: category.color.clone(),
            usage_count: category.usage_count,
        }
    }
}

/// Ranked lists for both suggestion-backed fields.
#[derive(Debug, Clone, Default)]
pub struct RankedSuggestions {
    pub payees: Vec<SuggestionItem>,
    pub categories: Vec<SuggestionItem>,
}

/// Lexical relevance of an item name against free query text.
///
/// Both sides are tokenized on whitespace, lower-cased. A name token of
/// sufficient length matches when it is a substring of, or contains, some
/// query token; relevance is matches over the larger token count.
pub fn relevance_score(name: &str, query: &str, min_token_len: usize) -> f64 {
    let name_tokens: Vec<String> = name.split_whitespace().map(|t| t.to_lowercase()).collect();
    let query_tokens: Vec<String> = query.split_whitespace().map(|t| t.to_lowercase()).collect();

    if name_tokens.is_empty() || query_tokens.is_empty() {
        return 0.0;
    }

    let matches = name_tokens
        .iter()
        .filter(|token| token.len() >= min_token_len)
        .filter(|token| {
            query_tokens
                .iter()
                .any(|q| q.contains(token.as_str()) || token.contains(q.as_str()))
        })
        .count();

    matches as f64 / name_tokens.len().max(query_tokens.len()) as f64
}

/// Merge AI suggestions and existing items into one ordered, deduplicated
/// list. Deterministic and stable: equal confidences keep their input order,
/// so re-ranking the same inputs reproduces the same output.
pub fn rank(
    ai_suggestions: Vec<SuggestionItem>,
    existing: &[ExistingItem],
    query: &str,
    params: &RankParams,
) -> Vec<SuggestionItem> {
    // AI suggestions lead, best first, capped.
    let mut ai: Vec<SuggestionItem> = ai_suggestions
        .into_iter()
        .map(|mut item| {
            item.kind = SuggestionKind::AiSuggestion;
            item
        })
        .collect();
    ai.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
    ai.truncate(params.max_ai_suggestions);

    let mut seen: HashSet<String> = ai.iter().map(|item| item.id.clone()).collect();

    let mut rest: Vec<SuggestionItem> = Vec::new();
    for item in existing {
        if !seen.insert(item.id.clone()) {
            continue; // AI suggestions win id collisions
        }

        let relevance = relevance_score(&item.name, query, params.min_token_len);
        let (kind, reason) = if relevance > params.historical_threshold {
            (SuggestionKind::Historical, "Matches your description")
        } else {
            (SuggestionKind::Existing, "Existing option")
        };

        rest.push(SuggestionItem {
            id: item.id.clone(),
            name: item.name.clone(),
            kind,
            confidence: relevance.min(params.relevance_cap),
            reason: reason.to_string(),
            usage_count: item.usage_count,
            color: item.color.clone(),
        });
    }
    rest.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));

    ai.extend(rest);
    ai
}

/// Fallback list when the suggestion service is unavailable.
pub fn existing_only(existing: &[ExistingItem]) -> Vec<SuggestionItem> {
    existing
        .iter()
        .map(|item| SuggestionItem {
            id: item.id.clone(),
            name: item.name.clone(),
            kind: SuggestionKind::Existing,
            confidence: 0.5,
            reason: "Existing option".to_string(),
            usage_count: item.usage_count,
            color: item.color.clone(),
        })
        .collect()
}

/// Fetch AI suggestions for a description and rank them against the local
/// reference data. Any [`ApiError`] degrades to existing-only lists.
pub async fn fetch_ranked<B: BackendApi>(
    backend: &B,
    description: &str,
    amount: Option<f64>,
    account_id: Option<&str>,
    payees: &[ExistingItem],
    categories: &[ExistingItem],
    params: &RankParams,
) -> RankedSuggestions {
    match backend.get_suggestions(description, amount, account_id).await {
        Ok(response) => RankedSuggestions {
            payees: rank(response.payee_suggestions, payees, description, params),
            categories: rank(response.category_suggestions, categories, description, params),
        },
        Err(e) => {
            log_degradation(&e);
            RankedSuggestions {
                payees: existing_only(payees),
                categories: existing_only(categories),
            }
        }
    }
}

fn log_degradation(error: &ApiError) {
    log::warn!(
        "Suggestions: backend call failed ({}), serving existing items only",
        error
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SuggestionsResponse;
    use crate::models::{
        Account, FieldMapping, ImportOutcome, SourceFile, TransactionCandidate, TransactionSplit,
        TransactionType,
    };

    fn ai_item(id: &str, name: &str, confidence: f64) -> SuggestionItem {
        SuggestionItem {
            id: id.to_string(),
            name: name.to_string(),
            kind: SuggestionKind::AiSuggestion,
            confidence,
            reason: "Suggested from description".to_string(),
            usage_count: None,
            color: None,
        }
    }

    fn existing(id: &str, name: &str) -> ExistingItem {
        ExistingItem {
            id: id.to_string(),
            name: name.to_string(),
            color: None,
            usage_count: None,
        }
    }

    #[test]
    fn test_relevance_scoring() {
        // "coffee" matches, "shop" does not; denominator max(2, 3) = 3
        let score = relevance_score("Coffee Shop", "morning coffee downtown", 3);
        assert!((score - 1.0 / 3.0).abs() < 1e-9);

        assert_eq!(relevance_score("", "query", 3), 0.0);
        assert_eq!(relevance_score("name", "", 3), 0.0);
        // Short tokens never match
        assert_eq!(relevance_score("of", "of course", 3), 0.0);
    }

    #[test]
    fn test_ai_suggestions_sort_first_and_are_capped() {
        let ai: Vec<SuggestionItem> = (0..8)
            .map(|i| ai_item(&format!("ai-{}", i), &format!("AI {}", i), 0.5 + i as f64 * 0.05))
            .collect();
        let items = vec![existing("e-1", "Coffee Shop")];

        let ranked = rank(ai, &items, "coffee shop", &RankParams::default());

        let ai_count = ranked
            .iter()
            .filter(|item| item.kind == SuggestionKind::AiSuggestion)
            .count();
        assert_eq!(ai_count, 5);
        // Best AI suggestion leads
        assert_eq!(ranked[0].id, "ai-7");
        // Everything after the AI block is non-AI
        assert!(ranked[5..]
            .iter()
            .all(|item| item.kind != SuggestionKind::AiSuggestion));
    }

    #[test]
    fn test_id_collision_prefers_ai() {
        let ai = vec![ai_item("42", "Blue Bottle", 0.9)];
        let items = vec![existing("42", "Blue Bottle"), existing("7", "Other")];

        let ranked = rank(ai, &items, "blue bottle", &RankParams::default());
        let ids: Vec<&str> = ranked.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids.iter().filter(|id| **id == "42").count(), 1);
        assert_eq!(ranked[0].kind, SuggestionKind::AiSuggestion);
    }

    #[test]
    fn test_historical_vs_existing_tagging() {
        let params = RankParams::default();
        let items = vec![existing("1", "Coffee Shop"), existing("2", "Utilities")];

        let ranked = rank(Vec::new(), &items, "coffee shop downtown", &params);

        let coffee = ranked.iter().find(|item| item.id == "1").unwrap();
        let utilities = ranked.iter().find(|item| item.id == "2").unwrap();
        assert_eq!(coffee.kind, SuggestionKind::Historical);
        assert!(coffee.confidence <= params.relevance_cap);
        assert_eq!(utilities.kind, SuggestionKind::Existing);
        // Relevant item ranks above the irrelevant one
        assert!(ranked.iter().position(|i| i.id == "1") < ranked.iter().position(|i| i.id == "2"));
    }

    #[test]
    fn test_ranking_is_stable_and_idempotent() {
        let items = vec![
            existing("a", "Alpha Market"),
            existing("b", "Beta Market"),
            existing("c", "Gamma Market"),
        ];
        let params = RankParams::default();

        let first = rank(Vec::new(), &items, "market", &params);
        let second = rank(Vec::new(), &items, "market", &params);

        let first_ids: Vec<&str> = first.iter().map(|i| i.id.as_str()).collect();
        let second_ids: Vec<&str> = second.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(first_ids, second_ids);
        // Equal confidence keeps input order
        assert_eq!(first_ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_existing_only_fallback_shape() {
        let items = vec![existing("1", "Rent"), existing("2", "Food")];
        let fallback = existing_only(&items);
        assert_eq!(fallback.len(), 2);
        assert!(fallback
            .iter()
            .all(|item| item.confidence == 0.5 && item.reason == "Existing option"));
    }

    // ------------------------------------------------------------------
    // fetch_ranked degradation
    // ------------------------------------------------------------------

    struct FailingBackend;

    impl BackendApi for FailingBackend {
        async fn list_accounts(&self) -> Result<Vec<Account>, ApiError> {
            unreachable!()
        }
        async fn list_categories(&self) -> Result<Vec<Category>, ApiError> {
            unreachable!()
        }
        async fn list_payees(&self) -> Result<Vec<Payee>, ApiError> {
            unreachable!()
        }
        async fn create_category(&self, _name: &str) -> Result<Category, ApiError> {
            unreachable!()
        }
        async fn create_payee(&self, _name: &str) -> Result<Payee, ApiError> {
            unreachable!()
        }
        async fn import_tabular(
            &self,
            _file: &SourceFile,
            _account_id: &str,
            _mapping: &FieldMapping,
            _default_type: TransactionType,
        ) -> Result<ImportOutcome, ApiError> {
            unreachable!()
        }
        async fn import_batch(
            &self,
            _candidates: &[TransactionCandidate],
            _account_id: &str,
        ) -> Result<ImportOutcome, ApiError> {
            unreachable!()
        }
        async fn get_suggestions(
            &self,
            _description: &str,
            _amount: Option<f64>,
            _account_id: Option<&str>,
        ) -> Result<SuggestionsResponse, ApiError> {
            Err(ApiError::Network("connection refused".into()))
        }
        async fn create_splits(
            &self,
            _transaction_id: &str,
            _splits: &[TransactionSplit],
        ) -> Result<(), ApiError> {
            unreachable!()
        }
        async fn update_splits(
            &self,
            _transaction_id: &str,
            _splits: &[TransactionSplit],
        ) -> Result<(), ApiError> {
            unreachable!()
        }
        async fn delete_splits(&self, _transaction_id: &str) -> Result<(), ApiError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_fetch_ranked_degrades_on_backend_failure() {
        let payees = vec![existing("p1", "Grocer")];
        let categories = vec![existing("c1", "Food")];

        let ranked = fetch_ranked(
            &FailingBackend,
            "weekly shop",
            Some(54.30),
            Some("acc-1"),
            &payees,
            &categories,
            &RankParams::default(),
        )
        .await;

        assert_eq!(ranked.payees.len(), 1);
        assert_eq!(ranked.categories.len(), 1);
        assert_eq!(ranked.payees[0].confidence, 0.5);
        assert_eq!(ranked.payees[0].kind, SuggestionKind::Existing);
    }
}
