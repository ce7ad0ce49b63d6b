//! HTTP client for the reference-data and import backend.
//!
//! The core never talks to storage directly: accounts, categories, payees,
//! suggestion lookups and the actual transaction creation all live behind a
//! REST-like backend. [`BackendApi`] is the collaborator contract; the state
//! machine and form helpers are generic over it so tests can substitute an
//! in-memory backend.

use crate::models::{
    Account, Category, FieldMapping, ImportOutcome, Payee, SourceFile, SuggestionItem,
    TransactionCandidate, TransactionSplit, TransactionType,
};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Request timeout for backend calls in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Backend call errors. Remote failures are always surfaced as one of these
/// variants, never as panics or loose strings.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Backend returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Authentication failed")]
    Unauthorized,
    #[error("Malformed backend response: {0}")]
    Decode(String),
    #[error("Could not read {0}: {1}")]
    FileRead(String, String),
}

/// Supplies the bearer token for backend requests.
///
/// Injected explicitly so the core carries no ambient auth context.
pub trait TokenProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// Token provider holding a fixed token (or none for anonymous backends).
pub struct StaticToken(pub Option<String>);

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Reply shape of the suggestion endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionsResponse {
    pub payee_suggestions: Vec<SuggestionItem>,
    pub category_suggestions: Vec<SuggestionItem>,
}

/// Collaborator contract for the excluded backend.
#[allow(async_fn_in_trait)]
pub trait BackendApi: Send + Sync {
    async fn list_accounts(&self) -> Result<Vec<Account>, ApiError>;
    async fn list_categories(&self) -> Result<Vec<Category>, ApiError>;
    async fn list_payees(&self) -> Result<Vec<Payee>, ApiError>;
    async fn create_category(&self, name: &str) -> Result<Category, ApiError>;
    async fn create_payee(&self, name: &str) -> Result<Payee, ApiError>;

    /// Deterministic column-mapped import of one tabular file.
    async fn import_tabular(
        &self,
        file: &SourceFile,
        account_id: &str,
        mapping: &FieldMapping,
        default_type: TransactionType,
    ) -> Result<ImportOutcome, ApiError>;

    /// Batch creation of reviewed candidates against one account.
    async fn import_batch(
        &self,
        candidates: &[TransactionCandidate],
        account_id: &str,
    ) -> Result<ImportOutcome, ApiError>;

    async fn get_suggestions(
        &self,
        description: &str,
        amount: Option<f64>,
        account_id: Option<&str>,
    ) -> Result<SuggestionsResponse, ApiError>;

    async fn create_splits(
        &self,
        transaction_id: &str,
        splits: &[TransactionSplit],
    ) -> Result<(), ApiError>;
    async fn update_splits(
        &self,
        transaction_id: &str,
        splits: &[TransactionSplit],
    ) -> Result<(), ApiError>;
    async fn delete_splits(&self, transaction_id: &str) -> Result<(), ApiError>;
}

// ============================================================================
// HTTP Implementation
// ============================================================================

/// reqwest-backed implementation of [`BackendApi`].
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
    token: Arc<dyn TokenProvider>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TabularImportRequest<'a> {
    file_name: &'a str,
    content_base64: String,
    account_id: &'a str,
    mapping: &'a FieldMapping,
    default_type: TransactionType,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchImportRequest<'a> {
    account_id: &'a str,
    transactions: &'a [TransactionCandidate],
}

#[derive(Serialize)]
struct CreateNamedRequest<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct SplitsRequest<'a> {
    splits: &'a [TransactionSplit],
}

impl HttpBackend {
    pub fn new(base_url: &str, token: Arc<dyn TokenProvider>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .pool_max_idle_per_host(2)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn send_unit(&self, req: reqwest::RequestBuilder) -> Result<(), ApiError> {
        let response = self
            .authorize(req)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(())
    }
}

impl BackendApi for HttpBackend {
    async fn list_accounts(&self) -> Result<Vec<Account>, ApiError> {
        self.send(self.client.get(self.url("/accounts"))).await
    }

    async fn list_categories(&self) -> Result<Vec<Category>, ApiError> {
        self.send(self.client.get(self.url("/categories"))).await
    }

    async fn list_payees(&self) -> Result<Vec<Payee>, ApiError> {
        self.send(self.client.get(self.url("/payees"))).await
    }

    async fn create_category(&self, name: &str) -> Result<Category, ApiError> {
        self.send(
            self.client
                .post(self.url("/categories"))
                .json(&CreateNamedRequest { name }),
        )
        .await
    }

    async fn create_payee(&self, name: &str) -> Result<Payee, ApiError> {
        self.send(
            self.client
                .post(self.url("/payees"))
                .json(&CreateNamedRequest { name }),
        )
        .await
    }

    async fn import_tabular(
        &self,
        file: &SourceFile,
        account_id: &str,
        mapping: &FieldMapping,
        default_type: TransactionType,
    ) -> Result<ImportOutcome, ApiError> {
        let bytes = std::fs::read(&file.path)
            .map_err(|e| ApiError::FileRead(file.name.clone(), e.to_string()))?;

        let request = TabularImportRequest {
            file_name: &file.name,
            content_base64: general_purpose::STANDARD.encode(bytes),
            account_id,
            mapping,
            default_type,
        };

        log::info!(
            "Import: submitting tabular file {} ({} bytes) to backend",
            file.name,
            file.size_bytes
        );
        self.send(self.client.post(self.url("/imports/tabular")).json(&request))
            .await
    }

    async fn import_batch(
        &self,
        candidates: &[TransactionCandidate],
        account_id: &str,
    ) -> Result<ImportOutcome, ApiError> {
        let request = BatchImportRequest {
            account_id,
            transactions: candidates,
        };

        log::info!(
            "Import: submitting batch of {} transactions to backend",
            candidates.len()
        );
        self.send(self.client.post(self.url("/imports/batch")).json(&request))
            .await
    }

    async fn get_suggestions(
        &self,
        description: &str,
        amount: Option<f64>,
        account_id: Option<&str>,
    ) -> Result<SuggestionsResponse, ApiError> {
        let mut query: Vec<(&str, String)> = vec![("description", description.to_string())];
        if let Some(amount) = amount {
            query.push(("amount", amount.to_string()));
        }
        if let Some(account_id) = account_id {
            query.push(("accountId", account_id.to_string()));
        }

        self.send(self.client.get(self.url("/suggestions")).query(&query))
            .await
    }

    async fn create_splits(
        &self,
        transaction_id: &str,
        splits: &[TransactionSplit],
    ) -> Result<(), ApiError> {
        self.send_unit(
            self.client
                .post(self.url(&format!("/transactions/{}/splits", transaction_id)))
                .json(&SplitsRequest { splits }),
        )
        .await
    }

    async fn update_splits(
        &self,
        transaction_id: &str,
        splits: &[TransactionSplit],
    ) -> Result<(), ApiError> {
        self.send_unit(
            self.client
                .put(self.url(&format!("/transactions/{}/splits", transaction_id)))
                .json(&SplitsRequest { splits }),
        )
        .await
    }

    async fn delete_splits(&self, transaction_id: &str) -> Result<(), ApiError> {
        self.send_unit(
            self.client
                .delete(self.url(&format!("/transactions/{}/splits", transaction_id))),
        )
        .await
    }
}
