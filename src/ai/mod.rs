//! AI extraction service module.
//!
//! Wraps the remote model call that turns unstructured bank documents (PDF,
//! image-based scans, messy spreadsheets) into transaction candidates. The
//! session core only ever sees structured outcomes; every failure mode of the
//! remote service is folded into [`AiError`] here.

pub mod client;
pub mod parsing;

use serde::Serialize;

// ============================================================================
// Request Configuration Constants
// ============================================================================

/// Request timeout in seconds
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Maximum retries for transient errors
pub const MAX_RETRIES: u32 = 2;

/// Base delay for exponential backoff (milliseconds)
pub const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Maximum tokens for a full extraction response
pub const MAX_TOKENS: u32 = 4000;

/// Document text is truncated to this many characters in preview-only mode
pub const PREVIEW_TEXT_LIMIT: usize = 4000;

// ============================================================================
// Structured AI Errors
// ============================================================================

/// Types of AI API errors
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AiErrorKind {
    /// Rate limit exceeded - too many requests, retry after delay
    RateLimit,
    /// Quota/credits exhausted - need to upgrade plan or switch model
    QuotaExceeded,
    /// Invalid or expired API key
    InvalidApiKey,
    /// Model not found or not available
    ModelNotFound,
    /// Server error on provider side
    ServerError,
    /// Network/connection error
    NetworkError,
    /// Other/unknown error
    Other,
}

/// Structured AI error with details
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiError {
    pub kind: AiErrorKind,
    pub message: String,
    pub model: String,
    /// Suggested retry delay in seconds (for rate limit errors)
    pub retry_after_secs: Option<u32>,
}

impl AiError {
    pub fn rate_limit(model: &str, retry_after: Option<u32>) -> Self {
        Self {
            kind: AiErrorKind::RateLimit,
            message: "Too many requests. Please wait a moment.".to_string(),
            model: model.to_string(),
            retry_after_secs: retry_after,
        }
    }

    pub fn quota_exceeded(model: &str) -> Self {
        Self {
            kind: AiErrorKind::QuotaExceeded,
            message: "Quota exhausted. Switch the model or top up credits.".to_string(),
            model: model.to_string(),
            retry_after_secs: None,
        }
    }

    pub fn invalid_api_key(model: &str) -> Self {
        Self {
            kind: AiErrorKind::InvalidApiKey,
            message: "Invalid API key. Please check your settings.".to_string(),
            model: model.to_string(),
            retry_after_secs: None,
        }
    }

    pub fn model_not_found(model: &str) -> Self {
        Self {
            kind: AiErrorKind::ModelNotFound,
            message: format!("Model '{}' is not available.", model),
            model: model.to_string(),
            retry_after_secs: None,
        }
    }

    pub fn server_error(model: &str, details: &str) -> Self {
        Self {
            kind: AiErrorKind::ServerError,
            message: format!("Extraction service error: {}", details),
            model: model.to_string(),
            retry_after_secs: Some(5),
        }
    }

    pub fn network_error(model: &str, details: &str) -> Self {
        Self {
            kind: AiErrorKind::NetworkError,
            message: format!("Network error: {}", details),
            model: model.to_string(),
            retry_after_secs: Some(3),
        }
    }

    pub fn other(model: &str, message: &str) -> Self {
        Self {
            kind: AiErrorKind::Other,
            message: message.to_string(),
            model: model.to_string(),
            retry_after_secs: None,
        }
    }
}

impl std::fmt::Display for AiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AiError {}

/// Configuration for the extraction service, supplied by the embedder.
#[derive(Debug, Clone)]
pub struct AiConfig {
    /// Messages-style completion endpoint.
    pub endpoint: String,
    pub api_key: String,
    /// Default model; callers may override per extraction.
    pub model: String,
}

/// Parse retry delay from error response (supports "4s", "4.5s", seconds as number)
pub fn parse_retry_delay(text: &str) -> Option<u32> {
    // Try to find "retryDelay": "Xs" pattern
    if let Some(idx) = text.find("retryDelay") {
        let after = &text[idx..];
        for word in after.split_whitespace().take(5) {
            let clean = word.trim_matches(|c: char| !c.is_numeric() && c != '.');
            if let Ok(secs) = clean.parse::<f64>() {
                return Some(secs.ceil() as u32);
            }
        }
    }
    // Try to find "retry in X" pattern
    if let Some(idx) = text.find("retry in") {
        let after = &text[idx + 8..];
        for word in after.split_whitespace().take(3) {
            let clean = word.trim_matches(|c: char| !c.is_numeric() && c != '.');
            if let Ok(secs) = clean.parse::<f64>() {
                return Some(secs.ceil() as u32);
            }
        }
    }
    None
}

/// Calculate exponential backoff delay
pub fn calculate_backoff_delay(attempt: u32) -> std::time::Duration {
    let delay_ms = RETRY_BASE_DELAY_MS * 2u64.pow(attempt);
    std::time::Duration::from_millis(delay_ms.min(10_000)) // Max 10 seconds
}

/// Extraction prompt. The model must answer with a bare JSON object so the
/// parser can stay strict; quirks like markdown fences are stripped anyway.
pub const EXTRACTION_PROMPT: &str = r#"You are a bank statement extraction engine. Extract every financial transaction from the document below.

Respond ONLY with JSON in this exact format:
{
  "transactions": [
    {
      "date": "YYYY-MM-DD",
      "amount": 123.45,
      "description": "text as printed",
      "type": "income" | "expense" | "transfer",
      "payee": "counterparty or null",
      "category": "best-guess category or null",
      "confidence": 0.0-1.0
    }
  ],
  "notes": ["anything ambiguous or skipped"]
}

Rules:
- amount is always positive; direction is expressed via type
- keep the original description text, do not translate or summarize it
- confidence reflects how certain you are about THAT row
- if the document contains no transactions, return an empty transactions array
"#;
