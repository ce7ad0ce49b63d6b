//! HTTP client for the extraction service (messages-style completion API).

use super::{
    calculate_backoff_delay, parse_retry_delay, AiConfig, AiError, AiErrorKind, EXTRACTION_PROMPT,
    MAX_RETRIES, MAX_TOKENS, PREVIEW_TEXT_LIMIT, REQUEST_TIMEOUT_SECS,
};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Document content shipped to the model.
#[derive(Debug, Clone)]
pub enum DocumentPayload {
    /// Extracted text layer, sent inline with the prompt.
    Text(String),
    /// Base64-encoded PDF bytes for image-based documents.
    PdfBase64(String),
}

/// Raw reply from the extraction service, before candidate parsing.
#[derive(Debug, Clone)]
pub struct ExtractionReply {
    pub raw_text: String,
    pub model: String,
    pub tokens_used: Option<u32>,
}

#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "document")]
    Document { source: DocumentSource },
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Serialize)]
struct DocumentSource {
    #[serde(rename = "type")]
    source_type: String,
    media_type: String,
    data: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseContent>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ResponseContent {
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

/// Map an HTTP error reply to a structured error
fn parse_error(status: u16, body: &str, model: &str) -> AiError {
    let body_lower = body.to_lowercase();

    match status {
        429 => {
            if body_lower.contains("quota") || body_lower.contains("credit") {
                AiError::quota_exceeded(model)
            } else {
                let retry_after = parse_retry_delay(body);
                AiError::rate_limit(model, retry_after)
            }
        }
        401 | 403 => AiError::invalid_api_key(model),
        404 => AiError::model_not_found(model),
        500..=599 => AiError::server_error(model, &format!("HTTP {}", status)),
        _ => {
            let snippet: String = body.chars().take(200).collect();
            AiError::other(model, &format!("HTTP {}: {}", status, snippet))
        }
    }
}

/// Check if error is retryable
fn is_retryable(err: &AiError) -> bool {
    matches!(
        err.kind,
        AiErrorKind::RateLimit | AiErrorKind::ServerError | AiErrorKind::NetworkError
    )
}

fn build_request(model: &str, payload: &DocumentPayload, preview_only: bool) -> MessagesRequest {
    let max_tokens = if preview_only { MAX_TOKENS / 2 } else { MAX_TOKENS };

    let content = match payload {
        DocumentPayload::Text(text) => {
            let mut text = text.as_str();
            if preview_only {
                let cut = text
                    .char_indices()
                    .nth(PREVIEW_TEXT_LIMIT)
                    .map(|(i, _)| i)
                    .unwrap_or(text.len());
                text = &text[..cut];
            }
            vec![ContentBlock::Text {
                text: format!("{}\nDOCUMENT:\n{}", EXTRACTION_PROMPT, text),
            }]
        }
        DocumentPayload::PdfBase64(data) => vec![
            ContentBlock::Document {
                source: DocumentSource {
                    source_type: "base64".to_string(),
                    media_type: "application/pdf".to_string(),
                    data: data.clone(),
                },
            },
            ContentBlock::Text {
                text: EXTRACTION_PROMPT.to_string(),
            },
        ],
    };

    MessagesRequest {
        model: model.to_string(),
        max_tokens,
        messages: vec![Message {
            role: "user".to_string(),
            content,
        }],
    }
}

/// Run one extraction call with retry logic.
pub async fn extract_transactions(
    config: &AiConfig,
    model: &str,
    payload: &DocumentPayload,
    preview_only: bool,
) -> Result<ExtractionReply, AiError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        "x-api-key",
        HeaderValue::from_str(&config.api_key).map_err(|_| AiError::invalid_api_key(model))?,
    );
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    // Create client with timeout and connection pooling
    let client = reqwest::Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .pool_max_idle_per_host(2)
        .build()
        .map_err(|e| AiError::network_error(model, &e.to_string()))?;

    let request_body = build_request(model, payload, preview_only);

    // Retry loop with exponential backoff
    let mut last_error = AiError::other(model, "No attempts made");

    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            tokio::time::sleep(calculate_backoff_delay(attempt - 1)).await;
        }

        let response = match client.post(&config.endpoint).json(&request_body).send().await {
            Ok(resp) => resp,
            Err(e) => {
                last_error = if e.is_timeout() {
                    AiError::network_error(model, "request timed out")
                } else if e.is_connect() {
                    AiError::network_error(model, "connection failed")
                } else {
                    AiError::network_error(model, &e.to_string())
                };

                if attempt < MAX_RETRIES && is_retryable(&last_error) {
                    continue;
                }
                return Err(last_error);
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            last_error = parse_error(status.as_u16(), &body, model);

            if attempt < MAX_RETRIES && is_retryable(&last_error) {
                continue;
            }
            return Err(last_error);
        }

        // Success - parse response
        let data: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AiError::other(model, &format!("JSON parse error: {}", e)))?;

        let raw_text = data
            .content
            .first()
            .and_then(|c| c.text.clone())
            .unwrap_or_default();

        return Ok(ExtractionReply {
            raw_text,
            model: model.to_string(),
            tokens_used: data.usage.map(|u| u.input_tokens + u.output_tokens),
        });
    }

    Err(last_error)
}
