//! Document import: preview and AI extraction for PDF statements and
//! AI-assisted Excel.
//!
//! Preview is local work (text layer inspection, heuristics); extraction is
//! the one long-running remote call of the pipeline. Extraction failures are
//! folded into the per-file outcome so a bad document never takes the whole
//! session down.

use crate::ai::{self, client::DocumentPayload, parsing::parse_candidates, AiConfig};
use crate::csv_import;
use crate::events::{ImportPhase, Notifier, ProgressEvent};
use crate::models::{FileKind, SourceFile, TransactionCandidate};
use base64::{engine::general_purpose, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Below this many characters the text layer is considered unusable and the
/// document goes down the OCR path.
const MIN_TEXT_LAYER_CHARS: usize = 200;

/// Characters of extracted text echoed back in the preview.
const PREVIEW_CHARS: usize = 500;

/// Minimum amount-shaped tokens for the financial-data heuristic.
const MIN_AMOUNT_MATCHES: usize = 3;

static AMOUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,3}(?:[.,]\d{3})*[.,]\d{2}\b").unwrap());
static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{4}-\d{2}-\d{2}|\d{1,2}[./]\d{1,2}[./]\d{2,4})\b").unwrap()
});

/// Statement vocabulary used alongside the amount/date counts.
const FINANCIAL_KEYWORDS: &[&str] = &[
    "balance",
    "statement",
    "account",
    "transaction",
    "payment",
    "debit",
    "credit",
    "iban",
    "total",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    DirectText,
    Ocr,
    Llm,
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Could not read {0}: {1}")]
    Read(String, String),
    #[error("{0} is not a document file")]
    Unsupported(String),
}

/// What the configure stage learns about a document before extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPreview {
    pub method: ExtractionMethod,
    pub text_length: usize,
    pub has_financial_data: bool,
    pub estimated_seconds: u32,
    pub preview_text: String,
}

/// Per-file extraction result. `error` set means the candidates are empty
/// and the review stage offers retry/manual entry instead of failing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionOutcome {
    pub file: String,
    pub method: ExtractionMethod,
    pub candidates: Vec<TransactionCandidate>,
    pub notes: Vec<String>,
    pub error: Option<String>,
}

/// Extraction collaborator used by the import session.
#[allow(async_fn_in_trait)]
pub trait DocumentExtractor: Send + Sync {
    async fn preview(&self, file: &SourceFile) -> Result<DocumentPreview, ExtractionError>;

    /// Extract candidates. Never fails the session: errors surface inside
    /// the outcome.
    async fn extract(
        &self,
        file: &SourceFile,
        account_id: &str,
        model: Option<&str>,
        preview_only: bool,
    ) -> ExtractionOutcome;
}

/// Heuristic gate: does this text look like it holds transactions?
pub fn has_financial_data(text: &str) -> bool {
    let amounts = AMOUNT_RE.find_iter(text).count();
    if amounts < MIN_AMOUNT_MATCHES {
        return false;
    }

    let lower = text.to_lowercase();
    let keyword_hits = FINANCIAL_KEYWORDS
        .iter()
        .filter(|k| lower.contains(**k))
        .count();
    let has_dates = DATE_RE.is_match(text);

    has_dates || keyword_hits >= 2
}

fn estimate_seconds(method: ExtractionMethod, text_length: usize) -> u32 {
    match method {
        ExtractionMethod::DirectText => 5 + (text_length / 4000) as u32,
        ExtractionMethod::Llm => 8 + (text_length / 4000) as u32,
        // Image-based documents go through vision processing
        ExtractionMethod::Ocr => 25,
    }
}

/// Classify an extracted text layer into a preview.
fn build_preview(method: ExtractionMethod, text: &str) -> DocumentPreview {
    let preview_text: String = text.chars().take(PREVIEW_CHARS).collect();
    DocumentPreview {
        method,
        text_length: text.len(),
        has_financial_data: has_financial_data(text),
        estimated_seconds: estimate_seconds(method, text.len()),
        preview_text,
    }
}

fn flatten_sheet(file: &SourceFile) -> Result<String, ExtractionError> {
    let (columns, rows) = csv_import::read_rows(file)
        .map_err(|e| ExtractionError::Read(file.name.clone(), e.to_string()))?;

    let mut text = columns.join("\t");
    for row in rows {
        text.push('\n');
        text.push_str(&row.join("\t"));
    }
    Ok(text)
}

/// Extractor backed by the AI extraction service.
pub struct AiDocumentExtractor {
    config: AiConfig,
    notifier: Arc<dyn Notifier>,
}

impl AiDocumentExtractor {
    pub fn new(config: AiConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self { config, notifier }
    }

    fn phase(&self, file: &str, phase: ImportPhase) {
        self.notifier.progress(ProgressEvent::started(file, phase));
    }

    fn phase_done(&self, file: &str, phase: ImportPhase) {
        self.notifier.progress(ProgressEvent::completed(file, phase));
    }

    fn phase_failed(&self, file: &str, phase: ImportPhase, detail: &str) {
        self.notifier
            .progress(ProgressEvent::failed(file, phase, detail));
    }

    /// Read the document and decide method + payload.
    fn load_document(
        &self,
        file: &SourceFile,
    ) -> Result<(ExtractionMethod, String, DocumentPayload), ExtractionError> {
        match file.kind {
            FileKind::Pdf => {
                let bytes = std::fs::read(&file.path)
                    .map_err(|e| ExtractionError::Read(file.name.clone(), e.to_string()))?;

                match pdf_extract::extract_text_from_mem(&bytes) {
                    Ok(text) if text.trim().len() >= MIN_TEXT_LAYER_CHARS => Ok((
                        ExtractionMethod::DirectText,
                        text.clone(),
                        DocumentPayload::Text(text),
                    )),
                    // No usable text layer: ship the document itself
                    _ => Ok((
                        ExtractionMethod::Ocr,
                        String::new(),
                        DocumentPayload::PdfBase64(general_purpose::STANDARD.encode(&bytes)),
                    )),
                }
            }
            FileKind::Excel => {
                let text = flatten_sheet(file)?;
                Ok((
                    ExtractionMethod::Llm,
                    text.clone(),
                    DocumentPayload::Text(text),
                ))
            }
            FileKind::Csv => Err(ExtractionError::Unsupported(file.name.clone())),
        }
    }
}

impl DocumentExtractor for AiDocumentExtractor {
    async fn preview(&self, file: &SourceFile) -> Result<DocumentPreview, ExtractionError> {
        let (method, text, _) = self.load_document(file)?;
        Ok(build_preview(method, &text))
    }

    async fn extract(
        &self,
        file: &SourceFile,
        account_id: &str,
        model: Option<&str>,
        preview_only: bool,
    ) -> ExtractionOutcome {
        let model = model.unwrap_or(&self.config.model);

        self.phase(&file.name, ImportPhase::Analyze);
        let (method, text, payload) = match self.load_document(file) {
            Ok(loaded) => loaded,
            Err(e) => {
                self.phase_failed(&file.name, ImportPhase::Analyze, &e.to_string());
                return ExtractionOutcome {
                    file: file.name.clone(),
                    method: ExtractionMethod::DirectText,
                    candidates: Vec::new(),
                    notes: vec![e.to_string()],
                    error: Some(e.to_string()),
                };
            }
        };

        let mut notes = Vec::new();
        let low_confidence = !text.is_empty() && !has_financial_data(&text);
        if low_confidence {
            notes.push(
                "Document did not look like financial data; results may be low confidence."
                    .to_string(),
            );
        }
        self.phase_done(&file.name, ImportPhase::Analyze);

        self.phase(&file.name, ImportPhase::ExtractText);
        log::info!(
            "Extraction: {} via {:?} ({} chars of text)",
            file.name,
            method,
            text.len()
        );
        self.phase_done(&file.name, ImportPhase::ExtractText);

        self.phase(&file.name, ImportPhase::AiAnalysis);
        let reply =
            match ai::client::extract_transactions(&self.config, model, &payload, preview_only)
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    log::warn!("Extraction: {} failed: {}", file.name, e);
                    self.phase_failed(&file.name, ImportPhase::AiAnalysis, &e.message);
                    notes.push(format!("Extraction failed: {}", e));
                    return ExtractionOutcome {
                        file: file.name.clone(),
                        method,
                        candidates: Vec::new(),
                        notes,
                        error: Some(e.message),
                    };
                }
            };
        self.phase_done(&file.name, ImportPhase::AiAnalysis);

        self.phase(&file.name, ImportPhase::Validate);
        let (candidates, parse_notes) = parse_candidates(&reply.raw_text);
        notes.extend(parse_notes);
        self.phase_done(&file.name, ImportPhase::Validate);

        self.phase(&file.name, ImportPhase::AccountMapping);
        log::info!(
            "Extraction: {} produced {} candidates for account {} ({} notes)",
            file.name,
            candidates.len(),
            account_id,
            notes.len()
        );
        self.phase_done(&file.name, ImportPhase::AccountMapping);

        ExtractionOutcome {
            file: file.name.clone(),
            method,
            candidates,
            notes,
            error: None,
        }
    }
}
