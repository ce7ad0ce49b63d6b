//! Parsing of extraction-service replies into transaction candidates.
//!
//! The model is told to answer with bare JSON, but replies routinely arrive
//! wrapped in markdown fences or with prose around them. Everything here is
//! defensive: a malformed row becomes a note, never an error that aborts the
//! import.

use crate::csv_import::parse_date;
use crate::models::{TransactionCandidate, TransactionType};
use serde::Deserialize;
use uuid::Uuid;

/// Candidate row as the model reports it, before shape validation.
#[derive(Debug, Deserialize)]
struct RawCandidate {
    #[serde(default)]
    date: String,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    description: String,
    #[serde(default, rename = "type")]
    txn_type: Option<String>,
    #[serde(default)]
    payee: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(default)]
    transactions: Vec<RawCandidate>,
    #[serde(default)]
    notes: Vec<String>,
}

/// Extract JSON from an AI response (handles markdown code blocks)
pub fn extract_json(response: &str) -> String {
    // Try to find JSON in code block
    if let Some(start) = response.find("```json") {
        let after = &response[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    // Try to find JSON in generic code block
    if let Some(start) = response.find("```") {
        let after = &response[start + 3..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    // Try to find JSON object directly
    if let Some(start) = response.find('{') {
        if let Some(end) = response.rfind('}') {
            if end > start {
                return response[start..=end].to_string();
            }
        }
    }

    response.to_string()
}

fn parse_type(raw: Option<&str>) -> TransactionType {
    match raw.map(|t| t.trim().to_lowercase()).as_deref() {
        Some("income") | Some("deposit") | Some("credit") => TransactionType::Income,
        Some("transfer") => TransactionType::Transfer,
        // Expense is the safe default for statement rows with an unknown tag
        _ => TransactionType::Expense,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parse the model reply into validated candidates plus processing notes.
///
/// Rows with an unparseable date or missing amount are dropped and reported
/// as notes; confidence is clamped into [0, 1].
pub fn parse_candidates(raw: &str) -> (Vec<TransactionCandidate>, Vec<String>) {
    let json = extract_json(raw);

    let extraction: RawExtraction = match serde_json::from_str(&json) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::warn!("Extraction: reply was not parseable JSON: {}", e);
            return (
                Vec::new(),
                vec![format!("Extraction reply could not be parsed: {}", e)],
            );
        }
    };

    let mut candidates = Vec::new();
    let mut notes = extraction.notes;

    for (index, row) in extraction.transactions.into_iter().enumerate() {
        let Some(date) = parse_date(row.date.trim()) else {
            notes.push(format!(
                "Row {}: unparseable date '{}', skipped",
                index + 1,
                row.date
            ));
            continue;
        };

        let Some(amount) = row.amount else {
            notes.push(format!("Row {}: missing amount, skipped", index + 1));
            continue;
        };
        if amount < 0.0 {
            notes.push(format!(
                "Row {}: negative amount {:.2}, skipped (direction belongs in type)",
                index + 1,
                amount
            ));
            continue;
        }

        candidates.push(TransactionCandidate {
            id: Uuid::new_v4(),
            date,
            amount,
            description: row.description.trim().to_string(),
            transaction_type: parse_type(row.txn_type.as_deref()),
            payee_name: non_empty(row.payee),
            category_name: non_empty(row.category),
            confidence: row.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
        });
    }

    (candidates, notes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_fenced_block() {
        let raw = "Here you go:\n```json\n{\"transactions\": []}\n```\nDone.";
        assert_eq!(extract_json(raw), "{\"transactions\": []}");
    }

    #[test]
    fn test_extract_json_from_plain_object() {
        let raw = "prefix {\"transactions\": []} suffix";
        assert_eq!(extract_json(raw), "{\"transactions\": []}");
    }

    #[test]
    fn test_parse_candidates_valid_rows() {
        let raw = r#"{
            "transactions": [
                {"date": "2024-01-05", "amount": 150.0, "description": "Coffee Shop",
                 "type": "expense", "payee": "Blue Bottle", "category": "Dining", "confidence": 0.92},
                {"date": "2024-01-06", "amount": 2000.0, "description": "Salary",
                 "type": "income", "confidence": 0.99}
            ],
            "notes": ["page 2 was blank"]
        }"#;
        let (candidates, notes) = parse_candidates(raw);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].transaction_type, TransactionType::Expense);
        assert_eq!(candidates[0].payee_name.as_deref(), Some("Blue Bottle"));
        assert_eq!(candidates[1].transaction_type, TransactionType::Income);
        assert!(candidates[1].payee_name.is_none());
        assert_eq!(notes, vec!["page 2 was blank".to_string()]);
    }

    #[test]
    fn test_parse_candidates_drops_bad_rows_with_notes() {
        let raw = r#"{
            "transactions": [
                {"date": "not-a-date", "amount": 5.0, "description": "x"},
                {"date": "2024-02-01", "description": "missing amount"},
                {"date": "2024-02-02", "amount": -3.0, "description": "negative"},
                {"date": "2024-02-03", "amount": 3.0, "description": "ok", "confidence": 1.7}
            ]
        }"#;
        let (candidates, notes) = parse_candidates(raw);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].confidence, 1.0); // Clamped
        assert_eq!(notes.len(), 3);
    }

    #[test]
    fn test_parse_candidates_garbage_reply() {
        let (candidates, notes) = parse_candidates("I could not read the document, sorry.");
        assert!(candidates.is_empty());
        assert_eq!(notes.len(), 1);
    }

    #[test]
    fn test_unknown_type_defaults_to_expense() {
        assert_eq!(parse_type(Some("debit?")), TransactionType::Expense);
        assert_eq!(parse_type(None), TransactionType::Expense);
        assert_eq!(parse_type(Some("TRANSFER")), TransactionType::Transfer);
    }
}
