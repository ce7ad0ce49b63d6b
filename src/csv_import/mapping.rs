//! Column inference for tabular imports.
//!
//! Matches column headers against a fixed synonym table and validates the
//! guesses against sample rows. A field is left unmapped (empty string)
//! rather than mapped on a weak guess; unmapped required fields block the
//! configure stage upstream.

use super::{parse_date, parse_decimal};
use crate::models::FieldMapping;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MappedField {
    Date,
    Amount,
    Withdrawal,
    Deposit,
    Description,
    Payee,
    Category,
    TransactionType,
}

/// Header synonyms per field, all lower case. Inference order matters: the
/// earlier a field appears here, the earlier it claims a column.
const FIELD_SYNONYMS: &[(MappedField, &[&str])] = &[
    (
        MappedField::Date,
        &[
            "date",
            "txn date",
            "transaction date",
            "value date",
            "booking date",
            "posted date",
            "posting date",
        ],
    ),
    (
        MappedField::Amount,
        &["amount", "amt", "value", "transaction amount", "sum"],
    ),
    (
        MappedField::Withdrawal,
        &["withdrawal", "debit", "money out", "paid out", "outflow"],
    ),
    (
        MappedField::Deposit,
        &["deposit", "credit", "money in", "paid in", "inflow"],
    ),
    (
        MappedField::Description,
        &[
            "description",
            "narration",
            "details",
            "memo",
            "particulars",
            "reference",
            "text",
        ],
    ),
    (
        MappedField::Payee,
        &["payee", "merchant", "vendor", "counterparty", "name"],
    ),
    (MappedField::Category, &["category", "tag"]),
    (
        MappedField::TransactionType,
        &["type", "transaction type", "txn type", "dr/cr"],
    ),
];

/// Confidence for an exact header match.
const EXACT_MATCH_CONFIDENCE: f64 = 1.0;
/// Confidence for a substring match.
const PARTIAL_MATCH_CONFIDENCE: f64 = 0.7;

/// Result of column inference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferredMapping {
    pub mapping: FieldMapping,
    pub confidence: BTreeMap<MappedField, f64>,
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Score a header against one field's synonyms.
fn match_score(header: &str, synonyms: &[&str]) -> Option<f64> {
    let header = normalize(header);
    if header.is_empty() {
        return None;
    }
    for synonym in synonyms {
        if header == *synonym {
            return Some(EXACT_MATCH_CONFIDENCE);
        }
    }
    for synonym in synonyms {
        // Substring either way, but only for tokens long enough to mean
        // something ("dr/cr" aside, all synonyms are >= 3 chars).
        if header.len() >= 3 && (header.contains(synonym) || synonym.contains(header.as_str())) {
            return Some(PARTIAL_MATCH_CONFIDENCE);
        }
    }
    None
}

fn sample_values<'a>(
    columns: &[String],
    sample_rows: &'a [Vec<String>],
    column: &str,
) -> Vec<&'a str> {
    let Some(idx) = columns.iter().position(|c| c == column) else {
        return Vec::new();
    };
    sample_rows
        .iter()
        .filter_map(|row| row.get(idx))
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect()
}

/// True when a majority of the non-empty samples parse with `parse`. A
/// column whose samples are all empty passes (deposit columns are often
/// sparse); a single corrupt row does not discard an otherwise good match.
fn samples_parse<T>(values: &[&str], parse: impl Fn(&str) -> Option<T>) -> bool {
    if values.is_empty() {
        return true;
    }
    let parsed = values.iter().filter(|v| parse(v).is_some()).count();
    parsed >= values.len().div_ceil(2)
}

/// Infer a column mapping from headers and sample rows.
///
/// Every mapped value is an exact member of `columns`; fields without a
/// defensible match stay empty. With no columns or no data rows the result
/// is entirely empty and the caller reports the file as unmappable.
pub fn infer_mapping(columns: &[String], sample_rows: &[Vec<String>]) -> InferredMapping {
    let mut inferred = InferredMapping::default();

    if columns.is_empty() || sample_rows.is_empty() {
        return inferred;
    }

    let mut claimed: HashSet<usize> = HashSet::new();
    let assign = |field: MappedField, claimed: &mut HashSet<usize>| -> Option<(String, f64)> {
        let synonyms = FIELD_SYNONYMS
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, s)| *s)?;

        let mut best: Option<(usize, f64)> = None;
        for (idx, header) in columns.iter().enumerate() {
            if claimed.contains(&idx) {
                continue;
            }
            if let Some(score) = match_score(header, synonyms) {
                if best.map(|(_, s)| score > s).unwrap_or(true) {
                    best = Some((idx, score));
                }
            }
        }

        best.map(|(idx, score)| {
            claimed.insert(idx);
            (columns[idx].clone(), score)
        })
    };

    // Date, validated against the samples.
    if let Some((column, score)) = assign(MappedField::Date, &mut claimed) {
        let values = sample_values(columns, sample_rows, &column);
        if samples_parse(&values, parse_date) {
            inferred.mapping.date = column;
            inferred.confidence.insert(MappedField::Date, score);
        }
    }

    // Prefer a single amount column; fall back to the withdrawal/deposit
    // pair. Never map both layouts at once.
    if let Some((column, score)) = assign(MappedField::Amount, &mut claimed) {
        let values = sample_values(columns, sample_rows, &column);
        if samples_parse(&values, parse_decimal) {
            inferred.mapping.amount = column;
            inferred.confidence.insert(MappedField::Amount, score);
        }
    }
    if inferred.mapping.amount.is_empty() {
        let withdrawal = assign(MappedField::Withdrawal, &mut claimed);
        let deposit = assign(MappedField::Deposit, &mut claimed);
        if let (Some((w_col, w_score)), Some((d_col, d_score))) = (withdrawal, deposit) {
            let w_values = sample_values(columns, sample_rows, &w_col);
            let d_values = sample_values(columns, sample_rows, &d_col);
            if samples_parse(&w_values, parse_decimal) && samples_parse(&d_values, parse_decimal) {
                inferred.mapping.withdrawal = w_col;
                inferred.mapping.deposit = d_col;
                inferred.confidence.insert(MappedField::Withdrawal, w_score);
                inferred.confidence.insert(MappedField::Deposit, d_score);
            }
        }
    }

    for field in [
        MappedField::Description,
        MappedField::Payee,
        MappedField::Category,
        MappedField::TransactionType,
    ] {
        if let Some((column, score)) = assign(field, &mut claimed) {
            let slot = match field {
                MappedField::Description => &mut inferred.mapping.description,
                MappedField::Payee => &mut inferred.mapping.payee,
                MappedField::Category => &mut inferred.mapping.category,
                MappedField::TransactionType => &mut inferred.mapping.transaction_type,
                _ => unreachable!(),
            };
            *slot = column;
            inferred.confidence.insert(field, score);
        }
    }

    inferred
}
