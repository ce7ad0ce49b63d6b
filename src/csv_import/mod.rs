//! Tabular file reading for CSV and Excel imports.
//!
//! Provides the preview used by the configure stage (columns, sample rows,
//! row count), the shared date/decimal parsing helpers, and the deterministic
//! row-to-candidate conversion used for review. Column inference lives in
//! [`mapping`].

pub mod mapping;

use crate::models::{FieldMapping, FileKind, SourceFile, TransactionCandidate, TransactionType};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of data rows included in a preview.
const SAMPLE_ROWS: usize = 5;

#[derive(Debug, Error)]
pub enum TabularError {
    #[error("Could not read {0}: {1}")]
    Read(String, String),
    #[error("{0} contains no data")]
    Empty(String),
    #[error("{0} is not a tabular file")]
    NotTabular(String),
}

/// Preview of a tabular file: header, a handful of sample rows, and counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabularPreview {
    pub columns: Vec<String>,
    pub sample_rows: Vec<Vec<String>>,
    /// Data rows, excluding the header.
    pub row_count: usize,
    /// Detected delimiter for CSV sources; `None` for Excel.
    pub delimiter: Option<char>,
}

/// Pick the most plausible delimiter from the header line.
pub fn detect_delimiter(line: &str) -> char {
    let semicolons = line.matches(';').count();
    let commas = line.matches(',').count();
    let tabs = line.matches('\t').count();

    if semicolons >= commas && semicolons >= tabs {
        ';'
    } else if tabs >= commas {
        '\t'
    } else {
        ','
    }
}

/// Parse a date in the formats bank exports actually use.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d.%m.%Y"))
        .or_else(|_| NaiveDate::parse_from_str(s, "%d/%m/%Y"))
        .or_else(|_| NaiveDate::parse_from_str(s, "%m/%d/%Y"))
        .ok()
}

/// Parse a decimal in either European (1.234,56) or US (1,234.56) notation,
/// tolerating currency symbols.
pub fn parse_decimal(s: &str) -> Option<f64> {
    let cleaned = s
        .replace(' ', "")
        .replace('€', "")
        .replace('$', "")
        .replace("EUR", "")
        .replace("USD", "");

    if cleaned.is_empty() {
        return None;
    }

    // If contains both . and ,
    if cleaned.contains('.') && cleaned.contains(',') {
        if cleaned.rfind(',') > cleaned.rfind('.') {
            // European: 1.234,56 -> 1234.56
            cleaned.replace('.', "").replace(',', ".").parse().ok()
        } else {
            // US: 1,234.56 -> 1234.56
            cleaned.replace(',', "").parse().ok()
        }
    } else if cleaned.contains(',') {
        // Could be a European decimal (1,5) or US thousands (1,000)
        if cleaned.len() - cleaned.rfind(',').unwrap_or(0) <= 3 {
            cleaned.replace(',', ".").parse().ok()
        } else {
            cleaned.replace(',', "").parse().ok()
        }
    } else {
        cleaned.parse().ok()
    }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.date().format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| dt.as_f64().to_string()),
        other => other.to_string().trim().to_string(),
    }
}

fn read_csv_rows(file: &SourceFile) -> Result<(Vec<String>, Vec<Vec<String>>, char), TabularError> {
    let content = std::fs::read_to_string(&file.path)
        .map_err(|e| TabularError::Read(file.name.clone(), e.to_string()))?;

    let first_line = content
        .lines()
        .next()
        .ok_or_else(|| TabularError::Empty(file.name.clone()))?;
    let delimiter = detect_delimiter(first_line);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .flexible(true)
        .from_reader(content.as_bytes());

    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| TabularError::Read(file.name.clone(), e.to_string()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| TabularError::Read(file.name.clone(), e.to_string()))?;
        rows.push(record.iter().map(|v| v.trim().to_string()).collect());
    }

    Ok((columns, rows, delimiter))
}

fn read_excel_rows(file: &SourceFile) -> Result<(Vec<String>, Vec<Vec<String>>), TabularError> {
    let mut workbook = open_workbook_auto(&file.path)
        .map_err(|e| TabularError::Read(file.name.clone(), e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| TabularError::Empty(file.name.clone()))?
        .map_err(|e| TabularError::Read(file.name.clone(), e.to_string()))?;

    let mut iter = range.rows();
    let columns: Vec<String> = iter
        .next()
        .ok_or_else(|| TabularError::Empty(file.name.clone()))?
        .iter()
        .map(cell_to_string)
        .collect();

    let rows: Vec<Vec<String>> = iter
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect();

    Ok((columns, rows))
}

/// Read the full content of a tabular file as strings.
pub fn read_rows(file: &SourceFile) -> Result<(Vec<String>, Vec<Vec<String>>), TabularError> {
    match file.kind {
        FileKind::Csv => read_csv_rows(file).map(|(c, r, _)| (c, r)),
        FileKind::Excel => read_excel_rows(file),
        FileKind::Pdf => Err(TabularError::NotTabular(file.name.clone())),
    }
}

/// Build the configure-stage preview for a tabular file.
pub fn read_preview(file: &SourceFile) -> Result<TabularPreview, TabularError> {
    let (columns, rows, delimiter) = match file.kind {
        FileKind::Csv => {
            let (c, r, d) = read_csv_rows(file)?;
            (c, r, Some(d))
        }
        FileKind::Excel => {
            let (c, r) = read_excel_rows(file)?;
            (c, r, None)
        }
        FileKind::Pdf => return Err(TabularError::NotTabular(file.name.clone())),
    };

    if columns.iter().all(|c| c.is_empty()) {
        return Err(TabularError::Empty(file.name.clone()));
    }

    Ok(TabularPreview {
        sample_rows: rows.iter().take(SAMPLE_ROWS).cloned().collect(),
        row_count: rows.len(),
        columns,
        delimiter,
    })
}

fn col_index(columns: &[String], name: &str) -> Option<usize> {
    if name.is_empty() {
        return None;
    }
    columns.iter().position(|c| c == name)
}

fn map_row_type(raw: &str, default: TransactionType) -> TransactionType {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return default;
    }
    if lower.contains("income") || lower.contains("credit") || lower.contains("deposit") {
        TransactionType::Income
    } else if lower.contains("transfer") {
        TransactionType::Transfer
    } else if lower.contains("expense")
        || lower.contains("debit")
        || lower.contains("withdrawal")
        || lower.contains("payment")
    {
        TransactionType::Expense
    } else {
        default
    }
}

/// Convert mapped rows into review candidates (confidence 1.0).
///
/// Row-level failures are collected as error strings with 1-based line
/// numbers (header is line 1) and never abort the remaining rows.
pub fn rows_to_candidates(
    columns: &[String],
    rows: &[Vec<String>],
    mapping: &FieldMapping,
    default_type: TransactionType,
) -> (Vec<TransactionCandidate>, Vec<String>) {
    let date_idx = col_index(columns, &mapping.date);
    let amount_idx = col_index(columns, &mapping.amount);
    let withdrawal_idx = col_index(columns, &mapping.withdrawal);
    let deposit_idx = col_index(columns, &mapping.deposit);
    let description_idx = col_index(columns, &mapping.description);
    let payee_idx = col_index(columns, &mapping.payee);
    let category_idx = col_index(columns, &mapping.category);
    let type_idx = col_index(columns, &mapping.transaction_type);

    let cell = |row: &[String], idx: Option<usize>| -> String {
        idx.and_then(|i| row.get(i)).cloned().unwrap_or_default()
    };

    let mut candidates = Vec::new();
    let mut errors = Vec::new();

    for (row_num, row) in rows.iter().enumerate() {
        let line = row_num + 2; // 1-based, after the header line

        let Some(date) = parse_date(&cell(row, date_idx)) else {
            errors.push(format!("Row {}: invalid date", line));
            continue;
        };

        let (amount, txn_type) = if mapping.uses_split_amounts() {
            let withdrawal = parse_decimal(&cell(row, withdrawal_idx));
            let deposit = parse_decimal(&cell(row, deposit_idx));
            match (withdrawal, deposit) {
                (Some(w), _) if w > 0.0 => (w, TransactionType::Expense),
                (_, Some(d)) if d > 0.0 => (d, TransactionType::Income),
                _ => {
                    errors.push(format!("Row {}: no withdrawal or deposit amount", line));
                    continue;
                }
            }
        } else {
            match parse_decimal(&cell(row, amount_idx)) {
                // Negative amounts are the bank's way of flagging money out
                Some(a) if a < 0.0 => (-a, TransactionType::Expense),
                Some(a) => (a, default_type),
                None => {
                    errors.push(format!("Row {}: invalid amount", line));
                    continue;
                }
            }
        };

        let txn_type = match type_idx {
            Some(_) => map_row_type(&cell(row, type_idx), txn_type),
            None => txn_type,
        };

        let mut candidate =
            TransactionCandidate::parsed(date, amount, cell(row, description_idx), txn_type);

        let payee = cell(row, payee_idx);
        if !payee.is_empty() {
            candidate.payee_name = Some(payee);
        }
        let category = cell(row, category_idx);
        if !category.is_empty() {
            candidate.category_name = Some(category);
        }

        candidates.push(candidate);
    }

    (candidates, errors)
}
