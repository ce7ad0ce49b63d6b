use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Per-file size ceiling enforced at intake (10 MB).
pub const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum number of tabular files per import session.
pub const MAX_TABULAR_FILES: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Csv,
    Excel,
    Pdf,
}

impl FileKind {
    /// Classify a file by its extension; unknown extensions are rejected.
    pub fn from_path(path: &std::path::Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" | "xls" => Some(Self::Excel),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn is_tabular(&self) -> bool {
        matches!(self, Self::Csv | Self::Excel)
    }
}

/// A source file accepted into an import session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFile {
    pub path: PathBuf,
    pub name: String,
    pub kind: FileKind,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Income,
    Expense,
    Transfer,
}

/// A not-yet-persisted transaction proposed by parsing or AI extraction.
///
/// Deterministically parsed rows carry confidence 1.0; extracted rows carry
/// the model-assigned value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionCandidate {
    pub id: Uuid,
    pub date: NaiveDate,
    pub amount: f64,
    pub description: String,
    pub transaction_type: TransactionType,
    pub payee_name: Option<String>,
    pub category_name: Option<String>,
    pub confidence: f64,
}

impl TransactionCandidate {
    pub fn parsed(
        date: NaiveDate,
        amount: f64,
        description: String,
        transaction_type: TransactionType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            amount,
            description,
            transaction_type,
            payee_name: None,
            category_name: None,
            confidence: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    pub name: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub usage_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payee {
    pub id: String,
    pub name: String,
    pub usage_count: Option<u32>,
}

/// Field-to-column-name mapping for tabular imports.
///
/// An empty string means "unmapped". Amount may come from a single column or
/// from a paired withdrawal/deposit layout, never both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    pub date: String,
    pub amount: String,
    pub withdrawal: String,
    pub deposit: String,
    pub description: String,
    pub payee: String,
    pub category: String,
    pub transaction_type: String,
}

impl FieldMapping {
    /// A single amount column or a complete withdrawal/deposit pair.
    pub fn has_amount_source(&self) -> bool {
        !self.amount.is_empty() || (!self.withdrawal.is_empty() && !self.deposit.is_empty())
    }

    /// Required fields per the import contract: date, description, and an
    /// amount source.
    pub fn is_complete(&self) -> bool {
        !self.date.is_empty() && !self.description.is_empty() && self.has_amount_source()
    }

    pub fn uses_split_amounts(&self) -> bool {
        self.amount.is_empty() && !self.withdrawal.is_empty() && !self.deposit.is_empty()
    }
}

/// Result of one backend import call (single file or batch).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub transactions_created: u32,
    pub errors: Vec<String>,
}

/// Aggregate result of committing an import session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub success: bool,
    pub message: String,
    pub transactions_created: u32,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SuggestionKind {
    AiSuggestion,
    Historical,
    Existing,
    CreateNew,
}

/// A ranked candidate value for a payee or category field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionItem {
    pub id: String,
    pub name: String,
    pub kind: SuggestionKind,
    pub confidence: f64,
    pub reason: String,
    pub usage_count: Option<u32>,
    pub color: Option<String>,
}

/// One allocation of a parent transaction's amount to a category.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSplit {
    pub category_id: String,
    pub amount: f64,
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_file_kind_from_extension() {
        assert_eq!(FileKind::from_path(Path::new("a.csv")), Some(FileKind::Csv));
        assert_eq!(FileKind::from_path(Path::new("a.XLSX")), Some(FileKind::Excel));
        assert_eq!(FileKind::from_path(Path::new("a.xls")), Some(FileKind::Excel));
        assert_eq!(FileKind::from_path(Path::new("a.pdf")), Some(FileKind::Pdf));
        assert_eq!(FileKind::from_path(Path::new("a.txt")), None);
        assert_eq!(FileKind::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_mapping_completeness_single_amount() {
        let mapping = FieldMapping {
            date: "Date".into(),
            amount: "Amount".into(),
            description: "Description".into(),
            ..Default::default()
        };
        assert!(mapping.is_complete());
        assert!(!mapping.uses_split_amounts());
    }

    #[test]
    fn test_mapping_completeness_split_amounts() {
        let mapping = FieldMapping {
            date: "Txn Date".into(),
            withdrawal: "Debit".into(),
            deposit: "Credit".into(),
            description: "Narration".into(),
            ..Default::default()
        };
        assert!(mapping.is_complete());
        assert!(mapping.uses_split_amounts());
    }

    #[test]
    fn test_mapping_incomplete_with_half_pair() {
        let mapping = FieldMapping {
            date: "Date".into(),
            withdrawal: "Debit".into(),
            description: "Description".into(),
            ..Default::default()
        };
        assert!(!mapping.is_complete());
    }
}
