//! Splitting one transaction's amount across multiple categories.
//!
//! A split set must conserve the parent amount within a cent; validation is
//! pure and runs before any backend call. Editing an existing decomposition
//! uses the update endpoint and additionally allows removing the split
//! entirely.

use crate::api::{ApiError, BackendApi};
use crate::models::TransactionSplit;
use thiserror::Error;

/// Reconciliation epsilon: split amounts must sum to the parent within this.
pub const SPLIT_EPSILON: f64 = 0.01;

/// Rounding slack allowed per split after even distribution.
pub const DISTRIBUTION_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Error, PartialEq)]
pub enum SplitError {
    #[error("A split needs at least 2 parts, got {0}")]
    TooFewParts(usize),
    #[error("Part {0} has no category")]
    MissingCategory(usize),
    #[error("Part {0} must have a positive amount")]
    NonPositiveAmount(usize),
    #[error("Split amounts differ from the transaction by {difference:.2}")]
    Unbalanced { difference: f64 },
}

#[derive(Debug, Error)]
pub enum SplitApplyError {
    #[error(transparent)]
    Validation(#[from] SplitError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("Transaction is not split")]
    NotSplit,
}

/// Signed residual: parent amount minus the sum of the split amounts.
pub fn difference(parent_amount: f64, splits: &[TransactionSplit]) -> f64 {
    parent_amount - splits.iter().map(|s| s.amount).sum::<f64>()
}

/// Validate a split set against its parent amount.
pub fn validate_splits(parent_amount: f64, splits: &[TransactionSplit]) -> Result<(), SplitError> {
    if splits.len() < 2 {
        return Err(SplitError::TooFewParts(splits.len()));
    }
    for (index, split) in splits.iter().enumerate() {
        if split.category_id.trim().is_empty() {
            return Err(SplitError::MissingCategory(index + 1));
        }
        if split.amount <= 0.0 {
            return Err(SplitError::NonPositiveAmount(index + 1));
        }
    }

    let diff = difference(parent_amount, splits);
    if diff.abs() >= SPLIT_EPSILON {
        return Err(SplitError::Unbalanced { difference: diff });
    }
    Ok(())
}

/// Set every part to an equal share of the parent amount.
///
/// Float division can leave a tiny residual; callers re-validate afterward
/// and surface anything beyond the epsilon for manual correction.
pub fn distribute_evenly(parent_amount: f64, splits: &mut [TransactionSplit]) {
    if splits.is_empty() {
        return;
    }
    let share = parent_amount / splits.len() as f64;
    for split in splits.iter_mut() {
        split.amount = share;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    /// Splitting a single-category transaction for the first time.
    Create,
    /// Revising a stored decomposition.
    EditExisting,
}

/// Editing session for one transaction's split set.
#[derive(Debug, Clone)]
pub struct SplitEditor {
    pub transaction_id: String,
    pub parent_amount: f64,
    pub mode: SplitMode,
    pub splits: Vec<TransactionSplit>,
}

impl SplitEditor {
    pub fn new(transaction_id: &str, parent_amount: f64) -> Self {
        Self {
            transaction_id: transaction_id.to_string(),
            parent_amount,
            mode: SplitMode::Create,
            splits: Vec::new(),
        }
    }

    /// Pre-populate from a stored split set.
    pub fn load_existing(
        transaction_id: &str,
        parent_amount: f64,
        splits: Vec<TransactionSplit>,
    ) -> Self {
        Self {
            transaction_id: transaction_id.to_string(),
            parent_amount,
            mode: SplitMode::EditExisting,
            splits,
        }
    }

    pub fn add_part(&mut self, category_id: &str, amount: f64) {
        self.splits.push(TransactionSplit {
            category_id: category_id.to_string(),
            amount,
            description: None,
        });
    }

    pub fn remove_part(&mut self, index: usize) {
        if index < self.splits.len() {
            self.splits.remove(index);
        }
    }

    pub fn distribute_evenly(&mut self) {
        distribute_evenly(self.parent_amount, &mut self.splits);
    }

    pub fn validate(&self) -> Result<(), SplitError> {
        validate_splits(self.parent_amount, &self.splits)
    }

    pub fn difference(&self) -> f64 {
        difference(self.parent_amount, &self.splits)
    }

    /// Persist the split set: create for a fresh split, update when editing.
    pub async fn apply<B: BackendApi>(&self, backend: &B) -> Result<(), SplitApplyError> {
        self.validate()?;
        match self.mode {
            SplitMode::Create => {
                backend
                    .create_splits(&self.transaction_id, &self.splits)
                    .await?
            }
            SplitMode::EditExisting => {
                backend
                    .update_splits(&self.transaction_id, &self.splits)
                    .await?
            }
        }
        log::info!(
            "Splits: applied {} parts to transaction {}",
            self.splits.len(),
            self.transaction_id
        );
        Ok(())
    }

    /// Delete the decomposition, restoring the single-category transaction.
    /// Only available when editing an existing split.
    pub async fn unsplit<B: BackendApi>(&self, backend: &B) -> Result<(), SplitApplyError> {
        if self.mode != SplitMode::EditExisting {
            return Err(SplitApplyError::NotSplit);
        }
        backend.delete_splits(&self.transaction_id).await?;
        Ok(())
    }
}
