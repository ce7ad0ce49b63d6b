//! Import session state machine.
//!
//! One session drives an import run end to end: file intake, configuration
//! (account + column mapping or extraction parameters), processing/review,
//! and the final commit. The stage logic is a pure transition core
//! ([`ImportSession::apply`]) with no I/O; the async [`ImportRunner`] wraps
//! it and owns the collaborator calls, the single-outstanding-request rule
//! and cancellation.

use crate::api::{ApiError, BackendApi};
use crate::csv_import::{self, mapping::InferredMapping, TabularPreview};
use crate::doc_import::{DocumentExtractor, DocumentPreview};
use crate::models::{
    Account, Category, FieldMapping, FileKind, ImportResult, Payee, SourceFile,
    TransactionCandidate, TransactionType, MAX_FILE_BYTES, MAX_TABULAR_FILES,
};
use crate::suggestions::{self, ExistingItem, RankParams, RankedSuggestions};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use uuid::Uuid;

/// Stages of an import session, forward-only with a one-step Back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportStage {
    Intake,
    Configure,
    ProcessReview,
    Commit,
}

/// What backs the session: deterministic column mapping or AI extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionKind {
    Tabular,
    DocumentAi,
}

/// Local validation failures. These block a transition in place and are
/// never sent to the backend.
#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("Add at least one file first")]
    NoFiles,
    #[error("PDF statements cannot be mixed with CSV/Excel files in one import")]
    MixedFileKinds,
    #[error("At most {MAX_TABULAR_FILES} tabular files per import, got {0}")]
    TooManyFiles(usize),
    #[error("Only one PDF statement per import")]
    MultiplePdfs,
    #[error("{0} exceeds the 10 MB file limit")]
    FileTooLarge(String),
    #[error("Select a target account first")]
    MissingAccount,
    #[error("Map the date, description and an amount column first")]
    IncompleteMapping,
    #[error("The document preview found no usable financial data")]
    NoFinancialData,
    #[error("Cannot map empty file: {0}")]
    PreviewFailed(String),
    #[error("Run the document preview before continuing")]
    PreviewPending,
    #[error("No transactions to commit; add rows manually or retry extraction")]
    NoCandidates,
    #[error("Another operation is still running")]
    ProcessingInFlight,
    #[error("This import was already committed")]
    AlreadyCommitted,
    #[error("No candidate at index {0}")]
    CandidateOutOfRange(usize),
    #[error("No file at index {0}")]
    FileOutOfRange(usize),
    #[error("A document session holds exactly one file")]
    KindNeedsSingleFile,
    #[error("PDF files require a document session")]
    KindNeedsTabularFiles,
    #[error("'{event}' is not valid in the {stage:?} stage")]
    InvalidTransition {
        stage: ImportStage,
        event: &'static str,
    },
}

/// Events the pure core reacts to.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    AddFiles(Vec<SourceFile>),
    RemoveFile(usize),
    SetKind(SessionKind),
    SetAccount(String),
    SetMapping(FieldMapping),
    /// Outcome of the document preview (usable financial data or not).
    SetPreviewAssessment(bool),
    Next,
    Back,
    SetCandidates {
        candidates: Vec<TransactionCandidate>,
        notes: Vec<String>,
    },
    UpdateCandidate(usize, TransactionCandidate),
    AddCandidate(TransactionCandidate),
    RemoveCandidate(usize),
    CommitFinished(ImportResult),
    Reset,
}

impl SessionEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::AddFiles(_) => "AddFiles",
            Self::RemoveFile(_) => "RemoveFile",
            Self::SetKind(_) => "SetKind",
            Self::SetAccount(_) => "SetAccount",
            Self::SetMapping(_) => "SetMapping",
            Self::SetPreviewAssessment(_) => "SetPreviewAssessment",
            Self::Next => "Next",
            Self::Back => "Back",
            Self::SetCandidates { .. } => "SetCandidates",
            Self::UpdateCandidate(..) => "UpdateCandidate",
            Self::AddCandidate(_) => "AddCandidate",
            Self::RemoveCandidate(_) => "RemoveCandidate",
            Self::CommitFinished(_) => "CommitFinished",
            Self::Reset => "Reset",
        }
    }
}

/// Root aggregate for one import run. Pure state: every mutation goes
/// through [`apply`](Self::apply), which enforces the stage guards.
#[derive(Debug, Clone)]
pub struct ImportSession {
    pub id: Uuid,
    pub stage: ImportStage,
    pub kind: Option<SessionKind>,
    pub files: Vec<SourceFile>,
    pub mapping: FieldMapping,
    pub target_account: Option<String>,
    pub candidates: Vec<TransactionCandidate>,
    /// Per-file processing notes (extraction warnings, row errors).
    pub notes: Vec<String>,
    /// Document sessions: did the preview find usable financial data?
    pub preview_assessment: Option<bool>,
    pub commit_result: Option<ImportResult>,
    commit_entered: bool,
}

impl Default for ImportSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            stage: ImportStage::Intake,
            kind: None,
            files: Vec::new(),
            mapping: FieldMapping::default(),
            target_account: None,
            candidates: Vec::new(),
            notes: Vec::new(),
            preview_assessment: None,
            commit_result: None,
            commit_entered: false,
        }
    }

    pub fn commit_entered(&self) -> bool {
        self.commit_entered
    }

    fn invalid(&self, event: &SessionEvent) -> SessionError {
        SessionError::InvalidTransition {
            stage: self.stage,
            event: event.name(),
        }
    }

    /// Validate a dropped batch together with the already accepted files.
    /// The whole batch is rejected on any violation; nothing is partially
    /// accepted.
    fn accept_files(&mut self, batch: Vec<SourceFile>) -> Result<(), SessionError> {
        if batch.is_empty() {
            return Err(SessionError::NoFiles);
        }
        for file in &batch {
            if file.size_bytes > MAX_FILE_BYTES {
                return Err(SessionError::FileTooLarge(file.name.clone()));
            }
        }

        let pdf_count = batch.iter().filter(|f| f.kind == FileKind::Pdf).count();
        let tabular_count = batch.len() - pdf_count;

        if pdf_count > 0 && tabular_count > 0 {
            return Err(SessionError::MixedFileKinds);
        }
        if pdf_count > 1 {
            return Err(SessionError::MultiplePdfs);
        }
        if pdf_count == 1 && !self.files.is_empty() {
            // A PDF session holds exactly one file; an existing tabular
            // session cannot absorb a PDF either.
            return Err(if self.kind == Some(SessionKind::DocumentAi) {
                SessionError::MultiplePdfs
            } else {
                SessionError::MixedFileKinds
            });
        }
        if tabular_count > 0 {
            if self.kind == Some(SessionKind::DocumentAi) {
                return Err(SessionError::MixedFileKinds);
            }
            if self.files.len() + tabular_count > MAX_TABULAR_FILES {
                return Err(SessionError::TooManyFiles(self.files.len() + tabular_count));
            }
        }

        self.kind = Some(if pdf_count == 1 {
            SessionKind::DocumentAi
        } else {
            self.kind.unwrap_or(SessionKind::Tabular)
        });
        self.files.extend(batch);
        Ok(())
    }

    fn guard_next(&self) -> Result<ImportStage, SessionError> {
        match self.stage {
            ImportStage::Intake => {
                if self.files.is_empty() {
                    return Err(SessionError::NoFiles);
                }
                Ok(ImportStage::Configure)
            }
            ImportStage::Configure => {
                if self.target_account.is_none() {
                    return Err(SessionError::MissingAccount);
                }
                match self.kind {
                    Some(SessionKind::Tabular) => {
                        if !self.mapping.is_complete() {
                            return Err(SessionError::IncompleteMapping);
                        }
                    }
                    Some(SessionKind::DocumentAi) => match self.preview_assessment {
                        Some(true) => {}
                        Some(false) => return Err(SessionError::NoFinancialData),
                        None => return Err(SessionError::PreviewPending),
                    },
                    None => return Err(SessionError::NoFiles),
                }
                Ok(ImportStage::ProcessReview)
            }
            ImportStage::ProcessReview => {
                if self.commit_entered {
                    return Err(SessionError::AlreadyCommitted);
                }
                if self.kind == Some(SessionKind::DocumentAi) && self.candidates.is_empty() {
                    return Err(SessionError::NoCandidates);
                }
                Ok(ImportStage::Commit)
            }
            ImportStage::Commit => Err(SessionError::AlreadyCommitted),
        }
    }

    /// Apply one event. Either the transition fully completes or the prior
    /// state is preserved and an error describes why.
    pub fn apply(&mut self, event: SessionEvent) -> Result<(), SessionError> {
        match event {
            SessionEvent::AddFiles(batch) => match self.stage {
                ImportStage::Intake => self.accept_files(batch),
                _ => Err(self.invalid(&SessionEvent::AddFiles(batch))),
            },
            SessionEvent::RemoveFile(index) => match self.stage {
                ImportStage::Intake => {
                    if index >= self.files.len() {
                        return Err(SessionError::FileOutOfRange(index));
                    }
                    self.files.remove(index);
                    if self.files.is_empty() {
                        self.kind = None;
                    }
                    Ok(())
                }
                _ => Err(self.invalid(&SessionEvent::RemoveFile(index))),
            },
            SessionEvent::SetKind(kind) => match self.stage {
                ImportStage::Intake | ImportStage::Configure => {
                    match kind {
                        SessionKind::DocumentAi if self.files.len() != 1 => {
                            return Err(SessionError::KindNeedsSingleFile)
                        }
                        SessionKind::Tabular
                            if self.files.iter().any(|f| f.kind == FileKind::Pdf) =>
                        {
                            return Err(SessionError::KindNeedsTabularFiles)
                        }
                        _ => {}
                    }
                    self.kind = Some(kind);
                    Ok(())
                }
                _ => Err(self.invalid(&SessionEvent::SetKind(kind))),
            },
            SessionEvent::SetAccount(account) => match self.stage {
                ImportStage::Configure => {
                    self.target_account = Some(account);
                    Ok(())
                }
                _ => Err(self.invalid(&SessionEvent::SetAccount(account))),
            },
            SessionEvent::SetMapping(mapping) => match self.stage {
                // The mapping is only mutable while configuring.
                ImportStage::Configure => {
                    self.mapping = mapping;
                    Ok(())
                }
                _ => Err(self.invalid(&SessionEvent::SetMapping(mapping))),
            },
            SessionEvent::SetPreviewAssessment(usable) => match self.stage {
                ImportStage::Configure => {
                    self.preview_assessment = Some(usable);
                    Ok(())
                }
                _ => Err(self.invalid(&SessionEvent::SetPreviewAssessment(usable))),
            },
            SessionEvent::Next => {
                let next = self.guard_next()?;
                if next == ImportStage::Commit {
                    self.commit_entered = true;
                }
                self.stage = next;
                Ok(())
            }
            SessionEvent::Back => match self.stage {
                ImportStage::Configure => {
                    self.stage = ImportStage::Intake;
                    Ok(())
                }
                ImportStage::ProcessReview => {
                    if self.commit_entered {
                        return Err(SessionError::AlreadyCommitted);
                    }
                    self.stage = ImportStage::Configure;
                    Ok(())
                }
                ImportStage::Intake | ImportStage::Commit => {
                    if self.commit_entered {
                        Err(SessionError::AlreadyCommitted)
                    } else {
                        Err(self.invalid(&SessionEvent::Back))
                    }
                }
            },
            SessionEvent::SetCandidates { candidates, notes } => match self.stage {
                // Candidates are only mutable during review.
                ImportStage::ProcessReview => {
                    self.candidates = candidates;
                    self.notes.extend(notes);
                    Ok(())
                }
                _ => Err(self.invalid(&SessionEvent::SetCandidates { candidates, notes })),
            },
            SessionEvent::UpdateCandidate(index, candidate) => match self.stage {
                ImportStage::ProcessReview => {
                    let slot = self
                        .candidates
                        .get_mut(index)
                        .ok_or(SessionError::CandidateOutOfRange(index))?;
                    *slot = candidate;
                    Ok(())
                }
                _ => Err(self.invalid(&SessionEvent::UpdateCandidate(index, candidate))),
            },
            SessionEvent::AddCandidate(candidate) => match self.stage {
                ImportStage::ProcessReview => {
                    self.candidates.push(candidate);
                    Ok(())
                }
                _ => Err(self.invalid(&SessionEvent::AddCandidate(candidate))),
            },
            SessionEvent::RemoveCandidate(index) => match self.stage {
                ImportStage::ProcessReview => {
                    if index >= self.candidates.len() {
                        return Err(SessionError::CandidateOutOfRange(index));
                    }
                    self.candidates.remove(index);
                    Ok(())
                }
                _ => Err(self.invalid(&SessionEvent::RemoveCandidate(index))),
            },
            SessionEvent::CommitFinished(result) => match self.stage {
                ImportStage::Commit => {
                    self.commit_result = Some(result);
                    Ok(())
                }
                _ => Err(self.invalid(&SessionEvent::CommitFinished(result))),
            },
            // Unconditional: clears files, mapping, candidates and results.
            SessionEvent::Reset => {
                *self = Self::new();
                Ok(())
            }
        }
    }
}

// ============================================================================
// Async Runner
// ============================================================================

/// Reference data fetched once at session start and treated as read-mostly.
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub accounts: Vec<Account>,
    pub categories: Vec<Category>,
    pub payees: Vec<Payee>,
}

/// Drives an [`ImportSession`] against the collaborators. Owns the
/// "one outstanding request" rule and cancellation; all stage logic stays in
/// the pure core.
pub struct ImportRunner<B: BackendApi, X: DocumentExtractor> {
    session: ImportSession,
    backend: B,
    extractor: X,
    reference: ReferenceData,
    rank_params: RankParams,
    default_type: TransactionType,
    is_processing: bool,
    cancel_requested: AtomicBool,
}

impl<B: BackendApi, X: DocumentExtractor> ImportRunner<B, X> {
    pub fn new(backend: B, extractor: X) -> Self {
        Self {
            session: ImportSession::new(),
            backend,
            extractor,
            reference: ReferenceData::default(),
            rank_params: RankParams::default(),
            default_type: TransactionType::Expense,
            is_processing: false,
            cancel_requested: AtomicBool::new(false),
        }
    }

    pub fn session(&self) -> &ImportSession {
        &self.session
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    pub fn set_default_type(&mut self, default_type: TransactionType) {
        self.default_type = default_type;
    }

    /// Fetch reference data. Failures degrade to empty lists; they never
    /// block the import form.
    pub async fn load_reference(&mut self) {
        match self.backend.list_accounts().await {
            Ok(accounts) => self.reference.accounts = accounts,
            Err(e) => log::warn!("Reference: account fetch failed: {}", e),
        }
        match self.backend.list_categories().await {
            Ok(categories) => self.reference.categories = categories,
            Err(e) => log::warn!("Reference: category fetch failed: {}", e),
        }
        match self.backend.list_payees().await {
            Ok(payees) => self.reference.payees = payees,
            Err(e) => log::warn!("Reference: payee fetch failed: {}", e),
        }
    }

    // Thin wrappers over the pure core -----------------------------------

    pub fn add_files(&mut self, files: Vec<SourceFile>) -> Result<(), SessionError> {
        self.guard_idle()?;
        self.session.apply(SessionEvent::AddFiles(files))
    }

    pub fn remove_file(&mut self, index: usize) -> Result<(), SessionError> {
        self.session.apply(SessionEvent::RemoveFile(index))
    }

    pub fn set_kind(&mut self, kind: SessionKind) -> Result<(), SessionError> {
        self.session.apply(SessionEvent::SetKind(kind))
    }

    pub fn set_account(&mut self, account_id: &str) -> Result<(), SessionError> {
        self.session
            .apply(SessionEvent::SetAccount(account_id.to_string()))
    }

    pub fn set_mapping(&mut self, mapping: FieldMapping) -> Result<(), SessionError> {
        self.session.apply(SessionEvent::SetMapping(mapping))
    }

    pub fn next(&mut self) -> Result<(), SessionError> {
        self.guard_idle()?;
        self.session.apply(SessionEvent::Next)
    }

    pub fn back(&mut self) -> Result<(), SessionError> {
        self.guard_idle()?;
        self.session.apply(SessionEvent::Back)
    }

    pub fn update_candidate(
        &mut self,
        index: usize,
        candidate: TransactionCandidate,
    ) -> Result<(), SessionError> {
        self.session
            .apply(SessionEvent::UpdateCandidate(index, candidate))
    }

    pub fn add_candidate(&mut self, candidate: TransactionCandidate) -> Result<(), SessionError> {
        self.session.apply(SessionEvent::AddCandidate(candidate))
    }

    pub fn remove_candidate(&mut self, index: usize) -> Result<(), SessionError> {
        self.session.apply(SessionEvent::RemoveCandidate(index))
    }

    /// Clear everything and start over.
    pub fn reset(&mut self) {
        self.is_processing = false;
        self.cancel_requested.store(false, Ordering::SeqCst);
        // Reset is infallible by construction.
        let _ = self.session.apply(SessionEvent::Reset);
    }

    fn guard_idle(&self) -> Result<(), SessionError> {
        if self.is_processing {
            return Err(SessionError::ProcessingInFlight);
        }
        Ok(())
    }

    // Configure-stage analysis -------------------------------------------

    /// Preview a tabular file and infer its column mapping. When the
    /// session has no mapping yet, the inferred one is applied.
    pub fn analyze_tabular(
        &mut self,
        index: usize,
    ) -> Result<(TabularPreview, InferredMapping), SessionError> {
        self.guard_idle()?;
        let file = self
            .session
            .files
            .get(index)
            .ok_or(SessionError::FileOutOfRange(index))?;

        let preview = csv_import::read_preview(file).map_err(|e| {
            log::warn!("Configure: preview of {} failed: {}", file.name, e);
            SessionError::PreviewFailed(e.to_string())
        })?;
        let inferred = csv_import::mapping::infer_mapping(&preview.columns, &preview.sample_rows);

        if self.session.stage == ImportStage::Configure
            && self.session.mapping == FieldMapping::default()
        {
            self.session
                .apply(SessionEvent::SetMapping(inferred.mapping.clone()))?;
        }

        Ok((preview, inferred))
    }

    /// Preview the document of a DocumentAi session and record whether it
    /// looks like usable financial data.
    pub async fn analyze_document(&mut self) -> Result<DocumentPreview, SessionError> {
        self.guard_idle()?;
        if self.session.kind != Some(SessionKind::DocumentAi) {
            return Err(SessionError::InvalidTransition {
                stage: self.session.stage,
                event: "AnalyzeDocument",
            });
        }
        let file = self.session.files.first().ok_or(SessionError::NoFiles)?.clone();

        self.is_processing = true;
        let preview = self.extractor.preview(&file).await;
        self.is_processing = false;

        match preview {
            Ok(preview) => {
                self.session
                    .apply(SessionEvent::SetPreviewAssessment(preview.has_financial_data))?;
                Ok(preview)
            }
            Err(e) => {
                self.session.apply(SessionEvent::SetPreviewAssessment(false))?;
                self.session.notes.push(e.to_string());
                Err(SessionError::NoFinancialData)
            }
        }
    }

    /// Proceed despite a failed preview assessment. The extraction outcome
    /// will carry its own low-confidence note.
    pub fn force_proceed(&mut self) -> Result<(), SessionError> {
        self.session
            .notes
            .push("Proceeding despite low-confidence preview.".to_string());
        self.session.apply(SessionEvent::SetPreviewAssessment(true))
    }

    // Processing ----------------------------------------------------------

    /// Ask for the current processing run to stop. The session stays in
    /// ProcessReview; nothing gets committed. Checked between files and
    /// phases, so an in-flight call finishes but its result is discarded.
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    fn cancelled(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Produce review candidates for every file, sequentially and in file
    /// order. One file's failure never aborts the others.
    pub async fn process(&mut self, model: Option<&str>) -> Result<(), SessionError> {
        self.guard_idle()?;
        if self.session.stage != ImportStage::ProcessReview {
            return Err(SessionError::InvalidTransition {
                stage: self.session.stage,
                event: "Process",
            });
        }

        self.is_processing = true;

        let account_id = self.session.target_account.clone().unwrap_or_default();
        let files = self.session.files.clone();
        let mut candidates = Vec::new();
        let mut notes = Vec::new();
        let mut cancelled = false;

        match self.session.kind {
            Some(SessionKind::Tabular) => {
                for file in &files {
                    if self.cancelled() {
                        cancelled = true;
                        break;
                    }
                    match csv_import::read_rows(file) {
                        Ok((columns, rows)) => {
                            let (mut file_candidates, errors) = csv_import::rows_to_candidates(
                                &columns,
                                &rows,
                                &self.session.mapping,
                                self.default_type,
                            );
                            notes.extend(errors.into_iter().map(|e| format!("{}: {}", file.name, e)));
                            candidates.append(&mut file_candidates);
                        }
                        Err(e) => {
                            log::warn!("Process: {} failed: {}", file.name, e);
                            notes.push(format!("{}: {}", file.name, e));
                        }
                    }
                }
            }
            Some(SessionKind::DocumentAi) => {
                for file in &files {
                    if self.cancelled() {
                        cancelled = true;
                        break;
                    }
                    let outcome = self
                        .extractor
                        .extract(file, &account_id, model, false)
                        .await;
                    notes.extend(outcome.notes.iter().map(|n| format!("{}: {}", file.name, n)));
                    if let Some(error) = &outcome.error {
                        // Review renders zero rows plus a retry affordance.
                        log::warn!("Process: extraction of {} failed: {}", file.name, error);
                    }
                    candidates.extend(outcome.candidates);
                }
            }
            None => {
                self.is_processing = false;
                return Err(SessionError::NoFiles);
            }
        }

        if cancelled {
            notes.push("Processing cancelled.".to_string());
        }

        let result = self
            .session
            .apply(SessionEvent::SetCandidates { candidates, notes });
        self.is_processing = false;
        self.cancel_requested.store(false, Ordering::SeqCst);
        result
    }

    // Commit ---------------------------------------------------------------

    /// Commit the session: batch endpoint for document sessions, one
    /// tabular import call per file otherwise. Partial success is reported,
    /// not escalated to total failure.
    pub async fn commit(&mut self) -> Result<ImportResult, SessionError> {
        self.guard_idle()?;
        // Entering Commit is guarded (and irreversible) in the pure core.
        self.session.apply(SessionEvent::Next)?;
        self.is_processing = true;

        let account_id = self.session.target_account.clone().unwrap_or_default();
        let mut created: u32 = 0;
        let mut errors: Vec<String> = Vec::new();

        match self.session.kind {
            Some(SessionKind::DocumentAi) => {
                match self
                    .backend
                    .import_batch(&self.session.candidates, &account_id)
                    .await
                {
                    Ok(outcome) => {
                        created = outcome.transactions_created;
                        errors.extend(outcome.errors);
                    }
                    Err(e) => errors.push(e.to_string()),
                }
            }
            Some(SessionKind::Tabular) => {
                // Files are submitted and recorded strictly in file order so
                // errors attribute to the right file.
                let files = self.session.files.clone();
                for file in &files {
                    match self
                        .backend
                        .import_tabular(file, &account_id, &self.session.mapping, self.default_type)
                        .await
                    {
                        Ok(outcome) => {
                            created += outcome.transactions_created;
                            errors.extend(
                                outcome.errors.into_iter().map(|e| format!("{}: {}", file.name, e)),
                            );
                        }
                        Err(e) => errors.push(format!("{}: {}", file.name, e)),
                    }
                }
            }
            None => {
                self.is_processing = false;
                return Err(SessionError::NoFiles);
            }
        }

        let file_count = self.session.files.len();
        let result = ImportResult {
            success: errors.is_empty(),
            message: format!(
                "Imported {} transaction(s) from {} file(s)",
                created, file_count
            ),
            transactions_created: created,
            errors,
        };

        log::info!(
            "Commit: session {} created {} transaction(s), {} error(s)",
            self.session.id,
            result.transactions_created,
            result.errors.len()
        );

        self.session
            .apply(SessionEvent::CommitFinished(result.clone()))?;
        self.is_processing = false;
        Ok(result)
    }

    // Review-stage helpers -------------------------------------------------

    /// Ranked payee/category suggestions for a candidate's description.
    pub async fn suggestions_for(
        &self,
        description: &str,
        amount: Option<f64>,
    ) -> RankedSuggestions {
        let payees: Vec<ExistingItem> = self.reference.payees.iter().map(Into::into).collect();
        let categories: Vec<ExistingItem> =
            self.reference.categories.iter().map(Into::into).collect();

        suggestions::fetch_ranked(
            &self.backend,
            description,
            amount,
            self.session.target_account.as_deref(),
            &payees,
            &categories,
            &self.rank_params,
        )
        .await
    }

    /// Create a payee mid-review. The new row is appended to the local
    /// reference cache; it is not re-fetched or reconciled against
    /// concurrent edits for the lifetime of the session.
    pub async fn create_payee(&mut self, name: &str) -> Result<Payee, ApiError> {
        let payee = self.backend.create_payee(name).await?;
        self.reference.payees.push(payee.clone());
        Ok(payee)
    }

    /// Create a category mid-review; same local-append semantics as
    /// [`create_payee`](Self::create_payee).
    pub async fn create_category(&mut self, name: &str) -> Result<Category, ApiError> {
        let category = self.backend.create_category(name).await?;
        self.reference.categories.push(category.clone());
        Ok(category)
    }
}

#[cfg(test)]
mod tests;
