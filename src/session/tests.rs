use super::*;
use crate::api::SuggestionsResponse;
use crate::doc_import::{
    DocumentPreview, ExtractionError, ExtractionMethod, ExtractionOutcome,
};
use crate::models::{ImportOutcome, TransactionSplit};
use chrono::NaiveDate;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

// ----------------------------------------------------------------------
// Fixtures
// ----------------------------------------------------------------------

fn tabular_file(name: &str) -> SourceFile {
    SourceFile {
        path: Path::new(name).to_path_buf(),
        name: name.to_string(),
        kind: FileKind::Csv,
        size_bytes: 1024,
    }
}

fn pdf_file(name: &str) -> SourceFile {
    SourceFile {
        path: Path::new(name).to_path_buf(),
        name: name.to_string(),
        kind: FileKind::Pdf,
        size_bytes: 1024,
    }
}

fn candidate(description: &str, amount: f64) -> TransactionCandidate {
    TransactionCandidate::parsed(
        NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
        amount,
        description.to_string(),
        TransactionType::Expense,
    )
}

fn complete_mapping() -> FieldMapping {
    FieldMapping {
        date: "Date".into(),
        amount: "Amount".into(),
        description: "Description".into(),
        ..Default::default()
    }
}

fn write_csv(dir: &tempfile::TempDir, name: &str, content: &str) -> SourceFile {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    SourceFile {
        path: path.clone(),
        name: name.to_string(),
        kind: FileKind::Csv,
        size_bytes: std::fs::metadata(&path).unwrap().len(),
    }
}

// ----------------------------------------------------------------------
// Pure state machine
// ----------------------------------------------------------------------

#[test]
fn test_intake_rejects_mixed_batch_entirely() {
    let mut session = ImportSession::new();
    let result = session.apply(SessionEvent::AddFiles(vec![
        tabular_file("a.csv"),
        pdf_file("b.pdf"),
    ]));

    assert_eq!(result, Err(SessionError::MixedFileKinds));
    // Nothing partially accepted
    assert!(session.files.is_empty());
    assert_eq!(session.kind, None);
}

#[test]
fn test_intake_rejects_second_pdf() {
    let mut session = ImportSession::new();
    session
        .apply(SessionEvent::AddFiles(vec![pdf_file("a.pdf")]))
        .unwrap();
    assert_eq!(session.kind, Some(SessionKind::DocumentAi));

    let result = session.apply(SessionEvent::AddFiles(vec![pdf_file("b.pdf")]));
    assert_eq!(result, Err(SessionError::MultiplePdfs));
    assert_eq!(session.files.len(), 1);
}

#[test]
fn test_intake_rejects_too_many_tabular_files() {
    let mut session = ImportSession::new();
    let batch: Vec<SourceFile> = (0..16).map(|i| tabular_file(&format!("f{}.csv", i))).collect();

    assert_eq!(
        session.apply(SessionEvent::AddFiles(batch)),
        Err(SessionError::TooManyFiles(16))
    );
}

#[test]
fn test_intake_rejects_oversized_file() {
    let mut session = ImportSession::new();
    let mut file = tabular_file("big.csv");
    file.size_bytes = MAX_FILE_BYTES + 1;

    assert_eq!(
        session.apply(SessionEvent::AddFiles(vec![file])),
        Err(SessionError::FileTooLarge("big.csv".into()))
    );
}

#[test]
fn test_next_requires_files_then_account_then_mapping() {
    let mut session = ImportSession::new();
    assert_eq!(session.apply(SessionEvent::Next), Err(SessionError::NoFiles));

    session
        .apply(SessionEvent::AddFiles(vec![tabular_file("a.csv")]))
        .unwrap();
    session.apply(SessionEvent::Next).unwrap();
    assert_eq!(session.stage, ImportStage::Configure);

    assert_eq!(
        session.apply(SessionEvent::Next),
        Err(SessionError::MissingAccount)
    );
    session
        .apply(SessionEvent::SetAccount("acc-1".into()))
        .unwrap();

    assert_eq!(
        session.apply(SessionEvent::Next),
        Err(SessionError::IncompleteMapping)
    );
    session
        .apply(SessionEvent::SetMapping(complete_mapping()))
        .unwrap();
    session.apply(SessionEvent::Next).unwrap();
    assert_eq!(session.stage, ImportStage::ProcessReview);
}

#[test]
fn test_document_session_blocked_without_usable_preview() {
    let mut session = ImportSession::new();
    session
        .apply(SessionEvent::AddFiles(vec![pdf_file("a.pdf")]))
        .unwrap();
    session.apply(SessionEvent::Next).unwrap();
    session
        .apply(SessionEvent::SetAccount("acc-1".into()))
        .unwrap();

    assert_eq!(
        session.apply(SessionEvent::Next),
        Err(SessionError::PreviewPending)
    );

    session
        .apply(SessionEvent::SetPreviewAssessment(false))
        .unwrap();
    assert_eq!(
        session.apply(SessionEvent::Next),
        Err(SessionError::NoFinancialData)
    );

    // Forcing past the gate is modeled as an explicit positive assessment
    session
        .apply(SessionEvent::SetPreviewAssessment(true))
        .unwrap();
    session.apply(SessionEvent::Next).unwrap();
    assert_eq!(session.stage, ImportStage::ProcessReview);
}

#[test]
fn test_document_commit_requires_candidates() {
    let mut session = ImportSession::new();
    session
        .apply(SessionEvent::AddFiles(vec![pdf_file("a.pdf")]))
        .unwrap();
    session.apply(SessionEvent::Next).unwrap();
    session
        .apply(SessionEvent::SetAccount("acc-1".into()))
        .unwrap();
    session
        .apply(SessionEvent::SetPreviewAssessment(true))
        .unwrap();
    session.apply(SessionEvent::Next).unwrap();

    assert_eq!(
        session.apply(SessionEvent::Next),
        Err(SessionError::NoCandidates)
    );

    session
        .apply(SessionEvent::AddCandidate(candidate("Coffee", 4.5)))
        .unwrap();
    session.apply(SessionEvent::Next).unwrap();
    assert_eq!(session.stage, ImportStage::Commit);
}

#[test]
fn test_back_walks_one_step_until_commit() {
    let mut session = ImportSession::new();
    session
        .apply(SessionEvent::AddFiles(vec![tabular_file("a.csv")]))
        .unwrap();
    session.apply(SessionEvent::Next).unwrap();
    session.apply(SessionEvent::Back).unwrap();
    assert_eq!(session.stage, ImportStage::Intake);

    session.apply(SessionEvent::Next).unwrap();
    session
        .apply(SessionEvent::SetAccount("acc-1".into()))
        .unwrap();
    session
        .apply(SessionEvent::SetMapping(complete_mapping()))
        .unwrap();
    session.apply(SessionEvent::Next).unwrap();
    session.apply(SessionEvent::Back).unwrap();
    assert_eq!(session.stage, ImportStage::Configure);

    session.apply(SessionEvent::Next).unwrap();
    session.apply(SessionEvent::Next).unwrap();
    assert_eq!(session.stage, ImportStage::Commit);
    assert_eq!(
        session.apply(SessionEvent::Back),
        Err(SessionError::AlreadyCommitted)
    );
}

#[test]
fn test_commit_cannot_be_entered_twice() {
    let mut session = ImportSession::new();
    session
        .apply(SessionEvent::AddFiles(vec![tabular_file("a.csv")]))
        .unwrap();
    session.apply(SessionEvent::Next).unwrap();
    session
        .apply(SessionEvent::SetAccount("acc-1".into()))
        .unwrap();
    session
        .apply(SessionEvent::SetMapping(complete_mapping()))
        .unwrap();
    session.apply(SessionEvent::Next).unwrap();
    session.apply(SessionEvent::Next).unwrap();
    assert!(session.commit_entered());

    assert_eq!(
        session.apply(SessionEvent::Next),
        Err(SessionError::AlreadyCommitted)
    );
}

#[test]
fn test_mapping_and_candidates_have_mutation_windows() {
    let mut session = ImportSession::new();
    session
        .apply(SessionEvent::AddFiles(vec![tabular_file("a.csv")]))
        .unwrap();

    // Mapping is not mutable at intake
    assert!(matches!(
        session.apply(SessionEvent::SetMapping(complete_mapping())),
        Err(SessionError::InvalidTransition { .. })
    ));
    // Candidates are not mutable before review
    assert!(matches!(
        session.apply(SessionEvent::AddCandidate(candidate("x", 1.0))),
        Err(SessionError::InvalidTransition { .. })
    ));

    session.apply(SessionEvent::Next).unwrap();
    session
        .apply(SessionEvent::SetMapping(complete_mapping()))
        .unwrap();
    session
        .apply(SessionEvent::SetAccount("acc-1".into()))
        .unwrap();
    session.apply(SessionEvent::Next).unwrap();

    // In review the mapping is frozen, candidates are editable
    assert!(matches!(
        session.apply(SessionEvent::SetMapping(FieldMapping::default())),
        Err(SessionError::InvalidTransition { .. })
    ));
    session
        .apply(SessionEvent::AddCandidate(candidate("x", 1.0)))
        .unwrap();
    session
        .apply(SessionEvent::UpdateCandidate(0, candidate("y", 2.0)))
        .unwrap();
    assert_eq!(session.candidates[0].description, "y");
    session.apply(SessionEvent::RemoveCandidate(0)).unwrap();
    assert!(session.candidates.is_empty());
}

#[test]
fn test_reset_clears_everything() {
    let mut session = ImportSession::new();
    session
        .apply(SessionEvent::AddFiles(vec![tabular_file("a.csv")]))
        .unwrap();
    session.apply(SessionEvent::Next).unwrap();
    session
        .apply(SessionEvent::SetAccount("acc-1".into()))
        .unwrap();
    session
        .apply(SessionEvent::SetMapping(complete_mapping()))
        .unwrap();

    session.apply(SessionEvent::Reset).unwrap();
    assert_eq!(session.stage, ImportStage::Intake);
    assert!(session.files.is_empty());
    assert_eq!(session.mapping, FieldMapping::default());
    assert!(session.target_account.is_none());
    assert!(session.candidates.is_empty());
    assert!(session.commit_result.is_none());
    assert!(!session.commit_entered());
}

#[test]
fn test_set_kind_guards() {
    let mut session = ImportSession::new();
    session
        .apply(SessionEvent::AddFiles(vec![
            tabular_file("a.xlsx"),
            tabular_file("b.csv"),
        ]))
        .unwrap();

    // Two files cannot become a document session
    assert_eq!(
        session.apply(SessionEvent::SetKind(SessionKind::DocumentAi)),
        Err(SessionError::KindNeedsSingleFile)
    );

    session.apply(SessionEvent::RemoveFile(1)).unwrap();
    session
        .apply(SessionEvent::SetKind(SessionKind::DocumentAi))
        .unwrap();
    assert_eq!(session.kind, Some(SessionKind::DocumentAi));

    // A PDF can never be re-labelled tabular
    let mut pdf_session = ImportSession::new();
    pdf_session
        .apply(SessionEvent::AddFiles(vec![pdf_file("s.pdf")]))
        .unwrap();
    assert_eq!(
        pdf_session.apply(SessionEvent::SetKind(SessionKind::Tabular)),
        Err(SessionError::KindNeedsTabularFiles)
    );
}

// ----------------------------------------------------------------------
// Runner with mock collaborators
// ----------------------------------------------------------------------

#[derive(Default)]
struct MockBackend {
    tabular_calls: Mutex<Vec<String>>,
    tabular_results: Mutex<Vec<Result<ImportOutcome, ApiError>>>,
    batch_result: Mutex<Option<Result<ImportOutcome, ApiError>>>,
}

impl MockBackend {
    fn queue_tabular(&self, result: Result<ImportOutcome, ApiError>) {
        self.tabular_results.lock().unwrap().push(result);
    }

    fn set_batch(&self, result: Result<ImportOutcome, ApiError>) {
        *self.batch_result.lock().unwrap() = Some(result);
    }
}

impl BackendApi for MockBackend {
    async fn list_accounts(&self) -> Result<Vec<Account>, ApiError> {
        Ok(vec![Account {
            id: "acc-1".into(),
            name: "Checking".into(),
            currency: "USD".into(),
        }])
    }
    async fn list_categories(&self) -> Result<Vec<Category>, ApiError> {
        Ok(Vec::new())
    }
    async fn list_payees(&self) -> Result<Vec<Payee>, ApiError> {
        Err(ApiError::Network("payees down".into()))
    }
    async fn create_category(&self, name: &str) -> Result<Category, ApiError> {
        Ok(Category {
            id: format!("cat-{}", name),
            name: name.to_string(),
            color: None,
            usage_count: None,
        })
    }
    async fn create_payee(&self, name: &str) -> Result<Payee, ApiError> {
        Ok(Payee {
            id: format!("pay-{}", name),
            name: name.to_string(),
            usage_count: None,
        })
    }
    async fn import_tabular(
        &self,
        file: &SourceFile,
        _account_id: &str,
        _mapping: &FieldMapping,
        _default_type: TransactionType,
    ) -> Result<ImportOutcome, ApiError> {
        self.tabular_calls.lock().unwrap().push(file.name.clone());
        let mut results = self.tabular_results.lock().unwrap();
        if results.is_empty() {
            Ok(ImportOutcome::default())
        } else {
            results.remove(0)
        }
    }
    async fn import_batch(
        &self,
        _candidates: &[TransactionCandidate],
        _account_id: &str,
    ) -> Result<ImportOutcome, ApiError> {
        self.batch_result
            .lock()
            .unwrap()
            .take()
            .unwrap_or(Ok(ImportOutcome::default()))
    }
    async fn get_suggestions(
        &self,
        _description: &str,
        _amount: Option<f64>,
        _account_id: Option<&str>,
    ) -> Result<SuggestionsResponse, ApiError> {
        Ok(SuggestionsResponse::default())
    }
    async fn create_splits(
        &self,
        _transaction_id: &str,
        _splits: &[TransactionSplit],
    ) -> Result<(), ApiError> {
        Ok(())
    }
    async fn update_splits(
        &self,
        _transaction_id: &str,
        _splits: &[TransactionSplit],
    ) -> Result<(), ApiError> {
        Ok(())
    }
    async fn delete_splits(&self, _transaction_id: &str) -> Result<(), ApiError> {
        Ok(())
    }
}

struct MockExtractor {
    preview: Option<DocumentPreview>,
    outcome: ExtractionOutcome,
}

impl MockExtractor {
    fn with_candidates(candidates: Vec<TransactionCandidate>) -> Self {
        Self {
            preview: Some(DocumentPreview {
                method: ExtractionMethod::DirectText,
                text_length: 2000,
                has_financial_data: true,
                estimated_seconds: 5,
                preview_text: "statement".into(),
            }),
            outcome: ExtractionOutcome {
                file: "s.pdf".into(),
                method: ExtractionMethod::DirectText,
                candidates,
                notes: Vec::new(),
                error: None,
            },
        }
    }

    fn failing() -> Self {
        Self {
            preview: Some(DocumentPreview {
                method: ExtractionMethod::Ocr,
                text_length: 0,
                has_financial_data: true,
                estimated_seconds: 25,
                preview_text: String::new(),
            }),
            outcome: ExtractionOutcome {
                file: "s.pdf".into(),
                method: ExtractionMethod::Ocr,
                candidates: Vec::new(),
                notes: vec!["Extraction failed: service unavailable".into()],
                error: Some("service unavailable".into()),
            },
        }
    }
}

impl DocumentExtractor for MockExtractor {
    async fn preview(&self, file: &SourceFile) -> Result<DocumentPreview, ExtractionError> {
        self.preview
            .clone()
            .ok_or_else(|| ExtractionError::Read(file.name.clone(), "no preview".into()))
    }

    async fn extract(
        &self,
        _file: &SourceFile,
        _account_id: &str,
        _model: Option<&str>,
        _preview_only: bool,
    ) -> ExtractionOutcome {
        self.outcome.clone()
    }
}

fn document_runner(
    backend: MockBackend,
    extractor: MockExtractor,
) -> ImportRunner<MockBackend, MockExtractor> {
    let mut runner = ImportRunner::new(backend, extractor);
    runner.add_files(vec![pdf_file("s.pdf")]).unwrap();
    runner.next().unwrap();
    runner.set_account("acc-1").unwrap();
    runner
}

#[tokio::test]
async fn test_document_flow_extracts_and_commits_batch() {
    let backend = MockBackend::default();
    backend.set_batch(Ok(ImportOutcome {
        transactions_created: 2,
        errors: vec!["row 2: invalid category".into()],
    }));
    let extractor = MockExtractor::with_candidates(vec![
        candidate("Coffee", 4.5),
        candidate("Rent", 1200.0),
        candidate("Groceries", 84.2),
    ]);

    let mut runner = document_runner(backend, extractor);
    let preview = runner.analyze_document().await.unwrap();
    assert!(preview.has_financial_data);

    runner.next().unwrap();
    runner.process(None).await.unwrap();
    assert_eq!(runner.session().candidates.len(), 3);

    // Backend rejects one row: partial success, not total failure
    let result = runner.commit().await.unwrap();
    assert_eq!(result.transactions_created, 2);
    assert_eq!(result.errors, vec!["row 2: invalid category".to_string()]);
    assert!(!result.success);
    assert_eq!(runner.session().stage, ImportStage::Commit);
}

#[tokio::test]
async fn test_extraction_failure_leaves_review_usable() {
    let backend = MockBackend::default();
    let extractor = MockExtractor::failing();

    let mut runner = document_runner(backend, extractor);
    runner.analyze_document().await.unwrap();
    runner.next().unwrap();
    runner.process(None).await.unwrap();

    // Zero candidates, error recorded as a note, session still in review
    assert!(runner.session().candidates.is_empty());
    assert!(runner
        .session()
        .notes
        .iter()
        .any(|n| n.contains("service unavailable")));
    assert_eq!(runner.session().stage, ImportStage::ProcessReview);

    // Manual entry remains possible
    runner.add_candidate(candidate("Manual row", 10.0)).unwrap();
    assert_eq!(runner.session().candidates.len(), 1);
}

#[tokio::test]
async fn test_tabular_flow_processes_files_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let file_a = write_csv(
        &dir,
        "a.csv",
        "Date,Amount,Description\n2024-01-05,10.00,First\nbad-row,,\n",
    );
    let file_b = write_csv(
        &dir,
        "b.csv",
        "Date,Amount,Description\n2024-01-06,20.00,Second\n",
    );

    let backend = MockBackend::default();
    backend.queue_tabular(Ok(ImportOutcome {
        transactions_created: 1,
        errors: vec!["Row 3: invalid date".into()],
    }));
    backend.queue_tabular(Ok(ImportOutcome {
        transactions_created: 1,
        errors: Vec::new(),
    }));

    let mut runner = ImportRunner::new(backend, MockExtractor::failing());
    runner.add_files(vec![file_a, file_b]).unwrap();
    runner.next().unwrap();
    runner.set_account("acc-1").unwrap();

    let (preview, inferred) = runner.analyze_tabular(0).unwrap();
    assert_eq!(preview.columns, vec!["Date", "Amount", "Description"]);
    assert!(inferred.mapping.is_complete());
    // Inference auto-applied to the session
    assert!(runner.session().mapping.is_complete());

    runner.next().unwrap();
    runner.process(None).await.unwrap();
    // Candidates from both files, bad row surfaced as a note
    assert_eq!(runner.session().candidates.len(), 2);
    assert_eq!(runner.session().candidates[0].description, "First");
    assert_eq!(runner.session().candidates[1].description, "Second");
    assert!(runner
        .session()
        .notes
        .iter()
        .any(|n| n.starts_with("a.csv:")));

    let result = runner.commit().await.unwrap();
    assert_eq!(result.transactions_created, 2);
    assert_eq!(result.errors, vec!["a.csv: Row 3: invalid date".to_string()]);
    assert!(!result.success);
    assert!(result.message.contains("2 file(s)"));
}

#[tokio::test]
async fn test_tabular_commit_survives_one_file_failing() {
    let dir = tempfile::tempdir().unwrap();
    let file_a = write_csv(&dir, "a.csv", "Date,Amount,Description\n2024-01-05,10.00,x\n");
    let file_b = write_csv(&dir, "b.csv", "Date,Amount,Description\n2024-01-06,20.00,y\n");

    let backend = MockBackend::default();
    backend.queue_tabular(Err(ApiError::Http {
        status: 500,
        message: "boom".into(),
    }));
    backend.queue_tabular(Ok(ImportOutcome {
        transactions_created: 1,
        errors: Vec::new(),
    }));

    let mut runner = ImportRunner::new(backend, MockExtractor::failing());
    runner.add_files(vec![file_a, file_b]).unwrap();
    runner.next().unwrap();
    runner.set_account("acc-1").unwrap();
    runner.set_mapping(complete_mapping()).unwrap();
    runner.next().unwrap();
    runner.process(None).await.unwrap();

    let result = runner.commit().await.unwrap();
    // Second file still imported; first file's failure is attributed
    assert_eq!(result.transactions_created, 1);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("a.csv:"));
    assert!(!result.success);
}

#[tokio::test]
async fn test_commit_twice_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let file = write_csv(&dir, "a.csv", "Date,Amount,Description\n2024-01-05,10.00,x\n");

    let mut runner = ImportRunner::new(MockBackend::default(), MockExtractor::failing());
    runner.add_files(vec![file]).unwrap();
    runner.next().unwrap();
    runner.set_account("acc-1").unwrap();
    runner.set_mapping(complete_mapping()).unwrap();
    runner.next().unwrap();
    runner.process(None).await.unwrap();

    runner.commit().await.unwrap();
    assert!(matches!(
        runner.commit().await,
        Err(SessionError::AlreadyCommitted)
    ));
}

#[tokio::test]
async fn test_cancel_before_processing_keeps_review_empty() {
    let backend = MockBackend::default();
    let extractor = MockExtractor::with_candidates(vec![candidate("Coffee", 4.5)]);

    let mut runner = document_runner(backend, extractor);
    runner.analyze_document().await.unwrap();
    runner.next().unwrap();

    // Cancellation requested before the loop starts: the file is skipped
    runner.request_cancel();
    runner.process(None).await.unwrap();

    assert_eq!(runner.session().stage, ImportStage::ProcessReview);
    assert!(runner.session().candidates.is_empty());
    assert!(runner
        .session()
        .notes
        .iter()
        .any(|n| n.contains("cancelled")));
}

#[tokio::test]
async fn test_reference_load_degrades_per_list() {
    let mut runner = ImportRunner::new(MockBackend::default(), MockExtractor::failing());
    runner.load_reference().await;

    // Accounts loaded, payees failed quietly
    assert_eq!(runner.reference().accounts.len(), 1);
    assert!(runner.reference().payees.is_empty());
}

#[tokio::test]
async fn test_mid_review_reference_creation_appends_locally() {
    let mut runner = ImportRunner::new(MockBackend::default(), MockExtractor::failing());
    runner.load_reference().await;

    let payee = runner.create_payee("New Grocer").await.unwrap();
    assert_eq!(payee.name, "New Grocer");
    assert_eq!(runner.reference().payees.len(), 1);

    let category = runner.create_category("Hobbies").await.unwrap();
    assert!(runner
        .reference()
        .categories
        .iter()
        .any(|c| c.id == category.id));
}
