//! Orchestration tests with scripted engines.
//!
//! No real engine is started: every adapter here is a fake whose behavior is
//! fixed per test, so these run everywhere.

use async_trait::async_trait;
use edgequake_docconv::{
    ConversionObserver, ConversionOptions, ConversionRequest, ConvertError, Converter, ConverterConfig,
    DocumentFormat, EngineAdapter, EngineAttempt, EngineId, EngineJob, EngineSet, ErrorKind, FormatPair,
    TelemetryEvent,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Fakes ────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Script {
    Succeed,
    NotFound,
    Crash,
    PartialThenCrash,
    Hang,
    SlowSucceed(Duration),
}

#[derive(Default)]
struct Tally {
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    inputs: Mutex<Vec<PathBuf>>,
}

struct FakeEngine {
    id: EngineId,
    script: Script,
    tally: Arc<Tally>,
}

impl FakeEngine {
    fn new(id: EngineId, script: Script) -> (Self, Arc<Tally>) {
        let tally = Arc::new(Tally::default());
        (
            Self {
                id,
                script,
                tally: Arc::clone(&tally),
            },
            tally,
        )
    }
}

#[async_trait]
impl EngineAdapter for FakeEngine {
    fn id(&self) -> EngineId {
        self.id
    }

    async fn convert(&self, job: &EngineJob) -> Result<(), ConvertError> {
        self.tally.calls.fetch_add(1, Ordering::SeqCst);
        self.tally.inputs.lock().unwrap().push(job.input.clone());
        let engine = self.id.to_string();
        let write = |bytes: &'static [u8]| {
            let path = job.output.clone();
            async move { tokio::fs::write(&path, bytes).await.map_err(|e| ConvertError::io(&path, e)) }
        };

        match self.script {
            Script::Succeed => write(b"%PDF-1.7 fake").await,
            Script::NotFound => Err(ConvertError::EngineNotFound {
                engine,
                detail: "searched /opt/engine".into(),
            }),
            Script::Crash => Err(ConvertError::EngineExecution {
                engine,
                detail: "exited with signal 11".into(),
            }),
            Script::PartialThenCrash => {
                write(b"%PDF-1.7 trunc").await?;
                Err(ConvertError::EngineExecution {
                    engine,
                    detail: "exited with status 1".into(),
                })
            }
            Script::Hang => {
                job.deadline
                    .run(self.id, async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(())
                    })
                    .await
            }
            Script::SlowSucceed(delay) => {
                let now = self.tally.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.tally.max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                self.tally.in_flight.fetch_sub(1, Ordering::SeqCst);
                write(b"%PDF-1.7 fake").await
            }
        }
    }
}

#[derive(Default)]
struct CountingObserver {
    starts: AtomicUsize,
    attempts: Mutex<Vec<EngineAttempt>>,
    completed: Mutex<Vec<TelemetryEvent>>,
}

impl ConversionObserver for CountingObserver {
    fn on_conversion_start(&self, _pair: FormatPair) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn on_attempt(&self, attempt: &EngineAttempt) {
        self.attempts.lock().unwrap().push(attempt.clone());
    }

    fn on_conversion_complete(&self, event: &TelemetryEvent) {
        self.completed.lock().unwrap().push(event.clone());
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn config(tmp: &Path) -> ConverterConfig {
    ConverterConfig::builder()
        .temp_root(tmp.join("scratch"))
        .build()
        .unwrap()
}

fn no_preprocess() -> ConversionOptions {
    ConversionOptions {
        preprocess: Some(false),
        ..Default::default()
    }
}

fn input(tmp: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = tmp.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// A minimal valid WordprocessingML package.
fn docx(tmp: &Path, name: &str) -> PathBuf {
    let path = tmp.join(name);
    let mut zip = zip::ZipWriter::new(std::fs::File::create(&path).unwrap());
    let opts = zip::write::SimpleFileOptions::default();
    let parts: [(&str, &str); 2] = [
        (
            "[Content_Types].xml",
            r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"/>"#,
        ),
        (
            "word/document.xml",
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body><w:p><w:r><w:rPr><w:color w:val="000000" w:themeColor="accent1"/></w:rPr><w:t>Hello</w:t></w:r></w:p></w:body></w:document>"#,
        ),
    ];
    for (name, body) in parts {
        zip.start_file(name, opts).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
    path
}

fn scratch_is_empty(tmp: &Path) -> bool {
    std::fs::read_dir(tmp.join("scratch"))
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

// ── Fallback chain ───────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_primary_falls_back_to_secondary() {
    let tmp = tempfile::tempdir().unwrap();
    let (office, office_tally) = FakeEngine::new(EngineId::LibreOffice, Script::NotFound);
    let (browser, browser_tally) = FakeEngine::new(EngineId::Chromium, Script::Succeed);
    let converter =
        Converter::with_engines(config(tmp.path()), EngineSet::new().with(office).with(browser)).unwrap();

    let out = tmp.path().join("out").join("report.pdf");
    let request = ConversionRequest::from_paths(input(tmp.path(), "report.docx", b"PK"), &out)
        .unwrap()
        .with_options(no_preprocess());
    let result = converter.convert(&request).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.method, Some(EngineId::Chromium));
    assert_eq!(result.output.as_deref(), Some(out.as_path()));
    assert_eq!(std::fs::read(&out).unwrap(), b"%PDF-1.7 fake");
    assert_eq!(result.attempts.len(), 2);
    assert!(!result.attempts[0].success);
    assert_eq!(result.attempts[0].error.as_ref().unwrap().kind, ErrorKind::EngineNotFound);
    assert!(result.attempts[1].success);
    assert_eq!(office_tally.calls.load(Ordering::SeqCst), 1);
    assert_eq!(browser_tally.calls.load(Ordering::SeqCst), 1);
    assert!(result.fidelity.unwrap() < 0.9);
    assert!(scratch_is_empty(tmp.path()));
}

#[tokio::test]
async fn exhausted_chain_reports_the_last_error() {
    let tmp = tempfile::tempdir().unwrap();
    let (office, _) = FakeEngine::new(EngineId::LibreOffice, Script::NotFound);
    let (browser, _) = FakeEngine::new(EngineId::Chromium, Script::Crash);
    let converter =
        Converter::with_engines(config(tmp.path()), EngineSet::new().with(office).with(browser)).unwrap();

    let request = ConversionRequest::from_paths(input(tmp.path(), "a.docx", b"PK"), tmp.path().join("a.pdf"))
        .unwrap()
        .with_options(no_preprocess());
    let result = converter.convert(&request).await;

    assert!(!result.success);
    assert!(result.output.is_none());
    let err = result.error.clone().unwrap();
    assert_eq!(err.kind, ErrorKind::EngineExecution);
    assert!(err.message.contains("chromium"));
    assert!(!err.message.contains("signal 11"), "engine detail leaked: {}", err.message);

    let kinds: Vec<_> = result.attempt_errors().map(|(e, info)| (e, info.kind)).collect();
    assert_eq!(
        kinds,
        [
            (EngineId::LibreOffice, ErrorKind::EngineNotFound),
            (EngineId::Chromium, ErrorKind::EngineExecution),
        ]
    );
    assert!(!tmp.path().join("a.pdf").exists());
    assert!(scratch_is_empty(tmp.path()));
}

#[tokio::test]
async fn unregistered_engine_counts_as_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let (reconstruct, _) = FakeEngine::new(EngineId::Reconstruct, Script::Succeed);
    let converter = Converter::with_engines(config(tmp.path()), EngineSet::new().with(reconstruct)).unwrap();

    let request =
        ConversionRequest::from_paths(input(tmp.path(), "scan.pdf", b"%PDF"), tmp.path().join("scan.docx")).unwrap();
    let result = converter.convert(&request).await;

    assert_eq!(result.method, Some(EngineId::Reconstruct));
    assert_eq!(result.attempts[0].engine, EngineId::LibreOffice);
    assert_eq!(result.attempts[0].error.as_ref().unwrap().kind, ErrorKind::EngineNotFound);
    assert!(result.preprocessing.is_none());
}

// ── Output handling ──────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_attempt_leaves_no_partial_output() {
    let tmp = tempfile::tempdir().unwrap();
    let (office, _) = FakeEngine::new(EngineId::LibreOffice, Script::PartialThenCrash);
    let converter = Converter::with_engines(config(tmp.path()), EngineSet::new().with(office)).unwrap();

    let out = tmp.path().join("sheet.pdf");
    let request = ConversionRequest::from_paths(input(tmp.path(), "sheet.xlsx", b"PK"), &out).unwrap();
    let result = converter.convert(&request).await;

    assert!(!result.success);
    assert!(!out.exists());
    assert!(scratch_is_empty(tmp.path()));
}

#[tokio::test]
async fn success_replaces_existing_output() {
    let tmp = tempfile::tempdir().unwrap();
    let (office, _) = FakeEngine::new(EngineId::LibreOffice, Script::Succeed);
    let converter = Converter::with_engines(config(tmp.path()), EngineSet::new().with(office)).unwrap();

    let out = input(tmp.path(), "deck.pdf", b"stale contents from yesterday");
    let request = ConversionRequest::from_paths(input(tmp.path(), "deck.pptx", b"PK"), &out).unwrap();
    let result = converter.convert(&request).await;

    assert!(result.success);
    assert_eq!(result.content_type(), Some("application/pdf"));
    assert_eq!(std::fs::read(&out).unwrap(), b"%PDF-1.7 fake");
}

// ── Deadlines ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn request_timeout_stops_the_chain() {
    let tmp = tempfile::tempdir().unwrap();
    let (office, _) = FakeEngine::new(EngineId::LibreOffice, Script::Hang);
    let (browser, browser_tally) = FakeEngine::new(EngineId::Chromium, Script::Succeed);
    let converter =
        Converter::with_engines(config(tmp.path()), EngineSet::new().with(office).with(browser)).unwrap();

    let request = ConversionRequest::from_paths(input(tmp.path(), "slow.docx", b"PK"), tmp.path().join("slow.pdf"))
        .unwrap()
        .with_options(ConversionOptions {
            timeout_secs: Some(1),
            preprocess: Some(false),
            ..Default::default()
        });
    let started = std::time::Instant::now();
    let result = converter.convert(&request).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!result.success);
    assert_eq!(result.error.unwrap().kind, ErrorKind::EngineTimeout);
    assert_eq!(result.attempts.len(), 1);
    assert_eq!(browser_tally.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn oversized_request_timeout_is_rejected_not_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let (browser, browser_tally) = FakeEngine::new(EngineId::Chromium, Script::Succeed);
    let converter = Converter::with_engines(config(tmp.path()), EngineSet::new().with(browser)).unwrap();

    let request = ConversionRequest::from_paths(input(tmp.path(), "notes.txt", b"hello"), tmp.path().join("notes.pdf"))
        .unwrap()
        .with_options(ConversionOptions {
            timeout_secs: Some(u64::MAX),
            ..Default::default()
        });
    let result = converter.convert(&request).await;

    assert!(!result.success);
    assert_eq!(result.error.unwrap().kind, ErrorKind::Validation);
    assert_eq!(browser_tally.calls.load(Ordering::SeqCst), 0);
    assert_eq!(converter.gate_stats().issued, 0);
}

#[tokio::test]
async fn engine_timeout_falls_back_when_request_has_time_left() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = ConverterConfig::builder()
        .temp_root(tmp.path().join("scratch"))
        .chromium_timeout_secs(1)
        .build()
        .unwrap();
    let (browser, _) = FakeEngine::new(EngineId::Chromium, Script::Hang);
    let (office, _) = FakeEngine::new(EngineId::LibreOffice, Script::Succeed);
    let converter = Converter::with_engines(cfg, EngineSet::new().with(browser).with(office)).unwrap();

    let request =
        ConversionRequest::from_paths(input(tmp.path(), "page.html", b"<p>x</p>"), tmp.path().join("page.pdf"))
            .unwrap();
    let result = converter.convert(&request).await;

    assert!(result.success);
    assert_eq!(result.method, Some(EngineId::LibreOffice));
    assert_eq!(result.attempts[0].error.as_ref().unwrap().kind, ErrorKind::EngineTimeout);
}

// ── Preprocessing ────────────────────────────────────────────────────────────

#[tokio::test]
async fn corrupt_docx_degrades_to_the_original_input() {
    let tmp = tempfile::tempdir().unwrap();
    let (office, tally) = FakeEngine::new(EngineId::LibreOffice, Script::Succeed);
    let converter = Converter::with_engines(config(tmp.path()), EngineSet::new().with(office)).unwrap();

    let original = input(tmp.path(), "broken.docx", b"this is not a zip archive");
    let request = ConversionRequest::from_paths(&original, tmp.path().join("broken.pdf")).unwrap();
    let result = converter.convert(&request).await;

    assert!(result.success, "{:?}", result.error);
    let pre = result.preprocessing.unwrap();
    assert!(!pre.applied);
    assert!(pre.degraded.is_some());
    assert!(pre.counters.is_empty());
    assert_eq!(tally.inputs.lock().unwrap().as_slice(), [original]);
    assert_eq!(result.fidelity, Some(0.9));
}

#[tokio::test]
async fn engines_receive_the_preprocessed_package() {
    let tmp = tempfile::tempdir().unwrap();
    let (office, tally) = FakeEngine::new(EngineId::LibreOffice, Script::Succeed);
    let converter = Converter::with_engines(config(tmp.path()), EngineSet::new().with(office)).unwrap();

    let original = docx(tmp.path(), "memo.docx");
    let request = ConversionRequest::from_paths(&original, tmp.path().join("memo.pdf")).unwrap();
    let result = converter.convert(&request).await;

    assert!(result.success, "{:?}", result.error);
    let pre = result.preprocessing.unwrap();
    assert!(pre.applied);
    assert!(pre.degraded.is_none());
    assert!(pre.counters.total() > 0, "{}", pre.counters);

    let seen = tally.inputs.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert_ne!(seen[0], original);
    assert_eq!(seen[0].file_name().unwrap(), "memo.docx");
    assert_eq!(result.fidelity, Some(0.95));
    // The preprocessed copy lived in the request scratch dir.
    assert!(!seen[0].exists());
    assert!(std::fs::read(&original).unwrap().starts_with(b"PK"));
}

// ── Gate ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn gate_bounds_concurrent_conversions() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = ConverterConfig::builder()
        .temp_root(tmp.path().join("scratch"))
        .max_conversions(2)
        .build()
        .unwrap();
    let (browser, tally) = FakeEngine::new(EngineId::Chromium, Script::SlowSucceed(Duration::from_millis(100)));
    let converter = Converter::with_engines(cfg, EngineSet::new().with(browser)).unwrap();

    let requests: Vec<_> = (0..6)
        .map(|i| {
            ConversionRequest::from_paths(
                input(tmp.path(), &format!("note-{i}.md"), b"# Note\n"),
                tmp.path().join(format!("note-{i}.pdf")),
            )
            .unwrap()
        })
        .collect();
    let results = converter.convert_all(requests, 6).await;

    assert!(results.iter().all(|r| r.success));
    assert_eq!(tally.calls.load(Ordering::SeqCst), 6);
    assert!(tally.max_in_flight.load(Ordering::SeqCst) <= 2);

    let stats = converter.gate_stats();
    assert_eq!(stats.issued, 6);
    assert_eq!(stats.released, 6);
    assert_eq!(stats.pools[0].available, 2);
}

#[tokio::test]
async fn gate_slots_are_released_when_every_engine_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let (office, _) = FakeEngine::new(EngineId::LibreOffice, Script::Crash);
    let converter = Converter::with_engines(config(tmp.path()), EngineSet::new().with(office)).unwrap();

    for i in 0..3 {
        let request = ConversionRequest::from_paths(
            input(tmp.path(), &format!("d{i}.odt"), b"PK"),
            tmp.path().join(format!("d{i}.pdf")),
        )
        .unwrap();
        assert!(!converter.convert(&request).await.success);
    }
    let stats = converter.gate_stats();
    assert_eq!(stats.issued, stats.released);
    assert!(stats.pools.iter().all(|p| p.available == p.capacity));
}

// ── Telemetry ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn observer_sees_every_phase() {
    let tmp = tempfile::tempdir().unwrap();
    let observer = Arc::new(CountingObserver::default());
    let cfg = ConverterConfig::builder()
        .temp_root(tmp.path().join("scratch"))
        .observer(observer.clone())
        .build()
        .unwrap();
    let (office, _) = FakeEngine::new(EngineId::LibreOffice, Script::NotFound);
    let (browser, _) = FakeEngine::new(EngineId::Chromium, Script::Succeed);
    let converter = Converter::with_engines(cfg, EngineSet::new().with(office).with(browser)).unwrap();

    let ok = ConversionRequest::from_paths(input(tmp.path(), "t.txt", b"hello"), tmp.path().join("t.pdf")).unwrap();
    let rejected = ConversionRequest::new(
        tmp.path().join("t.txt"),
        DocumentFormat::Txt,
        DocumentFormat::Pptx,
        tmp.path().join("t.pptx"),
    );
    assert!(converter.convert(&ok).await.success);
    let failed = converter.convert(&rejected).await;
    assert_eq!(failed.error.unwrap().kind, ErrorKind::Validation);
    assert!(failed.attempts.is_empty());

    assert_eq!(observer.starts.load(Ordering::SeqCst), 1);
    assert_eq!(observer.attempts.lock().unwrap().len(), 1);
    let events = observer.completed.lock().unwrap().clone();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].operation, "convert:txt→pdf");
    assert!(events[0].success);
    assert_eq!(events[1].operation, "convert:invalid");
    assert_eq!(events[1].error.as_ref().unwrap().kind, ErrorKind::Validation);
}
