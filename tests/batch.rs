//! Batch orchestration tests with in-process fakes.
//!
//! The speech model, media probe and renderer are replaced by fakes so these
//! tests exercise the job state machine, failure isolation and concurrency
//! bounds without whisper or ffmpeg installed.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use reelcast::{
    Aligner, Config, ErrorClass, JobStatus, MediaProbe, NarrationJob, Orchestrator, RenderBackend,
    RenderError, RenderExecutor, RenderInstruction, SpeechModel, TranscriptSegment,
    TranscriptionError,
};

// ─── Fakes ───────────────────────────────────────────────────────────────────

/// Four evenly spoken words, no word timings (forces proportional fallback).
/// Audio whose file name contains "broken" fails transcription.
struct FakeModel;

#[async_trait]
impl SpeechModel for FakeModel {
    async fn transcribe(&self, audio_path: &Path) -> Result<Vec<TranscriptSegment>, TranscriptionError> {
        if audio_path.to_string_lossy().contains("broken") {
            return Err(TranscriptionError::Model("decoder exploded".to_string()));
        }
        Ok(vec![TranscriptSegment {
            start: 0.0,
            end: 4.0,
            text: "one two three four".to_string(),
            words: None,
        }])
    }
}

struct FakeProbe;

#[async_trait]
impl MediaProbe for FakeProbe {
    async fn duration(&self, _path: &Path) -> Result<f64, TranscriptionError> {
        Ok(4.0)
    }
}

/// Renderer that writes a small output file, optionally failing first.
#[derive(Default)]
struct FakeBackend {
    transient_failures: Mutex<usize>,
    panic: bool,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    outputs: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl RenderBackend for FakeBackend {
    async fn execute(&self, instruction: &RenderInstruction) -> Result<(), RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        assert!(!self.panic, "renderer crashed");

        {
            let mut remaining = self.transient_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RenderError::Failed {
                    status: "exit status: 1".to_string(),
                    diagnostics: "Resource temporarily unavailable".to_string(),
                    transient: true,
                });
            }
        }

        std::fs::write(&instruction.output, b"fake mp4").unwrap();
        self.outputs.lock().unwrap().push(instruction.output.clone());
        Ok(())
    }
}

// ─── Harness ─────────────────────────────────────────────────────────────────

struct Harness {
    dir: tempfile::TempDir,
    config: Arc<Config>,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("assets/avatars")).unwrap();
        std::fs::write(root.join("assets/bg.mp4"), b"bg").unwrap();
        std::fs::write(root.join("assets/avatars/peter.png"), b"png").unwrap();

        let mut config = Config::default();
        config.assets.dir = root.join("assets");
        config.assets.background = root.join("assets/bg.mp4");
        config.assets.output_dir = root.join("out");
        config.assets.temp_dir = root.join("tmp");
        config.render.retry_delay_ms = 1;

        Self {
            dir,
            config: Arc::new(config),
        }
    }

    fn job(&self, id: &str, style: &str) -> NarrationJob {
        self.job_with_audio(id, style, &format!("{id}.mp3"))
    }

    fn job_with_audio(&self, id: &str, style: &str, audio: &str) -> NarrationJob {
        let audio_path = self.dir.path().join(audio);
        std::fs::write(&audio_path, b"ID3 fake audio").unwrap();
        NarrationJob::new(id, "one two three four", audio_path, style)
    }

    fn orchestrator(&self, backend: Arc<FakeBackend>) -> Orchestrator {
        let aligner = Aligner::new(Arc::new(FakeModel), &self.config.transcription);
        let executor = RenderExecutor::new(self.config.clone(), backend);
        Orchestrator::new(self.config.clone(), aligner, Arc::new(FakeProbe), executor)
    }

    fn output(&self, id: &str) -> PathBuf {
        self.dir.path().join("out").join(format!("{id}.mp4"))
    }
}

// ─── Failure isolation ───────────────────────────────────────────────────────

#[tokio::test]
async fn missing_avatar_fails_only_its_job() {
    let h = Harness::new();
    let backend = Arc::new(FakeBackend::default());
    let jobs = vec![h.job("1", "peter"), h.job("2", "ghost"), h.job("3", "peter")];

    let summary = h.orchestrator(backend.clone()).run(jobs, 2, None).await;

    assert_eq!(summary.submitted, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.exit_code(), 1);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);

    let ids: Vec<&str> = summary.results.iter().map(|r| r.job_id.as_str()).collect();
    assert_eq!(ids, ["1", "2", "3"]);

    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].job_id, "2");
    assert_eq!(summary.failures[0].class, ErrorClass::MissingAsset);
    assert!(summary.failures[0].message.contains("ghost.png"));

    assert!(h.output("1").is_file());
    assert!(!h.output("2").exists());
    assert!(h.output("3").is_file());
}

#[tokio::test]
async fn missing_screenshot_fails_only_its_job() {
    let h = Harness::new();
    let backend = Arc::new(FakeBackend::default());
    let absent = h.dir.path().join("shots/never-captured.png");
    let jobs = vec![
        h.job("1", "peter"),
        h.job("2", "peter").with_screenshot(&absent),
        h.job("3", "peter"),
    ];

    let summary = h.orchestrator(backend.clone()).run(jobs, 2, None).await;

    assert_eq!(summary.results[1].status, JobStatus::Failed);
    let failure = summary.results[1].failure.as_ref().unwrap();
    assert_eq!(failure.class, ErrorClass::MissingAsset);
    assert!(failure.message.contains("screenshot"));
    assert!(failure.message.contains("never-captured.png"));
    assert_eq!(summary.results[1].metrics.attempts, 0);

    assert_eq!(summary.results[0].status, JobStatus::Succeeded);
    assert_eq!(summary.results[2].status, JobStatus::Succeeded);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    assert!(!h.output("2").exists());
}

#[tokio::test]
async fn transcription_failure_is_isolated() {
    let h = Harness::new();
    let backend = Arc::new(FakeBackend::default());
    let jobs = vec![
        h.job_with_audio("a", "peter", "broken.mp3"),
        h.job("b", "peter"),
    ];

    let summary = h.orchestrator(backend.clone()).run(jobs, 1, None).await;

    assert_eq!(summary.results[0].status, JobStatus::Failed);
    let failure = summary.results[0].failure.as_ref().unwrap();
    assert_eq!(failure.class, ErrorClass::Transcription);
    assert!(failure.message.contains("decoder exploded"));

    assert_eq!(summary.results[1].status, JobStatus::Succeeded);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_audio_is_a_transcription_error() {
    let h = Harness::new();
    let job = h.job("a", "peter");
    std::fs::write(&job.audio_path, b"").unwrap();

    let summary = h
        .orchestrator(Arc::new(FakeBackend::default()))
        .run(vec![job], 1, None)
        .await;

    assert_eq!(summary.failures[0].class, ErrorClass::Transcription);
}

#[tokio::test]
async fn panicking_renderer_becomes_internal_failure() {
    let h = Harness::new();
    let backend = Arc::new(FakeBackend {
        panic: true,
        ..FakeBackend::default()
    });

    let summary = h
        .orchestrator(backend)
        .run(vec![h.job("a", "peter")], 1, None)
        .await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.results[0].job_id, "a");
    assert_eq!(summary.failures[0].class, ErrorClass::Internal);
}

// ─── Retries ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn transient_render_fault_is_retried() {
    let h = Harness::new();
    let backend = Arc::new(FakeBackend {
        transient_failures: Mutex::new(1),
        ..FakeBackend::default()
    });

    let summary = h
        .orchestrator(backend.clone())
        .run(vec![h.job("a", "peter")], 1, None)
        .await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.results[0].metrics.attempts, 2);
    assert_eq!(summary.results[0].metrics.output_bytes, 8);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    assert_eq!(summary.exit_code(), 0);
}

// ─── Limits and skipping ─────────────────────────────────────────────────────

#[tokio::test]
async fn job_count_limit_takes_first_jobs_in_order() {
    let h = Harness::new();
    let backend = Arc::new(FakeBackend::default());
    let jobs: Vec<_> = ["a", "b", "c", "d", "e"]
        .iter()
        .map(|id| h.job(id, "peter"))
        .collect();

    let summary = h.orchestrator(backend.clone()).run(jobs, 3, Some(2)).await;

    assert_eq!(summary.submitted, 2);
    let ids: Vec<&str> = summary.results.iter().map(|r| r.job_id.as_str()).collect();
    assert_eq!(ids, ["a", "b"]);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    assert!(!h.output("c").exists());
}

#[tokio::test]
async fn existing_output_is_skipped_without_rendering() {
    let h = Harness::new();
    std::fs::create_dir_all(h.dir.path().join("out")).unwrap();
    std::fs::write(h.output("a"), b"previous run").unwrap();
    let backend = Arc::new(FakeBackend::default());

    let summary = h
        .orchestrator(backend.clone())
        .run(vec![h.job("a", "peter")], 1, None)
        .await;

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.results[0].status, JobStatus::Skipped);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    assert_eq!(std::fs::read(h.output("a")).unwrap(), b"previous run");
}

#[tokio::test]
async fn render_concurrency_is_bounded() {
    let h = Harness::new();
    let backend = Arc::new(FakeBackend {
        delay: Duration::from_millis(30),
        ..FakeBackend::default()
    });
    let jobs: Vec<_> = (0..6).map(|i| h.job(&format!("job{i}"), "peter")).collect();

    let summary = h.orchestrator(backend.clone()).run(jobs, 2, None).await;

    assert_eq!(summary.succeeded, 6);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 6);
    let max = backend.max_in_flight.load(Ordering::SeqCst);
    assert!((1..=2).contains(&max), "max in flight was {max}");
}

#[tokio::test]
async fn outputs_are_unique_per_job() {
    let h = Harness::new();
    let backend = Arc::new(FakeBackend::default());
    let jobs = vec![h.job("x", "peter"), h.job("y", "peter")];

    h.orchestrator(backend.clone()).run(jobs, 2, None).await;

    let mut outputs = backend.outputs.lock().unwrap().clone();
    outputs.sort();
    outputs.dedup();
    assert_eq!(outputs.len(), 2);
}

// ─── Planning ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn plan_builds_bounded_timeline() {
    let h = Harness::new();
    let orchestrator = h.orchestrator(Arc::new(FakeBackend::default()));

    let timeline = orchestrator.plan(&h.job("a", "peter")).await.unwrap();

    assert_eq!(timeline.duration, 4.0);
    assert!(timeline.validate().is_ok());
    assert!(timeline.events.iter().all(|e| e.end <= timeline.duration));
}
