//! Sequential batch driver.
//!
//! Tasks run strictly in input order, top view before front view, every
//! request gated by the [`Pacer`]. Under [`FailurePolicy::FailFast`] the first
//! failed view ends the batch and later dishes are never requested.

use crate::config::{BatchOptions, FailurePolicy};
use crate::error::{DishGenError, ErrorKind, Result};
use crate::finish::{ImageFinisher, OutputImage};
use crate::generation::GenerationClient;
use crate::input::GenerationTask;
use crate::package;
use crate::pacer::Pacer;
use crate::prompt::{View, ViewPrompt};
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;

/// Lifecycle of a single dish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started.
    Pending,
    /// Generating.
    InProgress,
    /// Both views written.
    Completed,
    /// A view could not be generated or saved.
    Failed,
}

/// Lifecycle of the whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    /// Not started.
    Pending,
    /// Working through tasks.
    InProgress,
    /// Every task completed.
    Done,
    /// At least one task failed.
    Failed,
}

/// Result of one dish.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    /// Dish name.
    pub name: String,
    /// Final status.
    pub status: TaskStatus,
    /// Files written for this dish.
    pub outputs: Vec<OutputImage>,
    /// View that failed, if any.
    pub failed_view: Option<View>,
    /// Cause of the failure.
    pub error_kind: Option<ErrorKind>,
    /// Description of the failure.
    pub error: Option<String>,
}

impl TaskOutcome {
    fn pending(task: &GenerationTask) -> Self {
        Self {
            name: task.name.clone(),
            status: TaskStatus::Pending,
            outputs: Vec::new(),
            failed_view: None,
            error_kind: None,
            error: None,
        }
    }

    fn fail(&mut self, view: View, kind: ErrorKind, error: String) {
        self.status = TaskStatus::Failed;
        self.failed_view = Some(view);
        self.error_kind = Some(kind);
        self.error = Some(error);
    }
}

/// Summary of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Final batch state.
    pub state: BatchState,
    /// Output root.
    pub output_dir: PathBuf,
    /// One entry per input task, in input order.
    pub tasks: Vec<TaskOutcome>,
    /// Transport calls made, retries included.
    pub requests: u32,
    /// Zip archive of the output root, when written.
    pub archive: Option<PathBuf>,
}

impl BatchReport {
    /// Every file written, in generation order.
    pub fn outputs(&self) -> impl Iterator<Item = &OutputImage> {
        self.tasks.iter().flat_map(|t| t.outputs.iter())
    }

    /// Tasks that ended in each status.
    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }
}

/// Drives generation for a list of tasks.
pub struct BatchDriver {
    client: GenerationClient,
    finisher: ImageFinisher,
    pacer: Pacer,
    options: BatchOptions,
}

impl BatchDriver {
    /// Creates a driver; fails on invalid options.
    pub fn new(client: GenerationClient, options: BatchOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            client,
            finisher: ImageFinisher::new(options.width, options.height),
            pacer: Pacer::from_requests_per_minute(options.requests_per_minute)?,
            options,
        })
    }

    /// Replaces the pacer, e.g. to use an explicit interval.
    pub fn with_pacer(mut self, pacer: Pacer) -> Self {
        self.pacer = pacer;
        self
    }

    /// Generates both views of every task, then archives the output root if
    /// the batch is done.
    ///
    /// Generation failures are reported in the returned [`BatchReport`];
    /// only filesystem errors outside a single image abort with `Err`.
    pub async fn run(&mut self, tasks: &[GenerationTask]) -> Result<BatchReport> {
        let root = self.options.output_dir.clone();
        let mut report = BatchReport {
            state: BatchState::Pending,
            output_dir: root.clone(),
            tasks: tasks.iter().map(TaskOutcome::pending).collect(),
            requests: 0,
            archive: None,
        };

        for view in View::ALL {
            std::fs::create_dir_all(root.join(view.dir_name()))?;
        }

        report.state = BatchState::InProgress;
        tracing::info!(
            tasks = tasks.len(),
            output = %root.display(),
            interval_ms = self.pacer.interval().as_millis() as u64,
            "starting batch"
        );

        let mut stems = HashSet::new();
        for (index, task) in tasks.iter().enumerate() {
            let outcome = &mut report.tasks[index];
            outcome.status = TaskStatus::InProgress;
            tracing::info!(index = index + 1, total = tasks.len(), dish = %task.name, "generating");

            for view in View::ALL {
                let prompt = ViewPrompt::for_task(task, view);
                if !stems.insert(prompt.output_path_stem.clone()) {
                    tracing::warn!(
                        stem = %prompt.output_path_stem.display(),
                        "output name repeats an earlier dish, overwriting"
                    );
                }

                self.pacer.wait_turn().await;
                let result = self.client.generate(&prompt.text).await;
                self.pacer.mark_complete();
                report.requests += result.attempts;

                let Some((bytes, mime_type)) = result.image() else {
                    let kind = result.error_kind.unwrap_or(ErrorKind::Unknown);
                    let message = result
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "generation failed".into());
                    tracing::error!(dish = %task.name, %view, %kind, "view failed: {message}");
                    outcome.fail(view, kind, message);
                    break;
                };

                let stem = root.join(&prompt.output_path_stem);
                match self.finisher.save(bytes, mime_type, &stem) {
                    Ok(image) => outcome.outputs.push(image),
                    Err(e @ DishGenError::ImageDecode(_)) => {
                        tracing::error!(dish = %task.name, %view, "could not process image: {e}");
                        outcome.fail(view, ErrorKind::Unknown, e.to_string());
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }

            if outcome.status == TaskStatus::InProgress {
                outcome.status = TaskStatus::Completed;
            } else if self.options.failure_policy == FailurePolicy::FailFast {
                tracing::error!(dish = %task.name, "stopping batch after failure");
                break;
            }
        }

        report.state = if report.count(TaskStatus::Completed) == tasks.len() {
            BatchState::Done
        } else {
            BatchState::Failed
        };

        if report.state == BatchState::Done && self.options.archive {
            report.archive = Some(package::archive_dir(&root)?);
        }

        tracing::info!(
            state = ?report.state,
            completed = report.count(TaskStatus::Completed),
            failed = report.count(TaskStatus::Failed),
            requests = report.requests,
            "batch finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GeneratedImage, RetryPolicy, Transport, TransportKind};
    use async_trait::async_trait;
    use image::{DynamicImage, ImageBuffer, Rgb};
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::time::Instant;

    fn png_bytes() -> Vec<u8> {
        let img = ImageBuffer::from_pixel(64, 48, Rgb([200u8, 120, 40]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[derive(Default)]
    struct Log {
        prompts: Vec<String>,
        started: Vec<Instant>,
        finished: Vec<Instant>,
    }

    /// Fails every prompt containing `fail_on`, returns a PNG otherwise.
    struct FakeService {
        log: Arc<Mutex<Log>>,
        fail_on: Option<&'static str>,
        payload: Vec<u8>,
        latency: Duration,
    }

    impl FakeService {
        fn new() -> (Self, Arc<Mutex<Log>>) {
            let log = Arc::new(Mutex::new(Log::default()));
            let service = Self {
                log: log.clone(),
                fail_on: None,
                payload: png_bytes(),
                latency: Duration::from_millis(300),
            };
            (service, log)
        }
    }

    #[async_trait]
    impl Transport for FakeService {
        async fn send(&self, prompt: &str) -> Result<GeneratedImage> {
            {
                let mut log = self.log.lock().unwrap();
                log.prompts.push(prompt.to_string());
                log.started.push(Instant::now());
            }
            tokio::time::sleep(self.latency).await;
            self.log.lock().unwrap().finished.push(Instant::now());

            match self.fail_on {
                Some(needle) if prompt.contains(needle) => Err(DishGenError::Api {
                    status: 500,
                    message: "internal".into(),
                }),
                _ => Ok(GeneratedImage::new(self.payload.clone(), "image/png")),
            }
        }

        fn kind(&self) -> TransportKind {
            TransportKind::Gemini
        }
    }

    fn driver(service: FakeService, options: BatchOptions) -> BatchDriver {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(4)).unwrap();
        BatchDriver::new(GenerationClient::new(service, policy), options).unwrap()
    }

    fn options(root: PathBuf) -> BatchOptions {
        BatchOptions {
            output_dir: root,
            width: 108,
            height: 55,
            ..BatchOptions::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_dish_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("temp_output");
        let (service, log) = FakeService::new();
        let mut driver = driver(service, options(root.clone()));

        let tasks = vec![GenerationTask::new("Pasta", "A bowl of pasta")];
        let report = driver.run(&tasks).await.unwrap();

        assert_eq!(report.state, BatchState::Done);
        assert_eq!(report.tasks[0].status, TaskStatus::Completed);
        assert_eq!(log.lock().unwrap().prompts.len(), 2);

        let top = root.join("top_view").join("Pasta_top.png");
        let front = root.join("front_view").join("Pasta_front.png");
        for path in [&top, &front] {
            let img = image::open(path).unwrap();
            assert_eq!((img.width(), img.height()), (108, 55));
        }
        let written: Vec<_> = report.outputs().map(|o| o.path.clone()).collect();
        assert_eq!(written, [top, front]);

        assert_eq!(report.archive, Some(dir.path().join("temp_output.zip")));
        assert!(dir.path().join("temp_output.zip").is_file());
    }

    #[tokio::test(start_paused = true)]
    async fn test_calls_alternate_top_front_in_row_order() {
        let dir = tempfile::tempdir().unwrap();
        let (service, log) = FakeService::new();
        let mut driver = driver(
            service,
            BatchOptions {
                archive: false,
                ..options(dir.path().join("out"))
            },
        );

        let tasks = vec![
            GenerationTask::new("Pasta", "A bowl of pasta"),
            GenerationTask::new("Fish and chips", "Battered cod"),
            GenerationTask::new("Soup", "Tomato soup"),
        ];
        let report = driver.run(&tasks).await.unwrap();
        assert_eq!(report.state, BatchState::Done);
        assert_eq!(report.requests, 6);
        assert!(report.archive.is_none());

        let prompts = log.lock().unwrap().prompts.clone();
        assert_eq!(prompts.len(), 6);
        for (i, task) in tasks.iter().enumerate() {
            assert_eq!(prompts[2 * i], crate::prompt::compose(&task.base_prompt, View::Top));
            assert_eq!(
                prompts[2 * i + 1],
                crate::prompt::compose(&task.base_prompt, View::Front)
            );
        }
        assert!(dir
            .path()
            .join("out/front_view/Fish_and_chips_front.png")
            .is_file());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_between_calls() {
        let dir = tempfile::tempdir().unwrap();
        let (service, log) = FakeService::new();
        let mut driver = driver(service, options(dir.path().join("out")))
            .with_pacer(Pacer::new(Duration::from_secs(6)));

        let tasks = vec![
            GenerationTask::new("Pasta", "A bowl of pasta"),
            GenerationTask::new("Soup", "Tomato soup"),
        ];
        driver.run(&tasks).await.unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.started.len(), 4);
        for i in 1..log.started.len() {
            assert!(log.started[i] - log.finished[i - 1] >= Duration::from_secs(6));
            assert!(log.started[i] - log.started[i - 1] >= Duration::from_secs(6));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_stops_before_next_dish() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("out");
        let (mut service, log) = FakeService::new();
        service.fail_on = Some("seated at a table");
        let mut driver = driver(service, options(root.clone()));

        let tasks = vec![
            GenerationTask::new("Pasta", "A bowl of pasta"),
            GenerationTask::new("Soup", "Tomato soup"),
        ];
        let report = driver.run(&tasks).await.unwrap();

        assert_eq!(report.state, BatchState::Failed);
        assert_eq!(report.tasks[0].status, TaskStatus::Failed);
        assert_eq!(report.tasks[0].failed_view, Some(View::Front));
        assert_eq!(report.tasks[0].error_kind, Some(ErrorKind::ServerError));
        assert_eq!(report.tasks[1].status, TaskStatus::Pending);
        assert!(report.archive.is_none());

        // Top view once, front view three times, nothing for Soup.
        let prompts = log.lock().unwrap().prompts.clone();
        assert_eq!(prompts.len(), 4);
        assert!(prompts.iter().all(|p| p.starts_with("A bowl of pasta")));
        assert_eq!(report.requests, 4);
        assert!(!root.join("top_view").join("Soup_top.png").exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_failed_continues() {
        let dir = tempfile::tempdir().unwrap();
        let (mut service, log) = FakeService::new();
        service.fail_on = Some("Tomato soup");
        let mut driver = driver(
            service,
            BatchOptions {
                failure_policy: FailurePolicy::SkipFailed,
                ..options(dir.path().join("out"))
            },
        );

        let tasks = vec![
            GenerationTask::new("Soup", "Tomato soup"),
            GenerationTask::new("Pasta", "A bowl of pasta"),
        ];
        let report = driver.run(&tasks).await.unwrap();

        assert_eq!(report.state, BatchState::Failed);
        assert_eq!(report.tasks[0].status, TaskStatus::Failed);
        assert_eq!(report.tasks[0].failed_view, Some(View::Top));
        assert_eq!(report.tasks[1].status, TaskStatus::Completed);
        assert_eq!(report.outputs().count(), 2);
        assert_eq!(log.lock().unwrap().prompts.len(), 3 + 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_payload_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let (mut service, log) = FakeService::new();
        service.payload = b"not an image at all".to_vec();
        let mut driver = driver(service, options(dir.path().join("out")));

        let report = driver
            .run(&[GenerationTask::new("Pasta", "A bowl of pasta")])
            .await
            .unwrap();

        assert_eq!(report.state, BatchState::Failed);
        assert_eq!(report.tasks[0].failed_view, Some(View::Top));
        assert!(report.tasks[0].error.as_deref().unwrap().contains("image error"));
        assert_eq!(log.lock().unwrap().prompts.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_column_means_no_requests() {
        let (service, log) = FakeService::new();
        let dir = tempfile::tempdir().unwrap();
        let _driver = driver(service, options(dir.path().join("out")));

        let csv = "dishes,prompt\nPasta,A bowl of pasta\n";
        let err = crate::input::tasks_from_csv(csv.as_bytes()).unwrap_err();

        assert!(matches!(err, DishGenError::MissingColumn { .. }));
        assert!(log.lock().unwrap().prompts.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_task_list_is_done() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _log) = FakeService::new();
        let mut driver = driver(
            service,
            BatchOptions {
                archive: false,
                ..options(dir.path().join("out"))
            },
        );

        let report = driver.run(&[]).await.unwrap();
        assert_eq!(report.state, BatchState::Done);
        assert_eq!(report.requests, 0);
    }
}
