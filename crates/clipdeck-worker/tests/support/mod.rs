//! Shared fixtures for pipeline integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use clipdeck_media::{CommandExecutor, ExecOptions, MediaError, MediaResult, ProcessOutput};
use clipdeck_models::{Job, JobId, Range, RangeId, Resource, SourceLocator};
use clipdeck_source::{MediaSource, ResolvedSource, SourceResult, SourceRouter};
use clipdeck_store::{MemoryStore, Store};
use clipdeck_worker::{PipelineConfig, PipelineContext, PipelineService};

/// Stands in for ffmpeg and ffprobe.
///
/// Writes whatever file an ffmpeg invocation names as its output and answers
/// probes with a fixed duration.
pub struct FakeExecutor {
    pub duration_secs: f64,
    pub delay: Duration,
    /// Shot cuts reported by scene detection
    pub cuts: Vec<f64>,
    /// Fail any ffmpeg call whose output path contains this text
    pub fail_output: Option<String>,
    /// Range to delete from the store once its clip has been written
    remove_after_cut: Mutex<Option<(RangeId, Arc<MemoryStore>)>>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeExecutor {
    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            delay: Duration::from_millis(5),
            cuts: vec![3.2, 7.5],
            fail_output: None,
            remove_after_cut: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_on(mut self, fragment: impl Into<String>) -> Self {
        self.fail_output = Some(fragment.into());
        self
    }

    /// Delete `range_id` from `store` right after its clip is cut, as a
    /// concurrent user deletion would.
    pub fn remove_range_after_cut(&self, store: Arc<MemoryStore>, range_id: RangeId) {
        *self.remove_after_cut.lock().unwrap() = Some((range_id, store));
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of ffmpeg invocations whose arguments contain `needle`.
    pub fn count_ffmpeg(&self, needle: &str) -> usize {
        self.calls()
            .iter()
            .filter(|(program, args)| program == "ffmpeg" && args.iter().any(|a| a.contains(needle)))
            .count()
    }

    fn probe_json(&self) -> String {
        serde_json::json!({
            "format": { "duration": format!("{:.3}", self.duration_secs) },
            "streams": [
                {
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": 1920,
                    "height": 1080,
                    "avg_frame_rate": "30/1"
                },
                { "codec_type": "audio", "codec_name": "aac" }
            ]
        })
        .to_string()
    }

    fn scene_stderr(&self) -> String {
        let mut out = String::new();
        for (i, cut) in self.cuts.iter().enumerate() {
            out.push_str(&format!(
                "[Parsed_metadata_1 @ 0x5581] frame:{} pts:{} pts_time:{:.3}\n",
                i,
                (cut * 1000.0) as i64,
                cut
            ));
            out.push_str("[Parsed_metadata_1 @ 0x5581] lavfi.scene_score=0.612000\n");
        }
        out
    }

    async fn run_ffmpeg(&self, args: &[String], options: &ExecOptions) -> MediaResult<String> {
        let output = args
            .last()
            .ok_or_else(|| MediaError::invalid_output("ffmpeg called without output"))?;

        if let Some(fragment) = &self.fail_output {
            if output.contains(fragment.as_str()) {
                return Err(MediaError::process_exit(
                    "ffmpeg",
                    Some(1),
                    None,
                    "Conversion failed!",
                ));
            }
        }

        if output == "-" {
            let stderr = self.scene_stderr();
            if let Some(observer) = &options.stderr_observer {
                stderr.lines().for_each(|line| observer(line));
            }
            return Ok(stderr);
        }

        if let Some(observer) = &options.stderr_observer {
            let total_us = (self.duration_secs * 1_000_000.0) as i64;
            observer("Duration: 00:00:20.00, start: 0.000000, bitrate: 4000 kb/s");
            for step in 1..=4 {
                observer(&format!("out_time_ms={}", total_us * step / 4));
                observer(if step == 4 { "progress=end" } else { "progress=continue" });
            }
        }

        if output.contains("%06d") {
            write_frame_batch(output, args).await?;
        } else {
            let path = Path::new(output);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, b"fake media").await?;
            self.maybe_remove_range(output).await;
        }
        Ok(String::new())
    }
}

impl FakeExecutor {
    async fn maybe_remove_range(&self, output: &str) {
        let target = {
            let mut slot = self.remove_after_cut.lock().unwrap();
            let hit = slot
                .as_ref()
                .is_some_and(|(range_id, _)| output.contains(range_id.as_str()));
            if hit {
                slot.take()
            } else {
                None
            }
        };
        if let Some((range_id, store)) = target {
            store.delete_range(&range_id).await.unwrap();
        }
    }
}

/// Media server stand-in that only offers downloads.
#[derive(Default)]
pub struct FakeMediaServer {
    downloads: Mutex<Vec<PathBuf>>,
}

impl FakeMediaServer {
    /// Files written by `download`, in order.
    pub fn downloads(&self) -> Vec<PathBuf> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaSource for FakeMediaServer {
    async fn resolve(&self, resource: &Resource) -> SourceResult<ResolvedSource> {
        let SourceLocator::MediaServer { item_id } = &resource.source else {
            panic!("unexpected locator {:?}", resource.source);
        };
        let mut resolved = ResolvedSource::new(resource.source.clone());
        resolved.title = Some(resource.title.clone());
        resolved.download_url = Some(format!("http://media.test/items/{item_id}/download"));
        Ok(resolved)
    }

    async fn download(&self, resolved: &ResolvedSource, dest_dir: &Path) -> SourceResult<PathBuf> {
        let SourceLocator::MediaServer { item_id } = &resolved.locator else {
            panic!("unexpected locator {:?}", resolved.locator);
        };
        let path = dest_dir.join(format!("{item_id}.mkv"));
        tokio::fs::write(&path, b"downloaded media").await?;
        self.downloads.lock().unwrap().push(path.clone());
        Ok(path)
    }
}

async fn write_frame_batch(pattern: &str, args: &[String]) -> MediaResult<()> {
    let start: usize = args
        .iter()
        .position(|a| a == "-start_number")
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let count = args
        .iter()
        .find(|a| a.starts_with("select="))
        .map(|filter| filter.matches("+").count() + 1)
        .unwrap_or(1);

    for n in start..start + count {
        let path = PathBuf::from(pattern.replace("%06d", &format!("{n:06}")));
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, b"jpeg").await?;
    }
    Ok(())
}

#[async_trait]
impl CommandExecutor for FakeExecutor {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        options: &ExecOptions,
    ) -> MediaResult<ProcessOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));
        tokio::time::sleep(self.delay).await;

        let (stdout, stderr) = match program {
            "ffprobe" if args.iter().any(|a| a == "-skip_frame") => (String::new(), String::new()),
            "ffprobe" => (self.probe_json(), String::new()),
            "ffmpeg" => (String::new(), self.run_ffmpeg(args, options).await?),
            other => {
                return Err(MediaError::ToolNotFound(other.to_string()));
            }
        };

        Ok(ProcessOutput {
            exit_code: Some(0),
            stdout,
            stderr,
            attempts: 1,
        })
    }
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub store: Arc<MemoryStore>,
    pub executor: Arc<FakeExecutor>,
    pub service: PipelineService,
}

pub fn test_config(base: &Path) -> PipelineConfig {
    PipelineConfig {
        debounce: Duration::from_millis(300),
        progress_tick: Duration::from_millis(20),
        retry_delay: Duration::from_millis(10),
        ..PipelineConfig::default()
    }
    .rooted_at(base)
}

impl Harness {
    pub async fn start(executor: FakeExecutor) -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self::start_in(dir, executor, |config| config).await
    }

    pub async fn start_in(
        dir: tempfile::TempDir,
        executor: FakeExecutor,
        configure: impl FnOnce(PipelineConfig) -> PipelineConfig,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::start_with_store(dir, store, executor, configure).await
    }

    pub async fn start_with_store(
        dir: tempfile::TempDir,
        store: Arc<MemoryStore>,
        executor: FakeExecutor,
        configure: impl FnOnce(PipelineConfig) -> PipelineConfig,
    ) -> Self {
        Self::build(dir, store, Arc::new(executor), SourceRouter::new(), configure).await
    }

    /// Harness whose media server items are served by `server`.
    pub async fn start_with_media_server(
        executor: FakeExecutor,
        server: Arc<FakeMediaServer>,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let router = SourceRouter::new().with_media_server(server);
        Self::build(dir, Arc::new(MemoryStore::new()), Arc::new(executor), router, |c| c).await
    }

    async fn build(
        dir: tempfile::TempDir,
        store: Arc<MemoryStore>,
        executor: Arc<FakeExecutor>,
        router: SourceRouter,
        configure: impl FnOnce(PipelineConfig) -> PipelineConfig,
    ) -> Self {
        let ctx = PipelineContext::new(
            configure(test_config(dir.path())),
            store.clone(),
            executor.clone(),
            Arc::new(router),
        );
        let service = PipelineService::new(ctx);
        service.startup().await.unwrap();
        Self {
            dir,
            store,
            executor,
            service,
        }
    }

    /// A local source file inside the harness directory.
    pub async fn local_resource(&self, name: &str, title: &str) -> Resource {
        let path = self.dir.path().join(format!("{name}.mkv"));
        tokio::fs::write(&path, b"source media").await.unwrap();
        let resource = Resource::new(name, title, SourceLocator::LocalFile { path });
        self.store.insert_resource(&resource).await.unwrap();
        resource
    }

    pub async fn media_server_resource(&self, item_id: &str, title: &str) -> Resource {
        let source = SourceLocator::MediaServer {
            item_id: item_id.to_string(),
        };
        let resource = Resource::new(item_id, title, source);
        self.store.insert_resource(&resource).await.unwrap();
        resource
    }

    pub async fn add_ranges(&self, resource: &Resource, spans: &[(f64, f64)]) -> Vec<Range> {
        let mut ranges = Vec::new();
        for (i, (start, end)) in spans.iter().enumerate() {
            let range = Range::new(resource.id.clone(), *start, *end, format!("moment {}", i + 1))
                .with_order_index(i as u32);
            self.store.upsert_range(&range).await.unwrap();
            ranges.push(range);
        }
        ranges
    }

    /// Poll until the job reaches a terminal status.
    pub async fn wait_for_job(&self, job_id: &JobId) -> Job {
        wait_for_terminal(self.store.as_ref(), job_id, Duration::from_secs(10)).await
    }

    pub async fn process(&self, resource: &Resource) -> Job {
        let job_id = self
            .service
            .start_resource_processing(&resource.id)
            .await
            .unwrap()
            .expect("processing should start");
        self.wait_for_job(&job_id).await
    }
}

pub async fn wait_for_terminal(store: &dyn Store, job_id: &JobId, limit: Duration) -> Job {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let job = store.get_job(job_id).await.unwrap().expect("job exists");
        if job.is_terminal() {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {} still {} after {:?}",
            job_id,
            job.status,
            limit
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
