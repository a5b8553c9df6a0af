//! End-to-end pipeline runs against a fake media toolchain.

mod support;

use std::collections::BTreeSet;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use flate2::read::GzDecoder;

use clipdeck_media::FrameSidecar;
use clipdeck_models::{ExportOptions, JobKind, JobStatus, QualityTier, SourceLocator};
use clipdeck_store::{JobFilter, MemoryStore, Store};
use clipdeck_worker::regeneration::SUPERSEDED_MESSAGE;
use clipdeck_worker::{RangeEdit, WorkerError};

use support::{FakeExecutor, FakeMediaServer, Harness};

#[tokio::test]
async fn test_local_file_processing_completes() {
    let harness = Harness::start(FakeExecutor::new(20.0)).await;
    let resource = harness.local_resource("friday", "Friday Stream").await;
    let ranges = harness
        .add_ranges(&resource, &[(0.0, 4.0), (5.5, 9.0), (12.0, 18.0)])
        .await;

    let job = harness.process(&resource).await;
    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    assert_eq!(job.progress, 100);

    let resource = harness.store.get_resource(&resource.id).await.unwrap().unwrap();
    assert_eq!(resource.processing_status, JobStatus::Completed);
    assert_eq!(resource.processing_progress, 100);
    assert_eq!(resource.duration_secs, Some(20.0));
    let canonical = resource.canonical_path.clone().expect("canonical path recorded");
    assert!(canonical.is_file());

    let layout = harness.service.context().layout(&resource.id);
    for range in &ranges {
        let stored = harness.store.get_range(&range.id).await.unwrap().unwrap();
        assert_eq!(stored.clip_path, Some(layout.clip_path(&range.id)));
        assert!(layout.clip_path(&range.id).is_file());
    }

    let sidecar: FrameSidecar =
        serde_json::from_slice(&std::fs::read(layout.sidecar_path()).unwrap()).unwrap();
    assert!(sidecar.points.len() >= 3);
    assert_eq!(sidecar.files.len(), sidecar.points.len());

    let shots = harness.store.list_shot_boundaries(&resource.id).await.unwrap();
    assert_eq!(shots.len(), 2);

    // Clips from processing are not tracked as range export jobs.
    let exports = harness
        .store
        .list_jobs(&JobFilter::all().kind(JobKind::RangeExport))
        .await
        .unwrap();
    assert!(exports.is_empty());
}

#[tokio::test]
async fn test_downloaded_source_removed_after_transcode() {
    let server = Arc::new(FakeMediaServer::default());
    let harness = Harness::start_with_media_server(FakeExecutor::new(20.0), server.clone()).await;
    let resource = harness.media_server_resource("item-42", "Remote Item").await;
    harness.add_ranges(&resource, &[(1.0, 5.0)]).await;

    let job = harness.process(&resource).await;
    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);

    let downloads = server.downloads();
    assert_eq!(downloads.len(), 1);
    assert!(!downloads[0].exists(), "download should be deleted");
    let job_temp_dir = downloads[0].parent().unwrap();
    assert!(!job_temp_dir.exists(), "job temp dir should be deleted");

    let resource = harness.store.get_resource(&resource.id).await.unwrap().unwrap();
    assert!(resource.canonical_path.expect("canonical path").is_file());
}

#[tokio::test]
async fn test_local_source_file_is_kept() {
    let harness = Harness::start(FakeExecutor::new(20.0)).await;
    let resource = harness.local_resource("keep", "Keep Me").await;
    harness.add_ranges(&resource, &[(1.0, 5.0)]).await;

    let job = harness.process(&resource).await;
    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);

    let SourceLocator::LocalFile { path } = &resource.source else {
        unreachable!()
    };
    assert!(path.is_file());
}

#[tokio::test]
async fn test_range_deleted_during_clip_generation() {
    let harness = Harness::start(FakeExecutor::new(20.0)).await;
    let resource = harness.local_resource("churn", "Churn").await;
    let ranges = harness
        .add_ranges(&resource, &[(0.0, 4.0), (5.0, 9.0), (10.0, 14.0)])
        .await;
    harness
        .executor
        .remove_range_after_cut(harness.store.clone(), ranges[1].id.clone());

    let job = harness.process(&resource).await;
    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    assert_eq!(job.progress, 100);

    let layout = harness.service.context().layout(&resource.id);
    assert!(harness.store.get_range(&ranges[1].id).await.unwrap().is_none());
    assert!(!layout.clip_path(&ranges[1].id).exists(), "orphaned clip left behind");
    for range in [&ranges[0], &ranges[2]] {
        let stored = harness.store.get_range(&range.id).await.unwrap().unwrap();
        assert_eq!(stored.clip_path, Some(layout.clip_path(&range.id)));
        assert!(layout.clip_path(&range.id).is_file());
    }
}

#[tokio::test]
async fn test_progress_never_decreases() {
    let executor = FakeExecutor::new(20.0).with_delay(Duration::from_millis(15));
    let harness = Harness::start(executor).await;
    let resource = harness.local_resource("mono", "Monotonic").await;
    harness
        .add_ranges(&resource, &[(1.0, 3.0), (4.0, 6.0)])
        .await;

    let job_id = harness
        .service
        .start_resource_processing(&resource.id)
        .await
        .unwrap()
        .unwrap();

    let mut seen = Vec::new();
    loop {
        let job = harness.store.get_job(&job_id).await.unwrap().unwrap();
        seen.push(job.progress);
        if job.is_terminal() {
            assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
            break;
        }
        tokio::time::sleep(Duration::from_millis(3)).await;
    }

    assert!(
        seen.windows(2).all(|w| w[0] <= w[1]),
        "progress went backwards: {:?}",
        seen
    );
    assert_eq!(seen.last().copied(), Some(100));
}

#[tokio::test]
async fn test_duplicate_processing_trigger_is_dropped() {
    let executor = FakeExecutor::new(20.0).with_delay(Duration::from_millis(30));
    let harness = Harness::start(executor).await;
    let resource = harness.local_resource("dup", "Duplicate").await;

    let first = harness
        .service
        .start_resource_processing(&resource.id)
        .await
        .unwrap();
    let second = harness
        .service
        .start_resource_processing(&resource.id)
        .await
        .unwrap();

    let first = first.expect("first trigger starts a job");
    assert!(second.is_none());
    assert!(harness.service.is_processing(&resource.id));

    let job = harness.wait_for_job(&first).await;
    assert_eq!(job.status, JobStatus::Completed);

    let jobs = harness
        .store
        .list_jobs(&JobFilter::all().kind(JobKind::ResourceProcessing))
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);

    // The claim is released once the job task ends.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!harness.service.is_processing(&resource.id));
    let again = harness
        .service
        .start_resource_processing(&resource.id)
        .await
        .unwrap();
    assert!(again.is_some());
    harness.wait_for_job(&again.unwrap()).await;
}

#[tokio::test]
async fn test_failed_transcode_fails_job_and_resource() {
    let harness = Harness::start(FakeExecutor::new(20.0).failing_on("canonical")).await;
    let resource = harness.local_resource("broken", "Broken").await;

    let job = harness.process(&resource).await;
    assert_eq!(job.status, JobStatus::Failed);
    let error = job.error.expect("error text recorded");
    assert!(error.contains("Conversion failed!"), "error was {error}");

    let resource = harness.store.get_resource(&resource.id).await.unwrap().unwrap();
    assert_eq!(resource.processing_status, JobStatus::Failed);
}

#[tokio::test]
async fn test_rapid_edits_coalesce_into_one_export() {
    let harness = Harness::start(FakeExecutor::new(20.0)).await;
    let resource = harness.local_resource("edits", "Edits").await;
    let ranges = harness.add_ranges(&resource, &[(2.0, 5.0)]).await;
    let job = harness.process(&resource).await;
    assert_eq!(job.status, JobStatus::Completed);

    let range_id = ranges[0].id.clone();
    let mut job_ids = Vec::new();
    for i in 0..5 {
        let edit = RangeEdit {
            end: Some(6.0 + i as f64),
            ..Default::default()
        };
        job_ids.push(harness.service.edit_range(&range_id, edit).await.unwrap());
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let last = harness.wait_for_job(job_ids.last().unwrap()).await;
    assert_eq!(last.status, JobStatus::Completed, "error: {:?}", last.error);

    let jobs = harness
        .store
        .list_jobs(&JobFilter::all().kind(JobKind::RangeExport).range(range_id.clone()))
        .await
        .unwrap();
    assert_eq!(jobs.len(), 5);
    let completed: Vec<_> = jobs.iter().filter(|j| j.status == JobStatus::Completed).collect();
    let cancelled: Vec<_> = jobs.iter().filter(|j| j.status == JobStatus::Cancelled).collect();
    assert_eq!(completed.len(), 1);
    assert_eq!(cancelled.len(), 4);
    assert!(cancelled
        .iter()
        .all(|j| j.error.as_deref() == Some(SUPERSEDED_MESSAGE)));

    // Only the final edit was trimmed.
    let range = harness.store.get_range(&range_id).await.unwrap().unwrap();
    assert_eq!(range.end, 10.0);
    assert!(harness.service.range_clip_is_current(&range_id).await.unwrap());
}

#[tokio::test]
async fn test_edit_after_export_marks_clip_stale() {
    let harness = Harness::start(FakeExecutor::new(20.0)).await;
    let resource = harness.local_resource("stale", "Stale").await;
    let ranges = harness.add_ranges(&resource, &[(2.0, 5.0)]).await;
    harness.process(&resource).await;

    let range_id = ranges[0].id.clone();
    let job_id = harness
        .service
        .schedule_range_export(&range_id)
        .await
        .unwrap();
    harness.wait_for_job(&job_id).await;
    assert!(harness.service.range_clip_is_current(&range_id).await.unwrap());

    harness
        .service
        .edit_range(
            &range_id,
            RangeEdit {
                label: Some("renamed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!harness.service.range_clip_is_current(&range_id).await.unwrap());
}

#[tokio::test]
async fn test_invalid_edit_is_rejected() {
    let harness = Harness::start(FakeExecutor::new(20.0)).await;
    let resource = harness.local_resource("invalid", "Invalid").await;
    let ranges = harness.add_ranges(&resource, &[(2.0, 5.0)]).await;

    let result = harness
        .service
        .edit_range(
            &ranges[0].id,
            RangeEdit {
                end: Some(1.0),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(result, Err(WorkerError::Validation(_))));
    assert!(harness.service.context().store.list_jobs(&JobFilter::all()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_range_cancels_pending_export() {
    let harness = Harness::start(FakeExecutor::new(20.0)).await;
    let resource = harness.local_resource("delete", "Delete").await;
    let ranges = harness.add_ranges(&resource, &[(2.0, 5.0)]).await;
    harness.process(&resource).await;

    let range_id = ranges[0].id.clone();
    let clip = harness.service.context().layout(&resource.id).clip_path(&range_id);
    assert!(clip.is_file());

    let job_id = harness
        .service
        .schedule_range_export(&range_id)
        .await
        .unwrap();
    harness.service.delete_range(&range_id).await.unwrap();

    let job = harness.wait_for_job(&job_id).await;
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(harness.store.get_range(&range_id).await.unwrap().is_none());
    assert!(!clip.exists());
}

fn archive_entries(path: &std::path::Path) -> Vec<(String, Vec<u8>)> {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let name = entry.path().unwrap().to_string_lossy().to_string();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            (name, data)
        })
        .collect()
}

#[tokio::test]
async fn test_export_package_with_fifty_ranges() {
    let harness = Harness::start(FakeExecutor::new(600.0).with_delay(Duration::from_millis(1))).await;
    let resource = harness.local_resource("Friday Stream", "Boss Fight").await;
    let spans: Vec<(f64, f64)> = (0..50)
        .map(|i| (i as f64 * 10.0, i as f64 * 10.0 + 5.0))
        .collect();
    harness.add_ranges(&resource, &spans).await;
    let job = harness.process(&resource).await;
    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);

    let options = ExportOptions {
        quality: QualityTier::Medium,
        ..Default::default()
    };
    let job_id = harness
        .service
        .start_export_package(&resource.id, options)
        .await
        .unwrap()
        .expect("export starts");
    let job = support::wait_for_terminal(harness.store.as_ref(), &job_id, Duration::from_secs(30))
        .await;
    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
    assert_eq!(job.progress, 100);

    let artifact = &job.payload["artifact"];
    assert_eq!(artifact["clip_count"], 50);
    let archive_path = std::path::PathBuf::from(artifact["archive_path"].as_str().unwrap());
    assert!(archive_path.is_file());
    assert_eq!(archive_path.file_name().unwrap(), "Friday_Stream.tar.gz");

    let entries = archive_entries(&archive_path);
    let names: BTreeSet<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
    let clips = names
        .iter()
        .filter(|n| n.starts_with("Friday_Stream/clips/") && n.ends_with(".mp4"))
        .count();
    let thumbnails = names
        .iter()
        .filter(|n| n.starts_with("Friday_Stream/thumbnails/") && n.ends_with(".jpg"))
        .count();
    assert_eq!(clips, 50);
    assert_eq!(thumbnails, 50);
    assert!(names.contains("Friday_Stream/clips/001_Boss_Fight_moment_1.mp4"));
    assert!(names.contains("Friday_Stream/README.txt"));

    let file = |name: &str| {
        entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| String::from_utf8(data.clone()).unwrap())
            .unwrap_or_else(|| panic!("{name} missing from archive"))
    };

    let index = file("Friday_Stream/control/index.html");
    assert_eq!(index.matches("data-src=\"../clips/").count(), 50);
    assert!(index.contains("Ctrl+Shift+F3"));

    let metadata: serde_json::Value =
        serde_json::from_str(&file("Friday_Stream/metadata/clips.json")).unwrap();
    assert_eq!(metadata["clip_count"], 50);
    assert_eq!(metadata["quality"], "medium");

    // Staging is cleaned up and the claim released.
    let staging = harness.service.context().config.temp_dir.join(format!("export-{}", job_id));
    assert!(!staging.exists());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!harness.service.is_exporting(&resource.id));
}

#[tokio::test]
async fn test_repeated_export_replaces_archive() {
    let harness = Harness::start(FakeExecutor::new(20.0)).await;
    let resource = harness.local_resource("again", "Again").await;
    harness.add_ranges(&resource, &[(1.0, 4.0), (6.0, 9.0)]).await;
    let job = harness.process(&resource).await;
    assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);

    let mut archives = Vec::new();
    for _ in 0..2 {
        let job_id = harness
            .service
            .start_export_package(&resource.id, ExportOptions::default())
            .await
            .unwrap()
            .expect("export starts");
        let job = harness.wait_for_job(&job_id).await;
        assert_eq!(job.status, JobStatus::Completed, "error: {:?}", job.error);
        archives.push(job.payload["artifact"]["archive_path"].as_str().unwrap().to_string());
    }
    assert_eq!(archives[0], archives[1]);

    let exports_dir = harness.service.context().layout(&resource.id).exports_dir();
    let files: Vec<_> = std::fs::read_dir(&exports_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(files, vec![std::ffi::OsString::from("again.tar.gz")]);
}

#[tokio::test]
async fn test_export_without_ranges_fails() {
    let harness = Harness::start(FakeExecutor::new(20.0)).await;
    let resource = harness.local_resource("empty", "Empty").await;
    harness.process(&resource).await;

    let job_id = harness
        .service
        .start_export_package(&resource.id, ExportOptions::default())
        .await
        .unwrap()
        .unwrap();
    let job = harness.wait_for_job(&job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("no ranges"));
}

#[tokio::test]
async fn test_startup_recovers_interrupted_jobs() {
    let store = Arc::new(MemoryStore::new());
    let dir = tempfile::tempdir().unwrap();

    let resource = clipdeck_models::Resource::new(
        "crashed",
        "Crashed",
        clipdeck_models::SourceLocator::LocalFile {
            path: dir.path().join("crashed.mkv"),
        },
    );
    store.insert_resource(&resource).await.unwrap();
    store
        .update_resource(
            &resource.id,
            clipdeck_store::ResourcePatch::new()
                .status(JobStatus::Processing)
                .progress(40),
        )
        .await
        .unwrap();

    let mut interrupted = Vec::new();
    for kind in [JobKind::ResourceProcessing, JobKind::ExportPackage, JobKind::RangeExport] {
        let job = clipdeck_models::Job::new(resource.id.clone(), kind, serde_json::Value::Null);
        store.insert_job(&job).await.unwrap();
        store
            .update_job(&job.id, clipdeck_store::JobPatch::processing())
            .await
            .unwrap();
        interrupted.push(job.id);
    }
    let pending = clipdeck_models::Job::new(
        resource.id.clone(),
        JobKind::ExportPackage,
        serde_json::Value::Null,
    );
    store.insert_job(&pending).await.unwrap();

    let harness =
        Harness::start_with_store(dir, store.clone(), FakeExecutor::new(20.0), |c| c).await;

    for id in &interrupted {
        let job = store.get_job(id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some(clipdeck_worker::INTERRUPTED_MESSAGE));
    }
    let pending = store.get_job(&pending.id).await.unwrap().unwrap();
    assert_eq!(pending.status, JobStatus::Pending);

    let resource = store.get_resource(&resource.id).await.unwrap().unwrap();
    assert_eq!(resource.processing_status, JobStatus::Failed);
    assert_eq!(resource.processing_progress, 0);

    let summary = harness.service.status_summary().await.unwrap();
    assert_eq!(summary.count(JobStatus::Processing), 0);
    assert_eq!(summary.count(JobStatus::Failed), 3);
}

#[tokio::test]
async fn test_shutdown_cancels_pending_regeneration() {
    let harness = Harness::start_in(
        tempfile::tempdir().unwrap(),
        FakeExecutor::new(20.0),
        |mut config| {
            config.debounce = Duration::from_secs(30);
            config
        },
    )
    .await;
    let resource = harness.local_resource("shutdown", "Shutdown").await;
    let ranges = harness.add_ranges(&resource, &[(2.0, 5.0)]).await;

    let job_id = harness
        .service
        .schedule_range_export(&ranges[0].id)
        .await
        .unwrap();
    harness.service.shutdown().await;

    let job = harness.store.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);

    let rejected = harness.service.start_resource_processing(&resource.id).await;
    assert!(matches!(rejected, Err(WorkerError::NotReady(_))));
}
