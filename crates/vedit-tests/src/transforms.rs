//! Transform operations through the orchestrator.

use crate::fakes::{media, timeouts, Behavior, FakeBackend, FakeEngine, Harness};
use std::time::{Duration, Instant};
use vedit_core::{approx_eq_secs, artifact_url, ArtifactKind, ErrorKind, Mount};
use vedit_media::TransformOp;
use vedit_pipeline::TransformRequest;

fn harness() -> Harness {
    Harness::with_engine(FakeEngine::new(Behavior::Succeed))
}

// ── Validation ─────────────────────────────────────────────────

#[tokio::test]
async fn trim_end_before_start_is_validation_without_engine_call() {
    let h = harness();
    let clip = h.upload("clip.mp4", &media(10.0, 1280, 720, true));

    let err = h
        .orchestrator
        .execute(TransformRequest::Trim {
            input: clip,
            start: 5.0,
            end: 5.0,
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(err.operation, "trim");
    assert_eq!(h.engine.probe_count(), 0);
    assert!(h.engine.jobs().is_empty());
}

#[tokio::test]
async fn trim_past_duration_is_validation_after_probe() {
    let h = harness();
    let clip = h.upload("clip.mp4", &media(10.0, 1280, 720, true));

    let err = h
        .orchestrator
        .execute(TransformRequest::Trim {
            input: clip,
            start: 2.0,
            end: 12.0,
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(h.engine.probe_count(), 1);
    assert!(h.engine.jobs().is_empty());
    assert_eq!(h.temp_files(), 0);
}

#[tokio::test]
async fn missing_input_is_not_found() {
    let h = harness();
    let err = h
        .orchestrator
        .execute(TransformRequest::Compress {
            input: "/uploads/does-not-exist.mp4".into(),
            crf: 23,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert!(h.engine.jobs().is_empty());
}

#[tokio::test]
async fn extract_audio_without_audio_is_not_found() {
    let h = harness();
    let clip = h.upload("silent.mp4", &media(4.0, 640, 360, false));
    let err = h
        .orchestrator
        .execute(TransformRequest::ExtractAudio { input: clip })
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert!(h.engine.jobs().is_empty());
}

// ── Successful transforms ──────────────────────────────────────

#[tokio::test]
async fn trim_registers_processed_artifact() {
    let h = harness();
    let clip = h.upload("clip.mp4", &media(10.0, 1280, 720, true));

    let artifact = h
        .orchestrator
        .execute(TransformRequest::Trim {
            input: clip,
            start: 1.5,
            end: 4.0,
        })
        .await
        .unwrap();

    assert_eq!(artifact.mount, Mount::Processed);
    assert_eq!(artifact.kind, ArtifactKind::Video);
    assert_eq!(artifact.url, format!("/processed/{}.mp4", artifact.id));
    assert!(artifact.size_bytes > 0);
    assert!(h.store.get(artifact.id).is_some());
    assert_eq!(h.temp_files(), 0);

    let out = h.read_media(&artifact.url);
    assert!(approx_eq_secs(out.duration, 2.5, 0.01));
}

#[tokio::test]
async fn outputs_never_collide() {
    let h = harness();
    let clip = h.upload("clip.mp4", &media(10.0, 1280, 720, true));
    let mut urls = Vec::new();
    for _ in 0..3 {
        let artifact = h
            .orchestrator
            .execute(TransformRequest::AdjustVolume {
                input: clip.clone(),
                factor: 1.0,
            })
            .await
            .unwrap();
        urls.push(artifact.url);
    }
    urls.sort();
    urls.dedup();
    assert_eq!(urls.len(), 3);
    assert_eq!(h.store.list(Mount::Processed).len(), 3);
}

#[tokio::test]
async fn merge_keeps_input_order_and_sums_durations() {
    let h = harness();
    let a = h.upload("a.mp4", &media(3.0, 1920, 1080, true));
    let b = h.upload("b.mp4", &media(2.0, 1280, 720, false));

    let artifact = h
        .orchestrator
        .execute(TransformRequest::Merge {
            inputs: vec![b.clone(), a.clone()],
        })
        .await
        .unwrap();

    let jobs = h.engine.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].op, TransformOp::Merge);
    let order: Vec<String> = jobs[0]
        .inputs
        .iter()
        .map(|i| {
            let name = i.path.file_name().unwrap().to_string_lossy();
            artifact_url(Mount::Uploads, &name)
        })
        .collect();
    assert_eq!(order, vec![b, a]);
    assert!(!jobs[0].inputs[0].info.as_ref().unwrap().has_audio);

    let out = h.read_media(&artifact.url);
    assert!(approx_eq_secs(out.duration, 5.0, 0.01));
    assert_eq!((out.width, out.height), (1920, 1080));
}

#[tokio::test]
async fn speed_and_resize_follow_parameters() {
    let h = harness();
    let clip = h.upload("clip.mp4", &media(8.0, 1920, 1080, true));

    let faster = h
        .orchestrator
        .execute(TransformRequest::ChangeSpeed {
            input: clip.clone(),
            factor: 2.0,
        })
        .await
        .unwrap();
    assert!(approx_eq_secs(h.read_media(&faster.url).duration, 4.0, 0.01));

    let resized = h
        .orchestrator
        .execute(TransformRequest::Resize {
            input: clip,
            width: 720,
            height: 1280,
        })
        .await
        .unwrap();
    let out = h.read_media(&resized.url);
    assert_eq!((out.width, out.height), (720, 1280));
}

#[tokio::test]
async fn extract_audio_and_convert_use_target_extension() {
    let h = harness();
    let clip = h.upload("clip.mp4", &media(8.0, 640, 360, true));

    let audio = h
        .orchestrator
        .execute(TransformRequest::ExtractAudio {
            input: clip.clone(),
        })
        .await
        .unwrap();
    assert!(audio.url.ends_with(".mp3"));
    assert_eq!(audio.kind, ArtifactKind::Audio);

    let converted = h
        .orchestrator
        .execute(TransformRequest::ConvertFormat {
            input: clip,
            format: "MOV".into(),
        })
        .await
        .unwrap();
    assert!(converted.url.ends_with(".mov"));
}

#[tokio::test]
async fn probe_video_only_reports_no_audio() {
    let h = harness();
    let clip = h.upload("silent.mp4", &media(6.0, 640, 360, false));
    let info = h.orchestrator.probe(&clip).await.unwrap();
    assert!(!info.has_audio);
    assert_eq!(info.width, 640);
    assert_eq!(info.fps, 30.0);
}

// ── Failures and cleanup ───────────────────────────────────────

#[tokio::test]
async fn engine_failure_leaves_no_artifact() {
    let h = Harness::with_engine(FakeEngine::new(Behavior::Fail));
    let clip = h.upload("clip.mp4", &media(10.0, 1280, 720, true));

    let err = h
        .orchestrator
        .execute(TransformRequest::Compress {
            input: clip,
            crf: 28,
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Engine);
    assert!(err.message.contains("simulated encoder failure"));
    assert!(h.store.list(Mount::Processed).is_empty());
    assert_eq!(h.temp_files(), 0);
}

#[tokio::test]
async fn timeout_is_distinct_and_cleans_up() {
    let h = Harness::new(
        FakeEngine::new(Behavior::Hang),
        FakeBackend::new(Vec::new(), "en"),
        timeouts(1),
    );
    let clip = h.upload("clip.mp4", &media(10.0, 1280, 720, true));

    let err = h
        .orchestrator
        .execute(TransformRequest::AddFade {
            input: clip.clone(),
            fade_in: 1.0,
            fade_out: 1.0,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(err.operation, "add_fade");

    // The abandoned job removes its partial output once the engine stops.
    let started = Instant::now();
    while h.temp_files() > 0 && started.elapsed() < Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(h.temp_files(), 0);
    assert!(h.store.list(Mount::Processed).is_empty());

    h.engine.set_behavior(Behavior::Succeed);
    let artifact = h
        .orchestrator
        .execute(TransformRequest::AddFade {
            input: clip,
            fade_in: 1.0,
            fade_out: 0.0,
        })
        .await
        .unwrap();
    assert!(h.store.get(artifact.id).is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_transforms_on_same_input() {
    let h = harness();
    let clip = h.upload("clip.mp4", &media(10.0, 1280, 720, true));

    let (a, b) = tokio::join!(
        h.orchestrator.execute(TransformRequest::Trim {
            input: clip.clone(),
            start: 0.0,
            end: 5.0,
        }),
        h.orchestrator.execute(TransformRequest::Compress {
            input: clip.clone(),
            crf: 30,
        }),
    );
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_ne!(a.id, b.id);
    assert_eq!(h.store.list(Mount::Processed).len(), 2);
}
