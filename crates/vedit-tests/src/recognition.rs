//! Recognition, captions and subtitles through the orchestrator.

use crate::fakes::{media, segment, timeouts, Behavior, FakeBackend, FakeEngine, Harness};
use std::sync::Arc;
use vedit_ai::{ModelTier, RecognitionTask, TierState};
use vedit_core::{ArtifactKind, ErrorKind, Mount};
use vedit_pipeline::TRANSLATION_TARGET;

fn speech() -> FakeBackend {
    FakeBackend::new(
        vec![
            segment(0.0, 2.5, " Welcome back to the channel."),
            segment(2.5, 3661.25, " Today we edit video.  "),
        ],
        "en",
    )
}

fn harness(backend: FakeBackend) -> Harness {
    Harness::new(FakeEngine::new(Behavior::Succeed), backend, timeouts(10))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_use_loads_once() {
    let h = harness(speech());
    let models = h.orchestrator.models();

    let (a, b) = tokio::join!(
        models.ensure_loaded(ModelTier::Small),
        models.ensure_loaded(ModelTier::Small),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(h.backend.load_count(), 1);
    assert_eq!(models.state(ModelTier::Small), TierState::Ready);
}

#[tokio::test]
async fn transcribe_uses_default_tier_and_cleans_scratch_audio() {
    let h = harness(speech());
    let clip = h.upload("talk.mp4", &media(10.0, 1280, 720, true));

    let result = h.orchestrator.transcribe(&clip, None, None).await.unwrap();

    assert_eq!(result.language, "en");
    assert_eq!(result.segments.len(), 2);
    assert_eq!(result.text, "Welcome back to the channel. Today we edit video.");
    assert_eq!(h.orchestrator.models().state(ModelTier::Base), TierState::Ready);
    assert_eq!(h.temp_files(), 0);
    assert!(h.store.list(Mount::Processed).is_empty());

    let requests = h.backend.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].task, RecognitionTask::Transcribe);
    assert!(!requests[0].word_timestamps);
}

#[tokio::test]
async fn captions_are_numbered_in_segment_order() {
    let h = harness(speech());
    let clip = h.upload("talk.mp4", &media(10.0, 1280, 720, true));

    let set = h
        .orchestrator
        .generate_captions(&clip, Some(ModelTier::Tiny), Some("en".into()))
        .await
        .unwrap();

    let ids: Vec<usize> = set.captions.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(set.captions[1].text, "Today we edit video.");
    assert!(set.captions[0].start <= set.captions[1].start);
    assert_eq!(set.language, "en");
    assert!(h.backend.requests()[0].word_timestamps);
}

#[tokio::test]
async fn subtitles_are_written_to_processed() {
    let h = harness(speech());
    let clip = h.upload("talk.mp4", &media(10.0, 1280, 720, true));

    let subtitles = h
        .orchestrator
        .generate_subtitles(&clip, None, None)
        .await
        .unwrap();

    assert_eq!(subtitles.url, subtitles.artifact.url);
    assert!(subtitles.url.starts_with("/processed/"));
    assert!(subtitles.url.ends_with(".srt"));
    assert_eq!(subtitles.artifact.kind, ArtifactKind::Subtitle);
    assert_eq!(subtitles.language, "en");

    let text = std::fs::read_to_string(&subtitles.artifact.path).unwrap();
    assert_eq!(
        text,
        "1\n00:00:00,000 --> 00:00:02,500\nWelcome back to the channel.\n\n\
         2\n00:00:02,500 --> 01:01:01,250\nToday we edit video.\n\n"
    );
    assert_eq!(h.temp_files(), 0);
}

#[tokio::test]
async fn translate_reports_fixed_target() {
    let h = harness(FakeBackend::new(vec![segment(0.0, 1.0, " Hola")], "es"));
    let clip = h.upload("hola.mp4", &media(1.0, 640, 360, true));

    let translation = h.orchestrator.translate(&clip, None).await.unwrap();
    assert_eq!(translation.original_language, "es");
    assert_eq!(translation.target_language, TRANSLATION_TARGET);
    assert_eq!(translation.text, "[en] Hola");
    assert_eq!(h.backend.requests()[0].task, RecognitionTask::Translate);
}

#[tokio::test]
async fn failed_load_is_reported_and_retried() {
    let h = harness(speech().failing(1));
    let clip = h.upload("talk.mp4", &media(10.0, 1280, 720, true));

    let err = h
        .orchestrator
        .transcribe(&clip, Some(ModelTier::Medium), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ModelLoad);
    assert_eq!(err.operation, "transcribe");
    assert_eq!(
        h.orchestrator.models().state(ModelTier::Medium),
        TierState::Unloaded
    );

    h.orchestrator
        .transcribe(&clip, Some(ModelTier::Medium), None)
        .await
        .unwrap();
    assert_eq!(h.backend.load_count(), 2);
}

#[tokio::test]
async fn missing_input_skips_model_load() {
    let h = harness(speech());
    let err = h
        .orchestrator
        .generate_subtitles("/uploads/nope.mp4", None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(h.backend.load_count(), 0);
    assert!(h.store.list(Mount::Processed).is_empty());
}

#[tokio::test]
async fn speech_audio_failure_is_engine_error() {
    let h = Harness::new(FakeEngine::new(Behavior::Fail), speech(), timeouts(10));
    let clip = h.upload("talk.mp4", &media(10.0, 1280, 720, true));

    let err = h.orchestrator.transcribe(&clip, None, None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Engine);
    assert!(h.backend.requests().is_empty());
    assert_eq!(h.temp_files(), 0);
}

#[tokio::test]
async fn silent_clip_is_not_found() {
    let h = harness(speech());
    let clip = h.upload("broll.mp4", &media(8.0, 1920, 1080, false));

    let err = h
        .orchestrator
        .generate_subtitles(&clip, None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(err.operation, "generate_subtitles");
    assert!(h.backend.requests().is_empty());
    assert_eq!(h.temp_files(), 0);
    assert!(h.store.list(Mount::Processed).is_empty());
}

#[tokio::test]
async fn catalog_and_status() {
    let h = harness(speech());
    let catalog = h.orchestrator.model_catalog();
    assert_eq!(catalog.len(), 5);
    assert_eq!(catalog[0].name, ModelTier::Tiny);

    let status = h.orchestrator.load_model(ModelTier::Large).await.unwrap();
    assert_eq!(status.state, TierState::Ready);
    let states: Vec<TierState> = h
        .orchestrator
        .model_status()
        .into_iter()
        .map(|s| s.state)
        .collect();
    assert_eq!(
        states,
        vec![
            TierState::Unloaded,
            TierState::Unloaded,
            TierState::Unloaded,
            TierState::Unloaded,
            TierState::Ready
        ]
    );
}
