use ai::{CaptionResult, Labeler};
use async_trait::async_trait;
use label_config::{ConfigStore, LabelerKind, LabelingConfig};
use label_session::{
    DispatchError, LabelSession, RowStatus, SessionError, WorkEvent, WorkKind,
};
use std::{
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use test_log::test;
use tokio::sync::Semaphore;
use translation::{translation_failure, Translator};

#[derive(Default)]
struct FakeLabeler {
    calls: AtomicUsize,
    zh: String,
    gate: Option<Arc<Semaphore>>,
    prompts: Mutex<Vec<Option<String>>>,
}

#[async_trait]
impl Labeler for FakeLabeler {
    async fn label(
        &self,
        image_path: &Path,
        _backend: LabelerKind,
        directory_prompt: Option<&str>,
    ) -> CaptionResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap()
            .push(directory_prompt.map(|v| v.to_string()));
        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await.unwrap();
        }

        let name = image_path.file_name().unwrap().to_string_lossy();
        if name.contains("broken") {
            return CaptionResult::failure("unreadable image");
        }
        CaptionResult {
            description: format!("caption of {}", name),
            zh: self.zh.clone(),
        }
    }
}

#[derive(Default)]
struct FakeTranslator {
    calls: AtomicUsize,
}

#[async_trait]
impl Translator for FakeTranslator {
    async fn translate(&self, text: &str, _source: &str, _target: &str) -> String {
        if text.is_empty() {
            return String::new();
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        if text.contains("untranslatable") {
            return translation_failure("service unavailable");
        }
        format!("译文: {}", text)
    }
}

struct Fixture {
    _config_dir: tempfile::TempDir,
    images: tempfile::TempDir,
    config: Arc<ConfigStore>,
}

/// `files` become empty image files; a `Some` caption also gets a sidecar.
fn fixture(files: &[(&str, Option<&str>)]) -> Fixture {
    let config_dir = tempfile::tempdir().unwrap();
    let config = Arc::new(ConfigStore::open(config_dir.path().join("data.json")));
    config
        .set_labeling_config(&LabelingConfig {
            batch_delay_ms: 0,
            translate_batch_delay_ms: 0,
            ..Default::default()
        })
        .unwrap();

    let images = tempfile::tempdir().unwrap();
    for (name, caption) in files {
        let path = images.path().join(name);
        std::fs::write(&path, b"image bytes").unwrap();
        if let Some(caption) = caption {
            std::fs::write(path.with_extension("txt"), caption).unwrap();
        }
    }

    Fixture {
        _config_dir: config_dir,
        images,
        config,
    }
}

fn session(
    fixture: &Fixture,
    labeler: Arc<FakeLabeler>,
    translator: Arc<FakeTranslator>,
) -> LabelSession {
    let mut session = LabelSession::new(fixture.config.clone(), labeler, translator);
    session.open_directory(fixture.images.path(), false).unwrap();
    session
}

async fn drain_until_finished(session: &mut LabelSession, kind: WorkKind) -> Vec<WorkEvent> {
    let mut events = vec![];
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), session.next_event())
            .await
            .expect("work did not finish in time")
            .expect("event channel closed");
        let done = event == WorkEvent::Finished(kind);
        events.push(event);
        if done {
            return events;
        }
    }
}

#[test(tokio::test)]
async fn test_open_directory_lists_images_sorted() {
    let fixture = fixture(&[
        ("b.PNG", Some("  second  \n")),
        ("a.jpg", None),
        ("notes.txt", None),
        ("c.webp", None),
    ]);
    let session = session(
        &fixture,
        Arc::new(FakeLabeler::default()),
        Arc::new(FakeTranslator::default()),
    );

    let names = session
        .rows()
        .iter()
        .map(|v| v.file_name())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["a.jpg", "b.PNG", "c.webp"]);
    assert_eq!(session.rows()[1].caption, "second");
    assert_eq!(session.rows()[0].status, RowStatus::Empty);
    assert_eq!(session.rows()[1].status, RowStatus::Captioned);
    assert!(!session.is_dirty());
}

#[test(tokio::test)]
async fn test_batch_caption_skips_captioned_rows() {
    let fixture = fixture(&[
        ("01.jpg", Some("done, one")),
        ("02.jpg", None),
        ("03.jpg", Some("done, three")),
        ("04_broken.jpg", None),
        ("05.jpg", None),
    ]);
    let labeler = Arc::new(FakeLabeler::default());
    let mut session = session(&fixture, labeler.clone(), Arc::new(FakeTranslator::default()));

    assert_eq!(session.trigger_word(), "done");
    assert_eq!(session.label_all().unwrap(), 3);
    let events = drain_until_finished(&mut session, WorkKind::Caption).await;

    assert_eq!(labeler.calls.load(Ordering::SeqCst), 3);
    assert!(events.contains(&WorkEvent::BatchCaptionCompleted {
        succeeded: 2,
        total: 3
    }));

    let started = events
        .iter()
        .filter_map(|v| match v {
            WorkEvent::CaptionStarted { row } => Some(*row),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(started, vec![1, 3, 4]);

    let rows = session.rows();
    assert_eq!(rows[0].caption, "done, one");
    assert_eq!(rows[1].caption, "done, caption of 02.jpg");
    assert_eq!(rows[3].caption, "");
    assert_eq!(rows[3].status, RowStatus::Empty);
    assert_eq!(rows[4].status, RowStatus::Captioned);
    assert!(session.is_dirty());
}

#[test(tokio::test)]
async fn test_overwrite_existing_captions_every_row() {
    let fixture = fixture(&[("01.jpg", Some("old")), ("02.jpg", None)]);
    fixture
        .config
        .set_labeling_config(&LabelingConfig {
            overwrite_existing: true,
            batch_delay_ms: 0,
            ..Default::default()
        })
        .unwrap();
    let labeler = Arc::new(FakeLabeler::default());
    let mut session = session(&fixture, labeler.clone(), Arc::new(FakeTranslator::default()));

    assert_eq!(session.label_all().unwrap(), 2);
    drain_until_finished(&mut session, WorkKind::Caption).await;

    assert_eq!(labeler.calls.load(Ordering::SeqCst), 2);
    assert_eq!(session.rows()[0].caption, "caption of 01.jpg");
}

#[test(tokio::test)]
async fn test_failed_caption_keeps_previous_text() {
    let fixture = fixture(&[("broken.jpg", Some("kept"))]);
    let mut session = session(
        &fixture,
        Arc::new(FakeLabeler::default()),
        Arc::new(FakeTranslator::default()),
    );

    session.label_row(0).unwrap();
    let events = drain_until_finished(&mut session, WorkKind::Caption).await;

    assert!(matches!(events[1], WorkEvent::CaptionFailed { row: 0, .. }));
    assert_eq!(session.rows()[0].caption, "kept");
    assert_eq!(session.rows()[0].status, RowStatus::Captioned);
    assert!(!session.is_dirty());
}

#[test(tokio::test)]
async fn test_chinese_from_backend_is_stored_verbatim() {
    let fixture = fixture(&[("a.jpg", None)]);
    let labeler = Arc::new(FakeLabeler {
        zh: "一张图".into(),
        ..Default::default()
    });
    let translator = Arc::new(FakeTranslator::default());
    let mut session = session(&fixture, labeler, translator.clone());
    session.set_trigger_word(" sks ");

    session.label_row(0).unwrap();
    drain_until_finished(&mut session, WorkKind::Caption).await;

    let row = &session.rows()[0];
    assert_eq!(row.caption, "sks, caption of a.jpg");
    assert_eq!(row.translation, "一张图");
    assert_eq!(row.status, RowStatus::Translated);
    assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
}

#[test(tokio::test)]
async fn test_auto_translate_fills_missing_chinese() {
    let fixture = fixture(&[("a.jpg", None)]);
    fixture
        .config
        .set_labeling_config(&LabelingConfig {
            auto_translate: true,
            batch_delay_ms: 0,
            ..Default::default()
        })
        .unwrap();
    let translator = Arc::new(FakeTranslator::default());
    let mut session = session(&fixture, Arc::new(FakeLabeler::default()), translator.clone());

    session.label_row(0).unwrap();
    let events = drain_until_finished(&mut session, WorkKind::Caption).await;

    assert!(events.contains(&WorkEvent::TranslationDone {
        row: 0,
        text: "译文: caption of a.jpg".into()
    }));
    assert_eq!(session.rows()[0].translation, "译文: caption of a.jpg");
    assert_eq!(translator.calls.load(Ordering::SeqCst), 1);
}

#[test(tokio::test)]
async fn test_second_caption_operation_is_rejected() {
    let fixture = fixture(&[("a.jpg", None), ("b.jpg", Some("ready"))]);
    let gate = Arc::new(Semaphore::new(0));
    let labeler = Arc::new(FakeLabeler {
        gate: Some(gate.clone()),
        ..Default::default()
    });
    let mut session = session(&fixture, labeler, Arc::new(FakeTranslator::default()));

    session.label_row(0).unwrap();
    assert!(session.is_busy());

    let err = session.label_row(1).unwrap_err();
    assert!(matches!(
        err,
        SessionError::Dispatch(DispatchError::Busy(WorkKind::Caption))
    ));
    assert!(matches!(session.label_all(), Err(SessionError::Dispatch(_))));

    // translation has its own slot
    session.translate_row(1).unwrap();
    drain_until_finished(&mut session, WorkKind::Translation).await;
    assert_eq!(session.rows()[1].translation, "译文: ready");

    // directory switches wait for running work
    assert!(matches!(
        session.open_directory(fixture.images.path(), true),
        Err(SessionError::Busy)
    ));

    gate.add_permits(1);
    drain_until_finished(&mut session, WorkKind::Caption).await;
    assert_eq!(session.rows()[0].caption, "caption of a.jpg");
}

#[test(tokio::test)]
async fn test_translate_all_only_untranslated_rows() {
    let fixture = fixture(&[
        ("a.jpg", Some("a red car")),
        ("b.jpg", None),
        ("c.jpg", Some("untranslatable text")),
    ]);
    let translator = Arc::new(FakeTranslator::default());
    let mut session = session(&fixture, Arc::new(FakeLabeler::default()), translator.clone());

    assert!(matches!(
        session.translate_row(1),
        Err(SessionError::EmptyCaption(1))
    ));

    assert_eq!(session.translate_all().unwrap(), 2);
    let events = drain_until_finished(&mut session, WorkKind::Translation).await;
    assert!(events.contains(&WorkEvent::BatchTranslationCompleted {
        succeeded: 1,
        total: 2
    }));

    let rows = session.rows();
    assert_eq!(rows[0].translation, "译文: a red car");
    assert_eq!(rows[0].status, RowStatus::Translated);
    assert!(rows[0].dirty);
    assert!(!rows[1].dirty);
    assert!(translation::is_translation_failure(&rows[2].translation));
    assert_eq!(rows[2].status, RowStatus::Captioned);
    assert!(rows[2].dirty);

    // failure text fills the cell, so the row is not picked up again
    assert_eq!(session.translate_all().unwrap(), 0);
    drain_until_finished(&mut session, WorkKind::Translation).await;
    assert_eq!(translator.calls.load(Ordering::SeqCst), 2);
}

#[test(tokio::test)]
async fn test_save_then_reopen_round_trip() {
    let fixture = fixture(&[("a.jpg", None), ("b.jpg", None), ("c.jpg", Some("old"))]);
    let mut session = session(
        &fixture,
        Arc::new(FakeLabeler::default()),
        Arc::new(FakeTranslator::default()),
    );

    session.set_caption(0, "first caption, 中文也可以").unwrap();
    session.set_caption(2, "replaced").unwrap();
    assert!(session.is_dirty());

    assert!(matches!(
        session.open_directory(fixture.images.path(), false),
        Err(SessionError::UnsavedChanges)
    ));

    assert_eq!(session.save_all().unwrap(), 2);
    assert!(!session.is_dirty());
    assert!(!fixture.images.path().join("b.txt").exists());

    session.open_directory(fixture.images.path(), false).unwrap();
    let captions = session
        .rows()
        .iter()
        .map(|v| v.caption.as_str())
        .collect::<Vec<_>>();
    assert_eq!(captions, vec!["first caption, 中文也可以", "", "replaced"]);
}

#[test(tokio::test)]
async fn test_forced_open_discards_edits() {
    let fixture = fixture(&[("a.jpg", Some("on disk"))]);
    let mut session = session(
        &fixture,
        Arc::new(FakeLabeler::default()),
        Arc::new(FakeTranslator::default()),
    );

    session.set_caption(0, "edited").unwrap();
    assert_eq!(session.open_directory(fixture.images.path(), true).unwrap(), 1);
    assert_eq!(session.rows()[0].caption, "on disk");
    assert!(!session.is_dirty());
}

#[test(tokio::test)]
async fn test_directory_prompt_only_when_customised() {
    let fixture = fixture(&[("a.jpg", None)]);
    let path = fixture.images.path().to_string_lossy().to_string();
    fixture.config.add_directory(&path, None).unwrap();
    let session = session(
        &fixture,
        Arc::new(FakeLabeler::default()),
        Arc::new(FakeTranslator::default()),
    );
    assert_eq!(session.directory_prompt(), None);

    fixture
        .config
        .set_directory_prompt(&path, "describe the outfit")
        .unwrap();
    assert_eq!(
        session.directory_prompt().as_deref(),
        Some("describe the outfit")
    );
}

#[test(tokio::test)]
async fn test_directory_prompt_reaches_labeler_for_any_spelling() {
    let fixture = fixture(&[("a.jpg", None)]);
    let with_slash = format!("{}/", fixture.images.path().display());
    fixture
        .config
        .add_directory(&with_slash, Some("describe the outfit"))
        .unwrap();

    let labeler = Arc::new(FakeLabeler::default());
    let mut session = LabelSession::new(
        fixture.config.clone(),
        labeler.clone(),
        Arc::new(FakeTranslator::default()),
    );
    let dotted = fixture
        .images
        .path()
        .join("..")
        .join(fixture.images.path().file_name().unwrap());
    session.open_directory(&dotted, false).unwrap();

    session.label_row(0).unwrap();
    drain_until_finished(&mut session, WorkKind::Caption).await;

    assert_eq!(
        *labeler.prompts.lock().unwrap(),
        vec![Some("describe the outfit".to_string())]
    );
}

#[test(tokio::test)]
async fn test_queued_events_stay_with_their_directory() {
    let fixture = fixture(&[("a.jpg", None)]);
    let other = tempfile::tempdir().unwrap();
    std::fs::write(other.path().join("z.jpg"), b"image bytes").unwrap();

    let mut session = session(
        &fixture,
        Arc::new(FakeLabeler::default()),
        Arc::new(FakeTranslator::default()),
    );
    session.label_row(0).unwrap();
    // let the work finish without reading its events
    while session.is_busy() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(matches!(
        session.open_directory(other.path(), false),
        Err(SessionError::UnsavedChanges)
    ));
    assert_eq!(session.rows()[0].caption, "caption of a.jpg");

    session.open_directory(other.path(), true).unwrap();
    assert!(session.try_next_event().is_none());
    let row = &session.rows()[0];
    assert_eq!(row.file_name(), "z.jpg");
    assert_eq!(row.caption, "");
    assert!(!row.dirty);
}
