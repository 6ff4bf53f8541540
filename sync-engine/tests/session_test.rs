//! Project session tests - a document view from open to teardown

mod common;

use common::{version, ScriptedBackend};
use shared_types::{DocumentKey, PollState, RegionName, SettlementEvent, VersionId};
use std::sync::Arc;
use sync_engine::{
    Boundary, DispatchError, MemoryStorage, NoteSource, ProjectSession, ScreenSelection,
    WriterBackend,
};
use tokio::time::{sleep, timeout, Duration};

const INTERVAL: Duration = Duration::from_secs(2);

async fn session_for(backend: Arc<ScriptedBackend>) -> ProjectSession {
    let shared: Arc<dyn WriterBackend> = backend;
    ProjectSession::spawn(shared, Arc::new(MemoryStorage::new()), INTERVAL)
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_open_renders_selected_version() {
    let backend = ScriptedBackend::new();
    let key = DocumentKey::scene("p-1", "sc-1");
    backend.set_chain(
        &key,
        vec![version("s1", 1, "First pass."), version("s2", 2, "Second pass.")],
    );
    let mut session = session_for(backend).await;

    let shown = session.open(&key).await.unwrap().unwrap();
    assert_eq!(shown.id, VersionId::from("s2"));
    assert_eq!(
        session.selection().plain_text(RegionName::SceneText),
        "Second pass."
    );

    session.show_version(&key, &"s1".into()).unwrap();
    assert_eq!(
        session.selection().plain_text(RegionName::SceneText),
        "First pass."
    );
    assert!(session.show_version(&key, &"s7".into()).is_err());

    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_note_on_selection_settles_and_rerenders() {
    let backend = ScriptedBackend::new();
    let key = DocumentKey::story("p-1");
    backend.set_chain(&key, vec![version("v1", 1, "A lighthouse keeper waits.")]);
    let mut session = session_for(backend.clone()).await;
    let mut events = session.subscribe();

    session.open(&key).await.unwrap();
    let range = session
        .capture_selection(
            RegionName::StoryText,
            &ScreenSelection::within(
                RegionName::StoryText,
                Boundary::new(0, 2),
                Boundary::new(0, 11),
            ),
        )
        .unwrap();
    assert_eq!((range.start, range.end), (2, 11));

    session
        .request_notes_on_selection(&key, NoteSource::notes("older, sadder").unwrap())
        .await
        .unwrap();
    assert!(session.selection().active_range().is_none());
    assert_eq!(backend.generated()[0].select_text_start, Some(2));

    backend.set_chain(
        &key,
        vec![
            version("v1", 1, "A lighthouse keeper waits."),
            version("v2", 2, "An old lighthouse keeper waits alone."),
        ],
    );
    let event = timeout(INTERVAL * 3, events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.version_id, VersionId::from("v2"));

    let rendered = session.apply_settlement(&event).unwrap();
    assert_eq!(rendered.id, VersionId::from("v2"));
    assert_eq!(
        session.selection().plain_text(RegionName::StoryText),
        "An old lighthouse keeper waits alone."
    );

    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_settlement_for_foreign_key_is_ignored() {
    let backend = ScriptedBackend::new();
    let mut session = session_for(backend).await;
    let event = SettlementEvent {
        key: DocumentKey::story("someone-else"),
        version_id: "v9".into(),
        settled_at: chrono::Utc::now(),
    };
    assert!(session.apply_settlement(&event).is_none());
    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_owned_sessions() {
    let backend = ScriptedBackend::new();
    let scene = DocumentKey::scene("p-1", "sc-1");
    let script = DocumentKey::script("p-1", "sc-1", "s1");
    backend.set_chain(&scene, vec![version("s1", 1, "Scene")]);
    backend.set_chain(&script, vec![version("x1", 1, "Script")]);
    let mut session = session_for(backend.clone()).await;

    session.open(&scene).await.unwrap();
    session.open(&script).await.unwrap();
    session
        .rewrite_scene(&scene, "INT. ROOFTOP - DAWN", &script)
        .await
        .unwrap();
    assert!(session.poll_state(&scene).await.unwrap().is_polling());
    assert!(session.poll_state(&script).await.unwrap().is_polling());

    let poller = session.poller().clone();
    let cancelled = session.shutdown().await.unwrap();
    assert_eq!(cancelled, 2);

    let calls = backend.list_calls();
    sleep(INTERVAL * 4).await;
    assert_eq!(backend.list_calls(), calls);
    // The poller this session spawned is gone with it.
    assert!(poller.active_keys().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_returns_key_to_idle() {
    let backend = ScriptedBackend::new();
    let key = DocumentKey::story("p-1");
    backend.set_chain(&key, vec![version("v1", 1, "Seed text")]);
    let mut session = session_for(backend).await;

    session.open(&key).await.unwrap();
    session.submit_seed(&key, "A heist on the moon").await.unwrap();
    session.cancel(&key).unwrap();
    assert_eq!(session.poll_state(&key).await.unwrap(), PollState::Idle);
    assert_eq!(session.shutdown().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_rewrite_owns_nothing() {
    let backend = ScriptedBackend::new();
    let scene = DocumentKey::scene("p-1", "sc-1");
    let other_script = DocumentKey::script("p-1", "sc-2", "s9");
    let mut session = session_for(backend.clone()).await;

    let err = session
        .rewrite_scene(&scene, "INT. ROOFTOP - DAWN", &other_script)
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(!session.owns(&scene));
    assert!(!session.owns(&other_script));
    assert_eq!(backend.generate_calls(), 0);
    assert_eq!(session.shutdown().await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_partial_rewrite_owns_only_the_scene() {
    let backend = ScriptedBackend::new();
    let scene = DocumentKey::scene("p-1", "sc-1");
    let script = DocumentKey::script("p-1", "sc-1", "s1");
    backend.set_chain(&scene, vec![version("s1", 1, "Scene")]);
    backend.set_chain(&script, vec![version("x1", 1, "Script")]);
    backend.fail_generate_for(&script);
    let mut session = session_for(backend).await;

    session.open(&scene).await.unwrap();
    session.open(&script).await.unwrap();
    let err = session
        .rewrite_scene(&scene, "INT. ROOFTOP - DAWN", &script)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::ScriptAfterScene { .. }));
    assert!(session.owns(&scene));
    assert!(!session.owns(&script));
    assert!(session.poll_state(&scene).await.unwrap().is_polling());

    assert_eq!(session.shutdown().await.unwrap(), 1);
}
