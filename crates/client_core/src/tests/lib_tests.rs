use super::*;
use std::{
    collections::{HashMap, HashSet},
    sync::atomic::AtomicUsize,
    sync::Mutex as StdMutex,
};

use async_trait::async_trait;
use shared::{
    domain::AssetId,
    protocol::{AlbumsResponse, ConfigResponse, HealthResponse, ImageRecord, StatusResponse},
};
use tokio::{sync::Notify, time::timeout};

const EVENT_WAIT: Duration = Duration::from_secs(2);

fn record(id: &str) -> ImageRecord {
    ImageRecord {
        id: AssetId::new(id),
        original_file_name: Some(format!("{id}.jpg")),
        file_created_at: None,
        thumbnail_url: None,
        memory_type: None,
        album_name: None,
    }
}

fn record_with_thumbnail(id: &str) -> ImageRecord {
    ImageRecord {
        thumbnail_url: Some(format!("/api/proxy/thumbnail/{id}")),
        ..record(id)
    }
}

struct ScriptedBackend {
    connected: bool,
    status_error: Option<String>,
    memories: StdMutex<Vec<ImageRecord>>,
    memories_failure: StdMutex<Option<String>>,
    album_images: Vec<ImageRecord>,
    failing_assets: StdMutex<HashSet<String>>,
    gated_assets: StdMutex<HashMap<String, Arc<Notify>>>,
    memories_fetches: AtomicUsize,
    image_fetches: AtomicUsize,
}

impl ScriptedBackend {
    fn with_memories(records: Vec<ImageRecord>) -> Self {
        Self {
            connected: true,
            status_error: None,
            memories: StdMutex::new(records),
            memories_failure: StdMutex::new(None),
            album_images: Vec::new(),
            failing_assets: StdMutex::new(HashSet::new()),
            gated_assets: StdMutex::new(HashMap::new()),
            memories_fetches: AtomicUsize::new(0),
            image_fetches: AtomicUsize::new(0),
        }
    }

    fn disconnected(error: impl Into<String>) -> Self {
        let mut backend = Self::with_memories(Vec::new());
        backend.connected = false;
        backend.status_error = Some(error.into());
        backend
    }

    fn failing_memories(error: impl Into<String>) -> Self {
        let backend = Self::with_memories(Vec::new());
        backend.fail_memories(error);
        backend
    }

    fn with_album_images(mut self, records: Vec<ImageRecord>) -> Self {
        self.album_images = records;
        self
    }

    fn with_failing_asset(self, id: &str) -> Self {
        self.failing_assets
            .lock()
            .expect("failing assets lock")
            .insert(id.to_string());
        self
    }

    fn set_memories(&self, records: Vec<ImageRecord>) {
        *self.memories.lock().expect("memories lock") = records;
    }

    fn fail_memories(&self, error: impl Into<String>) {
        *self.memories_failure.lock().expect("failure lock") = Some(error.into());
    }

    fn fail_asset(&self, id: &str) {
        self.failing_assets
            .lock()
            .expect("failing assets lock")
            .insert(id.to_string());
    }

    /// Makes fetches for `id` wait until the returned gate is notified.
    fn gate_asset(&self, id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gated_assets
            .lock()
            .expect("gated assets lock")
            .insert(id.to_string(), Arc::clone(&gate));
        gate
    }

    fn image_fetch_count(&self) -> usize {
        self.image_fetches.load(Ordering::SeqCst)
    }

    fn memories_fetch_count(&self) -> usize {
        self.memories_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KioskBackend for ScriptedBackend {
    async fn check_health(&self) -> Result<HealthResponse, ClientError> {
        Ok(HealthResponse {
            status: "ok".to_string(),
            message: None,
        })
    }

    async fn check_status(&self) -> Result<StatusResponse, ClientError> {
        Ok(StatusResponse {
            connected: self.connected,
            error: self.status_error.clone(),
        })
    }

    async fn fetch_config(&self) -> Result<ConfigResponse, ClientError> {
        Ok(ConfigResponse {
            immich_url: "http://immich.local".to_string(),
            show_memories: true,
            show_albums: true,
            albums: Vec::new(),
        })
    }

    async fn fetch_memories(&self) -> Result<Vec<ImageRecord>, ClientError> {
        self.memories_fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.memories_failure.lock().expect("failure lock").clone() {
            return Err(ClientError::load(error));
        }
        Ok(self.memories.lock().expect("memories lock").clone())
    }

    async fn fetch_albums(&self) -> Result<AlbumsResponse, ClientError> {
        Ok(AlbumsResponse {
            success: true,
            albums: Vec::new(),
            images: Some(self.album_images.clone()),
            album_count: 0,
            total_assets: self.album_images.len(),
            error: None,
        })
    }

    async fn fetch_image(&self, id: &AssetId) -> Result<Vec<u8>, ClientError> {
        self.image_fetches.fetch_add(1, Ordering::SeqCst);
        let gate = self
            .gated_assets
            .lock()
            .expect("gated assets lock")
            .get(id.as_str())
            .cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        if self
            .failing_assets
            .lock()
            .expect("failing assets lock")
            .contains(id.as_str())
        {
            return Err(ClientError::render(id.as_str(), "image unavailable"));
        }
        Ok(id.as_str().as_bytes().to_vec())
    }

    async fn fetch_thumbnail(&self, thumbnail_url: &str) -> Result<Vec<u8>, ClientError> {
        Ok(format!("thumb:{thumbnail_url}").into_bytes())
    }
}

fn paused_settings() -> ControllerSettings {
    ControllerSettings {
        autoplay: false,
        auto_refresh: false,
        ..ControllerSettings::default()
    }
}

fn controller_with(
    backend: ScriptedBackend,
    settings: ControllerSettings,
) -> (Arc<SlideshowController>, Arc<ScriptedBackend>) {
    let backend = Arc::new(backend);
    let as_dyn: Arc<dyn KioskBackend> = backend.clone();
    let controller = SlideshowController::with_settings(as_dyn, settings);
    (controller, backend)
}

async fn next_slide_ready(
    rx: &mut broadcast::Receiver<ControllerEvent>,
) -> (usize, usize, ImageRecord, Vec<u8>) {
    loop {
        let event = timeout(EVENT_WAIT, rx.recv())
            .await
            .expect("event wait timed out")
            .expect("event channel closed");
        if let ControllerEvent::SlideReady {
            index,
            total,
            record,
            bytes,
        } = event
        {
            return (index, total, record, bytes);
        }
    }
}

async fn next_fatal_error(rx: &mut broadcast::Receiver<ControllerEvent>) -> String {
    loop {
        let event = timeout(EVENT_WAIT, rx.recv())
            .await
            .expect("event wait timed out")
            .expect("event channel closed");
        if let ControllerEvent::FatalError(message) = event {
            return message;
        }
    }
}

#[tokio::test]
async fn next_returns_to_start_after_full_lap() {
    let (controller, _) = controller_with(
        ScriptedBackend::with_memories(vec![record("a"), record("b"), record("c"), record("d")]),
        paused_settings(),
    );
    controller.initialize().await.expect("initialize");
    assert_eq!(controller.snapshot().await.cursor, 0);

    for _ in 0..4 {
        controller.next().await.expect("next");
    }
    assert_eq!(controller.snapshot().await.cursor, 0);
}

#[tokio::test]
async fn previous_is_inverse_of_next() {
    let (controller, _) = controller_with(
        ScriptedBackend::with_memories(vec![record("a"), record("b"), record("c")]),
        paused_settings(),
    );
    controller.initialize().await.expect("initialize");

    for start in 0..3 {
        controller.go_to(start).await.expect("go_to");
        controller.next().await.expect("next");
        controller.previous().await.expect("previous");
        assert_eq!(controller.snapshot().await.cursor, start);
    }
}

#[tokio::test]
async fn previous_wraps_backward_from_zero() {
    let (controller, _) = controller_with(
        ScriptedBackend::with_memories(vec![record("a"), record("b"), record("c")]),
        paused_settings(),
    );
    controller.initialize().await.expect("initialize");

    controller.previous().await.expect("previous");
    assert_eq!(controller.snapshot().await.cursor, 2);
}

#[tokio::test]
async fn go_to_out_of_range_is_rejected_without_state_change() {
    let (controller, _) = controller_with(
        ScriptedBackend::with_memories(vec![record("a"), record("b"), record("c")]),
        paused_settings(),
    );
    controller.initialize().await.expect("initialize");
    controller.go_to(1).await.expect("go_to in range");

    let result = controller.go_to(3).await;
    assert!(matches!(
        result,
        Err(ClientError::InvalidIndex { index: 3, len: 3 })
    ));
    assert_eq!(controller.snapshot().await.cursor, 1);
}

#[tokio::test]
async fn walkthrough_matches_expected_cursor_and_record() {
    let (controller, _) = controller_with(
        ScriptedBackend::with_memories(vec![record("a"), record("b"), record("c")]),
        paused_settings(),
    );
    controller.initialize().await.expect("initialize");
    assert_eq!(controller.snapshot().await.cursor, 0);

    controller.next().await.expect("next");
    controller.next().await.expect("next");
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.cursor, 2);
    assert_eq!(
        controller.current_record().await.expect("record").id,
        AssetId::new("c")
    );

    controller.next().await.expect("next");
    assert_eq!(controller.snapshot().await.cursor, 0);
}

#[tokio::test]
async fn navigation_is_noop_before_any_load() {
    let (controller, backend) = controller_with(
        ScriptedBackend::with_memories(Vec::new()),
        paused_settings(),
    );

    controller.next().await.expect("next");
    controller.previous().await.expect("previous");
    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.cursor, 0);
    assert_eq!(snapshot.total, 0);
    assert_eq!(backend.image_fetch_count(), 0);
}

#[tokio::test]
async fn initialization_load_failure_is_fatal_with_backend_message() {
    let (controller, _) = controller_with(
        ScriptedBackend::failing_memories("boom"),
        paused_settings(),
    );
    let mut events = controller.subscribe_events();

    let result = controller.initialize().await;
    assert!(matches!(result, Err(ClientError::Load { .. })));
    let message = next_fatal_error(&mut events).await;
    assert!(message.contains("boom"), "message was: {message}");
}

#[tokio::test]
async fn disconnected_upstream_is_fatal_connectivity_error() {
    let (controller, _) = controller_with(
        ScriptedBackend::disconnected("immich unreachable"),
        paused_settings(),
    );
    let mut events = controller.subscribe_events();

    let result = controller.initialize().await;
    assert!(matches!(result, Err(ClientError::Connectivity { .. })));
    let message = next_fatal_error(&mut events).await;
    assert!(message.contains("immich unreachable"));
}

#[tokio::test]
async fn empty_memories_at_initialization_is_fatal() {
    let (controller, _) = controller_with(
        ScriptedBackend::with_memories(Vec::new()),
        paused_settings(),
    );

    let result = controller.initialize().await;
    assert!(matches!(result, Err(ClientError::Load { .. })));
}

#[tokio::test]
async fn refresh_preserves_cursor_clamped_to_new_length() {
    let backend = ScriptedBackend::with_memories(vec![
        record("a"),
        record("b"),
        record("c"),
        record("d"),
        record("e"),
    ]);
    let (controller, backend) = controller_with(backend, paused_settings());
    controller.initialize().await.expect("initialize");
    controller.go_to(4).await.expect("go_to");

    backend.set_memories(vec![record("a"), record("b")]);
    controller.refresh_active_source().await;

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.total, 2);
    assert_eq!(snapshot.cursor, 1);
}

#[tokio::test]
async fn refresh_keeps_cursor_when_still_in_range() {
    let backend =
        ScriptedBackend::with_memories(vec![record("a"), record("b"), record("c")]);
    let (controller, backend) = controller_with(backend, paused_settings());
    controller.initialize().await.expect("initialize");
    controller.go_to(1).await.expect("go_to");

    backend.set_memories(vec![record("x"), record("y"), record("z")]);
    controller.refresh_active_source().await;

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.cursor, 1);
    assert_eq!(snapshot.total, 3);
}

#[tokio::test]
async fn refresh_accepts_an_empty_sequence() {
    let backend = ScriptedBackend::with_memories(vec![record("a"), record("b")]);
    let (controller, backend) = controller_with(backend, paused_settings());
    controller.initialize().await.expect("initialize");
    controller.go_to(1).await.expect("go_to");
    let mut events = controller.subscribe_events();

    backend.set_memories(Vec::new());
    controller.refresh_active_source().await;

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.total, 0);
    assert_eq!(snapshot.cursor, 0);
    assert!(matches!(
        timeout(EVENT_WAIT, events.recv())
            .await
            .expect("event wait")
            .expect("event channel"),
        ControllerEvent::SequenceReplaced { total: 0, .. }
    ));
}

#[tokio::test]
async fn refresh_failure_leaves_previous_sequence_visible() {
    let backend = ScriptedBackend::with_memories(vec![record("a"), record("b")]);
    let (controller, backend) = controller_with(backend, paused_settings());
    controller.initialize().await.expect("initialize");
    controller.go_to(1).await.expect("go_to");
    let mut events = controller.subscribe_events();

    backend.fail_memories("upstream timeout");
    controller.refresh_active_source().await;

    let snapshot = controller.snapshot().await;
    assert_eq!(snapshot.total, 2);
    assert_eq!(snapshot.cursor, 1);
    match timeout(EVENT_WAIT, events.recv())
        .await
        .expect("event wait")
        .expect("event channel")
    {
        ControllerEvent::RefreshFailed(message) => {
            assert!(message.contains("upstream timeout"))
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn switch_source_while_playing_resets_cursor_and_resumes() {
    let backend = ScriptedBackend::with_memories(vec![record("a"), record("b"), record("c")])
        .with_album_images(vec![record("x"), record("y")]);
    let settings = ControllerSettings {
        auto_refresh: false,
        ..ControllerSettings::default()
    };
    let (controller, _) = controller_with(backend, settings);
    controller.initialize().await.expect("initialize");
    controller.next().await.expect("next");

    let before = controller.snapshot().await;
    assert!(before.playing);
    assert!(before.albums_available);
    assert_eq!(before.cursor, 1);

    controller
        .switch_source(SlideshowSource::Albums)
        .await
        .expect("switch source");

    let after = controller.snapshot().await;
    assert_eq!(after.source, SlideshowSource::Albums);
    assert_eq!(after.cursor, 0);
    assert_eq!(after.total, 2);
    assert!(after.playing);
    assert_eq!(after.interval, before.interval);

    controller.shutdown().await;
}

#[tokio::test]
async fn switch_to_active_source_is_noop() {
    let backend = ScriptedBackend::with_memories(vec![record("a"), record("b")]);
    let (controller, backend) = controller_with(backend, paused_settings());
    controller.initialize().await.expect("initialize");
    controller.go_to(1).await.expect("go_to");
    let fetches_before = backend.memories_fetch_count();

    controller
        .switch_source(SlideshowSource::Memories)
        .await
        .expect("switch source");

    assert_eq!(backend.memories_fetch_count(), fetches_before);
    assert_eq!(controller.snapshot().await.cursor, 1);
}

#[tokio::test]
async fn double_play_runs_a_single_slide_timer() {
    let backend = ScriptedBackend::with_memories(vec![record("a"), record("b"), record("c")]);
    let (controller, backend) = controller_with(backend, paused_settings());
    controller.initialize().await.expect("initialize");

    controller.set_interval(Duration::from_millis(50)).await;
    let after_init = backend.image_fetch_count();

    controller.play().await;
    controller.play().await;
    tokio::time::sleep(Duration::from_millis(240)).await;
    controller.pause().await;

    let advances = backend.image_fetch_count() - after_init;
    // One timer produces at most ~5 renders in 240ms at 50ms per tick; a
    // leaked second timer would roughly double that.
    assert!(advances >= 1, "timer never advanced");
    assert!(advances <= 6, "too many advances: {advances}");
}

#[tokio::test]
async fn pause_stops_the_slide_timer() {
    let backend = ScriptedBackend::with_memories(vec![record("a"), record("b")]);
    let (controller, backend) = controller_with(backend, paused_settings());
    controller.initialize().await.expect("initialize");

    controller.set_interval(Duration::from_millis(50)).await;
    controller.play().await;
    tokio::time::sleep(Duration::from_millis(120)).await;
    controller.pause().await;

    let after_pause = backend.image_fetch_count();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(backend.image_fetch_count(), after_pause);
}

#[tokio::test]
async fn interval_change_while_playing_restarts_the_timer() {
    let backend = ScriptedBackend::with_memories(vec![record("a"), record("b"), record("c")]);
    let (controller, backend) = controller_with(backend, paused_settings());
    controller.initialize().await.expect("initialize");

    controller.set_interval(Duration::from_secs(60)).await;
    controller.play().await;
    let after_play = backend.image_fetch_count();

    // Shorten the period; the new timer must take effect immediately rather
    // than waiting out the previous 60s tick.
    controller.set_interval(Duration::from_millis(50)).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    controller.pause().await;

    assert!(backend.image_fetch_count() > after_play);
}

#[tokio::test]
async fn interval_secs_is_clamped_to_bounds() {
    let backend = ScriptedBackend::with_memories(vec![record("a")]);
    let (controller, _) = controller_with(backend, paused_settings());
    controller.initialize().await.expect("initialize");

    controller.set_interval_secs(0).await;
    assert_eq!(controller.snapshot().await.interval, Duration::from_secs(1));

    controller.set_interval_secs(10_000).await;
    assert_eq!(
        controller.snapshot().await.interval,
        Duration::from_secs(300)
    );
}

#[tokio::test]
async fn failed_image_falls_back_to_thumbnail() {
    let backend =
        ScriptedBackend::with_memories(vec![record_with_thumbnail("a"), record("b")])
            .with_failing_asset("a");
    let (controller, _) = controller_with(backend, paused_settings());
    let mut events = controller.subscribe_events();

    controller.initialize().await.expect("initialize");

    let (index, _, record, bytes) = next_slide_ready(&mut events).await;
    assert_eq!(index, 0);
    assert_eq!(record.id, AssetId::new("a"));
    assert_eq!(bytes, b"thumb:/api/proxy/thumbnail/a".to_vec());
}

#[tokio::test]
async fn failed_image_without_thumbnail_skips_to_next_record() {
    let backend = ScriptedBackend::with_memories(vec![record("a"), record("b")])
        .with_failing_asset("a");
    let (controller, _) = controller_with(backend, paused_settings());
    let mut events = controller.subscribe_events();

    controller.initialize().await.expect("initialize");

    let (index, _, record, bytes) = next_slide_ready(&mut events).await;
    assert_eq!(index, 1);
    assert_eq!(record.id, AssetId::new("b"));
    assert_eq!(bytes, b"b".to_vec());
    assert_eq!(controller.snapshot().await.cursor, 1);
}

#[tokio::test]
async fn superseded_failing_render_leaves_cursor_alone() {
    let backend = ScriptedBackend::with_memories(vec![record("a"), record("b"), record("c")]);
    let (controller, backend) = controller_with(backend, paused_settings());
    controller.initialize().await.expect("initialize");

    // Hold the next fetch of "a" open, and make it fail once released.
    let gate = backend.gate_asset("a");
    backend.fail_asset("a");

    let before = backend.image_fetch_count();
    let stale = tokio::spawn({
        let controller = Arc::clone(&controller);
        async move { controller.render_current().await }
    });
    timeout(EVENT_WAIT, async {
        while backend.image_fetch_count() == before {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("stale render never reached the backend");

    // Newer navigation lands while the stale fetch is still in flight.
    let mut events = controller.subscribe_events();
    controller.go_to(1).await.expect("go_to");
    let (index, _, record, _) = next_slide_ready(&mut events).await;
    assert_eq!(index, 1);
    assert_eq!(record.id, AssetId::new("b"));

    gate.notify_one();
    stale.await.expect("join stale render").expect("stale render");

    // The stale failure must not skip the slide the navigation selected.
    assert_eq!(controller.snapshot().await.cursor, 1);
}

#[tokio::test]
async fn albums_probe_reports_unavailable_when_empty() {
    let backend = ScriptedBackend::with_memories(vec![record("a")]);
    let (controller, _) = controller_with(backend, paused_settings());
    controller.initialize().await.expect("initialize");

    assert!(!controller.snapshot().await.albums_available);
}
