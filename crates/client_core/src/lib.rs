//! Slideshow controller: owns the image sequence, the cursor, the playback
//! timers, and the event stream consumed by the kiosk frontend.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use shared::{domain::SlideshowSource, protocol::ImageRecord};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{info, warn};

pub mod api;
pub mod error;

pub use api::{HttpBackend, KioskBackend};
pub use error::ClientError;

const MIN_SLIDE_INTERVAL_SECS: u64 = 1;
const MAX_SLIDE_INTERVAL_SECS: u64 = 300;
const DEFAULT_SLIDE_INTERVAL: Duration = Duration::from_secs(8);
/// Active-source data refresh cadence, independent of slide advance.
const AUTO_REFRESH_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Startup behavior for a controller instance.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub slide_interval: Duration,
    pub autoplay: bool,
    pub auto_refresh: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            slide_interval: DEFAULT_SLIDE_INTERVAL,
            autoplay: true,
            auto_refresh: true,
        }
    }
}

/// Point-in-time view of controller state for UI display and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSnapshot {
    pub cursor: usize,
    pub total: usize,
    pub playing: bool,
    pub interval: Duration,
    pub auto_refresh: bool,
    pub source: SlideshowSource,
    pub albums_available: bool,
}

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    /// Image bytes for the current cursor position are ready to display.
    SlideReady {
        index: usize,
        total: usize,
        record: ImageRecord,
        bytes: Vec<u8>,
    },
    SequenceReplaced {
        source: SlideshowSource,
        total: usize,
    },
    PlaybackChanged {
        playing: bool,
    },
    IntervalChanged {
        interval: Duration,
    },
    SourceChanged {
        source: SlideshowSource,
    },
    AlbumsAvailabilityChanged {
        available: bool,
    },
    /// Initialization failed; the session needs an explicit retry.
    FatalError(String),
    /// Background refresh or source switch failed; previous state stays up.
    RefreshFailed(String),
}

struct ControllerState {
    sequence: Vec<ImageRecord>,
    cursor: usize,
    playing: bool,
    interval: Duration,
    auto_refresh: bool,
    source: SlideshowSource,
    albums_available: bool,
}

pub struct SlideshowController {
    backend: Arc<dyn KioskBackend>,
    inner: Mutex<ControllerState>,
    slide_timer: Mutex<Option<JoinHandle<()>>>,
    refresh_timer: Mutex<Option<JoinHandle<()>>>,
    /// Monotonic render generation; a fetch that finishes after the cursor
    /// has moved again is discarded instead of flickering onto the screen.
    render_generation: AtomicU64,
    events: broadcast::Sender<ControllerEvent>,
}

impl SlideshowController {
    pub fn new(backend: Arc<dyn KioskBackend>) -> Arc<Self> {
        Self::with_settings(backend, ControllerSettings::default())
    }

    pub fn with_settings(backend: Arc<dyn KioskBackend>, settings: ControllerSettings) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            backend,
            inner: Mutex::new(ControllerState {
                sequence: Vec::new(),
                cursor: 0,
                playing: settings.autoplay,
                interval: clamp_interval(settings.slide_interval),
                auto_refresh: settings.auto_refresh,
                source: SlideshowSource::Memories,
                albums_available: false,
            }),
            slide_timer: Mutex::new(None),
            refresh_timer: Mutex::new(None),
            render_generation: AtomicU64::new(0),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ControllerEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> ControllerSnapshot {
        let guard = self.inner.lock().await;
        ControllerSnapshot {
            cursor: guard.cursor,
            total: guard.sequence.len(),
            playing: guard.playing,
            interval: guard.interval,
            auto_refresh: guard.auto_refresh,
            source: guard.source,
            albums_available: guard.albums_available,
        }
    }

    pub async fn current_record(&self) -> Option<ImageRecord> {
        let guard = self.inner.lock().await;
        guard.sequence.get(guard.cursor).cloned()
    }

    /// Connectivity gate, initial memories load, albums probe, first render,
    /// timer start. Any failure before the first render is fatal and emitted
    /// as [`ControllerEvent::FatalError`]; re-running `initialize` is the
    /// retry path.
    pub async fn initialize(self: &Arc<Self>) -> Result<(), ClientError> {
        // Retry may be re-entering a half-started session.
        self.shutdown().await;

        if let Err(err) = self.backend.check_health().await {
            return Err(self.fail_fatally(err).await);
        }

        let status = match self.backend.check_status().await {
            Ok(status) => status,
            Err(err) => return Err(self.fail_fatally(err).await),
        };
        if !status.connected {
            let message = status
                .error
                .unwrap_or_else(|| "photo server is not connected".to_string());
            return Err(self.fail_fatally(ClientError::connectivity(message)).await);
        }

        let memories = match self.backend.fetch_memories().await {
            Ok(memories) => memories,
            Err(err) => return Err(self.fail_fatally(err).await),
        };
        if memories.is_empty() {
            return Err(self
                .fail_fatally(ClientError::load("no images available to display"))
                .await);
        }

        let total = memories.len();
        {
            let mut guard = self.inner.lock().await;
            guard.sequence = memories;
            guard.cursor = 0;
            guard.source = SlideshowSource::Memories;
        }
        info!(total, "loaded memories source");
        let _ = self.events.send(ControllerEvent::SequenceReplaced {
            source: SlideshowSource::Memories,
            total,
        });

        self.probe_albums_availability().await;
        self.render_current().await?;

        let (playing, auto_refresh) = {
            let guard = self.inner.lock().await;
            (guard.playing, guard.auto_refresh)
        };
        if playing {
            self.start_slide_timer().await;
            let _ = self
                .events
                .send(ControllerEvent::PlaybackChanged { playing: true });
        }
        if auto_refresh {
            self.start_refresh_timer().await;
        }
        Ok(())
    }

    async fn fail_fatally(&self, err: ClientError) -> ClientError {
        warn!("initialization failed: {err}");
        let _ = self
            .events
            .send(ControllerEvent::FatalError(err.to_string()));
        err
    }

    /// Album availability only gates whether the source toggle is offered;
    /// probe failure is not fatal.
    async fn probe_albums_availability(&self) {
        let available = match self.backend.fetch_albums().await {
            Ok(albums) => !albums.flattened_images().is_empty(),
            Err(err) => {
                warn!("albums availability probe failed: {err}");
                false
            }
        };
        {
            let mut guard = self.inner.lock().await;
            guard.albums_available = available;
        }
        let _ = self
            .events
            .send(ControllerEvent::AlbumsAvailabilityChanged { available });
    }

    pub async fn next(self: &Arc<Self>) -> Result<(), ClientError> {
        if !self.step_forward().await {
            return Ok(());
        }
        self.render_current().await?;
        self.restart_slide_timer_if_playing().await;
        Ok(())
    }

    pub async fn previous(self: &Arc<Self>) -> Result<(), ClientError> {
        if !self.step_backward().await {
            return Ok(());
        }
        self.render_current().await?;
        self.restart_slide_timer_if_playing().await;
        Ok(())
    }

    pub async fn go_to(self: &Arc<Self>, index: usize) -> Result<(), ClientError> {
        {
            let mut guard = self.inner.lock().await;
            let len = guard.sequence.len();
            if index >= len {
                return Err(ClientError::InvalidIndex { index, len });
            }
            guard.cursor = index;
        }
        self.render_current().await?;
        self.restart_slide_timer_if_playing().await;
        Ok(())
    }

    async fn step_forward(&self) -> bool {
        let mut guard = self.inner.lock().await;
        let len = guard.sequence.len();
        if len == 0 {
            return false;
        }
        guard.cursor = (guard.cursor + 1) % len;
        true
    }

    async fn step_backward(&self) -> bool {
        let mut guard = self.inner.lock().await;
        let len = guard.sequence.len();
        if len == 0 {
            return false;
        }
        guard.cursor = if guard.cursor == 0 {
            len - 1
        } else {
            guard.cursor - 1
        };
        true
    }

    pub async fn play(self: &Arc<Self>) {
        {
            let mut guard = self.inner.lock().await;
            guard.playing = true;
        }
        self.start_slide_timer().await;
        let _ = self
            .events
            .send(ControllerEvent::PlaybackChanged { playing: true });
    }

    pub async fn pause(&self) {
        {
            let mut guard = self.inner.lock().await;
            guard.playing = false;
        }
        self.stop_slide_timer().await;
        let _ = self
            .events
            .send(ControllerEvent::PlaybackChanged { playing: false });
    }

    pub async fn toggle_playback(self: &Arc<Self>) -> bool {
        let playing = { self.inner.lock().await.playing };
        if playing {
            self.pause().await;
        } else {
            self.play().await;
        }
        !playing
    }

    /// Interval is clamped to the UI-exposed range. Changing it while
    /// playing restarts the timer with the new period immediately.
    pub async fn set_interval_secs(self: &Arc<Self>, secs: u64) {
        self.set_interval(Duration::from_secs(
            secs.clamp(MIN_SLIDE_INTERVAL_SECS, MAX_SLIDE_INTERVAL_SECS),
        ))
        .await;
    }

    async fn set_interval(self: &Arc<Self>, interval: Duration) {
        let playing = {
            let mut guard = self.inner.lock().await;
            guard.interval = interval;
            guard.playing
        };
        let _ = self
            .events
            .send(ControllerEvent::IntervalChanged { interval });
        if playing {
            self.start_slide_timer().await;
        }
    }

    pub async fn set_auto_refresh(self: &Arc<Self>, enabled: bool) {
        {
            let mut guard = self.inner.lock().await;
            guard.auto_refresh = enabled;
        }
        if enabled {
            self.start_refresh_timer().await;
        } else {
            self.stop_refresh_timer().await;
        }
    }

    /// Stops the slide timer, loads the requested source, resets the cursor,
    /// and resumes playback if it was running. Switching to the active
    /// source is a no-op. On failure the previous sequence stays visible.
    pub async fn switch_source(
        self: &Arc<Self>,
        source: SlideshowSource,
    ) -> Result<(), ClientError> {
        let (current, was_playing) = {
            let guard = self.inner.lock().await;
            (guard.source, guard.playing)
        };
        if current == source {
            return Ok(());
        }

        self.stop_slide_timer().await;
        match self.load_source(source).await {
            Ok(records) => {
                let total = records.len();
                {
                    let mut guard = self.inner.lock().await;
                    guard.sequence = records;
                    guard.cursor = 0;
                    guard.source = source;
                }
                info!(total, source = source.label(), "switched slideshow source");
                let _ = self.events.send(ControllerEvent::SourceChanged { source });
                let _ = self
                    .events
                    .send(ControllerEvent::SequenceReplaced { source, total });
                self.render_current().await?;
                if was_playing {
                    self.start_slide_timer().await;
                }
                Ok(())
            }
            Err(err) => {
                warn!(source = source.label(), "source switch failed: {err}");
                let _ = self
                    .events
                    .send(ControllerEvent::RefreshFailed(err.to_string()));
                if was_playing {
                    self.start_slide_timer().await;
                }
                Err(err)
            }
        }
    }

    /// Re-loads whichever source is active. The cursor survives a refresh,
    /// clamped to the new length; only explicit loads and switches reset it.
    pub async fn refresh_active_source(self: &Arc<Self>) {
        let source = { self.inner.lock().await.source };
        match self.load_source(source).await {
            Ok(records) => {
                let total = records.len();
                {
                    let mut guard = self.inner.lock().await;
                    guard.cursor = if records.is_empty() {
                        0
                    } else {
                        guard.cursor.min(records.len() - 1)
                    };
                    guard.sequence = records;
                }
                info!(total, source = source.label(), "refreshed active source");
                let _ = self
                    .events
                    .send(ControllerEvent::SequenceReplaced { source, total });
            }
            Err(err) => {
                warn!(source = source.label(), "auto-refresh failed: {err}");
                let _ = self
                    .events
                    .send(ControllerEvent::RefreshFailed(err.to_string()));
            }
        }
    }

    async fn load_source(&self, source: SlideshowSource) -> Result<Vec<ImageRecord>, ClientError> {
        match source {
            SlideshowSource::Memories => self.backend.fetch_memories().await,
            SlideshowSource::Albums => self
                .backend
                .fetch_albums()
                .await
                .map(|albums| albums.flattened_images()),
        }
    }

    /// Fetches bytes for the record under the cursor and emits
    /// [`ControllerEvent::SlideReady`]. An undisplayable record falls back
    /// to its thumbnail, then is skipped; after one full lap with nothing
    /// displayable the render gives up quietly.
    pub async fn render_current(self: &Arc<Self>) -> Result<(), ClientError> {
        let generation = self.render_generation.fetch_add(1, Ordering::SeqCst) + 1;

        let lap = { self.inner.lock().await.sequence.len() };
        for _ in 0..lap {
            let (record, index, total) = {
                let guard = self.inner.lock().await;
                if guard.sequence.is_empty() {
                    return Ok(());
                }
                (
                    guard.sequence[guard.cursor].clone(),
                    guard.cursor,
                    guard.sequence.len(),
                )
            };

            match self.fetch_slide_bytes(&record).await {
                Ok(bytes) => {
                    if self.render_generation.load(Ordering::SeqCst) != generation {
                        // Superseded by a newer navigation; discard.
                        return Ok(());
                    }
                    let _ = self.events.send(ControllerEvent::SlideReady {
                        index,
                        total,
                        record,
                        bytes,
                    });
                    return Ok(());
                }
                Err(err) => {
                    if self.render_generation.load(Ordering::SeqCst) != generation {
                        // Superseded by a newer navigation; leave the cursor
                        // where that navigation put it.
                        return Ok(());
                    }
                    warn!(asset = %record.id, "skipping undisplayable record: {err}");
                    let mut guard = self.inner.lock().await;
                    let len = guard.sequence.len();
                    if len > 0 {
                        guard.cursor = (guard.cursor + 1) % len;
                    }
                }
            }
        }
        if lap > 0 {
            warn!("no displayable image in the current sequence");
        }
        Ok(())
    }

    async fn fetch_slide_bytes(&self, record: &ImageRecord) -> Result<Vec<u8>, ClientError> {
        match self.backend.fetch_image(&record.id).await {
            Ok(bytes) => Ok(bytes),
            Err(err) => match &record.thumbnail_url {
                Some(thumbnail_url) => {
                    warn!(asset = %record.id, "full image fetch failed, trying thumbnail: {err}");
                    self.backend.fetch_thumbnail(thumbnail_url).await
                }
                None => Err(err),
            },
        }
    }

    async fn start_slide_timer(self: &Arc<Self>) {
        let period = { self.inner.lock().await.interval };
        let client = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval yields its first tick immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                client.advance_from_timer().await;
            }
        });
        let previous = { self.slide_timer.lock().await.replace(task) };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    async fn stop_slide_timer(&self) {
        if let Some(task) = self.slide_timer.lock().await.take() {
            task.abort();
        }
    }

    /// Timer-driven advance does not restart the timer; only manual
    /// navigation does, so a manual step never causes a double advance.
    async fn advance_from_timer(self: &Arc<Self>) {
        if !self.step_forward().await {
            return;
        }
        if let Err(err) = self.render_current().await {
            warn!("timer-driven render failed: {err}");
        }
    }

    async fn restart_slide_timer_if_playing(self: &Arc<Self>) {
        let playing = { self.inner.lock().await.playing };
        if playing {
            self.start_slide_timer().await;
        }
    }

    async fn start_refresh_timer(self: &Arc<Self>) {
        let client = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(AUTO_REFRESH_PERIOD);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                client.refresh_active_source().await;
            }
        });
        let previous = { self.refresh_timer.lock().await.replace(task) };
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    async fn stop_refresh_timer(&self) {
        if let Some(task) = self.refresh_timer.lock().await.take() {
            task.abort();
        }
    }

    /// Cancels both periodic tasks. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        self.stop_slide_timer().await;
        self.stop_refresh_timer().await;
    }
}

fn clamp_interval(interval: Duration) -> Duration {
    let secs = interval
        .as_secs()
        .clamp(MIN_SLIDE_INTERVAL_SECS, MAX_SLIDE_INTERVAL_SECS);
    Duration::from_secs(secs)
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
