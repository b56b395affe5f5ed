//! Commands queued from the UI thread to the backend worker.

use shared::domain::SlideshowSource;

pub enum BackendCommand {
    Initialize,
    Retry,
    NextSlide,
    PreviousSlide,
    TogglePlayback,
    SetInterval { secs: u64 },
    SetAutoRefresh { enabled: bool },
    SwitchSource { source: SlideshowSource },
}
