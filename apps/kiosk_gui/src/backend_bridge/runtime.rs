//! Runtime bridge between the UI command queue and the slideshow controller.

use crossbeam_channel::{Receiver, Sender};

use crate::backend_bridge::commands::BackendCommand;
use crate::config::Settings;
use crate::controller::events::UiEvent;

pub fn launch(cmd_rx: Receiver<BackendCommand>, ui_tx: Sender<UiEvent>, settings: Settings) {
    crate::ui::app::start_backend_bridge(cmd_rx, ui_tx, settings);
}
