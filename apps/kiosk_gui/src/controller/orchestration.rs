//! Command orchestration helpers from UI actions to the backend command queue.

use crossbeam_channel::{Sender, TrySendError};

use crate::backend_bridge::commands::BackendCommand;

pub fn dispatch_backend_command(
    cmd_tx: &Sender<BackendCommand>,
    cmd: BackendCommand,
    status: &mut String,
) {
    let cmd_name = match &cmd {
        BackendCommand::Initialize => "initialize",
        BackendCommand::Retry => "retry",
        BackendCommand::NextSlide => "next_slide",
        BackendCommand::PreviousSlide => "previous_slide",
        BackendCommand::TogglePlayback => "toggle_playback",
        BackendCommand::SetInterval { .. } => "set_interval",
        BackendCommand::SetAutoRefresh { .. } => "set_auto_refresh",
        BackendCommand::SwitchSource { .. } => "switch_source",
    };

    match cmd_tx.try_send(cmd) {
        Ok(()) => tracing::debug!(command = cmd_name, "queued ui->backend command"),
        Err(TrySendError::Full(_)) => {
            *status = "Command queue is full; please retry".to_string();
        }
        Err(TrySendError::Disconnected(_)) => {
            *status = "Backend worker disconnected; restart the kiosk".to_string();
        }
    }
}
