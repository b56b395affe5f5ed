//! UI/backend events and error modeling for the kiosk controller.

use client_core::ControllerEvent;

pub enum UiEvent {
    Info(String),
    BackendReady,
    /// Slideshow controller events forwarded unchanged from the worker.
    Controller(ControllerEvent),
    Error(UiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Connectivity,
    Load,
    Render,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    BackendStartup,
    Startup,
    Refresh,
    SourceSwitch,
    General,
}

/// Turns a raw startup failure into the message shown on the error screen.
pub fn classify_startup_failure(message: &str) -> String {
    let lower = message.to_ascii_lowercase();
    if lower.contains("backend worker startup failure")
        || lower.contains("failed to build backend runtime")
        || lower.contains("invalid backend url")
    {
        "Backend worker startup failure; check the configured server URL and restart the kiosk."
            .to_string()
    } else if lower.contains("failed to connect")
        || lower.contains("connection refused")
        || lower.contains("dns")
        || lower.contains("timed out")
        || lower.contains("connectivity check failed")
        || lower.contains("not connected")
    {
        "Photo server unreachable; check the backend add-on and network, then retry.".to_string()
    } else if lower.contains("no images available") {
        "No images available to display. Check the photo server configuration.".to_string()
    } else {
        format!("Startup error: {message}")
    }
}

#[derive(Debug, Clone)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let message_lower = message.to_ascii_lowercase();
        let category = if message_lower.contains("connectivity")
            || message_lower.contains("connection")
            || message_lower.contains("timeout")
            || message_lower.contains("timed out")
            || message_lower.contains("network")
            || message_lower.contains("unreachable")
            || message_lower.contains("not connected")
        {
            UiErrorCategory::Connectivity
        } else if message_lower.contains("load")
            || message_lower.contains("no images")
            || message_lower.contains("memories")
            || message_lower.contains("albums")
        {
            UiErrorCategory::Load
        } else if message_lower.contains("image")
            || message_lower.contains("thumbnail")
            || message_lower.contains("decode")
        {
            UiErrorCategory::Render
        } else {
            UiErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
        }
    }

    /// Startup failures end the session and swap in the error screen;
    /// everything else is reported in the status line.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.context,
            UiErrorContext::BackendStartup | UiErrorContext::Startup
        )
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
