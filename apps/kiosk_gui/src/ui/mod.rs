//! UI layer: the kiosk app shell and the backend worker entry point.

pub mod app;

pub use app::KioskApp;
