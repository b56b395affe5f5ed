use std::fs;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_url: String,
    pub slide_duration_secs: u64,
    pub autoplay: bool,
    pub auto_refresh: bool,
    pub windowed: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".into(),
            slide_duration_secs: 8,
            autoplay: true,
            auto_refresh: true,
            windowed: false,
        }
    }
}

/// Defaults, then `kiosk.toml` in the working directory, then `KIOSK_*`
/// environment variables. Command-line flags are layered on top in `main`.
pub fn load_settings() -> Settings {
    let mut settings = load_settings_file("kiosk.toml");

    if let Ok(v) = std::env::var("KIOSK_SERVER_URL") {
        settings.server_url = v;
    }
    if let Ok(v) = std::env::var("KIOSK_SLIDE_DURATION_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.slide_duration_secs = parsed;
        }
    }
    if let Ok(v) = std::env::var("KIOSK_AUTOPLAY") {
        if let Some(parsed) = parse_bool(&v) {
            settings.autoplay = parsed;
        }
    }
    if let Ok(v) = std::env::var("KIOSK_AUTO_REFRESH") {
        if let Some(parsed) = parse_bool(&v) {
            settings.auto_refresh = parsed;
        }
    }
    if let Ok(v) = std::env::var("KIOSK_WINDOWED") {
        if let Some(parsed) = parse_bool(&v) {
            settings.windowed = parsed;
        }
    }

    settings
}

/// Per-key parsing over a `toml::Table` so one malformed value skips that
/// key instead of discarding the whole file. Integer and boolean keys also
/// accept quoted spellings.
fn load_settings_file(path: &str) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        if let Ok(table) = toml::from_str::<toml::Table>(&raw) {
            if let Some(v) = table.get("server_url").and_then(toml::Value::as_str) {
                settings.server_url = v.to_string();
            }
            if let Some(v) = table.get("slide_duration_secs").and_then(value_as_u64) {
                settings.slide_duration_secs = v;
            }
            if let Some(v) = table.get("autoplay").and_then(value_as_bool) {
                settings.autoplay = v;
            }
            if let Some(v) = table.get("auto_refresh").and_then(value_as_bool) {
                settings.auto_refresh = v;
            }
            if let Some(v) = table.get("windowed").and_then(value_as_bool) {
                settings.windowed = v;
            }
        }
    }

    settings
}

fn value_as_u64(value: &toml::Value) -> Option<u64> {
    match value {
        toml::Value::Integer(n) => u64::try_from(*n).ok(),
        toml::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_bool(value: &toml::Value) -> Option<bool> {
    match value {
        toml::Value::Boolean(b) => Some(*b),
        toml::Value::String(s) => parse_bool(s),
        _ => None,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
