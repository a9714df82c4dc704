use checkin_core::Mode;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Base URL of the verification backend.
    pub backend_url: String,
    /// Value sent in the `x-internal-api-key` header.
    pub api_key: Option<String>,
    /// Timeout in seconds for one verification request.
    pub request_timeout_secs: u64,
    /// Period of the detection tick.
    pub detection_interval_ms: u64,
    /// How long the capturing flag stays set after a result returns.
    pub capture_cooldown_ms: u64,
    /// JPEG quality (1-100) of the submitted still.
    pub jpeg_quality: u8,
    /// Detection trace replayed by the frame source.
    pub frame_trace: Option<PathBuf>,
    /// Mode started at daemon startup when its profile allows auto-start.
    pub auto_start_mode: Option<Mode>,
    /// Whether the daemon is running on the session bus (development mode).
    pub session_bus: bool,
}

impl Config {
    /// Load configuration from `CHECKIN_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            backend_url: std::env::var("CHECKIN_BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            api_key: std::env::var("CHECKIN_API_KEY").ok().filter(|k| !k.is_empty()),
            request_timeout_secs: env_u64("CHECKIN_REQUEST_TIMEOUT_SECS", 15).max(1),
            detection_interval_ms: env_u64("CHECKIN_DETECTION_INTERVAL_MS", 100).clamp(50, 1000),
            capture_cooldown_ms: env_u64("CHECKIN_CAPTURE_COOLDOWN_MS", 2000),
            jpeg_quality: env_u64("CHECKIN_JPEG_QUALITY", 90).clamp(1, 100) as u8,
            frame_trace: std::env::var("CHECKIN_FRAME_TRACE").map(PathBuf::from).ok(),
            auto_start_mode: std::env::var("CHECKIN_AUTO_START")
                .ok()
                .and_then(|v| v.parse().ok()),
            session_bus: std::env::var("CHECKIN_SESSION_BUS").is_ok(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn detection_interval(&self) -> Duration {
        Duration::from_millis(self.detection_interval_ms)
    }

    pub fn capture_cooldown(&self) -> Duration {
        Duration::from_millis(self.capture_cooldown_ms)
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_request_timeout_is_raised() {
        std::env::set_var("CHECKIN_REQUEST_TIMEOUT_SECS", "0");
        let config = Config::from_env();
        std::env::remove_var("CHECKIN_REQUEST_TIMEOUT_SECS");

        assert_eq!(config.request_timeout_secs, 1);
        assert_eq!(config.request_timeout(), Duration::from_secs(1));
    }
}
