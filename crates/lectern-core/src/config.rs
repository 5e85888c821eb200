//! Gateway configuration, resolved from the environment with sane fallbacks.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

const APP_NAME_DIR: &str = "lectern";

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Speech-to-text upstream endpoint.
    pub stt_url: String,
    /// Language-model upstream endpoint.
    pub llm_url: String,
    /// Speech-synthesis upstream endpoint.
    pub tts_url: String,
    /// Talking-head video generator endpoint.
    pub video_url: String,
    /// Keycloak admin base URL used by the room directory lookup.
    pub directory_url: String,
    /// Bearer token for the room directory lookup.
    pub directory_token: String,
    /// Shared-storage root where generation jobs land.
    pub output_root: PathBuf,
    /// Per-owner profile media root (cloned voice, face assets).
    pub profiles_root: PathBuf,
    /// Root for uploaded reference documents.
    pub references_root: PathBuf,
    /// Language passed to speech synthesis.
    pub language: String,
    /// Poll interval while waiting for the first audio chunk.
    pub chunk_poll_interval: Duration,
    /// Hard bound on the first-chunk wait.
    pub chunk_timeout: Duration,
    /// Playlist watcher tick period.
    pub watch_interval: Duration,
    /// Per-call timeout applied to non-streaming upstream requests.
    pub upstream_timeout: Duration,
    /// Upper bound on concurrently processed pipeline requests.
    pub max_concurrent_requests: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let data_root = resolve_data_root();
        Self {
            stt_url: "http://localhost:8001/stt".to_string(),
            llm_url: "http://localhost:8002/llm".to_string(),
            tts_url: "http://localhost:8003/tts".to_string(),
            video_url: "http://localhost:8004/inference".to_string(),
            directory_url: "http://localhost:8080/admin/realms/lectern".to_string(),
            directory_token: String::new(),
            output_root: data_root.join("output"),
            profiles_root: data_root.join("profiles"),
            references_root: data_root.join("references"),
            language: "de".to_string(),
            chunk_poll_interval: Duration::from_millis(500),
            chunk_timeout: Duration::from_secs(15),
            watch_interval: Duration::from_millis(500),
            upstream_timeout: Duration::from_secs(90),
            max_concurrent_requests: 100,
        }
    }
}

impl GatewayConfig {
    /// Load configuration from `LECTERN_*` environment variables, falling
    /// back to defaults with a warning for malformed values.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            stt_url: env_string("LECTERN_STT_URL", defaults.stt_url),
            llm_url: env_string("LECTERN_LLM_URL", defaults.llm_url),
            tts_url: env_string("LECTERN_TTS_URL", defaults.tts_url),
            video_url: env_string("LECTERN_VIDEO_URL", defaults.video_url),
            directory_url: env_string("LECTERN_DIRECTORY_URL", defaults.directory_url),
            directory_token: env_string("LECTERN_DIRECTORY_TOKEN", defaults.directory_token),
            output_root: env_path("LECTERN_OUTPUT_PATH", defaults.output_root),
            profiles_root: env_path("LECTERN_PROFILES_PATH", defaults.profiles_root),
            references_root: env_path("LECTERN_REFERENCES_PATH", defaults.references_root),
            language: env_string("LECTERN_TTS_LANGUAGE", defaults.language),
            chunk_poll_interval: env_millis(
                "LECTERN_CHUNK_POLL_INTERVAL_MS",
                defaults.chunk_poll_interval,
            ),
            chunk_timeout: env_millis("LECTERN_CHUNK_TIMEOUT_MS", defaults.chunk_timeout),
            watch_interval: env_millis("LECTERN_WATCH_INTERVAL_MS", defaults.watch_interval),
            upstream_timeout: env_millis("LECTERN_UPSTREAM_TIMEOUT_MS", defaults.upstream_timeout),
            max_concurrent_requests: env_count(
                "LECTERN_MAX_CONCURRENT_REQUESTS",
                defaults.max_concurrent_requests,
            ),
        }
    }
}

fn resolve_data_root() -> PathBuf {
    if let Some(mut dir) = dirs::data_local_dir() {
        dir.push(APP_NAME_DIR);
        return dir;
    }
    PathBuf::from("data")
}

fn env_string(key: &str, default: String) -> String {
    match std::env::var(key) {
        Ok(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                default
            } else {
                trimmed.to_string()
            }
        }
        Err(_) => default,
    }
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    match std::env::var(key) {
        Ok(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                default
            } else {
                PathBuf::from(trimmed)
            }
        }
        Err(_) => default,
    }
}

fn env_millis(key: &str, default: Duration) -> Duration {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!("Invalid {key}='{raw}', falling back to {}ms", default.as_millis());
                default
            }
        },
        Err(_) => default,
    }
}

fn env_count(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<usize>() {
            Ok(value) => value,
            Err(_) => {
                warn!("Invalid {key}='{raw}', falling back to {default}");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, MutexGuard, OnceLock};

    fn env_lock() -> MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .expect("environment lock poisoned")
    }

    #[test]
    fn environment_overrides_defaults() {
        let _guard = env_lock();
        std::env::set_var("LECTERN_STT_URL", "http://stt:9000/transcribe");
        std::env::set_var("LECTERN_CHUNK_TIMEOUT_MS", "2000");
        std::env::set_var("LECTERN_MAX_CONCURRENT_REQUESTS", "7");

        let config = GatewayConfig::from_env();

        assert_eq!(config.stt_url, "http://stt:9000/transcribe");
        assert_eq!(config.chunk_timeout, Duration::from_millis(2000));
        assert_eq!(config.max_concurrent_requests, 7);
        std::env::remove_var("LECTERN_STT_URL");
        std::env::remove_var("LECTERN_CHUNK_TIMEOUT_MS");
        std::env::remove_var("LECTERN_MAX_CONCURRENT_REQUESTS");
    }

    #[test]
    fn malformed_duration_falls_back_to_default() {
        let _guard = env_lock();
        std::env::set_var("LECTERN_CHUNK_TIMEOUT_MS", "soon");

        let config = GatewayConfig::from_env();

        assert_eq!(config.chunk_timeout, Duration::from_secs(15));
        std::env::remove_var("LECTERN_CHUNK_TIMEOUT_MS");
    }

    #[test]
    fn malformed_request_cap_falls_back_to_default() {
        let _guard = env_lock();
        std::env::set_var("LECTERN_MAX_CONCURRENT_REQUESTS", "many");

        let config = GatewayConfig::from_env();

        assert_eq!(config.max_concurrent_requests, 100);
        std::env::remove_var("LECTERN_MAX_CONCURRENT_REQUESTS");
    }

    #[test]
    fn blank_values_are_ignored() {
        let _guard = env_lock();
        std::env::set_var("LECTERN_TTS_LANGUAGE", "   ");

        let config = GatewayConfig::from_env();

        assert_eq!(config.language, "de");
        std::env::remove_var("LECTERN_TTS_LANGUAGE");
    }
}
