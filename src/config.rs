use std::time::Duration;

/// Tunables for the sync engine. Values come from the environment where set
/// and fall back to the recommended defaults.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How long a client waits on a mutation before rolling back.
    pub mutation_timeout: Duration,
    /// How long a conflict warning stays up without explicit dismissal.
    pub advisory_dismiss: Duration,
    /// Minimum gap between two warnings for the same field and user.
    pub advisory_window: Duration,
    /// Floor between two cursor transmissions from one client.
    pub cursor_min_interval: Duration,
    /// Presence records older than this are reaped by the sweep.
    pub presence_stale_after_secs: i64,
    pub presence_sweep_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mutation_timeout: Duration::from_secs(10),
            advisory_dismiss: Duration::from_secs(5),
            advisory_window: Duration::from_secs(5),
            cursor_min_interval: Duration::from_millis(80),
            presence_stale_after_secs: 300,
            presence_sweep_interval: Duration::from_secs(60),
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();
        Self {
            mutation_timeout: read_env_u64("SYNC_MUTATION_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.mutation_timeout),
            advisory_dismiss: read_env_u64("SYNC_ADVISORY_DISMISS_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.advisory_dismiss),
            advisory_window: read_env_u64("SYNC_ADVISORY_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.advisory_window),
            cursor_min_interval: read_env_u64("SYNC_CURSOR_MIN_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.cursor_min_interval),
            presence_stale_after_secs: read_env_u64("SYNC_PRESENCE_STALE_SECS")
                .map(|secs| secs as i64)
                .unwrap_or(defaults.presence_stale_after_secs),
            presence_sweep_interval: read_env_u64("SYNC_PRESENCE_SWEEP_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.presence_sweep_interval),
        }
    }
}

fn read_env_u64(key: &str) -> Option<u64> {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
}
