use std::time::{SystemTime, UNIX_EPOCH};

/// Get current timestamp in seconds since epoch
pub fn current_timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Alert operations team (warning)
pub fn alert_operations_team_warning(message: String) {
    tracing::warn!("WARNING ALERT: {}", message);
}
