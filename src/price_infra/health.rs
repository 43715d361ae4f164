use dashmap::DashMap;
use serde::Serialize;
use crate::price_infra::collector::Collection;
use crate::types::ids::SourceKey;
use crate::types::timestamp::Timestamp;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HealthStats {
    pub label: String,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub last_success: Option<Timestamp>,
    pub last_error: Option<String>,
}

impl HealthStats {
    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures == 0
    }
}

/// Per-source query history, keyed by `(sender, key)`. Diagnostic only: nothing
/// in the aggregation path reads it.
pub struct SourceHealth {
    stats: DashMap<SourceKey, HealthStats>,
    failure_alert_threshold: u32,
}

impl SourceHealth {
    pub fn new(failure_alert_threshold: u32) -> Self {
        SourceHealth {
            stats: DashMap::new(),
            failure_alert_threshold,
        }
    }

    /// Fold one round into the history. A collection covers every configured
    /// source, so entries for anything absent from it are dropped.
    pub fn record(&self, collection: &Collection, now: Timestamp) {
        self.stats.retain(|key, _| collection.samples.iter().any(|s| &s.key == key));

        for sample in &collection.samples {
            let mut entry = self.stats.entry(sample.key.clone()).or_default();
            entry.label.clone_from(&sample.label);
            match &sample.outcome {
                Ok(_) => {
                    entry.consecutive_failures = 0;
                    entry.last_success = Some(now);
                }
                Err(e) => {
                    entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
                    entry.total_failures += 1;
                    entry.last_error = Some(e.to_string());

                    if entry.consecutive_failures == self.failure_alert_threshold {
                        crate::utils::helper::alert_operations_team_warning(format!(
                            "Source {} ({}) failed {} times in a row: {}",
                            sample.label, sample.key, entry.consecutive_failures, e
                        ));
                    }
                }
            }
        }
    }

    pub fn get(&self, key: &SourceKey) -> Option<HealthStats> {
        self.stats.get(key).map(|s| s.clone())
    }

    pub fn unhealthy_sources(&self) -> Vec<SourceKey> {
        self.stats.iter()
            .filter(|entry| !entry.value().is_healthy())
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn forget(&self, key: &SourceKey) {
        self.stats.remove(key);
    }
}

impl Default for SourceHealth {
    fn default() -> Self {
        SourceHealth::new(5)
    }
}
