use std::sync::{Arc, PoisonError, RwLock};
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::interfaces::admin_gate::AdminGate;
use crate::price_infra::normalizer::MAX_POW10_EXPONENT;
use crate::price_infra::{AggregationParameters, SourceDescriptor};
use crate::types::bps::Bps;
use crate::types::ids::{OperatorId, SourceFingerprint, SourceKey};
use crate::MAX_AGGREGATOR_DECIMALS;

/// One consistent view of the configured sources and parameters. Aggregation
/// reads exactly one snapshot per call; admin mutations publish a new one.
#[derive(Clone, Debug)]
pub struct RegistrySnapshot {
    primary: Option<SourceDescriptor>,
    secondary: Option<SourceDescriptor>,
    sources: im::Vector<SourceDescriptor>,
    fingerprints: im::HashSet<SourceFingerprint>,
    parameters: AggregationParameters,
}

impl RegistrySnapshot {
    pub fn new(parameters: AggregationParameters) -> Self {
        RegistrySnapshot {
            primary: None,
            secondary: None,
            sources: im::Vector::new(),
            fingerprints: im::HashSet::new(),
            parameters,
        }
    }

    /// Build a snapshot directly, without going through the admin gate
    pub fn with_sources(sources: Vec<SourceDescriptor>, parameters: AggregationParameters) -> Self {
        let mut snapshot = RegistrySnapshot::new(parameters);
        for descriptor in sources {
            snapshot.fingerprints.insert(descriptor.key.fingerprint());
            snapshot.sources.push_back(descriptor);
        }
        snapshot
    }

    pub fn parameters(&self) -> &AggregationParameters {
        &self.parameters
    }

    /// Every source to query, in collection order: primary, secondary, then
    /// registered descriptors in insertion order.
    pub fn sources(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.primary.iter()
            .chain(self.secondary.iter())
            .chain(self.sources.iter())
    }

    pub fn source_count(&self) -> usize {
        self.primary.is_some() as usize + self.secondary.is_some() as usize + self.sources.len()
    }

    pub fn registered(&self) -> &im::Vector<SourceDescriptor> {
        &self.sources
    }

    pub fn primary(&self) -> Option<&SourceDescriptor> {
        self.primary.as_ref()
    }

    pub fn secondary(&self) -> Option<&SourceDescriptor> {
        self.secondary.as_ref()
    }

    /// True when any slot or registered descriptor uses `key`
    pub fn contains(&self, key: &SourceKey) -> bool {
        self.fingerprints.contains(&key.fingerprint())
    }

    fn slot_mut(&mut self, slot: Slot) -> &mut Option<SourceDescriptor> {
        match slot {
            Slot::Primary => &mut self.primary,
            Slot::Secondary => &mut self.secondary,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Primary,
    Secondary,
}

/// Owns the mutable source set and aggregation parameters.
///
/// Mutations are serialized by the write lock and publish a whole new snapshot,
/// so readers see either the old or the new configuration, never a mix.
pub struct SourceRegistry {
    state: RwLock<Arc<RegistrySnapshot>>,
    gate: Arc<dyn AdminGate>,
}

impl SourceRegistry {
    pub fn new(parameters: AggregationParameters, gate: Arc<dyn AdminGate>) -> Result<Self> {
        validate_aggregator_decimals(parameters.aggregator_decimals)?;
        validate_deviation(parameters.max_price_deviation)?;
        validate_stale_threshold(parameters.stale_threshold)?;

        Ok(SourceRegistry {
            state: RwLock::new(Arc::new(RegistrySnapshot::new(parameters))),
            gate,
        })
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.state.read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn mutate<T>(
        &self,
        operator: OperatorId,
        apply: impl FnOnce(&mut RegistrySnapshot) -> Result<T>,
    ) -> Result<T> {
        self.gate.authorize(operator)?;

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = RegistrySnapshot::clone(&state);
        let output = apply(&mut next)?;
        *state = Arc::new(next);
        Ok(output)
    }

    pub fn add_source(&self, operator: OperatorId, descriptor: SourceDescriptor) -> Result<()> {
        validate_source_decimals(descriptor.decimals)?;

        self.mutate(operator, |snapshot| {
            let fingerprint = descriptor.key.fingerprint();
            if snapshot.fingerprints.contains(&fingerprint) {
                return Err(Error::DuplicateSource(descriptor.key.clone()));
            }

            tracing::info!(
                %operator,
                source = %descriptor.label,
                key = %descriptor.key,
                %fingerprint,
                decimals = descriptor.decimals,
                "Source added"
            );
            snapshot.fingerprints.insert(fingerprint);
            snapshot.sources.push_back(descriptor);
            Ok(())
        })
    }

    pub fn remove_source(&self, operator: OperatorId, key: &SourceKey) -> Result<SourceDescriptor> {
        self.mutate(operator, |snapshot| {
            let index = snapshot.sources.iter()
                .position(|d| &d.key == key)
                .ok_or_else(|| Error::SourceNotFound(key.clone()))?;

            let removed = snapshot.sources.remove(index);
            snapshot.fingerprints.remove(&key.fingerprint());
            tracing::info!(%operator, source = %removed.label, %key, "Source removed");
            Ok(removed)
        })
    }

    /// Drops every registered descriptor; primary and secondary slots are kept.
    pub fn remove_all_sources(&self, operator: OperatorId) -> Result<usize> {
        self.mutate(operator, |snapshot| {
            let removed = snapshot.sources.len();
            for descriptor in std::mem::take(&mut snapshot.sources) {
                snapshot.fingerprints.remove(&descriptor.key.fingerprint());
            }
            tracing::info!(%operator, removed, "All sources removed");
            Ok(removed)
        })
    }

    pub fn set_slot(&self, operator: OperatorId, slot: Slot, descriptor: SourceDescriptor) -> Result<()> {
        validate_source_decimals(descriptor.decimals)?;

        self.mutate(operator, |snapshot| {
            // The descriptor being replaced gives its key up first
            if let Some(previous) = snapshot.slot_mut(slot).take() {
                snapshot.fingerprints.remove(&previous.key.fingerprint());
            }

            let fingerprint = descriptor.key.fingerprint();
            if snapshot.fingerprints.contains(&fingerprint) {
                return Err(Error::DuplicateSource(descriptor.key.clone()));
            }

            tracing::info!(%operator, ?slot, source = %descriptor.label, key = %descriptor.key, "Slot feed set");
            snapshot.fingerprints.insert(fingerprint);
            *snapshot.slot_mut(slot) = Some(descriptor);
            Ok(())
        })
    }

    pub fn clear_slot(&self, operator: OperatorId, slot: Slot) -> Result<Option<SourceDescriptor>> {
        self.mutate(operator, |snapshot| {
            tracing::info!(%operator, ?slot, "Slot feed cleared");
            let cleared = snapshot.slot_mut(slot).take();
            if let Some(descriptor) = &cleared {
                snapshot.fingerprints.remove(&descriptor.key.fingerprint());
            }
            Ok(cleared)
        })
    }

    pub fn set_stale_threshold(&self, operator: OperatorId, secs: u64) -> Result<()> {
        validate_stale_threshold(secs)?;
        self.mutate(operator, |snapshot| {
            tracing::info!(%operator, secs, "Stale threshold updated");
            snapshot.parameters.stale_threshold = secs;
            Ok(())
        })
    }

    pub fn set_lambda(&self, operator: OperatorId, lambda: u64) -> Result<()> {
        self.mutate(operator, |snapshot| {
            tracing::info!(%operator, lambda, "Decay rate updated");
            snapshot.parameters.lambda = lambda;
            Ok(())
        })
    }

    pub fn set_max_price_deviation(&self, operator: OperatorId, deviation: Bps) -> Result<()> {
        validate_deviation(deviation)?;
        self.mutate(operator, |snapshot| {
            tracing::info!(%operator, %deviation, "Max price deviation updated");
            snapshot.parameters.max_price_deviation = deviation;
            Ok(())
        })
    }

    pub fn set_outlier_detection(&self, operator: OperatorId, enabled: bool) -> Result<()> {
        self.mutate(operator, |snapshot| {
            tracing::info!(%operator, enabled, "Outlier detection toggled");
            snapshot.parameters.outlier_detection_enabled = enabled;
            Ok(())
        })
    }

    pub fn set_allow_stale_fallback(&self, operator: OperatorId, allowed: bool) -> Result<()> {
        self.mutate(operator, |snapshot| {
            tracing::info!(%operator, allowed, "Stale fallback toggled");
            snapshot.parameters.allow_stale_fallback = allowed;
            Ok(())
        })
    }

    pub fn set_aggregator_decimals(&self, operator: OperatorId, decimals: u8) -> Result<()> {
        validate_aggregator_decimals(decimals)?;
        self.mutate(operator, |snapshot| {
            tracing::info!(%operator, decimals, "Aggregator decimals updated");
            snapshot.parameters.aggregator_decimals = decimals;
            Ok(())
        })
    }

    pub fn pause(&self, operator: OperatorId) -> Result<()> {
        self.set_paused(operator, true)
    }

    pub fn unpause(&self, operator: OperatorId) -> Result<()> {
        self.set_paused(operator, false)
    }

    fn set_paused(&self, operator: OperatorId, paused: bool) -> Result<()> {
        self.mutate(operator, |snapshot| {
            if paused {
                tracing::warn!(%operator, "Aggregator PAUSED");
            } else {
                tracing::info!(%operator, "Aggregator RESUMED");
            }
            snapshot.parameters.paused = paused;
            Ok(())
        })
    }
}

fn validate_aggregator_decimals(decimals: u8) -> Result<()> {
    if decimals > MAX_AGGREGATOR_DECIMALS {
        return Err(Error::DecimalOverflow {
            decimals,
            max: MAX_AGGREGATOR_DECIMALS,
        });
    }
    Ok(())
}

fn validate_source_decimals(decimals: u8) -> Result<()> {
    if decimals > MAX_POW10_EXPONENT {
        return Err(Error::DecimalOverflow {
            decimals,
            max: MAX_POW10_EXPONENT,
        });
    }
    Ok(())
}

fn validate_deviation(deviation: Bps) -> Result<()> {
    if deviation > Bps::MAX {
        return Err(Error::InvalidParameter {
            name: "max_price_deviation",
            reason: format!("{} exceeds {}", deviation, Bps::MAX),
        });
    }
    Ok(())
}

fn validate_stale_threshold(secs: u64) -> Result<()> {
    if secs == 0 {
        return Err(Error::InvalidParameter {
            name: "stale_threshold",
            reason: "must be positive".to_string(),
        });
    }
    Ok(())
}
