//! Merging device-reported snapshots into client configuration.

use crate::device::types::{ConfigSnapshot, DeviceConfig};
use std::collections::BTreeSet;

/// Pure merge of a [`ConfigSnapshot`] over a prior [`DeviceConfig`].
///
/// Present snapshot fields overwrite, absent ones keep the prior value.
/// `columns` is always rebuilt from the snapshot's `column_location` keys
/// and is empty when the snapshot carries none. Applying the same snapshot
/// twice gives the same result as applying it once.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigReconciler;

impl ConfigReconciler {
    pub fn apply(prior: &DeviceConfig, snapshot: &ConfigSnapshot) -> DeviceConfig {
        let mut config = prior.clone();

        if let Some(streaming) = snapshot.streaming {
            config.connected = streaming;
        }
        if let Some(source) = snapshot.source {
            config.source = source;
        }
        if let Some(mode) = snapshot.mode {
            config.mode = mode;
        }
        if let Some(ref device_id) = snapshot.device_id {
            config.device_id = device_id.clone();
        }
        if let Some(baud_rate) = snapshot.baud_rate {
            config.baud_rate = Some(baud_rate);
        }
        if let Some(sample_rate) = snapshot.sample_rate {
            config.sample_rate = Some(sample_rate);
        }
        if let Some(camera_on) = snapshot.camera_on {
            config.camera_connected = camera_on;
        }
        if let Some(ref protocol) = snapshot.protocol {
            config.protocol = Some(protocol.clone());
        }

        config.columns = snapshot
            .column_location
            .as_ref()
            .map(|locations| locations.keys().cloned().collect())
            .unwrap_or_else(BTreeSet::new);

        config
    }
}
