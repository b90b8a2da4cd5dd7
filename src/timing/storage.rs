//! Per-network timing parameters
//!
//! Seeded from configuration and kept current from the traffic itself:
//! bonding results change the bonded-node count, enumeration reveals the RF
//! mode, OS info reveals the TR series and FRC `set_params` changes the FRC
//! response time.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::protocol::{CallRequest, DeviceInterface, Value};

use super::{NetworkTiming, RfMode};

/// Thread-safe map of network id to timing parameters
#[derive(Debug)]
pub struct TimingParamsStorage {
    /// Used for networks without an explicit entry
    default: NetworkTiming,

    entries: RwLock<HashMap<String, NetworkTiming>>,
}

impl TimingParamsStorage {
    pub fn new(default: NetworkTiming, seeds: HashMap<String, NetworkTiming>) -> Self {
        Self {
            default,
            entries: RwLock::new(seeds),
        }
    }

    /// Current parameters of a network
    pub fn get(&self, network_id: &str) -> NetworkTiming {
        self.entries
            .read()
            .get(network_id)
            .copied()
            .unwrap_or(self.default)
    }

    /// Apply a change to a network's parameters
    pub fn update(&self, network_id: &str, change: impl FnOnce(&mut NetworkTiming)) {
        let mut entries = self.entries.write();
        let entry = entries
            .entry(network_id.to_string())
            .or_insert(self.default);
        change(entry);
    }

    /// Learn from a successful response to `request`.
    ///
    /// Returns true if the stored parameters changed.
    pub fn apply_response(&self, request: &CallRequest, result: &Value) -> bool {
        let before = self.get(&request.network_id);
        let mut after = before;

        match (request.interface, request.method.as_str(), result) {
            (DeviceInterface::Coordinator, "get_bonded_nodes", Value::Nodes(nodes)) => {
                after.bonded_nodes = nodes.len() as u16;
            }
            (DeviceInterface::Coordinator, "clear_all_bonds", _) => {
                after.bonded_nodes = 0;
            }
            (DeviceInterface::Coordinator, "bond_node" | "authorize_bond", Value::BondedNode(bonded)) => {
                after.bonded_nodes = bonded.dev_nr as u16;
            }
            (DeviceInterface::Coordinator, "remove_bonded_node" | "rebond_node", Value::U8(count)) => {
                after.bonded_nodes = *count as u16;
            }
            (DeviceInterface::PeripheralInfo, "enumeration", Value::Enumeration(enumeration)) => {
                after.rf_mode = if enumeration.is_std_mode() { RfMode::Std } else { RfMode::Lp };
            }
            (DeviceInterface::Frc, "set_params", _) => {
                if let Some(Value::FrcConfiguration(rt)) = request.args.first() {
                    after.frc_response_time = *rt;
                }
            }
            (DeviceInterface::Os, "read", Value::OsInfo(info)) => {
                after.tr_series = info.tr_type.series();
            }
            _ => {}
        }

        if after == before {
            return false;
        }

        tracing::debug!(
            "Timing params of network {} updated: {:?} -> {:?}",
            request.network_id,
            before,
            after
        );
        self.update(&request.network_id, |entry| *entry = after);
        true
    }
}

impl Default for TimingParamsStorage {
    fn default() -> Self {
        Self::new(NetworkTiming::default(), HashMap::new())
    }
}
