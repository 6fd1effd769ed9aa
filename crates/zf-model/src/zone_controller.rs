//! Arbitration of zone demands into one unit command.

use crate::error::{ModelError, ModelResult};
use crate::status::{UnitControlSignal, ZoneStatus};
use crate::zone::Zone;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use zf_core::Signal;

/// Final unit demand from the partial sums.
///
/// # Arguments
///
/// * `total` - Demand of every enabled, calling zone
/// * `voting` - Demand of the enabled, calling, voting zones
/// * `voting_enabled` - How many zones are enabled and voting, calling or not
///
/// Non-voting zones never run the unit on their own while someone is entitled
/// to vote. They can push harder in the direction the voters already chose.
pub fn compute_demand(total: f64, voting: f64, voting_enabled: usize) -> f64 {
    if voting == 0.0 && voting_enabled > 0 {
        return 0.0;
    }
    if voting * total >= 0.0 && total.abs() > voting.abs() {
        total
    } else {
        voting
    }
}

#[derive(Debug, Default)]
struct ArbitrationState {
    statuses: BTreeMap<String, Signal<ZoneStatus, String>>,
    last_known_calling: usize,
    need_bump: bool,
}

/// Merges zone statuses into the demand for the shared unit.
///
/// The zone set is fixed at construction. Lock order is controller first,
/// then zone.
#[derive(Debug)]
pub struct ZoneController {
    zones: BTreeMap<String, Arc<Zone>>,
    state: Mutex<ArbitrationState>,
}

impl ZoneController {
    pub fn new(zones: impl IntoIterator<Item = Arc<Zone>>) -> ModelResult<Self> {
        let mut map = BTreeMap::new();
        for zone in zones {
            let name = zone.name().to_string();
            if map.insert(name.clone(), zone).is_some() {
                return Err(ModelError::DuplicateZone { name });
            }
        }
        if map.is_empty() {
            return Err(ModelError::InvalidArg {
                what: "zone controller needs at least one zone",
            });
        }
        Ok(Self {
            zones: map,
            state: Mutex::new(ArbitrationState::default()),
        })
    }

    pub fn zones(&self) -> impl Iterator<Item = &Arc<Zone>> {
        self.zones.values()
    }

    pub fn zone(&self, name: &str) -> Option<&Arc<Zone>> {
        self.zones.get(name)
    }

    /// Last status seen from every zone that has reported.
    pub fn statuses(&self) -> BTreeMap<String, Signal<ZoneStatus, String>> {
        self.state.lock().statuses.clone()
    }

    /// True after the count of calling voting zones went from zero to
    /// positive on the last update.
    pub fn needs_bump(&self) -> bool {
        self.state.lock().need_bump
    }

    /// Record one zone status and recompute the unit demand.
    ///
    /// Statuses from zones not in the set are dropped with a warning.
    pub fn process(&self, signal: Signal<ZoneStatus, String>) -> Option<Signal<UnitControlSignal>> {
        let Some(name) = signal.payload().cloned() else {
            warn!(%signal, "status without a zone name, dropped");
            return None;
        };
        if !self.zones.contains_key(&name) {
            warn!(zone = %name, "alien zone, not one of {:?}", self.zones.keys().collect::<Vec<_>>());
            return None;
        }

        let mut state = self.state.lock();
        let timestamp = signal.timestamp();
        state.statuses.insert(name, signal);

        let mut total = 0.0;
        let mut voting = 0.0;
        let mut unhappy = 0;
        let mut unhappy_voting = 0;

        for (name, status) in &state.statuses {
            let Some(status) = status.value() else {
                trace!(zone = %name, "in error, ignored");
                continue;
            };
            if !status.settings.is_enabled() || !status.calling.calling {
                continue;
            }
            unhappy += 1;
            total += status.calling.demand;
            if status.settings.is_voting() {
                unhappy_voting += 1;
                voting += status.calling.demand;
            }
        }

        state.need_bump = state.last_known_calling == 0 && unhappy_voting > 0;
        if state.need_bump {
            info!(unhappy_voting, "equipment starting");
        }
        state.last_known_calling = unhappy_voting;

        let voting_enabled = self
            .zones
            .values()
            .map(|zone| zone.settings())
            .filter(|settings| settings.is_enabled() && settings.is_voting())
            .count();

        let demand = compute_demand(total, voting, voting_enabled);
        debug!(unhappy, unhappy_voting, voting_enabled, total, voting, demand, "arbitrated");

        Some(Signal::new(
            timestamp,
            UnitControlSignal {
                demand,
                fan_speed: None,
            },
        ))
    }
}
