//! Persistence seams for stops and vehicle runs.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Mutex,
};

use crate::{
    Error, Result,
    error::poisoned,
    model::{LineId, Stop, StopId, VehicleId, VehicleRun},
};

pub trait StopStore: Send + Sync {
    /// Active stops assigned to `line`, in a stable order.
    fn active_stops(&self, line: LineId) -> Result<Vec<Stop>>;

    fn stop(&self, id: StopId) -> Result<Option<Stop>>;

    fn upsert_stop(&self, stop: Stop) -> Result<()>;

    fn set_stop_active(&self, id: StopId, active: bool) -> Result<()>;

    /// Lines with at least one active stop.
    fn lines(&self) -> Result<Vec<LineId>>;
}

pub trait VehicleStore: Send + Sync {
    fn vehicle(&self, id: VehicleId) -> Result<Option<VehicleRun>>;

    fn save_vehicle(&self, run: VehicleRun) -> Result<()>;

    fn active_vehicles(&self) -> Result<Vec<VehicleRun>>;
}

/// In-process store, ordered by id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    stops: Mutex<BTreeMap<StopId, Stop>>,
    vehicles: Mutex<BTreeMap<VehicleId, VehicleRun>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stops(stops: impl IntoIterator<Item = Stop>) -> Self {
        Self {
            stops: Mutex::new(stops.into_iter().map(|s| (s.id, s)).collect()),
            vehicles: Mutex::default(),
        }
    }
}

impl StopStore for MemoryStore {
    fn active_stops(&self, line: LineId) -> Result<Vec<Stop>> {
        let stops = self.stops.lock().map_err(poisoned("stop store"))?;
        Ok(stops
            .values()
            .filter(|s| s.active && s.line_id == Some(line))
            .cloned()
            .collect())
    }

    fn stop(&self, id: StopId) -> Result<Option<Stop>> {
        let stops = self.stops.lock().map_err(poisoned("stop store"))?;
        Ok(stops.get(&id).cloned())
    }

    fn upsert_stop(&self, stop: Stop) -> Result<()> {
        let mut stops = self.stops.lock().map_err(poisoned("stop store"))?;
        stops.insert(stop.id, stop);
        Ok(())
    }

    fn set_stop_active(&self, id: StopId, active: bool) -> Result<()> {
        let mut stops = self.stops.lock().map_err(poisoned("stop store"))?;
        let stop = stops.get_mut(&id).ok_or(Error::UnknownStop(id))?;
        stop.active = active;
        Ok(())
    }

    fn lines(&self) -> Result<Vec<LineId>> {
        let stops = self.stops.lock().map_err(poisoned("stop store"))?;
        let lines: BTreeSet<LineId> = stops
            .values()
            .filter(|s| s.active)
            .filter_map(|s| s.line_id)
            .collect();
        Ok(lines.into_iter().collect())
    }
}

impl VehicleStore for MemoryStore {
    fn vehicle(&self, id: VehicleId) -> Result<Option<VehicleRun>> {
        let vehicles = self.vehicles.lock().map_err(poisoned("vehicle store"))?;
        Ok(vehicles.get(&id).cloned())
    }

    fn save_vehicle(&self, run: VehicleRun) -> Result<()> {
        let mut vehicles = self.vehicles.lock().map_err(poisoned("vehicle store"))?;
        vehicles.insert(run.id, run);
        Ok(())
    }

    fn active_vehicles(&self) -> Result<Vec<VehicleRun>> {
        let vehicles = self.vehicles.lock().map_err(poisoned("vehicle store"))?;
        Ok(vehicles.values().filter(|v| v.active).cloned().collect())
    }
}
