//! Consumer-facing operations over the route cache and per-vehicle state.
//!
//! Every vehicle's traversal state sits behind its own mutex, so repeated
//! `advance` calls for one vehicle are serialized while different vehicles
//! proceed independently. The map of vehicles is only locked to look a vehicle
//! up; route builds never happen under it.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use crate::{
    Error, Result,
    error::poisoned,
    lookahead::LookaheadCache,
    model::{LineId, Stop, StopId, VehicleId},
    route_cache::{ResolvedOrder, RouteCache},
    store::{StopStore, VehicleStore},
    traversal::TraversalState,
};

/// Resolved order and first preview of a freshly started run.
#[derive(Clone, Debug)]
pub struct StartedRun {
    pub order: Arc<ResolvedOrder>,
    pub lookahead: Arc<[Stop]>,
}

pub struct FleetService {
    routes: Arc<RouteCache>,
    stops: Arc<dyn StopStore>,
    vehicles: Arc<dyn VehicleStore>,
    runs: Mutex<HashMap<VehicleId, Arc<Mutex<TraversalState>>>>,
    lookaheads: LookaheadCache,
    depth: usize,
}

impl FleetService {
    /// `depth` is the number of upcoming stops returned after `start` and
    /// `advance`.
    pub fn new(
        routes: Arc<RouteCache>,
        stops: Arc<dyn StopStore>,
        vehicles: Arc<dyn VehicleStore>,
        depth: usize,
        lookahead_capacity: usize,
    ) -> Self {
        Self {
            routes,
            stops,
            vehicles,
            runs: Mutex::default(),
            lookaheads: LookaheadCache::new(lookahead_capacity),
            depth,
        }
    }

    pub fn routes(&self) -> &RouteCache {
        &self.routes
    }

    pub fn start(&self, vehicle: VehicleId, line: LineId, reverse: bool) -> Result<StartedRun> {
        self.ensure_idle(vehicle)?;
        let order = self.routes.resolve(line)?;
        let state = TraversalState::new(vehicle, &order, reverse)?;

        let mut runs = self.runs.lock().map_err(poisoned("fleet runs"))?;
        // Another start may have won while the line was resolving.
        self.ensure_idle_locked(&runs, vehicle)?;
        self.vehicles
            .save_vehicle(state.to_run())
            .map_err(Error::into_unavailable)?;
        let lookahead = self.lookaheads.get_or_build(&state, self.depth)?;
        runs.insert(vehicle, Arc::new(Mutex::new(state)));
        drop(runs);

        log::info!(
            "fleet.start: vehicle={vehicle} line={line} version={} stops={} reverse={reverse}",
            order.version,
            order.stops.len()
        );
        Ok(StartedRun { order, lookahead })
    }

    /// Moves the vehicle one transition and returns its new preview.
    pub fn advance(&self, vehicle: VehicleId) -> Result<Arc<[Stop]>> {
        let run = self.run(vehicle)?;
        self.advance_run(vehicle, &run)
    }

    fn advance_run(&self, vehicle: VehicleId, run: &Mutex<TraversalState>) -> Result<Arc<[Stop]>> {
        let mut state = live(run, vehicle)?;

        let current_version = self.routes.current_version(state.line_id)?;
        if current_version != Some(state.line_version) {
            return Err(Error::route_inconsistency(format!(
                "line {} changed under vehicle {vehicle}: run has version {}, cache has {current_version:?}",
                state.line_id, state.line_version
            )));
        }

        let current = state.current()?;
        if !current.is_static() {
            self.stops
                .set_stop_active(current.id, false)
                .map_err(Error::into_unavailable)?;
        }
        let step = state.advance()?;
        if let Some(served) = &step.served {
            log::info!("fleet.advance: vehicle={vehicle} served stop={}", served.id);
        }

        self.vehicles
            .save_vehicle(state.to_run())
            .map_err(Error::into_unavailable)?;
        self.lookaheads.get_or_build(&state, self.depth)
    }

    /// Read-only preview of the current stop plus `depth` upcoming ones.
    pub fn lookahead(&self, vehicle: VehicleId, depth: usize) -> Result<Arc<[Stop]>> {
        let run = self.run(vehicle)?;
        let state = live(&run, vehicle)?;
        self.lookaheads.get_or_build(&state, depth)
    }

    /// Splices a new on-demand stop into the vehicle's working route at
    /// `position` (traversal order) and records it in the store. The line's
    /// cached order is left as is.
    pub fn insert_dynamic_stop(
        &self,
        vehicle: VehicleId,
        mut stop: Stop,
        position: usize,
    ) -> Result<Arc<[Stop]>> {
        let run = self.run(vehicle)?;
        let mut state = live(&run, vehicle)?;

        match stop.line_id {
            None => stop.line_id = Some(state.line_id),
            Some(line) if line != state.line_id => {
                return Err(Error::invalid_input(format!(
                    "stop {} belongs to line {line}, vehicle {vehicle} runs line {}",
                    stop.id, state.line_id
                )));
            }
            Some(_) => {}
        }
        state.check_insert(position, &stop)?;

        stop.active = true;
        self.stops
            .upsert_stop(stop.clone())
            .map_err(Error::into_unavailable)?;
        state.insert_dynamic_stop(position, stop)?;

        self.vehicles
            .save_vehicle(state.to_run())
            .map_err(Error::into_unavailable)?;
        self.lookaheads.get_or_build(&state, self.depth)
    }

    /// Adds a stop to its line. Structural, so the line is rebuilt on next use.
    pub fn add_stop(&self, mut stop: Stop) -> Result<()> {
        let line = stop.line_id.ok_or_else(|| {
            Error::invalid_input(format!("stop {} has no line assigned", stop.id))
        })?;
        stop.active = true;
        self.stops
            .upsert_stop(stop)
            .map_err(Error::into_unavailable)?;
        self.routes.invalidate(line)
    }

    /// Deactivates a stop and invalidates its line.
    pub fn remove_stop(&self, id: StopId) -> Result<()> {
        let stop = self
            .stops
            .stop(id)
            .map_err(Error::into_unavailable)?
            .ok_or(Error::UnknownStop(id))?;
        self.stops
            .set_stop_active(id, false)
            .map_err(Error::into_unavailable)?;
        match stop.line_id {
            Some(line) => self.routes.invalidate(line),
            None => Ok(()),
        }
    }

    /// Ends the vehicle's run.
    pub fn stop_vehicle(&self, vehicle: VehicleId) -> Result<()> {
        let run = {
            let mut runs = self.runs.lock().map_err(poisoned("fleet runs"))?;
            runs.remove(&vehicle).ok_or(Error::NoActiveRoute(vehicle))?
        };
        let mut state = run.lock().map_err(poisoned("vehicle run"))?;
        // Callers that fetched the handle before the removal see the run as gone.
        state.end();
        self.vehicles
            .save_vehicle(state.to_run())
            .map_err(Error::into_unavailable)?;
        log::info!("fleet.stop: vehicle={vehicle} line={}", state.line_id);
        Ok(())
    }

    /// Lines with active stops and no vehicle currently running them.
    pub fn available_lines(&self) -> Result<Vec<LineId>> {
        let busy: BTreeSet<LineId> = self
            .vehicles
            .active_vehicles()
            .map_err(Error::into_unavailable)?
            .into_iter()
            .map(|run| run.line_id)
            .collect();
        Ok(self
            .stops
            .lines()
            .map_err(Error::into_unavailable)?
            .into_iter()
            .filter(|line| !busy.contains(line))
            .collect())
    }

    fn run(&self, vehicle: VehicleId) -> Result<Arc<Mutex<TraversalState>>> {
        let runs = self.runs.lock().map_err(poisoned("fleet runs"))?;
        runs.get(&vehicle)
            .cloned()
            .ok_or(Error::NoActiveRoute(vehicle))
    }

    fn ensure_idle(&self, vehicle: VehicleId) -> Result<()> {
        let runs = self.runs.lock().map_err(poisoned("fleet runs"))?;
        self.ensure_idle_locked(&runs, vehicle)
    }

    fn ensure_idle_locked(
        &self,
        runs: &HashMap<VehicleId, Arc<Mutex<TraversalState>>>,
        vehicle: VehicleId,
    ) -> Result<()> {
        if runs.contains_key(&vehicle) {
            return Err(Error::VehicleBusy(vehicle));
        }
        let stored = self
            .vehicles
            .vehicle(vehicle)
            .map_err(Error::into_unavailable)?;
        if stored.is_some_and(|run| run.active) {
            return Err(Error::VehicleBusy(vehicle));
        }
        Ok(())
    }
}

/// Locks a run handle, rejecting runs stopped after the handle was taken.
fn live(run: &Mutex<TraversalState>, vehicle: VehicleId) -> Result<MutexGuard<'_, TraversalState>> {
    let state = run.lock().map_err(poisoned("vehicle run"))?;
    if state.is_ended() {
        return Err(Error::NoActiveRoute(vehicle));
    }
    Ok(state)
}
