//! Per-line memoized visiting order.
//!
//! Each line owns a slot with its own mutex. The slot lock is held for the
//! whole build, so concurrent `resolve` calls for one line share a single
//! provider call and solve, while other lines proceed in parallel. The map of
//! slots is only locked long enough to look a slot up.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use rayon::prelude::*;

use crate::{
    Error, Result,
    algo::{OpenPathConfig, TourSolver, solve_open_path},
    error::poisoned,
    metrics::RouteMetrics,
    model::{LineId, Stop, has_static_anchor},
    provider::DurationMatrixProvider,
    store::StopStore,
};

/// Version value meaning "nothing cached".
const NO_VERSION: u64 = 0;

/// The solved visiting order of a line.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedOrder {
    pub line_id: LineId,
    /// Unique per build; changes whenever the line is rebuilt.
    pub version: u64,
    pub stops: Vec<Stop>,
    /// Closed-tour cost on the symmetric matrix.
    pub cost: u64,
    /// Provider duration in seconds of each hop, `stops.len() - 1` entries.
    pub legs: Vec<f64>,
}

impl ResolvedOrder {
    pub fn metrics(&self) -> RouteMetrics {
        RouteMetrics::from_legs(&self.legs)
    }
}

#[derive(Debug, Default)]
struct LineSlot {
    order: Mutex<Option<Arc<ResolvedOrder>>>,
    version: AtomicU64,
}

pub struct RouteCache {
    stops: Arc<dyn StopStore>,
    provider: Arc<dyn DurationMatrixProvider>,
    solver: Arc<dyn TourSolver>,
    config: OpenPathConfig,
    profile: String,
    slots: Mutex<HashMap<LineId, Arc<LineSlot>>>,
    next_version: AtomicU64,
}

impl RouteCache {
    pub fn new(
        stops: Arc<dyn StopStore>,
        provider: Arc<dyn DurationMatrixProvider>,
        solver: Arc<dyn TourSolver>,
        config: OpenPathConfig,
        profile: impl Into<String>,
    ) -> Self {
        Self {
            stops,
            provider,
            solver,
            config,
            profile: profile.into(),
            slots: Mutex::default(),
            next_version: AtomicU64::new(NO_VERSION + 1),
        }
    }

    /// Cached order for `line`, building it first when absent.
    pub fn resolve(&self, line: LineId) -> Result<Arc<ResolvedOrder>> {
        let slot = self.slot(line)?;
        let mut cached = slot.order.lock().map_err(poisoned("route slot"))?;
        if let Some(order) = cached.as_ref() {
            log::trace!("route_cache: hit line={line} version={}", order.version);
            return Ok(Arc::clone(order));
        }

        let order = Arc::new(self.build(line)?);
        slot.version.store(order.version, Ordering::Release);
        *cached = Some(Arc::clone(&order));
        Ok(order)
    }

    /// Resolves several lines in parallel, one result per line in input order.
    pub fn resolve_all(&self, lines: &[LineId]) -> Vec<Result<Arc<ResolvedOrder>>> {
        lines.par_iter().map(|&line| self.resolve(line)).collect()
    }

    /// Drops the cached order. Waits for an in-flight build of the same line.
    pub fn invalidate(&self, line: LineId) -> Result<()> {
        let slot = self.slot(line)?;
        let mut cached = slot.order.lock().map_err(poisoned("route slot"))?;
        if let Some(order) = cached.take() {
            log::debug!(
                "route_cache: invalidated line={line} version={}",
                order.version
            );
        }
        slot.version.store(NO_VERSION, Ordering::Release);
        Ok(())
    }

    /// Version of the cached order, `None` when nothing is cached. Never blocks
    /// on a build.
    pub fn current_version(&self, line: LineId) -> Result<Option<u64>> {
        let slots = self.slots.lock().map_err(poisoned("route cache"))?;
        Ok(slots
            .get(&line)
            .map(|slot| slot.version.load(Ordering::Acquire))
            .filter(|&version| version != NO_VERSION))
    }

    pub fn max_stops(&self) -> Option<usize> {
        self.solver.max_nodes().map(|nodes| nodes / 2)
    }

    fn slot(&self, line: LineId) -> Result<Arc<LineSlot>> {
        let mut slots = self.slots.lock().map_err(poisoned("route cache"))?;
        Ok(Arc::clone(slots.entry(line).or_default()))
    }

    #[shuttle_derive::timer("route_cache.build")]
    fn build(&self, line: LineId) -> Result<ResolvedOrder> {
        let stops = self.stops.active_stops(line).map_err(Error::into_unavailable)?;
        log::debug!("route_cache.build: start line={line} n={}", stops.len());

        if stops.len() < 2 {
            return Err(Error::NotEnoughStops {
                line,
                found: stops.len(),
            });
        }
        if let Some(max) = self.max_stops()
            && stops.len() > max
        {
            return Err(Error::TooManyStops {
                line,
                found: stops.len(),
                max,
            });
        }

        let points: Vec<_> = stops.iter().map(|s| s.position).collect();
        let durations = self
            .provider
            .durations(&points, &self.profile)
            .map_err(Error::into_unavailable)?;
        if durations.size() != stops.len() {
            return Err(Error::unavailable(format!(
                "{} returned a {}x{} matrix for {} stops",
                self.provider.name(),
                durations.size(),
                durations.size(),
                stops.len()
            )));
        }
        durations.validate().map_err(|e| {
            Error::unavailable(format!(
                "{} returned an unusable matrix: {e}",
                self.provider.name()
            ))
        })?;

        let tour = solve_open_path(&durations, self.solver.as_ref(), self.config)?;
        let ordered: Vec<Stop> = tour.order.iter().map(|&idx| stops[idx].clone()).collect();
        let legs: Vec<f64> = tour
            .order
            .windows(2)
            .map(|hop| durations.get(hop[0], hop[1]))
            .collect();
        if !has_static_anchor(&ordered) {
            return Err(Error::MissingStaticAnchor(line));
        }

        let version = self.next_version.fetch_add(1, Ordering::Relaxed);
        log::info!(
            "route_cache.build: done line={line} n={} cost={} version={version}",
            ordered.len(),
            tour.cost
        );
        Ok(ResolvedOrder {
            line_id: line,
            version,
            stops: ordered,
            cost: tour.cost,
            legs,
        })
    }
}
