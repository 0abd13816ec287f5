//! Per-vehicle live progress over a line's resolved order.
//!
//! A vehicle's state is the triple (working route, index, direction). Serving
//! an on-demand stop removes it from the working route without moving the
//! index; reaching the end of the route reverses it so the vehicle shuttles
//! back instead of looping.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::{
    Error, Result,
    model::{LineId, Stop, VehicleId, VehicleRun, has_static_anchor},
    route_cache::ResolvedOrder,
};

static NEXT_REVISION: AtomicU64 = AtomicU64::new(1);

fn next_revision() -> u64 {
    NEXT_REVISION.fetch_add(1, Ordering::Relaxed)
}

/// Outcome of one transition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Step {
    /// On-demand stop removed from the route by this transition.
    pub served: Option<Stop>,
    /// The end of the line was reached and the route reversed.
    pub reversed: bool,
}

/// Applies one advance to `route` in place.
///
/// Shared by the live state machine and the lookahead preview so both follow
/// the exact same removal and reversal rules.
pub(crate) fn step(route: &mut Vec<Stop>, index: &mut usize, forward: &mut bool) -> Result<Step> {
    check_route(route, *index)?;

    let mut out = Step::default();
    if route[*index].is_static() {
        *index += 1;
    } else {
        out.served = Some(route.remove(*index));
    }

    if *index == route.len() {
        route.reverse();
        *forward = !*forward;
        // Index 0 of the reversed route is the terminus just reached.
        *index = 1 % route.len();
        out.reversed = true;
    }
    Ok(out)
}

fn check_route(route: &[Stop], index: usize) -> Result<()> {
    if route.is_empty() {
        return Err(Error::invariant("working route is empty"));
    }
    if !has_static_anchor(route) {
        return Err(Error::invariant("working route lost its static anchor"));
    }
    if index >= route.len() {
        return Err(Error::invariant(format!(
            "index {index} out of bounds for route of {} stops",
            route.len()
        )));
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq)]
pub struct TraversalState {
    pub vehicle_id: VehicleId,
    pub line_id: LineId,
    /// Version of the resolved order the working route was copied from.
    pub line_version: u64,
    route: Vec<Stop>,
    index: usize,
    forward: bool,
    /// Process-wide unique tag of the current working route contents.
    revision: u64,
    /// Set once the run is stopped; a stopped state never moves again.
    ended: bool,
}

impl TraversalState {
    /// Starts at index 0 of a private copy of `order`, pre-reversed when
    /// `reverse` is set.
    pub fn new(vehicle_id: VehicleId, order: &ResolvedOrder, reverse: bool) -> Result<Self> {
        let mut route = order.stops.clone();
        if !has_static_anchor(&route) {
            return Err(Error::MissingStaticAnchor(order.line_id));
        }
        if reverse {
            route.reverse();
        }
        Ok(Self {
            vehicle_id,
            line_id: order.line_id,
            line_version: order.version,
            route,
            index: 0,
            forward: !reverse,
            revision: next_revision(),
            ended: false,
        })
    }

    pub fn current(&self) -> Result<&Stop> {
        check_route(&self.route, self.index)?;
        Ok(&self.route[self.index])
    }

    pub fn advance(&mut self) -> Result<Step> {
        let out = step(&mut self.route, &mut self.index, &mut self.forward)?;
        if out.served.is_some() || out.reversed {
            self.revision = next_revision();
        }
        log::debug!(
            "traversal.advance: vehicle={} line={} index={} forward={} served={:?} reversed={}",
            self.vehicle_id,
            self.line_id,
            self.index,
            self.forward,
            out.served.as_ref().map(|s| s.id),
            out.reversed
        );
        Ok(out)
    }

    /// Checks that `stop` may be spliced in at `position` of the working route.
    pub fn check_insert(&self, position: usize, stop: &Stop) -> Result<()> {
        if stop.is_static() {
            return Err(Error::invalid_input(format!(
                "stop {} is static; static stops change the line, not a vehicle's run",
                stop.id
            )));
        }
        if position > self.route.len() {
            return Err(Error::invalid_input(format!(
                "insert position {position} beyond route of {} stops",
                self.route.len()
            )));
        }
        if self.route.iter().any(|s| s.id == stop.id) {
            return Err(Error::invalid_input(format!(
                "stop {} is already on the route",
                stop.id
            )));
        }
        Ok(())
    }

    /// Splices an on-demand stop into the working route. `position` is in
    /// traversal order; inserting at or before the current index shifts the
    /// index so the vehicle stays on the same stop.
    pub fn insert_dynamic_stop(&mut self, position: usize, stop: Stop) -> Result<()> {
        self.check_insert(position, &stop)?;
        log::debug!(
            "traversal.insert: vehicle={} stop={} position={position} index={}",
            self.vehicle_id,
            stop.id,
            self.index
        );
        self.route.insert(position, stop);
        if position <= self.index {
            self.index += 1;
        }
        self.revision = next_revision();
        Ok(())
    }

    pub fn route(&self) -> &[Stop] {
        &self.route
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn forward(&self) -> bool {
        self.forward
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn end(&mut self) {
        self.ended = true;
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Persisted view of this state; position mirrors the current stop.
    pub fn to_run(&self) -> VehicleRun {
        VehicleRun {
            id: self.vehicle_id,
            line_id: self.line_id,
            index: self.index,
            forward: self.forward,
            active: !self.ended,
            position: self.route.get(self.index).map(|s| s.position),
        }
    }
}
