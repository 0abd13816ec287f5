//! Shuttle line ordering and live vehicle traversal.
//!
//! A line's stops are ordered as an open path (exact, through a symmetric
//! closed-tour reduction), cached per line, and walked back and forth by each
//! vehicle while on-demand stops are served, removed and inserted.

mod algo;
mod error;
mod fleet;
mod geo;
mod io;
mod lookahead;
pub mod logging;
mod matrix;
mod metrics;
mod model;
mod provider;
mod route_cache;
mod store;
mod traversal;

pub(crate) use io::options;

pub use algo::{
    ClosedTour, HeldKarp, MAX_HELD_KARP_NODES, OpenPathConfig, OpenPathTour, TourSolver,
    solve_open_path,
};
pub use error::{Error, Result};
pub use fleet::{FleetService, StartedRun};
pub use geo::Coordinate;
pub use io::input::{parse_stops, read_stops};
pub use io::options::{LogFormat, LogLevel, MAX_EXACT_STOPS, ServiceOptions};
pub use lookahead::{LookaheadCache, lookahead};
pub use matrix::{CostMatrix, DurationMatrix, HIGH_PENALTY_FACTOR, SquareMatrix, symmetrize};
pub use metrics::RouteMetrics;
pub use model::{LineId, Stop, StopId, StopKind, VehicleId, VehicleRun};
pub use provider::{
    DEFAULT_GRAPHHOPPER_URL, DurationMatrixProvider, GraphHopperProvider, HaversineProvider,
    ProviderKind,
};
pub use route_cache::{ResolvedOrder, RouteCache};
pub use store::{MemoryStore, StopStore, VehicleStore};
pub use traversal::{Step, TraversalState};
