//! Travel-time sources for a line's stops.

mod graphhopper;
mod haversine;

pub use graphhopper::{DEFAULT_GRAPHHOPPER_URL, GraphHopperProvider};
pub use haversine::HaversineProvider;

use shuttle_derive::CliValue;

use crate::{Result, geo::Coordinate, matrix::DurationMatrix};

/// Computes pairwise travel durations in seconds for `points`, in order.
///
/// Failures are reported as [`crate::Error::Unavailable`] and never retried here.
pub trait DurationMatrixProvider: Send + Sync {
    fn durations(&self, points: &[Coordinate], profile: &str) -> Result<DurationMatrix>;

    fn name(&self) -> &'static str;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, CliValue)]
#[cli_value(option = "provider")]
pub enum ProviderKind {
    #[cli(alias = "offline")]
    Haversine,
    #[cli(name = "graphhopper", alias = "gh")]
    GraphHopper,
}
