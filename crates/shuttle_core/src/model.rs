use serde::{Deserialize, Serialize};
use shuttle_derive::CliValue;

use crate::geo::Coordinate;

pub type StopId = u64;
pub type LineId = u64;
pub type VehicleId = u64;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize, CliValue)]
#[cli_value(option = "kind")]
#[serde(rename_all = "snake_case")]
pub enum StopKind {
    Static,
    #[cli(alias = "passenger")]
    PassengerPickup,
    #[cli(alias = "pickup")]
    ParcelPickup,
    #[cli(alias = "dropoff")]
    ParcelDropoff,
}

impl StopKind {
    /// Static stops anchor the line; every other kind is served once and removed.
    pub fn is_static(self) -> bool {
        matches!(self, Self::Static)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: StopId,
    pub position: Coordinate,
    pub kind: StopKind,
    pub line_id: Option<LineId>,
    pub active: bool,
}

impl Stop {
    pub fn new(id: StopId, position: Coordinate, kind: StopKind) -> Self {
        Self {
            id,
            position,
            kind,
            line_id: None,
            active: true,
        }
    }

    pub fn on_line(mut self, line_id: LineId) -> Self {
        self.line_id = Some(line_id);
        self
    }

    pub fn is_static(&self) -> bool {
        self.kind.is_static()
    }
}

/// Persisted record of a vehicle's run on a line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VehicleRun {
    pub id: VehicleId,
    pub line_id: LineId,
    pub index: usize,
    /// `true` while the vehicle follows the order as solved.
    pub forward: bool,
    pub active: bool,
    pub position: Option<Coordinate>,
}

pub(crate) fn has_static_anchor(stops: &[Stop]) -> bool {
    stops.iter().any(Stop::is_static)
}
