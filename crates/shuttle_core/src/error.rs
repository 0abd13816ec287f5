use thiserror::Error as ThisError;

use crate::model::{LineId, StopId, VehicleId};

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not enough stops to route line {line}: found {found}, need at least 2")]
    NotEnoughStops { line: LineId, found: usize },
    #[error("line {line} has {found} stops, exact solver ceiling is {max}")]
    TooManyStops { line: LineId, found: usize, max: usize },
    #[error("resolved order for line {0} has no static stop")]
    MissingStaticAnchor(LineId),
    #[error("vehicle {0} has no active route")]
    NoActiveRoute(VehicleId),
    #[error("vehicle {0} already has an active run")]
    VehicleBusy(VehicleId),
    #[error("unknown stop {0}")]
    UnknownStop(StopId),
    #[error("computation unavailable: {0}")]
    Unavailable(String),
    #[error("route inconsistency: {0}")]
    RouteInconsistency(String),
    #[error("internal consistency failure: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn route_inconsistency(message: impl Into<String>) -> Self {
        Self::RouteInconsistency(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant(message.into())
    }

    /// External dependency failures (provider, store). Everything else is a
    /// data or consistency error the caller has to correct.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    pub fn is_consistency_failure(&self) -> bool {
        matches!(self, Self::RouteInconsistency(_) | Self::Invariant(_))
    }

    /// Reclassifies a store or provider failure as an external dependency error.
    /// Data errors (unknown stop, bad coordinates) pass through untouched.
    pub(crate) fn into_unavailable(self) -> Self {
        match self {
            Self::Io(e) => Self::Unavailable(e.to_string()),
            Self::Invariant(msg) => Self::Unavailable(msg),
            other => other,
        }
    }
}

/// Maps a poisoned lock into an internal-consistency failure.
pub(crate) fn poisoned<T>(what: &str) -> impl FnOnce(T) -> Error + '_ {
    move |_| Error::invariant(format!("{what} lock poisoned"))
}
