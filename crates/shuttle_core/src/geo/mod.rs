mod coordinate;

pub use coordinate::Coordinate;
