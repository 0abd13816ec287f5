use rayon::prelude::*;

use crate::{Error, Result, geo::Coordinate, matrix::DurationMatrix};

use super::DurationMatrixProvider;

const KMH_TO_MS: f64 = 1_000.0 / 3_600.0;

/// Offline provider: great-circle distance at a constant average speed.
/// Symmetric, so it cannot model one-way streets.
#[derive(Clone, Copy, Debug)]
pub struct HaversineProvider {
    speed_ms: f64,
}

impl HaversineProvider {
    pub fn new(speed_kmh: f64) -> Result<Self> {
        if !speed_kmh.is_finite() || speed_kmh <= 0.0 {
            return Err(Error::invalid_input(format!(
                "average speed must be > 0 km/h, got {speed_kmh}"
            )));
        }
        Ok(Self {
            speed_ms: speed_kmh * KMH_TO_MS,
        })
    }
}

impl DurationMatrixProvider for HaversineProvider {
    fn durations(&self, points: &[Coordinate], profile: &str) -> Result<DurationMatrix> {
        if let Some(bad) = points.iter().find(|p| !p.is_valid()) {
            return Err(Error::invalid_input(format!("invalid lat/lng {bad}")));
        }
        log::debug!(
            "provider.haversine: n={} profile={profile} speed_ms={:.2}",
            points.len(),
            self.speed_ms
        );

        let rows: Vec<Vec<f64>> = points
            .par_iter()
            .map(|from| {
                points
                    .iter()
                    .map(|to| from.dist(to) / self.speed_ms)
                    .collect()
            })
            .collect();
        DurationMatrix::from_rows(rows)
    }

    fn name(&self) -> &'static str {
        "haversine"
    }
}

#[cfg(test)]
mod tests {
    use super::HaversineProvider;
    use crate::{geo::Coordinate, provider::DurationMatrixProvider};

    #[test]
    fn durations_scale_with_distance_and_speed() {
        let points = [
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 0.01),
            Coordinate::new(0.0, 0.02),
        ];
        let m = HaversineProvider::new(36.0)
            .expect("provider")
            .durations(&points, "car")
            .expect("durations");

        assert_eq!(m.size(), 3);
        assert_eq!(m.get(1, 1), 0.0);
        // ~1112m at 10 m/s
        assert!((m.get(0, 1) - 111.2).abs() < 0.5, "got {}", m.get(0, 1));
        assert!((m.get(0, 2) - 2.0 * m.get(0, 1)).abs() < 0.01);
        assert!((m.get(2, 0) - m.get(0, 2)).abs() < 1e-9);
    }

    #[test]
    fn rejects_non_positive_speed_and_bad_points() {
        assert!(HaversineProvider::new(0.0).is_err());
        assert!(HaversineProvider::new(f64::NAN).is_err());

        let err = HaversineProvider::new(30.0)
            .expect("provider")
            .durations(&[Coordinate::new(95.0, 0.0)], "car")
            .expect_err("invalid latitude should fail");
        assert!(err.to_string().contains("invalid lat/lng"));
    }
}
