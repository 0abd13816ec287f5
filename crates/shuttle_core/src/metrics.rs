use shuttle_derive::New;

/// Summary of an open path, in provider seconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, New)]
pub struct RouteMetrics {
    pub legs: usize,
    pub total: f64,
    pub longest: f64,
    pub average: f64,
}

impl RouteMetrics {
    pub fn from_legs(legs: &[f64]) -> Self {
        if legs.is_empty() {
            log::info!("metrics: no legs so there's nothing to report");
            return Self::default();
        }

        let total: f64 = legs.iter().sum();
        let longest = legs.iter().copied().fold(0.0_f64, f64::max);
        let average = total / legs.len() as f64;

        log::info!(
            "metrics: legs={} total_s={total:.0} longest_s={longest:.0} avg_s={average:.0}",
            legs.len()
        );
        Self::new(legs.len(), total, longest, average)
    }
}

#[cfg(test)]
mod tests {
    use super::RouteMetrics;

    #[test]
    fn from_legs_sums_and_averages() {
        let metrics = RouteMetrics::from_legs(&[60.0, 180.0, 120.0]);
        assert_eq!(metrics.legs, 3);
        assert_eq!(metrics.total, 360.0);
        assert_eq!(metrics.longest, 180.0);
        assert_eq!(metrics.average, 120.0);
    }

    #[test]
    fn from_legs_empty_is_default() {
        assert_eq!(RouteMetrics::from_legs(&[]), RouteMetrics::default());
    }
}
