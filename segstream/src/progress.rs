//! Progress sampling

use std::time::Duration;

/// Samples the presentation position and forwards only changes
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    interval: Duration,
    last: Option<f64>,
}

impl ProgressReporter {
    /// Reporter ticking every `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Tick period
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Feed one sample; returns the position when it should be reported.
    ///
    /// Unknown and zero positions are skipped, and so is a position equal to
    /// the last one reported.
    pub fn sample(&mut self, position: Option<f64>) -> Option<f64> {
        let utc = position.filter(|p| p.is_finite() && *p != 0.0)?;
        if self.last == Some(utc) {
            return None;
        }
        self.last = Some(utc);
        Some(utc)
    }

    /// Forget the last reported position
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_are_suppressed() {
        let mut progress = ProgressReporter::new(Duration::from_millis(100));
        assert_eq!(progress.sample(None), None);
        assert_eq!(progress.sample(Some(0.0)), None);
        assert_eq!(progress.sample(Some(10.0)), Some(10.0));
        assert_eq!(progress.sample(Some(10.0)), None);
        assert_eq!(progress.sample(Some(10.5)), Some(10.5));

        progress.reset();
        assert_eq!(progress.sample(Some(10.5)), Some(10.5));
    }
}
