//! Per-stage accelerator timings.

use std::ops::AddAssign;
use std::time::Duration;

/// Wall-clock time spent in each accelerator stage.
///
/// Stages that never ran (for example after an early failure) stay zero, so a
/// partial record still shows where a dispatch stopped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageTimings {
    pub prepare: Duration,
    pub upload: Duration,
    pub dispatch: Duration,
    pub download: Duration,
    pub total: Duration,
}

impl StageTimings {
    pub fn as_millis_f64(&self) -> [f64; 5] {
        [
            self.prepare.as_secs_f64() * 1000.0,
            self.upload.as_secs_f64() * 1000.0,
            self.dispatch.as_secs_f64() * 1000.0,
            self.download.as_secs_f64() * 1000.0,
            self.total.as_secs_f64() * 1000.0,
        ]
    }
}

impl AddAssign for StageTimings {
    fn add_assign(&mut self, rhs: Self) {
        self.prepare += rhs.prepare;
        self.upload += rhs.upload;
        self.dispatch += rhs.dispatch;
        self.download += rhs.download;
        self.total += rhs.total;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::StageTimings;

    #[test]
    fn accumulates_stage_by_stage() {
        let mut total = StageTimings::default();
        let step = StageTimings {
            prepare: Duration::from_millis(1),
            upload: Duration::from_millis(2),
            dispatch: Duration::from_millis(3),
            download: Duration::from_millis(4),
            total: Duration::from_millis(10),
        };
        total += step;
        total += step;
        assert_eq!(total.dispatch, Duration::from_millis(6));
        assert_eq!(total.as_millis_f64(), [2.0, 4.0, 6.0, 8.0, 20.0]);
    }
}
