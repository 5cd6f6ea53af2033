/// Counts frames and reports the average frame time once per second.
#[derive(Debug, Clone)]
pub struct FrameCounter {
    frames: u32,
    last_report: f64,
}

impl FrameCounter {
    /// Start counting at `now` seconds.
    pub fn new(now: f64) -> Self {
        Self {
            frames: 0,
            last_report: now,
        }
    }

    /// Record one frame finished at `now` seconds. Returns the average
    /// milliseconds per frame when at least a second has passed since the
    /// last report.
    pub fn frame(&mut self, now: f64) -> Option<f64> {
        self.frames += 1;
        if now - self.last_report < 1.0 {
            return None;
        }
        let ms = 1000.0 / f64::from(self.frames);
        self.frames = 0;
        self.last_report += 1.0;
        // after a long stall, resync instead of reporting every missed second
        if now - self.last_report >= 1.0 {
            self.last_report = now;
        }
        Some(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_once_per_second() {
        let mut counter = FrameCounter::new(0.0);
        let mut reports = Vec::new();
        for i in 1..=120 {
            if let Some(ms) = counter.frame(i as f64 / 60.0) {
                reports.push(ms);
            }
        }
        assert_eq!(reports.len(), 2);
        assert!((reports[0] - 1000.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn resyncs_after_stall() {
        let mut counter = FrameCounter::new(0.0);
        assert_eq!(counter.frame(5.0), Some(1000.0));
        assert_eq!(counter.frame(5.5), None);
        assert!(counter.frame(6.0).is_some());
    }
}
