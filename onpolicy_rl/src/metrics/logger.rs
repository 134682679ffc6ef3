//! Periodic training report.

use std::fmt;
use std::time::Instant;

use crate::algorithms::algorithm::UpdateDatum;

/// Snapshot of training progress after one update.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    /// Zero-based index of the update just performed.
    pub update: usize,
    pub num_updates: usize,
    /// Environment frames collected so far, across all environments.
    pub total_frames: usize,
    pub fps: f32,
    pub diagnostics: Vec<UpdateDatum>,
    /// Windowed mean episode reward, absent before the first episode ends.
    pub average_reward: Option<f32>,
}

impl TrainingReport {
    /// Emit the report through the `log` facade, one line per entry.
    pub fn log(&self) {
        log::info!(
            "Update {}/{}, total frames {}, FPS {:.0}",
            self.update + 1,
            self.num_updates,
            self.total_frames,
            self.fps
        );
        for datum in &self.diagnostics {
            log::info!("{}", datum);
        }
        match self.average_reward {
            Some(reward) => log::info!("Reward: {:.2}", reward),
            None => log::info!("Reward: no finished episodes"),
        }
    }
}

impl fmt::Display for TrainingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Update {}/{}, total frames {}, FPS {:.0}",
            self.update + 1,
            self.num_updates,
            self.total_frames,
            self.fps
        )?;
        for datum in &self.diagnostics {
            write!(f, ", {}", datum)?;
        }
        if let Some(reward) = self.average_reward {
            write!(f, ", Reward: {:.2}", reward)?;
        }
        Ok(())
    }
}

/// Frames-per-second clock started at training start.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    start: Instant,
}

impl FpsCounter {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn fps(&self, total_frames: usize) -> f32 {
        let elapsed = self.start.elapsed().as_secs_f32();
        if elapsed > 0.0 {
            total_frames as f32 / elapsed
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_display() {
        let report = TrainingReport {
            update: 9,
            num_updates: 100,
            total_frames: 3200,
            fps: 1234.4,
            diagnostics: vec![UpdateDatum::new("Value loss", 0.5)],
            average_reward: Some(21.0),
        };
        assert_eq!(
            report.to_string(),
            "Update 10/100, total frames 3200, FPS 1234, Value loss: 0.5, Reward: 21.00"
        );
        report.log();
    }

    #[test]
    fn test_report_without_reward() {
        let report = TrainingReport {
            update: 0,
            num_updates: 1,
            total_frames: 8,
            fps: 0.0,
            diagnostics: Vec::new(),
            average_reward: None,
        };
        assert_eq!(report.to_string(), "Update 1/1, total frames 8, FPS 0");
    }

    #[test]
    fn test_fps_non_negative() {
        let clock = FpsCounter::start();
        assert!(clock.fps(100) >= 0.0);
    }
}
