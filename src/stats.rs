// This file is part of HeroineGraph.
//
// HeroineGraph is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// HeroineGraph is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with HeroineGraph.  If not, see <http://www.gnu.org/licenses/>.
use ringbuffer::{ConstGenericRingBuffer, RingBuffer, RingBufferExt, RingBufferWrite};
use std::time::Instant;

const WINDOW: usize = 256;

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct FrameStatsSnapshot {
    pub fps: f32,
    pub average_ms: f32,
    pub one_percent_low_fps: f32,
}

/// Rolling frame-duration window: instantaneous FPS, average, and the FPS
/// of the worst 1% of recent frames.
#[derive(Debug)]
pub struct FrameStats {
    durations_ms: ConstGenericRingBuffer<f32, WINDOW>,
    last_frame: Option<Instant>,
}

impl Default for FrameStats {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameStats {
    pub fn new() -> Self {
        Self {
            durations_ms: ConstGenericRingBuffer::new(),
            last_frame: None,
        }
    }

    pub fn record_frame(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_frame {
            let ms = now.duration_since(last).as_secs_f32() * 1000.0;
            self.durations_ms.push(ms);
        }
        self.last_frame = Some(now);
    }

    #[cfg(test)]
    fn record_duration_ms(&mut self, ms: f32) {
        self.durations_ms.push(ms);
    }

    pub fn snapshot(&self) -> FrameStatsSnapshot {
        if self.durations_ms.is_empty() {
            return FrameStatsSnapshot::default();
        }
        let mut sorted: Vec<f32> = self.durations_ms.iter().copied().collect();
        let current = *sorted.last().expect("non-empty");
        let average = sorted.iter().sum::<f32>() / sorted.len() as f32;
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite durations"));
        let worst_count = (sorted.len() / 100).max(1);
        let worst_avg =
            sorted[sorted.len() - worst_count..].iter().sum::<f32>() / worst_count as f32;
        FrameStatsSnapshot {
            fps: if current > 0.0 { 1000.0 / current } else { 0.0 },
            average_ms: average,
            one_percent_low_fps: if worst_avg > 0.0 { 1000.0 / worst_avg } else { 0.0 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn snapshot_reflects_the_window() {
        let mut stats = FrameStats::new();
        assert_eq!(stats.snapshot(), FrameStatsSnapshot::default());
        for _ in 0..99 {
            stats.record_duration_ms(10.0);
        }
        stats.record_duration_ms(50.0);
        let snapshot = stats.snapshot();
        assert_abs_diff_eq!(snapshot.fps, 20.0, epsilon = 1e-3);
        assert_abs_diff_eq!(snapshot.average_ms, 10.4, epsilon = 1e-3);
        assert_abs_diff_eq!(snapshot.one_percent_low_fps, 20.0, epsilon = 1e-3);
    }

    #[test]
    fn the_window_is_bounded() {
        let mut stats = FrameStats::new();
        for i in 0..WINDOW * 2 {
            stats.record_duration_ms(i as f32 + 1.0);
        }
        // Only the newest WINDOW entries are retained.
        let snapshot = stats.snapshot();
        assert!(snapshot.average_ms > WINDOW as f32 / 2.0);
    }
}
