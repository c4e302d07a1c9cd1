//! Snapshot interpolation as clients are expected to render it
//!
//! Rendering runs a fixed delay behind the newest data so there is nearly
//! always a sample on each side of the render time. Only the ball is
//! interpolated; paddles use the latest sample.

use std::collections::VecDeque;
use std::time::Duration;

use crate::ws::protocol::{Point, Snapshot};

/// Snapshots kept for interpolation
pub const BUFFER_LEN: usize = 10;

/// How far behind "now" frames are rendered
pub const RENDER_DELAY: Duration = Duration::from_millis(100);

/// What a client draws for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderFrame {
    pub ball: Point,
    pub you: Point,
    pub opponent: Point,
    pub score: [u8; 2],
}

#[derive(Debug, Default)]
pub struct SnapshotBuffer {
    /// (arrival time in ms, snapshot), oldest first
    samples: VecDeque<(u64, Snapshot)>,
}

impl SnapshotBuffer {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(BUFFER_LEN),
        }
    }

    /// Record a snapshot at its arrival time. A snapshot from another match
    /// starts the buffer over.
    pub fn push(&mut self, arrived_ms: u64, snapshot: Snapshot) {
        if self
            .samples
            .back()
            .is_some_and(|(_, last)| last.match_id != snapshot.match_id)
        {
            self.samples.clear();
        }
        if self.samples.len() == BUFFER_LEN {
            self.samples.pop_front();
        }
        self.samples.push_back((arrived_ms, snapshot));
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Frame to draw at `now_ms`, or `None` before the first snapshot
    pub fn render(&self, now_ms: u64) -> Option<RenderFrame> {
        let (_, latest) = self.samples.back()?;
        let target = now_ms.saturating_sub(RENDER_DELAY.as_millis() as u64);

        let ball = match self.bracket(target) {
            Some((from, to)) => lerp_sample(from, to, target),
            None => latest.ball,
        };

        Some(RenderFrame {
            ball,
            you: latest.you,
            opponent: latest.opponent,
            score: latest.score,
        })
    }

    /// The two samples around `target`; the two newest when nothing older
    /// than `target` brackets it
    fn bracket(&self, target: u64) -> Option<(&(u64, Snapshot), &(u64, Snapshot))> {
        let after = self.samples.iter().position(|(t, _)| *t > target);
        match after {
            Some(idx) if idx > 0 => Some((&self.samples[idx - 1], &self.samples[idx])),
            _ => {
                let n = self.samples.len();
                (n >= 2).then(|| (&self.samples[n - 2], &self.samples[n - 1]))
            }
        }
    }
}

fn lerp_sample(from: &(u64, Snapshot), to: &(u64, Snapshot), target: u64) -> Point {
    let (t0, a) = from;
    let (t1, b) = to;
    let alpha = if t1 > t0 {
        (target.saturating_sub(*t0) as f32 / (t1 - t0) as f32).clamp(0.0, 1.0)
    } else {
        1.0
    };
    Point {
        x: a.ball.x + (b.ball.x - a.ball.x) * alpha,
        y: a.ball.y + (b.ball.y - a.ball.y) * alpha,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::protocol::Side;

    fn snapshot(match_id: u64, tick: u64, ball_x: f32) -> Snapshot {
        Snapshot {
            match_id,
            tick,
            side: Side::Left,
            ball: Point { x: ball_x, y: 0.0 },
            you: Point { x: -0.95, y: tick as f32 / 100.0 },
            opponent: Point { x: 0.95, y: 0.0 },
            score: [0, 0],
        }
    }

    #[test]
    fn ball_is_interpolated_behind_now() {
        let mut buffer = SnapshotBuffer::new();
        buffer.push(1_000, snapshot(1, 1, 0.0));
        buffer.push(1_020, snapshot(1, 2, 0.2));
        buffer.push(1_040, snapshot(1, 3, 0.4));

        // Render time 1_010 sits halfway between the first two samples
        let frame = buffer.render(1_110).unwrap();
        assert!((frame.ball.x - 0.1).abs() < 1e-6);
        // Paddles come from the newest sample
        assert!((frame.you.y - 0.03).abs() < 1e-6);
    }

    #[test]
    fn without_an_older_bracket_the_newest_pair_is_used() {
        let mut buffer = SnapshotBuffer::new();
        buffer.push(1_000, snapshot(1, 1, 0.0));
        buffer.push(1_020, snapshot(1, 2, 0.2));

        // Render time precedes every sample
        let early = buffer.render(1_050).unwrap();
        assert_eq!(early.ball.x, 0.0);

        // Render time past every sample clamps to the newest
        let late = buffer.render(2_000).unwrap();
        assert!((late.ball.x - 0.2).abs() < 1e-6);
    }

    #[test]
    fn buffer_keeps_the_last_ten_of_one_match() {
        let mut buffer = SnapshotBuffer::new();
        assert!(buffer.render(0).is_none());

        for tick in 0..15 {
            buffer.push(tick * 16, snapshot(1, tick, 0.0));
        }
        assert_eq!(buffer.len(), BUFFER_LEN);

        buffer.push(500, snapshot(2, 0, 0.5));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.render(500).unwrap().ball.x, 0.5);
    }
}
