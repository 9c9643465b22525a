//! Centered rolling window over per-frame scores.

use std::collections::VecDeque;

use crate::frame_time::FrameTime;

/// A scored frame whose neighbourhood is known.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Evaluation {
    pub(crate) position: FrameTime,
    pub(crate) score: f64,
    /// Mean score of the neighbours, excluding the frame itself.
    pub(crate) neighbour_mean: f64,
}

/// Scores buffered until `radius` frames on each side have been seen.
///
/// The first `radius` frames never have a full left side and are not
/// evaluated. Only [`drain`](Self::drain) evaluates against a truncated
/// right side.
#[derive(Debug)]
pub(crate) struct RollingWindow {
    radius: usize,
    entries: VecDeque<(FrameTime, f64)>,
    /// Index in `entries` of the next frame to evaluate. Starts at `radius`
    /// and stays there once the window is full.
    next: usize,
}

impl RollingWindow {
    pub(crate) fn new(radius: usize) -> Self {
        Self {
            radius,
            entries: VecDeque::with_capacity(2 * radius + 1),
            next: radius,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.entries.clear();
        self.next = self.radius;
    }

    /// Add a score; returns the frame that just gained its full right side.
    pub(crate) fn push(&mut self, position: FrameTime, score: f64) -> Option<Evaluation> {
        self.entries.push_back((position, score));
        if self.entries.len() <= self.next + self.radius {
            return None;
        }
        let evaluation = self.evaluate(self.next);
        self.advance();
        evaluation
    }

    /// Evaluate every frame still waiting for lookahead.
    pub(crate) fn drain(&mut self) -> Vec<Evaluation> {
        let mut evaluations = Vec::new();
        while self.next < self.entries.len() {
            evaluations.extend(self.evaluate(self.next));
            self.advance();
        }
        self.reset();
        evaluations
    }

    fn advance(&mut self) {
        self.next += 1;
        while self.next > self.radius {
            self.entries.pop_front();
            self.next -= 1;
        }
    }

    fn evaluate(&self, index: usize) -> Option<Evaluation> {
        let (position, score) = *self.entries.get(index)?;
        let low = index.saturating_sub(self.radius);
        let high = (index + self.radius).min(self.entries.len() - 1);
        let neighbours = (low..=high)
            .filter(|&other| other != index)
            .filter_map(|other| self.entries.get(other))
            .map(|&(_, score)| score);

        let (sum, count) = neighbours.fold((0.0, 0usize), |(sum, count), score| {
            (sum + score, count + 1)
        });
        if count == 0 {
            return None;
        }
        Some(Evaluation {
            position,
            score,
            neighbour_mean: sum / count as f64,
        })
    }
}
