use itertools::Itertools;
use std::cmp::Reverse;

use super::Solve;
use crate::util::{mean, std_dev, trimmed_mean};

pub const LIST_WINDOW: usize = 10;
pub const TREND_WINDOW: usize = 20;

/// Newest first by server time.
///
/// Records still waiting for a server timestamp count as time zero, so they
/// sort last and jump to the top once the store confirms them. Equal keys
/// keep the order the store delivered them in.
pub fn newest_first(solves: &[Solve]) -> Vec<Solve> {
    solves
        .iter()
        .cloned()
        .sorted_by_key(|s| Reverse(s.order_key()))
        .collect()
}

pub fn recent(solves: &[Solve], window: usize) -> Vec<Solve> {
    let mut ordered = newest_first(solves);
    ordered.truncate(window);
    ordered
}

/// Numbers shown under the recent list
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub best_ms: u64,
    pub mean_ms: f64,
    pub std_dev_ms: f64,
    /// Trimmed mean of the latest five, when there are five
    pub ao5_ms: Option<f64>,
}

/// Display projection of the remote history. Rebuilt from scratch on every snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryView {
    /// Newest first, at most the list window
    pub list: Vec<Solve>,
    /// Newest first, at most the trend window
    pub trend: Vec<Solve>,
    /// Size of the full collection
    pub total: usize,
}

impl HistoryView {
    pub fn from_snapshot(snapshot: &[Solve], list_window: usize, trend_window: usize) -> Self {
        let ordered = newest_first(snapshot);
        Self {
            list: ordered.iter().take(list_window).cloned().collect(),
            trend: ordered.iter().take(trend_window).cloned().collect(),
            total: snapshot.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn summary(&self) -> Option<Summary> {
        let times: Vec<f64> = self.list.iter().map(|s| s.elapsed_ms as f64).collect();
        let best_ms = self.list.iter().map(|s| s.elapsed_ms).min()?;
        let last_five: Vec<f64> = times.iter().take(5).copied().collect();

        Some(Summary {
            count: times.len(),
            best_ms,
            mean_ms: mean(&times)?,
            std_dev_ms: std_dev(&times)?,
            ao5_ms: if last_five.len() == 5 {
                trimmed_mean(&last_five)
            } else {
                None
            },
        })
    }

    /// Chart points, oldest to newest: (solve number, seconds)
    pub fn trend_points(&self) -> Vec<(f64, f64)> {
        self.trend
            .iter()
            .rev()
            .enumerate()
            .map(|(i, s)| ((i + 1) as f64, s.elapsed_ms as f64 / 1000.0))
            .collect()
    }
}
