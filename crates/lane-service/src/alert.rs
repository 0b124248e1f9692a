//! Congestion summaries derived from per-lane speed scores.

use crate::config::AlertConfig;
use crate::route::CameraSession;
use std::sync::Arc;

/// Direction of travel conditions along the next three cameras
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrafficTrend {
    /// The middle camera is faster than both neighbours
    SlightTraffic,
    /// The head camera is faster than the middle one
    BuildingUp,
    /// The middle camera is faster than the head one
    Reducing,
    Steady,
}

impl TrafficTrend {
    pub fn message(self) -> &'static str {
        match self {
            TrafficTrend::SlightTraffic => "Slight traffic ahead.",
            TrafficTrend::BuildingUp => "Traffic building up ahead.",
            TrafficTrend::Reducing => "Traffic reducing ahead.",
            TrafficTrend::Steady => "",
        }
    }
}

/// Lanes whose score equals the best one; ties are all optimal
pub fn optimal_lanes(scores: &[f64]) -> Vec<bool> {
    let best = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    scores.iter().map(|&score| score == best).collect()
}

pub fn average(scores: &[f64]) -> Option<f64> {
    (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64)
}

/// Compare head, middle and tail averages. A missing average never wins a
/// comparison.
pub fn traffic_trend(
    head: Option<f64>,
    middle: Option<f64>,
    tail: Option<f64>,
    epsilon: f64,
) -> TrafficTrend {
    let gt = |x: Option<f64>, y: Option<f64>| matches!((x, y), (Some(x), Some(y)) if x > y + epsilon);

    if gt(middle, tail) && gt(middle, head) {
        TrafficTrend::SlightTraffic
    } else if gt(head, middle) {
        TrafficTrend::BuildingUp
    } else if gt(middle, head) {
        TrafficTrend::Reducing
    } else {
        TrafficTrend::Steady
    }
}

/// Percentile with linear interpolation between closest ranks
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Sentence naming the clear and obstructed lanes (1-indexed).
///
/// Lanes scoring below `obstructed_threshold` are obstructed. Of the rest,
/// those at or above the `clear_percentile` of their scores are clear.
pub fn lane_status(scores: &[f64], obstructed_threshold: f64, clear_percentile: f64) -> String {
    let (obstructed, open): (Vec<(usize, f64)>, Vec<(usize, f64)>) = scores
        .iter()
        .copied()
        .enumerate()
        .partition(|&(_, score)| score < obstructed_threshold);

    let open_scores: Vec<f64> = open.iter().map(|&(_, score)| score).collect();
    let clear: Vec<usize> = match percentile(&open_scores, clear_percentile) {
        Some(threshold) => open
            .iter()
            .filter(|&&(_, score)| score >= threshold)
            .map(|&(lane, _)| lane)
            .collect(),
        None => Vec::new(),
    };
    let obstructed: Vec<usize> = obstructed.into_iter().map(|(lane, _)| lane).collect();

    let parts: Vec<String> = [(clear, "clear"), (obstructed, "obstructed")]
        .into_iter()
        .filter(|(lanes, _)| !lanes.is_empty())
        .map(|(lanes, state)| {
            let verb = if lanes.len() == 1 { "is" } else { "are" };
            format!("{} {} {}", lane_list(&lanes), verb, state)
        })
        .collect();

    if parts.is_empty() {
        String::new()
    } else {
        format!("{}.", parts.join("; "))
    }
}

fn lane_list(lanes: &[usize]) -> String {
    let labels: Vec<String> = lanes.iter().map(|lane| format!("Lane {}", lane + 1)).collect();
    match labels.as_slice() {
        [] => String::new(),
        [only] => only.clone(),
        [first, second] => format!("{} & {}", first, second),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

/// Applies the alert thresholds to live camera sessions
#[derive(Debug, Clone, Copy)]
pub struct AlertAnalyzer {
    config: AlertConfig,
    source_fps: f64,
}

impl AlertAnalyzer {
    pub fn new(config: AlertConfig, source_fps: f64) -> Self {
        Self { config, source_fps }
    }

    /// Per-lane scores of one session; lanes without crossings score zero
    pub fn scores(&self, session: &CameraSession) -> Vec<f64> {
        session.stats().scores(self.source_fps)
    }

    pub fn optimal_lanes(&self, head: Option<&CameraSession>) -> Vec<bool> {
        head.map(|session| optimal_lanes(&self.scores(session)))
            .unwrap_or_default()
    }

    /// Trend across exactly three sessions, `Steady` otherwise
    pub fn trend(&self, sessions: &[Arc<CameraSession>]) -> TrafficTrend {
        let [head, middle, tail] = sessions else {
            return TrafficTrend::Steady;
        };
        let avg = |session: &CameraSession| average(&session.stats().observed_scores(self.source_fps));
        traffic_trend(avg(&**head), avg(&**middle), avg(&**tail), self.config.epsilon)
    }

    pub fn lane_status(&self, session: Option<&CameraSession>) -> String {
        session
            .map(|session| {
                lane_status(
                    &self.scores(session),
                    self.config.obstructed_threshold,
                    self.config.clear_percentile,
                )
            })
            .unwrap_or_default()
    }
}
