use serde::Serialize;

/// Outcome of one accepted round of a benchmark repeat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoundSummary {
    pub repeat: usize,
    /// Iteration count of the accepted round.
    pub number: usize,
    /// Wall-clock duration of the accepted round.
    pub round_ms: f64,
}

/// Averaged latency of one operator within an accepted round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RoundSample {
    pub repeat: usize,
    /// Position among runnable operators, counted from 0.
    pub op: usize,
    /// Graph index of the operator.
    pub node_index: usize,
    pub avg_ms: f64,
    pub total_ms: f64,
    pub number: usize,
}

/// Receives benchmark results as they are produced.
///
/// For every repeat `on_repeat` fires once, followed by one
/// `on_round_measured` per runnable operator in graph order.
pub trait RoundObserver {
    fn on_repeat(&mut self, _summary: &RoundSummary) {}

    fn on_round_measured(&mut self, sample: &RoundSample);
}

/// Writes the classic `Repeat: i` / `Op #k: X ms/iter` report.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl RoundObserver for LogObserver {
    fn on_repeat(&mut self, summary: &RoundSummary) {
        crate::info!(
            "Repeat: {} ({} iters, {:.3} ms)",
            summary.repeat,
            summary.number,
            summary.round_ms
        );
    }

    fn on_round_measured(&mut self, sample: &RoundSample) {
        crate::info!("Op #{}: {} ms/iter", sample.op, sample.avg_ms);
    }
}

/// Keeps every summary and sample for later inspection.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RoundLog {
    pub rounds: Vec<RoundSummary>,
    pub samples: Vec<RoundSample>,
}

impl RoundLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples_for(&self, repeat: usize) -> impl Iterator<Item = &RoundSample> {
        self.samples.iter().filter(move |sample| sample.repeat == repeat)
    }
}

impl RoundObserver for RoundLog {
    fn on_repeat(&mut self, summary: &RoundSummary) {
        self.rounds.push(*summary);
    }

    fn on_round_measured(&mut self, sample: &RoundSample) {
        self.samples.push(*sample);
    }
}

impl RoundObserver for Vec<RoundSample> {
    fn on_round_measured(&mut self, sample: &RoundSample) {
        self.push(*sample);
    }
}
