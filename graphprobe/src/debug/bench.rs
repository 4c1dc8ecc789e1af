use std::time::Instant;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::device::DeviceContext;
use crate::error::DebugError;
use crate::runtime::ExecutorFacade;

use super::observer::{LogObserver, RoundObserver, RoundSample, RoundSummary};
use super::DebugRuntime;

/// Multiplicative floor on iteration growth after a rejected round.
pub const GROWTH_FACTOR: f64 = 1.618;

/// Parameters of `run_individual`.
///
/// The graph runs `1 + number * repeat` times when every round meets the
/// floor; rejected rounds are retried with a larger `number`, which then
/// carries over to later repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    pub number: i64,
    pub repeat: i64,
    pub min_repeat_ms: i64,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            number: 10,
            repeat: 1,
            min_repeat_ms: 0,
        }
    }
}

impl BenchmarkConfig {
    pub fn new(number: i64, repeat: i64, min_repeat_ms: i64) -> Self {
        Self {
            number,
            repeat,
            min_repeat_ms,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.number <= 0 {
            return Err(DebugError::InvalidArgument(format!("number must be > 0, got {}", self.number)).into());
        }
        if self.repeat <= 0 {
            return Err(DebugError::InvalidArgument(format!("repeat must be > 0, got {}", self.repeat)).into());
        }
        if self.min_repeat_ms < 0 {
            return Err(DebugError::InvalidArgument(format!(
                "min_repeat_ms must be >= 0, got {}",
                self.min_repeat_ms
            ))
            .into());
        }
        Ok(())
    }
}

/// Iteration count for the retry of a round that took `round_ms` with
/// `number` iterations and fell short of `min_repeat_ms`.
pub fn next_number(number: usize, round_ms: f64, min_repeat_ms: f64) -> usize {
    let grown = number as f64 * GROWTH_FACTOR;
    let target = if round_ms > 0.0 {
        grown.max(min_repeat_ms / (round_ms / number as f64) + 1.0)
    } else {
        grown
    };
    (target as usize).max(number + 1)
}

impl<E: ExecutorFacade> DebugRuntime<E> {
    /// Benchmark every operator and report through the log.
    pub fn run_individual(&mut self, config: BenchmarkConfig) -> Result<()> {
        self.run_individual_with(config, &mut LogObserver)
    }

    /// Benchmark every operator and hand the per-repeat averages to `observer`.
    pub fn run_individual_with(
        &mut self,
        config: BenchmarkConfig,
        observer: &mut dyn RoundObserver,
    ) -> Result<()> {
        config.validate()?;
        let min_repeat_ms = config.min_repeat_ms as f64;
        let count = self.exec.operator_count();
        let runnable = (0..count)
            .filter(|&index| self.exec.has_operator(index))
            .map(|index| self.exec.context_of(index).map(|ctx| (index, ctx)))
            .collect::<Result<Vec<_>>>()?;
        if runnable.is_empty() && min_repeat_ms > 0.0 {
            crate::warning!("no runnable operators; min_repeat_ms {} cannot be met", min_repeat_ms);
        }

        // warm-up absorbs lazy initialization
        self.exec.run_full()?;

        let mut number = config.number as usize;
        let mut time_per_op = vec![0.0f64; count];
        for repeat in 0..config.repeat as usize {
            let mut round_ms = self.measure_round(&runnable, number, &mut time_per_op)?;
            while round_ms < min_repeat_ms && !runnable.is_empty() {
                let next = next_number(number, round_ms, min_repeat_ms);
                crate::trace!(
                    "repeat {}: {:.3} ms with {} iters is under {} ms, retrying with {}",
                    repeat,
                    round_ms,
                    number,
                    min_repeat_ms,
                    next
                );
                number = next;
                round_ms = self.measure_round(&runnable, number, &mut time_per_op)?;
            }

            observer.on_repeat(&RoundSummary {
                repeat,
                number,
                round_ms,
            });
            for (op, &(index, _)) in runnable.iter().enumerate() {
                let total_ms = time_per_op[index];
                observer.on_round_measured(&RoundSample {
                    repeat,
                    op,
                    node_index: index,
                    avg_ms: total_ms / number as f64,
                    total_ms,
                    number,
                });
            }
        }
        Ok(())
    }

    /// Run `number` passes over the runnable operators, accumulating each
    /// operator's synchronized latency in milliseconds. Returns the duration
    /// of the whole round.
    fn measure_round(
        &mut self,
        runnable: &[(usize, DeviceContext)],
        number: usize,
        time_per_op: &mut [f64],
    ) -> Result<f64> {
        time_per_op.fill(0.0);
        let round_start = Instant::now();
        for _ in 0..number {
            for &(index, ctx) in runnable {
                let op_start = Instant::now();
                self.exec.execute_at(index)?;
                self.exec.synchronize(ctx)?;
                time_per_op[index] += op_start.elapsed().as_secs_f64() * 1000.0;
            }
        }
        Ok(round_start.elapsed().as_secs_f64() * 1000.0)
    }
}
