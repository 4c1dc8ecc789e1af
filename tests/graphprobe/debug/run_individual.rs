use std::time::Duration;

use anyhow::Result;
use graphprobe::{next_number, BenchmarkConfig, DebugError, DebugRuntime, RoundLog, RoundSample};

use crate::common::{self, MockExecutor, MockOp};

#[test]
fn invalid_parameters_fail_before_execution() -> Result<()> {
    for (number, repeat, min_repeat_ms) in [(0, 1, 0), (1, 0, 0), (1, 1, -5), (-3, 1, 0)] {
        let mut debug = DebugRuntime::new(MockExecutor::uniform(3));
        let err = debug
            .run_individual(BenchmarkConfig::new(number, repeat, min_repeat_ms))
            .unwrap_err();
        assert!(
            matches!(err.downcast_ref::<DebugError>(), Some(DebugError::InvalidArgument(_))),
            "unexpected error for ({number}, {repeat}, {min_repeat_ms}): {err}"
        );
        assert_eq!(debug.executor().total_calls(), 0);
        assert_eq!(debug.executor().full_runs, 0);
    }
    Ok(())
}

#[test]
fn sleeping_ops_report_increasing_averages() -> Result<()> {
    let delays = [0u64, 10, 20, 30];
    let mut debug = DebugRuntime::new(MockExecutor::sleeping(&delays));
    let mut samples: Vec<RoundSample> = Vec::new();
    debug.run_individual_with(BenchmarkConfig::new(1, 1, 0), &mut samples)?;

    assert_eq!(samples.len(), delays.len());
    for (sample, delay) in samples.iter().zip(delays) {
        let delay = delay as f64;
        assert!(sample.avg_ms >= delay, "op {} took {} ms, slept {}", sample.op, sample.avg_ms, delay);
        assert!(sample.avg_ms < delay + 25.0, "op {} took {} ms, slept {}", sample.op, sample.avg_ms, delay);
    }
    for pair in samples.windows(2) {
        assert!(pair[0].avg_ms < pair[1].avg_ms);
    }
    Ok(())
}

#[test]
fn warm_up_then_number_times_repeat_passes() -> Result<()> {
    let mut debug = DebugRuntime::new(MockExecutor::uniform(3));
    let mut log = RoundLog::new();
    debug.run_individual_with(BenchmarkConfig::new(3, 2, 0), &mut log)?;

    assert_eq!(debug.executor().full_runs, 1);
    assert_eq!(debug.executor().calls, vec![7, 7, 7]);
    assert_eq!(log.rounds.len(), 2);
    assert!(log.rounds.iter().all(|round| round.number == 3));
    assert_eq!(log.samples.len(), 6);
    assert_eq!(log.samples_for(1).count(), 3);
    Ok(())
}

#[test]
fn short_rounds_grow_until_floor_is_met() -> Result<()> {
    let exec = MockExecutor::new(vec![
        MockOp::runnable("a").with_delay(Duration::from_millis(2)),
        MockOp::runnable("b").with_delay(Duration::from_millis(1)),
    ]);
    let mut debug = DebugRuntime::new(exec);
    let mut log = RoundLog::new();
    debug.run_individual_with(BenchmarkConfig::new(1, 2, 30), &mut log)?;

    assert_eq!(log.rounds.len(), 2);
    for round in &log.rounds {
        assert!(round.round_ms >= 30.0, "round {} only took {} ms", round.repeat, round.round_ms);
        assert!(round.number > 1);
    }
    assert!(log.rounds[1].number >= log.rounds[0].number);
    for sample in &log.samples {
        let round = &log.rounds[sample.repeat];
        assert_eq!(sample.number, round.number);
        assert_eq!(sample.avg_ms, sample.total_ms / sample.number as f64);
    }
    Ok(())
}

#[test]
fn display_numbering_skips_placeholders() -> Result<()> {
    let exec = MockExecutor::new(vec![
        MockOp::placeholder("input"),
        MockOp::runnable("conv"),
        MockOp::placeholder("weights"),
        MockOp::runnable("relu"),
    ]);
    let mut debug = DebugRuntime::new(exec);
    let mut samples: Vec<RoundSample> = Vec::new();
    debug.run_individual_with(BenchmarkConfig::new(2, 1, 0), &mut samples)?;

    let positions = samples
        .iter()
        .map(|sample| (sample.op, sample.node_index))
        .collect::<Vec<_>>();
    assert_eq!(positions, vec![(0, 1), (1, 3)]);
    assert_eq!(debug.executor().calls, vec![0, 3, 0, 3]);
    Ok(())
}

#[test]
fn graph_without_runnable_ops_still_terminates() -> Result<()> {
    let exec = MockExecutor::new(vec![MockOp::placeholder("a"), MockOp::placeholder("b")]);
    let mut debug = DebugRuntime::new(exec);
    let mut log = RoundLog::new();
    debug.run_individual_with(BenchmarkConfig::new(1, 3, 50), &mut log)?;
    assert_eq!(log.rounds.len(), 3);
    assert!(log.samples.is_empty());
    assert_eq!(debug.executor().full_runs, 1);
    Ok(())
}

#[test]
fn default_observer_runs_on_graph_runtime() -> Result<()> {
    let json = common::chain_graph_json(&["relu", "negative", "copy"], 16);
    let mut debug = graphprobe::create(
        &json,
        graphprobe::CpuModule::new().into_shared(),
        &[graphprobe::DeviceContext::cpu(0)],
    )?;
    debug.run_individual(BenchmarkConfig::default())?;
    Ok(())
}

#[test]
fn next_number_growth() {
    // projection dominates: 10 iters took 5 ms, floor 100 ms
    assert_eq!(next_number(10, 5.0, 100.0), 201);
    // golden-ratio floor dominates when the projection undershoots
    assert_eq!(next_number(100, 99.0, 100.0), 161);
    // never stalls, even when growth truncates back to the old count
    assert_eq!(next_number(1, 0.9, 1.0), 2);
    // a zero-length round only grows geometrically
    assert_eq!(next_number(10, 0.0, 100.0), 16);
    assert_eq!(next_number(1, 0.0, 100.0), 2);
}

#[test]
fn every_timed_call_is_followed_by_its_device_barrier() -> Result<()> {
    let gpu = graphprobe::DeviceContext::new(graphprobe::DeviceKind::Gpu, 1);
    let exec = MockExecutor::new(vec![
        MockOp::placeholder("input"),
        MockOp::runnable("accel").on(gpu),
        MockOp::runnable("host"),
    ]);
    let mut debug = DebugRuntime::new(exec);
    let mut samples: Vec<RoundSample> = Vec::new();
    debug.run_individual_with(BenchmarkConfig::new(3, 2, 0), &mut samples)?;

    let expected = [gpu, graphprobe::DeviceContext::cpu(0)].repeat(3 * 2);
    assert_eq!(debug.executor().syncs(), expected);
    assert_eq!(debug.executor().calls, vec![0, 7, 7]);
    Ok(())
}
