#![allow(dead_code)]
#![allow(unused_imports)]
//! Shared integration test utilities.
//!
//! Import with:
//! ```
//! mod common;
//! use common::*;
//! ```

use cosync::runtime::{Scheduler, SchedulerConfig};
use cosync::sim::LabSimulator;
use proptest::prelude::ProptestConfig;
use proptest::test_runner::RngSeed;
use std::rc::Rc;
use std::sync::Once;
use tracing_subscriber::fmt::format::FmtSpan;

static INIT_LOGGING: Once = Once::new();

/// Default seed for property tests when running under CI.
pub const DEFAULT_PROPTEST_SEED: u64 = 0x5EED_5EED;

const PROPTEST_SEED_ENV: &str = "COSYNC_PROPTEST_SEED";

/// Build a ProptestConfig with deterministic seed support for CI.
#[must_use]
pub fn test_proptest_config(cases: u32) -> ProptestConfig {
    let mut config = ProptestConfig::with_cases(cases);
    // Honor an explicit PROPTEST_RNG_SEED, otherwise apply our own.
    if matches!(config.rng_seed, RngSeed::Random) {
        if let Some(seed) = read_proptest_seed() {
            config.rng_seed = RngSeed::Fixed(seed);
        }
    }
    config
}

fn read_proptest_seed() -> Option<u64> {
    if let Ok(value) = std::env::var(PROPTEST_SEED_ENV) {
        return value.parse::<u64>().ok();
    }
    std::env::var("CI").ok().map(|_| DEFAULT_PROPTEST_SEED)
}

/// Initialize test logging with trace-level output.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// A scheduler with a lab simulator attached.
#[must_use]
pub fn test_bench() -> (Scheduler, Rc<LabSimulator>) {
    test_bench_with_config(SchedulerConfig::default())
}

/// Like [`test_bench`] with an explicit scheduler configuration.
#[must_use]
pub fn test_bench_with_config(config: SchedulerConfig) -> (Scheduler, Rc<LabSimulator>) {
    init_test_logging();
    let sched = Scheduler::new(config);
    let sim = LabSimulator::attach(&sched);
    (sched, sim)
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

/// Assert that an outcome carries a specific value.
#[macro_export]
macro_rules! assert_outcome_value {
    ($outcome:expr, $expected:expr) => {
        match $outcome {
            ::cosync::types::Outcome::Value(v) => assert_eq!(v, $expected),
            other => panic!("expected Outcome::Value({:?}), got {:?}", $expected, other),
        }
    };
}

/// Assert that an outcome is the kill signal.
#[macro_export]
macro_rules! assert_outcome_killed {
    ($outcome:expr) => {
        match $outcome {
            ::cosync::types::Outcome::Error(::cosync::types::TaskError::Killed) => {}
            other => panic!("expected Outcome::Error(Killed), got {:?}", other),
        }
    };
}
