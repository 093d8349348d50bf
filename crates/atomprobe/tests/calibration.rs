//! Adaptive calibration against the simulated device.

use atomprobe::prelude::*;
use atomprobe::sim::{builtin_kernels, TimingModel};

/// 1 us launch overhead plus 1 ns per operation, no contention penalty:
/// 256 threads at `n` iterations take `1 + 0.256 n` us.
fn linear_device() -> SimDevice {
    SimDevice::with_config(SimConfig::new().with_timing(TimingModel {
        launch_overhead_ns: 1_000,
        ns_per_op: 1.0,
        lanes: 1,
        ns_per_contended_op: 0.0,
    }))
}

fn adaptive(threshold_us: f64) -> BenchConfig {
    BenchConfig::new()
        .with_workgroup_size(64)
        .with_workgroups(4)
        .with_trials(3)
        .with_adaptive(threshold_us)
}

#[test]
fn test_converges_to_power_of_two_multiple() {
    let device = linear_device();
    let engine = ContentionBenchmark::new(&device, builtin_kernels().unwrap());

    let report = engine.run(&adaptive(200.0)).unwrap();

    // 128 -> 256 -> 512 -> 1024; 1024 iterations is the first above 200 us.
    assert_eq!(report.rmw_iters, 1024);
    let iters: Vec<u32> = report.calibration.iter().map(|s| s.rmw_iters).collect();
    assert_eq!(iters, vec![128, 256, 512, 1024]);
    assert!(report.mean_duration_us >= 200.0);
    assert!(report
        .calibration
        .iter()
        .take(3)
        .all(|s| s.mean_duration_us < 200.0));
    assert_eq!(report.error_count(), 0);
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn test_calibration_is_repeatable() {
    let device = linear_device();
    let engine = ContentionBenchmark::new(&device, builtin_kernels().unwrap());

    let first = engine.run(&adaptive(500.0)).unwrap();
    let second = engine.run(&adaptive(500.0)).unwrap();

    assert_eq!(first.rmw_iters, second.rmw_iters);
    assert_eq!(first.rmw_iters % 128, 0);
    assert!((first.rmw_iters / 128).is_power_of_two());
}

#[test]
fn test_long_enough_first_attempt_is_kept() {
    let device = linear_device();
    let engine = ContentionBenchmark::new(&device, builtin_kernels().unwrap());

    let report = engine.run(&adaptive(1.0)).unwrap();

    assert_eq!(report.rmw_iters, 128);
    assert_eq!(report.calibration.len(), 1);
}

#[test]
fn test_non_adaptive_runs_once() {
    let device = linear_device();
    let engine = ContentionBenchmark::new(&device, builtin_kernels().unwrap());

    let report = engine
        .run(
            &BenchConfig::new()
                .with_workgroup_size(64)
                .with_workgroups(4)
                .with_trials(3),
        )
        .unwrap();

    assert_eq!(report.calibration.len(), 1);
    assert!(report.mean_duration_us < 1_000_000.0);
}

#[test]
fn test_exhaustion_releases_buffers() {
    let device = linear_device();
    let engine = ContentionBenchmark::new(&device, builtin_kernels().unwrap());

    let err = engine
        .run(&adaptive(1e9).with_max_doublings(3))
        .unwrap_err();

    match err {
        ProbeError::CalibrationExhausted {
            attempts,
            rmw_iters,
            ..
        } => {
            assert_eq!(attempts, 4);
            assert_eq!(rmw_iters, 1024);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn test_counter_overflow_stops_calibration() {
    let device = linear_device();
    let engine = ContentionBenchmark::new(&device, builtin_kernels().unwrap());

    // 2^30 doubles once to 2^31; the next doubling overflows 32 bits.
    let err = engine
        .run(&adaptive(1e12).with_rmw_iters(1 << 30))
        .unwrap_err();

    assert!(matches!(
        err,
        ProbeError::CalibrationExhausted { attempts: 2, .. }
    ));
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn test_default_threshold_converges_on_default_device() {
    let device = SimDevice::new();
    let engine = ContentionBenchmark::new(&device, builtin_kernels().unwrap());

    let report = engine
        .run(
            &BenchConfig::new()
                .with_contention(4)
                .with_padding(2)
                .with_adaptive(1_000_000.0),
        )
        .unwrap();

    assert!(report.mean_duration_us >= 1_000_000.0);
    assert!((report.rmw_iters / 128).is_power_of_two());
    assert!(report.calibration.len() <= 17);
    assert_eq!(report.error_count(), 0);
    assert_eq!(device.live_buffers(), 0);
}
