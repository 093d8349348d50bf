//! Contention benchmark against the simulated device.

use atomprobe::prelude::*;
use atomprobe::sim::builtin_kernels;

fn grid_64x4() -> BenchConfig {
    BenchConfig::new()
        .with_workgroup_size(64)
        .with_workgroups(4)
        .with_trials(3)
}

/// contention=1, padding=1, 128 iterations, 3 trials on (64, 1) x 4.
#[test]
fn test_uncontended_scenario() {
    let device = SimDevice::new();
    let engine = ContentionBenchmark::new(&device, builtin_kernels().unwrap());

    let report = engine.run(&grid_64x4().with_rmw_iters(128)).unwrap();

    assert_eq!(report.global_threads(), 256);
    assert_eq!(report.result_len, 256);
    assert_eq!(report.rmw_iters, 128);
    assert_eq!(report.trials, 3);
    assert_eq!(report.validation.checked, 256);
    assert_eq!(report.error_count(), 0);
    assert!(report.validation.is_clean());
    assert!(report.throughput_ops_per_us > 0.0);
    assert_eq!(device.live_buffers(), 0);
}

/// contention=4, padding=2: half as many words as threads, each target 512.
#[test]
fn test_contended_padded_scenario() {
    let device = SimDevice::new();
    let engine = ContentionBenchmark::new(&device, builtin_kernels().unwrap());

    let report = engine
        .run(&grid_64x4().with_contention(4).with_padding(2))
        .unwrap();

    assert_eq!(report.result_len, 128);
    assert_eq!(report.validation.checked, 64);
    assert_eq!(report.error_count(), 0);
    assert_eq!(report.validation.stray, 0);
}

#[test]
fn test_expected_counts_on_device_buffer() {
    let device = SimDevice::new();
    let pattern = AccessPattern::new(256, 4, 2).unwrap();
    let result = device.allocate(pattern.result_len(), "result").unwrap();
    let iters = device.allocate_init(&[128], "iters").unwrap();
    let table = device.allocate_init(&pattern.generate(), "pattern").unwrap();
    let bindings = Bindings::builder(&CONTENTION_LAYOUT)
        .bind(BufferRole::Result, &result)
        .unwrap()
        .bind(BufferRole::IterationCount, &iters)
        .unwrap()
        .bind(BufferRole::AccessPattern, &table)
        .unwrap()
        .finish()
        .unwrap();
    let kernel = builtin_kernels().unwrap().contention.with_workgroup_size(64);
    let launch = LaunchConfig {
        workgroup_size: 64,
        workgroups: 4,
    };

    let mut program = device.create_program(&kernel, &bindings, launch).unwrap();
    program.run().unwrap();

    let words = result.read().unwrap();
    assert_eq!(words.len(), 128);
    for (slot, &value) in words.iter().enumerate() {
        let expected = if slot % 2 == 0 { 512 } else { 0 };
        assert_eq!(value, expected, "slot {}", slot);
    }

    // A second run without clearing accumulates.
    program.run().unwrap();
    let validator = ResultValidator::accumulated(pattern, 128, 2);
    assert_eq!(validator.validate(&result.read().unwrap()).error_count(), 0);
}

#[test]
fn test_zero_contention_rejected_before_allocation() {
    let device = SimDevice::new();
    let engine = ContentionBenchmark::new(&device, builtin_kernels().unwrap());

    let err = engine.run(&grid_64x4().with_contention(0)).unwrap_err();

    assert!(err.is_config_error());
    assert_eq!(device.allocations(), 0);
}

#[test]
fn test_oversized_workgroup_rejected_before_allocation() {
    let device = SimDevice::new();
    let engine = ContentionBenchmark::new(&device, builtin_kernels().unwrap());

    let err = engine
        .run(&BenchConfig::new().with_workgroup_size(1024).with_workgroups(1))
        .unwrap_err();

    assert!(err.is_config_error());
    assert_eq!(device.allocations(), 0);
}

#[test]
fn test_partial_trailing_group() {
    let device = SimDevice::new();
    let engine = ContentionBenchmark::new(&device, builtin_kernels().unwrap());

    // 192 threads in groups of 128: one full group and one of 64.
    let report = engine
        .run(
            &BenchConfig::new()
                .with_workgroup_size(64)
                .with_workgroups(3)
                .with_contention(128)
                .with_padding(4)
                .with_trials(1),
        )
        .unwrap();

    assert_eq!(report.result_len, 8);
    assert_eq!(report.error_count(), 0);
}

#[test]
fn test_lost_updates_are_counted() {
    let device =
        SimDevice::with_config(SimConfig::new().with_fault(SimFault::LostUpdates { rate: 0.5 }));
    let engine = ContentionBenchmark::new(&device, builtin_kernels().unwrap());

    let report = engine.run(&grid_64x4().with_contention(4)).unwrap();

    assert!(report.error_count() > 0);
    assert!(report.to_string().contains("Kernel error count:"));
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn test_out_of_memory_unwinds_every_allocation() {
    // One attempt allocates result, iteration count and pattern.
    for n in 1..=3 {
        let device = SimDevice::with_config(SimConfig::new().with_failing_allocation(n));
        let engine = ContentionBenchmark::new(&device, builtin_kernels().unwrap());

        let err = engine.run(&grid_64x4()).unwrap_err();

        assert!(err.is_resource_error(), "allocation {}: {}", n, err);
        assert_eq!(device.live_buffers(), 0, "allocation {}", n);
    }
}

#[test]
fn test_zero_duration_is_an_error() {
    let device = SimDevice::with_config(SimConfig::new().with_fault(SimFault::FrozenClock));
    let engine = ContentionBenchmark::new(&device, builtin_kernels().unwrap());

    let err = engine.run(&grid_64x4()).unwrap_err();

    assert!(matches!(err, ProbeError::TimingUnavailable(_)));
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn test_swapped_kernels_fail_binding() {
    let device = SimDevice::new();
    let builtin = builtin_kernels().unwrap();
    let kernels = KernelSet {
        contention: builtin.occupancy.clone().unwrap(),
        occupancy: Some(builtin.contention),
    };
    let engine = ContentionBenchmark::new(&device, kernels);

    let err = engine.run(&grid_64x4()).unwrap_err();

    assert!(matches!(err, ProbeError::BindingMismatch { .. }));
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn test_report_format() {
    let device = SimDevice::with_config(SimConfig::new().with_name("Test GPU"));
    let engine = ContentionBenchmark::new(&device, builtin_kernels().unwrap());

    let text = engine.run(&grid_64x4()).unwrap().to_string();

    assert!(text.starts_with("Device: Test GPU, workgroups (64, 1) x 4"));
    assert!(text.contains("atomic operations per microsecond"));
    assert!(text.ends_with("Kernel error count: 0"));
}
