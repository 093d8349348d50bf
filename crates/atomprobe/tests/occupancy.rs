//! Occupancy discovery against the simulated device.

use atomprobe::prelude::*;
use atomprobe::sim::builtin_kernels;

fn occupancy_kernel() -> KernelBinary {
    builtin_kernels().unwrap().occupancy.unwrap()
}

fn params(trials: u32) -> OccupancyParams {
    OccupancyParams {
        trials,
        ..Default::default()
    }
}

#[test]
fn test_estimate_is_bounded() {
    let device = SimDevice::with_config(SimConfig::new().with_resident_workgroups(8));
    let kernel = occupancy_kernel();

    let report = OccupancyDiscovery::new(&device, &kernel, params(5))
        .discover(64)
        .unwrap();

    assert_eq!(report.observations.len(), 5);
    assert!(report.occupancy >= 1);
    assert!(report.occupancy <= 8);
    assert_eq!(report.occupancy, *report.observations.iter().max().unwrap());
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn test_estimate_never_exceeds_dispatched_workgroups() {
    let device = SimDevice::with_config(
        SimConfig::new()
            .with_resident_workgroups(300)
            .with_arrivals(0, 0),
    );
    let kernel = occupancy_kernel();
    let params = OccupancyParams {
        probe_workgroups: 16,
        trials: 3,
        ..Default::default()
    };

    let report = OccupancyDiscovery::new(&device, &kernel, params)
        .discover(32)
        .unwrap();

    assert_eq!(report.occupancy, 16);
}

#[test]
fn test_more_trials_never_lower_the_estimate() {
    let config = SimConfig::new().with_resident_workgroups(24).with_seed(42);
    let kernel = occupancy_kernel();

    let mut previous = 0;
    for trials in 1..=8 {
        let device = SimDevice::with_config(config.clone());
        let estimate = OccupancyDiscovery::new(&device, &kernel, params(trials))
            .discover(64)
            .unwrap()
            .occupancy;
        assert!(estimate >= previous, "{} trials: {} < {}", trials, estimate, previous);
        assert!((1..=24).contains(&estimate));
        previous = estimate;
    }
}

#[test]
fn test_tight_arrivals_find_full_residency() {
    let device = SimDevice::with_config(
        SimConfig::new()
            .with_resident_workgroups(20)
            .with_arrivals(0, 0),
    );
    let kernel = occupancy_kernel();

    let report = OccupancyDiscovery::new(&device, &kernel, params(1))
        .discover(128)
        .unwrap();

    assert_eq!(report.occupancy, 20);
}

#[test]
fn test_zero_count_violates_contract() {
    let device = SimDevice::with_config(SimConfig::new().with_fault(SimFault::StalledOccupancy));
    let kernel = occupancy_kernel();

    let err = OccupancyDiscovery::new(&device, &kernel, params(3))
        .discover(64)
        .unwrap_err();

    assert!(matches!(err, ProbeError::KernelContractViolation(_)));
    assert_eq!(device.live_buffers(), 0);
}

#[test]
fn test_zero_trials_rejected() {
    let device = SimDevice::new();
    let kernel = occupancy_kernel();

    let err = OccupancyDiscovery::new(&device, &kernel, params(0))
        .discover(64)
        .unwrap_err();

    assert!(err.is_config_error());
    assert_eq!(device.allocations(), 0);
}

#[test]
fn test_discovered_grid_drives_benchmark() {
    let device = SimDevice::with_config(
        SimConfig::new()
            .with_resident_workgroups(12)
            .with_arrivals(0, 0),
    );
    let engine = ContentionBenchmark::new(&device, builtin_kernels().unwrap());

    let report = engine
        .run(
            &BenchConfig::new()
                .with_workgroup_size(64)
                .with_discovered_workgroups()
                .with_contention(2)
                .with_trials(2),
        )
        .unwrap();

    let occupancy = report.occupancy.as_ref().unwrap();
    assert_eq!(occupancy.occupancy, 12);
    assert_eq!(report.workgroups, 12);
    assert_eq!(report.result_len, 64 * 12 / 2);
    assert_eq!(report.error_count(), 0);
    assert!(report.to_string().contains("Occupancy: 12 of 256"));
}

#[test]
fn test_discovery_out_of_memory_unwinds() {
    // One discovery trial allocates eight buffers.
    for n in 1..=8 {
        let device = SimDevice::with_config(SimConfig::new().with_failing_allocation(n));
        let engine = ContentionBenchmark::new(&device, builtin_kernels().unwrap());

        let err = engine
            .run(&BenchConfig::new().with_workgroup_size(64))
            .unwrap_err();

        assert!(err.is_resource_error(), "allocation {}: {}", n, err);
        assert_eq!(device.live_buffers(), 0, "allocation {}", n);
    }
}

#[test]
fn test_discovery_needs_occupancy_kernel() {
    let device = SimDevice::new();
    let kernels = KernelSet {
        occupancy: None,
        ..builtin_kernels().unwrap()
    };
    let engine = ContentionBenchmark::new(&device, kernels);

    let err = engine.run(&BenchConfig::new()).unwrap_err();

    assert!(err.is_config_error());
    assert_eq!(device.allocations(), 0);
}
