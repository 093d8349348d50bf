//! Simulated backend for atomprobe.
//!
//! [`SimDevice`] runs the contention and occupancy protocols on the host with
//! deterministic, seeded scheduling. It backs the test suite and the CLI's
//! `--backend sim`, and can inject faults (lost updates, a stalled occupancy
//! counter, a frozen clock, out-of-memory) that real hardware only produces by
//! accident.

#![warn(missing_docs)]

mod config;
mod device;
mod kernels;
mod memory;
mod program;

pub use config::{SimConfig, SimFault, TimingModel};
pub use device::SimDevice;
pub use kernels::{builtin_kernels, stub_module};
pub use memory::{MemoryLedger, SimBuffer};
pub use program::SimProgram;

#[cfg(test)]
mod tests {
    use super::*;
    use atomprobe_core::binding::{Bindings, BufferRole, CONTENTION_LAYOUT, OCCUPANCY_LAYOUT};
    use atomprobe_core::device::{ComputeDevice, DeviceBuffer, KernelProgram, LaunchConfig};
    use atomprobe_core::error::ProbeError;
    use atomprobe_core::kernel::KernelBinary;
    use atomprobe_core::pattern::{self, AccessPattern};

    fn launch(workgroup_size: u32, workgroups: u32) -> LaunchConfig {
        LaunchConfig {
            workgroup_size,
            workgroups,
        }
    }

    fn contention_kernel(x: u32) -> KernelBinary {
        KernelBinary::from_words(stub_module(x), "rmw_test").unwrap()
    }

    fn occupancy_kernel(x: u32) -> KernelBinary {
        KernelBinary::from_words(stub_module(x), "occupancy_discovery").unwrap()
    }

    #[test]
    fn test_rmw_loop_adds_per_thread() {
        let device = SimDevice::new();
        let pat = AccessPattern::new(16, 4, 2).unwrap();
        let result = device.allocate(pat.result_len(), "result").unwrap();
        let iters = device.allocate_init(&[10], "iters").unwrap();
        let table = device.allocate_init(&pat.generate(), "pattern").unwrap();
        let bindings = Bindings::builder(&CONTENTION_LAYOUT)
            .bind(BufferRole::Result, &result)
            .unwrap()
            .bind(BufferRole::IterationCount, &iters)
            .unwrap()
            .bind(BufferRole::AccessPattern, &table)
            .unwrap()
            .finish()
            .unwrap();

        let mut program = device
            .create_program(&contention_kernel(8), &bindings, launch(8, 2))
            .unwrap();
        let time = program.run_timed().unwrap();
        assert!(time.as_nanos() > 0);

        assert_eq!(result.read().unwrap(), vec![40, 0, 40, 0, 40, 0, 40, 0]);
        assert_eq!(program.dispatches(), 1);
    }

    #[test]
    fn test_contention_costs_more_time() {
        let device = SimDevice::new();
        let time_for = |contention: u32| {
            let pat = AccessPattern::new(256, contention, 1).unwrap();
            let result = device.allocate(pat.result_len(), "result").unwrap();
            let iters = device.allocate_init(&[1000], "iters").unwrap();
            let table = device.allocate_init(&pat.generate(), "pattern").unwrap();
            let bindings = Bindings::builder(&CONTENTION_LAYOUT)
                .bind(BufferRole::Result, &result)
                .unwrap()
                .bind(BufferRole::IterationCount, &iters)
                .unwrap()
                .bind(BufferRole::AccessPattern, &table)
                .unwrap()
                .finish()
                .unwrap();
            let mut program = device
                .create_program(&contention_kernel(64), &bindings, launch(64, 4))
                .unwrap();
            program.run_timed().unwrap().as_nanos()
        };

        assert!(time_for(256) > time_for(1));
    }

    #[test]
    fn test_entry_point_must_match_layout() {
        let device = SimDevice::new();
        let a = device.allocate(1, "a").unwrap();
        let bindings = Bindings::builder(&CONTENTION_LAYOUT)
            .bind(BufferRole::Result, &a)
            .unwrap()
            .bind(BufferRole::IterationCount, &a)
            .unwrap()
            .bind(BufferRole::AccessPattern, &a)
            .unwrap()
            .finish()
            .unwrap();

        let err = device
            .create_program(&occupancy_kernel(1), &bindings, launch(1, 1))
            .err()
            .unwrap();
        assert!(matches!(err, ProbeError::BindingMismatch { .. }));
    }

    #[test]
    fn test_local_size_must_match_launch() {
        let device = SimDevice::new();
        let a = device.allocate(1, "a").unwrap();
        let bindings = Bindings::builder(&CONTENTION_LAYOUT)
            .bind(BufferRole::Result, &a)
            .unwrap()
            .bind(BufferRole::IterationCount, &a)
            .unwrap()
            .bind(BufferRole::AccessPattern, &a)
            .unwrap()
            .finish()
            .unwrap();

        assert!(device
            .create_program(&contention_kernel(32), &bindings, launch(64, 1))
            .is_err());
    }

    #[test]
    fn test_failing_allocation() {
        let device = SimDevice::with_config(SimConfig::new().with_failing_allocation(2));
        let first = device.allocate(4, "first").unwrap();
        let err = device.allocate(4, "second").unwrap_err();
        assert!(err.is_resource_error());
        assert_eq!(device.live_buffers(), 1);
        drop(first);
        assert_eq!(device.live_buffers(), 0);
        assert_eq!(device.allocations(), 2);
    }

    #[test]
    fn test_memory_ceiling() {
        let device = SimDevice::with_config(SimConfig::new().with_memory_words(8));
        let _a = device.allocate(6, "a").unwrap();
        assert!(device.allocate(4, "b").is_err());
        assert!(device.allocate(2, "c").is_ok());
    }

    fn occupancy_trial(device: &SimDevice, workgroups: u32) -> u32 {
        let threads = 4 * workgroups;
        let result = device.allocate(threads as usize, "result").unwrap();
        let iters = device.allocate_init(&[8], "iters").unwrap();
        let table = device
            .allocate_init(&pattern::identity(threads), "pattern")
            .unwrap();
        let count = device.allocate_init(&[0], "count").unwrap();
        let poll = device.allocate_init(&[1], "poll").unwrap();
        let scratch = device.allocate(workgroups as usize, "scratch").unwrap();
        let serving = device.allocate_init(&[0], "serving").unwrap();
        let ticket = device.allocate_init(&[0], "ticket").unwrap();
        let bindings = Bindings::builder(&OCCUPANCY_LAYOUT)
            .bind(BufferRole::Result, &result)
            .unwrap()
            .bind(BufferRole::IterationCount, &iters)
            .unwrap()
            .bind(BufferRole::AccessPattern, &table)
            .unwrap()
            .bind(BufferRole::OccupancyCount, &count)
            .unwrap()
            .bind(BufferRole::PollOpen, &poll)
            .unwrap()
            .bind(BufferRole::WorkgroupScratch, &scratch)
            .unwrap()
            .bind(BufferRole::NowServing, &serving)
            .unwrap()
            .bind(BufferRole::NextTicket, &ticket)
            .unwrap()
            .finish()
            .unwrap();

        let mut program = device
            .create_program(&occupancy_kernel(4), &bindings, launch(4, workgroups))
            .unwrap();
        program.run().unwrap();

        assert_eq!(poll.load(0).unwrap(), 0);
        assert_eq!(ticket.load(0).unwrap(), workgroups);
        assert_eq!(serving.load(0).unwrap(), workgroups);
        let flagged: u32 = scratch.read().unwrap().iter().sum();
        let counted = count.load(0).unwrap();
        assert_eq!(flagged, counted);
        assert!(result.read().unwrap().iter().all(|&v| v == 8));
        counted
    }

    #[test]
    fn test_ticket_lock_bounds() {
        let device = SimDevice::with_config(SimConfig::new().with_resident_workgroups(8));
        for _ in 0..20 {
            let counted = occupancy_trial(&device, 64);
            assert!((1..=8).contains(&counted));
        }
        // Fewer workgroups than resident slots caps the count.
        let counted = occupancy_trial(&device, 3);
        assert!((1..=3).contains(&counted));
    }

    #[test]
    fn test_ticket_lock_without_jitter_counts_all_residents() {
        let device = SimDevice::with_config(
            SimConfig::new()
                .with_resident_workgroups(12)
                .with_arrivals(0, 0),
        );
        assert_eq!(occupancy_trial(&device, 100), 12);
    }

    #[test]
    fn test_same_seed_same_arrivals() {
        let config = SimConfig::new().with_resident_workgroups(16).with_seed(7);
        let a = SimDevice::with_config(config.clone());
        let b = SimDevice::with_config(config);
        for _ in 0..5 {
            assert_eq!(occupancy_trial(&a, 64), occupancy_trial(&b, 64));
        }
    }
}
