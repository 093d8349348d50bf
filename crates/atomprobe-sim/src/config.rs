//! Simulated device parameters.

/// Faults the simulated device can inject.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimFault {
    /// Each thread's contribution is dropped with this probability, modeling
    /// a non-atomic read-modify-write race.
    LostUpdates {
        /// Per-thread drop probability in `[0, 1]`.
        rate: f64,
    },
    /// The occupancy kernel never increments its counter.
    StalledOccupancy,
    /// Every dispatch reports a zero duration.
    FrozenClock,
}

/// Linear cost model of one dispatch, in nanoseconds.
///
/// `duration = launch_overhead + total_ops * ns_per_op / lanes
///            + hottest_slot_ops * ns_per_contended_op`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingModel {
    /// Fixed cost of any dispatch.
    pub launch_overhead_ns: u64,
    /// Cost of one uncontended RMW.
    pub ns_per_op: f64,
    /// Parallel lanes the uncontended work spreads over.
    pub lanes: u32,
    /// Serialized cost per RMW on the most contended slot.
    pub ns_per_contended_op: f64,
}

impl Default for TimingModel {
    fn default() -> Self {
        Self {
            launch_overhead_ns: 5_000,
            ns_per_op: 1.0,
            lanes: 8,
            ns_per_contended_op: 0.5,
        }
    }
}

/// Configuration of a [`SimDevice`](crate::SimDevice).
#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    /// Reported device name.
    pub name: String,
    /// Maximum invocations per workgroup.
    pub max_workgroup_invocations: u32,
    /// Maximum workgroups per dispatch dimension.
    pub max_workgroups_per_dimension: u32,
    /// Workgroups the simulated scheduler keeps resident at once.
    pub resident_workgroups: u32,
    /// Seed of the arrival-jitter generator.
    pub seed: u64,
    /// Spread of first-wave arrival times, in scheduler ticks.
    pub arrival_jitter: u32,
    /// Ticks after the first arrival during which the poll stays open.
    pub poll_window: u32,
    /// Dispatch cost model.
    pub timing: TimingModel,
    /// Total words that may be live at once; `None` is unbounded.
    pub memory_words: Option<usize>,
    /// Fail the n-th allocation (1-based) with out-of-memory.
    pub fail_allocation: Option<u64>,
    /// Injected fault.
    pub fault: Option<SimFault>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            name: "Simulated GPU".to_string(),
            max_workgroup_invocations: 256,
            max_workgroups_per_dimension: 65_535,
            resident_workgroups: 32,
            seed: 0x5EED,
            arrival_jitter: 64,
            poll_window: 48,
            timing: TimingModel::default(),
            memory_words: None,
            fail_allocation: None,
            fault: None,
        }
    }
}

impl SimConfig {
    /// Defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the device name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the maximum workgroup size.
    pub fn with_max_workgroup_invocations(mut self, max: u32) -> Self {
        self.max_workgroup_invocations = max;
        self
    }

    /// Set the resident workgroup capacity.
    pub fn with_resident_workgroups(mut self, resident: u32) -> Self {
        self.resident_workgroups = resident;
        self
    }

    /// Set the jitter seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set arrival jitter and poll window, in ticks.
    pub fn with_arrivals(mut self, arrival_jitter: u32, poll_window: u32) -> Self {
        self.arrival_jitter = arrival_jitter;
        self.poll_window = poll_window;
        self
    }

    /// Set the timing model.
    pub fn with_timing(mut self, timing: TimingModel) -> Self {
        self.timing = timing;
        self
    }

    /// Bound live device memory.
    pub fn with_memory_words(mut self, words: usize) -> Self {
        self.memory_words = Some(words);
        self
    }

    /// Fail the `n`-th allocation.
    pub fn with_failing_allocation(mut self, n: u64) -> Self {
        self.fail_allocation = Some(n);
        self
    }

    /// Inject `fault`.
    pub fn with_fault(mut self, fault: SimFault) -> Self {
        self.fault = Some(fault);
        self
    }
}
