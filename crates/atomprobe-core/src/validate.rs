//! Correctness check for the RMW result buffer.

use crate::pattern::AccessPattern;

/// Outcome of comparing a result buffer against the expected counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Targeted slots inspected.
    pub checked: usize,
    /// Targeted slots whose value differs from the expected count.
    pub mismatches: usize,
    /// Non-zero slots between targets (writes that landed off-pattern).
    pub stray: usize,
}

impl ValidationReport {
    /// Mismatching slot count; zero means every RMW was accounted for.
    pub fn error_count(&self) -> usize {
        self.mismatches
    }

    /// True when no mismatches and no stray writes were found.
    pub fn is_clean(&self) -> bool {
        self.mismatches == 0 && self.stray == 0
    }
}

/// Expected-value oracle for one run of the contention kernel.
///
/// Each of the `contention` threads sharing a slot adds `rmw_iters` to it, so
/// a slot must read `rmw_iters * contention` after `runs` cleared-then-run
/// passes with `runs == 1`. Passing `runs > 1` models a buffer accumulated
/// across runs without clearing.
#[derive(Debug, Clone, Copy)]
pub struct ResultValidator {
    pattern: AccessPattern,
    rmw_iters: u32,
    runs: u32,
}

impl ResultValidator {
    /// Validator for a buffer cleared before the final run.
    pub fn new(pattern: AccessPattern, rmw_iters: u32) -> Self {
        Self::accumulated(pattern, rmw_iters, 1)
    }

    /// Validator for a buffer accumulated across `runs` runs.
    pub fn accumulated(pattern: AccessPattern, rmw_iters: u32, runs: u32) -> Self {
        Self {
            pattern,
            rmw_iters,
            runs,
        }
    }

    /// Value every full group's slot must hold.
    pub fn expected_full(&self) -> u32 {
        self.expected_for(self.pattern.contention())
    }

    fn expected_for(&self, threads: u32) -> u32 {
        self.rmw_iters
            .wrapping_mul(self.runs)
            .wrapping_mul(threads)
    }

    /// Value slot `slot` must hold (zero for off-pattern slots).
    pub fn expected_at(&self, slot: usize) -> u32 {
        let padding = self.pattern.padding() as usize;
        if slot % padding != 0 {
            return 0;
        }
        let group = (slot / padding) as u32;
        self.expected_for(self.pattern.threads_in_group(group))
    }

    /// Compare `result` against the expected counts.
    pub fn validate(&self, result: &[u32]) -> ValidationReport {
        let padding = self.pattern.padding() as usize;
        let mut report = ValidationReport::default();

        for (slot, &observed) in result.iter().enumerate() {
            if slot % padding == 0 {
                report.checked += 1;
                if observed != self.expected_at(slot) {
                    report.mismatches += 1;
                }
            } else if observed != 0 {
                report.stray += 1;
            }
        }

        if report.mismatches > 0 {
            tracing::debug!(
                mismatches = report.mismatches,
                checked = report.checked,
                expected = self.expected_full(),
                "result buffer mismatch"
            );
        }

        report
    }
}
