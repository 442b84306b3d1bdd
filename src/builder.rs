//! Builder API for initial resource states.

use crate::config::SystemConfig;
use crate::error::BuildError;
use crate::state::{Process, ProcessId, ResourceState, Units};

#[derive(Debug, Clone)]
struct ProcessRow {
    max: Vec<Units>,
    allocation: Vec<Units>,
    priority: u32,
}

/// Builds a [`ResourceState`] from totals and a Max/Allocation matrix.
///
/// `available` is derived as `total - Σ allocation`, so conservation holds
/// by construction.
#[derive(Debug, Clone)]
pub struct SystemBuilder {
    total: Vec<Units>,
    processes: Vec<ProcessRow>,
}

impl SystemBuilder {
    /// Start from the fixed per-type capacity.
    pub fn new(total: Vec<Units>) -> Self {
        Self {
            total,
            processes: Vec::new(),
        }
    }

    /// Add a process with its declared maximum and current allocation.
    pub fn process(mut self, max: Vec<Units>, allocation: Vec<Units>, priority: u32) -> Self {
        self.processes.push(ProcessRow {
            max,
            allocation,
            priority,
        });
        self
    }

    /// Add a process holding nothing.
    pub fn idle_process(self, max: Vec<Units>, priority: u32) -> Self {
        let allocation = vec![0; max.len()];
        self.process(max, allocation, priority)
    }

    /// Validate and build.
    pub fn build(self) -> Result<ResourceState, BuildError> {
        let m = self.total.len();
        if self.total.iter().any(|&t| t < 0) {
            return Err(BuildError::NegativeValue { what: "total" });
        }

        let mut allocated = vec![0i128; m];
        let mut processes = Vec::with_capacity(self.processes.len());
        for (index, row) in self.processes.into_iter().enumerate() {
            for v in [&row.max, &row.allocation] {
                if v.len() != m {
                    return Err(BuildError::LengthMismatch {
                        index,
                        expected: m,
                        got: v.len(),
                    });
                }
            }
            if row.max.iter().any(|&v| v < 0) {
                return Err(BuildError::NegativeValue { what: "max" });
            }
            if row.allocation.iter().any(|&v| v < 0) {
                return Err(BuildError::NegativeValue { what: "allocation" });
            }
            if let Some(resource) = (0..m).find(|&j| row.allocation[j] > row.max[j]) {
                return Err(BuildError::AllocationExceedsMax { index, resource });
            }

            for (sum, &held) in allocated.iter_mut().zip(&row.allocation) {
                *sum += i128::from(held);
            }
            let mut process = Process::new(ProcessId(index), row.max, row.priority);
            for (j, held) in row.allocation.into_iter().enumerate() {
                process.allocation[j] = held;
                process.need[j] = process.max[j] - held;
            }
            processes.push(process);
        }

        if let Some(resource) = (0..m).find(|&j| allocated[j] > i128::from(self.total[j])) {
            return Err(BuildError::OverAllocated {
                resource,
                allocated: Units::try_from(allocated[resource]).unwrap_or(Units::MAX),
                total: self.total[resource],
            });
        }
        // Each sum is now within [0, total], so it fits back into Units.
        let available = self
            .total
            .iter()
            .zip(&allocated)
            .map(|(&t, &sum)| t - Units::try_from(sum).unwrap_or(t))
            .collect();

        Ok(ResourceState::from_parts(self.total, available, processes))
    }
}

impl ResourceState {
    /// Default initial state: `config.processes` idle processes, each with
    /// a uniform ceiling and a random priority from the configured range.
    pub fn from_config(config: &SystemConfig, rng: &mut fastrand::Rng) -> Self {
        let total = vec![config.units_per_type; config.resource_types];
        let mut state = ResourceState::new(total);
        for _ in 0..config.processes {
            let priority = rng.u32(config.min_priority..=config.max_priority);
            let process = state.push_process(config.process_max, priority);
            process.cpu_usage = sample_cpu_usage(rng);
        }
        state
    }
}

/// CPU-usage sample in `[0.10, 0.60)`.
pub(crate) fn sample_cpu_usage(rng: &mut fastrand::Rng) -> f64 {
    f64::from(rng.u32(10..60)) / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_derives_available() {
        let state = SystemBuilder::new(vec![5, 5])
            .process(vec![3, 3], vec![1, 2], 1)
            .idle_process(vec![2, 2], 2)
            .build()
            .unwrap();
        assert_eq!(state.available(), &[4, 3]);
        assert!(state.is_conserved());
        assert!(state.is_feasible());
        assert_eq!(state.process(ProcessId(0)).unwrap().need, vec![2, 1]);
    }

    #[test]
    fn builder_rejects_overallocation() {
        let err = SystemBuilder::new(vec![2])
            .process(vec![2], vec![2], 1)
            .process(vec![1], vec![1], 1)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::OverAllocated {
                resource: 0,
                allocated: 3,
                total: 2
            }
        );
    }

    #[test]
    fn builder_rejects_overallocation_near_max_units() {
        let err = SystemBuilder::new(vec![Units::MAX])
            .process(vec![Units::MAX], vec![Units::MAX], 1)
            .process(vec![Units::MAX], vec![Units::MAX], 1)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::OverAllocated {
                resource: 0,
                allocated: Units::MAX,
                total: Units::MAX
            }
        );
    }

    #[test]
    fn builder_accepts_full_allocation_at_max_units() {
        let state = SystemBuilder::new(vec![Units::MAX])
            .process(vec![Units::MAX], vec![Units::MAX], 1)
            .build()
            .unwrap();
        assert_eq!(state.available(), &[0]);
        assert!(state.is_conserved());
    }

    #[test]
    fn builder_rejects_allocation_above_max() {
        let err = SystemBuilder::new(vec![5])
            .process(vec![1], vec![2], 1)
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::AllocationExceedsMax {
                index: 0,
                resource: 0
            }
        );
    }

    #[test]
    fn builder_rejects_length_mismatch() {
        let err = SystemBuilder::new(vec![5, 5])
            .process(vec![1], vec![0], 1)
            .build()
            .unwrap_err();
        assert!(matches!(err, BuildError::LengthMismatch { index: 0, .. }));
    }

    #[test]
    fn from_config_matches_defaults() {
        let config = SystemConfig::default();
        let mut rng = fastrand::Rng::with_seed(7);
        let state = ResourceState::from_config(&config, &mut rng);
        assert_eq!(state.processes().len(), 5);
        assert_eq!(state.total(), &[10, 10, 10, 10]);
        for p in state.processes() {
            assert_eq!(p.max, vec![5; 4]);
            assert!((1..=5).contains(&p.priority));
            assert!(p.cpu_usage >= 0.1 && p.cpu_usage < 0.6);
        }
    }
}
