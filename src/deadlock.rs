//! Deadlock detection over a process wait-for graph.
//!
//! A process is blocked on type `j` when it is active, `need[j] > 0` and
//! `need[j] > available[j]`. It then waits for every other active
//! process holding some of `j`. The graph says nothing about which holder
//! would actually satisfy the waiter, so a cycle here is an approximation:
//! it proves a circular dependency under this edge rule, not a circular
//! wait on specific resource units. A process never gets an edge to
//! itself, even when it holds part of a type it is blocked on.

#![forbid(unsafe_code)]

use crate::invariant_ppt::{assert_invariant, WAIT_GRAPH_ACTIVE_ONLY};
use crate::state::{ProcessId, ResourceState};

/// `waiter` is blocked on `resource`, which `holder` holds some of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitEdge {
    /// Blocked process.
    pub waiter: ProcessId,
    /// Process holding units of the resource.
    pub holder: ProcessId,
    /// Resource type index.
    pub resource: usize,
}

/// Process → process wait relation built from one state snapshot.
#[derive(Debug, Clone)]
pub struct WaitForGraph {
    /// Per process, the resource types it is blocked on.
    pub blocked_on: Vec<Vec<usize>>,
    /// All wait edges, ordered by waiter then resource then holder.
    pub edges: Vec<WaitEdge>,
    active: Vec<bool>,
    adjacency: Vec<Vec<ProcessId>>,
}

impl WaitForGraph {
    /// Build the graph from a snapshot. Completed processes get no edges.
    pub fn build(state: &ResourceState) -> Self {
        let n = state.processes().len();
        let available = state.available();
        let active: Vec<bool> = state.processes().iter().map(|p| p.is_active()).collect();

        let mut blocked_on = vec![Vec::new(); n];
        for p in state.processes().iter().filter(|p| p.is_active()) {
            blocked_on[p.id.0] = (0..state.resource_types())
                .filter(|&j| p.need[j] > 0 && p.need[j] > available[j])
                .collect();
        }

        let mut edges = Vec::new();
        let mut adjacency = vec![Vec::new(); n];
        for (i, resources) in blocked_on.iter().enumerate() {
            for &j in resources {
                for holder in state.processes() {
                    if holder.id.0 != i && holder.is_active() && holder.allocation[j] > 0 {
                        edges.push(WaitEdge {
                            waiter: ProcessId(i),
                            holder: holder.id,
                            resource: j,
                        });
                        if !adjacency[i].contains(&holder.id) {
                            adjacency[i].push(holder.id);
                        }
                    }
                }
            }
        }

        assert_invariant(
            WAIT_GRAPH_ACTIVE_ONLY,
            edges.iter().all(|e| active[e.waiter.0] && active[e.holder.0]),
            "Wait edges connect active processes only",
            Some("WaitForGraph::build"),
        );

        Self {
            blocked_on,
            edges,
            active,
            adjacency,
        }
    }

    /// Processes `pid` waits for, in first-edge order.
    pub fn waits_for(&self, pid: ProcessId) -> &[ProcessId] {
        self.adjacency.get(pid.0).map_or(&[], Vec::as_slice)
    }

    /// First cycle found by DFS from active processes in id order.
    ///
    /// The cycle lists the ids from the re-entered process to the one whose
    /// edge closed it; the closing edge back to the first id is implied.
    pub fn find_cycle(&self) -> Option<Vec<ProcessId>> {
        let n = self.adjacency.len();
        let mut visited = vec![false; n];
        let mut on_stack = vec![false; n];
        let mut path = Vec::new();
        for start in 0..n {
            if self.active[start] && !visited[start] {
                let cycle = self.dfs(ProcessId(start), &mut visited, &mut on_stack, &mut path);
                if cycle.is_some() {
                    return cycle;
                }
            }
        }
        None
    }

    fn dfs(
        &self,
        current: ProcessId,
        visited: &mut [bool],
        on_stack: &mut [bool],
        path: &mut Vec<ProcessId>,
    ) -> Option<Vec<ProcessId>> {
        visited[current.0] = true;
        on_stack[current.0] = true;
        path.push(current);

        for &next in &self.adjacency[current.0] {
            if on_stack[next.0] {
                let start = path.iter().position(|&p| p == next).unwrap_or(0);
                return Some(path[start..].to_vec());
            }
            if !visited[next.0] {
                if let Some(cycle) = self.dfs(next, visited, on_stack, path) {
                    return Some(cycle);
                }
            }
        }

        on_stack[current.0] = false;
        path.pop();
        None
    }
}

/// Result of a detection pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadlockReport {
    /// The first cycle found, if any.
    pub cycle: Option<Vec<ProcessId>>,
}

impl DeadlockReport {
    /// Whether a cycle was found.
    pub fn is_deadlocked(&self) -> bool {
        self.cycle.is_some()
    }
}

/// Detect a wait-for cycle in a snapshot. Never mutates.
pub fn detect(state: &ResourceState) -> DeadlockReport {
    let graph = WaitForGraph::build(state);
    let cycle = graph.find_cycle();
    tracing::debug!(edges = graph.edges.len(), cycle = ?cycle, "deadlock scan");
    DeadlockReport { cycle }
}

/// Lowest-priority member of a cycle, ties broken by lowest id.
pub fn select_victim(state: &ResourceState, cycle: &[ProcessId]) -> Option<ProcessId> {
    cycle
        .iter()
        .filter_map(|&pid| state.process(pid))
        .filter(|p| p.is_active())
        .min_by_key(|p| (p.priority, p.id))
        .map(|p| p.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::SystemBuilder;

    fn mutual_wait() -> ResourceState {
        SystemBuilder::new(vec![1, 1, 1, 1])
            .process(vec![1, 1, 1, 0], vec![1, 0, 1, 0], 2)
            .process(vec![1, 1, 0, 1], vec![0, 1, 0, 1], 1)
            .build()
            .unwrap()
    }

    #[test]
    fn deadlock_two_process_cycle() {
        let state = mutual_wait();
        assert_eq!(state.available(), &[0, 0, 0, 0]);
        let report = detect(&state);
        assert_eq!(report.cycle, Some(vec![ProcessId(0), ProcessId(1)]));
    }

    #[test]
    fn deadlock_edges_record_resource() {
        let graph = WaitForGraph::build(&mutual_wait());
        assert_eq!(graph.blocked_on[0], vec![1]);
        assert_eq!(graph.blocked_on[1], vec![0]);
        assert_eq!(
            graph.edges,
            vec![
                WaitEdge {
                    waiter: ProcessId(0),
                    holder: ProcessId(1),
                    resource: 1
                },
                WaitEdge {
                    waiter: ProcessId(1),
                    holder: ProcessId(0),
                    resource: 0
                },
            ]
        );
        assert_eq!(graph.waits_for(ProcessId(0)), &[ProcessId(1)]);
    }

    #[test]
    fn deadlock_free_when_needs_fit() {
        let state = SystemBuilder::new(vec![4, 4])
            .process(vec![2, 2], vec![1, 1], 1)
            .process(vec![2, 2], vec![1, 1], 1)
            .build()
            .unwrap();
        assert!(!detect(&state).is_deadlocked());
    }

    #[test]
    fn deadlock_ignores_completed_holders() {
        let mut state = mutual_wait();
        state.retire(ProcessId(1));
        assert!(!detect(&state).is_deadlocked());
    }

    #[test]
    fn deadlock_no_self_edges() {
        // Single process short of its own held type.
        let state = SystemBuilder::new(vec![2])
            .process(vec![3], vec![2], 1)
            .build()
            .unwrap();
        let graph = WaitForGraph::build(&state);
        assert_eq!(graph.blocked_on[0], vec![0]);
        assert!(graph.edges.is_empty());
        assert!(graph.find_cycle().is_none());
    }

    #[test]
    fn deadlock_three_cycle_trims_tail() {
        // P0 waits on P1 but is not part of the cycle P1 -> P2 -> P3 -> P1.
        let state = SystemBuilder::new(vec![1, 1, 1, 1])
            .idle_process(vec![0, 1, 0, 0], 1)
            .process(vec![0, 1, 1, 0], vec![0, 1, 0, 0], 1)
            .process(vec![0, 0, 1, 1], vec![0, 0, 1, 0], 1)
            .process(vec![0, 1, 0, 1], vec![0, 0, 0, 1], 1)
            .build()
            .unwrap();
        let report = detect(&state);
        assert_eq!(
            report.cycle,
            Some(vec![ProcessId(1), ProcessId(2), ProcessId(3)])
        );
    }

    #[test]
    fn victim_is_lowest_priority_member() {
        let state = mutual_wait();
        assert_eq!(
            select_victim(&state, &[ProcessId(0), ProcessId(1)]),
            Some(ProcessId(1))
        );
    }
}
