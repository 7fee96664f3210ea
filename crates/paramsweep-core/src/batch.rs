//! Launch batch planning under a worker-unit budget.
//!
//! Batches bound how many worker units are claimed per launch group. They do
//! not bound how long launched processes overlap: the next batch starts as
//! soon as the previous one has been launched.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Indices of the cases launched together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Batch {
    pub index: usize,
    pub cases: Vec<usize>,
    /// Summed cost of the cases in this batch.
    pub cost: u32,
}

/// Greedily pack cases, in order, into batches whose summed cost stays within `budget`.
///
/// A case costing more than the budget on its own gets a batch to itself.
/// Without a budget everything lands in one batch.
pub fn plan_batches(costs: &[u32], budget: Option<u32>) -> Vec<Batch> {
    let mut batches: Vec<Batch> = Vec::new();
    let mut current = Batch {
        index: 0,
        cases: Vec::new(),
        cost: 0,
    };

    for (case, &cost) in costs.iter().enumerate() {
        if let Some(budget) = budget {
            if cost > budget {
                warn!(case, cost, budget, "Case exceeds the resource budget on its own");
            }
            let fits = current.cost.saturating_add(cost) <= budget;
            if !fits && !current.cases.is_empty() {
                let next = Batch {
                    index: current.index + 1,
                    cases: Vec::new(),
                    cost: 0,
                };
                batches.push(std::mem::replace(&mut current, next));
            }
        }
        current.cases.push(case);
        current.cost = current.cost.saturating_add(cost);
    }

    if !current.cases.is_empty() {
        batches.push(current);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(batches: &[Batch]) -> Vec<Vec<usize>> {
        batches.iter().map(|b| b.cases.clone()).collect()
    }

    #[test]
    fn test_no_budget_single_batch() {
        let batches = plan_batches(&[8, 8, 8], None);
        assert_eq!(members(&batches), vec![vec![0, 1, 2]]);
        assert_eq!(batches[0].cost, 24);
    }

    #[test]
    fn test_budget_packs_in_order() {
        // 64 cores, 8 per case: 8 cases per batch.
        let costs = vec![8; 9];
        let batches = plan_batches(&costs, Some(64));
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].cases, (0..8).collect::<Vec<_>>());
        assert_eq!(batches[1].cases, vec![8]);
        assert_eq!(batches[1].index, 1);
        assert!(batches.iter().all(|b| b.cost <= 64));
    }

    #[test]
    fn test_budget_uneven_costs() {
        let batches = plan_batches(&[5, 4, 3, 6, 1], Some(9));
        assert_eq!(members(&batches), vec![vec![0, 1], vec![2, 3], vec![4]]);
    }

    #[test]
    fn test_oversized_case_gets_own_batch() {
        let batches = plan_batches(&[2, 20, 2], Some(8));
        assert_eq!(members(&batches), vec![vec![0], vec![1], vec![2]]);
        assert_eq!(batches[1].cost, 20);
    }

    #[test]
    fn test_zero_cost_cases_share_batch() {
        let batches = plan_batches(&[0, 0, 0], Some(8));
        assert_eq!(members(&batches), vec![vec![0, 1, 2]]);
    }

    #[test]
    fn test_empty() {
        assert!(plan_batches(&[], Some(8)).is_empty());
    }
}
