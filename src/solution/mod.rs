use serde::Serialize;

use crate::problem::cvrp::CVRPInstance;
use crate::problem::{Demand, Distance};

pub mod decoder;

/// Closed tour of one vehicle: starts and ends at the depot, customers in visiting order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub vehicle: usize,
    pub nodes: Vec<usize>,
}

impl Route {
    pub fn customers(&self) -> &[usize] {
        if self.nodes.len() < 2 {
            &[]
        } else {
            &self.nodes[1..self.nodes.len() - 1]
        }
    }
    pub fn demand(&self, instance: &CVRPInstance) -> Demand {
        self.customers().iter().map(|it| instance.demand(*it)).sum()
    }
    pub fn distance(&self, instance: &CVRPInstance) -> Distance {
        instance.path_distance(&self.nodes)
    }
    /// 1-based ids of the visited customers as used in the instance file
    pub fn customer_ids(&self, instance: &CVRPInstance) -> Vec<usize> {
        self.customers()
            .iter()
            .map(|it| instance.nodes[*it].id)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SolutionQuality {
    Optimal,
    Suboptimal,
}

#[derive(Debug, Clone)]
pub struct CvrpSolution {
    pub routes: Vec<Route>,
    /// objective reported by the solver
    pub objective: f64,
    /// distance of the decoded routes, recomputed from the instance
    pub total_distance: Distance,
    pub quality: SolutionQuality,
    pub num_vehicles: usize,
}

impl CvrpSolution {
    pub fn number_of_vehicles_used(&self) -> usize {
        self.routes.len()
    }
}

#[derive(Debug, Clone)]
pub enum CvrpOutcome {
    Solved(CvrpSolution),
    Infeasible,
    TimeLimitReached,
}

impl CvrpOutcome {
    pub fn solution(&self) -> Option<&CvrpSolution> {
        match self {
            CvrpOutcome::Solved(solution) => Some(solution),
            _ => None,
        }
    }
    pub fn label(&self) -> &'static str {
        match self {
            CvrpOutcome::Solved(CvrpSolution {
                quality: SolutionQuality::Optimal,
                ..
            }) => "optimal",
            CvrpOutcome::Solved(_) => "feasible",
            CvrpOutcome::Infeasible => "infeasible",
            CvrpOutcome::TimeLimitReached => "time-limit",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::problem::cvrp::tests::square_instance;

    use super::*;

    #[test]
    fn route_accessors() {
        let instance = square_instance();
        let route = Route {
            vehicle: 1,
            nodes: vec![0, 3, 2, 0],
        };
        assert_eq!(route.customers(), &[3, 2]);
        assert_eq!(route.customer_ids(&instance), vec![4, 3]);
        assert_eq!(route.demand(&instance), 10);
        assert_eq!(route.distance(&instance), 10 + 10 + 14);

        let empty = Route {
            vehicle: 0,
            nodes: vec![],
        };
        assert!(empty.customers().is_empty());
    }

    #[test]
    fn outcome_labels() {
        let solution = CvrpSolution {
            routes: vec![],
            objective: 0.0,
            total_distance: 0,
            quality: SolutionQuality::Suboptimal,
            num_vehicles: 1,
        };
        assert_eq!(CvrpOutcome::Solved(solution.clone()).label(), "feasible");
        assert!(CvrpOutcome::Solved(solution).solution().is_some());
        assert_eq!(CvrpOutcome::Infeasible.label(), "infeasible");
        assert!(CvrpOutcome::TimeLimitReached.solution().is_none());
    }
}
