use itertools::Itertools;
use took::Took;

use crate::problem::cvrp::CVRPInstance;
use crate::solution::{CvrpOutcome, CvrpSolution, Route};

pub fn format_log_outcome_timed(method: &str, outcome: &CvrpOutcome, took: &Took) -> String {
    match outcome {
        CvrpOutcome::Solved(solution) => {
            format!("{method} - {}, took: {took}", format_log_solution(solution))
        }
        _ => format!("{method} - {}, took: {took}", outcome.label()),
    }
}

/// `<vehicles used>/<vehicles>/<distance> (<quality>)`
pub fn format_log_solution(sol: &CvrpSolution) -> String {
    format!(
        "{}/{}/{} ({:?})",
        sol.number_of_vehicles_used(),
        sol.num_vehicles,
        sol.total_distance,
        sol.quality,
    )
}

pub fn format_log_route(route: &Route, instance: &CVRPInstance) -> String {
    format!(
        "vehicle {}: [{}] (load {}/{}, distance {})",
        route.vehicle,
        route.customer_ids(instance).iter().join(", "),
        route.demand(instance),
        instance.capacity,
        route.distance(instance),
    )
}

#[cfg(test)]
mod tests {
    use crate::problem::cvrp::tests::square_instance;
    use crate::solution::SolutionQuality;

    use super::*;

    #[test]
    fn formats() {
        let instance = square_instance();
        let route = Route {
            vehicle: 0,
            nodes: vec![0, 1, 2, 0],
        };
        assert_eq!(
            format_log_route(&route, &instance),
            "vehicle 0: [2, 3] (load 10/10, distance 34)"
        );
        let solution = CvrpSolution {
            routes: vec![route],
            objective: 34.0,
            total_distance: 34,
            quality: SolutionQuality::Optimal,
            num_vehicles: 2,
        };
        assert_eq!(format_log_solution(&solution), "1/2/34 (Optimal)");
    }
}
