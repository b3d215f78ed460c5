use fixedbitset::FixedBitSet;

use crate::problem::cvrp::CVRPInstance;
use crate::problem::Distance;
use crate::solution::Route;
use crate::utils::Tolerance;

#[derive(Debug, PartialEq)]
pub enum Violation {
    /// route of the vehicle does not start and end at the depot
    DepotEndpoints { vehicle: usize },
    MissingCustomer(usize),
    DuplicateCustomer(usize),
    Capacity { vehicle: usize, excess: f64 },
}

#[derive(Debug, PartialEq)]
pub enum ValidatorResult {
    Valid(Distance),
    ConstraintViolation(Violation),
    ObjectiveMismatch(Distance),
}

impl ValidatorResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn assert_valid(&self) {
        match self {
            Self::Valid(_) => {}
            Self::ConstraintViolation(violation) => {
                assert!(false, "{:?}", violation)
            }
            Self::ObjectiveMismatch(distance) => {
                assert!(false, "ObjectiveMismatch({})", distance)
            }
        }
    }
}

pub fn validate_route(instance: &CVRPInstance, route: &Route) -> Result<Distance, Violation> {
    if route.nodes.len() < 2
        || !instance.is_depot(route.nodes[0])
        || !instance.is_depot(route.nodes[route.nodes.len() - 1])
        || route.customers().iter().any(|it| instance.is_depot(*it))
    {
        return Err(Violation::DepotEndpoints {
            vehicle: route.vehicle,
        });
    }

    let load = route.demand(instance) as f64;
    if load > instance.capacity {
        return Err(Violation::Capacity {
            vehicle: route.vehicle,
            excess: load - instance.capacity,
        });
    }
    Ok(route.distance(instance))
}

/// Checks that the routes serve every customer once within capacity. A given objective has to
/// match the recomputed distance up to the float tolerance.
pub fn validate_routes(
    instance: &CVRPInstance,
    routes: &[Route],
    objective: Option<f64>,
) -> ValidatorResult {
    use ValidatorResult::*;

    let mut served = FixedBitSet::with_capacity(instance.dimension());
    let mut total_distance: Distance = 0;
    for route in routes {
        match validate_route(instance, route) {
            Ok(distance) => total_distance += distance,
            Err(violation) => return ConstraintViolation(violation),
        }
        for customer in route.customers() {
            if served.put(*customer) {
                return ConstraintViolation(Violation::DuplicateCustomer(instance.nodes[*customer].id));
            }
        }
    }

    if let Some(missing) = instance.customers().find(|it| !served.contains(*it)) {
        return ConstraintViolation(Violation::MissingCustomer(instance.nodes[missing].id));
    }

    match objective {
        Some(objective) if (total_distance as f64 - objective).abs() > f64::tol() => {
            ObjectiveMismatch(total_distance)
        }
        _ => Valid(total_distance),
    }
}
