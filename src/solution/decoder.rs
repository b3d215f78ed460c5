use fixedbitset::FixedBitSet;
use log::debug;
use thiserror::Error;

use crate::model::milp::VarId;
use crate::model::{CVRPModel, DepotDeparture, VarKey};
use crate::solution::Route;
use crate::solver::Assignment;

/// An arc counts as used when its value is strictly above this.
pub const ARC_SELECTION_THRESHOLD: f64 = 0.5;

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("assignment has {actual} values, model has {expected} variables")]
    ValueCountMismatch { expected: usize, actual: usize },
    #[error("vehicle {vehicle} does not leave the depot")]
    MissingDeparture { vehicle: usize },
    #[error("vehicle {vehicle} has no selected arc leaving node {node}")]
    DeadEnd { vehicle: usize, node: usize },
    #[error("vehicle {vehicle} has several selected arcs leaving node {node}: {candidates:?}")]
    AmbiguousSuccessor {
        vehicle: usize,
        node: usize,
        candidates: Vec<usize>,
    },
    #[error("vehicle {vehicle} returns to node {node} before reaching the depot")]
    Cycle { vehicle: usize, node: usize },
}

/// Follows the selected arcs of every vehicle from the depot until it returns.
///
/// Vehicles without a departure are skipped when the model allows idle vehicles. Arcs of a
/// vehicle that are not reachable from the depot are ignored here; the validator catches the
/// customers they leave uncovered.
pub fn decode_routes(model: &CVRPModel, assignment: &Assignment) -> Result<Vec<Route>, DecodeError> {
    if assignment.values.len() != model.lp.num_vars() {
        return Err(DecodeError::ValueCountMismatch {
            expected: model.lp.num_vars(),
            actual: assignment.values.len(),
        });
    }

    let mut routes = Vec::with_capacity(model.num_vehicles);
    for vehicle in 0..model.num_vehicles {
        match decode_vehicle(model, &assignment.values, vehicle)? {
            Some(route) => routes.push(route),
            None => debug!("vehicle {} stays at the depot", vehicle),
        }
    }
    Ok(routes)
}

/// Selected arcs that none of `routes` runs over, e.g. a cycle detached from the depot.
pub fn detached_arcs(model: &CVRPModel, assignment: &Assignment, routes: &[Route]) -> Vec<VarKey> {
    let mut on_route = FixedBitSet::with_capacity(model.num_arc_vars());
    for route in routes {
        for arc in route.nodes.windows(2) {
            on_route.insert(model.arc_var(route.vehicle, arc[0], arc[1]).0);
        }
    }
    (0..model.num_arc_vars())
        .filter(|idx| !on_route.contains(*idx))
        .filter(|idx| assignment.values.get(*idx).map_or(false, |it| *it > ARC_SELECTION_THRESHOLD))
        .filter_map(|idx| model.key(VarId(idx)))
        .collect()
}

fn decode_vehicle(
    model: &CVRPModel,
    values: &[f64],
    vehicle: usize,
) -> Result<Option<Route>, DecodeError> {
    let mut visited = FixedBitSet::with_capacity(model.num_nodes);
    let mut nodes = vec![model.depot];
    let mut current = model.depot;

    loop {
        match successor(model, values, vehicle, current)? {
            None if current == model.depot => {
                return match model.departure {
                    DepotDeparture::AtMost => Ok(None),
                    DepotDeparture::Exactly => Err(DecodeError::MissingDeparture { vehicle }),
                };
            }
            None => {
                return Err(DecodeError::DeadEnd {
                    vehicle,
                    node: current,
                })
            }
            Some(next) => {
                nodes.push(next);
                if next == model.depot {
                    return Ok(Some(Route { vehicle, nodes }));
                }
                if visited.put(next) {
                    return Err(DecodeError::Cycle {
                        vehicle,
                        node: next,
                    });
                }
                current = next;
            }
        }
    }
}

fn successor(
    model: &CVRPModel,
    values: &[f64],
    vehicle: usize,
    from: usize,
) -> Result<Option<usize>, DecodeError> {
    let candidates: Vec<usize> = (0..model.num_nodes)
        .filter(|to| *to != from)
        .filter(|to| values[model.arc_var(vehicle, from, *to).0] > ARC_SELECTION_THRESHOLD)
        .collect();
    match candidates.len() {
        0 => Ok(None),
        1 => Ok(Some(candidates[0])),
        _ => Err(DecodeError::AmbiguousSuccessor {
            vehicle,
            node: from,
            candidates,
        }),
    }
}

#[cfg(test)]
mod tests {
    use crate::model::tests::{values_for_routes, zero_demand_instance};
    use crate::model::{build_model, FormulationOptions};
    use crate::problem::cvrp::tests::square_instance;
    use crate::solver::SolveStatus;

    use super::*;

    fn assignment(values: Vec<f64>) -> Assignment {
        Assignment {
            status: SolveStatus::Optimal,
            objective: None,
            values,
        }
    }

    #[test]
    fn decodes_routes_in_vehicle_order() -> anyhow::Result<()> {
        let instance = square_instance();
        let model = build_model(&instance, 2, &FormulationOptions::default())?;
        let values = values_for_routes(&model, &instance, &[vec![0, 3, 0], vec![0, 2, 1, 0]]);

        let routes = decode_routes(&model, &assignment(values.clone()))?;
        assert_eq!(
            routes,
            vec![
                Route { vehicle: 0, nodes: vec![0, 3, 0] },
                Route { vehicle: 1, nodes: vec![0, 2, 1, 0] },
            ]
        );
        // decoding is a pure function of the assignment
        assert_eq!(decode_routes(&model, &assignment(values))?, routes);
        Ok(())
    }

    #[test]
    fn threshold_is_strict() -> anyhow::Result<()> {
        let instance = square_instance();
        let model = build_model(&instance, 1, &FormulationOptions::default())?;
        let mut values = values_for_routes(&model, &instance, &[vec![0, 1, 2, 3, 0]]);
        values[model.arc_var(0, 0, 1).0] = 0.9999;
        values[model.arc_var(0, 0, 3).0] = ARC_SELECTION_THRESHOLD;
        let routes = decode_routes(&model, &assignment(values))?;
        assert_eq!(routes[0].nodes, vec![0, 1, 2, 3, 0]);
        Ok(())
    }

    #[test]
    fn idle_vehicle_handling() -> anyhow::Result<()> {
        let instance = square_instance();
        let relaxed = FormulationOptions {
            departure: DepotDeparture::AtMost,
        };
        let model = build_model(&instance, 3, &relaxed)?;
        let values = values_for_routes(&model, &instance, &[vec![0, 1, 2, 3, 0]]);
        let routes = decode_routes(&model, &assignment(values))?;
        assert_eq!(routes.len(), 1);

        let model = build_model(&instance, 3, &FormulationOptions::default())?;
        let values = values_for_routes(&model, &instance, &[vec![0, 1, 2, 3, 0]]);
        assert_eq!(
            decode_routes(&model, &assignment(values)),
            Err(DecodeError::MissingDeparture { vehicle: 1 })
        );
        Ok(())
    }

    #[test]
    fn reports_arcs_off_the_routes() -> anyhow::Result<()> {
        let instance = zero_demand_instance();
        let model = build_model(&instance, 1, &FormulationOptions::default())?;
        let mut values = values_for_routes(&model, &instance, &[vec![0, 1, 0]]);
        let assignment_on_route = assignment(values.clone());
        values[model.arc_var(0, 2, 3).0] = 1.0;
        values[model.arc_var(0, 3, 2).0] = 1.0;
        let with_cycle = assignment(values);

        let routes = decode_routes(&model, &with_cycle)?;
        assert_eq!(routes, vec![Route { vehicle: 0, nodes: vec![0, 1, 0] }]);
        assert_eq!(
            detached_arcs(&model, &with_cycle, &routes),
            vec![
                VarKey::Arc { vehicle: 0, from: 2, to: 3 },
                VarKey::Arc { vehicle: 0, from: 3, to: 2 },
            ]
        );
        assert!(detached_arcs(&model, &assignment_on_route, &routes).is_empty());
        Ok(())
    }

    #[test]
    fn malformed_assignments() -> anyhow::Result<()> {
        let instance = square_instance();
        let model = build_model(&instance, 1, &FormulationOptions::default())?;

        assert_eq!(
            decode_routes(&model, &assignment(vec![0.0; 3])),
            Err(DecodeError::ValueCountMismatch {
                expected: model.lp.num_vars(),
                actual: 3
            })
        );

        let mut values = values_for_routes(&model, &instance, &[vec![0, 1, 2, 0]]);
        values[model.arc_var(0, 1, 3).0] = 1.0;
        assert_eq!(
            decode_routes(&model, &assignment(values)),
            Err(DecodeError::AmbiguousSuccessor {
                vehicle: 0,
                node: 1,
                candidates: vec![2, 3]
            })
        );

        let values = values_for_routes(&model, &instance, &[vec![0, 1, 2]]);
        assert_eq!(
            decode_routes(&model, &assignment(values)),
            Err(DecodeError::DeadEnd { vehicle: 0, node: 2 })
        );

        let values = values_for_routes(&model, &instance, &[vec![0, 1, 2, 3, 1]]);
        assert_eq!(
            decode_routes(&model, &assignment(values)),
            Err(DecodeError::Cycle { vehicle: 0, node: 1 })
        );
        Ok(())
    }
}
