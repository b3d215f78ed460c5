use std::fmt::{Debug, Formatter};

use thiserror::Error;

use crate::problem::travel_matrix::{FixSizedTravelMatrix, TravelMatrix};
use crate::problem::{Demand, Distance};

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    /// 1-based identifier as used in the instance file
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub demand: Demand,
}

#[derive(Debug, Error, PartialEq)]
pub enum InstanceError {
    #[error("instance has no nodes")]
    Empty,
    #[error("depot index {depot} out of range for {num_nodes} nodes")]
    DepotOutOfRange { depot: usize, num_nodes: usize },
    #[error("depot (node {id}) has demand {demand}, expected 0")]
    DepotDemand { id: usize, demand: Demand },
    #[error("node {id} has demand {demand} exceeding the vehicle capacity {capacity}")]
    DemandExceedsCapacity {
        id: usize,
        demand: Demand,
        capacity: f64,
    },
    #[error("capacity must be positive, got {0}")]
    NonPositiveCapacity(f64),
    #[error("travel matrix covers {matrix} nodes, instance has {nodes}")]
    MatrixSizeMismatch { matrix: usize, nodes: usize },
}

pub struct CVRPInstance {
    pub name: String,
    pub capacity: f64,
    pub nodes: Vec<Node>,
    pub depot: usize,
    pub(crate) travel_matrix: FixSizedTravelMatrix,
}

impl Debug for CVRPInstance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "CVRP instance {}:", self.name)
            .and(writeln!(
                f,
                "{} nodes, depot {}, capacity {}",
                self.nodes.len(),
                self.nodes[self.depot].id,
                self.capacity
            ))
            .and(write!(f, "customers: {:?}", self.iter_customers().collect::<Vec<&Node>>()))
    }
}

/// Creates a validated instance. Fails if the depot carries demand or a single customer
/// could never be served by one vehicle.
pub fn create_instance_with(
    name: impl Into<String>,
    capacity: f64,
    nodes: Vec<Node>,
    depot: usize,
    travel_matrix: FixSizedTravelMatrix,
) -> Result<CVRPInstance, InstanceError> {
    if nodes.is_empty() {
        return Err(InstanceError::Empty);
    }
    if depot >= nodes.len() {
        return Err(InstanceError::DepotOutOfRange {
            depot,
            num_nodes: nodes.len(),
        });
    }
    if !(capacity > 0.0) {
        return Err(InstanceError::NonPositiveCapacity(capacity));
    }
    if travel_matrix.num_nodes() != nodes.len() {
        return Err(InstanceError::MatrixSizeMismatch {
            matrix: travel_matrix.num_nodes(),
            nodes: nodes.len(),
        });
    }
    if nodes[depot].demand != 0 {
        return Err(InstanceError::DepotDemand {
            id: nodes[depot].id,
            demand: nodes[depot].demand,
        });
    }
    if let Some(node) = nodes.iter().find(|it| it.demand as f64 > capacity) {
        return Err(InstanceError::DemandExceedsCapacity {
            id: node.id,
            demand: node.demand,
            capacity,
        });
    }

    Ok(CVRPInstance {
        name: name.into(),
        capacity,
        nodes,
        depot,
        travel_matrix,
    })
}

impl CVRPInstance {
    pub fn dimension(&self) -> usize {
        self.nodes.len()
    }
    pub fn num_customers(&self) -> usize {
        self.nodes.len() - 1
    }
    pub fn distance(&self, from: usize, to: usize) -> Distance {
        self.travel_matrix.distance(from, to)
    }
    pub fn demand(&self, node: usize) -> Demand {
        self.nodes[node].demand
    }
    pub fn is_depot(&self, node: usize) -> bool {
        node == self.depot
    }
    pub fn travel_matrix(&self) -> &FixSizedTravelMatrix {
        &self.travel_matrix
    }
    /// indices of all non-depot nodes in ascending order
    pub fn customers(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.nodes.len()).filter(move |it| *it != self.depot)
    }
    pub fn iter_customers(&self) -> impl Iterator<Item = &Node> {
        self.nodes
            .iter()
            .enumerate()
            .filter(move |(idx, _)| *idx != self.depot)
            .map(|(_, node)| node)
    }
    pub fn total_demand(&self) -> u64 {
        self.nodes.iter().map(|it| it.demand as u64).sum()
    }
    /// ⌈total demand / Q⌉, at least one vehicle
    pub fn fleet_lower_bound(&self) -> usize {
        ((self.total_demand() as f64 / self.capacity).ceil() as usize).max(1)
    }
    /// Sum of arc distances along a node sequence.
    pub fn path_distance(&self, path: &[usize]) -> Distance {
        path.windows(2).map(|arc| self.distance(arc[0], arc[1])).sum()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::problem::travel_matrix::RoundingMode;

    /// Builds an instance from `(x, y, demand)` triples, the first one being the depot.
    pub(crate) fn instance_from(
        name: &str,
        capacity: f64,
        data: &[(f64, f64, Demand)],
    ) -> CVRPInstance {
        let nodes: Vec<Node> = data
            .iter()
            .enumerate()
            .map(|(idx, (x, y, demand))| Node {
                id: idx + 1,
                x: *x,
                y: *y,
                demand: *demand,
            })
            .collect();
        let coords: Vec<(f64, f64)> = nodes.iter().map(|it| (it.x, it.y)).collect();
        let matrix = FixSizedTravelMatrix::with_euclidean_distances(&coords, RoundingMode::HalfEven);
        create_instance_with(name, capacity, nodes, 0, matrix).expect("valid test instance")
    }

    /// depot at the origin and three customers on the corners of a 10x10 square
    pub(crate) fn square_instance() -> CVRPInstance {
        instance_from(
            "square",
            10.0,
            &[(0.0, 0.0, 0), (10.0, 0.0, 5), (10.0, 10.0, 5), (0.0, 10.0, 5)],
        )
    }

    #[test]
    fn derived_values() {
        let instance = square_instance();
        assert_eq!(instance.dimension(), 4);
        assert_eq!(instance.num_customers(), 3);
        assert_eq!(instance.customers().collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(instance.total_demand(), 15);
        assert_eq!(instance.fleet_lower_bound(), 2);
        assert_eq!(instance.distance(0, 2), 14);
        assert_eq!(instance.path_distance(&[0, 1, 2, 0]), 10 + 10 + 14);
    }

    #[test]
    fn customers_skip_depot_anywhere() -> anyhow::Result<()> {
        let nodes = vec![
            Node { id: 1, x: 0.0, y: 0.0, demand: 3 },
            Node { id: 2, x: 1.0, y: 0.0, demand: 0 },
            Node { id: 3, x: 2.0, y: 0.0, demand: 4 },
        ];
        let coords: Vec<(f64, f64)> = nodes.iter().map(|it| (it.x, it.y)).collect();
        let matrix = FixSizedTravelMatrix::with_euclidean_distances(&coords, RoundingMode::HalfUp);
        let instance = create_instance_with("middle-depot", 5.0, nodes, 1, matrix)?;
        assert_eq!(instance.customers().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(instance.iter_customers().map(|it| it.id).collect::<Vec<_>>(), vec![1, 3]);
        Ok(())
    }

    #[test]
    fn rejects_invalid_instances() {
        let matrix = |n: usize| {
            FixSizedTravelMatrix::with_euclidean_distances(&vec![(0.0, 0.0); n], RoundingMode::HalfEven)
        };
        let node = |id: usize, demand: Demand| Node { id, x: 0.0, y: 0.0, demand };

        assert_eq!(
            create_instance_with("a", 10.0, vec![node(1, 1), node(2, 3)], 0, matrix(2)).err(),
            Some(InstanceError::DepotDemand { id: 1, demand: 1 })
        );
        assert_eq!(
            create_instance_with("b", 10.0, vec![node(1, 0), node(2, 11)], 0, matrix(2)).err(),
            Some(InstanceError::DemandExceedsCapacity { id: 2, demand: 11, capacity: 10.0 })
        );
        assert_eq!(
            create_instance_with("c", 0.0, vec![node(1, 0)], 0, matrix(1)).err(),
            Some(InstanceError::NonPositiveCapacity(0.0))
        );
        assert_eq!(
            create_instance_with("d", 1.0, vec![node(1, 0)], 3, matrix(1)).err(),
            Some(InstanceError::DepotOutOfRange { depot: 3, num_nodes: 1 })
        );
        assert_eq!(
            create_instance_with("e", 1.0, vec![node(1, 0)], 0, matrix(2)).err(),
            Some(InstanceError::MatrixSizeMismatch { matrix: 2, nodes: 1 })
        );
    }
}
