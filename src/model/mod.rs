use log::{debug, info};
use serde::Deserialize;

use crate::model::milp::{ConstraintFamily, LinExpr, MilpModel, Sense, VarDomain, VarId};
use crate::problem::cvrp::CVRPInstance;
use crate::problem::Demand;

/// Increase of `y` at a customer without demand, so that every detached cycle still violates
/// a subtour-elimination row.
pub const ZERO_DEMAND_LOAD_STEP: f64 = 1.0;

/// Amount `y` grows by when the route enters a customer with `demand`.
pub fn load_step(demand: Demand) -> f64 {
    if demand == 0 {
        ZERO_DEMAND_LOAD_STEP
    } else {
        demand as f64
    }
}

pub mod milp;

/// How often each vehicle has to leave the depot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DepotDeparture {
    /// every vehicle leaves the depot exactly once; too many vehicles make the model infeasible
    #[default]
    Exactly,
    /// vehicles may stay at the depot; used vehicles come first
    AtMost,
}

#[derive(Debug, Clone, Default)]
pub struct FormulationOptions {
    pub departure: DepotDeparture,
}

/// Two-index-per-vehicle CVRP formulation with MTZ load variables.
///
/// Variable layout: `x[k,i,j]` at `(k * n + i) * n + j`, `y[i]` at `K * n * n + i`
/// with `n` the number of nodes (depot included) and `K` the number of vehicles.
#[derive(Debug, Clone)]
pub struct CVRPModel {
    pub lp: MilpModel,
    pub num_vehicles: usize,
    pub num_nodes: usize,
    pub depot: usize,
    pub departure: DepotDeparture,
}

/// Variable identity inside a [`CVRPModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKey {
    Arc { vehicle: usize, from: usize, to: usize },
    Load { node: usize },
}

impl CVRPModel {
    #[inline(always)]
    pub fn arc_var(&self, vehicle: usize, from: usize, to: usize) -> VarId {
        debug_assert!(vehicle < self.num_vehicles);
        debug_assert!(from < self.num_nodes && to < self.num_nodes);
        VarId((vehicle * self.num_nodes + from) * self.num_nodes + to)
    }

    #[inline(always)]
    pub fn load_var(&self, node: usize) -> VarId {
        debug_assert!(node < self.num_nodes);
        VarId(self.num_vehicles * self.num_nodes * self.num_nodes + node)
    }

    #[cfg(test)]
    pub fn var(&self, key: VarKey) -> VarId {
        match key {
            VarKey::Arc { vehicle, from, to } => self.arc_var(vehicle, from, to),
            VarKey::Load { node } => self.load_var(node),
        }
    }

    pub fn key(&self, var: VarId) -> Option<VarKey> {
        let n = self.num_nodes;
        let num_arcs = self.num_vehicles * n * n;
        if var.0 < num_arcs {
            Some(VarKey::Arc {
                vehicle: var.0 / (n * n),
                from: (var.0 / n) % n,
                to: var.0 % n,
            })
        } else if var.0 < num_arcs + n {
            Some(VarKey::Load {
                node: var.0 - num_arcs,
            })
        } else {
            None
        }
    }

    pub fn num_arc_vars(&self) -> usize {
        self.num_vehicles * self.num_nodes * self.num_nodes
    }

    fn customers(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.num_nodes).filter(move |it| *it != self.depot)
    }

    fn departure_expr(&self, vehicle: usize) -> LinExpr {
        self.customers()
            .map(|j| (self.arc_var(vehicle, self.depot, j), 1.0))
            .collect()
    }
}

pub fn build_model(
    instance: &CVRPInstance,
    num_vehicles: usize,
    options: &FormulationOptions,
) -> anyhow::Result<CVRPModel> {
    if num_vehicles == 0 {
        anyhow::bail!("at least one vehicle is required to build a model");
    }
    let n = instance.dimension();
    let depot = instance.depot;
    let capacity = instance.capacity;

    let mut model = CVRPModel {
        lp: MilpModel::new(format!("{}-k{}", instance.name, num_vehicles)),
        num_vehicles,
        num_nodes: n,
        depot,
        departure: options.departure,
    };

    // x[k,i,j], objective coefficients are the arc distances
    let mut objective = LinExpr::with_capacity(num_vehicles * n * n);
    for k in 0..num_vehicles {
        for i in 0..n {
            for j in 0..n {
                let var = model.lp.add_var(format!("x_{}_{}_{}", k, i, j), VarDomain::Binary, 0.0, 1.0);
                debug_assert_eq!(var, model.arc_var(k, i, j));
                let distance = instance.distance(i, j);
                if distance != 0 {
                    objective.add_term(distance as f64, var);
                }
            }
        }
    }
    model.lp.objective = objective;

    // y[i] is the load on arrival plus one step per zero-demand customer visited so far,
    // step[i] <= y[i] <= Q + steps of all zero-demand customers; the depot starts empty
    let zero_demand_customers = instance
        .customers()
        .filter(|it| instance.demand(*it) == 0)
        .count();
    let load_ub = capacity + ZERO_DEMAND_LOAD_STEP * zero_demand_customers as f64;
    if zero_demand_customers > 0 {
        debug!(
            "{} customers without demand, load bound raised to {}",
            zero_demand_customers, load_ub
        );
    }
    for i in 0..n {
        let (lb, ub) = if i == depot {
            (0.0, 0.0)
        } else {
            (load_step(instance.demand(i)), load_ub)
        };
        let var = model.lp.add_var(format!("y_{}", i), VarDomain::Continuous, lb, ub);
        debug_assert_eq!(var, model.load_var(i));
    }

    let customers: Vec<usize> = instance.customers().collect();

    // inflow equals outflow at every customer, per vehicle
    for k in 0..num_vehicles {
        for &h in &customers {
            let mut expr = LinExpr::with_capacity(2 * (n - 1));
            for i in (0..n).filter(|it| *it != h) {
                expr.add_term(1.0, model.arc_var(k, i, h));
                expr.add_term(-1.0, model.arc_var(k, h, i));
            }
            model.lp.add_constr(
                format!("flow_{}_{}", k, h),
                ConstraintFamily::FlowConservation,
                expr,
                Sense::Eq,
                0.0,
            );
        }
    }

    // every customer is left exactly once, by any vehicle
    for &i in &customers {
        let expr = (0..num_vehicles)
            .flat_map(|k| (0..n).map(move |j| (k, j)))
            .map(|(k, j)| (model.arc_var(k, i, j), 1.0))
            .collect();
        model.lp.add_constr(
            format!("cover_{}", i),
            ConstraintFamily::CustomerCoverage,
            expr,
            Sense::Eq,
            1.0,
        );
    }

    for i in 0..n {
        let expr = (0..num_vehicles)
            .map(|k| (model.arc_var(k, i, i), 1.0))
            .collect();
        model.lp.add_constr(
            format!("noloop_{}", i),
            ConstraintFamily::NoSelfLoop,
            expr,
            Sense::Eq,
            0.0,
        );
    }

    for k in 0..num_vehicles {
        let sense = match options.departure {
            DepotDeparture::Exactly => Sense::Eq,
            DepotDeparture::AtMost => Sense::Le,
        };
        let expr = model.departure_expr(k);
        model.lp.add_constr(
            format!("depart_{}", k),
            ConstraintFamily::DepotDeparture,
            expr,
            sense,
            1.0,
        );
    }

    // idle vehicles are the last ones, removes symmetric solutions
    if options.departure == DepotDeparture::AtMost {
        for k in 1..num_vehicles {
            let mut expr = model.departure_expr(k - 1);
            for (var, coeff) in model.departure_expr(k).terms {
                expr.add_term(-coeff, var);
            }
            model.lp.add_constr(
                format!("order_{}", k),
                ConstraintFamily::DepartureOrder,
                expr,
                Sense::Ge,
                0.0,
            );
        }
    }

    for k in 0..num_vehicles {
        let expr = (0..n)
            .flat_map(|i| customers.iter().map(move |&j| (i, j)))
            .filter(|(_, j)| instance.demand(*j) != 0)
            .map(|(i, j)| (model.arc_var(k, i, j), instance.demand(j) as f64))
            .collect();
        model.lp.add_constr(
            format!("capacity_{}", k),
            ConstraintFamily::Capacity,
            expr,
            Sense::Le,
            capacity,
        );
    }

    // y[j] - y[i] >= step[j] - M (1 - x[k,i,j])  <=>  y[j] - y[i] - M x[k,i,j] >= step[j] - M
    // with M the upper load bound
    for k in 0..num_vehicles {
        for i in 0..n {
            for &j in customers.iter().filter(|it| **it != i) {
                let mut expr = LinExpr::with_capacity(3);
                expr.add_term(1.0, model.load_var(j))
                    .add_term(-1.0, model.load_var(i))
                    .add_term(-load_ub, model.arc_var(k, i, j));
                model.lp.add_constr(
                    format!("mtz_{}_{}_{}", k, i, j),
                    ConstraintFamily::SubtourElimination,
                    expr,
                    Sense::Ge,
                    load_step(instance.demand(j)) - load_ub,
                );
            }
        }
    }

    info!(
        "model {}: {} variables ({} binary), {} constraints",
        model.lp.name,
        model.lp.num_vars(),
        model.lp.num_binaries(),
        model.lp.constraints.len()
    );
    for (family, count) in model.lp.rows_per_family() {
        debug!("  {:?}: {}", family, count);
    }

    Ok(model)
}
