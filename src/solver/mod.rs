use std::time::Duration;

use derive_builder::Builder;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use took::{Timer, Took};

use crate::config::DEFAULT_TIME_LIMIT_IN_SECONDS;
use crate::model::milp::MilpModel;
use crate::model::{build_model, CVRPModel, FormulationOptions};
use crate::problem::cvrp::CVRPInstance;
use crate::solution::decoder::{decode_routes, detached_arcs};
use crate::solution::{CvrpOutcome, CvrpSolution, SolutionQuality};
use crate::utils::validator::{validate_routes, ValidatorResult};

#[cfg(feature = "use-grb")]
pub mod grb_backend;
pub mod microlp_backend;

#[cfg(feature = "use-grb")]
pub use grb_backend::GurobiSolver;
pub use microlp_backend::MicroLpSolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SolveStatus {
    /// proven optimal
    Optimal,
    /// stopped early with an incumbent, no optimality proof
    Feasible,
    Infeasible,
    /// time limit reached, an incumbent may or may not exist
    TimeLimit,
}

#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct SolveParams {
    #[builder(default = "Some(Duration::from_secs(DEFAULT_TIME_LIMIT_IN_SECONDS))")]
    pub time_limit: Option<Duration>,
    #[builder(default = "false")]
    pub verbose: bool,
    #[builder(default)]
    pub threads: Option<usize>,
}

impl Default for SolveParams {
    fn default() -> Self {
        Self {
            time_limit: Some(Duration::from_secs(DEFAULT_TIME_LIMIT_IN_SECONDS)),
            verbose: false,
            threads: None,
        }
    }
}

/// What a backend hands back: one value per model variable (same index) if it has any.
#[derive(Debug, Clone)]
pub struct SolverResponse {
    pub status: SolveStatus,
    pub objective_value: Option<f64>,
    pub values: Option<Vec<f64>>,
}

impl SolverResponse {
    pub fn infeasible() -> Self {
        Self {
            status: SolveStatus::Infeasible,
            objective_value: None,
            values: None,
        }
    }
    pub fn time_limit_without_solution() -> Self {
        Self {
            status: SolveStatus::TimeLimit,
            objective_value: None,
            values: None,
        }
    }
}

/// A complete variable assignment returned by a solver.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub status: SolveStatus,
    pub objective: Option<f64>,
    pub values: Vec<f64>,
}

pub trait MilpSolver {
    fn name(&self) -> &'static str;
    fn solve(&self, model: &MilpModel, params: &SolveParams) -> anyhow::Result<SolverResponse>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolverBackend {
    #[default]
    Microlp,
    Gurobi,
}

impl SolverBackend {
    pub fn create(&self) -> anyhow::Result<Box<dyn MilpSolver>> {
        match self {
            SolverBackend::Microlp => Ok(Box::new(MicroLpSolver)),
            #[cfg(feature = "use-grb")]
            SolverBackend::Gurobi => Ok(Box::new(GurobiSolver)),
            #[cfg(not(feature = "use-grb"))]
            SolverBackend::Gurobi => Err(anyhow::Error::msg(
                "this executable was build without gurobi support -- recompile with 'use-grb' to enable.",
            )),
        }
    }
}

pub struct SolverResult {
    pub outcome: CvrpOutcome,
    pub time: Took,
}

/// Builds the model for `num_vehicles`, solves it and decodes the routes.
///
/// Infeasibility and a time limit without incumbent are outcomes, not errors. Solver failures,
/// undecodable assignments and routes breaking the instance constraints are errors.
pub fn solve_cvrp(
    instance: &CVRPInstance,
    num_vehicles: usize,
    options: &FormulationOptions,
    solver: &dyn MilpSolver,
    params: &SolveParams,
) -> anyhow::Result<SolverResult> {
    let timer = Timer::new();
    let model = build_model(instance, num_vehicles, options)?;
    info!("model built after {}", timer.took());

    info!("starting solver {} ({:?})", solver.name(), params);
    let response = solver.solve(&model.lp, params)?;
    info!(
        "solver finished with status {:?} after {}",
        response.status,
        timer.took()
    );

    let outcome = match (response.status, response.values) {
        (SolveStatus::Infeasible, _) => CvrpOutcome::Infeasible,
        (SolveStatus::TimeLimit, None) => CvrpOutcome::TimeLimitReached,
        (status, Some(values)) => {
            let assignment = Assignment {
                status,
                objective: response.objective_value,
                values,
            };
            CvrpOutcome::Solved(decode_solution(instance, &model, &assignment)?)
        }
        (status, None) => anyhow::bail!("solver reported {:?} without an assignment", status),
    };

    Ok(SolverResult {
        outcome,
        time: timer.took(),
    })
}

pub fn decode_solution(
    instance: &CVRPInstance,
    model: &CVRPModel,
    assignment: &Assignment,
) -> anyhow::Result<CvrpSolution> {
    let routes = decode_routes(model, assignment)?;
    let detached = detached_arcs(model, assignment, &routes);
    if !detached.is_empty() {
        warn!(
            "{} selected arcs are not on any route: {:?}",
            detached.len(),
            detached
        );
    }
    let objective = assignment
        .objective
        .unwrap_or_else(|| model.lp.objective_value(&assignment.values));

    let total_distance = match validate_routes(instance, &routes, Some(objective)) {
        ValidatorResult::Valid(distance) => distance,
        ValidatorResult::ObjectiveMismatch(distance) => {
            warn!(
                "decoded routes cost {} but the solver objective is {}",
                distance, objective
            );
            distance
        }
        ValidatorResult::ConstraintViolation(violation) => {
            anyhow::bail!("decoded routes are not a valid CVRP solution: {:?}", violation)
        }
    };

    let quality = match assignment.status {
        SolveStatus::Optimal => SolutionQuality::Optimal,
        _ => SolutionQuality::Suboptimal,
    };

    Ok(CvrpSolution {
        routes,
        objective,
        total_distance,
        quality,
        num_vehicles: model.num_vehicles,
    })
}
