use grb::expr::LinExpr;
use log::{debug, info};

use crate::model::milp::{MilpModel, Sense, VarDomain};
use crate::solver::{MilpSolver, SolveParams, SolveStatus, SolverResponse};

/// Commercial backend, only available with the `use-grb` feature and a Gurobi installation.
pub struct GurobiSolver;

impl MilpSolver for GurobiSolver {
    fn name(&self) -> &'static str {
        "gurobi"
    }

    fn solve(&self, model: &MilpModel, params: &SolveParams) -> anyhow::Result<SolverResponse> {
        // generate environment first so we can disable all output
        let mut env = grb::Env::empty()?;
        env.set(grb::parameter::IntParam::OutputFlag, params.verbose.into())?;
        let env = env.start()?;

        let mut lp = grb::Model::with_env(model.name.as_str(), &env)?;
        if let Some(limit) = params.time_limit {
            lp.set_param(grb::parameter::DoubleParam::TimeLimit, limit.as_secs_f64())?;
        }
        if let Some(threads) = params.threads {
            lp.set_param(grb::parameter::IntParam::Threads, threads as i32)?;
        }

        let mut objective = vec![0.0; model.num_vars()];
        for (var, coeff) in &model.objective.terms {
            objective[var.0] += coeff;
        }

        let mut vars = Vec::with_capacity(model.num_vars());
        for (var, obj) in model.variables.iter().zip(objective) {
            let grb_var = match var.domain {
                VarDomain::Binary => grb::add_binvar!(lp, name: var.name.as_str(), obj: obj)?,
                VarDomain::Continuous => {
                    grb::add_ctsvar!(lp, name: var.name.as_str(), obj: obj, bounds: var.lb..var.ub)?
                }
            };
            vars.push(grb_var);
        }

        for constraint in &model.constraints {
            let mut expr = LinExpr::new();
            for (var, coeff) in &constraint.expr.terms {
                expr.add_term(*coeff, vars[var.0]);
            }
            let row = match constraint.sense {
                Sense::Le => grb::c!(expr <= constraint.rhs),
                Sense::Eq => grb::c!(expr == constraint.rhs),
                Sense::Ge => grb::c!(expr >= constraint.rhs),
            };
            lp.add_constr(constraint.name.as_str(), row)?;
        }

        lp.set_attr(grb::attr::ModelSense, grb::ModelSense::Minimize)?;
        lp.optimize()?;

        let num_solutions_found = lp.get_attr(grb::attr::SolCount)?;
        let status = match lp.status()? {
            grb::Status::Optimal => SolveStatus::Optimal,
            grb::Status::Infeasible | grb::Status::InfOrUnbd => SolveStatus::Infeasible,
            grb::Status::TimeLimit => SolveStatus::TimeLimit,
            grb::Status::Unbounded => anyhow::bail!("model {} is unbounded", model.name),
            other if num_solutions_found > 0 => {
                debug!("gurobi stopped with status {:?}, keeping the incumbent", other);
                SolveStatus::Feasible
            }
            other => anyhow::bail!("No solutions found (Status: {:?})", other),
        };
        info!(
            "gurobi finished {} with {:?} ({} solutions found)",
            model.name, status, num_solutions_found
        );

        if num_solutions_found == 0 || status == SolveStatus::Infeasible {
            return Ok(SolverResponse {
                status,
                objective_value: None,
                values: None,
            });
        }

        let objective_value = lp.get_attr(grb::attr::ObjVal)?;
        let values = vars
            .iter()
            .map(|var| lp.get_obj_attr(grb::attr::X, var))
            .collect::<Result<Vec<f64>, _>>()?;

        Ok(SolverResponse {
            status,
            objective_value: Some(objective_value),
            values: Some(values),
        })
    }
}
