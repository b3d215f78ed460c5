use std::time::Instant;

use log::{debug, info};
use microlp::{ComparisonOp, LinearExpr, OptimizationDirection, Problem, Solution, Variable};
use took::Timer;

use crate::model::milp::{MilpModel, Sense, VarDomain};
use crate::solver::{MilpSolver, SolveParams, SolveStatus, SolverResponse};

const INTEGRALITY_TOLERANCE: f64 = 1e-6;
const PRUNE_TOLERANCE: f64 = 1e-6;

/// Pure Rust backend, always available.
///
/// microlp only solves the linear relaxation here. Binaries are branched on by a depth first
/// search in the calling thread that checks the time limit between nodes, so an exhausted
/// limit returns the best integral assignment found so far.
pub struct MicroLpSolver;

impl MilpSolver for MicroLpSolver {
    fn name(&self) -> &'static str {
        "microlp"
    }

    fn solve(&self, model: &MilpModel, params: &SolveParams) -> anyhow::Result<SolverResponse> {
        solve_within(model, params, None)
    }
}

fn solve_within(
    model: &MilpModel,
    params: &SolveParams,
    max_nodes: Option<usize>,
) -> anyhow::Result<SolverResponse> {
    if let Some(threads) = params.threads {
        debug!("microlp is single threaded, ignoring threads = {}", threads);
    }
    let timer = Timer::new();
    let deadline = params
        .time_limit
        .and_then(|limit| Instant::now().checked_add(limit));

    let (problem, vars) = match relaxation(model) {
        Some(relaxation) => relaxation,
        None => return Ok(SolverResponse::infeasible()),
    };
    let root = match problem.solve() {
        Ok(root) => root,
        Err(microlp::Error::Infeasible) => return Ok(SolverResponse::infeasible()),
        Err(microlp::Error::Unbounded) => anyhow::bail!("model {} is unbounded", model.name),
        #[allow(unreachable_patterns)]
        Err(err) => anyhow::bail!("microlp failed on {}: {}", model.name, err),
    };
    if params.verbose {
        info!(
            "microlp: root relaxation of {} solved, bound {} after {}",
            model.name,
            root.objective(),
            timer.took()
        );
    }

    let mut search = Search {
        model,
        vars: &vars,
        deadline,
        max_nodes,
        verbose: params.verbose,
        incumbent: None,
        nodes: 0,
    };
    let completed = search.run(&root)?;

    let status = match (completed, &search.incumbent) {
        (true, Some(_)) => SolveStatus::Optimal,
        (true, None) => SolveStatus::Infeasible,
        (false, _) => SolveStatus::TimeLimit,
    };
    info!(
        "microlp: {:?} after {} nodes, took {}",
        status,
        search.nodes,
        timer.took()
    );

    Ok(match search.incumbent {
        Some(incumbent) if status != SolveStatus::Infeasible => SolverResponse {
            status,
            objective_value: Some(incumbent.objective),
            values: Some(incumbent.values),
        },
        _ => SolverResponse {
            status,
            objective_value: None,
            values: None,
        },
    })
}

/// Linear relaxation of `model`, `None` if a row without terms can never hold.
fn relaxation(model: &MilpModel) -> Option<(Problem, Vec<Variable>)> {
    let mut problem = Problem::new(OptimizationDirection::Minimize);

    let mut objective = vec![0.0; model.num_vars()];
    for (var, coeff) in &model.objective.terms {
        objective[var.0] += coeff;
    }
    let vars: Vec<Variable> = model
        .variables
        .iter()
        .zip(objective)
        .map(|(var, obj)| problem.add_var(obj, (var.lb, var.ub)))
        .collect();

    for constraint in &model.constraints {
        // microlp rejects a variable appearing twice in one row
        let merged = constraint.expr.merged();
        if merged.terms.is_empty() {
            let holds = match constraint.sense {
                Sense::Le => 0.0 <= constraint.rhs + INTEGRALITY_TOLERANCE,
                Sense::Eq => constraint.rhs.abs() <= INTEGRALITY_TOLERANCE,
                Sense::Ge => 0.0 >= constraint.rhs - INTEGRALITY_TOLERANCE,
            };
            if !holds {
                debug!("row {} has no terms and cannot hold", constraint.name);
                return None;
            }
            continue;
        }
        let mut expr = LinearExpr::empty();
        for (var, coeff) in merged.terms {
            expr.add(vars[var.0], coeff);
        }
        let op = match constraint.sense {
            Sense::Le => ComparisonOp::Le,
            Sense::Eq => ComparisonOp::Eq,
            Sense::Ge => ComparisonOp::Ge,
        };
        problem.add_constraint(expr, op, constraint.rhs);
    }
    Some((problem, vars))
}

struct Incumbent {
    objective: f64,
    values: Vec<f64>,
}

struct Search<'a> {
    model: &'a MilpModel,
    vars: &'a [Variable],
    deadline: Option<Instant>,
    max_nodes: Option<usize>,
    verbose: bool,
    incumbent: Option<Incumbent>,
    nodes: usize,
}

impl<'a> Search<'a> {
    fn must_stop(&self) -> bool {
        self.deadline.map_or(false, |it| Instant::now() >= it)
            || self.max_nodes.map_or(false, |it| self.nodes >= it)
    }

    /// Dives by fixing the most fractional binary to 1, the 0 branch is kept as the list of
    /// fixings from the root and replayed on backtrack. Returns false if stopped early.
    fn run(&mut self, root: &Solution) -> anyhow::Result<bool> {
        let mut open: Vec<Vec<(usize, f64)>> = vec![vec![]];
        while let Some(mut fixings) = open.pop() {
            if self.must_stop() {
                return Ok(false);
            }
            let mut node = match fix_all(root.clone(), self.vars, &fixings)? {
                Some(node) => node,
                None => continue,
            };
            loop {
                self.nodes += 1;
                if self.is_pruned(node.objective()) {
                    break;
                }
                let idx = match self.branching_var(&node) {
                    Some(idx) => idx,
                    None => {
                        self.update_incumbent(&node);
                        break;
                    }
                };
                let mut down = fixings.clone();
                down.push((idx, 0.0));
                open.push(down);
                fixings.push((idx, 1.0));
                if self.must_stop() {
                    return Ok(false);
                }
                node = match fix(node, self.vars[idx], 1.0)? {
                    Some(node) => node,
                    None => break,
                };
            }
        }
        Ok(true)
    }

    fn is_pruned(&self, bound: f64) -> bool {
        self.incumbent
            .as_ref()
            .map_or(false, |it| bound >= it.objective - PRUNE_TOLERANCE)
    }

    fn branching_var(&self, node: &Solution) -> Option<usize> {
        self.model
            .variables
            .iter()
            .enumerate()
            .filter(|(_, var)| var.domain == VarDomain::Binary)
            .map(|(idx, _)| {
                let value = node[self.vars[idx]];
                (idx, (value - value.round()).abs())
            })
            .filter(|(_, fractionality)| *fractionality > INTEGRALITY_TOLERANCE)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(idx, _)| idx)
    }

    fn update_incumbent(&mut self, node: &Solution) {
        let values: Vec<f64> = self
            .model
            .variables
            .iter()
            .zip(self.vars)
            .map(|(var, lp_var)| match var.domain {
                VarDomain::Binary => node[*lp_var].round(),
                VarDomain::Continuous => node[*lp_var],
            })
            .collect();
        let objective = self.model.objective_value(&values);
        if self.verbose {
            info!("microlp: incumbent {} at node {}", objective, self.nodes);
        } else {
            debug!("microlp: incumbent {} at node {}", objective, self.nodes);
        }
        self.incumbent = Some(Incumbent { objective, values });
    }
}

/// `None` if the fixing makes the relaxation infeasible.
fn fix(node: Solution, var: Variable, value: f64) -> anyhow::Result<Option<Solution>> {
    match node.fix_var(var, value) {
        Ok(node) => Ok(Some(node)),
        Err(microlp::Error::Infeasible) => Ok(None),
        Err(err) => Err(anyhow::Error::msg(format!("microlp failed while branching: {}", err))),
    }
}

fn fix_all(
    root: Solution,
    vars: &[Variable],
    fixings: &[(usize, f64)],
) -> anyhow::Result<Option<Solution>> {
    let mut node = root;
    for (idx, value) in fixings {
        node = match fix(node, vars[*idx], *value)? {
            Some(node) => node,
            None => return Ok(None),
        };
    }
    Ok(Some(node))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::model::milp::{ConstraintFamily, LinExpr};
    use crate::solver::SolveParamsBuilder;

    use super::*;

    /// max 5a + 4b + 3c s.t. 2a + 3b + c <= 5, as a minimization; optimum -9 at a = b = 1
    fn knapsack() -> MilpModel {
        let mut model = MilpModel::new("knapsack");
        let a = model.add_var("a", VarDomain::Binary, 0.0, 1.0);
        let b = model.add_var("b", VarDomain::Binary, 0.0, 1.0);
        let c = model.add_var("c", VarDomain::Binary, 0.0, 1.0);
        model.objective = [(a, -5.0), (b, -4.0), (c, -3.0)].into_iter().collect();
        let mut row = LinExpr::new();
        row.add_term(2.0, a).add_term(3.0, b).add_term(1.0, c);
        model.add_constr("weight", ConstraintFamily::Capacity, row, Sense::Le, 5.0);
        model
    }

    #[test]
    fn small_knapsack() -> anyhow::Result<()> {
        let model = knapsack();
        let response = MicroLpSolver.solve(&model, &SolveParams::default())?;
        assert_eq!(response.status, SolveStatus::Optimal);
        assert!((response.objective_value.unwrap_or_default() + 9.0).abs() < 1e-6);
        let values = response.values.unwrap_or_default();
        assert_eq!(values, vec![1.0, 1.0, 0.0]);
        assert!(model.violations(&values, 1e-6).is_empty());
        Ok(())
    }

    #[test]
    fn exhausted_limit_keeps_best_integral_assignment() -> anyhow::Result<()> {
        let model = knapsack();
        let params = SolveParams::default();
        let mut stopped_with_incumbent = false;
        for max_nodes in 0..20 {
            let response = solve_within(&model, &params, Some(max_nodes))?;
            match (response.status, response.values) {
                (SolveStatus::Optimal, Some(values)) => {
                    assert!((model.objective_value(&values) + 9.0).abs() < 1e-6)
                }
                (SolveStatus::TimeLimit, Some(values)) => {
                    stopped_with_incumbent = true;
                    assert!(model.violations(&values, 1e-6).is_empty());
                    assert!(values.iter().all(|it| *it == 0.0 || *it == 1.0));
                    assert!(model.objective_value(&values) >= -9.0 - 1e-6);
                    assert_eq!(response.objective_value, Some(model.objective_value(&values)));
                }
                (SolveStatus::TimeLimit, None) => {}
                (status, values) => panic!("unexpected {:?} with {:?}", status, values),
            }
        }
        assert!(stopped_with_incumbent);
        let response = solve_within(&model, &params, Some(1000))?;
        assert_eq!(response.status, SolveStatus::Optimal);
        Ok(())
    }

    #[test]
    fn zero_time_limit_returns_without_search() -> anyhow::Result<()> {
        let params = SolveParamsBuilder::default()
            .time_limit(Duration::ZERO)
            .build()?;
        let response = MicroLpSolver.solve(&knapsack(), &params)?;
        assert_eq!(response.status, SolveStatus::TimeLimit);
        assert!(response.values.is_none());
        Ok(())
    }

    #[test]
    fn infeasible_rows() -> anyhow::Result<()> {
        let mut model = MilpModel::new("contradiction");
        let a = model.add_var("a", VarDomain::Continuous, 0.0, 1.0);
        model.add_constr(
            "at_least_two",
            ConstraintFamily::Capacity,
            [(a, 1.0)].into_iter().collect(),
            Sense::Ge,
            2.0,
        );
        let params = SolveParamsBuilder::default()
            .time_limit(Duration::from_secs(10))
            .build()?;
        let response = MicroLpSolver.solve(&model, &params)?;
        assert_eq!(response.status, SolveStatus::Infeasible);
        assert!(response.values.is_none());
        Ok(())
    }

    #[test]
    fn repeated_terms_in_a_row() -> anyhow::Result<()> {
        // a + a + b - b >= 1 reads as 2a >= 1
        let mut model = MilpModel::new("repeated");
        let a = model.add_var("a", VarDomain::Binary, 0.0, 1.0);
        let b = model.add_var("b", VarDomain::Binary, 0.0, 1.0);
        model.objective = [(a, 3.0), (b, 1.0)].into_iter().collect();
        let mut row = LinExpr::new();
        row.add_term(1.0, a).add_term(1.0, a).add_term(1.0, b).add_term(-1.0, b);
        model.add_constr("twice", ConstraintFamily::Capacity, row, Sense::Ge, 1.0);
        // b - b <= -1 has no terms left and can never hold
        let mut empty = model.clone();
        let mut row = LinExpr::new();
        row.add_term(1.0, b).add_term(-1.0, b);
        empty.add_constr("never", ConstraintFamily::Capacity, row, Sense::Le, -1.0);

        let response = MicroLpSolver.solve(&model, &SolveParams::default())?;
        assert_eq!(response.status, SolveStatus::Optimal);
        assert_eq!(response.values, Some(vec![1.0, 0.0]));
        let response = MicroLpSolver.solve(&empty, &SolveParams::default())?;
        assert_eq!(response.status, SolveStatus::Infeasible);
        Ok(())
    }
}
