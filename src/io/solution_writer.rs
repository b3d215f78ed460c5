use std::fs::File;
use std::io::{BufWriter, Write};

use itertools::Itertools;
use log::info;
use serde::Serialize;

use crate::problem::cvrp::CVRPInstance;
use crate::problem::Distance;
use crate::solution::CvrpOutcome;
use crate::solver::SolverResult;

#[derive(Debug, Serialize)]
pub struct RouteReport {
    pub vehicle: usize,
    /// 1-based customer ids, depot excluded
    pub customers: Vec<usize>,
    pub load: u32,
    pub distance: Distance,
}

/// Machine readable summary of a run.
#[derive(Debug, Serialize)]
pub struct SolutionReport {
    pub instance_name: String,
    pub num_vehicles: usize,
    pub status: &'static str,
    pub objective: Option<f64>,
    pub total_distance: Option<Distance>,
    pub routes: Vec<RouteReport>,
    pub solve_time_in_seconds: f64,
}

impl SolutionReport {
    pub fn new(instance: &CVRPInstance, num_vehicles: usize, result: &SolverResult) -> Self {
        let solution = result.outcome.solution();
        Self {
            instance_name: instance.name.clone(),
            num_vehicles,
            status: result.outcome.label(),
            objective: solution.map(|it| it.objective),
            total_distance: solution.map(|it| it.total_distance),
            routes: solution
                .map(|it| {
                    it.routes
                        .iter()
                        .map(|route| RouteReport {
                            vehicle: route.vehicle,
                            customers: route.customer_ids(instance),
                            load: route.demand(instance),
                            distance: route.distance(instance),
                        })
                        .collect()
                })
                .unwrap_or_default(),
            solve_time_in_seconds: result.time.as_std().as_secs_f64(),
        }
    }
}

pub fn write_json_report(path: impl Into<String>, report: &SolutionReport) -> anyhow::Result<()> {
    let path = path.into();
    let f = File::create(&path)?;
    let mut file = BufWriter::new(&f);
    serde_json::to_writer_pretty(&mut file, report)?;
    writeln!(file)?;
    info!("report written to {}", path);
    Ok(())
}

/// Writes the routes in the CVRPLIB `.sol` layout, nothing is written without a solution.
pub fn write_cvrplib_solution(
    path: impl Into<String>,
    instance: &CVRPInstance,
    outcome: &CvrpOutcome,
) -> anyhow::Result<()> {
    let solution = outcome
        .solution()
        .ok_or_else(|| anyhow::Error::msg(format!("no solution to write ({})", outcome.label())))?;
    let path = path.into();
    let f = File::create(&path)?;
    let mut file = BufWriter::new(&f);
    write_cvrplib_routes(&mut file, instance, outcome)?;
    info!(
        "solution with {} routes written to {}",
        solution.routes.len(),
        path
    );
    Ok(())
}

pub fn write_cvrplib_routes<W: Write>(
    writer: &mut W,
    instance: &CVRPInstance,
    outcome: &CvrpOutcome,
) -> anyhow::Result<()> {
    let solution = match outcome.solution() {
        Some(solution) => solution,
        None => return Ok(()),
    };
    // Route #1: 21 16 20 18 14 11 12 10 9
    // Route #2: ...
    // Cost 569
    for (idx, route) in solution.routes.iter().enumerate() {
        writeln!(
            writer,
            "Route #{}: {}",
            idx + 1,
            route.customer_ids(instance).iter().join(" ")
        )?;
    }
    writeln!(writer, "Cost {}", solution.total_distance)?;
    Ok(())
}
