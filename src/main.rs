use clap::{CommandFactory, FromArgMatches};
use log::{info, warn};
use os_str_bytes::OsStrBytesExt;
use took::Timer;

use cvrp_milp::cli::{self, vehicles_from_name};
use cvrp_milp::config::{read_config, Config};
use cvrp_milp::io::load_instance;
use cvrp_milp::io::solution_writer::{write_cvrplib_solution, write_json_report, SolutionReport};
use cvrp_milp::solution::CvrpOutcome;
use cvrp_milp::solver::solve_cvrp;
use cvrp_milp::utils::logging::{format_log_outcome_timed, format_log_route};

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = argfile::expand_args_from(
        std::env::args_os(),
        argfile::parse_fromfile,
        argfile::PREFIX,
    )?;
    let args = cli::ProgramArguments::from_arg_matches(
        &cli::ProgramArguments::command()
            .get_matches_from(args.iter().flat_map(|it| {
                it.split(" ").into_iter().collect::<Vec<_>>()
            }))
    )?;
    info!("{:?}", &args);

    let mut config = match &args.config {
        Some(path) => read_config(path)?,
        None => Config::default(),
    };
    config.apply_arguments(&args.solver);
    info!("{:?}", &config);

    let load_timer = Timer::new();
    let instance = load_instance(&args.instance, config.model.rounding)?;
    info!("instance loaded after {}", load_timer.took());

    let lower_bound = instance.fleet_lower_bound();
    let num_vehicles = args
        .vehicles
        .or_else(|| vehicles_from_name(&instance.name))
        .unwrap_or(lower_bound);
    if num_vehicles < lower_bound {
        warn!(
            "{} vehicles cannot carry the total demand of {} (at least {} needed)",
            num_vehicles,
            instance.total_demand(),
            lower_bound
        );
    }
    info!("solving {} with {} vehicles", instance.name, num_vehicles);

    let solver = config.solver.backend.create()?;
    let params = config.solver.solve_params()?;
    let res = solve_cvrp(
        &instance,
        num_vehicles,
        &config.model.formulation_options(),
        solver.as_ref(),
        &params,
    )?;

    info!("{}", format_log_outcome_timed(solver.name(), &res.outcome, &res.time));
    match &res.outcome {
        CvrpOutcome::Solved(solution) => {
            for route in &solution.routes {
                info!("{}", format_log_route(route, &instance));
            }
        }
        CvrpOutcome::Infeasible => {
            info!("no feasible routing with {} vehicles", num_vehicles)
        }
        CvrpOutcome::TimeLimitReached => {
            info!("no solution found within the time limit")
        }
    }

    if args.print_summary_to_stdout {
        let solution = res.outcome.solution();
        println!(
            "{};{};{};{};{}",
            instance.name,
            res.outcome.label(),
            solution.map_or(0, |it| it.number_of_vehicles_used()),
            solution.map_or("-".to_string(), |it| it.total_distance.to_string()),
            res.time.as_std().as_secs_f64()
        );
    }

    if let Some(path) = &args.solution {
        if res.outcome.solution().is_some() {
            write_cvrplib_solution(path, &instance, &res.outcome)?;
        } else {
            warn!("no solution to write to {}", path);
        }
    }

    if let Some(path) = &args.json_report {
        write_json_report(path, &SolutionReport::new(&instance, num_vehicles, &res))?;
    }

    Ok(())
}
