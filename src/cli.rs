use clap::{Args, Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(version, about = "Solves capacitated vehicle routing instances with a MILP formulation")]
pub struct ProgramArguments {
    #[arg(short, long, help = "instance file path (CVRPLIB format)")]
    pub instance: String,

    #[arg(
        short = 'k',
        long,
        help = "number of vehicles (default: the -k<N> suffix of the instance name, else the fleet lower bound)"
    )]
    pub vehicles: Option<usize>,

    #[arg(long, help = "TOML file with solver and model settings")]
    pub config: Option<String>,

    #[arg(short, long, help = "solution file path")]
    pub solution: Option<String>,

    #[arg(long, help = "file to store a JSON report of the run")]
    pub json_report: Option<String>,

    #[command(flatten)]
    pub solver: SolverArguments,

    #[arg(long, help = "print summary to stdout", default_value = "false")]
    pub print_summary_to_stdout: bool,
}

#[derive(Args, Clone, Debug)]
pub struct SolverArguments {
    #[arg(long, value_enum, help = "MILP backend (default: microlp)")]
    pub backend: Option<Backend>,

    #[arg(long, help = "solver time limit, 0 disables it (default: 3600)")]
    pub time_limit_in_seconds: Option<u64>,

    #[arg(long, help = "enable the solver's own output", default_value = "false")]
    pub verbose_solver: bool,

    #[arg(long, help = "number of solver threads")]
    pub threads: Option<usize>,

    #[arg(
        long,
        help = "vehicles may stay at the depot instead of all leaving it",
        default_value = "false"
    )]
    pub allow_idle_vehicles: bool,

    #[arg(long, value_enum, help = "distance rounding (default: half-even)")]
    pub rounding: Option<Rounding>,
}

#[derive(Clone, ValueEnum, Debug)]
pub enum Backend {
    Microlp,
    Gurobi,
}

#[derive(Clone, ValueEnum, Debug)]
pub enum Rounding {
    HalfEven,
    HalfUp,
}

/// Reads the fleet size from names like `E-n23-k3`.
pub fn vehicles_from_name(name: &str) -> Option<usize> {
    name.rsplit('-')
        .next()
        .and_then(|it| it.strip_prefix('k'))
        .and_then(|it| it.parse().ok())
        .filter(|it| *it > 0)
}
