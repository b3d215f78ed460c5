use std::fs::File;
use std::io::Read;
use std::time::Duration;

use serde::Deserialize;

use crate::cli::{Backend, Rounding, SolverArguments};
use crate::model::{DepotDeparture, FormulationOptions};
use crate::problem::travel_matrix::RoundingMode;
use crate::solver::{SolveParams, SolveParamsBuilder, SolverBackend};

pub const DEFAULT_TIME_LIMIT_IN_SECONDS: u64 = 3600;

/// Settings file layout:
///
/// ```toml
/// [solver]
/// backend = "microlp"           # or "gurobi"
/// time_limit_in_seconds = 3600  # 0 disables the limit
/// verbose = false
/// threads = 4
///
/// [model]
/// allow_idle_vehicles = false
/// rounding = "half-even"        # or "half-up"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub solver: SolverConfig,
    pub model: ModelConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    pub backend: SolverBackend,
    pub time_limit_in_seconds: u64,
    pub verbose: bool,
    pub threads: Option<usize>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            backend: SolverBackend::default(),
            time_limit_in_seconds: DEFAULT_TIME_LIMIT_IN_SECONDS,
            verbose: false,
            threads: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub allow_idle_vehicles: bool,
    pub rounding: RoundingMode,
}

pub fn read_config(path: impl Into<String>) -> anyhow::Result<Config> {
    let mut s = String::new();
    File::open(path.into())?.read_to_string(&mut s)?;
    Ok(toml::from_str(s.as_str())?)
}

impl Config {
    /// Command line values take precedence over the file.
    pub fn apply_arguments(&mut self, args: &SolverArguments) {
        if let Some(backend) = &args.backend {
            self.solver.backend = match backend {
                Backend::Microlp => SolverBackend::Microlp,
                Backend::Gurobi => SolverBackend::Gurobi,
            };
        }
        if let Some(seconds) = args.time_limit_in_seconds {
            self.solver.time_limit_in_seconds = seconds;
        }
        if let Some(threads) = args.threads {
            self.solver.threads = Some(threads);
        }
        if let Some(rounding) = &args.rounding {
            self.model.rounding = match rounding {
                Rounding::HalfEven => RoundingMode::HalfEven,
                Rounding::HalfUp => RoundingMode::HalfUp,
            };
        }
        self.solver.verbose |= args.verbose_solver;
        self.model.allow_idle_vehicles |= args.allow_idle_vehicles;
    }
}

impl SolverConfig {
    pub fn solve_params(&self) -> anyhow::Result<SolveParams> {
        let time_limit = match self.time_limit_in_seconds {
            0 => None,
            seconds => Some(Duration::from_secs(seconds)),
        };
        Ok(SolveParamsBuilder::default()
            .time_limit(time_limit)
            .verbose(self.verbose)
            .threads(self.threads)
            .build()?)
    }
}

impl ModelConfig {
    pub fn formulation_options(&self) -> FormulationOptions {
        FormulationOptions {
            departure: if self.allow_idle_vehicles {
                DepotDeparture::AtMost
            } else {
                DepotDeparture::Exactly
            },
        }
    }
}
