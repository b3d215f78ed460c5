pub mod cli;
pub mod config;
pub mod io;
pub mod model;
pub mod problem;
pub mod solution;
pub mod solver;
pub mod utils;
