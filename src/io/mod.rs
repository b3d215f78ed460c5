pub mod cvrplib_reader;
pub mod solution_writer;

pub use cvrplib_reader::load_instance;
