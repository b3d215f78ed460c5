pub mod cvrp;
pub mod travel_matrix;

pub type Demand = u32;
pub type Distance = i64;
