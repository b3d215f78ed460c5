pub mod logging;
pub mod validator;

pub trait Tolerance {
    fn tol() -> Self;
}

impl Tolerance for f64 {
    fn tol() -> Self {
        0.001
    }
}
