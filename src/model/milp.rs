use std::fmt::{Display, Formatter};

use enum_map::{Enum, EnumMap};
use itertools::Itertools;

/// Index of a variable inside a [`MilpModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarDomain {
    Binary,
    Continuous,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub domain: VarDomain,
    pub lb: f64,
    pub ub: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinExpr {
    pub terms: Vec<(VarId, f64)>,
}

impl LinExpr {
    pub fn new() -> Self {
        Self { terms: vec![] }
    }
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            terms: Vec::with_capacity(capacity),
        }
    }
    pub fn add_term(&mut self, coeff: f64, var: VarId) -> &mut Self {
        self.terms.push((var, coeff));
        self
    }
    /// One term per variable, coefficients of repeated variables summed, zeros dropped.
    pub fn merged(&self) -> LinExpr {
        self.terms
            .iter()
            .copied()
            .sorted_by_key(|(var, _)| *var)
            .coalesce(|a, b| {
                if a.0 == b.0 {
                    Ok((a.0, a.1 + b.1))
                } else {
                    Err((a, b))
                }
            })
            .filter(|(_, coeff)| *coeff != 0.0)
            .collect()
    }
    pub fn evaluate(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(var, coeff)| coeff * values[var.0])
            .sum()
    }
}

impl FromIterator<(VarId, f64)> for LinExpr {
    fn from_iter<T: IntoIterator<Item = (VarId, f64)>>(iter: T) -> Self {
        Self {
            terms: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Le,
    Eq,
    Ge,
}

impl Display for Sense {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Sense::Le => write!(f, "<="),
            Sense::Eq => write!(f, "=="),
            Sense::Ge => write!(f, ">="),
        }
    }
}

/// Row groups of the CVRP formulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
pub enum ConstraintFamily {
    FlowConservation,
    CustomerCoverage,
    NoSelfLoop,
    DepotDeparture,
    DepartureOrder,
    Capacity,
    SubtourElimination,
}

#[derive(Debug, Clone)]
pub struct Constraint {
    pub name: String,
    pub family: ConstraintFamily,
    pub expr: LinExpr,
    pub sense: Sense,
    pub rhs: f64,
}

impl Constraint {
    pub fn is_satisfied(&self, values: &[f64], tolerance: f64) -> bool {
        let lhs = self.expr.evaluate(values);
        match self.sense {
            Sense::Le => lhs <= self.rhs + tolerance,
            Sense::Eq => (lhs - self.rhs).abs() <= tolerance,
            Sense::Ge => lhs >= self.rhs - tolerance,
        }
    }
}

/// Solver independent minimization problem: bounded variables, a linear objective and
/// linear rows. Backends translate it into their own representation.
#[derive(Debug, Clone, Default)]
pub struct MilpModel {
    pub name: String,
    pub variables: Vec<Variable>,
    pub objective: LinExpr,
    pub constraints: Vec<Constraint>,
}

impl MilpModel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn add_var(&mut self, name: impl Into<String>, domain: VarDomain, lb: f64, ub: f64) -> VarId {
        self.variables.push(Variable {
            name: name.into(),
            domain,
            lb,
            ub,
        });
        VarId(self.variables.len() - 1)
    }

    pub fn add_constr(
        &mut self,
        name: impl Into<String>,
        family: ConstraintFamily,
        expr: LinExpr,
        sense: Sense,
        rhs: f64,
    ) {
        self.constraints.push(Constraint {
            name: name.into(),
            family,
            expr,
            sense,
            rhs,
        });
    }

    pub fn num_vars(&self) -> usize {
        self.variables.len()
    }

    pub fn num_binaries(&self) -> usize {
        self.variables
            .iter()
            .filter(|it| it.domain == VarDomain::Binary)
            .count()
    }

    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.objective.evaluate(values)
    }

    pub fn rows_per_family(&self) -> EnumMap<ConstraintFamily, usize> {
        let mut counts = EnumMap::default();
        for constraint in &self.constraints {
            counts[constraint.family] += 1;
        }
        counts
    }

    /// Rows and variable bounds (reported under the variable's name) violated by `values`.
    pub fn violations(&self, values: &[f64], tolerance: f64) -> Vec<String> {
        let mut violated: Vec<String> = self
            .variables
            .iter()
            .zip(values)
            .filter(|(var, value)| {
                **value < var.lb - tolerance
                    || **value > var.ub + tolerance
                    || (var.domain == VarDomain::Binary
                        && (**value - value.round()).abs() > tolerance)
            })
            .map(|(var, _)| var.name.clone())
            .collect();
        violated.extend(
            self.constraints
                .iter()
                .filter(|it| !it.is_satisfied(values, tolerance))
                .map(|it| it.name.clone()),
        );
        violated
    }
}
