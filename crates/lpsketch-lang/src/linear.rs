//! Polynomial expansion of parsed expressions and linear coefficient extraction.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::ast::{BinaryOp, Expr, Relation};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinearError {
    #[error("Expression is not linear in {variable}: term {term}")]
    NonLinearTerm { variable: String, term: String },
    #[error("Variable {0} is not part of the model")]
    UnknownVariable(String),
    #[error("Expression is not a polynomial: {0}")]
    NonPolynomial(String),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Expression does not evaluate to a finite number: {0}")]
    NonFinite(String),
}

/// Highest total degree an expansion may reach
const MAX_DEGREE: u32 = 64;

/// Variable name to exponent. The empty monomial is the constant term.
type Monomial = BTreeMap<String, u32>;

/// An expanded expression: a sum of coefficient × monomial terms.
///
/// Terms whose coefficient cancels to exactly zero are dropped, so `x - x`
/// expands to the zero polynomial with no variables.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polynomial {
    terms: BTreeMap<Monomial, f64>,
}

impl Polynomial {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn constant(value: f64) -> Self {
        let mut poly = Self::zero();
        poly.add_term(Monomial::new(), value);
        poly
    }

    pub fn variable(name: impl Into<String>) -> Self {
        let mut poly = Self::zero();
        poly.add_term(Monomial::from([(name.into(), 1)]), 1.0);
        poly
    }

    /// Expand a parsed expression
    pub fn from_expr(expr: &Expr) -> Result<Self, LinearError> {
        let poly = Self::expand(expr)?;
        if poly.terms.values().any(|c| !c.is_finite()) {
            return Err(LinearError::NonFinite(expr.to_string()));
        }
        Ok(poly)
    }

    fn expand(expr: &Expr) -> Result<Self, LinearError> {
        match expr {
            Expr::Number(n) => Ok(Self::constant(*n)),
            Expr::Variable(name) => Ok(Self::variable(name.clone())),
            Expr::Paren(inner) => Self::from_expr(inner),
            Expr::Neg(inner) => Ok(Self::from_expr(inner)?.scale(-1.0)),
            Expr::BinaryOp { left, op, right } => {
                let left = Self::from_expr(left)?;
                let right = Self::from_expr(right)?;
                match op {
                    BinaryOp::Add => Ok(left.add(&right)),
                    BinaryOp::Sub => Ok(left.add(&right.scale(-1.0))),
                    BinaryOp::Mul => Ok(left.mul(&right)),
                    BinaryOp::Div => {
                        let divisor = right.as_constant().ok_or_else(|| {
                            LinearError::NonPolynomial(format!("division by {right}"))
                        })?;
                        if divisor == 0.0 {
                            return Err(LinearError::DivisionByZero);
                        }
                        Ok(left.scale(1.0 / divisor))
                    }
                    BinaryOp::Pow => left.pow(&right),
                }
            }
        }
    }

    /// Polynomial of `lhs - rhs` for a relation
    pub fn from_relation(relation: &Relation) -> Result<Self, LinearError> {
        let lhs = Self::from_expr(&relation.lhs)?;
        let rhs = Self::from_expr(&relation.rhs)?;
        Ok(lhs.add(&rhs.scale(-1.0)))
    }

    fn add_term(&mut self, monomial: Monomial, coefficient: f64) {
        let entry = self.terms.entry(monomial).or_insert(0.0);
        *entry += coefficient;
        if *entry == 0.0 {
            self.terms.retain(|_, c| *c != 0.0);
        }
    }

    pub fn add(&self, other: &Polynomial) -> Polynomial {
        let mut result = self.clone();
        for (monomial, &coef) in &other.terms {
            result.add_term(monomial.clone(), coef);
        }
        result
    }

    pub fn scale(&self, factor: f64) -> Polynomial {
        let mut result = Polynomial::zero();
        for (monomial, &coef) in &self.terms {
            result.add_term(monomial.clone(), coef * factor);
        }
        result
    }

    pub fn mul(&self, other: &Polynomial) -> Polynomial {
        let mut result = Polynomial::zero();
        for (m1, &c1) in &self.terms {
            for (m2, &c2) in &other.terms {
                let mut monomial = m1.clone();
                for (name, exp) in m2 {
                    let total = monomial.entry(name.clone()).or_insert(0);
                    *total = total.saturating_add(*exp);
                }
                result.add_term(monomial, c1 * c2);
            }
        }
        result
    }

    fn pow(&self, exponent: &Polynomial) -> Result<Polynomial, LinearError> {
        let exp = exponent.as_constant().ok_or_else(|| {
            LinearError::NonPolynomial(format!("non-constant exponent {exponent}"))
        })?;

        if let Some(base) = self.as_constant() {
            return Ok(Polynomial::constant(base.powf(exp)));
        }
        if exp < 0.0 || exp.fract() != 0.0 {
            return Err(LinearError::NonPolynomial(format!("({self})**{exp}")));
        }
        if f64::from(self.degree()) * exp > f64::from(MAX_DEGREE) {
            return Err(LinearError::NonPolynomial(format!(
                "({self})**{exp} exceeds degree {MAX_DEGREE}"
            )));
        }

        let mut result = Polynomial::constant(1.0);
        for _ in 0..(exp as u32) {
            result = result.mul(self);
        }
        Ok(result)
    }

    /// The value of a polynomial with no variables
    pub fn as_constant(&self) -> Option<f64> {
        match self.terms.len() {
            0 => Some(0.0),
            1 => self.terms.get(&Monomial::new()).copied(),
            _ => None,
        }
    }

    pub fn constant_term(&self) -> f64 {
        self.terms.get(&Monomial::new()).copied().unwrap_or(0.0)
    }

    pub fn degree(&self) -> u32 {
        self.terms
            .keys()
            .map(|m| m.values().sum::<u32>())
            .max()
            .unwrap_or(0)
    }

    /// Free variables that survive expansion
    pub fn variables(&self) -> BTreeSet<String> {
        self.terms.keys().flat_map(|m| m.keys().cloned()).collect()
    }

    /// Coefficient of the degree-one term in `name`
    pub fn linear_coefficient(&self, name: &str) -> f64 {
        let monomial = Monomial::from([(name.to_string(), 1)]);
        self.terms.get(&monomial).copied().unwrap_or(0.0)
    }

    /// Fail on the first term of degree above one
    pub fn check_linear(&self) -> Result<(), LinearError> {
        for (monomial, &coef) in &self.terms {
            if monomial.values().sum::<u32>() > 1 {
                let variable = monomial.keys().next().cloned().unwrap_or_default();
                return Err(LinearError::NonLinearTerm {
                    variable,
                    term: format_term(monomial, coef),
                });
            }
        }
        Ok(())
    }
}

fn format_term(monomial: &Monomial, coef: f64) -> String {
    let mut parts = Vec::new();
    if coef != 1.0 || monomial.is_empty() {
        parts.push(format!("{coef}"));
    }
    for (name, &exp) in monomial {
        if exp == 1 {
            parts.push(name.clone());
        } else {
            parts.push(format!("{name}**{exp}"));
        }
    }
    parts.join("*")
}

impl fmt::Display for Polynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return f.write_str("0");
        }
        let terms: Vec<String> = self
            .terms
            .iter()
            .map(|(m, &c)| format_term(m, c))
            .collect();
        f.write_str(&terms.join(" + "))
    }
}

/// A linear expression over a fixed variable ordering:
/// `sum(coefficients[i] * order[i]) + constant`
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct LinearForm {
    pub coefficients: Vec<f64>,
    pub constant: f64,
}

impl LinearForm {
    /// Linearize a polynomial against `order`.
    ///
    /// Fails if a term is non-linear or uses a variable missing from `order`.
    pub fn from_polynomial<S: AsRef<str>>(poly: &Polynomial, order: &[S]) -> Result<Self, LinearError> {
        poly.check_linear()?;
        if let Some(unknown) = poly
            .variables()
            .into_iter()
            .find(|v| !order.iter().any(|o| o.as_ref() == v.as_str()))
        {
            return Err(LinearError::UnknownVariable(unknown));
        }

        Ok(Self {
            coefficients: order
                .iter()
                .map(|name| poly.linear_coefficient(name.as_ref()))
                .collect(),
            constant: poly.constant_term(),
        })
    }

    pub fn from_expr<S: AsRef<str>>(expr: &Expr, order: &[S]) -> Result<Self, LinearError> {
        Self::from_polynomial(&Polynomial::from_expr(expr)?, order)
    }

    /// Linearize `lhs - rhs` of a relation
    pub fn from_relation<S: AsRef<str>>(relation: &Relation, order: &[S]) -> Result<Self, LinearError> {
        Self::from_polynomial(&Polynomial::from_relation(relation)?, order)
    }
}

/// Free variables of an expression, after cancellation.
///
/// The set carries no meaningful order; use [`first_seen_variables`] when the
/// order matters.
pub fn extract_variables(expr: &Expr) -> Result<BTreeSet<String>, LinearError> {
    Ok(Polynomial::from_expr(expr)?.variables())
}

/// Free variables in order of first appearance in the source text
pub fn first_seen_variables(expr: &Expr) -> Result<Vec<String>, LinearError> {
    let free = extract_variables(expr)?;
    Ok(expr
        .variables_in_order()
        .into_iter()
        .filter(|name| free.contains(name))
        .collect())
}

/// Coefficient of each variable in `order`. Variables in `order` that do not
/// occur get 0. The constant term is ignored.
pub fn extract_coefficients<S: AsRef<str>>(expr: &Expr, order: &[S]) -> Result<Vec<f64>, LinearError> {
    let form = LinearForm::from_expr(expr, order)?;
    debug!(variables = order.len(), coefficients = ?form.coefficients, "extracted coefficients");
    Ok(form.coefficients)
}
