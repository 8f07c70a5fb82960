use std::fmt;

use lpsketch_solver::ConstraintOp;

/// A parsed algebraic expression
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Neg(Box<Expr>),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOp,
        right: Box<Expr>,
    },
    Paren(Box<Expr>),
}

impl Expr {
    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Self {
        Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Variable names in order of first appearance, left to right
    pub fn variables_in_order(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_variables(&mut names);
        names
    }

    fn collect_variables(&self, names: &mut Vec<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Variable(name) => {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            Expr::Neg(inner) | Expr::Paren(inner) => inner.collect_variables(names),
            Expr::BinaryOp { left, right, .. } => {
                left.collect_variables(names);
                right.collect_variables(names);
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Variable(name) => f.write_str(name),
            Expr::Neg(inner) => write!(f, "-{inner}"),
            Expr::Paren(inner) => write!(f, "({inner})"),
            Expr::BinaryOp { left, op, right } => match op {
                BinaryOp::Add | BinaryOp::Sub => write!(f, "{left} {op} {right}"),
                _ => write!(f, "{left}{op}{right}"),
            },
        }
    }
}

#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Sub => write!(f, "-"),
            BinaryOp::Mul => write!(f, "*"),
            BinaryOp::Div => write!(f, "/"),
            BinaryOp::Pow => write!(f, "**"),
        }
    }
}

/// Comparison between the two sides of a relation
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// `=` or `==`
    Equal,
    LessEqual,
    GreaterEqual,
    StrictLess,
    StrictGreater,
}

impl Comparator {
    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Equal => "==",
            Comparator::LessEqual => "<=",
            Comparator::GreaterEqual => ">=",
            Comparator::StrictLess => "<",
            Comparator::StrictGreater => ">",
        }
    }

    pub fn is_strict(self) -> bool {
        matches!(self, Comparator::StrictLess | Comparator::StrictGreater)
    }

    /// The LP operator for this comparator. Strict inequalities have none.
    pub fn constraint_op(self) -> Option<ConstraintOp> {
        match self {
            Comparator::Equal => Some(ConstraintOp::Eq),
            Comparator::LessEqual => Some(ConstraintOp::Le),
            Comparator::GreaterEqual => Some(ConstraintOp::Ge),
            Comparator::StrictLess | Comparator::StrictGreater => None,
        }
    }

    /// Evaluate `lhs <cmp> rhs` within `tolerance`
    pub fn holds(self, lhs: f64, rhs: f64, tolerance: f64) -> bool {
        match self {
            Comparator::Equal => (lhs - rhs).abs() <= tolerance,
            Comparator::LessEqual => lhs <= rhs + tolerance,
            Comparator::GreaterEqual => lhs >= rhs - tolerance,
            Comparator::StrictLess => lhs < rhs,
            Comparator::StrictGreater => lhs > rhs,
        }
    }
}

impl From<ConstraintOp> for Comparator {
    fn from(op: ConstraintOp) -> Self {
        match op {
            ConstraintOp::Le => Comparator::LessEqual,
            ConstraintOp::Ge => Comparator::GreaterEqual,
            ConstraintOp::Eq => Comparator::Equal,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Two expressions joined by a comparator
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub lhs: Expr,
    pub comparator: Comparator,
    pub rhs: Expr,
}

impl Relation {
    pub fn new(lhs: Expr, comparator: Comparator, rhs: Expr) -> Self {
        Self { lhs, comparator, rhs }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.comparator, self.rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Expr {
        Expr::Variable(name.to_string())
    }

    #[test]
    fn test_variables_in_order() {
        // y + 2*x - y
        let expr = Expr::binary(
            Expr::binary(var("y"), BinaryOp::Add, Expr::binary(Expr::Number(2.0), BinaryOp::Mul, var("x"))),
            BinaryOp::Sub,
            var("y"),
        );
        assert_eq!(expr.variables_in_order(), vec!["y", "x"]);
    }

    #[test]
    fn test_display() {
        let expr = Expr::binary(
            Expr::binary(Expr::Number(4.0), BinaryOp::Mul, var("x")),
            BinaryOp::Add,
            Expr::Neg(Box::new(Expr::Paren(Box::new(var("y"))))),
        );
        let relation = Relation::new(expr, Comparator::LessEqual, Expr::Number(0.5));
        assert_eq!(relation.to_string(), "4*x + -(y) <= 0.5");
    }

    #[test]
    fn test_comparator_mapping() {
        assert_eq!(Comparator::Equal.constraint_op(), Some(ConstraintOp::Eq));
        assert_eq!(Comparator::StrictLess.constraint_op(), None);
        assert_eq!(Comparator::from(ConstraintOp::Ge), Comparator::GreaterEqual);
        assert!(Comparator::StrictGreater.holds(2.0, 1.0, 1e-9));
        assert!(!Comparator::StrictGreater.holds(1.0, 1.0, 1e-9));
    }
}
