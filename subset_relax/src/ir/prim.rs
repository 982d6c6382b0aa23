//! Symbolic integer expressions used for shape dimensions.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimExpr {
    Int(i64),
    /// Symbolic dimension bound by a `MatchShape` pattern or a parameter annotation.
    Var(String),
    Add(Box<PrimExpr>, Box<PrimExpr>),
    Sub(Box<PrimExpr>, Box<PrimExpr>),
    Mul(Box<PrimExpr>, Box<PrimExpr>),
    FloorDiv(Box<PrimExpr>, Box<PrimExpr>),
}

impl PrimExpr {
    pub fn var(name: impl Into<String>) -> Self {
        PrimExpr::Var(name.into())
    }

    pub fn add(lhs: PrimExpr, rhs: PrimExpr) -> Self {
        PrimExpr::Add(Box::new(lhs), Box::new(rhs))
    }

    pub fn sub(lhs: PrimExpr, rhs: PrimExpr) -> Self {
        PrimExpr::Sub(Box::new(lhs), Box::new(rhs))
    }

    pub fn mul(lhs: PrimExpr, rhs: PrimExpr) -> Self {
        PrimExpr::Mul(Box::new(lhs), Box::new(rhs))
    }

    pub fn floor_div(lhs: PrimExpr, rhs: PrimExpr) -> Self {
        PrimExpr::FloorDiv(Box::new(lhs), Box::new(rhs))
    }

    /// Value of the expression if it contains no symbolic variables.
    pub fn as_const(&self) -> Option<i64> {
        self.eval(&FxHashMap::default())
    }

    /// Evaluate under a substitution of symbolic variables.
    ///
    /// Returns `None` for unbound variables, division by zero and overflow.
    pub fn eval(&self, env: &FxHashMap<String, i64>) -> Option<i64> {
        match self {
            PrimExpr::Int(v) => Some(*v),
            PrimExpr::Var(name) => env.get(name).copied(),
            PrimExpr::Add(a, b) => a.eval(env)?.checked_add(b.eval(env)?),
            PrimExpr::Sub(a, b) => a.eval(env)?.checked_sub(b.eval(env)?),
            PrimExpr::Mul(a, b) => a.eval(env)?.checked_mul(b.eval(env)?),
            PrimExpr::FloorDiv(a, b) => {
                let (a, b) = (a.eval(env)?, b.eval(env)?);
                if b == 0 {
                    return None;
                }
                Some(a.div_euclid(b))
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            PrimExpr::Add(..) | PrimExpr::Sub(..) => 1,
            PrimExpr::Mul(..) | PrimExpr::FloorDiv(..) => 2,
            PrimExpr::Int(_) | PrimExpr::Var(_) => 3,
        }
    }
}

impl From<i64> for PrimExpr {
    fn from(v: i64) -> Self {
        PrimExpr::Int(v)
    }
}

impl fmt::Display for PrimExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (lhs, op, rhs) = match self {
            PrimExpr::Int(v) => return write!(f, "{}", v),
            PrimExpr::Var(name) => return write!(f, "{}", name),
            PrimExpr::Add(a, b) => (a, "+", b),
            PrimExpr::Sub(a, b) => (a, "-", b),
            PrimExpr::Mul(a, b) => (a, "*", b),
            PrimExpr::FloorDiv(a, b) => (a, "//", b),
        };
        let prec = self.precedence();
        if lhs.precedence() < prec {
            write!(f, "({})", lhs)?;
        } else {
            write!(f, "{}", lhs)?;
        }
        write!(f, " {} ", op)?;
        // Right operand needs parens at equal precedence too: a - (b - c).
        if rhs.precedence() <= prec && rhs.precedence() < 3 {
            write!(f, "({})", rhs)
        } else {
            write!(f, "{}", rhs)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval_with_substitution() {
        let e = PrimExpr::mul(
            PrimExpr::mul(PrimExpr::var("m"), PrimExpr::var("n")),
            PrimExpr::floor_div(PrimExpr::add(32.into(), 7.into()), 8.into()),
        );
        let mut env = FxHashMap::default();
        env.insert("m".to_string(), 3);
        env.insert("n".to_string(), 5);
        assert_eq!(e.eval(&env), Some(60));
        assert_eq!(e.as_const(), None);
    }

    #[test]
    fn test_floor_div_by_zero_is_none() {
        let e = PrimExpr::floor_div(4.into(), 0.into());
        assert_eq!(e.as_const(), None);
    }

    #[test]
    fn test_display_parenthesizes() {
        let e = PrimExpr::mul(
            PrimExpr::add(PrimExpr::var("n"), 1.into()),
            PrimExpr::sub(PrimExpr::var("m"), 2.into()),
        );
        assert_eq!(e.to_string(), "(n + 1) * (m - 2)");
        let e = PrimExpr::mul(PrimExpr::mul(PrimExpr::var("a"), PrimExpr::var("b")), 4.into());
        assert_eq!(e.to_string(), "a * b * 4");
    }
}
