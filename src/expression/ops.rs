//! Operator overloading for [`Expr`].
//!
//! Binary operators return [`ExprResult`] because combining operands on
//! incompatible domains is a construction-time error. Results can be chained
//! directly with further expressions, so `(&a * &b) + &c` works without an
//! intermediate `?`.

use std::ops::{Add, Div, Mul, Neg, Sub};

use super::{BinaryOp, Expr, UnaryOp};
use crate::error::ModelError;

pub type ExprResult = Result<Expr, ModelError>;

macro_rules! impl_binary {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait<&Expr> for &Expr {
            type Output = ExprResult;
            fn $method(self, rhs: &Expr) -> ExprResult {
                self.binary($op, rhs)
            }
        }

        impl $trait<Expr> for &Expr {
            type Output = ExprResult;
            fn $method(self, rhs: Expr) -> ExprResult {
                self.binary($op, &rhs)
            }
        }

        impl $trait<&Expr> for Expr {
            type Output = ExprResult;
            fn $method(self, rhs: &Expr) -> ExprResult {
                self.binary($op, rhs)
            }
        }

        impl $trait<Expr> for Expr {
            type Output = ExprResult;
            fn $method(self, rhs: Expr) -> ExprResult {
                self.binary($op, &rhs)
            }
        }

        impl $trait<f64> for &Expr {
            type Output = ExprResult;
            fn $method(self, rhs: f64) -> ExprResult {
                self.binary($op, &self.pool.scalar(rhs))
            }
        }

        impl $trait<f64> for Expr {
            type Output = ExprResult;
            fn $method(self, rhs: f64) -> ExprResult {
                self.binary($op, &self.pool.scalar(rhs))
            }
        }

        impl $trait<&Expr> for f64 {
            type Output = ExprResult;
            fn $method(self, rhs: &Expr) -> ExprResult {
                rhs.pool.scalar(self).binary($op, rhs)
            }
        }

        impl $trait<Expr> for f64 {
            type Output = ExprResult;
            fn $method(self, rhs: Expr) -> ExprResult {
                rhs.pool.scalar(self).binary($op, &rhs)
            }
        }

        impl $trait<ExprResult> for &Expr {
            type Output = ExprResult;
            fn $method(self, rhs: ExprResult) -> ExprResult {
                self.binary($op, &rhs?)
            }
        }

        impl $trait<ExprResult> for Expr {
            type Output = ExprResult;
            fn $method(self, rhs: ExprResult) -> ExprResult {
                self.binary($op, &rhs?)
            }
        }

        impl $trait<&Expr> for ExprResult {
            type Output = ExprResult;
            fn $method(self, rhs: &Expr) -> ExprResult {
                self?.binary($op, rhs)
            }
        }

        impl $trait<Expr> for ExprResult {
            type Output = ExprResult;
            fn $method(self, rhs: Expr) -> ExprResult {
                self?.binary($op, &rhs)
            }
        }
    };
}

impl_binary!(Add, add, BinaryOp::Add);
impl_binary!(Sub, sub, BinaryOp::Sub);
impl_binary!(Mul, mul, BinaryOp::Mul);
impl_binary!(Div, div, BinaryOp::Div);

impl Neg for &Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        self.unary(UnaryOp::Neg)
    }
}

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        self.unary(UnaryOp::Neg)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ModelError;
    use crate::expression::domain::*;
    use crate::expression::*;

    #[test]
    fn mismatched_domains_fail_when_combined() {
        let pool = ExprPool::new();
        let a = pool.variable("a", Domains::primary(&[NEGATIVE_ELECTRODE])).unwrap();
        let b = pool.variable("b", Domains::primary(&[POSITIVE_ELECTRODE])).unwrap();
        assert!(matches!(a.expr() + b.expr(), Err(ModelError::Domain(_))));
        assert!(matches!((a.expr() * 2.0) - b.expr(), Err(ModelError::Domain(_))));
    }

    #[test]
    fn scalars_broadcast_against_any_domain() {
        let pool = ExprPool::new();
        let a = pool.variable("a", Domains::primary(&[SEPARATOR])).unwrap();
        let e = (1.0 - a.expr()).unwrap();
        assert_eq!(e.domains(), Domains::primary(&[SEPARATOR]));
    }

    #[test]
    fn chained_results_propagate_the_first_error() {
        let pool = ExprPool::new();
        let a = pool.variable("a", Domains::primary(&[SEPARATOR])).unwrap();
        let other = ExprPool::new().scalar(1.0);
        let err = (a.expr() + &other) * a.expr();
        assert!(matches!(err, Err(ModelError::Configuration(_))));
    }
}
