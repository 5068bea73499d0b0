//! Expression module for representing postfix-compiled scalar expressions.
//!
//! This module defines the expression tree shared by every pipeline stage. The main types are:
//!
//! - `Expr`: An enum representing the nodes of an expression in the single variable `x`
//! - `BinaryOp`: The binary operator kinds `+ - * / ^`
//! - `UnaryOp`: The function kinds `sin cos tan ctg`
//!
//! The expression tree is built recursively using `Box<Expr>` for nested expressions. Every node
//! exclusively owns its children, so `clone()` is a deep copy with no aliasing to the source.
//! Trees can be:
//! - Symbolically differentiated with respect to `x`
//! - Evaluated directly at a point
//! - Lowered to stack-machine instructions (see [`crate::codegen`])
//!
//! # Symbolic Differentiation
//! The derivative method recursively applies:
//! - Sum and difference rules
//! - Product rule
//! - Quotient rule
//! - Exponential rule for `c^g` and power rule for `f^c`
//! - Chain rule for sin, cos, tan and cot
//!
//! The result is not simplified: a `0 * f` term stays in the tree.

use std::fmt;

use crate::errors::UnsupportedDerivativeError;

/// Binary operator kinds, in postfix input order `left right op`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    /// Maps an operator character to its kind.
    pub fn from_symbol(c: char) -> Option<Self> {
        match c {
            '+' => Some(BinaryOp::Add),
            '-' => Some(BinaryOp::Sub),
            '*' => Some(BinaryOp::Mul),
            '/' => Some(BinaryOp::Div),
            '^' => Some(BinaryOp::Pow),
            _ => None,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Sub => '-',
            BinaryOp::Mul => '*',
            BinaryOp::Div => '/',
            BinaryOp::Pow => '^',
        }
    }

    /// Builds the node `left op right`.
    pub fn apply(self, left: Box<Expr>, right: Box<Expr>) -> Expr {
        match self {
            BinaryOp::Add => Expr::Add(left, right),
            BinaryOp::Sub => Expr::Sub(left, right),
            BinaryOp::Mul => Expr::Mul(left, right),
            BinaryOp::Div => Expr::Div(left, right),
            BinaryOp::Pow => Expr::Pow(left, right),
        }
    }
}

/// Function kinds. `Cot` is spelled `ctg` in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Sin,
    Cos,
    Tan,
    Cot,
}

impl UnaryOp {
    /// Maps a function name to its kind. Only `sin`, `cos`, `tan` and `ctg` are known.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sin" => Some(UnaryOp::Sin),
            "cos" => Some(UnaryOp::Cos),
            "tan" => Some(UnaryOp::Tan),
            "ctg" => Some(UnaryOp::Cot),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Sin => "sin",
            UnaryOp::Cos => "cos",
            UnaryOp::Tan => "tan",
            UnaryOp::Cot => "ctg",
        }
    }

    /// Builds the node `op(operand)`.
    pub fn apply(self, operand: Box<Expr>) -> Expr {
        match self {
            UnaryOp::Sin => Expr::Sin(operand),
            UnaryOp::Cos => Expr::Cos(operand),
            UnaryOp::Tan => Expr::Tan(operand),
            UnaryOp::Cot => Expr::Cot(operand),
        }
    }
}

/// An expression tree node.
///
/// This enum is a closed set of node kinds over the single variable `x`:
/// - Leaves: constants and the variable
/// - Binary operations: Add, Sub, Mul, Div, Pow
/// - Unary operations: Sin, Cos, Tan, Cot
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A constant floating point value
    Const(f64),
    /// The independent variable `x`
    Var,
    /// Addition of two expressions
    Add(Box<Expr>, Box<Expr>),
    /// Subtraction of two expressions
    Sub(Box<Expr>, Box<Expr>),
    /// Multiplication of two expressions
    Mul(Box<Expr>, Box<Expr>),
    /// Division of two expressions
    Div(Box<Expr>, Box<Expr>),
    /// Exponentiation of an expression by another expression
    Pow(Box<Expr>, Box<Expr>),
    /// Sine of an expression (argument in radians)
    Sin(Box<Expr>),
    /// Cosine of an expression (argument in radians)
    Cos(Box<Expr>),
    /// Tangent of an expression (argument in radians)
    Tan(Box<Expr>),
    /// Cotangent of an expression (argument in radians)
    Cot(Box<Expr>),
}

impl Expr {
    /// Computes the symbolic derivative of this expression with respect to `x`.
    ///
    /// Recursively applies the rules of differentiation to build a new, independently
    /// owned expression tree. The input is never modified. The rules implemented are:
    /// - d/dx(c) = 0, d/dx(x) = 1
    /// - Sum rule: (f + g)' = f' + g', (f - g)' = f' - g'
    /// - Product rule: (f * g)' = f' * g + f * g'
    /// - Quotient rule: (f / g)' = (f' * g - f * g') / (g * g)
    /// - Exponential rule: (c^g)' = c^g * ln(c) * g'
    /// - Power rule: (f^c)' = c * f^(c-1) * f'
    /// - sin(f)' = cos(f) * f'
    /// - cos(f)' = -1 * sin(f) * f'
    /// - tan(f)' = 1 / (cos(f) * cos(f)) * f'
    /// - ctg(f)' = -1 * (1 / (sin(f) * sin(f))) * f'
    ///
    /// # Returns
    /// A new expression tree representing the derivative
    ///
    /// # Errors
    /// Returns `UnsupportedDerivativeError` for `f^g` where neither `f` nor `g` is a constant.
    pub fn derivative(&self) -> Result<Box<Expr>, UnsupportedDerivativeError> {
        let derived = match self {
            Expr::Const(_) => Expr::Const(0.0),

            Expr::Var => Expr::Const(1.0),

            Expr::Add(left, right) => Expr::Add(left.derivative()?, right.derivative()?),

            Expr::Sub(left, right) => Expr::Sub(left.derivative()?, right.derivative()?),

            Expr::Mul(left, right) => {
                // f' * g + f * g'
                Expr::Add(
                    Box::new(Expr::Mul(left.derivative()?, right.clone())),
                    Box::new(Expr::Mul(left.clone(), right.derivative()?)),
                )
            }

            Expr::Div(left, right) => {
                // (f' * g - f * g') / (g * g)
                Expr::Div(
                    Box::new(Expr::Sub(
                        Box::new(Expr::Mul(left.derivative()?, right.clone())),
                        Box::new(Expr::Mul(left.clone(), right.derivative()?)),
                    )),
                    Box::new(Expr::Mul(right.clone(), right.clone())),
                )
            }

            Expr::Pow(base, exponent) => match (&**base, &**exponent) {
                (Expr::Const(c), _) => {
                    // c^g * ln(c) * g'
                    Expr::Mul(
                        Box::new(Expr::Mul(
                            Box::new(self.clone()),
                            Box::new(Expr::Const(c.ln())),
                        )),
                        exponent.derivative()?,
                    )
                }
                (_, Expr::Const(c)) => {
                    // c * f^(c-1) * f'
                    Expr::Mul(
                        Box::new(Expr::Mul(
                            Box::new(Expr::Const(*c)),
                            Box::new(Expr::Pow(base.clone(), Box::new(Expr::Const(c - 1.0)))),
                        )),
                        base.derivative()?,
                    )
                }
                _ => {
                    return Err(UnsupportedDerivativeError {
                        expression: self.to_string(),
                    });
                }
            },

            Expr::Sin(arg) => Expr::Mul(Box::new(Expr::Cos(arg.clone())), arg.derivative()?),

            Expr::Cos(arg) => Expr::Mul(
                Box::new(Expr::Mul(
                    Box::new(Expr::Const(-1.0)),
                    Box::new(Expr::Sin(arg.clone())),
                )),
                arg.derivative()?,
            ),

            Expr::Tan(arg) => {
                let cos = Box::new(Expr::Cos(arg.clone()));
                Expr::Mul(
                    Box::new(Expr::Div(
                        Box::new(Expr::Const(1.0)),
                        Box::new(Expr::Mul(cos.clone(), cos)),
                    )),
                    arg.derivative()?,
                )
            }

            Expr::Cot(arg) => {
                let sin = Box::new(Expr::Sin(arg.clone()));
                Expr::Mul(
                    Box::new(Expr::Mul(
                        Box::new(Expr::Const(-1.0)),
                        Box::new(Expr::Div(
                            Box::new(Expr::Const(1.0)),
                            Box::new(Expr::Mul(sin.clone(), sin)),
                        )),
                    )),
                    arg.derivative()?,
                )
            }
        };
        Ok(Box::new(derived))
    }

    /// Evaluates the tree directly at `x`.
    pub fn eval(&self, x: f64) -> f64 {
        match self {
            Expr::Const(value) => *value,
            Expr::Var => x,
            Expr::Add(left, right) => left.eval(x) + right.eval(x),
            Expr::Sub(left, right) => left.eval(x) - right.eval(x),
            Expr::Mul(left, right) => left.eval(x) * right.eval(x),
            Expr::Div(left, right) => left.eval(x) / right.eval(x),
            Expr::Pow(base, exponent) => base.eval(x).powf(exponent.eval(x)),
            Expr::Sin(arg) => arg.eval(x).sin(),
            Expr::Cos(arg) => arg.eval(x).cos(),
            Expr::Tan(arg) => arg.eval(x).tan(),
            Expr::Cot(arg) => 1.0 / arg.eval(x).tan(),
        }
    }

    /// Returns true if some power in the tree has a base that is not positive at `x`.
    ///
    /// Compiled powers go through `log2` of the base, so they are NaN at such points even
    /// where `powf` is defined.
    pub fn outside_pow_domain(&self, x: f64) -> bool {
        match self {
            Expr::Const(_) | Expr::Var => false,
            Expr::Pow(base, exponent) => {
                let value = base.eval(x);
                value <= 0.0
                    || value.is_nan()
                    || base.outside_pow_domain(x)
                    || exponent.outside_pow_domain(x)
            }
            Expr::Add(left, right)
            | Expr::Sub(left, right)
            | Expr::Mul(left, right)
            | Expr::Div(left, right) => {
                left.outside_pow_domain(x) || right.outside_pow_domain(x)
            }
            Expr::Sin(arg) | Expr::Cos(arg) | Expr::Tan(arg) | Expr::Cot(arg) => {
                arg.outside_pow_domain(x)
            }
        }
    }

    /// Returns the number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        match self {
            Expr::Const(_) | Expr::Var => 1,
            Expr::Add(left, right)
            | Expr::Sub(left, right)
            | Expr::Mul(left, right)
            | Expr::Div(left, right)
            | Expr::Pow(left, right) => 1 + left.node_count() + right.node_count(),
            Expr::Sin(arg) | Expr::Cos(arg) | Expr::Tan(arg) | Expr::Cot(arg) => {
                1 + arg.node_count()
            }
        }
    }
}

/// Formats expressions in infix notation.
///
/// Binary operations are wrapped in parentheses and functions use call notation,
/// so the output is unambiguous without precedence rules.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(val) => write!(f, "{val}"),
            Expr::Var => write!(f, "x"),
            Expr::Add(left, right) => write!(f, "({left} + {right})"),
            Expr::Sub(left, right) => write!(f, "({left} - {right})"),
            Expr::Mul(left, right) => write!(f, "({left} * {right})"),
            Expr::Div(left, right) => write!(f, "({left} / {right})"),
            Expr::Pow(base, exponent) => write!(f, "({base} ^ {exponent})"),
            Expr::Sin(arg) => write!(f, "sin({arg})"),
            Expr::Cos(arg) => write!(f, "cos({arg})"),
            Expr::Tan(arg) => write!(f, "tan({arg})"),
            Expr::Cot(arg) => write!(f, "ctg({arg})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var() -> Box<Expr> {
        Box::new(Expr::Var)
    }

    fn c(value: f64) -> Box<Expr> {
        Box::new(Expr::Const(value))
    }

    #[test]
    fn test_leaf_derivatives() {
        assert_eq!(*Expr::Const(5.0).derivative().unwrap(), Expr::Const(0.0));
        assert_eq!(*Expr::Var.derivative().unwrap(), Expr::Const(1.0));
    }

    #[test]
    fn test_sum_rule() {
        let sum = Expr::Add(var(), c(2.0));
        assert_eq!(*sum.derivative().unwrap(), Expr::Add(c(1.0), c(0.0)));

        let diff = Expr::Sub(var(), var());
        assert_eq!(*diff.derivative().unwrap(), Expr::Sub(c(1.0), c(1.0)));
    }

    #[test]
    fn test_product_rule() {
        // (x * 3)' = 1 * 3 + x * 0
        let product = Expr::Mul(var(), c(3.0));
        assert_eq!(
            *product.derivative().unwrap(),
            Expr::Add(
                Box::new(Expr::Mul(c(1.0), c(3.0))),
                Box::new(Expr::Mul(var(), c(0.0)))
            )
        );
    }

    #[test]
    fn test_quotient_rule() {
        // (1 / x)' = (0 * x - 1 * 1) / (x * x)
        let quotient = Expr::Div(c(1.0), var());
        assert_eq!(
            *quotient.derivative().unwrap(),
            Expr::Div(
                Box::new(Expr::Sub(
                    Box::new(Expr::Mul(c(0.0), var())),
                    Box::new(Expr::Mul(c(1.0), c(1.0)))
                )),
                Box::new(Expr::Mul(var(), var()))
            )
        );
    }

    #[test]
    fn test_power_rules() {
        // (x ^ 3)' = 3 * x^2 * 1
        let power = Expr::Pow(var(), c(3.0));
        assert_eq!(
            *power.derivative().unwrap(),
            Expr::Mul(
                Box::new(Expr::Mul(c(3.0), Box::new(Expr::Pow(var(), c(2.0))))),
                c(1.0)
            )
        );

        // (2 ^ x)' = 2^x * ln 2 * 1
        let exponential = Expr::Pow(c(2.0), var());
        assert_eq!(
            *exponential.derivative().unwrap(),
            Expr::Mul(
                Box::new(Expr::Mul(
                    Box::new(exponential.clone()),
                    c(std::f64::consts::LN_2)
                )),
                c(1.0)
            )
        );

        // Constant base wins when both sides are constant.
        let both = Expr::Pow(c(2.0), c(3.0));
        assert!(matches!(*both.derivative().unwrap(), Expr::Mul(_, ref g) if **g == Expr::Const(0.0)));
    }

    #[test]
    fn test_general_power_is_unsupported() {
        let err = Expr::Pow(var(), var()).derivative().unwrap_err();
        assert_eq!(err.expression, "(x ^ x)");

        // The failure propagates out of enclosing nodes.
        let nested = Expr::Sin(Box::new(Expr::Add(
            c(1.0),
            Box::new(Expr::Pow(var(), Box::new(Expr::Sin(var())))),
        )));
        assert!(nested.derivative().is_err());
    }

    #[test]
    fn test_trig_derivatives() {
        assert_eq!(
            *Expr::Sin(var()).derivative().unwrap(),
            Expr::Mul(Box::new(Expr::Cos(var())), c(1.0))
        );
        assert_eq!(
            *Expr::Cos(var()).derivative().unwrap(),
            Expr::Mul(
                Box::new(Expr::Mul(c(-1.0), Box::new(Expr::Sin(var())))),
                c(1.0)
            )
        );
        assert_eq!(
            *Expr::Tan(var()).derivative().unwrap(),
            Expr::Mul(
                Box::new(Expr::Div(
                    c(1.0),
                    Box::new(Expr::Mul(Box::new(Expr::Cos(var())), Box::new(Expr::Cos(var()))))
                )),
                c(1.0)
            )
        );
        assert_eq!(
            *Expr::Cot(var()).derivative().unwrap(),
            Expr::Mul(
                Box::new(Expr::Mul(
                    c(-1.0),
                    Box::new(Expr::Div(
                        c(1.0),
                        Box::new(Expr::Mul(
                            Box::new(Expr::Sin(var())),
                            Box::new(Expr::Sin(var()))
                        ))
                    ))
                )),
                c(1.0)
            )
        );
    }

    #[test]
    fn test_derivative_leaves_input_untouched() {
        let expr = Expr::Mul(Box::new(Expr::Sin(var())), var());
        let before = expr.clone();
        let _ = expr.derivative().unwrap();
        assert_eq!(expr, before);
    }

    #[test]
    fn test_eval() {
        let expr = Expr::Sub(c(3.0), c(4.0));
        assert_eq!(expr.eval(0.0), -1.0);

        let expr = Expr::Div(Box::new(Expr::Pow(var(), c(2.0))), c(4.0));
        assert_eq!(expr.eval(2.0), 1.0);

        let cot = Expr::Cot(var());
        assert!((cot.eval(0.5) - 1.0 / 0.5f64.tan()).abs() < 1e-12);
    }

    #[test]
    fn test_outside_pow_domain() {
        let square = Expr::Pow(var(), c(2.0));
        assert!(square.outside_pow_domain(-1.0));
        assert!(square.outside_pow_domain(0.0));
        assert!(!square.outside_pow_domain(0.5));

        let nested = Expr::Sin(Box::new(Expr::Pow(c(2.0), Box::new(Expr::Pow(var(), c(0.5))))));
        assert!(nested.outside_pow_domain(-4.0));
        assert!(!nested.outside_pow_domain(4.0));

        let free = Expr::Div(Box::new(Expr::Tan(var())), var());
        assert!(!free.outside_pow_domain(-2.0));
        assert!(!free.outside_pow_domain(0.0));
    }

    #[test]
    fn test_display() {
        let expr = Expr::Add(
            Box::new(Expr::Mul(c(2.0), var())),
            Box::new(Expr::Cot(Box::new(Expr::Pow(var(), c(0.5))))),
        );
        assert_eq!(expr.to_string(), "((2 * x) + ctg((x ^ 0.5)))");
        assert_eq!(expr.node_count(), 8);
    }
}
