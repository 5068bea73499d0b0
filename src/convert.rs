//! Conversion module for turning postfix source text into the internal expression tree.
//!
//! This module drives the lexer and evaluates the postfix grammar with an explicit operand
//! stack (a shift-reduce pass with no precedence handling, since postfix order is already
//! unambiguous). Operands push leaves, operators pop two nodes and functions pop one.
//!
//! The main entry point is the `build_ast` function.

use tracing::trace;

use crate::{
    errors::{LexicalError, SyntaxError},
    expr::{Expr, UnaryOp},
    lexer::{Lexer, Position, TokenKind},
};

/// Converts a postfix expression string into an expression tree.
///
/// Tokens are consumed left to right:
/// * Numbers, `x`, `pi` and `e` push a leaf
/// * An operator pops the right operand first, then the left one, and pushes `left op right`
/// * A function name pops one operand and pushes the function node
///
/// Exactly one operand must remain once the input ends.
///
/// # Arguments
/// * `source` - The expression in postfix notation, e.g. `"x 2 ^ 3 +"`
///
/// # Returns
/// * `Result<Expr, SyntaxError>` - The expression tree or the first error, with its position
///
/// # Example
/// ```
/// # use postfix_jit::convert::build_ast;
/// let expr = build_ast("3 4 -").unwrap();
/// assert_eq!(expr.eval(0.0), -1.0);
/// ```
pub fn build_ast(source: &str) -> Result<Expr, SyntaxError> {
    let mut lexer = Lexer::new(source);
    let mut stack: Vec<Box<Expr>> = Vec::new();

    loop {
        let token = lexer.current();
        let position = token.position;

        match &token.kind {
            TokenKind::Number(value) => stack.push(Box::new(Expr::Const(*value))),

            TokenKind::Variable => stack.push(Box::new(Expr::Var)),

            TokenKind::NamedConstant(name) => {
                let value = named_constant(name).ok_or_else(|| SyntaxError::UnknownConstant {
                    name: name.clone(),
                    position,
                })?;
                stack.push(Box::new(Expr::Const(value)));
            }

            TokenKind::Operator(op) => {
                let [left, right] = pop_operands::<2>(&mut stack, op.symbol().to_string(), position)?;
                stack.push(Box::new(op.apply(left, right)));
            }

            TokenKind::FunctionName(name) => {
                let [operand] = pop_operands::<1>(&mut stack, name.clone(), position)?;
                let op = UnaryOp::from_name(name).ok_or_else(|| SyntaxError::UnknownFunction {
                    name: name.clone(),
                    position,
                })?;
                stack.push(Box::new(op.apply(operand)));
            }

            TokenKind::Invalid(ch) => {
                return Err(LexicalError { ch: *ch, position }.into());
            }

            TokenKind::EndOfInput => break,
        }

        lexer.advance();
    }

    let end = lexer.current().position;
    match stack.len() {
        1 => {
            let expr = *stack.remove(0);
            trace!(%expr, "built expression tree");
            Ok(expr)
        }
        0 => Err(SyntaxError::EmptyExpression { position: end }),
        count => Err(SyntaxError::LeftoverOperands {
            count,
            position: end,
        }),
    }
}

/// Literal value of a named constant.
fn named_constant(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(std::f64::consts::PI),
        "e" => Some(std::f64::consts::E),
        _ => None,
    }
}

/// Pops `N` operands, returned in push order (the top of the stack comes last).
fn pop_operands<const N: usize>(
    stack: &mut Vec<Box<Expr>>,
    symbol: String,
    position: Position,
) -> Result<[Box<Expr>; N], SyntaxError> {
    if stack.len() < N {
        return Err(SyntaxError::MissingOperands {
            symbol,
            expected: N,
            found: stack.len(),
            position,
        });
    }
    let operands: Vec<Box<Expr>> = stack.split_off(stack.len() - N);
    operands
        .try_into()
        .map_err(|_| SyntaxError::MissingOperands {
            symbol,
            expected: N,
            found: 0,
            position,
        })
}
