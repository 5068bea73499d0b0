//! Problem files and the whole-unit compile pipeline.
//!
//! A problem file holds a range on its first line followed by three postfix expressions,
//! one per line:
//!
//! ```text
//! 0.5 3
//! x 2 ^
//! x sin 2 +
//! 1 x /
//! ```
//!
//! Compiling a problem parses all three expressions (`f1`..`f3`), differentiates each one
//! (`df1`..`df3`) and assembles the six routines into one unit. Any failure aborts the whole
//! run; there is no partial unit.
//!
//! # Example
//!
//! ```
//! use postfix_jit::Problem;
//!
//! let problem: Problem = "0 1\nx 2 ^\nx sin\n3".parse().unwrap();
//! let compiled = problem.compile().unwrap();
//! assert_eq!(compiled.tree("df1").unwrap().eval(3.0), 6.0);
//! assert!(compiled.unit().to_string().starts_with("section .data"));
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use colored::Colorize;
use itertools::Itertools;
use tracing::{debug, info, warn};

use crate::{
    assembly::{routine_label, Assembler, AssemblyUnit},
    builder::{compile_unit, CompiledUnit},
    convert::build_ast,
    errors::{CompileError, ProblemError},
    expr::Expr,
};

/// Number of expressions in a problem.
pub const EXPRESSION_COUNT: usize = 3;

/// Relative tolerance when checking compiled routines against their trees.
pub const VERIFY_TOLERANCE: f64 = 1e-9;

/// A range and three postfix expressions of `x`.
#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    range: (f64, f64),
    sources: [String; EXPRESSION_COUNT],
}

impl FromStr for Problem {
    type Err = ProblemError;

    /// Parses problem text. `\r\n` line endings are accepted and anything after the two
    /// bounds on the first line is ignored.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut lines = text.lines();

        let header = lines.next().ok_or(ProblemError::MissingRange)?;
        let mut bounds = header.split_whitespace();
        let mut bound = || -> Result<f64, ProblemError> {
            let token = bounds.next().ok_or(ProblemError::MissingRange)?;
            token
                .parse::<f64>()
                .map_err(|_| ProblemError::InvalidBound(token.to_string()))
        };
        let range = (bound()?, bound()?);

        let mut sources: [String; EXPRESSION_COUNT] = Default::default();
        for (index, source) in sources.iter_mut().enumerate() {
            *source = lines
                .next()
                .ok_or(ProblemError::MissingExpression(index + 1))?
                .to_string();
        }

        Ok(Self { range, sources })
    }
}

impl Problem {
    pub fn new(range: (f64, f64), sources: [String; EXPRESSION_COUNT]) -> Self {
        Self { range, sources }
    }

    /// Reads and parses a problem file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CompileError> {
        let text = std::fs::read_to_string(path)?;
        Ok(text.parse::<Problem>()?)
    }

    pub fn range(&self) -> (f64, f64) {
        self.range
    }

    pub fn sources(&self) -> &[String; EXPRESSION_COUNT] {
        &self.sources
    }

    /// Builds the trees of all expressions and their derivatives, then assembles the unit.
    ///
    /// # Returns
    /// * `Result<CompiledProblem, CompileError>` - The six trees and their assembly unit
    ///
    /// # Errors
    /// Returns `CompileError` if:
    /// - An expression has a syntax error (`Syntax`, labelled with its routine)
    /// - An expression has no supported derivative (`Derivative`)
    /// - An emitted routine fails verification (`Codegen`)
    pub fn compile(&self) -> Result<CompiledProblem, CompileError> {
        let mut trees: Vec<(String, Expr)> = Vec::with_capacity(2 * EXPRESSION_COUNT);

        for (index, source) in self.sources.iter().enumerate() {
            let label = routine_label(index, false);
            let expr = build_ast(source).map_err(|source| CompileError::Syntax {
                label: label.clone(),
                source,
            })?;
            info!(routine = %label, %expr, "parsed expression");
            trees.push((label, expr));
        }

        for index in 0..EXPRESSION_COUNT {
            let (label, expr) = &trees[index];
            let derivative = expr
                .derivative()
                .map_err(|source| CompileError::Derivative {
                    label: label.clone(),
                    source,
                })?;
            let label = routine_label(index, true);
            debug!(routine = %label, expr = %derivative, nodes = derivative.node_count(), "derived expression");
            trees.push((label, *derivative));
        }

        let entries: Vec<(&str, &Expr)> = trees
            .iter()
            .map(|(label, expr)| (label.as_str(), expr))
            .collect();
        let unit = Assembler::new().assemble(&entries)?;

        Ok(CompiledProblem {
            range: self.range,
            trees,
            unit,
        })
    }
}

/// The trees of a problem together with their assembly unit.
#[derive(Clone, PartialEq)]
pub struct CompiledProblem {
    range: (f64, f64),
    trees: Vec<(String, Expr)>,
    unit: AssemblyUnit,
}

impl fmt::Debug for CompiledProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{{")?;
        writeln!(
            f,
            "    {}: [{}, {}]",
            "Range".cyan(),
            self.range.0,
            self.range.1
        )?;
        for (label, expr) in &self.trees {
            writeln!(f, "    {}: {}", label.cyan(), expr)?;
        }
        writeln!(
            f,
            "    {}: [{}]",
            "Constants".cyan(),
            self.unit.constants.iter().join(", ")
        )?;
        writeln!(f, "}}")
    }
}

impl CompiledProblem {
    pub fn range(&self) -> (f64, f64) {
        self.range
    }

    /// Labelled trees in routine order: `f1`..`f3`, then `df1`..`df3`.
    pub fn trees(&self) -> impl Iterator<Item = (&str, &Expr)> {
        self.trees.iter().map(|(label, expr)| (label.as_str(), expr))
    }

    /// Tree of the routine `label`.
    pub fn tree(&self, label: &str) -> Option<&Expr> {
        self.trees()
            .find(|(name, _)| *name == label)
            .map(|(_, expr)| expr)
    }

    pub fn unit(&self) -> &AssemblyUnit {
        &self.unit
    }

    /// JIT-compiles the six routines.
    pub fn jit(&self) -> Result<CompiledUnit, CompileError> {
        Ok(compile_unit(&self.unit)?)
    }

    /// JIT-compiles the routines and checks each one against its tree on `samples + 1`
    /// evenly spaced points of the range.
    ///
    /// Points where the tree itself is not finite are skipped, and so are points where the
    /// compiled routine is not finite because a power has a non-positive base there. Every
    /// other non-finite compiled value is a mismatch.
    ///
    /// # Errors
    /// Returns `CompileError` if:
    /// - A routine differs from its tree by more than `VERIFY_TOLERANCE` (`Mismatch`)
    /// - No sample point could check some routine (`Unverified`)
    pub fn verify(&self, samples: usize) -> Result<CompiledUnit, CompileError> {
        let compiled = self.jit()?;
        let steps = samples.max(1);

        for (label, expr) in self.trees() {
            let Some(function) = compiled.get(label) else {
                continue;
            };
            check_routine(label, expr, |x| function(x), self.range, steps)?;
        }

        info!(routines = compiled.len(), samples = steps + 1, "verified compiled routines");
        Ok(compiled)
    }
}

/// Compares `function` with `expr` on `steps + 1` points of `[a, b]` and returns how many
/// points were checked.
fn check_routine(
    label: &str,
    expr: &Expr,
    function: impl Fn(f64) -> f64,
    (a, b): (f64, f64),
    steps: usize,
) -> Result<usize, CompileError> {
    let mut checked = 0usize;
    let mut skipped = 0usize;

    for step in 0..=steps {
        let x = a + (b - a) * step as f64 / steps as f64;
        let expected = expr.eval(x);
        let actual = function(x);

        if !expected.is_finite() {
            skipped += 1;
            continue;
        }
        if !actual.is_finite() && expr.outside_pow_domain(x) {
            skipped += 1;
            continue;
        }
        // NaN fails this comparison, so it is tested separately.
        let tolerance = VERIFY_TOLERANCE * expected.abs().max(1.0);
        if actual.is_nan() || (actual - expected).abs() > tolerance {
            return Err(CompileError::Mismatch {
                label: label.to_string(),
                x,
                compiled: actual,
                expected,
            });
        }
        checked += 1;
    }

    if checked == 0 {
        return Err(CompileError::Unverified {
            label: label.to_string(),
        });
    }
    if skipped > 0 {
        warn!(routine = label, checked, skipped, "routine is undefined at some sample points");
    }
    Ok(checked)
}
