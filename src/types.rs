use std::sync::Arc;

/// Type alias for a JIT-compiled routine.
///
/// This represents a function that:
/// - Takes the single scalar argument `x`
/// - Returns the value the routine leaves in `st0`
/// - Is both Send and Sync for thread safety
pub type JITFunction = Arc<dyn Fn(f64) -> f64 + Send + Sync>;

/// Raw entry point of a finalized routine.
pub(crate) type RawRoutine = extern "C" fn(f64) -> f64;
