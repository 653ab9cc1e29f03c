//! Expression compiler and evaluator: token-stream parsing with adjacency
//! validation, and the shunting-yard evaluator over the compiled stream.

pub mod compile;
pub mod eval;

use crate::value::Value;

/// The result of evaluating one compiled expression: a sequence of values,
/// possibly with `Separator` sentinels interleaved between sub-results.
pub type ExpressionValue = Vec<Value>;

pub use compile::compile_expression;
pub use eval::{evaluate_expression, EvalContext, SystemVarSource};
