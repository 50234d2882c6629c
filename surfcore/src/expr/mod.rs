//! Expression engine.
//!
//! Source text is normalized and parsed ([`parser`]) into an [`ast::Expr`],
//! evaluated by a tree-walking interpreter ([`interp`]) against per-evaluation
//! resolvers for `prop`, `osc`, `bind` and `url` (`resolver`). Remote
//! dependencies collected during evaluation are reconciled later by the
//! [`sync::Synchronizer`]; stale identifiers are recovered by the
//! [`heal::Healer`].
pub mod ast;
pub mod bound;
pub mod error;
pub mod expression;
pub mod heal;
pub mod interp;
pub mod math;
pub mod parser;
pub(crate) mod resolver;
pub mod sync;

pub use bound::BoundExpression;
pub use error::{ExprError, ExprResult};
pub use expression::{CycleGuard, EvalArgs, Expression, ExpressionSnapshot};
pub use parser::parse;
