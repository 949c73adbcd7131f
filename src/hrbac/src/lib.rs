//! # HRBAC
//!
//! Hierarchical role-based access control with composable predicates.
//!
//! ## Features
//!
//! - **Role hierarchy** with multiple inheritance, resolved fresh on every request
//! - **One namespace** for roles and named predicates
//! - **AND / OR / NOT algebra** that keeps synchronous predicates synchronous
//! - **Guards** with three outcomes: granted, denied or errored
//! - **Pluggable handlers** for denials and predicate faults
//! - **JSON policy documents** for declaring roles and rules
//!
//! ## Example
//!
//! ```rust
//! use hrbac::{Hrbac, Parents, Predicate};
//! use serde_json::{json, Value};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hrbac: Hrbac<Value> = Hrbac::new();
//!     hrbac.add_role("user", Parents::None)?;
//!     hrbac.add_role("admin", "user")?;
//!     hrbac.add_function(
//!         "is group owner",
//!         Predicate::deferred(|req: &Value, _: &()| {
//!             Box::pin(async move { Ok(req["params"]["groupId"] == 10) })
//!         }),
//!     )?;
//!
//!     let rule = hrbac.or("admin", hrbac.and("user", "is group owner")?)?;
//!     let guard = hrbac.middleware(rule, None)?;
//!
//!     let request = json!({ "user": { "role": "user" }, "params": { "groupId": 10 } });
//!     guard.check(&request, &()).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod claim;
pub mod document;
pub mod engine;
pub mod error;
pub mod graph;
pub mod guard;
pub mod predicate;
pub mod registry;
pub mod store;

// Re-export commonly used types
pub use claim::{RoleClaim, RoleClaimSource, RoleExtractor};
pub use document::{PolicyDocument, RoleDeclaration, RuleDeclaration};
pub use engine::Hrbac;
pub use error::{EvaluationError, HrbacError, Result, RoleError};
pub use graph::{Parents, RoleGraph};
pub use guard::{
    Guard, GuardData, GuardOutcome, InternalErrorHandler, Rejection, RejectionKind,
    UnauthorizedHandler,
};
pub use predicate::{ExecutionMode, Operand, Predicate, PredicateResult};
pub use registry::EntryKind;
pub use store::{InstanceStore, DEFAULT_INSTANCE};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
