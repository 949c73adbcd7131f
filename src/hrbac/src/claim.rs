//! Role claims, role extractors and the role predicate compiler
//!
//! A role predicate asks the configured extractor for the request's raw
//! role claim, checks its shape, expands it through the role graph and
//! tests whether the declared role is in the expanded set. The extractor
//! is captured when the role is declared; the graph is read on every
//! evaluation.

use crate::error::{HrbacError, RoleError};
use crate::graph::RoleGraph;
use crate::predicate::{ExecutionMode, Predicate, PredicateResult};
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// JSON pointer read by the default claim source on `serde_json::Value` requests
pub const DEFAULT_ROLE_CLAIM_POINTER: &str = "/user/role";

/// Raw claim produced by an extractor
///
/// `Ok(None)` means the request carries no claim at all.
pub type ExtractResult = anyhow::Result<Option<Value>>;

/// Validate that `value` is a present, non-null, non-empty string
///
/// `what` names the parameter in the resulting error.
pub fn validate_label<'v>(value: Option<&'v Value>, what: &str) -> Result<&'v str, HrbacError> {
    match value {
        None => Err(HrbacError::UndefinedParameter(what.to_string())),
        Some(Value::Null) => Err(HrbacError::NullParameter(what.to_string())),
        Some(Value::String(s)) if s.is_empty() => {
            Err(HrbacError::EmptyParameter(what.to_string()))
        }
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(HrbacError::NotAString(what.to_string())),
    }
}

/// Validated role claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleClaim {
    /// The request claims exactly one role
    Single(String),
    /// The request claims several roles
    Multiple(Vec<String>),
}

impl RoleClaim {
    /// Validate a raw claim
    ///
    /// Accepts a non-empty string or a non-empty array of non-empty
    /// strings. Arrays mixing strings with anything else are rejected.
    pub fn from_value(raw: Option<&Value>) -> Result<Self, RoleError> {
        match raw {
            Some(Value::Array(items)) => {
                if items.is_empty() {
                    return Err(HrbacError::EmptyParameter("role claim".to_string()).into());
                }

                let roles = items
                    .iter()
                    .map(|item| validate_label(Some(item), "role claim entry").map(str::to_string))
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(RoleClaim::Multiple(roles))
            }
            other => Ok(RoleClaim::Single(
                validate_label(other, "role claim")?.to_string(),
            )),
        }
    }

    /// Claimed role labels
    pub fn roles(&self) -> &[String] {
        match self {
            RoleClaim::Single(role) => std::slice::from_ref(role),
            RoleClaim::Multiple(roles) => roles,
        }
    }
}

impl fmt::Display for RoleClaim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleClaim::Single(role) => write!(f, "{}", role),
            RoleClaim::Multiple(roles) => write!(f, "[{}]", roles.join(", ")),
        }
    }
}

/// Request types that carry a conventional role claim
///
/// Used by the default role extractor.
pub trait RoleClaimSource {
    /// The raw role claim, or `None` when the request carries none
    fn role_claim(&self) -> Option<Value>;
}

impl RoleClaimSource for Value {
    fn role_claim(&self) -> Option<Value> {
        self.pointer(DEFAULT_ROLE_CLAIM_POINTER).cloned()
    }
}

type ImmediateExtractFn<C, A> = dyn Fn(&C, &A) -> ExtractResult + Send + Sync;
type DeferredExtractFn<C, A> =
    dyn for<'a> Fn(&'a C, &'a A) -> BoxFuture<'a, ExtractResult> + Send + Sync;

/// Callback mapping a request to its raw role claim
pub enum RoleExtractor<C, A = ()> {
    /// Claim is available synchronously
    Immediate(Arc<ImmediateExtractFn<C, A>>),
    /// Claim is available after a suspension point
    Deferred(Arc<DeferredExtractFn<C, A>>),
}

impl<C, A> Clone for RoleExtractor<C, A> {
    fn clone(&self) -> Self {
        match self {
            RoleExtractor::Immediate(f) => RoleExtractor::Immediate(Arc::clone(f)),
            RoleExtractor::Deferred(f) => RoleExtractor::Deferred(Arc::clone(f)),
        }
    }
}

impl<C, A> fmt::Debug for RoleExtractor<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleExtractor::Immediate(_) => write!(f, "RoleExtractor::Immediate"),
            RoleExtractor::Deferred(_) => write!(f, "RoleExtractor::Deferred"),
        }
    }
}

impl<C, A> RoleExtractor<C, A>
where
    C: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    /// Wrap a synchronous extractor
    pub fn immediate<F>(f: F) -> Self
    where
        F: Fn(&C, &A) -> ExtractResult + Send + Sync + 'static,
    {
        RoleExtractor::Immediate(Arc::new(f))
    }

    /// Wrap an asynchronous extractor
    pub fn deferred<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a C, &'a A) -> BoxFuture<'a, ExtractResult> + Send + Sync + 'static,
    {
        RoleExtractor::Deferred(Arc::new(f))
    }

    /// Extractor reading [`RoleClaimSource::role_claim`]
    pub fn claim_source() -> Self
    where
        C: RoleClaimSource,
    {
        Self::immediate(|ctx, _| Ok(ctx.role_claim()))
    }

    /// Execution mode of this extractor
    pub fn mode(&self) -> ExecutionMode {
        match self {
            RoleExtractor::Immediate(_) => ExecutionMode::Immediate,
            RoleExtractor::Deferred(_) => ExecutionMode::Deferred,
        }
    }

    /// Extract the raw claim from a request
    pub async fn extract(&self, ctx: &C, aux: &A) -> ExtractResult {
        match self {
            RoleExtractor::Immediate(f) => f(ctx, aux),
            RoleExtractor::Deferred(f) => f(ctx, aux).await,
        }
    }
}

/// Validate a raw claim and expand it through the role graph
pub(crate) fn expand_raw_claim(
    graph: &RwLock<RoleGraph>,
    raw: Option<&Value>,
) -> Result<(RoleClaim, HashSet<String>), RoleError> {
    let claim = RoleClaim::from_value(raw)?;
    let expanded = graph.read().ancestors_of(claim.roles());
    debug!("Claim {} expanded to {:?}", claim, expanded);
    Ok((claim, expanded))
}

fn claim_grants(graph: &RwLock<RoleGraph>, raw: ExtractResult, role: &str) -> PredicateResult {
    let raw = raw.map_err(RoleError::Extraction)?;
    let (_, expanded) = expand_raw_claim(graph, raw.as_ref())?;
    Ok(expanded.contains(role))
}

/// Build the predicate registered for a declared role
///
/// The predicate inherits the extractor's execution mode.
pub(crate) fn compile_role_predicate<C, A>(
    graph: Arc<RwLock<RoleGraph>>,
    extractor: RoleExtractor<C, A>,
    role: String,
) -> Predicate<C, A>
where
    C: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    match extractor {
        RoleExtractor::Immediate(extract) => {
            Predicate::immediate(move |ctx, aux| claim_grants(&graph, extract(ctx, aux), &role))
        }
        RoleExtractor::Deferred(extract) => Predicate::deferred(move |ctx, aux| {
            let graph = Arc::clone(&graph);
            let role = role.clone();
            let pending = extract(ctx, aux);
            Box::pin(async move { claim_grants(&graph, pending.await, &role) })
        }),
    }
}
