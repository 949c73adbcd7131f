//! Guard compiler: predicate -> three-outcome gate
//!
//! A guard evaluates its predicate and settles on exactly one of
//! Granted, Denied or Errored. Role claim failures and `false` verdicts
//! both go through the unauthorized handler; every other predicate fault
//! goes through the internal-error handler, and so does a predicate that
//! panics. Handlers are read from the owning engine on each invocation,
//! so an override applies to guards compiled before it.

use crate::error::EvaluationError;
use crate::predicate::{ExecutionMode, Predicate, PredicateResult};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Caller-supplied data attached to a guard at compile time
pub type GuardData = serde_json::Value;

/// Status code of the default unauthorized rejection
pub const UNAUTHORIZED_STATUS: u16 = 401;

/// Status code of the default internal-error rejection
pub const INTERNAL_ERROR_STATUS: u16 = 500;

/// Classification of a rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionKind {
    /// Access denied by policy
    Unauthorized,
    /// A predicate faulted while evaluating
    Internal,
}

/// Value handed to the continuation when a guard does not grant access
#[derive(Debug, Error)]
#[error("{message}")]
pub struct Rejection {
    /// Classification
    pub kind: RejectionKind,

    /// HTTP-style status code
    pub status: u16,

    /// Human-readable message
    pub message: String,

    /// Predicate fault behind an internal rejection
    #[source]
    pub cause: Option<EvaluationError>,
}

impl Rejection {
    /// Rejection with no cause attached
    pub fn new(kind: RejectionKind, status: u16, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
            cause: None,
        }
    }

    /// Default access-denied rejection
    pub fn unauthorized() -> Self {
        Self::new(RejectionKind::Unauthorized, UNAUTHORIZED_STATUS, "Unauthorized")
    }

    /// Default internal-error rejection wrapping `cause`
    pub fn internal(cause: EvaluationError) -> Self {
        Self::new(
            RejectionKind::Internal,
            INTERNAL_ERROR_STATUS,
            "Internal Server Error",
        )
        .with_cause(cause)
    }

    /// Attach the fault that caused this rejection
    pub fn with_cause(mut self, cause: EvaluationError) -> Self {
        self.cause = Some(cause);
        self
    }

    /// Whether access was denied by policy
    pub fn is_unauthorized(&self) -> bool {
        self.kind == RejectionKind::Unauthorized
    }

    /// Whether a predicate fault caused the rejection
    pub fn is_internal(&self) -> bool {
        self.kind == RejectionKind::Internal
    }
}

/// Terminal state of one guard invocation
#[derive(Debug)]
pub enum GuardOutcome {
    /// Predicate held
    Granted,
    /// Predicate did not hold, or the role claim was unusable
    Denied(Rejection),
    /// Predicate faulted
    Errored(Rejection),
}

impl GuardOutcome {
    /// Whether the predicate held
    pub fn is_granted(&self) -> bool {
        matches!(self, GuardOutcome::Granted)
    }

    /// Whether access was denied, including unusable role claims
    pub fn is_denied(&self) -> bool {
        matches!(self, GuardOutcome::Denied(_))
    }

    /// Whether the predicate faulted or panicked
    pub fn is_errored(&self) -> bool {
        matches!(self, GuardOutcome::Errored(_))
    }

    /// Rejection carried by a denied or errored outcome
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            GuardOutcome::Granted => None,
            GuardOutcome::Denied(r) | GuardOutcome::Errored(r) => Some(r),
        }
    }

    /// `Ok(())` when granted, the rejection otherwise
    pub fn into_result(self) -> Result<(), Rejection> {
        match self {
            GuardOutcome::Granted => Ok(()),
            GuardOutcome::Denied(r) | GuardOutcome::Errored(r) => Err(r),
        }
    }
}

type ImmediateUnauthorizedFn<C, A> = dyn Fn(&C, &A, Option<&GuardData>) -> Rejection + Send + Sync;
type DeferredUnauthorizedFn<C, A> =
    dyn for<'a> Fn(&'a C, &'a A, Option<&'a GuardData>) -> BoxFuture<'a, Rejection> + Send + Sync;

/// Builds the rejection for a denied request
///
/// Receives the request, the auxiliary context and the guard's data.
pub enum UnauthorizedHandler<C, A = ()> {
    /// Returns the rejection directly
    Immediate(Arc<ImmediateUnauthorizedFn<C, A>>),
    /// Returns a future resolving to the rejection
    Deferred(Arc<DeferredUnauthorizedFn<C, A>>),
}

impl<C, A> Clone for UnauthorizedHandler<C, A> {
    fn clone(&self) -> Self {
        match self {
            UnauthorizedHandler::Immediate(f) => UnauthorizedHandler::Immediate(Arc::clone(f)),
            UnauthorizedHandler::Deferred(f) => UnauthorizedHandler::Deferred(Arc::clone(f)),
        }
    }
}

impl<C, A> fmt::Debug for UnauthorizedHandler<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnauthorizedHandler::{:?}", self.mode())
    }
}

impl<C, A> Default for UnauthorizedHandler<C, A>
where
    C: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::immediate(|_, _, _| Rejection::unauthorized())
    }
}

impl<C, A> UnauthorizedHandler<C, A> {
    /// Whether invoking this handler may suspend
    pub fn mode(&self) -> ExecutionMode {
        match self {
            UnauthorizedHandler::Immediate(_) => ExecutionMode::Immediate,
            UnauthorizedHandler::Deferred(_) => ExecutionMode::Deferred,
        }
    }
}

impl<C, A> UnauthorizedHandler<C, A>
where
    C: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    /// Handler that builds its rejection synchronously
    pub fn immediate<F>(f: F) -> Self
    where
        F: Fn(&C, &A, Option<&GuardData>) -> Rejection + Send + Sync + 'static,
    {
        UnauthorizedHandler::Immediate(Arc::new(f))
    }

    /// Handler that builds its rejection in a future
    pub fn deferred<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a C, &'a A, Option<&'a GuardData>) -> BoxFuture<'a, Rejection>
            + Send
            + Sync
            + 'static,
    {
        UnauthorizedHandler::Deferred(Arc::new(f))
    }

    /// Build the rejection, awaiting a deferred handler
    pub async fn invoke(&self, ctx: &C, aux: &A, data: Option<&GuardData>) -> Rejection {
        match self {
            UnauthorizedHandler::Immediate(f) => f(ctx, aux, data),
            UnauthorizedHandler::Deferred(f) => f(ctx, aux, data).await,
        }
    }
}

type ImmediateInternalFn<C, A> = dyn Fn(EvaluationError, &C, &A) -> Rejection + Send + Sync;
type DeferredInternalFn<C, A> =
    dyn for<'a> Fn(EvaluationError, &'a C, &'a A) -> BoxFuture<'a, Rejection> + Send + Sync;

/// Builds the rejection for a predicate fault
///
/// Receives the fault, the request and the auxiliary context.
pub enum InternalErrorHandler<C, A = ()> {
    /// Returns the rejection directly
    Immediate(Arc<ImmediateInternalFn<C, A>>),
    /// Returns a future resolving to the rejection
    Deferred(Arc<DeferredInternalFn<C, A>>),
}

impl<C, A> Clone for InternalErrorHandler<C, A> {
    fn clone(&self) -> Self {
        match self {
            InternalErrorHandler::Immediate(f) => InternalErrorHandler::Immediate(Arc::clone(f)),
            InternalErrorHandler::Deferred(f) => InternalErrorHandler::Deferred(Arc::clone(f)),
        }
    }
}

impl<C, A> fmt::Debug for InternalErrorHandler<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InternalErrorHandler::{:?}", self.mode())
    }
}

impl<C, A> Default for InternalErrorHandler<C, A>
where
    C: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::immediate(|err, _, _| Rejection::internal(err))
    }
}

impl<C, A> InternalErrorHandler<C, A> {
    /// Whether invoking this handler may suspend
    pub fn mode(&self) -> ExecutionMode {
        match self {
            InternalErrorHandler::Immediate(_) => ExecutionMode::Immediate,
            InternalErrorHandler::Deferred(_) => ExecutionMode::Deferred,
        }
    }
}

impl<C, A> InternalErrorHandler<C, A>
where
    C: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    /// Handler that builds its rejection synchronously
    pub fn immediate<F>(f: F) -> Self
    where
        F: Fn(EvaluationError, &C, &A) -> Rejection + Send + Sync + 'static,
    {
        InternalErrorHandler::Immediate(Arc::new(f))
    }

    /// Handler that builds its rejection in a future
    pub fn deferred<F>(f: F) -> Self
    where
        F: for<'a> Fn(EvaluationError, &'a C, &'a A) -> BoxFuture<'a, Rejection>
            + Send
            + Sync
            + 'static,
    {
        InternalErrorHandler::Deferred(Arc::new(f))
    }

    /// Build the rejection for `err`, awaiting a deferred handler
    pub async fn invoke(&self, err: EvaluationError, ctx: &C, aux: &A) -> Rejection {
        match self {
            InternalErrorHandler::Immediate(f) => f(err, ctx, aux),
            InternalErrorHandler::Deferred(f) => f(err, ctx, aux).await,
        }
    }
}

/// Outcome handlers shared between an engine and its guards
pub(crate) struct Handlers<C, A> {
    pub(crate) unauthorized: UnauthorizedHandler<C, A>,
    pub(crate) internal: InternalErrorHandler<C, A>,
}

impl<C, A> Default for Handlers<C, A>
where
    C: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            unauthorized: UnauthorizedHandler::default(),
            internal: InternalErrorHandler::default(),
        }
    }
}

/// Compiled gate around a predicate
///
/// # Example
///
/// ```rust
/// use hrbac::{Hrbac, Parents};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let hrbac: Hrbac<serde_json::Value> = Hrbac::new();
/// hrbac.add_role("admin", Parents::None)?;
///
/// let guard = hrbac.middleware("admin", None)?;
/// let req = json!({ "user": { "role": "admin" } });
///
/// let mut granted = false;
/// guard.call(&req, &(), |rejection| granted = rejection.is_none()).await;
/// assert!(granted);
/// # Ok::<(), hrbac::HrbacError>(())
/// # })?;
/// # Ok::<(), hrbac::HrbacError>(())
/// ```
pub struct Guard<C, A = ()> {
    predicate: Predicate<C, A>,
    data: Option<GuardData>,
    handlers: Arc<RwLock<Handlers<C, A>>>,
}

impl<C, A> Clone for Guard<C, A> {
    fn clone(&self) -> Self {
        Self {
            predicate: self.predicate.clone(),
            data: self.data.clone(),
            handlers: Arc::clone(&self.handlers),
        }
    }
}

impl<C, A> fmt::Debug for Guard<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard")
            .field("predicate", &self.predicate)
            .field("data", &self.data)
            .finish()
    }
}

impl<C, A> Guard<C, A>
where
    C: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    pub(crate) fn new(
        predicate: Predicate<C, A>,
        data: Option<GuardData>,
        handlers: Arc<RwLock<Handlers<C, A>>>,
    ) -> Self {
        Self {
            predicate,
            data,
            handlers,
        }
    }

    /// Predicate this guard evaluates
    pub fn predicate(&self) -> &Predicate<C, A> {
        &self.predicate
    }

    /// Data forwarded to the unauthorized handler
    pub fn data(&self) -> Option<&GuardData> {
        self.data.as_ref()
    }

    /// Evaluate the predicate and settle on a terminal state
    pub async fn evaluate(&self, ctx: &C, aux: &A) -> GuardOutcome {
        let verdict = AssertUnwindSafe(self.predicate.evaluate(ctx, aux))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(panicked(payload)));

        // Clone handlers out of the lock; never hold it across an await.
        let (unauthorized, internal) = {
            let handlers = self.handlers.read();
            (handlers.unauthorized.clone(), handlers.internal.clone())
        };

        match classify(verdict) {
            Verdict::Granted => GuardOutcome::Granted,
            Verdict::Denied => {
                GuardOutcome::Denied(unauthorized.invoke(ctx, aux, self.data()).await)
            }
            Verdict::Faulted(err) => GuardOutcome::Errored(internal.invoke(err, ctx, aux).await),
        }
    }

    /// Evaluate without suspending
    ///
    /// Returns `None`, without evaluating anything, when the predicate or
    /// either configured handler is deferred.
    pub fn evaluate_now(&self, ctx: &C, aux: &A) -> Option<GuardOutcome> {
        let (unauthorized, internal) = {
            let handlers = self.handlers.read();
            (handlers.unauthorized.clone(), handlers.internal.clone())
        };

        let (UnauthorizedHandler::Immediate(unauthorized), InternalErrorHandler::Immediate(internal)) =
            (unauthorized, internal)
        else {
            return None;
        };

        let verdict = match panic::catch_unwind(AssertUnwindSafe(|| {
            self.predicate.evaluate_now(ctx, aux)
        })) {
            Ok(verdict) => verdict?,
            Err(payload) => Err(panicked(payload)),
        };
        Some(match classify(verdict) {
            Verdict::Granted => GuardOutcome::Granted,
            Verdict::Denied => GuardOutcome::Denied(unauthorized(ctx, aux, self.data())),
            Verdict::Faulted(err) => GuardOutcome::Errored(internal(err, ctx, aux)),
        })
    }

    /// `Ok(())` when access is granted, the rejection otherwise
    pub async fn check(&self, ctx: &C, aux: &A) -> Result<(), Rejection> {
        self.evaluate(ctx, aux).await.into_result()
    }

    /// Continuation-passing form
    ///
    /// `next` is invoked exactly once, with `None` when access is granted.
    pub async fn call<F>(&self, ctx: &C, aux: &A, next: F)
    where
        F: FnOnce(Option<Rejection>),
    {
        next(self.check(ctx, aux).await.err())
    }
}

/// Turn a caught panic into a predicate fault
fn panicked(payload: Box<dyn Any + Send>) -> EvaluationError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    EvaluationError::failed(format!("predicate panicked: {}", message))
}

enum Verdict {
    Granted,
    Denied,
    Faulted(EvaluationError),
}

fn classify(verdict: PredicateResult) -> Verdict {
    match verdict {
        Ok(true) => {
            debug!("Guard granted access");
            Verdict::Granted
        }
        Ok(false) => {
            debug!("Guard denied access");
            Verdict::Denied
        }
        Err(EvaluationError::Role(err)) => {
            debug!("Guard denied access, unusable role claim: {}", err);
            Verdict::Denied
        }
        Err(err) => {
            warn!("Predicate failed during guard evaluation: {}", err);
            Verdict::Faulted(err)
        }
    }
}
