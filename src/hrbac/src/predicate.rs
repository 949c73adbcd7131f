//! Tagged predicates and the AND / OR / NOT algebra
//!
//! Every predicate carries its execution mode. Immediate predicates
//! produce their result synchronously, deferred predicates return a boxed
//! future. Combinators stay immediate when all operands are immediate and
//! become deferred as soon as one operand is, so synchronous callers never
//! pay for a suspension they do not need.

use crate::error::EvaluationError;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

/// Outcome of evaluating a predicate
pub type PredicateResult = Result<bool, EvaluationError>;

/// Synchronous predicate body
pub type ImmediateFn<C, A> = dyn Fn(&C, &A) -> PredicateResult + Send + Sync;

/// Asynchronous predicate body
pub type DeferredFn<C, A> =
    dyn for<'a> Fn(&'a C, &'a A) -> BoxFuture<'a, PredicateResult> + Send + Sync;

/// When a callback's result becomes available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// Result is available synchronously
    Immediate,
    /// Result is available after a suspension point
    Deferred,
}

impl ExecutionMode {
    /// Mode of a combinator over operands of modes `self` and `other`
    pub fn combine(self, other: ExecutionMode) -> ExecutionMode {
        match (self, other) {
            (ExecutionMode::Immediate, ExecutionMode::Immediate) => ExecutionMode::Immediate,
            _ => ExecutionMode::Deferred,
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Immediate => write!(f, "immediate"),
            ExecutionMode::Deferred => write!(f, "deferred"),
        }
    }
}

/// Boolean check over a request context `C` and an auxiliary context `A`
///
/// Building a predicate never evaluates it. Evaluation happens when the
/// compiled guard is invoked.
///
/// # Example
///
/// ```rust
/// use hrbac::Predicate;
/// use serde_json::Value;
///
/// let is_put: Predicate<Value> = Predicate::immediate(|req: &Value, _: &()| {
///     Ok(req["method"] == "PUT")
/// });
/// let is_owner: Predicate<Value> = Predicate::deferred(|req: &Value, _: &()| {
///     Box::pin(async move { Ok(req["params"]["owner"] == true) })
/// });
///
/// let rule = is_put.and(is_owner);
/// assert!(rule.is_deferred());
/// ```
pub enum Predicate<C, A = ()> {
    /// Synchronous predicate
    Immediate(Arc<ImmediateFn<C, A>>),
    /// Asynchronous predicate
    Deferred(Arc<DeferredFn<C, A>>),
}

impl<C, A> Clone for Predicate<C, A> {
    fn clone(&self) -> Self {
        match self {
            Predicate::Immediate(f) => Predicate::Immediate(Arc::clone(f)),
            Predicate::Deferred(f) => Predicate::Deferred(Arc::clone(f)),
        }
    }
}

impl<C, A> fmt::Debug for Predicate<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Immediate(_) => write!(f, "Predicate::Immediate"),
            Predicate::Deferred(_) => write!(f, "Predicate::Deferred"),
        }
    }
}

impl<C, A> Predicate<C, A>
where
    C: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    /// Wrap a synchronous check
    pub fn immediate<F>(f: F) -> Self
    where
        F: Fn(&C, &A) -> PredicateResult + Send + Sync + 'static,
    {
        Predicate::Immediate(Arc::new(f))
    }

    /// Wrap an asynchronous check
    pub fn deferred<F>(f: F) -> Self
    where
        F: for<'a> Fn(&'a C, &'a A) -> BoxFuture<'a, PredicateResult> + Send + Sync + 'static,
    {
        Predicate::Deferred(Arc::new(f))
    }

    /// Predicate that always yields `value`
    pub fn constant(value: bool) -> Self {
        Self::immediate(move |_, _| Ok(value))
    }

    /// Execution mode of this predicate
    pub fn mode(&self) -> ExecutionMode {
        match self {
            Predicate::Immediate(_) => ExecutionMode::Immediate,
            Predicate::Deferred(_) => ExecutionMode::Deferred,
        }
    }

    /// Whether evaluation may suspend
    pub fn is_deferred(&self) -> bool {
        self.mode() == ExecutionMode::Deferred
    }

    /// Evaluate without suspending
    ///
    /// Returns `None` for deferred predicates.
    pub fn evaluate_now(&self, ctx: &C, aux: &A) -> Option<PredicateResult> {
        match self {
            Predicate::Immediate(f) => Some(f(ctx, aux)),
            Predicate::Deferred(_) => None,
        }
    }

    /// Evaluate against a request
    pub async fn evaluate(&self, ctx: &C, aux: &A) -> PredicateResult {
        match self {
            Predicate::Immediate(f) => f(ctx, aux),
            Predicate::Deferred(f) => f(ctx, aux).await,
        }
    }

    /// Logical AND; `rhs` is only evaluated when `self` holds
    pub fn and(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Predicate::Immediate(lhs), Predicate::Immediate(rhs)) => {
                Self::immediate(move |ctx, aux| Ok(lhs(ctx, aux)? && rhs(ctx, aux)?))
            }
            (lhs, rhs) => Self::deferred(move |ctx, aux| {
                let lhs = lhs.clone();
                let rhs = rhs.clone();
                Box::pin(async move {
                    Ok::<_, EvaluationError>(
                        lhs.evaluate(ctx, aux).await? && rhs.evaluate(ctx, aux).await?,
                    )
                })
            }),
        }
    }

    /// Logical OR; `rhs` is only evaluated when `self` does not hold
    pub fn or(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Predicate::Immediate(lhs), Predicate::Immediate(rhs)) => {
                Self::immediate(move |ctx, aux| Ok(lhs(ctx, aux)? || rhs(ctx, aux)?))
            }
            (lhs, rhs) => Self::deferred(move |ctx, aux| {
                let lhs = lhs.clone();
                let rhs = rhs.clone();
                Box::pin(async move {
                    Ok::<_, EvaluationError>(
                        lhs.evaluate(ctx, aux).await? || rhs.evaluate(ctx, aux).await?,
                    )
                })
            }),
        }
    }

    /// Logical NOT, preserving the operand's mode
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        match self {
            Predicate::Immediate(f) => Self::immediate(move |ctx, aux| Ok(!f(ctx, aux)?)),
            Predicate::Deferred(f) => Self::deferred(move |ctx, aux| {
                let pending = f(ctx, aux);
                Box::pin(async move { Ok::<_, EvaluationError>(!pending.await?) })
            }),
        }
    }
}

/// Operand of a combinator or guard: a registered label or a predicate
pub enum Operand<C, A = ()> {
    /// Label resolved through the registry
    Label(String),
    /// Anonymous predicate used as-is
    Predicate(Predicate<C, A>),
}

impl<C, A> fmt::Debug for Operand<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Label(label) => write!(f, "Operand::Label({:?})", label),
            Operand::Predicate(p) => write!(f, "Operand::Predicate({:?})", p),
        }
    }
}

impl<C, A> From<&str> for Operand<C, A> {
    fn from(label: &str) -> Self {
        Operand::Label(label.to_string())
    }
}

impl<C, A> From<String> for Operand<C, A> {
    fn from(label: String) -> Self {
        Operand::Label(label)
    }
}

impl<C, A> From<&String> for Operand<C, A> {
    fn from(label: &String) -> Self {
        Operand::Label(label.clone())
    }
}

impl<C, A> From<Predicate<C, A>> for Operand<C, A> {
    fn from(predicate: Predicate<C, A>) -> Self {
        Operand::Predicate(predicate)
    }
}

impl<C, A> From<&Predicate<C, A>> for Operand<C, A> {
    fn from(predicate: &Predicate<C, A>) -> Self {
        Operand::Predicate(predicate.clone())
    }
}
