//! HRBAC engine facade
//!
//! Ties the role graph, the registry, the role extractor and the outcome
//! handlers together. The handle is cheap to clone; clones share state.

use crate::claim::{compile_role_predicate, expand_raw_claim, RoleClaimSource, RoleExtractor};
use crate::error::Result;
use crate::graph::{Parents, RoleGraph};
use crate::guard::{Guard, GuardData, Handlers, InternalErrorHandler, UnauthorizedHandler};
use crate::predicate::{Operand, Predicate};
use crate::registry::{Entry, EntryKind, Registry};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

struct Shared<C, A> {
    /// Read by every role predicate on every evaluation
    graph: Arc<RwLock<RoleGraph>>,
    registry: RwLock<Registry<C, A>>,
    /// Captured by each role predicate when the role is declared
    extractor: RwLock<RoleExtractor<C, A>>,
    /// Read by every guard on every invocation
    handlers: Arc<RwLock<Handlers<C, A>>>,
}

/// Hierarchical role-based access control engine
///
/// `C` is the request context the predicates inspect and `A` an
/// auxiliary context forwarded alongside it (a response handle, a
/// database pool, `()` when unused).
///
/// Declarations (`add_role`, `add_function`, handler overrides) are
/// expected to happen before guards are invoked. Evaluation only reads.
///
/// # Example
///
/// ```rust
/// use hrbac::{Hrbac, Parents, Predicate};
/// use serde_json::{json, Value};
///
/// let hrbac: Hrbac<Value> = Hrbac::new();
/// hrbac.add_role("guest", Parents::None)?;
/// hrbac.add_role("user", "guest")?;
/// hrbac.add_function(
///     "is PUT",
///     Predicate::immediate(|req: &Value, _: &()| Ok(req["method"] == "PUT")),
/// )?;
///
/// let rule = hrbac.and("user", "is PUT")?;
/// let guard = hrbac.middleware(rule, None)?;
///
/// let req = json!({ "user": { "role": "user" }, "method": "PUT" });
/// assert!(guard.evaluate_now(&req, &()).unwrap().is_granted());
/// # Ok::<(), hrbac::HrbacError>(())
/// ```
pub struct Hrbac<C, A = ()> {
    shared: Arc<Shared<C, A>>,
}

impl<C, A> Clone for Hrbac<C, A> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C, A> fmt::Debug for Hrbac<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hrbac")
            .field("roles", &self.shared.graph.read().len())
            .field("entries", &self.shared.registry.read().len())
            .finish()
    }
}

impl<C, A> Default for Hrbac<C, A>
where
    C: RoleClaimSource + Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<C, A> Hrbac<C, A>
where
    C: RoleClaimSource + Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    /// Create an engine reading role claims through [`RoleClaimSource`]
    pub fn new() -> Self {
        Self::with_role_extractor(RoleExtractor::claim_source())
    }
}

impl<C, A> Hrbac<C, A>
where
    C: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    /// Create an engine with a custom role extractor
    pub fn with_role_extractor(extractor: RoleExtractor<C, A>) -> Self {
        Self {
            shared: Arc::new(Shared {
                graph: Arc::new(RwLock::new(RoleGraph::new())),
                registry: RwLock::new(Registry::new()),
                extractor: RwLock::new(extractor),
                handlers: Arc::new(RwLock::new(Handlers::default())),
            }),
        }
    }

    /// Replace the role extractor
    ///
    /// Only roles declared afterwards use the new extractor.
    pub fn set_role_extractor(&self, extractor: RoleExtractor<C, A>) {
        debug!("Role extractor set ({} mode)", extractor.mode());
        *self.shared.extractor.write() = extractor;
    }

    /// Extractor the next declared role will capture
    pub fn role_extractor(&self) -> RoleExtractor<C, A> {
        self.shared.extractor.read().clone()
    }

    /// Replace the unauthorized handler, for existing guards as well
    pub fn set_unauthorized_handler(&self, handler: UnauthorizedHandler<C, A>) {
        debug!("Unauthorized handler set ({} mode)", handler.mode());
        self.shared.handlers.write().unauthorized = handler;
    }

    /// Replace the internal-error handler, for existing guards as well
    pub fn set_internal_error_handler(&self, handler: InternalErrorHandler<C, A>) {
        debug!("Internal error handler set ({} mode)", handler.mode());
        self.shared.handlers.write().internal = handler;
    }

    /// Declare a role and register its membership predicate
    ///
    /// # Errors
    ///
    /// - `EmptyParameter` for an empty label, parent label or parent list
    /// - `RoleAlreadyExists` if the role was declared before
    /// - `LabelAlreadyInUse` if a function uses the label
    /// - `MissingRole` if a parent has not been declared
    pub fn add_role(&self, label: &str, parents: impl Into<Parents>) -> Result<()> {
        let parents = parents.into();
        let mut registry = self.shared.registry.write();
        registry.ensure_available(label, EntryKind::Role)?;

        self.shared.graph.write().add_role(label, parents.clone())?;

        let predicate = compile_role_predicate(
            Arc::clone(&self.shared.graph),
            self.role_extractor(),
            label.to_string(),
        );
        registry.register(label, Entry::Role(predicate))?;

        debug!("Declared role '{}' with parents {:?}", label, parents.labels());
        Ok(())
    }

    /// Register a named predicate
    ///
    /// # Errors
    ///
    /// - `EmptyParameter` for an empty label
    /// - `LabelAlreadyInUse` if a role or function uses the label
    pub fn add_function(&self, label: &str, predicate: Predicate<C, A>) -> Result<()> {
        let mode = predicate.mode();
        self.shared
            .registry
            .write()
            .register(label, Entry::Predicate(predicate))?;

        debug!("Registered function '{}' ({} mode)", label, mode);
        Ok(())
    }

    fn resolve(&self, operand: impl Into<Operand<C, A>>) -> Result<Predicate<C, A>> {
        self.shared.registry.read().resolve(operand.into())
    }

    /// `lhs OR rhs`, short-circuiting
    pub fn or(
        &self,
        lhs: impl Into<Operand<C, A>>,
        rhs: impl Into<Operand<C, A>>,
    ) -> Result<Predicate<C, A>> {
        Ok(self.resolve(lhs)?.or(self.resolve(rhs)?))
    }

    /// `lhs AND rhs`, short-circuiting
    pub fn and(
        &self,
        lhs: impl Into<Operand<C, A>>,
        rhs: impl Into<Operand<C, A>>,
    ) -> Result<Predicate<C, A>> {
        Ok(self.resolve(lhs)?.and(self.resolve(rhs)?))
    }

    /// `NOT operand`
    pub fn not(&self, operand: impl Into<Operand<C, A>>) -> Result<Predicate<C, A>> {
        Ok(self.resolve(operand)?.not())
    }

    /// Compile a guard around a label or predicate
    ///
    /// `data` is forwarded to the unauthorized handler on every denial.
    ///
    /// # Errors
    ///
    /// - `EmptyParameter` for an empty label
    /// - `MissingFunction` for an unknown label
    pub fn middleware(
        &self,
        operand: impl Into<Operand<C, A>>,
        data: Option<GuardData>,
    ) -> Result<Guard<C, A>> {
        let predicate = self.resolve(operand)?;
        debug!("Compiled {} guard", predicate.mode());
        Ok(Guard::new(predicate, data, Arc::clone(&self.shared.handlers)))
    }

    /// Whether `descendant` inherits, directly or transitively, from `ancestor`
    pub fn is_descendant(&self, descendant: &str, ancestor: &str) -> Result<bool> {
        self.shared.graph.read().is_descendant(descendant, ancestor)
    }

    /// Roles plus every role they inherit from
    pub fn ancestors_of<I, S>(&self, roles: I) -> HashSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.shared.graph.read().ancestors_of(roles)
    }

    /// Validate a raw role claim and expand it through the hierarchy
    ///
    /// # Errors
    ///
    /// `HrbacError::Role` when the claim is not a non-empty string or a
    /// non-empty array of non-empty strings.
    pub fn expand_claim(&self, raw: Option<&Value>) -> Result<HashSet<String>> {
        let (_, expanded) = expand_raw_claim(&self.shared.graph, raw)?;
        Ok(expanded)
    }

    pub fn has_role(&self, label: &str) -> bool {
        self.kind_of(label) == Some(EntryKind::Role)
    }

    pub fn has_function(&self, label: &str) -> bool {
        self.kind_of(label) == Some(EntryKind::Predicate)
    }

    pub fn kind_of(&self, label: &str) -> Option<EntryKind> {
        self.shared.registry.read().kind_of(label)
    }

    /// Registered predicate for a role or function label
    pub fn predicate(&self, label: &str) -> Result<Predicate<C, A>> {
        self.shared.registry.read().lookup(label)
    }

    /// Declared roles, sorted
    pub fn roles(&self) -> Vec<String> {
        let mut roles: Vec<String> = self
            .shared
            .graph
            .read()
            .roles()
            .map(str::to_string)
            .collect();
        roles.sort();
        roles
    }
}
