//! Labelled engine instances
//!
//! An explicit, caller-owned replacement for a process-wide registry of
//! named engines. Lookups of the same label share one engine; different
//! labels are independent.

use crate::claim::RoleClaimSource;
use crate::engine::Hrbac;
use crate::error::{HrbacError, Result};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Label used when no label is given
pub const DEFAULT_INSTANCE: &str = "default";

type Factory<C, A> = dyn Fn() -> Hrbac<C, A> + Send + Sync;

/// Concurrent label -> engine map
///
/// # Example
///
/// ```rust
/// use hrbac::{InstanceStore, Parents};
/// use serde_json::Value;
///
/// let store: InstanceStore<Value> = InstanceStore::new();
/// store.get_instance(None)?.add_role("admin", Parents::None)?;
///
/// assert!(store.get_instance(Some("default"))?.has_role("admin"));
/// assert!(!store.get_instance(Some("tenant-b"))?.has_role("admin"));
/// # Ok::<(), hrbac::HrbacError>(())
/// ```
pub struct InstanceStore<C, A = ()> {
    instances: DashMap<String, Hrbac<C, A>>,
    factory: Arc<Factory<C, A>>,
}

impl<C, A> fmt::Debug for InstanceStore<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceStore")
            .field("instances", &self.instances.len())
            .finish()
    }
}

impl<C, A> Default for InstanceStore<C, A>
where
    C: RoleClaimSource + Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<C, A> InstanceStore<C, A>
where
    C: RoleClaimSource + Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    /// Store creating engines with the default role extractor
    pub fn new() -> Self {
        Self::with_factory(Hrbac::<C, A>::new)
    }
}

impl<C, A> InstanceStore<C, A>
where
    C: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    /// Store creating engines through `factory`
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn() -> Hrbac<C, A> + Send + Sync + 'static,
    {
        Self {
            instances: DashMap::new(),
            factory: Arc::new(factory),
        }
    }

    /// Engine for `label`, created on first use
    ///
    /// `None` selects [`DEFAULT_INSTANCE`]. The factory runs without any
    /// map lock held. Callers racing on a new label may each build an
    /// engine, but all of them get the one inserted first.
    pub fn get_instance(&self, label: Option<&str>) -> Result<Hrbac<C, A>> {
        let label = label.unwrap_or(DEFAULT_INSTANCE);
        if label.is_empty() {
            return Err(HrbacError::EmptyParameter("instance label".to_string()));
        }

        if let Some(instance) = self.instances.get(label) {
            return Ok(instance.value().clone());
        }

        // Build outside the shard lock so the factory may use this store.
        let created = (self.factory)();
        let instance = self
            .instances
            .entry(label.to_string())
            .or_insert_with(|| {
                debug!("Creating HRBAC instance '{}'", label);
                created
            })
            .clone();

        Ok(instance)
    }

    /// Whether an instance exists for `label`
    pub fn contains(&self, label: &str) -> bool {
        self.instances.contains_key(label)
    }

    /// Drop the instance for `label`, returning it if it existed
    pub fn remove(&self, label: &str) -> Option<Hrbac<C, A>> {
        self.instances.remove(label).map(|(_, instance)| instance)
    }

    /// Drop every instance
    pub fn reset(&self) {
        debug!("Resetting {} HRBAC instances", self.instances.len());
        self.instances.clear();
    }

    /// Number of live instances
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Labels with a live instance, sorted
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.instances.iter().map(|e| e.key().clone()).collect();
        labels.sort();
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Parents;
    use serde_json::Value;
    use std::sync::OnceLock;

    #[test]
    fn test_same_label_shares_registry() {
        let store: InstanceStore<Value> = InstanceStore::new();
        store.get_instance(None).unwrap().add_role("admin", Parents::None).unwrap();

        let again = store.get_instance(Some(DEFAULT_INSTANCE)).unwrap();
        assert!(matches!(
            again.add_role("admin", Parents::None),
            Err(HrbacError::RoleAlreadyExists(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_labels_are_independent() {
        let store: InstanceStore<Value> = InstanceStore::new();
        store.get_instance(Some("a")).unwrap().add_role("admin", Parents::None).unwrap();
        store.get_instance(Some("b")).unwrap().add_role("admin", Parents::None).unwrap();

        assert_eq!(store.labels(), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_label() {
        let store: InstanceStore<Value> = InstanceStore::new();
        assert!(matches!(
            store.get_instance(Some("")),
            Err(HrbacError::EmptyParameter(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_reset_and_remove() {
        let store: InstanceStore<Value> = InstanceStore::new();
        store.get_instance(None).unwrap().add_role("admin", Parents::None).unwrap();
        store.get_instance(Some("other")).unwrap();

        assert!(store.remove("other").is_some());
        assert!(!store.contains("other"));

        store.reset();
        assert!(store.is_empty());
        // fresh instance after reset
        assert!(store.get_instance(None).unwrap().add_role("admin", Parents::None).is_ok());
    }

    #[test]
    fn test_custom_factory() {
        let store = InstanceStore::<Value>::with_factory(|| {
            let hrbac = Hrbac::new();
            hrbac.add_role("guest", Parents::None).ok();
            hrbac
        });
        assert!(store.get_instance(Some("t1")).unwrap().has_role("guest"));
    }

    #[test]
    fn test_factory_may_read_its_own_store() {
        let cell: Arc<OnceLock<Arc<InstanceStore<Value>>>> = Arc::new(OnceLock::new());
        let handle = Arc::clone(&cell);
        let store = Arc::new(InstanceStore::<Value>::with_factory(move || {
            let hrbac = Hrbac::new();
            let tenant = handle.get().map_or(false, |store| store.contains(DEFAULT_INSTANCE));
            if tenant {
                hrbac.add_role("tenant", Parents::None).ok();
            }
            hrbac
        }));
        cell.set(Arc::clone(&store)).ok();

        assert!(!store.get_instance(None).unwrap().has_role("tenant"));
        assert!(store.get_instance(Some("t1")).unwrap().has_role("tenant"));
        assert_eq!(store.len(), 2);
    }
}
