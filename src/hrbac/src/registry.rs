//! Named entity registry
//!
//! Roles and boolean predicates share one namespace. Each label maps to a
//! single tagged entry, so a cross-kind collision is caught by the same
//! lookup that catches a same-kind one.

use crate::error::{HrbacError, Result};
use crate::predicate::{Operand, Predicate};
use std::collections::HashMap;
use std::fmt;

/// Kind of a registered label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Declared role; its entry holds the synthesized role predicate
    Role,
    /// Named boolean predicate
    Predicate,
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Role => write!(f, "role"),
            EntryKind::Predicate => write!(f, "predicate"),
        }
    }
}

/// Registry entry
pub enum Entry<C, A = ()> {
    /// Role marker with the predicate testing membership in that role
    Role(Predicate<C, A>),
    /// Named predicate
    Predicate(Predicate<C, A>),
}

impl<C, A> Entry<C, A> {
    /// Kind of this entry
    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::Role(_) => EntryKind::Role,
            Entry::Predicate(_) => EntryKind::Predicate,
        }
    }

    /// Predicate evaluated when the label is used in a rule or guard
    pub fn predicate(&self) -> &Predicate<C, A> {
        match self {
            Entry::Role(p) | Entry::Predicate(p) => p,
        }
    }
}

impl<C, A> fmt::Debug for Entry<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entry::{:?}({:?})", self.kind(), self.predicate())
    }
}

/// Label -> entry map
///
/// Entries are created once and never mutated or removed.
pub struct Registry<C, A = ()> {
    entries: HashMap<String, Entry<C, A>>,
}

impl<C, A> Default for Registry<C, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, A> Registry<C, A> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Number of registered labels
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Kind of `label`, if registered
    pub fn kind_of(&self, label: &str) -> Option<EntryKind> {
        self.entries.get(label).map(Entry::kind)
    }

    /// Registered labels, in no particular order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Check that `label` can be registered as `kind`
    ///
    /// # Errors
    ///
    /// - `EmptyParameter` for an empty label
    /// - `RoleAlreadyExists` when re-declaring a role
    /// - `LabelAlreadyInUse` for any other collision
    pub fn ensure_available(&self, label: &str, kind: EntryKind) -> Result<()> {
        if label.is_empty() {
            return Err(HrbacError::EmptyParameter(format!("{} label", kind)));
        }

        match (self.kind_of(label), kind) {
            (None, _) => Ok(()),
            (Some(EntryKind::Role), EntryKind::Role) => {
                Err(HrbacError::RoleAlreadyExists(label.to_string()))
            }
            (Some(_), _) => Err(HrbacError::LabelAlreadyInUse(label.to_string())),
        }
    }

    /// Register a new entry under `label`
    pub fn register(&mut self, label: &str, entry: Entry<C, A>) -> Result<()> {
        self.ensure_available(label, entry.kind())?;
        self.entries.insert(label.to_string(), entry);
        Ok(())
    }

    /// Entry registered under `label`
    pub fn get(&self, label: &str) -> Option<&Entry<C, A>> {
        self.entries.get(label)
    }

    /// Look up a predicate by label
    ///
    /// # Errors
    ///
    /// - `EmptyParameter` for an empty label
    /// - `MissingFunction` when nothing is registered under `label`
    pub fn lookup(&self, label: &str) -> Result<Predicate<C, A>> {
        if label.is_empty() {
            return Err(HrbacError::EmptyParameter("function label".to_string()));
        }

        self.entries
            .get(label)
            .map(|entry| entry.predicate().clone())
            .ok_or_else(|| HrbacError::MissingFunction(label.to_string()))
    }

    /// Resolve an operand: predicates pass through, labels are looked up
    pub fn resolve(&self, operand: Operand<C, A>) -> Result<Predicate<C, A>> {
        match operand {
            Operand::Predicate(predicate) => Ok(predicate),
            Operand::Label(label) => self.lookup(&label),
        }
    }
}
