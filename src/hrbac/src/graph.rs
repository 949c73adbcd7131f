//! Role hierarchy graph with ancestor resolution
//!
//! Edges point from a child role to its parent roles. A parent must already
//! be declared when a child references it, so the graph is acyclic by
//! construction. Ancestor resolution walks the edges with an explicit
//! worklist and a visited set, which bounds stack usage on deep hierarchies
//! and collapses diamond inheritance into a single entry per role.

use crate::error::{HrbacError, Result};
use std::collections::{HashMap, HashSet};

/// Parent reference(s) for a role declaration
///
/// A role may have no parent, a single parent, or a non-empty collection
/// of parents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Parents {
    /// Root role
    #[default]
    None,
    /// Single parent label
    One(String),
    /// Several parent labels
    Many(Vec<String>),
}

impl Parents {
    /// Parent labels as a slice, in declaration order
    pub fn labels(&self) -> &[String] {
        match self {
            Parents::None => &[],
            Parents::One(parent) => std::slice::from_ref(parent),
            Parents::Many(parents) => parents,
        }
    }

    /// Whether no parent is referenced
    pub fn is_none(&self) -> bool {
        matches!(self, Parents::None)
    }
}

impl From<&str> for Parents {
    fn from(parent: &str) -> Self {
        Parents::One(parent.to_string())
    }
}

impl From<String> for Parents {
    fn from(parent: String) -> Self {
        Parents::One(parent)
    }
}

impl From<Option<&str>> for Parents {
    fn from(parent: Option<&str>) -> Self {
        parent.map_or(Parents::None, Parents::from)
    }
}

impl From<Vec<String>> for Parents {
    fn from(parents: Vec<String>) -> Self {
        Parents::Many(parents)
    }
}

impl From<Vec<&str>> for Parents {
    fn from(parents: Vec<&str>) -> Self {
        Parents::Many(parents.into_iter().map(str::to_string).collect())
    }
}

impl From<&[&str]> for Parents {
    fn from(parents: &[&str]) -> Self {
        Parents::Many(parents.iter().map(|p| p.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Parents {
    fn from(parents: [&str; N]) -> Self {
        Parents::Many(parents.iter().map(|p| p.to_string()).collect())
    }
}

/// Directed acyclic graph of roles and their parents
///
/// # Example
///
/// ```rust
/// use hrbac::graph::{Parents, RoleGraph};
///
/// let mut graph = RoleGraph::new();
/// graph.add_role("guest", Parents::None)?;
/// graph.add_role("user", "guest")?;
/// graph.add_role("admin", ["user"])?;
///
/// let ancestors = graph.ancestors_of(["admin"]);
/// assert!(ancestors.contains("guest"));
/// assert!(graph.is_descendant("admin", "guest")?);
/// # Ok::<(), hrbac::HrbacError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct RoleGraph {
    /// Role label -> deduplicated parent labels
    parents: HashMap<String, Vec<String>>,
}

impl RoleGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self {
            parents: HashMap::new(),
        }
    }

    /// Whether `role` has been declared
    pub fn contains(&self, role: &str) -> bool {
        self.parents.contains_key(role)
    }

    /// Number of declared roles
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    /// Whether no role has been declared
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Declared role labels, in no particular order
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.parents.keys().map(String::as_str)
    }

    /// Direct parents of a declared role
    pub fn parents_of(&self, role: &str) -> Option<&[String]> {
        self.parents.get(role).map(Vec::as_slice)
    }

    /// Declare a role and its parent edges
    ///
    /// # Errors
    ///
    /// - `EmptyParameter` if the label, a parent label, or the parent
    ///   collection is empty
    /// - `RoleAlreadyExists` if the role was declared before
    /// - `MissingRole` if a parent has not been declared yet
    pub fn add_role(&mut self, label: &str, parents: impl Into<Parents>) -> Result<()> {
        let parents = parents.into();

        if label.is_empty() {
            return Err(HrbacError::EmptyParameter("role label".to_string()));
        }

        if self.contains(label) {
            return Err(HrbacError::RoleAlreadyExists(label.to_string()));
        }

        if let Parents::Many(list) = &parents {
            if list.is_empty() {
                return Err(HrbacError::EmptyParameter(format!(
                    "parents of role '{}'",
                    label
                )));
            }
        }

        let mut edges: Vec<String> = Vec::with_capacity(parents.labels().len());
        for parent in parents.labels() {
            if parent.is_empty() {
                return Err(HrbacError::EmptyParameter(format!(
                    "parent label of role '{}'",
                    label
                )));
            }
            if !self.contains(parent) {
                return Err(HrbacError::MissingRole(parent.clone()));
            }
            if !edges.contains(parent) {
                edges.push(parent.clone());
            }
        }

        // Parents pre-exist and `label` is new, so no edge can close a cycle.
        debug_assert!(edges.iter().all(|parent| parent != label));

        self.parents.insert(label.to_string(), edges);
        Ok(())
    }

    /// Every input role plus every role reachable through parent edges
    ///
    /// Labels that were never declared are kept as-is and contribute no
    /// parents.
    pub fn ancestors_of<I, S>(&self, roles: I) -> HashSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut visited: HashSet<String> = HashSet::new();
        let mut worklist: Vec<String> = roles
            .into_iter()
            .map(|role| role.as_ref().to_string())
            .collect();

        while let Some(role) = worklist.pop() {
            if visited.contains(&role) {
                continue;
            }

            if let Some(parents) = self.parents.get(&role) {
                worklist.extend(
                    parents
                        .iter()
                        .filter(|parent| !visited.contains(*parent))
                        .cloned(),
                );
            }

            visited.insert(role);
        }

        visited
    }

    /// Whether `descendant` inherits, directly or transitively, from `ancestor`
    ///
    /// A role is never its own descendant.
    ///
    /// # Errors
    ///
    /// - `EmptyParameter` if either label is empty
    /// - `MissingRole` if either role has not been declared
    pub fn is_descendant(&self, descendant: &str, ancestor: &str) -> Result<bool> {
        for (what, label) in [("descendant", descendant), ("ancestor", ancestor)] {
            if label.is_empty() {
                return Err(HrbacError::EmptyParameter(format!("{} role label", what)));
            }
            if !self.contains(label) {
                return Err(HrbacError::MissingRole(label.to_string()));
            }
        }

        if descendant == ancestor {
            return Ok(false);
        }

        Ok(self.ancestors_of([descendant]).contains(ancestor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> RoleGraph {
        let mut graph = RoleGraph::new();
        graph.add_role("guest", Parents::None).unwrap();
        graph.add_role("user", "guest").unwrap();
        graph.add_role("admin", "user").unwrap();
        graph
    }

    #[test]
    fn test_empty_graph() {
        let graph = RoleGraph::new();
        assert!(graph.is_empty());

        // Undeclared labels resolve to themselves
        let ancestors = graph.ancestors_of(["ghost"]);
        assert_eq!(ancestors.len(), 1);
        assert!(ancestors.contains("ghost"));
    }

    #[test]
    fn test_linear_ancestors() {
        let graph = chain();

        let ancestors = graph.ancestors_of(["admin"]);
        assert_eq!(ancestors.len(), 3);
        assert!(ancestors.contains("admin"));
        assert!(ancestors.contains("user"));
        assert!(ancestors.contains("guest"));

        let ancestors = graph.ancestors_of(["guest"]);
        assert_eq!(ancestors.len(), 1);
    }

    #[test]
    fn test_diamond_ancestors() {
        // A <- [B, C], B <- D, C <- D
        let mut graph = RoleGraph::new();
        graph.add_role("d", Parents::None).unwrap();
        graph.add_role("b", "d").unwrap();
        graph.add_role("c", "d").unwrap();
        graph.add_role("a", ["b", "c"]).unwrap();

        let ancestors = graph.ancestors_of(["a"]);
        let mut sorted: Vec<_> = ancestors.into_iter().collect();
        sorted.sort();
        assert_eq!(sorted, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_multiple_input_roles() {
        let mut graph = chain();
        graph.add_role("auditor", Parents::None).unwrap();

        let ancestors = graph.ancestors_of(vec!["user", "auditor", "user"]);
        let mut sorted: Vec<_> = ancestors.into_iter().collect();
        sorted.sort();
        assert_eq!(sorted, vec!["auditor", "guest", "user"]);
    }

    #[test]
    fn test_missing_parent() {
        let mut graph = RoleGraph::new();
        let result = graph.add_role("admin1", "admin2");
        assert!(matches!(result, Err(HrbacError::MissingRole(ref r)) if r == "admin2"));

        graph.add_role("admin2", Parents::None).unwrap();
        let result = graph.add_role("admin1", ["admin2", "admin3"]);
        assert!(matches!(result, Err(HrbacError::MissingRole(ref r)) if r == "admin3"));
        assert!(!graph.contains("admin1"));
    }

    #[test]
    fn test_duplicate_role() {
        let mut graph = chain();
        let result = graph.add_role("admin", Parents::None);
        assert!(matches!(result, Err(HrbacError::RoleAlreadyExists(_))));
    }

    #[test]
    fn test_empty_labels_rejected() {
        let mut graph = chain();
        assert!(matches!(
            graph.add_role("", Parents::None),
            Err(HrbacError::EmptyParameter(_))
        ));
        assert!(matches!(
            graph.add_role("x", Parents::Many(vec![])),
            Err(HrbacError::EmptyParameter(_))
        ));
        assert!(matches!(
            graph.add_role("x", ["guest", ""]),
            Err(HrbacError::EmptyParameter(_))
        ));
    }

    #[test]
    fn test_duplicate_parents_collapsed() {
        let mut graph = chain();
        graph.add_role("editor", ["user", "user", "guest"]).unwrap();
        assert_eq!(
            graph.parents_of("editor").unwrap(),
            &["user".to_string(), "guest".to_string()]
        );
    }

    #[test]
    fn test_is_descendant() {
        let mut graph = chain();
        graph.add_role("sibling", "guest").unwrap();

        assert!(graph.is_descendant("admin", "guest").unwrap());
        assert!(graph.is_descendant("admin", "user").unwrap());
        assert!(!graph.is_descendant("guest", "admin").unwrap());
        assert!(!graph.is_descendant("admin", "sibling").unwrap());
        assert!(!graph.is_descendant("admin", "admin").unwrap());
    }

    #[test]
    fn test_is_descendant_errors() {
        let graph = chain();
        assert!(matches!(
            graph.is_descendant("nobody", "guest"),
            Err(HrbacError::MissingRole(_))
        ));
        assert!(matches!(
            graph.is_descendant("admin", "nobody"),
            Err(HrbacError::MissingRole(_))
        ));
        assert!(matches!(
            graph.is_descendant("", "guest"),
            Err(HrbacError::EmptyParameter(_))
        ));
    }

    #[test]
    fn test_deep_hierarchy_no_stack_growth() {
        let mut graph = RoleGraph::new();
        graph.add_role("level_0", Parents::None).unwrap();
        for i in 1..10_000 {
            graph
                .add_role(&format!("level_{}", i), format!("level_{}", i - 1))
                .unwrap();
        }

        let ancestors = graph.ancestors_of(["level_9999"]);
        assert_eq!(ancestors.len(), 10_000);
        assert!(graph.is_descendant("level_9999", "level_0").unwrap());
    }
}
