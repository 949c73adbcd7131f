//! Declarative policy documents
//!
//! A document lists roles and named rules in JSON:
//!
//! ```json
//! {
//!   "roles": [
//!     { "name": "guest" },
//!     { "name": "user", "parents": "guest" },
//!     { "name": "admin", "parents": ["user"] }
//!   ],
//!   "rules": [
//!     { "name": "admin or owner", "expr": { "or": ["admin", { "and": ["user", "is owner"] }] } }
//!   ]
//! }
//! ```
//!
//! Names and expressions are kept as raw JSON until loading so that a
//! missing field, a `null` and a value of the wrong type each surface as
//! their own parameter error.

use crate::claim::validate_label;
use crate::engine::Hrbac;
use crate::error::{HrbacError, Result};
use crate::graph::Parents;
use crate::predicate::Predicate;
use crate::registry::EntryKind;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Keeps an explicit `null` as `Some(Value::Null)`; absence stays `None`
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Role entry of a policy document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleDeclaration {
    /// Role label
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub name: Option<Value>,

    /// Absent, `null`, a label or an array of labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parents: Option<Value>,
}

/// Rule entry of a policy document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleDeclaration {
    /// Function label the rule is registered under
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub name: Option<Value>,

    /// Label, or single-key `and` / `or` / `not` object
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub expr: Option<Value>,
}

/// Roles and rules to declare on an engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyDocument {
    #[serde(default)]
    pub roles: Vec<RoleDeclaration>,

    #[serde(default)]
    pub rules: Vec<RuleDeclaration>,
}

impl PolicyDocument {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| HrbacError::InvalidDocument(e.to_string()))
    }

    pub fn from_json_value(value: Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| HrbacError::InvalidDocument(e.to_string()))
    }

    /// Read and parse a document file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

impl FromStr for PolicyDocument {
    type Err = HrbacError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_json_str(s)
    }
}

fn parse_parents(raw: Option<&Value>, role: &str) -> Result<Parents> {
    match raw {
        None | Some(Value::Null) => Ok(Parents::None),
        Some(single @ Value::String(_)) => {
            validate_label(Some(single), &format!("parent of role '{}'", role))
                .map(|parent| Parents::One(parent.to_string()))
        }
        Some(Value::Array(items)) => {
            if items.is_empty() {
                return Err(HrbacError::EmptyParameter(format!("parents of role '{}'", role)));
            }
            items
                .iter()
                .map(|item| {
                    validate_label(Some(item), &format!("parent of role '{}'", role))
                        .map(str::to_string)
                })
                .collect::<Result<Vec<_>>>()
                .map(Parents::Many)
        }
        Some(_) => Err(HrbacError::NotAString(format!("parents of role '{}'", role))),
    }
}

fn operands<'v>(args: &'v Value, operator: &str, expected: usize) -> Result<&'v [Value]> {
    let operands = match args {
        Value::Array(items) => items.as_slice(),
        single => std::slice::from_ref(single),
    };

    if operands.len() != expected {
        return Err(HrbacError::ParameterNumberMismatch {
            context: operator.to_string(),
            expected,
            found: operands.len(),
        });
    }
    Ok(operands)
}

/// Rule expression with its shape checked
enum Expr<'v> {
    Label(&'v str),
    And(Box<Expr<'v>>, Box<Expr<'v>>),
    Or(Box<Expr<'v>>, Box<Expr<'v>>),
    Not(Box<Expr<'v>>),
}

impl<'v> Expr<'v> {
    fn parse(value: &'v Value) -> Result<Self> {
        match value {
            Value::String(label) => Ok(Expr::Label(label)),
            Value::Null => Err(HrbacError::NullParameter("expression".to_string())),
            Value::Object(map) => {
                let mut entries = map.iter();
                let (operator, args) = match (entries.next(), entries.next()) {
                    (Some(entry), None) => entry,
                    _ => {
                        return Err(HrbacError::NotAFunction(format!(
                            "expression object with {} keys",
                            map.len()
                        )))
                    }
                };

                match operator.as_str() {
                    "and" => {
                        let ops = operands(args, "and", 2)?;
                        Ok(Expr::And(
                            Box::new(Expr::parse(&ops[0])?),
                            Box::new(Expr::parse(&ops[1])?),
                        ))
                    }
                    "or" => {
                        let ops = operands(args, "or", 2)?;
                        Ok(Expr::Or(
                            Box::new(Expr::parse(&ops[0])?),
                            Box::new(Expr::parse(&ops[1])?),
                        ))
                    }
                    "not" => {
                        let ops = operands(args, "not", 1)?;
                        Ok(Expr::Not(Box::new(Expr::parse(&ops[0])?)))
                    }
                    other => Err(HrbacError::NotAFunction(format!("operator '{}'", other))),
                }
            }
            other => Err(HrbacError::NotAFunction(format!("expression {}", other))),
        }
    }

    /// Run `f` on every label, left to right
    fn try_for_each_label<F>(&self, f: &mut F) -> Result<()>
    where
        F: FnMut(&'v str) -> Result<()>,
    {
        match self {
            Expr::Label(label) => f(*label),
            Expr::And(lhs, rhs) | Expr::Or(lhs, rhs) => {
                lhs.try_for_each_label(f)?;
                rhs.try_for_each_label(f)
            }
            Expr::Not(inner) => inner.try_for_each_label(f),
        }
    }
}

/// Declarations of a document that passed every check
struct Plan<'d> {
    roles: Vec<(&'d str, Parents)>,
    rules: Vec<(&'d str, Expr<'d>)>,
}

impl<C, A> Hrbac<C, A>
where
    C: Send + Sync + 'static,
    A: Send + Sync + 'static,
{
    /// Compile a rule expression against the current registry
    pub fn compile_expression(&self, expr: &Value) -> Result<Predicate<C, A>> {
        self.compile(&Expr::parse(expr)?)
    }

    fn compile(&self, expr: &Expr<'_>) -> Result<Predicate<C, A>> {
        match expr {
            Expr::Label(label) => self.predicate(label),
            Expr::And(lhs, rhs) => Ok(self.compile(lhs)?.and(self.compile(rhs)?)),
            Expr::Or(lhs, rhs) => Ok(self.compile(lhs)?.or(self.compile(rhs)?)),
            Expr::Not(inner) => Ok(self.compile(inner)?.not()),
        }
    }

    /// Check a whole document against the engine without declaring anything
    ///
    /// Labels declared earlier in the document count as declared.
    fn plan<'d>(&self, document: &'d PolicyDocument) -> Result<Plan<'d>> {
        let mut pending: HashMap<&'d str, EntryKind> = HashMap::new();
        let kind_of = |pending: &HashMap<&'d str, EntryKind>, label: &str| {
            pending.get(label).copied().or_else(|| self.kind_of(label))
        };

        let mut roles = Vec::with_capacity(document.roles.len());
        for (index, role) in document.roles.iter().enumerate() {
            let name = validate_label(role.name.as_ref(), &format!("name of role #{}", index))?;
            match kind_of(&pending, name) {
                Some(EntryKind::Role) => {
                    return Err(HrbacError::RoleAlreadyExists(name.to_string()))
                }
                Some(EntryKind::Predicate) => {
                    return Err(HrbacError::LabelAlreadyInUse(name.to_string()))
                }
                None => {}
            }

            let parents = parse_parents(role.parents.as_ref(), name)?;
            for parent in parents.labels() {
                if kind_of(&pending, parent.as_str()) != Some(EntryKind::Role) {
                    return Err(HrbacError::MissingRole(parent.clone()));
                }
            }

            pending.insert(name, EntryKind::Role);
            roles.push((name, parents));
        }

        let mut rules = Vec::with_capacity(document.rules.len());
        for (index, rule) in document.rules.iter().enumerate() {
            let name = validate_label(rule.name.as_ref(), &format!("name of rule #{}", index))?;
            if kind_of(&pending, name).is_some() {
                return Err(HrbacError::LabelAlreadyInUse(name.to_string()));
            }

            let expr = match &rule.expr {
                None => return Err(HrbacError::UndefinedParameter(format!("expr of rule '{}'", name))),
                Some(Value::Null) => {
                    return Err(HrbacError::NullParameter(format!("expr of rule '{}'", name)))
                }
                Some(expr) => Expr::parse(expr)?,
            };
            expr.try_for_each_label(&mut |label| {
                if label.is_empty() {
                    return Err(HrbacError::EmptyParameter("function label".to_string()));
                }
                match kind_of(&pending, label) {
                    Some(_) => Ok(()),
                    None => Err(HrbacError::MissingFunction(label.to_string())),
                }
            })?;

            pending.insert(name, EntryKind::Predicate);
            rules.push((name, expr));
        }

        Ok(Plan { roles, rules })
    }

    /// Declare every role, then every rule, of a document
    ///
    /// The whole document is checked first. A rejected document leaves
    /// the engine untouched, so a corrected one can be loaded afterwards.
    pub fn load_document(&self, document: &PolicyDocument) -> Result<()> {
        let plan = self.plan(document)?;

        for (name, parents) in plan.roles {
            self.add_role(name, parents)?;
        }
        for (name, expr) in &plan.rules {
            let predicate = self.compile(expr)?;
            self.add_function(name, predicate)?;
        }

        info!(
            "Loaded policy document with {} roles and {} rules",
            document.roles.len(),
            document.rules.len()
        );
        Ok(())
    }
}
