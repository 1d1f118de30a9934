//! Template variables and the rules for combining them.
//!
//! Variables reach a shader template from two places: the `variables` table of
//! a schedule entry and `key=value` overrides given on the command line. Both
//! end up as a [`VariableSet`]; sources are combined with [`merge_sources`],
//! lowest priority first.
//!
//! Overrides are flat, so `foo.bar=1` is expanded into nested tables by
//! [`expand_overrides`] before it takes part in a merge.
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Names the template engine claims for its own helpers. A variable using one
/// of these at the top level would shadow the helper, so both the config layer
/// and the renderer refuse them.
pub const RESERVED_NAMES: &[&str] = &["nc"];

pub type VariableSet = BTreeMap<String, Variable>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Variable {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Variable>),
    Table(VariableSet),
}

impl Variable {
    pub fn as_table(&self) -> Option<&VariableSet> {
        match self {
            Self::Table(table) => Some(table),
            _ => None,
        }
    }

    /// Falsy values hide `{{#section}}` blocks and show `{{^section}}` ones.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Boolean(value) => *value,
            Self::Integer(value) => *value != 0,
            Self::Float(value) => *value != 0.0,
            Self::String(value) => !value.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Table(table) => !table.is_empty(),
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Integer(value) => write!(f, "{value}"),
            // GLSL needs the decimal point to read a literal as a float.
            Self::Float(value) if value.is_finite() && value.fract() == 0.0 => {
                write!(f, "{value:.1}")
            }
            Self::Float(value) => write!(f, "{value}"),
            Self::String(value) => f.write_str(value),
            Self::List(items) => {
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Self::Table(_) => Ok(()),
        }
    }
}

impl From<&str> for Variable {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for Variable {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Variable {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<VariableSet> for Variable {
    fn from(value: VariableSet) -> Self {
        Self::Table(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VariableError {
    #[error("'{0}' must be in the form 'key=value'")]
    MissingSeparator(String),
    #[error("'{0}' has an empty key")]
    EmptyKey(String),
}

/// A single `key=value` override as typed by the user.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableOverride {
    pub key: String,
    pub value: Variable,
}

impl FromStr for VariableOverride {
    type Err = VariableError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| VariableError::MissingSeparator(raw.to_string()))?;
        if key.trim().is_empty() {
            return Err(VariableError::EmptyKey(raw.to_string()));
        }
        Ok(Self {
            key: key.to_string(),
            value: coerce_scalar(value),
        })
    }
}

/// Interprets an override value as an integer, then a float, then a string.
pub fn coerce_scalar(raw: &str) -> Variable {
    if let Ok(value) = raw.parse::<i64>() {
        return Variable::Integer(value);
    }
    if let Ok(value) = raw.parse::<f64>() {
        return Variable::Float(value);
    }
    Variable::String(raw.to_string())
}

/// Writes `value` at a dotted path, creating intermediate tables and
/// replacing any non-table value standing in the way.
pub fn set_dotted(dest: &mut VariableSet, key: &str, value: Variable) {
    let Some((head, rest)) = key.split_once('.') else {
        dest.insert(key.to_string(), value);
        return;
    };
    let slot = dest
        .entry(head.to_string())
        .or_insert_with(|| Variable::Table(VariableSet::new()));
    if !matches!(slot, Variable::Table(_)) {
        *slot = Variable::Table(VariableSet::new());
    }
    if let Variable::Table(table) = slot {
        set_dotted(table, rest, value);
    }
}

/// Folds flat overrides into one nested set, later overrides winning.
pub fn expand_overrides<'a, I>(overrides: I) -> VariableSet
where
    I: IntoIterator<Item = &'a VariableOverride>,
{
    let mut expanded = VariableSet::new();
    for item in overrides {
        set_dotted(&mut expanded, &item.key, item.value.clone());
    }
    expanded
}

/// Expands every dotted key of a flat set into nested tables.
pub fn expand_dotted(flat: VariableSet) -> VariableSet {
    let mut expanded = VariableSet::new();
    for (key, value) in flat {
        set_dotted(&mut expanded, &key, value);
    }
    expanded
}

/// Merges `source` into `dest`. Tables present on both sides merge
/// recursively; any other collision takes the value from `source`.
pub fn deep_merge(dest: &mut VariableSet, source: VariableSet) {
    for (key, incoming) in source {
        match (dest.get_mut(&key), incoming) {
            (Some(Variable::Table(existing)), Variable::Table(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, incoming) => {
                dest.insert(key, incoming);
            }
        }
    }
}

/// Combines sources in priority order, lowest first.
pub fn merge_sources<I>(sources: I) -> VariableSet
where
    I: IntoIterator<Item = VariableSet>,
{
    let mut merged = VariableSet::new();
    for source in sources {
        deep_merge(&mut merged, source);
    }
    merged
}

/// Top-level keys of `variables` that collide with [`RESERVED_NAMES`].
pub fn reserved_collisions(variables: &VariableSet) -> Vec<String> {
    variables
        .keys()
        .filter(|key| RESERVED_NAMES.contains(&key.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(&str, Variable)]) -> VariableSet {
        entries
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn merges_nested_tables_without_clobbering() {
        let first = table(&[(
            "foo",
            Variable::Table(table(&[("bar", Variable::Integer(1))])),
        )]);
        let second = table(&[(
            "foo",
            Variable::Table(table(&[("baz", Variable::Integer(2))])),
        )]);

        let merged = merge_sources([first, second]);
        assert_eq!(
            merged,
            table(&[(
                "foo",
                Variable::Table(table(&[
                    ("bar", Variable::Integer(1)),
                    ("baz", Variable::Integer(2)),
                ])),
            )])
        );
    }

    #[test]
    fn later_scalar_wins() {
        let merged = merge_sources([
            table(&[("foo", "bar".into())]),
            table(&[("foo", "baz".into())]),
        ]);
        assert_eq!(merged, table(&[("foo", "baz".into())]));
    }

    #[test]
    fn later_table_replaces_earlier_scalar() {
        let first = expand_dotted(table(&[("foo.bar", Variable::Integer(1))]));
        let second = expand_dotted(table(&[("foo.bar.baz", Variable::Integer(2))]));

        let merged = merge_sources([first, second]);
        let expected = table(&[(
            "foo",
            Variable::Table(table(&[(
                "bar",
                Variable::Table(table(&[("baz", Variable::Integer(2))])),
            )])),
        )]);
        assert_eq!(merged, expected);
    }

    #[test]
    fn dotted_set_overwrites_scalar_in_the_way() {
        let mut vars = table(&[("foo", Variable::Integer(3))]);
        set_dotted(&mut vars, "foo.bar", Variable::Integer(4));
        assert_eq!(
            vars,
            table(&[("foo", Variable::Table(table(&[("bar", Variable::Integer(4))])))])
        );
    }

    #[test]
    fn dotted_set_descends_through_existing_tables() {
        let mut vars = table(&[(
            "a",
            Variable::Table(table(&[
                ("keep", Variable::Integer(1)),
                ("b", Variable::from("scalar")),
            ])),
        )]);
        set_dotted(&mut vars, "a.b.c", Variable::Integer(2));
        let a = vars["a"].as_table().unwrap();
        assert_eq!(a["keep"], Variable::Integer(1));
        assert_eq!(
            a["b"],
            Variable::Table(table(&[("c", Variable::Integer(2))]))
        );
    }

    #[test]
    fn parses_override_tokens() {
        let parsed: VariableOverride = "key=3".parse().unwrap();
        assert_eq!(parsed.key, "key");
        assert_eq!(parsed.value, Variable::Integer(3));

        let parsed: VariableOverride = "ratio=0.5".parse().unwrap();
        assert_eq!(parsed.value, Variable::Float(0.5));

        let parsed: VariableOverride = "expr=a=b".parse().unwrap();
        assert_eq!(parsed.key, "expr");
        assert_eq!(parsed.value, Variable::String("a=b".into()));

        assert_eq!(
            "novalue".parse::<VariableOverride>(),
            Err(VariableError::MissingSeparator("novalue".into()))
        );
        assert!(matches!(
            "=3".parse::<VariableOverride>(),
            Err(VariableError::EmptyKey(_))
        ));
    }

    #[test]
    fn expands_overrides_in_order() {
        let overrides: Vec<VariableOverride> = ["foo.bar=1", "foo.baz=2", "foo.bar=5"]
            .iter()
            .map(|raw| raw.parse().unwrap())
            .collect();
        let expanded = expand_overrides(&overrides);
        assert_eq!(
            expanded,
            table(&[(
                "foo",
                Variable::Table(table(&[
                    ("bar", Variable::Integer(5)),
                    ("baz", Variable::Integer(2)),
                ])),
            )])
        );
    }

    #[test]
    fn reports_reserved_collisions() {
        let vars = table(&[("nc", Variable::Integer(1)), ("fine", Variable::Integer(2))]);
        assert_eq!(reserved_collisions(&vars), vec!["nc".to_string()]);
    }

    #[test]
    fn floats_keep_decimal_point() {
        assert_eq!(Variable::Float(3.0).to_string(), "3.0");
        assert_eq!(Variable::Float(0.25).to_string(), "0.25");
        assert_eq!(Variable::Integer(3).to_string(), "3");
    }
}
