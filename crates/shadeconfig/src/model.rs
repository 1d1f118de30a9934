//! Typed view over a raw TOML schedule document.
//!
//! Nothing is validated up front. Each accessor checks its field the first
//! time it is called and memoizes the outcome, failure included, so a field is
//! validated at most once. Every failure is a [`FieldError`] carrying the
//! breadcrumb of the element that failed (`shaders -> 3 -> start_time`).
//!
//! The schedule list itself is the exception: element shape, the
//! default/start-time conflict, zero-width windows and duplicate defaults are
//! all checked together the first time [`ConfigTree::shaders`] runs, so a
//! broken schedule fails no matter which field a caller reaches for first.
use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::time::Duration;

use chrono::NaiveTime;
use toml::value::Datetime;
use toml::{Table, Value};
use tracing::debug;

use crate::variables::{Variable, VariableSet, RESERVED_NAMES};

/// Array keys accepted for the schedule, in the order they are read.
pub const SCHEDULE_KEYS: [&str; 2] = ["shaders", "shades"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Location(Vec<String>);

impl Location {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn join(&self, step: impl Into<String>) -> Self {
        let mut steps = self.0.clone();
        steps.push(step.into());
        Self(steps)
    }

    pub fn steps(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" -> "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldErrorKind {
    Schema,
    MultipleDefaults,
    ReservedVariable(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to parse {document}:\n{location}\n  {message}")]
pub struct FieldError {
    pub kind: FieldErrorKind,
    pub message: String,
    pub location: Location,
    pub document: String,
}

type Memo<T> = OnceCell<Result<T, FieldError>>;

fn memoized<'a, T>(
    cell: &'a Memo<T>,
    init: impl FnOnce() -> Result<T, FieldError>,
) -> Result<&'a T, FieldError> {
    cell.get_or_init(init).as_ref().map_err(Clone::clone)
}

#[derive(Debug)]
pub struct ConfigTree {
    document: String,
    raw: RefCell<Table>,
    shaders: Memo<Vec<ShaderEntry>>,
}

impl ConfigTree {
    /// Wraps an already deserialized document. `document` names it in errors.
    pub fn new(raw: Table, document: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            raw: RefCell::new(raw),
            shaders: OnceCell::new(),
        }
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    /// Snapshot of the document including values written back by accessors.
    pub fn raw(&self) -> Table {
        self.raw.borrow().clone()
    }

    pub fn shaders(&self) -> Result<&[ShaderEntry], FieldError> {
        memoized(&self.shaders, || self.parse_shaders()).map(Vec::as_slice)
    }

    /// The first entry named `name`, if any.
    pub fn entry(&self, name: &str) -> Result<Option<&ShaderEntry>, FieldError> {
        for entry in self.shaders()? {
            if entry.name()? == name {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Forces every field of every entry, returning the first failure.
    pub fn validate(&self) -> Result<(), FieldError> {
        for entry in self.shaders()? {
            entry.validate()?;
        }
        Ok(())
    }

    fn error(
        &self,
        kind: FieldErrorKind,
        message: impl Into<String>,
        location: Location,
    ) -> FieldError {
        FieldError {
            kind,
            message: message.into(),
            location,
            document: self.document.clone(),
        }
    }

    fn parse_shaders(&self) -> Result<Vec<ShaderEntry>, FieldError> {
        let present: Vec<(&str, Value)> = {
            let raw = self.raw.borrow();
            SCHEDULE_KEYS
                .iter()
                .filter_map(|key| raw.get(*key).map(|value| (*key, value.clone())))
                .collect()
        };

        if present.is_empty() {
            self.raw
                .borrow_mut()
                .insert(SCHEDULE_KEYS[0].to_string(), Value::Array(Vec::new()));
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        let mut found_default = false;
        for (key, value) in present {
            let location = Location::root().join(key);
            let Value::Array(items) = value else {
                return Err(self.error(FieldErrorKind::Schema, "must be an array", location));
            };

            for (idx, item) in items.into_iter().enumerate() {
                let location = location.join((idx + 1).to_string());
                let Value::Table(table) = item else {
                    return Err(self.error(FieldErrorKind::Schema, "must be a table", location));
                };

                let is_default = matches!(table.get("default"), Some(Value::Boolean(true)));
                if is_default && table.contains_key("start_time") {
                    return Err(self.error(
                        FieldErrorKind::Schema,
                        "default shader must not define `start_time`",
                        location,
                    ));
                }
                let window = (table.get("start_time"), table.get("end_time"));
                if let (Some(start), Some(end)) = window {
                    if start == end {
                        return Err(self.error(
                            FieldErrorKind::Schema,
                            "`start_time` and `end_time` must not be the same",
                            location,
                        ));
                    }
                }
                if is_default {
                    if found_default {
                        return Err(self.error(
                            FieldErrorKind::MultipleDefaults,
                            "only one default shader is allowed",
                            location,
                        ));
                    }
                    found_default = true;
                }

                entries.push(ShaderEntry::new(table, self.document.clone(), location));
            }
        }

        debug!(document = %self.document, entries = entries.len(), "parsed schedule entries");
        Ok(entries)
    }
}

#[derive(Debug)]
pub struct ShaderEntry {
    document: String,
    location: Location,
    raw: RefCell<Table>,
    name: Memo<String>,
    start_time: Memo<Option<NaiveTime>>,
    end_time: Memo<Option<NaiveTime>>,
    default: Memo<bool>,
    variables: Memo<Option<VariableSet>>,
    gradual_shift: Memo<Option<Duration>>,
}

impl ShaderEntry {
    fn new(raw: Table, document: String, location: Location) -> Self {
        Self {
            document,
            location,
            raw: RefCell::new(raw),
            name: OnceCell::new(),
            start_time: OnceCell::new(),
            end_time: OnceCell::new(),
            default: OnceCell::new(),
            variables: OnceCell::new(),
            gradual_shift: OnceCell::new(),
        }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn raw(&self) -> Table {
        self.raw.borrow().clone()
    }

    pub fn name(&self) -> Result<&str, FieldError> {
        memoized(&self.name, || {
            let value = self.field("name");
            match value {
                None => Err(self.error("name", "required field")),
                Some(Value::String(name)) if name.is_empty() => {
                    Err(self.error("name", "must not be empty"))
                }
                Some(Value::String(name)) if name.contains('.') => {
                    Err(self.error("name", format!("'{name}' must not contain a period")))
                }
                Some(Value::String(name)) => Ok(name),
                Some(_) => Err(self.error("name", "must be a string")),
            }
        })
        .map(String::as_str)
    }

    pub fn start_time(&self) -> Result<Option<NaiveTime>, FieldError> {
        memoized(&self.start_time, || self.time_field("start_time")).copied()
    }

    /// Start time of a scheduled (non-default) entry, where it is mandatory.
    pub fn required_start_time(&self) -> Result<NaiveTime, FieldError> {
        self.start_time()?
            .ok_or_else(|| self.error("start_time", "required field"))
    }

    pub fn end_time(&self) -> Result<Option<NaiveTime>, FieldError> {
        memoized(&self.end_time, || self.time_field("end_time")).copied()
    }

    pub fn default(&self) -> Result<bool, FieldError> {
        memoized(&self.default, || match self.field("default") {
            None => {
                self.raw
                    .borrow_mut()
                    .insert("default".to_string(), Value::Boolean(false));
                Ok(false)
            }
            Some(Value::Boolean(value)) => Ok(value),
            Some(_) => Err(self.error("default", "must be a boolean")),
        })
        .copied()
    }

    /// Template variables for this entry. String leaves are uppercased on
    /// the way in; overrides applied later are left as typed.
    pub fn variables(&self) -> Result<Option<&VariableSet>, FieldError> {
        memoized(&self.variables, || {
            let (field, value) = match (self.field("variables"), self.field("config")) {
                (Some(value), _) => ("variables", value),
                (None, Some(value)) => ("config", value),
                (None, None) => return Ok(None),
            };
            let Value::Table(table) = value else {
                return Err(self.error(field, "must be a table"));
            };

            let offending: Vec<String> = table
                .keys()
                .filter(|key| RESERVED_NAMES.contains(&key.as_str()))
                .cloned()
                .collect();
            if let Some(first) = offending.first() {
                return Err(FieldError {
                    kind: FieldErrorKind::ReservedVariable(offending.clone()),
                    message: format!(
                        "variable names {} are reserved (found {})",
                        quoted(RESERVED_NAMES.iter().copied()),
                        quoted(offending.iter().map(String::as_str)),
                    ),
                    location: self.location.join(field).join(first.clone()),
                    document: self.document.clone(),
                });
            }

            Ok(Some(uppercase_table(table)))
        })
        .map(Option::as_ref)
    }

    /// Length of the gradual transition at the start of this entry's window.
    pub fn gradual_shift(&self) -> Result<Option<Duration>, FieldError> {
        memoized(&self.gradual_shift, || {
            match self.field("gradual_shift_duration") {
                None => Ok(None),
                Some(Value::Integer(seconds)) if seconds >= 0 => {
                    Ok(Some(Duration::from_secs(seconds as u64)))
                }
                Some(Value::Integer(_)) => Err(self.error(
                    "gradual_shift_duration",
                    "must be a non-negative number of seconds",
                )),
                Some(_) => Err(self.error("gradual_shift_duration", "must be an integer")),
            }
        })
        .copied()
    }

    pub fn validate(&self) -> Result<(), FieldError> {
        self.name()?;
        self.start_time()?;
        self.end_time()?;
        self.default()?;
        self.variables()?;
        self.gradual_shift()?;
        Ok(())
    }

    fn field(&self, key: &str) -> Option<Value> {
        self.raw.borrow().get(key).cloned()
    }

    fn time_field(&self, key: &str) -> Result<Option<NaiveTime>, FieldError> {
        match self.field(key) {
            None => Ok(None),
            Some(Value::Datetime(datetime)) => time_of_day(&datetime)
                .map(Some)
                .ok_or_else(|| self.error(key, "must be time")),
            Some(_) => Err(self.error(key, "must be time")),
        }
    }

    fn error(&self, field: &str, message: impl Into<String>) -> FieldError {
        FieldError {
            kind: FieldErrorKind::Schema,
            message: message.into(),
            location: self.location.join(field),
            document: self.document.clone(),
        }
    }
}

/// Accepts TOML local times only; dates and offsets are rejected.
fn time_of_day(datetime: &Datetime) -> Option<NaiveTime> {
    if datetime.date.is_some() || datetime.offset.is_some() {
        return None;
    }
    let time = datetime.time?;
    NaiveTime::from_hms_nano_opt(
        u32::from(time.hour),
        u32::from(time.minute),
        u32::from(time.second),
        time.nanosecond,
    )
}

fn uppercase_table(table: Table) -> VariableSet {
    table
        .into_iter()
        .map(|(key, value)| (key, uppercase_value(value)))
        .collect()
}

fn uppercase_value(value: Value) -> Variable {
    match value {
        Value::String(value) => Variable::String(value.to_uppercase()),
        Value::Integer(value) => Variable::Integer(value),
        Value::Float(value) => Variable::Float(value),
        Value::Boolean(value) => Variable::Boolean(value),
        Value::Datetime(value) => Variable::String(value.to_string()),
        Value::Array(items) => Variable::List(items.into_iter().map(uppercase_value).collect()),
        Value::Table(table) => Variable::Table(uppercase_table(table)),
    }
}

fn quoted<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names
        .map(|name| format!("'{name}'"))
        .collect::<Vec<_>>()
        .join(", ")
}
