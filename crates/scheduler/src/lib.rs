use std::time::Duration;

use chrono::{NaiveTime, Timelike};
use shadeconfig::{ConfigTree, FieldError, ShaderEntry, Variable, VariableSet};
use shaders::{ShaderError, ShaderIdentity};
use tracing::debug;

/// Number of evenly spaced ticks a gradual shift is split into.
pub const GRADUAL_SHIFT_STEPS: u32 = 10;

/// Template variable carrying the progress of a gradual shift.
pub const SHIFT_FRACTION: &str = "shift_fraction";

/// Older name for the shift progress, counted from `1 / (steps + 1)` so it
/// never reads zero.
pub const GRADUAL_PERCENTAGE: &str = "gradualPercentage";

const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Config(#[from] FieldError),
    #[error(transparent)]
    Shader(#[from] ShaderError),
}

/// A scheduled entry with its end made concrete.
#[derive(Debug, Clone)]
pub struct ResolvedInterval<'a> {
    pub entry: &'a ShaderEntry,
    pub name: &'a str,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub gradual_shift: Option<Duration>,
}

impl ResolvedInterval<'_> {
    pub fn contains(&self, t: NaiveTime) -> bool {
        is_time_between(t, self.start_time, self.end_time)
    }

    /// Length of the window; a window ending where it starts spans a full day.
    fn span_millis(&self) -> i64 {
        match offset_millis(self.start_time, self.end_time) {
            0 => DAY_MILLIS,
            span => span,
        }
    }

    /// Gradual shift ticks that fall strictly inside the window.
    pub fn shift_ticks(&self) -> Vec<NaiveTime> {
        let Some(duration) = self.gradual_shift else {
            return Vec::new();
        };
        let span = self.span_millis();
        (1..=GRADUAL_SHIFT_STEPS)
            .map(|step| tick_offset(duration, step))
            .take_while(|offset| *offset < span)
            .map(|offset| self.start_time + chrono::Duration::milliseconds(offset))
            .collect()
    }

    /// Ticks already reached at `t`, if the window shifts gradually and
    /// contains `t`.
    fn passed_steps(&self, t: NaiveTime) -> Option<u32> {
        let duration = self.gradual_shift?;
        if !self.contains(t) {
            return None;
        }
        let elapsed = offset_millis(self.start_time, t);
        let passed = (1..=GRADUAL_SHIFT_STEPS)
            .filter(|step| tick_offset(duration, *step) <= elapsed)
            .count();
        u32::try_from(passed).ok()
    }

    /// Progress through the gradual shift at `t`, in steps of
    /// `1 / GRADUAL_SHIFT_STEPS` and rounded to two decimals.
    pub fn shift_fraction(&self, t: NaiveTime) -> Option<f64> {
        let passed = self.passed_steps(t)?;
        Some(two_decimals(f64::from(passed) / f64::from(GRADUAL_SHIFT_STEPS)))
    }

    pub fn gradual_percentage(&self, t: NaiveTime) -> Option<f64> {
        let passed = self.passed_steps(t)?;
        Some(two_decimals(f64::from(passed + 1) / f64::from(GRADUAL_SHIFT_STEPS + 1)))
    }

    /// This entry's own variables, plus the shift progress when one applies.
    pub fn variables_at(&self, t: NaiveTime) -> Result<VariableSet, FieldError> {
        let mut variables = entry_variables(self.entry)?;
        if let (Some(fraction), Some(percentage)) =
            (self.shift_fraction(t), self.gradual_percentage(t))
        {
            variables.insert(SHIFT_FRACTION.to_string(), Variable::Float(fraction));
            variables.insert(GRADUAL_PERCENTAGE.to_string(), Variable::Float(percentage));
        }
        Ok(variables)
    }
}

/// A shader together with the config variables it is rendered with.
#[derive(Debug, Clone)]
pub struct ShaderSelection {
    pub identity: ShaderIdentity,
    pub variables: VariableSet,
}

/// Answers which shader should be active at a given time of day.
pub struct Schedule<'a> {
    config: &'a ConfigTree,
}

impl<'a> Schedule<'a> {
    pub fn new(config: &'a ConfigTree) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &'a ConfigTree {
        self.config
    }

    /// Non-default entries sorted by start time. Equal start times keep
    /// document order.
    pub fn entries(&self) -> Result<Vec<(NaiveTime, &'a ShaderEntry)>, FieldError> {
        let mut entries = Vec::new();
        for entry in self.config.shaders()? {
            if entry.default()? {
                continue;
            }
            entries.push((entry.required_start_time()?, entry));
        }
        entries.sort_by_key(|(start, _)| *start);
        Ok(entries)
    }

    /// Pairs every entry with its successor, the last wrapping to the first.
    /// An open entry followed by one with the same start never becomes
    /// active and is left out.
    pub fn resolved_intervals(&self) -> Result<Vec<ResolvedInterval<'a>>, FieldError> {
        let entries = self.entries()?;
        let successors = entries.iter().cycle().skip(1);
        let mut intervals = Vec::with_capacity(entries.len());
        for (index, (&(start_time, entry), &(next_start, _))) in
            entries.iter().zip(successors).enumerate()
        {
            let end_time = match entry.end_time()? {
                Some(end_time) => end_time,
                None if next_start == start_time && index + 1 < entries.len() => {
                    debug!(shader = entry.name()?, %start_time, "entry shadowed by a later one");
                    continue;
                }
                None => next_start,
            };
            intervals.push(ResolvedInterval {
                entry,
                name: entry.name()?,
                start_time,
                end_time,
                gradual_shift: entry.gradual_shift()?,
            });
        }
        Ok(intervals)
    }

    pub fn active_interval(
        &self,
        t: NaiveTime,
    ) -> Result<Option<ResolvedInterval<'a>>, FieldError> {
        Ok(self
            .resolved_intervals()?
            .into_iter()
            .find(|interval| interval.contains(t)))
    }

    /// The entry active at `t`, falling back to the default entry.
    pub fn scheduled_entry(&self, t: NaiveTime) -> Result<Option<&'a ShaderEntry>, FieldError> {
        if let Some(interval) = self.active_interval(t)? {
            debug!(time = %t, shader = interval.name, "matched scheduled interval");
            return Ok(Some(interval.entry));
        }
        self.default_entry()
    }

    pub fn default_entry(&self) -> Result<Option<&'a ShaderEntry>, FieldError> {
        for entry in self.config.shaders()? {
            if entry.default()? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// The shader active at `t` with the variables of the entry that
    /// scheduled it.
    pub fn scheduled_shader(
        &self,
        t: NaiveTime,
    ) -> Result<Option<ShaderSelection>, SchedulerError> {
        if let Some(interval) = self.active_interval(t)? {
            debug!(time = %t, shader = interval.name, "matched scheduled interval");
            return Ok(Some(ShaderSelection {
                identity: identity(interval.entry)?,
                variables: interval.variables_at(t)?,
            }));
        }
        self.default_shader()
    }

    pub fn default_shader(&self) -> Result<Option<ShaderSelection>, SchedulerError> {
        let Some(entry) = self.default_entry()? else {
            return Ok(None);
        };
        Ok(Some(ShaderSelection {
            identity: identity(entry)?,
            variables: entry_variables(entry)?,
        }))
    }

    /// Every time the active shader may change, in schedule order without
    /// duplicates.
    pub fn event_times(&self) -> Result<Vec<NaiveTime>, FieldError> {
        let mut times = Vec::new();
        for interval in self.resolved_intervals()? {
            let own_end = interval.entry.end_time()?;
            let candidates = std::iter::once(interval.start_time)
                .chain(interval.shift_ticks())
                .chain(own_end);
            for time in candidates {
                if !times.contains(&time) {
                    times.push(time);
                }
            }
        }
        Ok(times)
    }

    /// The gradual shift progress of the entry named `name` at `t`, if that
    /// entry is the active one and shifts gradually.
    pub fn shift_fraction(&self, name: &str, t: NaiveTime) -> Result<Option<f64>, FieldError> {
        Ok(self
            .active_interval(t)?
            .filter(|interval| interval.name == name)
            .and_then(|interval| interval.shift_fraction(t)))
    }

    /// Variables the config supplies for a shader picked by name. The active
    /// entry wins when it names that shader, otherwise the first entry with
    /// the name is used.
    pub fn variables_at(&self, name: &str, t: NaiveTime) -> Result<VariableSet, FieldError> {
        if let Some(interval) = self.active_interval(t)? {
            if interval.name == name {
                return interval.variables_at(t);
            }
        }
        match self.config.entry(name)? {
            Some(entry) => entry_variables(entry),
            None => Ok(VariableSet::new()),
        }
    }
}

fn identity(entry: &ShaderEntry) -> Result<ShaderIdentity, SchedulerError> {
    Ok(ShaderIdentity::parse(entry.name()?)?)
}

fn entry_variables(entry: &ShaderEntry) -> Result<VariableSet, FieldError> {
    Ok(entry.variables()?.cloned().unwrap_or_default())
}

fn two_decimals(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Membership in `[start, end)`, where `end <= start` wraps past midnight.
pub fn is_time_between(t: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if end <= start {
        start <= t || t < end
    } else {
        start <= t && t < end
    }
}

fn millis_of_day(t: NaiveTime) -> i64 {
    i64::from(t.num_seconds_from_midnight()) * 1000 + i64::from(t.nanosecond() / 1_000_000)
}

/// Forward distance from `from` to `to` around the clock.
fn offset_millis(from: NaiveTime, to: NaiveTime) -> i64 {
    (millis_of_day(to) - millis_of_day(from)).rem_euclid(DAY_MILLIS)
}

fn tick_offset(duration: Duration, step: u32) -> i64 {
    let total = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
    total.saturating_mul(i64::from(step)) / i64::from(GRADUAL_SHIFT_STEPS)
}
