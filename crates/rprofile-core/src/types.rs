use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Commands a profile or group is able to run on a schedule, in display order.
pub const SCHEDULABLE_COMMANDS: &[&str] = &["backup", "check", "copy", "forget", "prune"];

/// Identity of a scheduled job: the owning profile or group plus the command.
///
/// Displays as the job token `<command>@<name>` that the scheduler passes back
/// to `run-schedule` when the job fires.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScheduleOrigin {
    pub name: String,
    pub command: String,
}

impl ScheduleOrigin {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }

    /// Split a `<command>@<name>` token on its first `@`.
    pub fn parse(token: &str) -> Option<Self> {
        let (command, name) = token.split_once('@')?;
        Some(Self::new(name, command))
    }
}

impl fmt::Display for ScheduleOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.command, self.name)
    }
}

/// How a scheduled run treats the repository lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockMode {
    /// Honour the lock, optionally waiting `lock-wait` for it.
    #[default]
    Default,
    /// Fail straight away when the lock is held.
    Fail,
    /// Run without taking the lock at all.
    Ignore,
}

impl FromStr for LockMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "" | "default" => Ok(LockMode::Default),
            "fail" => Ok(LockMode::Fail),
            "ignore" => Ok(LockMode::Ignore),
            other => Err(format!("unknown lock mode: {other}")),
        }
    }
}

/// Privilege level the job is installed with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    #[default]
    Auto,
    User,
    System,
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "" | "auto" => Ok(Permission::Auto),
            "user" => Ok(Permission::User),
            "system" => Ok(Permission::System),
            other => Err(format!("unknown schedule permission: {other}")),
        }
    }
}

/// Where a [`Schedule`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleSource {
    /// Declared in the configuration file.
    Declared,
    /// Synthesized so a job left over from an older configuration can be
    /// targeted for removal. Never installed.
    RemoveOnly,
}

/// One job definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    origin: ScheduleOrigin,
    source: ScheduleSource,
    flags: BTreeMap<String, String>,
    /// Calendar expressions, one installed entry each.
    pub at: Vec<String>,
    /// Configuration file the job re-runs `run-schedule` with.
    pub config_file: PathBuf,
    pub permission: Permission,
    pub log: Option<String>,
    pub command_output: Option<String>,
    /// Skip the run on battery when the charge is below this percentage.
    pub ignore_on_battery_less_than: Option<u8>,
    /// `None` when not set in the configuration.
    pub ignore_on_battery: Option<bool>,
    pub lock_mode: LockMode,
    /// Only meaningful with [`LockMode::Default`].
    pub lock_wait: Option<Duration>,
}

impl Schedule {
    pub fn declared(origin: ScheduleOrigin, config_file: impl AsRef<Path>) -> Self {
        Self::with_source(origin, config_file, ScheduleSource::Declared)
    }

    /// A placeholder carrying only an origin and scheduler defaults.
    pub fn remove_only(origin: ScheduleOrigin, config_file: impl AsRef<Path>) -> Self {
        Self::with_source(origin, config_file, ScheduleSource::RemoveOnly)
    }

    fn with_source(
        origin: ScheduleOrigin,
        config_file: impl AsRef<Path>,
        source: ScheduleSource,
    ) -> Self {
        Self {
            origin,
            source,
            flags: BTreeMap::new(),
            at: Vec::new(),
            config_file: config_file.as_ref().to_path_buf(),
            permission: Permission::Auto,
            log: None,
            command_output: None,
            ignore_on_battery_less_than: None,
            ignore_on_battery: None,
            lock_mode: LockMode::Default,
            lock_wait: None,
        }
    }

    pub fn origin(&self) -> &ScheduleOrigin {
        &self.origin
    }

    pub fn source(&self) -> ScheduleSource {
        self.source
    }

    pub fn is_declared(&self) -> bool {
        self.source == ScheduleSource::Declared
    }

    pub fn set_flag(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.flags.insert(name.into(), value.into());
    }

    pub fn flag(&self, name: &str) -> Option<&str> {
        self.flags.get(name).map(String::as_str)
    }

    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.contains_key(name)
    }

    pub fn flags(&self) -> &BTreeMap<String, String> {
        &self.flags
    }
}

/// Parse durations such as `90s`, `10m`, `1h30m` or `500ms`.
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut number = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        let value: u64 = number
            .parse()
            .map_err(|_| format!("invalid duration: {s}"))?;
        number.clear();
        let out_of_range = || format!("duration out of range: {s}");
        let secs = |factor: u64| {
            value
                .checked_mul(factor)
                .map(Duration::from_secs)
                .ok_or_else(out_of_range)
        };
        let part = match c {
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                Duration::from_millis(value)
            }
            's' => secs(1)?,
            'm' => secs(60)?,
            'h' => secs(3600)?,
            'd' => secs(86400)?,
            _ => return Err(format!("invalid duration: {s}")),
        };
        total = total.checked_add(part).ok_or_else(out_of_range)?;
    }
    if !number.is_empty() {
        return Err(format!("missing unit in duration: {s}"));
    }
    Ok(total)
}
