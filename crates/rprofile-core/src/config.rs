use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::schedulable::{Group, Profile};
use crate::types::{parse_duration, Schedule, ScheduleOrigin, SCHEDULABLE_COMMANDS};

pub const DEFAULT_CONFIG_FILE: &str = "profiles.toml";
pub const DEFAULT_SCHEDULER: &str = "crontab";
pub const DEFAULT_RESTIC_BINARY: &str = "restic";
/// Environment overrides: `RPROFILE_GLOBAL__SCHEDULER=crontab:/etc/cron.d/rprofile`.
pub const ENV_PREFIX: &str = "RPROFILE_";

/// Read-only view of the configuration consumed by the scheduling commands.
pub trait ConfigProvider {
    fn global_section(&self) -> Result<GlobalSection>;
    fn has_profile(&self, name: &str) -> bool;
    /// Materialize a profile. Fails with [`ConfigError::NotFound`] when the
    /// profile does not exist and [`ConfigError::Invalid`] when it cannot be
    /// loaded.
    fn get_profile(&self, name: &str) -> Result<Profile>;
    fn has_profile_group(&self, name: &str) -> bool;
    fn get_profile_group(&self, name: &str) -> Result<Group>;
    fn profile_names(&self) -> Vec<String>;
    fn group_names(&self) -> Vec<String>;
    fn config_file(&self) -> &Path;
    /// Problems noticed while loading the file that did not prevent loading it.
    fn configuration_issues(&self) -> Vec<String>;
}

/// Validated `[global]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalSection {
    /// Scheduler backend selector, e.g. `crontab` or `crontab:/etc/cron.d/rprofile`.
    pub scheduler: String,
    /// `status --legacy` also reports the recorded jobs afterwards.
    pub legacy_then_current: bool,
    pub restic_binary: String,
    /// Lock wait applied by the run pipeline when a schedule sets none.
    pub default_lock_wait: Option<Duration>,
}

/// On-disk shape of the whole file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileSection>,
    #[serde(default)]
    pub groups: BTreeMap<String, GroupSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GlobalConfig {
    #[serde(default = "default_scheduler")]
    pub scheduler: String,
    #[serde(default = "bool_true")]
    pub legacy_then_current: bool,
    #[serde(default = "default_restic_binary")]
    pub restic_binary: String,
    pub default_lock_wait: Option<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            scheduler: default_scheduler(),
            legacy_then_current: true,
            restic_binary: default_restic_binary(),
            default_lock_wait: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileSection {
    pub description: Option<String>,
    #[serde(default)]
    pub schedules: BTreeMap<String, ScheduleSection>,
    /// Everything else: restic options and per-command sections. Only the
    /// deprecated `schedule*` keys of command sections are read here.
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupSection {
    pub description: Option<String>,
    #[serde(default)]
    pub profiles: Vec<String>,
    #[serde(default)]
    pub schedules: BTreeMap<String, ScheduleSection>,
}

/// A single string or a list of strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl Default for OneOrMany {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s.clone()],
            OneOrMany::Many(v) => v.clone(),
        }
    }
}

/// `[profiles.<name>.schedules.<command>]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScheduleSection {
    #[serde(default)]
    pub at: OneOrMany,
    pub log: Option<String>,
    pub command_output: Option<String>,
    pub ignore_on_battery: Option<bool>,
    pub ignore_on_battery_less_than: Option<i64>,
    pub lock_mode: Option<String>,
    pub lock_wait: Option<String>,
    pub permission: Option<String>,
    #[serde(default)]
    pub flags: BTreeMap<String, String>,
}

impl ScheduleSection {
    fn to_schedule(
        &self,
        kind: &'static str,
        origin: ScheduleOrigin,
        config_file: &Path,
    ) -> Result<Schedule> {
        let owner = origin.name.clone();
        let invalid = |reason: String| ConfigError::invalid(kind, &owner, reason);

        let at: Vec<String> = self
            .at
            .to_vec()
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if at.is_empty() {
            return Err(invalid(format!(
                "schedule for '{}' has no 'at' expression",
                origin.command
            )));
        }

        let mut schedule = Schedule::declared(origin, config_file);
        schedule.at = at;
        schedule.log = non_empty(&self.log);
        schedule.command_output = non_empty(&self.command_output);
        schedule.ignore_on_battery = self.ignore_on_battery;
        schedule.ignore_on_battery_less_than = match self.ignore_on_battery_less_than {
            Some(0) | None => None,
            Some(v @ 1..=100) => u8::try_from(v).ok(),
            Some(v) => {
                return Err(invalid(format!(
                    "ignore-on-battery-less-than must be a percentage, got {v}"
                )))
            }
        };
        schedule.lock_mode = self
            .lock_mode
            .as_deref()
            .unwrap_or_default()
            .parse()
            .map_err(invalid)?;
        schedule.lock_wait = match self.lock_wait.as_deref() {
            Some(wait) => Some(parse_duration(wait).map_err(invalid)?).filter(|d| !d.is_zero()),
            None => None,
        };
        schedule.permission = self
            .permission
            .as_deref()
            .unwrap_or_default()
            .parse()
            .map_err(invalid)?;
        for (flag, value) in &self.flags {
            schedule.set_flag(flag.clone(), value.clone());
        }
        Ok(schedule)
    }
}

/// Schedule keys that used to live in the command sections of a profile,
/// e.g. `[profiles.home.backup] schedule = "daily"`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct LegacyCommandSection {
    schedule: Option<OneOrMany>,
    schedule_log: Option<String>,
    schedule_command_output: Option<String>,
    schedule_ignore_on_battery: Option<bool>,
    schedule_ignore_on_battery_less_than: Option<i64>,
    schedule_lock_mode: Option<String>,
    schedule_lock_wait: Option<String>,
    schedule_permission: Option<String>,
}

impl LegacyCommandSection {
    fn into_schedule_section(self) -> Option<ScheduleSection> {
        Some(ScheduleSection {
            at: self.schedule?,
            log: self.schedule_log,
            command_output: self.schedule_command_output,
            ignore_on_battery: self.schedule_ignore_on_battery,
            ignore_on_battery_less_than: self.schedule_ignore_on_battery_less_than,
            lock_mode: self.schedule_lock_mode,
            lock_wait: self.schedule_lock_wait,
            permission: self.schedule_permission,
            flags: BTreeMap::new(),
        })
    }
}

/// A loaded configuration file.
#[derive(Debug, Clone)]
pub struct Config {
    path: PathBuf,
    file: ConfigFile,
    issues: Vec<String>,
}

impl Config {
    /// Load `path` with `RPROFILE_*` environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let figment = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(path, figment)
    }

    /// Parse TOML content as if it had been read from `path`.
    pub fn from_toml_str(path: impl AsRef<Path>, content: &str) -> Result<Self> {
        Self::from_figment(path.as_ref(), Figment::new().merge(Toml::string(content)))
    }

    fn from_figment(path: &Path, figment: Figment) -> Result<Self> {
        let file: ConfigFile = figment
            .extract()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        let issues = file.issues();
        debug!(
            path = %path.display(),
            profiles = file.profiles.len(),
            groups = file.groups.len(),
            "configuration loaded"
        );
        Ok(Self {
            path: path.to_path_buf(),
            file,
            issues,
        })
    }

    pub fn file(&self) -> &ConfigFile {
        &self.file
    }
}

impl ConfigFile {
    fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for name in self.profiles.keys() {
            if self.groups.contains_key(name) {
                issues.push(format!(
                    "'{name}' is both a profile and a group: the profile takes precedence"
                ));
            }
        }
        for (group, section) in &self.groups {
            for member in &section.profiles {
                if !self.profiles.contains_key(member) {
                    issues.push(format!(
                        "group '{group}' references unknown profile '{member}'"
                    ));
                }
            }
        }
        issues
    }
}

impl ConfigProvider for Config {
    fn global_section(&self) -> Result<GlobalSection> {
        let global = &self.file.global;
        let default_lock_wait = match global.default_lock_wait.as_deref() {
            Some(wait) => parse_duration(wait)
                .map_err(|e| ConfigError::invalid("section", "global", e))?,
            None => Duration::ZERO,
        };
        Ok(GlobalSection {
            scheduler: global.scheduler.trim().to_string(),
            legacy_then_current: global.legacy_then_current,
            restic_binary: global.restic_binary.clone(),
            default_lock_wait: Some(default_lock_wait).filter(|d| !d.is_zero()),
        })
    }

    fn has_profile(&self, name: &str) -> bool {
        self.file.profiles.contains_key(name)
    }

    fn get_profile(&self, name: &str) -> Result<Profile> {
        let section = self
            .file
            .profiles
            .get(name)
            .ok_or_else(|| ConfigError::NotFound {
                kind: "profile",
                name: name.to_string(),
            })?;

        let mut schedules = declared_schedules("profile", name, &section.schedules, &self.path)?;
        let mut deprecations = Vec::new();

        for command in SCHEDULABLE_COMMANDS {
            let Some(value) = section.other.get(*command) else {
                continue;
            };
            if !value.is_object() {
                continue;
            }
            let legacy: LegacyCommandSection =
                serde_json::from_value(value.clone()).map_err(|e| {
                    ConfigError::invalid("profile", name, format!("section '{command}': {e}"))
                })?;
            let Some(legacy) = legacy.into_schedule_section() else {
                continue;
            };
            if schedules.contains_key(*command) {
                deprecations.push(format!(
                    "profile '{name}': \"schedule\" in section \"{command}\" is ignored, \
                     [profiles.{name}.schedules.{command}] takes precedence"
                ));
                continue;
            }
            deprecations.push(format!(
                "profile '{name}': \"schedule\" in section \"{command}\" is deprecated, \
                 move it to [profiles.{name}.schedules.{command}]"
            ));
            let origin = ScheduleOrigin::new(name, *command);
            schedules.insert(
                command.to_string(),
                legacy.to_schedule("profile", origin, &self.path)?,
            );
        }

        Ok(Profile {
            name: name.to_string(),
            description: section.description.clone(),
            schedules,
            deprecations,
        })
    }

    fn has_profile_group(&self, name: &str) -> bool {
        self.file.groups.contains_key(name)
    }

    fn get_profile_group(&self, name: &str) -> Result<Group> {
        let section = self
            .file
            .groups
            .get(name)
            .ok_or_else(|| ConfigError::NotFound {
                kind: "group",
                name: name.to_string(),
            })?;
        Ok(Group {
            name: name.to_string(),
            description: section.description.clone(),
            profiles: section.profiles.clone(),
            schedules: declared_schedules("group", name, &section.schedules, &self.path)?,
        })
    }

    fn profile_names(&self) -> Vec<String> {
        self.file.profiles.keys().cloned().collect()
    }

    fn group_names(&self) -> Vec<String> {
        self.file.groups.keys().cloned().collect()
    }

    fn config_file(&self) -> &Path {
        &self.path
    }

    fn configuration_issues(&self) -> Vec<String> {
        self.issues.clone()
    }
}

fn declared_schedules(
    kind: &'static str,
    name: &str,
    sections: &BTreeMap<String, ScheduleSection>,
    config_file: &Path,
) -> Result<BTreeMap<String, Schedule>> {
    let mut schedules = BTreeMap::new();
    for (command, section) in sections {
        if !SCHEDULABLE_COMMANDS.contains(&command.as_str()) {
            return Err(ConfigError::invalid(
                kind,
                name,
                format!("command '{command}' cannot be scheduled"),
            ));
        }
        let origin = ScheduleOrigin::new(name, command.as_str());
        schedules.insert(command.clone(), section.to_schedule(kind, origin, config_file)?);
    }
    Ok(schedules)
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn bool_true() -> bool {
    true
}
fn default_scheduler() -> String {
    DEFAULT_SCHEDULER.to_string()
}
fn default_restic_binary() -> String {
    DEFAULT_RESTIC_BINARY.to_string()
}
