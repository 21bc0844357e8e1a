use std::collections::BTreeMap;
use std::fmt;

use crate::types::{Schedule, SCHEDULABLE_COMMANDS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulableKind {
    Profile,
    Group,
}

impl SchedulableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulableKind::Profile => "profile",
            SchedulableKind::Group => "group",
        }
    }

    /// `"Profile"` / `"Group"`, for report headers.
    pub fn title(&self) -> &'static str {
        match self {
            SchedulableKind::Profile => "Profile",
            SchedulableKind::Group => "Group",
        }
    }
}

impl fmt::Display for SchedulableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named backup profile, materialized from its configuration section.
#[derive(Debug, Clone)]
pub struct Profile {
    pub name: String,
    pub description: Option<String>,
    pub(crate) schedules: BTreeMap<String, Schedule>,
    pub(crate) deprecations: Vec<String>,
}

impl Profile {
    /// Declared schedules keyed by command.
    pub fn schedules(&self) -> &BTreeMap<String, Schedule> {
        &self.schedules
    }

    pub fn schedulable_commands(&self) -> &'static [&'static str] {
        SCHEDULABLE_COMMANDS
    }

    /// Notices about deprecated configuration found while loading this profile.
    pub fn deprecation_notices(&self) -> &[String] {
        &self.deprecations
    }
}

/// A named collection of profiles that can own schedules of its own.
#[derive(Debug, Clone)]
pub struct Group {
    pub name: String,
    pub description: Option<String>,
    pub profiles: Vec<String>,
    pub(crate) schedules: BTreeMap<String, Schedule>,
}

impl Group {
    pub fn schedules(&self) -> &BTreeMap<String, Schedule> {
        &self.schedules
    }

    pub fn schedulable_commands(&self) -> &'static [&'static str] {
        SCHEDULABLE_COMMANDS
    }
}

/// Anything able to declare scheduled jobs.
#[derive(Debug, Clone)]
pub enum Schedulable {
    Profile(Profile),
    Group(Group),
}

impl Schedulable {
    pub fn kind(&self) -> SchedulableKind {
        match self {
            Schedulable::Profile(_) => SchedulableKind::Profile,
            Schedulable::Group(_) => SchedulableKind::Group,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Schedulable::Profile(p) => &p.name,
            Schedulable::Group(g) => &g.name,
        }
    }

    pub fn schedules(&self) -> &BTreeMap<String, Schedule> {
        match self {
            Schedulable::Profile(p) => p.schedules(),
            Schedulable::Group(g) => g.schedules(),
        }
    }

    /// Every command this entity could schedule, declared or not.
    pub fn schedulable_commands(&self) -> &'static [&'static str] {
        match self {
            Schedulable::Profile(p) => p.schedulable_commands(),
            Schedulable::Group(g) => g.schedulable_commands(),
        }
    }

    /// Declared schedules in command order.
    pub fn declared_schedules(&self) -> Vec<Schedule> {
        self.schedules().values().cloned().collect()
    }
}

impl From<Profile> for Schedulable {
    fn from(profile: Profile) -> Self {
        Schedulable::Profile(profile)
    }
}

impl From<Group> for Schedulable {
    fn from(group: Group) -> Self {
        Schedulable::Group(group)
    }
}
