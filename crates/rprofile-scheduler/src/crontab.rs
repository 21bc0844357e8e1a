//! Crontab scheduler backend.
//!
//! Entries live between two marker lines so that the rest of the crontab is
//! left untouched:
//!
//! ```text
//! ### this content was generated by rprofile, please leave this line intact ###
//! @daily	/usr/local/bin/rprofile --no-ansi --config /etc/rprofile/profiles.toml run-schedule backup@home
//! ### end of rprofile content, please leave this line intact ###
//! ```
//!
//! The `--config` and `run-schedule` arguments are parsed back to find the
//! jobs recorded for a configuration file.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use rprofile_core::{Permission, Schedule, ScheduleOrigin};
use tracing::{debug, info, warn};

use crate::error::{Result, SchedulerError};
use crate::handler::{CrontabTarget, SchedulerHandler};

pub const START_MARKER: &str =
    "### this content was generated by rprofile, please leave this line intact ###";
pub const END_MARKER: &str = "### end of rprofile content, please leave this line intact ###";

const CRONTAB_BIN: &str = "crontab";

/// Translate a calendar expression into a crontab schedule.
///
/// Five-field cron expressions pass through; the usual keywords map to the
/// `@` shortcuts. Returns `None` for anything else.
pub fn cron_expression(at: &str) -> Option<String> {
    let at = at.trim();
    let keyword = match at.to_ascii_lowercase().as_str() {
        "hourly" | "@hourly" => Some("@hourly"),
        "daily" | "@daily" | "midnight" | "@midnight" => Some("@daily"),
        "weekly" | "@weekly" => Some("@weekly"),
        "monthly" | "@monthly" => Some("@monthly"),
        "yearly" | "@yearly" | "annually" | "@annually" => Some("@yearly"),
        "reboot" | "@reboot" => Some("@reboot"),
        _ => None,
    };
    if let Some(keyword) = keyword {
        return Some(keyword.to_string());
    }

    let fields: Vec<&str> = at.split_whitespace().collect();
    let valid = fields.len() == 5
        && fields.iter().all(|f| {
            f.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | ',' | '-' | '/'))
        });
    valid.then(|| fields.join(" "))
}

/// One crontab line written by this backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronEntry {
    pub expression: String,
    /// User column of system crontab files.
    pub user: Option<String>,
    pub executable: String,
    pub config_file: PathBuf,
    pub origin: ScheduleOrigin,
}

impl CronEntry {
    /// Cron turns an unescaped `%` into a newline, even inside shell quotes.
    pub fn to_line(&self) -> String {
        let command = format!(
            "{} --no-ansi --config {} run-schedule {}",
            quote(&self.executable),
            quote(&self.config_file.to_string_lossy()),
            quote(&self.origin.to_string()),
        )
        .replace('%', "\\%");
        match &self.user {
            Some(user) => format!("{}\t{}\t{}", self.expression, user, command),
            None => format!("{}\t{}", self.expression, command),
        }
    }

    pub fn parse(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.split('\t').collect();
        let (expression, user, command) = match parts.as_slice() {
            [expression, command] => (*expression, None, *command),
            [expression, user, command] => (*expression, Some(user.to_string()), *command),
            _ => return None,
        };

        let args = split_args(&command.replace("\\%", "%"));
        let executable = args.first()?.clone();
        let value_after = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|i| args.get(i + 1))
        };
        let config_file = PathBuf::from(value_after("--config")?);
        let origin = ScheduleOrigin::parse(value_after("run-schedule")?)?;

        Some(Self {
            expression: expression.trim().to_string(),
            user,
            executable,
            config_file,
            origin,
        })
    }

    fn belongs_to(&self, schedule: &Schedule) -> bool {
        &self.origin == schedule.origin() && self.config_file == schedule.config_file
    }
}

/// A crontab split around the rprofile section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrontabDocument {
    head: Vec<String>,
    section: Vec<String>,
    tail: Vec<String>,
}

impl CrontabDocument {
    pub fn parse(content: &str) -> Self {
        enum Part {
            Head,
            Section,
            Tail,
        }
        let mut doc = Self::default();
        let mut part = Part::Head;
        for line in content.lines() {
            match part {
                Part::Head if line.trim() == START_MARKER => part = Part::Section,
                Part::Head => doc.head.push(line.to_string()),
                Part::Section if line.trim() == END_MARKER => part = Part::Tail,
                Part::Section => doc.section.push(line.to_string()),
                Part::Tail => doc.tail.push(line.to_string()),
            }
        }
        doc
    }

    pub fn render(&self) -> String {
        let mut lines: Vec<&str> = self.head.iter().map(String::as_str).collect();
        if !self.section.is_empty() {
            lines.push(START_MARKER);
            lines.extend(self.section.iter().map(String::as_str));
            lines.push(END_MARKER);
        }
        lines.extend(self.tail.iter().map(String::as_str));
        if lines.is_empty() {
            return String::new();
        }
        let mut content = lines.join("\n");
        content.push('\n');
        content
    }

    /// Entries of the rprofile section. Lines that do not parse are skipped.
    pub fn entries(&self) -> impl Iterator<Item = CronEntry> + '_ {
        self.section.iter().filter_map(|line| CronEntry::parse(line))
    }

    pub fn push(&mut self, entry: &CronEntry) {
        self.section.push(entry.to_line());
    }

    /// Drop the entries matching `predicate`, returning how many were removed.
    pub fn remove_where(&mut self, predicate: impl Fn(&CronEntry) -> bool) -> usize {
        let before = self.section.len();
        self.section
            .retain(|line| !CronEntry::parse(line).is_some_and(|entry| predicate(&entry)));
        before - self.section.len()
    }
}

/// Scheduler handler backed by a crontab.
///
/// Status reports are written to `out`.
pub struct CrontabHandler<W: Write> {
    target: CrontabTarget,
    executable: PathBuf,
    out: W,
}

impl<W: Write> CrontabHandler<W> {
    /// `executable` is the rprofile binary the installed jobs call back into.
    pub fn new(target: CrontabTarget, executable: impl Into<PathBuf>, out: W) -> Self {
        Self {
            target,
            executable: executable.into(),
            out,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn user(&self) -> Option<String> {
        match &self.target {
            CrontabTarget::File { user, .. } => user.clone(),
            CrontabTarget::User => None,
        }
    }

    fn entry(&self, schedule: &Schedule, expression: String) -> CronEntry {
        CronEntry {
            expression,
            user: self.user(),
            executable: self.executable.to_string_lossy().into_owned(),
            config_file: schedule.config_file.clone(),
            origin: schedule.origin().clone(),
        }
    }

    fn load(&self) -> Result<CrontabDocument> {
        let content = match &self.target {
            CrontabTarget::File { path, .. } => match fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
                Err(e) => return Err(file_error(path, e)),
            },
            CrontabTarget::User => read_user_crontab()?,
        };
        Ok(CrontabDocument::parse(&content))
    }

    fn store(&self, doc: &CrontabDocument) -> Result<()> {
        let content = doc.render();
        match &self.target {
            CrontabTarget::File { path, .. } => {
                // Write beside the target and rename so cron never reads a partial file.
                let temp = path.with_extension(format!("tmp.{}", std::process::id()));
                let written = fs::write(&temp, &content).and_then(|()| fs::rename(&temp, path));
                if let Err(e) = written {
                    let _ = fs::remove_file(&temp);
                    return Err(file_error(path, e));
                }
                debug!(path = %path.display(), "crontab file written");
                Ok(())
            }
            CrontabTarget::User => write_user_crontab(&content),
        }
    }
}

impl<W: Write> SchedulerHandler for CrontabHandler<W> {
    fn create_jobs(&mut self, jobs: &[Schedule]) -> Result<()> {
        let mut doc = self.load()?;
        let before = doc.clone();
        let mut reload = false;

        for job in jobs {
            let origin = job.origin();
            if !job.is_declared() {
                return Err(SchedulerError::RemoveOnlyJob {
                    origin: origin.clone(),
                });
            }
            single_line(origin, "name", &origin.name)?;
            single_line(origin, "command", &origin.command)?;
            single_line(origin, "configuration path", &job.config_file.to_string_lossy())?;
            single_line(origin, "executable", &self.executable.to_string_lossy())?;
            let expressions = job
                .at
                .iter()
                .map(|at| {
                    cron_expression(at).ok_or_else(|| SchedulerError::InvalidSchedule {
                        origin: origin.clone(),
                        reason: format!("unsupported calendar expression '{at}'"),
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            if expressions.is_empty() {
                return Err(SchedulerError::InvalidSchedule {
                    origin: origin.clone(),
                    reason: "no calendar expression".to_string(),
                });
            }
            if job.permission == Permission::System && self.target == CrontabTarget::User {
                warn!(%origin, "system permission needs a crontab file, installing in the user crontab");
            }
            if job.has_flag("no-start") {
                debug!(%origin, "no-start: cron jobs never start at install time");
            }
            reload |= job.has_flag("reload");

            let replaced = doc.remove_where(|entry| entry.belongs_to(job));
            for expression in expressions {
                let entry = self.entry(job, expression);
                doc.push(&entry);
            }
            info!(%origin, replaced = replaced > 0, "job scheduled");
        }

        if doc != before || reload {
            if reload {
                info!("reloading crontab");
            }
            self.store(&doc)?;
        } else {
            debug!("crontab unchanged");
        }
        Ok(())
    }

    fn remove_jobs(&mut self, jobs: &[Schedule]) -> Result<()> {
        let mut doc = self.load()?;
        let mut removed_total = 0;
        for job in jobs {
            let removed = doc.remove_where(|entry| entry.belongs_to(job));
            if removed == 0 {
                debug!(origin = %job.origin(), "job not installed");
            } else {
                info!(origin = %job.origin(), "job removed");
            }
            removed_total += removed;
        }
        if removed_total > 0 {
            self.store(&doc)?;
        }
        Ok(())
    }

    fn report_status(&mut self, profile: &str, jobs: &[Schedule]) -> Result<()> {
        let doc = self.load()?;
        writeln!(self.out, "scheduled jobs of '{profile}':")?;
        for job in jobs {
            let installed: Vec<CronEntry> =
                doc.entries().filter(|entry| entry.belongs_to(job)).collect();
            writeln!(self.out, "  {}:", job.origin())?;
            if installed.is_empty() {
                writeln!(self.out, "    not installed")?;
            }
            for entry in installed {
                writeln!(self.out, "    {}", entry.expression)?;
            }
        }
        Ok(())
    }

    fn remove_all_recorded(&mut self, config_file: &Path, profile: &str) -> Result<()> {
        let mut doc = self.load()?;
        let removed = doc.remove_where(|entry| recorded_match(entry, config_file, profile));
        if removed == 0 {
            info!(config = %config_file.display(), "no scheduled jobs found");
            return Ok(());
        }
        self.store(&doc)?;
        info!(config = %config_file.display(), count = removed, "scheduled jobs removed");
        Ok(())
    }

    fn report_all_recorded(&mut self, config_file: &Path, profile: &str) -> Result<()> {
        let doc = self.load()?;
        let mut jobs: BTreeMap<ScheduleOrigin, Vec<String>> = BTreeMap::new();
        for entry in doc
            .entries()
            .filter(|entry| recorded_match(entry, config_file, profile))
        {
            jobs.entry(entry.origin).or_default().push(entry.expression);
        }
        if jobs.is_empty() {
            writeln!(self.out, "no scheduled jobs found")?;
            return Ok(());
        }
        for (origin, expressions) in jobs {
            writeln!(self.out, "{origin}: {}", expressions.join(", "))?;
        }
        Ok(())
    }
}

fn recorded_match(entry: &CronEntry, config_file: &Path, profile: &str) -> bool {
    entry.config_file == config_file && (profile.is_empty() || entry.origin.name == profile)
}

fn read_user_crontab() -> Result<String> {
    let output = Command::new(CRONTAB_BIN).arg("-l").output()?;
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.to_ascii_lowercase().contains("no crontab") {
        return Ok(String::new());
    }
    Err(crontab_error(stderr))
}

fn write_user_crontab(content: &str) -> Result<()> {
    let mut child = Command::new(CRONTAB_BIN)
        .arg("-")
        .stdin(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;
    if let Some(stdin) = child.stdin.as_mut() {
        stdin.write_all(content.as_bytes())?;
    }
    let output = child.wait_with_output()?;
    if output.status.success() {
        debug!("user crontab written");
        return Ok(());
    }
    Err(crontab_error(
        String::from_utf8_lossy(&output.stderr).trim().to_string(),
    ))
}

fn crontab_error(stderr: String) -> SchedulerError {
    let lower = stderr.to_ascii_lowercase();
    if lower.contains("permission denied") || lower.contains("not allowed") {
        SchedulerError::PermissionDenied(stderr)
    } else {
        SchedulerError::Handler(format!("crontab: {stderr}"))
    }
}

fn file_error(path: &Path, e: io::Error) -> SchedulerError {
    if e.kind() == io::ErrorKind::PermissionDenied {
        SchedulerError::PermissionDenied(format!("{}: {e}", path.display()))
    } else {
        SchedulerError::Io(e)
    }
}

/// Cron reads one job per line and splits its fields on tabs.
fn single_line(origin: &ScheduleOrigin, what: &str, value: &str) -> Result<()> {
    if value.contains(['\n', '\r', '\t']) {
        return Err(SchedulerError::InvalidSchedule {
            origin: origin.clone(),
            reason: format!("{what} contains a line break or tab"),
        });
    }
    Ok(())
}

/// Single-quote `s` for the shell when needed.
fn quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./@:=+,".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

/// Inverse of [`quote`] over a whole command line.
fn split_args(s: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                quoted = !quoted;
                in_token = true;
            }
            '\\' if !quoted => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                in_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if in_token {
        args.push(current);
    }
    args
}
