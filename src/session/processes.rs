//! Device process management.

use lazy_static::lazy_static;
use regex::Regex;

use crate::constants::android;
use crate::constants::commands::{am, shell};
use crate::models::error::{BridgeError, BridgeResult};
use crate::session::Session;

lazy_static! {
    static ref VALID_PKG_REGEX: Regex = Regex::new(r"^[\w.]+$").unwrap();
    // Pre-toybox `ps`: USER PID PPID VSIZE RSS WCHAN PC S NAME
    static ref LEGACY_PS_REGEX: Regex = Regex::new(r"^\S+\s+(\d+)\s+\d+.*\s(\S+)$").unwrap();
}

/// True when `name` belongs to `pkg`: either the package itself or one of
/// its `pkg:service` sub-processes.
fn name_matches_package(name: &str, pkg: &str) -> bool {
    name == pkg || name.strip_prefix(pkg).map(|rest| rest.starts_with(':')).unwrap_or(false)
}

/// Column-wise parse of toybox `ps` output (API >= 24): the header names
/// the columns, the process name is the final column.
fn parse_toybox_ps(output: &str, pkg: &str) -> Vec<u32> {
    let mut lines = output.lines();
    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let columns: Vec<&str> = header.split_whitespace().collect();
    let Some(pid_index) = columns.iter().position(|c| *c == "PID") else {
        return Vec::new();
    };

    let mut pids = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let (Some(pid), Some(name)) = (fields.get(pid_index), fields.last()) else {
            continue;
        };
        if name_matches_package(name, pkg) {
            if let Ok(pid) = pid.parse() {
                pids.push(pid);
            }
        }
    }
    pids
}

/// Regex parse of the older `ps` output.
fn parse_legacy_ps(output: &str, pkg: &str) -> Vec<u32> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let caps = LEGACY_PS_REGEX.captures(line.trim())?;
            if !name_matches_package(&caps[2], pkg) {
                return None;
            }
            caps[1].parse().ok()
        })
        .collect()
}

impl Session {
    /// All pids whose process name belongs to `pkg`.
    pub async fn get_pids_by_name(&self, pkg: &str) -> BridgeResult<Vec<u32>> {
        if !VALID_PKG_REGEX.is_match(pkg) {
            return Err(BridgeError::invalid_argument(
                "pkg",
                format!("'{pkg}' is not a valid process name"),
            ));
        }
        let api = self.api_level().await?;
        if api >= android::api::TOYBOX_PS {
            let args: &[&str] = if api >= android::api::MODERN_SU {
                &[shell::PS, "-A"]
            } else {
                &[shell::PS]
            };
            let result = self.shell_plain(args).await?;
            return Ok(parse_toybox_ps(&result.stdout, pkg));
        }
        let result = self.shell_plain(&[shell::PS]).await?;
        Ok(parse_legacy_ps(&result.stdout, pkg))
    }

    /// True iff any running process is associated with `pkg`.
    pub async fn process_exists(&self, pkg: &str) -> BridgeResult<bool> {
        Ok(!self.get_pids_by_name(pkg).await?.is_empty())
    }

    /// Stops every process belonging to `pkg`: `am force-stop` first, then
    /// an explicit `kill` for stragglers.
    pub async fn kill_processes_by_name(&self, pkg: &str) -> BridgeResult<()> {
        self.shell_plain(&[am::AM, am::FORCE_STOP, pkg]).await?;
        let leftover = self.get_pids_by_name(pkg).await?;
        if leftover.is_empty() {
            return Ok(());
        }
        log::debug!("{} process(es) of '{pkg}' survived force-stop", leftover.len());
        let pid_strings: Vec<String> = leftover.iter().map(u32::to_string).collect();
        let mut args = vec![shell::KILL];
        args.extend(pid_strings.iter().map(String::as_str));
        self.shell(&args, &self.exec_options()).await?;
        Ok(())
    }

    /// Kills one process, escalating to `su` when the plain kill is denied.
    pub async fn kill_process_by_pid(&self, pid: u32) -> BridgeResult<()> {
        let pid_string = pid.to_string();
        match self.shell_plain(&[shell::KILL, &pid_string]).await {
            Ok(_) => Ok(()),
            Err(BridgeError::ExecFailure { .. }) => {
                let opts = self.exec_options().with_privileged(true);
                self.shell(&[shell::KILL, &pid_string], &opts).await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOYBOX_PS: &str = "\
USER           PID  PPID     VSZ    RSS WCHAN            ADDR S NAME
root             1     0 2277584   4332 0                   0 S init
u0_a123       2158  1249 5890840  38716 0                   0 S io.appium.settings
u0_a123       2201  1249 5890840  38716 0                   0 S io.appium.settings:remote
u0_a124       2300  1249 4890840  31716 0                   0 S io.appium.settings2
";

    const LEGACY_PS: &str = "\
USER      PID   PPID  VSIZE  RSS   WCHAN      PC         NAME
root      1     0     8904   788   SyS_epoll_ 00f6df4bd8 S /init
u0_a92    2158  1249  890840 38716 SyS_epoll_ 00f6df4bd8 S io.appium.settings
u0_a93    2400  1249  890840 38716 SyS_epoll_ 00f6df4bd8 S com.android.phone
";

    #[test]
    fn toybox_parse_matches_package_and_subprocesses() {
        assert_eq!(
            parse_toybox_ps(TOYBOX_PS, "io.appium.settings"),
            vec![2158, 2201]
        );
    }

    #[test]
    fn toybox_parse_does_not_match_prefix_packages() {
        assert_eq!(parse_toybox_ps(TOYBOX_PS, "io.appium"), Vec::<u32>::new());
    }

    #[test]
    fn legacy_parse_matches_exact_name() {
        assert_eq!(parse_legacy_ps(LEGACY_PS, "io.appium.settings"), vec![2158]);
        assert_eq!(parse_legacy_ps(LEGACY_PS, "com.android.phone"), vec![2400]);
    }
}
