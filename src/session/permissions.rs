//! Runtime permission management.
//!
//! Permission state is read from `dumpsys package <pkg>`. The dump groups
//! permissions into indented sections (`install permissions:`, `runtime
//! permissions:`, `requested permissions:`); a section ends at the first
//! line indented no deeper than its heading.

use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

use crate::constants::android;
use crate::constants::commands::{pm, shell};
use crate::models::error::BridgeResult;
use crate::session::Session;

lazy_static! {
    static ref PERMISSION_NAME_REGEX: Regex = Regex::new(r"android\.permission\.\w+").unwrap();
    static ref GRANTED_STATE_REGEX: Regex = Regex::new(r"granted=(true|false)").unwrap();
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Extracts permission names from the sections whose headings start with
/// any of `groups` (e.g. `install` matches `install permissions:`).
///
/// With `granted_state` set, only permissions whose `granted=` flag matches
/// are returned; permissions without a flag are excluded. With `None`, every
/// permission in the matching sections is returned.
pub fn extract_matching_permissions(
    dump: &str,
    groups: &[&str],
    granted_state: Option<bool>,
) -> Vec<String> {
    let mut permissions = Vec::new();
    let lines: Vec<&str> = dump.lines().collect();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();
        let is_heading = groups
            .iter()
            .any(|g| trimmed.starts_with(&format!("{g} permissions:")));
        if !is_heading {
            i += 1;
            continue;
        }

        let heading_indent = indent_of(line);
        i += 1;
        while i < lines.len() {
            let body = lines[i];
            if !body.trim().is_empty() && indent_of(body) <= heading_indent {
                break;
            }
            if let Some(name) = PERMISSION_NAME_REGEX.find(body) {
                let granted = GRANTED_STATE_REGEX
                    .captures(body)
                    .map(|caps| &caps[1] == "true");
                let keep = match granted_state {
                    None => true,
                    Some(wanted) => granted == Some(wanted),
                };
                if keep && !permissions.contains(&name.as_str().to_string()) {
                    permissions.push(name.as_str().to_string());
                }
            }
            i += 1;
        }
    }
    permissions
}

impl Session {
    async fn package_dump(&self, pkg: &str) -> BridgeResult<String> {
        let result = self.shell_plain(&[shell::DUMPSYS, "package", pkg]).await?;
        Ok(result.stdout)
    }

    /// Permissions the package requests in its manifest.
    pub async fn get_req_permissions(&self, pkg: &str) -> BridgeResult<Vec<String>> {
        let dump = self.package_dump(pkg).await?;
        Ok(extract_matching_permissions(
            &dump,
            &["requested"],
            None,
        ))
    }

    /// Permissions currently granted to the package.
    pub async fn get_granted_permissions(&self, pkg: &str) -> BridgeResult<Vec<String>> {
        let dump = self.package_dump(pkg).await?;
        Ok(extract_matching_permissions(
            &dump,
            &["install", "runtime"],
            Some(true),
        ))
    }

    /// Requested permissions that are not granted.
    pub async fn get_denied_permissions(&self, pkg: &str) -> BridgeResult<Vec<String>> {
        let dump = self.package_dump(pkg).await?;
        let requested = extract_matching_permissions(&dump, &["requested"], None);
        let granted = extract_matching_permissions(&dump, &["install", "runtime"], Some(true));
        Ok(requested
            .into_iter()
            .filter(|p| !granted.contains(p))
            .collect())
    }

    /// Grants one runtime permission. No-op returning `false` below API 23.
    pub async fn grant_permission(&self, pkg: &str, permission: &str) -> BridgeResult<bool> {
        if self.api_level().await? < android::api::RUNTIME_PERMISSIONS {
            log::info!("Runtime permissions are unsupported on this API level");
            return Ok(false);
        }
        self.shell_plain(&[pm::PM, pm::GRANT, pkg, permission]).await?;
        Ok(true)
    }

    /// Revokes one runtime permission. No-op returning `false` below API 23.
    pub async fn revoke_permission(&self, pkg: &str, permission: &str) -> BridgeResult<bool> {
        if self.api_level().await? < android::api::RUNTIME_PERMISSIONS {
            log::info!("Runtime permissions are unsupported on this API level");
            return Ok(false);
        }
        self.shell_plain(&[pm::PM, pm::REVOKE, pkg, permission])
            .await?;
        Ok(true)
    }

    /// Grants every requested-but-denied permission, batched to stay within
    /// the device shell input limit. `apk_path` is accepted for callers
    /// that already know the manifest, but the device dump remains the
    /// source of truth.
    pub async fn grant_all_permissions(
        &self,
        pkg: &str,
        _apk_path: Option<&Path>,
    ) -> BridgeResult<bool> {
        if self.api_level().await? < android::api::RUNTIME_PERMISSIONS {
            log::info!("Runtime permissions are unsupported on this API level");
            return Ok(false);
        }
        let denied = self.get_denied_permissions(pkg).await?;
        if denied.is_empty() {
            return Ok(true);
        }
        self.shell_chunks(
            |permission| {
                vec![
                    pm::PM.to_string(),
                    pm::GRANT.to_string(),
                    pkg.to_string(),
                    permission.to_string(),
                ]
            },
            &denied,
        )
        .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "\
Packages:
  Package [io.appium.android.apis] (2e0ccfe):
    userId=10094
    requested permissions:
      android.permission.INTERNET
      android.permission.READ_CONTACTS
      android.permission.CAMERA
    install permissions:
      android.permission.INTERNET: granted=true
      android.permission.READ_CONTACTS: granted=false
    User 0: ceDataInode=1290 installed=true
      runtime permissions:
        android.permission.CAMERA: granted=true, flags=[ USER_SET ]
";

    #[test]
    fn extracts_granted_install_permissions() {
        let granted = extract_matching_permissions(DUMP, &["install"], Some(true));
        assert_eq!(granted, vec!["android.permission.INTERNET"]);
    }

    #[test]
    fn granted_subset_of_unfiltered() {
        let unfiltered = extract_matching_permissions(DUMP, &["install"], None);
        let granted = extract_matching_permissions(DUMP, &["install"], Some(true));
        assert!(granted.iter().all(|p| unfiltered.contains(p)));
        assert_eq!(unfiltered.len(), 2);
    }

    #[test]
    fn section_ends_at_equal_indent() {
        // `User 0:` sits at the same indent as `install permissions:` and
        // must terminate the section; CAMERA lives in a different group.
        let install = extract_matching_permissions(DUMP, &["install"], None);
        assert!(!install.contains(&"android.permission.CAMERA".to_string()));
    }

    #[test]
    fn runtime_and_requested_groups() {
        let runtime = extract_matching_permissions(DUMP, &["runtime"], Some(true));
        assert_eq!(runtime, vec!["android.permission.CAMERA"]);

        let requested = extract_matching_permissions(DUMP, &["requested"], None);
        assert_eq!(requested.len(), 3);
        assert!(requested
            .iter()
            .all(|p| PERMISSION_NAME_REGEX.is_match(p)));
    }
}
