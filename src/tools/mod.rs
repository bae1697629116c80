//! SDK binary and resource resolution.
//!
//! Locates `adb` and the adjacent SDK tools inside the directory structure
//! rooted at `$ANDROID_HOME` / `$ANDROID_SDK_ROOT`, falling back to `$PATH`.
//! Search order within the SDK follows the conventional layout:
//!
//! 1. `platform-tools/` (adb)
//! 2. `tools/` and `tools/bin/` (legacy)
//! 3. every `build-tools/<version>/`, newest version first
//!
//! Build-tools directories are ordered by descending semantic version, with
//! a modification-time fallback when a directory name does not parse.
//! Results are memoized per resolver.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use regex::Regex;

use crate::constants::{commands, env_vars};
use crate::models::error::{BridgeError, BridgeResult};

lazy_static! {
    static ref BUILD_TOOLS_VERSION_REGEX: Regex =
        Regex::new(r"^(\d+)\.(\d+)\.(\d+)").unwrap();
    static ref PLATFORM_API_REGEX: Regex =
        Regex::new(r"(?m)^ro\.build\.version\.sdk=(\d+)\s*$").unwrap();
}

/// Appends the Windows executable suffix where required.
fn host_binary_name(name: &str) -> String {
    if cfg!(windows) {
        // `android` ships as a batch file; everything else as an exe.
        if name == commands::ANDROID {
            format!("{name}.bat")
        } else {
            format!("{name}.exe")
        }
    } else {
        name.to_string()
    }
}

fn parse_build_tools_version(dir_name: &str) -> Option<(u32, u32, u32)> {
    let caps = BUILD_TOOLS_VERSION_REGEX.captures(dir_name)?;
    Some((
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    ))
}

/// Resolves SDK binaries, JDK tools, and bundled resources.
///
/// Cloning shares the memoization caches, mirroring how a session shares
/// its resolved tool paths between sub-components.
#[derive(Clone, Default)]
pub struct SdkToolResolver {
    binaries: Arc<Mutex<HashMap<String, PathBuf>>>,
    build_tools: Arc<Mutex<Option<Vec<PathBuf>>>>,
}

impl SdkToolResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// `$ANDROID_HOME`, falling back to `$ANDROID_SDK_ROOT`.
    pub fn sdk_root(&self) -> BridgeResult<PathBuf> {
        for var in [env_vars::ANDROID_HOME, env_vars::ANDROID_SDK_ROOT] {
            if let Ok(path) = std::env::var(var) {
                if !path.is_empty() {
                    return Ok(PathBuf::from(path));
                }
            }
        }
        Err(BridgeError::env_missing(format!(
            "{} / {}",
            env_vars::ANDROID_HOME,
            env_vars::ANDROID_SDK_ROOT
        )))
    }

    /// Every `build-tools/<version>/` directory, newest first.
    pub fn build_tools_dirs(&self) -> BridgeResult<Vec<PathBuf>> {
        if let Some(dirs) = self.build_tools.lock().unwrap().clone() {
            return Ok(dirs);
        }

        let root = self.sdk_root()?.join("build-tools");
        let mut entries: Vec<(PathBuf, Option<(u32, u32, u32)>, std::time::SystemTime)> =
            Vec::new();
        if let Ok(read_dir) = std::fs::read_dir(&root) {
            for entry in read_dir.flatten() {
                let path = entry.path();
                if !path.is_dir() {
                    continue;
                }
                let version = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(parse_build_tools_version);
                let mtime = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                entries.push((path, version, mtime));
            }
        }

        // Versioned directories first (descending), then unversioned ones by
        // descending mtime.
        entries.sort_by(|a, b| match (&a.1, &b.1) {
            (Some(va), Some(vb)) => vb.cmp(va),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => b.2.cmp(&a.2),
        });

        let dirs: Vec<PathBuf> = entries.into_iter().map(|(path, _, _)| path).collect();
        *self.build_tools.lock().unwrap() = Some(dirs.clone());
        Ok(dirs)
    }

    /// Finds an SDK binary by name, memoized.
    pub fn binary(&self, name: &str) -> BridgeResult<PathBuf> {
        if let Some(path) = self.binaries.lock().unwrap().get(name) {
            return Ok(path.clone());
        }

        let host_name = host_binary_name(name);
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Ok(root) = self.sdk_root() {
            candidates.push(root.join("platform-tools").join(&host_name));
            candidates.push(root.join("tools").join(&host_name));
            candidates.push(root.join("tools").join("bin").join(&host_name));
            for dir in self.build_tools_dirs()? {
                candidates.push(dir.join(&host_name));
            }
        }

        let found = candidates
            .into_iter()
            .find(|path| path.is_file())
            .or_else(|| which::which(&host_name).ok());

        match found {
            Some(path) => {
                log::debug!("Resolved '{name}' to {}", path.display());
                self.binaries
                    .lock()
                    .unwrap()
                    .insert(name.to_string(), path.clone());
                Ok(path)
            }
            None => Err(BridgeError::tool_not_found(name)),
        }
    }

    /// Finds a jar shipped under `build-tools/<version>/lib/`.
    pub fn build_tools_jar(&self, jar: &str) -> BridgeResult<PathBuf> {
        if let Some(path) = self.binaries.lock().unwrap().get(jar) {
            return Ok(path.clone());
        }
        for dir in self.build_tools_dirs()? {
            let candidate = dir.join("lib").join(jar);
            if candidate.is_file() {
                self.binaries
                    .lock()
                    .unwrap()
                    .insert(jar.to_string(), candidate.clone());
                return Ok(candidate);
            }
        }
        Err(BridgeError::tool_not_found(jar))
    }

    /// The installed platform with the highest API level, as
    /// `(platform, platform_path)` where `platform` is e.g. `android-34`.
    pub fn android_platform_and_path(&self) -> BridgeResult<(String, PathBuf)> {
        let platforms = self.sdk_root()?.join("platforms");
        let mut best: Option<(u32, String, PathBuf)> = None;
        if let Ok(read_dir) = std::fs::read_dir(&platforms) {
            for entry in read_dir.flatten() {
                let path = entry.path();
                let build_prop = path.join("build.prop");
                let Ok(contents) = std::fs::read_to_string(&build_prop) else {
                    continue;
                };
                let Some(caps) = PLATFORM_API_REGEX.captures(&contents) else {
                    continue;
                };
                let api: u32 = match caps[1].parse() {
                    Ok(api) => api,
                    Err(_) => continue,
                };
                let name = entry.file_name().to_string_lossy().into_owned();
                if best.as_ref().map(|(b, _, _)| api > *b).unwrap_or(true) {
                    best = Some((api, name, path));
                }
            }
        }
        best.map(|(_, platform, path)| (platform, path))
            .ok_or_else(|| {
                BridgeError::tool_not_found("platforms/<target>/build.prop")
            })
    }

    /// `$JAVA_HOME`, required.
    pub fn java_home(&self) -> BridgeResult<PathBuf> {
        match std::env::var(env_vars::JAVA_HOME) {
            Ok(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => Err(BridgeError::env_missing(env_vars::JAVA_HOME)),
        }
    }

    /// `$JAVA_HOME/bin/java[.exe]`.
    pub fn java(&self) -> BridgeResult<PathBuf> {
        let java = self
            .java_home()?
            .join("bin")
            .join(host_binary_name(commands::JAVA));
        if java.is_file() {
            Ok(java)
        } else {
            Err(BridgeError::tool_not_found(commands::JAVA))
        }
    }

    /// A JDK companion tool (`keytool`, `jarsigner`) next to `java`.
    pub fn jdk_tool(&self, name: &str) -> BridgeResult<PathBuf> {
        let tool = self.java_home()?.join("bin").join(host_binary_name(name));
        if tool.is_file() {
            Ok(tool)
        } else {
            which::which(host_binary_name(name))
                .map_err(|_| BridgeError::tool_not_found(name))
        }
    }

    /// Root of the bundled resource tree (signing keys, jars).
    pub fn resource_root(&self) -> BridgeResult<PathBuf> {
        if let Ok(path) = std::env::var(env_vars::DROIDBRIDGE_RESOURCES) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        dirs::data_dir()
            .map(|d| d.join("droidbridge").join("resources"))
            .ok_or_else(|| BridgeError::env_missing(env_vars::DROIDBRIDGE_RESOURCES))
    }

    /// Resolves a relative path inside the resource tree.
    pub fn resource(&self, rel: &str) -> BridgeResult<PathBuf> {
        let path = self.resource_root()?.join(rel);
        if path.is_file() {
            Ok(path)
        } else {
            Err(BridgeError::tool_not_found(rel))
        }
    }

    /// Drops memoized paths; the next lookup searches again.
    pub fn invalidate(&self) {
        self.binaries.lock().unwrap().clear();
        *self.build_tools.lock().unwrap() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn build_tools_sorted_by_descending_version() {
        let sdk = tempfile::tempdir().unwrap();
        for version in ["30.0.3", "34.0.0", "33.0.1", "snapshot"] {
            fs::create_dir_all(sdk.path().join("build-tools").join(version)).unwrap();
        }
        std::env::set_var(env_vars::ANDROID_HOME, sdk.path());

        let resolver = SdkToolResolver::new();
        let dirs = resolver.build_tools_dirs().unwrap();
        let names: Vec<_> = dirs
            .iter()
            .map(|d| d.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(&names[..3], &["34.0.0", "33.0.1", "30.0.3"]);
        assert_eq!(names[3], "snapshot");

        std::env::remove_var(env_vars::ANDROID_HOME);
    }

    #[test]
    fn version_parse() {
        assert_eq!(parse_build_tools_version("34.0.0"), Some((34, 0, 0)));
        assert_eq!(parse_build_tools_version("33.0.1-rc2"), Some((33, 0, 1)));
        assert_eq!(parse_build_tools_version("latest"), None);
    }
}
