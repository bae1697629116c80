//! APK signing and verification pipeline.
//!
//! The pipeline takes an APK path, zip-aligns it in place, signs it with
//! either the bundled default certificate or the session's keystore, and
//! answers whether an APK carries the expected signature. Verification
//! verdicts are cached by file content hash.

pub mod cache;

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use regex::Regex;
use ring::digest;
use tempfile::{NamedTempFile, TempDir};
use zip::{ZipArchive, ZipWriter};

use crate::constants::commands::{signing, APKSIGNER_JAR, JARSIGNER, KEYTOOL, ZIPALIGN};
use crate::constants::defaults;
use crate::models::error::{BridgeError, BridgeResult};
use crate::models::exec::{ExecOptions, ExecResult};
use crate::models::keystore::KeystoreHash;
use crate::session::Session;
use cache::SignedApkEntry;

lazy_static! {
    static ref CERT_DIGEST_REGEX: Regex =
        Regex::new(r"(?i)digest:\s+([0-9a-f]{32,128})\b").unwrap();
}

const APKS_EXTENSION: &str = "apks";
const META_INF_PREFIX: &str = "META-INF/";
const DOES_NOT_VERIFY: &str = "DOES NOT VERIFY";
const PROPERTIES_INIT_RACE: &str = "java.lang.Error: Properties init";

/// Options for [`Session::check_apk_cert`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckCertOptions {
    /// Without a session keystore, demand the default certificate instead
    /// of accepting any valid signature.
    pub require_default_cert: bool,
}

/// SHA-256 of a file's contents, lowercase hex.
pub fn file_content_hash(path: &Path) -> BridgeResult<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut context = digest::Context::new(&digest::SHA256);
    let mut chunk = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        context.update(&chunk[..n]);
    }
    Ok(hex::encode(context.finish()))
}

fn is_apks(path: &Path) -> bool {
    path.extension()
        .map(|e| e.eq_ignore_ascii_case(APKS_EXTENSION))
        .unwrap_or(false)
}

/// Rewrites the archive at `path` without its `META-INF/` tree, replacing
/// the file atomically. Returns whether anything was removed.
pub fn unsign_apk(path: &Path) -> BridgeResult<bool> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;
    let has_meta_inf = archive
        .file_names()
        .any(|name| name.starts_with(META_INF_PREFIX));
    if !has_meta_inf {
        return Ok(false);
    }

    let parent = path.parent().ok_or_else(|| {
        BridgeError::invalid_argument("path", "an APK path needs a parent directory")
    })?;
    let temp = NamedTempFile::new_in(parent)?;
    {
        let mut writer = ZipWriter::new(temp.as_file());
        for i in 0..archive.len() {
            let entry = archive.by_index_raw(i)?;
            if entry.name().starts_with(META_INF_PREFIX) {
                continue;
            }
            writer.raw_copy_file(entry)?;
        }
        writer.finish()?;
    }
    temp.persist(path).map_err(|e| BridgeError::Io(e.error))?;
    Ok(true)
}

/// Extracts the base split out of an `.apks` bundle into a scratch
/// directory. The directory is removed when the returned handle drops.
pub fn extract_apks_base(path: &Path) -> BridgeResult<(TempDir, PathBuf)> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;
    let base_name = archive
        .file_names()
        .find(|name| {
            name.ends_with("base-master.apk")
                || name.ends_with("base.apk")
                || name.ends_with("universal.apk")
        })
        .map(str::to_string)
        .ok_or_else(|| {
            BridgeError::parse_failure(path.to_string_lossy(), "a base split inside the bundle")
        })?;

    let scratch = TempDir::new()?;
    let out_path = scratch.path().join("base.apk");
    let mut entry = archive.by_name(&base_name)?;
    let mut out = File::create(&out_path)?;
    std::io::copy(&mut entry, &mut out)?;
    Ok((scratch, out_path))
}

fn collect_cert_digests(output: &str) -> Vec<String> {
    CERT_DIGEST_REGEX
        .captures_iter(output)
        .map(|caps| caps[1].to_lowercase())
        .collect()
}

fn digests_match(output: &str, expected: &[String]) -> bool {
    let found = collect_cert_digests(output);
    found.iter().any(|digest| expected.contains(digest))
}

impl Session {
    /// Zip-aligns and signs the APK in place.
    ///
    /// `.apks` bundles are pre-signed at build time; they are left alone
    /// with a warning.
    pub async fn sign(&self, path: &Path) -> BridgeResult<()> {
        if is_apks(path) {
            log::warn!(
                "'{}' is a bundle; signing applies to its splits at build time",
                path.display()
            );
            return Ok(());
        }
        self.zip_align_apk(path).await?;
        if self.keystore().use_keystore {
            self.sign_with_custom_cert(path).await
        } else {
            self.sign_with_default_cert(path).await
        }
    }

    /// Aligns the APK to the required 4-byte page boundary.
    ///
    /// Returns `false` when the file was already aligned, `true` after
    /// rewriting it. The rewrite goes through a sibling temp file and an
    /// atomic rename.
    pub async fn zip_align_apk(&self, path: &Path) -> BridgeResult<bool> {
        let metadata = std::fs::metadata(path).map_err(|_| {
            BridgeError::invalid_argument(
                "path",
                format!("'{}' does not exist or is unreadable", path.display()),
            )
        })?;
        if metadata.permissions().readonly() {
            return Err(BridgeError::invalid_argument(
                "path",
                format!("'{}' is not writable", path.display()),
            ));
        }
        let parent = path.parent().ok_or_else(|| {
            BridgeError::invalid_argument("path", "an APK path needs a parent directory")
        })?;

        let zipalign = self.tools().binary(ZIPALIGN)?;
        let path_str = path.to_string_lossy();

        let check_opts = self.exec_options().with_ignore_stderr(true);
        let check = self
            .exec_tool(
                &zipalign,
                &[
                    signing::CHECK_ARG,
                    signing::ALIGNMENT,
                    path_str.as_ref(),
                ],
                &check_opts,
            )
            .await?;
        if check.exit_code == 0 {
            log::debug!("'{}' is already aligned", path.display());
            return Ok(false);
        }

        // Creating the temp file here also proves the parent is writable.
        let temp = NamedTempFile::new_in(parent).map_err(|e| {
            BridgeError::invalid_argument(
                "path",
                format!("'{}' is not writable: {e}", parent.display()),
            )
        })?;
        let temp_str = temp.path().to_string_lossy().into_owned();
        self.exec_tool(
            &zipalign,
            &[
                signing::FORCE_ARG,
                signing::ALIGNMENT,
                path_str.as_ref(),
                &temp_str,
            ],
            &self.exec_options(),
        )
        .await?;
        temp.persist(path).map_err(|e| BridgeError::Io(e.error))?;
        Ok(true)
    }

    /// Runs `apksigner.jar` through the JVM with fixed sizing.
    async fn run_apksigner(&self, args: &[&str], opts: &ExecOptions) -> BridgeResult<ExecResult> {
        let java = self.tools().java()?;
        let jar = self.tools().build_tools_jar(APKSIGNER_JAR)?;
        let jar_str = jar.to_string_lossy();
        let mut argv = vec![
            signing::JVM_MAX_HEAP,
            signing::JVM_STACK,
            signing::JAR_ARG,
            jar_str.as_ref(),
        ];
        argv.extend_from_slice(args);
        self.exec_tool(&java, &argv, opts).await
    }

    /// Signs with the bundled test key pair.
    pub async fn sign_with_default_cert(&self, path: &Path) -> BridgeResult<()> {
        let key = self.tools().resource(defaults::DEFAULT_KEY)?;
        let cert = self.tools().resource(defaults::DEFAULT_CERT)?;
        let key_str = key.to_string_lossy();
        let cert_str = cert.to_string_lossy();
        let path_str = path.to_string_lossy();
        self.run_apksigner(
            &[
                signing::SIGN,
                signing::KEY_ARG,
                key_str.as_ref(),
                signing::CERT_ARG,
                cert_str.as_ref(),
                path_str.as_ref(),
            ],
            &self.exec_options(),
        )
        .await?;
        Ok(())
    }

    /// Signs with the session keystore, falling back to stripping the old
    /// signature and re-signing with `jarsigner` when `apksigner` rejects
    /// the keystore.
    pub async fn sign_with_custom_cert(&self, path: &Path) -> BridgeResult<()> {
        let (keystore_path, alias, store_password, key_password) = self
            .keystore()
            .credentials()
            .ok_or_else(|| {
                BridgeError::invalid_argument(
                    "keystore",
                    "custom signing requires path, alias and both passwords",
                )
            })?;
        let keystore_str = keystore_path.to_string_lossy().into_owned();
        let path_str = path.to_string_lossy();
        let ks_pass = format!("pass:{store_password}");
        let key_pass = format!("pass:{key_password}");

        let apksigner_result = self
            .run_apksigner(
                &[
                    signing::SIGN,
                    signing::KS_ARG,
                    &keystore_str,
                    signing::KS_KEY_ALIAS_ARG,
                    alias,
                    signing::KS_PASS_ARG,
                    &ks_pass,
                    signing::KEY_PASS_ARG,
                    &key_pass,
                    path_str.as_ref(),
                ],
                &self.exec_options(),
            )
            .await;
        let error = match apksigner_result {
            Ok(_) => return Ok(()),
            Err(e) => e,
        };
        log::warn!("apksigner failed ({error}); falling back to jarsigner");

        if unsign_apk(path)? {
            log::debug!("Stripped the previous signature from '{}'", path.display());
        }
        let jarsigner = self.tools().jdk_tool(JARSIGNER)?;
        self.exec_tool(
            &jarsigner,
            &[
                "-sigalg",
                "MD5withRSA",
                "-digestalg",
                "SHA1",
                "-keystore",
                &keystore_str,
                "-storepass",
                store_password,
                "-keypass",
                key_password,
                path_str.as_ref(),
                alias,
            ],
            &self.exec_options(),
        )
        .await?;
        Ok(())
    }

    /// Whether the APK at `path` is signed with the expected certificate.
    ///
    /// With a session keystore, the certificate digest must match one of
    /// the keystore's digests. Without one, any valid signature is accepted
    /// unless `opts.require_default_cert` demands the bundled certificate.
    /// Verdicts of `true` are cached by file content hash and reused while
    /// the keystore configuration matches.
    pub async fn check_apk_cert(
        &self,
        path: &Path,
        pkg: &str,
        opts: CheckCertOptions,
    ) -> BridgeResult<bool> {
        if !path.exists() {
            log::debug!("'{}' does not exist; treating as unsigned", path.display());
            return Ok(false);
        }

        // Bundles are verified through their base split.
        let scratch;
        let target: &Path = if is_apks(path) {
            let (dir, base) = extract_apks_base(path)?;
            scratch = (dir, base);
            &scratch.1
        } else {
            path
        };

        let keystore_path = if self.keystore().use_keystore {
            self.keystore().keystore_path.clone()
        } else {
            None
        };
        let expected: Vec<String> = if self.keystore().use_keystore {
            self.get_keystore_hash().await?.values().map(str::to_string).collect()
        } else {
            vec![defaults::DEFAULT_CERT_DIGEST.to_string()]
        };

        let hash = file_content_hash(target)?;
        if let Some(entry) = self
            .signed_cache()
            .lock()
            .unwrap()
            .get(&hash, keystore_path.as_ref())
        {
            log::debug!("Signature verdict for '{pkg}' served from cache");
            let matched = digests_match(&entry.apksigner_output, &expected);
            return Ok(if self.keystore().use_keystore || opts.require_default_cert {
                matched
            } else {
                true
            });
        }

        let target_str = target.to_string_lossy();
        let verify_opts = self.exec_options().with_ignore_stderr(true);
        let result = self
            .run_apksigner(
                &[signing::VERIFY, signing::PRINT_CERTS, target_str.as_ref()],
                &verify_opts,
            )
            .await?;
        if result.exit_code != 0 {
            if result.stderr.contains(DOES_NOT_VERIFY) {
                log::debug!("'{pkg}' is not signed");
                return Ok(false);
            }
            if result.stderr.contains(PROPERTIES_INIT_RACE) {
                // Known JVM initialization race, hit after verification.
                log::warn!("apksigner hit the Properties init race; assuming '{pkg}' is signed");
                return Ok(true);
            }
            return Err(BridgeError::ExecFailure {
                cmdline: format!("apksigner verify --print-certs {target_str}"),
                exit_code: result.exit_code,
                stdout: result.stdout,
                stderr: result.stderr,
            });
        }

        let matched = digests_match(&result.stdout, &expected);
        let verdict = if self.keystore().use_keystore || opts.require_default_cert {
            matched
        } else {
            true
        };
        if verdict {
            self.signed_cache().lock().unwrap().put(
                hash,
                SignedApkEntry {
                    apksigner_output: result.stdout,
                    expected_hashes: expected,
                    keystore_path,
                },
            );
        }
        Ok(verdict)
    }

    /// Certificate digests of the session keystore, via `keytool`.
    pub async fn get_keystore_hash(&self) -> BridgeResult<KeystoreHash> {
        let (keystore_path, alias, store_password, _) =
            self.keystore().credentials().ok_or_else(|| {
                BridgeError::invalid_argument(
                    "keystore",
                    "keystore hashing requires path, alias and the store password",
                )
            })?;
        let keytool = self.tools().jdk_tool(KEYTOOL)?;
        let keystore_str = keystore_path.to_string_lossy();
        let result = self
            .exec_tool(
                &keytool,
                &[
                    "-v",
                    "-list",
                    "-alias",
                    alias,
                    "-keystore",
                    keystore_str.as_ref(),
                    "-storepass",
                    store_password,
                ],
                &self.exec_options(),
            )
            .await?;
        KeystoreHash::parse(&result.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::FileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        for (name, data) in entries {
            writer
                .start_file(*name, FileOptions::default())
                .unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    fn entry_names(path: &Path) -> Vec<String> {
        let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        archive.file_names().map(str::to_string).collect()
    }

    #[test]
    fn unsign_strips_meta_inf() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("app.apk");
        write_zip(
            &apk,
            &[
                ("classes.dex", b"dex".as_slice()),
                ("META-INF/CERT.RSA", b"sig".as_slice()),
                ("META-INF/MANIFEST.MF", b"mf".as_slice()),
                ("res/layout.xml", b"xml".as_slice()),
            ],
        );

        assert!(unsign_apk(&apk).unwrap());
        let names = entry_names(&apk);
        assert!(names.iter().all(|n| !n.starts_with("META-INF/")));
        assert_eq!(names.len(), 2);
    }

    #[test]
    fn unsign_is_a_noop_without_signature() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("plain.apk");
        write_zip(&apk, &[("classes.dex", b"dex".as_slice())]);

        assert!(!unsign_apk(&apk).unwrap());
        assert_eq!(entry_names(&apk), vec!["classes.dex"]);
    }

    #[test]
    fn extracts_base_split_from_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let apks = dir.path().join("app.apks");
        write_zip(
            &apks,
            &[
                ("toc.pb", b"toc".as_slice()),
                ("splits/base-master.apk", b"base split".as_slice()),
                ("splits/base-hdpi.apk", b"hdpi".as_slice()),
            ],
        );

        let (scratch, base) = extract_apks_base(&apks).unwrap();
        assert_eq!(std::fs::read(&base).unwrap(), b"base split");
        drop(scratch);
        assert!(!base.exists(), "scratch dir is removed on drop");
    }

    #[test]
    fn content_hash_is_stable_and_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        std::fs::write(&a, b"same bytes").unwrap();
        std::fs::write(&b, b"same bytes").unwrap();

        let hash_a = file_content_hash(&a).unwrap();
        assert_eq!(hash_a, file_content_hash(&b).unwrap());
        assert_eq!(hash_a.len(), 64);

        std::fs::write(&b, b"different").unwrap();
        assert_ne!(hash_a, file_content_hash(&b).unwrap());
    }

    #[test]
    fn digest_scan_matches_expected() {
        let output = "\
Signer #1 certificate DN: CN=Android Debug
Signer #1 certificate SHA-256 digest: a40da80a59d170caa950cf15c18c454d47a39b26989d8b640ecd745ba71bf5dc
Signer #1 certificate SHA-1 digest: 93b92a1a9043021464a18aa29790cd46e83a4c5
";
        let expected = vec![defaults::DEFAULT_CERT_DIGEST.to_string()];
        assert!(digests_match(output, &expected));
        assert!(!digests_match(output, &vec!["deadbeef".repeat(8)]));
    }
}
