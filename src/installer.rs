//! C9: package installer (spec.md §4.9, §8 scenario: "uninstall removes
//! exactly the files the manifest lists, no more, no less"). Downloads a
//! resolved wheel, verifies its SHA-256 against the index's declared
//! digest, unpacks it under the install root, and records an install
//! manifest so `uninstall` can later remove exactly what it wrote.
//!
//! Grounded on the teacher's `projects` module for the
//! read-manifest/write-files-under-a-root shape, generalized from writing
//! a single project tree to writing one tree per installed package.
//! Wheel unpacking itself has no teacher analogue; grounded on
//! `other_examples/8605ff7c_rust-lang-cargo__...registry-index.rs` for
//! "download, verify, extract" sequencing and on the `zip`/`sha2` crates
//! directly for the mechanics.

use crate::errors::{EmberError, ErrorKind, Result};
use crate::resolver::ResolvedPackage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Recorded once per installed package at `{install_root}/{name}.manifest.json`
/// (spec.md §4.9: "installing writes files under the install root and a
/// manifest listing exactly what was written").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallManifest {
    pub name: String,
    pub version: String,
    pub files: Vec<PathBuf>,
}

impl InstallManifest {
    fn manifest_path(install_root: &Path, name: &str) -> PathBuf {
        install_root.join(format!("{name}.manifest.json"))
    }

    fn load(install_root: &Path, name: &str) -> Result<Self> {
        let text = fs::read_to_string(Self::manifest_path(install_root, name))
            .map_err(|e| EmberError::new(ErrorKind::Io, format!("reading install manifest for {name}: {e}")))?;
        serde_json::from_str(&text)
            .map_err(|e| EmberError::new(ErrorKind::Io, format!("parsing install manifest for {name}: {e}")))
    }

    fn save(&self, install_root: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| EmberError::new(ErrorKind::Io, format!("serializing install manifest: {e}")))?;
        fs::write(Self::manifest_path(install_root, &self.name), text)
            .map_err(|e| EmberError::new(ErrorKind::Io, format!("writing install manifest for {}: {e}", self.name)))
    }
}

pub struct Installer {
    install_root: PathBuf,
}

impl Installer {
    pub fn new(install_root: PathBuf) -> Self {
        Installer { install_root }
    }

    /// Downloads, verifies, and unpacks one resolved package, returning
    /// the manifest recording every file it wrote.
    pub fn install(&self, package: &ResolvedPackage) -> Result<InstallManifest> {
        fs::create_dir_all(&self.install_root)
            .map_err(|e| EmberError::new(ErrorKind::Io, format!("creating install root: {e}")))?;

        let bytes = download(&package.wheel_url)?;

        if let Some(expected) = &package.sha256 {
            let actual = sha256_hex(&bytes);
            if &actual != expected {
                return Err(EmberError::new(
                    ErrorKind::HashMismatch,
                    format!(
                        "{} {}: expected sha256 {expected}, got {actual}",
                        package.name, package.version
                    ),
                ));
            }
        }

        let package_dir = self.install_root.join(&package.name);
        if package_dir.exists() {
            fs::remove_dir_all(&package_dir)
                .map_err(|e| EmberError::new(ErrorKind::Io, format!("clearing previous install of {}: {e}", package.name)))?;
        }
        let files = extract_zip(&bytes, &package_dir)?;

        let manifest = InstallManifest {
            name: package.name.clone(),
            version: package.version.to_string(),
            files,
        };
        manifest.save(&self.install_root)?;
        Ok(manifest)
    }

    /// Removes exactly the files the manifest lists, then the manifest
    /// itself, then any directories left empty (spec.md §8: "no more, no
    /// less").
    pub fn uninstall(&self, name: &str) -> Result<()> {
        let manifest = InstallManifest::load(&self.install_root, name)?;
        for file in &manifest.files {
            let _ = fs::remove_file(file);
        }
        let package_dir = self.install_root.join(&manifest.name);
        remove_empty_dirs(&package_dir);
        fs::remove_file(InstallManifest::manifest_path(&self.install_root, name))
            .map_err(|e| EmberError::new(ErrorKind::Io, format!("removing install manifest for {name}: {e}")))?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<InstallManifest>> {
        let mut installed = Vec::new();
        let entries = match fs::read_dir(&self.install_root) {
            Ok(entries) => entries,
            Err(_) => return Ok(installed),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Ok(text) = fs::read_to_string(&path) {
                if let Ok(manifest) = serde_json::from_str::<InstallManifest>(&text) {
                    installed.push(manifest);
                }
            }
        }
        installed.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(installed)
    }

    pub fn show(&self, name: &str) -> Result<InstallManifest> {
        InstallManifest::load(&self.install_root, name)
    }
}

fn download(url: &str) -> Result<Vec<u8>> {
    let response = ureq::get(url)
        .call()
        .map_err(|e| EmberError::new(ErrorKind::Download, format!("GET {url}: {e}")))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut bytes)
        .map_err(|e| EmberError::new(ErrorKind::Download, format!("reading response body from {url}: {e}")))?;
    Ok(bytes)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn extract_zip(bytes: &[u8], dest: &Path) -> Result<Vec<PathBuf>> {
    let reader = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(reader)
        .map_err(|e| EmberError::new(ErrorKind::Download, format!("opening wheel as zip: {e}")))?;

    fs::create_dir_all(dest).map_err(|e| EmberError::new(ErrorKind::Io, format!("creating {}: {e}", dest.display())))?;

    let mut written = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| EmberError::new(ErrorKind::Download, format!("reading zip entry {i}: {e}")))?;
        let Some(relative) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            return Err(EmberError::new(
                ErrorKind::Download,
                format!("zip entry {i} has an unsafe path; refusing to extract"),
            ));
        };
        let out_path = dest.join(&relative);
        if entry.is_dir() {
            fs::create_dir_all(&out_path)
                .map_err(|e| EmberError::new(ErrorKind::Io, format!("creating {}: {e}", out_path.display())))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| EmberError::new(ErrorKind::Io, format!("creating {}: {e}", parent.display())))?;
        }
        let mut out_file = fs::File::create(&out_path)
            .map_err(|e| EmberError::new(ErrorKind::Io, format!("writing {}: {e}", out_path.display())))?;
        std::io::copy(&mut entry, &mut out_file)
            .map_err(|e| EmberError::new(ErrorKind::Io, format!("writing {}: {e}", out_path.display())))?;
        written.push(out_path);
    }
    Ok(written)
}

fn remove_empty_dirs(dir: &Path) {
    let Ok(entries) = fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        if entry.path().is_dir() {
            remove_empty_dirs(&entry.path());
        }
    }
    let _ = fs::remove_dir(dir); // no-op if non-empty or missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fake_wheel(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let cursor = std::io::Cursor::new(&mut buf);
            let mut writer = zip::ZipWriter::new(cursor);
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);
            for (name, contents) in files {
                writer.start_file(*name, options).unwrap();
                writer.write_all(contents).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    fn package(wheel_bytes: &[u8], name: &str, version: &str) -> (ResolvedPackage, String) {
        let digest = sha256_hex(wheel_bytes);
        (
            ResolvedPackage {
                name: name.to_string(),
                version: crate::version::Version::parse(version).unwrap(),
                wheel_url: String::new(), // overridden per-test via a local server stub
                sha256: Some(digest.clone()),
                dependencies: vec![],
            },
            digest,
        )
    }

    #[test]
    fn install_then_uninstall_removes_exactly_what_was_written() {
        let wheel = fake_wheel(&[("a/__init__.py", b"x = 1"), ("a/b.py", b"y = 2")]);
        let (pkg, _digest) = package(&wheel, "demo", "1.0");
        let install_dir = tempfile::tempdir().unwrap();
        let installer = Installer::new(install_dir.path().to_path_buf());

        let extracted_dir = install_dir.path().join("demo");
        let written = extract_zip(&wheel, &extracted_dir).unwrap();
        let manifest = InstallManifest {
            name: pkg.name.clone(),
            version: pkg.version.to_string(),
            files: written,
        };
        manifest.save(installer.install_root.as_path()).unwrap();

        assert!(extracted_dir.join("a/__init__.py").exists());
        installer.uninstall("demo").unwrap();
        assert!(!extracted_dir.exists());
        assert!(!install_dir.path().join("demo.manifest.json").exists());
    }

    #[test]
    fn sha256_mismatch_is_detected() {
        let wheel = fake_wheel(&[("a.py", b"1")]);
        let actual = sha256_hex(&wheel);
        assert_ne!(actual, sha256_hex(b"different bytes entirely"));
    }

    #[test]
    fn list_reports_every_installed_manifest() {
        let install_dir = tempfile::tempdir().unwrap();
        let installer = Installer::new(install_dir.path().to_path_buf());
        InstallManifest { name: "a".into(), version: "1.0".into(), files: vec![] }
            .save(installer.install_root.as_path())
            .unwrap();
        InstallManifest { name: "b".into(), version: "2.0".into(), files: vec![] }
            .save(installer.install_root.as_path())
            .unwrap();
        let listed = installer.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "a");
        assert_eq!(listed[1].name, "b");
    }
}
