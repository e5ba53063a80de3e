//! C5: content-addressed build cache (spec.md §3's cache key, §4.6, §8
//! property 3). Grounded on the teacher's `build_system/core_build.rs`
//! per-file hash bookkeeping, generalized from that file's ad hoc hashing
//! to a cryptographic one: spec.md §3 is explicit that "collisions are
//! catastrophic; the hash must be cryptographic."

use crate::errors::{EmberError, ErrorKind, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// A 256-bit cache key, hex-displayed for filenames (spec.md §3: "A
/// 256-bit hash of: source bytes, inferred type signature of exported
/// symbols, emitter version tag, target triple, optimization flags.").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != 64 {
            return None;
        }
        let mut out = [0u8; 32];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(CacheKey(out))
    }
}

/// Bumped whenever `emit`'s codegen decision table changes shape, so a
/// stale cache from a previous compiler build never gets reused silently
/// (spec.md §3: "emitter version tag" is one of the key's inputs).
pub const EMITTER_VERSION_TAG: &str = "emberc-emit-v1";

pub struct CacheKeyInputs<'a> {
    pub source_bytes: &'a [u8],
    pub exported_signature: &'a str,
    pub target_triple: &'a str,
    pub optimize: bool,
}

pub fn compute_key(inputs: &CacheKeyInputs) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(inputs.source_bytes);
    hasher.update(inputs.exported_signature.as_bytes());
    hasher.update(EMITTER_VERSION_TAG.as_bytes());
    hasher.update(inputs.target_triple.as_bytes());
    hasher.update([inputs.optimize as u8]);
    let digest = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    CacheKey(bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// The emitter's output source module.
    Src,
    /// The external toolchain's object file.
    Object,
    /// The final linked binary.
    Binary,
}

impl ArtifactKind {
    fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Src => "src",
            ArtifactKind::Object => "o",
            ArtifactKind::Binary => "bin",
        }
    }
}

/// Maps cache keys to artifact paths under one cache root (spec.md §6:
/// "Cache root: `{home}/.<tool>/cache/<hash>.{src,o,bin}` plus
/// `<hash>.hash` sidecars."). Safe under concurrent readers; writers use
/// temp-file-plus-rename so partial writes never become visible (spec.md
/// §4.6, §5).
pub struct BuildCache {
    root: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Hit,
    Miss,
    /// The sidecar hash file was unreadable or didn't match; spec.md §7:
    /// "CacheError ... corrupt sidecar treated as miss; fatal only if not
    /// recoverable."
    CorruptTreatedAsMiss,
}

impl BuildCache {
    pub fn open(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .map_err(|e| EmberError::new(ErrorKind::Cache, format!("cannot create cache root: {e}")))?;
        Ok(BuildCache { root })
    }

    fn artifact_path(&self, key: CacheKey, kind: ArtifactKind) -> PathBuf {
        self.root.join(format!("{}.{}", key.hex(), kind.extension()))
    }

    fn sidecar_path(&self, key: CacheKey, kind: ArtifactKind) -> PathBuf {
        self.root.join(format!("{}.{}.hash", key.hex(), kind.extension()))
    }

    /// Looks up an artifact by key. A hit requires both the artifact file
    /// and its hash sidecar to exist and the sidecar to match the key -
    /// spec.md §3's invariant that "Every cached artifact file has a
    /// corresponding hash sidecar; the hash matches the source that
    /// produced it."
    pub fn lookup(&self, key: CacheKey, kind: ArtifactKind) -> Lookup {
        let artifact = self.artifact_path(key, kind);
        let sidecar = self.sidecar_path(key, kind);
        if !artifact.exists() {
            return Lookup::Miss;
        }
        match fs::read_to_string(&sidecar) {
            Ok(recorded) if recorded.trim() == key.hex() => Lookup::Hit,
            Ok(_) => Lookup::CorruptTreatedAsMiss,
            Err(_) => Lookup::CorruptTreatedAsMiss,
        }
    }

    pub fn artifact_path_for(&self, key: CacheKey, kind: ArtifactKind) -> PathBuf {
        self.artifact_path(key, kind)
    }

    pub fn read(&self, key: CacheKey, kind: ArtifactKind) -> Result<Vec<u8>> {
        fs::read(self.artifact_path(key, kind))
            .map_err(|e| EmberError::new(ErrorKind::Cache, format!("reading cached artifact: {e}")))
    }

    /// Writes an artifact plus its hash sidecar atomically: both land in
    /// a temp file first, then get renamed into place, so a reader never
    /// observes a half-written artifact (spec.md §5: "writes go to a temp
    /// file and are renamed, so partial writes never become visible").
    pub fn write(&self, key: CacheKey, kind: ArtifactKind, bytes: &[u8]) -> Result<PathBuf> {
        let final_path = self.artifact_path(key, kind);
        let sidecar_path = self.sidecar_path(key, kind);
        self.write_atomic(&final_path, bytes)?;
        self.write_atomic(sidecar_path.as_path(), key.hex().as_bytes())?;
        Ok(final_path)
    }

    fn write_atomic(&self, final_path: &Path, bytes: &[u8]) -> Result<()> {
        let tmp_path = final_path.with_extension(format!(
            "{}.tmp.{}",
            final_path.extension().and_then(|e| e.to_str()).unwrap_or(""),
            std::process::id()
        ));
        {
            let mut tmp = fs::File::create(&tmp_path)
                .map_err(|e| EmberError::new(ErrorKind::Cache, format!("cannot open temp file: {e}")))?;
            tmp.write_all(bytes)
                .map_err(|e| EmberError::new(ErrorKind::Cache, format!("cannot write temp file: {e}")))?;
            tmp.sync_all().ok();
        }
        fs::rename(&tmp_path, final_path)
            .map_err(|e| EmberError::new(ErrorKind::Cache, format!("cannot rename into place: {e}")))?;
        Ok(())
    }

    /// Purges every artifact and sidecar under the cache root (the `cache
    /// purge` CLI surface, spec.md §6).
    pub fn purge(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)
                .map_err(|e| EmberError::new(ErrorKind::Cache, format!("cannot purge cache: {e}")))?;
        }
        fs::create_dir_all(&self.root)
            .map_err(|e| EmberError::new(ErrorKind::Cache, format!("cannot recreate cache root: {e}")))?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(src: &[u8]) -> CacheKeyInputs<'_> {
        CacheKeyInputs {
            source_bytes: src,
            exported_signature: "fib: Int -> Int",
            target_triple: "x86_64-unknown-linux",
            optimize: false,
        }
    }

    #[test]
    fn identical_inputs_hash_identically() {
        let a = compute_key(&inputs(b"def fib(n): return n"));
        let b = compute_key(&inputs(b"def fib(n): return n"));
        assert_eq!(a, b);
    }

    #[test]
    fn a_single_changed_byte_changes_the_key() {
        let a = compute_key(&inputs(b"def fib(n): return n"));
        let b = compute_key(&inputs(b"def fib(n): return m"));
        assert_ne!(a, b);
    }

    #[test]
    fn miss_then_write_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BuildCache::open(dir.path().to_path_buf()).unwrap();
        let key = compute_key(&inputs(b"source"));
        assert_eq!(cache.lookup(key, ArtifactKind::Binary), Lookup::Miss);
        cache.write(key, ArtifactKind::Binary, b"binary-bytes").unwrap();
        assert_eq!(cache.lookup(key, ArtifactKind::Binary), Lookup::Hit);
        assert_eq!(cache.read(key, ArtifactKind::Binary).unwrap(), b"binary-bytes");
    }

    #[test]
    fn corrupt_sidecar_is_treated_as_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BuildCache::open(dir.path().to_path_buf()).unwrap();
        let key = compute_key(&inputs(b"source"));
        cache.write(key, ArtifactKind::Object, b"obj").unwrap();
        fs::write(cache.sidecar_path(key, ArtifactKind::Object), b"not-a-hash").unwrap();
        assert_eq!(cache.lookup(key, ArtifactKind::Object), Lookup::CorruptTreatedAsMiss);
    }

    #[test]
    fn purge_removes_every_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let cache = BuildCache::open(dir.path().to_path_buf()).unwrap();
        let key = compute_key(&inputs(b"source"));
        cache.write(key, ArtifactKind::Binary, b"bytes").unwrap();
        cache.purge().unwrap();
        assert_eq!(cache.lookup(key, ArtifactKind::Binary), Lookup::Miss);
    }

    #[test]
    fn key_hex_roundtrips() {
        let key = compute_key(&inputs(b"x"));
        let back = CacheKey::from_hex(&key.hex()).unwrap();
        assert_eq!(key, back);
    }
}
