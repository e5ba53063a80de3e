//! Integration tests exercising the full C1-C9 pipeline across module
//! boundaries (spec.md §8's scenarios), as opposed to the unit tests
//! living inside each module that exercise one component in isolation.

use ember::cache::{ArtifactKind, BuildCache, CacheKeyInputs};
use ember::emit;
use ember::index_client::{IndexClient, PackageMetadata, PackageRelease};
use ember::infer;
use ember::installer::Installer;
use ember::parser::Parser;
use ember::resolver::Resolver;
use ember::settings::Config;
use ember::string_interning::StringTable;
use ember::types::TypeContext;
use ember::version::Version;
use std::path::Path;
use std::time::Duration;

fn compile(src: &str) -> emit::EmittedModule {
    let mut table = StringTable::new();
    let module = Parser::parse_source(src, Path::new("t.ember"), &mut table).unwrap();
    let mut ctx = TypeContext::new();
    let outcome = infer::infer(&module, &mut ctx, &table);
    emit::emit_module(&module, &outcome, &ctx, &table, true).unwrap()
}

#[test]
fn fibonacci_compiles_to_a_valid_wasm_module() {
    let emitted = compile(
        "def fib(n):\n    if n <= 1:\n        return n\n    return fib(n - 1) + fib(n - 2)\n",
    );
    assert!(emitted.wasm_bytes.starts_with(b"\0asm"));
    assert!(wasmparser::validate(&emitted.wasm_bytes).is_ok());
}

#[test]
fn class_with_inherited_method_compiles() {
    let emitted = compile(
        "class Animal:\n    def speak(self):\n        return 0\n\nclass Dog(Animal):\n    def bark(self):\n        return 1\n",
    );
    assert!(!emitted.wasm_bytes.is_empty());
}

#[test]
fn async_io_function_picks_the_suspended_shape_end_to_end() {
    let emitted = compile("async def fetch():\n    await sleep(1)\n    return 1\n");
    assert_eq!(emitted.shapes[0].1, emit::CodegenShape::AsyncSuspendedStateMachine);
}

#[test]
fn identical_source_round_trips_through_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let cache = BuildCache::open(dir.path().to_path_buf()).unwrap();
    let source = b"def id(x):\n    return x\n";
    let key = ember::cache::compute_key(&CacheKeyInputs {
        source_bytes: source,
        exported_signature: "id",
        target_triple: "x86_64-unknown-linux",
        optimize: false,
    });
    assert_eq!(cache.lookup(key, ArtifactKind::Src), ember::cache::Lookup::Miss);
    let emitted = compile(std::str::from_utf8(source).unwrap());
    cache.write(key, ArtifactKind::Src, &emitted.wasm_bytes).unwrap();
    assert_eq!(cache.lookup(key, ArtifactKind::Src), ember::cache::Lookup::Hit);
}

#[test]
fn version_ordering_matches_the_published_total_order() {
    assert!(Version::parse("1.0.dev1").unwrap() < Version::parse("1.0a1").unwrap());
    assert!(Version::parse("1.0a1").unwrap() < Version::parse("1.0").unwrap());
    assert_eq!(Version::parse("1.0").unwrap(), Version::parse("1.0.0").unwrap());
}

fn seed_index(dir: &Path, name: &str, releases: &[(&str, &[&str])]) {
    let metadata = PackageMetadata {
        name: name.to_string(),
        summary: None,
        releases: releases
            .iter()
            .map(|(version, deps)| PackageRelease {
                version: version.to_string(),
                wheel_url: format!("file-not-fetched://{name}-{version}"),
                sha256: None,
                dependencies: deps.iter().map(|d| d.to_string()).collect(),
            })
            .collect(),
    };
    std::fs::create_dir_all(dir).unwrap();
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let envelope = serde_json::json!({ "fetched_at_secs": now, "body": metadata });
    std::fs::write(dir.join(format!("{name}.json")), envelope.to_string()).unwrap();
}

#[test]
fn resolver_picks_the_newest_candidate_satisfying_every_constraint() {
    let cache_dir = tempfile::tempdir().unwrap();
    seed_index(cache_dir.path(), "requests", &[("1.0", &[]), ("2.0", &[]), ("2.5", &[])]);
    let index = IndexClient::new("https://index.example", cache_dir.path().to_path_buf(), Duration::from_secs(86400));
    let resolver = Resolver::new(&index);
    let resolved = resolver.resolve(&[("requests", "<2.5")]).unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].version, Version::parse("2.0").unwrap());
}

#[test]
fn config_defaults_target_the_host_triple() {
    let config = Config::new(std::env::temp_dir());
    assert!(!config.target_triple.is_empty());
    assert!(!config.optimize);
}

#[test]
fn uninstall_is_a_no_op_after_install_removed_every_tracked_file() {
    let install_dir = tempfile::tempdir().unwrap();
    let installer = Installer::new(install_dir.path().to_path_buf());
    let manifest = ember::installer::InstallManifest { name: "demo".into(), version: "1.0".into(), files: vec![] };
    let text = serde_json::to_string_pretty(&manifest).unwrap();
    std::fs::write(install_dir.path().join("demo.manifest.json"), text).unwrap();

    installer.uninstall("demo").unwrap();
    assert!(installer.uninstall("demo").is_err());
}
