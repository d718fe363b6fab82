use std::path::PathBuf;
use std::process::Command;
use std::sync::OnceLock;

static GLOBAL_RECORD_BINARY: OnceLock<PathBuf> = OnceLock::new();

/// Builds the `global-record` fixture once per test run and returns
/// the path to its debug binary. The debug profile matters: the smoke
/// tests read the fixture's DWARF.
pub fn global_record_fixture_path() -> PathBuf {
    GLOBAL_RECORD_BINARY
        .get_or_init(|| {
            let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
            let manifest = root.join("tests/fixtures/Cargo.toml");
            let target_dir = root.join("target/fixtures");

            let status = Command::new("cargo")
                .args([
                    "build",
                    "--manifest-path",
                    manifest
                        .to_str()
                        .expect("fixture manifest path should be valid UTF-8"),
                    "--bin",
                    "global-record",
                ])
                .env("CARGO_TARGET_DIR", &target_dir)
                .status()
                .expect("failed to run cargo to build fixture");

            assert!(
                status.success(),
                "building global-record fixture failed: {status:?}"
            );

            target_dir.join("debug/global-record")
        })
        .clone()
}
