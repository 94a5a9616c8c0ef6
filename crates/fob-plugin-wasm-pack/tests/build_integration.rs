//! End-to-end builds against a fake wasm-pack
//!
//! The fake compiler is a shell script that writes a wasm-bindgen style
//! `index.js` into the requested `--out-dir`, so these tests are unix only.

#![cfg(unix)]

use fob_plugin_wasm_pack::{
    FobWasmPackPlugin, HostConfig, WasmPackBuilder, WasmPackError, WasmPackOptions,
};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use tempfile::TempDir;

const FAKE_WASM_PACK: &str = r#"#!/bin/sh
STATE="__STATE__"
echo "$@" >> "$STATE/args"
OUT=""
while [ "$#" -gt 0 ]; do
  case "$1" in
    --out-dir) shift; OUT="$1" ;;
  esac
  shift
done
if [ -e "$STATE/running" ]; then echo overlap >> "$STATE/overlaps"; fi
touch "$STATE/running"
sleep 0.1
mkdir -p "$OUT"
cat > "$OUT/index.js" <<'JS'
let wasm;
async function __wbg_init(input) {
    if (typeof input === 'undefined') {
        input = new URL('index_bg.wasm', import.meta.url);
    }
    return input;
}
export default init;
JS
printf 'wasm' > "$OUT/index_bg.wasm"
echo "$OUT" >> "$STATE/builds"
rm "$STATE/running"
"#;

const FAILING_WASM_PACK: &str = r#"#!/bin/sh
echo "error: could not compile" >&2
exit 1
"#;

struct Fixture {
    dir: TempDir,
    compiler: PathBuf,
}

impl Fixture {
    fn new(script: &str) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let state = dir.path().join("state");
        fs::create_dir_all(&state).expect("state dir");

        let compiler = dir.path().join("fake-wasm-pack");
        fs::write(
            &compiler,
            script.replace("__STATE__", &state.to_string_lossy()),
        )
        .expect("write compiler");
        fs::set_permissions(&compiler, fs::Permissions::from_mode(0o755)).expect("chmod");

        Self { dir, compiler }
    }

    /// Create `crates/<name>/Cargo.toml` and return (manifest path, source)
    fn add_crate(&self, name: &str) -> (PathBuf, String) {
        let crate_dir = self.dir.path().join("crates").join(name);
        fs::create_dir_all(crate_dir.join("src")).expect("crate dir");
        fs::write(crate_dir.join("src/lib.rs"), "").expect("lib.rs");

        let source = format!(
            "[package]\nname = \"{}\"\nversion = \"0.1.0\"\n\n[lib]\ncrate-type = [\"cdylib\"]\n",
            name
        );
        let manifest = crate_dir.join("Cargo.toml");
        fs::write(&manifest, &source).expect("manifest");
        (manifest, source)
    }

    /// Options rooted at the fixture, so `target/` lands in the tempdir
    fn options(&self) -> WasmPackOptions {
        WasmPackOptions::default()
            .with_root_dir(self.dir.path())
            .with_wasm_pack_path(&self.compiler)
    }

    fn out_dir(&self, name: &str) -> PathBuf {
        self.dir
            .path()
            .join("target")
            .join("wasm-pack")
            .join(name)
    }

    fn state_file(&self, name: &str) -> PathBuf {
        self.dir.path().join("state").join(name)
    }

    fn read_state(&self, name: &str) -> String {
        fs::read_to_string(self.state_file(name)).unwrap_or_default()
    }
}

#[tokio::test]
async fn test_client_build_imports_wasm_as_url() {
    let fixture = Fixture::new(FAKE_WASM_PACK);
    let (manifest, source) = fixture.add_crate("foo");

    let output = WasmPackBuilder::new()
        .build(&source, &manifest, &fixture.options(), false)
        .await
        .expect("build");

    let out = fixture.out_dir("foo");
    let wasm = out.join("index_bg.wasm");
    assert!(output.code.starts_with(&format!(
        "import wasmUrl from \"{}?url\";",
        wasm.display()
    )));
    assert!(output
        .code
        .contains("input = new URL(wasmUrl, window.location.origin);"));
    assert!(!output.code.contains("import.meta.url"));
    assert!(out.join("index.js").exists());
}

#[tokio::test]
async fn test_server_build_reads_wasm_from_disk() {
    let fixture = Fixture::new(FAKE_WASM_PACK);
    let (manifest, source) = fixture.add_crate("foo");

    let output = WasmPackBuilder::new()
        .build(&source, &manifest, &fixture.options(), true)
        .await
        .expect("build");

    let wasm = fixture.out_dir("foo").join("index_bg.wasm");
    assert!(output
        .code
        .contains(&format!("fs.readFileSync(\"{}\")", wasm.display())));
    assert!(output
        .code
        .contains("export default () => init(WebAssembly.compile(bytes));"));
    assert!(output.code.contains("input = input;"));
    assert!(!output.code.contains("export default init;"));
    assert!(!output.code.contains("import.meta.url"));
}

#[tokio::test]
async fn test_passes_arguments_in_order() {
    let fixture = Fixture::new(FAKE_WASM_PACK);
    let (manifest, source) = fixture.add_crate("foo");
    let options = fixture
        .options()
        .with_debug(false)
        .with_cargo_arg("--features")
        .with_cargo_arg("simd");

    WasmPackBuilder::new()
        .build(&source, &manifest, &options, false)
        .await
        .expect("build");

    let out = fixture.out_dir("foo");
    assert_eq!(
        fixture.read_state("args").trim(),
        format!(
            "--log-level error build --out-dir {} --out-name index --target web --release -- --features simd",
            out.display()
        )
    );
}

#[tokio::test]
async fn test_clears_stale_output_before_building() {
    let fixture = Fixture::new(FAKE_WASM_PACK);
    let (manifest, source) = fixture.add_crate("foo");
    let out = fixture.out_dir("foo");
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("stale.js"), "old").unwrap();

    WasmPackBuilder::new()
        .build(&source, &manifest, &fixture.options(), false)
        .await
        .expect("build");

    assert!(!out.join("stale.js").exists());
    assert!(out.join("index.js").exists());
}

#[tokio::test]
async fn test_output_lands_under_root_not_crate() {
    let fixture = Fixture::new(FAKE_WASM_PACK);
    let (manifest, source) = fixture.add_crate("foo");

    WasmPackBuilder::new()
        .build(&source, &manifest, &fixture.options(), false)
        .await
        .expect("build");

    let crate_dir = manifest.parent().expect("crate dir");
    assert!(fixture.out_dir("foo").join("index.js").exists());
    assert!(!crate_dir.join("target").exists());
}

#[tokio::test]
async fn test_respects_target_dir_override() {
    let fixture = Fixture::new(FAKE_WASM_PACK);
    let (manifest, source) = fixture.add_crate("foo");
    let shared_target = fixture.dir.path().join("shared-target");
    let options = fixture.options().with_target_dir(&shared_target);

    let output = WasmPackBuilder::new()
        .build(&source, &manifest, &options, true)
        .await
        .expect("build");

    let wasm = shared_target.join("wasm-pack/foo/index_bg.wasm");
    assert!(output.code.contains(&wasm.display().to_string()));
    assert!(shared_target.join("wasm-pack/foo/index.js").exists());
}

#[tokio::test]
async fn test_compiler_failure_is_generic_unless_verbose() {
    let fixture = Fixture::new(FAILING_WASM_PACK);
    let (manifest, source) = fixture.add_crate("foo");

    let err = WasmPackBuilder::new()
        .build(&source, &manifest, &fixture.options(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, WasmPackError::CompilationFailed));
    assert_eq!(err.to_string(), "Rust compilation failed");

    let err = WasmPackBuilder::new()
        .build(
            &source,
            &manifest,
            &fixture.options().with_verbose(true),
            false,
        )
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), Some(1));
    assert!(err.to_string().contains("failed with error code: 1"));
}

#[tokio::test]
async fn test_missing_loader_is_filesystem_error() {
    // Exits 0 without producing anything
    let fixture = Fixture::new("#!/bin/sh\nexit 0\n");
    let (manifest, source) = fixture.add_crate("foo");

    let err = WasmPackBuilder::new()
        .build(&source, &manifest, &fixture.options(), false)
        .await
        .unwrap_err();
    match err {
        WasmPackError::Filesystem { path, .. } => {
            assert!(path.ends_with("wasm-pack/foo/index.js"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transforms_never_overlap() {
    let fixture = Fixture::new(FAKE_WASM_PACK);
    let plugin = FobWasmPackPlugin::new(fixture.options());
    plugin.config_resolved(HostConfig::new("development"));
    plugin.on_build_start(false);

    let crates: Vec<_> = ["a", "b", "c", "d"]
        .iter()
        .map(|name| fixture.add_crate(name))
        .collect();

    let handles: Vec<_> = crates
        .into_iter()
        .map(|(manifest, source)| {
            let plugin = plugin.clone();
            tokio::spawn(async move {
                let id = manifest.to_string_lossy().into_owned();
                plugin.transform_module(&source, &id, false).await
            })
        })
        .collect();

    for handle in handles {
        let output = handle.await.unwrap().expect("transform");
        assert!(output.expect("manifest is transformed").code.contains("wasmUrl"));
    }

    assert_eq!(fixture.read_state("overlaps"), "");
    assert_eq!(fixture.read_state("builds").lines().count(), 4);
    assert!(!plugin.builder().lock().is_locked());
}

#[tokio::test]
async fn test_production_mode_builds_release() {
    let fixture = Fixture::new(FAKE_WASM_PACK);
    let (manifest, source) = fixture.add_crate("foo");
    let plugin = FobWasmPackPlugin::new(fixture.options());
    plugin.config_resolved(HostConfig::new("production"));

    let id = manifest.to_string_lossy().into_owned();
    plugin
        .transform_module(&source, &id, false)
        .await
        .expect("transform")
        .expect("manifest is transformed");

    let args = fixture.read_state("args");
    assert!(args.contains("--release"));
    assert!(!args.contains("--dev"));
}
