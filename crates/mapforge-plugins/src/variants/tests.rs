//! Unit tests for the concrete plugin variants.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};
use serde_json::json;
use tempfile::TempDir;

use super::*;
use crate::outcome::OutcomeKind;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, contents).expect("write fixture file");
        path
    }

    #[cfg(unix)]
    fn write_executable(&self, name: &str, script: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = self.write(name, script);
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod fixture");
        path
    }

    fn plugin(&self, table: &str) -> Box<dyn MappingPlugin> {
        let source = format!(
            "[[plugin]]\ncontract = \"{}\"\nversion = \"1.0.0\"\n{table}\n",
            crate::manifest::CONTRACT
        );
        let archive_path = self.path("plugins.toml");
        let archive = PluginArchive::parse(&archive_path, &source).expect("archive parses");
        let manifest = archive.manifests().first().expect("one manifest");
        let context = LoadContext::new(self.path("work"));
        instantiate(manifest, &archive, &context)
    }
}

#[fixture]
fn workspace() -> Workspace {
    Workspace {
        dir: TempDir::new().expect("temp dir"),
    }
}

// ---------------------------------------------------------------------------
// Pass-through
// ---------------------------------------------------------------------------

#[rstest]
fn pass_through_output_is_byte_identical(workspace: Workspace) {
    let bytes: Vec<u8> = (0_u8..=255).chain(b"\r\n\0tail".iter().copied()).collect();
    let input = workspace.write("input.bin", &bytes);
    let output = workspace.path("output.bin");
    let mapping = workspace.write("mapping.json", "{}");
    let plugin = workspace.plugin("name = \"Copy\"\nkind = \"pass_through\"");

    let outcome = plugin.map_file(&mapping, &input, &output);

    assert!(outcome.is_success(), "unexpected outcome: {outcome}");
    assert_eq!(fs::read(&output).expect("read output"), bytes);
    assert_eq!(plugin.id(), "Copy_1.0.0");
}

#[rstest]
fn pass_through_reports_missing_input(workspace: Workspace) {
    let plugin = workspace.plugin("name = \"Copy\"\nkind = \"pass_through\"");
    let outcome = plugin.map_file(
        &workspace.path("mapping.json"),
        &workspace.path("absent.bin"),
        &workspace.path("output.bin"),
    );
    assert_eq!(outcome.kind(), OutcomeKind::ExecutionError);
    assert!(!workspace.path("output.bin").exists());
}

// ---------------------------------------------------------------------------
// JSON query
// ---------------------------------------------------------------------------

#[rstest]
fn json_query_applies_shift_default_and_remove(workspace: Workspace) {
    let mapping = workspace.write(
        "mapping.json",
        json!({
            "shift": {
                "/title": "/metadata/name",
                "/size/width": "/image/w",
                "/size/height": "/image/h",
                "/missing": "/not/there"
            },
            "default": { "/license": "CC-BY-4.0", "/title": "ignored" },
            "remove": ["/size/height"]
        })
        .to_string(),
    );
    let input = workspace.write(
        "input.json",
        json!({ "metadata": { "name": "Sample" }, "image": { "w": 640, "h": 480 } }).to_string(),
    );
    let output = workspace.path("output.json");
    let plugin = workspace.plugin("name = \"Jolt\"\nkind = \"json_query\"");

    let outcome = plugin.map_file(&mapping, &input, &output);

    assert!(outcome.is_success(), "unexpected outcome: {outcome}");
    let produced: serde_json::Value =
        serde_json::from_slice(&fs::read(&output).expect("read output")).expect("json output");
    assert_eq!(
        produced,
        json!({ "title": "Sample", "size": { "width": 640 }, "license": "CC-BY-4.0" })
    );
}

#[rstest]
#[case::malformed_mapping("{not json", "{}")]
#[case::unknown_operation(r#"{"explode": {}}"#, "{}")]
#[case::malformed_input(r#"{"shift": {}}"#, "<xml/>")]
#[case::relative_pointer(r#"{"default": {"title": 1}}"#, "{}")]
fn json_query_rejects_bad_documents(
    workspace: Workspace,
    #[case] mapping: &str,
    #[case] input: &str,
) {
    let mapping_path = workspace.write("mapping.json", mapping);
    let input_path = workspace.write("input.json", input);
    let plugin = workspace.plugin("name = \"Jolt\"\nkind = \"json_query\"");

    let outcome = plugin.map_file(&mapping_path, &input_path, &workspace.path("out.json"));

    assert_eq!(outcome.kind(), OutcomeKind::InvalidInput, "{outcome}");
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[rstest]
fn command_writes_stdout_into_the_output_file(workspace: Workspace) {
    let input = workspace.write("input.txt", "alpha\nbeta\n");
    let output = workspace.path("identify.txt");
    let mut plugin = workspace.plugin(
        r#"name = "Identify"
        kind = "command"
        executable = "/bin/sh"
        args = ["-c", "echo \"file: $0\"; cat \"$0\"", "{input}"]
        stdout_to_output = true"#,
    );
    plugin.setup().expect("/bin/sh exists");

    let outcome = plugin.map_file(&workspace.path("unused.json"), &input, &output);

    assert!(outcome.is_success(), "unexpected outcome: {outcome}");
    assert_eq!(
        fs::read_to_string(&output).expect("read output"),
        format!("file: {}\nalpha\nbeta\n", input.display())
    );
}

#[cfg(unix)]
#[rstest]
#[case::failing("printf partial; exit 3", None, OutcomeKind::ExecutionError)]
#[case::timed_out("printf partial; sleep 5", Some(1), OutcomeKind::Timeout)]
fn failed_command_leaves_previous_output_untouched(
    workspace: Workspace,
    #[case] script: &str,
    #[case] timeout_secs: Option<u64>,
    #[case] expected: OutcomeKind,
) {
    let output = workspace.write("identify.txt", "previous result\n");
    let timeout = timeout_secs.map_or_else(String::new, |secs| format!("timeout_secs = {secs}"));
    let plugin = workspace.plugin(&format!(
        "name = \"Identify\"\nkind = \"command\"\nexecutable = \"/bin/sh\"\nargs = [\"-c\", \"{script}\"]\nstdout_to_output = true\n{timeout}"
    ));

    let outcome = plugin.map_file(&workspace.path("m"), &workspace.path("i"), &output);

    assert_eq!(outcome.kind(), expected, "{outcome}");
    assert_eq!(
        fs::read_to_string(&output).expect("read output"),
        "previous result\n"
    );
    let staged: Vec<_> = fs::read_dir(workspace.dir.path())
        .expect("list workspace")
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".partial"))
        .collect();
    assert!(staged.is_empty(), "staged files left behind: {staged:?}");
}

#[cfg(unix)]
#[rstest]
fn failed_command_does_not_create_the_output_file(workspace: Workspace) {
    let output = workspace.path("identify.txt");
    let plugin = workspace.plugin(
        r#"name = "Identify"
        kind = "command"
        executable = "/bin/sh"
        args = ["-c", "echo half; exit 1"]
        stdout_to_output = true"#,
    );

    let outcome = plugin.map_file(&workspace.path("m"), &workspace.path("i"), &output);

    assert_eq!(outcome.kind(), OutcomeKind::ExecutionError);
    assert!(!output.exists());
}

#[cfg(unix)]
#[rstest]
fn command_output_keeps_the_bytes_the_tool_printed(workspace: Workspace) {
    let output = workspace.path("raw.bin");
    let plugin = workspace.plugin(
        r#"name = "Raw"
        kind = "command"
        executable = "/bin/sh"
        args = ["-c", "printf 'a\\r\\n\\377b'"]
        stdout_to_output = true"#,
    );

    let outcome = plugin.map_file(&workspace.path("m"), &workspace.path("i"), &output);

    assert!(outcome.is_success(), "unexpected outcome: {outcome}");
    assert_eq!(fs::read(&output).expect("read output"), b"a\r\n\xffb");
}

#[rstest]
fn command_setup_fails_without_the_executable(workspace: Workspace) {
    let mut plugin = workspace.plugin(
        "name = \"Identify\"\nkind = \"command\"\nexecutable = \"/nonexistent/identify\"",
    );
    let error = plugin.setup().expect_err("missing executable");
    assert!(
        matches!(&error, crate::PluginError::Setup { name, .. } if name == "Identify_1.0.0"),
        "got {error:?}"
    );
}

#[cfg(unix)]
#[rstest]
fn command_timeout_comes_from_the_manifest(workspace: Workspace) {
    let plugin = workspace.plugin(
        r#"name = "Slow"
        kind = "command"
        executable = "/bin/sh"
        args = ["-c", "sleep 5"]
        timeout_secs = 1"#,
    );
    let started = Instant::now();
    let outcome = plugin.map_file(
        &workspace.path("m"),
        &workspace.path("i"),
        &workspace.path("o"),
    );
    assert_eq!(outcome.kind(), OutcomeKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(3));
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[rstest]
fn protocol_plugin_exchanges_request_and_response(workspace: Workspace) {
    let record = workspace.path("request.json");
    let executable = workspace.write_executable(
        "plugin.sh",
        &format!(
            "#!/bin/sh\nread request\necho 'working...'\necho \"$request\" > '{}'\necho '{{\"outcome\":\"success\",\"detail\":\"mapped\"}}'\n",
            record.display()
        ),
    );
    let mut plugin = workspace.plugin(&format!(
        "name = \"External\"\nkind = \"protocol\"\nexecutable = \"{}\"",
        executable.display()
    ));
    plugin.setup().expect("executable exists");

    let outcome = plugin.map_file(Path::new("/m.json"), Path::new("/in.xml"), Path::new("/out.json"));

    assert!(outcome.is_success(), "unexpected outcome: {outcome}");
    assert_eq!(outcome.detail(), Some("mapped"));
    let request: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&record).expect("request record"))
            .expect("request json");
    assert_eq!(
        request,
        json!({ "mapping_file": "/m.json", "input_file": "/in.xml", "output_file": "/out.json" })
    );
}

#[cfg(unix)]
#[rstest]
#[case::garbage("echo 'all done'", OutcomeKind::ExecutionError, "invalid plugin response")]
#[case::silent("true", OutcomeKind::ExecutionError, "no response")]
#[case::failing("echo broken >&2; exit 4", OutcomeKind::ExecutionError, "broken")]
#[case::relayed(
    "echo '{\"outcome\":\"not_found\",\"detail\":\"schema\"}'",
    OutcomeKind::NotFound,
    "schema"
)]
fn protocol_plugin_classifies_responses(
    workspace: Workspace,
    #[case] body: &str,
    #[case] kind: OutcomeKind,
    #[case] detail_fragment: &str,
) {
    let executable =
        workspace.write_executable("plugin.sh", &format!("#!/bin/sh\nread request\n{body}\n"));
    let plugin = workspace.plugin(&format!(
        "name = \"External\"\nkind = \"protocol\"\nexecutable = \"{}\"",
        executable.display()
    ));

    let outcome = plugin.map_file(Path::new("/m"), Path::new("/i"), Path::new("/o"));

    assert_eq!(outcome.kind(), kind, "{outcome}");
    let detail = outcome.detail().expect("detail");
    assert!(detail.contains(detail_fragment), "detail: {detail}");
}

// ---------------------------------------------------------------------------
// Managed
// ---------------------------------------------------------------------------

#[rstest]
fn managed_plugin_refuses_work_before_setup(workspace: Workspace) {
    let plugin = workspace.plugin(
        r#"name = "Gemma"
        kind = "managed"
        repository = "https://example.org/gemma.git"
        script = "mapping_single.py""#,
    );
    let outcome = plugin.map_file(Path::new("/m"), Path::new("/i"), Path::new("/o"));
    assert_eq!(outcome.kind(), OutcomeKind::ExecutionError);
    assert_eq!(outcome.detail(), Some("plugin not initialised"));
}

#[rstest]
fn managed_plugin_reads_lowercased_runtime_descriptor(workspace: Workspace) {
    let mut plugin = workspace.plugin(
        r#"name = "Gemma"
        kind = "managed"
        repository = "https://example.org/gemma.git"
        script = "mapping_single.py""#,
    );
    let error = plugin.setup().expect_err("descriptor is absent");
    let message = error.to_string();
    assert!(message.contains("gemma.runtime.toml"), "{message}");
    assert_eq!(error.outcome_kind(), OutcomeKind::ExecutionError);
}
