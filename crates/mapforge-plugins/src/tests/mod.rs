//! Crate-level integration and BDD tests.

use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use tempfile::TempDir;

use crate::context::LoadContext;
use crate::manager::PluginManager;
use crate::manifest::CONTRACT;
use crate::outcome::{ExecutionOutcome, OutcomeKind};
use crate::process::{CommandExecutor, OutputSink, ProcessInvocation};
use crate::runtime::venv_interpreter;

mod behaviour;

/// Executor that reports a modern interpreter and succeeds at everything.
#[derive(Default)]
struct StubExecutor {
    calls: Mutex<Vec<Vec<OsString>>>,
}

impl StubExecutor {
    fn calls(&self) -> Vec<Vec<OsString>> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CommandExecutor for StubExecutor {
    fn run(
        &self,
        invocation: &ProcessInvocation,
        stdout: &mut dyn OutputSink,
        _stderr: &mut dyn OutputSink,
    ) -> ExecutionOutcome {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(invocation.command().to_vec());
        if invocation.command().iter().any(|arg| arg == "--version") {
            stdout.write_line("Python 3.11.4");
        }
        ExecutionOutcome::success()
    }
}

#[test]
fn managed_plugin_is_provisioned_and_dispatched_end_to_end() {
    let root = TempDir::new().expect("temp dir");
    let plugins = root.path().join("plugins");
    let work = root.path().join("work");
    fs::create_dir_all(&plugins).expect("plugin dir");
    fs::write(
        plugins.join("gemma.toml"),
        format!(
            "[[plugin]]\ncontract = \"{CONTRACT}\"\nname = \"Gemma\"\nversion = \"1.0\"\nkind = \"managed\"\nrepository = \"https://example.org/gemma.git\"\nscript = \"mapping_single.py\"\nargs = [\"{{mapping}}\", \"{{input}}\", \"{{output}}\"]\n"
        ),
    )
    .expect("archive");
    fs::write(
        plugins.join("gemma.runtime.toml"),
        "tag = \"v1.2\"\nmin_interpreter = \"3.8\"\n",
    )
    .expect("runtime descriptor");
    let checkout = work.join("gemma").join("v1.2");
    fs::create_dir_all(&checkout).expect("checkout");
    fs::write(checkout.join("requirements.dist.txt"), "jsonschema\n").expect("requirements");

    let executor = Arc::new(StubExecutor::default());
    let context = LoadContext::new(&work)
        .with_executor(Arc::clone(&executor) as Arc<dyn CommandExecutor>);
    let manager = PluginManager::load(&plugins, context).expect("load");

    assert_eq!(manager.ids(), ["Gemma_1.0"]);
    let outcome = manager.map_file(
        "Gemma_1.0",
        Path::new("/m.json"),
        Path::new("/in.xml"),
        Path::new("/out.json"),
    );
    assert_eq!(outcome.kind(), OutcomeKind::Success);

    let calls = executor.calls();
    let last = calls.last().expect("mapping call");
    let expected: Vec<OsString> = vec![
        venv_interpreter(&checkout).into_os_string(),
        checkout.join("mapping_single.py").into_os_string(),
        "/m.json".into(),
        "/in.xml".into(),
        "/out.json".into(),
    ];
    assert_eq!(last, &expected);
    assert_eq!(calls.len(), 4, "version, venv, pip, mapping: {calls:?}");
}
