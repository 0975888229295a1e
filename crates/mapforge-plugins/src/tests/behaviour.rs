//! Behaviour-driven tests for plugin loading and dispatch.

use std::fs;
use std::path::PathBuf;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use crate::context::LoadContext;
use crate::error::PluginError;
use crate::manager::PluginManager;
use crate::manifest::CONTRACT;
use crate::outcome::{ExecutionOutcome, OutcomeKind};

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

struct TestWorld {
    root: TempDir,
    archives: usize,
    manager: Option<PluginManager>,
    outcome: Option<ExecutionOutcome>,
    reload: Option<Result<(), PluginError>>,
}

impl TestWorld {
    fn plugin_dir(&self) -> PathBuf {
        self.root.path().join("plugins")
    }

    fn input(&self) -> PathBuf {
        self.root.path().join("input.txt")
    }

    fn output(&self) -> PathBuf {
        self.root.path().join("output.txt")
    }

    fn add_archive(&mut self, table: &str) {
        self.archives += 1;
        let path = self.plugin_dir().join(format!("{:02}.toml", self.archives));
        fs::write(
            path,
            format!("[[plugin]]\ncontract = \"{CONTRACT}\"\nversion = \"1.0\"\n{table}\n"),
        )
        .expect("write archive");
    }

    fn manager(&self) -> &PluginManager {
        self.manager.as_ref().expect("registry loaded")
    }
}

#[fixture]
fn world() -> TestWorld {
    let root = TempDir::new().expect("temp dir");
    fs::create_dir_all(root.path().join("plugins")).expect("plugin dir");
    TestWorld {
        root,
        archives: 0,
        manager: None,
        outcome: None,
        reload: None,
    }
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("a plugin archive declaring a pass-through plugin {name}")]
fn given_pass_through(world: &mut TestWorld, name: String) {
    let plugin = name.trim_matches('"');
    world.add_archive(&format!("name = \"{plugin}\"\nkind = \"pass_through\""));
}

#[given("a plugin archive declaring a command plugin {name} using {executable}")]
fn given_command(world: &mut TestWorld, name: String, executable: String) {
    let plugin = name.trim_matches('"');
    let program = executable.trim_matches('"');
    world.add_archive(&format!(
        "name = \"{plugin}\"\nkind = \"command\"\nexecutable = \"{program}\""
    ));
}

#[given("an input file containing {contents}")]
fn given_input(world: &mut TestWorld, contents: String) {
    fs::write(world.input(), contents.trim_matches('"')).expect("write input");
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("the registry is loaded")]
fn when_loaded(world: &mut TestWorld) {
    let context = LoadContext::new(world.root.path().join("work"));
    world.manager = Some(PluginManager::load(world.plugin_dir(), context).expect("load"));
}

#[when("plugin {id} maps the input")]
fn when_mapped(world: &mut TestWorld, id: String) {
    let mapping = world.root.path().join("mapping.json");
    let outcome =
        world
            .manager()
            .map_file(id.trim_matches('"'), &mapping, &world.input(), &world.output());
    world.outcome = Some(outcome);
}

#[when("a broken archive is added")]
fn when_broken_archive(world: &mut TestWorld) {
    fs::write(world.plugin_dir().join("99-broken.toml"), "[[plugin]\n").expect("write archive");
}

#[when("the registry is reloaded")]
fn when_reloaded(world: &mut TestWorld) {
    let result = world.manager().reload().map(|_| ());
    world.reload = Some(result);
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("the outcome is {kind}")]
fn then_outcome(world: &mut TestWorld, kind: String) {
    let outcome = world.outcome.as_ref().expect("no outcome captured");
    let expected = match kind.trim_matches('"') {
        "success" => OutcomeKind::Success,
        "not_found" => OutcomeKind::NotFound,
        "invalid_input" => OutcomeKind::InvalidInput,
        "execution_error" => OutcomeKind::ExecutionError,
        "timeout" => OutcomeKind::Timeout,
        other => panic!("unsupported outcome kind: '{other}'"),
    };
    assert_eq!(outcome.kind(), expected, "outcome: {outcome}");
}

#[then("the output file contains {contents}")]
fn then_output_contains(world: &mut TestWorld, contents: String) {
    let produced = fs::read_to_string(world.output()).expect("read output");
    assert_eq!(produced, contents.trim_matches('"'));
}

#[then("no output file exists")]
fn then_no_output(world: &mut TestWorld) {
    assert!(!world.output().exists());
}

#[then("the registry lists {id} only")]
fn then_lists_only(world: &mut TestWorld, id: String) {
    assert_eq!(world.manager().ids(), [id.trim_matches('"')]);
}

#[then("the reload fails")]
fn then_reload_fails(world: &mut TestWorld) {
    let result = world.reload.as_ref().expect("no reload attempted");
    assert!(
        matches!(result, Err(PluginError::Manifest { .. })),
        "expected manifest error, got {result:?}"
    );
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(path = "tests/features/plugin_loading.feature")]
fn plugin_loading_behaviour(world: TestWorld) {
    let _ = world;
}
