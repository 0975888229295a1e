//! Unit tests for snapshot publication.

use std::fs;
use std::path::Path;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::manifest::CONTRACT;
use crate::outcome::OutcomeKind;

struct Fixture {
    root: TempDir,
}

impl Fixture {
    fn plugin_dir(&self) -> std::path::PathBuf {
        self.root.path().join("plugins")
    }

    fn write_archive(&self, file: &str, name: &str) {
        fs::write(
            self.plugin_dir().join(file),
            format!(
                "[[plugin]]\ncontract = \"{CONTRACT}\"\nname = \"{name}\"\nversion = \"1.0\"\nkind = \"pass_through\"\n"
            ),
        )
        .expect("write archive");
    }

    fn manager(&self) -> PluginManager {
        PluginManager::load(
            self.plugin_dir(),
            LoadContext::new(self.root.path().join("work")),
        )
        .expect("initial load")
    }
}

#[fixture]
fn fixture() -> Fixture {
    let root = TempDir::new().expect("temp dir");
    fs::create_dir_all(root.path().join("plugins")).expect("create plugin dir");
    Fixture { root }
}

#[rstest]
fn reload_publishes_a_new_snapshot(fixture: Fixture) {
    fixture.write_archive("a.toml", "Copy");
    let manager = fixture.manager();
    let before = manager.snapshot();
    assert_eq!(before.ids(), ["Copy_1.0"]);

    fixture.write_archive("b.toml", "Mirror");
    let after = manager.reload().expect("reload");

    assert_eq!(after.ids(), ["Copy_1.0", "Mirror_1.0"]);
    assert_eq!(manager.ids(), ["Copy_1.0", "Mirror_1.0"]);
    assert_eq!(before.ids(), ["Copy_1.0"], "held snapshots are immutable");
    assert!(!Arc::ptr_eq(&before, &manager.snapshot()));
}

#[rstest]
fn failed_reload_keeps_the_previous_snapshot(fixture: Fixture) {
    fixture.write_archive("a.toml", "Copy");
    let manager = fixture.manager();
    let before = manager.snapshot();

    fs::write(fixture.plugin_dir().join("b.toml"), "[[plugin]\n").expect("write broken archive");
    let error = manager.reload().expect_err("broken archive");

    assert_eq!(error.outcome_kind(), OutcomeKind::UnknownError);
    assert!(Arc::ptr_eq(&before, &manager.snapshot()));
    assert_eq!(manager.ids(), ["Copy_1.0"]);
}

#[rstest]
fn requests_use_the_active_snapshot(fixture: Fixture) {
    let manager = fixture.manager();
    let input = fixture.root.path().join("input.txt");
    fs::write(&input, "data").expect("write input");
    let output = fixture.root.path().join("output.txt");

    let missing = manager.map_file("Copy_1.0", Path::new("m"), &input, &output);
    assert_eq!(missing.kind(), OutcomeKind::NotFound);

    fixture.write_archive("a.toml", "Copy");
    manager.reload().expect("reload");
    let mapped = manager.map_file("Copy_1.0", Path::new("m"), &input, &output);

    assert!(mapped.is_success(), "unexpected outcome: {mapped}");
    assert_eq!(fs::read_to_string(&output).expect("output"), "data");
    assert_eq!(
        manager
            .descriptors()
            .iter()
            .map(PluginDescriptor::id)
            .collect::<Vec<_>>(),
        ["Copy_1.0"]
    );
}

#[cfg(unix)]
#[rstest]
fn in_flight_mapping_outlives_a_reload_that_drops_its_plugin(fixture: Fixture) {
    fs::write(
        fixture.plugin_dir().join("slow.toml"),
        format!(
            "[[plugin]]\ncontract = \"{CONTRACT}\"\nname = \"Slow\"\nversion = \"1.0\"\nkind = \"command\"\nexecutable = \"/bin/sh\"\nargs = [\"-c\", \"sleep 1; printf done\"]\nstdout_to_output = true\n"
        ),
    )
    .expect("write archive");
    let manager = fixture.manager();
    let output = fixture.root.path().join("output.txt");

    let outcome = std::thread::scope(|scope| {
        let mapping =
            scope.spawn(|| manager.map_file("Slow_1.0", Path::new("m"), Path::new("i"), &output));
        std::thread::sleep(std::time::Duration::from_millis(200));
        fs::remove_file(fixture.plugin_dir().join("slow.toml")).expect("remove archive");
        let reloaded = manager.reload().expect("reload");
        assert!(reloaded.is_empty(), "reload publishes while the mapping runs");
        mapping.join().expect("mapping thread")
    });

    assert!(outcome.is_success(), "unexpected outcome: {outcome}");
    assert_eq!(fs::read_to_string(&output).expect("output"), "done");
    assert!(manager.ids().is_empty());
}

#[test]
fn new_manager_starts_empty() {
    let manager = PluginManager::new("/nonexistent", LoadContext::default());
    assert!(manager.snapshot().is_empty());
    assert_eq!(manager.plugin_dir(), Path::new("/nonexistent"));
}
