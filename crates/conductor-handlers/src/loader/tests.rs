//! Unit tests for staging and lazy loading.

use std::ffi::OsString;
use std::fs;

use conductor_config::ConditionSpec;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::manifest::MANIFEST_FILE;
use crate::tests::{ScriptedExecutor, descriptor};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Dirs {
    sources: TempDir,
    staged: TempDir,
}

#[fixture]
fn dirs() -> Dirs {
    Dirs {
        sources: TempDir::new().expect("sources dir"),
        staged: TempDir::new().expect("staged dir"),
    }
}

impl Dirs {
    fn stager(&self) -> Stager {
        Stager::new(self.staged.path())
    }

    fn file(&self, name: &str, contents: &str) -> AcquiredSource {
        let path = self.sources.path().join(name);
        fs::write(&path, contents).expect("write source file");
        AcquiredSource::new(path)
    }

    fn package(&self, name: &str, files: &[(&str, &str)]) -> AcquiredSource {
        let root = self.sources.path().join(name);
        for (relative, contents) in files {
            let path = root.join(relative);
            fs::create_dir_all(path.parent().expect("parent")).expect("create package dir");
            fs::write(&path, contents).expect("write package file");
        }
        AcquiredSource::new(root)
    }
}

// ---------------------------------------------------------------------------
// Staging
// ---------------------------------------------------------------------------

#[rstest]
#[case::with_extension("notify.sh", "notify.sh")]
#[case::without_extension("notify", "notify")]
fn files_are_staged_under_the_handler_name(
    dirs: Dirs,
    #[case] source_name: &str,
    #[case] staged_name: &str,
) {
    let source = dirs.file(source_name, "#!/bin/sh\n");
    let unit = dirs.stager().stage(&source, "notify").expect("stage");

    let expected = dirs.staged.path().join(staged_name);
    assert_eq!(unit.root(), expected);
    assert_eq!(unit.program(), expected);
    assert!(unit.args().is_empty());
    assert_eq!(unit.name(), "notify");
}

#[rstest]
fn restaging_is_idempotent_and_replaces_changed_content(dirs: Dirs) {
    let stager = dirs.stager();
    let source = dirs.file("hook.sh", "echo one\n");
    let first = stager.stage(&source, "hook").expect("first stage");
    let second = stager.stage(&source, "hook").expect("second stage");
    assert_eq!(first, second);
    assert_eq!(fs::read_to_string(second.program()).expect("read"), "echo one\n");

    let changed = dirs.file("hook.sh", "echo two\n");
    let third = stager.stage(&changed, "hook").expect("third stage");
    assert_eq!(fs::read_to_string(third.program()).expect("read"), "echo two\n");
}

#[rstest]
fn packages_default_to_their_handler_file(dirs: Dirs) {
    let source = dirs.package("pkg", &[("handler", "#!/bin/sh\n"), ("lib/util.sh", "")]);
    let unit = dirs.stager().stage(&source, "checks").expect("stage");

    let root = dirs.staged.path().join("checks");
    assert_eq!(unit.root(), root);
    assert_eq!(unit.program(), root.join("handler"));
    assert!(root.join("lib/util.sh").is_file());
}

#[rstest]
fn restaged_packages_drop_stale_files(dirs: Dirs) {
    let stager = dirs.stager();
    let old = dirs.package("v1", &[("handler", ""), ("stale.txt", "")]);
    stager.stage(&old, "checks").expect("stage v1");
    let new = dirs.package("v2", &[("handler", "")]);
    stager.stage(&new, "checks").expect("stage v2");

    assert!(!dirs.staged.path().join("checks/stale.txt").exists());
}

#[cfg(target_os = "linux")]
#[rstest]
fn non_utf8_extensions_survive_staging(dirs: Dirs) {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let source_path = dirs.sources.path().join(OsStr::from_bytes(b"hook.\xff"));
    fs::write(&source_path, "echo raw\n").expect("write source file");
    let unit = dirs
        .stager()
        .stage(&AcquiredSource::new(source_path), "hook")
        .expect("stage");

    let expected = dirs.staged.path().join(OsStr::from_bytes(b"hook.\xff"));
    assert_eq!(unit.program(), expected);
    assert!(expected.is_file());
}

#[cfg(unix)]
#[rstest]
fn symlinked_directories_are_copied_as_trees(dirs: Dirs) {
    let shared = dirs.sources.path().join("shared");
    fs::create_dir_all(&shared).expect("create shared dir");
    fs::write(shared.join("lib.sh"), "echo shared\n").expect("write shared file");
    let source = dirs.package("linked", &[("handler", "")]);
    std::os::unix::fs::symlink(&shared, source.path().join("lib")).expect("link shared dir");

    dirs.stager().stage(&source, "linked").expect("stage");

    let copied = dirs.staged.path().join("linked/lib/lib.sh");
    assert_eq!(fs::read_to_string(copied).expect("read copy"), "echo shared\n");
}

#[rstest]
fn interpreter_manifests_run_the_entrypoint_as_an_argument(dirs: Dirs) {
    let manifest = "entrypoint = \"main.py\"\ninterpreter = \"python3\"\nargs = [\"-u\"]\n";
    let source = dirs.package("py", &[(MANIFEST_FILE, manifest), ("main.py", "")]);
    let unit = dirs.stager().stage(&source, "py").expect("stage");

    let entrypoint = dirs.staged.path().join("py/main.py");
    assert_eq!(unit.program(), Path::new("python3"));
    assert_eq!(unit.args(), [entrypoint.into_os_string(), OsString::from("-u")]);
}

#[rstest]
fn missing_entrypoint_is_rejected(dirs: Dirs) {
    let source = dirs.package("empty", &[("README.md", "")]);
    let err = dirs.stager().stage(&source, "empty").expect_err("no entrypoint");
    assert!(matches!(err, StageError::MissingEntrypoint { ref name, .. } if name == "empty"));
}

#[rstest]
fn escaping_entrypoints_are_rejected(dirs: Dirs) {
    let source = dirs.package("bad", &[(MANIFEST_FILE, "entrypoint = \"../outside\"\n")]);
    let err = dirs.stager().stage(&source, "bad").expect_err("escaping entrypoint");
    assert!(matches!(err, StageError::Manifest { .. }));
}

// ---------------------------------------------------------------------------
// Lazy loading
// ---------------------------------------------------------------------------

fn handler(name: &str) -> LoadedHandler {
    crate::tests::loaded(descriptor(name))
}

#[test]
fn units_are_described_once_on_first_lookup() {
    let executor = ScriptedExecutor::default().with_unit("a", &["handle_push"]);
    let loaded = handler("a");
    assert!(!loaded.is_loaded());

    let found = loaded.get_function(&executor, "handle_push").expect("lookup");
    let missing = loaded.get_function(&executor, "handle_issues").expect("lookup");
    let condition = loaded.get_condition(&executor, "push").expect("condition");

    assert_eq!(found.as_deref(), Some("handle_push"));
    assert_eq!(missing, None);
    assert_eq!(condition, None);
    assert!(loaded.is_loaded());
    assert_eq!(executor.describe_count("a"), 1);
}

#[test]
fn declared_conditions_win_without_loading() {
    let declared = ConditionSpec::default().with_tags(vec![String::from("v*")]);
    let executor = ScriptedExecutor::default()
        .with_unit("a", &["handle_push"])
        .with_unit_condition(
            "a",
            "push",
            ConditionSpec::default().with_branches(vec![String::from("main")]),
        );
    let loaded = crate::tests::loaded(descriptor("a").with_condition("push", declared.clone()));

    assert_eq!(
        loaded.get_condition(&executor, "push").expect("condition"),
        Some(declared)
    );
    assert!(!loaded.is_loaded());
    assert_eq!(
        loaded
            .get_condition(&executor, "pull_request")
            .expect("condition"),
        None
    );
    assert!(loaded.is_loaded());
}

#[test]
fn unit_conditions_are_used_when_none_declared() {
    let own = ConditionSpec::default().with_branches(vec![String::from("main")]);
    let executor = ScriptedExecutor::default()
        .with_unit("a", &["handle_push"])
        .with_unit_condition("a", "push", own.clone());
    let loaded = handler("a");

    assert_eq!(loaded.get_condition(&executor, "push").expect("condition"), Some(own));
}

#[test]
fn describe_failures_are_retried_on_next_lookup() {
    let executor = ScriptedExecutor::default().undescribable("a");
    let loaded = handler("a");

    assert!(loaded.get_function(&executor, "handle_push").is_err());
    assert!(loaded.get_function(&executor, "handle_push").is_err());
    assert!(!loaded.is_loaded());
    assert_eq!(executor.describe_count("a"), 2);
}
