//! In-process tests of the CLI runtime in dry-run mode.


use std::ffi::OsString;
use std::fs;
use std::process::ExitCode;

use camino::Utf8PathBuf;
use rstest::{fixture, rstest};
use setline_config::Config;
use tempfile::TempDir;

use crate::config::ConfigLoader;
use crate::{AppError, run_with_loader};

/// Loader returning a fixed configuration.
pub(crate) struct StaticLoader(pub(crate) Config);

impl ConfigLoader for StaticLoader {
    fn load(&self, _args: &[OsString]) -> Result<Config, AppError> {
        self.0.validate()?;
        Ok(self.0.clone())
    }
}

/// Captured result of one CLI run.
pub(crate) struct Outcome {
    pub(crate) code: ExitCode,
    pub(crate) stdout: String,
    pub(crate) stderr: String,
}

pub(crate) fn invoke(config: Config, args: &[&str]) -> Outcome {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let argv = std::iter::once("setline")
        .chain(args.iter().copied())
        .map(OsString::from);
    let code = run_with_loader(argv, &mut stdout, &mut stderr, &StaticLoader(config));
    Outcome {
        code,
        stdout: String::from_utf8(stdout).expect("stdout is UTF-8"),
        stderr: String::from_utf8(stderr).expect("stderr is UTF-8"),
    }
}

pub(crate) struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub(crate) fn path(&self, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.dir.path().join(name)).expect("UTF-8 temp path")
    }

    pub(crate) fn write(&self, name: &str, contents: &str) -> Utf8PathBuf {
        let path = self.path(name);
        fs::write(&path, contents).expect("write script");
        path
    }

    pub(crate) fn dry_run(&self) -> Config {
        Config {
            dry_run_file: Some(self.path("staged.set")),
            log_filter: String::from("off"),
            ..Config::default()
        }
    }

    pub(crate) fn staged(&self) -> String {
        fs::read_to_string(self.path("staged.set")).unwrap_or_default()
    }
}

pub(crate) fn new_workspace() -> Workspace {
    Workspace {
        dir: TempDir::new().expect("temp dir"),
    }
}

#[fixture]
fn workspace() -> Workspace {
    new_workspace()
}

#[rstest]
fn apply_writes_the_dry_run_file(workspace: Workspace) {
    let script = workspace.write(
        "change.set",
        "# uplink\nset interfaces ge-0/0/0 mtu 9192\nset interfaces ge-0/0/0 description \"to core\"\n",
    );

    let outcome = invoke(workspace.dry_run(), &["apply", script.as_str()]);

    assert_eq!(outcome.code, ExitCode::SUCCESS, "{}", outcome.stderr);
    assert_eq!(
        outcome.stdout,
        format!("staged 2 statements in {}\n", workspace.path("staged.set"))
    );
    insta::assert_snapshot!(workspace.staged().trim_end(), @r#"
    set interfaces ge-0/0/0 mtu 9192
    set interfaces ge-0/0/0 description "to core"
    "#);
}

#[rstest]
fn delete_stages_a_delete_statement(workspace: Workspace) {
    let outcome = invoke(
        workspace.dry_run(),
        &["delete", "interfaces", "ge-0/0/1", "--comment", "decommission"],
    );
    assert_eq!(outcome.code, ExitCode::SUCCESS, "{}", outcome.stderr);
    assert_eq!(workspace.staged(), "delete interfaces ge-0/0/1\n");
}

#[rstest]
fn facts_report_configured_dry_run_device(workspace: Workspace) {
    let config = Config {
        dry_run_model: Some(String::from("srx345")),
        dry_run_version: Some(String::from("20.4R3")),
        ..workspace.dry_run()
    };
    let outcome = invoke(config, &["facts"]);
    assert_eq!(outcome.code, ExitCode::SUCCESS, "{}", outcome.stderr);
    insta::assert_snapshot!(outcome.stdout.trim_end(), @r"
    model: srx345
    family: SRX
    version: 20.4R3
    ");
}

#[rstest]
fn show_in_dry_run_prints_nothing(workspace: Workspace) {
    let outcome = invoke(workspace.dry_run(), &["show", "interfaces"]);
    assert_eq!(outcome.code, ExitCode::SUCCESS, "{}", outcome.stderr);
    assert!(outcome.stdout.is_empty());
}

#[rstest]
fn malformed_script_names_the_line(workspace: Workspace) {
    let script = workspace.write("bad.set", "set system host-name r1\nrename interfaces ge-0/0/0\n");
    let outcome = invoke(workspace.dry_run(), &["apply", script.as_str()]);
    assert_eq!(outcome.code, ExitCode::FAILURE);
    assert!(
        outcome.stderr.contains(&format!("{script}:2:")),
        "{}",
        outcome.stderr
    );
    assert!(workspace.staged().is_empty());
}

#[rstest]
fn invalid_dry_run_version_is_rejected(workspace: Workspace) {
    let config = Config {
        dry_run_version: Some(String::from("latest")),
        ..workspace.dry_run()
    };
    let outcome = invoke(config, &["facts"]);
    assert_eq!(outcome.code, ExitCode::FAILURE);
    assert!(outcome.stderr.contains("invalid dry-run version"), "{}", outcome.stderr);
}

#[rstest]
fn missing_host_fails_before_connecting() {
    let outcome = invoke(Config::default(), &["facts"]);
    assert_eq!(outcome.code, ExitCode::FAILURE);
    assert!(
        outcome.stderr.contains("no device host configured"),
        "{}",
        outcome.stderr
    );
}

#[rstest]
fn help_goes_to_stdout() {
    let outcome = invoke(Config::default(), &["--help"]);
    assert_eq!(outcome.code, ExitCode::SUCCESS);
    assert!(outcome.stdout.contains("Usage: setline"));
    assert!(outcome.stderr.is_empty());
}

#[rstest]
fn unknown_subcommands_are_usage_errors() {
    let outcome = invoke(Config::default(), &["commit-all"]);
    assert_eq!(outcome.code, ExitCode::FAILURE);
    assert!(outcome.stderr.contains("commit-all"), "{}", outcome.stderr);
}
