//! Real `/bin/sh` scripts behind the command runner

mod fixtures;

use std::fs;
use std::path::{Path, PathBuf};

use fixtures::Harness;
use sshlirp_ci::version::check_for_update;
use sshlirp_ci::{CheckOutcome, CiConfig, CommandId, CommandRunner};

fn write_script(dir: &Path, command: CommandId, body: &str) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join(command.script_name()), body).unwrap();
}

#[test]
fn test_check_commit_arguments_and_release() {
    let harness = Harness::new("x86_64");
    let scripts = harness.temp.path().join("script");
    // $5 is the log, $6 the versioning file
    write_script(
        &scripts,
        CommandId::CheckCommit,
        "echo \"pull $1 from $2\"\necho v9.1 >> \"$6\"\nexit 2\n",
    );
    harness.write_versions("v9.0\n");

    let runner = CommandRunner::scripts(&scripts);
    let log = harness.config.log_file.clone();
    let check = check_for_update(&runner, &harness.config, &log);

    assert_eq!(check.outcome, CheckOutcome::Updated);
    assert_eq!(check.release.as_deref(), Some("v9.1"));
    let log_text = fs::read_to_string(&log).unwrap();
    assert!(log_text.contains(&format!(
        "pull {} from https://example.org/sshlirp.git",
        harness.config.sshlirp_source_dir.display()
    )));
}

#[test]
fn test_check_commit_exit_codes() {
    let harness = Harness::new("x86_64");
    let scripts = harness.temp.path().join("script");
    let runner = CommandRunner::scripts(&scripts);
    let log = harness.config.log_file.clone();

    write_script(&scripts, CommandId::CheckCommit, "exit 0\n");
    let check = check_for_update(&runner, &harness.config, &log);
    assert_eq!(check.outcome, CheckOutcome::Unchanged);
    assert!(check.release.is_none());

    write_script(&scripts, CommandId::CheckCommit, "echo 'fatal: unable to access' >&2\nexit 1\n");
    let check = check_for_update(&runner, &harness.config, &log);
    assert_eq!(check.outcome, CheckOutcome::Error);
    assert!(check.release.is_none());
    assert!(fs::read_to_string(&log).unwrap().contains("fatal: unable to access"));
}

#[test]
fn test_missing_script_is_error() {
    let harness = Harness::new("x86_64");
    let runner = CommandRunner::scripts(harness.temp.path().join("no-scripts"));
    let log = harness.config.log_file.clone();

    let check = check_for_update(&runner, &harness.config, &log);
    assert!(check.is_error());
}

#[test]
fn test_config_file_defaults_script_dir() {
    let harness = Harness::new("x86_64");
    let path = harness.temp.path().join("etc").join("ci.conf");
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(
        &path,
        "\
# sshlirp CI
SSHLIRP_REPO_URL=https://example.org/sshlirp.git
LIBSLIRP_REPO_URL=https://example.org/libslirp.git
MAIN_DIR=/srv/ci
VERSIONING_FILE=/srv/ci/versions.txt
TARGET_DIR=/srv/ci/out
SSHLIRP_SOURCE_DIR=/srv/ci/sshlirp
LIBSLIRP_SOURCE_DIR=/srv/ci/libslirp
LOG_FILE=/srv/ci/log/main.log
THREAD_LOG_DIR=/srv/ci/log
THREAD_CHROOT_TARGET_DIR=/out
THREAD_CHROOT_LOG_FILE=/log/thread.log
POLL_INTERVAL=300
ARCHITECTURES=x86_64, aarch64 ,riscv64
",
    )
    .unwrap();

    let config = CiConfig::from_file(&path).unwrap();
    assert_eq!(config.script_dir, harness.temp.path().join("etc").join("script"));
    assert_eq!(config.architectures.len(), 3);
    assert_eq!(config.architectures[1].as_str(), "aarch64");
    assert_eq!(config.poll_interval.as_secs(), 300);
}

#[test]
fn test_relative_config_path_gives_absolute_script_dir() {
    let harness = Harness::new("x86_64");
    let etc = harness.temp.path().join("etc");
    fs::create_dir_all(etc.join("script")).unwrap();
    fs::write(
        etc.join("ci.conf"),
        "\
SSHLIRP_REPO_URL=u1
LIBSLIRP_REPO_URL=u2
MAIN_DIR=/srv/ci
VERSIONING_FILE=/srv/ci/versions.txt
TARGET_DIR=/srv/ci/out
SSHLIRP_SOURCE_DIR=/srv/ci/sshlirp
LIBSLIRP_SOURCE_DIR=/srv/ci/libslirp
LOG_FILE=/srv/ci/main.log
THREAD_LOG_DIR=/srv/ci/log
THREAD_CHROOT_TARGET_DIR=/out
THREAD_CHROOT_LOG_FILE=/log/thread.log
POLL_INTERVAL=60
ARCHITECTURES=x86_64
",
    )
    .unwrap();

    // Same file, reached through a path relative to the working directory
    let cwd = std::env::current_dir().unwrap();
    let mut relative = PathBuf::new();
    for _ in cwd.components().skip(1) {
        relative.push("..");
    }
    relative.push(etc.join("ci.conf").strip_prefix("/").unwrap());
    assert!(relative.is_relative());

    let config = CiConfig::from_file(&relative).unwrap();
    assert!(config.script_dir.is_absolute());
    assert!(config.script_dir.is_dir());
    assert!(config.script_dir.ends_with("etc/script"));
}

#[test]
fn test_layout_creates_versioning_file_without_truncating() {
    let harness = Harness::new("x86_64");
    harness.write_versions("v1.0\n");

    sshlirp_ci::daemon::prepare_layout(&harness.config).unwrap();

    assert_eq!(
        fs::read_to_string(&harness.config.versioning_file).unwrap(),
        "v1.0\n"
    );
    assert!(harness.config.log_file.parent().unwrap().is_dir());
}
