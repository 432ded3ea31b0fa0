use pretty_assertions::assert_eq;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use tmlog::marker::{Marker, MarkerId};

/// `tmlog` isolated from the user's config, tmux and state
fn tmlog(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_tmlog"));
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_RUNTIME_DIR", home.join("run"))
        .env_remove("TMUX")
        .env_remove("TMUX_PANE");
    cmd
}

fn run_with_stdin(mut cmd: Command, input: &[u8]) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(input).unwrap();
    child.wait_with_output().unwrap()
}

fn block(id: &str, command: &str, output: &[u8]) -> Vec<u8> {
    let id = MarkerId::parse(id).unwrap();
    let mut bytes = Marker::Prompt.encode();
    bytes.extend_from_slice(b"$ ");
    bytes.extend(
        Marker::Start {
            id: id.clone(),
            timestamp: 1_700_000_000,
            command: command.as_bytes().to_vec(),
        }
        .encode(),
    );
    bytes.extend_from_slice(output);
    bytes.extend(Marker::End { id }.encode());
    bytes
}

#[test]
fn capture_ignores_broken_config() {
    let tmp = tempfile::tempdir().unwrap();
    let config = tmp.path().join("broken.toml");
    std::fs::write(&config, "[capture\nmax_size_bytes =").unwrap();
    let logs = tmp.path().join("logs");

    let mut cmd = tmlog(tmp.path());
    cmd.arg("--config")
        .arg(&config)
        .arg("capture")
        .arg(&logs)
        .arg("work-1-0-%3");
    let output = run_with_stdin(cmd, b"hello from the pane\n");
    assert!(output.status.success(), "{:?}", output);

    let captured: Vec<_> = std::fs::read_dir(&logs)
        .unwrap()
        .flatten()
        .map(|e| e.path())
        .collect();
    assert_eq!(captured.len(), 1);
    let name = captured[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("work-1-0-%3_") && name.ends_with(".log"));
    assert_eq!(
        std::fs::read(&captured[0]).unwrap(),
        b"hello from the pane\n".to_vec()
    );
}

#[test]
fn mark_outside_tmux_is_silent() {
    let tmp = tempfile::tempdir().unwrap();
    let config = tmp.path().join("broken.toml");
    std::fs::write(&config, "not = [toml").unwrap();

    let output = tmlog(tmp.path())
        .arg("--config")
        .arg(&config)
        .args(["mark", "exec", "--session", "42", "--", "ls", "-la"])
        .output()
        .unwrap();

    assert!(output.status.success());
    assert!(output.stdout.is_empty());
}

#[test]
fn show_by_id_searches_every_pane_log() {
    let tmp = tempfile::tempdir().unwrap();
    let logs = tmp.path().join("logs");
    std::fs::create_dir_all(&logs).unwrap();
    std::fs::write(logs.join("s-1-0-%1_100.log"), block("old-1", "make", b"built\n")).unwrap();
    std::fs::write(logs.join("s-1-1-%2_200.log"), block("new-1", "ls", b"src\n")).unwrap();

    let config = tmp.path().join("config.toml");
    std::fs::write(
        &config,
        format!("[capture]\nlog_dir = {:?}\n", logs.display().to_string()),
    )
    .unwrap();

    let output = tmlog(tmp.path())
        .arg("--config")
        .arg(&config)
        .args(["show", "--id", "old-1"])
        .output()
        .unwrap();

    assert!(output.status.success(), "{:?}", output);
    assert_eq!(output.stdout, b"$ built\n".to_vec());
}

#[test]
fn list_reads_piped_log() {
    let tmp = tempfile::tempdir().unwrap();
    let mut log = block("a-1", "echo one", b"one\n");
    log.extend(block("a-2", "echo two", b"two\n"));

    let mut cmd = tmlog(tmp.path());
    cmd.args(["list", "--json", "-"]);
    let output = run_with_stdin(cmd, &log);
    assert!(output.status.success(), "{:?}", output);

    let lines: Vec<serde_json::Value> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["id"], "a-1");
    assert_eq!(lines[1]["command"], "echo two");
    assert_eq!(lines[1]["closed"], true);
}
