#![cfg(all(unix, feature = "cli"))]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/pmxcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn pipemux() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_pipemux"));
    command.arg("--log-level").arg("error");
    command
}

fn wait_for_pipes(base: &Path, timeout: Duration) {
    let outgoing = PathBuf::from(format!("{}.outgoing", base.display()));
    let start = Instant::now();
    while !outgoing.exists() {
        if start.elapsed() >= timeout {
            panic!("serve did not bind {}", outgoing.display());
        }
        thread::sleep(Duration::from_millis(25));
    }
}

struct Server {
    child: Child,
    dir: PathBuf,
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn serve(tag: &str) -> (Server, PathBuf) {
    let dir = unique_temp_dir(tag);
    let base = dir.join("bot");
    let child = pipemux()
        .arg("serve")
        .arg(&base)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve should start");
    wait_for_pipes(&base, Duration::from_secs(5));
    (Server { child, dir }, base)
}

fn send_json(base: &Path, extra: &[&str]) -> (Output, serde_json::Value) {
    let output = pipemux()
        .arg("--format")
        .arg("json")
        .arg("send")
        .arg(base)
        .args(extra)
        .output()
        .expect("send should run");
    let value = serde_json::from_slice(&output.stdout).unwrap_or(serde_json::Value::Null);
    (output, value)
}

#[test]
fn send_against_serve_echoes_the_body() {
    let (_server, base) = serve("echo");

    let (output, value) = send_json(&base, &["--path", "/x", "--data", "hello"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(value["status"], 200);
    assert_eq!(value["feeds"][0]["id"], 0);
    assert_eq!(value["feeds"][0]["body"], "hello");
    assert_eq!(value["feeds"][0]["size"], 5);
}

#[test]
fn serve_accepts_the_next_client_after_a_disconnect() {
    let (_server, base) = serve("reaccept");

    let (first, value) = send_json(&base, &["--data", "one"]);
    assert!(first.status.success());
    assert_eq!(value["feeds"][0]["body"], "one");

    let (second, value) = send_json(
        &base,
        &["--method", "put", "--json", "{\"n\":2}", "--header", "X-Trace=2"],
    );
    assert!(second.status.success(), "stderr: {}", String::from_utf8_lossy(&second.stderr));
    assert_eq!(value["feeds"][0]["body"], "{\"n\":2}");
    assert_eq!(
        value["feeds"][0]["headers"]["Content-Type"],
        "application/json; charset=utf-8"
    );
}

#[test]
fn raw_format_prints_only_the_body() {
    let (_server, base) = serve("raw");
    let output = pipemux()
        .arg("--format")
        .arg("raw")
        .arg("send")
        .arg(&base)
        .arg("--data")
        .arg("just-bytes")
        .output()
        .expect("send should run");
    assert!(output.status.success());
    assert_eq!(output.stdout, b"just-bytes");
}

#[test]
fn send_without_server_returns_transport_error() {
    let dir = unique_temp_dir("missing");
    let output = pipemux()
        .arg("send")
        .arg(dir.join("nobody"))
        .arg("--timeout")
        .arg("1s")
        .output()
        .expect("send should run");
    assert_eq!(output.status.code(), Some(3));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn invalid_json_body_is_a_usage_error() {
    let output = pipemux()
        .arg("send")
        .arg("/tmp/pmxcli-unused/bot")
        .arg("--json")
        .arg("{nope")
        .output()
        .expect("send should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn version_reports_package_version() {
    let output = pipemux().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("pipemux {}", env!("CARGO_PKG_VERSION")));

    let extended = pipemux()
        .arg("version")
        .arg("--extended")
        .output()
        .expect("version --extended should run");
    let stdout = String::from_utf8_lossy(&extended.stdout);
    assert!(stdout.contains("packet_header_bytes: 22"));
    assert!(stdout.contains("max_packet_content_bytes: 4096"));
}
