#![cfg(all(unix, feature = "cli"))]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use routio_transport::{connect, Endpoint};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/routio-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn routio() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_routio"));
    cmd.arg("--log-level").arg("error");
    cmd
}

fn wait_for_connect(path: &Path, timeout: Duration) {
    let start = Instant::now();
    loop {
        if connect(&Endpoint::unix(path)).is_ok() {
            return;
        }
        if start.elapsed() >= timeout {
            panic!("connect timeout");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let start = Instant::now();
    while !path.exists() {
        if start.elapsed() >= timeout {
            panic!("socket {} never appeared", path.display());
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn wait_with_timeout(mut child: Child, timeout: Duration) -> Output {
    let start = Instant::now();
    loop {
        if child.try_wait().expect("child status").is_some() {
            return child.wait_with_output().expect("child output");
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let output = child.wait_with_output().expect("child output");
            panic!(
                "child did not exit in time; stderr: {}",
                String::from_utf8_lossy(&output.stderr)
            );
        }
        thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn version_prints_package_version() {
    let output = routio().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("routio {}", env!("CARGO_PKG_VERSION")));
}

#[test]
fn version_extended_lists_protocol() {
    let output = routio()
        .arg("version")
        .arg("--extended")
        .output()
        .expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("protocol: routio 1.0"));
    assert!(stdout.contains("cli=true"));
}

#[test]
fn publish_through_router_reaches_subscriber() {
    let dir = unique_temp_dir("routed");
    let sock_path = dir.join("router.sock");

    let mut router = routio()
        .arg("router")
        .arg(&sock_path)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("router should start");
    wait_for_connect(&sock_path, Duration::from_secs(3));

    let subscriber = routio()
        .arg("--format")
        .arg("json")
        .arg("subscribe")
        .arg(&sock_path)
        .args(["--channel", "greetings", "--type", "string", "--count", "1"])
        .args(["--timeout", "10s"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("subscribe should start");

    // Keep publishing until the subscriber has registered with the router.
    let publish = routio()
        .arg("publish")
        .arg(&sock_path)
        .args(["--channel", "greetings", "--type", "string"])
        .args(["--data", "Hello there", "--count", "60", "--interval", "50ms"])
        .output()
        .expect("publish should run");
    assert!(
        publish.status.success(),
        "publish failed: {}",
        String::from_utf8_lossy(&publish.stderr)
    );

    let output = wait_with_timeout(subscriber, Duration::from_secs(10));
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout.lines().next().expect("one message line");
    let message: serde_json::Value = serde_json::from_str(first).expect("json output");
    assert_eq!(message["channel"], "greetings");
    assert_eq!(message["signature"], "string");
    assert_eq!(message["value"], "Hello there");
    assert_eq!(message["sequence"], 0);

    let _ = router.kill();
    let _ = router.wait();
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn direct_peer_mode_works_without_router() {
    let dir = unique_temp_dir("peer");
    let sock_path = dir.join("sub.sock");

    let subscriber = routio()
        .arg("--format")
        .arg("json")
        .arg("subscribe")
        .arg(&sock_path)
        .args(["--listen", "--channel", "level", "--type", "i32", "--count", "2"])
        .args(["--timeout", "10s"])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("subscribe should start");
    wait_for_socket(&sock_path, Duration::from_secs(3));

    let publish = routio()
        .arg("publish")
        .arg(&sock_path)
        .args(["--peer", "--channel", "level", "--type", "i32"])
        .args(["--data", "-42", "--count", "2", "--interval", "10ms"])
        .output()
        .expect("publish should run");
    assert!(
        publish.status.success(),
        "publish failed: {}",
        String::from_utf8_lossy(&publish.stderr)
    );

    let output = wait_with_timeout(subscriber, Duration::from_secs(10));
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let values: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).expect("json output"))
        .map(|message| message["value"].clone())
        .collect();
    assert_eq!(values, vec![serde_json::json!(-42), serde_json::json!(-42)]);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn subscribe_without_router_fails_with_transport_code() {
    let dir = unique_temp_dir("missing");
    let output = routio()
        .arg("subscribe")
        .arg(dir.join("nobody.sock"))
        .args(["--channel", "x"])
        .output()
        .expect("subscribe should run");

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("connect failed"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn publish_rejects_value_of_wrong_type() {
    let output = routio()
        .arg("publish")
        .arg("/tmp/routio-never-used.sock")
        .args(["--channel", "x", "--type", "u8", "--data", "300"])
        .output()
        .expect("publish should run");

    assert_eq!(output.status.code(), Some(64));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not a valid u8 value"));
}

#[test]
fn publish_rejects_unknown_type() {
    let output = routio()
        .arg("publish")
        .arg("/tmp/routio-never-used.sock")
        .args(["--channel", "x", "--type", "quaternion", "--data", "1"])
        .output()
        .expect("publish should run");

    assert_eq!(output.status.code(), Some(64));
}
