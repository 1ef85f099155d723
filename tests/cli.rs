use std::process::Command;

use lightmesh::Config;

const BIN: &str = env!("CARGO_BIN_EXE_lightmesh");

#[test]
fn default_config_prints_loadable_json() {
    let output = Command::new(BIN)
        .arg("default-config")
        .output()
        .expect("failed to run lightmesh");
    assert!(output.status.success());

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("mesh.json");
    std::fs::write(&path, &output.stdout).unwrap();
    assert_eq!(Config::load(&path).unwrap(), Config::default());
}

#[test]
fn simulate_reports_one_leader() {
    let output = Command::new(BIN)
        .args(["simulate", "--nodes", "4", "--duration-ms", "5000", "--seed", "3"])
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run lightmesh");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches("LEADER").count(), 1, "{stdout}");
    assert_eq!(stdout.matches("FOLLOWER").count(), 3, "{stdout}");
}

#[test]
fn token_and_hardware_id_are_exclusive() {
    let output = Command::new(BIN)
        .args(["node", "--token", "5", "--hardware-id", "00:00:00:00:00:01"])
        .output()
        .expect("failed to run lightmesh");
    assert!(!output.status.success());
}

#[cfg(unix)]
#[test]
fn node_exits_on_sigint_with_stdin_open() {
    use std::process::Stdio;
    use std::time::{Duration, Instant};

    let mut child = Command::new(BIN)
        .args(["node", "--manual", "--port", "0", "--token", "5"])
        .env("RUST_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn lightmesh node");
    let _stdin = child.stdin.take();

    std::thread::sleep(Duration::from_millis(500));
    let status = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .expect("kill");
    assert!(status.success());

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if child.try_wait().expect("try_wait").is_some() {
            break;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("node still running 5s after SIGINT");
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
