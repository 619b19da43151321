use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_facultyd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn facultyd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn raw_request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

#[test]
fn duplicate_email_is_a_validation_error_not_a_crash() {
    let workspace = temp_dir("faculty-email-unique");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = raw_request(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let first = raw_request(
        &mut stdin,
        &mut reader,
        "2",
        "staff.add",
        json!({ "name": "Asha Rao", "email": "asha@college.edu", "password": "pw" }),
    );
    assert_eq!(first.get("ok").and_then(|v| v.as_bool()), Some(true));

    let dup = raw_request(
        &mut stdin,
        &mut reader,
        "3",
        "staff.add",
        json!({ "name": "Another Asha", "email": "asha@college.edu", "password": "pw" }),
    );
    assert_eq!(dup.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        dup.get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("email_exists")
    );

    // Renaming an existing member onto a taken email hits the same check.
    let second = raw_request(
        &mut stdin,
        &mut reader,
        "4",
        "staff.add",
        json!({ "name": "Ben Cho", "email": "ben@college.edu", "password": "pw" }),
    );
    let ben = second
        .get("result")
        .and_then(|r| r.get("staffId"))
        .and_then(|v| v.as_str())
        .expect("staffId")
        .to_string();
    let collide = raw_request(
        &mut stdin,
        &mut reader,
        "5",
        "staff.update",
        json!({ "staffId": ben, "patch": { "email": "asha@college.edu" } }),
    );
    assert_eq!(
        collide
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str()),
        Some("email_exists")
    );

    // The daemon must still be responsive after constraint failures.
    let health = raw_request(&mut stdin, &mut reader, "6", "health", json!({}));
    assert_eq!(health.get("ok").and_then(|v| v.as_bool()), Some(true));

    let _ = std::fs::remove_dir_all(workspace);
}
