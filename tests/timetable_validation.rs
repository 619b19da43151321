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

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = raw_request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn slot_creation_validates_day_times_and_owner() {
    let workspace = temp_dir("faculty-timetable-validation");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let staff_id = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "staff.add",
        json!({ "name": "Asha Rao", "email": "asha@college.edu", "password": "pw" }),
    )
    .get("staffId")
    .and_then(|v| v.as_str())
    .expect("staffId")
    .to_string();

    let bad_day = raw_request(
        &mut stdin,
        &mut reader,
        "3",
        "timetable.create",
        json!({ "staffId": staff_id, "day": "Mondy", "startTime": "09:00", "endTime": "10:00" }),
    );
    assert_eq!(error_code(&bad_day), Some("bad_params"));

    let bad_time = raw_request(
        &mut stdin,
        &mut reader,
        "4",
        "timetable.create",
        json!({ "staffId": staff_id, "day": "Monday", "startTime": "9am", "endTime": "10:00" }),
    );
    assert_eq!(error_code(&bad_time), Some("bad_params"));

    let inverted = raw_request(
        &mut stdin,
        &mut reader,
        "5",
        "timetable.create",
        json!({ "staffId": staff_id, "day": "Monday", "startTime": "11:00", "endTime": "09:00" }),
    );
    assert_eq!(error_code(&inverted), Some("bad_params"));

    let ghost = raw_request(
        &mut stdin,
        &mut reader,
        "6",
        "timetable.create",
        json!({ "staffId": "no-such-staff", "day": "Monday", "startTime": "09:00", "endTime": "10:00" }),
    );
    assert_eq!(error_code(&ghost), Some("not_found"));

    // Lowercase day and padded times come out canonical.
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "timetable.create",
        json!({ "staffId": staff_id, "day": "monday", "startTime": "09:00", "endTime": "10:00" }),
    );
    let slot_id = created
        .get("slotId")
        .and_then(|v| v.as_str())
        .expect("slotId")
        .to_string();
    let listed = request_ok(&mut stdin, &mut reader, "8", "timetable.list", json!({}));
    let rows = listed
        .get("slots")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("slots");
    assert_eq!(rows[0].get("day").and_then(|v| v.as_str()), Some("Monday"));

    // Patching must keep the range ordered.
    let bad_patch = raw_request(
        &mut stdin,
        &mut reader,
        "9",
        "timetable.update",
        json!({ "slotId": slot_id, "patch": { "endTime": "08:00" } }),
    );
    assert_eq!(error_code(&bad_patch), Some("bad_params"));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "timetable.update",
        json!({ "slotId": slot_id, "patch": { "endTime": "11:00", "location": "B-204" } }),
    );
    let listed = request_ok(&mut stdin, &mut reader, "11", "timetable.list", json!({}));
    let rows = listed
        .get("slots")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("slots");
    assert_eq!(
        rows[0].get("endTime").and_then(|v| v.as_str()),
        Some("11:00")
    );
    assert_eq!(
        rows[0].get("location").and_then(|v| v.as_str()),
        Some("B-204")
    );

    // An untouched slot reads as Original in the owner's schedule.
    let schedule = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "timetable.staffSchedule",
        json!({ "staffId": staff_id }),
    );
    let srows = schedule
        .get("slots")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("slots");
    assert_eq!(
        srows[0].get("assignmentType").and_then(|v| v.as_str()),
        Some("Original")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "timetable.delete",
        json!({ "slotId": slot_id }),
    );
    let gone = raw_request(
        &mut stdin,
        &mut reader,
        "14",
        "timetable.delete",
        json!({ "slotId": slot_id }),
    );
    assert_eq!(error_code(&gone), Some("not_found"));

    // Scheduling an inactive member is refused.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "staff.delete",
        json!({ "staffId": staff_id }),
    );
    let inactive = raw_request(
        &mut stdin,
        &mut reader,
        "16",
        "timetable.create",
        json!({ "staffId": staff_id, "day": "Monday", "startTime": "09:00", "endTime": "10:00" }),
    );
    assert_eq!(error_code(&inactive), Some("bad_params"));

    let _ = std::fs::remove_dir_all(workspace);
}
