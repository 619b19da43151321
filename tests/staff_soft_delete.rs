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

fn request_ok(
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
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn soft_delete_hides_staff_removes_slots_and_keeps_history() {
    let workspace = temp_dir("faculty-soft-delete");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let alice = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "staff.add",
        json!({ "name": "Alice Verma", "email": "alice@college.edu", "password": "pw" }),
    )
    .get("staffId")
    .and_then(|v| v.as_str())
    .expect("staffId")
    .to_string();
    let bela = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "staff.add",
        json!({ "name": "Bela Nagy", "email": "bela@college.edu", "password": "pw" }),
    )
    .get("staffId")
    .and_then(|v| v.as_str())
    .expect("staffId")
    .to_string();

    // Alice teaches Monday mornings; Bela teaches Monday afternoons.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "timetable.create",
        json!({ "staffId": alice, "day": "Monday", "startTime": "09:00", "endTime": "11:00" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "timetable.create",
        json!({ "staffId": bela, "day": "Monday", "startTime": "13:00", "endTime": "15:00" }),
    );

    // Bela's approved leave hands her slot to Alice; the audit row must
    // outlive Alice's later soft delete.
    let bela_leave = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "leave.submit",
        json!({ "staffId": bela, "leaveDate": "2025-09-01" }),
    )
    .get("leaveRequestId")
    .and_then(|v| v.as_str())
    .expect("leaveRequestId")
    .to_string();
    let approved = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "leave.approve",
        json!({ "leaveRequestId": bela_leave }),
    );
    assert_eq!(
        approved
            .get("reassigned")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );

    // History rows for Alice before the delete.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "attendance.mark",
        json!({ "staffId": alice, "date": "2025-08-25", "status": "present" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "leave.submit",
        json!({ "staffId": alice, "leaveDate": "2025-10-06" }),
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "staff.delete",
        json!({ "staffId": alice }),
    );

    // Hidden from the default list, visible as inactive.
    let active = request_ok(&mut stdin, &mut reader, "11", "staff.list", json!({}));
    let names: Vec<String> = active
        .get("staff")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("staff")
        .iter()
        .filter_map(|s| s.get("name").and_then(|v| v.as_str()).map(String::from))
        .collect();
    assert_eq!(names, vec!["Bela Nagy".to_string()]);
    let everyone = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "staff.list",
        json!({ "includeInactive": true }),
    );
    let alice_row = everyone
        .get("staff")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("staff")
        .into_iter()
        .find(|s| s.get("id").and_then(|v| v.as_str()) == Some(alice.as_str()))
        .expect("alice still listed when inactive included");
    assert_eq!(alice_row.get("active").and_then(|v| v.as_bool()), Some(false));

    // Every slot she owned is gone, including the one she was covering.
    let slots = request_ok(&mut stdin, &mut reader, "13", "timetable.list", json!({}));
    assert_eq!(
        slots.get("slots").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );

    // Attendance, leave and audit history survive.
    let attendance = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "attendance.list",
        json!({ "staffId": alice }),
    );
    assert_eq!(
        attendance
            .get("attendance")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );
    let leaves = request_ok(&mut stdin, &mut reader, "15", "leave.list", json!({}));
    assert!(leaves
        .get("leaves")
        .and_then(|v| v.as_array())
        .cloned()
        .expect("leaves")
        .iter()
        .any(|l| l.get("staffId").and_then(|v| v.as_str()) == Some(alice.as_str())));
    let audit = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "reassignments.list",
        json!({}),
    );
    assert_eq!(
        audit
            .get("reassignments")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );

    // An inactive member is never picked as a substitute: Bela is the only
    // other staff, so her next approved leave finds nobody.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "17",
        "timetable.create",
        json!({ "staffId": bela, "day": "Monday", "startTime": "09:00", "endTime": "10:00" }),
    );
    let bela_leave2 = request_ok(
        &mut stdin,
        &mut reader,
        "18",
        "leave.submit",
        json!({ "staffId": bela, "leaveDate": "2025-09-08" }),
    )
    .get("leaveRequestId")
    .and_then(|v| v.as_str())
    .expect("leaveRequestId")
    .to_string();
    let approved2 = request_ok(
        &mut stdin,
        &mut reader,
        "19",
        "leave.approve",
        json!({ "leaveRequestId": bela_leave2 }),
    );
    assert_eq!(
        approved2
            .get("reassigned")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );
    assert_eq!(
        approved2
            .get("unfilled")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );

    let _ = std::fs::remove_dir_all(workspace);
}
