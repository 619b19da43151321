use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::reassign;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

struct HandlerErr {
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl HandlerErr {
    fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr {
            code: "bad_params",
            message: format!("missing {}", key),
            details: None,
        })
}

fn require_staff(conn: &Connection, staff_id: &str) -> Result<(), HandlerErr> {
    let exists = conn
        .query_row("SELECT 1 FROM staff WHERE id = ?", [staff_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?
        .is_some();
    if !exists {
        return Err(HandlerErr {
            code: "not_found",
            message: "staff member not found".to_string(),
            details: None,
        });
    }
    Ok(())
}

fn require_date(raw: &str) -> Result<String, HandlerErr> {
    let Some(date) = reassign::parse_leave_date(raw) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "date must be YYYY-MM-DD".to_string(),
            details: None,
        });
    };
    Ok(date.format("%Y-%m-%d").to_string())
}

fn attendance_mark(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let staff_id = get_required_str(params, "staffId")?;
    let date = require_date(&get_required_str(params, "date")?)?;
    let status = get_required_str(params, "status")?.trim().to_string();
    if status.is_empty() {
        return Err(HandlerErr {
            code: "bad_params",
            message: "status must not be empty".to_string(),
            details: None,
        });
    }
    let reason = params
        .get("reason")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string());

    require_staff(conn, &staff_id)?;

    // A "leave" status is a request, not a record: it goes through the
    // pending/approved workflow instead of straight into attendance.
    if status == "leave" {
        let leave_request_id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO leave_requests(id, staff_id, leave_date, reason, status, created_at)
             VALUES(?, ?, ?, ?, 'pending', ?)",
            (&leave_request_id, &staff_id, &date, &reason, db::now_stamp()),
        )
        .map_err(|e| HandlerErr {
            code: "db_insert_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "leave_requests" })),
        })?;
        return Ok(json!({
            "kind": "leaveRequest",
            "leaveRequestId": leave_request_id
        }));
    }

    let attendance_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO attendance(id, staff_id, date, status, reason, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &attendance_id,
            &staff_id,
            &date,
            &status,
            &reason,
            db::now_stamp(),
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "attendance" })),
    })?;

    Ok(json!({ "kind": "attendance", "attendanceId": attendance_id }))
}

fn attendance_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let staff_id = params
        .get("staffId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    let date = match params.get("date").and_then(|v| v.as_str()) {
        Some(raw) => Some(require_date(raw)?),
        None => None,
    };

    let mut sql = String::from(
        "SELECT a.id, a.staff_id, s.name, a.date, a.status, a.reason, a.created_at
         FROM attendance a
         JOIN staff s ON a.staff_id = s.id",
    );
    let mut clauses: Vec<&str> = Vec::new();
    let mut args: Vec<String> = Vec::new();
    if let Some(sid) = &staff_id {
        clauses.push("a.staff_id = ?");
        args.push(sid.clone());
    }
    if let Some(d) = &date {
        clauses.push("a.date = ?");
        args.push(d.clone());
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY a.date DESC, a.created_at DESC");

    let mut stmt = conn.prepare(&sql).map_err(|e| HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
    })?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(args.iter()), |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "staffId": r.get::<_, String>(1)?,
                "staffName": r.get::<_, String>(2)?,
                "date": r.get::<_, String>(3)?,
                "status": r.get::<_, String>(4)?,
                "reason": r.get::<_, Option<String>>(5)?,
                "createdAt": r.get::<_, String>(6)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(|e| HandlerErr {
            code: "db_query_failed",
            message: e.to_string(),
            details: None,
        })?;

    Ok(json!({ "attendance": rows }))
}

fn handle_attendance_mark(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_mark(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

fn handle_attendance_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match attendance_list(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.mark" => Some(handle_attendance_mark(state, req)),
        "attendance.list" => Some(handle_attendance_list(state, req)),
        _ => None,
    }
}
