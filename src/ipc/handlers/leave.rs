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

fn db_err(e: rusqlite::Error) -> HandlerErr {
    HandlerErr {
        code: "db_query_failed",
        message: e.to_string(),
        details: None,
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

fn leave_submit(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let staff_id = get_required_str(params, "staffId")?;
    let leave_date_raw = get_required_str(params, "leaveDate")?;
    let Some(leave_date) = reassign::parse_leave_date(&leave_date_raw) else {
        return Err(HandlerErr {
            code: "bad_params",
            message: "leaveDate must be YYYY-MM-DD".to_string(),
            details: None,
        });
    };
    let reason = params
        .get("reason")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string());

    let exists = conn
        .query_row("SELECT 1 FROM staff WHERE id = ?", [&staff_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(db_err)?
        .is_some();
    if !exists {
        return Err(HandlerErr {
            code: "not_found",
            message: "staff member not found".to_string(),
            details: None,
        });
    }

    let leave_request_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO leave_requests(id, staff_id, leave_date, reason, status, created_at)
         VALUES(?, ?, ?, ?, 'pending', ?)",
        (
            &leave_request_id,
            &staff_id,
            leave_date.format("%Y-%m-%d").to_string(),
            &reason,
            db::now_stamp(),
        ),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "leave_requests" })),
    })?;

    Ok(json!({ "leaveRequestId": leave_request_id, "status": "pending" }))
}

fn leave_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let status = params
        .get("status")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());
    if let Some(s) = &status {
        if !matches!(s.as_str(), "pending" | "approved" | "rejected") {
            return Err(HandlerErr {
                code: "bad_params",
                message: "status must be pending, approved or rejected".to_string(),
                details: None,
            });
        }
    }

    let base = "SELECT l.id, l.staff_id, s.name, l.leave_date, l.reason, l.status, l.created_at
                FROM leave_requests l
                JOIN staff s ON l.staff_id = s.id";
    let sql = match &status {
        Some(_) => format!("{} WHERE l.status = ? ORDER BY l.created_at DESC, l.rowid DESC", base),
        None => format!("{} ORDER BY l.created_at DESC, l.rowid DESC", base),
    };

    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let map_row = |r: &rusqlite::Row<'_>| -> rusqlite::Result<serde_json::Value> {
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "staffId": r.get::<_, String>(1)?,
            "staffName": r.get::<_, String>(2)?,
            "leaveDate": r.get::<_, String>(3)?,
            "reason": r.get::<_, Option<String>>(4)?,
            "status": r.get::<_, String>(5)?,
            "createdAt": r.get::<_, String>(6)?
        }))
    };
    let rows = match &status {
        Some(s) => stmt
            .query_map([s], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
        None => stmt
            .query_map([], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
    }
    .map_err(db_err)?;

    Ok(json!({ "leaves": rows }))
}

fn fetch_request(
    conn: &Connection,
    leave_request_id: &str,
) -> Result<(String, String, String), HandlerErr> {
    conn.query_row(
        "SELECT staff_id, leave_date, status FROM leave_requests WHERE id = ?",
        [leave_request_id],
        |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )
    .optional()
    .map_err(db_err)?
    .ok_or_else(|| HandlerErr {
        code: "not_found",
        message: "leave request not found".to_string(),
        details: None,
    })
}

fn require_pending(status: &str) -> Result<(), HandlerErr> {
    if status != "pending" {
        return Err(HandlerErr {
            code: "invalid_status",
            message: format!("leave request is already {}", status),
            details: None,
        });
    }
    Ok(())
}

fn leave_approve(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let leave_request_id = get_required_str(params, "leaveRequestId")?;
    let (staff_id, leave_date, status) = fetch_request(conn, &leave_request_id)?;
    require_pending(&status)?;

    conn.execute(
        "UPDATE leave_requests SET status = 'approved' WHERE id = ?",
        [&leave_request_id],
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "leave_requests" })),
    })?;

    // Approval is what vacates the slots, so cover them now. Unfilled slots
    // are reported back rather than treated as an error.
    let summary =
        reassign::reassign_for_leave(conn, &staff_id, &leave_date).map_err(|e| HandlerErr {
            code: "db_update_failed",
            message: e.to_string(),
            details: Some(json!({ "table": "reassignments" })),
        })?;

    let filled: Vec<serde_json::Value> = summary
        .filled
        .iter()
        .map(|f| {
            json!({
                "slotId": f.slot_id,
                "substituteStaffId": f.substitute_id,
                "substituteName": f.substitute_name,
                "reassignmentId": f.reassignment_id
            })
        })
        .collect();

    Ok(json!({
        "status": "approved",
        "reassigned": filled,
        "unfilled": summary.unfilled
    }))
}

fn leave_reject(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let leave_request_id = get_required_str(params, "leaveRequestId")?;
    let (_, _, status) = fetch_request(conn, &leave_request_id)?;
    require_pending(&status)?;

    conn.execute(
        "UPDATE leave_requests SET status = 'rejected' WHERE id = ?",
        [&leave_request_id],
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "leave_requests" })),
    })?;

    Ok(json!({ "status": "rejected" }))
}

fn reassignments_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let staff_id = params
        .get("staffId")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let base = "SELECT r.id, r.original_staff_id, o.name, r.substitute_staff_id, n.name,
                       r.timetable_id, r.leave_date, r.created_at
                FROM reassignments r
                JOIN staff o ON r.original_staff_id = o.id
                JOIN staff n ON r.substitute_staff_id = n.id";
    let sql = match &staff_id {
        Some(_) => format!(
            "{} WHERE r.original_staff_id = ? ORDER BY r.created_at DESC, r.rowid DESC",
            base
        ),
        None => format!("{} ORDER BY r.created_at DESC, r.rowid DESC", base),
    };

    let mut stmt = conn.prepare(&sql).map_err(db_err)?;
    let map_row = |r: &rusqlite::Row<'_>| -> rusqlite::Result<serde_json::Value> {
        Ok(json!({
            "id": r.get::<_, String>(0)?,
            "originalStaffId": r.get::<_, String>(1)?,
            "originalStaffName": r.get::<_, String>(2)?,
            "substituteStaffId": r.get::<_, String>(3)?,
            "substituteStaffName": r.get::<_, String>(4)?,
            "timetableId": r.get::<_, String>(5)?,
            "leaveDate": r.get::<_, String>(6)?,
            "createdAt": r.get::<_, String>(7)?
        }))
    };
    let rows = match &staff_id {
        Some(sid) => stmt
            .query_map([sid], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
        None => stmt
            .query_map([], map_row)
            .and_then(|it| it.collect::<Result<Vec<_>, _>>()),
    }
    .map_err(db_err)?;

    Ok(json!({ "reassignments": rows }))
}

fn with_conn(
    state: &mut AppState,
    req: &Request,
    f: impl Fn(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "leave.submit" => Some(with_conn(state, req, leave_submit)),
        "leave.list" => Some(with_conn(state, req, leave_list)),
        "leave.approve" => Some(with_conn(state, req, leave_approve)),
        "leave.reject" => Some(with_conn(state, req, leave_reject)),
        "reassignments.list" => Some(with_conn(state, req, reassignments_list)),
        _ => None,
    }
}
