use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_dashboard_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let total_staff: i64 = match conn.query_row(
        "SELECT COUNT(*) FROM staff WHERE active = 1",
        [],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    // Timestamps are stored as UTC YYYY-MM-DD HH:MM:SS, so datetime('now')
    // compares directly.
    let logged_in_staff: i64 = match conn.query_row(
        "SELECT COUNT(DISTINCT staff_id) FROM login_logs
         WHERE session_type = 'staff'
           AND login_time > datetime('now', '-24 hours')
           AND logout_time IS NULL",
        [],
        |r| r.get(0),
    ) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let recent_logins = {
        let mut stmt = match conn.prepare(
            "SELECT s.name, l.login_time FROM login_logs l
             JOIN staff s ON l.staff_id = s.id
             WHERE l.session_type = 'staff'
             ORDER BY l.login_time DESC, l.rowid DESC
             LIMIT 10",
        ) {
            Ok(s) => s,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        match stmt
            .query_map([], |r| {
                Ok(json!({
                    "staffName": r.get::<_, String>(0)?,
                    "loginTime": r.get::<_, String>(1)?
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };

    let pending_leaves = {
        let mut stmt = match conn.prepare(
            "SELECT l.id, l.staff_id, s.name, l.leave_date, l.reason, l.created_at
             FROM leave_requests l
             JOIN staff s ON l.staff_id = s.id
             WHERE l.status = 'pending'
             ORDER BY l.created_at DESC, l.rowid DESC",
        ) {
            Ok(s) => s,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        };
        match stmt
            .query_map([], |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "staffId": r.get::<_, String>(1)?,
                    "staffName": r.get::<_, String>(2)?,
                    "leaveDate": r.get::<_, String>(3)?,
                    "reason": r.get::<_, Option<String>>(4)?,
                    "createdAt": r.get::<_, String>(5)?
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        {
            Ok(v) => v,
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    };

    ok(
        &req.id,
        json!({
            "totalStaff": total_staff,
            "loggedInStaff": logged_in_staff,
            "recentLogins": recent_logins,
            "pendingLeaves": pending_leaves
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.open" => Some(handle_dashboard_open(state, req)),
        _ => None,
    }
}
