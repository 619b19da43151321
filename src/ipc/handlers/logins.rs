use crate::auth;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
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

fn invalid_credentials() -> HandlerErr {
    // One message for every mismatch; the caller learns nothing about which
    // part was wrong.
    HandlerErr {
        code: "invalid_credentials",
        message: "invalid credentials".to_string(),
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

fn record_login(
    conn: &Connection,
    staff_id: Option<&str>,
    admin_id: Option<&str>,
    session_type: &str,
) -> Result<String, HandlerErr> {
    let log_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO login_logs(id, staff_id, admin_id, session_type, login_time)
         VALUES(?, ?, ?, ?, ?)",
        (&log_id, staff_id, admin_id, session_type, db::now_stamp()),
    )
    .map_err(|e| HandlerErr {
        code: "db_insert_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "login_logs" })),
    })?;
    Ok(log_id)
}

fn staff_login(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let email = get_required_str(params, "email")?;
    let password = get_required_str(params, "password")?;

    let row: Option<(String, String, String, i64)> = conn
        .query_row(
            "SELECT id, name, password_digest, active FROM staff WHERE email = ?",
            [email.trim()],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()
        .map_err(db_err)?;

    let Some((staff_id, name, digest, active)) = row else {
        return Err(invalid_credentials());
    };
    if active == 0 || !auth::verify_password(&password, &digest) {
        return Err(invalid_credentials());
    }

    let log_id = record_login(conn, Some(&staff_id), None, "staff")?;
    Ok(json!({ "staffId": staff_id, "name": name, "logId": log_id }))
}

fn admin_login(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let username = get_required_str(params, "username")?;
    let password = get_required_str(params, "password")?;

    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT id, password_digest FROM admins WHERE username = ?",
            [username.trim()],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
        .map_err(db_err)?;

    let Some((admin_id, digest)) = row else {
        return Err(invalid_credentials());
    };
    if !auth::verify_password(&password, &digest) {
        return Err(invalid_credentials());
    }

    let log_id = record_login(conn, None, Some(&admin_id), "admin")?;
    Ok(json!({ "adminId": admin_id, "username": username.trim(), "logId": log_id }))
}

fn session_logout(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let log_id = get_required_str(params, "logId")?;

    let exists = conn
        .query_row("SELECT 1 FROM login_logs WHERE id = ?", [&log_id], |r| {
            r.get::<_, i64>(0)
        })
        .optional()
        .map_err(db_err)?
        .is_some();
    if !exists {
        return Err(HandlerErr {
            code: "not_found",
            message: "login log not found".to_string(),
            details: None,
        });
    }

    // Stamping twice is harmless; the first logout time wins.
    conn.execute(
        "UPDATE login_logs SET logout_time = ? WHERE id = ? AND logout_time IS NULL",
        (db::now_stamp(), &log_id),
    )
    .map_err(|e| HandlerErr {
        code: "db_update_failed",
        message: e.to_string(),
        details: Some(json!({ "table": "login_logs" })),
    })?;

    Ok(json!({ "ok": true }))
}

fn logins_list(conn: &Connection, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let limit = params
        .get("limit")
        .and_then(|v| v.as_u64())
        .unwrap_or(100)
        .min(1000) as i64;

    let mut stmt = conn
        .prepare(
            "SELECT l.id, l.session_type, l.login_time, l.logout_time,
                    l.staff_id, s.name, l.admin_id, a.username
             FROM login_logs l
             LEFT JOIN staff s ON l.staff_id = s.id
             LEFT JOIN admins a ON l.admin_id = a.id
             ORDER BY l.login_time DESC, l.rowid DESC
             LIMIT ?",
        )
        .map_err(db_err)?;
    let rows = stmt
        .query_map([limit], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "sessionType": r.get::<_, String>(1)?,
                "loginTime": r.get::<_, String>(2)?,
                "logoutTime": r.get::<_, Option<String>>(3)?,
                "staffId": r.get::<_, Option<String>>(4)?,
                "staffName": r.get::<_, Option<String>>(5)?,
                "adminId": r.get::<_, Option<String>>(6)?,
                "adminUsername": r.get::<_, Option<String>>(7)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(db_err)?;

    Ok(json!({ "logins": rows }))
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
        "staff.login" => Some(with_conn(state, req, staff_login)),
        "admin.login" => Some(with_conn(state, req, admin_login)),
        "session.logout" => Some(with_conn(state, req, session_logout)),
        "logins.list" => Some(with_conn(state, req, logins_list)),
        _ => None,
    }
}
