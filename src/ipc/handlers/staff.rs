use crate::auth;
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn handle_staff_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match req.params.get("name").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing name", None),
    };
    let email = match req.params.get("email").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => return err(&req.id, "bad_params", "missing email", None),
    };
    let password = match req.params.get("password").and_then(|v| v.as_str()) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => return err(&req.id, "bad_params", "missing password", None),
    };
    let department = req
        .params
        .get("department")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string());
    let phone = req
        .params
        .get("phone")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string());

    let staff_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO staff(id, name, email, password_digest, department, phone, active, created_at)
         VALUES(?, ?, ?, ?, ?, ?, 1, ?)",
        (
            &staff_id,
            &name,
            &email,
            auth::hash_password(&password),
            &department,
            &phone,
            db::now_stamp(),
        ),
    ) {
        if is_unique_violation(&e) {
            return err(
                &req.id,
                "email_exists",
                "a staff member with this email already exists",
                Some(json!({ "email": email })),
            );
        }
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "staff" })),
        );
    }

    ok(&req.id, json!({ "staffId": staff_id, "name": name }))
}

fn handle_staff_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "staff": [] }));
    };

    let include_inactive = req
        .params
        .get("includeInactive")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let sql = if include_inactive {
        "SELECT id, name, email, department, phone, active, created_at
         FROM staff ORDER BY name"
    } else {
        "SELECT id, name, email, department, phone, active, created_at
         FROM staff WHERE active = 1 ORDER BY name"
    };

    let mut stmt = match conn.prepare(sql) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "email": row.get::<_, String>(2)?,
                "department": row.get::<_, Option<String>>(3)?,
                "phone": row.get::<_, Option<String>>(4)?,
                "active": row.get::<_, i64>(5)? != 0,
                "createdAt": row.get::<_, String>(6)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(staff) => ok(&req.id, json!({ "staff": staff })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_staff_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let staff_id = match req.params.get("staffId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing staffId", None),
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM staff WHERE id = ?", [&staff_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "staff member not found", None);
    }

    for (key, column) in [
        ("name", "name"),
        ("email", "email"),
        ("department", "department"),
        ("phone", "phone"),
    ] {
        let Some(value) = patch.get(key) else {
            continue;
        };
        let Some(text) = value.as_str() else {
            return err(&req.id, "bad_params", format!("{} must be a string", key), None);
        };
        if (key == "name" || key == "email") && text.trim().is_empty() {
            return err(&req.id, "bad_params", format!("{} must not be empty", key), None);
        }
        let sql = format!("UPDATE staff SET {} = ? WHERE id = ?", column);
        if let Err(e) = conn.execute(&sql, (text.trim(), &staff_id)) {
            if is_unique_violation(&e) {
                return err(
                    &req.id,
                    "email_exists",
                    "a staff member with this email already exists",
                    Some(json!({ "email": text.trim() })),
                );
            }
            return err(
                &req.id,
                "db_update_failed",
                e.to_string(),
                Some(json!({ "table": "staff" })),
            );
        }
    }

    if let Some(value) = patch.get("password") {
        let Some(password) = value.as_str().filter(|s| !s.is_empty()) else {
            return err(&req.id, "bad_params", "password must not be empty", None);
        };
        if let Err(e) = conn.execute(
            "UPDATE staff SET password_digest = ? WHERE id = ?",
            (auth::hash_password(password), &staff_id),
        ) {
            return err(
                &req.id,
                "db_update_failed",
                e.to_string(),
                Some(json!({ "table": "staff" })),
            );
        }
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_staff_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let staff_id = match req.params.get("staffId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing staffId", None),
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM staff WHERE id = ?", [&staff_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "staff member not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Soft delete: hide the member but keep the row so attendance, leave and
    // reassignment history stay linked. Their remaining slots are removed.
    if let Err(e) = tx.execute("UPDATE staff SET active = 0 WHERE id = ?", [&staff_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "staff" })),
        );
    }
    if let Err(e) = tx.execute(
        "DELETE FROM timetable_slots WHERE staff_id = ?",
        [&staff_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "timetable_slots" })),
        );
    }

    if let Err(e) = tx.commit() {
        return err(&req.id, "db_commit_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "staff.add" => Some(handle_staff_add(state, req)),
        "staff.list" => Some(handle_staff_list(state, req)),
        "staff.update" => Some(handle_staff_update(state, req)),
        "staff.delete" => Some(handle_staff_delete(state, req)),
        _ => None,
    }
}
