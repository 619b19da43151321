use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::reassign;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_timetable_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let staff_id = match req.params.get("staffId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing staffId", None),
    };
    let day_raw = match req.params.get("day").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing day", None),
    };
    let start_raw = match req.params.get("startTime").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing startTime", None),
    };
    let end_raw = match req.params.get("endTime").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing endTime", None),
    };
    let location = req
        .params
        .get("location")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string());
    let class_name = req
        .params
        .get("className")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string());

    let Some(day) = reassign::canonical_weekday(&day_raw) else {
        return err(&req.id, "bad_params", "day must be a weekday name", None);
    };
    let Some(start) = reassign::parse_slot_time(&start_raw) else {
        return err(&req.id, "bad_params", "startTime must be HH:MM", None);
    };
    let Some(end) = reassign::parse_slot_time(&end_raw) else {
        return err(&req.id, "bad_params", "endTime must be HH:MM", None);
    };
    if start >= end {
        return err(&req.id, "bad_params", "startTime must precede endTime", None);
    }

    let active: Option<i64> = match conn
        .query_row("SELECT active FROM staff WHERE id = ?", [&staff_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    match active {
        None => return err(&req.id, "not_found", "staff member not found", None),
        Some(0) => {
            return err(
                &req.id,
                "bad_params",
                "cannot schedule an inactive staff member",
                None,
            )
        }
        Some(_) => {}
    }

    let slot_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO timetable_slots(
            id, staff_id, day, start_time, end_time, location, class_name, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &slot_id,
            &staff_id,
            day,
            start.format("%H:%M").to_string(),
            end.format("%H:%M").to_string(),
            &location,
            &class_name,
            db::now_stamp(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "timetable_slots" })),
        );
    }

    ok(&req.id, json!({ "slotId": slot_id }))
}

fn handle_timetable_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "slots": [] }));
    };

    let mut stmt = match conn.prepare(
        "SELECT t.id, t.staff_id, s.name, t.day, t.start_time, t.end_time,
                t.location, t.class_name
         FROM timetable_slots t
         JOIN staff s ON t.staff_id = s.id
         ORDER BY t.day, t.start_time",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "staffId": r.get::<_, String>(1)?,
                "staffName": r.get::<_, String>(2)?,
                "day": r.get::<_, String>(3)?,
                "startTime": r.get::<_, String>(4)?,
                "endTime": r.get::<_, String>(5)?,
                "location": r.get::<_, Option<String>>(6)?,
                "className": r.get::<_, Option<String>>(7)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(slots) => ok(&req.id, json!({ "slots": slots })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_timetable_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let slot_id = match req.params.get("slotId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing slotId", None),
    };
    let Some(patch) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "missing patch", None);
    };

    let current: Option<(String, String, String, Option<String>, Option<String>)> = match conn
        .query_row(
            "SELECT day, start_time, end_time, location, class_name
             FROM timetable_slots WHERE id = ?",
            [&slot_id],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                ))
            },
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((mut day, mut start_raw, mut end_raw, mut location, mut class_name)) = current else {
        return err(&req.id, "not_found", "timetable slot not found", None);
    };

    if let Some(v) = patch.get("day") {
        let Some(text) = v.as_str() else {
            return err(&req.id, "bad_params", "day must be a string", None);
        };
        let Some(canonical) = reassign::canonical_weekday(text) else {
            return err(&req.id, "bad_params", "day must be a weekday name", None);
        };
        day = canonical.to_string();
    }
    if let Some(v) = patch.get("startTime") {
        let Some(t) = v.as_str().and_then(reassign::parse_slot_time) else {
            return err(&req.id, "bad_params", "startTime must be HH:MM", None);
        };
        start_raw = t.format("%H:%M").to_string();
    }
    if let Some(v) = patch.get("endTime") {
        let Some(t) = v.as_str().and_then(reassign::parse_slot_time) else {
            return err(&req.id, "bad_params", "endTime must be HH:MM", None);
        };
        end_raw = t.format("%H:%M").to_string();
    }
    if let Some(v) = patch.get("location") {
        location = v.as_str().map(|s| s.trim().to_string());
    }
    if let Some(v) = patch.get("className") {
        class_name = v.as_str().map(|s| s.trim().to_string());
    }

    if start_raw >= end_raw {
        return err(&req.id, "bad_params", "startTime must precede endTime", None);
    }

    if let Err(e) = conn.execute(
        "UPDATE timetable_slots
         SET day = ?, start_time = ?, end_time = ?, location = ?, class_name = ?
         WHERE id = ?",
        (&day, &start_raw, &end_raw, &location, &class_name, &slot_id),
    ) {
        return err(
            &req.id,
            "db_update_failed",
            e.to_string(),
            Some(json!({ "table": "timetable_slots" })),
        );
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_timetable_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let slot_id = match req.params.get("slotId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing slotId", None),
    };

    let affected = match conn.execute("DELETE FROM timetable_slots WHERE id = ?", [&slot_id]) {
        Ok(n) => n,
        Err(e) => {
            return err(
                &req.id,
                "db_delete_failed",
                e.to_string(),
                Some(json!({ "table": "timetable_slots" })),
            )
        }
    };
    if affected == 0 {
        return err(&req.id, "not_found", "timetable slot not found", None);
    }

    ok(&req.id, json!({ "ok": true }))
}

fn handle_timetable_staff_schedule(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let staff_id = match req.params.get("staffId").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing staffId", None),
    };

    // EXISTS rather than a join so a slot covered more than once still
    // produces a single row.
    let mut stmt = match conn.prepare(
        "SELECT t.id, t.day, t.start_time, t.end_time, t.location, t.class_name,
                CASE WHEN EXISTS(
                    SELECT 1 FROM reassignments r WHERE r.timetable_id = t.id
                ) THEN 'Reassigned' ELSE 'Original' END
         FROM timetable_slots t
         WHERE t.staff_id = ?
         ORDER BY t.day, t.start_time",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&staff_id], |r| {
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "day": r.get::<_, String>(1)?,
                "startTime": r.get::<_, String>(2)?,
                "endTime": r.get::<_, String>(3)?,
                "location": r.get::<_, Option<String>>(4)?,
                "className": r.get::<_, Option<String>>(5)?,
                "assignmentType": r.get::<_, String>(6)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(slots) => ok(&req.id, json!({ "slots": slots })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "timetable.create" => Some(handle_timetable_create(state, req)),
        "timetable.list" => Some(handle_timetable_list(state, req)),
        "timetable.update" => Some(handle_timetable_update(state, req)),
        "timetable.delete" => Some(handle_timetable_delete(state, req)),
        "timetable.staffSchedule" => Some(handle_timetable_staff_schedule(state, req)),
        _ => None,
    }
}
