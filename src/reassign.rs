use anyhow::anyhow;
use chrono::{Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use rusqlite::Connection;
use uuid::Uuid;

pub const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Accepts any casing of a full weekday name and returns the canonical form
/// stored in `timetable_slots.day`.
pub fn canonical_weekday(raw: &str) -> Option<&'static str> {
    let t = raw.trim();
    WEEKDAYS
        .iter()
        .find(|d| d.eq_ignore_ascii_case(t))
        .copied()
}

pub fn weekday_of(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

pub fn parse_leave_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

pub fn parse_slot_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").ok()
}

/// Half-open `[start, end)` overlap: two intervals conflict unless one
/// entirely precedes the other, so back-to-back slots never clash.
pub fn intervals_overlap(
    a_start: NaiveTime,
    a_end: NaiveTime,
    b_start: NaiveTime,
    b_end: NaiveTime,
) -> bool {
    a_start < b_end && b_start < a_end
}

#[derive(Debug, Clone)]
pub struct FilledSlot {
    pub slot_id: String,
    pub substitute_id: String,
    pub substitute_name: String,
    pub reassignment_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReassignmentSummary {
    pub filled: Vec<FilledSlot>,
    pub unfilled: Vec<String>,
}

/// Covers every slot the absent member owns on the leave date's weekday.
///
/// Candidates are re-queried per slot: a substitute picked for one slot owns
/// it from that point on, which disqualifies them from later overlapping
/// slots in the same run. Slots with no surviving candidate stay with the
/// absent owner and are reported, not failed.
pub fn reassign_for_leave(
    conn: &Connection,
    original_staff_id: &str,
    leave_date: &str,
) -> anyhow::Result<ReassignmentSummary> {
    let date = parse_leave_date(leave_date)
        .ok_or_else(|| anyhow!("leave date must be YYYY-MM-DD: {}", leave_date))?;
    let day = weekday_of(date);

    let mut stmt = conn.prepare(
        "SELECT id, start_time, end_time
         FROM timetable_slots
         WHERE staff_id = ? AND day = ?
         ORDER BY rowid",
    )?;
    let slots = stmt
        .query_map((original_staff_id, day), |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut summary = ReassignmentSummary::default();
    for (slot_id, start_raw, end_raw) in slots {
        let start = parse_slot_time(&start_raw)
            .ok_or_else(|| anyhow!("slot {} has malformed start_time", slot_id))?;
        let end = parse_slot_time(&end_raw)
            .ok_or_else(|| anyhow!("slot {} has malformed end_time", slot_id))?;

        match find_substitute(conn, original_staff_id, leave_date, day, start, end)? {
            Some((substitute_id, substitute_name)) => {
                let reassignment_id = Uuid::new_v4().to_string();
                conn.execute(
                    "INSERT INTO reassignments(
                        id, original_staff_id, substitute_staff_id,
                        timetable_id, leave_date, created_at)
                     VALUES(?, ?, ?, ?, ?, ?)",
                    (
                        &reassignment_id,
                        original_staff_id,
                        &substitute_id,
                        &slot_id,
                        leave_date,
                        Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
                    ),
                )?;
                conn.execute(
                    "UPDATE timetable_slots SET staff_id = ? WHERE id = ?",
                    (&substitute_id, &slot_id),
                )?;
                summary.filled.push(FilledSlot {
                    slot_id,
                    substitute_id,
                    substitute_name,
                    reassignment_id,
                });
            }
            None => summary.unfilled.push(slot_id),
        }
    }

    Ok(summary)
}

/// First active candidate in store order who is not the absent member, has no
/// approved leave on the date, and owns nothing overlapping the vacated slot.
fn find_substitute(
    conn: &Connection,
    original_staff_id: &str,
    leave_date: &str,
    day: &str,
    start: NaiveTime,
    end: NaiveTime,
) -> anyhow::Result<Option<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT s.id, s.name
         FROM staff s
         WHERE s.id != ? AND s.active = 1
           AND s.id NOT IN (
             SELECT staff_id FROM leave_requests
             WHERE leave_date = ? AND status = 'approved'
           )
         ORDER BY s.rowid",
    )?;
    let candidates = stmt
        .query_map((original_staff_id, leave_date), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for (candidate_id, candidate_name) in candidates {
        if !has_conflicting_slot(conn, &candidate_id, day, start, end)? {
            return Ok(Some((candidate_id, candidate_name)));
        }
    }
    Ok(None)
}

fn has_conflicting_slot(
    conn: &Connection,
    staff_id: &str,
    day: &str,
    start: NaiveTime,
    end: NaiveTime,
) -> anyhow::Result<bool> {
    let mut stmt = conn.prepare(
        "SELECT start_time, end_time FROM timetable_slots WHERE staff_id = ? AND day = ?",
    )?;
    let ranges = stmt
        .query_map((staff_id, day), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for (start_raw, end_raw) in ranges {
        let (Some(s), Some(e)) = (parse_slot_time(&start_raw), parse_slot_time(&end_raw)) else {
            continue;
        };
        if intervals_overlap(start, end, s, e) {
            return Ok(true);
        }
    }
    Ok(false)
}
