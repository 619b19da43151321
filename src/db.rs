use chrono::Utc;
use rusqlite::Connection;
use std::path::Path;
use uuid::Uuid;

use crate::auth;

/// UTC timestamp in the `YYYY-MM-DD HH:MM:SS` form SQLite's datetime()
/// comparisons understand.
pub fn now_stamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("faculty.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS admins(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            password_digest TEXT NOT NULL,
            email TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS staff(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            password_digest TEXT NOT NULL,
            department TEXT,
            phone TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_staff_active ON staff(active)",
        [],
    )?;

    // Existing workspaces may predate the department column. Add if needed.
    ensure_staff_department(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS timetable_slots(
            id TEXT PRIMARY KEY,
            staff_id TEXT NOT NULL,
            day TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            location TEXT,
            class_name TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(staff_id) REFERENCES staff(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_timetable_slots_staff ON timetable_slots(staff_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_timetable_slots_day ON timetable_slots(day, start_time)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            id TEXT PRIMARY KEY,
            staff_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            reason TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(staff_id) REFERENCES staff(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_staff ON attendance(staff_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS leave_requests(
            id TEXT PRIMARY KEY,
            staff_id TEXT NOT NULL,
            leave_date TEXT NOT NULL,
            reason TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            created_at TEXT NOT NULL,
            FOREIGN KEY(staff_id) REFERENCES staff(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_leave_requests_staff ON leave_requests(staff_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_leave_requests_date_status
         ON leave_requests(leave_date, status)",
        [],
    )?;

    // No FK on timetable_id: audit rows are immutable and must survive the
    // slot deletions performed by staff soft-delete.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS reassignments(
            id TEXT PRIMARY KEY,
            original_staff_id TEXT NOT NULL,
            substitute_staff_id TEXT NOT NULL,
            timetable_id TEXT NOT NULL,
            leave_date TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(original_staff_id) REFERENCES staff(id),
            FOREIGN KEY(substitute_staff_id) REFERENCES staff(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_reassignments_original
         ON reassignments(original_staff_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_reassignments_substitute
         ON reassignments(substitute_staff_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_reassignments_slot ON reassignments(timetable_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS login_logs(
            id TEXT PRIMARY KEY,
            staff_id TEXT,
            admin_id TEXT,
            session_type TEXT NOT NULL,
            login_time TEXT NOT NULL,
            logout_time TEXT,
            FOREIGN KEY(staff_id) REFERENCES staff(id),
            FOREIGN KEY(admin_id) REFERENCES admins(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_login_logs_staff ON login_logs(staff_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_login_logs_time ON login_logs(login_time)",
        [],
    )?;
    ensure_login_logs_logout_time(&conn)?;

    seed_default_admin(&conn)?;

    Ok(conn)
}

fn ensure_staff_department(conn: &Connection) -> anyhow::Result<()> {
    // If the column already exists, we're done.
    if table_has_column(conn, "staff", "department")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE staff ADD COLUMN department TEXT", [])?;
    Ok(())
}

fn ensure_login_logs_logout_time(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "login_logs", "logout_time")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE login_logs ADD COLUMN logout_time TEXT", [])?;
    Ok(())
}

/// First open of a workspace gets the stock admin account, matching the
/// behavior admins expect from a fresh install.
fn seed_default_admin(conn: &Connection) -> anyhow::Result<()> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM admins", [], |r| r.get(0))?;
    if count > 0 {
        return Ok(());
    }
    conn.execute(
        "INSERT INTO admins(id, username, password_digest, email, created_at)
         VALUES(?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            "admin",
            auth::hash_password("admin123"),
            "admin@college.edu",
            now_stamp(),
        ),
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
