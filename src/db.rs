use anyhow::Context;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

pub const DB_FILE_NAME: &str = "roster.sqlite3";

pub fn db_path(workspace: &Path) -> PathBuf {
    workspace.join(DB_FILE_NAME)
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace.to_string_lossy()
        )
    })?;
    let conn = Connection::open(db_path(workspace))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            course_name TEXT NOT NULL,
            instructor_name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS enrollments(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            term TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            UNIQUE(student_id, course_id, term)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_term_course ON enrollments(term, course_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_enrollments_student ON enrollments(student_id)",
        [],
    )?;

    // Flattened enrollment rows for the term/course/student dropdowns.
    conn.execute(
        "CREATE VIEW IF NOT EXISTS enrollment_view AS
         SELECT
           e.id AS id,
           e.term AS term,
           e.course_id AS course_id,
           c.course_name AS course_name,
           e.student_id AS student_id,
           s.name AS student_name
         FROM enrollments e
         JOIN courses c ON c.id = e.course_id
         JOIN students s ON s.id = e.student_id",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance(
            enrollment_id TEXT NOT NULL,
            date TEXT NOT NULL,
            PRIMARY KEY(enrollment_id, date),
            FOREIGN KEY(enrollment_id) REFERENCES enrollments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_date ON attendance(date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            assignment_id TEXT NOT NULL,
            enrollment_id TEXT NOT NULL,
            score INTEGER,
            PRIMARY KEY(assignment_id, enrollment_id),
            FOREIGN KEY(assignment_id) REFERENCES assignments(id),
            FOREIGN KEY(enrollment_id) REFERENCES enrollments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_enrollment ON grades(enrollment_id)",
        [],
    )?;

    Ok(conn)
}
