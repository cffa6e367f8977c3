use crate::cascade::{self, FilterSelection};
use crate::ipc::helpers::{
    get_id_list, get_optional_str, get_required_str, is_constraint_violation, placeholders,
    query_failed, row_exists, table_failed, text_values, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params_from_iter, Connection};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CourseOption {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct RosterRow {
    pub enrollment_id: String,
    pub student_id: String,
    pub student_name: String,
}

/// Everything the term/course/student screens render after one selection change.
pub struct CascadeView {
    pub terms: Vec<String>,
    pub courses: Vec<CourseOption>,
    pub selection: FilterSelection,
    pub rows: Vec<RosterRow>,
}

impl CascadeView {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "terms": self.terms,
            "term": self.selection.term,
            "courses": courses_json(&self.courses),
            "courseId": self.selection.course_id,
            "rows": self.rows.iter().map(roster_row_json).collect::<Vec<_>>(),
        })
    }
}

fn courses_json(courses: &[CourseOption]) -> serde_json::Value {
    json!(courses
        .iter()
        .map(|c| json!({ "courseId": c.id, "courseName": c.name }))
        .collect::<Vec<_>>())
}

fn roster_row_json(r: &RosterRow) -> serde_json::Value {
    json!({
        "id": r.enrollment_id,
        "studentId": r.student_id,
        "studentName": r.student_name,
    })
}

pub fn list_terms(conn: &Connection) -> Result<Vec<String>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT DISTINCT term FROM enrollment_view ORDER BY term")
        .map_err(query_failed)?;
    stmt.query_map([], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_failed)
}

pub fn list_courses_for_term(conn: &Connection, term: &str) -> Result<Vec<CourseOption>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT DISTINCT course_id, course_name
             FROM enrollment_view
             WHERE term = ?
             ORDER BY course_name, course_id",
        )
        .map_err(query_failed)?;
    stmt.query_map([term], |r| {
        Ok(CourseOption {
            id: r.get(0)?,
            name: r.get(1)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(query_failed)
}

pub fn list_roster(conn: &Connection, term: &str, course_id: &str) -> Result<Vec<RosterRow>, HandlerErr> {
    let mut stmt = conn
        .prepare(
            "SELECT id, student_id, student_name
             FROM enrollment_view
             WHERE term = ? AND course_id = ?
             ORDER BY student_name, id",
        )
        .map_err(query_failed)?;
    stmt.query_map((term, course_id), |r| {
        Ok(RosterRow {
            enrollment_id: r.get(0)?,
            student_id: r.get(1)?,
            student_name: r.get(2)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(query_failed)
}

/// Re-runs the term → course → student population for a (possibly stale) selection.
pub fn load_cascade(conn: &Connection, selection: FilterSelection) -> Result<CascadeView, HandlerErr> {
    let terms = list_terms(conn)?;
    let selection = cascade::resolve_term(selection, &terms);

    let courses = match selection.term.as_deref() {
        Some(term) => list_courses_for_term(conn, term)?,
        None => Vec::new(),
    };
    let course_ids: Vec<String> = courses.iter().map(|c| c.id.clone()).collect();
    let selection = cascade::resolve_course(selection, &course_ids);

    let rows = match selection.roster_key() {
        Some((term, course_id)) => list_roster(conn, term, course_id)?,
        None => Vec::new(),
    };

    Ok(CascadeView {
        terms,
        courses,
        selection,
        rows,
    })
}

pub fn selection_from_params(params: &serde_json::Value) -> FilterSelection {
    FilterSelection::new(
        get_optional_str(params, "term"),
        get_optional_str(params, "courseId"),
    )
}

/// Deletes enrollments matching `where_sql` plus the attendance and grade rows hanging off them.
pub fn delete_enrollments_where(
    conn: &Connection,
    where_sql: &str,
    binds: &[String],
) -> Result<usize, HandlerErr> {
    let subquery = format!("SELECT id FROM enrollments WHERE {}", where_sql);
    conn.execute(
        &format!("DELETE FROM attendance WHERE enrollment_id IN ({})", subquery),
        params_from_iter(text_values(&[], binds.iter())),
    )
    .map_err(table_failed("db_delete_failed", "attendance"))?;
    conn.execute(
        &format!("DELETE FROM grades WHERE enrollment_id IN ({})", subquery),
        params_from_iter(text_values(&[], binds.iter())),
    )
    .map_err(table_failed("db_delete_failed", "grades"))?;
    conn.execute(
        &format!("DELETE FROM enrollments WHERE {}", where_sql),
        params_from_iter(text_values(&[], binds.iter())),
    )
    .map_err(table_failed("db_delete_failed", "enrollments"))
}

fn enrollment_terms(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    Ok(json!({ "terms": list_terms(conn)? }))
}

fn enrollment_courses(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let term = get_required_str(params, "term")?;
    let courses = list_courses_for_term(conn, &term)?;
    Ok(json!({ "courses": courses_json(&courses) }))
}

fn enrollment_students(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let term = get_required_str(params, "term")?;
    let course_id = get_required_str(params, "courseId")?;
    let rows = list_roster(conn, &term, &course_id)?;
    Ok(json!({ "rows": rows.iter().map(roster_row_json).collect::<Vec<_>>() }))
}

fn enrollment_filter(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let view = load_cascade(conn, selection_from_params(params))?;
    Ok(view.to_json())
}

fn enrollment_options(conn: &Connection) -> Result<serde_json::Value, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT id, course_name FROM courses ORDER BY course_name, id")
        .map_err(query_failed)?;
    let courses = stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            Ok(json!({ "id": id, "courseName": name }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_failed)?;

    let mut stmt = conn
        .prepare("SELECT id, name FROM students ORDER BY name, id")
        .map_err(query_failed)?;
    let students = stmt
        .query_map([], |r| {
            let id: String = r.get(0)?;
            let name: String = r.get(1)?;
            Ok(json!({ "id": id, "name": name }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(query_failed)?;

    Ok(json!({ "courses": courses, "students": students }))
}

fn enrollment_create(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let Some(term) = get_optional_str(params, "term") else {
        return Err(HandlerErr::bad_params("term must not be empty"));
    };
    let Some(course_id) = get_optional_str(params, "courseId") else {
        return Err(HandlerErr::bad_params("select a course"));
    };
    let Some(student_id) = get_optional_str(params, "studentId") else {
        return Err(HandlerErr::bad_params("select a student"));
    };

    if !row_exists(conn, "courses", &course_id)? {
        return Err(HandlerErr::not_found("course not found"));
    }
    if !row_exists(conn, "students", &student_id)? {
        return Err(HandlerErr::not_found("student not found"));
    }

    let id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO enrollments(id, student_id, course_id, term) VALUES(?, ?, ?, ?)",
        (&id, &student_id, &course_id, &term),
    ) {
        if is_constraint_violation(&e) {
            return Err(HandlerErr::new(
                "duplicate",
                "student is already enrolled in this course for the term",
            )
            .with_details(json!({ "table": "enrollments" })));
        }
        return Err(table_failed("db_insert_failed", "enrollments")(e));
    }

    Ok(json!({ "id": id }))
}

fn enrollment_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let ids = get_id_list(params, "ids")?;
    if ids.is_empty() {
        return Ok(json!({ "deleted": 0 }));
    }
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let deleted = delete_enrollments_where(&tx, &format!("id IN ({})", placeholders(ids.len())), &ids)?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    Ok(json!({ "deleted": deleted }))
}

fn handle_enrollment_filter(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.db.is_none() {
        let empty = CascadeView {
            terms: Vec::new(),
            courses: Vec::new(),
            selection: FilterSelection::default(),
            rows: Vec::new(),
        };
        return crate::ipc::error::ok(&req.id, empty.to_json());
    }
    with_conn(state, req, enrollment_filter)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "enrollment.terms" => Some(with_conn(state, req, |conn, _| enrollment_terms(conn))),
        "enrollment.courses" => Some(with_conn(state, req, enrollment_courses)),
        "enrollment.students" => Some(with_conn(state, req, enrollment_students)),
        "enrollment.filter" => Some(handle_enrollment_filter(state, req)),
        "enrollment.options" => Some(with_conn(state, req, |conn, _| enrollment_options(conn))),
        "enrollment.create" => Some(with_conn(state, req, enrollment_create)),
        "enrollment.delete" => Some(with_conn(state, req, enrollment_delete)),
        _ => None,
    }
}
