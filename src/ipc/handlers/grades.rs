use crate::ipc::handlers::enrollment::list_roster;
use crate::ipc::helpers::{
    get_id_list, get_required_str, placeholders, query_failed, row_exists, table_failed,
    text_values, with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params_from_iter, Connection};
use serde_json::json;
use std::collections::HashMap;

fn parse_score(params: &serde_json::Value) -> Result<Option<i64>, HandlerErr> {
    match params.get("score") {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| HandlerErr::bad_params("score must be an integer or null")),
    }
}

fn grades_list(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let assignment_id = get_required_str(params, "assignmentId")?;
    let term = get_required_str(params, "term")?;
    let course_id = get_required_str(params, "courseId")?;
    if !row_exists(conn, "assignments", &assignment_id)? {
        return Err(HandlerErr::not_found("assignment not found"));
    }

    let roster = list_roster(conn, &term, &course_id)?;

    let mut stmt = conn
        .prepare("SELECT enrollment_id, score FROM grades WHERE assignment_id = ?")
        .map_err(query_failed)?;
    let scores: HashMap<String, Option<i64>> = stmt
        .query_map([&assignment_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, Option<i64>>(1)?))
        })
        .and_then(|it| it.collect::<Result<HashMap<_, _>, _>>())
        .map_err(query_failed)?;

    let rows: Vec<serde_json::Value> = roster
        .iter()
        .map(|r| {
            json!({
                "enrollmentId": r.enrollment_id,
                "studentId": r.student_id,
                "studentName": r.student_name,
                "score": scores.get(&r.enrollment_id).copied().flatten(),
                "graded": scores.contains_key(&r.enrollment_id),
            })
        })
        .collect();

    Ok(json!({ "assignmentId": assignment_id, "rows": rows }))
}

fn grades_set(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let assignment_id = get_required_str(params, "assignmentId")?;
    let enrollment_id = get_required_str(params, "enrollmentId")?;
    let score = parse_score(params)?;

    if !row_exists(conn, "assignments", &assignment_id)? {
        return Err(HandlerErr::not_found("assignment not found"));
    }
    if !row_exists(conn, "enrollments", &enrollment_id)? {
        return Err(HandlerErr::not_found("enrollment not found"));
    }

    conn.execute(
        "INSERT INTO grades(assignment_id, enrollment_id, score)
         VALUES(?, ?, ?)
         ON CONFLICT(assignment_id, enrollment_id) DO UPDATE SET
           score = excluded.score",
        (&assignment_id, &enrollment_id, score),
    )
    .map_err(table_failed("db_update_failed", "grades"))?;

    Ok(json!({ "ok": true }))
}

fn grades_delete(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let assignment_id = get_required_str(params, "assignmentId")?;
    let ids = get_id_list(params, "enrollmentIds")?;
    if ids.is_empty() {
        return Ok(json!({ "deleted": 0 }));
    }
    let deleted = conn
        .execute(
            &format!(
                "DELETE FROM grades WHERE assignment_id = ? AND enrollment_id IN ({})",
                placeholders(ids.len())
            ),
            params_from_iter(text_values(&[assignment_id.as_str()], ids.iter())),
        )
        .map_err(table_failed("db_delete_failed", "grades"))?;
    Ok(json!({ "deleted": deleted }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.list" => Some(with_conn(state, req, grades_list)),
        "grades.set" => Some(with_conn(state, req, grades_set)),
        "grades.delete" => Some(with_conn(state, req, grades_delete)),
        _ => None,
    }
}
