use crate::ipc::handlers::enrollment::{load_cascade, selection_from_params};
use crate::ipc::helpers::{
    get_date, get_id_list, placeholders, query_failed, table_failed, text_values, with_conn,
    HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params_from_iter, Connection};
use serde_json::json;
use std::collections::HashSet;

fn present_on(conn: &Connection, date: &str) -> Result<HashSet<String>, HandlerErr> {
    let mut stmt = conn
        .prepare("SELECT enrollment_id FROM attendance WHERE date = ?")
        .map_err(query_failed)?;
    stmt.query_map([date], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<HashSet<_>, _>>())
        .map_err(query_failed)
}

fn attendance_roster(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let date = get_date(params)?.format("%Y-%m-%d").to_string();
    let view = load_cascade(conn, selection_from_params(params))?;
    let present = if view.rows.is_empty() {
        HashSet::new()
    } else {
        present_on(conn, &date)?
    };

    let rows: Vec<serde_json::Value> = view
        .rows
        .iter()
        .map(|r| {
            json!({
                "id": r.enrollment_id,
                "studentId": r.student_id,
                "studentName": r.student_name,
                "present": present.contains(&r.enrollment_id),
            })
        })
        .collect();

    let mut out = view.to_json();
    out["rows"] = json!(rows);
    out["date"] = json!(date);
    Ok(out)
}

fn attendance_mark_present(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let date = get_date(params)?.format("%Y-%m-%d").to_string();
    let ids = get_id_list(params, "enrollmentIds")?;
    if ids.is_empty() {
        return Ok(json!({ "inserted": 0, "date": date }));
    }

    let known: i64 = conn
        .query_row(
            &format!(
                "SELECT COUNT(*) FROM enrollments WHERE id IN ({})",
                placeholders(ids.len())
            ),
            params_from_iter(text_values(&[], ids.iter())),
            |r| r.get(0),
        )
        .map_err(query_failed)?;
    if known as usize != ids.len() {
        return Err(HandlerErr::not_found("enrollment not found"));
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let mut inserted = 0usize;
    for id in &ids {
        // Already marked present for the date is fine.
        inserted += tx
            .execute(
                "INSERT OR IGNORE INTO attendance(enrollment_id, date) VALUES(?, ?)",
                (id, &date),
            )
            .map_err(table_failed("db_insert_failed", "attendance"))?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(json!({ "inserted": inserted, "date": date }))
}

fn attendance_mark_absent(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let date = get_date(params)?.format("%Y-%m-%d").to_string();
    let ids = get_id_list(params, "enrollmentIds")?;
    if ids.is_empty() {
        return Ok(json!({ "removed": 0, "date": date }));
    }
    let removed = conn
        .execute(
            &format!(
                "DELETE FROM attendance WHERE date = ? AND enrollment_id IN ({})",
                placeholders(ids.len())
            ),
            params_from_iter(text_values(&[date.as_str()], ids.iter())),
        )
        .map_err(table_failed("db_delete_failed", "attendance"))?;
    Ok(json!({ "removed": removed, "date": date }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.roster" => Some(with_conn(state, req, attendance_roster)),
        "attendance.markPresent" => Some(with_conn(state, req, attendance_mark_present)),
        "attendance.markAbsent" => Some(with_conn(state, req, attendance_mark_absent)),
        _ => None,
    }
}
