use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;

pub struct HandlerErr {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl HandlerErr {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        HandlerErr {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        HandlerErr::new("bad_params", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        HandlerErr::new("not_found", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn response(self, id: &str) -> serde_json::Value {
        err(id, self.code, self.message, self.details)
    }
}

pub fn query_failed(e: rusqlite::Error) -> HandlerErr {
    HandlerErr::new("db_query_failed", e.to_string())
}

pub fn table_failed<'a>(
    code: &'static str,
    table: &'a str,
) -> impl Fn(rusqlite::Error) -> HandlerErr + 'a {
    move |e| HandlerErr::new(code, e.to_string()).with_details(json!({ "table": table }))
}

pub fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Runs a handler body against the open connection and wraps the envelope.
pub fn with_conn(
    state: &mut AppState,
    req: &Request,
    f: impl FnOnce(&Connection, &serde_json::Value) -> Result<serde_json::Value, HandlerErr>,
) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match f(conn, &req.params) {
        Ok(result) => ok(&req.id, result),
        Err(error) => error.response(&req.id),
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Missing, null and blank all mean "nothing selected".
pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

pub fn get_id_list(params: &serde_json::Value, key: &str) -> Result<Vec<String>, HandlerErr> {
    let Some(arr) = params.get(key).and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params(format!("missing {}", key)));
    };
    let mut out: Vec<String> = Vec::with_capacity(arr.len());
    for v in arr {
        let Some(s) = v.as_str() else {
            return Err(HandlerErr::bad_params(format!("{} must be an array of strings", key)));
        };
        let s = s.trim();
        if !s.is_empty() && !out.iter().any(|o| o == s) {
            out.push(s.to_string());
        }
    }
    Ok(out)
}

/// `YYYY-MM-DD`; absent means today.
pub fn get_date(params: &serde_json::Value) -> Result<NaiveDate, HandlerErr> {
    match params.get("date") {
        None | Some(serde_json::Value::Null) => Ok(chrono::Local::now().date_naive()),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_params("date must be a string"));
            };
            let s = s.trim();
            if s.len() != 10 {
                return Err(HandlerErr::bad_params("date must be YYYY-MM-DD"));
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|_| HandlerErr::bad_params("date must be YYYY-MM-DD"))
        }
    }
}

pub fn row_exists(conn: &Connection, table: &str, id: &str) -> Result<bool, HandlerErr> {
    conn.query_row(
        &format!("SELECT 1 FROM {} WHERE id = ?", table),
        [id],
        |r| r.get::<_, i64>(0),
    )
    .optional()
    .map(|v| v.is_some())
    .map_err(query_failed)
}

/// `?, ?, ?` for an `IN (...)` list.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

pub fn text_values<'a>(prefix: &[&str], ids: impl IntoIterator<Item = &'a String>) -> Vec<Value> {
    prefix
        .iter()
        .map(|s| Value::Text(s.to_string()))
        .chain(ids.into_iter().map(|s| Value::Text(s.clone())))
        .collect()
}
