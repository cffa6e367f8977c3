use crate::ipc::handlers::enrollment::delete_enrollments_where;
use crate::ipc::helpers::{
    get_id_list, get_required_str, placeholders, query_failed, table_failed, text_values,
    with_conn, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{params_from_iter, Connection};
use serde_json::json;
use uuid::Uuid;

struct Field {
    key: &'static str,
    column: &'static str,
    title: &'static str,
}

/// Rows that reference an entity and go away with it.
enum Dependents {
    /// Enrollments (and their attendance/grades) whose column points at the entity.
    Enrollments(&'static str),
    /// Grade rows for an assignment.
    Grades,
}

struct Entity {
    table: &'static str,
    fields: &'static [Field],
    dependents: Dependents,
}

static STUDENTS: Entity = Entity {
    table: "students",
    fields: &[Field {
        key: "name",
        column: "name",
        title: "Name",
    }],
    dependents: Dependents::Enrollments("student_id"),
};

static COURSES: Entity = Entity {
    table: "courses",
    fields: &[
        Field {
            key: "courseName",
            column: "course_name",
            title: "Course Name",
        },
        Field {
            key: "instructorName",
            column: "instructor_name",
            title: "Instructor Name",
        },
    ],
    dependents: Dependents::Enrollments("course_id"),
};

static ASSIGNMENTS: Entity = Entity {
    table: "assignments",
    fields: &[Field {
        key: "name",
        column: "name",
        title: "Name",
    }],
    dependents: Dependents::Grades,
};

fn columns_json(entity: &Entity) -> serde_json::Value {
    let cols: Vec<serde_json::Value> = entity
        .fields
        .iter()
        .map(|f| json!({ "field": f.key, "title": f.title }))
        .collect();
    json!(cols)
}

fn list_rows(conn: &Connection, entity: &Entity) -> Result<Vec<serde_json::Value>, HandlerErr> {
    let cols: Vec<&str> = entity.fields.iter().map(|f| f.column).collect();
    let sql = format!(
        "SELECT id, {} FROM {} ORDER BY {}, id",
        cols.join(", "),
        entity.table,
        cols[0]
    );
    let mut stmt = conn.prepare(&sql).map_err(query_failed)?;
    stmt.query_map([], |r| {
        let mut row = serde_json::Map::new();
        row.insert("id".into(), json!(r.get::<_, String>(0)?));
        for (i, f) in entity.fields.iter().enumerate() {
            row.insert(f.key.into(), json!(r.get::<_, String>(i + 1)?));
        }
        Ok(serde_json::Value::Object(row))
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(query_failed)
}

fn entity_list(
    conn: &Connection,
    entity: &Entity,
) -> Result<serde_json::Value, HandlerErr> {
    let rows = list_rows(conn, entity)?;
    Ok(json!({ "columns": columns_json(entity), "rows": rows }))
}

fn entity_create(
    conn: &Connection,
    entity: &Entity,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let mut values: Vec<String> = Vec::with_capacity(entity.fields.len());
    for f in entity.fields {
        values.push(get_required_str(params, f.key)?);
    }

    let id = Uuid::new_v4().to_string();
    let cols: Vec<&str> = entity.fields.iter().map(|f| f.column).collect();
    let sql = format!(
        "INSERT INTO {}(id, {}) VALUES({})",
        entity.table,
        cols.join(", "),
        placeholders(cols.len() + 1)
    );
    conn.execute(
        &sql,
        params_from_iter(text_values(&[id.as_str()], values.iter())),
    )
    .map_err(table_failed("db_insert_failed", entity.table))?;

    Ok(json!({ "id": id }))
}

fn entity_delete(
    conn: &Connection,
    entity: &Entity,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let ids = get_id_list(params, "ids")?;
    if ids.is_empty() {
        return Ok(json!({ "deleted": 0 }));
    }
    let in_list = placeholders(ids.len());

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;

    // Explicit dependency order; the schema has no ON DELETE CASCADE.
    match entity.dependents {
        Dependents::Enrollments(column) => {
            delete_enrollments_where(&tx, &format!("{} IN ({})", column, in_list), &ids)?;
        }
        Dependents::Grades => {
            tx.execute(
                &format!("DELETE FROM grades WHERE assignment_id IN ({})", in_list),
                params_from_iter(text_values(&[], ids.iter())),
            )
            .map_err(table_failed("db_delete_failed", "grades"))?;
        }
    }

    let deleted = tx
        .execute(
            &format!("DELETE FROM {} WHERE id IN ({})", entity.table, in_list),
            params_from_iter(text_values(&[], ids.iter())),
        )
        .map_err(table_failed("db_delete_failed", entity.table))?;

    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    Ok(json!({ "deleted": deleted }))
}

fn handle_list(state: &mut AppState, req: &Request, entity: &Entity) -> serde_json::Value {
    if state.db.is_none() {
        return crate::ipc::error::ok(
            &req.id,
            json!({ "columns": columns_json(entity), "rows": [] }),
        );
    }
    with_conn(state, req, |conn, _| entity_list(conn, entity))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let (prefix, action) = req.method.split_once('.')?;
    let entity = match prefix {
        "students" => &STUDENTS,
        "courses" => &COURSES,
        "assignments" => &ASSIGNMENTS,
        _ => return None,
    };
    match action {
        "list" => Some(handle_list(state, req, entity)),
        "create" => Some(with_conn(state, req, |conn, params| {
            entity_create(conn, entity, params)
        })),
        "delete" => Some(with_conn(state, req, |conn, params| {
            entity_delete(conn, entity, params)
        })),
        _ => None,
    }
}
