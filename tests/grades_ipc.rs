use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_rosterd");
    let mut child = Command::new(exe)
        .env_remove("ROSTERD_WORKSPACE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn rosterd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown error")
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn grades_upsert_list_and_delete() {
    let workspace = temp_dir("roster-grades");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let course = request_ok(
        &mut stdin,
        &mut reader,
        "c",
        "courses.create",
        json!({ "courseName": "Bio", "instructorName": "Darwin" }),
    );
    let course_id = course["id"].as_str().expect("course id").to_string();
    let assignment = request_ok(
        &mut stdin,
        &mut reader,
        "a",
        "assignments.create",
        json!({ "name": "Lab 1" }),
    );
    let assignment_id = assignment["id"].as_str().expect("assignment id").to_string();
    let mut enrollment_ids: Vec<String> = Vec::new();
    for (i, name) in ["Ivy", "Jon"].iter().enumerate() {
        let s = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{}", i),
            "students.create",
            json!({ "name": name }),
        );
        let e = request_ok(
            &mut stdin,
            &mut reader,
            &format!("e{}", i),
            "enrollment.create",
            json!({ "term": "Fall", "courseId": course_id, "studentId": s["id"] }),
        );
        enrollment_ids.push(e["id"].as_str().expect("enrollment id").to_string());
    }

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "g1",
        "grades.set",
        json!({ "assignmentId": assignment_id, "enrollmentId": enrollment_ids[0], "score": 80 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "g2",
        "grades.set",
        json!({ "assignmentId": assignment_id, "enrollmentId": enrollment_ids[0], "score": 92 }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "g3",
        "grades.set",
        json!({ "assignmentId": assignment_id, "enrollmentId": enrollment_ids[1], "score": null }),
    );

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "l1",
        "grades.list",
        json!({ "assignmentId": assignment_id, "term": "Fall", "courseId": course_id }),
    );
    let rows = listed["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["studentName"], json!("Ivy"));
    assert_eq!(rows[0]["score"], json!(92));
    assert_eq!(rows[1]["graded"], json!(true));
    assert!(rows[1]["score"].is_null());

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "d1",
        "grades.delete",
        json!({ "assignmentId": assignment_id, "enrollmentIds": [enrollment_ids[1]] }),
    );
    assert_eq!(deleted["deleted"], json!(1));
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "l2",
        "grades.list",
        json!({ "assignmentId": assignment_id, "term": "Fall", "courseId": course_id }),
    );
    assert_eq!(listed["rows"][1]["graded"], json!(false));

    let bad_score = request(
        &mut stdin,
        &mut reader,
        "b1",
        "grades.set",
        json!({ "assignmentId": assignment_id, "enrollmentId": enrollment_ids[0], "score": "A+" }),
    );
    assert_eq!(error_code(&bad_score), Some("bad_params"));

    let ghost = request(
        &mut stdin,
        &mut reader,
        "b2",
        "grades.set",
        json!({ "assignmentId": "missing", "enrollmentId": enrollment_ids[0], "score": 1 }),
    );
    assert_eq!(error_code(&ghost), Some("not_found"));

    // Deleting the assignment drops its grade rows.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "da",
        "assignments.delete",
        json!({ "ids": [assignment_id] }),
    );
    drop(stdin);
    let _ = child.wait();

    let conn = rusqlite::Connection::open(workspace.join("roster.sqlite3")).expect("open db");
    let grades: i64 = conn
        .query_row("SELECT COUNT(*) FROM grades", [], |r| r.get(0))
        .expect("count grades");
    assert_eq!(grades, 0);

    let _ = std::fs::remove_dir_all(workspace);
}
