#[path = "../src/backup.rs"]
mod backup;

use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
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

fn write_sample_db(path: &std::path::Path, student: &str) {
    let conn = rusqlite::Connection::open(path).expect("open sample db");
    conn.execute_batch("CREATE TABLE students(id TEXT PRIMARY KEY, name TEXT NOT NULL);")
        .expect("create students");
    conn.execute("INSERT INTO students(id, name) VALUES('s1', ?)", [student])
        .expect("insert student");
}

fn student_name(path: &std::path::Path) -> String {
    let conn = rusqlite::Connection::open(path).expect("open restored db");
    conn.query_row("SELECT name FROM students WHERE id = 's1'", [], |r| r.get(0))
        .expect("restored student")
}

#[test]
fn zip_export_and_import_roundtrip() {
    let workspace = temp_dir("roster-backup-src");
    let workspace2 = temp_dir("roster-backup-dst");
    let out_dir = temp_dir("roster-backup-out");

    write_sample_db(&workspace.join("roster.sqlite3"), "Ada");
    let bytes = std::fs::read(workspace.join("roster.sqlite3")).expect("read source db");

    let bundle_path = out_dir.join("workspace.rosterbackup.zip");
    let export = backup::export_workspace_bundle(&workspace, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert_eq!(export.entry_count, 2);
    assert_eq!(export.db_sha256.len(), 64);

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains(backup::BUNDLE_FORMAT_V1));
    assert!(manifest.contains(&export.db_sha256));
    archive
        .by_name("db/roster.sqlite3")
        .expect("database entry in bundle");

    let import = backup::import_workspace_bundle(&bundle_path, &workspace2).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT_V1);

    let restored = std::fs::read(workspace2.join("roster.sqlite3")).expect("read restored db");
    assert_eq!(restored, bytes);
    assert_eq!(student_name(&workspace2.join("roster.sqlite3")), "Ada");
    assert!(!workspace2.join("roster.sqlite3.importing").exists());

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn raw_sqlite_import_is_supported() {
    let out_dir = temp_dir("roster-backup-raw");
    let workspace = temp_dir("roster-backup-raw-dst");

    let raw_file = out_dir.join("copy.sqlite3");
    write_sample_db(&raw_file, "Grace");
    write_sample_db(&workspace.join("roster.sqlite3"), "Linus");

    let import = backup::import_workspace_bundle(&raw_file, &workspace).expect("import sqlite");
    assert_eq!(import.bundle_format_detected, backup::RAW_SQLITE_FORMAT);

    let restored = std::fs::read(workspace.join("roster.sqlite3")).expect("read restored sqlite");
    assert_eq!(restored, std::fs::read(&raw_file).expect("read raw file"));
    assert_eq!(student_name(&workspace.join("roster.sqlite3")), "Grace");

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn tampered_bundle_is_rejected() {
    let out_dir = temp_dir("roster-backup-tampered");
    let workspace = temp_dir("roster-backup-tampered-dst");

    let bundle_path = out_dir.join("tampered.zip");
    {
        let f = File::create(&bundle_path).expect("create bundle");
        let mut zip = zip::ZipWriter::new(f);
        let opts = zip::write::FileOptions::default();
        zip.start_file("manifest.json", opts).expect("manifest entry");
        zip.write_all(
            format!(
                "{{\"format\":\"{}\",\"version\":1,\"dbSha256\":\"{}\"}}",
                backup::BUNDLE_FORMAT_V1,
                "0".repeat(64)
            )
            .as_bytes(),
        )
        .expect("write manifest");
        zip.start_file("db/roster.sqlite3", opts).expect("db entry");
        zip.write_all(b"not-what-the-manifest-says").expect("write db");
        zip.finish().expect("finish zip");
    }

    let res = backup::import_workspace_bundle(&bundle_path, &workspace);
    let msg = format!("{:#}", res.expect_err("checksum mismatch"));
    assert!(msg.contains("checksum mismatch"), "{}", msg);
    assert!(!workspace.join("roster.sqlite3").exists());

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn non_sqlite_raw_file_leaves_workspace_untouched() {
    let out_dir = temp_dir("roster-backup-notdb");
    let workspace = temp_dir("roster-backup-notdb-dst");

    let existing = workspace.join("roster.sqlite3");
    write_sample_db(&existing, "Linus");
    let before = std::fs::read(&existing).expect("read existing db");

    let text_file = out_dir.join("notes.txt");
    std::fs::write(&text_file, "hello this is not a database at all").expect("write text file");

    let res = backup::import_workspace_bundle(&text_file, &workspace);
    let msg = format!("{:#}", res.expect_err("text file rejected"));
    assert!(msg.contains("not a SQLite database"), "{}", msg);
    assert_eq!(std::fs::read(&existing).expect("read db after import"), before);
    assert!(!workspace.join("roster.sqlite3.importing").exists());

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(workspace);
}
