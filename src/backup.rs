use anyhow::{anyhow, Context};
use rusqlite::{Connection, OpenFlags};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/roster.sqlite3";
const DB_FILE_NAME: &str = "roster.sqlite3";
const STAGED_FILE_NAME: &str = "roster.sqlite3.importing";
const SQLITE_HEADER: &[u8] = b"SQLite format 3\0";
pub const BUNDLE_FORMAT_V1: &str = "roster-workspace-v1";
pub const RAW_SQLITE_FORMAT: &str = "raw-sqlite3";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE_NAME);
    if !db_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_path.to_string_lossy()
        ));
    }
    let db_bytes = std::fs::read(&db_path)
        .with_context(|| format!("failed to read database {}", db_path.to_string_lossy()))?;
    let db_sha256 = sha256_hex(&db_bytes);

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }

    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT_V1,
        "version": 1,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
        "dbSha256": db_sha256,
    });
    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    zip.write_all(&db_bytes)
        .context("failed to write database entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 2,
        db_sha256,
    })
}

/// A verified database written next to the live one, waiting to replace it.
#[derive(Debug)]
pub struct StagedImport {
    staged_path: PathBuf,
    db_path: PathBuf,
    pub bundle_format_detected: String,
}

impl StagedImport {
    /// Moves the staged database over the workspace database.
    pub fn commit(self) -> anyhow::Result<ImportSummary> {
        if self.db_path.exists() {
            std::fs::remove_file(&self.db_path).with_context(|| {
                format!(
                    "failed to remove existing database {}",
                    self.db_path.to_string_lossy()
                )
            })?;
        }
        std::fs::rename(&self.staged_path, &self.db_path).with_context(|| {
            format!(
                "failed to move extracted database to {}",
                self.db_path.to_string_lossy()
            )
        })?;
        Ok(ImportSummary {
            bundle_format_detected: self.bundle_format_detected,
        })
    }

    pub fn discard(self) {
        let _ = std::fs::remove_file(&self.staged_path);
    }
}

/// Restores a bundle, or a bare sqlite file, as the workspace database.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    stage_workspace_import(in_path, workspace_path)?.commit()
}

/// Extracts and checks the incoming database without touching the live one.
pub fn stage_workspace_import(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<StagedImport> {
    let (db_bytes, format) = if is_zip_file(in_path)? {
        (read_bundle_db(in_path)?, BUNDLE_FORMAT_V1)
    } else {
        let bytes = std::fs::read(in_path)
            .with_context(|| format!("failed to read sqlite file {}", in_path.to_string_lossy()))?;
        (bytes, RAW_SQLITE_FORMAT)
    };
    if !db_bytes.starts_with(SQLITE_HEADER) {
        return Err(anyhow!(
            "not a SQLite database: {}",
            in_path.to_string_lossy()
        ));
    }

    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;
    let staged_path = workspace_path.join(STAGED_FILE_NAME);
    if staged_path.exists() {
        let _ = std::fs::remove_file(&staged_path);
    }
    let staged = StagedImport {
        staged_path,
        db_path: workspace_path.join(DB_FILE_NAME),
        bundle_format_detected: format.to_string(),
    };

    if let Err(e) = write_and_check(&staged.staged_path, &db_bytes) {
        staged.discard();
        return Err(e);
    }
    Ok(staged)
}

fn read_bundle_db(in_path: &Path) -> anyhow::Result<Vec<u8>> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    let mut db_bytes: Vec<u8> = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .context("bundle missing db/roster.sqlite3")?
        .read_to_end(&mut db_bytes)
        .context("failed to extract database entry")?;

    if let Some(expected) = manifest.get("dbSha256").and_then(|v| v.as_str()) {
        let actual = sha256_hex(&db_bytes);
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(anyhow!(
                "database checksum mismatch: expected {}, got {}",
                expected,
                actual
            ));
        }
    }
    Ok(db_bytes)
}

fn write_and_check(path: &Path, db_bytes: &[u8]) -> anyhow::Result<()> {
    let mut db_out = File::create(path).with_context(|| {
        format!("failed to create temp database {}", path.to_string_lossy())
    })?;
    db_out
        .write_all(db_bytes)
        .context("failed to write extracted database")?;
    db_out
        .flush()
        .context("failed to flush extracted database")?;
    drop(db_out);

    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .context("failed to open imported database")?;
    let verdict: String = conn
        .query_row("PRAGMA quick_check", [], |r| r.get(0))
        .context("imported database failed integrity check")?;
    if verdict != "ok" {
        return Err(anyhow!("imported database failed integrity check: {}", verdict));
    }
    Ok(())
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("failed to read file signature")?;
    if read < 4 {
        return Ok(false);
    }
    Ok(sig == [0x50, 0x4B, 0x03, 0x04])
}
