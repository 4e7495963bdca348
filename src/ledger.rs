use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};

use crate::models::{LedgerRow, Status};
use crate::reminder::ReminderSink;

/// Ledger column order is fixed and part of the external contract.
pub const COLUMNS: [&str; 10] = [
    "Timestamp",
    "Company",
    "Role",
    "Date Applied",
    "Status",
    "Source",
    "EmailId",
    "ThreadId",
    "FollowUp Due",
    "Notes",
];

/// Capability interface over the ledger collaborator: one row per message
/// id, update in place when the key already exists.
pub trait Ledger {
    fn upsert_row(&self, row: &LedgerRow) -> Result<()>;
}

/// Local sqlite store backing both the ledger and the reminder sink.
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open ledger db: {}", path.display()))?;
        let store = Self { conn, path };
        store.init()?;
        Ok(store)
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: PathBuf::from(":memory:"),
        };
        store.init()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn default_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "applog") {
            Ok(proj_dirs.data_dir().join("applog.db"))
        } else {
            Ok(PathBuf::from("applog.db"))
        }
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS applications (
                timestamp TEXT NOT NULL,
                company TEXT NOT NULL,
                role TEXT NOT NULL,
                date_applied TEXT NOT NULL,
                status TEXT NOT NULL,
                source TEXT NOT NULL,
                email_id TEXT NOT NULL UNIQUE,
                thread_id TEXT NOT NULL,
                followup_due TEXT NOT NULL,
                notes TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS reminders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                calendar_id TEXT NOT NULL,
                summary TEXT NOT NULL,
                due TEXT NOT NULL,
                description TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX IF NOT EXISTS idx_applications_status ON applications(status);
            CREATE INDEX IF NOT EXISTS idx_reminders_due ON reminders(due);
            "#,
        )?;
        Ok(())
    }

    pub fn list_rows(&self, status: Option<&str>) -> Result<Vec<LedgerRow>> {
        let mut sql = String::from(
            "SELECT timestamp, company, role, date_applied, status, source,
                    email_id, thread_id, followup_due, notes
             FROM applications",
        );
        if status.is_some() {
            sql.push_str(" WHERE status = ?1");
        }
        sql.push_str(" ORDER BY date_applied DESC, email_id");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if let Some(s) = status {
            stmt.query_map([s], Self::row_to_ledger)?
        } else {
            stmt.query_map([], Self::row_to_ledger)?
        };
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list ledger rows")
    }

    pub fn get_row(&self, email_id: &str) -> Result<Option<LedgerRow>> {
        let result = self.conn.query_row(
            "SELECT timestamp, company, role, date_applied, status, source,
                    email_id, thread_id, followup_due, notes
             FROM applications WHERE email_id = ?1",
            [email_id],
            Self::row_to_ledger,
        );
        match result {
            Ok(row) => Ok(Some(row)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn count_rows(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM applications", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Render rows as CSV with the fixed header, for export to an external
    /// spreadsheet.
    pub fn to_csv(rows: &[LedgerRow]) -> String {
        let mut out = String::new();
        out.push_str(&COLUMNS.join(","));
        out.push('\n');
        for row in rows {
            let cells = [
                row.timestamp.as_str(),
                row.company.as_str(),
                row.role.as_str(),
                row.date_applied.as_str(),
                row.status.as_str(),
                row.source.as_str(),
                row.email_id.as_str(),
                row.thread_id.as_str(),
                row.followup_due.as_str(),
                row.notes.as_str(),
            ];
            let line: Vec<String> = cells.iter().map(|c| csv_escape(c)).collect();
            out.push_str(&line.join(","));
            out.push('\n');
        }
        out
    }

    fn row_to_ledger(row: &rusqlite::Row) -> rusqlite::Result<LedgerRow> {
        let status: String = row.get(4)?;
        Ok(LedgerRow {
            timestamp: row.get(0)?,
            company: row.get(1)?,
            role: row.get(2)?,
            date_applied: row.get(3)?,
            status: status.parse().unwrap_or(Status::Other),
            source: row.get(5)?,
            email_id: row.get(6)?,
            thread_id: row.get(7)?,
            followup_due: row.get(8)?,
            notes: row.get(9)?,
        })
    }
}

fn csv_escape(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

impl Ledger for SqliteStore {
    fn upsert_row(&self, row: &LedgerRow) -> Result<()> {
        self.conn.execute(
            "INSERT INTO applications
                (timestamp, company, role, date_applied, status, source,
                 email_id, thread_id, followup_due, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(email_id) DO UPDATE SET
                timestamp = excluded.timestamp,
                company = excluded.company,
                role = excluded.role,
                date_applied = excluded.date_applied,
                status = excluded.status,
                source = excluded.source,
                thread_id = excluded.thread_id,
                followup_due = excluded.followup_due,
                notes = excluded.notes",
            params![
                row.timestamp,
                row.company,
                row.role,
                row.date_applied,
                row.status.as_str(),
                row.source,
                row.email_id,
                row.thread_id,
                row.followup_due,
                row.notes,
            ],
        )?;
        Ok(())
    }
}

impl ReminderSink for SqliteStore {
    fn schedule(
        &self,
        calendar_id: &str,
        summary: &str,
        due: NaiveDate,
        description: &str,
        dry_run: bool,
    ) -> Result<Option<String>> {
        if dry_run {
            println!("[DRY-RUN] Would create reminder on {} for {}", due, summary);
            return Ok(None);
        }
        self.conn.execute(
            "INSERT INTO reminders (calendar_id, summary, due, description)
             VALUES (?1, ?2, ?3, ?4)",
            params![calendar_id, summary, due.to_string(), description],
        )?;
        Ok(Some(self.conn.last_insert_rowid().to_string()))
    }
}
