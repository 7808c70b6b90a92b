use crate::assign::{Candidate, CandidateKind, ExistingAssignment, PastAssignment};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE_NAME: &str = "examassign.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS candidates(
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            full_name TEXT NOT NULL,
            sex TEXT NOT NULL,
            region_code TEXT NOT NULL,
            district_number TEXT NOT NULL,
            workstation TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_candidates_kind_geo
         ON candidates(kind, region_code, district_number)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_candidates_workstation ON candidates(workstation)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS jobs(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            total_required INTEGER NOT NULL,
            region_code TEXT NOT NULL DEFAULT 'all',
            district_number TEXT NOT NULL DEFAULT 'all',
            male_quota INTEGER NOT NULL DEFAULT 50,
            assignment_year INTEGER NOT NULL,
            created_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_jobs_year ON jobs(assignment_year)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL,
            candidate_id TEXT NOT NULL,
            assignment_year INTEGER NOT NULL,
            region_code TEXT NOT NULL,
            district_number TEXT NOT NULL,
            workstation TEXT NOT NULL,
            created_at TEXT,
            FOREIGN KEY(job_id) REFERENCES jobs(id),
            FOREIGN KEY(candidate_id) REFERENCES candidates(id),
            UNIQUE(job_id, candidate_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_job ON assignments(job_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_candidate ON assignments(candidate_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_year ON assignments(assignment_year)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// A job definition as stored.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub name: String,
    pub kind: CandidateKind,
    pub total_required: i64,
    pub region_code: String,
    pub district_number: String,
    pub male_quota: i64,
    pub assignment_year: i64,
}

const JOB_COLUMNS: &str =
    "id, name, kind, total_required, region_code, district_number, male_quota, assignment_year";

fn job_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<JobRow> {
    let kind_raw: String = r.get(2)?;
    Ok(JobRow {
        id: r.get(0)?,
        name: r.get(1)?,
        kind: CandidateKind::parse(&kind_raw).unwrap_or(CandidateKind::Teacher),
        total_required: r.get(3)?,
        region_code: r.get(4)?,
        district_number: r.get(5)?,
        male_quota: r.get(6)?,
        assignment_year: r.get(7)?,
    })
}

pub fn load_job(conn: &Connection, job_id: &str) -> anyhow::Result<Option<JobRow>> {
    let sql = format!("SELECT {} FROM jobs WHERE id = ?", JOB_COLUMNS);
    Ok(conn.query_row(&sql, [job_id], job_from_row).optional()?)
}

pub fn list_jobs(conn: &Connection, year: Option<i64>) -> anyhow::Result<Vec<JobRow>> {
    let sql = format!(
        "SELECT {} FROM jobs WHERE (?1 IS NULL OR assignment_year = ?1)
         ORDER BY assignment_year DESC, name",
        JOB_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([year], job_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn candidate_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<Candidate> {
    let kind_raw: String = r.get(1)?;
    let status: String = r.get(7)?;
    Ok(Candidate {
        id: r.get(0)?,
        kind: CandidateKind::parse(&kind_raw).unwrap_or(CandidateKind::Teacher),
        full_name: r.get(2)?,
        sex: r.get(3)?,
        region_code: r.get(4)?,
        district_number: r.get(5)?,
        workstation: r.get(6)?,
        active: status == "active",
    })
}

const CANDIDATE_COLUMNS: &str =
    "id, kind, full_name, sex, region_code, district_number, workstation, status";

/// The whole registry of one kind, active or not. Scope filtering belongs to the selector.
pub fn load_candidates(conn: &Connection, kind: CandidateKind) -> anyhow::Result<Vec<Candidate>> {
    let sql = format!(
        "SELECT {} FROM candidates WHERE kind = ? ORDER BY full_name, id",
        CANDIDATE_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([kind.as_str()], candidate_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn load_candidate(conn: &Connection, candidate_id: &str) -> anyhow::Result<Option<Candidate>> {
    let sql = format!("SELECT {} FROM candidates WHERE id = ?", CANDIDATE_COLUMNS);
    Ok(conn
        .query_row(&sql, [candidate_id], candidate_from_row)
        .optional()?)
}

/// Every committed assignment of jobs drawing from the same registry.
pub fn load_history(conn: &Connection, kind: CandidateKind) -> anyhow::Result<Vec<PastAssignment>> {
    let mut stmt = conn.prepare(
        "SELECT a.job_id, a.candidate_id, a.workstation
         FROM assignments a
         JOIN jobs j ON j.id = a.job_id
         WHERE j.kind = ?",
    )?;
    let rows = stmt
        .query_map([kind.as_str()], |r| {
            Ok(PastAssignment {
                job_id: r.get(0)?,
                candidate_id: r.get(1)?,
                workstation: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Rows of the job itself plus every row stamped with the job's year.
pub fn load_conflict_scope(conn: &Connection, job: &JobRow) -> anyhow::Result<Vec<ExistingAssignment>> {
    let mut stmt = conn.prepare(
        "SELECT a.job_id, j.name, a.assignment_year, a.candidate_id, a.workstation
         FROM assignments a
         JOIN jobs j ON j.id = a.job_id
         WHERE a.job_id = ?1 OR a.assignment_year = ?2",
    )?;
    let rows = stmt
        .query_map((&job.id, job.assignment_year), |r| {
            Ok(ExistingAssignment {
                job_id: r.get(0)?,
                job_name: r.get(1)?,
                assignment_year: r.get(2)?,
                candidate_id: r.get(3)?,
                workstation: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count_assignments(conn: &Connection, job_id: &str) -> anyhow::Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM assignments WHERE job_id = ?",
        [job_id],
        |r| r.get(0),
    )?)
}
