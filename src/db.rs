use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::matcher::{MatchRecord, MatchStatus, MatchType};

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let conn = Connection::open(path).with_context(|| format!("opening {}", path.display()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS runs (
            id            INTEGER PRIMARY KEY,
            start_url     TEXT NOT NULL,
            strategy      TEXT NOT NULL,
            outcome       TEXT NOT NULL,
            steps         INTEGER NOT NULL,
            pages         INTEGER NOT NULL,
            match_count   INTEGER NOT NULL,
            started_at    TEXT NOT NULL,
            finished_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS matches (
            id            INTEGER PRIMARY KEY,
            run_id        INTEGER NOT NULL REFERENCES runs(id),
            position      INTEGER NOT NULL,
            full_name     TEXT NOT NULL,
            score         REAL NOT NULL,
            first_rank    INTEGER,
            surname_rank  INTEGER,
            source        TEXT NOT NULL,
            match_type    TEXT NOT NULL,
            status        TEXT NOT NULL CHECK(status IN ('Valid','Verified','Junk')),
            email         TEXT,
            description   TEXT,
            url           TEXT,
            UNIQUE(run_id, full_name)
        );
        CREATE INDEX IF NOT EXISTS idx_matches_run ON matches(run_id, position);
        ",
    )?;
    add_missing_columns(conn)
}

/// Databases written before profile details were kept lack these columns.
fn add_missing_columns(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('matches')")?;
    let existing = stmt
        .query_map([], |r| r.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    for column in ["description", "url"] {
        if !existing.iter().any(|c| c == column) {
            conn.execute_batch(&format!("ALTER TABLE matches ADD COLUMN {column} TEXT"))?;
        }
    }
    Ok(())
}

// ── Runs ──

#[derive(Debug, Clone, Serialize)]
pub struct RunRow {
    pub id: i64,
    pub start_url: String,
    pub strategy: String,
    pub outcome: String,
    pub steps: usize,
    pub pages: usize,
    pub match_count: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Insert a run and its ranked matches in one transaction. Returns the run id.
pub fn save_run(conn: &Connection, run: &RunRow, matches: &[MatchRecord]) -> Result<i64> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO runs (start_url, strategy, outcome, steps, pages, match_count, started_at, finished_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            run.start_url,
            run.strategy,
            run.outcome,
            run.steps,
            run.pages,
            matches.len(),
            run.started_at.to_rfc3339(),
            run.finished_at.to_rfc3339(),
        ],
    )?;
    let run_id = tx.last_insert_rowid();
    {
        let mut stmt = tx.prepare(
            "INSERT INTO matches
                (run_id, position, full_name, score, first_rank, surname_rank, source, match_type, status,
                 email, description, url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )?;
        for (i, m) in matches.iter().enumerate() {
            stmt.execute(params![
                run_id,
                i,
                m.full_name,
                m.score,
                m.first_rank,
                m.surname_rank,
                m.source,
                m.match_type.as_str(),
                m.status.as_str(),
                m.email,
                m.description,
                m.url,
            ])?;
        }
    }
    tx.commit()?;
    Ok(run_id)
}

fn parse_ts(s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

pub fn latest_run_id(conn: &Connection) -> Result<Option<i64>> {
    Ok(conn
        .query_row("SELECT MAX(id) FROM runs", [], |r| r.get::<_, Option<i64>>(0))
        .optional()?
        .flatten())
}

pub fn fetch_run(conn: &Connection, run_id: i64) -> Result<Option<RunRow>> {
    let row = conn
        .query_row(
            "SELECT id, start_url, strategy, outcome, steps, pages, match_count, started_at, finished_at
             FROM runs WHERE id = ?1",
            [run_id],
            |r| {
                Ok(RunRow {
                    id: r.get(0)?,
                    start_url: r.get(1)?,
                    strategy: r.get(2)?,
                    outcome: r.get(3)?,
                    steps: r.get(4)?,
                    pages: r.get(5)?,
                    match_count: r.get(6)?,
                    started_at: parse_ts(r.get(7)?)?,
                    finished_at: parse_ts(r.get(8)?)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

// ── Matches ──

const MATCH_COLUMNS: &str =
    "full_name, score, first_rank, surname_rank, source, match_type, status, email, description, url";

pub fn fetch_matches(conn: &Connection, run_id: i64, limit: Option<usize>) -> Result<Vec<MatchRecord>> {
    let mut sql = format!("SELECT {MATCH_COLUMNS} FROM matches WHERE run_id = ?1 ORDER BY position");
    if let Some(n) = limit {
        sql.push_str(&format!(" LIMIT {n}"));
    }
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([run_id], |row| {
            let match_type: String = row.get(5)?;
            let status: String = row.get(6)?;
            Ok(MatchRecord {
                full_name: row.get(0)?,
                score: row.get(1)?,
                first_rank: row.get(2)?,
                surname_rank: row.get(3)?,
                source: row.get(4)?,
                match_type: MatchType::parse(&match_type).unwrap_or(MatchType::SurnameOnly),
                status: MatchStatus::parse(&status).unwrap_or(MatchStatus::Valid),
                email: row.get(7)?,
                description: row.get(8)?,
                url: row.get(9)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Write back statuses, scores and order after verification.
pub fn update_matches(conn: &Connection, run_id: i64, matches: &[MatchRecord]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare(
            "UPDATE matches SET position = ?3, score = ?4, status = ?5
             WHERE run_id = ?1 AND full_name = ?2",
        )?;
        for (i, m) in matches.iter().enumerate() {
            count += stmt.execute(params![run_id, m.full_name, i, m.score, m.status.as_str()])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

// ── Export ──

#[derive(Serialize)]
struct Export<'a> {
    run: &'a RunRow,
    matches: &'a [MatchRecord],
}

pub fn export_json(path: &Path, run: &RunRow, matches: &[MatchRecord]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(&Export { run, matches })?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

// ── Stats ──

pub struct Stats {
    pub runs: usize,
    pub matches: usize,
    pub verified: usize,
    pub junk: usize,
    pub distinct_names: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let runs: usize = conn.query_row("SELECT COUNT(*) FROM runs", [], |r| r.get(0))?;
    let matches: usize = conn.query_row("SELECT COUNT(*) FROM matches", [], |r| r.get(0))?;
    let verified: usize = conn.query_row(
        "SELECT COUNT(*) FROM matches WHERE status = 'Verified'",
        [],
        |r| r.get(0),
    )?;
    let junk: usize =
        conn.query_row("SELECT COUNT(*) FROM matches WHERE status = 'Junk'", [], |r| r.get(0))?;
    let distinct_names: usize =
        conn.query_row("SELECT COUNT(DISTINCT full_name) FROM matches", [], |r| r.get(0))?;
    Ok(Stats {
        runs,
        matches,
        verified,
        junk,
        distinct_names,
    })
}
