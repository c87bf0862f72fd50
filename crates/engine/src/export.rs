//! File-backed sinks and exporters.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use parking_core::{format_ts, AnomalyRecord, Error, ModelKind, PriceEvent, Result};
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::{debug, info};

use crate::sink::{JoinedRow, ResultsSink};

/// Writes the joined per-observation table as CSV.
///
/// Columns: `timestamp, lot_id, occupancy_rate`, then one `<model>_price`
/// column per model.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    models: Vec<ModelKind>,
}

impl Default for CsvExporter {
    fn default() -> Self {
        Self::new(ModelKind::ALL.to_vec())
    }
}

impl CsvExporter {
    pub fn new(models: Vec<ModelKind>) -> Self {
        Self { models }
    }

    fn header(&self) -> Vec<String> {
        let mut header = vec![
            "timestamp".to_string(),
            "lot_id".to_string(),
            "occupancy_rate".to_string(),
        ];
        header.extend(self.models.iter().map(|m| format!("{}_price", m)));
        header
    }

    /// Write `rows` to any writer. Missing model prices are left empty.
    pub fn write_to<W: Write>(&self, writer: W, rows: &[JoinedRow]) -> Result<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(self.header()).map_err(csv_error)?;

        for row in rows {
            let mut record = vec![
                format_ts(row.timestamp),
                row.lot_id.clone(),
                format!("{:.4}", row.occupancy_rate),
            ];
            record.extend(self.models.iter().map(|m| {
                row.price(*m)
                    .map(|p| format!("{:.2}", p))
                    .unwrap_or_default()
            }));
            csv.write_record(&record).map_err(csv_error)?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn write_file(&self, path: impl AsRef<Path>, rows: &[JoinedRow]) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| Error::export(format!("cannot create {}: {}", path.display(), e)))?;
        self.write_to(file, rows)?;
        info!(path = %path.display(), rows = rows.len(), "wrote pricing table");
        Ok(())
    }
}

fn csv_error(e: csv::Error) -> Error {
    Error::export(e.to_string())
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum JsonLine<'a> {
    Price(&'a PriceEvent),
    Anomaly(&'a AnomalyRecord),
}

/// Streams events and anomalies as JSON lines.
///
/// Each line carries a `type` field of `price` or `anomaly`.
pub struct JsonLinesSink<W: Write> {
    writer: BufWriter<W>,
    lines: u64,
}

impl JsonLinesSink<File> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| Error::export(format!("cannot create {}: {}", path.display(), e)))?;
        Ok(Self::new(file))
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            lines: 0,
        }
    }

    /// Lines written so far.
    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| Error::export(e.error().to_string()))
    }

    fn write_line(&mut self, line: &JsonLine<'_>) -> Result<()> {
        serde_json::to_writer(&mut self.writer, line)?;
        self.writer.write_all(b"\n")?;
        self.lines += 1;
        Ok(())
    }
}

impl<W: Write> ResultsSink for JsonLinesSink<W> {
    fn write_events(&mut self, events: &[PriceEvent]) -> Result<()> {
        for event in events {
            self.write_line(&JsonLine::Price(event))?;
        }
        Ok(())
    }

    fn write_anomaly(&mut self, record: &AnomalyRecord) -> Result<()> {
        self.write_line(&JsonLine::Anomaly(record))
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Persists events and anomalies to SQLite.
///
/// Each batch from the engine is written in one transaction.
pub struct SqliteSink {
    conn: Connection,
    events_written: u64,
}

impl SqliteSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(sqlite_error)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory().map_err(sqlite_error)?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS price_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                lot_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                model TEXT NOT NULL,
                price REAL NOT NULL,
                candidate REAL,
                occupancy_rate REAL NOT NULL,
                anomalous INTEGER NOT NULL,
                reroutes TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_price_events_lot
                ON price_events(lot_id, timestamp);
            CREATE TABLE IF NOT EXISTS anomalies (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                lot_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                kind TEXT NOT NULL,
                detail TEXT NOT NULL
            );",
        )
        .map_err(sqlite_error)?;

        Ok(Self {
            conn,
            events_written: 0,
        })
    }

    pub fn events_written(&self) -> u64 {
        self.events_written
    }

    /// Number of rows in the `price_events` table.
    pub fn count_events(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM price_events", [], |row| row.get(0))
            .map_err(sqlite_error)?;
        Ok(count as u64)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl ResultsSink for SqliteSink {
    fn write_events(&mut self, events: &[PriceEvent]) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction().map_err(sqlite_error)?;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO price_events
                     (lot_id, timestamp, model, price, candidate, occupancy_rate, anomalous, reroutes)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .map_err(sqlite_error)?;

            for event in events {
                let reroutes = if event.reroutes.is_empty() {
                    None
                } else {
                    Some(serde_json::to_string(&event.reroutes)?)
                };
                // Non-finite candidates are stored as NULL
                let candidate = event.candidate.is_finite().then_some(event.candidate);
                stmt.execute(params![
                    event.lot_id,
                    event.timestamp,
                    event.model.as_str(),
                    event.price,
                    candidate,
                    event.occupancy_rate,
                    event.anomalous,
                    reroutes,
                ])
                .map_err(sqlite_error)?;
            }
        }
        tx.commit().map_err(sqlite_error)?;

        self.events_written += events.len() as u64;
        debug!(count = events.len(), "flushed price events to sqlite");
        Ok(())
    }

    fn write_anomaly(&mut self, record: &AnomalyRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO anomalies (lot_id, timestamp, kind, detail) VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.lot_id,
                    record.timestamp,
                    record.kind.as_str(),
                    record.detail
                ],
            )
            .map_err(sqlite_error)?;
        Ok(())
    }
}

fn sqlite_error(e: rusqlite::Error) -> Error {
    Error::export(format!("sqlite: {}", e))
}
