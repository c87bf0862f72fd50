//! Observation sources.
//!
//! A source is restartable: every call to [`ObservationSource::open`] yields
//! the same finite sequence from the beginning.

use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, Trim};
use parking_core::{Error, Observation, Result};
use tracing::debug;

use crate::normalizer::RecordNormalizer;

/// Lazy sequence of normalized observations.
///
/// Per-record failures are yielded as `Err` items so the consumer can count
/// and skip them.
pub type ObservationIter<'a> = Box<dyn Iterator<Item = Result<Observation>> + 'a>;

/// A replayable stream of observations.
pub trait ObservationSource {
    /// Start a fresh pass over the source.
    ///
    /// Fails only for problems that make the whole source unusable (missing
    /// file, missing canonical columns).
    fn open(&self) -> Result<ObservationIter<'_>>;

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// In-memory source.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    observations: Vec<Observation>,
}

impl MemorySource {
    pub fn new(observations: Vec<Observation>) -> Self {
        Self { observations }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

impl From<Vec<Observation>> for MemorySource {
    fn from(observations: Vec<Observation>) -> Self {
        Self::new(observations)
    }
}

impl ObservationSource for MemorySource {
    fn open(&self) -> Result<ObservationIter<'_>> {
        Ok(Box::new(self.observations.iter().cloned().map(Ok)))
    }

    fn describe(&self) -> String {
        format!("memory ({} observations)", self.observations.len())
    }
}

/// CSV file source with header-based column mapping.
#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    normalizer: RecordNormalizer,
}

impl CsvSource {
    /// Read `path` with the default column mapping.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_normalizer(path, RecordNormalizer::default())
    }

    pub fn with_normalizer(path: impl Into<PathBuf>, normalizer: RecordNormalizer) -> Self {
        Self {
            path: path.into(),
            normalizer,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn record_error(err: csv::Error) -> Error {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    match err.kind() {
        csv::ErrorKind::Io(_) => Error::reader(err.to_string()),
        _ => Error::validation(format!("line {}: {}", line, err)),
    }
}

impl ObservationSource for CsvSource {
    fn open(&self) -> Result<ObservationIter<'_>> {
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .from_path(&self.path)
            .map_err(|e| Error::reader(format!("{}: {}", self.path.display(), e)))?;

        let headers = reader.headers().map_err(record_error)?.clone();
        let bound = self.normalizer.bind(&headers)?;
        debug!(path = %self.path.display(), columns = headers.len(), "csv source opened");

        let iter = reader.into_records().map(move |record| {
            let record = record.map_err(record_error)?;
            bound.normalize(&record).map_err(|err| match err {
                Error::InputValidation(msg) => {
                    let line = record.position().map(|p| p.line()).unwrap_or(0);
                    Error::validation(format!("line {}: {}", line, msg))
                }
                other => other,
            })
        });

        Ok(Box::new(iter))
    }

    fn describe(&self) -> String {
        format!("csv {}", self.path.display())
    }
}
