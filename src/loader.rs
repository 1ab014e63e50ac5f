use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::{debug, info};

use crate::error::DataLoadError;
use crate::models::BookingRecord;

pub const REQUIRED_COLUMNS: [&str; 7] = [
    "BookingID",
    "BookingDate",
    "Service",
    "CustomerType",
    "Revenue",
    "CustomerSatisfaction",
    "HandledByCallCenter",
];

const DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// Immutable booking table shared by every filter pass.
#[derive(Debug)]
pub struct Dataset {
    source: PathBuf,
    records: Vec<BookingRecord>,
}

impl Dataset {
    pub fn new(source: PathBuf, records: Vec<BookingRecord>) -> Self {
        Self { source, records }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn records(&self) -> &[BookingRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sorted unique service names.
    pub fn services(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|record| record.service.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    pub fn has_service(&self, service: &str) -> bool {
        self.records.iter().any(|record| record.service == service)
    }

    /// Earliest and latest booking date, or `None` for an empty table.
    pub fn date_bounds(&self) -> Option<(NaiveDate, NaiveDate)> {
        let mut dates = self.records.iter().map(BookingRecord::booking_date);
        let first = dates.next()?;
        Some(dates.fold((first, first), |(min, max), date| {
            (min.min(date), max.max(date))
        }))
    }
}

#[derive(serde::Deserialize)]
struct CsvRow {
    #[serde(rename = "BookingID")]
    booking_id: String,
    #[serde(rename = "BookingDate")]
    booking_date: String,
    #[serde(rename = "Service")]
    service: String,
    #[serde(rename = "CustomerType")]
    customer_type: String,
    #[serde(rename = "Revenue")]
    revenue: Option<f64>,
    #[serde(rename = "CustomerSatisfaction")]
    satisfaction: Option<f64>,
    #[serde(rename = "HandledByCallCenter")]
    handled_by_call_center: Option<String>,
}

pub fn load_bookings(path: &Path) -> Result<Dataset, DataLoadError> {
    let file = std::fs::File::open(path).map_err(|source| DataLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader
        .headers()
        .map_err(|source| csv_error(path, source))?
        .clone();
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|column| !headers.iter().any(|header| header == **column))
        .map(|column| column.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(DataLoadError::MissingColumns {
            path: path.to_path_buf(),
            columns: missing,
        });
    }

    let mut records = Vec::new();
    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.map_err(|source| csv_error(path, source))?;
        let booked_at = parse_booking_date(&row.booking_date).ok_or_else(|| {
            DataLoadError::InvalidDate {
                line: index + 2,
                value: row.booking_date.clone(),
            }
        })?;

        records.push(BookingRecord {
            booking_id: row.booking_id,
            month: booked_at.format("%Y-%m").to_string(),
            booked_at,
            service: row.service,
            customer_type: row.customer_type,
            revenue: row.revenue,
            satisfaction: row.satisfaction,
            handled_by_call_center: row.handled_by_call_center.filter(|value| !value.is_empty()),
        });
    }

    info!(path = %path.display(), rows = records.len(), "loaded bookings");
    Ok(Dataset::new(path.to_path_buf(), records))
}

/// Parses a booking timestamp. Values carrying a UTC offset are
/// normalised to UTC.
pub fn parse_booking_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|datetime| datetime.naive_utc())
        })
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn csv_error(path: &Path, source: csv::Error) -> DataLoadError {
    DataLoadError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    modified: SystemTime,
    len: u64,
}

impl Fingerprint {
    fn of(path: &Path) -> Result<Self, DataLoadError> {
        let metadata = std::fs::metadata(path).map_err(|source| DataLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let modified = metadata.modified().map_err(|source| DataLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            modified,
            len: metadata.len(),
        })
    }
}

struct CacheEntry {
    fingerprint: Fingerprint,
    dataset: Arc<Dataset>,
}

/// Loaded datasets keyed by source path. An entry is reused while the
/// file's modification time and length are unchanged.
#[derive(Default)]
pub struct DatasetCache {
    entries: HashMap<PathBuf, CacheEntry>,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load(&mut self, path: &Path) -> Result<Arc<Dataset>, DataLoadError> {
        let key = path.canonicalize().map_err(|source| DataLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let fingerprint = Fingerprint::of(&key)?;

        if let Some(entry) = self.entries.get(&key) {
            if entry.fingerprint == fingerprint {
                debug!(path = %key.display(), "dataset cache hit");
                return Ok(Arc::clone(&entry.dataset));
            }
            debug!(path = %key.display(), "source changed, reloading");
        }

        let dataset = Arc::new(load_bookings(&key)?);
        self.entries.insert(
            key,
            CacheEntry {
                fingerprint,
                dataset: Arc::clone(&dataset),
            },
        );
        Ok(dataset)
    }

    pub fn invalidate(&mut self, path: &Path) -> bool {
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.entries.remove(&key).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
