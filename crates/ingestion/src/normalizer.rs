//! Record normalization.
//!
//! Maps heterogeneous input column names onto the canonical observation
//! schema and parses categorical fields (vehicle type, traffic, booleans) and
//! split date/time columns.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use csv::StringRecord;
use parking_core::{
    naive_to_ms, Error, Observation, Result, TimestampMs, TrafficLevel, VehicleType,
};
use serde::{Deserialize, Serialize};

const DATE_FORMATS: &[&str] = &["%d-%m-%Y", "%d/%m/%Y", "%d.%m.%Y", "%Y-%m-%d", "%Y/%m/%d"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M:%S%.f", "%H:%M"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d-%m-%Y %H:%M",
    "%d/%m/%Y %H:%M",
];

/// Accepted header names for each canonical field (case-insensitive).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMapping {
    pub lot_id: Vec<String>,
    pub capacity: Vec<String>,
    pub occupancy: Vec<String>,
    pub queue_length: Vec<String>,
    pub traffic_level: Vec<String>,
    pub is_special_day: Vec<String>,
    pub vehicle_type: Vec<String>,
    pub latitude: Vec<String>,
    pub longitude: Vec<String>,
    /// Single combined timestamp column.
    pub timestamp: Vec<String>,
    /// Date half of a split timestamp.
    pub date: Vec<String>,
    /// Time half of a split timestamp.
    pub time: Vec<String>,
}

fn aliases(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            lot_id: aliases(&["SystemCodeNumber", "lot_id", "space_id", "ID"]),
            capacity: aliases(&["Capacity", "capacity"]),
            occupancy: aliases(&["Occupancy", "occupancy"]),
            queue_length: aliases(&["QueueLength", "queue_length"]),
            traffic_level: aliases(&["TrafficConditionNearby", "traffic_level", "Traffic"]),
            is_special_day: aliases(&["IsSpecialDay", "is_special_day"]),
            vehicle_type: aliases(&["VehicleType", "vehicle_type"]),
            latitude: aliases(&["Latitude", "latitude", "lat"]),
            longitude: aliases(&["Longitude", "longitude", "lon", "lng"]),
            timestamp: aliases(&["timestamp", "Timestamp", "LastUpdated"]),
            date: aliases(&["LastUpdatedDate", "date"]),
            time: aliases(&["LastUpdatedTime", "time"]),
        }
    }
}

impl ColumnMapping {
    /// Parse a TOML alias table. Fields left out keep their default aliases.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }
}

/// Where the timestamp comes from in a bound header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimestampColumns {
    Combined(usize),
    Split { date: usize, time: usize },
}

/// Column indices resolved against a concrete header row.
#[derive(Debug, Clone)]
pub struct BoundColumns {
    lot_id: usize,
    capacity: usize,
    occupancy: usize,
    queue_length: usize,
    traffic_level: usize,
    is_special_day: usize,
    vehicle_type: usize,
    latitude: usize,
    longitude: usize,
    timestamp: TimestampColumns,
}

/// Maps raw records onto [`Observation`]s.
#[derive(Debug, Clone, Default)]
pub struct RecordNormalizer {
    mapping: ColumnMapping,
}

impl RecordNormalizer {
    /// Create a normalizer with a custom mapping.
    pub fn new(mapping: ColumnMapping) -> Self {
        Self { mapping }
    }

    /// Column mapping in use.
    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    /// Resolve canonical fields against a header row.
    ///
    /// A missing canonical column is a configuration error: the run must not
    /// start.
    pub fn bind(&self, headers: &StringRecord) -> Result<BoundColumns> {
        let find = |names: &[String]| -> Option<usize> {
            names.iter().find_map(|name| {
                headers
                    .iter()
                    .position(|h| h.trim().eq_ignore_ascii_case(name.trim()))
            })
        };

        let mut missing = Vec::new();
        let mut require = |field: &str, names: &[String]| -> usize {
            match find(names) {
                Some(idx) => idx,
                None => {
                    missing.push(field.to_string());
                    usize::MAX
                }
            }
        };

        let lot_id = require("lot_id", &self.mapping.lot_id);
        let capacity = require("capacity", &self.mapping.capacity);
        let occupancy = require("occupancy", &self.mapping.occupancy);
        let queue_length = require("queue_length", &self.mapping.queue_length);
        let traffic_level = require("traffic_level", &self.mapping.traffic_level);
        let is_special_day = require("is_special_day", &self.mapping.is_special_day);
        let vehicle_type = require("vehicle_type", &self.mapping.vehicle_type);
        let latitude = require("latitude", &self.mapping.latitude);
        let longitude = require("longitude", &self.mapping.longitude);

        let timestamp = match (
            find(&self.mapping.date),
            find(&self.mapping.time),
            find(&self.mapping.timestamp),
        ) {
            (Some(date), Some(time), _) => Some(TimestampColumns::Split { date, time }),
            (_, _, Some(idx)) => Some(TimestampColumns::Combined(idx)),
            _ => None,
        };
        if timestamp.is_none() {
            missing.push("timestamp (or date + time)".to_string());
        }

        match timestamp {
            Some(timestamp) if missing.is_empty() => Ok(BoundColumns {
                lot_id,
                capacity,
                occupancy,
                queue_length,
                traffic_level,
                is_special_day,
                vehicle_type,
                latitude,
                longitude,
                timestamp,
            }),
            _ => Err(Error::config(format!(
                "missing required columns: {}",
                missing.join(", ")
            ))),
        }
    }
}

impl BoundColumns {
    /// Convert one raw record into an observation.
    pub fn normalize(&self, record: &StringRecord) -> Result<Observation> {
        let field = |idx: usize, name: &str| -> Result<&str> {
            record
                .get(idx)
                .map(str::trim)
                .ok_or_else(|| Error::validation(format!("record has no '{}' field", name)))
        };

        let lot_id = field(self.lot_id, "lot_id")?;
        if lot_id.is_empty() {
            return Err(Error::validation("empty lot_id"));
        }

        let timestamp = match self.timestamp {
            TimestampColumns::Split { date, time } => {
                parse_split_timestamp(field(date, "date")?, field(time, "time")?)?
            }
            TimestampColumns::Combined(idx) => parse_timestamp(field(idx, "timestamp")?)?,
        };

        Ok(Observation {
            lot_id: lot_id.to_string(),
            timestamp,
            capacity: parse_count(field(self.capacity, "capacity")?, "capacity")?,
            occupancy: parse_count(field(self.occupancy, "occupancy")?, "occupancy")?,
            queue_length: parse_count(field(self.queue_length, "queue_length")?, "queue_length")?,
            traffic_level: parse_traffic(field(self.traffic_level, "traffic_level")?)?,
            is_special_day: parse_bool(field(self.is_special_day, "is_special_day")?)?,
            vehicle_type: parse_vehicle(field(self.vehicle_type, "vehicle_type")?),
            latitude: parse_coord(field(self.latitude, "latitude")?, "latitude")?,
            longitude: parse_coord(field(self.longitude, "longitude")?, "longitude")?,
        })
    }
}

/// Parse an integer count; integral floats such as `"12.0"` are accepted.
pub fn parse_count(raw: &str, name: &str) -> Result<i64> {
    if let Ok(v) = raw.parse::<i64>() {
        return Ok(v);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() && v.fract() == 0.0 => Ok(v as i64),
        _ => Err(Error::validation(format!("{}: '{}' is not an integer", name, raw))),
    }
}

fn parse_coord(raw: &str, name: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|_| Error::validation(format!("{}: '{}' is not a number", name, raw)))
}

/// Map a vehicle label onto a category. Unknown labels pass through as
/// [`VehicleType::Unrecognized`].
pub fn parse_vehicle(raw: &str) -> VehicleType {
    match raw.to_ascii_lowercase().as_str() {
        "car" => VehicleType::Car,
        "bike" | "cycle" | "bicycle" | "motorcycle" | "motorbike" => VehicleType::Bike,
        "truck" | "bus" | "lorry" => VehicleType::Truck,
        "other" => VehicleType::Other,
        _ => VehicleType::Unrecognized(raw.to_string()),
    }
}

/// Parse a traffic label or a 1-10 numeric level.
pub fn parse_traffic(raw: &str) -> Result<TrafficLevel> {
    match raw.to_ascii_lowercase().as_str() {
        "low" | "light" => return Ok(TrafficLevel::Low),
        "medium" | "average" | "moderate" => return Ok(TrafficLevel::Medium),
        "high" | "heavy" | "severe" => return Ok(TrafficLevel::High),
        _ => {}
    }

    match raw.parse::<f64>() {
        Ok(level) if level.is_finite() => Ok(if level <= 3.0 {
            TrafficLevel::Low
        } else if level <= 6.0 {
            TrafficLevel::Medium
        } else {
            TrafficLevel::High
        }),
        _ => Err(Error::validation(format!("traffic_level: unknown value '{}'", raw))),
    }
}

pub fn parse_bool(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Ok(true),
        "false" | "no" | "n" | "0" | "" => Ok(false),
        _ => Err(Error::validation(format!("is_special_day: unknown value '{}'", raw))),
    }
}

/// Compose a timestamp from separate day-first date and time fields.
pub fn parse_split_timestamp(date: &str, time: &str) -> Result<TimestampMs> {
    let date = DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date, fmt).ok())
        .ok_or_else(|| Error::validation(format!("unparseable date '{}'", date)))?;
    let time = TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(time, fmt).ok())
        .ok_or_else(|| Error::validation(format!("unparseable time '{}'", time)))?;
    Ok(naive_to_ms(NaiveDateTime::new(date, time)))
}

/// Parse a combined timestamp (RFC 3339, or a day-first / ISO date-time).
pub fn parse_timestamp(raw: &str) -> Result<TimestampMs> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp_millis());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(naive_to_ms)
        .ok_or_else(|| Error::validation(format!("unparseable timestamp '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset_headers() -> StringRecord {
        StringRecord::from(vec![
            "ID",
            "SystemCodeNumber",
            "Capacity",
            "Latitude",
            "Longitude",
            "Occupancy",
            "VehicleType",
            "TrafficConditionNearby",
            "QueueLength",
            "IsSpecialDay",
            "LastUpdatedDate",
            "LastUpdatedTime",
        ])
    }

    #[test]
    fn test_bind_dataset_headers() {
        let normalizer = RecordNormalizer::default();
        let bound = normalizer.bind(&dataset_headers()).unwrap();
        assert_eq!(bound.lot_id, 1, "SystemCodeNumber wins over ID");
        assert_eq!(bound.timestamp, TimestampColumns::Split { date: 10, time: 11 });
    }

    #[test]
    fn test_mapping_from_toml_overrides_aliases() {
        let mapping = ColumnMapping::from_toml_str(
            r#"
            lot_id = ["Site"]
            timestamp = ["observed_at"]
            "#,
        )
        .unwrap();
        assert_eq!(mapping.capacity, ColumnMapping::default().capacity);

        let normalizer = RecordNormalizer::new(mapping);
        assert!(normalizer.bind(&dataset_headers()).is_err());

        let headers = StringRecord::from(vec![
            "Site",
            "Capacity",
            "Occupancy",
            "QueueLength",
            "TrafficConditionNearby",
            "IsSpecialDay",
            "VehicleType",
            "Latitude",
            "Longitude",
            "observed_at",
        ]);
        let bound = normalizer.bind(&headers).unwrap();
        let record = StringRecord::from(vec![
            "BHMBCCMKT01",
            "577",
            "61",
            "1",
            "low",
            "0",
            "car",
            "26.1",
            "91.7",
            "2016-10-04 07:59:00",
        ]);
        let obs = bound.normalize(&record).unwrap();
        assert_eq!(obs.lot_id, "BHMBCCMKT01");
        assert_eq!(obs.timestamp, 1_475_567_940_000);
    }

    #[test]
    fn test_mapping_rejects_bad_toml() {
        let err = ColumnMapping::from_toml_str("lot_id = 3").unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }

    #[test]
    fn test_missing_columns_is_config_error() {
        let normalizer = RecordNormalizer::default();
        let headers = StringRecord::from(vec!["ID", "Capacity", "Occupancy"]);
        match normalizer.bind(&headers) {
            Err(Error::Config(msg)) => {
                assert!(msg.contains("queue_length"));
                assert!(msg.contains("timestamp"));
            }
            other => panic!("expected config error, got {:?}", other),
        }
    }

    #[test]
    fn test_normalize_dataset_row() {
        let bound = RecordNormalizer::default().bind(&dataset_headers()).unwrap();
        let record = StringRecord::from(vec![
            "0",
            "BHMBCCMKT01",
            "577",
            "26.14453614",
            "91.73617216",
            "61",
            "car",
            "low",
            "1",
            "0",
            "04-10-2016",
            "07:59:00",
        ]);

        let obs = bound.normalize(&record).unwrap();
        assert_eq!(obs.lot_id, "BHMBCCMKT01");
        assert_eq!(obs.capacity, 577);
        assert_eq!(obs.occupancy, 61);
        assert_eq!(obs.queue_length, 1);
        assert_eq!(obs.traffic_level, TrafficLevel::Low);
        assert!(!obs.is_special_day);
        assert_eq!(obs.vehicle_type, VehicleType::Car);
        assert_eq!(obs.timestamp, parse_timestamp("2016-10-04 07:59:00").unwrap());
    }

    #[test]
    fn test_normalize_bad_number() {
        let bound = RecordNormalizer::default().bind(&dataset_headers()).unwrap();
        let record = StringRecord::from(vec![
            "0", "X", "many", "26.1", "91.7", "61", "car", "low", "1", "0", "04-10-2016", "07:59:00",
        ]);
        assert!(matches!(bound.normalize(&record), Err(Error::InputValidation(_))));
    }

    #[test]
    fn test_parse_vehicle() {
        assert_eq!(parse_vehicle("Motorcycle"), VehicleType::Bike);
        assert_eq!(parse_vehicle("BUS"), VehicleType::Truck);
        assert_eq!(parse_vehicle("other"), VehicleType::Other);
        assert_eq!(
            parse_vehicle("tank"),
            VehicleType::Unrecognized("tank".to_string())
        );
    }

    #[test]
    fn test_parse_traffic() {
        assert_eq!(parse_traffic("Heavy").unwrap(), TrafficLevel::High);
        assert_eq!(parse_traffic("average").unwrap(), TrafficLevel::Medium);
        assert_eq!(parse_traffic("2").unwrap(), TrafficLevel::Low);
        assert_eq!(parse_traffic("5").unwrap(), TrafficLevel::Medium);
        assert_eq!(parse_traffic("10").unwrap(), TrafficLevel::High);
        assert!(parse_traffic("gridlock").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("Yes").unwrap());
        assert!(!parse_bool("0").unwrap());
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn test_day_first_dates() {
        let a = parse_split_timestamp("04-10-2016", "07:59:00").unwrap();
        let b = parse_split_timestamp("2016-10-04", "07:59").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, 1_475_567_940_000);
    }

    #[test]
    fn test_parse_count_accepts_integral_float() {
        assert_eq!(parse_count("12.0", "capacity").unwrap(), 12);
        assert!(parse_count("12.5", "capacity").is_err());
        assert_eq!(parse_count("-3", "queue_length").unwrap(), -3);
    }
}
