//! Partitioning scheme and partition directory naming.
//!
//! Timestamps are microseconds since the Unix epoch, UTC.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};

use crate::error::{Result, StrataError};
use crate::format::DEFAULT_PARTITION_NAME;

const MICROS_PER_SECOND: i64 = 1_000_000;

/// How rows of a table are split into directories by timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionBy {
    Day,
    Month,
    Year,
    /// Every row lives in the `default` directory
    None,
}

impl PartitionBy {
    /// Persisted code
    pub fn code(self) -> i32 {
        match self {
            PartitionBy::Day => 0,
            PartitionBy::Month => 1,
            PartitionBy::Year => 2,
            PartitionBy::None => 3,
        }
    }

    pub fn from_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(PartitionBy::Day),
            1 => Ok(PartitionBy::Month),
            2 => Ok(PartitionBy::Year),
            3 => Ok(PartitionBy::None),
            other => Err(StrataError::corrupt(
                "metadata file",
                format!("unknown partition scheme {}", other),
            )),
        }
    }

    pub fn is_partitioned(self) -> bool {
        self != PartitionBy::None
    }

    /// Start of the partition holding `ts`
    pub fn floor(self, ts: i64) -> Result<i64> {
        if self == PartitionBy::None {
            return Ok(i64::MIN);
        }
        let date = to_datetime(ts)?.date_naive();
        let start = match self {
            PartitionBy::Day => Some(date),
            PartitionBy::Month => NaiveDate::from_ymd_opt(date.year(), date.month(), 1),
            PartitionBy::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1),
            PartitionBy::None => None,
        };
        start
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Utc.from_utc_datetime(&dt).timestamp_micros())
            .ok_or_else(|| StrataError::InvalidArgument(format!("timestamp {} out of range", ts)))
    }

    /// Directory name of the partition holding `ts`
    pub fn dir_name(self, ts: i64) -> Result<String> {
        let format = match self {
            PartitionBy::Day => "%Y-%m-%d",
            PartitionBy::Month => "%Y-%m",
            PartitionBy::Year => "%Y",
            PartitionBy::None => return Ok(DEFAULT_PARTITION_NAME.to_string()),
        };
        Ok(to_datetime(ts)?.format(format).to_string())
    }

    /// Partition start timestamp encoded in a directory name
    pub fn parse_dir_name(self, name: &str) -> Result<i64> {
        let parsed = match self {
            PartitionBy::Day => NaiveDate::parse_from_str(name, "%Y-%m-%d").ok(),
            PartitionBy::Month => NaiveDate::parse_from_str(&format!("{}-01", name), "%Y-%m-%d").ok(),
            PartitionBy::Year => NaiveDate::parse_from_str(&format!("{}-01-01", name), "%Y-%m-%d").ok(),
            PartitionBy::None => {
                return if name == DEFAULT_PARTITION_NAME {
                    Ok(i64::MIN)
                } else {
                    Err(StrataError::InvalidArgument(format!(
                        "'{}' is not the default partition",
                        name
                    )))
                };
            }
        };
        parsed
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Utc.from_utc_datetime(&dt).timestamp_micros())
            .ok_or_else(|| {
                StrataError::InvalidArgument(format!("'{}' is not a {} partition name", name, self))
            })
    }
}

impl fmt::Display for PartitionBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PartitionBy::Day => "DAY",
            PartitionBy::Month => "MONTH",
            PartitionBy::Year => "YEAR",
            PartitionBy::None => "NONE",
        };
        f.write_str(name)
    }
}

fn to_datetime(ts: i64) -> Result<DateTime<Utc>> {
    let secs = ts.div_euclid(MICROS_PER_SECOND);
    let nanos = (ts.rem_euclid(MICROS_PER_SECOND) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos)
        .ok_or_else(|| StrataError::InvalidArgument(format!("timestamp {} out of range", ts)))
}
