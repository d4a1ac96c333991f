//! Serialized time-series artifacts, one file per series.
//!
//! Each record is a one-key object keyed by the day's unix timestamp:
//! `{"<unix>": [[value, name], ...]}` for reserves and
//! `{"<unix>": [[supply, borrow, name], ...]}` for totals.

use serde::Serialize;
use thiserror::Error;

use crate::types::{DailySample, Pool};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to serialize series: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub fn reserves_filename(pool: Pool) -> String {
    format!("reserves_{}.txt", pool.as_str())
}

pub fn totals_filename(pool: Pool) -> String {
    format!("tvl_{}.txt", pool.as_str())
}

pub fn series_to_json<E: Serialize>(series: &[DailySample<E>]) -> Result<String, PersistenceError> {
    let mut records = Vec::with_capacity(series.len());
    for sample in series {
        let mut record = serde_json::Map::new();
        record.insert(
            sample.timestamp.to_string(),
            serde_json::to_value(&sample.entries)?,
        );
        records.push(serde_json::Value::Object(record));
    }
    Ok(serde_json::to_string(&records)?)
}

/// Write one series to `path`. A failure here is reported to the caller but
/// never undoes the collection work.
pub async fn write_series<E: Serialize>(
    path: &str,
    series: &[DailySample<E>],
) -> Result<(), PersistenceError> {
    let json = series_to_json(series)?;
    tokio::fs::write(path, json)
        .await
        .map_err(|source| PersistenceError::Write {
            path: path.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ReserveEntry, TotalsEntry};

    #[test]
    fn test_filenames_follow_pool() {
        assert_eq!(reserves_filename(Pool::Main), "reserves_main.txt");
        assert_eq!(totals_filename(Pool::Lp), "tvl_lp.txt");
    }

    #[test]
    fn test_reserves_record_shape() {
        let series = vec![DailySample {
            timestamp: 1_704_067_200,
            entries: vec![ReserveEntry(5.0, "A".into())],
        }];
        assert_eq!(
            series_to_json(&series).unwrap(),
            r#"[{"1704067200":[[5.0,"A"]]}]"#
        );
    }

    #[test]
    fn test_totals_record_shape() {
        let series = vec![DailySample {
            timestamp: 1_704_067_200,
            entries: vec![TotalsEntry(7.5, 2.25, "USDt".into())],
        }];
        assert_eq!(
            series_to_json(&series).unwrap(),
            r#"[{"1704067200":[[7.5,2.25,"USDt"]]}]"#
        );
    }

    #[test]
    fn test_empty_day_still_recorded() {
        let series: Vec<DailySample<ReserveEntry>> = vec![DailySample {
            timestamp: 1_704_067_200,
            entries: vec![],
        }];
        assert_eq!(series_to_json(&series).unwrap(), r#"[{"1704067200":[]}]"#);
    }
}
