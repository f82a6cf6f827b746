//! Serial batch construction from the exported WIP report.
//!
//! The report is the portal's WIP output sheet (CSV export) with at least
//! the columns `Workstation Name`, `SN`, `PN` and
//! `History station start time`. Ingestion keeps repair-station rows only,
//! dedups each serial to its most recent visit, and partitions the result
//! into fixed-size batch files for separate lookup sessions.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ScrapeError;
use crate::station::station_prefix;

/// One unit of lookup work, as stored in `serial_batch_<N>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialRecord {
    pub serial_number: String,
    #[serde(default)]
    pub part_number: String,
    #[serde(default)]
    pub workstation_name: String,
    #[serde(default)]
    pub workstation_prefix: String,
    #[serde(default)]
    pub history_station_start_time: String,
}

/// Raw row of interest from the WIP report, before filtering/dedup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WipRow {
    pub workstation_name: String,
    pub sn: String,
    pub pn: String,
    pub start_time: String,
}

const COL_WORKSTATION: &str = "Workstation Name";
const COL_SN: &str = "SN";
const COL_PN: &str = "PN";
const COL_START_TIME: &str = "History station start time";

/// Reads the exported WIP report. Column lookup is by header name, so the
/// sheet's column order does not matter.
pub fn read_wip_report(path: &Path) -> Result<Vec<WipRow>, ScrapeError> {
    if !path.exists() {
        return Err(ScrapeError::PreconditionMissing(format!(
            "WIP report {} not found",
            path.display()
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let headers = reader.headers()?.clone();
    let col = |name: &str| -> Result<usize, ScrapeError> {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| ScrapeError::ReportFormat(format!("missing column '{name}'")))
    };
    let ws_idx = col(COL_WORKSTATION)?;
    let sn_idx = col(COL_SN)?;
    let pn_idx = col(COL_PN)?;
    let time_idx = col(COL_START_TIME)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let field = |idx: usize| record.get(idx).unwrap_or("").to_string();
        rows.push(WipRow {
            workstation_name: field(ws_idx),
            sn: field(sn_idx),
            pn: field(pn_idx),
            start_time: field(time_idx),
        });
    }
    debug!(rows = rows.len(), report = %path.display(), "Read WIP report");
    Ok(rows)
}

/// Timestamp formats seen in WIP exports. Tried in order.
const START_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

fn parse_start_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    START_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Filters, sorts and dedups report rows into the ordered batch record list.
///
/// Keeps rows whose workstation name (uppercased) contains `REPAIR`;
/// serials are trimmed and uppercased. Rows are sorted by serial ascending,
/// then start time descending, so the first occurrence of each serial is
/// its most recent repair-station visit; duplicates after that are dropped.
/// Parsable timestamps order before unparsable ones; ties (including two
/// unparsable timestamps) keep original spreadsheet order, the stable sort
/// being the documented tie-break.
pub fn build_records(rows: Vec<WipRow>) -> Vec<SerialRecord> {
    let mut candidates: Vec<(WipRow, String, Option<NaiveDateTime>)> = rows
        .into_iter()
        .filter(|row| row.workstation_name.to_uppercase().contains("REPAIR"))
        .map(|row| {
            let sn = row.sn.trim().to_uppercase();
            let time = parse_start_time(&row.start_time);
            (row, sn, time)
        })
        .collect();

    candidates.sort_by(|(_, sn_a, time_a), (_, sn_b, time_b)| {
        // Descending time within one serial; None (unparsable) sorts last.
        sn_a.cmp(sn_b).then_with(|| match (time_a, time_b) {
            (Some(a), Some(b)) => b.cmp(a),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        })
    });

    let mut records = Vec::new();
    let mut last_sn: Option<&str> = None;
    for (row, sn, _) in &candidates {
        if sn.is_empty() || last_sn == Some(sn.as_str()) {
            continue;
        }
        records.push(SerialRecord {
            serial_number: sn.clone(),
            part_number: row.pn.clone(),
            workstation_name: row.workstation_name.clone(),
            workstation_prefix: station_prefix(&row.workstation_name),
            history_station_start_time: row.start_time.clone(),
        });
        last_sn = Some(sn.as_str());
    }
    records
}

/// Fixed-size contiguous partitions of the record list.
pub fn chunk_records(records: Vec<SerialRecord>, batch_size: usize) -> Vec<Vec<SerialRecord>> {
    assert!(batch_size > 0, "batch_size must be positive");
    let mut batches = Vec::new();
    let mut iter = records.into_iter().peekable();
    while iter.peek().is_some() {
        batches.push(iter.by_ref().take(batch_size).collect());
    }
    batches
}

/// Writes each batch to `<dir>/serial_batch_<N>.json` (1-based), returning
/// the written paths.
pub fn write_batches(dir: &Path, batches: &[Vec<SerialRecord>]) -> Result<Vec<PathBuf>, ScrapeError> {
    let mut paths = Vec::new();
    for (i, batch) in batches.iter().enumerate() {
        let path = dir.join(format!("serial_batch_{}.json", i + 1));
        let file = File::create(&path)?;
        serde_json::to_writer_pretty(file, batch)?;
        info!(batch = %path.display(), serials = batch.len(), "Wrote batch file");
        paths.push(path);
    }
    Ok(paths)
}

/// Loads one `serial_batch_<N>.json` file.
pub fn load_batch(path: &Path) -> Result<Vec<SerialRecord>, ScrapeError> {
    if !path.exists() {
        return Err(ScrapeError::PreconditionMissing(format!(
            "batch file {} not found",
            path.display()
        )));
    }
    let file = File::open(path)?;
    let batch = serde_json::from_reader(file)?;
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn wip(ws: &str, sn: &str, time: &str) -> WipRow {
        WipRow {
            workstation_name: ws.to_string(),
            sn: sn.to_string(),
            pn: "PN-9".to_string(),
            start_time: time.to_string(),
        }
    }

    #[test]
    fn non_repair_rows_are_filtered_out() {
        let records = build_records(vec![
            wip("ASSEMBLY_A1", "1111111111111", "2024-05-01 10:00:00"),
            wip("Repair_B2", "2222222222222", "2024-05-01 10:00:00"),
        ]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].serial_number, "2222222222222");
        assert_eq!(records[0].workstation_prefix, "Repair");
    }

    #[test]
    fn dedup_keeps_latest_visit() {
        let records = build_records(vec![
            wip("REPAIR_B2", "1111111111111", "2024-05-01 10:00:00"),
            wip("REPAIR_C3", "1111111111111", "2024-05-02 09:30:00"),
            wip("REPAIR_A1", "1111111111111", "2024-04-30 23:59:59"),
        ]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].workstation_name, "REPAIR_C3");
        assert_eq!(records[0].history_station_start_time, "2024-05-02 09:30:00");
    }

    #[test]
    fn serials_are_normalized_and_sorted_ascending() {
        let records = build_records(vec![
            wip("REPAIR_B2", "  zz999\t", "2024-05-01 10:00:00"),
            wip("REPAIR_B2", "aa111", "2024-05-01 10:00:00"),
        ]);
        let serials: Vec<_> = records.iter().map(|r| r.serial_number.as_str()).collect();
        assert_eq!(serials, ["AA111", "ZZ999"]);
    }

    #[test]
    fn parsable_timestamp_beats_unparsable() {
        let records = build_records(vec![
            wip("REPAIR_OLD", "1111111111111", "not a date"),
            wip("REPAIR_NEW", "1111111111111", "2024-05-01 10:00:00"),
        ]);
        assert_eq!(records[0].workstation_name, "REPAIR_NEW");
    }

    #[test]
    fn unparsable_tie_keeps_original_order() {
        let records = build_records(vec![
            wip("REPAIR_FIRST", "1111111111111", "???"),
            wip("REPAIR_SECOND", "1111111111111", "???"),
        ]);
        assert_eq!(records[0].workstation_name, "REPAIR_FIRST");
    }

    #[test]
    fn empty_serials_are_dropped() {
        let records = build_records(vec![wip("REPAIR_B2", "   ", "2024-05-01 10:00:00")]);
        assert!(records.is_empty());
    }

    #[test]
    fn chunking_is_contiguous_and_fixed_size() {
        let records: Vec<_> = (0..5)
            .map(|i| SerialRecord {
                serial_number: format!("{i:013}"),
                part_number: String::new(),
                workstation_name: "REPAIR_B2".to_string(),
                workstation_prefix: "REPAIR".to_string(),
                history_station_start_time: String::new(),
            })
            .collect();
        let batches = chunk_records(records, 2);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[2].len(), 1);
        assert_eq!(batches[2][0].serial_number, "0000000000004");
    }

    #[test]
    fn batch_files_round_trip() {
        let dir = tempdir().unwrap();
        let batches = vec![vec![SerialRecord {
            serial_number: "1234567890123".to_string(),
            part_number: "PN-9".to_string(),
            workstation_name: "REPAIR_B2".to_string(),
            workstation_prefix: "REPAIR".to_string(),
            history_station_start_time: "2024-05-01 10:00:00".to_string(),
        }]];
        let paths = write_batches(dir.path(), &batches).unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("serial_batch_1.json"));

        let loaded = load_batch(&paths[0]).unwrap();
        assert_eq!(loaded, batches[0]);
    }

    #[test]
    fn batch_json_uses_snake_case_contract() {
        let record = SerialRecord {
            serial_number: "1234567890123".to_string(),
            part_number: String::new(),
            workstation_name: "REPAIR_B2".to_string(),
            workstation_prefix: "REPAIR".to_string(),
            history_station_start_time: String::new(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("serial_number").is_some());
        assert!(json.get("workstation_prefix").is_some());

        // Fields other than the serial may be absent on the wire.
        let minimal: SerialRecord =
            serde_json::from_str(r#"{"serial_number":"TEST123456"}"#).unwrap();
        assert_eq!(minimal.serial_number, "TEST123456");
        assert_eq!(minimal.part_number, "");
    }

    #[test]
    fn report_reader_requires_named_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.csv");
        std::fs::write(&path, "SN,PN\n1,2\n").unwrap();
        let err = read_wip_report(&path).unwrap_err();
        assert!(matches!(err, ScrapeError::ReportFormat(_)));
    }

    #[test]
    fn report_reader_is_column_order_independent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.csv");
        std::fs::write(
            &path,
            "History station start time,PN,SN,Workstation Name\n\
             2024-05-01 10:00:00,PN-9,1234567890123,REPAIR_B2\n",
        )
        .unwrap();
        let rows = read_wip_report(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sn, "1234567890123");
        assert_eq!(rows[0].workstation_name, "REPAIR_B2");
    }
}
