// 📥 Ingestion & Normalization - Uploaded reports → typed records
//
// The RTS exports are spreadsheet downloads saved as CSV with a fixed
// header offset: pre-order data begins at row 5, the consolidated payment
// report at row 6. Key columns are trimmed/lower-cased, currency strings
// parsed to numbers (0 on failure), dates parsed day-first. Rows missing a
// required key are dropped and counted; a required column that is entirely
// absent is a SchemaError and the caller must stop the pipeline.

use crate::error::{ReconError, Result};
use crate::record::{
    normalize_key, parse_currency, parse_date_dayfirst, parse_datetime_dayfirst, split_guest,
    ConsolidatedPaymentRecord, OrderType, RawOrderRecord,
};
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// Rows to skip before the pre-order header row (data begins row 5).
const PREORDER_HEADER_OFFSET: usize = 4;

/// Rows to skip before the consolidated header row (data begins row 6).
const CONSOLIDATED_HEADER_OFFSET: usize = 5;

// ============================================================================
// INGEST RESULT
// ============================================================================

/// A cleaned table plus the count of malformed rows that were dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingested<T> {
    pub records: Vec<T>,
    pub dropped: usize,
}

impl<T> Ingested<T> {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// HEADER HANDLING
// ============================================================================

/// Read a CSV file, skipping `offset` rows, then treating the next row as
/// the header. Returns a normalized header → column index map and the
/// data rows. Unnamed/empty header cells are ignored, matching the
/// export's padding columns.
pub(crate) fn read_with_offset(
    path: &Path,
    offset: usize,
) -> Result<(HashMap<String, usize>, Vec<StringRecord>)> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for row in reader.records() {
        rows.push(row?);
    }

    if rows.len() <= offset {
        return Err(ReconError::EmptyResult { stage: "ingestion" });
    }

    let header_row = rows.remove(offset);
    let mut headers = HashMap::new();
    for (idx, cell) in header_row.iter().enumerate() {
        let name = normalize_header(cell);
        if !name.is_empty() && !name.starts_with("unnamed") {
            headers.entry(name).or_insert(idx);
        }
    }

    rows.drain(..offset);
    Ok((headers, rows))
}

/// Header cells are trimmed, lower-cased, and spaces collapsed to
/// underscores ("Order type" and "Order_type" address the same column).
fn normalize_header(cell: &str) -> String {
    cell.trim().to_lowercase().replace(' ', "_")
}

pub(crate) fn require_column(
    headers: &HashMap<String, usize>,
    name: &'static str,
    source_name: &'static str,
) -> Result<usize> {
    headers
        .get(name)
        .copied()
        .ok_or(ReconError::Schema {
            source_name,
            column: name,
        })
}

pub(crate) fn cell<'a>(row: &'a StringRecord, idx: usize) -> &'a str {
    row.get(idx).unwrap_or("").trim()
}

// ============================================================================
// PRE-ORDER REPORT
// ============================================================================

/// Load the manually exported pre-order report.
///
/// Cleanup matches the export quirks:
/// - Location cells are forward-filled (merged cells arrive blank).
/// - A row may pack several events into one cell separated by ", "; it is
///   exploded into one record per event.
/// - Guest cells embed the email in parentheses.
/// - Exact-duplicate rows are dropped.
pub fn load_preorder_report(path: &Path) -> Result<Ingested<RawOrderRecord>> {
    const SOURCE: &str = "pre-order report";

    let (headers, rows) = read_with_offset(path, PREORDER_HEADER_OFFSET)?;

    let col_location = require_column(&headers, "location", SOURCE)?;
    let col_event = require_column(&headers, "event", SOURCE)?;
    let col_order_type = require_column(&headers, "order_type", SOURCE)?;
    let col_guest = require_column(&headers, "guest_name", SOURCE)?;
    let col_total = require_column(&headers, "total", SOURCE)?;
    // Optional columns: older exports lack them.
    let col_event_date = headers.get("event_date").copied();
    let col_ordered_on = headers.get("ordered_on").copied();
    let col_licence = headers.get("licence_type").copied();
    let col_status = headers.get("status").copied();

    let mut records = Vec::new();
    let mut dropped = 0usize;
    let mut last_location = String::new();
    let mut seen = HashSet::new();

    for row in &rows {
        // Forward-fill Location
        let raw_location = cell(row, col_location);
        if !raw_location.is_empty() {
            last_location = raw_location.to_string();
        }
        let location = last_location.clone();

        let event_cell = cell(row, col_event);
        let order_type_cell = cell(row, col_order_type);
        if location.is_empty() || event_cell.is_empty() || order_type_cell.is_empty() {
            dropped += 1;
            continue;
        }
        let order_type = match OrderType::from_label(order_type_cell) {
            Some(ot) => ot,
            None => {
                debug!(order_type = order_type_cell, "unknown order type, row dropped");
                dropped += 1;
                continue;
            }
        };

        let (guest_name, guest_email) = split_guest(cell(row, col_guest));
        if guest_name.is_empty() {
            dropped += 1;
            continue;
        }

        let total = parse_currency(cell(row, col_total));
        let event_date = col_event_date.and_then(|c| parse_date_dayfirst(cell(row, c)));
        let ordered_on = col_ordered_on.and_then(|c| parse_datetime_dayfirst(cell(row, c)));
        let licence_type = col_licence
            .map(|c| cell(row, c).to_string())
            .filter(|s| !s.is_empty());
        let status = col_status
            .map(|c| cell(row, c).to_string())
            .filter(|s| !s.is_empty());

        // Explode multi-event cells ("Arsenal v Chelsea, Arsenal v Spurs")
        for event in event_cell.split(", ") {
            let event = event.trim();
            if event.is_empty() {
                continue;
            }
            let dedup = (
                normalize_key(&location),
                normalize_key(event),
                event_date,
                normalize_key(&guest_name),
                guest_email.clone().unwrap_or_default(),
                order_type,
                total.to_bits(),
                ordered_on,
            );
            if !seen.insert(dedup) {
                continue;
            }
            records.push(RawOrderRecord {
                location: location.clone(),
                event: event.to_string(),
                event_date,
                guest_name: guest_name.clone(),
                guest_email: guest_email.clone(),
                order_type,
                total,
                ordered_on,
                licence_type: licence_type.clone(),
                status: status.clone(),
                event_id: None,
            });
        }
    }

    debug!(rows = records.len(), dropped, "pre-order report ingested");
    Ok(Ingested { records, dropped })
}

// ============================================================================
// CONSOLIDATED PAYMENT REPORT
// ============================================================================

/// Load the consolidated payment export for one fixture.
///
/// The file lacks Event/EventDate columns; both are injected from the
/// caller's fixture selection. If the file does carry them, every row must
/// match the selection (a mismatched file is a hard error, not a filter).
pub fn load_consolidated_report(
    path: &Path,
    event: &str,
    event_date: NaiveDate,
) -> Result<Ingested<ConsolidatedPaymentRecord>> {
    const SOURCE: &str = "consolidated payment report";

    let (headers, rows) = read_with_offset(path, CONSOLIDATED_HEADER_OFFSET)?;

    let col_location = require_column(&headers, "location", SOURCE)?;
    let col_drawdown = require_column(&headers, "drawdown", SOURCE)?;
    let col_credit = require_column(&headers, "credit_card", SOURCE)?;
    let col_po = require_column(&headers, "purchase_orders", SOURCE)?;
    let col_eft = require_column(&headers, "eft", SOURCE)?;
    let col_event = headers.get("event").copied();
    let col_event_date = headers.get("event_date").copied();

    let selected_event = normalize_key(event);
    let mut records = Vec::new();
    let mut dropped = 0usize;
    let mut matched = 0usize;
    let mut total_rows = 0usize;

    for row in &rows {
        let location = cell(row, col_location);
        if location.is_empty() {
            dropped += 1;
            continue;
        }
        // Summary rows ("Grand total", "Total") are layout, not data.
        if location.to_lowercase().contains("total") {
            continue;
        }
        total_rows += 1;

        // Verify the file belongs to the selected fixture when it says so.
        let row_matches = match (col_event, col_event_date) {
            (Some(ce), Some(cd)) => {
                normalize_key(cell(row, ce)) == selected_event
                    && parse_date_dayfirst(cell(row, cd)) == Some(event_date)
            }
            (Some(ce), None) => normalize_key(cell(row, ce)) == selected_event,
            _ => true,
        };
        if row_matches {
            matched += 1;
        } else {
            continue;
        }

        records.push(ConsolidatedPaymentRecord {
            location: location.to_string(),
            event: selected_event.clone(),
            event_date,
            drawdown: parse_currency(cell(row, col_drawdown)),
            credit_card: parse_currency(cell(row, col_credit)),
            purchase_orders: parse_currency(cell(row, col_po)),
            eft: parse_currency(cell(row, col_eft)),
        });
    }

    if matched != total_rows {
        return Err(ReconError::FixtureMismatch {
            fixture: event.to_string(),
            date: event_date,
            matched,
            total: total_rows,
        });
    }

    debug!(rows = records.len(), dropped, "consolidated report ingested");
    Ok(Ingested { records, dropped })
}

// ============================================================================
// FIXTURE LIST
// ============================================================================

/// One (fixture name, event date) pair from the static reference sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    pub name: String,
    pub date: NaiveDate,
}

/// Load the fixture list reference sheet (FixtureName, EventDate; no
/// header offset). Rows with an unparseable date are dropped and counted.
pub fn load_fixture_list(path: &Path) -> Result<Ingested<Fixture>> {
    const SOURCE: &str = "fixture list";

    let (headers, rows) = read_with_offset(path, 0)?;
    let col_name = require_column(&headers, "fixturename", SOURCE)?;
    let col_date = require_column(&headers, "eventdate", SOURCE)?;

    let mut records = Vec::new();
    let mut dropped = 0usize;
    for row in &rows {
        let name = cell(row, col_name);
        let date = parse_date_dayfirst(cell(row, col_date));
        match (name.is_empty(), date) {
            (false, Some(date)) => records.push(Fixture {
                name: name.to_string(),
                date,
            }),
            _ => dropped += 1,
        }
    }

    Ok(Ingested { records, dropped })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    const PREORDER_HEADER: &str = "\
Suites Pre-Orders,,,,,,,\n\
Exported 01/10/2024,,,,,,,\n\
,,,,,,,\n\
,,,,,,,\n\
Location,Event,Event Date,Guest name,Order type,Total,Ordered on,Licence type\n";

    #[test]
    fn test_load_preorder_report_basic() {
        let file = write_csv(&format!(
            "{}Box 12,Arsenal v Chelsea,01/09/2024,J Smith (j@x.com),Food,\"£45.00\",28/08/2024 10:15,Annual\n",
            PREORDER_HEADER
        ));
        let out = load_preorder_report(file.path()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.dropped, 0);

        let rec = &out.records[0];
        assert_eq!(rec.location, "Box 12");
        assert_eq!(rec.guest_name, "J Smith");
        assert_eq!(rec.guest_email, Some("j@x.com".to_string()));
        assert_eq!(rec.order_type, OrderType::Food);
        assert_eq!(rec.total, 45.0);
        assert_eq!(rec.event_date, NaiveDate::from_ymd_opt(2024, 9, 1));
        assert_eq!(rec.licence_type, Some("Annual".to_string()));
        assert!(rec.event_id.is_none());
    }

    #[test]
    fn test_load_preorder_report_forward_fills_location() {
        let file = write_csv(&format!(
            "{}Box 12,Arsenal v Chelsea,01/09/2024,J Smith (j@x.com),Food,45.00,,\n\
             ,Arsenal v Chelsea,01/09/2024,A Doe (a@x.com),Drink,12.00,,\n",
            PREORDER_HEADER
        ));
        let out = load_preorder_report(file.path()).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.records[1].location, "Box 12");
    }

    #[test]
    fn test_load_preorder_report_explodes_multi_event_cells() {
        let file = write_csv(&format!(
            "{}Box 3,\"Arsenal v Chelsea, Arsenal v Spurs\",,B Kane (b@x.com),Food,30.00,,\n",
            PREORDER_HEADER
        ));
        let out = load_preorder_report(file.path()).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.records[0].event, "Arsenal v Chelsea");
        assert_eq!(out.records[1].event, "Arsenal v Spurs");
    }

    #[test]
    fn test_load_preorder_report_drops_and_counts_bad_rows() {
        let file = write_csv(&format!(
            "{}Box 12,,01/09/2024,J Smith,Food,45.00,,\n\
             Box 12,Arsenal v Chelsea,01/09/2024,J Smith,Merchandise,45.00,,\n\
             Box 12,Arsenal v Chelsea,01/09/2024,J Smith (j@x.com),Food,45.00,,\n",
            PREORDER_HEADER
        ));
        let out = load_preorder_report(file.path()).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.dropped, 2);
    }

    #[test]
    fn test_load_preorder_report_drops_exact_duplicates() {
        let row = "Box 12,Arsenal v Chelsea,01/09/2024,J Smith (j@x.com),Food,45.00,28/08/2024 10:15,\n";
        let file = write_csv(&format!("{}{}{}", PREORDER_HEADER, row, row));
        let out = load_preorder_report(file.path()).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_load_preorder_report_missing_column_is_schema_error() {
        let file = write_csv(
            "a,,,,\nb,,,,\nc,,,,\nd,,,,\nLocation,Event,Guest name,Total,Ordered on\n",
        );
        let err = load_preorder_report(file.path()).unwrap_err();
        match err {
            ReconError::Schema { column, .. } => assert_eq!(column, "order_type"),
            other => panic!("expected SchemaError, got {other:?}"),
        }
    }

    const CONSOLIDATED_HEADER: &str = "\
Consolidated Payments,,,,\n\
,,,,\n\
,,,,\n\
,,,,\n\
,,,,\n\
Location,Drawdown,Credit card,Purchase orders,EFT\n";

    fn sept_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 9, 1).unwrap()
    }

    #[test]
    fn test_load_consolidated_report_injects_fixture_selection() {
        let file = write_csv(&format!(
            "{}Box 12,\"£100.00\",\"£0.00\",,\n\
             Grand Total,\"£100.00\",,,\n",
            CONSOLIDATED_HEADER
        ));
        let out = load_consolidated_report(file.path(), "Arsenal v Chelsea", sept_first()).unwrap();
        assert_eq!(out.len(), 1);

        let rec = &out.records[0];
        assert_eq!(rec.event, "arsenal v chelsea");
        assert_eq!(rec.event_date, sept_first());
        assert_eq!(rec.drawdown, 100.0);
        assert_eq!(rec.eft, 0.0);
    }

    #[test]
    fn test_load_consolidated_report_rejects_wrong_fixture() {
        let file = write_csv(
            "x,,,,,\n,,,,,\n,,,,,\n,,,,,\n,,,,,\n\
             Location,Event,Drawdown,Credit card,Purchase orders,EFT\n\
             Box 12,Arsenal v Spurs,100.00,0,0,0\n",
        );
        let err =
            load_consolidated_report(file.path(), "Arsenal v Chelsea", sept_first()).unwrap_err();
        assert!(matches!(err, ReconError::FixtureMismatch { matched: 0, total: 1, .. }));
    }

    #[test]
    fn test_load_fixture_list() {
        let file = write_csv(
            "FixtureName,EventDate\n\
             Arsenal v Chelsea,01/09/2024\n\
             Arsenal v Chelsea,14/01/2025\n\
             Arsenal v Spurs,not a date\n",
        );
        let out = load_fixture_list(file.path()).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out.dropped, 1);
        assert_eq!(out.records[0].name, "Arsenal v Chelsea");
    }
}
