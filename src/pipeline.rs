// 🚂 Pipeline - One reconciliation run, ingestion through export
//
// The API snapshot is an explicit argument rather than something fetched
// inside: runs are reproducible against a captured snapshot, and tests
// drive the whole pipeline without a network.

use crate::aggregate::{
    assign_payment_status, box_totals, filter_completed_for_fixture, settlement_index,
};
use crate::api::ApiSnapshot;
use crate::error::Result;
use crate::ingest::{load_consolidated_report, load_fixture_list, load_preorder_report};
use crate::linkage::{filter_ordered_between, lump_sum_dedup, merge_orders};
use crate::record::PaymentStatus;
use crate::reconcile::check_sums;
use crate::report::{write_box_totals, write_matched_sales, write_merged_report, write_seat_releases};
use crate::resolve::{select_fixture, EventIndex};
use crate::seatmap::{
    load_game_categories, load_hosp_seats, load_seat_list, load_ticket_sales, match_releases,
    match_sales,
};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::info;

// ============================================================================
// RECONCILIATION RUN
// ============================================================================

/// Inputs for one reconciliation run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub preorder_path: PathBuf,
    pub consolidated_path: PathBuf,
    pub fixture_list_path: PathBuf,
    pub fixture_name: String,
    /// Required when the fixture name appears on several dates.
    pub event_date: Option<NaiveDate>,
    /// Optional inclusive window on when orders were placed.
    pub ordered_window: Option<(NaiveDate, NaiveDate)>,
    pub output_dir: PathBuf,
}

/// What a completed run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub fixture: String,
    pub event_date: NaiveDate,
    pub merged_lines: usize,
    pub boxes: usize,
    pub unresolved_boxes: usize,
    pub dropped_rows: usize,
    pub merged_path: PathBuf,
    pub totals_path: PathBuf,
}

pub fn run(config: &RunConfig, snapshot: &ApiSnapshot) -> Result<RunSummary> {
    let fixtures = load_fixture_list(&config.fixture_list_path)?;
    let fixture = select_fixture(&fixtures.records, &config.fixture_name, config.event_date)?;
    info!(fixture = %fixture.name, date = %fixture.date, "reconciliation run started");

    let manual = load_preorder_report(&config.preorder_path)?;
    let mut records = manual.records;

    let menu_lines = snapshot.menu_lines();
    EventIndex::build(snapshot).resolve(&mut records);

    // Dedup straight after the merge; the window filter sees final amounts
    let mut merged = lump_sum_dedup(merge_orders(&records, &menu_lines)?);
    if let Some((from, to)) = config.ordered_window {
        merged = filter_ordered_between(merged, from, to)?;
    }

    let completed = filter_completed_for_fixture(&merged, &fixture)?;
    let totals = box_totals(&completed);

    let payments = load_consolidated_report(&config.consolidated_path, &fixture.name, fixture.date)?;

    // Hard gate: no export when the books disagree
    check_sums(&totals, &payments.records)?;

    let settlements = assign_payment_status(&totals, &payments.records);
    let by_location = settlement_index(&settlements);

    std::fs::create_dir_all(&config.output_dir)?;
    let merged_path = config.output_dir.join("merged_data.csv");
    let totals_path = config.output_dir.join("exec_box_total.csv");
    write_merged_report(&merged_path, &completed, &by_location)?;
    write_box_totals(&totals_path, &settlements)?;

    let unresolved_boxes = settlements
        .iter()
        .filter(|s| s.status == PaymentStatus::Unresolved)
        .count();
    info!(
        lines = completed.len(),
        boxes = settlements.len(),
        unresolved_boxes,
        "reconciliation run finished"
    );

    Ok(RunSummary {
        fixture: fixture.name,
        event_date: fixture.date,
        merged_lines: completed.len(),
        boxes: settlements.len(),
        unresolved_boxes,
        dropped_rows: manual.dropped + payments.dropped + fixtures.dropped,
        merged_path,
        totals_path,
    })
}

// ============================================================================
// SEAT LINKAGE RUN
// ============================================================================

/// Inputs for the companion seat linkage run.
#[derive(Debug, Clone)]
pub struct SeatLinkageConfig {
    pub sales_path: PathBuf,
    pub hosp_path: PathBuf,
    pub seat_list_path: PathBuf,
    pub game_category_path: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SeatLinkageSummary {
    pub matched_sales: usize,
    pub releases: usize,
    pub releases_sold: usize,
    pub matched_path: PathBuf,
    pub releases_path: PathBuf,
}

pub fn run_seat_linkage(config: &SeatLinkageConfig) -> Result<SeatLinkageSummary> {
    let seat_list = load_seat_list(&config.seat_list_path)?;
    let categories = load_game_categories(&config.game_category_path)?;
    let sales = load_ticket_sales(&config.sales_path)?;
    let releases = load_hosp_seats(&config.hosp_path)?;

    let matched = match_sales(&sales.records, &seat_list.records, &categories.records);
    let release_results = match_releases(&releases.records, &sales.records);

    std::fs::create_dir_all(&config.output_dir)?;
    let matched_path = config.output_dir.join("matched_sales.csv");
    let releases_path = config.output_dir.join("seat_releases.csv");
    write_matched_sales(&matched_path, &matched)?;
    write_seat_releases(&releases_path, &release_results)?;

    Ok(SeatLinkageSummary {
        matched_sales: matched.len(),
        releases: release_results.len(),
        releases_sold: release_results.iter().filter(|r| r.sold).count(),
        matched_path,
        releases_path,
    })
}

// ============================================================================
// SNAPSHOT CAPTURE / REPLAY
// ============================================================================

/// Persist a fetched snapshot so later runs can replay it byte-for-byte.
pub fn save_snapshot_json(path: &Path, snapshot: &ApiSnapshot) -> Result<()> {
    let raw = serde_json::to_string_pretty(snapshot)?;
    std::fs::write(path, raw)?;
    info!(path = %path.display(), "API snapshot saved");
    Ok(())
}

pub fn load_snapshot_json(path: &Path) -> Result<ApiSnapshot> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
