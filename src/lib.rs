// Hospitality Pre-Order Reconciliation - Core Library
// Exposes all modules for use in the CLI and tests

pub mod aggregate;
pub mod api;
pub mod error;
pub mod ingest;
pub mod linkage;
pub mod pipeline;
pub mod reconcile;
pub mod record;
pub mod report;
pub mod resolve;
pub mod seatmap;

// Re-export commonly used types
pub use aggregate::{
    assign_payment_status, box_totals, filter_completed_for_fixture, settlement_index,
    BoxSettlement,
};
pub use api::{ApiConfig, ApiEvent, ApiSnapshot, CateringClient, CateringPreorder, EventKey};
pub use error::{ReconError, Result};
pub use ingest::{
    load_consolidated_report, load_fixture_list, load_preorder_report, Fixture, Ingested,
};
pub use linkage::{filter_ordered_between, lump_sum_dedup, merge_orders};
pub use pipeline::{
    load_snapshot_json, run, run_seat_linkage, save_snapshot_json, RunConfig, RunSummary,
    SeatLinkageConfig, SeatLinkageSummary,
};
pub use reconcile::{check_sums, SUM_TOLERANCE};
pub use record::{
    normalize_key, parse_currency, round2, split_guest, ApiMenuLine, BoxTotal,
    ConsolidatedPaymentRecord, MergedOrderLine, OrderKey, OrderType, PaymentStatus,
    RawOrderRecord,
};
pub use report::format_gbp;
pub use resolve::{select_fixture, EventIndex};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
