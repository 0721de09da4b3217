// 🎫 Hospitality Pre-Order Reconciliation CLI

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use std::env;
use std::path::PathBuf;

use hosp_recon::api::{ApiConfig, CateringClient};
use hosp_recon::pipeline::{
    load_snapshot_json, run, run_seat_linkage, save_snapshot_json, RunConfig, SeatLinkageConfig,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("hosp_recon=info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("run") => run_reconciliation(&args[2..]),
        Some("seats") => run_seats(&args[2..]),
        Some("snapshot") => run_snapshot(&args[2..]),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("🎫 Hospitality Pre-Order Reconciliation v{}", hosp_recon::VERSION);
    println!();
    println!("Usage:");
    println!("  hosp-recon run --preorders <csv> --consolidated <csv> --fixtures <csv> \\");
    println!("                 --fixture <name> [--date DD/MM/YYYY] [--from DD/MM/YYYY --to DD/MM/YYYY] \\");
    println!("                 [--snapshot <json>] [--out <dir>]");
    println!("  hosp-recon seats --sales <csv> --hosp <csv> --seat-list <csv> \\");
    println!("                 --game-category <csv> [--out <dir>]");
    println!("  hosp-recon snapshot --out <json>");
    println!();
    println!("Environment: HOSP_API_BASE, HOSP_API_USERNAME, HOSP_API_PASSWORD");
}

fn flag(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn required_path(args: &[String], name: &str) -> Result<PathBuf> {
    flag(args, name)
        .map(PathBuf::from)
        .with_context(|| format!("missing required argument {name}"))
}

fn parse_date_flag(args: &[String], name: &str) -> Result<Option<NaiveDate>> {
    match flag(args, name) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(&raw, "%d/%m/%Y")
            .map(Some)
            .with_context(|| format!("{name} must be DD/MM/YYYY, got '{raw}'")),
    }
}

fn run_reconciliation(args: &[String]) -> Result<()> {
    let fixture_name = flag(args, "--fixture").context("missing required argument --fixture")?;
    let from = parse_date_flag(args, "--from")?;
    let to = parse_date_flag(args, "--to")?;
    let ordered_window = match (from, to) {
        (Some(from), Some(to)) => Some((from, to)),
        (None, None) => None,
        _ => bail!("--from and --to must be given together"),
    };

    let config = RunConfig {
        preorder_path: required_path(args, "--preorders")?,
        consolidated_path: required_path(args, "--consolidated")?,
        fixture_list_path: required_path(args, "--fixtures")?,
        fixture_name,
        event_date: parse_date_flag(args, "--date")?,
        ordered_window,
        output_dir: flag(args, "--out").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("out")),
    };

    // Replay a captured snapshot when given one, otherwise fetch live
    let snapshot = match flag(args, "--snapshot") {
        Some(path) => load_snapshot_json(path.as_ref())?,
        None => {
            println!("🌐 Fetching catering API snapshot...");
            CateringClient::new(ApiConfig::from_env()?)?.fetch_snapshot()?
        }
    };
    if !snapshot.skipped_events.is_empty() {
        println!(
            "⚠️  {} event(s) skipped after fetch failures: {:?}",
            snapshot.skipped_events.len(),
            snapshot.skipped_events
        );
    }

    let summary = run(&config, &snapshot)?;

    println!("✅ Reconciliation complete: {} on {}", summary.fixture, summary.event_date);
    println!("✓ {} merged lines across {} boxes", summary.merged_lines, summary.boxes);
    if summary.unresolved_boxes > 0 {
        println!("⚠️  {} box(es) with unresolved payment status", summary.unresolved_boxes);
    }
    if summary.dropped_rows > 0 {
        println!("✓ {} malformed row(s) dropped during ingestion", summary.dropped_rows);
    }
    println!("📄 {}", summary.merged_path.display());
    println!("📄 {}", summary.totals_path.display());
    Ok(())
}

fn run_seats(args: &[String]) -> Result<()> {
    let config = SeatLinkageConfig {
        sales_path: required_path(args, "--sales")?,
        hosp_path: required_path(args, "--hosp")?,
        seat_list_path: required_path(args, "--seat-list")?,
        game_category_path: required_path(args, "--game-category")?,
        output_dir: flag(args, "--out").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("out")),
    };

    let summary = run_seat_linkage(&config)?;

    println!("✅ Seat linkage complete");
    println!("✓ {} sales matched to hospitality seats", summary.matched_sales);
    println!("✓ {} released seats, {} sold", summary.releases, summary.releases_sold);
    println!("📄 {}", summary.matched_path.display());
    println!("📄 {}", summary.releases_path.display());
    Ok(())
}

fn run_snapshot(args: &[String]) -> Result<()> {
    let out = required_path(args, "--out")?;

    println!("🌐 Fetching catering API snapshot...");
    let snapshot = CateringClient::new(ApiConfig::from_env()?)?.fetch_snapshot()?;

    println!(
        "✓ {} events, {} pre-order entries ({} skipped)",
        snapshot.events.len(),
        snapshot.preorders.len(),
        snapshot.skipped_events.len()
    );
    save_snapshot_json(&out, &snapshot)?;
    println!("📄 {}", out.display());
    Ok(())
}
