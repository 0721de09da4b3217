// 📤 Report Export - Final spreadsheets, typed values formatted at the edge
//
// Everything upstream works with typed amounts and status enums; this is
// the only module that turns them into display strings. Each sheet goes
// out as its own CSV file.

use crate::aggregate::BoxSettlement;
use crate::error::Result;
use crate::record::{round2, MergedOrderLine, PaymentStatus};
use crate::seatmap::{MatchedSale, SeatRelease};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

// ============================================================================
// CURRENCY FORMATTING
// ============================================================================

/// Format an amount as "£#,##0.00". Negative amounts keep the sign in
/// front of the pound symbol.
pub fn format_gbp(amount: f64) -> String {
    let amount = round2(amount);
    let negative = amount < 0.0;
    let pence = (amount.abs() * 100.0).round() as u64;
    let pounds = pence / 100;
    let remainder = pence % 100;

    let digits = pounds.to_string();
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if negative { "-" } else { "" };
    format!("{sign}£{grouped}.{remainder:02}")
}

fn format_opt_gbp(amount: Option<f64>) -> String {
    amount.map(format_gbp).unwrap_or_default()
}

// ============================================================================
// MERGED DATA SHEET
// ============================================================================

/// Write the merged per-line sheet. `settlements` maps normalized
/// location to the box's payment status, stamped onto every line of that
/// box; lines from boxes with no settlement get empty payment columns.
pub fn write_merged_report(
    path: &Path,
    lines: &[MergedOrderLine],
    settlements: &HashMap<String, PaymentStatus>,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "Event Id",
        "Location",
        "Event",
        "Event Date",
        "Guest Name",
        "Guest Email",
        "Order Type",
        "Menu Item",
        "Ordered Amount",
        "Price Per Unit",
        "Ordered On",
        "Licence Type",
        "Total",
        "Pre-Order Status",
        "Payment Type",
        "Payment Status",
    ])?;

    for line in lines {
        let status = settlements.get(&crate::record::normalize_key(&line.location));
        writer.write_record([
            line.event_id.map(|id| id.to_string()).unwrap_or_default(),
            line.location.clone(),
            line.event.clone(),
            line.event_date
                .map(|d| d.format("%d/%m/%Y").to_string())
                .unwrap_or_default(),
            line.guest_name.clone(),
            line.guest_email.clone().unwrap_or_default(),
            line.order_type.label().to_string(),
            line.menu_item.clone().unwrap_or_default(),
            line.ordered_amount.map(|a| a.to_string()).unwrap_or_default(),
            format_opt_gbp(line.price_per_unit),
            line.ordered_on
                .map(|ts| ts.format("%d/%m/%Y %H:%M").to_string())
                .unwrap_or_default(),
            line.licence_type.clone().unwrap_or_default(),
            format_gbp(line.preorder_total),
            line.preorder_status.clone().unwrap_or_default(),
            status.map(|s| s.label().to_string()).unwrap_or_default(),
            status
                .map(|s| s.settlement_status().to_string())
                .unwrap_or_default(),
        ])?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = lines.len(), "merged report written");
    Ok(())
}

// ============================================================================
// BOX TOTAL SHEET
// ============================================================================

/// Write the per-box totals sheet with payment method and settlement.
pub fn write_box_totals(path: &Path, settlements: &[BoxSettlement]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "Location",
        "Event",
        "Total",
        "Payment Type",
        "Payment Status",
    ])?;
    for settlement in settlements {
        writer.write_record([
            settlement.location.clone(),
            settlement.event.clone(),
            format_gbp(settlement.amount),
            settlement.status.label().to_string(),
            settlement.status.settlement_status().to_string(),
        ])?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = settlements.len(), "box totals written");
    Ok(())
}

// ============================================================================
// SEAT LINKAGE SHEETS
// ============================================================================

pub fn write_matched_sales(path: &Path, matched: &[MatchedSale]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "Game Name",
        "Game Date",
        "Block",
        "Row",
        "Seat",
        "CRC Desc",
        "Price Band",
        "Category",
        "Seat Value",
        "Ticket Sold Price",
        "Value Generated",
    ])?;
    for m in matched {
        writer.write_record([
            m.sale.game_name.clone(),
            m.sale
                .game_date
                .map(|d| d.format("%d/%m/%Y").to_string())
                .unwrap_or_default(),
            m.sale.block.clone(),
            m.sale.row.clone(),
            m.sale.seat.clone(),
            m.crc_desc.clone(),
            m.price_band.clone(),
            m.category.clone(),
            format_gbp(m.seat_value),
            format_gbp(m.sale.ticket_sold_price),
            format_gbp(m.value_generated),
        ])?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = matched.len(), "matched sales written");
    Ok(())
}

pub fn write_seat_releases(path: &Path, releases: &[SeatRelease]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "Game Name",
        "Block",
        "Row",
        "Seat",
        "Matched",
        "Ticket Sold Price",
    ])?;
    for r in releases {
        writer.write_record([
            r.seat.game_name.clone(),
            r.seat.block.clone(),
            r.seat.row.clone(),
            r.seat.seat.clone(),
            if r.sold { "Y" } else { "N" }.to_string(),
            format_opt_gbp(r.ticket_sold_price),
        ])?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = releases.len(), "seat releases written");
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
