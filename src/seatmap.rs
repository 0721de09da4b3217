// 💺 Seat Linkage - Ticket exchange sales vs hospitality seat holdings
//
// Companion tool to the pre-order reconciliation: links ticket exchange
// sales to the hospitality seat list, prices each sale against the game
// category table, and flags which hospitality-released seats actually
// sold. Sheets arrive as CSV exports with a normal header row (no offset
// preamble, unlike the RTS reports).

use crate::error::Result;
use crate::ingest::{cell, read_with_offset, require_column, Ingested};
use crate::record::{normalize_key, parse_currency, parse_date_dayfirst, round2};
use chrono::NaiveDate;
use std::path::Path;
use tracing::debug;

/// Normalize a block label: "C012" and "12" both describe club-level
/// block 12 and come out as "12 Club level"; anything else is kept as-is.
pub fn adjust_block(block: &str) -> String {
    let block = block.trim();
    let digits = block.strip_prefix('C').unwrap_or(block);
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(number) = digits.parse::<u32>() {
            return format!("{number} Club level");
        }
    }
    block.to_string()
}

// ============================================================================
// SOURCE TABLES
// ============================================================================

/// One hospitality seat with its price band, from the seat list sheet.
#[derive(Debug, Clone)]
pub struct SeatListEntry {
    pub block: String,
    pub row: String,
    pub seat: String,
    pub crc_desc: String,
    pub price_band: String,
}

/// Per-game, per-price-band category and face value.
#[derive(Debug, Clone)]
pub struct GameCategory {
    pub game_name: String,
    pub game_date: Option<NaiveDate>,
    pub price_band: String,
    pub category: String,
    pub seat_value: f64,
}

/// One ticket exchange sale.
#[derive(Debug, Clone)]
pub struct TicketSale {
    pub game_name: String,
    pub game_date: Option<NaiveDate>,
    pub block: String,
    pub row: String,
    pub seat: String,
    pub ticket_sold_price: f64,
}

/// One seat a hospitality holder released back for resale.
#[derive(Debug, Clone)]
pub struct HospSeat {
    pub game_name: String,
    pub block: String,
    pub row: String,
    pub seat: String,
}

// ============================================================================
// OUTPUT ROWS
// ============================================================================

/// A sale matched to the seat list and priced against its game category.
#[derive(Debug, Clone)]
pub struct MatchedSale {
    pub sale: TicketSale,
    pub crc_desc: String,
    pub price_band: String,
    pub category: String,
    pub seat_value: f64,
    /// Sold price minus face value.
    pub value_generated: f64,
}

/// A released hospitality seat with its resale outcome.
#[derive(Debug, Clone)]
pub struct SeatRelease {
    pub seat: HospSeat,
    pub sold: bool,
    pub ticket_sold_price: Option<f64>,
}

// ============================================================================
// LOADERS
// ============================================================================

pub fn load_seat_list(path: &Path) -> Result<Ingested<SeatListEntry>> {
    const SOURCE: &str = "seat list";
    let (headers, rows) = read_with_offset(path, 0)?;
    let block_idx = require_column(&headers, "block", SOURCE)?;
    let row_idx = require_column(&headers, "row", SOURCE)?;
    let seat_idx = require_column(&headers, "seat", SOURCE)?;
    let crc_idx = require_column(&headers, "crc_desc", SOURCE)?;
    let band_idx = require_column(&headers, "price_band", SOURCE)?;

    let mut records = Vec::new();
    let mut dropped = 0;
    for row in &rows {
        let block = cell(row, block_idx);
        let seat = cell(row, seat_idx);
        if block.is_empty() || seat.is_empty() {
            dropped += 1;
            continue;
        }
        records.push(SeatListEntry {
            block: adjust_block(block),
            row: cell(row, row_idx).to_string(),
            seat: seat.to_string(),
            crc_desc: cell(row, crc_idx).to_string(),
            price_band: cell(row, band_idx).to_string(),
        });
    }
    debug!(loaded = records.len(), dropped, "seat list loaded");
    Ok(Ingested { records, dropped })
}

pub fn load_game_categories(path: &Path) -> Result<Ingested<GameCategory>> {
    const SOURCE: &str = "game category";
    let (headers, rows) = read_with_offset(path, 0)?;
    let game_idx = require_column(&headers, "game_name", SOURCE)?;
    let date_idx = require_column(&headers, "game_date", SOURCE)?;
    let band_idx = require_column(&headers, "price_band", SOURCE)?;
    let cat_idx = require_column(&headers, "category", SOURCE)?;
    let value_idx = require_column(&headers, "seat_value", SOURCE)?;

    let mut records = Vec::new();
    let mut dropped = 0;
    for row in &rows {
        let game_name = cell(row, game_idx);
        if game_name.is_empty() {
            dropped += 1;
            continue;
        }
        records.push(GameCategory {
            game_name: game_name.to_string(),
            game_date: parse_date_dayfirst(cell(row, date_idx)),
            price_band: cell(row, band_idx).to_string(),
            category: cell(row, cat_idx).to_string(),
            seat_value: parse_currency(cell(row, value_idx)),
        });
    }
    debug!(loaded = records.len(), dropped, "game categories loaded");
    Ok(Ingested { records, dropped })
}

pub fn load_ticket_sales(path: &Path) -> Result<Ingested<TicketSale>> {
    const SOURCE: &str = "ticket exchange sales";
    let (headers, rows) = read_with_offset(path, 0)?;
    let game_idx = require_column(&headers, "game_name", SOURCE)?;
    let date_idx = require_column(&headers, "game_date", SOURCE)?;
    let block_idx = require_column(&headers, "block", SOURCE)?;
    let row_idx = require_column(&headers, "row", SOURCE)?;
    let seat_idx = require_column(&headers, "seat", SOURCE)?;
    let price_idx = require_column(&headers, "ticket_sold_price", SOURCE)?;

    let mut records = Vec::new();
    let mut dropped = 0;
    for row in &rows {
        let game_name = cell(row, game_idx);
        let seat = cell(row, seat_idx);
        if game_name.is_empty() || seat.is_empty() {
            dropped += 1;
            continue;
        }
        records.push(TicketSale {
            game_name: game_name.to_string(),
            game_date: parse_date_dayfirst(cell(row, date_idx)),
            block: adjust_block(cell(row, block_idx)),
            row: cell(row, row_idx).to_string(),
            seat: seat.to_string(),
            ticket_sold_price: parse_currency(cell(row, price_idx)),
        });
    }
    debug!(loaded = records.len(), dropped, "ticket sales loaded");
    Ok(Ingested { records, dropped })
}

pub fn load_hosp_seats(path: &Path) -> Result<Ingested<HospSeat>> {
    const SOURCE: &str = "hospitality seats";
    let (headers, rows) = read_with_offset(path, 0)?;
    let game_idx = require_column(&headers, "game_name", SOURCE)?;
    let block_idx = require_column(&headers, "block", SOURCE)?;
    let row_idx = require_column(&headers, "row", SOURCE)?;
    let seat_idx = require_column(&headers, "seat", SOURCE)?;

    let mut records = Vec::new();
    let mut dropped = 0;
    for row in &rows {
        let game_name = cell(row, game_idx);
        let seat = cell(row, seat_idx);
        if game_name.is_empty() || seat.is_empty() {
            dropped += 1;
            continue;
        }
        records.push(HospSeat {
            game_name: game_name.to_string(),
            block: adjust_block(cell(row, block_idx)),
            row: cell(row, row_idx).to_string(),
            seat: seat.to_string(),
        });
    }
    debug!(loaded = records.len(), dropped, "hospitality seats loaded");
    Ok(Ingested { records, dropped })
}

// ============================================================================
// MATCHING
// ============================================================================

fn seat_key(block: &str, row: &str, seat: &str) -> (String, String, String) {
    (
        normalize_key(block),
        normalize_key(row),
        normalize_key(seat),
    )
}

/// Match sales to the seat list, then price each against its game
/// category. A sale whose seat or game category is unknown is excluded;
/// it belongs to general admission, not hospitality.
pub fn match_sales(
    sales: &[TicketSale],
    seat_list: &[SeatListEntry],
    categories: &[GameCategory],
) -> Vec<MatchedSale> {
    let mut matched = Vec::new();
    for sale in sales {
        let Some(entry) = seat_list
            .iter()
            .find(|e| seat_key(&e.block, &e.row, &e.seat) == seat_key(&sale.block, &sale.row, &sale.seat))
        else {
            continue;
        };
        let Some(category) = categories.iter().find(|c| {
            normalize_key(&c.game_name) == normalize_key(&sale.game_name)
                && c.game_date == sale.game_date
                && normalize_key(&c.price_band) == normalize_key(&entry.price_band)
        }) else {
            continue;
        };
        matched.push(MatchedSale {
            sale: sale.clone(),
            crc_desc: entry.crc_desc.clone(),
            price_band: entry.price_band.clone(),
            category: category.category.clone(),
            seat_value: category.seat_value,
            value_generated: round2(sale.ticket_sold_price - category.seat_value),
        });
    }
    debug!(sales = sales.len(), matched = matched.len(), "sales matched");
    matched
}

/// Mark each released hospitality seat sold or unsold against the sales
/// table, carrying the sold price when there is one.
pub fn match_releases(releases: &[HospSeat], sales: &[TicketSale]) -> Vec<SeatRelease> {
    releases
        .iter()
        .map(|release| {
            let sale = sales.iter().find(|s| {
                normalize_key(&s.game_name) == normalize_key(&release.game_name)
                    && seat_key(&s.block, &s.row, &s.seat)
                        == seat_key(&release.block, &release.row, &release.seat)
            });
            SeatRelease {
                seat: release.clone(),
                sold: sale.is_some(),
                ticket_sold_price: sale.map(|s| s.ticket_sold_price),
            }
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
