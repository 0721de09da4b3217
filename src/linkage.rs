// 🔀 Record Linkage - Left join of manual pre-orders with API menu lines
//
// The manual report is authoritative for money; the API side contributes
// menu detail. Every manual row survives the join (unmatched rows carry
// None on the API side), and a manual row matching several menu lines
// fans out into one merged line per menu line.
//
// Lump-sum handling: the manual export repeats a booking's full amount on
// every one of its lines, all sharing one ordered-on timestamp. After the
// fan-out, only the first line of each (key, timestamp) group keeps its
// amount; the rest are zeroed so box totals count the money exactly once.
// A later order by the same guest carries its own timestamp and is its
// own group.

use crate::error::{ReconError, Result};
use crate::record::{ApiMenuLine, MergedOrderLine, OrderKey, RawOrderRecord};
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{HashMap, HashSet};
use tracing::debug;

fn merged_key(line: &MergedOrderLine) -> OrderKey {
    OrderKey {
        event_id: line.event_id,
        location: crate::record::normalize_key(&line.location),
        event: crate::record::normalize_key(&line.event),
        guest_name: crate::record::normalize_key(&line.guest_name),
        guest_email: line.guest_email.clone().unwrap_or_default(),
        order_type: line.order_type,
    }
}

/// Left outer join on the composite order key.
pub fn merge_orders(
    manual: &[RawOrderRecord],
    api_lines: &[ApiMenuLine],
) -> Result<Vec<MergedOrderLine>> {
    let mut by_key: HashMap<OrderKey, Vec<&ApiMenuLine>> = HashMap::new();
    for line in api_lines {
        by_key.entry(line.join_key()).or_default().push(line);
    }

    let mut merged = Vec::new();
    let mut matched_rows = 0usize;
    for record in manual {
        let base = MergedOrderLine {
            event_id: record.event_id,
            location: record.location.clone(),
            event: record.event.clone(),
            event_date: record.event_date,
            guest_name: record.guest_name.clone(),
            guest_email: record.guest_email.clone(),
            order_type: record.order_type,
            ordered_on: record.ordered_on,
            licence_type: record.licence_type.clone(),
            preorder_total: record.total,
            preorder_status: record.status.clone(),
            menu_item: None,
            ordered_amount: None,
            price_per_unit: None,
            api_price: None,
        };
        match by_key.get(&record.join_key()) {
            Some(matches) if !matches.is_empty() => {
                matched_rows += 1;
                for api in matches {
                    let mut line = base.clone();
                    line.menu_item = Some(api.menu_item.clone());
                    line.ordered_amount = Some(api.quantity);
                    line.price_per_unit = Some(api.unit_price);
                    line.api_price = Some(api.line_total);
                    if line.preorder_status.is_none() {
                        line.preorder_status = api.status.clone();
                    }
                    merged.push(line);
                }
            }
            _ => merged.push(base),
        }
    }

    if merged.is_empty() {
        return Err(ReconError::EmptyResult { stage: "merge" });
    }
    debug!(
        manual = manual.len(),
        matched = matched_rows,
        merged = merged.len(),
        "pre-orders merged with API menu lines"
    );
    Ok(merged)
}

/// Content identity used for the exact-duplicate drop. Amounts compare by
/// bit pattern; both sides of a true duplicate came from the same cells.
type ContentKey = (OrderKey, Option<NaiveDateTime>, Option<String>, u64, u64);

fn content_key(line: &MergedOrderLine) -> ContentKey {
    (
        merged_key(line),
        line.ordered_on,
        line.menu_item.clone(),
        line.preorder_total.to_bits(),
        line.api_price.unwrap_or(0.0).to_bits(),
    )
}

/// Drop exact duplicates, then zero the repeated lump-sum amounts.
///
/// The zeroing group is (join key, ordered-on timestamp); lines are
/// sorted by that same pair so "first line keeps the money" is
/// deterministic.
pub fn lump_sum_dedup(mut lines: Vec<MergedOrderLine>) -> Vec<MergedOrderLine> {
    let mut seen = HashSet::new();
    lines.retain(|line| seen.insert(content_key(line)));

    lines.sort_by(|a, b| {
        let ka = merged_key(a);
        let kb = merged_key(b);
        (
            ka.event_id,
            ka.location,
            ka.event,
            ka.guest_name,
            ka.guest_email,
            ka.order_type.label(),
            a.ordered_on,
        )
            .cmp(&(
                kb.event_id,
                kb.location,
                kb.event,
                kb.guest_name,
                kb.guest_email,
                kb.order_type.label(),
                b.ordered_on,
            ))
    });

    let mut previous: Option<(OrderKey, Option<NaiveDateTime>)> = None;
    for line in lines.iter_mut() {
        let group = (merged_key(line), line.ordered_on);
        if previous.as_ref() == Some(&group) {
            line.preorder_total = 0.0;
        } else {
            previous = Some(group);
        }
    }
    lines
}

/// Restrict to orders placed in an inclusive date window. Lines without
/// an ordered-on timestamp are kept; missing data must stay visible
/// rather than vanish behind a filter.
pub fn filter_ordered_between(
    lines: Vec<MergedOrderLine>,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<MergedOrderLine>> {
    let filtered: Vec<MergedOrderLine> = lines
        .into_iter()
        .filter(|line| match line.ordered_on {
            Some(ts) => (from..=to).contains(&ts.date()),
            None => true,
        })
        .collect();
    if filtered.is_empty() {
        return Err(ReconError::EmptyResult {
            stage: "ordered-on date filter",
        });
    }
    Ok(filtered)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::OrderType;

    fn manual_row(guest: &str, order_type: OrderType, total: f64, minute: u32) -> RawOrderRecord {
        RawOrderRecord {
            location: "Box 12".to_string(),
            event: "Arsenal v Chelsea".to_string(),
            event_date: NaiveDate::from_ymd_opt(2024, 9, 1),
            guest_name: guest.to_string(),
            guest_email: Some("j@x.com".to_string()),
            order_type,
            total,
            ordered_on: NaiveDate::from_ymd_opt(2024, 8, 20)
                .unwrap()
                .and_hms_opt(10, minute, 0),
            licence_type: None,
            status: Some("Completed".to_string()),
            event_id: Some(101),
        }
    }

    fn api_line(guest: &str, order_type: OrderType, item: &str, total: f64) -> ApiMenuLine {
        ApiMenuLine {
            event_id: 101,
            location: "Box 12".to_string(),
            event: "Arsenal v Chelsea".to_string(),
            event_date: NaiveDate::from_ymd_opt(2024, 9, 1),
            guest_name: guest.to_string(),
            guest_email: Some("j@x.com".to_string()),
            order_type,
            menu_item: item.to_string(),
            quantity: 1,
            unit_price: total,
            line_total: total,
            status: Some("Completed".to_string()),
        }
    }

    #[test]
    fn test_merge_keeps_unmatched_manual_rows() {
        let manual = vec![manual_row("J Smith", OrderType::Food, 45.0, 0)];
        let merged = merge_orders(&manual, &[]).unwrap();
        assert_eq!(merged.len(), 1);
        assert!(merged[0].menu_item.is_none());
        assert_eq!(merged[0].preorder_total, 45.0);
    }

    #[test]
    fn test_merge_fans_out_multiple_menu_lines() {
        let manual = vec![manual_row("J Smith", OrderType::Food, 90.0, 0)];
        let api = vec![
            api_line("J Smith", OrderType::Food, "Matchday Menu", 45.0),
            api_line("J Smith", OrderType::Food, "Dessert Board", 45.0),
        ];
        let merged = merge_orders(&manual, &api).unwrap();
        assert_eq!(merged.len(), 2);
        // Fan-out repeats the lump sum; dedup fixes that later
        assert!(merged.iter().all(|l| l.preorder_total == 90.0));
    }

    #[test]
    fn test_merge_empty_is_an_error() {
        let err = merge_orders(&[], &[]).unwrap_err();
        assert!(matches!(err, ReconError::EmptyResult { stage: "merge" }));
    }

    #[test]
    fn test_lump_sum_dedup_keeps_money_once_per_group() {
        let manual = vec![manual_row("J Smith", OrderType::Food, 90.0, 0)];
        let api = vec![
            api_line("J Smith", OrderType::Food, "Matchday Menu", 45.0),
            api_line("J Smith", OrderType::Food, "Dessert Board", 45.0),
        ];
        let deduped = lump_sum_dedup(merge_orders(&manual, &api).unwrap());
        assert_eq!(deduped.len(), 2);
        let total: f64 = deduped.iter().map(|l| l.preorder_total).sum();
        assert_eq!(total, 90.0);
    }

    #[test]
    fn test_lump_sum_dedup_distinct_timestamps_are_separate_orders() {
        // Same guest, same order type, two genuinely distinct orders
        let manual = vec![
            manual_row("J Smith", OrderType::Food, 45.0, 10),
            manual_row("J Smith", OrderType::Food, 30.0, 20),
        ];
        let deduped = lump_sum_dedup(merge_orders(&manual, &[]).unwrap());
        assert_eq!(deduped.len(), 2);
        let total: f64 = deduped.iter().map(|l| l.preorder_total).sum();
        assert_eq!(total, 75.0);
        assert!(deduped.iter().all(|l| l.preorder_total > 0.0));
    }

    #[test]
    fn test_lump_sum_dedup_zeroes_repeats_within_one_timestamp() {
        let manual = vec![
            manual_row("J Smith", OrderType::Drink, 60.0, 5),
            manual_row("J Smith", OrderType::Drink, 60.0, 5),
        ];
        // Identical rows collapse in the duplicate drop; vary the total so
        // both reach the zeroing step
        let mut merged = merge_orders(&manual, &[]).unwrap();
        merged[1].preorder_total = 75.0;
        let deduped = lump_sum_dedup(merged);
        assert_eq!(deduped.len(), 2);
        let total: f64 = deduped.iter().map(|l| l.preorder_total).sum();
        assert_eq!(total, 60.0);
    }

    #[test]
    fn test_lump_sum_dedup_drops_exact_duplicates() {
        let manual = vec![
            manual_row("J Smith", OrderType::Food, 45.0, 0),
            manual_row("A Jones", OrderType::Food, 30.0, 0),
        ];
        let mut merged = merge_orders(&manual, &[]).unwrap();
        let dup = merged[0].clone();
        merged.push(dup);
        let deduped = lump_sum_dedup(merged);
        assert_eq!(deduped.len(), 2);
    }

    #[test]
    fn test_distinct_order_types_are_separate_groups() {
        let manual = vec![
            manual_row("J Smith", OrderType::Food, 45.0, 0),
            manual_row("J Smith", OrderType::Drink, 20.0, 0),
        ];
        let deduped = lump_sum_dedup(merge_orders(&manual, &[]).unwrap());
        let total: f64 = deduped.iter().map(|l| l.preorder_total).sum();
        assert_eq!(total, 65.0);
    }

    #[test]
    fn test_filter_ordered_between_keeps_undated_lines() {
        let manual = vec![
            manual_row("J Smith", OrderType::Food, 45.0, 0),
            RawOrderRecord {
                ordered_on: None,
                ..manual_row("A Jones", OrderType::Food, 30.0, 0)
            },
        ];
        let merged = merge_orders(&manual, &[]).unwrap();
        let from = NaiveDate::from_ymd_opt(2024, 8, 25).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 9, 1).unwrap();
        // The dated line (2024-08-20) falls outside; the undated one stays
        let filtered = filter_ordered_between(merged, from, to).unwrap();
        assert_eq!(filtered.len(), 1);
        assert!(filtered[0].ordered_on.is_none());
    }

    #[test]
    fn test_filter_ordered_between_empty_is_an_error() {
        let manual = vec![manual_row("J Smith", OrderType::Food, 45.0, 0)];
        let merged = merge_orders(&manual, &[]).unwrap();
        let from = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        let err = filter_ordered_between(merged, from, to).unwrap_err();
        assert!(matches!(err, ReconError::EmptyResult { .. }));
    }
}
