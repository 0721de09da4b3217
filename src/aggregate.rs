// 📊 Aggregation - Box totals and payment status assignment
//
// Completed pre-orders roll up into one total per (location, event) box.
// Each box total is then matched against the consolidated payment report
// to decide how that box was paid. Matching is exact after rounding to
// pence; a near-miss is a discrepancy to investigate, not a match.

use crate::error::{ReconError, Result};
use crate::ingest::Fixture;
use crate::record::{
    normalize_key, round2, BoxTotal, ConsolidatedPaymentRecord, MergedOrderLine, PaymentStatus,
};
use std::collections::HashMap;
use tracing::debug;

/// Keep only completed lines belonging to the selected fixture.
pub fn filter_completed_for_fixture(
    lines: &[MergedOrderLine],
    fixture: &Fixture,
) -> Result<Vec<MergedOrderLine>> {
    let wanted = normalize_key(&fixture.name);
    let filtered: Vec<MergedOrderLine> = lines
        .iter()
        .filter(|line| {
            line.is_completed()
                && normalize_key(&line.event) == wanted
                && line.event_date == Some(fixture.date)
        })
        .cloned()
        .collect();
    if filtered.is_empty() {
        return Err(ReconError::EmptyResult {
            stage: "completed-order filter",
        });
    }
    Ok(filtered)
}

/// Sum pre-order amounts per (location, event) box. Groups on normalized
/// keys but reports the location as first seen; output sorted by location
/// so runs are comparable.
pub fn box_totals(lines: &[MergedOrderLine]) -> Vec<BoxTotal> {
    let mut order: Vec<(String, String)> = Vec::new();
    let mut sums: HashMap<(String, String), BoxTotal> = HashMap::new();
    for line in lines {
        let key = (normalize_key(&line.location), normalize_key(&line.event));
        match sums.get_mut(&key) {
            Some(total) => total.amount += line.preorder_total,
            None => {
                order.push(key.clone());
                sums.insert(
                    key,
                    BoxTotal {
                        location: line.location.trim().to_string(),
                        event: line.event.trim().to_string(),
                        amount: line.preorder_total,
                    },
                );
            }
        }
    }

    let mut totals: Vec<BoxTotal> = order
        .into_iter()
        .filter_map(|key| sums.remove(&key))
        .map(|mut t| {
            t.amount = round2(t.amount);
            t
        })
        .collect();
    totals.sort_by(|a, b| a.location.cmp(&b.location));
    totals
}

/// One box total with its assigned payment method.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxSettlement {
    pub location: String,
    pub event: String,
    pub amount: f64,
    pub status: PaymentStatus,
}

/// Match each box total against the consolidated payment columns.
///
/// A column matches when its rounded amount equals the rounded box total
/// exactly and is positive. When several columns match, method priority
/// is drawdown, then credit card, then purchase order, then EFT. A box
/// with no exact match stays `Unresolved`.
pub fn assign_payment_status(
    totals: &[BoxTotal],
    payments: &[ConsolidatedPaymentRecord],
) -> Vec<BoxSettlement> {
    let by_location: HashMap<String, &ConsolidatedPaymentRecord> = payments
        .iter()
        .map(|p| (normalize_key(&p.location), p))
        .collect();

    let settlements: Vec<BoxSettlement> = totals
        .iter()
        .map(|total| {
            let status = by_location
                .get(&normalize_key(&total.location))
                .map(|payment| match_payment(total.amount, payment))
                .unwrap_or(PaymentStatus::Unresolved);
            BoxSettlement {
                location: total.location.clone(),
                event: total.event.clone(),
                amount: total.amount,
                status,
            }
        })
        .collect();

    let unresolved = settlements
        .iter()
        .filter(|s| s.status == PaymentStatus::Unresolved)
        .count();
    debug!(
        boxes = settlements.len(),
        unresolved, "payment statuses assigned"
    );
    settlements
}

fn match_payment(amount: f64, payment: &ConsolidatedPaymentRecord) -> PaymentStatus {
    let amount = round2(amount);
    if amount <= 0.0 {
        return PaymentStatus::Unresolved;
    }
    let candidates = [
        (PaymentStatus::Drawdown, payment.drawdown),
        (PaymentStatus::CreditCard, payment.credit_card),
        (PaymentStatus::PurchaseOrder, payment.purchase_orders),
        (PaymentStatus::Eft, payment.eft),
    ];
    for (status, paid) in candidates {
        let paid = round2(paid);
        if paid > 0.0 && paid == amount {
            return status;
        }
    }
    PaymentStatus::Unresolved
}

/// Lookup from normalized location to its settlement, for stamping the
/// per-line export columns.
pub fn settlement_index(settlements: &[BoxSettlement]) -> HashMap<String, PaymentStatus> {
    settlements
        .iter()
        .map(|s| (normalize_key(&s.location), s.status))
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
