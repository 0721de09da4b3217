// ⚖️ Sum Consistency Gate - No export when the books disagree
//
// The sum of box totals must equal the sum of the consolidated payment
// rows joined to those boxes, within a one-pence-per-rounding tolerance.
// A failure here stops the run; a spreadsheet built on mismatched books
// would be worse than no spreadsheet.

use crate::error::{ReconError, Result};
use crate::record::{normalize_key, round2, BoxTotal, ConsolidatedPaymentRecord};
use std::collections::HashSet;
use tracing::info;

/// Absolute tolerance between the two grand totals, in pounds.
pub const SUM_TOLERANCE: f64 = 0.01;

/// Compare grand totals. The consolidated side counts only rows whose
/// (location, event) has a box total; a consolidated row for a box with
/// no completed pre-orders sits outside this run's books.
pub fn check_sums(totals: &[BoxTotal], payments: &[ConsolidatedPaymentRecord]) -> Result<()> {
    let matched: HashSet<(String, String)> = totals
        .iter()
        .map(|t| (normalize_key(&t.location), normalize_key(&t.event)))
        .collect();

    let preorder_total = round2(totals.iter().map(|t| t.amount).sum());
    let consolidated_total = round2(
        payments
            .iter()
            .filter(|p| matched.contains(&(normalize_key(&p.location), normalize_key(&p.event))))
            .map(|p| p.total())
            .sum(),
    );

    if (preorder_total - consolidated_total).abs() > SUM_TOLERANCE {
        return Err(ReconError::Mismatch {
            preorder_total,
            consolidated_total,
        });
    }
    info!(
        preorder_total,
        consolidated_total, "sum consistency check passed"
    );
    Ok(())
}
