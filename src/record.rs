// 🧾 Record Model - Typed rows for every source in the reconciliation run
//
// All entities are built fresh per run from the uploaded reports and one
// API snapshot; nothing persists beyond the current invocation.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ============================================================================
// KEY NORMALIZATION
// ============================================================================

/// Normalize a key column value: trim, lowercase, and expand the
/// "exec " location shorthand to "executive ".
pub fn normalize_key(value: &str) -> String {
    let lower = value.trim().to_lowercase();
    if let Some(rest) = lower.strip_prefix("exec ") {
        return format!("executive {}", rest.trim_start());
    }
    lower
}

/// Split a guest cell like "J Smith (j@x.com)" into name + lower-cased
/// email. A cell without parentheses is all name, no email.
pub fn split_guest(raw: &str) -> (String, Option<String>) {
    if let (Some(open), Some(close)) = (raw.find('('), raw.rfind(')')) {
        if open < close {
            let name = raw[..open].trim().to_string();
            let email = raw[open + 1..close].trim().to_lowercase();
            let email = if email.is_empty() { None } else { Some(email) };
            return (name, email);
        }
    }
    (raw.trim().to_string(), None)
}

/// Parse a currency-formatted string ("£1,234.50") to a number.
/// Defaults to 0.0 when the cell is empty or unparseable.
pub fn parse_currency(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '£' | '$' | ','))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return 0.0;
    }
    cleaned.parse::<f64>().unwrap_or(0.0)
}

/// Round to two decimal places (currency precision).
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Parse a date with day-first convention ("01/09/2024" or "2024-09-01").
pub fn parse_date_dayfirst(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d-%m-%Y"))
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

/// Parse an ordered-on timestamp; date-only cells get midnight.
pub fn parse_datetime_dayfirst(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(raw, "%d/%m/%Y %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%d/%m/%Y %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .or_else(|| parse_date_dayfirst(raw).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

// ============================================================================
// ORDER TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Food,
    KidsFood,
    Drink,
    KidsDrink,
    Enhancement,
}

impl OrderType {
    pub fn label(&self) -> &'static str {
        match self {
            OrderType::Food => "Food",
            OrderType::KidsFood => "Kids Food",
            OrderType::Drink => "Drink",
            OrderType::KidsDrink => "Kids Drink",
            OrderType::Enhancement => "Enhancement",
        }
    }

    /// Parse the label as it appears in the export / API payloads.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "food" => Some(OrderType::Food),
            "kids food" => Some(OrderType::KidsFood),
            "drink" => Some(OrderType::Drink),
            "kids drink" => Some(OrderType::KidsDrink),
            "enhancement" => Some(OrderType::Enhancement),
            _ => None,
        }
    }
}

// ============================================================================
// SOURCE RECORDS
// ============================================================================

/// One line from the manually exported pre-order report, normalized.
/// Immutable after ingestion apart from `event_id`, which reference
/// resolution fills in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOrderRecord {
    pub location: String,
    pub event: String,
    pub event_date: Option<NaiveDate>,
    pub guest_name: String,
    pub guest_email: Option<String>,
    pub order_type: OrderType,
    /// Currency-normalized line total.
    pub total: f64,
    pub ordered_on: Option<NaiveDateTime>,
    pub licence_type: Option<String>,
    /// Pre-order status as exported ("Completed", "Pending", ...). Kept as
    /// a plain string: the upstream system invents new labels without
    /// notice.
    pub status: Option<String>,
    /// External event id, `None` until resolved (and kept `None` when no
    /// match exists, so the row stays visible for investigation).
    pub event_id: Option<i64>,
}

impl RawOrderRecord {
    /// Join key shared with the API menu lines.
    pub fn join_key(&self) -> OrderKey {
        OrderKey {
            event_id: self.event_id,
            location: normalize_key(&self.location),
            event: normalize_key(&self.event),
            guest_name: normalize_key(&self.guest_name),
            guest_email: self.guest_email.clone().unwrap_or_default(),
            order_type: self.order_type,
        }
    }
}

/// Composite equi-join key: (event id, location, event, guest name,
/// guest email, order type), normalized.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderKey {
    pub event_id: Option<i64>,
    pub location: String,
    pub event: String,
    pub guest_name: String,
    pub guest_email: String,
    pub order_type: OrderType,
}

/// One catering-menu or pre-order-item entry from the API, flattened out
/// of the nested per-guest structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMenuLine {
    pub event_id: i64,
    pub location: String,
    pub event: String,
    pub event_date: Option<NaiveDate>,
    pub guest_name: String,
    pub guest_email: Option<String>,
    pub order_type: OrderType,
    pub menu_item: String,
    pub quantity: u32,
    pub unit_price: f64,
    /// quantity × unit price.
    pub line_total: f64,
    pub status: Option<String>,
}

impl ApiMenuLine {
    pub fn join_key(&self) -> OrderKey {
        OrderKey {
            event_id: Some(self.event_id),
            location: normalize_key(&self.location),
            event: normalize_key(&self.event),
            guest_name: normalize_key(&self.guest_name),
            guest_email: self.guest_email.clone().unwrap_or_default(),
            order_type: self.order_type,
        }
    }

    /// De-duplication identity: join key plus menu item.
    pub fn dedup_key(&self) -> (OrderKey, String) {
        (self.join_key(), normalize_key(&self.menu_item))
    }
}

// ============================================================================
// MERGED LINE
// ============================================================================

/// Left join of a RawOrderRecord with its matching ApiMenuLine. API
/// fields are `None` when the pre-order never reached the catering API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedOrderLine {
    pub event_id: Option<i64>,
    pub location: String,
    pub event: String,
    pub event_date: Option<NaiveDate>,
    pub guest_name: String,
    pub guest_email: Option<String>,
    pub order_type: OrderType,
    pub ordered_on: Option<NaiveDateTime>,
    pub licence_type: Option<String>,
    /// Amount from the pre-order report. Zeroed for repeated lump-sum
    /// rows during linkage de-duplication.
    pub preorder_total: f64,
    pub preorder_status: Option<String>,
    // API side (None when unmatched)
    pub menu_item: Option<String>,
    pub ordered_amount: Option<u32>,
    pub price_per_unit: Option<f64>,
    pub api_price: Option<f64>,
}

impl MergedOrderLine {
    pub fn is_completed(&self) -> bool {
        self.preorder_status.as_deref() == Some("Completed")
    }
}

// ============================================================================
// AGGREGATES & PAYMENTS
// ============================================================================

/// Sum of completed merged amounts for one (location, event) box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxTotal {
    pub location: String,
    pub event: String,
    pub amount: f64,
}

/// One row from the consolidated payment export. Event and event date
/// are injected from the caller's fixture selection; the source file
/// does not carry them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedPaymentRecord {
    pub location: String,
    pub event: String,
    pub event_date: NaiveDate,
    pub drawdown: f64,
    pub credit_card: f64,
    pub purchase_orders: f64,
    pub eft: f64,
}

impl ConsolidatedPaymentRecord {
    pub fn total(&self) -> f64 {
        self.drawdown + self.credit_card + self.purchase_orders + self.eft
    }
}

/// Payment method matched against a box total. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Drawdown,
    CreditCard,
    PurchaseOrder,
    Eft,
    /// No consolidated amount matched exactly. Deliberate: a rounding or
    /// partial-payment discrepancy must surface instead of being guessed.
    Unresolved,
}

impl PaymentStatus {
    pub fn label(&self) -> &'static str {
        match self {
            PaymentStatus::Drawdown => "Drawdown",
            PaymentStatus::CreditCard => "Credit Card",
            PaymentStatus::PurchaseOrder => "Purchase Order",
            PaymentStatus::Eft => "EFT",
            PaymentStatus::Unresolved => "",
        }
    }

    /// Settlement view used on the final export: card/PO/EFT payments are
    /// already settled, drawdown still needs invoicing.
    pub fn settlement_status(&self) -> &'static str {
        match self {
            PaymentStatus::CreditCard | PaymentStatus::PurchaseOrder | PaymentStatus::Eft => {
                "Completed"
            }
            PaymentStatus::Drawdown => "Pending",
            PaymentStatus::Unresolved => "",
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key_trims_and_lowercases() {
        assert_eq!(normalize_key("  Box 12 "), "box 12");
        assert_eq!(normalize_key("Arsenal V Chelsea"), "arsenal v chelsea");
    }

    #[test]
    fn test_normalize_key_expands_exec_prefix() {
        assert_eq!(normalize_key("Exec Box 5"), "executive box 5");
        // Only the prefix form expands
        assert_eq!(normalize_key("The Exec Suite"), "the exec suite");
    }

    #[test]
    fn test_split_guest_with_email() {
        let (name, email) = split_guest("J Smith (J@X.com)");
        assert_eq!(name, "J Smith");
        assert_eq!(email, Some("j@x.com".to_string()));
    }

    #[test]
    fn test_split_guest_without_email() {
        let (name, email) = split_guest("  J Smith ");
        assert_eq!(name, "J Smith");
        assert_eq!(email, None);
    }

    #[test]
    fn test_parse_currency() {
        assert_eq!(parse_currency("£1,234.50"), 1234.50);
        assert_eq!(parse_currency("45.00"), 45.00);
        assert_eq!(parse_currency(""), 0.0);
        assert_eq!(parse_currency("n/a"), 0.0);
    }

    #[test]
    fn test_parse_date_dayfirst() {
        let expected = NaiveDate::from_ymd_opt(2024, 9, 1).unwrap();
        assert_eq!(parse_date_dayfirst("01/09/2024"), Some(expected));
        assert_eq!(parse_date_dayfirst("2024-09-01"), Some(expected));
        assert_eq!(parse_date_dayfirst(""), None);
    }

    #[test]
    fn test_order_type_labels_round_trip() {
        for ot in [
            OrderType::Food,
            OrderType::KidsFood,
            OrderType::Drink,
            OrderType::KidsDrink,
            OrderType::Enhancement,
        ] {
            assert_eq!(OrderType::from_label(ot.label()), Some(ot));
        }
        assert_eq!(OrderType::from_label("Merchandise"), None);
    }

    #[test]
    fn test_join_keys_match_across_sources() {
        let raw = RawOrderRecord {
            location: " Box 12 ".to_string(),
            event: "Arsenal v Chelsea".to_string(),
            event_date: NaiveDate::from_ymd_opt(2024, 9, 1),
            guest_name: "J Smith".to_string(),
            guest_email: Some("j@x.com".to_string()),
            order_type: OrderType::Food,
            total: 45.0,
            ordered_on: None,
            licence_type: None,
            status: None,
            event_id: Some(101),
        };
        let api = ApiMenuLine {
            event_id: 101,
            location: "box 12".to_string(),
            event: "ARSENAL V CHELSEA".to_string(),
            event_date: NaiveDate::from_ymd_opt(2024, 9, 1),
            guest_name: "j smith".to_string(),
            guest_email: Some("j@x.com".to_string()),
            order_type: OrderType::Food,
            menu_item: "Matchday Menu".to_string(),
            quantity: 1,
            unit_price: 45.0,
            line_total: 45.0,
            status: Some("Completed".to_string()),
        };
        assert_eq!(raw.join_key(), api.join_key());
    }

    #[test]
    fn test_payment_status_settlement_mapping() {
        assert_eq!(PaymentStatus::CreditCard.settlement_status(), "Completed");
        assert_eq!(PaymentStatus::Eft.settlement_status(), "Completed");
        assert_eq!(PaymentStatus::Drawdown.settlement_status(), "Pending");
        assert_eq!(PaymentStatus::Unresolved.settlement_status(), "");
    }
}
