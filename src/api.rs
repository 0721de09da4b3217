// 🌐 Catering API Client - Token, event list, per-event pre-orders
//
// Blocking reqwest client (no async runtime required). One snapshot is
// fetched per pipeline run and threaded through the stages as an
// argument; there is no ambient/global dataset.
//
// Failure policy: token retrieval and the event list are load-bearing and
// fail the run. A single event's pre-order fetch is not: a non-200 or
// network error there is logged and that event's data is omitted.

use crate::error::{ReconError, Result};
use crate::record::{split_guest, ApiMenuLine, OrderType};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use tracing::{debug, warn};

/// Workers for the per-event fan-out. Each call is an independent,
/// idempotent GET, so a small bounded pool is safe.
const DEFAULT_FETCH_WORKERS: usize = 4;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Transient-failure retries per GET, with linear backoff.
const GET_RETRIES: u32 = 2;

// ============================================================================
// CONFIG
// ============================================================================

/// Catering API endpoint + credentials, loaded from the environment
/// (`.env` supported via dotenvy).
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl ApiConfig {
    /// Read HOSP_API_BASE / HOSP_API_USERNAME / HOSP_API_PASSWORD.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Ok(ApiConfig {
            base_url: std::env::var("HOSP_API_BASE")?,
            username: std::env::var("HOSP_API_USERNAME")?,
            password: std::env::var("HOSP_API_PASSWORD")?,
        })
    }
}

// ============================================================================
// WIRE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Clone)]
struct BearerToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl BearerToken {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct EventsEnvelope {
    #[serde(rename = "Data", default)]
    data: EventsData,
}

#[derive(Debug, Default, Deserialize)]
struct EventsData {
    #[serde(rename = "Events", default)]
    events: Vec<WireEvent>,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "Id")]
    id: i64,
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "KickOffEventStart")]
    kick_off: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PreordersEnvelope {
    #[serde(rename = "Data", default)]
    data: PreordersData,
}

#[derive(Debug, Default, Deserialize)]
struct PreordersData {
    #[serde(rename = "CateringPreorders", default)]
    preorders: Vec<CateringPreorder>,
}

/// One nested per-guest pre-order entry as returned by
/// `GET /CateringPreorders/List?EventId={id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CateringPreorder {
    #[serde(rename = "EventId", default)]
    pub event_id: Option<i64>,
    #[serde(rename = "Event", default)]
    pub event: Option<String>,
    #[serde(rename = "Location", default)]
    pub location: Option<String>,
    #[serde(rename = "Guest", default)]
    pub guest: Option<String>,
    #[serde(rename = "Status", default)]
    pub status: Option<String>,
    #[serde(rename = "KickOffEventStart", default)]
    pub kick_off: Option<String>,
    #[serde(rename = "FoodMenu", default)]
    pub food_menu: Option<MenuSelection>,
    #[serde(rename = "KidsFoodMenu", default)]
    pub kids_food_menu: Option<MenuSelection>,
    #[serde(rename = "DrinkMenu", default)]
    pub drink_menu: Option<MenuSelection>,
    #[serde(rename = "KidsDrinkMenu", default)]
    pub kids_drink_menu: Option<MenuSelection>,
    #[serde(rename = "PreOrderItems", default)]
    pub pre_order_items: Vec<PreOrderItem>,
}

/// A chosen menu (food/drink, adult/kids) with quantity and unit price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MenuSelection {
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
    #[serde(rename = "Quantity", default = "default_quantity")]
    pub quantity: u32,
    #[serde(rename = "Price", default)]
    pub price: f64,
}

/// An enhancement line (extras ordered on top of the menus).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreOrderItem {
    #[serde(rename = "ProductName", default)]
    pub product_name: Option<String>,
    #[serde(rename = "OrderedAmount", default = "default_quantity")]
    pub ordered_amount: u32,
    #[serde(rename = "Price", default)]
    pub price: f64,
}

fn default_quantity() -> u32 {
    1
}

/// Parse the API's kick-off timestamp down to a date.
fn parse_api_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .map(|dt| dt.date())
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .ok()
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// One event from the API event list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEvent {
    pub id: i64,
    pub name: String,
    pub date: Option<NaiveDate>,
}

/// One (location, event, date) → event id pairing taken from a pre-order
/// entry, for reference resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct EventKey {
    pub event_id: i64,
    pub location: String,
    pub event: String,
    pub event_date: Option<NaiveDate>,
}

/// Immutable per-run snapshot of the catering API: the full event list
/// plus every fetched pre-order entry. Resolution and linkage read from
/// this; nothing mutates it after the fetch completes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiSnapshot {
    pub events: Vec<ApiEvent>,
    pub preorders: Vec<CateringPreorder>,
    /// Event ids whose pre-order fetch failed and were skipped.
    pub skipped_events: Vec<i64>,
}

/// Resolve an entry's event header: id, location, event name, event
/// date, filling name and date from the event list when the entry's own
/// are missing. `None` when the entry carries no event id at all.
fn entry_header(
    entry: &CateringPreorder,
    by_id: &std::collections::HashMap<i64, &ApiEvent>,
) -> Option<(i64, String, String, Option<NaiveDate>)> {
    let event_id = entry.event_id?;
    let listed = by_id.get(&event_id);
    let event = entry
        .event
        .clone()
        .or_else(|| listed.map(|e| e.name.clone()))
        .unwrap_or_default();
    let event_date = entry
        .kick_off
        .as_deref()
        .and_then(parse_api_date)
        .or_else(|| listed.and_then(|e| e.date));
    Some((
        event_id,
        entry.location.clone().unwrap_or_default(),
        event,
        event_date,
    ))
}

impl ApiSnapshot {
    fn events_by_id(&self) -> std::collections::HashMap<i64, &ApiEvent> {
        self.events.iter().map(|e| (e.id, e)).collect()
    }

    /// Every entry's (location, event, date) → id pairing. Entries with
    /// no menu selections and no enhancement items still appear; a
    /// booking with nothing ordered yet still identifies its event.
    pub fn event_keys(&self) -> Vec<EventKey> {
        let by_id = self.events_by_id();
        self.preorders
            .iter()
            .filter_map(|entry| entry_header(entry, &by_id))
            .map(|(event_id, location, event, event_date)| EventKey {
                event_id,
                location,
                event,
                event_date,
            })
            .collect()
    }
    /// Flatten the nested per-guest structure into one ApiMenuLine per
    /// menu/enhancement, de-duplicated on (join key, menu item). Event
    /// name and date come from the event list when the entry's own are
    /// missing.
    pub fn menu_lines(&self) -> Vec<ApiMenuLine> {
        let by_id = self.events_by_id();

        let mut lines = Vec::new();
        let mut seen = HashSet::new();

        for entry in &self.preorders {
            let Some((event_id, location, event, event_date)) = entry_header(entry, &by_id)
            else {
                continue;
            };
            let (guest_name, guest_email) = split_guest(entry.guest.as_deref().unwrap_or(""));

            let mut push = |order_type: OrderType, item: Option<&str>, qty: u32, price: f64| {
                let menu_item = match item {
                    Some(name) if !name.trim().is_empty() => name.trim().to_string(),
                    _ => return,
                };
                let line = ApiMenuLine {
                    event_id,
                    location: location.clone(),
                    event: event.clone(),
                    event_date,
                    guest_name: guest_name.clone(),
                    guest_email: guest_email.clone(),
                    order_type,
                    menu_item,
                    quantity: qty,
                    unit_price: price,
                    line_total: price * qty as f64,
                    status: entry.status.clone(),
                };
                if seen.insert(line.dedup_key()) {
                    lines.push(line);
                }
            };

            for (order_type, menu) in [
                (OrderType::Food, &entry.food_menu),
                (OrderType::KidsFood, &entry.kids_food_menu),
                (OrderType::Drink, &entry.drink_menu),
                (OrderType::KidsDrink, &entry.kids_drink_menu),
            ] {
                if let Some(menu) = menu {
                    push(order_type, menu.name.as_deref(), menu.quantity, menu.price);
                }
            }
            for item in &entry.pre_order_items {
                push(
                    OrderType::Enhancement,
                    item.product_name.as_deref(),
                    item.ordered_amount,
                    item.price,
                );
            }
        }

        lines
    }
}

// ============================================================================
// CLIENT
// ============================================================================

/// Catering API client (blocking). Caches the bearer token and refreshes
/// it when expired before any call.
pub struct CateringClient {
    http: reqwest::blocking::Client,
    config: ApiConfig,
    token: Option<BearerToken>,
    fetch_workers: usize,
}

impl CateringClient {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(format!("hosp-recon/{}", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(CateringClient {
            http,
            config,
            token: None,
            fetch_workers: DEFAULT_FETCH_WORKERS,
        })
    }

    pub fn with_fetch_workers(mut self, workers: usize) -> Self {
        self.fetch_workers = workers.max(1);
        self
    }

    /// Return a valid bearer token, requesting or refreshing as needed.
    fn ensure_token(&mut self) -> Result<String> {
        let now = Utc::now();
        if let Some(token) = &self.token {
            if !token.is_expired(now) {
                return Ok(token.token.clone());
            }
        }

        let url = format!("{}/token", self.config.base_url);
        let resp = self
            .http
            .post(&url)
            .form(&[
                ("Username", self.config.username.as_str()),
                ("Password", self.config.password.as_str()),
                ("grant_type", "password"),
            ])
            .send()?;
        if !resp.status().is_success() {
            return Err(ReconError::Api {
                url,
                status: resp.status().as_u16(),
            });
        }
        let body: TokenResponse = resp.json()?;
        let token = BearerToken {
            token: body.access_token,
            expires_at: now + Duration::seconds(body.expires_in),
        };
        self.token = Some(token.clone());
        debug!(expires_in = body.expires_in, "bearer token refreshed");
        Ok(token.token)
    }

    /// GET with bearer auth and limited retry on transport errors.
    fn get_json<T: serde::de::DeserializeOwned>(
        http: &reqwest::blocking::Client,
        url: &str,
        token: &str,
    ) -> Result<T> {
        let mut last_err: Option<ReconError> = None;
        for attempt in 0..=GET_RETRIES {
            if attempt > 0 {
                thread::sleep(std::time::Duration::from_millis(500 * attempt as u64));
            }
            match http.get(url).bearer_auth(token).send() {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(resp.json()?);
                }
                Ok(resp) => {
                    // A definitive HTTP status is not transient
                    return Err(ReconError::Api {
                        url: url.to_string(),
                        status: resp.status().as_u16(),
                    });
                }
                Err(err) => last_err = Some(err.into()),
            }
        }
        Err(last_err.unwrap_or(ReconError::Api {
            url: url.to_string(),
            status: 0,
        }))
    }

    /// `GET /Events/List`.
    pub fn list_events(&mut self) -> Result<Vec<ApiEvent>> {
        let token = self.ensure_token()?;
        let url = format!("{}/Events/List", self.config.base_url);
        let envelope: EventsEnvelope = Self::get_json(&self.http, &url, &token)?;
        Ok(envelope
            .data
            .events
            .into_iter()
            .map(|e| ApiEvent {
                id: e.id,
                name: e.name.trim().to_string(),
                date: e.kick_off.as_deref().and_then(parse_api_date),
            })
            .collect())
    }

    /// Fetch the complete per-run snapshot: event list plus every event's
    /// pre-orders, fanned out over a bounded worker pool. All responses
    /// are collected before this returns; resolution needs the full set.
    pub fn fetch_snapshot(&mut self) -> Result<ApiSnapshot> {
        let events = self.list_events()?;
        let token = self.ensure_token()?;

        let cursor = AtomicUsize::new(0);
        let collected: Mutex<Vec<CateringPreorder>> = Mutex::new(Vec::new());
        let skipped: Mutex<Vec<i64>> = Mutex::new(Vec::new());

        thread::scope(|scope| {
            for _ in 0..self.fetch_workers.min(events.len().max(1)) {
                scope.spawn(|| loop {
                    let idx = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(event) = events.get(idx) else { break };
                    let url = format!(
                        "{}/CateringPreorders/List?EventId={}",
                        self.config.base_url, event.id
                    );
                    match Self::get_json::<PreordersEnvelope>(&self.http, &url, &token) {
                        Ok(envelope) => {
                            let mut rows = envelope.data.preorders;
                            for row in &mut rows {
                                // Entries occasionally omit their own ids
                                row.event_id.get_or_insert(event.id);
                            }
                            collected.lock().unwrap().extend(rows);
                        }
                        Err(err) => {
                            warn!(event_id = event.id, %err, "pre-order fetch skipped");
                            skipped.lock().unwrap().push(event.id);
                        }
                    }
                });
            }
        });

        let preorders = collected.into_inner().unwrap();
        let mut skipped_events = skipped.into_inner().unwrap();
        skipped_events.sort_unstable();
        debug!(
            events = events.len(),
            preorders = preorders.len(),
            skipped = skipped_events.len(),
            "API snapshot fetched"
        );

        Ok(ApiSnapshot {
            events,
            preorders,
            skipped_events,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_expiry() {
        let now = Utc::now();
        let token = BearerToken {
            token: "abc".to_string(),
            expires_at: now + Duration::seconds(3600),
        };
        assert!(!token.is_expired(now));
        assert!(token.is_expired(now + Duration::seconds(3601)));
    }

    #[test]
    fn test_events_envelope_deserializes() {
        let json = r#"{
            "Data": {
                "Events": [
                    {"Id": 101, "Name": " Arsenal v Chelsea ", "KickOffEventStart": "2024-09-01T15:00:00"},
                    {"Id": 102, "Name": "Arsenal v Spurs", "KickOffEventStart": null}
                ]
            }
        }"#;
        let envelope: EventsEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.data.events.len(), 2);
        assert_eq!(envelope.data.events[0].id, 101);
        assert_eq!(
            parse_api_date(envelope.data.events[0].kick_off.as_deref().unwrap()),
            NaiveDate::from_ymd_opt(2024, 9, 1)
        );
    }

    #[test]
    fn test_preorders_envelope_deserializes_nested_menus() {
        let json = r#"{
            "Data": {
                "CateringPreorders": [
                    {
                        "EventId": 101,
                        "Event": "Arsenal v Chelsea",
                        "Location": "Box 12",
                        "Guest": "J Smith (j@x.com)",
                        "Status": "Completed",
                        "KickOffEventStart": "2024-09-01T15:00:00",
                        "FoodMenu": {"Name": "Matchday Menu", "Quantity": 2, "Price": 22.5},
                        "PreOrderItems": [
                            {"ProductName": "Champagne", "OrderedAmount": 1, "Price": 80.0}
                        ]
                    }
                ]
            }
        }"#;
        let envelope: PreordersEnvelope = serde_json::from_str(json).unwrap();
        let entry = &envelope.data.preorders[0];
        assert_eq!(entry.event_id, Some(101));
        assert_eq!(entry.food_menu.as_ref().unwrap().quantity, 2);
        assert_eq!(entry.pre_order_items.len(), 1);
    }

    fn snapshot_with_one_entry() -> ApiSnapshot {
        ApiSnapshot {
            events: vec![ApiEvent {
                id: 101,
                name: "Arsenal v Chelsea".to_string(),
                date: NaiveDate::from_ymd_opt(2024, 9, 1),
            }],
            preorders: vec![CateringPreorder {
                event_id: Some(101),
                event: None,
                location: Some("Box 12".to_string()),
                guest: Some("J Smith (j@x.com)".to_string()),
                status: Some("Completed".to_string()),
                kick_off: None,
                food_menu: Some(MenuSelection {
                    name: Some("Matchday Menu".to_string()),
                    quantity: 2,
                    price: 22.5,
                }),
                kids_food_menu: None,
                drink_menu: None,
                kids_drink_menu: None,
                pre_order_items: vec![PreOrderItem {
                    product_name: Some("Champagne".to_string()),
                    ordered_amount: 1,
                    price: 80.0,
                }],
            }],
            skipped_events: vec![],
        }
    }

    #[test]
    fn test_menu_lines_flatten_and_compute_totals() {
        let lines = snapshot_with_one_entry().menu_lines();
        assert_eq!(lines.len(), 2);

        let food = lines.iter().find(|l| l.order_type == OrderType::Food).unwrap();
        assert_eq!(food.menu_item, "Matchday Menu");
        assert_eq!(food.line_total, 45.0);
        // Event name and date filled from the event list
        assert_eq!(food.event, "Arsenal v Chelsea");
        assert_eq!(food.event_date, NaiveDate::from_ymd_opt(2024, 9, 1));

        let extra = lines
            .iter()
            .find(|l| l.order_type == OrderType::Enhancement)
            .unwrap();
        assert_eq!(extra.menu_item, "Champagne");
        assert_eq!(extra.line_total, 80.0);
    }

    #[test]
    fn test_menu_lines_deduplicate_repeated_entries() {
        let mut snapshot = snapshot_with_one_entry();
        let dup = snapshot.preorders[0].clone();
        snapshot.preorders.push(dup);
        assert_eq!(snapshot.menu_lines().len(), 2);
    }

    #[test]
    fn test_menu_lines_skip_entries_without_event_id() {
        let mut snapshot = snapshot_with_one_entry();
        snapshot.preorders[0].event_id = None;
        assert!(snapshot.menu_lines().is_empty());
        assert!(snapshot.event_keys().is_empty());
    }

    #[test]
    fn test_event_keys_include_entries_with_nothing_ordered() {
        let mut snapshot = snapshot_with_one_entry();
        snapshot.preorders[0].food_menu = None;
        snapshot.preorders[0].pre_order_items.clear();
        assert!(snapshot.menu_lines().is_empty());

        let keys = snapshot.event_keys();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].event_id, 101);
        assert_eq!(keys[0].location, "Box 12");
        // Name and date filled from the event list
        assert_eq!(keys[0].event, "Arsenal v Chelsea");
        assert_eq!(keys[0].event_date, NaiveDate::from_ymd_opt(2024, 9, 1));
    }
}
