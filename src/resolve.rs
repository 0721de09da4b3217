// 🔗 Reference Resolution - Event ids and fixture disambiguation
//
// Two jobs run before any join:
//   1. Fixture selection: turn "what fixture is this run about" into one
//      concrete (name, date) pair, refusing to guess when ambiguous.
//   2. Event id resolution: stamp the manual pre-order rows with the
//      catering API's event id so the later join is exact.

use crate::api::ApiSnapshot;
use crate::error::{ReconError, Result};
use crate::ingest::Fixture;
use crate::record::{normalize_key, RawOrderRecord};
use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::{debug, warn};

// ============================================================================
// FIXTURE SELECTION
// ============================================================================

/// Pick the single (fixture, date) pair this run reconciles.
///
/// A fixture name that appears on several dates (cup replays, league and
/// cup meetings in one season) needs an explicit date; resolution never
/// picks one silently.
pub fn select_fixture(
    fixtures: &[Fixture],
    fixture_name: &str,
    event_date: Option<NaiveDate>,
) -> Result<Fixture> {
    let wanted = normalize_key(fixture_name);
    let mut dates: Vec<NaiveDate> = fixtures
        .iter()
        .filter(|f| normalize_key(&f.name) == wanted)
        .map(|f| f.date)
        .collect();
    dates.sort_unstable();
    dates.dedup();

    if dates.is_empty() {
        return Err(ReconError::UnknownFixture {
            fixture: fixture_name.to_string(),
        });
    }

    let date = match event_date {
        Some(date) => {
            if !dates.contains(&date) {
                return Err(ReconError::UnknownFixture {
                    fixture: format!("{} on {}", fixture_name, date),
                });
            }
            date
        }
        None if dates.len() == 1 => dates[0],
        None => {
            return Err(ReconError::AmbiguousEvent {
                fixture: fixture_name.to_string(),
                dates,
            });
        }
    };

    Ok(Fixture {
        name: fixture_name.trim().to_string(),
        date,
    })
}

// ============================================================================
// EVENT INDEX
// ============================================================================

/// Lookup from normalized (location, event, date) to the API's event id,
/// built from the snapshot's pre-order entries. Entries with nothing
/// ordered still register their event; resolution must not depend on a
/// guest having picked a menu.
#[derive(Debug, Default)]
pub struct EventIndex {
    by_key: HashMap<(String, String, Option<NaiveDate>), i64>,
}

impl EventIndex {
    /// Build the index. When the snapshot maps one (location, event,
    /// date) to several ids the first one wins and the collision is
    /// logged; the export keeps flowing with a deterministic choice.
    pub fn build(snapshot: &ApiSnapshot) -> Self {
        let mut by_key = HashMap::new();
        for entry in snapshot.event_keys() {
            let key = (
                normalize_key(&entry.location),
                normalize_key(&entry.event),
                entry.event_date,
            );
            match by_key.get(&key) {
                None => {
                    by_key.insert(key, entry.event_id);
                }
                Some(&existing) if existing != entry.event_id => {
                    warn!(
                        location = %entry.location,
                        event = %entry.event,
                        kept = existing,
                        ignored = entry.event_id,
                        "duplicate event id for the same box and fixture"
                    );
                }
                Some(_) => {}
            }
        }
        EventIndex { by_key }
    }

    pub fn lookup(
        &self,
        location: &str,
        event: &str,
        event_date: Option<NaiveDate>,
    ) -> Option<i64> {
        self.by_key
            .get(&(normalize_key(location), normalize_key(event), event_date))
            .copied()
    }

    /// Stamp each manual row with its event id. Rows with no counterpart
    /// in the API keep `None` and stay visible downstream; returns how
    /// many resolved.
    pub fn resolve(&self, records: &mut [RawOrderRecord]) -> usize {
        let mut resolved = 0;
        for record in records.iter_mut() {
            record.event_id = self.lookup(&record.location, &record.event, record.event_date);
            if record.event_id.is_some() {
                resolved += 1;
            }
        }
        debug!(resolved, total = records.len(), "event ids resolved");
        resolved
    }
}

// ============================================================================
// TESTS
// ============================================================================
