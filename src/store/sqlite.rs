//! Plant persistence using SQLite.
//!
//! One row per plant; history is kept as a JSON array column since it is
//! always read and written whole. The optimistic version check is part of
//! the UPDATE's WHERE clause.
//!
//! The `status` column is informational: on load the status is derived from
//! `level`, so rows edited outside the engine cannot carry a stale pair.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::plant::{Category, Coordinate, Plant, Sample, StatusThresholds};
use crate::store::{PlantFilter, PlantStore, SaveOutcome};

const SELECT_COLUMNS: &str =
    "id, name, category, lat, lng, zone_name, level, status, last_updated, history, version";

/// Persists plants in SQLite.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    thresholds: StatusThresholds,
}

/// Raw column values of one row
struct PlantRow {
    id: String,
    name: String,
    category: String,
    lat: Option<f64>,
    lng: Option<f64>,
    zone_name: Option<String>,
    level: i64,
    status: String,
    last_updated: String,
    history: String,
    version: i64,
}

impl PlantRow {
    fn read(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            category: row.get(2)?,
            lat: row.get(3)?,
            lng: row.get(4)?,
            zone_name: row.get(5)?,
            level: row.get(6)?,
            status: row.get(7)?,
            last_updated: row.get(8)?,
            history: row.get(9)?,
            version: row.get(10)?,
        })
    }

    fn into_plant(self, thresholds: &StatusThresholds) -> Result<Plant> {
        let location = match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Some(Coordinate::new(lat, lng)),
            _ => None,
        };
        let level = u8::try_from(self.level)
            .ok()
            .filter(|level| *level <= 100)
            .ok_or_else(|| anyhow!("Level {} out of range for plant {}", self.level, self.id))?;
        let status = thresholds.classify(level);
        if status.as_str() != self.status {
            debug!(
                plant_id = %self.id,
                stored = %self.status,
                derived = status.as_str(),
                "Stored status disagrees with level, using derived status"
            );
        }
        let last_updated: DateTime<Utc> = self
            .last_updated
            .parse()
            .with_context(|| format!("Failed to parse last_updated for plant {}", self.id))?;
        let history: Vec<Sample> = serde_json::from_str(&self.history)
            .with_context(|| format!("Failed to parse history for plant {}", self.id))?;

        Ok(Plant {
            category: Category::from_name(&self.category),
            version: u64::try_from(self.version).unwrap_or_default(),
            id: self.id,
            name: self.name,
            location,
            zone_name: self.zone_name,
            level,
            status,
            last_updated,
            history,
        })
    }
}

impl SqliteStore {
    /// Opens (or creates) the SQLite database and ensures the table exists.
    pub fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open plant DB at {}", db_path))?;
        let store = Self {
            conn: Mutex::new(conn),
            thresholds: StatusThresholds::default(),
        };
        store.create_table()?;
        Ok(store)
    }

    /// Thresholds used to derive each loaded plant's status.
    pub fn with_thresholds(mut self, thresholds: StatusThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Plant DB connection mutex poisoned"))
    }

    fn create_table(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS plants (
                id           TEXT PRIMARY KEY,
                name         TEXT NOT NULL,
                category     TEXT NOT NULL,
                lat          REAL,
                lng          REAL,
                zone_name    TEXT,
                level        INTEGER NOT NULL CHECK (level BETWEEN 0 AND 100),
                status       TEXT NOT NULL,
                last_updated TEXT NOT NULL,
                history      TEXT NOT NULL,
                version      INTEGER NOT NULL
            );",
        )
        .context("Failed to create plants table")?;
        Ok(())
    }
}

fn history_json(plant: &Plant) -> Result<String> {
    serde_json::to_string(&plant.history)
        .with_context(|| format!("Failed to serialize history for plant {}", plant.id))
}

impl PlantStore for SqliteStore {
    fn get(&self, id: &str) -> Result<Option<Plant>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM plants WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                PlantRow::read,
            )
            .optional()
            .with_context(|| format!("Failed to load plant {}", id))?;
        row.map(|row| row.into_plant(&self.thresholds)).transpose()
    }

    fn save(&self, plant: &Plant, expected_version: u64) -> Result<SaveOutcome> {
        let history = history_json(plant)?;
        let expected = i64::try_from(expected_version).context("Version out of range")?;
        let conn = self.lock()?;

        let changed = conn
            .execute(
                "UPDATE plants
                 SET name = ?1, category = ?2, lat = ?3, lng = ?4, zone_name = ?5,
                     level = ?6, status = ?7, last_updated = ?8, history = ?9,
                     version = version + 1
                 WHERE id = ?10 AND version = ?11",
                params![
                    plant.name,
                    plant.category.as_str(),
                    plant.location.map(|c| c.lat),
                    plant.location.map(|c| c.lng),
                    plant.zone_name,
                    plant.level,
                    plant.status.as_str(),
                    plant.last_updated.to_rfc3339(),
                    history,
                    plant.id,
                    expected,
                ],
            )
            .with_context(|| format!("Failed to save plant {}", plant.id))?;

        if changed == 1 {
            let mut saved = plant.clone();
            saved.version = expected_version + 1;
            return Ok(SaveOutcome::Saved(saved));
        }

        let current: Option<i64> = conn
            .query_row(
                "SELECT version FROM plants WHERE id = ?1",
                params![plant.id],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to read version of plant {}", plant.id))?;

        Ok(match current {
            Some(version) => SaveOutcome::Conflict {
                current_version: u64::try_from(version).unwrap_or_default(),
            },
            None => SaveOutcome::Missing,
        })
    }

    fn list_all(&self, filter: PlantFilter) -> Result<Vec<Plant>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM plants ORDER BY id ASC", SELECT_COLUMNS))
            .context("Failed to prepare list_all query")?;
        let rows = stmt
            .query_map([], PlantRow::read)
            .context("Failed to query plants")?;

        // A malformed row is skipped so the remaining plants still load
        let mut plants = Vec::new();
        for row in rows {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable plant row");
                    continue;
                }
            };
            let id = row.id.clone();
            match row.into_plant(&self.thresholds) {
                Ok(plant) if filter.matches(&plant) => plants.push(plant),
                Ok(_) => {}
                Err(e) => warn!(plant_id = %id, error = %e, "Skipping unparseable plant row"),
            }
        }
        Ok(plants)
    }

    fn insert(&self, plant: &Plant) -> Result<()> {
        let history = history_json(plant)?;
        let version = i64::try_from(plant.version).context("Version out of range")?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO plants (id, name, category, lat, lng, zone_name, level, status,
                                 last_updated, history, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                plant.id,
                plant.name,
                plant.category.as_str(),
                plant.location.map(|c| c.lat),
                plant.location.map(|c| c.lng),
                plant.zone_name,
                plant.level,
                plant.status.as_str(),
                plant.last_updated.to_rfc3339(),
                history,
                version,
            ],
        )
        .with_context(|| format!("Failed to insert plant {}", plant.id))?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let removed = conn
            .execute("DELETE FROM plants WHERE id = ?1", params![id])
            .with_context(|| format!("Failed to delete plant {}", id))?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plant::Status;
    use chrono::{Duration, TimeZone};

    fn in_memory_store() -> SqliteStore {
        SqliteStore::new(":memory:").expect("in-memory store failed")
    }

    fn sample_plant(id: &str) -> Plant {
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap();
        let mut plant = Plant::new(
            id,
            Category::VerticalGarden,
            Some(Coordinate::new(44.4949, 11.3426)),
            64,
            &StatusThresholds::default(),
            now,
        );
        plant.name = "Via Rizzoli wall".to_string();
        plant.zone_name = Some("Bologna".to_string());
        plant.history = vec![
            Sample::new(66, now - Duration::minutes(20)),
            Sample::new(64, now),
        ];
        plant
    }

    #[test]
    fn test_insert_and_get() {
        let store = in_memory_store();
        let plant = sample_plant("wall-1");
        store.insert(&plant).expect("insert failed");

        let loaded = store.get("wall-1").unwrap().expect("plant missing");
        assert_eq!(loaded, plant);
    }

    #[test]
    fn test_get_missing() {
        let store = in_memory_store();
        assert!(store.get("nope").unwrap().is_none());
    }

    #[test]
    fn test_plant_without_location() {
        let store = in_memory_store();
        let mut plant = sample_plant("potted-1");
        plant.location = None;
        plant.zone_name = None;
        store.insert(&plant).unwrap();

        let loaded = store.get("potted-1").unwrap().unwrap();
        assert_eq!(loaded.location, None);
        assert_eq!(loaded.zone_name, None);
    }

    #[test]
    fn test_duplicate_id_fails() {
        let store = in_memory_store();
        store.insert(&sample_plant("wall-1")).unwrap();
        assert!(store.insert(&sample_plant("wall-1")).is_err());
    }

    #[test]
    fn test_save_with_matching_version() {
        let store = in_memory_store();
        store.insert(&sample_plant("wall-1")).unwrap();

        let mut plant = store.get("wall-1").unwrap().unwrap();
        plant.level = 30;
        plant.status = Status::Thirsty;

        let outcome = store.save(&plant, 0).unwrap();
        let SaveOutcome::Saved(saved) = outcome else {
            panic!("expected save to succeed");
        };
        assert_eq!(saved.version, 1);

        let loaded = store.get("wall-1").unwrap().unwrap();
        assert_eq!(loaded.level, 30);
        assert_eq!(loaded.status, Status::Thirsty);
        assert_eq!(loaded.version, 1);
    }

    #[test]
    fn test_save_with_stale_version_conflicts() {
        let store = in_memory_store();
        store.insert(&sample_plant("wall-1")).unwrap();

        let plant = store.get("wall-1").unwrap().unwrap();
        store.save(&plant, 0).unwrap();

        let outcome = store.save(&plant, 0).unwrap();
        assert_eq!(outcome, SaveOutcome::Conflict { current_version: 1 });
    }

    #[test]
    fn test_save_deleted_plant_is_missing() {
        let store = in_memory_store();
        let plant = sample_plant("wall-1");
        store.insert(&plant).unwrap();
        assert!(store.delete("wall-1").unwrap());

        assert_eq!(store.save(&plant, 0).unwrap(), SaveOutcome::Missing);
        assert!(!store.delete("wall-1").unwrap());
    }

    #[test]
    fn test_list_all_with_filter() {
        let store = in_memory_store();
        let mut fresh = sample_plant("b-fresh");
        fresh.history.clear();
        store.insert(&fresh).unwrap();
        store.insert(&sample_plant("a-old")).unwrap();

        let all = store.list_all(PlantFilter::All).unwrap();
        let ids: Vec<&str> = all.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a-old", "b-fresh"]);

        let with_history = store.list_all(PlantFilter::WithHistory).unwrap();
        assert_eq!(with_history.len(), 1);
        assert_eq!(with_history[0].id, "a-old");
    }

    #[test]
    fn test_unknown_category_loads_as_unknown() {
        let store = in_memory_store();
        store.insert(&sample_plant("wall-1")).unwrap();
        {
            let conn = store.lock().unwrap();
            conn.execute(
                "UPDATE plants SET category = 'bonsai' WHERE id = 'wall-1'",
                [],
            )
            .unwrap();
        }
        let loaded = store.get("wall-1").unwrap().unwrap();
        assert_eq!(loaded.category, Category::Unknown);
    }

    fn corrupt(store: &SqliteStore, sql: &str) {
        let conn = store.lock().unwrap();
        conn.execute(sql, []).unwrap();
    }

    #[test]
    fn test_list_all_skips_unparseable_rows() {
        let store = in_memory_store();
        for id in ["a-history", "b-good", "c-timestamp"] {
            store.insert(&sample_plant(id)).unwrap();
        }
        corrupt(&store, "UPDATE plants SET history = 'not json' WHERE id = 'a-history'");
        corrupt(&store, "UPDATE plants SET last_updated = 'yesterday' WHERE id = 'c-timestamp'");

        let all = store.list_all(PlantFilter::All).unwrap();
        let ids: Vec<&str> = all.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["b-good"]);

        // Direct lookups still report the damage
        assert!(store.get("a-history").is_err());
        assert!(store.get("b-good").unwrap().is_some());
    }

    #[test]
    fn test_status_is_derived_from_level_on_load() {
        let store = in_memory_store();
        store.insert(&sample_plant("wall-1")).unwrap();
        corrupt(
            &store,
            "UPDATE plants SET level = 12, status = 'healthy' WHERE id = 'wall-1'",
        );

        let loaded = store.get("wall-1").unwrap().unwrap();
        assert_eq!(loaded.level, 12);
        assert_eq!(loaded.status, Status::Critical);

        corrupt(&store, "UPDATE plants SET status = 'wilted' WHERE id = 'wall-1'");
        let listed = store.list_all(PlantFilter::All).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, Status::Critical);
    }

    #[test]
    fn test_custom_thresholds_classify_loaded_plants() {
        let store = in_memory_store().with_thresholds(StatusThresholds {
            healthy: 80,
            critical: 30,
        });
        store.insert(&sample_plant("wall-1")).unwrap();

        // 64 is healthy under the defaults but thirsty here
        let loaded = store.get("wall-1").unwrap().unwrap();
        assert_eq!(loaded.status, Status::Thirsty);
    }
}
