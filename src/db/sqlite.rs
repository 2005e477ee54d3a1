//! SQLite backend implementation.

use rusqlite::{params, params_from_iter, Connection};
use std::collections::HashMap;
use std::path::Path;

use super::backend::{PhotoIndex, PlaceIndex, TripStore};
use super::schema::{MIGRATIONS, SCHEMA};
use super::{NewPhoto, NewTrip, PhotoRow, StoredNotification, TripSummary};
use crate::error::StoreError;
use crate::trips::PlaceMembership;

/// SQLite limits bound parameters per statement; stay well below it.
const ID_CHUNK: usize = 500;

pub struct SqliteDb {
    pub(crate) conn: Connection,
}

impl SqliteDb {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(Self { conn })
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA)?;
        self.run_migrations();
        Ok(())
    }

    fn run_migrations(&self) {
        for migration in MIGRATIONS {
            let _ = self.conn.execute(migration, []);
        }
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Insert a photo or update the row with the same path. Returns its id.
    pub fn upsert_photo(&self, photo: &NewPhoto) -> Result<i64, StoreError> {
        let id = self.conn.query_row(
            r#"
            INSERT INTO photos (user_id, path, taken_at, gps_latitude, gps_longitude, location_override)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(path) DO UPDATE SET
                user_id = excluded.user_id,
                taken_at = excluded.taken_at,
                gps_latitude = excluded.gps_latitude,
                gps_longitude = excluded.gps_longitude,
                location_override = excluded.location_override,
                indexed_at = CURRENT_TIMESTAMP
            RETURNING id
            "#,
            params![
                photo.user_id,
                photo.path,
                photo.taken_at,
                photo.gps_latitude,
                photo.gps_longitude,
                photo.location_override,
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn upsert_place(&self, osm_id: i64, name: &str, admin_level: i32) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO places (osm_id, name, admin_level) VALUES (?1, ?2, ?3)
            ON CONFLICT(osm_id) DO UPDATE SET name = excluded.name, admin_level = excluded.admin_level
            "#,
            params![osm_id, name, admin_level],
        )?;
        Ok(())
    }

    pub fn link_photo_place(&self, photo_id: i64, osm_id: i64) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO photo_places (photo_id, osm_id) VALUES (?1, ?2)",
            params![photo_id, osm_id],
        )?;
        Ok(())
    }

    // ========================================================================
    // Trip statistics
    // ========================================================================

    pub fn count_trips(&self, user: Option<&str>) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM trips WHERE (?1 IS NULL OR user_id = ?1)",
            params![user],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn count_trip_photos(&self, user: Option<&str>) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            r#"
            SELECT COUNT(*)
            FROM trip_photos tp
            JOIN trips t ON t.id = tp.trip_id
            WHERE (?1 IS NULL OR t.user_id = ?1)
            "#,
            params![user],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn trip_photo_ids(&self, trip_id: i64) -> Result<Vec<i64>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT photo_id FROM trip_photos WHERE trip_id = ?1 ORDER BY photo_id")?;
        let ids = stmt
            .query_map([trip_id], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    pub fn insert_notification(
        &self,
        user_id: &str,
        kind: &str,
        subject: &str,
        message: &str,
        payload: Option<&str>,
    ) -> Result<i64, StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO notifications (user_id, kind, subject, message, payload)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![user_id, kind, subject, message, payload],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Notifications for a user, newest first.
    pub fn notifications(&self, user_id: &str) -> Result<Vec<StoredNotification>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, kind, subject, message, payload, created_at
            FROM notifications
            WHERE user_id = ?1
            ORDER BY id DESC
            "#,
        )?;
        let rows = stmt
            .query_map([user_id], |row| {
                Ok(StoredNotification {
                    id: row.get(0)?,
                    kind: row.get(1)?,
                    subject: row.get(2)?,
                    message: row.get(3)?,
                    payload: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl PhotoIndex for SqliteDb {
    fn fetch_candidates(
        &self,
        user: Option<&str>,
        skip_assigned: bool,
    ) -> Result<Vec<PhotoRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT p.id, p.user_id, p.taken_at, p.gps_latitude, p.gps_longitude, p.path, p.location_override
            FROM photos p
            WHERE p.taken_at IS NOT NULL
              AND (?1 IS NULL OR p.user_id = ?1)
              AND (?2 = 0 OR NOT EXISTS (
                    SELECT 1 FROM trip_photos tp WHERE tp.photo_id = p.id
              ))
            ORDER BY p.id
            "#,
        )?;
        let rows = stmt
            .query_map(params![user, skip_assigned], |row| {
                Ok(PhotoRow {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    taken_at: row.get(2)?,
                    gps_latitude: row.get(3)?,
                    gps_longitude: row.get(4)?,
                    path: row.get(5)?,
                    location_override: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn user_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT user_id FROM photos ORDER BY user_id")?;
        let users = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(users)
    }
}

impl PlaceIndex for SqliteDb {
    fn place_memberships(
        &self,
        photo_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<PlaceMembership>>, StoreError> {
        let mut memberships: HashMap<i64, Vec<PlaceMembership>> = HashMap::new();

        for chunk in photo_ids.chunks(ID_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                r#"
                SELECT pp.photo_id, pl.osm_id, pl.name, pl.admin_level
                FROM photo_places pp
                JOIN places pl ON pl.osm_id = pp.osm_id
                WHERE pp.photo_id IN ({placeholders})
                ORDER BY pp.photo_id, pl.admin_level ASC, pl.osm_id
                "#
            );
            let mut stmt = self.conn.prepare(&sql)?;
            let mut rows = stmt.query(params_from_iter(chunk.iter()))?;
            while let Some(row) = rows.next()? {
                let photo_id: i64 = row.get(0)?;
                memberships.entry(photo_id).or_default().push(PlaceMembership {
                    osm_id: row.get(1)?,
                    name: row.get(2)?,
                    admin_level: row.get(3)?,
                });
            }
        }

        Ok(memberships)
    }
}

impl TripStore for SqliteDb {
    fn insert_trip(&self, trip: &NewTrip, photo_ids: &[i64]) -> Result<i64, StoreError> {
        // Dropping the transaction on any early return rolls the trip back.
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            INSERT INTO trips (user_id, start_date, end_date, distance_km, location, descriptive_name, timeframe)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                trip.user_id,
                trip.start_date,
                trip.end_date,
                trip.distance_km,
                trip.location,
                trip.descriptive_name,
                trip.timeframe,
            ],
        )?;
        let trip_id = tx.last_insert_rowid();
        {
            let mut stmt = tx.prepare("INSERT INTO trip_photos (trip_id, photo_id) VALUES (?1, ?2)")?;
            for photo_id in photo_ids {
                stmt.execute(params![trip_id, photo_id])?;
            }
        }
        tx.commit()?;
        Ok(trip_id)
    }

    fn delete_trips(&self, user: Option<&str>) -> Result<usize, StoreError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            DELETE FROM trip_photos
            WHERE trip_id IN (SELECT id FROM trips WHERE (?1 IS NULL OR user_id = ?1))
            "#,
            params![user],
        )?;
        let deleted = tx.execute(
            "DELETE FROM trips WHERE (?1 IS NULL OR user_id = ?1)",
            params![user],
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    fn list_trips(&self, user: Option<&str>) -> Result<Vec<TripSummary>, StoreError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT t.id, t.user_id, t.descriptive_name, t.location, t.start_date, t.end_date,
                   t.timeframe, t.distance_km, t.created_at, COUNT(tp.photo_id)
            FROM trips t
            LEFT JOIN trip_photos tp ON tp.trip_id = t.id
            WHERE (?1 IS NULL OR t.user_id = ?1)
            GROUP BY t.id
            ORDER BY t.start_date, t.id
            "#,
        )?;
        let trips = stmt
            .query_map(params![user], |row| {
                Ok(TripSummary {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    descriptive_name: row.get(2)?,
                    location: row.get(3)?,
                    start_date: row.get(4)?,
                    end_date: row.get(5)?,
                    timeframe: row.get(6)?,
                    distance_km: row.get(7)?,
                    created_at: row.get(8)?,
                    photo_count: row.get::<_, i64>(9)? as usize,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(trips)
    }
}
