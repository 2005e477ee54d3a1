pub const SCHEMA: &str = r#"
-- Photo index: one row per photo, filled by the ingestion pipeline
CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    path TEXT NOT NULL UNIQUE,
    taken_at TEXT,              -- epoch seconds, RFC 3339 or EXIF date string
    gps_latitude REAL,
    gps_longitude REAL,
    location_override TEXT,     -- label that wins over boundary-based naming
    indexed_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_photos_user ON photos(user_id);
CREATE INDEX IF NOT EXISTS idx_photos_taken_at ON photos(taken_at);

-- Administrative boundaries (OSM relations)
CREATE TABLE IF NOT EXISTS places (
    osm_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    admin_level INTEGER NOT NULL
);

-- Boundaries each photo's coordinates fall inside
CREATE TABLE IF NOT EXISTS photo_places (
    photo_id INTEGER NOT NULL,
    osm_id INTEGER NOT NULL,
    PRIMARY KEY (photo_id, osm_id),
    FOREIGN KEY (photo_id) REFERENCES photos(id) ON DELETE CASCADE,
    FOREIGN KEY (osm_id) REFERENCES places(osm_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_photo_places_osm ON photo_places(osm_id);

-- Detected trips
CREATE TABLE IF NOT EXISTS trips (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    start_date INTEGER NOT NULL,    -- epoch seconds
    end_date INTEGER NOT NULL,
    distance_km REAL NOT NULL DEFAULT 0,
    location TEXT NOT NULL,
    descriptive_name TEXT NOT NULL,
    timeframe TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    CHECK (start_date <= end_date)
);

CREATE INDEX IF NOT EXISTS idx_trips_user ON trips(user_id);
CREATE INDEX IF NOT EXISTS idx_trips_start ON trips(start_date);

-- Trip membership
CREATE TABLE IF NOT EXISTS trip_photos (
    trip_id INTEGER NOT NULL,
    photo_id INTEGER NOT NULL,
    UNIQUE (trip_id, photo_id),
    FOREIGN KEY (trip_id) REFERENCES trips(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_trip_photos_photo ON trip_photos(photo_id);

-- Inbox of user notifications
CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    kind TEXT NOT NULL,             -- 'single' or 'multiple'
    subject TEXT NOT NULL,
    message TEXT NOT NULL,
    payload TEXT,                   -- JSON
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    read_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id);
"#;

/// Column additions for databases created by older versions. Each statement
/// is attempted once per startup; "duplicate column" failures are expected.
pub const MIGRATIONS: &[&str] = &[
    "ALTER TABLE photos ADD COLUMN location_override TEXT",
    "ALTER TABLE trips ADD COLUMN timeframe TEXT NOT NULL DEFAULT ''",
    "ALTER TABLE notifications ADD COLUMN read_at TEXT",
];
