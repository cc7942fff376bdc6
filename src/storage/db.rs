//! DbStorage - Relational Backend
//!
//! TigerStyle: Real database storage, one transaction per session.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        DbStorage                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pool: sqlx::SqlitePool (shared by every session)            │
//! │  Session: pooled connection in BEGIN IMMEDIATE, one request  │
//! │  Tables: one per kind + place_amenity association table      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! `add`/`delete` run inside the session transaction, so the session sees
//! its own writes at once. `save` commits; `close` rolls back whatever was
//! not committed.
//!
//! Sessions take the write lock when they begin. A second session waits on
//! the busy timeout instead of failing later on a stale read snapshot.
//! Each `add` runs inside a savepoint, so a failed write leaves nothing
//! behind in the session.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool,
    SqlitePoolOptions, SqliteRow,
};
use sqlx::pool::PoolConnection;
use sqlx::{Connection, Decode, Row, Type};
use tokio::sync::{Mutex, MutexGuard};

use super::backend::Storage;
use super::error::{StorageError, StorageResult};
use super::StorageKind;
use crate::models::{Amenity, BaseModel, City, Entity, EntityKind, Place, Review, State, User};

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// How long a writer waits on a locked database before failing
const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Opens a session; takes the write lock up front
const BEGIN_SESSION: &str = "BEGIN IMMEDIATE";

const SAVEPOINT_OPEN: &str = "SAVEPOINT entity_write";
const SAVEPOINT_RELEASE: &str = "RELEASE SAVEPOINT entity_write";
const SAVEPOINT_ROLLBACK: &str = "ROLLBACK TO SAVEPOINT entity_write";

/// Schema, one statement per entry. Foreign keys cascade on delete.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS states (
        id TEXT PRIMARY KEY,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cities (
        id TEXT PRIMARY KEY,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        state_id TEXT NOT NULL REFERENCES states(id) ON DELETE CASCADE,
        name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL,
        first_name TEXT,
        last_name TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS amenities (
        id TEXT PRIMARY KEY,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        name TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS places (
        id TEXT PRIMARY KEY,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        city_id TEXT NOT NULL REFERENCES cities(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        description TEXT,
        number_rooms INTEGER NOT NULL DEFAULT 0,
        number_bathrooms INTEGER NOT NULL DEFAULT 0,
        max_guest INTEGER NOT NULL DEFAULT 0,
        price_by_night INTEGER NOT NULL DEFAULT 0,
        latitude REAL,
        longitude REAL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS reviews (
        id TEXT PRIMARY KEY,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        place_id TEXT NOT NULL REFERENCES places(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        text TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS place_amenity (
        place_id TEXT NOT NULL REFERENCES places(id) ON DELETE CASCADE,
        amenity_id TEXT NOT NULL REFERENCES amenities(id) ON DELETE CASCADE,
        PRIMARY KEY (place_id, amenity_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_cities_state ON cities(state_id)",
    "CREATE INDEX IF NOT EXISTS idx_places_city ON places(city_id)",
    "CREATE INDEX IF NOT EXISTS idx_reviews_place ON reviews(place_id)",
];

/// A pooled connection with an open transaction.
type Session = PoolConnection<Sqlite>;

// =============================================================================
// DbStorage
// =============================================================================

/// SQLite-backed relational storage.
///
/// The process owns one `DbStorage` built with [`DbStorage::connect`]; each
/// request gets its own handle from [`DbStorage::session`], which shares the
/// pool but never the transaction.
pub struct DbStorage {
    pool: SqlitePool,
    session: Mutex<Option<Session>>,
}

impl DbStorage {
    /// Connect to the database at `url`.
    ///
    /// The schema is not touched until `reload`.
    ///
    /// # Errors
    /// Returns error if the URL is invalid or the pool cannot connect.
    ///
    /// # Example
    /// ```ignore
    /// let storage = DbStorage::connect("sqlite://hbnb.db", 10).await?;
    /// storage.reload().await?;
    /// ```
    pub async fn connect(url: &str, max_connections: u32) -> StorageResult<Self> {
        if url.is_empty() {
            return Err(StorageError::connection("database url cannot be empty"));
        }
        if max_connections == 0 {
            return Err(StorageError::connection("pool needs at least one connection"));
        }

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StorageError::connection(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::connection(format!("failed to connect: {e}")))?;

        tracing::info!(url = %url, max_connections, "Connected to database");
        Ok(Self::from_pool(pool))
    }

    /// Create from an existing pool.
    #[must_use]
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            session: Mutex::new(None),
        }
    }

    /// A fresh request-scoped handle over the same pool.
    #[must_use]
    pub fn session(&self) -> Self {
        Self::from_pool(self.pool.clone())
    }

    /// Get the connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close all connections in the pool.
    pub async fn shutdown(&self) {
        self.pool.close().await;
    }

    /// Initialize database schema.
    async fn init_schema(&self) -> StorageResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::internal(format!("failed to create schema: {e}")))?;
        }
        Ok(())
    }

    /// The session transaction, begun on first use.
    async fn transaction(&self) -> StorageResult<MutexGuard<'_, Option<Session>>> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            let mut conn = self
                .pool
                .acquire()
                .await
                .map_err(|e| map_sqlx("acquire connection", e))?;
            execute(&mut conn, BEGIN_SESSION)
                .await
                .map_err(|e| map_sqlx("begin transaction", e))?;
            *guard = Some(conn);
        }
        Ok(guard)
    }
}

impl Drop for DbStorage {
    fn drop(&mut self) {
        // Never hand a connection with an open transaction back to the pool.
        if let Some(conn) = self.session.get_mut().take() {
            tracing::warn!("db storage dropped without close, discarding its connection");
            drop(conn.detach());
        }
    }
}

/// Borrow the connection behind an open session.
fn connection<'a>(guard: &'a mut MutexGuard<'_, Option<Session>>) -> StorageResult<&'a mut SqliteConnection> {
    guard
        .as_mut()
        .map(|conn| &mut **conn)
        .ok_or_else(|| StorageError::internal("session transaction missing"))
}

async fn execute(conn: &mut SqliteConnection, statement: &str) -> Result<(), sqlx::Error> {
    sqlx::query(statement).execute(conn).await.map(|_| ())
}

/// Roll back and return the connection to the pool. If even the rollback
/// fails, the connection is closed instead.
async fn discard(mut conn: Session) -> StorageResult<()> {
    match execute(&mut conn, "ROLLBACK").await {
        Ok(()) => Ok(()),
        Err(e) => {
            if let Err(close_err) = conn.detach().close().await {
                tracing::warn!(error = %close_err, "failed to close connection after rollback failure");
            }
            Err(map_sqlx("failed to roll back", e))
        }
    }
}

/// Run one upsert inside a savepoint: all of it lands, or none of it.
async fn write_atomically(conn: &mut SqliteConnection, entity: &Entity) -> StorageResult<()> {
    execute(&mut *conn, SAVEPOINT_OPEN)
        .await
        .map_err(|e| map_sqlx("failed to open savepoint", e))?;

    match upsert(&mut *conn, entity).await {
        Ok(()) => execute(conn, SAVEPOINT_RELEASE)
            .await
            .map_err(|e| map_sqlx("failed to release savepoint", e)),
        Err(err) => {
            execute(&mut *conn, SAVEPOINT_ROLLBACK)
                .await
                .map_err(|e| map_sqlx("failed to roll back savepoint", e))?;
            execute(conn, SAVEPOINT_RELEASE)
                .await
                .map_err(|e| map_sqlx("failed to release savepoint", e))?;
            Err(err)
        }
    }
}

/// Classify a sqlx error.
fn map_sqlx(context: &str, err: sqlx::Error) -> StorageError {
    match &err {
        sqlx::Error::Database(db_err)
            if db_err.is_unique_violation() || db_err.is_foreign_key_violation() =>
        {
            StorageError::constraint(format!("{context}: {db_err}"))
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StorageError::connection(format!("{context}: {err}"))
        }
        _ => StorageError::query(format!("{context}: {err}")),
    }
}

// =============================================================================
// Row Mapping
// =============================================================================

fn column<'r, T>(row: &'r SqliteRow, name: &str) -> StorageResult<T>
where
    T: Decode<'r, Sqlite> + Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StorageError::internal(format!("column {name}: {e}")))
}

/// Parse a database row into an Entity. Place amenity links are filled
/// in separately.
fn row_to_entity(kind: EntityKind, row: &SqliteRow) -> StorageResult<Entity> {
    let created_at: DateTime<Utc> = column(row, "created_at")?;
    let updated_at: DateTime<Utc> = column(row, "updated_at")?;
    let base = BaseModel {
        id: column(row, "id")?,
        created_at,
        updated_at,
    };

    Ok(match kind {
        EntityKind::Amenity => Amenity {
            base,
            name: column(row, "name")?,
        }
        .into(),
        EntityKind::City => City {
            base,
            state_id: column(row, "state_id")?,
            name: column(row, "name")?,
        }
        .into(),
        EntityKind::Place => Place {
            base,
            city_id: column(row, "city_id")?,
            user_id: column(row, "user_id")?,
            name: column(row, "name")?,
            description: column(row, "description")?,
            number_rooms: column(row, "number_rooms")?,
            number_bathrooms: column(row, "number_bathrooms")?,
            max_guest: column(row, "max_guest")?,
            price_by_night: column(row, "price_by_night")?,
            latitude: column(row, "latitude")?,
            longitude: column(row, "longitude")?,
            amenity_ids: Vec::new(),
        }
        .into(),
        EntityKind::Review => Review {
            base,
            place_id: column(row, "place_id")?,
            user_id: column(row, "user_id")?,
            text: column(row, "text")?,
        }
        .into(),
        EntityKind::State => State {
            base,
            name: column(row, "name")?,
        }
        .into(),
        EntityKind::User => User {
            base,
            email: column(row, "email")?,
            password: column(row, "password")?,
            first_name: column(row, "first_name")?,
            last_name: column(row, "last_name")?,
        }
        .into(),
    })
}

fn rows_to_records<T>(
    kind: EntityKind,
    rows: &[SqliteRow],
    extract: fn(Entity) -> Option<T>,
) -> StorageResult<Vec<T>> {
    rows.iter()
        .map(|row| {
            row_to_entity(kind, row)
                .map(extract)?
                .ok_or_else(|| StorageError::internal(format!("row is not a {kind}")))
        })
        .collect()
}

// =============================================================================
// Queries
// =============================================================================

async fn fetch_amenity_ids(conn: &mut SqliteConnection, place_id: &str) -> StorageResult<Vec<String>> {
    sqlx::query_scalar("SELECT amenity_id FROM place_amenity WHERE place_id = ? ORDER BY amenity_id")
        .bind(place_id)
        .fetch_all(conn)
        .await
        .map_err(|e| StorageError::read(format!("failed to load amenity links: {e}")))
}

async fn fetch_all_amenity_links(conn: &mut SqliteConnection) -> StorageResult<HashMap<String, Vec<String>>> {
    let rows = sqlx::query("SELECT place_id, amenity_id FROM place_amenity ORDER BY place_id, amenity_id")
        .fetch_all(conn)
        .await
        .map_err(|e| StorageError::read(format!("failed to load amenity links: {e}")))?;

    let mut links: HashMap<String, Vec<String>> = HashMap::new();
    for row in &rows {
        let place_id: String = column(row, "place_id")?;
        links.entry(place_id).or_default().push(column(row, "amenity_id")?);
    }
    Ok(links)
}

/// Fill `amenity_ids` on every place from the association table.
async fn hydrate_places(conn: &mut SqliteConnection, places: &mut [Place]) -> StorageResult<()> {
    if places.len() == 1 {
        let place = &mut places[0];
        place.amenity_ids = fetch_amenity_ids(conn, &place.base.id).await?;
    } else if !places.is_empty() {
        let mut links = fetch_all_amenity_links(conn).await?;
        for place in places.iter_mut() {
            place.amenity_ids = links.remove(&place.base.id).unwrap_or_default();
        }
    }
    Ok(())
}

async fn fetch_kind(conn: &mut SqliteConnection, kind: EntityKind) -> StorageResult<Vec<Entity>> {
    let sql = format!("SELECT * FROM {} ORDER BY id", kind.collection());
    let rows = sqlx::query(&sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| StorageError::read(format!("failed to list {kind}: {e}")))?;

    if kind == EntityKind::Place {
        let mut places = rows_to_records(kind, &rows, Entity::into_place)?;
        hydrate_places(conn, &mut places).await?;
        return Ok(places.into_iter().map(Entity::from).collect());
    }

    rows.iter().map(|row| row_to_entity(kind, row)).collect()
}

/// Insert or update one row. Never REPLACE: that would fire cascades.
async fn upsert(conn: &mut SqliteConnection, entity: &Entity) -> StorageResult<()> {
    let base = entity.base();
    let result = match entity {
        Entity::Amenity(amenity) => {
            sqlx::query(
                r#"
                INSERT INTO amenities (id, created_at, updated_at, name)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    updated_at = excluded.updated_at,
                    name = excluded.name
                "#,
            )
            .bind(&base.id)
            .bind(base.created_at)
            .bind(base.updated_at)
            .bind(&amenity.name)
            .execute(&mut *conn)
            .await
        }
        Entity::City(city) => {
            sqlx::query(
                r#"
                INSERT INTO cities (id, created_at, updated_at, state_id, name)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    updated_at = excluded.updated_at,
                    state_id = excluded.state_id,
                    name = excluded.name
                "#,
            )
            .bind(&base.id)
            .bind(base.created_at)
            .bind(base.updated_at)
            .bind(&city.state_id)
            .bind(&city.name)
            .execute(&mut *conn)
            .await
        }
        Entity::Place(place) => {
            sqlx::query(
                r#"
                INSERT INTO places (id, created_at, updated_at, city_id, user_id, name,
                                    description, number_rooms, number_bathrooms, max_guest,
                                    price_by_night, latitude, longitude)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    updated_at = excluded.updated_at,
                    city_id = excluded.city_id,
                    user_id = excluded.user_id,
                    name = excluded.name,
                    description = excluded.description,
                    number_rooms = excluded.number_rooms,
                    number_bathrooms = excluded.number_bathrooms,
                    max_guest = excluded.max_guest,
                    price_by_night = excluded.price_by_night,
                    latitude = excluded.latitude,
                    longitude = excluded.longitude
                "#,
            )
            .bind(&base.id)
            .bind(base.created_at)
            .bind(base.updated_at)
            .bind(&place.city_id)
            .bind(&place.user_id)
            .bind(&place.name)
            .bind(&place.description)
            .bind(place.number_rooms)
            .bind(place.number_bathrooms)
            .bind(place.max_guest)
            .bind(place.price_by_night)
            .bind(place.latitude)
            .bind(place.longitude)
            .execute(&mut *conn)
            .await
        }
        Entity::Review(review) => {
            sqlx::query(
                r#"
                INSERT INTO reviews (id, created_at, updated_at, place_id, user_id, text)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    updated_at = excluded.updated_at,
                    place_id = excluded.place_id,
                    user_id = excluded.user_id,
                    text = excluded.text
                "#,
            )
            .bind(&base.id)
            .bind(base.created_at)
            .bind(base.updated_at)
            .bind(&review.place_id)
            .bind(&review.user_id)
            .bind(&review.text)
            .execute(&mut *conn)
            .await
        }
        Entity::State(state) => {
            sqlx::query(
                r#"
                INSERT INTO states (id, created_at, updated_at, name)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    updated_at = excluded.updated_at,
                    name = excluded.name
                "#,
            )
            .bind(&base.id)
            .bind(base.created_at)
            .bind(base.updated_at)
            .bind(&state.name)
            .execute(&mut *conn)
            .await
        }
        Entity::User(user) => {
            sqlx::query(
                r#"
                INSERT INTO users (id, created_at, updated_at, email, password, first_name, last_name)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    updated_at = excluded.updated_at,
                    email = excluded.email,
                    password = excluded.password,
                    first_name = excluded.first_name,
                    last_name = excluded.last_name
                "#,
            )
            .bind(&base.id)
            .bind(base.created_at)
            .bind(base.updated_at)
            .bind(&user.email)
            .bind(&user.password)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .execute(&mut *conn)
            .await
        }
    };
    result.map_err(|e| map_sqlx(&format!("failed to store {}", entity.key()), e))?;

    if let Entity::Place(place) = entity {
        sync_amenity_links(conn, place).await?;
    }
    Ok(())
}

/// Make the association table match `place.amenity_ids`.
async fn sync_amenity_links(conn: &mut SqliteConnection, place: &Place) -> StorageResult<()> {
    sqlx::query("DELETE FROM place_amenity WHERE place_id = ?")
        .bind(&place.base.id)
        .execute(&mut *conn)
        .await
        .map_err(|e| map_sqlx("failed to clear amenity links", e))?;

    for amenity_id in &place.amenity_ids {
        sqlx::query("INSERT INTO place_amenity (place_id, amenity_id) VALUES (?, ?)")
            .bind(&place.base.id)
            .bind(amenity_id)
            .execute(&mut *conn)
            .await
            .map_err(|e| map_sqlx(&format!("failed to link amenity {amenity_id}"), e))?;
    }
    Ok(())
}

// =============================================================================
// Storage Implementation
// =============================================================================

#[async_trait]
impl Storage for DbStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Db
    }

    async fn get(&self, kind: EntityKind, id: &str) -> StorageResult<Option<Entity>> {
        let mut guard = self.transaction().await?;
        let conn = connection(&mut guard)?;

        let sql = format!("SELECT * FROM {} WHERE id = ?", kind.collection());
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| StorageError::read(format!("failed to get {kind}: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut entity = row_to_entity(kind, &row)?;
        if let Entity::Place(place) = &mut entity {
            place.amenity_ids = fetch_amenity_ids(conn, id).await?;
        }

        // Postcondition
        assert_eq!(entity.id(), id, "returned entity must match requested id");
        Ok(Some(entity))
    }

    async fn all(&self, kind: Option<EntityKind>) -> StorageResult<Vec<Entity>> {
        let mut guard = self.transaction().await?;
        let conn = connection(&mut guard)?;

        let kinds: &[EntityKind] = match &kind {
            Some(kind) => std::slice::from_ref(kind),
            None => EntityKind::all(),
        };
        let mut entities = Vec::new();
        for kind in kinds {
            entities.extend(fetch_kind(&mut *conn, *kind).await?);
        }
        Ok(entities)
    }

    async fn count(&self, kind: Option<EntityKind>) -> StorageResult<usize> {
        let mut guard = self.transaction().await?;
        let conn = connection(&mut guard)?;

        let kinds: &[EntityKind] = match &kind {
            Some(kind) => std::slice::from_ref(kind),
            None => EntityKind::all(),
        };
        let mut total: i64 = 0;
        for kind in kinds {
            let sql = format!("SELECT COUNT(*) FROM {}", kind.collection());
            let count: i64 = sqlx::query_scalar(&sql)
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| StorageError::read(format!("failed to count {kind}: {e}")))?;
            total += count;
        }

        // Postcondition
        assert!(total >= 0, "count cannot be negative");
        Ok(usize::try_from(total).unwrap_or_default())
    }

    async fn add(&self, entity: Entity) -> StorageResult<()> {
        let mut guard = self.transaction().await?;
        let conn = connection(&mut guard)?;
        tracing::debug!(key = %entity.key(), "db storage add");
        write_atomically(conn, &entity).await
    }

    async fn delete(&self, entity: &Entity) -> StorageResult<()> {
        let mut guard = self.transaction().await?;
        let conn = connection(&mut guard)?;
        tracing::debug!(key = %entity.key(), "db storage delete");

        let sql = format!("DELETE FROM {} WHERE id = ?", entity.kind().collection());
        sqlx::query(&sql)
            .bind(entity.id())
            .execute(conn)
            .await
            .map_err(|e| map_sqlx(&format!("failed to delete {}", entity.key()), e))?;
        Ok(())
    }

    async fn save(&self) -> StorageResult<()> {
        let mut guard = self.session.lock().await;
        let Some(mut conn) = guard.take() else {
            return Ok(());
        };

        if let Err(e) = execute(&mut conn, "COMMIT").await {
            // A failed COMMIT can leave the transaction open.
            if let Err(rollback_err) = discard(conn).await {
                tracing::warn!(error = %rollback_err, "rollback after failed commit also failed");
            }
            return Err(map_sqlx("failed to commit", e));
        }
        tracing::debug!("db storage committed");
        Ok(())
    }

    async fn reload(&self) -> StorageResult<()> {
        self.close().await?;
        self.init_schema().await?;
        tracing::info!("Database schema ready");
        Ok(())
    }

    async fn close(&self) -> StorageResult<()> {
        let mut guard = self.session.lock().await;
        if let Some(conn) = guard.take() {
            discard(conn).await?;
            tracing::debug!("db storage session rolled back uncommitted work");
        }
        Ok(())
    }

    async fn cities_of_state(&self, state_id: &str) -> StorageResult<Vec<City>> {
        let mut guard = self.transaction().await?;
        let conn = connection(&mut guard)?;

        let rows = sqlx::query("SELECT * FROM cities WHERE state_id = ? ORDER BY id")
            .bind(state_id)
            .fetch_all(conn)
            .await
            .map_err(|e| StorageError::read(format!("failed to list cities: {e}")))?;
        rows_to_records(EntityKind::City, &rows, Entity::into_city)
    }

    async fn places_of_city(&self, city_id: &str) -> StorageResult<Vec<Place>> {
        let mut guard = self.transaction().await?;
        let conn = connection(&mut guard)?;

        let rows = sqlx::query("SELECT * FROM places WHERE city_id = ? ORDER BY id")
            .bind(city_id)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| StorageError::read(format!("failed to list places: {e}")))?;
        let mut places = rows_to_records(EntityKind::Place, &rows, Entity::into_place)?;
        hydrate_places(conn, &mut places).await?;
        Ok(places)
    }

    async fn amenities_of_place(&self, place_id: &str) -> StorageResult<Vec<Amenity>> {
        let mut guard = self.transaction().await?;
        let conn = connection(&mut guard)?;

        let rows = sqlx::query(
            r#"
            SELECT a.* FROM amenities a
            JOIN place_amenity pa ON pa.amenity_id = a.id
            WHERE pa.place_id = ?
            ORDER BY a.id
            "#,
        )
        .bind(place_id)
        .fetch_all(conn)
        .await
        .map_err(|e| StorageError::read(format!("failed to list amenities: {e}")))?;
        rows_to_records(EntityKind::Amenity, &rows, Entity::into_amenity)
    }

    async fn reviews_of_place(&self, place_id: &str) -> StorageResult<Vec<Review>> {
        let mut guard = self.transaction().await?;
        let conn = connection(&mut guard)?;

        let rows = sqlx::query("SELECT * FROM reviews WHERE place_id = ? ORDER BY id")
            .bind(place_id)
            .fetch_all(conn)
            .await
            .map_err(|e| StorageError::read(format!("failed to list reviews: {e}")))?;
        rows_to_records(EntityKind::Review, &rows, Entity::into_review)
    }
}

// =============================================================================
// Tests (temporary SQLite file, no server needed)
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};
    use tokio_test::{assert_err, assert_ok};

    async fn open_db() -> (TempDir, DbStorage) {
        let dir = tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("hbnb.db").display());
        let storage = DbStorage::connect(&url, 4).await.unwrap();
        storage.reload().await.unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_url() {
        let result = DbStorage::connect("", 1).await;
        assert!(matches!(result, Err(StorageError::Connection { .. })));
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_pool() {
        let dir = tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("hbnb.db").display());
        let result = DbStorage::connect(&url, 0).await;
        assert!(matches!(result, Err(StorageError::Connection { .. })));
    }

    #[tokio::test]
    async fn test_add_visible_in_session_before_save() {
        let (_dir, db) = open_db().await;
        let session = db.session();
        let state = State::new("Nevada");
        let id = state.base.id.clone();

        session.add(state.into()).await.unwrap();
        assert!(session.get(EntityKind::State, &id).await.unwrap().is_some());
        assert_eq!(session.count(Some(EntityKind::State)).await.unwrap(), 1);

        // Uncommitted work is discarded on close.
        session.close().await.unwrap();
        let other = db.session();
        assert!(other.get(EntityKind::State, &id).await.unwrap().is_none());
        other.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_save_commits_for_other_sessions() {
        let (_dir, db) = open_db().await;
        let writer = db.session();
        let state = State::new("Arizona");
        let expected: Entity = state.clone().into();

        writer.add(state.clone().into()).await.unwrap();
        writer.save().await.unwrap();
        writer.close().await.unwrap();

        let reader = db.session();
        let found = reader.get(EntityKind::State, &state.base.id).await.unwrap();
        assert_eq!(found, Some(expected));
        reader.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_place_amenity_links_roundtrip() {
        let (_dir, db) = open_db().await;
        let session = db.session();

        let state = State::new("Hawaii");
        let city = City::new(&state.base.id, "Honolulu");
        let user = User::new("host@example.com", "pw");
        let pool = Amenity::new("Pool");
        let wifi = Amenity::new("Wifi");
        let mut place = Place::new(&city.base.id, &user.base.id, "Bungalow");
        place.link_amenity(&pool.base.id);
        place.link_amenity(&wifi.base.id);
        let place_id = place.base.id.clone();

        for entity in [
            Entity::from(state),
            city.into(),
            user.into(),
            pool.clone().into(),
            wifi.clone().into(),
            place.clone().into(),
        ] {
            session.add(entity).await.unwrap();
        }
        session.save().await.unwrap();

        let stored = session
            .get(EntityKind::Place, &place_id)
            .await
            .unwrap()
            .and_then(Entity::into_place)
            .unwrap();
        assert_eq!(stored, place);

        let mut expected = vec![pool.clone(), wifi];
        expected.sort_by(|a, b| a.base.id.cmp(&b.base.id));
        assert_eq!(session.amenities_of_place(&place_id).await.unwrap(), expected);

        // Deleting an amenity drops its links.
        session.delete(&pool.into()).await.unwrap();
        let stored = session
            .get(EntityKind::Place, &place_id)
            .await
            .unwrap()
            .and_then(Entity::into_place)
            .unwrap();
        assert_eq!(stored.amenity_ids.len(), 1);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_and_cascades() {
        let (_dir, db) = open_db().await;
        let session = db.session();

        let state = State::new("Vermont");
        let city = City::new(&state.base.id, "Burlington");
        let user = User::new("v@example.com", "pw");
        let place = Place::new(&city.base.id, &user.base.id, "Barn");
        let review = Review::new(&place.base.id, &user.base.id, "Rustic");
        let state: Entity = state.into();

        for entity in [
            state.clone(),
            city.into(),
            user.into(),
            place.into(),
            review.into(),
        ] {
            session.add(entity).await.unwrap();
        }

        assert_ok!(session.delete(&state).await);
        assert_ok!(session.delete(&state).await);
        assert_ok!(session.delete(&State::new("Nowhere").into()).await);

        assert_eq!(session.count(Some(EntityKind::City)).await.unwrap(), 0);
        assert_eq!(session.count(Some(EntityKind::Place)).await.unwrap(), 0);
        assert_eq!(session.count(Some(EntityKind::Review)).await.unwrap(), 0);
        assert_eq!(session.count(None).await.unwrap(), 1);
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_constraints_surface_as_constraint_errors() {
        let (_dir, db) = open_db().await;
        let session = db.session();

        session
            .add(User::new("same@example.com", "a").into())
            .await
            .unwrap();
        let err = assert_err!(session.add(User::new("same@example.com", "b").into()).await);
        assert!(matches!(err, StorageError::Constraint { .. }));

        let orphan = City::new("missing-state", "Ghost Town");
        let err = assert_err!(session.add(orphan.into()).await);
        assert!(matches!(err, StorageError::Constraint { .. }));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_reload_is_repeatable() {
        let (_dir, db) = open_db().await;
        assert_ok!(db.reload().await);
        assert_eq!(db.count(None).await.unwrap(), 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_interleaved_sessions_both_commit() {
        let (_dir, db) = open_db().await;
        let first_state = State::new("Oregon");
        let second_state = State::new("Idaho");

        let seed = db.session();
        seed.add(first_state.clone().into()).await.unwrap();
        seed.add(second_state.clone().into()).await.unwrap();
        seed.save().await.unwrap();
        seed.close().await.unwrap();

        // First session reads before the second one writes and commits.
        let first = db.session();
        assert!(first.get(EntityKind::State, &first_state.base.id).await.unwrap().is_some());

        let second = db.session();
        let second_id = second_state.base.id.clone();
        let writer = tokio::spawn(async move {
            let mut state = second
                .get(EntityKind::State, &second_id)
                .await?
                .and_then(Entity::into_state)
                .ok_or_else(|| StorageError::internal("seeded state missing"))?;
            state.name = "Gem State".to_string();
            second.add(state.into()).await?;
            second.save().await?;
            second.close().await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut renamed = first_state.clone();
        renamed.name = "Beaver State".to_string();
        assert_ok!(first.add(renamed.into()).await);
        assert_ok!(first.save().await);
        first.close().await.unwrap();
        assert_ok!(writer.await.unwrap());

        let reader = db.session();
        let names: Vec<String> = reader
            .all(Some(EntityKind::State))
            .await
            .unwrap()
            .into_iter()
            .filter_map(Entity::into_state)
            .map(|state| state.name)
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"Beaver State".to_string()));
        assert!(names.contains(&"Gem State".to_string()));
        reader.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_add_leaves_nothing_behind() {
        let (_dir, db) = open_db().await;
        let session = db.session();

        let state = State::new("Maine");
        let city = City::new(&state.base.id, "Portland");
        let user = User::new("m@example.com", "pw");
        let wifi = Amenity::new("Wifi");
        for entity in [
            Entity::from(state),
            city.clone().into(),
            user.clone().into(),
            wifi.clone().into(),
        ] {
            session.add(entity).await.unwrap();
        }

        // A brand-new place whose second link dangles.
        let mut fresh = Place::new(&city.base.id, &user.base.id, "Lighthouse");
        fresh.link_amenity(&wifi.base.id);
        fresh.link_amenity("missing-amenity");
        let err = assert_err!(session.add(fresh.clone().into()).await);
        assert!(matches!(err, StorageError::Constraint { .. }));
        assert!(session.get(EntityKind::Place, &fresh.base.id).await.unwrap().is_none());

        // An existing place keeps its previous row and links.
        let mut cottage = Place::new(&city.base.id, &user.base.id, "Cottage");
        cottage.link_amenity(&wifi.base.id);
        session.add(cottage.clone().into()).await.unwrap();
        let mut broken = cottage.clone();
        broken.name = "Broken Cottage".to_string();
        broken.link_amenity("missing-amenity");
        assert_err!(session.add(broken.into()).await);
        let stored = session.get(EntityKind::Place, &cottage.base.id).await.unwrap();
        assert_eq!(stored, Some(Entity::from(cottage.clone())));

        session.save().await.unwrap();
        session.close().await.unwrap();

        let other = db.session();
        assert!(other.get(EntityKind::Place, &fresh.base.id).await.unwrap().is_none());
        assert_eq!(other.count(Some(EntityKind::Place)).await.unwrap(), 1);
        other.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back() {
        let (_dir, db) = open_db().await;
        let session = db.session();
        {
            let mut guard = session.transaction().await.unwrap();
            let conn = connection(&mut guard).unwrap();
            execute(conn, "PRAGMA defer_foreign_keys = ON").await.unwrap();
        }

        // The dangling reference is only checked at commit time.
        session.add(State::new("Kept Out").into()).await.unwrap();
        session
            .add(City::new("missing-state", "Ghost Town").into())
            .await
            .unwrap();

        let err = assert_err!(session.save().await);
        assert!(matches!(
            err,
            StorageError::Constraint { .. } | StorageError::Query { .. }
        ));
        assert_ok!(session.close().await);

        let other = db.session();
        assert_eq!(other.count(None).await.unwrap(), 0);
        other.close().await.unwrap();
    }
}
