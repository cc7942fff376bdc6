//! Shared fixtures: one engine per backend, each in its own scratch dir.

#![allow(dead_code)]

use std::sync::Arc;

use hbnb::config::StorageConfig;
use hbnb::models::{Amenity, City, Entity, Place, State, User};
use hbnb::{StorageEngine, StorageKind};
use tempfile::{tempdir, TempDir};

/// An engine plus the directory that keeps its data alive.
pub struct Fixture {
    pub dir: TempDir,
    pub engine: Arc<StorageEngine>,
}

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

pub fn config_for(kind: StorageKind, dir: &TempDir) -> StorageConfig {
    match kind {
        StorageKind::File => StorageConfig::file(dir.path().join("file.json").to_string_lossy()),
        StorageKind::Db => {
            StorageConfig::db(format!("sqlite://{}", dir.path().join("hbnb.db").display()))
        }
    }
}

pub async fn open(kind: StorageKind) -> Fixture {
    init_logging();
    let dir = tempdir().unwrap();
    let engine = StorageEngine::open(&config_for(kind, &dir)).await.unwrap();
    Fixture {
        dir,
        engine: Arc::new(engine),
    }
}

pub const BACKENDS: [StorageKind; 2] = [StorageKind::File, StorageKind::Db];

/// A small world:
///
/// ```text
/// California ── San Francisco ── loft {wifi, pool, parking}, cabin {wifi}
///            └─ Oakland ──────── studio {}
/// Nevada ────── Reno ─────────── chalet {pool, wifi}
/// ```
pub struct World {
    pub california: State,
    pub nevada: State,
    pub san_francisco: City,
    pub oakland: City,
    pub reno: City,
    pub host: User,
    pub wifi: Amenity,
    pub pool: Amenity,
    pub parking: Amenity,
    pub loft: Place,
    pub cabin: Place,
    pub studio: Place,
    pub chalet: Place,
}

impl World {
    pub fn new() -> Self {
        let california = State::new("California");
        let nevada = State::new("Nevada");
        let san_francisco = City::new(&california.base.id, "San Francisco");
        let oakland = City::new(&california.base.id, "Oakland");
        let reno = City::new(&nevada.base.id, "Reno");
        let host = User::new("host@example.com", "secret");
        let wifi = Amenity::new("Wifi");
        let pool = Amenity::new("Pool");
        let parking = Amenity::new("Parking");

        let mut loft = Place::new(&san_francisco.base.id, &host.base.id, "Loft");
        loft.link_amenity(&wifi.base.id);
        loft.link_amenity(&pool.base.id);
        loft.link_amenity(&parking.base.id);
        let mut cabin = Place::new(&san_francisco.base.id, &host.base.id, "Cabin");
        cabin.link_amenity(&wifi.base.id);
        let studio = Place::new(&oakland.base.id, &host.base.id, "Studio");
        let mut chalet = Place::new(&reno.base.id, &host.base.id, "Chalet");
        chalet.link_amenity(&pool.base.id);
        chalet.link_amenity(&wifi.base.id);

        Self {
            california,
            nevada,
            san_francisco,
            oakland,
            reno,
            host,
            wifi,
            pool,
            parking,
            loft,
            cabin,
            studio,
            chalet,
        }
    }

    /// Every entity, parents before children.
    pub fn entities(&self) -> Vec<Entity> {
        vec![
            self.california.clone().into(),
            self.nevada.clone().into(),
            self.san_francisco.clone().into(),
            self.oakland.clone().into(),
            self.reno.clone().into(),
            self.host.clone().into(),
            self.wifi.clone().into(),
            self.pool.clone().into(),
            self.parking.clone().into(),
            self.loft.clone().into(),
            self.cabin.clone().into(),
            self.studio.clone().into(),
            self.chalet.clone().into(),
        ]
    }

    /// Store the world through one committed session.
    pub async fn seed(&self, engine: &StorageEngine) {
        let storage = engine.session();
        for entity in self.entities() {
            storage.add(entity).await.unwrap();
        }
        storage.save().await.unwrap();
        storage.close().await.unwrap();
    }
}

/// Sorted ids of places, for order-insensitive comparison.
pub fn place_ids(places: &[Place]) -> Vec<String> {
    let mut ids: Vec<String> = places.iter().map(|p| p.base.id.clone()).collect();
    ids.sort();
    ids
}
