use chrono::NaiveTime;
use tracing::info;

use crate::engine::{Engine, EngineError};
use crate::model::{Location, NewLocation};

fn at(hour: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// The chain's three shops.
pub fn default_locations() -> Vec<NewLocation> {
    let shop = |name: &str, address: &str, city: &str, state: &str, zip: &str, close: u32| {
        NewLocation {
            name: name.into(),
            address: address.into(),
            city: city.into(),
            state: state.into(),
            zip: zip.into(),
            hours_open: at(7),
            hours_close: at(close),
            num_tables: 1,
        }
    };
    vec![
        shop("Downtown Auburn", "123 Main Street", "Auburn", "AL", "36830", 18),
        shop("West Midtown Atlanta", "456 Howell Mill Rd", "Atlanta", "GA", "30318", 19),
        shop("Star Metals Atlanta", "789 Star Metals Way", "Atlanta", "GA", "30318", 19),
    ]
}

/// Create the default locations when the engine holds none. Returns what was created.
pub async fn seed_default_locations(engine: &Engine) -> Result<Vec<Location>, EngineError> {
    if !engine.list_locations().await.is_empty() {
        return Ok(Vec::new());
    }
    let mut created = Vec::new();
    for req in default_locations() {
        created.push(engine.create_location(req).await?);
    }
    info!("seeded {} default locations", created.len());
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyHub;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("tablebook_test_seed");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn seeds_once() {
        let path = test_wal_path("seed_once.wal");
        let engine = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();

        let first = seed_default_locations(&engine).await.unwrap();
        assert_eq!(first.len(), 3);
        let second = seed_default_locations(&engine).await.unwrap();
        assert!(second.is_empty());

        let names: Vec<String> = engine
            .list_locations()
            .await
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(
            names,
            ["Downtown Auburn", "Star Metals Atlanta", "West Midtown Atlanta"]
        );
    }

    #[tokio::test]
    async fn seeded_hours_match_the_chain() {
        let path = test_wal_path("seed_hours.wal");
        let engine = Engine::new(path, Arc::new(NotifyHub::new())).unwrap();
        let created = seed_default_locations(&engine).await.unwrap();

        assert_eq!(created[1].address, "456 Howell Mill Rd");
        let auburn = &created[0];
        assert_eq!(auburn.hours_open, at(7));
        assert_eq!(auburn.hours_close, at(18));
        let date = chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        assert_eq!(engine.available_slots(auburn.id, date).await.len(), 22);
        assert_eq!(engine.available_slots(created[1].id, date).await.len(), 24);
    }
}
