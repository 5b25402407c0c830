use super::*;
use anyhow::anyhow;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    name: String,
    columns: u32,
}

#[derive(Default)]
struct FailingMedium {
    fail_reads: bool,
    fail_writes: bool,
}

#[async_trait]
impl PreferenceMedium for FailingMedium {
    async fn read(&self, _key: &str) -> Result<Option<String>> {
        if self.fail_reads {
            return Err(anyhow!("medium unavailable"));
        }
        Ok(None)
    }

    async fn write(&self, _key: &str, _value: &str) -> Result<()> {
        if self.fail_writes {
            return Err(anyhow!("quota exceeded"));
        }
        Ok(())
    }
}

#[tokio::test]
async fn open_uses_default_when_medium_is_empty() {
    let medium = Arc::new(MemoryMedium::new());
    let store = PreferenceStore::open(medium, "theme", "dark".to_string()).await;
    assert_eq!(store.get().await, "dark");
}

#[tokio::test]
async fn set_writes_through_and_fresh_store_reads_back() {
    let medium: Arc<dyn PreferenceMedium> = Arc::new(MemoryMedium::new());

    let store = PreferenceStore::open(Arc::clone(&medium), "theme", "dark".to_string()).await;
    store.set("light".to_string()).await.expect("set");
    assert_eq!(store.get().await, "light");
    assert_eq!(
        medium.read("theme").await.expect("medium read").as_deref(),
        Some("\"light\"")
    );

    let reopened = PreferenceStore::open(medium, "theme", "dark".to_string()).await;
    assert_eq!(reopened.get().await, "light");
}

#[tokio::test]
async fn round_trip_is_independent_of_default() {
    let medium: Arc<dyn PreferenceMedium> = Arc::new(MemoryMedium::new());
    let saved = Profile {
        name: "compact".to_string(),
        columns: 3,
    };

    let store = PreferenceStore::open(
        Arc::clone(&medium),
        "layout",
        Profile {
            name: "default".to_string(),
            columns: 1,
        },
    )
    .await;
    store.set(saved.clone()).await.expect("set");

    let reopened = PreferenceStore::open(
        medium,
        "layout",
        Profile {
            name: "other".to_string(),
            columns: 9,
        },
    )
    .await;
    assert_eq!(reopened.get().await, saved);
}

#[tokio::test]
async fn unparseable_stored_value_falls_back_to_default() {
    let medium: Arc<dyn PreferenceMedium> = Arc::new(MemoryMedium::new());
    medium
        .write("layout", "not-json")
        .await
        .expect("seed raw value");

    let default = Profile {
        name: "default".to_string(),
        columns: 1,
    };
    let store = PreferenceStore::open(medium, "layout", default.clone()).await;
    assert_eq!(store.get().await, default);
}

#[tokio::test]
async fn read_failure_is_treated_as_absent() {
    let medium = Arc::new(FailingMedium {
        fail_reads: true,
        ..FailingMedium::default()
    });
    let store = PreferenceStore::open(medium, "theme", "dark".to_string()).await;
    assert_eq!(store.get().await, "dark");
}

#[tokio::test]
async fn write_failure_reports_error_but_keeps_memory_update() {
    let medium = Arc::new(FailingMedium {
        fail_writes: true,
        ..FailingMedium::default()
    });
    let store = PreferenceStore::open(medium, "theme", "dark".to_string()).await;

    let result = store.set("light".to_string()).await;
    assert!(matches!(result, Err(PreferenceError::Write { .. })));
    assert_eq!(store.get().await, "light");
}

#[tokio::test]
async fn last_write_wins_between_stores_sharing_a_key() {
    let medium: Arc<dyn PreferenceMedium> = Arc::new(MemoryMedium::new());

    let first = PreferenceStore::open(Arc::clone(&medium), "theme", "dark".to_string()).await;
    let second = PreferenceStore::open(Arc::clone(&medium), "theme", "dark".to_string()).await;
    first.set("light".to_string()).await.expect("first set");
    second.set("dark".to_string()).await.expect("second set");

    let reopened = PreferenceStore::open(medium, "theme", "light".to_string()).await;
    assert_eq!(reopened.get().await, "dark");
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let medium = SqliteMedium::new("sqlite::memory:").await.expect("db");
    medium.health_check().await.expect("health check");
}

#[tokio::test]
async fn sqlite_round_trip_survives_medium_reopen() {
    let temp_root = tempfile::tempdir().expect("temp dir");
    let db_path = temp_root.path().join("nested").join("preferences.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    {
        let medium: Arc<dyn PreferenceMedium> =
            Arc::new(SqliteMedium::new(&database_url).await.expect("db"));
        let store = PreferenceStore::open(medium, "theme", "dark".to_string()).await;
        store.set("light".to_string()).await.expect("set");
    }
    assert!(db_path.exists(), "database file should exist");

    let medium: Arc<dyn PreferenceMedium> =
        Arc::new(SqliteMedium::new(&database_url).await.expect("reopen db"));
    let store = PreferenceStore::open(medium, "theme", "dark".to_string()).await;
    assert_eq!(store.get().await, "light");
}
