//! Settings repository implementation

use crate::error::Result;
use libsql::Connection;
use uuid::Uuid;

/// Setting key holding this installation's replica identity
pub const REPLICA_ID_KEY: &str = "replica_id";

/// Trait for key/value settings storage (async)
#[allow(async_fn_in_trait)]
pub trait SettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Stable id of this replica, generated on first use
    async fn replica_id(&self) -> Result<String>;
}

/// libSQL implementation of `SettingsRepository`
pub struct LibSqlSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl SettingsRepository for LibSqlSettingsRepository<'_> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM settings WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }

    async fn replica_id(&self) -> Result<String> {
        if let Some(existing) = self.get(REPLICA_ID_KEY).await? {
            return Ok(existing);
        }

        let generated = Uuid::now_v7().to_string();
        self.conn
            .execute(
                "INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)",
                [REPLICA_ID_KEY, generated.as_str()],
            )
            .await?;
        tracing::info!("Generated replica id {generated}");

        // Another writer may have won the insert
        Ok(self.get(REPLICA_ID_KEY).await?.unwrap_or(generated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_missing_setting() {
        let db = setup().await;
        let repo = LibSqlSettingsRepository::new(db.connection());
        assert_eq!(repo.get("nope").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_set_overwrites() {
        let db = setup().await;
        let repo = LibSqlSettingsRepository::new(db.connection());

        repo.set("default_profile", "usb").await.unwrap();
        repo.set("default_profile", "server").await.unwrap();
        assert_eq!(
            repo.get("default_profile").await.unwrap().as_deref(),
            Some("server")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_replica_id_is_stable() {
        let db = setup().await;
        let repo = LibSqlSettingsRepository::new(db.connection());

        let first = repo.replica_id().await.unwrap();
        let second = repo.replica_id().await.unwrap();
        assert_eq!(first, second);
        assert!(first.parse::<Uuid>().is_ok());
    }
}
