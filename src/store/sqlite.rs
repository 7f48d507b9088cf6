use super::ArticleStore;
use crate::error::StoreError;
use crate::models::SummaryRecord;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, info, instrument};

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS summaries (
        url TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        summary TEXT NOT NULL,
        image_url TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS summaries_created_at ON summaries (created_at DESC)
    "#,
];

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database file at `path` and run migrations.
    #[instrument(level = "info", skip_all, fields(path = %path))]
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| StoreError::Io {
                        path: parent.display().to_string(),
                        source,
                    })?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration).execute(&pool).await?;
            debug!(migration = i, "Applied migration");
        }

        info!("Opened SQLite summary store");
        Ok(Self { pool })
    }
}

/// Fixed-width RFC 3339 so that text order in SQLite equals time order.
fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_row(row: &SqliteRow) -> Result<SummaryRecord, StoreError> {
    let url: String = row.try_get("url")?;
    let raw_created: String = row.try_get("created_at")?;
    let created_at = DateTime::parse_from_rfc3339(&raw_created)
        .map_err(|source| StoreError::Timestamp {
            url: url.clone(),
            value: raw_created.clone(),
            source,
        })?
        .with_timezone(&Utc);

    Ok(SummaryRecord {
        url,
        title: row.try_get("title")?,
        summary: row.try_get("summary")?,
        image_url: row.try_get("image_url")?,
        created_at,
    })
}

#[async_trait]
impl ArticleStore for SqliteStore {
    async fn exists(&self, url: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM summaries WHERE url = ? LIMIT 1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn get(&self, url: &str) -> Result<Option<SummaryRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT url, title, summary, image_url, created_at FROM summaries WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn upsert(&self, record: &SummaryRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO summaries (url, title, summary, image_url, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                summary = excluded.summary,
                image_url = excluded.image_url,
                created_at = excluded.created_at
            "#,
        )
        .bind(&record.url)
        .bind(&record.title)
        .bind(&record.summary)
        .bind(record.image_url.as_deref())
        .bind(encode_timestamp(&record.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest(&self, limit: usize) -> Result<Vec<SummaryRecord>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT url, title, summary, image_url, created_at
            FROM summaries
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(decode_row).collect()
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM summaries")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(url: &str, secs: i64) -> SummaryRecord {
        SummaryRecord {
            url: url.to_string(),
            title: format!("Title for {url}"),
            summary: "A summary.".to_string(),
            image_url: None,
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 250_000).unwrap(),
        }
    }

    async fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summaries.db");
        let store = SqliteStore::open(path.to_str().unwrap()).await.unwrap();
        (dir, store)
    }

    #[test]
    fn test_timestamp_encoding_is_fixed_width() {
        let a = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let b = Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap();
        assert_eq!(encode_timestamp(&a).len(), encode_timestamp(&b).len());
        assert!(encode_timestamp(&a) < encode_timestamp(&b));
    }

    #[tokio::test]
    async fn test_upsert_and_get_round_trip() {
        let (_dir, store) = temp_store().await;
        let mut rec = record("https://www.eurogamer.net/a", 0);
        rec.image_url = Some("https://assets.example.com/a.jpg".to_string());

        store.upsert(&rec).await.unwrap();

        assert!(store.exists(&rec.url).await.unwrap());
        assert_eq!(store.get(&rec.url).await.unwrap(), Some(rec));
        assert_eq!(store.get("https://www.eurogamer.net/b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_key() {
        let (_dir, store) = temp_store().await;
        let first = record("https://www.eurogamer.net/a", 0);
        let mut second = record("https://www.eurogamer.net/a", 10);
        second.summary = "Replaced.".to_string();

        store.upsert(&first).await.unwrap();
        store.upsert(&second).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(
            store.get(&first.url).await.unwrap().unwrap().summary,
            "Replaced."
        );
    }

    #[tokio::test]
    async fn test_latest_orders_by_created_at_desc() {
        let (_dir, store) = temp_store().await;
        store.upsert(&record("https://e.net/t2", 2)).await.unwrap();
        store.upsert(&record("https://e.net/t1", 1)).await.unwrap();
        store.upsert(&record("https://e.net/t3", 3)).await.unwrap();

        let urls: Vec<String> = store
            .latest(20)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.url)
            .collect();
        assert_eq!(urls, ["https://e.net/t3", "https://e.net/t2", "https://e.net/t1"]);

        assert_eq!(store.latest(2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_url_with_quotes_is_bound_not_interpolated() {
        let (_dir, store) = temp_store().await;
        let tricky = "https://e.net/it's-a-trap' OR '1'='1";
        store.upsert(&record("https://e.net/other", 0)).await.unwrap();

        assert!(!store.exists(tricky).await.unwrap());
        store.upsert(&record(tricky, 1)).await.unwrap();
        assert!(store.exists(tricky).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reopen_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summaries.db");
        let path = path.to_str().unwrap();

        let store = SqliteStore::open(path).await.unwrap();
        store.upsert(&record("https://e.net/kept", 0)).await.unwrap();
        store.pool.close().await;

        let reopened = SqliteStore::open(path).await.unwrap();
        assert!(reopened.exists("https://e.net/kept").await.unwrap());
    }
}
