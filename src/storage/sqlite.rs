//! SQLite 黄历缓存
//!
//! 每个维度一张表，`date` 唯一；写入使用 upsert，保留 `create_time`，
//! 只刷新 `data` 与 `update_time`。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info};

use super::traits::{date_key, CalendarStore, RecordKind};
use crate::errors::MCPError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS day_calendar (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT UNIQUE NOT NULL,
    data TEXT,
    create_time TEXT DEFAULT CURRENT_TIMESTAMP NOT NULL,
    update_time TEXT DEFAULT CURRENT_TIMESTAMP NOT NULL
);
CREATE TABLE IF NOT EXISTS hour_calendar (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date TEXT UNIQUE NOT NULL,
    data TEXT,
    create_time TEXT DEFAULT CURRENT_TIMESTAMP NOT NULL,
    update_time TEXT DEFAULT CURRENT_TIMESTAMP NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_day_calendar_date ON day_calendar(date);
CREATE UNIQUE INDEX IF NOT EXISTS idx_hour_calendar_date ON hour_calendar(date);
";

pub struct SqliteCalendarStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCalendarStore {
    /// 打开（或创建）数据库文件，并确保表结构存在
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| {
                MCPError::CacheError(format!("创建数据库目录 {} 失败: {}", dir.display(), e))
            })?;
        }

        let conn = Connection::open(path).map_err(cache_error)?;
        conn.execute_batch(SCHEMA).map_err(cache_error)?;
        info!("💾 SQLite数据库初始化完成: {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取记录最后更新时间
    pub async fn update_time(&self, kind: RecordKind, date: NaiveDate) -> Result<Option<String>> {
        let key = date_key(date);
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT update_time FROM {} WHERE date = ?1", kind.table()),
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let result = tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await
        .map_err(|e| MCPError::CacheError(format!("数据库任务异常退出: {}", e)))?;

        result.map_err(cache_error)
    }
}

#[async_trait]
impl CalendarStore for SqliteCalendarStore {
    async fn get(&self, kind: RecordKind, date: NaiveDate) -> Result<Option<Value>> {
        let key = date_key(date);
        let raw = self
            .with_conn(move |conn| {
                conn.query_row(
                    &format!("SELECT data FROM {} WHERE date = ?1", kind.table()),
                    params![key],
                    |row| row.get::<_, Option<String>>(0),
                )
                .optional()
            })
            .await?;

        match raw.flatten() {
            Some(text) if !text.is_empty() => {
                let value = serde_json::from_str(&text).map_err(|e| {
                    MCPError::CacheError(format!("{}缓存数据损坏 ({}): {}", kind.label(), date, e))
                })?;
                Ok(Some(value))
            }
            _ => Ok(None),
        }
    }

    async fn put(&self, kind: RecordKind, date: NaiveDate, data: &Value) -> Result<()> {
        let key = date_key(date);
        let payload = serde_json::to_string(data)?;
        let now = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        let log_key = key.clone();
        let log_now = now.clone();
        let previous = self
            .with_conn(move |conn| {
                let previous: Option<String> = conn
                    .query_row(
                        &format!("SELECT update_time FROM {} WHERE date = ?1", kind.table()),
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?;

                conn.execute(
                    &format!(
                        "INSERT INTO {} (date, data, create_time, update_time) VALUES (?1, ?2, ?3, ?3)
                         ON CONFLICT(date) DO UPDATE SET data = excluded.data, update_time = excluded.update_time",
                        kind.table()
                    ),
                    params![key, payload, now],
                )?;
                Ok(previous)
            })
            .await?;

        match previous {
            Some(old) => info!(
                "更新{}黄历信息: {}, 旧时间: {}, 新时间: {}",
                kind.label(),
                log_key,
                old,
                log_now
            ),
            None => info!("新增{}黄历信息: {}, 时间: {}", kind.label(), log_key, log_now),
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        let one = self
            .with_conn(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .await?;
        debug!("数据库连接测试成功");
        Ok(one == 1)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

fn cache_error(e: rusqlite::Error) -> anyhow::Error {
    MCPError::CacheError(format!("数据库操作失败: {}", e)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;
    use tokio_test::assert_ok;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_creates_parent_directory_and_tables() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("calendar.db");
        let store = SqliteCalendarStore::open(&path).unwrap();

        assert!(path.exists());
        assert!(store.health_check().await.unwrap());
        assert_eq!(store.path(), path.as_path());
    }

    #[tokio::test]
    async fn test_get_missing_returns_none() {
        let dir = tempdir().unwrap();
        let store = SqliteCalendarStore::open(&dir.path().join("c.db")).unwrap();

        assert!(store.get(RecordKind::Day, date(2025, 12, 1)).await.unwrap().is_none());
        assert!(store.update_time(RecordKind::Day, date(2025, 12, 1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_overwrites_data_per_kind() {
        let dir = tempdir().unwrap();
        let store = SqliteCalendarStore::open(&dir.path().join("c.db")).unwrap();
        let day = date(2025, 12, 1);

        assert_ok!(store.put(RecordKind::Day, day, &json!({"code": 200, "yi": "祭祀"})).await);
        assert_ok!(store.put(RecordKind::Day, day, &json!({"code": 200, "yi": "出行"})).await);
        assert_ok!(store.put(RecordKind::Hour, day, &json!({"code": 200, "zi0": "子"})).await);

        let day_info = store.get(RecordKind::Day, day).await.unwrap().unwrap();
        assert_eq!(day_info["yi"], "出行");
        let hour_info = store.get(RecordKind::Hour, day).await.unwrap().unwrap();
        assert_eq!(hour_info["zi0"], "子");
        assert!(store.update_time(RecordKind::Day, day).await.unwrap().is_some());

        let rows: i64 = store
            .with_conn(|conn| conn.query_row("SELECT COUNT(*) FROM day_calendar", [], |r| r.get(0)))
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_upsert_keeps_create_time_and_moves_update_time() {
        let dir = tempdir().unwrap();
        let store = SqliteCalendarStore::open(&dir.path().join("c.db")).unwrap();
        let day = date(2025, 12, 1);

        assert_ok!(store.put(RecordKind::Day, day, &json!({"code": 200, "yi": "祭祀"})).await);
        store
            .with_conn(|conn| {
                conn.execute(
                    "UPDATE day_calendar SET create_time = '2000-01-01 00:00:00', update_time = '2000-01-01 00:00:00'",
                    [],
                )
            })
            .await
            .unwrap();

        assert_ok!(store.put(RecordKind::Day, day, &json!({"code": 200, "yi": "出行"})).await);

        let (create_time, update_time): (String, String) = store
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT create_time, update_time FROM day_calendar WHERE date = '2025-12-01'",
                    [],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
            })
            .await
            .unwrap();
        assert_eq!(create_time, "2000-01-01 00:00:00");
        assert_ne!(update_time, "2000-01-01 00:00:00");
        assert_eq!(store.update_time(RecordKind::Day, day).await.unwrap(), Some(update_time));
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.db");
        {
            let store = SqliteCalendarStore::open(&path).unwrap();
            store.put(RecordKind::Day, date(2024, 2, 29), &json!({"code": 200})).await.unwrap();
        }
        let reopened = SqliteCalendarStore::open(&path).unwrap();
        assert!(reopened.get(RecordKind::Day, date(2024, 2, 29)).await.unwrap().is_some());
    }
}
