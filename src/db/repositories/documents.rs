use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{helpers::parse_datetime, models::StoredDocument, Database};

fn row_to_document(row: &Row) -> Result<StoredDocument, rusqlite::Error> {
    let updated_at: String = row.get("updated_at")?;

    Ok(StoredDocument {
        path: row.get("path")?,
        raw: row.get("value")?,
        updated_at: parse_datetime(&updated_at, "updated_at").map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    e.to_string(),
                )),
            )
        })?,
    })
}

impl Database {
    /// Get the document stored at `path`
    pub async fn get_document(&self, path: &str) -> Result<Option<StoredDocument>> {
        let path = path.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT path, value, updated_at
                 FROM documents
                 WHERE path = ?1",
            )?;

            let document = stmt
                .query_row(params![path], row_to_document)
                .optional()
                .with_context(|| format!("failed to read document '{path}'"))?;

            Ok(document)
        })
        .await
    }

    /// Insert or replace the whole document at `path`
    pub async fn put_document(&self, path: &str, raw: String, updated_at: DateTime<Utc>) -> Result<()> {
        let path = path.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO documents (path, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(path) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                params![path, raw, updated_at.to_rfc3339()],
            )
            .with_context(|| format!("failed to write document '{path}'"))?;
            Ok(())
        })
        .await
    }

    pub async fn delete_document(&self, path: &str) -> Result<bool> {
        let path = path.to_string();
        self.execute(move |conn| {
            let deleted = conn
                .execute("DELETE FROM documents WHERE path = ?1", params![path])
                .with_context(|| format!("failed to delete document '{path}'"))?;
            Ok(deleted > 0)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("board.sqlite3")).unwrap();

        assert!(db.get_document("dashboardState").await.unwrap().is_none());

        let now = Utc::now();
        db.put_document("dashboardState", "{\"1\":[]}".into(), now).await.unwrap();
        db.put_document("dashboardState", "{\"2\":[]}".into(), now).await.unwrap();

        let stored = db.get_document("dashboardState").await.unwrap().unwrap();
        assert_eq!(stored.raw, "{\"2\":[]}");
        assert_eq!(stored.value().unwrap(), serde_json::json!({ "2": [] }));

        assert!(db.delete_document("dashboardState").await.unwrap());
        assert!(!db.delete_document("dashboardState").await.unwrap());
    }

    #[tokio::test]
    async fn data_version_moves_on_foreign_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.sqlite3");
        let ours = Database::new(path.clone()).unwrap();
        let theirs = Database::new(path).unwrap();

        let before = ours.data_version().await.unwrap();
        ours.put_document("a", "1".into(), Utc::now()).await.unwrap();
        assert_eq!(ours.data_version().await.unwrap(), before);

        theirs.put_document("a", "2".into(), Utc::now()).await.unwrap();
        assert_ne!(ours.data_version().await.unwrap(), before);
    }
}
