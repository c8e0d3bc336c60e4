//! Sled-based storage for processed articles.

use crate::pipeline::ArticleDigest;
use crate::summarize::SummaryType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Db(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A processed article as it sits on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredArticle {
    /// Stable numeric id, kept across re-summarization of the same URL.
    pub id: u64,
    pub url: String,
    pub title: String,
    pub summary: String,
    pub key_points: Vec<String>,
    pub summary_type: SummaryType,
    /// When this record was last written.
    pub created_at: DateTime<Utc>,
}

/// Sled-based archive of article digests.
///
/// Records are keyed by URL hash, so saving the same URL again overwrites
/// the old record. The numeric id survives the overwrite, which keeps the
/// embedding index's document ids stable.
pub struct ArticleStore {
    db: sled::Db,
}

impl ArticleStore {
    /// Open or create the archive at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Persist a digest, reusing the id of any prior record for its URL.
    pub fn save(&self, digest: &ArticleDigest) -> Result<StoredArticle, StorageError> {
        let key = Self::hash_url(&digest.url);
        let id = match self.db.get(key.as_bytes())? {
            Some(existing) => serde_json::from_slice::<StoredArticle>(&existing)?.id,
            None => self.db.generate_id()?,
        };
        let stored = StoredArticle {
            id,
            url: digest.url.clone(),
            title: digest.title.clone(),
            summary: digest.summary.clone(),
            key_points: digest.key_points.clone(),
            summary_type: digest.summary_type,
            created_at: Utc::now(),
        };
        let value = serde_json::to_vec(&stored)?;
        self.db.insert(key.as_bytes(), value)?;
        self.db.flush()?;
        Ok(stored)
    }

    /// Retrieve an article by URL.
    pub fn get(&self, url: &str) -> Result<Option<StoredArticle>, StorageError> {
        let key = Self::hash_url(url);
        match self.db.get(key.as_bytes())? {
            Some(data) => {
                let stored: StoredArticle = serde_json::from_slice(&data)?;
                Ok(Some(stored))
            }
            None => Ok(None),
        }
    }

    /// Retrieve an article by its numeric id.
    pub fn get_by_id(&self, id: u64) -> Result<Option<StoredArticle>, StorageError> {
        for item in self.db.iter() {
            let (_key, value) = item?;
            let stored: StoredArticle = serde_json::from_slice(&value)?;
            if stored.id == id {
                return Ok(Some(stored));
            }
        }
        Ok(None)
    }

    /// List all stored articles, newest first.
    pub fn list_all(&self) -> Result<Vec<StoredArticle>, StorageError> {
        let mut results = Vec::new();
        for item in self.db.iter() {
            let (_key, value) = item?;
            let stored: StoredArticle = serde_json::from_slice(&value)?;
            results.push(stored);
        }
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(results)
    }

    /// Delete by numeric id, returning the removed record if it existed.
    pub fn delete_by_id(&self, id: u64) -> Result<Option<StoredArticle>, StorageError> {
        let Some(stored) = self.get_by_id(id)? else {
            return Ok(None);
        };
        self.db.remove(Self::hash_url(&stored.url).as_bytes())?;
        self.db.flush()?;
        Ok(Some(stored))
    }

    /// Number of stored articles.
    pub fn count(&self) -> usize {
        self.db.len()
    }

    /// Hash a URL into a fixed-width key.
    fn hash_url(url: &str) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        url.hash(&mut hasher);
        format!("{:x}", hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest(url: &str, summary: &str) -> ArticleDigest {
        ArticleDigest {
            url: url.to_string(),
            title: "A Title".to_string(),
            text: "The body text of the article.".to_string(),
            summary: summary.to_string(),
            key_points: vec!["one".to_string(), "two".to_string()],
            summary_type: SummaryType::Comprehensive,
        }
    }

    fn open_store() -> (tempfile::TempDir, ArticleStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArticleStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn save_and_get_round_trip() {
        let (_dir, store) = open_store();
        let saved = store.save(&digest("https://example.com/a", "summary a")).unwrap();

        let found = store.get("https://example.com/a").unwrap().unwrap();
        assert_eq!(found.id, saved.id);
        assert_eq!(found.summary, "summary a");
        assert_eq!(found.key_points, vec!["one", "two"]);
        assert!(store.get("https://example.com/other").unwrap().is_none());
    }

    #[test]
    fn resaving_a_url_keeps_its_id_and_replaces_the_record() {
        let (_dir, store) = open_store();
        let first = store.save(&digest("https://example.com/a", "old")).unwrap();
        let second = store.save(&digest("https://example.com/a", "new")).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(store.count(), 1);
        assert_eq!(store.get("https://example.com/a").unwrap().unwrap().summary, "new");
    }

    #[test]
    fn distinct_urls_get_distinct_ids() {
        let (_dir, store) = open_store();
        let a = store.save(&digest("https://example.com/a", "s")).unwrap();
        let b = store.save(&digest("https://example.com/b", "s")).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn get_by_id_finds_the_right_record() {
        let (_dir, store) = open_store();
        store.save(&digest("https://example.com/a", "s")).unwrap();
        let b = store.save(&digest("https://example.com/b", "wanted")).unwrap();

        let found = store.get_by_id(b.id).unwrap().unwrap();
        assert_eq!(found.summary, "wanted");
        assert!(store.get_by_id(9999).unwrap().is_none());
    }

    #[test]
    fn list_all_is_newest_first() {
        let (_dir, store) = open_store();
        store.save(&digest("https://example.com/old", "s")).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.save(&digest("https://example.com/new", "s")).unwrap();

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].url, "https://example.com/new");
        assert_eq!(all[1].url, "https://example.com/old");
    }

    #[test]
    fn delete_by_id_removes_the_record() {
        let (_dir, store) = open_store();
        let saved = store.save(&digest("https://example.com/a", "s")).unwrap();

        let removed = store.delete_by_id(saved.id).unwrap().unwrap();
        assert_eq!(removed.url, "https://example.com/a");
        assert_eq!(store.count(), 0);
        assert!(store.delete_by_id(saved.id).unwrap().is_none());
    }
}
