use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use crate::quran::VerseKey;

pub const DEFAULT_HISTORY_LIMIT: usize = 20;

const REFLECTIONS_FILE: &str = "reflections.json";
const SEARCH_HISTORY_FILE: &str = "search_history.json";

/// A user's note attached to one verse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reflection {
    pub id: u64,
    pub user_id: String,
    pub verse_key: String,
    pub reflection_text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub id: u64,
    pub user_id: String,
    pub query: String,
    pub result_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Manager de almacenamiento basado en archivos JSON
///
/// Holds reflections and search history in memory and rewrites the
/// corresponding file after every insert. User identity is whatever opaque
/// string the authentication layer hands over.
pub struct JsonStorage {
    data_dir: PathBuf,
    reflections: Vec<Reflection>,
    searches: Vec<SearchRecord>,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;

        let reflections = load_collection(&data_dir.join(REFLECTIONS_FILE)).await?;
        let searches = load_collection(&data_dir.join(SEARCH_HISTORY_FILE)).await?;

        info!(
            "📁 Storage inicializado en: {} ({} reflections, {} searches)",
            data_dir.display(),
            reflections.len(),
            searches.len()
        );

        Ok(Self {
            data_dir,
            reflections,
            searches,
        })
    }

    pub async fn create_reflection(
        &mut self,
        user_id: &str,
        verse_key: VerseKey,
        text: &str,
    ) -> Result<Reflection> {
        let user_id = require("user_id", user_id)?;
        let text = require("reflection_text", text)?;

        let reflection = Reflection {
            id: self.reflections.iter().map(|r| r.id).max().unwrap_or(0) + 1,
            user_id: user_id.to_string(),
            verse_key: verse_key.to_string(),
            reflection_text: text.to_string(),
            created_at: Utc::now(),
        };
        self.reflections.push(reflection.clone());
        save_collection(&self.data_dir.join(REFLECTIONS_FILE), &self.reflections).await?;

        info!("💾 Reflection {} saved for verse {}", reflection.id, reflection.verse_key);
        Ok(reflection)
    }

    /// Newest first.
    pub fn reflections_for_verse(&self, verse_key: VerseKey) -> Vec<Reflection> {
        let key = verse_key.to_string();
        newest_first(self.reflections.iter().filter(|r| r.verse_key == key))
    }

    /// Newest first.
    pub fn reflections_for_user(&self, user_id: &str) -> Vec<Reflection> {
        newest_first(self.reflections.iter().filter(|r| r.user_id == user_id))
    }

    pub async fn record_search(
        &mut self,
        user_id: &str,
        query: &str,
        result_count: u32,
    ) -> Result<SearchRecord> {
        let user_id = require("user_id", user_id)?;
        let query = require("query", query)?;

        let record = SearchRecord {
            id: self.searches.iter().map(|s| s.id).max().unwrap_or(0) + 1,
            user_id: user_id.to_string(),
            query: query.to_string(),
            result_count,
            created_at: Utc::now(),
        };
        self.searches.push(record.clone());
        save_collection(&self.data_dir.join(SEARCH_HISTORY_FILE), &self.searches).await?;

        info!("✅ Search query logged for user {}", record.user_id);
        Ok(record)
    }

    /// Most recent searches of `user_id`, newest first, at most `limit`
    /// (default [`DEFAULT_HISTORY_LIMIT`]).
    pub fn search_history(&self, user_id: &str, limit: Option<usize>) -> Vec<SearchRecord> {
        let limit = limit.filter(|l| *l > 0).unwrap_or(DEFAULT_HISTORY_LIMIT);
        let mut history = newest_first(self.searches.iter().filter(|s| s.user_id == user_id));
        history.truncate(limit);
        history
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            reflections: self.reflections.len(),
            searches: self.searches.len(),
            data_dir: self.data_dir.clone(),
        }
    }
}

trait Timestamped {
    fn created_at(&self) -> DateTime<Utc>;
    fn id(&self) -> u64;
}

impl Timestamped for Reflection {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn id(&self) -> u64 {
        self.id
    }
}

impl Timestamped for SearchRecord {
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn id(&self) -> u64 {
        self.id
    }
}

fn newest_first<'a, T>(items: impl Iterator<Item = &'a T>) -> Vec<T>
where
    T: Timestamped + Clone + 'a,
{
    let mut items: Vec<T> = items.cloned().collect();
    // Mismo instante: gana el id mayor
    items.sort_by(|a, b| b.created_at().cmp(&a.created_at()).then(b.id().cmp(&a.id())));
    items
}

fn require<'a>(field: &str, value: &'a str) -> Result<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        anyhow::bail!("{field} is required");
    }
    Ok(value)
}

async fn load_collection<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        return Ok(Vec::new());
    }

    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    match serde_json::from_str(&content) {
        Ok(items) => Ok(items),
        Err(e) => {
            warn!("Error cargando {}: {}, starting empty", path.display(), e);
            Ok(Vec::new())
        }
    }
}

async fn save_collection<T: Serialize>(path: &Path, items: &[T]) -> Result<()> {
    let content = serde_json::to_string_pretty(items)?;
    fs::write(path, content)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Estadísticas de almacenamiento
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    pub reflections: usize,
    pub searches: usize,
    pub data_dir: PathBuf,
}

impl std::fmt::Display for StorageStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "📊 Storage Stats:\n\
             📁 Data Directory: {}\n\
             📝 Reflections: {}\n\
             🔍 Searches: {}",
            self.data_dir.display(),
            self.reflections,
            self.searches,
        )
    }
}
