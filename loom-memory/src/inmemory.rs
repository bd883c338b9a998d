use crate::service::*;
use async_trait::async_trait;
use loom_core::{PartKind, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct MemoryKey {
    app_name: String,
    user_id: String,
}

#[derive(Clone)]
struct StoredEntry {
    entry: MemoryEntry,
    words: HashSet<String>,
}

pub struct InMemoryMemoryService {
    store: Arc<RwLock<HashMap<MemoryKey, HashMap<String, Vec<StoredEntry>>>>>,
}

impl InMemoryMemoryService {
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn extract_words(text: &str) -> HashSet<String> {
        text.split_whitespace()
            .filter(|s| !s.is_empty())
            .map(|s| s.to_lowercase())
            .collect()
    }

    fn extract_words_from_content(content: &loom_core::Content) -> HashSet<String> {
        let mut words = HashSet::new();
        for part in &content.parts {
            if let PartKind::Text { text } = &part.kind {
                words.extend(Self::extract_words(text));
            }
        }
        words
    }

    fn has_intersection(set1: &HashSet<String>, set2: &HashSet<String>) -> bool {
        if set1.is_empty() || set2.is_empty() {
            return false;
        }
        set1.iter().any(|word| set2.contains(word))
    }
}

impl Default for InMemoryMemoryService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryService for InMemoryMemoryService {
    async fn add_session(&self, app_name: &str, user_id: &str, session_id: &str, entries: Vec<MemoryEntry>) -> Result<()> {
        let key = MemoryKey {
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
        };

        let stored_entries: Vec<StoredEntry> = entries
            .into_iter()
            .map(|entry| {
                let words = Self::extract_words_from_content(&entry.content);
                StoredEntry { entry, words }
            })
            .filter(|e| !e.words.is_empty())
            .collect();

        if stored_entries.is_empty() {
            return Ok(());
        }

        let mut store = self.store.write().unwrap();
        let sessions = store.entry(key).or_insert_with(HashMap::new);
        sessions.insert(session_id.to_string(), stored_entries);

        Ok(())
    }

    async fn search(&self, req: SearchRequest) -> Result<SearchResponse> {
        let query_words = Self::extract_words(&req.query);
        
        let key = MemoryKey {
            app_name: req.app_name,
            user_id: req.user_id,
        };

        let store = self.store.read().unwrap();
        let sessions = match store.get(&key) {
            Some(s) => s,
            None => return Ok(SearchResponse { memories: Vec::new() }),
        };

        let mut memories = Vec::new();
        for stored_entries in sessions.values() {
            for stored in stored_entries {
                if Self::has_intersection(&stored.words, &query_words) {
                    memories.push(stored.entry.clone());
                }
            }
        }

        Ok(SearchResponse { memories })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_core::Content;
    use chrono::Utc;

    fn entry(text: &str) -> MemoryEntry {
        MemoryEntry { content: Content::new("user").with_text(text), author: "user".into(), timestamp: Utc::now() }
    }

    #[tokio::test]
    async fn test_search_matches_on_shared_word() {
        let svc = InMemoryMemoryService::new();
        svc.add_session("app", "u1", "s1", vec![entry("the weather in paris is lovely")]).await.unwrap();

        let resp =
            svc.search(SearchRequest { query: "paris".into(), user_id: "u1".into(), app_name: "app".into() }).await.unwrap();
        assert_eq!(resp.memories.len(), 1);
    }

    #[tokio::test]
    async fn test_search_isolated_by_user() {
        let svc = InMemoryMemoryService::new();
        svc.add_session("app", "u1", "s1", vec![entry("secret project codename falcon")]).await.unwrap();

        let resp =
            svc.search(SearchRequest { query: "falcon".into(), user_id: "u2".into(), app_name: "app".into() }).await.unwrap();
        assert!(resp.memories.is_empty());
    }

    #[tokio::test]
    async fn test_add_session_skips_empty_entries() {
        let svc = InMemoryMemoryService::new();
        svc.add_session("app", "u1", "s1", vec![entry("")]).await.unwrap();

        let resp =
            svc.search(SearchRequest { query: "anything".into(), user_id: "u1".into(), app_name: "app".into() }).await.unwrap();
        assert!(resp.memories.is_empty());
    }
}
