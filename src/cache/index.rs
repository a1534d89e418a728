//! Bidirectional tag index.
//!
//! Tracks tag → keys and key → tags so that a tag invalidation finds its
//! keys without scanning the store, and a key deletion finds every tag set
//! it must leave.

use std::collections::{BTreeSet, HashMap};

/// Tag membership for stored keys.
///
/// Not synchronised on its own: [`CacheAside`](super::CacheAside) mutates it
/// under the same lock as the matching store write.
#[derive(Debug, Default, Clone)]
pub struct TagIndex {
    tag_to_keys: HashMap<String, BTreeSet<String>>,
    key_to_tags: HashMap<String, BTreeSet<String>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_key(&mut self, tag: &str, key: &str) {
        self.tag_to_keys
            .entry(tag.to_string())
            .or_default()
            .insert(key.to_string());
        self.key_to_tags
            .entry(key.to_string())
            .or_default()
            .insert(tag.to_string());
    }

    pub fn remove_key(&mut self, tag: &str, key: &str) {
        if let Some(keys) = self.tag_to_keys.get_mut(tag) {
            keys.remove(key);
            if keys.is_empty() {
                self.tag_to_keys.remove(tag);
            }
        }
        if let Some(tags) = self.key_to_tags.get_mut(key) {
            tags.remove(tag);
            if tags.is_empty() {
                self.key_to_tags.remove(key);
            }
        }
    }

    pub fn keys_for_tag(&self, tag: &str) -> BTreeSet<String> {
        self.tag_to_keys.get(tag).cloned().unwrap_or_default()
    }

    pub fn tags_for_key(&self, key: &str) -> BTreeSet<String> {
        self.key_to_tags.get(key).cloned().unwrap_or_default()
    }

    pub fn remove_tags_for_key<'a>(&mut self, key: &str, tags: impl IntoIterator<Item = &'a String>) {
        for tag in tags {
            self.remove_key(tag, key);
        }
    }

    /// Drops every membership of `key`. Returns the tags it had.
    pub fn forget_key(&mut self, key: &str) -> BTreeSet<String> {
        let tags = self.tags_for_key(key);
        self.remove_tags_for_key(key, &tags);
        tags
    }

    /// Makes `tags` the exact tag set of `key`, touching only the difference.
    pub fn retag(&mut self, key: &str, tags: &BTreeSet<String>) {
        let previous = self.tags_for_key(key);
        self.remove_tags_for_key(key, previous.difference(tags));
        for tag in tags.difference(&previous) {
            self.add_key(tag, key);
        }
    }

    /// Removes a tag's own bookkeeping, leaving other tags of its keys alone.
    pub fn drop_tag(&mut self, tag: &str) -> BTreeSet<String> {
        let keys = self.keys_for_tag(tag);
        for key in &keys {
            self.remove_key(tag, key);
        }
        keys
    }

    pub fn contains(&self, tag: &str, key: &str) -> bool {
        self.tag_to_keys
            .get(tag)
            .is_some_and(|keys| keys.contains(key))
    }

    pub fn tags(&self) -> impl Iterator<Item = &String> {
        self.tag_to_keys.keys()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.key_to_tags.keys()
    }

    pub fn tag_count(&self) -> usize {
        self.tag_to_keys.len()
    }

    pub fn key_count(&self) -> usize {
        self.key_to_tags.len()
    }

    pub fn clear(&mut self) {
        self.tag_to_keys.clear();
        self.key_to_tags.clear();
    }
}
