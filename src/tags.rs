//! # Tag Registry Module
//!
//! Associazioni media → tag, definizioni dei tag e categorie.
//!
//! ## Responsabilità:
//! - Un documento `tag_registry.json` accanto a ogni `media_registry.json`
//! - Creato vuoto alla prima mutazione, persistito indipendentemente
//! - Consistenza "lazy": path di media cancellati e id di tag non definiti
//!   vengono tollerati (orphan) invece di essere rifiutati
//! - Stessa disciplina di persistence del media registry (lock + rename)
//!
//! ## Struttura documento:
//! ```json
//! {
//!   "tags": { "boss": { "id": "boss", "description": "Boss fights", "category": "enemies" } },
//!   "media_tags": { "media/dragon.webm": ["boss"] },
//!   "tag_categories": { "enemies": { "id": "enemies", "description": "", "color": "#aa0000" } },
//!   "version": "1.0"
//! }
//! ```

use crate::error::Result;
use crate::file_manager::{FileManager, RegistryLocation};
use crate::persist;
use crate::tag_dependencies::{condition_variables, TagDependencies};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, info};

pub const TAG_REGISTRY_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDefinition {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Weak reference to a `TagCategory`, may dangle
    #[serde(default, rename = "category", alias = "category_id")]
    pub category_id: Option<String>,
    /// Condition on other tags, e.g. `participants >= 1`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<TagValue>,
}

impl TagDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: None,
            category_id: None,
            req: None,
            values: Vec::new(),
        }
    }

    /// Tag ids referenced by `req` and by the values' conditions,
    /// in order of first appearance
    pub fn dependencies(&self) -> Vec<String> {
        let conditions = self
            .req
            .iter()
            .chain(self.values.iter().filter_map(TagValue::req));

        let mut deps: Vec<String> = Vec::new();
        for condition in conditions {
            for name in condition_variables(condition) {
                if !deps.contains(&name) {
                    deps.push(name);
                }
            }
        }
        deps
    }
}

/// Allowed value of a tag, optionally gated by its own condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Plain(String),
    Conditional {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        req: Option<String>,
    },
}

impl TagValue {
    pub fn value(&self) -> &str {
        match self {
            TagValue::Plain(value) | TagValue::Conditional { value, .. } => value,
        }
    }

    pub fn req(&self) -> Option<&String> {
        match self {
            TagValue::Plain(_) => None,
            TagValue::Conditional { req, .. } => req.as_ref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagCategory {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: String,
}

fn default_version() -> String {
    TAG_REGISTRY_VERSION.to_string()
}

/// On-disk shape of `tag_registry.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDocument {
    #[serde(default)]
    pub tags: BTreeMap<String, TagDefinition>,
    #[serde(default)]
    pub media_tags: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub tag_categories: BTreeMap<String, TagCategory>,
    #[serde(default = "default_version")]
    pub version: String,
}

impl Default for TagDocument {
    fn default() -> Self {
        Self {
            tags: BTreeMap::new(),
            media_tags: BTreeMap::new(),
            tag_categories: BTreeMap::new(),
            version: default_version(),
        }
    }
}

/// A path's tags split by whether the tag is defined
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedTags {
    pub defined: Vec<TagDefinition>,
    pub orphans: BTreeSet<String>,
}

/// Durable tag associations for one registry location
pub struct TagRegistry {
    file: PathBuf,
    doc: TagDocument,
}

impl TagRegistry {
    pub async fn load(location: &RegistryLocation) -> Result<Self> {
        let file = location.tag_registry_file();
        let doc: TagDocument = persist::read_json(&file).await?.unwrap_or_default();
        debug!(
            "Loaded tag registry {} ({} tags, {} tagged media)",
            file.display(),
            doc.tags.len(),
            doc.media_tags.len()
        );
        Ok(Self { file, doc })
    }

    pub fn file(&self) -> &std::path::Path {
        &self.file
    }

    pub fn document(&self) -> &TagDocument {
        &self.doc
    }

    pub fn tags(&self) -> impl Iterator<Item = &TagDefinition> {
        self.doc.tags.values()
    }

    pub fn categories(&self) -> impl Iterator<Item = &TagCategory> {
        self.doc.tag_categories.values()
    }

    pub fn tag(&self, id: &str) -> Option<&TagDefinition> {
        self.doc.tags.get(id)
    }

    /// Resolve the weak category reference of a tag
    pub fn category_of(&self, tag_id: &str) -> Option<&TagCategory> {
        let category = self.doc.tags.get(tag_id)?.category_id.as_deref()?;
        self.doc.tag_categories.get(category)
    }

    /// Tag ids of a media path, orphans included
    pub fn tags_for(&self, path: &str) -> BTreeSet<String> {
        let path = FileManager::normalize_path(path);
        self.doc.media_tags.get(&path).cloned().unwrap_or_default()
    }

    /// Paths carrying a tag
    pub fn media_for(&self, tag_id: &str) -> BTreeSet<String> {
        self.doc
            .media_tags
            .iter()
            .filter(|(_, ids)| ids.contains(tag_id))
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Dependency graph of the defined tags
    pub fn dependencies(&self) -> TagDependencies {
        TagDependencies::from_tags(self.doc.tags.values())
    }

    /// Defined tag ids, each after the tags its conditions refer to
    pub fn ordered_tags(&self) -> Vec<String> {
        let ids: Vec<String> = self.doc.tags.keys().cloned().collect();
        self.dependencies().order(&ids)
    }

    /// Circular `req` chains among the defined tags
    pub fn dependency_cycles(&self) -> Vec<Vec<String>> {
        self.dependencies().cycles()
    }

    pub fn resolve_tags(&self, path: &str) -> ResolvedTags {
        let mut resolved = ResolvedTags::default();
        for id in self.tags_for(path) {
            match self.doc.tags.get(&id) {
                Some(def) => resolved.defined.push(def.clone()),
                None => {
                    resolved.orphans.insert(id);
                }
            }
        }
        resolved
    }

    pub async fn upsert_tag(&mut self, tag: TagDefinition) -> Result<()> {
        info!("Upserting tag {}", tag.id);
        self.update(move |doc| {
            doc.tags.insert(tag.id.clone(), tag);
        })
        .await
    }

    /// Delete a tag and remove it from every media set
    pub async fn delete_tag(&mut self, tag_id: &str) -> Result<bool> {
        let id = tag_id.to_string();
        let mut existed = false;
        self.update(|doc| {
            existed = doc.tags.remove(&id).is_some();
            for ids in doc.media_tags.values_mut() {
                ids.remove(&id);
            }
            doc.media_tags.retain(|_, ids| !ids.is_empty());
        })
        .await?;
        info!("Deleted tag {} (defined: {})", tag_id, existed);
        Ok(existed)
    }

    pub async fn upsert_category(&mut self, category: TagCategory) -> Result<()> {
        info!("Upserting tag category {}", category.id);
        self.update(move |doc| {
            doc.tag_categories.insert(category.id.clone(), category);
        })
        .await
    }

    /// Delete a category; tags referencing it lose their category
    pub async fn delete_category(&mut self, category_id: &str) -> Result<bool> {
        let id = category_id.to_string();
        let mut existed = false;
        self.update(|doc| {
            existed = doc.tag_categories.remove(&id).is_some();
            for tag in doc.tags.values_mut() {
                if tag.category_id.as_deref() == Some(id.as_str()) {
                    tag.category_id = None;
                }
            }
        })
        .await?;
        Ok(existed)
    }

    /// Set-union of `tag_ids` into the path's tags
    pub async fn tag_media(&mut self, path: &str, tag_ids: &[String]) -> Result<()> {
        let path = FileManager::normalize_path(path);
        if tag_ids.is_empty() {
            return Ok(());
        }
        debug!("Tagging {} with {:?}", path, tag_ids);
        self.update(|doc| {
            doc.media_tags
                .entry(path.clone())
                .or_default()
                .extend(tag_ids.iter().cloned());
        })
        .await
    }

    /// Set-difference of `tag_ids` from the path's tags
    pub async fn untag_media(&mut self, path: &str, tag_ids: &[String]) -> Result<()> {
        let path = FileManager::normalize_path(path);
        self.update(|doc| {
            if let Some(ids) = doc.media_tags.get_mut(&path) {
                for id in tag_ids {
                    ids.remove(id);
                }
                if ids.is_empty() {
                    doc.media_tags.remove(&path);
                }
            }
        })
        .await
    }

    /// Remove every tag from a path
    pub async fn clear_media(&mut self, path: &str) -> Result<()> {
        let path = FileManager::normalize_path(path);
        self.update(|doc| {
            doc.media_tags.remove(&path);
        })
        .await
    }

    async fn update<F>(&mut self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut TagDocument),
    {
        let lock = persist::document_lock(&self.file);
        let _guard = lock.lock().await;

        let mut doc: TagDocument = persist::read_json(&self.file).await?.unwrap_or_default();
        let before = doc.clone();
        mutate(&mut doc);
        if doc.version.is_empty() {
            doc.version = default_version();
        }

        if doc != before || !persist::exists(&self.file).await {
            persist::write_json_atomic(&self.file, &doc).await?;
        }
        self.doc = doc;
        Ok(())
    }
}
