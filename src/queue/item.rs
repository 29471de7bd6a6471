use crate::config::Profile;
use crate::parser::Media;
use crate::template::base_name;
use crate::transport::DirLister;
use camino::Utf8Path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One queue entry. Created once per remote entry, imported line or merge
/// candidate; `remote_path` and `media` are set once, while `transfer`,
/// `reason` and `duplicate` are mutated in place by later pipeline stages.
///
/// The serialized field names and the `ModTime` RFC3339 rendering are part of
/// the observable contract consumed by post-commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Item {
    pub remote_path: String,
    pub local_path: String,
    pub mod_time: DateTime<Utc>,
    pub transfer: bool,
    pub reason: String,
    pub media: Media,
    pub duplicate: bool,
    pub merged: bool,
}

impl Item {
    pub(crate) fn new(
        remote_path: impl Into<String>,
        mod_time: DateTime<Utc>,
        media: Media,
        local_path: String,
    ) -> Self {
        Self {
            remote_path: remote_path.into(),
            local_path,
            mod_time,
            transfer: false,
            reason: "no match".to_string(),
            media,
            duplicate: false,
            merged: false,
        }
    }

    /// Item whose profile resolution failed; carries the error text as its
    /// reason and an empty media that compares unequal to everything.
    pub(crate) fn resolve_failed(
        remote_path: impl Into<String>,
        mod_time: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        let mut item = Self::new(remote_path, mod_time, Media::default(), String::new());
        item.reject(reason);
        item
    }

    pub(crate) fn accept(&mut self, reason: impl Into<String>) {
        self.transfer = true;
        self.reason = reason.into();
    }

    pub(crate) fn reject(&mut self, reason: impl Into<String>) {
        self.transfer = false;
        self.reason = reason.into();
    }

    /// The destination directory inspected by the existence guard.
    pub fn dst_dir(&self) -> &Utf8Path {
        Utf8Path::new(&self.local_path)
    }

    /// Synthesize items for already-materialized local copies next to this
    /// item's destination, so they compete during deduplication. Only
    /// siblings whose media equals this item's media are kept; listing
    /// errors and unparsable names are silently skipped (fail-open).
    pub(crate) fn merge_candidates(&self, profile: &Profile, lister: &dyn DirLister) -> Vec<Item> {
        let Some(parent) = self.dst_dir().parent() else {
            return Vec::new();
        };
        let own_leaf = base_name(&self.remote_path);
        let mut items = Vec::new();
        for name in lister.list_dir(parent) {
            if name == own_leaf {
                continue;
            }
            let path = parent.join(&name);
            let Ok((media, local_path)) = profile.resolve(path.as_str()) else {
                continue;
            };
            if !self.media.equal(&media) {
                continue;
            }
            let mut item = Item::new(path.as_str(), self.mod_time, media, local_path);
            item.accept("Merged=true"); // Make it considerable for deduplication
            item.merged = true;
            items.push(item);
        }
        items
    }
}
