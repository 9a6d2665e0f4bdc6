//! Branching provenance of generated assets.
//!
//! A forest rather than a tree: several assets may share one parent, and an
//! asset may be parentless. Both indices are maintained on every insert and
//! remove so reads never see a stale view.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::asset::{AssetId, GeneratedAsset};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineageTree {
    assets: HashMap<AssetId, GeneratedAsset>,
    /// evolution step -> ids in insertion order
    steps: BTreeMap<u32, Vec<AssetId>>,
}

impl LineageTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a flat, ordered collection (e.g. a storage load).
    /// Duplicate ids after the first are ignored.
    pub fn from_assets(assets: impl IntoIterator<Item = GeneratedAsset>) -> Self {
        let mut tree = Self::new();
        for asset in assets {
            tree.insert(asset);
        }
        tree
    }

    /// Append an asset. Returns false (and changes nothing) if the id is already present.
    pub fn insert(&mut self, asset: GeneratedAsset) -> bool {
        if self.assets.contains_key(&asset.id) {
            return false;
        }
        debug!(id = %asset.id, step = asset.evolution_step, "lineage insert");
        self.steps
            .entry(asset.evolution_step)
            .or_default()
            .push(asset.id);
        self.assets.insert(asset.id, asset);
        true
    }

    /// Remove one asset. Descendants are left untouched and keep their
    /// (now dangling) `parent_id`.
    pub fn remove(&mut self, id: &AssetId) -> Option<GeneratedAsset> {
        let asset = self.assets.remove(id)?;
        if let Some(ids) = self.steps.get_mut(&asset.evolution_step) {
            ids.retain(|other| other != id);
            if ids.is_empty() {
                self.steps.remove(&asset.evolution_step);
            }
        }
        debug!(id = %id, step = asset.evolution_step, "lineage remove");
        Some(asset)
    }

    pub fn get(&self, id: &AssetId) -> Option<&GeneratedAsset> {
        self.assets.get(id)
    }

    pub fn contains(&self, id: &AssetId) -> bool {
        self.assets.contains_key(id)
    }

    /// Direct children of `id`, ordered by step then insertion.
    /// Empty when `id` is not in the tree, even if orphans still point at it.
    pub fn children_of(&self, id: &AssetId) -> Vec<&GeneratedAsset> {
        if !self.assets.contains_key(id) {
            return Vec::new();
        }
        self.iter()
            .filter(|asset| asset.parent_id.as_ref() == Some(id))
            .collect()
    }

    /// Assets grouped by evolution step, ascending, insertion order within a step.
    pub fn by_step(&self) -> Vec<(u32, Vec<&GeneratedAsset>)> {
        self.steps
            .iter()
            .map(|(step, ids)| (*step, ids.iter().filter_map(|id| self.assets.get(id)).collect()))
            .collect()
    }

    /// Parentless assets.
    pub fn roots(&self) -> Vec<&GeneratedAsset> {
        self.iter().filter(|asset| asset.is_root()).collect()
    }

    /// Assets whose parent is no longer in the tree.
    pub fn orphans(&self) -> Vec<&GeneratedAsset> {
        self.iter()
            .filter(|asset| asset.parent_id.is_some_and(|p| !self.assets.contains_key(&p)))
            .collect()
    }

    /// All assets, ordered by step then insertion.
    pub fn iter(&self) -> impl Iterator<Item = &GeneratedAsset> {
        self.steps
            .values()
            .flat_map(|ids| ids.iter())
            .filter_map(|id| self.assets.get(id))
    }

    /// Assets whose id starts with `prefix` (full or short form).
    pub fn matching_prefix(&self, prefix: &str) -> Vec<&GeneratedAsset> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() {
            return Vec::new();
        }
        self.iter()
            .filter(|asset| asset.id.to_string().starts_with(&prefix))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}
