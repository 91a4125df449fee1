use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::error::{AppError, Result};

/// Metadata for one image, from `/Get-WimInfo /Index:<n>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImageRecord {
    pub index: u32,
    pub name: Option<String>,
    pub description: Option<String>,
    /// Bytes.
    pub size: Option<u64>,
    pub bootable: Option<bool>,
    pub architecture: Option<String>,
    pub hal: Option<String>,
    pub version: Option<String>,
    pub service_pack_build: Option<u32>,
    pub service_pack_level: Option<u32>,
    pub edition: Option<String>,
    pub installation: Option<String>,
    pub product_type: Option<String>,
    pub product_suite: Option<String>,
    pub system_root: Option<String>,
    pub directories: Option<u64>,
    pub files: Option<u64>,
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
    pub languages: Vec<String>,
    pub default_language: Option<String>,
}

/// One entry of a plain `/Get-WimInfo` listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WimImageInfo {
    pub index: u32,
    pub name: String,
    pub description: Option<String>,
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureState {
    Enabled,
    Disabled,
}

impl FeatureState {
    /// Map a DISM state column to a feature state. Pending enablement counts as
    /// enabled; every other state, including unknown text, is disabled.
    pub fn from_report(value: &str) -> Self {
        match value.trim() {
            "Enabled" | "Enable Pending" => FeatureState::Enabled,
            _ => FeatureState::Disabled,
        }
    }

    pub fn is_enabled(self) -> bool {
        self == FeatureState::Enabled
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSummary {
    pub name: String,
    pub state: FeatureState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureDetail {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub restart_required: bool,
    pub state: Option<String>,
    pub custom_properties: PropertyTree,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyNode {
    Value(String),
    Branch(PropertyTree),
}

/// Custom feature properties keyed by backslash-separated paths such as
/// `ServerComponent\Deploys\Update\Name`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PropertyTree(BTreeMap<String, PropertyNode>);

impl PropertyTree {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, segment: &str) -> Option<&PropertyNode> {
        self.0.get(segment)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PropertyNode)> {
        self.0.iter()
    }

    /// Look up a leaf value by its full backslash path.
    pub fn value(&self, path: &str) -> Option<&str> {
        let mut tree = self;
        let mut segments = path.split('\\').peekable();
        while let Some(segment) = segments.next() {
            match (tree.0.get(segment)?, segments.peek()) {
                (PropertyNode::Value(v), None) => return Some(v.as_str()),
                (PropertyNode::Branch(next), Some(_)) => tree = next,
                _ => return None,
            }
        }
        None
    }

    /// Insert `value` under `path`, creating intermediate branches.
    ///
    /// A path that runs through an existing leaf, or a leaf that would replace
    /// an existing branch, is rejected and the tree is left untouched.
    pub fn insert(&mut self, path: &str, value: impl Into<String>) -> Result<()> {
        let conflict = || AppError::PropertyConflict {
            path: path.to_string(),
        };
        let segments: Vec<&str> = path.split('\\').map(str::trim).collect();
        let (leaf, parents) = segments.split_last().ok_or_else(conflict)?;

        // Validate first so a rejected insert never leaves empty branches behind.
        let mut probe = Some(&*self);
        for segment in parents {
            probe = match probe.and_then(|t| t.0.get(*segment)) {
                Some(PropertyNode::Branch(next)) => Some(next),
                Some(PropertyNode::Value(_)) => return Err(conflict()),
                None => None,
            };
        }
        if let Some(PropertyNode::Branch(_)) = probe.and_then(|t| t.0.get(*leaf)) {
            return Err(conflict());
        }

        let mut tree = self;
        for segment in parents {
            let node = tree
                .0
                .entry(segment.to_string())
                .or_insert_with(|| PropertyNode::Branch(PropertyTree::default()));
            tree = match node {
                PropertyNode::Branch(next) => next,
                PropertyNode::Value(_) => return Err(conflict()),
            };
        }
        tree.0
            .insert(leaf.to_string(), PropertyNode::Value(value.into()));
        Ok(())
    }
}

/// Outcome of `/Cleanup-Image /ScanHealth`. Corruption is only reported for
/// runs that completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub corruption_detected: bool,
    pub completed: bool,
}
