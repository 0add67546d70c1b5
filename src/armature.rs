use std::collections::{HashMap, HashSet};

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::ConvertError;

fn default_true() -> bool {
    true
}

/// A single bone in rest pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default = "Vector3::zeros")]
    pub head: Vector3<f32>,
    #[serde(default = "Vector3::y")]
    pub tail: Vector3<f32>,
    #[serde(default)]
    pub roll: f32,
    #[serde(default = "default_true")]
    pub use_deform: bool,
}

impl Bone {
    pub fn new(name: impl Into<String>, parent: Option<&str>) -> Self {
        Self {
            name: name.into(),
            parent: parent.map(ToOwned::to_owned),
            head: Vector3::zeros(),
            tail: Vector3::y(),
            roll: 0.0,
            use_deform: true,
        }
    }

    /// Bone length in rest pose.
    pub fn length(&self) -> f32 {
        (self.tail - self.head).norm()
    }
}

/// Bone hierarchy stored as an ordered bone list with parent links.
///
/// Children are always derived from the parent links, so reparenting or
/// removing a bone never leaves a stale child list behind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Armature {
    #[serde(default)]
    pub bones: Vec<Bone>,
}

impl Armature {
    pub fn new(bones: Vec<Bone>) -> Self {
        Self { bones }
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index_of(name).is_some()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|bone| bone.name == name)
    }

    pub fn bone(&self, name: &str) -> Option<&Bone> {
        self.bones.iter().find(|bone| bone.name == name)
    }

    pub fn bone_mut(&mut self, name: &str) -> Option<&mut Bone> {
        self.bones.iter_mut().find(|bone| bone.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bones.iter().map(|bone| bone.name.as_str())
    }

    pub fn parent_of(&self, name: &str) -> Option<&str> {
        self.bone(name).and_then(|bone| bone.parent.as_deref())
    }

    /// Direct children in armature order.
    pub fn children(&self, name: &str) -> Vec<&str> {
        self.bones
            .iter()
            .filter(|bone| bone.parent.as_deref() == Some(name))
            .map(|bone| bone.name.as_str())
            .collect()
    }

    /// Child→parent map over bone names.
    pub fn parent_map(&self) -> HashMap<String, String> {
        self.bones
            .iter()
            .filter_map(|bone| {
                bone.parent
                    .as_ref()
                    .map(|parent| (bone.name.clone(), parent.clone()))
            })
            .collect()
    }

    /// All descendants of `name` in post-order (children before parents).
    /// The bone itself is not included.
    pub fn descendants_post_order(&self, name: &str) -> Vec<String> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        self.collect_post_order(name, &mut visited, &mut order);
        order.pop();
        order
    }

    fn collect_post_order(&self, name: &str, visited: &mut HashSet<String>, order: &mut Vec<String>) {
        if !visited.insert(name.to_string()) {
            return;
        }
        for child in self.children(name) {
            self.collect_post_order(child, visited, order);
        }
        order.push(name.to_string());
    }

    /// Move a bone (and its subtree) under a new parent. Rest transforms are
    /// left untouched. Returns `false` without changing anything if either
    /// bone is absent or the move would create a cycle.
    pub fn reparent(&mut self, name: &str, new_parent: &str) -> bool {
        if name == new_parent || !self.contains(new_parent) {
            return false;
        }
        if self.is_ancestor(name, new_parent) {
            return false;
        }
        match self.bone_mut(name) {
            Some(bone) => {
                bone.parent = Some(new_parent.to_string());
                true
            }
            None => false,
        }
    }

    /// True when `ancestor` is reachable by walking up from `name`.
    pub fn is_ancestor(&self, ancestor: &str, name: &str) -> bool {
        let mut seen = HashSet::new();
        let mut current = self.parent_of(name);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            if !seen.insert(parent) {
                return false;
            }
            current = self.parent_of(parent);
        }
        false
    }

    /// Remove a single bone. Its children are spliced onto its parent (or
    /// become roots), mirroring how edit-mode bone deletion behaves.
    pub fn remove_bone(&mut self, name: &str) -> Option<Bone> {
        let index = self.index_of(name)?;
        let removed = self.bones.remove(index);
        for bone in &mut self.bones {
            if bone.parent.as_deref() == Some(name) {
                bone.parent = removed.parent.clone();
            }
        }
        Some(removed)
    }

    /// Check that bone names are unique, every parent link resolves, and no
    /// bone is its own ancestor.
    pub fn validate_forest(&self) -> Result<(), ConvertError> {
        let mut names = HashSet::new();
        for bone in &self.bones {
            if !names.insert(bone.name.as_str()) {
                return Err(ConvertError::TopologyViolation(format!(
                    "bone name '{}' is used more than once",
                    bone.name
                )));
            }
        }

        for bone in &self.bones {
            if let Some(parent) = bone.parent.as_deref()
                && !names.contains(parent)
            {
                return Err(ConvertError::TopologyViolation(format!(
                    "bone '{}' points to missing parent '{}'",
                    bone.name, parent
                )));
            }
        }

        let parent_map = self.parent_map();
        let mut cleared = HashSet::<&str>::new();
        for bone in &self.bones {
            let mut path = HashSet::<&str>::new();
            let mut current = bone.name.as_str();
            loop {
                if cleared.contains(current) {
                    break;
                }
                if !path.insert(current) {
                    return Err(ConvertError::TopologyViolation(format!(
                        "bone '{}' is its own ancestor",
                        current
                    )));
                }
                match parent_map.get(current) {
                    Some(parent) => current = parent.as_str(),
                    None => break,
                }
            }
            cleared.extend(path);
        }

        Ok(())
    }
}
