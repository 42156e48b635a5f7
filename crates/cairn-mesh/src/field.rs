//! Named grid-variable storage per block.

use cairn_core::MeshError;
use indexmap::IndexMap;

use crate::array::VarArray4;

/// A block's named collection of grid variables.
///
/// Insertion order is preserved, so iteration (and therefore boundary
/// packing) is deterministic across runs. Mutated by task execution and
/// by boundary exchange; owned by the block.
#[derive(Debug, Default)]
pub struct FieldContainer {
    vars: IndexMap<String, VarArray4>,
}

impl FieldContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a variable under `label`.
    pub fn add(&mut self, label: impl Into<String>, data: VarArray4) {
        self.vars.insert(label.into(), data);
    }

    /// Look up a variable.
    ///
    /// # Errors
    ///
    /// [`MeshError::VariableNotFound`] when no variable has this label.
    pub fn get(&self, label: &str) -> Result<&VarArray4, MeshError> {
        self.vars.get(label).ok_or_else(|| MeshError::VariableNotFound {
            label: label.to_string(),
        })
    }

    /// Look up a variable mutably.
    ///
    /// # Errors
    ///
    /// [`MeshError::VariableNotFound`] when no variable has this label.
    pub fn get_mut(&mut self, label: &str) -> Result<&mut VarArray4, MeshError> {
        self.vars.get_mut(label).ok_or_else(|| MeshError::VariableNotFound {
            label: label.to_string(),
        })
    }

    /// Remove a variable.
    ///
    /// # Errors
    ///
    /// [`MeshError::VariableNotFound`] when no variable has this label.
    pub fn remove(&mut self, label: &str) -> Result<VarArray4, MeshError> {
        self.vars
            .shift_remove(label)
            .ok_or_else(|| MeshError::VariableNotFound {
                label: label.to_string(),
            })
    }

    /// Variable labels in insertion order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.vars.keys().map(String::as_str)
    }

    /// Iterate `(label, data)` in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &VarArray4)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate `(label, data)` mutably in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut VarArray4)> {
        self.vars.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether the container holds no variables.
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
