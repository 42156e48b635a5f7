//! Particle swarms: per-block discrete particles with named attribute
//! arrays.
//!
//! A swarm stores one `Vec<f64>` per attribute, all sharing the particle
//! count. Particles leave a block by being marked for departure during
//! task execution and are physically moved by the boundary exchange.
//! Removal is swap-remove, so particle indices are NOT stable across an
//! exchange.

use cairn_core::{BlockId, MeshError};
use indexmap::IndexMap;

/// Particles leaving a swarm for one destination block.
#[derive(Clone, Debug, PartialEq)]
pub struct Departure {
    /// The block the particles are headed to.
    pub dest: BlockId,
    /// Number of particles in `data`.
    pub count: usize,
    /// Particle-major attribute values: for each particle, its
    /// attributes in the swarm's attribute order.
    pub data: Vec<f64>,
}

/// A named particle population on one block.
#[derive(Debug)]
pub struct Swarm {
    label: String,
    attrs: IndexMap<String, Vec<f64>>,
    count: usize,
    departures: Vec<(usize, BlockId)>,
}

impl Swarm {
    /// Create an empty swarm.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            attrs: IndexMap::new(),
            count: 0,
            departures: Vec::new(),
        }
    }

    /// The swarm's label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Register an attribute, zero-filled for existing particles.
    pub fn add_attr(&mut self, label: impl Into<String>) {
        self.attrs.insert(label.into(), vec![0.0; self.count]);
    }

    /// Number of registered attributes.
    pub fn n_attrs(&self) -> usize {
        self.attrs.len()
    }

    /// Current particle count.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Attribute values, one per particle.
    ///
    /// # Errors
    ///
    /// [`MeshError::AttributeNotFound`] when no attribute has this label.
    pub fn attr(&self, label: &str) -> Result<&[f64], MeshError> {
        self.attrs
            .get(label)
            .map(Vec::as_slice)
            .ok_or_else(|| MeshError::AttributeNotFound {
                swarm: self.label.clone(),
                label: label.to_string(),
            })
    }

    /// Mutable attribute values.
    ///
    /// # Errors
    ///
    /// [`MeshError::AttributeNotFound`] when no attribute has this label.
    pub fn attr_mut(&mut self, label: &str) -> Result<&mut [f64], MeshError> {
        match self.attrs.get_mut(label) {
            Some(v) => Ok(v.as_mut_slice()),
            None => Err(MeshError::AttributeNotFound {
                swarm: self.label.clone(),
                label: label.to_string(),
            }),
        }
    }

    /// Append `n` zero-initialized particles; returns the index of the
    /// first new particle.
    pub fn add_particles(&mut self, n: usize) -> usize {
        let first = self.count;
        for v in self.attrs.values_mut() {
            v.resize(self.count + n, 0.0);
        }
        self.count += n;
        first
    }

    /// Mark a particle as crossing to a neighboring block.
    ///
    /// Each index may be marked at most once per exchange; the particle
    /// stays in place until [`emigrate`](Self::emigrate) runs.
    pub fn mark_departure(&mut self, index: usize, dest: BlockId) {
        self.departures.push((index, dest));
    }

    /// Whether any particles are marked for departure.
    pub fn has_departures(&self) -> bool {
        !self.departures.is_empty()
    }

    /// Extract all marked particles, grouped per destination block, and
    /// remove them from this swarm.
    ///
    /// Removal is swap-remove in descending index order, so surviving
    /// particles may change index.
    pub fn emigrate(&mut self) -> Vec<Departure> {
        let departures = std::mem::take(&mut self.departures);
        if departures.is_empty() {
            return Vec::new();
        }

        // Gather values before any removal invalidates indices.
        let mut grouped: IndexMap<BlockId, Departure> = IndexMap::new();
        for &(index, dest) in &departures {
            let entry = grouped.entry(dest).or_insert_with(|| Departure {
                dest,
                count: 0,
                data: Vec::new(),
            });
            entry.count += 1;
            for values in self.attrs.values() {
                entry.data.push(values[index]);
            }
        }

        // Swap-remove highest index first so lower indices stay valid.
        let mut indices: Vec<usize> = departures.iter().map(|&(i, _)| i).collect();
        indices.sort_unstable_by(|a, b| b.cmp(a));
        for index in indices {
            for values in self.attrs.values_mut() {
                values.swap_remove(index);
            }
            self.count -= 1;
        }

        grouped.into_values().collect()
    }

    /// Append `count` arriving particles from a particle-major payload.
    ///
    /// `data.len() == count * n_attrs` is the caller's (the boundary
    /// machine's) validated precondition.
    pub fn immigrate(&mut self, count: usize, data: &[f64]) {
        debug_assert_eq!(data.len(), count * self.attrs.len());
        let n_attrs = self.attrs.len();
        for particle in data.chunks_exact(n_attrs.max(1)) {
            for (a, values) in self.attrs.values_mut().enumerate() {
                values.push(particle[a]);
            }
        }
        self.count += count;
    }
}

/// A block's named collection of swarms, insertion-ordered.
#[derive(Debug, Default)]
pub struct SwarmContainer {
    swarms: IndexMap<String, Swarm>,
}

impl SwarmContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a swarm, keyed by its label.
    pub fn add(&mut self, swarm: Swarm) {
        self.swarms.insert(swarm.label().to_string(), swarm);
    }

    /// Look up a swarm.
    ///
    /// # Errors
    ///
    /// [`MeshError::SwarmNotFound`] when no swarm has this label.
    pub fn get(&self, label: &str) -> Result<&Swarm, MeshError> {
        self.swarms.get(label).ok_or_else(|| MeshError::SwarmNotFound {
            label: label.to_string(),
        })
    }

    /// Look up a swarm mutably.
    ///
    /// # Errors
    ///
    /// [`MeshError::SwarmNotFound`] when no swarm has this label.
    pub fn get_mut(&mut self, label: &str) -> Result<&mut Swarm, MeshError> {
        self.swarms.get_mut(label).ok_or_else(|| MeshError::SwarmNotFound {
            label: label.to_string(),
        })
    }

    /// Remove a swarm.
    ///
    /// # Errors
    ///
    /// [`MeshError::SwarmNotFound`] when no swarm has this label.
    pub fn remove(&mut self, label: &str) -> Result<Swarm, MeshError> {
        self.swarms
            .shift_remove(label)
            .ok_or_else(|| MeshError::SwarmNotFound {
                label: label.to_string(),
            })
    }

    /// Swarm labels in insertion order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.swarms.keys().map(String::as_str)
    }

    /// Iterate swarms in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Swarm> {
        self.swarms.values()
    }

    /// Iterate swarms mutably in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Swarm> {
        self.swarms.values_mut()
    }

    /// Number of swarms.
    pub fn len(&self) -> usize {
        self.swarms.len()
    }

    /// Whether the container holds no swarms.
    pub fn is_empty(&self) -> bool {
        self.swarms.is_empty()
    }
}
