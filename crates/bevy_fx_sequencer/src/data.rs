//! Declarative effect rows and the table they are loaded from.
//!
//! A row is immutable once the table is built. Rows are shared with running
//! tasks through `Arc`, so a task never outlives the data it reads and never
//! mutates it.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::curve::Curve;
use crate::error::TableError;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Key of a row in the effect table.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Reflect)]
#[serde(transparent)]
pub struct EffectId(String);

impl EffectId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EffectId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EffectId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(EFFECT:{})", self.0)
    }
}

/// Soft reference to an external resource, by asset path.
///
/// Holding one says nothing about whether the resource is resident.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, Hash, Reflect)]
#[serde(transparent)]
pub struct ResourceRef(String);

impl ResourceRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &str {
        &self.0
    }

    /// A reference with an empty path points at nothing.
    pub fn is_null(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for ResourceRef {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// A named parameter on the dynamic instance driven by a curve.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Reflect)]
pub struct ControlParameter {
    /// Parameter name on the dynamic instance.
    pub name: String,
    /// Curve sampled by normalized elapsed time. Unbound parameters are skipped.
    #[serde(default)]
    pub curve: Option<Curve>,
}

/// Immutable description of one playable effect.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Reflect)]
pub struct EffectRow {
    pub id: EffectId,
    /// Resource to instantiate when the effect starts.
    pub resource: ResourceRef,
    /// Lower values execute earlier within a frame.
    #[serde(default)]
    pub priority: i32,
    /// Seconds the effect runs for. Must be > 0 to be playable.
    #[serde(default = "default_duration")]
    pub duration: f32,
    /// Blend weight used when no weight curve is set.
    #[serde(default = "default_weight")]
    pub weight: f32,
    #[serde(default)]
    pub weight_curve: Option<Curve>,
    /// Applied in order every tick.
    #[serde(default)]
    pub control_parameters: Vec<ControlParameter>,
}

fn default_duration() -> f32 {
    2.0
}

fn default_weight() -> f32 {
    1.0
}

impl EffectRow {
    pub fn new(id: impl Into<EffectId>, resource: impl Into<ResourceRef>, duration: f32) -> Self {
        Self {
            id: id.into(),
            resource: resource.into(),
            priority: 0,
            duration,
            weight: default_weight(),
            weight_curve: None,
            control_parameters: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_weight_curve(mut self, curve: Curve) -> Self {
        self.weight_curve = Some(curve);
        self
    }

    pub fn with_control(mut self, name: impl Into<String>, curve: Curve) -> Self {
        self.control_parameters.push(ControlParameter {
            name: name.into(),
            curve: Some(curve),
        });
        self
    }

    /// Whether the row may be scheduled at all.
    pub fn has_valid_duration(&self) -> bool {
        self.duration > 0.0
    }

    /// Blend weight at normalized time `t`, clamped to [0..1].
    pub fn weight_at(&self, t: f32) -> f32 {
        let weight = match &self.weight_curve {
            Some(curve) => curve.sample(t),
            None => self.weight,
        };
        weight.clamp(0.0, 1.0)
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// Keyed, ordered collection of effect rows.
///
/// Iteration follows file order, which is also the order the loader is seeded in.
#[derive(Debug, Default)]
pub struct EffectTable {
    rows: Vec<Arc<EffectRow>>,
    index: HashMap<EffectId, usize>,
}

impl EffectTable {
    pub fn from_rows(rows: impl IntoIterator<Item = EffectRow>) -> Result<Self, TableError> {
        let mut table = Self::default();
        for row in rows {
            if table.index.contains_key(&row.id) {
                return Err(TableError::DuplicateId(row.id));
            }
            table.index.insert(row.id.clone(), table.rows.len());
            table.rows.push(Arc::new(row));
        }
        Ok(table)
    }

    /// Parse a RON list of rows.
    pub fn from_ron_str(source: &str) -> Result<Self, TableError> {
        let rows: Vec<EffectRow> = ron::from_str(source)?;
        Self::from_rows(rows)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, TableError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_ron_str(&source)
    }

    pub fn get(&self, id: &EffectId) -> Option<&Arc<EffectRow>> {
        self.index.get(id).map(|&i| &self.rows[i])
    }

    pub fn contains(&self, id: &EffectId) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<EffectRow>> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
