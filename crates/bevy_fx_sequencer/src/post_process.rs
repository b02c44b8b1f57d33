//! Post-process effects on top of the generic scheduler.
//!
//! Presets are RON assets loaded through the [`AssetServer`]. A resolved
//! preset produces a [`PostProcessInstance`] per activation, and every frame
//! the live tasks submit their instances to the [`PostProcessStack`] on the
//! view target.

use std::collections::HashMap;

use bevy::asset::{AssetLoader, LoadContext, LoadState, io::Reader};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::{EffectId, EffectTable, ResourceRef};
use crate::loader::{AsyncResolver, LoadReply, LoadTicket};
use crate::scheduler::EffectScheduler;
use crate::task::{BlendAccumulator, BlendContribution, EffectInstance, EffectResource};
use crate::SequencerSettings;

// ---------------------------------------------------------------------------
// Preset asset
// ---------------------------------------------------------------------------

/// Base parameter block of a post-process effect, stored as `*.pp.ron`.
#[derive(Asset, TypePath, Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct PostProcessPreset {
    /// Name of the base material. Empty means there is nothing to instantiate.
    #[serde(default)]
    pub material: String,
    #[serde(default)]
    pub scalars: HashMap<String, f32>,
    #[serde(default)]
    pub vectors: HashMap<String, Vec4>,
}

impl EffectResource for PostProcessPreset {
    type Instance = PostProcessInstance;

    fn instantiate(&self) -> Option<PostProcessInstance> {
        if self.material.is_empty() {
            return None;
        }
        Some(PostProcessInstance {
            material: self.material.clone(),
            scalars: self.scalars.clone(),
            vectors: self.vectors.clone(),
        })
    }
}

/// Dynamic, per-activation copy of a preset's parameters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PostProcessInstance {
    pub material: String,
    pub scalars: HashMap<String, f32>,
    pub vectors: HashMap<String, Vec4>,
}

impl EffectInstance for PostProcessInstance {
    fn set_scalar(&mut self, name: &str, value: f32) {
        self.scalars.insert(name.to_string(), value);
    }

    fn set_vector(&mut self, name: &str, value: Vec4) {
        self.vectors.insert(name.to_string(), value);
    }
}

#[derive(Default, TypePath)]
pub struct PostProcessPresetLoader;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PresetLoaderError {
    #[error("Could not load preset: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not parse RON: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

impl AssetLoader for PostProcessPresetLoader {
    type Asset = PostProcessPreset;
    type Settings = ();
    type Error = PresetLoaderError;

    async fn load(
        &self,
        reader: &mut dyn Reader,
        _settings: &(),
        load_context: &mut LoadContext<'_>,
    ) -> Result<Self::Asset, Self::Error> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await?;
        let preset = ron::de::from_bytes::<PostProcessPreset>(&bytes)?;
        if preset.material.is_empty() {
            let path = load_context.path();
            warn!("{path:?}: preset has no material and cannot be played");
        }
        Ok(preset)
    }

    fn extensions(&self) -> &[&str] {
        &["pp.ron"]
    }
}

// ---------------------------------------------------------------------------
// Resolver backed by the AssetServer
// ---------------------------------------------------------------------------

/// Preset loads issued to the asset server, waiting for a final load state.
#[derive(Resource, Default)]
pub struct PresetRequests {
    pending: Vec<(Handle<PostProcessPreset>, LoadReply<PostProcessPreset>)>,
}

pub struct AssetServerResolver<'a> {
    pub server: &'a AssetServer,
    pub presets: &'a Assets<PostProcessPreset>,
    pub requests: &'a mut PresetRequests,
}

impl AssetServerResolver<'_> {
    /// Answer every request whose asset finished loading or failed.
    pub fn poll(&mut self) {
        let pending = std::mem::take(&mut self.requests.pending);
        for (handle, reply) in pending {
            match self.server.load_state(handle.id()) {
                LoadState::Loaded => match self.presets.get(&handle) {
                    Some(preset) => reply.succeed(preset.clone()),
                    None => self.requests.pending.push((handle, reply)),
                },
                LoadState::Failed(err) => reply.fail(err.to_string()),
                _ => self.requests.pending.push((handle, reply)),
            }
        }
    }
}

impl AsyncResolver<PostProcessPreset> for AssetServerResolver<'_> {
    fn request(&mut self, resource: &ResourceRef, reply: LoadReply<PostProcessPreset>) {
        let path = resource.path().to_string();
        let handle: Handle<PostProcessPreset> = self.server.load(path.clone());
        // A path that failed before keeps its failed state until reloaded.
        if matches!(self.server.load_state(handle.id()), LoadState::Failed(_)) {
            self.server.reload(path);
        }
        self.requests.pending.push((handle, reply));
    }

    fn cancel(&mut self, ticket: LoadTicket) {
        // Dropping the last strong handle lets the asset server abandon the load.
        self.requests
            .pending
            .retain(|(_, reply)| reply.ticket() != ticket);
    }
}

// ---------------------------------------------------------------------------
// Blend stack
// ---------------------------------------------------------------------------

/// One contribution recorded for the current frame.
#[derive(Clone, Debug, PartialEq)]
pub struct StackEntry {
    pub id: EffectId,
    pub weight: f32,
    pub priority: i32,
    pub material: String,
    pub scalars: HashMap<String, f32>,
    pub vectors: HashMap<String, Vec4>,
}

/// Per-view accumulator of post-process contributions.
///
/// Put it on the camera that should receive post-process effects. It is
/// rebuilt every frame, in ascending priority order.
#[derive(Component, Clone, Debug, Default)]
pub struct PostProcessStack {
    pub entries: Vec<StackEntry>,
}

impl PostProcessStack {
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Weighted average of `name` over every contribution that sets it.
    pub fn blended_scalar(&self, name: &str) -> Option<f32> {
        let mut total = 0.0;
        let mut weights = 0.0;
        for entry in &self.entries {
            if let Some(value) = entry.scalars.get(name) {
                total += value * entry.weight;
                weights += entry.weight;
            }
        }
        (weights > 0.0).then(|| total / weights)
    }

    /// Weighted average of a vector parameter.
    pub fn blended_vector(&self, name: &str) -> Option<Vec4> {
        let mut total = Vec4::ZERO;
        let mut weights = 0.0;
        for entry in &self.entries {
            if let Some(value) = entry.vectors.get(name) {
                total += *value * entry.weight;
                weights += entry.weight;
            }
        }
        (weights > 0.0).then(|| total / weights)
    }

    /// Layer every contribution over `base` in submission order, each one
    /// lerping towards its own value by its weight.
    pub fn composite_scalar(&self, base: f32, name: &str) -> f32 {
        self.entries.iter().fold(base, |value, entry| {
            match entry.scalars.get(name) {
                Some(target) => value + (target - value) * entry.weight,
                None => value,
            }
        })
    }
}

impl BlendAccumulator<PostProcessInstance> for PostProcessStack {
    fn submit(&mut self, c: BlendContribution<'_, PostProcessInstance>) {
        self.entries.push(StackEntry {
            id: c.id.clone(),
            weight: c.weight,
            priority: c.priority,
            material: c.instance.material.clone(),
            scalars: c.instance.scalars.clone(),
            vectors: c.instance.vectors.clone(),
        });
    }
}

// ---------------------------------------------------------------------------
// Scheduler resource and systems
// ---------------------------------------------------------------------------

/// The world's post-process scheduler.
#[derive(Resource, Deref, DerefMut, Debug)]
pub struct PostProcessScheduler(pub EffectScheduler<PostProcessPreset>);

impl Default for PostProcessScheduler {
    fn default() -> Self {
        Self(EffectScheduler::new(EffectTable::default()))
    }
}

/// Read the effect table and optionally queue every resource for loading.
pub(crate) fn load_effect_table(
    settings: Res<SequencerSettings>,
    mut scheduler: ResMut<PostProcessScheduler>,
) {
    let table = match EffectTable::load(&settings.table_path) {
        Ok(table) => table,
        Err(err) => {
            error!("Effect table {}: {}", settings.table_path.display(), err);
            return;
        }
    };
    info!(
        "Loaded {} post-process effects from {}",
        table.len(),
        settings.table_path.display()
    );

    scheduler.0 = EffectScheduler::with_retry_limit(table, settings.retry_limit);
    if settings.seed_on_startup {
        scheduler.seed_loads();
    }
}

pub(crate) fn drive_preset_loads(
    server: Res<AssetServer>,
    presets: Res<Assets<PostProcessPreset>>,
    mut requests: ResMut<PresetRequests>,
    mut scheduler: ResMut<PostProcessScheduler>,
) {
    let mut resolver = AssetServerResolver {
        server: &server,
        presets: &presets,
        requests: &mut requests,
    };
    resolver.poll();
    scheduler.update_loads(&mut resolver);
}

/// Advance live tasks into the view target's stack. Without a single view
/// target the frame is skipped.
///
/// Every stack is cleared first, so none keeps last frame's entries while
/// the frame is skipped.
pub(crate) fn tick_post_process(
    time: Res<Time>,
    mut scheduler: ResMut<PostProcessScheduler>,
    mut targets: Query<&mut PostProcessStack>,
) {
    for mut stack in &mut targets {
        stack.clear();
    }
    if targets.iter().nth(1).is_some() {
        warn_once!("More than one PostProcessStack in the world; post-process effects are paused");
    }
    let mut target = targets.single_mut().ok();
    scheduler.update(time.delta_secs(), target.as_deref_mut());
}

pub(crate) fn shutdown_post_process(
    mut exits: MessageReader<AppExit>,
    server: Res<AssetServer>,
    presets: Res<Assets<PostProcessPreset>>,
    mut requests: ResMut<PresetRequests>,
    mut scheduler: ResMut<PostProcessScheduler>,
) {
    if exits.read().next().is_none() {
        return;
    }
    let mut resolver = AssetServerResolver {
        server: &server,
        presets: &presets,
        requests: &mut requests,
    };
    scheduler.shutdown(&mut resolver);
}
