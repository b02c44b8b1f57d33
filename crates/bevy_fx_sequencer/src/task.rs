//! A single running effect.
//!
//! An [`EffectTask`] owns the dynamic instance created from its resolved
//! resource, advances its own clock, drives control parameters from the row's
//! curves and submits a weighted contribution to the frame's blend
//! accumulator. The instance is released the moment the task finishes.

use std::sync::Arc;

use bevy::math::Vec4;

use crate::data::{EffectId, EffectRow};
use crate::error::EffectError;

/// Per-activation parameter block created from a resolved resource.
pub trait EffectInstance {
    fn set_scalar(&mut self, name: &str, value: f32);
    fn set_vector(&mut self, name: &str, value: Vec4);
}

/// A resolved resource able to produce dynamic instances.
pub trait EffectResource {
    type Instance: EffectInstance;

    /// Create a fresh instance, or `None` if there is no base to build from.
    fn instantiate(&self) -> Option<Self::Instance>;
}

/// What a task hands to the blend accumulator each tick.
#[derive(Debug)]
pub struct BlendContribution<'a, I> {
    pub id: &'a EffectId,
    pub instance: &'a I,
    /// Current weight in [0..1].
    pub weight: f32,
    pub priority: i32,
}

/// Per-frame sink that composes weighted contributions, in submission order.
pub trait BlendAccumulator<I> {
    fn submit(&mut self, contribution: BlendContribution<'_, I>);
}

/// Outcome of one [`EffectTask::tick`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskTick {
    Progress,
    Finish,
}

pub struct EffectTask<I> {
    id: EffectId,
    row: Arc<EffectRow>,
    elapsed: f32,
    instance: Option<I>,
}

impl<I> std::fmt::Debug for EffectTask<I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectTask")
            .field("id", &self.id)
            .field("elapsed", &self.elapsed)
            .field("duration", &self.row.duration)
            .field("active", &self.instance.is_some())
            .finish()
    }
}

impl<I: EffectInstance> EffectTask<I> {
    pub fn new(row: Arc<EffectRow>) -> Self {
        Self {
            id: row.id.clone(),
            row,
            elapsed: 0.0,
            instance: None,
        }
    }

    /// Id of the table row this task plays.
    pub fn id(&self) -> &EffectId {
        &self.id
    }

    /// Blend priority copied from the row. Lower values tick first.
    pub fn priority(&self) -> i32 {
        self.row.priority
    }

    /// Seconds advanced since activation.
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// The owned instance. `None` before activation and after release.
    pub fn instance(&self) -> Option<&I> {
        self.instance.as_ref()
    }

    /// Whether the task still owns its dynamic instance.
    pub fn is_active(&self) -> bool {
        self.instance.is_some()
    }

    /// Create the owned instance from `resource`.
    pub fn activate<R>(&mut self, resource: &R) -> Result<(), EffectError>
    where
        R: EffectResource<Instance = I>,
    {
        self.activate_with(resource, |_| {})
    }

    /// Create the owned instance, then run `init` on it before the first tick.
    pub fn activate_with<R, F>(&mut self, resource: &R, init: F) -> Result<(), EffectError>
    where
        R: EffectResource<Instance = I>,
        F: FnOnce(&mut I),
    {
        let mut instance = resource
            .instantiate()
            .ok_or_else(|| EffectError::ActivationFailed(self.id.clone()))?;
        init(&mut instance);
        self.instance = Some(instance);
        self.elapsed = 0.0;
        Ok(())
    }

    /// `elapsed / duration`, saturating at exactly 1.0.
    pub fn normalized_time(&self) -> f32 {
        if self.row.duration <= 0.0 {
            return 1.0;
        }
        (self.elapsed / self.row.duration).clamp(0.0, 1.0)
    }

    /// Advance by `delta` seconds and submit this frame's contribution.
    ///
    /// Returns [`TaskTick::Finish`] on the tick the deadline is reached; the
    /// instance has already been released by then. A task that was never
    /// activated finishes immediately without submitting anything.
    pub fn tick(&mut self, accumulator: &mut impl BlendAccumulator<I>, delta: f32) -> TaskTick {
        let Some(instance) = self.instance.as_mut() else {
            return TaskTick::Finish;
        };

        self.elapsed += delta.max(0.0);
        let t = if self.row.duration <= 0.0 {
            1.0
        } else {
            (self.elapsed / self.row.duration).clamp(0.0, 1.0)
        };

        for param in &self.row.control_parameters {
            if let Some(curve) = &param.curve {
                instance.set_scalar(&param.name, curve.sample(t));
            }
        }

        accumulator.submit(BlendContribution {
            id: &self.id,
            instance,
            weight: self.row.weight_at(t),
            priority: self.row.priority,
        });

        if self.elapsed >= self.row.duration {
            self.release();
            return TaskTick::Finish;
        }
        TaskTick::Progress
    }

    /// Would one more tick of `next_delta` finish this task?
    pub fn is_scheduled_for_deletion(&self, next_delta: f32) -> bool {
        !self.is_active() || self.elapsed + next_delta.max(0.0) >= self.row.duration
    }

    /// Drop the owned instance now.
    pub fn release(&mut self) {
        self.instance = None;
    }
}
