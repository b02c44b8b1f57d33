//! # bevy_fx_sequencer
//!
//! Time-bounded effect tasks for Bevy: post-process blends driven by a
//! declarative effect table, and single-slot playlists of particle scenes.
//!
//! The core (`loader`, `task`, `scheduler`, `playlist`) does not touch the
//! ECS and is driven through small traits. The plugin wires it to the
//! `AssetServer`, the view camera's [`PostProcessStack`] and
//! [`EffectDisplayStand`] entities.
//!
//! ## Quick Start
//!
//! ```ignore
//! use bevy::prelude::*;
//! use bevy_fx_sequencer::{FxSequencerPlugin, PostProcessScheduler, PostProcessStack};
//!
//! fn main() {
//!     App::new()
//!         .add_plugins(DefaultPlugins)
//!         .add_plugins(FxSequencerPlugin)
//!         .add_systems(Startup, |mut commands: Commands| {
//!             commands.spawn((Camera3d::default(), PostProcessStack::default()));
//!         })
//!         .add_systems(Update, flash_on_space)
//!         .run();
//! }
//!
//! fn flash_on_space(keys: Res<ButtonInput<KeyCode>>, mut fx: ResMut<PostProcessScheduler>) {
//!     if keys.just_pressed(KeyCode::Space) {
//!         fx.play_effect(&"flash".into());
//!     }
//! }
//! ```

pub mod curve;
pub mod data;
pub mod display_stand;
pub mod error;
pub mod loader;
pub mod playlist;
pub mod post_process;
pub mod scheduler;
pub mod task;

pub use curve::{Curve, CurveKey, Interp};
pub use data::{ControlParameter, EffectId, EffectRow, EffectTable, ResourceRef};
pub use display_stand::{EffectDisplayStand, EffectFinished, PlayStand, PlaylistItem, StandPivot};
pub use error::{EffectError, TableError};
pub use loader::{AsyncResolver, LoadReply, LoadStatus, ResourceLoader};
pub use playlist::{PlaylistBackend, PlaylistSequencer};
pub use post_process::{
    PostProcessInstance, PostProcessPreset, PostProcessScheduler, PostProcessStack,
};
pub use scheduler::EffectScheduler;
pub use task::{BlendAccumulator, EffectInstance, EffectResource, EffectTask, TaskTick};

use std::path::PathBuf;

use bevy::prelude::*;

/// Default location of the post-process effect table.
pub const DEFAULT_TABLE_PATH: &str = "assets/post_process/effect_table.ron";

/// How the plugin sets up the post-process scheduler.
#[derive(Resource, Clone, Debug)]
pub struct SequencerSettings {
    pub table_path: PathBuf,
    /// Failed resolutions retried before an effect is given up on.
    pub retry_limit: u32,
    /// Queue every table row for loading as soon as the table is read.
    pub seed_on_startup: bool,
}

impl Default for SequencerSettings {
    fn default() -> Self {
        Self {
            table_path: PathBuf::from(DEFAULT_TABLE_PATH),
            retry_limit: loader::DEFAULT_RETRY_LIMIT,
            seed_on_startup: true,
        }
    }
}

/// Ordering of the sequencer's per-frame work.
#[derive(SystemSet, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FxSequencerSet {
    /// Resource resolution and play requests.
    Prepare,
    /// Advance post-process tasks and playlists.
    Advance,
}

pub struct FxSequencerPlugin;

impl Plugin for FxSequencerPlugin {
    fn build(&self, app: &mut App) {
        app.register_type::<EffectDisplayStand>()
            .register_type::<Curve>()
            .register_type::<EffectRow>()
            .init_resource::<SequencerSettings>()
            .init_resource::<PostProcessScheduler>()
            .init_resource::<post_process::PresetRequests>()
            .init_asset::<PostProcessPreset>()
            .init_asset_loader::<post_process::PostProcessPresetLoader>()
            .add_message::<PlayStand>()
            .configure_sets(
                Update,
                (FxSequencerSet::Prepare, FxSequencerSet::Advance).chain(),
            )
            .add_systems(Startup, post_process::load_effect_table)
            .add_systems(
                Update,
                (
                    post_process::drive_preset_loads,
                    display_stand::setup_display_stands,
                    display_stand::handle_play_requests.after(display_stand::setup_display_stands),
                )
                    .in_set(FxSequencerSet::Prepare),
            )
            .add_systems(
                Update,
                (
                    post_process::tick_post_process,
                    display_stand::tick_display_stands,
                    display_stand::rotate_stand_pivots,
                )
                    .in_set(FxSequencerSet::Advance),
            )
            .add_systems(Last, post_process::shutdown_post_process);
    }
}
