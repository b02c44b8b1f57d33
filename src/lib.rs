//! # Liquid
//!
//! Game-side integration of the effect sequencer: persisted settings, the
//! showcase level (camera, light and an effect display stand) and the level
//! script that plays a post effect on start.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bevy::prelude::*;
//! use liquid::{LiquidPlugin, LiquidSettings};
//!
//! fn main() {
//!     App::new()
//!         .add_plugins(DefaultPlugins)
//!         .add_plugins(LiquidPlugin::new(LiquidSettings::load()))
//!         .run();
//! }
//! ```

pub mod level_script;
pub mod settings;

pub use level_script::{LevelScript, LevelScriptPlugin};
pub use settings::{DemoSettings, LiquidSettings, StandSettings};

use bevy::prelude::*;
use bevy_fx_sequencer::{FxSequencerPlugin, PostProcessStack};

pub struct LiquidPlugin {
    pub settings: LiquidSettings,
}

impl LiquidPlugin {
    pub fn new(settings: LiquidSettings) -> Self {
        Self { settings }
    }
}

impl Default for LiquidPlugin {
    fn default() -> Self {
        Self::new(LiquidSettings::default())
    }
}

impl Plugin for LiquidPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(self.settings.clone())
            .insert_resource(self.settings.sequencer())
            .add_plugins(FxSequencerPlugin)
            .add_plugins(LevelScriptPlugin)
            .add_systems(Startup, spawn_showcase)
            .add_systems(Last, settings::save_settings_on_change);
    }
}

fn spawn_showcase(mut commands: Commands, settings: Res<LiquidSettings>) {
    commands.spawn((
        Name::new("Showcase Camera"),
        Camera3d::default(),
        PostProcessStack::default(),
        Transform::from_xyz(0.0, 2.5, 4.0).looking_at(Vec3::new(0.0, 1.0, -2.0), Vec3::Y),
    ));

    commands.spawn((
        Name::new("Sun"),
        DirectionalLight {
            shadows_enabled: true,
            ..default()
        },
        Transform::from_xyz(4.0, 8.0, 4.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    if settings.stand.enabled {
        commands.spawn((
            Name::new("Effect Display Stand"),
            settings.stand.to_stand(),
            Transform::default(),
            Visibility::default(),
        ));
    }
}
