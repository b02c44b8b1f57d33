//! Showcase binary: boots the level with settings read from the config directory.

use bevy::log::LogPlugin;
use bevy::prelude::*;
use liquid::{LiquidPlugin, LiquidSettings};

fn main() {
    let settings = LiquidSettings::load();

    App::new()
        .add_plugins(
            DefaultPlugins
                .set(WindowPlugin {
                    primary_window: Some(Window {
                        title: "Liquid Effect Showcase".to_string(),
                        ..default()
                    }),
                    ..default()
                })
                .set(LogPlugin {
                    level: settings.log_level(),
                    filter: settings.log_filter.clone(),
                    ..default()
                }),
        )
        .add_plugins(LiquidPlugin::new(settings))
        .run();
}
