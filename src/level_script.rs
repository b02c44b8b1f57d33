//! Showcase level script.
//!
//! Plays the configured post effect once its preset is loaded, giving it a
//! random colour on every play, and reports when it stops playing. Space
//! replays it. The blended `Tint` of the view's stack is shown as the clear
//! colour.

use bevy::prelude::*;
use bevy_fx_sequencer::{
    EffectId, EffectInstance, FxSequencerSet, LoadStatus, PostProcessScheduler, PostProcessStack,
};

use crate::settings::LiquidSettings;

/// State of the showcase script.
#[derive(Resource, Debug)]
pub struct LevelScript {
    pub effect: EffectId,
    pub vector_param: String,
    started: bool,
    was_playing: bool,
    rng: fastrand::Rng,
}

impl LevelScript {
    pub fn new(effect: impl Into<EffectId>, vector_param: impl Into<String>) -> Self {
        Self {
            effect: effect.into(),
            vector_param: vector_param.into(),
            started: false,
            was_playing: false,
            rng: fastrand::Rng::new(),
        }
    }

    /// Play the effect with a fresh random vector parameter.
    pub fn play(&mut self, scheduler: &mut PostProcessScheduler) -> bool {
        let value = random_color(&mut self.rng);
        let param = self.vector_param.as_str();
        scheduler.play_effect_with(&self.effect, |instance| instance.set_vector(param, value))
    }
}

/// Opaque colour with random RGB.
pub fn random_color(rng: &mut fastrand::Rng) -> Vec4 {
    Vec4::new(rng.f32(), rng.f32(), rng.f32(), 1.0)
}

/// Base clear colour restored when no contribution sets a tint.
#[derive(Resource, Clone, Copy, Debug)]
struct BaseClearColor(Color);

pub struct LevelScriptPlugin;

impl Plugin for LevelScriptPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, init_level_script).add_systems(
            Update,
            (
                run_level_script.before(FxSequencerSet::Advance),
                show_stack_tint.after(FxSequencerSet::Advance),
            ),
        );
    }
}

fn init_level_script(mut commands: Commands, settings: Res<LiquidSettings>, clear: Res<ClearColor>) {
    commands.insert_resource(LevelScript::new(
        settings.demo.effect.as_str(),
        settings.demo.vector_param.clone(),
    ));
    commands.insert_resource(BaseClearColor(clear.0));
}

fn run_level_script(
    keys: Res<ButtonInput<KeyCode>>,
    script: Option<ResMut<LevelScript>>,
    mut scheduler: ResMut<PostProcessScheduler>,
) {
    let Some(mut script) = script else {
        return;
    };

    let ready = scheduler.load_status(&script.effect) == LoadStatus::Ready;
    if ready && (!script.started || keys.just_pressed(KeyCode::Space)) {
        script.started = true;
        if script.play(&mut scheduler) {
            info!("Level script: playing {}", script.effect);
        }
    }

    let playing = scheduler.is_playing(&script.effect);
    if script.was_playing && !playing {
        info!("Level script: {} is no longer playing", script.effect);
    }
    script.was_playing = playing;
}

fn show_stack_tint(
    stacks: Query<&PostProcessStack>,
    base: Option<Res<BaseClearColor>>,
    mut clear: ResMut<ClearColor>,
) {
    let Some(base) = base else {
        return;
    };
    let tint = stacks.single().ok().and_then(|s| s.blended_vector("Tint"));
    clear.0 = match tint {
        Some(v) => Color::srgba(v.x, v.y, v.z, 1.0),
        None => base.0,
    };
}
