//! Effect display stand: plays a list of effect scenes one after another.
//!
//! Each stand owns a [`PlaylistSequencer`] and a rotating pivot child. The
//! current item is spawned under the pivot at the stand's offset. An item is
//! considered done once something marks it with [`EffectFinished`], once it
//! is despawned, or once it has played for `play_interval` seconds.

use std::path::Path;

use bevy::gltf::GltfAssetLabel;
use bevy::prelude::*;
use bevy::scene::SceneRoot;

use crate::data::ResourceRef;
use crate::playlist::{PlaylistBackend, PlaylistSequencer};

const PLAYLIST_CAPACITY: usize = 64;

/// Plays `playlist` (plus anything found in `additional_folder`) in order.
#[derive(Component, Reflect, Clone, Debug)]
#[reflect(Component)]
pub struct EffectDisplayStand {
    /// Effect scene paths, relative to the asset root.
    pub playlist: Vec<String>,
    /// Asset folder scanned once at setup; its scenes are appended, sorted by path.
    pub additional_folder: Option<String>,
    /// Where items are placed, in the stand's local frame.
    pub offset: Vec3,
    /// Yaw speed of the pivot in degrees per second.
    pub rotate_speed: f32,
    /// Seconds one item may play before the stand moves on.
    pub play_interval: f32,
    pub auto_play: bool,
    pub looping: bool,
}

impl Default for EffectDisplayStand {
    fn default() -> Self {
        Self {
            playlist: Vec::new(),
            additional_folder: None,
            offset: Vec3::new(0.0, 1.0, -2.0),
            rotate_speed: 0.0,
            play_interval: 5.0,
            auto_play: true,
            looping: true,
        }
    }
}

/// Inserted on a playlist item by whatever drives it, once it has finished.
#[derive(Component, Default, Debug)]
pub struct EffectFinished;

/// A spawned playlist item.
#[derive(Component, Debug)]
pub struct PlaylistItem {
    pub source: ResourceRef,
}

/// Rotating parent of a stand's current item.
#[derive(Component, Default, Debug)]
pub struct StandPivot;

/// Runtime playlist state of a stand.
#[derive(Component, Debug)]
pub struct StandPlayback {
    pub sequencer: PlaylistSequencer<ResourceRef, Entity>,
    pub pivot: Entity,
}

/// Restart a stand, optionally replacing its playlist first.
#[derive(Message, Clone, Debug)]
pub struct PlayStand {
    pub stand: Entity,
    pub items: Option<Vec<ResourceRef>>,
}

// ---------------------------------------------------------------------------
// Folder scan
// ---------------------------------------------------------------------------

/// List glTF scenes directly inside `assets_root/folder`, as asset paths
/// sorted by name.
pub fn scan_effect_folder(assets_root: &Path, folder: &str) -> Vec<ResourceRef> {
    let Ok(entries) = std::fs::read_dir(assets_root.join(folder)) else {
        warn!("Effect folder {:?} could not be read", folder);
        return Vec::new();
    };

    let mut names: Vec<String> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("glb") || ext.eq_ignore_ascii_case("gltf"))
        })
        .filter_map(|path| path.file_name().and_then(|n| n.to_str()).map(str::to_string))
        .collect();
    names.sort();

    let folder = folder.trim_end_matches('/');
    names
        .into_iter()
        .map(|name| ResourceRef::new(format!("{}/{}", folder, name)))
        .collect()
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

struct StandBackend<'a, 'w, 's> {
    commands: &'a mut Commands<'w, 's>,
    server: &'a AssetServer,
    items: &'a Query<'a, 'a, Has<EffectFinished>, With<PlaylistItem>>,
    pivot: Entity,
    offset: Vec3,
    /// Spawned during this run; not visible to `items` yet.
    spawned: Vec<Entity>,
}

impl PlaylistBackend<ResourceRef> for StandBackend<'_, '_, '_> {
    type Handle = Entity;

    fn spawn(&mut self, item: &ResourceRef) -> Option<Entity> {
        if item.is_null() {
            return None;
        }
        let scene = self
            .server
            .load(GltfAssetLabel::Scene(0).from_asset(item.path().to_string()));
        let entity = self
            .commands
            .spawn((
                PlaylistItem {
                    source: item.clone(),
                },
                SceneRoot(scene),
                Transform::from_translation(self.offset),
                ChildOf(self.pivot),
            ))
            .id();
        self.spawned.push(entity);
        Some(entity)
    }

    fn is_active(&self, handle: &Entity) -> bool {
        match self.items.get(*handle) {
            Ok(finished) => !finished,
            Err(_) => self.spawned.contains(handle),
        }
    }

    fn destroy(&mut self, handle: Entity) {
        self.commands.entity(handle).try_despawn();
    }
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

pub(crate) fn setup_display_stands(
    mut commands: Commands,
    server: Res<AssetServer>,
    stands: Query<(Entity, &EffectDisplayStand), Added<EffectDisplayStand>>,
    items: Query<Has<EffectFinished>, With<PlaylistItem>>,
) {
    for (entity, stand) in &stands {
        let mut list = Vec::with_capacity(PLAYLIST_CAPACITY);
        list.extend(stand.playlist.iter().map(|p| ResourceRef::new(p.as_str())));
        if let Some(folder) = &stand.additional_folder {
            list.extend(scan_effect_folder(Path::new("assets"), folder));
        }
        info!("Display stand {:?}: {} effects", entity, list.len());

        let pivot = commands
            .spawn((
                StandPivot,
                Transform::default(),
                Visibility::default(),
                ChildOf(entity),
            ))
            .id();

        let mut sequencer = PlaylistSequencer::new(list, stand.looping)
            .with_play_interval(stand.play_interval);
        if stand.auto_play {
            let mut backend = StandBackend {
                commands: &mut commands,
                server: &server,
                items: &items,
                pivot,
                offset: stand.offset,
                spawned: Vec::new(),
            };
            sequencer.play(&mut backend);
        }

        commands
            .entity(entity)
            .insert(StandPlayback { sequencer, pivot });
    }
}

pub(crate) fn handle_play_requests(
    mut requests: MessageReader<PlayStand>,
    mut commands: Commands,
    server: Res<AssetServer>,
    mut stands: Query<(&EffectDisplayStand, &mut StandPlayback)>,
    items: Query<Has<EffectFinished>, With<PlaylistItem>>,
) {
    for request in requests.read() {
        let Ok((stand, mut playback)) = stands.get_mut(request.stand) else {
            warn!("Play request for {:?}, which is not a ready display stand", request.stand);
            continue;
        };
        let pivot = playback.pivot;
        let mut backend = StandBackend {
            commands: &mut commands,
            server: &server,
            items: &items,
            pivot,
            offset: stand.offset,
            spawned: Vec::new(),
        };
        match &request.items {
            Some(list) => playback.sequencer.play_list(list.clone(), &mut backend),
            None => playback.sequencer.play(&mut backend),
        };
    }
}

pub(crate) fn tick_display_stands(
    time: Res<Time>,
    mut commands: Commands,
    server: Res<AssetServer>,
    mut stands: Query<(&EffectDisplayStand, &mut StandPlayback)>,
    items: Query<Has<EffectFinished>, With<PlaylistItem>>,
) {
    let delta = time.delta_secs();
    for (stand, mut playback) in &mut stands {
        let playback = &mut *playback;
        playback.sequencer.set_looping(stand.looping);
        playback.sequencer.set_play_interval(Some(stand.play_interval));

        let mut backend = StandBackend {
            commands: &mut commands,
            server: &server,
            items: &items,
            pivot: playback.pivot,
            offset: stand.offset,
            spawned: Vec::new(),
        };
        playback.sequencer.tick(delta, &mut backend);
    }
}

pub(crate) fn rotate_stand_pivots(
    time: Res<Time>,
    stands: Query<&EffectDisplayStand>,
    mut pivots: Query<(&ChildOf, &mut Transform), With<StandPivot>>,
) {
    for (child_of, mut transform) in &mut pivots {
        let Ok(stand) = stands.get(child_of.parent()) else {
            continue;
        };
        if stand.rotate_speed != 0.0 {
            transform.rotate_y(stand.rotate_speed.to_radians() * time.delta_secs());
        }
    }
}
