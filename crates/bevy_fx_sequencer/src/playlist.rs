//! Single-slot playlist: one item plays at a time, advancing on completion.
//!
//! The sequencer is generic over the item type and over a [`PlaylistBackend`]
//! that actually spawns and destroys running instances. The previous instance
//! is always destroyed before the next one is spawned.

use bevy::log::{debug, warn};

/// Spawns and tears down the running instance of a playlist item.
pub trait PlaylistBackend<T> {
    type Handle;

    /// Start playing `item`. `None` if it could not be spawned.
    fn spawn(&mut self, item: &T) -> Option<Self::Handle>;

    /// The instance's own "still running" signal.
    fn is_active(&self, handle: &Self::Handle) -> bool;

    /// Stop the instance immediately and free it.
    fn destroy(&mut self, handle: Self::Handle);
}

#[derive(Debug)]
struct ActiveItem<H> {
    handle: H,
    age: f32,
}

#[derive(Debug)]
pub struct PlaylistSequencer<T, H> {
    items: Vec<T>,
    /// `None` is the "nothing current" sentinel.
    current: Option<usize>,
    looping: bool,
    /// Ceiling on how long one item may play before it is considered done.
    play_interval: Option<f32>,
    slot: Option<ActiveItem<H>>,
}

impl<T, H> Default for PlaylistSequencer<T, H> {
    fn default() -> Self {
        Self::new(Vec::new(), false)
    }
}

impl<T, H> PlaylistSequencer<T, H> {
    pub fn new(items: Vec<T>, looping: bool) -> Self {
        Self {
            items,
            current: None,
            looping,
            play_interval: None,
            slot: None,
        }
    }

    pub fn with_play_interval(mut self, seconds: f32) -> Self {
        self.play_interval = Some(seconds);
        self
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_item(&self) -> Option<&T> {
        self.current.and_then(|i| self.items.get(i))
    }

    pub fn current_handle(&self) -> Option<&H> {
        self.slot.as_ref().map(|s| &s.handle)
    }

    pub fn is_playing(&self) -> bool {
        self.slot.is_some()
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn set_play_interval(&mut self, seconds: Option<f32>) {
        self.play_interval = seconds;
    }

    /// Restart from the first item, destroying whatever is playing.
    pub fn play<B>(&mut self, backend: &mut B) -> bool
    where
        B: PlaylistBackend<T, Handle = H>,
    {
        self.stop(backend);
        self.advance(backend)
    }

    /// Replace the playlist and start it from the first item.
    pub fn play_list<B>(&mut self, items: Vec<T>, backend: &mut B) -> bool
    where
        B: PlaylistBackend<T, Handle = H>,
    {
        self.stop(backend);
        self.items = items;
        self.advance(backend)
    }

    /// Move to the next item and spawn it.
    ///
    /// Past the end, a looping playlist wraps to the first item; otherwise
    /// the index returns to the sentinel and `false` is returned. Items that
    /// fail to spawn are skipped, and at most one full pass is attempted.
    pub fn advance<B>(&mut self, backend: &mut B) -> bool
    where
        B: PlaylistBackend<T, Handle = H>,
    {
        self.release(backend);

        for _ in 0..self.items.len() {
            let next = match self.current {
                None => 0,
                Some(i) if i + 1 < self.items.len() => i + 1,
                Some(_) if self.looping => 0,
                Some(_) => break,
            };
            self.current = Some(next);

            match backend.spawn(&self.items[next]) {
                Some(handle) => {
                    debug!("Playlist playing item {}", next);
                    self.slot = Some(ActiveItem { handle, age: 0.0 });
                    return true;
                }
                None => warn!("Playlist item {} could not be spawned, skipping", next),
            }
        }

        self.current = None;
        false
    }

    /// Age the current item and advance once it has completed.
    ///
    /// Returns true when the playlist moved on this tick.
    pub fn tick<B>(&mut self, delta: f32, backend: &mut B) -> bool
    where
        B: PlaylistBackend<T, Handle = H>,
    {
        let Some(slot) = self.slot.as_mut() else {
            return false;
        };
        slot.age += delta.max(0.0);

        let expired = self.play_interval.is_some_and(|ceiling| slot.age > ceiling);
        if expired || !backend.is_active(&slot.handle) {
            self.advance(backend);
            return true;
        }
        false
    }

    /// Destroy the current instance and return to the sentinel.
    pub fn stop<B>(&mut self, backend: &mut B)
    where
        B: PlaylistBackend<T, Handle = H>,
    {
        self.release(backend);
        self.current = None;
    }

    fn release<B>(&mut self, backend: &mut B)
    where
        B: PlaylistBackend<T, Handle = H>,
    {
        if let Some(slot) = self.slot.take() {
            backend.destroy(slot.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[derive(Default)]
    struct FakeBackend {
        next: u32,
        live: HashSet<u32>,
        spawned: Vec<&'static str>,
        destroyed: Vec<u32>,
        unspawnable: HashSet<&'static str>,
        /// Largest number of simultaneously live instances seen.
        peak: usize,
    }

    impl PlaylistBackend<&'static str> for FakeBackend {
        type Handle = u32;

        fn spawn(&mut self, item: &&'static str) -> Option<u32> {
            if self.unspawnable.contains(item) {
                return None;
            }
            self.next += 1;
            self.live.insert(self.next);
            self.spawned.push(item);
            self.peak = self.peak.max(self.live.len());
            Some(self.next)
        }

        fn is_active(&self, handle: &u32) -> bool {
            self.live.contains(handle)
        }

        fn destroy(&mut self, handle: u32) {
            self.live.remove(&handle);
            self.destroyed.push(handle);
        }
    }

    impl FakeBackend {
        /// Simulate the running instance finishing on its own.
        fn finish(&mut self, handle: u32) {
            self.live.remove(&handle);
        }
    }

    fn finish_current(p: &PlaylistSequencer<&'static str, u32>, backend: &mut FakeBackend) {
        let handle = *p.current_handle().unwrap();
        backend.finish(handle);
    }

    #[test]
    fn looping_playlist_wraps_to_first_item() {
        let mut backend = FakeBackend::default();
        let mut p = PlaylistSequencer::new(vec!["A", "B"], true);

        assert!(p.play(&mut backend));
        assert_eq!(p.current_index(), Some(0));

        finish_current(&p, &mut backend);
        assert!(p.tick(0.1, &mut backend));
        assert_eq!(p.current_index(), Some(1));

        finish_current(&p, &mut backend);
        assert!(p.tick(0.1, &mut backend));
        assert_eq!(p.current_index(), Some(0));
        assert_eq!(backend.spawned, vec!["A", "B", "A"]);
    }

    #[test]
    fn non_looping_playlist_stops_at_sentinel() {
        let mut backend = FakeBackend::default();
        let mut p = PlaylistSequencer::new(vec!["A", "B"], false);
        p.play(&mut backend);

        finish_current(&p, &mut backend);
        p.tick(0.1, &mut backend);
        finish_current(&p, &mut backend);
        p.tick(0.1, &mut backend);

        assert_eq!(p.current_index(), None);
        assert!(!p.is_playing());
        // No auto-advance until play() is called again.
        assert!(!p.tick(10.0, &mut backend));
        assert_eq!(backend.spawned.len(), 2);

        assert!(p.play(&mut backend));
        assert_eq!(p.current_item(), Some(&"A"));
    }

    #[test]
    fn play_interval_caps_item_age() {
        let mut backend = FakeBackend::default();
        let mut p = PlaylistSequencer::new(vec!["A", "B"], false).with_play_interval(5.0);
        p.play(&mut backend);

        assert!(!p.tick(3.0, &mut backend));
        assert!(!p.tick(2.0, &mut backend));
        assert!(p.tick(0.5, &mut backend));
        assert_eq!(p.current_item(), Some(&"B"));
    }

    #[test]
    fn replay_destroys_running_instance_first() {
        let mut backend = FakeBackend::default();
        let mut p = PlaylistSequencer::new(vec!["A", "B"], true);
        p.play(&mut backend);
        p.advance(&mut backend);
        p.play(&mut backend);

        assert_eq!(p.current_index(), Some(0));
        assert_eq!(backend.destroyed, vec![1, 2]);
        assert_eq!(backend.peak, 1);
    }

    #[test]
    fn play_list_replaces_items() {
        let mut backend = FakeBackend::default();
        let mut p = PlaylistSequencer::new(vec!["A"], false);
        p.play(&mut backend);

        assert!(p.play_list(vec!["X", "Y"], &mut backend));
        assert_eq!(p.items(), &["X", "Y"]);
        assert_eq!(p.current_item(), Some(&"X"));
        assert_eq!(backend.live.len(), 1);
    }

    #[test]
    fn unspawnable_items_are_skipped() {
        let mut backend = FakeBackend::default();
        backend.unspawnable.insert("B");
        let mut p = PlaylistSequencer::new(vec!["A", "B", "C"], false);
        p.play(&mut backend);

        finish_current(&p, &mut backend);
        p.tick(0.1, &mut backend);
        assert_eq!(p.current_item(), Some(&"C"));
    }

    #[test]
    fn looping_list_of_unspawnable_items_terminates() {
        let mut backend = FakeBackend::default();
        backend.unspawnable.extend(["A", "B"]);
        let mut p = PlaylistSequencer::new(vec!["A", "B"], true);

        assert!(!p.play(&mut backend));
        assert_eq!(p.current_index(), None);
    }

    #[test]
    fn empty_playlist_never_plays() {
        let mut backend = FakeBackend::default();
        let mut p: PlaylistSequencer<&'static str, u32> = PlaylistSequencer::default();
        assert!(!p.play(&mut backend));
        assert!(!p.tick(1.0, &mut backend));
    }
}
