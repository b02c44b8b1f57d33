//! Registry and per-frame driver of live effect tasks.
//!
//! One scheduler exists per context (usually per world). It owns the effect
//! table, the resource loader and the live task list, and is the only place
//! tasks are created, advanced and retired.

use bevy::log::{debug, info, warn};

use crate::data::{EffectId, EffectTable};
use crate::error::EffectError;
use crate::loader::{AsyncResolver, DEFAULT_RETRY_LIMIT, LoadStatus, ResourceLoader};
use crate::task::{BlendAccumulator, EffectResource, EffectTask, TaskTick};

pub struct EffectScheduler<R: EffectResource> {
    table: EffectTable,
    loader: ResourceLoader<R>,
    /// Sorted ascending by priority; equal priorities keep insertion order.
    tasks: Vec<EffectTask<R::Instance>>,
    /// Delta of the most recent advancing update, used to predict deletion.
    last_delta: f32,
}

impl<R: EffectResource> std::fmt::Debug for EffectScheduler<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectScheduler")
            .field("rows", &self.table.len())
            .field("loader", &self.loader)
            .field("tasks", &self.tasks)
            .finish()
    }
}

impl<R: EffectResource> EffectScheduler<R> {
    pub fn new(table: EffectTable) -> Self {
        Self::with_retry_limit(table, DEFAULT_RETRY_LIMIT)
    }

    pub fn with_retry_limit(table: EffectTable, retry_limit: u32) -> Self {
        Self {
            table,
            loader: ResourceLoader::new(retry_limit),
            tasks: Vec::new(),
            last_delta: 0.0,
        }
    }

    pub fn live_tasks(&self) -> &[EffectTask<R::Instance>] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    // ---------------------------------------------------------------------
    // Resource loading
    // ---------------------------------------------------------------------

    /// Queue every row's resource, in table order. Returns how many were queued.
    pub fn seed_loads(&mut self) -> usize {
        let mut queued = 0;
        for row in self.table.iter() {
            if row.resource.is_null() {
                warn!("Effect {} has no resource; it will never be playable", row.id);
                continue;
            }
            if self.loader.enqueue(row.id.clone(), row.resource.clone()) {
                queued += 1;
            }
        }
        info!("Queued {} effect resources for loading", queued);
        queued
    }

    /// Queue (or re-queue after failure) the resource for a single id.
    pub fn request_load(&mut self, id: &EffectId) -> Result<bool, EffectError> {
        let row = self
            .table
            .get(id)
            .ok_or_else(|| EffectError::ConfigNotFound(id.clone()))?;
        Ok(self.loader.enqueue(row.id.clone(), row.resource.clone()))
    }

    /// Apply finished loads and start the next one.
    pub fn update_loads(&mut self, resolver: &mut impl AsyncResolver<R>) {
        self.loader.update(resolver);
    }

    pub fn load_status(&self, id: &EffectId) -> LoadStatus {
        self.loader.status(id)
    }

    // ---------------------------------------------------------------------
    // Playback
    // ---------------------------------------------------------------------

    /// Start the effect `id`.
    pub fn start(&mut self, id: &EffectId) -> Result<(), EffectError> {
        self.start_with(id, |_| {})
    }

    /// Start the effect `id`, running `init` on its fresh instance before it
    /// is ever ticked.
    ///
    /// On failure nothing is inserted and the scheduler is unchanged.
    pub fn start_with<F>(&mut self, id: &EffectId, init: F) -> Result<(), EffectError>
    where
        F: FnOnce(&mut R::Instance),
    {
        let row = self
            .table
            .get(id)
            .ok_or_else(|| EffectError::ConfigNotFound(id.clone()))?
            .clone();

        if !row.has_valid_duration() {
            return Err(EffectError::InvalidDuration {
                id: id.clone(),
                duration: row.duration,
            });
        }

        let Some(resource) = self.loader.get(id) else {
            return Err(match self.loader.status(id) {
                LoadStatus::Failed => EffectError::ResourceLoadFailed(id.clone()),
                _ => EffectError::ResourceNotReady(id.clone()),
            });
        };

        let mut task = EffectTask::new(row);
        task.activate_with(resource, init)?;

        self.tasks.push(task);
        // Stable: equal priorities keep insertion order.
        self.tasks.sort_by_key(|t| t.priority());
        debug!("Started effect {} ({} live)", id, self.tasks.len());
        Ok(())
    }

    /// [`start`](Self::start), logging the failure and reducing it to a bool.
    pub fn play_effect(&mut self, id: &EffectId) -> bool {
        Self::report(self.start(id))
    }

    /// [`start_with`](Self::start_with), logging the failure and reducing it to a bool.
    pub fn play_effect_with<F>(&mut self, id: &EffectId, init: F) -> bool
    where
        F: FnOnce(&mut R::Instance),
    {
        Self::report(self.start_with(id, init))
    }

    fn report(result: Result<(), EffectError>) -> bool {
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!("Effect playback rejected: {}", err);
                false
            }
        }
    }

    /// Whether a live task for `id` will survive the next frame, assuming it
    /// lasts as long as the previous one.
    pub fn is_playing(&self, id: &EffectId) -> bool {
        self.is_playing_within(id, self.last_delta)
    }

    /// Whether a live task for `id` will survive one more tick of `next_delta`.
    pub fn is_playing_within(&self, id: &EffectId, next_delta: f32) -> bool {
        self.tasks
            .iter()
            .any(|t| t.id() == id && !t.is_scheduled_for_deletion(next_delta))
    }

    /// Advance every live task once, in ascending priority order.
    ///
    /// `target` is the frame's view target. When it is unavailable the frame
    /// is skipped entirely and no task time advances. Finished tasks are
    /// removed during the same pass. Returns how many tasks finished.
    pub fn update<A>(&mut self, delta: f32, target: Option<&mut A>) -> usize
    where
        A: BlendAccumulator<R::Instance>,
    {
        let Some(accumulator) = target else {
            return 0;
        };
        self.last_delta = delta;

        let mut finished = 0;
        self.tasks.retain_mut(|task| match task.tick(&mut *accumulator, delta) {
            TaskTick::Progress => true,
            TaskTick::Finish => {
                debug!("Effect {} finished", task.id());
                finished += 1;
                false
            }
        });
        finished
    }

    /// Remove every live task for `id`, releasing their instances now.
    pub fn cancel(&mut self, id: &EffectId) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id() != id);
        before - self.tasks.len()
    }

    /// Remove every live task.
    pub fn stop_all(&mut self) {
        self.tasks.clear();
    }

    /// Cancel any in-flight load and drop every live task.
    pub fn shutdown(&mut self, resolver: &mut impl AsyncResolver<R>) {
        self.loader.cancel(resolver);
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use bevy::math::Vec4;

    use super::*;
    use crate::data::{EffectRow, ResourceRef};
    use crate::loader::{LoadReply, LoadTicket};
    use crate::task::EffectInstance;
    use crate::task::tests::{FakeInstance, FakeResource, RecordingAccumulator};

    /// Resolves everything except paths starting with `broken` or `empty`.
    #[derive(Default)]
    struct TestResolver {
        issued: usize,
        cancelled: Vec<LoadTicket>,
    }

    impl AsyncResolver<FakeResource> for TestResolver {
        fn request(&mut self, resource: &ResourceRef, reply: LoadReply<FakeResource>) {
            self.issued += 1;
            if resource.path().starts_with("broken") {
                reply.fail("not found");
            } else if resource.path().starts_with("empty") {
                reply.succeed(FakeResource(None));
            } else {
                reply.succeed(FakeResource(Some(FakeInstance::default())));
            }
        }

        fn cancel(&mut self, ticket: LoadTicket) {
            self.cancelled.push(ticket);
        }
    }

    fn scheduler(rows: Vec<EffectRow>) -> (EffectScheduler<FakeResource>, TestResolver) {
        let table = EffectTable::from_rows(rows).unwrap();
        let mut scheduler = EffectScheduler::new(table);
        let mut resolver = TestResolver::default();
        scheduler.seed_loads();
        // Each resolve is answered on the following update.
        for _ in 0..32 {
            scheduler.update_loads(&mut resolver);
        }
        (scheduler, resolver)
    }

    fn id(name: &str) -> EffectId {
        EffectId::from(name)
    }

    #[test]
    fn flash_runs_for_exactly_its_duration() {
        let (mut s, _) = scheduler(vec![
            EffectRow::new("flash", "flash.ron", 2.0).with_weight(1.0),
        ]);
        let mut acc = RecordingAccumulator::default();

        assert!(s.start(&id("flash")).is_ok());
        assert_eq!(s.update(1.0, Some(&mut acc)), 0);
        assert_eq!(s.len(), 1);
        assert_eq!(s.update(1.0, Some(&mut acc)), 1);
        assert!(s.is_empty());

        s.update(1.0, Some(&mut acc));
        assert_eq!(acc.submissions.len(), 2);
    }

    #[test]
    fn unknown_id_leaves_live_tasks_untouched() {
        let (mut s, _) = scheduler(vec![EffectRow::new("flash", "flash.ron", 2.0)]);
        assert_eq!(s.len(), 0);
        assert_eq!(
            s.start(&id("missing")),
            Err(EffectError::ConfigNotFound(id("missing")))
        );
        assert!(!s.play_effect(&id("missing")));
        assert_eq!(s.len(), 0);
    }

    #[test]
    fn non_positive_duration_is_rejected_before_resource_work() {
        let (mut s, _) = scheduler(vec![EffectRow::new("zero", "zero.ron", 0.0)]);
        assert!(matches!(
            s.start(&id("zero")),
            Err(EffectError::InvalidDuration { .. })
        ));
        assert!(s.is_empty());
    }

    #[test]
    fn unresolved_resource_fails_fast() {
        let table = EffectTable::from_rows(vec![EffectRow::new("a", "a.ron", 1.0)]).unwrap();
        let mut s: EffectScheduler<FakeResource> = EffectScheduler::new(table);
        assert_eq!(s.start(&id("a")), Err(EffectError::ResourceNotReady(id("a"))));

        s.seed_loads();
        assert_eq!(s.start(&id("a")), Err(EffectError::ResourceNotReady(id("a"))));
        assert!(s.is_empty());
    }

    #[test]
    fn exhausted_retries_block_playback() {
        let (mut s, resolver) = scheduler(vec![EffectRow::new("bad", "broken.ron", 1.0)]);
        assert_eq!(resolver.issued, 4);
        assert_eq!(s.load_status(&id("bad")), LoadStatus::Failed);
        for _ in 0..3 {
            assert_eq!(s.start(&id("bad")), Err(EffectError::ResourceLoadFailed(id("bad"))));
        }
    }

    #[test]
    fn activation_failure_inserts_nothing() {
        let (mut s, _) = scheduler(vec![EffectRow::new("hollow", "empty.ron", 1.0)]);
        assert_eq!(s.load_status(&id("hollow")), LoadStatus::Ready);
        assert_eq!(
            s.start(&id("hollow")),
            Err(EffectError::ActivationFailed(id("hollow")))
        );
        assert!(s.is_empty());
    }

    #[test]
    fn repeated_starts_reuse_the_cached_resource() {
        let (mut s, mut resolver) = scheduler(vec![EffectRow::new("a", "a.ron", 1.0)]);
        let issued = resolver.issued;
        assert!(s.start(&id("a")).is_ok());
        assert!(s.start(&id("a")).is_ok());
        s.update_loads(&mut resolver);
        assert_eq!(resolver.issued, issued);
        assert_eq!(s.len(), 2);
    }

    #[test]
    fn ticks_in_ascending_priority_order() {
        let (mut s, _) = scheduler(vec![
            EffectRow::new("p3", "p3.ron", 5.0).with_priority(3),
            EffectRow::new("p1", "p1.ron", 5.0).with_priority(1),
            EffectRow::new("p2", "p2.ron", 5.0).with_priority(2),
        ]);
        for name in ["p3", "p1", "p2"] {
            s.start(&id(name)).unwrap();
        }

        let mut acc = RecordingAccumulator::default();
        s.update(0.1, Some(&mut acc));
        let order: Vec<i32> = acc.submissions.iter().map(|(_, _, p)| *p).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn equal_priorities_tick_in_insertion_order() {
        let (mut s, _) = scheduler(vec![
            EffectRow::new("first", "first.ron", 5.0),
            EffectRow::new("second", "second.ron", 5.0),
            EffectRow::new("early", "early.ron", 5.0).with_priority(-1),
        ]);
        s.start(&id("first")).unwrap();
        s.start(&id("second")).unwrap();
        s.start(&id("early")).unwrap();

        let mut acc = RecordingAccumulator::default();
        s.update(0.1, Some(&mut acc));
        let order: Vec<_> = acc.submissions.iter().map(|(id, _, _)| id.as_str().to_string()).collect();
        assert_eq!(order, vec!["early", "first", "second"]);
    }

    #[test]
    fn finished_tasks_are_removed_mid_pass_without_skipping_others() {
        let (mut s, _) = scheduler(vec![
            EffectRow::new("short", "short.ron", 0.5).with_priority(0),
            EffectRow::new("long", "long.ron", 5.0).with_priority(1),
            EffectRow::new("shorter", "shorter.ron", 0.25).with_priority(2),
        ]);
        for name in ["short", "long", "shorter"] {
            s.start(&id(name)).unwrap();
        }

        let mut acc = RecordingAccumulator::default();
        assert_eq!(s.update(0.5, Some(&mut acc)), 2);
        assert_eq!(acc.submissions.len(), 3);
        let live: Vec<_> = s.live_tasks().iter().map(|t| t.id().as_str().to_string()).collect();
        assert_eq!(live, vec!["long"]);
    }

    #[test]
    fn missing_target_skips_the_frame_without_advancing_time() {
        let (mut s, _) = scheduler(vec![EffectRow::new("a", "a.ron", 1.0)]);
        s.start(&id("a")).unwrap();

        assert_eq!(s.update::<RecordingAccumulator>(5.0, None), 0);
        assert_eq!(s.live_tasks()[0].elapsed(), 0.0);

        let mut acc = RecordingAccumulator::default();
        s.update(0.5, Some(&mut acc));
        assert_eq!(s.live_tasks()[0].elapsed(), 0.5);
    }

    #[test]
    fn is_playing_predicts_the_next_frame() {
        let (mut s, _) = scheduler(vec![EffectRow::new("a", "a.ron", 1.0)]);
        s.start(&id("a")).unwrap();
        assert!(s.is_playing(&id("a")));

        let mut acc = RecordingAccumulator::default();
        s.update(0.5, Some(&mut acc));
        // Another 0.5s frame would finish it.
        assert!(!s.is_playing(&id("a")));
        assert!(s.is_playing_within(&id("a"), 0.1));
        assert!(!s.is_playing(&id("other")));
    }

    #[test]
    fn init_callback_overrides_per_activation() {
        let (mut s, _) = scheduler(vec![EffectRow::new("a", "a.ron", 1.0)]);
        assert!(s.play_effect_with(&id("a"), |i| i.set_vector("Color", Vec4::ONE)));
        assert!(s.play_effect(&id("a")));

        let tasks = s.live_tasks();
        assert_eq!(tasks[0].instance().unwrap().vectors.get("Color"), Some(&Vec4::ONE));
        assert!(tasks[1].instance().unwrap().vectors.is_empty());
    }

    #[test]
    fn cancel_removes_only_matching_tasks() {
        let (mut s, _) = scheduler(vec![
            EffectRow::new("a", "a.ron", 1.0),
            EffectRow::new("b", "b.ron", 1.0),
        ]);
        s.start(&id("a")).unwrap();
        s.start(&id("b")).unwrap();
        s.start(&id("a")).unwrap();

        assert_eq!(s.cancel(&id("a")), 2);
        assert_eq!(s.len(), 1);
        assert_eq!(s.cancel(&id("a")), 0);
    }

    #[test]
    fn shutdown_cancels_loads_and_clears_tasks() {
        let table = EffectTable::from_rows(vec![
            EffectRow::new("a", "a.ron", 1.0),
            EffectRow::new("b", "b.ron", 1.0),
        ])
        .unwrap();
        let mut s: EffectScheduler<FakeResource> = EffectScheduler::new(table);
        let mut resolver = TestResolver::default();
        s.seed_loads();
        s.update_loads(&mut resolver);
        s.update_loads(&mut resolver);
        s.start(&id("a")).unwrap();

        // "b" is now in flight.
        s.shutdown(&mut resolver);
        assert!(s.is_empty());
        assert_eq!(resolver.cancelled.len(), 1);
        s.update_loads(&mut resolver);
        assert_eq!(s.load_status(&id("b")), LoadStatus::Unrequested);
    }

    #[test]
    fn request_load_requeues_after_failure() {
        let (mut s, mut resolver) = scheduler(vec![EffectRow::new("bad", "broken.ron", 1.0)]);
        assert_eq!(s.request_load(&id("bad")), Ok(true));
        s.update_loads(&mut resolver);
        assert_eq!(s.load_status(&id("bad")), LoadStatus::Loading);
        assert!(matches!(
            s.request_load(&id("nope")),
            Err(EffectError::ConfigNotFound(_))
        ));
    }
}
