//! Sequential asynchronous resource resolution.
//!
//! The loader resolves one resource at a time, in FIFO order. Resolution is
//! delegated to an [`AsyncResolver`], which answers through a [`LoadReply`].
//! Replies travel over a channel and are only applied on the next
//! [`ResourceLoader::update`], never inside the call that issued the request.

use std::collections::{HashMap, HashSet, VecDeque};

use bevy::log::{debug, error, warn};
use crossbeam_channel::{Receiver, Sender};

use crate::data::{EffectId, ResourceRef};

/// Failed resolutions retried before an id is given up on.
pub const DEFAULT_RETRY_LIMIT: u32 = 3;

/// Identifies one issued resolve. A retry gets a fresh ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LoadTicket(u64);

#[derive(Debug)]
struct LoadCompletion<R> {
    ticket: LoadTicket,
    result: Result<R, String>,
}

/// One-shot reply handle given to the resolver with each request.
///
/// Consuming `self` guarantees a single answer per request. Dropping it
/// without answering leaves the request pending until it is cancelled.
#[derive(Debug)]
pub struct LoadReply<R> {
    ticket: LoadTicket,
    sender: Sender<LoadCompletion<R>>,
}

impl<R> LoadReply<R> {
    /// The attempt this reply answers.
    pub fn ticket(&self) -> LoadTicket {
        self.ticket
    }

    /// Deliver the resolved resource.
    pub fn succeed(self, resource: R) {
        self.send(Ok(resource));
    }

    /// Report a failed attempt. The loader decides whether to retry.
    pub fn fail(self, reason: impl Into<String>) {
        self.send(Err(reason.into()));
    }

    fn send(self, result: Result<R, String>) {
        // The loader owns the receiver; a send can only fail after it is dropped.
        let _ = self.sender.send(LoadCompletion {
            ticket: self.ticket,
            result,
        });
    }
}

/// External asynchronous loading facility.
pub trait AsyncResolver<R> {
    /// Start resolving `resource`. Answer later through `reply`.
    fn request(&mut self, resource: &ResourceRef, reply: LoadReply<R>);

    /// Abandon the request identified by `ticket`.
    fn cancel(&mut self, _ticket: LoadTicket) {}
}

/// Resolution state of a single id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadStatus {
    Unrequested,
    Queued,
    Loading,
    Ready,
    Failed,
}

/// Resolved resources by id. Append-only: nothing is evicted.
#[derive(Debug)]
pub struct ResourceCache<R> {
    entries: HashMap<EffectId, R>,
}

impl<R> Default for ResourceCache<R> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<R> ResourceCache<R> {
    /// The resolved resource for `id`, if any.
    pub fn get(&self, id: &EffectId) -> Option<&R> {
        self.entries.get(id)
    }

    /// Whether `id` has been resolved.
    pub fn contains(&self, id: &EffectId) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of resolved ids.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, id: EffectId, resource: R) {
        self.entries.insert(id, resource);
    }
}

#[derive(Debug, Clone)]
struct PendingLoad {
    id: EffectId,
    resource: ResourceRef,
}

#[derive(Debug)]
struct InFlight {
    load: PendingLoad,
    ticket: LoadTicket,
}

/// FIFO queue feeding a [`ResourceCache`], one resolve in flight at a time.
pub struct ResourceLoader<R> {
    queue: VecDeque<PendingLoad>,
    in_flight: Option<InFlight>,
    failures: HashMap<EffectId, u32>,
    failed: HashSet<EffectId>,
    cache: ResourceCache<R>,
    retry_limit: u32,
    next_ticket: u64,
    sender: Sender<LoadCompletion<R>>,
    receiver: Receiver<LoadCompletion<R>>,
}

impl<R> Default for ResourceLoader<R> {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_LIMIT)
    }
}

impl<R> std::fmt::Debug for ResourceLoader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceLoader")
            .field("queued", &self.queue.len())
            .field("in_flight", &self.in_flight.as_ref().map(|i| &i.load.id))
            .field("cached", &self.cache.len())
            .field("failed", &self.failed.len())
            .finish()
    }
}

impl<R> ResourceLoader<R> {
    pub fn new(retry_limit: u32) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            queue: VecDeque::new(),
            in_flight: None,
            failures: HashMap::new(),
            failed: HashSet::new(),
            cache: ResourceCache::default(),
            retry_limit,
            next_ticket: 1,
            sender,
            receiver,
        }
    }

    /// Everything resolved so far.
    pub fn cache(&self) -> &ResourceCache<R> {
        &self.cache
    }

    /// Shorthand for `cache().get(id)`.
    pub fn get(&self, id: &EffectId) -> Option<&R> {
        self.cache.get(id)
    }

    /// Where `id` is in its resolution. A cached id is always `Ready`.
    pub fn status(&self, id: &EffectId) -> LoadStatus {
        if self.cache.contains(id) {
            LoadStatus::Ready
        } else if self.in_flight.as_ref().is_some_and(|i| &i.load.id == id) {
            LoadStatus::Loading
        } else if self.queue.iter().any(|p| &p.id == id) {
            LoadStatus::Queued
        } else if self.failed.contains(id) {
            LoadStatus::Failed
        } else {
            LoadStatus::Unrequested
        }
    }

    /// True when nothing is queued or in flight.
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.in_flight.is_none()
    }

    /// Queue `id` for resolution.
    ///
    /// No-op (returns false) if the id is already resolved, queued or in
    /// flight. An id that previously exhausted its retries is given a fresh
    /// retry budget.
    pub fn enqueue(&mut self, id: EffectId, resource: ResourceRef) -> bool {
        match self.status(&id) {
            LoadStatus::Ready | LoadStatus::Queued | LoadStatus::Loading => return false,
            LoadStatus::Failed => {
                self.failed.remove(&id);
                self.failures.remove(&id);
            }
            LoadStatus::Unrequested => {}
        }
        self.queue.push_back(PendingLoad { id, resource });
        true
    }

    /// Apply replies received since the last call, then start the next
    /// queued resolve if nothing is in flight.
    pub fn update(&mut self, resolver: &mut impl AsyncResolver<R>) {
        // Collect first: replies sent while handling these wait for the next update.
        let completions: Vec<_> = self.receiver.try_iter().collect();
        for completion in completions {
            self.complete(completion, resolver);
        }
        self.process_next(resolver);
    }

    /// Pop the queue head and issue its resolve, unless one is in flight.
    pub fn process_next(&mut self, resolver: &mut impl AsyncResolver<R>) {
        if self.in_flight.is_some() {
            return;
        }
        while let Some(load) = self.queue.pop_front() {
            if self.cache.contains(&load.id) {
                continue;
            }
            self.issue(load, resolver);
            return;
        }
    }

    /// Cancel the in-flight resolve and drop everything still queued.
    ///
    /// A reply to the cancelled request is discarded if it arrives later.
    /// Dropped ids forget their failures, so a later enqueue gets a full
    /// retry budget.
    pub fn cancel(&mut self, resolver: &mut impl AsyncResolver<R>) {
        if let Some(in_flight) = self.in_flight.take() {
            debug!("Cancelling resource load for {}", in_flight.load.id);
            resolver.cancel(in_flight.ticket);
            self.failures.remove(&in_flight.load.id);
        }
        for load in self.queue.drain(..) {
            self.failures.remove(&load.id);
        }
    }

    fn issue(&mut self, load: PendingLoad, resolver: &mut impl AsyncResolver<R>) {
        let ticket = LoadTicket(self.next_ticket);
        self.next_ticket += 1;
        let reply = LoadReply {
            ticket,
            sender: self.sender.clone(),
        };
        debug!("Resolving {} for {}", load.resource, load.id);
        resolver.request(&load.resource, reply);
        self.in_flight = Some(InFlight { load, ticket });
    }

    fn complete(&mut self, completion: LoadCompletion<R>, resolver: &mut impl AsyncResolver<R>) {
        let matches = self
            .in_flight
            .as_ref()
            .is_some_and(|i| i.ticket == completion.ticket);
        if !matches {
            debug!("Discarding stale load reply {:?}", completion.ticket);
            return;
        }
        let Some(InFlight { load, .. }) = self.in_flight.take() else {
            return;
        };

        match completion.result {
            Ok(resource) => {
                debug!("Resolved {} for {}", load.resource, load.id);
                self.failures.remove(&load.id);
                self.cache.insert(load.id, resource);
            }
            Err(reason) => {
                let failures = self.failures.entry(load.id.clone()).or_insert(0);
                *failures += 1;
                if *failures <= self.retry_limit {
                    warn!(
                        "Failed to resolve {} for {} ({}), retry {}/{}",
                        load.resource, load.id, reason, failures, self.retry_limit
                    );
                    self.issue(load, resolver);
                } else {
                    error!(
                        "Giving up on {} for {} after {} attempts: {}",
                        load.resource, load.id, failures, reason
                    );
                    self.failed.insert(load.id);
                }
            }
        }
    }
}
