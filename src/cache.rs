use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::fetcher::encode_query;

type CachedValue = Arc<dyn Any + Send + Sync>;
type FetchSource = Arc<dyn Fn() -> Result<CachedValue, ApiError> + Send + Sync>;
type Outcome = Result<CachedValue, ApiError>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(path: impl AsRef<str>) -> Self {
        CacheKey(path.as_ref().trim_start_matches('/').to_string())
    }

    pub fn with_query<I, K, V>(path: impl AsRef<str>, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let mut params: Vec<(String, String)> = params
            .into_iter()
            .map(|(name, value)| (name.into(), value.to_string()))
            .collect();
        params.sort();
        let base = Self::new(path);
        match encode_query(&params) {
            Some(query) if !params.is_empty() => CacheKey(format!("{}?{query}", base.0)),
            _ => base,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn path(&self) -> &str {
        self.0.split('?').next().unwrap_or_default()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub revalidate_on_focus: bool,
    pub revalidate_on_reconnect: bool,
    pub revalidate_if_stale: bool,
    pub retry_on_error: bool,
    pub terminal_statuses: Vec<u16>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            revalidate_on_focus: true,
            revalidate_on_reconnect: true,
            revalidate_if_stale: true,
            retry_on_error: true,
            terminal_statuses: Vec::new(),
        }
    }
}

impl CachePolicy {
    pub fn immutable() -> Self {
        Self {
            revalidate_on_focus: false,
            revalidate_on_reconnect: false,
            revalidate_if_stale: false,
            ..Self::default()
        }
    }

    pub fn with_terminal_status(mut self, status: u16) -> Self {
        if !self.terminal_statuses.contains(&status) {
            self.terminal_statuses.push(status);
        }
        self
    }

    fn should_retry(&self, err: &ApiError) -> bool {
        if !self.retry_on_error {
            return false;
        }
        match err.status() {
            Some(status) => !self.terminal_statuses.contains(&status),
            None => err.is_retryable(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub dedupe_interval: Duration,
    pub error_retry_count: u32,
    pub error_retry_interval: Duration,
    pub fetch_parallelism: usize,
    pub evict_unsubscribed: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for CacheOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            dedupe_interval: config.dedupe_interval,
            error_retry_count: config.error_retry_count,
            error_retry_interval: config.error_retry_interval,
            fetch_parallelism: config.fetch_parallelism,
            evict_unsubscribed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    Loading(CacheKey),
    Updated(CacheKey),
    Failed(CacheKey),
    Cleared,
}

pub struct ResourceSpec<T> {
    key: Option<CacheKey>,
    depends_on: Option<CacheKey>,
    policy: CachePolicy,
    source: Arc<dyn Fn() -> Result<T, ApiError> + Send + Sync>,
}

impl<T: Send + Sync + 'static> ResourceSpec<T> {
    pub fn new(
        key: Option<CacheKey>,
        source: impl Fn() -> Result<T, ApiError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            key,
            depends_on: None,
            policy: CachePolicy::default(),
            source: Arc::new(source),
        }
    }

    pub fn depends_on(mut self, dependency: CacheKey) -> Self {
        self.depends_on = Some(dependency);
        self
    }

    pub fn policy(mut self, policy: CachePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn key(&self) -> Option<&CacheKey> {
        self.key.as_ref()
    }

    fn erased_source(&self) -> FetchSource {
        let source = Arc::clone(&self.source);
        Arc::new(move || source().map(|value| Arc::new(value) as CachedValue))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState<T> {
    pub data: Option<T>,
    pub error: Option<ApiError>,
    pub is_loading: bool,
    pub is_validating: bool,
}

impl<T> ResourceState<T> {
    fn idle() -> Self {
        Self {
            data: None,
            error: None,
            is_loading: false,
            is_validating: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Auto,
    Mutation,
}

struct Inflight {
    seq: u64,
    trigger: Trigger,
    waiters: Vec<Sender<Outcome>>,
}

struct CacheEntry {
    value: Option<CachedValue>,
    error: Option<ApiError>,
    inflight: Option<Inflight>,
    applied_seq: u64,
    last_started: Option<Instant>,
    subscribers: HashMap<u64, Sender<CacheEvent>>,
    source: Option<FetchSource>,
    policy: CachePolicy,
    depends_on: Option<CacheKey>,
}

impl CacheEntry {
    fn new() -> Self {
        Self {
            value: None,
            error: None,
            inflight: None,
            applied_seq: 0,
            last_started: None,
            subscribers: HashMap::new(),
            source: None,
            policy: CachePolicy::default(),
            depends_on: None,
        }
    }

    fn notify(&self, event: &CacheEvent) {
        for tx in self.subscribers.values() {
            let _ = tx.send(event.clone());
        }
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    waiting_on: HashMap<CacheKey, Vec<CacheKey>>,
    next_seq: u64,
    next_subscriber: u64,
}

impl CacheState {
    fn has_value(&self, key: &CacheKey) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.value.is_some())
    }

    fn wait_for(&mut self, dependency: &CacheKey, key: &CacheKey) {
        let waiting = self.waiting_on.entry(dependency.clone()).or_default();
        if !waiting.contains(key) {
            waiting.push(key.clone());
        }
    }
}

struct Job {
    key: CacheKey,
    seq: u64,
    attempt: u32,
    source: FetchSource,
}

struct Shared {
    state: Mutex<CacheState>,
    options: CacheOptions,
    pool: Option<rayon::ThreadPool>,
}

#[derive(Clone)]
pub struct CacheService {
    shared: Arc<Shared>,
}

impl fmt::Debug for CacheService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheService")
            .field("options", &self.shared.options)
            .finish_non_exhaustive()
    }
}

impl CacheService {
    pub fn new(options: CacheOptions) -> Self {
        let pool = build_fetch_pool(options.fetch_parallelism);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(CacheState::default()),
                options,
                pool,
            }),
        }
    }

    pub fn options(&self) -> &CacheOptions {
        &self.shared.options
    }

    pub fn subscribe<T>(&self, spec: ResourceSpec<T>) -> Resource<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let Some(key) = spec.key.clone() else {
            return Resource {
                cache: self.clone(),
                key: None,
                subscriber: None,
                events: rx,
                _marker: PhantomData,
            };
        };

        let (subscriber, job) = {
            let mut guard = self.lock();
            let state = &mut *guard;
            state.next_subscriber += 1;
            let subscriber = state.next_subscriber;

            let entry = state
                .entries
                .entry(key.clone())
                .or_insert_with(CacheEntry::new);
            entry.source = Some(spec.erased_source());
            entry.policy = spec.policy.clone();
            entry.depends_on = spec.depends_on.clone();
            entry.subscribers.insert(subscriber, tx);
            let has_value = entry.value.is_some();

            let blocked_on = spec
                .depends_on
                .as_ref()
                .filter(|dependency| !state.has_value(dependency));
            let job = if let Some(dependency) = blocked_on {
                debug!(%key, %dependency, "deferring fetch until dependency resolves");
                state.wait_for(dependency, &key);
                None
            } else if has_value && !spec.policy.revalidate_if_stale {
                None
            } else {
                self.begin(state, &key, Trigger::Auto, 0, None)
            };
            (subscriber, job)
        };

        if let Some(job) = job {
            self.launch(job);
        }

        Resource {
            cache: self.clone(),
            key: Some(key),
            subscriber: Some(subscriber),
            events: rx,
            _marker: PhantomData,
        }
    }

    pub fn revalidate(&self, key: &CacheKey) -> Revalidation {
        let (tx, rx) = mpsc::channel();
        let job = {
            let mut guard = self.lock();
            self.begin(&mut guard, key, Trigger::Mutation, 0, Some(tx))
        };
        if let Some(job) = job {
            self.launch(job);
        }
        Revalidation { rx: Some(rx) }
    }

    pub fn revalidate_where(&self, filter: impl Fn(&CacheKey) -> bool) -> Vec<Revalidation> {
        let keys: Vec<CacheKey> = {
            let guard = self.lock();
            guard
                .entries
                .iter()
                .filter(|(key, entry)| entry.source.is_some() && filter(key))
                .map(|(key, _)| key.clone())
                .collect()
        };
        keys.iter().map(|key| self.revalidate(key)).collect()
    }

    pub fn on_focus(&self) {
        self.revalidate_subscribed(|policy| policy.revalidate_on_focus);
    }

    pub fn on_reconnect(&self) {
        self.revalidate_subscribed(|policy| policy.revalidate_on_reconnect);
    }

    /// Forgets all cached values (logout). Subscriptions stay registered but
    /// lose their source, so nothing refetches until the key is subscribed
    /// again. Requests still in flight are discarded when they land.
    pub fn clear(&self) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.waiting_on.clear();
        state
            .entries
            .retain(|_, entry| !entry.subscribers.is_empty());
        let fence = state.next_seq;
        for entry in state.entries.values_mut() {
            entry.value = None;
            entry.error = None;
            entry.inflight = None;
            entry.applied_seq = fence;
            entry.last_started = None;
            entry.source = None;
            entry.depends_on = None;
            entry.notify(&CacheEvent::Cleared);
        }
        debug!(entries = state.entries.len(), "cache cleared");
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().has_value(key)
    }

    pub fn subscriber_count(&self, key: &CacheKey) -> usize {
        self.lock()
            .entries
            .get(key)
            .map_or(0, |entry| entry.subscribers.len())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.shared.state.lock().expect("cache lock poisoned")
    }

    fn revalidate_subscribed(&self, allowed: impl Fn(&CachePolicy) -> bool) {
        let jobs: Vec<Job> = {
            let mut guard = self.lock();
            let state = &mut *guard;
            let keys: Vec<CacheKey> = state
                .entries
                .iter()
                .filter(|(_, entry)| !entry.subscribers.is_empty() && allowed(&entry.policy))
                .filter(|(_, entry)| {
                    entry
                        .depends_on
                        .as_ref()
                        .is_none_or(|dependency| state.has_value(dependency))
                })
                .map(|(key, _)| key.clone())
                .collect();
            keys.iter()
                .filter_map(|key| self.begin(state, key, Trigger::Auto, 0, None))
                .collect()
        };
        for job in jobs {
            self.launch(job);
        }
    }

    /// Starts a request for `key`, or joins the one already running.
    ///
    /// Automatic triggers join any in-flight request; a mutation joins only
    /// another mutation and otherwise supersedes the running request. A
    /// request issued before the last applied write is never joined.
    fn begin(
        &self,
        state: &mut CacheState,
        key: &CacheKey,
        trigger: Trigger,
        attempt: u32,
        waiter: Option<Sender<Outcome>>,
    ) -> Option<Job> {
        let dedupe_interval = self.shared.options.dedupe_interval;
        let entry = state.entries.get_mut(key)?;
        let source = entry.source.clone()?;
        let applied_seq = entry.applied_seq;

        if let Some(inflight) = entry.inflight.as_mut() {
            let join = inflight.seq > applied_seq
                && match trigger {
                    Trigger::Auto => true,
                    Trigger::Mutation => inflight.trigger == Trigger::Mutation,
                };
            if join {
                inflight.waiters.extend(waiter);
                return None;
            }
        } else if trigger == Trigger::Auto
            && attempt == 0
            && entry
                .last_started
                .is_some_and(|started| started.elapsed() < dedupe_interval)
        {
            return None;
        }

        state.next_seq += 1;
        let seq = state.next_seq;
        let mut waiters = entry
            .inflight
            .take()
            .map(|superseded| superseded.waiters)
            .unwrap_or_default();
        waiters.extend(waiter);
        entry.inflight = Some(Inflight {
            seq,
            trigger,
            waiters,
        });
        entry.last_started = Some(Instant::now());
        entry.notify(&CacheEvent::Loading(key.clone()));

        Some(Job {
            key: key.clone(),
            seq,
            attempt,
            source,
        })
    }

    fn launch(&self, job: Job) {
        let service = self.clone();
        let task = move || {
            let result = (job.source)();
            service.complete(job.key, job.seq, job.attempt, result);
        };
        match self.shared.pool.as_ref() {
            Some(pool) => pool.spawn(task),
            None => {
                thread::spawn(task);
            }
        }
    }

    fn complete(&self, key: CacheKey, seq: u64, attempt: u32, result: Outcome) {
        let mut follow_up = Vec::new();
        let mut retry = None;
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            let Some(entry) = state.entries.get_mut(&key) else {
                debug!(%key, seq, "discarding completion for evicted key");
                return;
            };

            let current = entry
                .inflight
                .as_ref()
                .is_some_and(|inflight| inflight.seq == seq);
            let waiters = if current {
                entry
                    .inflight
                    .take()
                    .map(|inflight| inflight.waiters)
                    .unwrap_or_default()
            } else {
                Vec::new()
            };

            if seq <= entry.applied_seq {
                debug!(%key, seq, applied = entry.applied_seq, "discarding stale completion");
                let latest = match (&entry.value, &entry.error) {
                    (_, Some(err)) => Err(err.clone()),
                    (Some(value), None) => Ok(Arc::clone(value)),
                    (None, None) => Err(ApiError::Transport("request superseded".to_string())),
                };
                for waiter in waiters {
                    let _ = waiter.send(latest.clone());
                }
                if current {
                    entry.notify(&CacheEvent::Updated(key.clone()));
                }
                return;
            }

            entry.applied_seq = seq;
            match &result {
                Ok(value) => {
                    entry.value = Some(Arc::clone(value));
                    entry.error = None;
                    entry.notify(&CacheEvent::Updated(key.clone()));
                    if let Some(dependents) = state.waiting_on.remove(&key) {
                        for dependent in dependents {
                            follow_up.extend(self.begin(state, &dependent, Trigger::Auto, 0, None));
                        }
                    }
                }
                Err(err) => {
                    warn!(%key, attempt, "revalidation failed: {err}");
                    entry.error = Some(err.clone());
                    entry.notify(&CacheEvent::Failed(key.clone()));
                    if !entry.subscribers.is_empty()
                        && entry.policy.should_retry(err)
                        && attempt < self.shared.options.error_retry_count
                    {
                        retry = Some(attempt + 1);
                    }
                }
            }

            for waiter in waiters {
                let _ = waiter.send(result.clone());
            }
        }

        for job in follow_up {
            self.launch(job);
        }
        if let Some(attempt) = retry {
            self.schedule_retry(key, attempt);
        }
    }

    fn schedule_retry(&self, key: CacheKey, attempt: u32) {
        let delay = backoff_delay(self.shared.options.error_retry_interval, attempt);
        debug!(%key, attempt, ?delay, "scheduling retry");
        let service = self.clone();
        thread::spawn(move || {
            thread::sleep(delay);
            let job = {
                let mut guard = service.lock();
                let still_failing = guard
                    .entries
                    .get(&key)
                    .is_some_and(|entry| entry.error.is_some() && !entry.subscribers.is_empty());
                if !still_failing {
                    return;
                }
                service.begin(&mut guard, &key, Trigger::Auto, attempt, None)
            };
            if let Some(job) = job {
                service.launch(job);
            }
        });
    }

    fn optimistic_write(&self, key: &CacheKey, value: CachedValue) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(entry) = state.entries.get_mut(key) else {
            return;
        };
        state.next_seq += 1;
        entry.applied_seq = state.next_seq;
        entry.value = Some(value);
        entry.error = None;
        entry.notify(&CacheEvent::Updated(key.clone()));
    }

    fn unsubscribe(&self, key: &CacheKey, subscriber: u64) {
        let mut guard = self.lock();
        let state = &mut *guard;
        let Some(entry) = state.entries.get_mut(key) else {
            return;
        };
        entry.subscribers.remove(&subscriber);
        if entry.subscribers.is_empty() && self.shared.options.evict_unsubscribed {
            state.entries.remove(key);
            for waiting in state.waiting_on.values_mut() {
                waiting.retain(|pending| pending != key);
            }
        }
    }
}

/// Exponential backoff with jitter: `interval * 2^attempt * [0.5, 1.5)`.
fn backoff_delay(interval: Duration, attempt: u32) -> Duration {
    let exponent = attempt.min(8);
    let jitter = rand::thread_rng().gen_range(0.5..1.5);
    interval.mul_f64(jitter * f64::from(1u32 << exponent))
}

fn build_fetch_pool(threads: usize) -> Option<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|idx| format!("cache-fetch-{idx}"))
        .build()
        .ok()
}

fn downcast<T: Clone + 'static>(value: &CachedValue) -> Option<T> {
    let any: &(dyn Any + Send + Sync) = value.as_ref();
    any.downcast_ref::<T>().cloned()
}

#[derive(Debug)]
pub struct Revalidation {
    rx: Option<Receiver<Outcome>>,
}

impl Revalidation {
    pub fn wait(self, timeout: Duration) -> Result<(), ApiError> {
        self.recv(timeout).map(|_| ())
    }

    fn recv(self, timeout: Duration) -> Result<Option<CachedValue>, ApiError> {
        let Some(rx) = self.rx else {
            return Ok(None);
        };
        match rx.recv_timeout(timeout) {
            Ok(outcome) => outcome.map(Some),
            Err(RecvTimeoutError::Timeout) => Err(ApiError::Transport(
                "timed out waiting for revalidation".to_string(),
            )),
            Err(RecvTimeoutError::Disconnected) => Ok(None),
        }
    }
}

pub struct Pending<T> {
    inner: Revalidation,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Clone + 'static> Pending<T> {
    pub fn wait(self, timeout: Duration) -> Result<Option<T>, ApiError> {
        Ok(self
            .inner
            .recv(timeout)?
            .as_ref()
            .and_then(downcast::<T>))
    }
}

pub struct Resource<T> {
    cache: CacheService,
    key: Option<CacheKey>,
    subscriber: Option<u64>,
    events: Receiver<CacheEvent>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Clone + Send + Sync + 'static> Resource<T> {
    pub fn key(&self) -> Option<&CacheKey> {
        self.key.as_ref()
    }

    pub fn state(&self) -> ResourceState<T> {
        let Some(key) = &self.key else {
            return ResourceState::idle();
        };
        let guard = self.cache.lock();
        let Some(entry) = guard.entries.get(key) else {
            return ResourceState::idle();
        };
        let data = entry.value.as_ref().and_then(downcast::<T>);
        let is_validating = entry.inflight.is_some();
        ResourceState {
            is_loading: is_validating && data.is_none(),
            is_validating,
            data,
            error: entry.error.clone(),
        }
    }

    pub fn data(&self) -> Option<T> {
        self.state().data
    }

    pub fn mutate(&self) -> Pending<T> {
        let inner = match &self.key {
            Some(key) => self.cache.revalidate(key),
            None => Revalidation { rx: None },
        };
        Pending {
            inner,
            _marker: PhantomData,
        }
    }

    pub fn mutate_with(&self, value: T) -> Pending<T> {
        if let Some(key) = &self.key {
            self.cache.optimistic_write(key, Arc::new(value));
        }
        self.mutate()
    }

    pub fn events(&self) -> &Receiver<CacheEvent> {
        &self.events
    }

    pub fn wait_until(
        &self,
        timeout: Duration,
        predicate: impl Fn(&ResourceState<T>) -> bool,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if predicate(&self.state()) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            match self.events.recv_timeout(deadline - now) {
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return predicate(&self.state());
                }
            }
        }
    }

    pub fn wait_for_data(&self, timeout: Duration) -> Option<T> {
        self.wait_until(timeout, |state| state.data.is_some());
        self.data()
    }
}

impl<T> Drop for Resource<T> {
    fn drop(&mut self) {
        if let (Some(key), Some(subscriber)) = (&self.key, self.subscriber) {
            self.cache.unsubscribe(key, subscriber);
        }
    }
}
