//! Bounded pool of live backend channels
//!
//! `ResourcePool<F>` hands out channels produced by a [`ChannelFactory`].
//! Capacity is enforced with a semaphore holding `max_size` permits: every
//! outstanding [`Lease`] owns one permit, so a caller that finds the pool at
//! capacity waits on the semaphore (never polls) until a lease is released,
//! discarded, or the pool is closed.
//!
//! Idle channels are kept in return order. Channels idle past `max_idle` are
//! closed lazily the next time someone acquires, or by an explicit
//! [`ResourcePool::evict_idle`] sweep.

use std::collections::VecDeque;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, info, trace, warn};

/// Default number of channels opened when a pool is warmed up
pub const DEFAULT_INITIAL_SIZE: usize = 5;
/// Default upper bound on live channels
pub const DEFAULT_MAX_SIZE: usize = 10;

/// Pool sizing and timeouts
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PoolConfig {
    /// Channels opened by `warm_up`
    #[serde(default = "default_initial_size")]
    pub initial_size: usize,
    /// Maximum number of live channels (idle + active)
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// How long `acquire` waits for capacity (None = forever)
    #[serde(default)]
    #[serde(with = "humantime_serde")]
    pub max_wait: Option<Duration>,
    /// Idle channels older than this are closed instead of reused
    #[serde(default)]
    #[serde(with = "humantime_serde")]
    pub max_idle: Option<Duration>,
}

fn default_initial_size() -> usize {
    DEFAULT_INITIAL_SIZE
}

fn default_max_size() -> usize {
    DEFAULT_MAX_SIZE
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_SIZE, DEFAULT_MAX_SIZE)
    }
}

impl PoolConfig {
    pub fn new(initial_size: usize, max_size: usize) -> Self {
        Self {
            initial_size,
            max_size,
            max_wait: None,
            max_idle: None,
        }
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    pub fn with_max_idle(mut self, max_idle: Duration) -> Self {
        self.max_idle = Some(max_idle);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_size == 0 {
            return Err("pool max_size must be greater than 0".to_string());
        }
        if self.max_size > Semaphore::MAX_PERMITS {
            return Err(format!(
                "pool max_size ({}) must not exceed {}",
                self.max_size,
                Semaphore::MAX_PERMITS
            ));
        }
        if self.initial_size > self.max_size {
            return Err(format!(
                "pool initial_size ({}) must not exceed max_size ({})",
                self.initial_size, self.max_size
            ));
        }
        Ok(())
    }
}

/// Pool failures, generic over the factory's error type
#[derive(Error, Debug)]
pub enum PoolError<E> {
    #[error("Pool exhausted: all {max_size} channels are in use")]
    Exhausted { max_size: usize },

    #[error("Timed out after {waited:?} waiting for a pooled channel")]
    Timeout { waited: Duration },

    #[error("Pool is closed")]
    Closed,

    #[error("Failed to create pooled channel: {0}")]
    Factory(#[source] E),
}

/// Backend-specific constructor for pooled channels
#[async_trait]
pub trait ChannelFactory: Send + Sync + 'static {
    type Channel: Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open one live channel
    async fn create(&self) -> Result<Self::Channel, Self::Error>;

    /// Close a channel the pool no longer wants
    ///
    /// Default implementation drops it
    async fn destroy(&self, channel: Self::Channel) -> Result<(), Self::Error> {
        drop(channel);
        Ok(())
    }
}

/// Lifecycle of a pooled channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Idle,
    Active,
    Closed,
}

/// One live channel plus its bookkeeping
#[derive(Debug)]
pub struct PooledResource<T> {
    value: T,
    state: ResourceState,
    last_returned_at: Instant,
}

impl<T> PooledResource<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            state: ResourceState::Active,
            last_returned_at: Instant::now(),
        }
    }

    fn is_expired(&self, max_idle: Option<Duration>) -> bool {
        max_idle.is_some_and(|max_idle| self.last_returned_at.elapsed() > max_idle)
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    pub fn last_returned_at(&self) -> Instant {
        self.last_returned_at
    }
}

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub active: usize,
    pub idle: usize,
    pub max_size: usize,
    pub closed: bool,
}

struct PoolState<T> {
    /// Oldest return first
    idle: VecDeque<PooledResource<T>>,
    active: usize,
    closed: bool,
}

struct Shared<T> {
    state: Mutex<PoolState<T>>,
    permits: Arc<Semaphore>,
}

/// Capacity held by one outstanding lease
///
/// Dropping it decrements the active count and hands the permit back.
struct Slot<T> {
    shared: Arc<Shared<T>>,
    permit: Option<OwnedSemaphorePermit>,
}

impl<T> Slot<T> {
    fn vacate(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.shared.state.lock().active -= 1;
            drop(permit);
        }
    }
}

impl<T> Drop for Slot<T> {
    fn drop(&mut self) {
        self.vacate();
    }
}

/// A channel borrowed from the pool
///
/// Hand it back with [`ResourcePool::release`], or [`ResourcePool::discard`]
/// it after an I/O failure. A lease that is simply dropped frees its
/// capacity and drops the channel without returning it.
pub struct Lease<T> {
    resource: PooledResource<T>,
    slot: Slot<T>,
}

impl<T> Lease<T> {
    pub fn state(&self) -> ResourceState {
        self.resource.state
    }
}

impl<T> Deref for Lease<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.resource.value
    }
}

impl<T> DerefMut for Lease<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.resource.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Lease<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("value", &self.resource.value)
            .field("state", &self.resource.state)
            .finish()
    }
}

/// Generic bounded pool of channels
pub struct ResourcePool<F: ChannelFactory> {
    factory: F,
    config: PoolConfig,
    shared: Arc<Shared<F::Channel>>,
}

impl<F: ChannelFactory> ResourcePool<F> {
    /// Create an empty pool; call [`warm_up`](Self::warm_up) to pre-open channels
    pub fn new(factory: F, config: PoolConfig) -> Result<Self, String> {
        config.validate()?;

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                active: 0,
                closed: false,
            }),
            permits: Arc::new(Semaphore::new(config.max_size)),
        });

        Ok(Self {
            factory,
            config,
            shared,
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.shared.state.lock();
        PoolStatus {
            active: state.active,
            idle: state.idle.len(),
            max_size: self.config.max_size,
            closed: state.closed,
        }
    }

    /// Open channels until `initial_size` exist, returning how many were created
    pub async fn warm_up(&self) -> Result<usize, PoolError<F::Error>> {
        let mut created = 0;

        loop {
            let permit = {
                let mut state = self.shared.state.lock();
                if state.closed {
                    return Err(PoolError::Closed);
                }
                if state.idle.len() + state.active >= self.config.initial_size {
                    break;
                }
                match self.shared.permits.clone().try_acquire_owned() {
                    Ok(permit) => {
                        state.active += 1;
                        permit
                    }
                    Err(_) => break,
                }
            };

            let slot = Slot {
                shared: self.shared.clone(),
                permit: Some(permit),
            };
            let value = self.factory.create().await.map_err(PoolError::Factory)?;
            self.release(Lease {
                resource: PooledResource::new(value),
                slot,
            })
            .await;
            created += 1;
        }

        debug!("Pool warmed up with {} new channel(s)", created);
        Ok(created)
    }

    /// Borrow a channel, waiting up to the configured `max_wait`
    pub async fn acquire(&self) -> Result<Lease<F::Channel>, PoolError<F::Error>> {
        self.acquire_within(self.config.max_wait).await
    }

    /// Borrow a channel, waiting at most `wait` regardless of configuration
    pub async fn acquire_timeout(
        &self,
        wait: Duration,
    ) -> Result<Lease<F::Channel>, PoolError<F::Error>> {
        self.acquire_within(Some(wait)).await
    }

    /// Borrow a channel without waiting for capacity
    pub async fn try_acquire(&self) -> Result<Lease<F::Channel>, PoolError<F::Error>> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        let permit = match self.shared.permits.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                return Err(PoolError::Exhausted {
                    max_size: self.config.max_size,
                })
            }
            Err(TryAcquireError::Closed) => return Err(PoolError::Closed),
        };

        self.checkout(permit).await
    }

    async fn acquire_within(
        &self,
        wait: Option<Duration>,
    ) -> Result<Lease<F::Channel>, PoolError<F::Error>> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }

        let permits = self.shared.permits.clone();
        let permit = match wait {
            Some(wait) => match tokio::time::timeout(wait, permits.acquire_owned()).await {
                Ok(permit) => permit.map_err(|_| PoolError::Closed)?,
                Err(_) => {
                    debug!("Timed out after {:?} waiting for a channel", wait);
                    return Err(PoolError::Timeout { waited: wait });
                }
            },
            None => permits.acquire_owned().await.map_err(|_| PoolError::Closed)?,
        };

        self.checkout(permit).await
    }

    /// Turn a permit into a lease: reuse the freshest idle channel or create one
    async fn checkout(
        &self,
        permit: OwnedSemaphorePermit,
    ) -> Result<Lease<F::Channel>, PoolError<F::Error>> {
        let (reused, expired) = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Err(PoolError::Closed);
            }

            let mut expired = Vec::new();
            while state
                .idle
                .front()
                .is_some_and(|res| res.is_expired(self.config.max_idle))
            {
                if let Some(res) = state.idle.pop_front() {
                    expired.push(res);
                }
            }

            let reused = state.idle.pop_back();
            state.active += 1;
            (reused, expired)
        };

        let slot = Slot {
            shared: self.shared.clone(),
            permit: Some(permit),
        };

        if !expired.is_empty() {
            debug!("Evicting {} idle channel(s) past max_idle", expired.len());
            self.destroy_all(expired).await;
        }

        let mut resource = match reused {
            Some(resource) => {
                trace!("Reusing idle channel");
                resource
            }
            None => {
                debug!("Opening new pooled channel");
                // `slot` drops on failure, giving the capacity back
                let value = self.factory.create().await.map_err(PoolError::Factory)?;
                PooledResource::new(value)
            }
        };
        resource.state = ResourceState::Active;

        Ok(Lease { resource, slot })
    }

    /// Return a healthy channel to the idle set
    pub async fn release(&self, lease: Lease<F::Channel>) {
        debug_assert!(Arc::ptr_eq(&lease.slot.shared, &self.shared));
        let Lease {
            mut resource,
            mut slot,
        } = lease;

        let rejected = {
            let mut state = self.shared.state.lock();
            if state.closed {
                Some(resource)
            } else {
                resource.state = ResourceState::Idle;
                resource.last_returned_at = Instant::now();
                state.idle.push_back(resource);
                // Hand the permit back in the same critical section so a
                // woken waiter always finds this channel idle
                state.active -= 1;
                drop(slot.permit.take());
                None
            }
        };

        match rejected {
            Some(resource) => {
                slot.vacate();
                self.destroy(resource).await;
            }
            None => trace!("Channel returned to pool"),
        }
    }

    /// Close a channel the caller found defective and free its capacity
    pub async fn discard(&self, lease: Lease<F::Channel>) {
        debug_assert!(Arc::ptr_eq(&lease.slot.shared, &self.shared));
        let Lease { resource, mut slot } = lease;
        debug!("Discarding defective channel");
        self.destroy(resource).await;
        slot.vacate();
    }

    /// Close every idle channel past `max_idle`, returning how many were closed
    pub async fn evict_idle(&self) -> usize {
        let expired: Vec<_> = {
            let mut state = self.shared.state.lock();
            let (expired, kept): (Vec<_>, Vec<_>) = state
                .idle
                .drain(..)
                .partition(|res| res.is_expired(self.config.max_idle));
            state.idle.extend(kept);
            expired
        };

        let count = expired.len();
        if count > 0 {
            debug!("Evicted {} idle channel(s)", count);
            self.destroy_all(expired).await;
        }
        count
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Close all idle channels and refuse further acquires
    ///
    /// Leases still outstanding are closed when they come back. Every idle
    /// channel is attempted; the first close failure is returned.
    pub async fn close(&self) -> Result<(), PoolError<F::Error>> {
        let drained: Vec<_> = {
            let mut state = self.shared.state.lock();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            state.idle.drain(..).collect()
        };
        self.shared.permits.close();

        info!("Closing pool with {} idle channel(s)", drained.len());

        let mut first_error = None;
        for mut resource in drained {
            resource.state = ResourceState::Closed;
            if let Err(e) = self.factory.destroy(resource.value).await {
                if first_error.is_none() {
                    first_error = Some(e);
                } else {
                    warn!("Additional failure closing pooled channel: {}", e);
                }
            }
        }

        match first_error {
            Some(e) => Err(PoolError::Factory(e)),
            None => Ok(()),
        }
    }

    async fn destroy(&self, mut resource: PooledResource<F::Channel>) {
        resource.state = ResourceState::Closed;
        if let Err(e) = self.factory.destroy(resource.value).await {
            warn!("Failed to close pooled channel: {}", e);
        }
    }

    async fn destroy_all(&self, resources: Vec<PooledResource<F::Channel>>) {
        for resource in resources {
            self.destroy(resource).await;
        }
    }
}
