//! Bounded, blocking connection pool.
//!
//! # Design
//! One mutex guards the idle queue and the count of loaned handles; one
//! condition variable wakes waiters when a handle comes back or a slot frees
//! up. `outstanding + idle <= max_size` holds at every point where the lock
//! is released.
//!
//! `acquire` hands out a `PooledConnection` guard. The guard owns the handle
//! while it is on loan and gives it back exactly once, on drop, on every exit
//! path. A guard marked broken (after a transport failure) destroys its
//! handle instead of returning it to the idle queue.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::{MqError, Result};
use crate::transport::{Connection, Connector};

struct IdleConnection<T> {
    connection: T,
    since: Instant,
}

struct PoolState<T> {
    idle: VecDeque<IdleConnection<T>>,
    outstanding: usize,
    closed: bool,
}

/// Point-in-time view of pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub outstanding: usize,
    pub idle: usize,
    pub max_size: usize,
}

pub struct ConnectionPool<C: Connector> {
    connector: C,
    max_size: usize,
    connect_timeout: Duration,
    idle_timeout: Duration,
    state: Mutex<PoolState<C::Connection>>,
    available: Condvar,
}

impl<C: Connector> ConnectionPool<C> {
    /// `connect_timeout` bounds how long `acquire` waits for a free handle.
    pub fn new(connector: C, max_size: usize, connect_timeout: Duration, idle_timeout: Duration) -> Self {
        Self {
            connector,
            max_size: max_size.max(1),
            connect_timeout,
            idle_timeout,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                outstanding: 0,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Borrow a connection, waiting at most the configured connect timeout.
    pub fn acquire(&self) -> Result<PooledConnection<'_, C>> {
        self.acquire_until(Instant::now() + self.connect_timeout)
    }

    /// Borrow a connection, waiting until `deadline` at the latest.
    ///
    /// Reuses the most recently returned idle handle that is still alive and
    /// fresh, otherwise creates a new one if the pool is below its maximum,
    /// otherwise blocks. Fails with `PoolExhausted` when the deadline passes.
    pub fn acquire_until(&self, deadline: Instant) -> Result<PooledConnection<'_, C>> {
        let started = Instant::now();
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(MqError::PoolClosed);
            }

            while let Some(idle) = state.idle.pop_back() {
                if idle.since.elapsed() <= self.idle_timeout && idle.connection.is_alive() {
                    state.outstanding += 1;
                    tracing::trace!(outstanding = state.outstanding, "reusing pooled connection");
                    return Ok(PooledConnection::new(self, idle.connection));
                }
                tracing::trace!("dropping stale pooled connection");
            }

            if state.outstanding < self.max_size {
                // Reserve the slot, then connect without holding the lock.
                state.outstanding += 1;
                drop(state);
                return match self.connector.connect() {
                    Ok(connection) => {
                        tracing::trace!("opened new pooled connection");
                        Ok(PooledConnection::new(self, connection))
                    }
                    Err(e) => {
                        self.free_slot();
                        Err(e)
                    }
                };
            }

            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(max_size = self.max_size, waited = ?started.elapsed(), "connection pool exhausted");
                return Err(MqError::PoolExhausted {
                    waited: started.elapsed(),
                });
            }
            state = match self.available.wait_timeout(state, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Close the pool: idle handles are destroyed, waiters and later callers
    /// get `PoolClosed`, loaned handles are destroyed when returned.
    pub fn shutdown(&self) {
        let drained: Vec<_> = {
            let mut state = self.lock();
            state.closed = true;
            state.idle.drain(..).collect()
        };
        tracing::debug!(closed_idle = drained.len(), "connection pool shut down");
        drop(drained);
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn status(&self) -> PoolStatus {
        let state = self.lock();
        PoolStatus {
            outstanding: state.outstanding,
            idle: state.idle.len(),
            max_size: self.max_size,
        }
    }

    fn release(&self, connection: C::Connection, reusable: bool) {
        let mut state = self.lock();
        state.outstanding -= 1;
        if reusable && !state.closed && state.outstanding + state.idle.len() < self.max_size {
            state.idle.push_back(IdleConnection {
                connection,
                since: Instant::now(),
            });
            tracing::trace!(outstanding = state.outstanding, idle = state.idle.len(), "connection returned to pool");
        } else {
            drop(state);
            drop(connection);
            tracing::trace!(reusable, "connection discarded");
        }
        self.available.notify_one();
    }

    fn free_slot(&self) {
        self.lock().outstanding -= 1;
        self.available.notify_one();
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<C::Connection>> {
        // Pool state stays consistent across a panic in a borrower, so a
        // poisoned lock is safe to keep using.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<C: Connector> Drop for ConnectionPool<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A connection on loan from a `ConnectionPool`.
pub struct PooledConnection<'a, C: Connector> {
    pool: &'a ConnectionPool<C>,
    connection: Option<C::Connection>,
    reusable: bool,
}

impl<'a, C: Connector> PooledConnection<'a, C> {
    fn new(pool: &'a ConnectionPool<C>, connection: C::Connection) -> Self {
        Self {
            pool,
            connection: Some(connection),
            reusable: true,
        }
    }

    /// Destroy the handle on release instead of recycling it.
    pub fn mark_broken(&mut self) {
        self.reusable = false;
    }

    pub fn is_reusable(&self) -> bool {
        self.reusable
    }
}

impl<C: Connector> Deref for PooledConnection<'_, C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        // Only `drop` takes the connection out.
        match &self.connection {
            Some(connection) => connection,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<C: Connector> DerefMut for PooledConnection<'_, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.connection {
            Some(connection) => connection,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<C: Connector> Drop for PooledConnection<'_, C> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.pool.release(connection, self.reusable);
        }
    }
}
