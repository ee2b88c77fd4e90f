//! Keyed LRU connection pool with TTL and disposal hooks.
//!
//! The pool owns upstream client lifetimes: nothing else closes a pooled
//! client. Concurrent acquires for one key coalesce on a single in-flight
//! factory; acquires for different keys never wait on each other.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::client::McpClient;
use super::Connector;
use crate::config::{DEFAULT_POOL_CAPACITY, DEFAULT_POOL_TTL};
use crate::error::Result;
use crate::types::{ConnectionKey, ServerDescriptor};

pub type SharedClient = Arc<Mutex<McpClient>>;

/// Invoked for every evicted entry, exactly once. The default closes the
/// underlying client, logging and swallowing any error.
pub type DisposalHook = Arc<dyn Fn(SharedClient) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub capacity: usize,
    pub ttl: std::time::Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_POOL_CAPACITY,
            ttl: DEFAULT_POOL_TTL,
        }
    }
}

struct PoolEntry {
    client: SharedClient,
    created_at: Instant,
    last_used_at: Instant,
}

enum SlotState {
    Ready(PoolEntry),
    /// A factory is in flight; waiters queue on the flight lock.
    Pending(Arc<Mutex<()>>),
}

enum Gate {
    Ready(SharedClient),
    Wait(Arc<Mutex<()>>),
    Build,
}

pub struct ClientPool {
    slots: StdMutex<HashMap<ConnectionKey, SlotState>>,
    disposals: StdMutex<Vec<JoinHandle<()>>>,
    on_dispose: DisposalHook,
    config: PoolConfig,
}

impl ClientPool {
    pub fn new(config: PoolConfig) -> Self {
        let config = PoolConfig {
            capacity: config.capacity.max(1),
            ..config
        };
        Self {
            slots: StdMutex::new(HashMap::new()),
            disposals: StdMutex::new(Vec::new()),
            on_dispose: default_disposal_hook(),
            config,
        }
    }

    pub fn with_disposal_hook(mut self, hook: DisposalHook) -> Self {
        self.on_dispose = hook;
        self
    }

    /// Number of live (ready) clients.
    pub fn size(&self) -> usize {
        self.slots
            .lock()
            .expect("pool mutex should lock")
            .values()
            .filter(|slot| matches!(slot, SlotState::Ready(_)))
            .count()
    }

    pub fn contains(&self, key: &ConnectionKey) -> bool {
        matches!(
            self.slots
                .lock()
                .expect("pool mutex should lock")
                .get(key),
            Some(SlotState::Ready(_))
        )
    }

    /// Return a live client for `key`, creating it via `factory` on demand.
    ///
    /// A factory error propagates to its caller and leaves the key
    /// unpopulated; coalesced waiters then race to run their own factory.
    pub async fn acquire<F, Fut>(&self, key: &ConnectionKey, factory: F) -> Result<SharedClient>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<McpClient>> + Send,
    {
        let _flight_guard = loop {
            let mut stale: Option<PoolEntry> = None;
            let gate = {
                let mut slots = self.slots.lock().expect("pool mutex should lock");
                match slots.get_mut(key) {
                    Some(SlotState::Ready(entry))
                        if entry.created_at.elapsed() <= self.config.ttl =>
                    {
                        entry.last_used_at = Instant::now();
                        Gate::Ready(Arc::clone(&entry.client))
                    }
                    Some(SlotState::Ready(_)) => {
                        if let Some(SlotState::Ready(entry)) = slots.remove(key) {
                            stale = Some(entry);
                        }
                        Gate::Build
                    }
                    Some(SlotState::Pending(flight)) => Gate::Wait(Arc::clone(flight)),
                    None => Gate::Build,
                }
            };

            // A TTL-expired predecessor is disposed off the acquire path,
            // exactly once, whichever task wins the rebuild race.
            if let Some(entry) = stale.take() {
                self.spawn_disposal(entry.client);
            }

            match gate {
                Gate::Ready(client) => return Ok(client),
                Gate::Wait(flight) => {
                    // Queue behind the in-flight factory, then re-check.
                    drop(flight.lock().await);
                    continue;
                }
                Gate::Build => {
                    let flight = Arc::new(Mutex::new(()));
                    let guard = Arc::clone(&flight)
                        .try_lock_owned()
                        .expect("fresh flight lock is uncontended");
                    let mut slots = self.slots.lock().expect("pool mutex should lock");
                    match slots.get(key) {
                        // Someone else won the race to build; wait on them.
                        Some(SlotState::Pending(_)) | Some(SlotState::Ready(_)) => continue,
                        None => {
                            slots.insert(key.clone(), SlotState::Pending(flight));
                            break guard;
                        }
                    }
                }
            }
        };

        let client = match factory().await {
            Ok(client) => Arc::new(Mutex::new(client)),
            Err(error) => {
                self.slots
                    .lock()
                    .expect("pool mutex should lock")
                    .remove(key);
                return Err(error);
            }
        };

        // Make room, closing each LRU victim before the new slot goes in.
        loop {
            let victim = {
                let mut slots = self.slots.lock().expect("pool mutex should lock");
                let ready_count = slots
                    .values()
                    .filter(|slot| matches!(slot, SlotState::Ready(_)))
                    .count();
                if ready_count < self.config.capacity {
                    slots.insert(
                        key.clone(),
                        SlotState::Ready(PoolEntry {
                            client: Arc::clone(&client),
                            created_at: Instant::now(),
                            last_used_at: Instant::now(),
                        }),
                    );
                    None
                } else {
                    let lru_key = slots
                        .iter()
                        .filter_map(|(k, slot)| match slot {
                            SlotState::Ready(entry) => Some((k.clone(), entry.last_used_at)),
                            SlotState::Pending(_) => None,
                        })
                        .min_by_key(|(_, last_used)| *last_used)
                        .map(|(k, _)| k);
                    lru_key.and_then(|k| match slots.remove(&k) {
                        Some(SlotState::Ready(entry)) => Some(entry),
                        _ => None,
                    })
                }
            };
            match victim {
                None => break,
                Some(entry) => (self.on_dispose)(entry.client).await,
            }
        }

        Ok(client)
    }

    /// Acquire a client for `server` through the given connector.
    pub async fn acquire_for(
        &self,
        server: &ServerDescriptor,
        connector: &Connector,
    ) -> Result<SharedClient> {
        let key = server.key();
        let connect = connector(server);
        self.acquire(&key, move || connect).await
    }

    /// Drop a pooled client (e.g. after a transport error) so the next
    /// acquire recreates it.
    pub fn discard(&self, key: &ConnectionKey) {
        let removed = {
            let mut slots = self.slots.lock().expect("pool mutex should lock");
            match slots.remove(key) {
                Some(SlotState::Ready(entry)) => Some(entry),
                Some(pending @ SlotState::Pending(_)) => {
                    // An in-flight factory is not ours to discard.
                    slots.insert(key.clone(), pending);
                    None
                }
                None => None,
            }
        };
        if let Some(entry) = removed {
            self.spawn_disposal(entry.client);
        }
    }

    /// Evict everything and await all outstanding disposals.
    pub async fn clear(&self) {
        let entries: Vec<PoolEntry> = {
            let mut slots = self.slots.lock().expect("pool mutex should lock");
            let keys: Vec<ConnectionKey> = slots.keys().cloned().collect();
            keys.into_iter()
                .filter_map(|k| match slots.remove(&k) {
                    Some(SlotState::Ready(entry)) => Some(entry),
                    _ => None,
                })
                .collect()
        };
        for entry in entries {
            (self.on_dispose)(entry.client).await;
        }

        let handles: Vec<JoinHandle<()>> = self
            .disposals
            .lock()
            .expect("disposal mutex should lock")
            .drain(..)
            .collect();
        for handle in handles {
            let _ = handle.await;
        }
    }

    fn spawn_disposal(&self, client: SharedClient) {
        let dispose = (self.on_dispose)(client);
        let handle = tokio::spawn(dispose);
        self.disposals
            .lock()
            .expect("disposal mutex should lock")
            .push(handle);
    }
}

impl Default for ClientPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

fn default_disposal_hook() -> DisposalHook {
    Arc::new(|client: SharedClient| {
        Box::pin(async move {
            let mut client = client.lock().await;
            if let Err(error) = client.close().await {
                tracing::warn!(%error, "pooled client close failed");
            }
        })
    })
}
