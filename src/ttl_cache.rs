use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::remote::{LeagueParams, RemoteClient};

pub const WEEK: Duration = Duration::from_secs(60 * 60 * 24 * 7);
const LEAGUE_CAPACITY: usize = 50;
const PLAYER_CAPACITY: usize = 100;

pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    offset: Cell<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Cell::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.offset.set(self.offset.get() + by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.offset.get()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

struct Slot<V> {
    value: V,
    inserted_at: Instant,
}

/// Bounded map whose entries expire `ttl` after insertion. At capacity the
/// oldest insertion is evicted.
pub struct TtlCache<K, V, C = SystemClock> {
    ttl: Duration,
    capacity: usize,
    clock: C,
    slots: HashMap<K, Slot<V>>,
    order: VecDeque<K>,
}

impl<K, V> TtlCache<K, V, SystemClock>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self::with_clock(capacity, ttl, SystemClock)
    }
}

impl<K, V, C> TtlCache<K, V, C>
where
    K: Eq + Hash + Clone,
    V: Clone,
    C: Clock,
{
    pub fn with_clock(capacity: usize, ttl: Duration, clock: C) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            clock,
            slots: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn get(&mut self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let expired = match self.slots.get(key) {
            Some(slot) => now.duration_since(slot.inserted_at) >= self.ttl,
            None => return None,
        };
        if expired {
            self.remove(key);
            return None;
        }
        self.slots.get(key).map(|slot| slot.value.clone())
    }

    pub fn insert(&mut self, key: K, value: V) {
        let now = self.clock.now();
        if self.slots.contains_key(&key) {
            self.remove(&key);
        }
        self.purge_expired(now);
        while self.slots.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.slots.remove(&oldest);
        }
        self.order.push_back(key.clone());
        self.slots.insert(
            key,
            Slot {
                value,
                inserted_at: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.order.clear();
    }

    fn remove(&mut self, key: &K) {
        self.slots.remove(key);
        self.order.retain(|k| k != key);
    }

    fn purge_expired(&mut self, now: Instant) {
        let ttl = self.ttl;
        self.slots
            .retain(|_, slot| now.duration_since(slot.inserted_at) < ttl);
        let slots = &self.slots;
        self.order.retain(|k| slots.contains_key(k));
    }
}

/// Memoizes league and player fetches of an inner client. Failures are never
/// cached; round fetches pass straight through.
pub struct CachedClient<R, C = SystemClock> {
    inner: R,
    leagues: RefCell<TtlCache<(u64, LeagueParams), Value, C>>,
    players: RefCell<TtlCache<u64, Value, C>>,
}

impl<R: RemoteClient> CachedClient<R, SystemClock> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            leagues: RefCell::new(TtlCache::new(LEAGUE_CAPACITY, WEEK)),
            players: RefCell::new(TtlCache::new(PLAYER_CAPACITY, WEEK)),
        }
    }
}

impl<R: RemoteClient, C: Clock + Clone> CachedClient<R, C> {
    pub fn with_clock(inner: R, ttl: Duration, clock: C) -> Self {
        Self {
            inner,
            leagues: RefCell::new(TtlCache::with_clock(LEAGUE_CAPACITY, ttl, clock.clone())),
            players: RefCell::new(TtlCache::with_clock(PLAYER_CAPACITY, ttl, clock)),
        }
    }
}

impl<R, C> CachedClient<R, C> {
    pub fn inner(&self) -> &R {
        &self.inner
    }
}

impl<R: RemoteClient, C: Clock> RemoteClient for CachedClient<R, C> {
    fn fetch_player(&self, id: u64) -> Result<Value> {
        if let Some(hit) = self.players.borrow_mut().get(&id) {
            debug!(player_id = id, "player served from memory cache");
            return Ok(hit);
        }
        let value = self.inner.fetch_player(id)?;
        self.players.borrow_mut().insert(id, value.clone());
        Ok(value)
    }

    fn fetch_league(&self, id: u64, params: &LeagueParams) -> Result<Value> {
        let key = (id, params.clone());
        if let Some(hit) = self.leagues.borrow_mut().get(&key) {
            debug!(league_id = id, "league served from memory cache");
            return Ok(hit);
        }
        let value = self.inner.fetch_league(id, params)?;
        self.leagues.borrow_mut().insert(key, value.clone());
        Ok(value)
    }

    fn fetch_round(&self, url: &str) -> Result<Value> {
        self.inner.fetch_round(url)
    }

    fn time_zone(&self) -> &str {
        self.inner.time_zone()
    }
}
