//! Client session bookkeeping.
//!
//! A session is nothing more than a remote address. It becomes active the
//! first time one of its datagrams reaches a handler, and it only stays
//! active while heartbeats keep arriving: `sweep` drops every address whose
//! last heartbeat is older than the timeout, and an address that never sent
//! a heartbeat counts as infinitely stale.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpSession {
    pub address: SocketAddr,
    pub last_heartbeat: Option<Instant>,
}

#[derive(Debug, Default)]
struct Sessions {
    active: HashSet<SocketAddr>,
    last_heartbeats: HashMap<SocketAddr, Instant>,
}

/// Lock-protected set of known clients and their heartbeat times.
///
/// Every operation takes the single inner lock once, so no caller ever
/// observes a half-applied update.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<Sessions>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Sessions> {
        // The maps stay structurally valid even if a holder panicked.
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Marks `addr` as active. Returns `true` if it was not known before.
    pub fn touch(&self, addr: SocketAddr) -> bool {
        let added = self.lock().active.insert(addr);
        if added {
            info!(%addr, "new client added");
        }
        added
    }

    pub fn heartbeat(&self, addr: SocketAddr) {
        self.heartbeat_at(addr, Instant::now());
    }

    pub fn heartbeat_at(&self, addr: SocketAddr, at: Instant) {
        let _ = self.lock().last_heartbeats.insert(addr, at);
        debug!(%addr, "heart beat");
    }

    /// Forgets `addr` entirely. Unknown addresses are ignored.
    pub fn remove(&self, addr: SocketAddr) -> bool {
        let mut sessions = self.lock();
        let was_active = sessions.active.remove(&addr);
        let had_heartbeat = sessions.last_heartbeats.remove(&addr).is_some();
        was_active || had_heartbeat
    }

    /// Evicts every session whose last heartbeat is at least `timeout` old.
    ///
    /// Afterwards the active set is exactly the set of addresses that still
    /// hold a heartbeat time. Returns the addresses that went offline.
    pub fn sweep(&self, timeout: Duration, now: Instant) -> Vec<SocketAddr> {
        let mut sessions = self.lock();

        sessions.last_heartbeats.retain(|_, last| {
            // a heartbeat stamped after `now` counts as fresh
            now.saturating_duration_since(*last) < timeout
        });

        let Sessions {
            active,
            last_heartbeats,
        } = &mut *sessions;

        let mut evicted: Vec<SocketAddr> = active
            .iter()
            .filter(|addr| !last_heartbeats.contains_key(*addr))
            .copied()
            .collect();
        evicted.sort();

        *active = last_heartbeats.keys().copied().collect();
        drop(sessions);

        for addr in &evicted {
            info!(%addr, "client lost connection");
        }

        evicted
    }

    pub fn count(&self) -> usize {
        self.lock().active.len()
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.lock().active.contains(addr)
    }

    /// Snapshot of the active set, taken under the lock.
    pub fn addresses(&self) -> Vec<SocketAddr> {
        self.lock().active.iter().copied().collect()
    }

    pub fn sessions(&self) -> Vec<UdpSession> {
        let sessions = self.lock();
        sessions
            .active
            .iter()
            .map(|addr| UdpSession {
                address: *addr,
                last_heartbeat: sessions.last_heartbeats.get(addr).copied(),
            })
            .collect()
    }

    #[cfg(test)]
    fn heartbeat_addresses(&self) -> HashSet<SocketAddr> {
        self.lock().last_heartbeats.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn touch_is_idempotent() {
        let registry = SessionRegistry::new();
        assert!(registry.touch(addr(1)));
        assert!(!registry.touch(addr(1)));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn heartbeat_keeps_session_until_timeout() {
        let registry = SessionRegistry::new();
        let t0 = Instant::now();
        registry.touch(addr(1));
        registry.heartbeat_at(addr(1), t0);

        let evicted = registry.sweep(TIMEOUT, t0 + Duration::from_millis(9_900));
        assert!(evicted.is_empty());
        assert_eq!(registry.count(), 1);

        let evicted = registry.sweep(TIMEOUT, t0 + Duration::from_millis(10_100));
        assert_eq!(evicted, vec![addr(1)]);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn elapsed_equal_to_timeout_evicts() {
        let registry = SessionRegistry::new();
        let t0 = Instant::now();
        registry.touch(addr(1));
        registry.heartbeat_at(addr(1), t0);

        registry.sweep(TIMEOUT, t0 + TIMEOUT);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn touched_only_session_is_evicted_by_next_sweep() {
        let registry = SessionRegistry::new();
        let now = Instant::now();
        registry.touch(addr(1));

        let evicted = registry.sweep(TIMEOUT, now);
        assert_eq!(evicted, vec![addr(1)]);
        assert!(!registry.contains(&addr(1)));
    }

    #[test]
    fn heartbeat_without_touch_becomes_active_after_sweep() {
        let registry = SessionRegistry::new();
        let now = Instant::now();
        registry.heartbeat_at(addr(2), now);
        assert_eq!(registry.count(), 0);

        registry.sweep(TIMEOUT, now);
        assert!(registry.contains(&addr(2)));
    }

    #[test]
    fn remove_unknown_is_noop() {
        let registry = SessionRegistry::new();
        assert!(!registry.remove(addr(9)));
        assert!(!registry.remove(addr(9)));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn remove_clears_both_collections() {
        let registry = SessionRegistry::new();
        registry.touch(addr(1));
        registry.heartbeat(addr(1));

        assert!(registry.remove(addr(1)));
        assert_eq!(registry.count(), 0);
        assert!(registry.heartbeat_addresses().is_empty());
    }

    #[test]
    fn sessions_report_heartbeat_times() {
        let registry = SessionRegistry::new();
        let t0 = Instant::now();
        registry.touch(addr(1));
        registry.touch(addr(2));
        registry.heartbeat_at(addr(2), t0);

        let mut sessions = registry.sessions();
        sessions.sort_by_key(|s| s.address);
        assert_eq!(
            sessions,
            vec![
                UdpSession {
                    address: addr(1),
                    last_heartbeat: None
                },
                UdpSession {
                    address: addr(2),
                    last_heartbeat: Some(t0)
                },
            ]
        );
    }

    #[test]
    fn concurrent_updates_stay_consistent() {
        let registry = Arc::new(SessionRegistry::new());
        let mut workers = Vec::new();

        for worker in 0..8u16 {
            let registry = Arc::clone(&registry);
            workers.push(thread::spawn(move || {
                for i in 0..500u16 {
                    let a = addr(1_000 + (worker * 37 + i) % 64);
                    match i % 4 {
                        0 => {
                            registry.touch(a);
                        }
                        1 => registry.heartbeat(a),
                        2 => {
                            registry.remove(a);
                        }
                        _ => {
                            registry.sweep(TIMEOUT, Instant::now());
                        }
                    }
                }
            }));
        }

        for worker in workers {
            worker.join().unwrap();
        }

        registry.sweep(TIMEOUT, Instant::now());
        let active: HashSet<SocketAddr> = registry.addresses().into_iter().collect();
        assert_eq!(active, registry.heartbeat_addresses());
    }
}
