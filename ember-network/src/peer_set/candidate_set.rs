//! The pool of known-but-not-currently-connected peer addresses that the
//! `PeerGroup`'s connection-attempt scheduler draws from.
//!
//! Selection prefers addresses we've never tried, then addresses we were
//! recently connected to (they're likely still reachable), then addresses
//! that recently failed (gated behind an exponential backoff).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// The initial backoff applied after a single connection failure.
const INITIAL_BACKOFF: Duration = Duration::from_secs(5);

/// The largest backoff a repeatedly-failing address will be held at.
const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

#[derive(Clone, Copy, Debug)]
enum CandidateState {
    /// Never attempted.
    Unseen,
    /// Successfully connected at this instant (and since disconnected, or
    /// it wouldn't be a candidate any more).
    RecentlySeen(Instant),
    /// Failed to connect, or disconnected with an error, at this instant;
    /// `backoff` grows exponentially on each repeated failure before the
    /// address becomes eligible again.
    RecentlyFailed { at: Instant, backoff: Duration },
}

/// A pool of candidate addresses, prioritized for the connection-attempt
/// scheduler.
#[derive(Debug, Default)]
pub struct CandidateSet {
    candidates: HashMap<SocketAddr, CandidateState>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn about addresses gossiped by a peer, or seeded at startup. An
    /// address already in the pool is left with its existing state.
    pub fn add(&mut self, addrs: impl IntoIterator<Item = SocketAddr>) {
        for addr in addrs {
            self.candidates.entry(addr).or_insert(CandidateState::Unseen);
        }
    }

    /// Record that we're no longer connected to `addr`, so it can be
    /// reconsidered (immediately, since it was recently seen healthy).
    pub fn report_disconnected(&mut self, addr: SocketAddr) {
        self.candidates
            .insert(addr, CandidateState::RecentlySeen(Instant::now()));
    }

    /// Record that a connection attempt to `addr` failed, applying (or
    /// extending) its exponential backoff.
    pub fn report_failed(&mut self, addr: SocketAddr) {
        let backoff = match self.candidates.get(&addr) {
            Some(CandidateState::RecentlyFailed { backoff, .. }) => {
                std::cmp::min(*backoff * 2, MAX_BACKOFF)
            }
            _ => INITIAL_BACKOFF,
        };
        self.candidates.insert(
            addr,
            CandidateState::RecentlyFailed {
                at: Instant::now(),
                backoff,
            },
        );
    }

    /// Remove `addr` from the pool entirely, e.g. because we're now
    /// connected to it and don't want the scheduler to also retry it.
    pub fn remove(&mut self, addr: &SocketAddr) {
        self.candidates.remove(addr);
    }

    /// Choose the next address to attempt, if any are eligible right now.
    /// Unseen addresses are preferred, then recently-seen (oldest first),
    /// then recently-failed addresses whose backoff has elapsed (again
    /// oldest first).
    pub fn next_candidate(&self) -> Option<SocketAddr> {
        let now = Instant::now();

        if let Some(addr) = self
            .candidates
            .iter()
            .find(|(_, state)| matches!(state, CandidateState::Unseen))
            .map(|(addr, _)| *addr)
        {
            return Some(addr);
        }

        let mut recently_seen: Vec<(SocketAddr, Instant)> = self
            .candidates
            .iter()
            .filter_map(|(addr, state)| match state {
                CandidateState::RecentlySeen(at) => Some((*addr, *at)),
                _ => None,
            })
            .collect();
        recently_seen.sort_by_key(|(_, at)| *at);
        if let Some((addr, _)) = recently_seen.into_iter().next() {
            return Some(addr);
        }

        let mut ready_failed: Vec<(SocketAddr, Instant)> = self
            .candidates
            .iter()
            .filter_map(|(addr, state)| match state {
                CandidateState::RecentlyFailed { at, backoff } if now.duration_since(*at) >= *backoff => {
                    Some((*addr, *at))
                }
                _ => None,
            })
            .collect();
        ready_failed.sort_by_key(|(_, at)| *at);
        ready_failed.into_iter().next().map(|(addr, _)| addr)
    }

    /// The number of addresses currently tracked, in any state.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Returns `true` if no addresses are tracked.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::new(std::net::Ipv4Addr::new(127, 0, 0, 1).into(), port)
    }

    #[test]
    fn prefers_unseen_over_everything() {
        let mut set = CandidateSet::new();
        set.add(vec![addr(1)]);
        set.report_disconnected(addr(2));
        set.add(vec![addr(2)]); // already present; stays RecentlySeen
        set.add(vec![addr(3)]);
        let chosen = set.next_candidate().unwrap();
        assert!(chosen == addr(1) || chosen == addr(3));
        assert_ne!(chosen, addr(2));
    }

    #[test]
    fn failed_address_is_not_immediately_retried() {
        let mut set = CandidateSet::new();
        set.add(vec![addr(1)]);
        // Consume the only unseen candidate so the pool is otherwise empty.
        assert_eq!(set.next_candidate(), Some(addr(1)));
        set.report_failed(addr(1));
        assert_eq!(set.next_candidate(), None);
    }
}
