use std::collections::BTreeMap;

use ethers_core::types::U256;

/// Tracks nonce assignment for a single signer on a single chain
/// (spec.md §4.7 "Nonce discipline").
///
/// The manager hands out monotonically increasing nonces starting from whatever
/// `eth_getTransactionCount(pending)` reported at construction, and never reuses a nonce once
/// assigned unless the transaction holding it is explicitly freed (replaced-by-cancel or
/// dropped before broadcast).
#[derive(Debug)]
pub struct NonceManager {
    next_nonce: U256,
    /// nonces handed out but not yet finalized (confirmed or freed), in ascending order.
    assigned: BTreeMap<U256, ()>,
}

impl NonceManager {
    /// `chain_next_nonce` is the result of `eth_getTransactionCount(address, "pending")`.
    pub fn new(chain_next_nonce: U256) -> Self {
        Self {
            next_nonce: chain_next_nonce,
            assigned: BTreeMap::new(),
        }
    }

    /// Assigns the next sequential nonce and marks it in-flight.
    pub fn assign_next_nonce(&mut self) -> U256 {
        let nonce = self.next_nonce;
        self.assigned.insert(nonce, ());
        self.next_nonce += U256::one();
        nonce
    }

    pub fn is_assigned(&self, nonce: U256) -> bool {
        self.assigned.contains_key(&nonce)
    }

    /// Marks a nonce as finalized (the transaction holding it confirmed on-chain). No-op if
    /// the nonce was never assigned by this manager.
    pub fn finalize(&mut self, nonce: U256) {
        self.assigned.remove(&nonce);
    }

    /// Frees a nonce back up for reassignment without advancing `next_nonce`, used when a
    /// transaction is abandoned before ever being broadcast. Reassigning a nonce that was
    /// already broadcast is the caller's responsibility to avoid (via cancel-by-self-send
    /// instead of freeing).
    pub fn free(&mut self, nonce: U256) {
        self.assigned.remove(&nonce);
        if nonce < self.next_nonce {
            self.next_nonce = nonce;
        }
    }

    /// The lowest nonce still in flight, if any. Used to detect a stuck nonce blocking the
    /// whole queue (spec.md §4.7 "a stalled low nonce blocks replacement of every higher one").
    pub fn lowest_assigned(&self) -> Option<U256> {
        self.assigned.keys().next().copied()
    }

    pub fn in_flight_count(&self) -> usize {
        self.assigned.len()
    }

    /// Resyncs against a fresh on-chain read, e.g. after a long pause or suspected desync. Any
    /// nonces below `chain_next_nonce` are dropped as finalized; `next_nonce` only ever moves
    /// forward, so a stale read (below what we've already assigned) cannot roll it back.
    pub fn resync(&mut self, chain_next_nonce: U256) {
        self.assigned.retain(|&n, _| n >= chain_next_nonce);
        if chain_next_nonce > self.next_nonce {
            self.next_nonce = chain_next_nonce;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_contiguous_ascending_nonces() {
        let mut mgr = NonceManager::new(U256::from(5));
        assert_eq!(mgr.assign_next_nonce(), U256::from(5));
        assert_eq!(mgr.assign_next_nonce(), U256::from(6));
        assert_eq!(mgr.assign_next_nonce(), U256::from(7));
        assert_eq!(mgr.in_flight_count(), 3);
    }

    #[test]
    fn finalize_removes_from_in_flight_without_rewinding_next() {
        let mut mgr = NonceManager::new(U256::zero());
        let n0 = mgr.assign_next_nonce();
        let n1 = mgr.assign_next_nonce();
        mgr.finalize(n0);
        assert!(!mgr.is_assigned(n0));
        assert!(mgr.is_assigned(n1));
        assert_eq!(mgr.assign_next_nonce(), U256::from(2));
    }

    #[test]
    fn free_rewinds_next_nonce_for_reuse() {
        let mut mgr = NonceManager::new(U256::zero());
        let n0 = mgr.assign_next_nonce();
        mgr.free(n0);
        assert_eq!(mgr.assign_next_nonce(), n0);
    }

    #[test]
    fn lowest_assigned_tracks_the_stuck_nonce() {
        let mut mgr = NonceManager::new(U256::from(10));
        let n0 = mgr.assign_next_nonce();
        let n1 = mgr.assign_next_nonce();
        assert_eq!(mgr.lowest_assigned(), Some(n0));
        mgr.finalize(n0);
        assert_eq!(mgr.lowest_assigned(), Some(n1));
    }

    #[test]
    fn resync_drops_nonces_confirmed_by_another_path() {
        let mut mgr = NonceManager::new(U256::zero());
        mgr.assign_next_nonce();
        mgr.assign_next_nonce();
        mgr.resync(U256::from(2));
        assert_eq!(mgr.in_flight_count(), 0);
        assert_eq!(mgr.assign_next_nonce(), U256::from(2));
    }

    #[test]
    fn resync_never_moves_next_nonce_backward() {
        let mut mgr = NonceManager::new(U256::from(5));
        mgr.resync(U256::from(1));
        assert_eq!(mgr.assign_next_nonce(), U256::from(5));
    }
}
