/*
* Copyright 2019 Comcast Cable Communications Management, LLC
*
* Licensed under the Apache License, Version 2.0 (the "License");
* you may not use this file except in compliance with the License.
* You may obtain a copy of the License at
*
* http://www.apache.org/licenses/LICENSE-2.0
*
* Unless required by applicable law or agreed to in writing, software
* distributed under the License is distributed on an "AS IS" BASIS,
* WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
* See the License for the specific language governing permissions and
* limitations under the License.
*
* SPDX-License-Identifier: Apache-2.0
*/

//! The OpenFlow-style flow table.
//!
//! Flows are grouped into buckets by mask. A lookup normalizes the query
//! key once per bucket and does a single hash lookup in each, so its cost
//! grows with the number of distinct masks rather than the number of flows.
//!
//! Expiration is lazy. A flow past its idle or hard timeout is removed only
//! when a lookup, modify or delete visits it, or when the owner calls
//! [`FlowTable::expire`]. Flows that are never visited again stay resident.
//!
//! The table is not synchronized. Confine it to one core, or wrap it in a
//! `Mutex` when it must be shared.

mod bucket;

use self::bucket::Bucket;
use crate::flow::{Flow, MatchKey, MatchMask};
use crate::Result;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

/// What a strict delete does when no flow matches.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MissPolicy {
    /// Silently does nothing.
    Ignore,
    /// Returns a [`FlowNotFoundError`].
    Error,
}

impl Default for MissPolicy {
    fn default() -> Self {
        MissPolicy::Ignore
    }
}

/// No flow matched a strict delete.
#[derive(Debug, Error)]
#[error("no flow in table {table} matches {key:?} strictly with priority {priority}.")]
pub struct FlowNotFoundError {
    /// The table searched.
    pub table: u8,
    /// The normalized key of the delete request.
    pub key: MatchKey,
    /// The priority of the delete request.
    pub priority: u16,
}

/// A flow table with wildcard matching, priorities and lazy expiration.
///
/// # Example
///
/// ```
/// let mut table = FlowTable::new(1);
/// let key = MatchKey::udp_v4(Ipv4Addr::new(10, 0, 0, 1), 5000, 80);
/// let flow = Flow::new(key, MatchMask::exact(), 10, "output:2")
///     .with_hard_timeout(Duration::from_secs(100));
///
/// table.add(flow, Duration::from_secs(0));
/// assert!(table.lookup(&key, Duration::from_secs(50)).is_some());
/// assert!(table.lookup(&key, Duration::from_secs(150)).is_none());
/// ```
pub struct FlowTable<A> {
    id: u8,
    buckets: Vec<Bucket<A>>,
    strict_delete: MissPolicy,
}

impl<A> FlowTable<A> {
    /// Creates an empty table. Strict deletes that match nothing are
    /// ignored.
    pub fn new(id: u8) -> Self {
        FlowTable::with_miss_policy(id, MissPolicy::default())
    }

    /// Creates an empty table with the given strict delete miss policy.
    pub fn with_miss_policy(id: u8, strict_delete: MissPolicy) -> Self {
        FlowTable {
            id,
            buckets: vec![],
            strict_delete,
        }
    }

    /// Returns the caller assigned table identifier.
    #[inline]
    pub fn id(&self) -> u8 {
        self.id
    }

    #[inline]
    pub fn miss_policy(&self) -> MissPolicy {
        self.strict_delete
    }

    pub fn set_miss_policy(&mut self, strict_delete: MissPolicy) {
        self.strict_delete = strict_delete;
    }

    /// Returns the number of resident flows, including expired flows not
    /// yet visited.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Returns the number of distinct masks in the table.
    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Returns the number of flows installed with exactly this mask, or
    /// `None` when the table has no bucket for it.
    pub fn bucket_len(&self, mask: &MatchMask) -> Option<usize> {
        self.bucket_index(mask).map(|idx| self.buckets[idx].len())
    }

    /// Iterates over the resident flows, bucket by bucket.
    pub fn iter(&self) -> impl Iterator<Item = &Flow<A>> {
        self.buckets.iter().flat_map(Bucket::iter)
    }

    /// Finds the highest priority flow matching `key` at `now`.
    ///
    /// Every bucket is probed. Expired flows met on the way are removed.
    /// Among equal priorities the first bucket wins. The winner's last use
    /// is set to `now`.
    pub fn lookup(&mut self, key: &MatchKey, now: Duration) -> Option<&Flow<A>> {
        let id = self.id;
        let mut winner: Option<(usize, MatchKey, usize, u16)> = None;
        let mut emptied = false;

        for (idx, bucket) in self.buckets.iter_mut().enumerate() {
            let masked = bucket.mask().apply(key);

            for flow in bucket.drain_slot_where(&masked, |f| f.is_expired(now)) {
                log_expired(id, &flow, now);
            }
            emptied |= bucket.is_empty();

            if let Some((pos, priority)) = bucket.best(&masked) {
                if winner.map_or(true, |(_, _, _, best)| priority > best) {
                    winner = Some((idx, masked, pos, priority));
                }
            }
        }

        let (mut idx, masked, pos, _) = match winner {
            Some(w) => w,
            None => {
                if emptied {
                    self.compact();
                }
                trace!(table = id, ?key, "lookup missed.");
                return None;
            }
        };

        if emptied {
            // the winner's bucket is not empty, only earlier ones shift it
            idx -= self.buckets[..idx].iter().filter(|b| b.is_empty()).count();
            self.compact();
        }

        let flow = self.buckets[idx].get_mut(&masked, pos)?;
        flow.touch(now);
        trace!(table = id, priority = flow.priority(), "lookup matched.");
        Some(&*flow)
    }

    /// Installs a flow at `now`.
    ///
    /// The hard timeout starts counting at `now`. The idle timeout baseline
    /// starts one idle period later, so a new flow gets a grace period
    /// before it is considered idle. The flow joins the bucket for its
    /// exact mask, or a new one. Flows are never rejected as duplicates.
    pub fn add(&mut self, mut flow: Flow<A>, now: Duration) {
        flow.install(now);
        debug!(
            table = self.id,
            priority = flow.priority(),
            mask = ?flow.mask(),
            "installing flow."
        );

        match self.bucket_index(flow.mask()) {
            Some(idx) => self.buckets[idx].insert(flow),
            None => {
                debug!(table = self.id, mask = ?flow.mask(), "bucket created.");
                self.buckets.push(Bucket::new(flow));
            }
        }
    }

    /// Removes matching flows, returning how many were removed.
    ///
    /// A strict delete removes the first flow with exactly the given mask,
    /// key and priority. When none exists, the table's [`MissPolicy`]
    /// decides whether that is an error.
    ///
    /// A non-strict delete visits every bucket whose mask the request's
    /// mask covers, and removes every flow whose key agrees with the
    /// request's key on the bits the request's mask compares, regardless
    /// of priority.
    ///
    /// # Errors
    ///
    /// Returns `FlowNotFoundError` if a strict delete removes nothing and
    /// the miss policy is `MissPolicy::Error`.
    pub fn delete<B>(&mut self, flow: &Flow<B>, strict: bool) -> Result<usize> {
        let removed = if strict {
            self.delete_strict(flow)
        } else {
            self.delete_non_strict(flow)
        };

        if strict && removed == 0 {
            debug!(table = self.id, priority = flow.priority(), "strict delete missed.");
            if self.strict_delete == MissPolicy::Error {
                return Err(FlowNotFoundError {
                    table: self.id,
                    key: flow.masked_key(),
                    priority: flow.priority(),
                }
                .into());
            }
        }

        Ok(removed)
    }

    fn delete_strict<B>(&mut self, flow: &Flow<B>) -> usize {
        // at most one bucket per mask, nothing to find past it
        let idx = match self.bucket_index(flow.mask()) {
            Some(idx) => idx,
            None => return 0,
        };

        let key = flow.masked_key();
        let bucket = &mut self.buckets[idx];
        let removed = bucket
            .position(&key, |f| f.priority() == flow.priority())
            .and_then(|pos| bucket.remove(&key, pos));

        match removed {
            Some((_, remaining)) => {
                debug!(table = self.id, priority = flow.priority(), "flow deleted.");
                if remaining == 0 {
                    self.drop_bucket(idx);
                }
                1
            }
            None => 0,
        }
    }

    fn delete_non_strict<B>(&mut self, flow: &Flow<B>) -> usize {
        let key = flow.masked_key();
        let mask = *flow.mask();
        let mut removed = 0;

        for bucket in self.buckets.iter_mut() {
            if !mask.covers(bucket.mask()) {
                continue;
            }
            removed += bucket
                .drain_where(|f| mask.apply(f.key()) == key)
                .len();
        }

        if removed > 0 {
            debug!(table = self.id, removed, "flows deleted.");
            self.compact();
        }
        removed
    }

    /// Removes every flow expired at `now`, returning them.
    ///
    /// Lookups only expire the flows they visit. Owners that need bounded
    /// memory call this periodically.
    pub fn expire(&mut self, now: Duration) -> Vec<Flow<A>> {
        let mut expired = vec![];
        for bucket in self.buckets.iter_mut() {
            expired.extend(bucket.drain_where(|f| f.is_expired(now)));
        }

        for flow in expired.iter() {
            log_expired(self.id, flow, now);
        }
        if !expired.is_empty() {
            self.compact();
        }
        expired
    }

    /// Removes every flow and bucket.
    pub fn clear(&mut self) {
        debug!(table = self.id, flows = self.len(), "clearing table.");
        self.buckets.clear();
    }

    fn bucket_index(&self, mask: &MatchMask) -> Option<usize> {
        self.buckets.iter().position(|b| b.mask() == mask)
    }

    fn drop_bucket(&mut self, idx: usize) {
        let bucket = self.buckets.remove(idx);
        debug!(table = self.id, mask = ?bucket.mask(), "bucket removed.");
    }

    /// Drops the emptied buckets, keeping the creation order of the rest.
    fn compact(&mut self) {
        let id = self.id;
        self.buckets.retain(|bucket| {
            if bucket.is_empty() {
                debug!(table = id, mask = ?bucket.mask(), "bucket removed.");
                false
            } else {
                true
            }
        });
    }
}

impl<A: Clone> FlowTable<A> {
    /// Replaces the actions of matching flows, returning how many were
    /// changed. A request that matches nothing is not an error.
    ///
    /// A strict modify changes the first live flow with exactly the given
    /// mask, key and priority. A non-strict modify changes every live flow
    /// a non-strict delete with the same request would remove, regardless
    /// of priority. Expired flows met on the way are removed instead.
    pub fn modify(&mut self, flow: &Flow<A>, strict: bool, now: Duration) -> usize {
        if strict {
            self.modify_strict(flow, now)
        } else {
            self.modify_non_strict(flow, now)
        }
    }

    fn modify_strict(&mut self, flow: &Flow<A>, now: Duration) -> usize {
        let idx = match self.bucket_index(flow.mask()) {
            Some(idx) => idx,
            None => return 0,
        };

        let id = self.id;
        let key = flow.masked_key();
        let bucket = &mut self.buckets[idx];

        for expired in bucket.drain_slot_where(&key, |f| f.is_expired(now)) {
            log_expired(id, &expired, now);
        }

        let modified = match bucket.position(&key, |f| f.priority() == flow.priority()) {
            Some(pos) => match bucket.get_mut(&key, pos) {
                Some(found) => {
                    found.set_actions(flow.actions().clone());
                    1
                }
                None => 0,
            },
            None => 0,
        };

        if bucket.is_empty() {
            self.drop_bucket(idx);
        }
        modified
    }

    fn modify_non_strict(&mut self, flow: &Flow<A>, now: Duration) -> usize {
        let id = self.id;
        let key = flow.masked_key();
        let mask = *flow.mask();
        let mut modified = 0;
        let mut emptied = false;

        for bucket in self.buckets.iter_mut() {
            if !mask.covers(bucket.mask()) {
                continue;
            }

            let matches = |f: &Flow<A>| mask.apply(f.key()) == key;
            for expired in bucket.drain_where(|f| matches(f) && f.is_expired(now)) {
                log_expired(id, &expired, now);
            }
            emptied |= bucket.is_empty();

            for found in bucket.iter_mut().filter(|f| matches(&**f)) {
                found.set_actions(flow.actions().clone());
                modified += 1;
            }
        }

        if emptied {
            self.compact();
        }
        modified
    }
}

fn log_expired<A>(table: u8, flow: &Flow<A>, now: Duration) {
    debug!(
        table,
        priority = flow.priority(),
        reason = ?flow.expiry(now),
        ?now,
        "flow expired."
    );
}

impl<A> fmt::Debug for FlowTable<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("flow_table")
            .field("id", &self.id)
            .field("buckets", &self.buckets)
            .field("strict_delete", &self.strict_delete)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{EtherTypes, ProtocolNumbers};
    use crate::testils::proptest::{udp_flow, udp_key};
    use proptest::collection::vec;
    use proptest::prelude::*;
    use std::net::Ipv4Addr;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn udp_key_a() -> MatchKey {
        MatchKey::udp_v4(Ipv4Addr::new(10, 0, 0, 1), 5000, 80)
    }

    fn exact(priority: u16, actions: &'static str) -> Flow<&'static str> {
        Flow::new(udp_key_a(), MatchMask::exact(), priority, actions)
    }

    #[test]
    fn lookup_empty_table() {
        let mut table = FlowTable::<()>::new(1);
        assert!(table.lookup(&udp_key_a(), secs(0)).is_none());
        assert!(table.is_empty());
        assert_eq!(1, table.id());
    }

    #[test]
    fn hard_timeout_scenario() {
        let mut table = FlowTable::new(1);
        table.add(exact(10, "a").with_hard_timeout(secs(100)), secs(0));

        let found = table.lookup(&udp_key_a(), secs(50)).unwrap();
        assert_eq!("a", *found.actions());
        assert_eq!(secs(50), found.last_used());

        assert!(table.lookup(&udp_key_a(), secs(150)).is_none());
        assert_eq!(0, table.len());
        assert_eq!(0, table.bucket_count());
        assert_eq!(None, table.bucket_len(&MatchMask::exact()));
    }

    #[test]
    fn hard_timeout_fires_at_deadline() {
        let mut table = FlowTable::new(1);
        table.add(exact(10, "a").with_hard_timeout(secs(100)), secs(0));

        assert!(table.lookup(&udp_key_a(), secs(99)).is_some());
        assert!(table.lookup(&udp_key_a(), secs(100)).is_none());
    }

    #[test]
    fn higher_priority_same_bucket_scenario() {
        let mut table = FlowTable::new(1);
        table.add(exact(10, "a").with_hard_timeout(secs(100)), secs(0));
        table.add(exact(20, "b"), secs(1));

        assert_eq!(1, table.bucket_count());
        assert_eq!(Some(2), table.bucket_len(&MatchMask::exact()));
        assert_eq!("b", *table.lookup(&udp_key_a(), secs(2)).unwrap().actions());

        assert_eq!(1, table.delete(&exact(20, "b"), true).unwrap());
        assert_eq!("a", *table.lookup(&udp_key_a(), secs(3)).unwrap().actions());
    }

    #[test]
    fn priority_wins_across_buckets() {
        let mut table = FlowTable::new(1);
        let any_udp = MatchMask::wildcard().eth_type().ip_proto();

        table.add(Flow::new(udp_key_a(), any_udp, 30, "wide"), secs(0));
        table.add(exact(20, "narrow"), secs(0));

        assert_eq!(2, table.bucket_count());
        assert_eq!("wide", *table.lookup(&udp_key_a(), secs(1)).unwrap().actions());

        let other = MatchKey::udp_v4(Ipv4Addr::new(10, 9, 9, 9), 1, 2);
        assert_eq!("wide", *table.lookup(&other, secs(1)).unwrap().actions());
    }

    #[test]
    fn equal_priority_keeps_first_bucket() {
        let mut table = FlowTable::new(1);
        let any_udp = MatchMask::wildcard().eth_type().ip_proto();

        table.add(exact(10, "first"), secs(0));
        table.add(Flow::new(udp_key_a(), any_udp, 10, "second"), secs(0));

        assert_eq!("first", *table.lookup(&udp_key_a(), secs(1)).unwrap().actions());
    }

    #[test]
    fn duplicate_keys_are_kept() {
        let mut table = FlowTable::new(1);
        table.add(exact(10, "first"), secs(0));
        table.add(exact(10, "second"), secs(0));

        assert_eq!(2, table.len());
        assert_eq!("first", *table.lookup(&udp_key_a(), secs(1)).unwrap().actions());

        // strict delete removes only the earliest installed duplicate
        assert_eq!(1, table.delete(&exact(10, "any"), true).unwrap());
        assert_eq!("second", *table.lookup(&udp_key_a(), secs(1)).unwrap().actions());
    }

    #[test]
    fn prefix_mask_matches_range() {
        let mut table = FlowTable::new(1);
        let mask = MatchMask::wildcard().eth_type().ipv4_dst_prefix(24);
        table.add(Flow::new(udp_key_a(), mask, 1, "subnet"), secs(0));

        let inside = MatchKey::udp_v4(Ipv4Addr::new(10, 0, 0, 200), 1, 1);
        let outside = MatchKey::udp_v4(Ipv4Addr::new(10, 0, 1, 1), 1, 1);
        assert!(table.lookup(&inside, secs(1)).is_some());
        assert!(table.lookup(&outside, secs(1)).is_none());
    }

    #[test]
    fn lookup_within_windows() {
        let mut table = FlowTable::new(1);
        table.add(
            exact(10, "a")
                .with_idle_timeout(secs(10))
                .with_hard_timeout(secs(100)),
            secs(0),
        );

        // every lookup refreshes the idle baseline
        for t in (5..100).step_by(5) {
            assert!(table.lookup(&udp_key_a(), secs(t)).is_some(), "t = {}", t);
        }
        assert!(table.lookup(&udp_key_a(), secs(100)).is_none());
    }

    #[test]
    fn idle_timeout_expires_unused_flow() {
        let mut table = FlowTable::new(1);
        table.add(exact(10, "a").with_idle_timeout(secs(10)), secs(0));

        // the install grace puts the first deadline at 20
        assert!(table.lookup(&udp_key_a(), secs(19)).is_some());
        // last used at 19, idle at 29
        assert!(table.lookup(&udp_key_a(), secs(28)).is_some());
        // last used at 28, idle at 38
        assert!(table.lookup(&udp_key_a(), secs(38)).is_none());
        assert_eq!(0, table.len());
    }

    #[test]
    fn expired_flow_yields_to_lower_priority() {
        let mut table = FlowTable::new(1);
        table.add(exact(20, "short").with_hard_timeout(secs(10)), secs(0));
        table.add(exact(10, "long"), secs(0));

        assert_eq!("short", *table.lookup(&udp_key_a(), secs(5)).unwrap().actions());
        assert_eq!("long", *table.lookup(&udp_key_a(), secs(10)).unwrap().actions());
        assert_eq!(1, table.len());
    }

    #[test]
    fn expired_bucket_before_winner_is_dropped() {
        let mut table = FlowTable::new(1);
        let any_udp = MatchMask::wildcard().eth_type().ip_proto();
        table.add(
            Flow::new(udp_key_a(), any_udp, 50, "stale").with_hard_timeout(secs(1)),
            secs(0),
        );
        table.add(exact(10, "live"), secs(0));

        let found = table.lookup(&udp_key_a(), secs(5)).unwrap();
        assert_eq!("live", *found.actions());
        assert_eq!(secs(5), found.last_used());
        assert_eq!(1, table.bucket_count());
        assert_eq!(None, table.bucket_len(&any_udp));
    }

    #[test]
    fn lookup_leaves_unvisited_expired_flows() {
        let mut table = FlowTable::new(1);
        table.add(exact(10, "a").with_hard_timeout(secs(1)), secs(0));
        let other = MatchKey::udp_v4(Ipv4Addr::new(10, 0, 0, 2), 5000, 80);
        table.add(Flow::new(other, MatchMask::exact(), 10, "b"), secs(0));

        assert!(table.lookup(&other, secs(5)).is_some());
        assert_eq!(2, table.len());

        let expired = table.expire(secs(5));
        assert_eq!(1, expired.len());
        assert_eq!("a", *expired[0].actions());
        assert_eq!(1, table.len());
    }

    #[test]
    fn strict_delete_twice_is_safe() {
        let mut table = FlowTable::new(1);
        table.add(exact(10, "a"), secs(0));
        let other = MatchKey::udp_v4(Ipv4Addr::new(10, 0, 0, 2), 5000, 80);
        table.add(Flow::new(other, MatchMask::exact(), 10, "b"), secs(0));

        assert_eq!(1, table.delete(&exact(10, "a"), true).unwrap());
        assert_eq!(0, table.delete(&exact(10, "a"), true).unwrap());
        assert_eq!(1, table.len());
        assert!(table.lookup(&other, secs(1)).is_some());
    }

    #[test]
    fn strict_delete_requires_priority() {
        let mut table = FlowTable::new(1);
        table.add(exact(10, "a"), secs(0));

        assert_eq!(0, table.delete(&exact(11, "a"), true).unwrap());
        assert_eq!(1, table.len());
    }

    #[test]
    fn strict_delete_requires_same_mask() {
        let mut table = FlowTable::new(1);
        table.add(exact(10, "a"), secs(0));

        let wider = Flow::new(udp_key_a(), MatchMask::wildcard().dst_port(), 10, ());
        assert_eq!(0, table.delete(&wider, true).unwrap());
        assert_eq!(1, table.len());
    }

    #[test]
    fn strict_delete_miss_policy() {
        let mut table = FlowTable::with_miss_policy(7, MissPolicy::Error);
        table.add(exact(10, "a"), secs(0));

        let err = table.delete(&exact(11, "a"), true).unwrap_err();
        let err = err.downcast_ref::<FlowNotFoundError>().unwrap();
        assert_eq!(7, err.table);
        assert_eq!(11, err.priority);

        assert_eq!(1, table.delete(&exact(10, "a"), true).unwrap());
        assert!(table.delete(&exact(10, "a"), true).is_err());

        // non-strict misses stay silent whatever the policy
        assert_eq!(0, table.delete(&exact(10, "a"), false).unwrap());
    }

    #[test]
    fn deleting_last_flow_drops_bucket() {
        let mut table = FlowTable::new(1);
        let mask = MatchMask::wildcard().dst_port();
        table.add(exact(10, "a"), secs(0));
        table.add(Flow::new(udp_key_a(), mask, 5, "b"), secs(0));
        assert_eq!(2, table.bucket_count());

        table.delete(&exact(10, "a"), true).unwrap();
        assert_eq!(1, table.bucket_count());
        assert_eq!(None, table.bucket_len(&MatchMask::exact()));
        assert_eq!(Some(1), table.bucket_len(&mask));
        assert_eq!("b", *table.lookup(&udp_key_a(), secs(1)).unwrap().actions());
    }

    #[test]
    fn non_strict_delete_ignores_priority() {
        let mut table = FlowTable::new(1);
        table.add(exact(10, "a"), secs(0));
        table.add(exact(20, "b"), secs(0));
        let other = MatchKey::udp_v4(Ipv4Addr::new(10, 0, 0, 2), 5000, 80);
        table.add(Flow::new(other, MatchMask::exact(), 10, "c"), secs(0));

        assert_eq!(2, table.delete(&exact(99, "x"), false).unwrap());
        assert_eq!(1, table.len());
        assert!(table.lookup(&udp_key_a(), secs(1)).is_none());
    }

    #[test]
    fn non_strict_delete_visits_covered_buckets_only() {
        let mut table = FlowTable::new(1);
        let port = MatchMask::wildcard().dst_port();
        let udp = MatchMask::wildcard().eth_type().ip_proto();

        table.add(exact(10, "exact"), secs(0));
        table.add(Flow::new(udp_key_a(), port, 10, "port"), secs(0));
        table.add(Flow::new(udp_key_a(), udp, 10, "udp"), secs(0));

        // a port-only request covers the port and exact buckets, not the
        // bucket that ignores the port
        let request = Flow::new(udp_key_a(), port, 0, ());
        assert_eq!(2, table.delete(&request, false).unwrap());
        assert_eq!(1, table.bucket_count());
        assert_eq!(Some(1), table.bucket_len(&udp));
    }

    #[test]
    fn non_strict_wildcard_delete_clears_table() {
        let mut table = FlowTable::new(1);
        table.add(exact(10, "a"), secs(0));
        table.add(
            Flow::new(udp_key_a(), MatchMask::wildcard().dst_port(), 5, "b"),
            secs(0),
        );

        let all = Flow::new(MatchKey::default(), MatchMask::wildcard(), 0, ());
        assert_eq!(2, table.delete(&all, false).unwrap());
        assert!(table.is_empty());
    }

    #[test]
    fn strict_modify_replaces_actions() {
        let mut table = FlowTable::new(1);
        table.add(exact(10, "a"), secs(0));
        table.add(exact(20, "b"), secs(0));

        assert_eq!(1, table.modify(&exact(10, "a2"), true, secs(1)));
        assert_eq!(0, table.modify(&exact(30, "none"), true, secs(1)));

        let mut actions = table.iter().map(|f| *f.actions()).collect::<Vec<_>>();
        actions.sort_unstable();
        assert_eq!(vec!["a2", "b"], actions);
    }

    #[test]
    fn strict_modify_keeps_timeouts() {
        let mut table = FlowTable::new(1);
        table.add(exact(10, "a").with_hard_timeout(secs(10)), secs(0));

        table.modify(&exact(10, "a2"), true, secs(1));
        let found = table.lookup(&udp_key_a(), secs(5)).unwrap();
        assert_eq!("a2", *found.actions());
        assert_eq!(Some(secs(10)), found.expire_at());
    }

    #[test]
    fn strict_modify_removes_expired_match() {
        let mut table = FlowTable::new(1);
        table.add(exact(10, "a").with_hard_timeout(secs(10)), secs(0));

        assert_eq!(0, table.modify(&exact(10, "a2"), true, secs(10)));
        assert!(table.is_empty());
    }

    #[test]
    fn non_strict_wildcard_modify_ignores_priority() {
        let mut table = FlowTable::new(1);
        table.add(exact(10, "a"), secs(0));
        table.add(exact(20, "b"), secs(0));
        let tcp = MatchKey::tcp_v4(Ipv4Addr::new(1, 1, 1, 1), Ipv4Addr::new(2, 2, 2, 2), 1, 2);
        let tcp_mask = MatchMask::wildcard().ip_proto();
        table.add(Flow::new(tcp, tcp_mask, 5, "c"), secs(0));

        let all = Flow::new(MatchKey::default(), MatchMask::wildcard(), 0, "drop");
        assert_eq!(3, table.modify(&all, false, secs(1)));
        assert!(table.iter().all(|f| *f.actions() == "drop"));
    }

    #[test]
    fn non_strict_modify_matches_under_request_mask() {
        let mut table = FlowTable::new(1);
        table.add(exact(10, "udp"), secs(0));
        let tcp = MatchKey {
            ip_proto: ProtocolNumbers::Tcp,
            ..udp_key_a()
        };
        table.add(Flow::new(tcp, MatchMask::exact(), 10, "tcp"), secs(0));

        let udp_only = Flow::new(
            MatchKey {
                eth_type: EtherTypes::Ipv4,
                ip_proto: ProtocolNumbers::Udp,
                ..MatchKey::default()
            },
            MatchMask::wildcard().eth_type().ip_proto(),
            0,
            "udp2",
        );
        assert_eq!(1, table.modify(&udp_only, false, secs(1)));
        assert_eq!("udp2", *table.lookup(&udp_key_a(), secs(1)).unwrap().actions());
        assert_eq!("tcp", *table.lookup(&tcp, secs(1)).unwrap().actions());
    }

    #[test]
    fn non_strict_modify_removes_expired_matches() {
        let mut table = FlowTable::new(1);
        table.add(exact(10, "a").with_hard_timeout(secs(5)), secs(0));
        table.add(exact(20, "b"), secs(0));

        let all = Flow::new(MatchKey::default(), MatchMask::wildcard(), 0, "c");
        assert_eq!(1, table.modify(&all, false, secs(5)));
        assert_eq!(1, table.len());
    }

    #[test]
    fn clear_releases_everything() {
        let mut table = FlowTable::new(1);
        table.add(exact(10, "a"), secs(0));
        table.add(Flow::new(udp_key_a(), MatchMask::wildcard(), 1, "b"), secs(0));

        table.clear();
        assert!(table.is_empty());
        assert_eq!(0, table.bucket_count());
        assert!(table.lookup(&udp_key_a(), secs(0)).is_none());
    }

    /// Reference resolution: the live flows matching `key`, best first.
    fn brute_force<'a>(flows: &'a [Flow<u32>], key: &MatchKey) -> Option<&'a Flow<u32>> {
        let mut best: Option<&Flow<u32>> = None;
        for flow in flows {
            if flow.mask().apply(key) == flow.masked_key()
                && best.map_or(true, |b| flow.priority() > b.priority())
            {
                best = Some(flow);
            }
        }
        best
    }

    proptest! {
        #[test]
        fn lookup_returns_best_priority(
            flows in vec(udp_flow(8), 1..24),
            queries in vec(udp_key(), 1..8),
        ) {
            let mut table = FlowTable::new(1);
            for flow in flows.iter().cloned() {
                table.add(flow, secs(0));
            }

            for query in queries.iter() {
                let expected = brute_force(&flows, query).map(Flow::priority);
                let found = table.lookup(query, secs(1)).map(Flow::priority);
                prop_assert_eq!(expected, found);
            }
        }

        #[test]
        fn priority_independent_of_insertion_order(
            flows in vec(udp_flow(64), 1..16),
            query in udp_key(),
        ) {
            let mut forward = FlowTable::new(1);
            let mut backward = FlowTable::new(2);
            for flow in flows.iter().cloned() {
                forward.add(flow, secs(0));
            }
            for flow in flows.iter().rev().cloned() {
                backward.add(flow, secs(0));
            }

            let a = forward.lookup(&query, secs(1)).map(Flow::priority);
            let b = backward.lookup(&query, secs(1)).map(Flow::priority);
            prop_assert_eq!(a, b);
        }

        #[test]
        fn strict_delete_is_idempotent(
            flows in vec(udp_flow(4), 1..16),
            pick in any::<prop::sample::Index>(),
        ) {
            let mut table = FlowTable::new(1);
            for flow in flows.iter().cloned() {
                table.add(flow, secs(0));
            }
            let target = pick.get(&flows);
            let before = table.len();

            prop_assert_eq!(1, table.delete(target, true).unwrap());
            let after = table.len();
            prop_assert_eq!(before - 1, after);

            // a second delete only finds a duplicate of the target
            let duplicates = flows
                .iter()
                .filter(|f| {
                    f.mask() == target.mask()
                        && f.masked_key() == target.masked_key()
                        && f.priority() == target.priority()
                })
                .count();
            let expected = if duplicates > 1 { 1 } else { 0 };
            prop_assert_eq!(expected, table.delete(target, true).unwrap());
            prop_assert_eq!(after - expected, table.len());
        }

        #[test]
        fn len_matches_iter(flows in vec(udp_flow(8), 0..32)) {
            let mut table = FlowTable::new(1);
            for flow in flows.iter().cloned() {
                table.add(flow, secs(0));
            }
            prop_assert_eq!(flows.len(), table.len());
            prop_assert_eq!(flows.len(), table.iter().count());
        }
    }
}
