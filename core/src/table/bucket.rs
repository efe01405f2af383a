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

use crate::flow::{Flow, MatchKey, MatchMask};
use std::collections::HashMap;
use std::fmt;

/// A mini flow table holding every flow installed with one mask.
///
/// Flows are indexed by their key normalized through the bucket mask, so a
/// query is a single hash lookup once normalized the same way. Flows that
/// share a normalized key live side by side in the same slot, in insertion
/// order.
pub(crate) struct Bucket<A> {
    mask: MatchMask,
    flows: HashMap<MatchKey, Vec<Flow<A>>>,
    len: usize,
}

impl<A> Bucket<A> {
    /// Creates a bucket for the mask of its first flow.
    pub(crate) fn new(flow: Flow<A>) -> Self {
        let mut bucket = Bucket {
            mask: *flow.mask(),
            flows: HashMap::new(),
            len: 0,
        };
        bucket.insert(flow);
        bucket
    }

    #[inline]
    pub(crate) fn mask(&self) -> &MatchMask {
        &self.mask
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Adds a flow to the slot of its normalized key. Existing flows with
    /// the same key are kept.
    pub(crate) fn insert(&mut self, flow: Flow<A>) {
        debug_assert_eq!(self.mask, *flow.mask());
        let key = self.mask.apply(flow.key());
        self.flows.entry(key).or_insert_with(Vec::new).push(flow);
        self.len += 1;
    }

    /// Removes the flow at `index` of the slot for `key`, returning it with
    /// the number of flows left in the bucket.
    pub(crate) fn remove(&mut self, key: &MatchKey, index: usize) -> Option<(Flow<A>, usize)> {
        let slot = self.flows.get_mut(key)?;
        if index >= slot.len() {
            return None;
        }

        let flow = slot.remove(index);
        if slot.is_empty() {
            self.flows.remove(key);
        }
        self.len -= 1;
        Some((flow, self.len))
    }

    pub(crate) fn get_mut(&mut self, key: &MatchKey, index: usize) -> Option<&mut Flow<A>> {
        self.flows.get_mut(key).and_then(|slot| slot.get_mut(index))
    }

    /// Returns the index of the first flow in the slot for `key` that
    /// satisfies the predicate.
    pub(crate) fn position<F>(&self, key: &MatchKey, pred: F) -> Option<usize>
    where
        F: FnMut(&Flow<A>) -> bool,
    {
        self.flows.get(key).and_then(|slot| slot.iter().position(pred))
    }

    /// Returns the index and priority of the highest priority flow in the
    /// slot for `key`. Ties go to the earliest installed.
    pub(crate) fn best(&self, key: &MatchKey) -> Option<(usize, u16)> {
        let slot = self.flows.get(key)?;
        let mut best: Option<(usize, u16)> = None;
        for (i, flow) in slot.iter().enumerate() {
            if best.map_or(true, |(_, priority)| flow.priority() > priority) {
                best = Some((i, flow.priority()));
            }
        }
        best
    }

    /// Removes the flows of the slot for `key` that satisfy the predicate.
    pub(crate) fn drain_slot_where<F>(&mut self, key: &MatchKey, pred: F) -> Vec<Flow<A>>
    where
        F: FnMut(&Flow<A>) -> bool,
    {
        let removed = match self.flows.get_mut(key) {
            Some(slot) => extract(slot, pred),
            None => return Vec::new(),
        };

        if self.flows.get(key).map_or(false, Vec::is_empty) {
            self.flows.remove(key);
        }
        self.len -= removed.len();
        removed
    }

    /// Removes every flow of the bucket that satisfies the predicate.
    pub(crate) fn drain_where<F>(&mut self, mut pred: F) -> Vec<Flow<A>>
    where
        F: FnMut(&Flow<A>) -> bool,
    {
        let mut removed = vec![];
        for slot in self.flows.values_mut() {
            removed.extend(extract(slot, &mut pred));
        }

        if !removed.is_empty() {
            self.flows.retain(|_, slot| !slot.is_empty());
            self.len -= removed.len();
        }
        removed
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Flow<A>> {
        self.flows.values().flatten()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Flow<A>> {
        self.flows.values_mut().flatten()
    }
}

/// Moves the elements satisfying the predicate out of the vec, keeping the
/// order of the rest.
fn extract<T, F>(items: &mut Vec<T>, mut pred: F) -> Vec<T>
where
    F: FnMut(&T) -> bool,
{
    let mut removed = vec![];
    let mut i = 0;
    while i < items.len() {
        if pred(&items[i]) {
            removed.push(items.remove(i));
        } else {
            i += 1;
        }
    }
    removed
}

impl<A> fmt::Debug for Bucket<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("bucket")
            .field("mask", &self.mask)
            .field("keys", &self.flows.len())
            .field("flows", &self.len)
            .finish()
    }
}
