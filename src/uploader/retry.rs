// Copyright Elasticsearch B.V. and/or licensed to Elasticsearch B.V. under one
// or more contributor license agreements. See the NOTICE file distributed with
// this work for additional information regarding copyright
// ownership. Elasticsearch B.V. licenses this file to you under
// the Apache License, Version 2.0 (the "License"); you may
// not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//	http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use crate::fileid::FileId;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Outcome of an upload attempt that suppresses further attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NeverRetry,
    RetryAfter(Instant),
}

/// Bounded store of retry decisions.
///
/// Executables without a decision are eligible for upload. Decisions are
/// forgotten when evicted, which merely results in another negotiation with
/// the symbol store.
pub struct RetryCache {
    decisions: Mutex<LruCache<FileId, RetryDecision>>,
}

impl RetryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            decisions: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn never_retry(&self, file_id: FileId) {
        self.decisions
            .lock()
            .unwrap()
            .put(file_id, RetryDecision::NeverRetry);
    }

    /// Suppress uploads of `file_id` for the given duration.
    pub fn retry_after(&self, file_id: FileId, ttl: Duration) {
        let deadline = Instant::now() + ttl;
        self.decisions
            .lock()
            .unwrap()
            .put(file_id, RetryDecision::RetryAfter(deadline));
    }

    /// Whether an unexpired decision exists for `file_id`.
    pub fn contains(&self, file_id: FileId) -> bool {
        self.contains_at(file_id, Instant::now())
    }

    pub fn contains_at(&self, file_id: FileId, now: Instant) -> bool {
        let mut decisions = self.decisions.lock().unwrap();
        match decisions.get(&file_id).copied() {
            None => false,
            Some(RetryDecision::NeverRetry) => true,
            Some(RetryDecision::RetryAfter(deadline)) if now < deadline => true,
            Some(RetryDecision::RetryAfter(_)) => {
                decisions.pop(&file_id);
                false
            }
        }
    }

    pub fn decision(&self, file_id: FileId) -> Option<RetryDecision> {
        self.decisions.lock().unwrap().peek(&file_id).copied()
    }
}
