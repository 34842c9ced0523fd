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
use hashbrown::HashSet;
use std::sync::Mutex;

/// Executables that are enqueued or currently being uploaded.
///
/// Hash sets never give back memory on removal. The set is shrunk whenever
/// the peak size exceeds the current size by more than `shrink_ratio`.
pub struct InProgressTracker {
    state: Mutex<State>,
    shrink_ratio: f64,
}

#[derive(Default)]
struct State {
    ids: HashSet<FileId>,
    max_size_seen: usize,
}

impl InProgressTracker {
    pub fn new(shrink_ratio: f64) -> Self {
        Self {
            state: Mutex::default(),
            shrink_ratio,
        }
    }

    /// Marks `file_id` as in progress. Returns whether it already was.
    pub fn get_or_add(&self, file_id: FileId) -> bool {
        let mut state = self.state.lock().unwrap();
        let already = !state.ids.insert(file_id);
        state.max_size_seen = state.max_size_seen.max(state.ids.len());
        already
    }

    pub fn remove(&self, file_id: FileId) {
        let mut state = self.state.lock().unwrap();
        state.ids.remove(&file_id);

        let len = state.ids.len() as f64;
        let limit = (len + len * self.shrink_ratio) as usize;
        if self.shrink_ratio > 0.0 && limit < state.max_size_seen {
            state.ids.shrink_to_fit();
            state.max_size_seen = state.ids.len();
        }
    }

    pub fn contains(&self, file_id: FileId) -> bool {
        self.state.lock().unwrap().ids.contains(&file_id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().ids.len()
    }

    /// Largest size seen since the set was last shrunk.
    pub fn peak(&self) -> usize {
        self.state.lock().unwrap().max_size_seen
    }
}

/// Removes an executable from the tracker when dropped.
pub struct InProgressGuard<'a> {
    tracker: &'a InProgressTracker,
    file_id: FileId,
}

impl<'a> InProgressGuard<'a> {
    pub fn new(tracker: &'a InProgressTracker, file_id: FileId) -> Self {
        Self { tracker, file_id }
    }
}

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.tracker.remove(self.file_id);
    }
}
