// Copyright 2023 Mikael Lund
//
// Licensed under the Apache license, version 2.0 (the "license");
// you may not use this file except in compliance with the license.
// You may obtain a copy of the license at
//
//     http://www.apache.org/licenses/license-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the license is distributed on an "as is" basis,
// without warranties or conditions of any kind, either express or implied.
// See the license for the specific language governing permissions and
// limitations under the license.

//! Progress and cancellation hooks for a generation run.

use super::{Job, RunState};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives progress from the generator and may request cancellation.
///
/// Cancellation is polled once per job, before the job directory is claimed.
pub trait Observer {
    /// Called on every state transition.
    fn on_state(&mut self, _state: RunState) {}
    /// Called before the jobs of a receptor are laid out.
    fn on_receptor(&mut self, _index: usize, _receptor: &Path) {}
    /// Called after a job directory is complete or found to exist.
    fn on_job(&mut self, _job: &Job) {}
    fn cancel_requested(&self) -> bool {
        false
    }
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Observer for Silent {}

/// Shared cancellation flag, e.g. set from a signal handler.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Observer for CancelToken {
    fn cancel_requested(&self) -> bool {
        self.is_cancelled()
    }
}
