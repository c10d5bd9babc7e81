// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The bailout flag (§3, §4.9, §9): a process-wide-but-session-scoped flag
//! that, once set, unwinds every nested faux-GUI drain loop and releases
//! every waiting action dispatcher with a "stop" result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable handle to one session's bailout flag.
#[derive(Clone, Default)]
pub struct BailoutFlag(Arc<AtomicBool>);

impl BailoutFlag {
    /// A fresh, unset flag.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Sets the flag. Idempotent: setting twice is a no-op, defending
    /// against the double-free/second-join hazard §4.9 calls out.
    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether the flag has been set.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_is_idempotent_and_visible_across_clones() {
        let a = BailoutFlag::new();
        let b = a.clone();
        assert!(!b.is_set());
        a.set();
        a.set();
        assert!(b.is_set());
    }
}
