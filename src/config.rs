// Copyright 2025 Dustin McAfee
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

//! Process-wide tunables.
//!
//! Settings here apply to every connection in the process. Pipeline
//! geometry constants (sub-rectangle split limits, solid search block
//! size, worker cap) are deliberately compile-time constants and live
//! next to the code that uses them.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Default cap on incoming and outgoing clipboard payloads, in bytes.
pub const DEFAULT_MAX_CUT_TEXT: usize = 256 * 1024;

static MAX_CUT_TEXT: AtomicUsize = AtomicUsize::new(DEFAULT_MAX_CUT_TEXT);

/// Maximum permitted length of a clipboard update, in bytes.
///
/// Messages larger than this are skipped on the wire and dropped.
#[must_use]
pub fn max_cut_text() -> usize {
    MAX_CUT_TEXT.load(Ordering::Relaxed)
}

/// Override the clipboard size cap for the whole process.
pub fn set_max_cut_text(limit: usize) {
    MAX_CUT_TEXT.store(limit, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limit() {
        assert_eq!(DEFAULT_MAX_CUT_TEXT, 262144);
    }
}
