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

//! Error types for the encoding pipeline.

use std::io;
use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, VncError>;

/// Errors that can occur while encoding updates or handling the
/// auxiliary wire messages.
#[derive(Debug, Error)]
pub enum VncError {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed data on the wire. Fatal to the connection.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// A message was requested that the peer has not advertised
    /// support for.
    #[error("Peer does not support {0}")]
    PeerUnsupported(&'static str),

    /// Invalid pixel format.
    #[error("Invalid pixel format")]
    InvalidPixelFormat,

    /// Encoding error.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Invalid operation or state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}
