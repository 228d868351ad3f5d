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

//! Concrete rectangle encoders.
//!
//! Each module implements one encoder class behind the
//! [`Encoder`](crate::encoder::Encoder) contract. The pipeline treats
//! them as black boxes; only the capability flags and tuning state leak
//! out.

pub mod common;
pub mod hextile;
pub mod raw;
pub mod rre;
pub mod tight;
pub mod tightjpeg;
pub mod zrle;

pub use hextile::HextileEncoder;
pub use raw::RawEncoder;
pub use rre::RreEncoder;
pub use tight::TightEncoder;
pub use tightjpeg::TightJpegEncoder;
pub use zrle::ZrleEncoder;
