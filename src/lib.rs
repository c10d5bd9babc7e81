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

//! Core of the CQC web server: the connection/worker/dispatch engine and the
//! WebSocket session core (framing, session loop, script and RIVA variants).
//!
//! The HTTP/1.1 wire parser, TLS cipher suite, image codecs, rendering
//! primitives and credential cryptography are external collaborators and are
//! exposed here only as narrow trait contracts (see [`collaborators`]).

pub mod auth;
pub mod collaborators;
pub mod config;
pub mod facility;
pub mod handlers;
pub mod http;
pub mod net;
pub mod queue;
pub mod riva;
pub mod router;
pub mod ws;

mod listener;
mod worker;

pub use facility::Facility;
pub use listener::Listener;
pub use queue::ConnectionQueue;
pub use worker::Worker;
