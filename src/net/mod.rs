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

//! Transport-layer types: a blocking `TcpStream`/`TcpListener` abstraction
//! (so tests can substitute a fake) and the tagged `Connection` that rides
//! through the connection queue into a worker or session.

mod connection;
mod tcp_listener;
mod tcp_stream;

pub use connection::{Connection, Security};
pub use tcp_listener::{StdTcpListener, TcpListener};
pub use tcp_stream::TcpStream;
