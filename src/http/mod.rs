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

//! HTTP request/response types (§3) and the blocking request reader that
//! stands in for the (out of scope) HTTP/1.1 wire parser.

pub mod headers;
pub mod method;
pub mod query;
pub mod request;
pub mod response;
pub mod status;
pub mod version;

pub use headers::HeaderMap;
pub use method::Method;
pub use query::QueryParams;
pub use request::{read_request, ReadRequestError, Request};
pub use response::Response;
pub use status::Status;
pub use version::Version;
