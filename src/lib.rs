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

//! A prefork, TLS-terminating HTTP/1.1 and HTTP/2 server.
//!
//! The reusable engine lives here; `src/bin/raskd.rs` is the thin process
//! entry point that loads configuration, builds TLS and routing context,
//! and hands control to the [`supervisor`].

pub mod config;
pub mod connection;
pub mod hpack;
pub mod net;
pub mod parser;
pub mod reactor;
pub mod response;
pub mod router;
pub mod supervisor;
pub mod tls;
pub mod worker;
