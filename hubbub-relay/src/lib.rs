//! # hubbub-relay
//!
//! Chat and file relay server for Hubbub.
//!
//! This crate implements a relay server that:
//! - Accepts TCP connections from clients speaking the framed Hubbub protocol
//! - Registers each connection under a unique identity
//! - Routes broadcasts, direct messages, and chunked file streams between
//!   connections
//! - Never persists anything to disk beyond its logs
//!
//! ## Architecture
//!
//! ```text
//! alice ──┐                      ┌── bob
//!         │    framed TCP        │
//!         ├─────────────────────►│
//!         │                      │
//!     ┌───┴──────────────────────┴───┐
//!     │        hubbub-relay          │
//!     │  ┌────────────────────────┐  │
//!     │  │ Registry (in memory)   │  │
//!     │  └────────────────────────┘  │
//!     └──────────────────────────────┘
//! ```
//!
//! ## Protocol
//!
//! One router task per connection:
//! - JOIN → WELCOME (identity claim, uniqueness enforced by the registry)
//! - LINE → chat broadcast, `/list`, `@user` direct message, `/sendfile`,
//!   `/quit`
//! - FILE_OFFER → FILE_ACCEPT / FILE_REJECT → FILE_PREPARE → FILE_CHUNK* →
//!   FILE_DONE (the relay streams chunks without reconstructing the file)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod limits;
pub mod registry;
pub mod router;
pub mod server;
pub mod transfer;
