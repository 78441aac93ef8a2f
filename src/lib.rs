//! moordns - DNS for running containers.
//!
//! moordns answers A/AAAA queries for container names by keeping an
//! in-memory FQDN -> record map continuously synchronized against the
//! Docker engine's live state:
//!
//! ```text
//!  ┌────────────────┐  events   ┌──────────────┐  writes   ┌─────────────┐
//!  │ Docker engine  │──────────▶│ ContainerDns │──────────▶│ RecordCache │
//!  │ (bollard)      │◀──────────│ (sync engine)│           └──────┬──────┘
//!  └────────────────┘  list /   └──────────────┘            reads │
//!                      inspect                                    ▼
//!                                                          ┌─────────────┐
//!                                               UDP/TCP ──▶│ DNS server  │
//!                                                          │ (hickory)   │
//!                                                          └─────────────┘
//! ```
//!
//! The engine snapshots the container list at startup, then follows the
//! engine's connect/disconnect/rename events. When the event stream is
//! disrupted the cache is discarded and rebuilt from a fresh listing, so
//! queries are never served from state the engine could not confirm.
//! Queries only ever read the cache; container API latency never shows up
//! in query latency.

pub mod cache;
pub mod config;
pub mod directory;
pub mod docker;
pub mod error;
pub mod records;
pub mod server;
pub mod sync;

pub use cache::RecordCache;
pub use config::Config;
pub use directory::{ChangeEvent, ContainerDirectory, ContainerInfo, EventStream, NetworkAttachment};
pub use docker::DockerDirectory;
pub use error::{Error, Result};
pub use records::{DnsRecord, RecordKind};
pub use server::run_dns_server;
pub use sync::ContainerDns;
