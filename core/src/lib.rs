//! Blocking client for an accounting service's XML API.
//!
//! # Overview
//! Lists clients, projects, tasks and staff, paging through the service until
//! each list is exhausted, and creates or updates time entries. Every call is
//! an XML envelope POSTed to one endpoint with basic auth.
//!
//! # Design
//! - `Api` owns its accumulators; list accessors append to them and return
//!   the whole container, so results are cumulative over the client's life.
//! - Paging is a plain loop over `ListResource`, one trait impl per record
//!   type, instead of one copy of the loop per resource.
//! - The network sits behind `Transport`. `UreqTransport` is the default;
//!   tests script responses in memory or run against `mock-server`.
//! - Failures are fail-fast and never retried. `ApiError` keeps transport,
//!   decode and remote errors apart.

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod http;
pub mod types;

pub use client::{Accumulators, Api, Collected, DEFAULT_PER_PAGE};
pub use config::AuthConfig;
pub use envelope::{ListResource, Pagination};
pub use error::{ApiError, ConfigError};
pub use http::{HttpRequest, HttpResponse, Transport, UreqTransport};
pub use types::{Client, Project, Task, TimeEntry, User};
