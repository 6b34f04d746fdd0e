//! Slow HTTP upstream used as a fixture when testing reverse-proxy timeout
//! and retry configuration.
//!
//! This crate provides:
//! - **Request reading**: just enough HTTP/1.1 to read one request line,
//!   headers and an optional sized body
//! - **Delay table**: a fixed processing delay picked by request path
//! - **Canned response**: a JSON body echoing what was received
//! - **Service**: a thread-per-connection accept loop with a shutdown handle
//!
//! # Examples
//!
//! ```rust,no_run
//! use foundation_slow_upstream::{ServiceConfig, SlowUpstreamService};
//!
//! let service = SlowUpstreamService::bind(ServiceConfig::default()).unwrap();
//! let shutdown = service.shutdown_handle();
//!
//! // stop accepting from anywhere, e.g. a signal handler
//! std::thread::spawn(move || shutdown.stop());
//!
//! service.serve().unwrap();
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod delays;
pub mod errors;
pub mod request;
pub mod response;
pub mod service;

pub use config::{ServiceConfig, BIND_ADDRESS, DEFAULT_PORT};
pub use delays::ProcessingDelay;
pub use errors::{ConnectionError, ConnectionResult, ServiceError, ServiceResult};
pub use request::{read_request, IncomingRequest, RequestHeaders};
pub use response::ProcessedResponse;
pub use service::{
    is_transient_accept_error, RunningService, ShutdownHandle, SlowUpstreamService,
};
