//! A lightweight client for sending application metrics to an [ffwd] agent.
//!
//! [ffwd]: https://github.com/spotify/ffwd
//!
//! # Usage
//!
//! Build one [`MetricRelay`] per service (or per logical component), mutate
//! named metrics through it, and flush when you want the current state sent:
//!
//! ```no_run
//! use ffwd_client::MetricRelay;
//!
//! # fn main() -> Result<(), ffwd_client::BuildError> {
//! let mut relay = MetricRelay::builder("my-service")
//!     .with_default_attribute("component", "ingest")
//!     .build()?;
//!
//! relay.incr("requests");
//!
//! {
//!     let _scope = relay.timer("request-latency").start_scoped();
//!     // handle the request; the timer stops when the scope ends
//! }
//!
//! relay.flush();
//!
//! // One-off events bypass stored state entirely.
//! relay.emit("deploy-finished", 1.0);
//! # Ok(())
//! # }
//! ```
//!
//! # Transports
//!
//! By default the relay sends one JSON datagram per metric to
//! `127.0.0.1:19000` over UDP. With
//! [`with_http_path`](MetricRelayBuilder::with_http_path) (or
//! [`with_http_transport`](MetricRelayBuilder::with_http_transport)) it
//! instead issues a synchronous HTTP POST carrying all points of a flush.
//!
//! Either way, delivery is fire-and-forget: an unreachable agent, a refused
//! connection, a timeout, or a non-2xx response is logged and dropped, never
//! surfaced to the instrumented application. Configuration mistakes, on the
//! other hand, fail fast at [`MetricRelayBuilder::build`].
//!
//! # Threading
//!
//! The relay holds plain in-memory maps with no internal locking. Share it
//! across threads only behind your own synchronization.

#![deny(clippy::all)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![deny(missing_docs)]

mod builder;
pub use self::builder::{BuildError, MetricRelayBuilder, DEFAULT_AGENT_HOST, DEFAULT_AGENT_PORT};

mod metric;
pub use self::metric::{Counter, Metric, Timer, TimerError, TimerGuard};

mod payload;
pub use self::payload::{AttributeValue, Attributes, MetricPayload, Resources};

mod forwarder;
mod relay;
pub use self::relay::MetricRelay;
