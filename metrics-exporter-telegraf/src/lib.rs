//! An embeddable agent for pushing server counters to a local [Telegraf][telegraf] instance.
//!
//! [telegraf]: https://www.influxdata.com/time-series-platform/telegraf/
//!
//! # Usage
//!
//! The exporter lives inside a host process with its own event loop, and is driven entirely by that loop: it never
//! spawns threads and never blocks.
//!
//! ```no_run
//! # use std::collections::VecDeque;
//! # use metrics_exporter_telegraf::{ServerCounters, TelegrafBuilder};
//! struct Host;
//!
//! impl ServerCounters for Host {
//!     fn server_name(&self) -> &str {
//!         "irc.example.net"
//!     }
//!
//!     fn local_user_count(&self) -> Option<u64> {
//!         Some(42)
//!     }
//! }
//!
//! // Operator notices are collected into a `Vec<String>` here, but any `NoticeSink` will do.
//! let mut exporter = TelegrafBuilder::new().with_port(8094).build(Host, Vec::new());
//!
//! // Activating connects to 127.0.0.1:8094 if a valid port was configured.
//! exporter.activate();
//!
//! let mut deferred = VecDeque::new();
//! loop {
//!     // Once per loop iteration, mark the start of the iteration, and later in the same pass, run whatever the
//!     // exporter deferred so it can measure how long the pass took.
//!     exporter.on_loop_timer(&mut deferred);
//!     exporter.poll_io();
//!     while let Some(action) = deferred.pop_front() {
//!         exporter.run_deferred(action);
//!     }
//!
//!     // Every few seconds, on the host's coarse timer:
//!     exporter.background_tick();
//! #   break;
//! }
//! ```
//!
//! # Features
//!
//! ## Line protocol
//!
//! Every flush pushes a single record in the [InfluxDB line protocol][line_protocol], tagged with the server name, with
//! one field per available host counter plus the average main loop time, in microseconds, since the previous flush.
//! Counters the host cannot provide are left out rather than being reported as zero.
//!
//! [line_protocol]: https://docs.influxdata.com/influxdb/v1/write_protocols/line_protocol_reference/
//!
//! ## Reconnecting
//!
//! When the connection fails, the exporter waits for the configured reconnect interval (60 seconds by default) and
//! then tries again, for as long as it takes. A zero interval disables reconnecting.
//!
//! ## Operator commands
//!
//! [`handle_command`] implements the `start`, `stop`, `restart`, `status` and `sample` operator commands, returning
//! the status lines to show the operator.
//!
//! ## Telemetry
//!
//! The exporter counts its own connection attempts, connection errors, and lines and bytes sent or dropped, through
//! the [`metrics`] facade, under the `telegraf.exporter` namespace. Nothing is recorded unless the host has installed
//! a recorder.
//!
//! # Missing
//!
//! ## Remote collectors
//!
//! The collector is always expected on the loopback interface. Pushing to a remote host is not supported.
//!
//! ## Buffering across disconnects
//!
//! Records are not kept while disconnected: a flush is simply skipped, and the loop-lag samples carry over to the first
//! flush after reconnecting.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]

mod builder;
pub use self::builder::{TelegrafBuilder, TelegrafConfig};

mod client;
pub use self::client::{ClientEvent, ConnectionState, PushClient, ReconnectPolicy};

mod control;
pub use self::control::{handle_command, Command, CommandError};

mod exporter;
pub use self::exporter::{LifecycleError, TelegrafExporter};

mod host;
pub use self::host::{
    ActionQueue, Bandwidth, DeferredAction, NoticeSink, ServerCounters, ServerStats,
};

mod line;
pub use self::line::{escape_field_value, escape_tag, MetricLine};

mod loop_lag;
pub use self::loop_lag::LoopLagMonitor;

mod snapshot;
pub use self::snapshot::SnapshotBuilder;

mod telemetry;

mod transport;
pub use self::transport::{SendOutcome, TcpTransport, Transport, TransportEvent};

#[cfg(test)]
mod test_util;
