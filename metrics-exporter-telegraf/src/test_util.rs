use std::{collections::VecDeque, io, net::SocketAddr};

use crate::{
    host::{Bandwidth, ServerCounters, ServerStats},
    transport::{SendOutcome, Transport, TransportEvent},
};

/// A transport that records everything handed to it and replays scripted events.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    pub connects: Vec<SocketAddr>,
    pub sent: Vec<String>,
    pub open: bool,
    pub connect_error: Option<io::ErrorKind>,
    pub send_error: Option<io::ErrorKind>,
    pub backlog_full: bool,
    events: VecDeque<TransportEvent>,
}

impl ScriptedTransport {
    pub fn push_event(&mut self, event: TransportEvent) {
        self.events.push_back(event);
    }
}

impl Transport for ScriptedTransport {
    fn connect(&mut self, remote: SocketAddr) -> io::Result<()> {
        self.connects.push(remote);
        if let Some(kind) = self.connect_error.take() {
            return Err(kind.into());
        }

        self.open = true;
        Ok(())
    }

    fn poll(&mut self) -> Option<TransportEvent> {
        if !self.open {
            return None;
        }

        let event = self.events.pop_front()?;
        if matches!(event, TransportEvent::Failed(_)) {
            self.open = false;
        }
        Some(event)
    }

    fn send(&mut self, buf: &[u8]) -> io::Result<SendOutcome> {
        if !self.open {
            return Err(io::ErrorKind::NotConnected.into());
        }
        if let Some(kind) = self.send_error.take() {
            self.open = false;
            return Err(kind.into());
        }
        if self.backlog_full {
            return Ok(SendOutcome::Dropped);
        }

        self.sent.push(String::from_utf8_lossy(buf).into_owned());
        Ok(SendOutcome::Queued)
    }

    fn close(&mut self) {
        self.open = false;
    }
}

/// Host counters backed by plain fields.
#[derive(Clone, Debug, Default)]
pub struct FakeCounters {
    pub server_name: String,
    pub users: Option<u64>,
    pub bandwidth: Option<Bandwidth>,
    pub whowas: Option<String>,
    pub stats: Option<ServerStats>,
    pub sockets: Option<u64>,
}

impl FakeCounters {
    pub fn named(server_name: &str) -> Self {
        Self { server_name: server_name.to_string(), ..Default::default() }
    }

    pub fn populated() -> Self {
        Self {
            server_name: "irc.example.net".to_string(),
            users: Some(42),
            bandwidth: Some(Bandwidth { rate_in: 1024.0, rate_out: 512.5, rate_total: 1536.5 }),
            whowas: Some("Whowas entries: 12 (3456 bytes)".to_string()),
            stats: Some(ServerStats {
                data_sent: 1_048_576,
                data_recv: 524_288,
                dns: 10,
                dns_good: 8,
                dns_bad: 2,
                sock_accepts: 30,
                sock_refused: 1,
                connects: 25,
                nick_collisions: 0,
                cmd_unknown: 3,
            }),
            sockets: Some(17),
        }
    }
}

impl ServerCounters for FakeCounters {
    fn server_name(&self) -> &str {
        &self.server_name
    }

    fn local_user_count(&self) -> Option<u64> {
        self.users
    }

    fn bandwidth(&self) -> Option<Bandwidth> {
        self.bandwidth
    }

    fn whowas_stats(&self) -> Option<String> {
        self.whowas.clone()
    }

    fn server_stats(&self) -> Option<ServerStats> {
        self.stats
    }

    fn open_sockets(&self) -> Option<u64> {
        self.sockets
    }
}
