use std::{
    collections::VecDeque,
    io::{BufRead as _, BufReader},
    net::TcpListener,
    thread,
    time::{Duration, Instant},
};

use metrics_exporter_telegraf::{Bandwidth, NoticeSink, ServerCounters, TelegrafBuilder};

struct Server {
    started: Instant,
    users: u64,
}

impl ServerCounters for Server {
    fn server_name(&self) -> &str {
        "irc.example.net"
    }

    fn local_user_count(&self) -> Option<u64> {
        Some(self.users)
    }

    fn bandwidth(&self) -> Option<Bandwidth> {
        let secs = self.started.elapsed().as_secs_f64();
        Some(Bandwidth { rate_in: secs * 2.0, rate_out: secs, rate_total: secs * 3.0 })
    }

    fn whowas_stats(&self) -> Option<String> {
        Some(format!("Whowas entries: {} ({} bytes)", self.users / 2, self.users * 64))
    }
}

struct Notices;

impl NoticeSink for Notices {
    fn notice(&mut self, message: &str) {
        tracing::info!("{message}");
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    // Stand in for Telegraf's socket_listener input.
    let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind listener");
    let port = listener.local_addr().expect("listener has no local address").port();
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            for line in BufReader::new(stream).lines().map_while(Result::ok) {
                tracing::info!(%line, "Telegraf received line.");
            }
        }
    });

    let mut exporter = TelegrafBuilder::new()
        .with_port(i64::from(port))
        .with_reconnect_interval(Duration::from_secs(5))
        .build(Server { started: Instant::now(), users: 0 }, Notices);
    exporter.activate();

    let mut deferred = VecDeque::new();
    let mut last_tick = Instant::now();

    // Pretend to be a server event loop, with a bit of work in every pass.
    loop {
        exporter.on_loop_timer(&mut deferred);
        exporter.poll_io();

        thread::sleep(Duration::from_millis(5));
        exporter.counters_mut().users += 1;

        while let Some(action) = deferred.pop_front() {
            exporter.run_deferred(action);
        }

        if last_tick.elapsed() >= Duration::from_secs(1) {
            exporter.background_tick();
            last_tick = Instant::now();
        }
    }
}
