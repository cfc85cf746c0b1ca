use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::{
    exporter::{LifecycleError, TelegrafExporter},
    host::{NoticeSink, ServerCounters},
    line::MetricLine,
    transport::Transport,
};

/// Errors from parsing an operator command.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// The command verb is missing or unknown.
    #[error("SYNTAX TELEGRAF {{start|stop|restart|status|sample}} [<servername>]")]
    Usage,
}

/// An operator command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Start pushing metrics.
    Start,

    /// Stop pushing metrics.
    Stop,

    /// Stop, then start again.
    Restart,

    /// Report whether metrics are being pushed.
    Status,

    /// Show the record the next flush would push.
    Sample,
}

impl Command {
    /// Every command, in the order they are listed in the syntax line.
    pub const ALL: [Command; 5] =
        [Command::Start, Command::Stop, Command::Restart, Command::Status, Command::Sample];

    /// Returns the verb for this command.
    pub const fn as_str(self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Restart => "restart",
            Command::Status => "status",
            Command::Sample => "sample",
        }
    }

    /// Runs the command against `exporter`, returning the status lines to show the operator.
    pub fn execute<C, N, T>(self, exporter: &mut TelegrafExporter<C, N, T>) -> Vec<String>
    where
        C: ServerCounters,
        N: NoticeSink,
        T: Transport,
    {
        let result = match self {
            Command::Start => exporter.start().map(|()| reply("Telegraf metrics started")),
            Command::Stop => exporter.stop().map(|()| reply("Telegraf metrics stopped")),
            Command::Restart => exporter.restart().map(|()| reply("Telegraf metrics restarted")),
            Command::Status => {
                if exporter.is_running() {
                    Ok(reply("Telegraf metrics running"))
                } else {
                    Ok(reply("Telegraf metrics not running"))
                }
            }
            Command::Sample => match exporter.sample() {
                Ok(line) => Ok(describe(&line)),
                Err(LifecycleError::NotRunning) => {
                    Ok(reply("Telegraf metrics don't appear to be running"))
                }
                Err(e) => Err(e),
            },
        };

        result.unwrap_or_else(|e| vec![e.to_string()])
    }
}

fn reply(line: &str) -> Vec<String> {
    vec![line.to_string()]
}

fn describe(line: &MetricLine) -> Vec<String> {
    let mut lines = Vec::with_capacity(line.tags().len() + line.fields().len() + 4);
    lines.push(format!("Name: {}", line.name()));
    lines.push("Tags:".to_string());
    lines.extend(line.tags().iter().map(|(k, v)| format!("    {k}={v}")));
    lines.push("Values:".to_string());
    lines.extend(line.fields().iter().map(|(k, v)| format!("    {k}={v}")));
    lines.push("End of metrics".to_string());
    lines
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL.into_iter().find(|cmd| cmd.as_str() == s).ok_or(CommandError::Usage)
    }
}

/// Handles an operator command line.
///
/// The first argument is the verb. A second argument naming a target server may be present, but routing the command
/// to that server is up to the host, so it is ignored here.
///
/// # Errors
///
/// If the verb is missing or unknown, [`CommandError::Usage`] is returned and the exporter is left untouched.
pub fn handle_command<C, N, T, S>(
    exporter: &mut TelegrafExporter<C, N, T>,
    args: &[S],
) -> Result<Vec<String>, CommandError>
where
    C: ServerCounters,
    N: NoticeSink,
    T: Transport,
    S: AsRef<str>,
{
    let command: Command = args.first().ok_or(CommandError::Usage)?.as_ref().parse()?;
    Ok(command.execute(exporter))
}

#[cfg(test)]
mod tests {
    use quanta::Clock;

    use super::{handle_command, Command, CommandError};
    use crate::{
        builder::TelegrafBuilder,
        exporter::TelegrafExporter,
        test_util::{FakeCounters, ScriptedTransport},
        transport::TransportEvent,
    };

    fn exporter() -> TestExporter {
        TelegrafBuilder::new().with_port(8094).build_with(
            FakeCounters::named("irc.example.net"),
            Vec::new(),
            ScriptedTransport::default(),
            Clock::new(),
        )
    }

    type TestExporter = TelegrafExporter<FakeCounters, Vec<String>, ScriptedTransport>;

    fn run(exporter: &mut TestExporter, args: &[&str]) -> Vec<String> {
        handle_command(exporter, args).expect("command should be valid")
    }

    #[test]
    fn parse_verbs() {
        for cmd in Command::ALL {
            assert_eq!(cmd.as_str().parse::<Command>(), Ok(cmd));
        }
        assert_eq!("START".parse::<Command>(), Err(CommandError::Usage));
        assert_eq!("reload".parse::<Command>(), Err(CommandError::Usage));
    }

    #[test]
    fn unknown_or_missing_verb() {
        let mut exporter = exporter();

        let err = handle_command(&mut exporter, &["reload"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "SYNTAX TELEGRAF {start|stop|restart|status|sample} [<servername>]"
        );
        assert_eq!(handle_command::<_, _, _, &str>(&mut exporter, &[]), Err(CommandError::Usage));
        assert!(!exporter.is_running());
    }

    #[test]
    fn lifecycle_replies() {
        let mut exporter = exporter();

        assert_eq!(run(&mut exporter, &["status"]), ["Telegraf metrics not running"]);
        assert_eq!(run(&mut exporter, &["stop"]), ["Telegraf metrics not running"]);
        assert_eq!(run(&mut exporter, &["restart"]), ["Telegraf metrics not running"]);
        assert_eq!(run(&mut exporter, &["start"]), ["Telegraf metrics started"]);
        assert_eq!(run(&mut exporter, &["start"]), ["Telegraf metrics already running"]);
        assert_eq!(run(&mut exporter, &["status"]), ["Telegraf metrics running"]);
        assert_eq!(run(&mut exporter, &["restart"]), ["Telegraf metrics restarted"]);
        assert_eq!(run(&mut exporter, &["stop"]), ["Telegraf metrics stopped"]);
        assert_eq!(run(&mut exporter, &["status"]), ["Telegraf metrics not running"]);
    }

    #[test]
    fn target_server_argument_is_ignored() {
        let mut exporter = exporter();
        assert_eq!(run(&mut exporter, &["start", "hub.example.net"]), ["Telegraf metrics started"]);
    }

    #[test]
    fn start_with_disabled_port() {
        let mut exporter = TelegrafBuilder::new().build_with(
            FakeCounters::named("irc.example.net"),
            Vec::new(),
            ScriptedTransport::default(),
            Clock::new(),
        );

        assert_eq!(
            handle_command(&mut exporter, &["start"]).unwrap(),
            ["Telegraf metrics disabled: no valid port configured"]
        );
    }

    #[test]
    fn sample_output() {
        let mut exporter = exporter();
        assert_eq!(
            run(&mut exporter, &["sample"]),
            ["Telegraf metrics don't appear to be running"]
        );

        run(&mut exporter, &["start"]);
        exporter.transport_mut().push_event(TransportEvent::Connected);
        exporter.poll_io();
        exporter.counters_mut().users = Some(7);

        assert_eq!(
            run(&mut exporter, &["sample"]),
            [
                "Name: ircd",
                "Tags:",
                "    server=irc.example.net",
                "Values:",
                "    users=7",
                "    main_loop_time=0",
                "End of metrics",
            ]
        );
        assert!(exporter.transport().sent.is_empty());
    }
}
