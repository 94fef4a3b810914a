//! Typed GTP client in front of a [`Transport`].
//!
//! A client asks the engine for `list_commands` as soon as it is launched and
//! refuses to send anything outside of that set. Every typed command is a
//! blocking call: submit, wait for the matching completion, check the status
//! marker.
//!
//! Clients move through a small state machine:
//!
//! ```text
//! Stopped --wakeup/launch--> Starting --> Running --sleep/shutdown--> Stopping --> Stopped
//! ```
//!
//! A [`Lifecycle::Lazy`] client can go back and forth between `Running` and
//! `Stopped` with [`EngineClient::sleep`] and [`EngineClient::wakeup`], so that
//! large pools do not keep every engine process alive between games.

use std::collections::HashSet;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::error::GtpError;
use crate::query::{AnalysisEvent, AnalysisKind, Query, QueryKind};
use crate::transport::Transport;
use crate::vertex::{Color, Vertex};

/// Commands every player engine must advertise.
pub const PLAYER_COMMANDS: [&str; 12] = [
    "name",
    "version",
    "protocol_version",
    "list_commands",
    "clear_board",
    "boardsize",
    "showboard",
    "komi",
    "play",
    "undo",
    "genmove",
    "quit",
];

/// Extra commands a judge must advertise.
pub const JUDGE_COMMANDS: [&str; 2] = ["final_score", "is_legal"];

/// Streaming genmove variants, in order of preference.
const GENMOVE_ANALYZE_COMMANDS: [&str; 3] =
    ["kata-genmove_analyze", "lz-genmove_analyze", "genmove_analyze"];

/// Time a process gets to exit after `quit`.
const QUIT_GRACE: Duration = Duration::from_secs(1);

/// What an engine is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Generates moves in games.
    Player,
    /// Checks legality and scores finished games.
    Judge,
}

impl Role {
    /// Commands the engine must support to take this role.
    pub fn required_commands(self) -> Vec<&'static str> {
        let mut required = PLAYER_COMMANDS.to_vec();
        if self == Role::Judge {
            required.extend(JUDGE_COMMANDS);
        }
        required
    }
}

/// Whether the engine process stays up between games.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    /// Launched once, kept alive for the whole run.
    #[default]
    AlwaysOn,
    /// Relaunched on [`EngineClient::wakeup`], torn down on [`EngineClient::sleep`].
    Lazy,
}

/// Process state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No process.
    Stopped,
    /// Process spawned, capabilities being negotiated.
    Starting,
    /// Ready for commands.
    Running,
    /// Shutting the process down.
    Stopping,
}

/// How a client is launched and how it reports failures.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    role: Role,
    lifecycle: Lifecycle,
    raise_errors: bool,
    forward_stderr: bool,
}

impl EngineOptions {
    /// Always-on player raising errors.
    pub fn player() -> Self {
        Self {
            role: Role::Player,
            lifecycle: Lifecycle::AlwaysOn,
            raise_errors: true,
            forward_stderr: false,
        }
    }

    /// Always-on judge raising errors.
    pub fn judge() -> Self {
        Self {
            role: Role::Judge,
            ..Self::player()
        }
    }

    /// Sets the lifecycle.
    pub fn with_lifecycle(mut self, lifecycle: Lifecycle) -> Self {
        self.lifecycle = lifecycle;
        self
    }

    /// When disabled, `?` responses are returned as text and refused
    /// commands are only logged by [`EngineClient::send`].
    pub fn with_raise_errors(mut self, value: bool) -> Self {
        self.raise_errors = value;
        self
    }

    /// Copy the engine's stderr to the host's stderr.
    pub fn with_forward_stderr(mut self, value: bool) -> Self {
        self.forward_stderr = value;
        self
    }

    /// Role checked at launch.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Lifecycle of the process.
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::player()
    }
}

/// A GTP engine process behind typed, blocking calls.
#[derive(Debug)]
pub struct EngineClient {
    command: String,
    options: EngineOptions,
    transport: Option<Transport>,
    commands: HashSet<String>,
    state: EngineState,
}

impl EngineClient {
    /// Launches `command`, negotiates capabilities and checks them against the role.
    #[instrument(skip(options), fields(role = ?options.role))]
    pub fn launch(command: &str, options: EngineOptions) -> Result<EngineClient, GtpError> {
        let mut client = EngineClient {
            command: command.to_string(),
            options,
            transport: None,
            commands: HashSet::new(),
            state: EngineState::Stopped,
        };
        client.start()?;
        client.check_role()?;
        Ok(client)
    }

    /// Stops the engine when it lacks a command its role needs.
    fn check_role(&mut self) -> Result<(), GtpError> {
        let missing: Vec<String> = self
            .options
            .role
            .required_commands()
            .into_iter()
            .filter(|c| !self.supports(c))
            .map(String::from)
            .collect();
        if !missing.is_empty() {
            self.shutdown();
            return Err(GtpError::IncompatibleEngine {
                engine: self.command.clone(),
                missing,
            });
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), GtpError> {
        if self.state == EngineState::Running {
            return Ok(());
        }
        self.state = EngineState::Starting;

        let transport = match Transport::spawn(&self.command, self.options.forward_stderr) {
            Ok(transport) => transport,
            Err(e) => {
                self.state = EngineState::Stopped;
                return Err(e);
            }
        };

        let negotiated = transport
            .submit("list_commands", QueryKind::Normal)
            .and_then(|_| transport.take_completed(true));
        self.commands = match negotiated {
            Ok(Some(query)) if !query.failed() => {
                query.text().split_whitespace().map(String::from).collect()
            }
            Ok(_) => {
                warn!(engine = %self.command, "list_commands unavailable, assuming it is the only command");
                HashSet::from(["list_commands".to_string()])
            }
            Err(e) => {
                self.state = EngineState::Stopped;
                return Err(e);
            }
        };
        debug!(engine = %self.command, commands = self.commands.len(), "capabilities negotiated");

        self.transport = Some(transport);
        self.state = EngineState::Running;
        Ok(())
    }

    /// Launch command of the engine.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Options the client was launched with.
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Current process state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Commands advertised by the engine.
    pub fn commands(&self) -> &HashSet<String> {
        &self.commands
    }

    /// True when `command` was advertised by the engine.
    pub fn supports(&self, command: &str) -> bool {
        self.commands.contains(command)
    }

    /// True while the engine process runs.
    pub fn is_alive(&mut self) -> bool {
        self.state == EngineState::Running
            && self.transport.as_mut().is_some_and(Transport::is_alive)
    }

    fn transport(&self) -> Result<&Transport, GtpError> {
        match (self.state, &self.transport) {
            (EngineState::Running, Some(transport)) => Ok(transport),
            _ => Err(GtpError::TransportClosed),
        }
    }

    /// Queues `command args...` without waiting for the response.
    ///
    /// Commands the engine did not advertise are never sent: the call fails
    /// with [`GtpError::NotSupported`], or, when errors are not raised, logs
    /// and returns `Ok(false)`.
    pub fn send(&mut self, command: &str, args: &[&str]) -> Result<bool, GtpError> {
        self.submit(command, args, QueryKind::for_command(command))
    }

    /// Like [`send`](Self::send), streaming the response as analysis events.
    pub fn send_analysis(&mut self, command: &str, args: &[&str]) -> Result<bool, GtpError> {
        self.submit(command, args, QueryKind::Analysis)
    }

    /// Queues a whole command line; its first word is checked like in [`send`](Self::send).
    pub fn send_raw(&mut self, line: &str) -> Result<bool, GtpError> {
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default();
        let args = words.collect::<Vec<_>>();
        self.send(command, &args)
    }

    fn submit(&mut self, command: &str, args: &[&str], kind: QueryKind) -> Result<bool, GtpError> {
        if !self.supports(command) {
            if self.options.raise_errors {
                return Err(GtpError::NotSupported(command.to_string()));
            }
            warn!(engine = %self.command, command, "command not supported, not sent");
            return Ok(false);
        }
        let mut line = command.to_string();
        for arg in args {
            line.push(' ');
            line.push_str(arg);
        }
        self.transport()?.submit(&line, kind)?;
        Ok(true)
    }

    /// Blocks until the oldest outstanding query completes.
    pub fn take_response(&mut self) -> Result<Query, GtpError> {
        self.transport()?
            .take_completed(true)?
            .ok_or(GtpError::TransportClosed)
    }

    /// Next analysis event, waiting for one when `block` is set.
    pub fn analysis_event(&mut self, block: bool) -> Result<Option<AnalysisEvent>, GtpError> {
        self.transport()?.take_analysis_event(block)
    }

    /// Drops every completed query not taken yet.
    pub fn drain_responses(&mut self) -> Result<usize, GtpError> {
        let transport = self.transport()?;
        let mut count = 0;
        while transport.take_completed(false)?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    fn check(&self, query: Query) -> Result<String, GtpError> {
        if query.failed() && self.options.raise_errors {
            return Err(GtpError::EngineError {
                command: query.command().to_string(),
                message: query.text(),
            });
        }
        Ok(query.text())
    }

    /// Sends a command and waits for its response text.
    pub fn call(&mut self, command: &str, args: &[&str]) -> Result<String, GtpError> {
        if !self.send(command, args)? {
            return Err(GtpError::NotSupported(command.to_string()));
        }
        let query = self.take_response()?;
        self.check(query)
    }

    /// `name`
    pub fn name(&mut self) -> Result<String, GtpError> {
        self.call("name", &[])
    }

    /// `version`
    pub fn version(&mut self) -> Result<String, GtpError> {
        self.call("version", &[])
    }

    /// `protocol_version`
    pub fn protocol_version(&mut self) -> Result<String, GtpError> {
        self.call("protocol_version", &[])
    }

    /// `list_commands`, as raw text.
    pub fn list_commands(&mut self) -> Result<String, GtpError> {
        self.call("list_commands", &[])
    }

    /// `clear_board`
    pub fn clear_board(&mut self) -> Result<(), GtpError> {
        self.call("clear_board", &[]).map(drop)
    }

    /// `boardsize`
    pub fn boardsize(&mut self, size: u8) -> Result<(), GtpError> {
        self.call("boardsize", &[&size.to_string()]).map(drop)
    }

    /// `komi`
    pub fn komi(&mut self, komi: f32) -> Result<(), GtpError> {
        self.call("komi", &[&komi.to_string()]).map(drop)
    }

    /// `play`
    pub fn play(&mut self, color: Color, vertex: Vertex) -> Result<(), GtpError> {
        self.call("play", &[&color.to_string(), &vertex.to_string()])
            .map(drop)
    }

    /// `genmove`, parsed into a vertex.
    pub fn genmove(&mut self, color: Color) -> Result<Vertex, GtpError> {
        self.call("genmove", &[&color.to_string()])?.parse()
    }

    /// `undo`
    pub fn undo(&mut self) -> Result<(), GtpError> {
        self.call("undo", &[]).map(drop)
    }

    /// `showboard`
    pub fn showboard(&mut self) -> Result<String, GtpError> {
        self.call("showboard", &[])
    }

    /// `quit`, waiting for the acknowledgement.
    pub fn quit(&mut self) -> Result<(), GtpError> {
        self.call("quit", &[]).map(drop)
    }

    /// `final_score`, judge only.
    pub fn final_score(&mut self) -> Result<String, GtpError> {
        self.call("final_score", &[])
    }

    /// `is_legal`, judge only.
    pub fn is_legal(&mut self, color: Color, vertex: Vertex) -> Result<bool, GtpError> {
        let answer = self.call("is_legal", &[&color.to_string(), &vertex.to_string()])?;
        Ok(answer.trim() == "1")
    }

    /// Streaming genmove: every analysis event is handed to `on_event` until
    /// the response ends, then the played vertex is returned.
    pub fn genmove_analyze<F>(
        &mut self,
        color: Color,
        interval: u32,
        mut on_event: F,
    ) -> Result<Vertex, GtpError>
    where
        F: FnMut(&AnalysisEvent),
    {
        let command = GENMOVE_ANALYZE_COMMANDS
            .iter()
            .find(|c| self.supports(c))
            .ok_or_else(|| GtpError::NotSupported("genmove_analyze".to_string()))?;

        if !self.send_analysis(command, &[&color.to_string(), &interval.to_string()])? {
            return Err(GtpError::NotSupported(command.to_string()));
        }
        loop {
            let event = self
                .analysis_event(true)?
                .ok_or(GtpError::TransportClosed)?;
            on_event(&event);
            if event.kind == AnalysisKind::End {
                break;
            }
        }

        let query = self.take_response()?;
        let played = query
            .lines()
            .iter()
            .rev()
            .find_map(|line| {
                let mut words = line.split_whitespace();
                (words.next() == Some("play")).then(|| words.next()).flatten()
            })
            .map(str::to_string);
        self.check(query)?;
        played
            .ok_or_else(|| GtpError::InvalidVertex(String::new()))?
            .parse()
    }

    /// Tears a lazy engine down until the next [`wakeup`](Self::wakeup).
    ///
    /// Does nothing for always-on engines.
    pub fn sleep(&mut self) {
        if self.options.lifecycle != Lifecycle::Lazy {
            debug!(engine = %self.command, "always-on engine does not sleep");
            return;
        }
        self.stop();
    }

    /// Relaunches a sleeping engine. Does nothing when it already runs.
    ///
    /// The relaunched engine must still support every command of its role.
    pub fn wakeup(&mut self) -> Result<(), GtpError> {
        if self.state == EngineState::Running {
            return Ok(());
        }
        self.start()?;
        self.check_role()
    }

    /// Asks the engine to quit, kills it if it does not, and joins the transport.
    ///
    /// Safe to call several times.
    pub fn shutdown(&mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.state != EngineState::Running {
            return;
        }
        self.state = EngineState::Stopping;

        if let Some(mut transport) = self.transport.take() {
            if self.commands.contains("quit") {
                let _ = transport.submit("quit", QueryKind::Normal);
            }
            let deadline = Instant::now() + QUIT_GRACE;
            while transport.is_alive() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(10));
            }
            if transport.is_alive() {
                warn!(engine = %self.command, "engine did not quit gracefully, killing the process");
                if let Err(e) = transport.terminate() {
                    warn!(engine = %self.command, "could not kill engine: {e}");
                }
            }
            transport.drain_and_join();
        }

        self.state = EngineState::Stopped;
        info!(engine = %self.command, "engine stopped");
    }
}

impl Drop for EngineClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
