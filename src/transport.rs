//! Line-oriented command/response channel over a child process.
//!
//! A [`Transport`] owns one child process and three threads:
//!
//! - the **writer** takes queries from the pending queue, writes their command
//!   line to the child's stdin and hands them to the dispatcher,
//! - the **dispatcher** reads the child's stdout, assembles the response of the
//!   in-flight query and moves it to the completed queue once the blank
//!   terminator line is read,
//! - the **error drain** keeps reading the child's stderr so the child never
//!   blocks on a full pipe.
//!
//! Only one query is in flight at a time: the writer waits for a slot token
//! that the dispatcher hands back after each completed response. Responses
//! are therefore matched to requests in submission order even though the
//! threads and the child run concurrently.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, instrument, trace, warn};

use crate::error::GtpError;
use crate::query::{AnalysisEvent, LineOutcome, Query, QueryKind};

/// How long [`Transport::drain_and_join`] lets the child exit on its own.
const EXIT_GRACE: Duration = Duration::from_secs(1);

/// Ordered request/response exchange with a GTP child process.
#[derive(Debug)]
pub struct Transport {
    label: String,
    child: Child,
    pending: Option<Sender<Query>>,
    completed: Receiver<Query>,
    analysis: Receiver<AnalysisEvent>,
    threads: Vec<JoinHandle<()>>,
    joined: bool,
}

impl Transport {
    /// Spawns `command` (split on whitespace) and starts the three loops.
    ///
    /// With `forward_stderr`, every line the child writes on stderr is copied
    /// to the host's stderr; otherwise it only reaches the `trace` log.
    #[instrument(skip(forward_stderr))]
    pub fn spawn(command: &str, forward_stderr: bool) -> Result<Transport, GtpError> {
        let mut words = command.split_whitespace();
        let program = words.next().ok_or_else(|| GtpError::Spawn {
            command: command.to_string(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "empty command"),
        })?;

        let mut child = Command::new(program)
            .args(words)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| GtpError::Spawn {
                command: command.to_string(),
                source,
            })?;
        debug!(pid = child.id(), "engine process started");

        let label = program.to_string();
        match Self::start_loops(&mut child, &label, forward_stderr) {
            Ok((pending, completed, analysis, threads)) => Ok(Transport {
                label,
                child,
                pending: Some(pending),
                completed,
                analysis,
                threads,
                joined: false,
            }),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(e)
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn start_loops(
        child: &mut Child,
        label: &str,
        forward_stderr: bool,
    ) -> Result<
        (
            Sender<Query>,
            Receiver<Query>,
            Receiver<AnalysisEvent>,
            Vec<JoinHandle<()>>,
        ),
        GtpError,
    > {
        let stdin = child.stdin.take().ok_or(GtpError::TransportClosed)?;
        let stdout = child.stdout.take().ok_or(GtpError::TransportClosed)?;
        let stderr = child.stderr.take().ok_or(GtpError::TransportClosed)?;

        let (pending_tx, pending_rx) = mpsc::channel::<Query>();
        let (in_flight_tx, in_flight_rx) = mpsc::channel::<Query>();
        let (slot_tx, slot_rx) = mpsc::channel::<()>();
        let (completed_tx, completed_rx) = mpsc::channel::<Query>();
        let (analysis_tx, analysis_rx) = mpsc::channel::<AnalysisEvent>();

        // the slot starts free
        slot_tx
            .send(())
            .map_err(|_| GtpError::TransportClosed)?;

        let mut threads = Vec::with_capacity(3);
        threads.push(
            thread::Builder::new()
                .name(format!("{label}-writer"))
                .spawn(move || writer_loop(stdin, pending_rx, slot_rx, in_flight_tx))?,
        );
        threads.push(
            thread::Builder::new()
                .name(format!("{label}-dispatch"))
                .spawn(move || {
                    dispatcher_loop(stdout, in_flight_rx, slot_tx, completed_tx, analysis_tx)
                })?,
        );
        let drain_label = label.to_string();
        threads.push(
            thread::Builder::new()
                .name(format!("{label}-stderr"))
                .spawn(move || error_drain_loop(stderr, &drain_label, forward_stderr))?,
        );

        Ok((pending_tx, completed_rx, analysis_rx, threads))
    }

    /// Name of the spawned program, used in logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Queues `command` for sending. Never blocks.
    pub fn submit(&self, command: &str, kind: QueryKind) -> Result<(), GtpError> {
        let pending = self.pending.as_ref().ok_or(GtpError::TransportClosed)?;
        pending
            .send(Query::new(command, kind))
            .map_err(|_| GtpError::TransportClosed)
    }

    /// Removes the oldest completed query.
    ///
    /// Without `block`, returns `Ok(None)` when nothing is ready. Fails with
    /// [`GtpError::TransportClosed`] once the dispatcher has stopped and every
    /// completed query has been taken.
    pub fn take_completed(&self, block: bool) -> Result<Option<Query>, GtpError> {
        receive(&self.completed, block)
    }

    /// Removes the oldest buffered analysis event, same contract as
    /// [`take_completed`](Self::take_completed).
    pub fn take_analysis_event(&self, block: bool) -> Result<Option<AnalysisEvent>, GtpError> {
        receive(&self.analysis, block)
    }

    /// True while the child process has not exited.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Kills the child process.
    pub fn terminate(&mut self) -> Result<(), GtpError> {
        if !self.is_alive() {
            return Ok(());
        }
        self.child.kill()?;
        Ok(())
    }

    /// Blocks until the child process exits.
    pub fn await_exit(&mut self) -> Result<ExitStatus, GtpError> {
        Ok(self.child.wait()?)
    }

    /// Stops the three loops and waits for them.
    ///
    /// Closing the pending queue makes the writer drop the child's stdin; a
    /// well-behaved engine exits on end of input, which closes its output
    /// streams and ends the other two loops. A child still running after a
    /// short grace period is killed. Calling this again does nothing.
    pub fn drain_and_join(&mut self) {
        if self.joined {
            return;
        }
        self.joined = true;
        self.pending.take();

        let deadline = Instant::now() + EXIT_GRACE;
        while self.is_alive() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        if self.is_alive() {
            warn!(engine = %self.label, "engine still running after its input was closed, killing it");
            if let Err(e) = self.terminate() {
                error!(engine = %self.label, "could not kill engine: {e}");
            }
        }
        let _ = self.child.wait();

        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                error!(engine = %self.label, "transport thread panicked");
            }
        }
        trace!(engine = %self.label, "transport joined");
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.drain_and_join();
    }
}

fn receive<T>(rx: &Receiver<T>, block: bool) -> Result<Option<T>, GtpError> {
    if block {
        return rx.recv().map(Some).map_err(|_| GtpError::TransportClosed);
    }
    match rx.try_recv() {
        Ok(item) => Ok(Some(item)),
        Err(TryRecvError::Empty) => Ok(None),
        Err(TryRecvError::Disconnected) => Err(GtpError::TransportClosed),
    }
}

/// Reads one line, replacing invalid UTF-8. `None` on end of stream.
fn read_line_lossy<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf)? == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

fn writer_loop(
    mut stdin: ChildStdin,
    pending: Receiver<Query>,
    slot: Receiver<()>,
    in_flight: Sender<Query>,
) {
    for query in pending.iter() {
        // the dispatcher hands the slot back once the previous response is complete
        if slot.recv().is_err() {
            break;
        }
        let line = format!("{}\n", query.command());
        if let Err(e) = stdin
            .write_all(line.as_bytes())
            .and_then(|_| stdin.flush())
        {
            debug!("engine stdin closed: {e}");
            break;
        }
        trace!(command = query.command(), "sent");
        if in_flight.send(query).is_err() {
            break;
        }
    }
}

fn dispatcher_loop(
    stdout: ChildStdout,
    in_flight: Receiver<Query>,
    slot: Sender<()>,
    completed: Sender<Query>,
    analysis: Sender<AnalysisEvent>,
) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();

    'queries: for mut query in in_flight.iter() {
        loop {
            let line = match read_line_lossy(&mut reader, &mut buf) {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!(command = query.command(), "engine stdout closed");
                    break 'queries;
                }
                Err(e) => {
                    debug!(command = query.command(), "engine stdout error: {e}");
                    break 'queries;
                }
            };

            match query.absorb_line(&line) {
                LineOutcome::Pending(event) => {
                    if let Some(event) = event {
                        let _ = analysis.send(event);
                    }
                }
                LineOutcome::Complete(event) => {
                    if let Some(event) = event {
                        let _ = analysis.send(event);
                    }
                    trace!(command = query.command(), status = ?query.status(), "completed");
                    let _ = completed.send(query);
                    let _ = slot.send(());
                    continue 'queries;
                }
            }
        }
    }
}

fn error_drain_loop<R: Read>(stderr: R, label: &str, forward: bool) {
    let mut reader = BufReader::new(stderr);
    let mut buf = Vec::new();
    while let Ok(Some(line)) = read_line_lossy(&mut reader, &mut buf) {
        let line = line.trim_end();
        trace!(engine = %label, "stderr: {line}");
        if forward {
            let mut host = io::stderr().lock();
            let _ = writeln!(host, "{line}");
            let _ = host.flush();
        }
    }
}
