//! Process-backed cruncher.
//!
//! The cruncher launches the configured worker program and talks to it
//! over stdin/stdout with the frames in [`codec`](crate::codec):
//!
//! ```text
//! parent ── stdin:  [header] Handshake Start (RaiseTarget)* Stop? EOF
//! child  ── stdout: [header] State* (WorldEnded | Failed | Finished)
//! ```
//!
//! A reader thread decodes stdout frames into a crossbeam channel, so the
//! manager only ever polls. Worker logs go to the inherited stderr.

use std::io::{self, BufReader, BufWriter, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use tracing::debug;

use branchwork_core::{CruncherId, JobId, Seed, SimState};

use super::{Cruncher, CruncherEvent, Inbox};
use crate::codec::{
    read_frame, read_header, write_frame, write_header, FromWorker, Handshake, ToWorker, WireError,
    WIRE_MAGIC,
};
use crate::config::ProcessConfig;
use crate::job::Job;

/// Cruncher running the step loop in a separate worker process.
///
/// States cross the boundary serialized. Target raises and stop requests
/// are sent as frames; a worker still running when the cruncher is
/// dropped is killed.
pub struct ProcessCruncher<S> {
    id: CruncherId,
    job: JobId,
    inbox: Inbox<S>,
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    _reader: JoinHandle<()>,
}

impl<S: SimState> ProcessCruncher<S> {
    /// Launch a worker for `job`, running simpack `simpack` from `seed`.
    pub fn spawn(
        simpack: &str,
        config: &ProcessConfig,
        job: &Job,
        seed: Seed<S>,
        queue_capacity: usize,
    ) -> Result<Self, WireError> {
        let id = CruncherId::next();
        let mut child = Command::new(&config.program)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;

        let started = Self::start(&mut child, simpack, job, seed);
        let (stdin, stdout) = match started {
            Ok(pipes) => pipes,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };

        let (tx, rx) = crossbeam_channel::bounded(queue_capacity.max(1));
        let reader = thread::Builder::new()
            .name(format!("branchwork-{id}-reader"))
            .spawn(move || forward(stdout, tx));
        let reader = match reader {
            Ok(handle) => handle,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e.into());
            }
        };

        debug!(cruncher = %id, pid = child.id(), program = %config.program.display(), "worker process started");
        Ok(Self {
            id,
            job: job.id(),
            inbox: Inbox::new(rx),
            child,
            stdin: Some(stdin),
            _reader: reader,
        })
    }

    fn start(
        child: &mut Child,
        simpack: &str,
        job: &Job,
        seed: Seed<S>,
    ) -> Result<(BufWriter<ChildStdin>, ChildStdout), WireError> {
        let missing = |pipe: &str| io::Error::new(io::ErrorKind::BrokenPipe, format!("worker {pipe} unavailable"));
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let mut stdin = BufWriter::new(stdin);
        write_header(&mut stdin, WIRE_MAGIC)?;
        write_frame(
            &mut stdin,
            &Handshake {
                simpack: simpack.to_owned(),
            },
        )?;
        write_frame(
            &mut stdin,
            &ToWorker::Start {
                seed,
                profile: job.step_profile().clone(),
                target: job.target(),
            },
        )?;
        stdin.flush()?;
        Ok((stdin, stdout))
    }

    fn send(&mut self, message: &ToWorker<S>) {
        let Some(stdin) = self.stdin.as_mut() else {
            return;
        };
        let sent = write_frame(stdin, message).and_then(|()| stdin.flush().map_err(WireError::from));
        if let Err(e) = sent {
            // A dead worker surfaces through the inbox; drop the pipe.
            debug!(cruncher = %self.id, error = %e, "worker stdin closed");
            self.stdin = None;
        }
    }
}

/// Decode worker frames into `tx` until a terminal frame, EOF or error.
fn forward<S: SimState>(stdout: ChildStdout, tx: Sender<CruncherEvent<S>>) {
    let mut stdout = BufReader::new(stdout);
    if let Err(e) = read_header(&mut stdout, WIRE_MAGIC) {
        let _ = tx.send(CruncherEvent::Failed(format!("worker stream: {e}")));
        return;
    }
    loop {
        let event = match read_frame::<FromWorker<S>>(&mut stdout) {
            Ok(Some(FromWorker::State(state))) => CruncherEvent::State(state),
            Ok(Some(FromWorker::WorldEnded)) => CruncherEvent::WorldEnded,
            Ok(Some(FromWorker::Failed(reason))) => CruncherEvent::Failed(reason),
            Ok(Some(FromWorker::Finished)) => CruncherEvent::Finished,
            // EOF without a terminal frame: the inbox reports the disconnect.
            Ok(None) => return,
            Err(e) => CruncherEvent::Failed(format!("worker stream: {e}")),
        };
        let terminal = event.is_terminal();
        if tx.send(event).is_err() || terminal {
            return;
        }
    }
}

impl<S: SimState> Cruncher<S> for ProcessCruncher<S> {
    fn id(&self) -> CruncherId {
        self.id
    }

    fn job(&self) -> JobId {
        self.job
    }

    fn kind(&self) -> &'static str {
        "process"
    }

    fn is_alive(&self) -> bool {
        !self.inbox.is_closed()
    }

    fn drain_events(&mut self) -> Vec<CruncherEvent<S>> {
        if self.inbox.is_closed() {
            return Vec::new();
        }
        self.inbox.drain()
    }

    fn update_target(&mut self, target: f64) {
        self.send(&ToWorker::RaiseTarget(target));
    }

    fn retire(&mut self) {
        self.send(&ToWorker::Stop);
        self.inbox.retire();
        self.stdin = None;
    }
}

impl<S> Drop for ProcessCruncher<S> {
    fn drop(&mut self) {
        self.stdin = None;
        match self.child.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                let _ = self.child.kill();
                let _ = self.child.wait();
            }
        }
    }
}
