//! Background crunchers: one worker per job, on a thread or a process.
//!
//! # Architecture
//!
//! ```text
//! CrunchingManager ── drain_events() ──► Inbox (crossbeam Receiver)
//!        │                                  ▲
//!        │ spawn                            │ CruncherEvent
//!        ▼                                  │
//!   ThreadCruncher ── thread ── run_sequence ┘
//!   ProcessCruncher ── child ── worker::serve ── stdout frames ── reader thread
//! ```
//!
//! Both backends drive the same [`run_sequence`] loop over a
//! [`StepSequence`]; they differ only in how produced states cross the
//! execution boundary. Neither touches the tree: the manager harvests
//! drained states under the write lock.

pub mod process;
pub mod thread;

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, TryRecvError};

use branchwork_core::{CruncherId, JobId, Seed, SimState, Simpack, StepError, StepSequence};

use crate::config::{CruncherKind, ProjectConfig};
use crate::job::Job;
use crate::profile::CrunchingProfile;

pub use process::ProcessCruncher;
pub use thread::ThreadCruncher;

// ── Events ─────────────────────────────────────────────────────────

/// What a cruncher reports back to the manager, in production order.
#[derive(Clone, Debug, PartialEq)]
pub enum CruncherEvent<S> {
    /// A newly produced state, successor of the previous one.
    State(S),
    /// The world ended after the last reported state.
    WorldEnded,
    /// The worker failed; no further events follow.
    Failed(String),
    /// The target was reached or the cruncher was stopped.
    Finished,
}

impl<S> CruncherEvent<S> {
    /// Whether this event ends the cruncher's stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::State(_))
    }
}

// ── Cruncher ───────────────────────────────────────────────────────

/// A worker executing one job's step sequence.
///
/// Implementations never block in [`drain_events`](Cruncher::drain_events)
/// or [`retire`](Cruncher::retire); the manager calls both from inside a
/// sync pass.
pub trait Cruncher<S: SimState>: Send {
    /// This cruncher's id.
    fn id(&self) -> CruncherId;

    /// The job it works on.
    fn job(&self) -> JobId;

    /// `"thread"` or `"process"`.
    fn kind(&self) -> &'static str;

    /// Whether more events may still arrive. False once a terminal event
    /// has been drained or the worker hung up.
    fn is_alive(&self) -> bool;

    /// Take every event produced so far without blocking.
    fn drain_events(&mut self) -> Vec<CruncherEvent<S>>;

    /// Tell the worker its job's target rose.
    fn update_target(&mut self, target: f64);

    /// Ask the worker to stop. Events already queued stay drainable.
    fn retire(&mut self);
}

/// Start a cruncher of the configured kind for `job`.
pub(crate) fn spawn<P: Simpack>(
    config: &ProjectConfig,
    pack: &Arc<P>,
    job: &Job,
    seed: Seed<P::State>,
) -> Result<Box<dyn Cruncher<P::State>>, String> {
    match &config.cruncher {
        CruncherKind::Thread => {
            ThreadCruncher::spawn(Arc::clone(pack), job, seed, config.queue_capacity)
                .map(|c| Box::new(c) as Box<dyn Cruncher<P::State>>)
                .map_err(|e| format!("thread spawn failed: {e}"))
        }
        CruncherKind::Process(process) => {
            ProcessCruncher::spawn(pack.name(), process, job, seed, config.queue_capacity)
                .map(|c| Box::new(c) as Box<dyn Cruncher<P::State>>)
                .map_err(|e| format!("worker spawn failed: {e}"))
        }
    }
}

// ── Inbox ──────────────────────────────────────────────────────────

/// Receiving end of a cruncher's event stream.
///
/// A sender that disappears without a terminal event (a killed process,
/// a torn-down thread) is reported as [`CruncherEvent::Failed`], unless
/// the cruncher was retired first.
pub(crate) struct Inbox<S> {
    rx: Receiver<CruncherEvent<S>>,
    closed: bool,
    retired: bool,
}

impl<S> Inbox<S> {
    pub(crate) fn new(rx: Receiver<CruncherEvent<S>>) -> Self {
        Self {
            rx,
            closed: false,
            retired: false,
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// A worker told to stop may hang up without a terminal event.
    pub(crate) fn retire(&mut self) {
        self.retired = true;
    }

    pub(crate) fn drain(&mut self) -> Vec<CruncherEvent<S>> {
        let mut events = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(event) => {
                    let terminal = event.is_terminal();
                    events.push(event);
                    if terminal {
                        self.closed = true;
                        break;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.closed && !self.retired {
                        events.push(CruncherEvent::Failed(
                            "worker disconnected without reporting".to_owned(),
                        ));
                    }
                    self.closed = true;
                    break;
                }
            }
        }
        events
    }
}

// ── Shared step loop ───────────────────────────────────────────────

/// Step from `seed` until the target is reached, the world ends, the
/// sequence fails or `stop` is raised. Every produced state goes to
/// `emit`; when `emit` returns `false` the consumer is gone and the loop
/// stops. Returns the terminal event.
pub(crate) fn run_sequence<P: Simpack>(
    pack: Arc<P>,
    seed: Seed<P::State>,
    profile: &CrunchingProfile,
    stop: &AtomicBool,
    mut emit: impl FnMut(P::State) -> bool,
) -> CruncherEvent<P::State> {
    let Some(mut clock) = seed.clock() else {
        return CruncherEvent::Failed("empty seed".to_owned());
    };
    let mut sequence = match StepSequence::new(pack, seed, profile.step_profile().clone()) {
        Ok(sequence) => sequence,
        Err(e) => return CruncherEvent::Failed(e.to_string()),
    };
    loop {
        if stop.load(Ordering::Acquire) || profile.is_reached(clock) {
            return CruncherEvent::Finished;
        }
        match sequence.next() {
            Some(Ok(state)) => {
                clock = state.clock();
                if !emit(state) {
                    return CruncherEvent::Finished;
                }
            }
            Some(Err(StepError::WorldEnded)) => return CruncherEvent::WorldEnded,
            Some(Err(e)) => return CruncherEvent::Failed(e.to_string()),
            None => return CruncherEvent::Finished,
        }
    }
}

/// Human-readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("step panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("step panicked: {s}")
    } else {
        "step panicked".to_owned()
    }
}

pub(crate) fn stop_flag() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchwork_core::{StepCall, StepProfile};
    use branchwork_test_utils::{CounterPack, Tick};
    use crossbeam_channel::unbounded;

    fn run(function: StepCall, target: f64) -> (Vec<f64>, CruncherEvent<Tick>) {
        let profile = CrunchingProfile::new(StepProfile::build("step", function), target);
        let stop = AtomicBool::new(false);
        let mut clocks = Vec::new();
        let end = run_sequence(
            Arc::new(CounterPack),
            Seed::State(Tick::at(0.0)),
            &profile,
            &stop,
            |s| {
                clocks.push(s.clock);
                true
            },
        );
        (clocks, end)
    }

    #[test]
    fn stops_at_target() {
        let (clocks, end) = run(StepCall::new(), 3.0);
        assert_eq!(clocks, vec![1.0, 2.0, 3.0]);
        assert_eq!(end, CruncherEvent::Finished);
    }

    #[test]
    fn reports_world_end() {
        let (clocks, end) = run(StepCall::function("end_at").kwarg("limit", 2.0), 10.0);
        assert_eq!(clocks, vec![1.0, 2.0]);
        assert_eq!(end, CruncherEvent::WorldEnded);
    }

    #[test]
    fn reports_failure() {
        let (_, end) = run(StepCall::function("fail_at"), 10.0);
        assert!(matches!(end, CruncherEvent::Failed(_)));
    }

    #[test]
    fn unknown_function_fails_before_stepping() {
        let (clocks, end) = run(StepCall::function("nope"), 10.0);
        assert!(clocks.is_empty());
        assert!(matches!(end, CruncherEvent::Failed(msg) if msg.contains("nope")));
    }

    #[test]
    fn stop_flag_halts_loop() {
        let profile = CrunchingProfile::unbounded(StepProfile::new("step"));
        let stop = AtomicBool::new(false);
        let mut produced = 0;
        let end = run_sequence(
            Arc::new(CounterPack),
            Seed::State(Tick::at(0.0)),
            &profile,
            &stop,
            |_| {
                produced += 1;
                if produced == 4 {
                    stop.store(true, Ordering::Release);
                }
                true
            },
        );
        assert_eq!(produced, 4);
        assert_eq!(end, CruncherEvent::Finished);
    }

    #[test]
    fn inbox_reports_silent_disconnect() {
        let (tx, rx) = unbounded();
        let mut inbox = Inbox::new(rx);
        tx.send(CruncherEvent::State(Tick::at(1.0))).unwrap();
        drop(tx);
        let events = inbox.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], CruncherEvent::Failed(_)));
        assert!(inbox.is_closed());
        assert!(inbox.drain().is_empty());
    }

    #[test]
    fn retired_inbox_hangs_up_quietly() {
        let (tx, rx) = unbounded();
        let mut inbox = Inbox::new(rx);
        tx.send(CruncherEvent::State(Tick::at(1.0))).unwrap();
        inbox.retire();
        drop(tx);
        assert_eq!(inbox.drain(), vec![CruncherEvent::State(Tick::at(1.0))]);
        assert!(inbox.is_closed());
    }

    #[test]
    fn inbox_closes_on_terminal_event() {
        let (tx, rx) = unbounded();
        let mut inbox = Inbox::new(rx);
        tx.send(CruncherEvent::<Tick>::Finished).unwrap();
        assert_eq!(inbox.drain(), vec![CruncherEvent::Finished]);
        assert!(inbox.is_closed());
        drop(tx);
        assert!(inbox.drain().is_empty());
    }

    #[test]
    fn panic_messages() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "step panicked: boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "step panicked: bang");
    }
}
