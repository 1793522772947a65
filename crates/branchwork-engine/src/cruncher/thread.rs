//! Thread-backed cruncher.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{SendTimeoutError, Sender};

use branchwork_core::{CruncherId, JobId, Seed, SimState, Simpack};

use super::{panic_message, run_sequence, stop_flag, Cruncher, CruncherEvent, Inbox};
use crate::job::Job;

/// How long a blocked hand-off waits before re-checking the stop flag.
const SEND_POLL: Duration = Duration::from_millis(10);

/// Cruncher running the step loop on a named OS thread.
///
/// Produced states travel over a bounded crossbeam channel; a full
/// channel blocks the worker until the manager drains it. The worker
/// shares the job's [`CrunchingProfile`](crate::CrunchingProfile), so
/// target raises need no message.
pub struct ThreadCruncher<S> {
    id: CruncherId,
    job: JobId,
    inbox: Inbox<S>,
    stop: Arc<AtomicBool>,
    // Detached on drop; the thread exits at its next stop check.
    _handle: JoinHandle<()>,
}

impl<S: SimState> ThreadCruncher<S> {
    /// Start crunching `job` from `seed` on a new thread.
    pub fn spawn<P>(pack: Arc<P>, job: &Job, seed: Seed<S>, queue_capacity: usize) -> io::Result<Self>
    where
        P: Simpack<State = S>,
    {
        let id = CruncherId::next();
        let (tx, rx) = crossbeam_channel::bounded(queue_capacity.max(1));
        let stop = stop_flag();
        let worker_stop = Arc::clone(&stop);
        let profile = job.crunching_profile().clone();

        let handle = thread::Builder::new()
            .name(format!("branchwork-{id}"))
            .spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    run_sequence(pack, seed, &profile, &worker_stop, |state| {
                        deliver(&tx, CruncherEvent::State(state), &worker_stop)
                    })
                }));
                let last = outcome.unwrap_or_else(|payload| {
                    CruncherEvent::Failed(panic_message(payload.as_ref()))
                });
                deliver(&tx, last, &worker_stop);
            })?;

        Ok(Self {
            id,
            job: job.id(),
            inbox: Inbox::new(rx),
            stop,
            _handle: handle,
        })
    }
}

/// Hand `event` to the manager, waiting while the channel is full.
///
/// Returns `false` if the receiver is gone or the cruncher was stopped.
fn deliver<S>(tx: &Sender<CruncherEvent<S>>, event: CruncherEvent<S>, stop: &AtomicBool) -> bool {
    let mut pending = event;
    loop {
        match tx.send_timeout(pending, SEND_POLL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Disconnected(_)) => return false,
            Err(SendTimeoutError::Timeout(event)) => {
                if stop.load(Ordering::Acquire) {
                    return false;
                }
                pending = event;
            }
        }
    }
}

impl<S: SimState> Cruncher<S> for ThreadCruncher<S> {
    fn id(&self) -> CruncherId {
        self.id
    }

    fn job(&self) -> JobId {
        self.job
    }

    fn kind(&self) -> &'static str {
        "thread"
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

    fn update_target(&mut self, _target: f64) {
        // The worker reads the shared target before every step.
    }

    fn retire(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.inbox.retire();
    }
}

impl<S> Drop for ThreadCruncher<S> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::CrunchingProfile;
    use branchwork_core::{NodeId, StepCall, StepProfile};
    use branchwork_test_utils::{poll_until, CounterPack, Tick};

    fn job(call: StepCall, target: f64) -> Job {
        Job::new(
            NodeId(0),
            CrunchingProfile::new(StepProfile::build("step", call), target),
        )
    }

    fn collect(cruncher: &mut ThreadCruncher<Tick>) -> Vec<CruncherEvent<Tick>> {
        let mut events = Vec::new();
        assert!(poll_until(Duration::from_secs(5), || {
            events.extend(cruncher.drain_events());
            !cruncher.is_alive()
        }));
        events
    }

    #[test]
    fn produces_states_in_order_then_finishes() {
        let job = job(StepCall::new(), 4.0);
        let mut cruncher =
            ThreadCruncher::spawn(Arc::new(CounterPack), &job, Seed::State(Tick::at(0.0)), 8).unwrap();
        assert_eq!(cruncher.kind(), "thread");
        assert_eq!(cruncher.job(), job.id());
        let events = collect(&mut cruncher);
        let clocks: Vec<f64> = events
            .iter()
            .filter_map(|e| match e {
                CruncherEvent::State(s) => Some(s.clock),
                _ => None,
            })
            .collect();
        assert_eq!(clocks, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(events.last(), Some(&CruncherEvent::Finished));
    }

    #[test]
    fn panic_becomes_failure() {
        let job = job(StepCall::function("panic_at").kwarg("limit", 1.0), 10.0);
        let mut cruncher =
            ThreadCruncher::spawn(Arc::new(CounterPack), &job, Seed::State(Tick::at(0.0)), 8).unwrap();
        let events = collect(&mut cruncher);
        assert_eq!(events[0], CruncherEvent::State(Tick { clock: 1.0, steps: 1 }));
        assert!(matches!(&events[1], CruncherEvent::Failed(msg) if msg.contains("panicked")));
    }

    #[test]
    fn observes_raised_target_without_messages() {
        let job = job(StepCall::function("slow").kwarg("millis", 20.0), 2.0);
        let mut cruncher =
            ThreadCruncher::spawn(Arc::new(CounterPack), &job, Seed::State(Tick::at(0.0)), 64).unwrap();
        job.crunching_profile().raise_target(6.0);
        let events = collect(&mut cruncher);
        let states = events
            .iter()
            .filter(|e| matches!(e, CruncherEvent::State(_)))
            .count();
        assert_eq!(states, 6);
    }

    #[test]
    fn retire_stops_an_unbounded_worker() {
        let job = job(StepCall::new(), f64::INFINITY);
        let mut cruncher =
            ThreadCruncher::spawn(Arc::new(CounterPack), &job, Seed::State(Tick::at(0.0)), 4).unwrap();
        assert!(poll_until(Duration::from_secs(5), || {
            cruncher.inbox.rx.is_full()
        }));
        cruncher.retire();
        let events = collect(&mut cruncher);
        assert!(!events.iter().any(|e| matches!(e, CruncherEvent::Failed(_))));
        assert!(!cruncher.is_alive());
    }
}
