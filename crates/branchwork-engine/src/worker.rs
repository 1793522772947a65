//! The child side of a process cruncher.
//!
//! A worker binary reads the [`Handshake`] with [`read_handshake`], picks
//! the simpack it names, and hands the rest of the stream to [`serve`]:
//!
//! ```no_run
//! use std::io;
//! use std::sync::Arc;
//! # use branchwork_core::{Simpack, SimState, StepError, StepProfile};
//! # #[derive(Clone, serde::Serialize, serde::Deserialize)] struct S(f64);
//! # impl SimState for S { fn clock(&self) -> f64 { self.0 } }
//! # struct Pack;
//! # impl Simpack for Pack {
//! #     type State = S;
//! #     fn name(&self) -> &str { "pack" }
//! #     fn create_root(&self) -> S { S(0.0) }
//! #     fn default_step_function(&self) -> &str { "step" }
//! #     fn step_functions(&self) -> &[&'static str] { &["step"] }
//! # }
//! use branchwork_engine::worker::{read_handshake, serve};
//!
//! let mut stdin = io::stdin();
//! let handshake = read_handshake(&mut stdin).unwrap();
//! serve(Arc::new(Pack), &handshake, stdin, io::stdout().lock()).unwrap();
//! ```

use std::io::{Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{debug, info, warn};

use branchwork_core::{SimState, Simpack};

use crate::codec::{
    read_frame, read_header, write_frame, write_header, FromWorker, Handshake, ToWorker, WireError,
    WIRE_MAGIC,
};
use crate::cruncher::{panic_message, run_sequence, stop_flag, CruncherEvent};
use crate::profile::CrunchingProfile;

/// Read the stream header and the handshake frame.
pub fn read_handshake(input: &mut dyn Read) -> Result<Handshake, WireError> {
    read_header(input, WIRE_MAGIC)?;
    read_frame(input)?.ok_or_else(|| WireError::Truncated {
        detail: "stream ended before the handshake".to_owned(),
    })
}

/// Crunch one job for `pack`, reading control frames from `input` and
/// writing produced states to `output`.
///
/// Returns once a terminal frame has been written. A handshake naming a
/// different simpack, a missing start frame or a failing step are all
/// reported to the parent as [`FromWorker::Failed`] rather than as an
/// `Err`; `Err` means the output stream itself broke.
pub fn serve<P, R, W>(pack: Arc<P>, handshake: &Handshake, mut input: R, mut output: W) -> Result<(), WireError>
where
    P: Simpack,
    R: Read + Send + 'static,
    W: Write,
{
    write_header(&mut output, WIRE_MAGIC)?;

    if handshake.simpack != pack.name() {
        let reason = format!(
            "worker runs simpack '{}', not '{}'",
            pack.name(),
            handshake.simpack
        );
        return finish(&mut output, CruncherEvent::<P::State>::Failed(reason));
    }

    let (seed, profile, target) = match read_frame::<ToWorker<P::State>>(&mut input) {
        Ok(Some(ToWorker::Start {
            seed,
            profile,
            target,
        })) => (seed, profile, target),
        Ok(Some(_)) => {
            return finish(
                &mut output,
                CruncherEvent::<P::State>::Failed("expected a start frame".to_owned()),
            )
        }
        Ok(None) => return Ok(()),
        Err(e) => {
            return finish(
                &mut output,
                CruncherEvent::<P::State>::Failed(format!("bad start frame: {e}")),
            )
        }
    };

    info!(simpack = pack.name(), step = %profile, target, "worker started");
    let crunching = CrunchingProfile::new(profile, target);
    let stop = stop_flag();
    listen::<P::State, R>(input, crunching.clone(), Arc::clone(&stop))?;

    let mut broken = None;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        run_sequence(pack, seed, &crunching, &stop, |state| {
            let sent = write_frame(&mut output, &FromWorker::State(state))
                .and_then(|()| output.flush().map_err(WireError::from));
            match sent {
                Ok(()) => true,
                Err(e) => {
                    broken = Some(e);
                    false
                }
            }
        })
    }));
    if let Some(e) = broken {
        return Err(e);
    }
    let last = outcome.unwrap_or_else(|payload| CruncherEvent::Failed(panic_message(payload.as_ref())));
    if let CruncherEvent::Failed(reason) = &last {
        warn!(%reason, "worker failed");
    }
    finish(&mut output, last)
}

/// Apply control frames from the parent on a background thread.
///
/// `Stop` and unreadable frames raise `stop`. End of stream only ends the
/// listener: a worker whose parent vanished stops when its next write
/// fails.
fn listen<S, R>(mut input: R, crunching: CrunchingProfile, stop: Arc<AtomicBool>) -> Result<(), WireError>
where
    S: SimState,
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name("branchwork-worker-control".into())
        .spawn(move || loop {
            match read_frame::<ToWorker<S>>(&mut input) {
                Ok(Some(ToWorker::RaiseTarget(target))) => {
                    crunching.raise_target(target);
                }
                Ok(Some(ToWorker::Start { .. })) => {
                    debug!("ignoring repeated start frame");
                }
                Ok(Some(ToWorker::Stop)) | Err(_) => {
                    stop.store(true, Ordering::Release);
                    return;
                }
                Ok(None) => return,
            }
        })?;
    Ok(())
}

fn finish<S: SimState>(output: &mut dyn Write, last: CruncherEvent<S>) -> Result<(), WireError> {
    let frame = match last {
        CruncherEvent::State(state) => FromWorker::State(state),
        CruncherEvent::WorldEnded => FromWorker::WorldEnded,
        CruncherEvent::Failed(reason) => FromWorker::Failed(reason),
        CruncherEvent::Finished => FromWorker::Finished,
    };
    write_frame(output, &frame)?;
    output.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use branchwork_core::{Seed, StepCall, StepProfile};
    use branchwork_test_utils::{CounterPack, HistorySumPack, Tick};

    fn request(pack: &str, seed: Seed<Tick>, profile: StepProfile, target: f64) -> Vec<u8> {
        let mut buf = Vec::new();
        write_header(&mut buf, WIRE_MAGIC).unwrap();
        write_frame(&mut buf, &Handshake { simpack: pack.to_owned() }).unwrap();
        write_frame(&mut buf, &ToWorker::Start { seed, profile, target }).unwrap();
        buf
    }

    fn replies<P: Simpack<State = Tick>>(pack: P, input: Vec<u8>) -> Vec<FromWorker<Tick>> {
        let mut cursor = std::io::Cursor::new(input);
        let handshake = read_handshake(&mut cursor).unwrap();
        let mut out = Vec::new();
        serve(Arc::new(pack), &handshake, cursor, &mut out).unwrap();
        let mut r = out.as_slice();
        read_header(&mut r, WIRE_MAGIC).unwrap();
        let mut frames = Vec::new();
        while let Some(frame) = read_frame(&mut r).unwrap() {
            frames.push(frame);
        }
        frames
    }

    fn clocks(frames: &[FromWorker<Tick>]) -> Vec<f64> {
        frames
            .iter()
            .filter_map(|f| match f {
                FromWorker::State(s) => Some(s.clock),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn serves_until_target() {
        let input = request("counter", Seed::State(Tick::at(0.0)), StepProfile::new("step"), 3.0);
        let frames = replies(CounterPack, input);
        assert_eq!(clocks(&frames), vec![1.0, 2.0, 3.0]);
        assert_eq!(frames.last(), Some(&FromWorker::Finished));
    }

    #[test]
    fn rejects_wrong_simpack() {
        let input = request("other", Seed::State(Tick::at(0.0)), StepProfile::new("step"), 3.0);
        let frames = replies(CounterPack, input);
        assert_eq!(frames.len(), 1);
        assert!(matches!(&frames[0], FromWorker::Failed(msg) if msg.contains("other")));
    }

    #[test]
    fn reports_world_end() {
        let mut input = request(
            "counter",
            Seed::State(Tick::at(0.0)),
            StepProfile::build("step", StepCall::function("end_at").kwarg("limit", 0.0)),
            10.0,
        );
        write_frame(&mut input, &ToWorker::<Tick>::RaiseTarget(20.0)).unwrap();
        let frames = replies(CounterPack, input);
        assert!(clocks(&frames).is_empty());
        assert_eq!(frames.last(), Some(&FromWorker::WorldEnded));
    }

    #[test]
    fn stop_frame_halts_unbounded_run() {
        let mut input = request(
            "counter",
            Seed::State(Tick::at(0.0)),
            StepProfile::build("step", StepCall::function("slow").kwarg("millis", 1.0)),
            f64::INFINITY,
        );
        write_frame(&mut input, &ToWorker::<Tick>::Stop).unwrap();
        let frames = replies(CounterPack, input);
        assert_eq!(frames.last(), Some(&FromWorker::Finished));
    }

    #[test]
    fn history_seed_is_honoured() {
        let seed = Seed::History(vec![Tick::at(0.0), Tick::at(1.0), Tick::at(2.0)]);
        let frames = replies(HistorySumPack, request("history-sum", seed, StepProfile::new("sum"), 4.0));
        assert_eq!(clocks(&frames), vec![4.0]);
    }
}
