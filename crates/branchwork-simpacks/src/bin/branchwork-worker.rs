//! Worker process for branchwork process crunchers.
//!
//! Reads a handshake naming a simpack from stdin, then crunches the job
//! that follows with the matching reference simpack. Frames go to stdout;
//! logs go to stderr, filtered by `BRANCHWORK_LOG` (default `warn`).

use std::io::{self, BufReader, BufWriter};
use std::process::ExitCode;
use std::sync::Arc;

use tracing::error;
use tracing_subscriber::EnvFilter;

use branchwork_core::Simpack;
use branchwork_engine::codec::{Handshake, WireError};
use branchwork_engine::worker::{read_handshake, serve};
use branchwork_simpacks::{Fibonacci, Prisoner, RandomWalk, SIMPACKS};

fn host<P: Simpack>(pack: P, handshake: &Handshake, input: BufReader<io::Stdin>) -> Result<(), WireError> {
    let output = BufWriter::new(io::stdout().lock());
    serve(Arc::new(pack), handshake, input, output)
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_env("BRANCHWORK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();

    let mut input = BufReader::new(io::stdin());
    let handshake = match read_handshake(&mut input) {
        Ok(handshake) => handshake,
        Err(e) => {
            error!(error = %e, "cannot read handshake");
            return ExitCode::FAILURE;
        }
    };

    let served = match handshake.simpack.as_str() {
        RandomWalk::NAME => host(RandomWalk, &handshake, input),
        Prisoner::NAME => host(Prisoner::default(), &handshake, input),
        Fibonacci::NAME => host(Fibonacci, &handshake, input),
        other => {
            error!(simpack = other, known = ?SIMPACKS, "unknown simpack");
            return ExitCode::from(2);
        }
    };
    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "worker output failed");
            ExitCode::FAILURE
        }
    }
}
