//! Worker loop over the external job source.
//!
//! Reads job objects as JSON lines from stdin and writes one response line
//! per job to stdout; stderr carries logs. The external runtime owns the
//! process lifecycle: a `refresh_worker` response ends the loop after the
//! response is flushed so the runtime can respawn the worker.

use std::io::{self, BufRead, Write};

use crate::error::Result;
use crate::types::{Job, JobResponse};

use super::handler::{handle_job, WorkerContext};

/// Runs the worker loop until stdin closes or a refresh is requested.
pub fn run_worker(ctx: &WorkerContext) -> Result<()> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    serve(stdin.lock(), stdout.lock(), |job| handle_job(ctx, job))
}

/// Drives the job loop over any line source and response sink.
///
/// Jobs are handled one at a time, in arrival order; there is no
/// request-level parallelism because the pipelines are not safe for
/// concurrent inference. A response that requests a worker refresh ends
/// the loop after the response line is written and flushed.
fn serve<R: BufRead, W: Write>(
    reader: R,
    mut writer: W,
    mut handle: impl FnMut(&Job) -> JobResponse,
) -> Result<()> {
    eprintln!("Worker started, waiting for jobs...");

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading job source: {}", e);
                break;
            }
        };

        // Skip empty lines
        if line.trim().is_empty() {
            continue;
        }

        let response = match decode_job(&line) {
            Ok(job) => {
                eprintln!("Handling job {}", job.id);
                handle(&job)
            }
            Err(message) => JobResponse::error(message, false),
        };

        let refresh = response.refresh_requested();
        writeln!(
            writer,
            "{}",
            serde_json::to_string(&response).unwrap_or_default()
        )
        .ok();
        writer.flush().ok();

        if refresh {
            eprintln!("Worker refresh requested, exiting for respawn");
            break;
        }
    }

    eprintln!("Worker stopped");
    Ok(())
}

/// Decodes one job line from the job source.
fn decode_job(line: &str) -> std::result::Result<Job, String> {
    serde_json::from_str::<Job>(line).map_err(|e| format!("Invalid job payload: {}", e))
}
