use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use log::{debug, warn};
use tokio::time::Instant;

use crate::{
    catalog::Server,
    error::Result,
    protocol::Connection,
    transport::Dialer,
};

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

/// Per-iteration growth of a worker's request size. Later iterations within
/// one window request larger bodies, amortizing protocol overhead as the
/// estimate stabilizes.
const CHUNK_STEP: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    Upload,
}

/// Runs a fan-out of timed transfer loops against one server and returns the
/// aggregate bandwidth in Mbps.
///
/// Up to `workers` connections are opened; a dial failure drops that slot
/// (the achieved parallelism may be lower than requested). All workers share
/// one deadline, checked cooperatively before each iteration, so an
/// in-flight transfer may overrun the window by at most the per-operation
/// I/O deadline. Byte counts combine through a single shared atomic; the
/// join is unconditional and every connection is closed on every exit path.
pub async fn measure(
    dialer: &dyn Dialer,
    server: &Server,
    direction: Direction,
    workers: usize,
    window: Duration,
) -> Result<f64> {
    let mut conns = Vec::with_capacity(workers);
    for slot in 0..workers {
        match dialer.dial(&server.host).await {
            Ok(stream) => conns.push(Connection::new(stream)),
            Err(err) => warn!("dropping worker slot {slot}: {err}"),
        }
    }
    if conns.len() < workers {
        warn!("measuring with {}/{} connections", conns.len(), workers);
    }

    let total = Arc::new(AtomicU64::new(0));
    let deadline = Instant::now() + window;

    let started = Instant::now();
    let mut tasks = Vec::with_capacity(conns.len());
    for conn in conns {
        let total = Arc::clone(&total);
        tasks.push(tokio::spawn(transfer_loop(conn, direction, deadline, total)));
    }
    for task in tasks {
        if let Err(err) = task.await {
            warn!("worker task failed: {err}");
        }
    }
    let elapsed = started.elapsed();

    Ok(calc_mbps(total.load(Ordering::Relaxed), elapsed))
}

async fn transfer_loop(
    mut conn: Connection,
    direction: Direction,
    deadline: Instant,
    total: Arc<AtomicU64>,
) {
    let mut chunk = CHUNK_STEP;
    let mut rounds = 0u32;

    while Instant::now() < deadline {
        chunk += CHUNK_STEP;
        let result = match direction {
            Direction::Download => conn.download(chunk).await,
            Direction::Upload => conn.upload(chunk).await,
        };
        match result {
            Ok(res) => {
                total.fetch_add(res.bytes as u64, Ordering::Relaxed);
                rounds += 1;
            }
            Err(err) => {
                debug!("transfer loop stopped: {err}");
                break;
            }
        }
    }

    debug!("worker done after {rounds} rounds");
    // conn drops here, closing its socket
}

/// Megabits per second: bytes / 125000 is bits / 1e6.
pub fn calc_mbps(total_bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs == 0.0 {
        return 0.0;
    }
    (total_bytes as f64 / 125_000.0) / secs
}
