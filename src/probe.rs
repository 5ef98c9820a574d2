use crate::{error::Result, protocol::Connection};

/// Mean round-trip time in milliseconds over `samples` sequential `PING`
/// exchanges on one connection. Truncating integer mean, matching what the
/// wire protocol reports elsewhere. A failed exchange propagates rather than
/// folding into the timing, so a dead connection cannot masquerade as a
/// near-zero latency.
pub async fn probe(conn: &mut Connection, samples: u32) -> Result<i64> {
    let samples = samples.max(1);
    let mut acc = 0i64;
    for _ in 0..samples {
        acc += conn.ping().await?;
    }
    Ok(acc / i64::from(samples))
}
