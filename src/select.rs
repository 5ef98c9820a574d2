use log::debug;

use crate::{
    catalog::Server,
    error::{Result, SprintError},
    probe,
    protocol::Connection,
    transport::Dialer,
};

/// Running-minimum seed; any real round trip beats it.
const LATENCY_SENTINEL_MS: i64 = 999;

/// Scans the candidate list in catalog order and returns the server with the
/// smallest mean ping. Unreachable candidates and failed probes are skipped,
/// never fatal to the scan; ties resolve to the first-seen candidate (strict
/// `<` against the running minimum). A scan in which no candidate could be
/// probed is an explicit [`SprintError::SelectionExhausted`], not a zero
/// value result.
pub async fn select_best(
    dialer: &dyn Dialer,
    servers: Vec<Server>,
    samples: u32,
) -> Result<Server> {
    let mut best: Option<Server> = None;
    let mut best_latency = LATENCY_SENTINEL_MS;

    for mut server in servers {
        let stream = match dialer.dial(&server.host).await {
            Ok(stream) => stream,
            Err(err) => {
                debug!("skipping server {} ({}): {err}", server.id, server.host);
                continue;
            }
        };
        let mut conn = Connection::new(stream);

        if let Some(version) = conn.handshake().await {
            debug!("server {} speaks protocol {version}", server.id);
        }

        match probe::probe(&mut conn, samples).await {
            Ok(latency) => {
                debug!("server {} mean ping {latency}ms", server.id);
                server.latency_ms = latency;
                if latency < best_latency {
                    best_latency = latency;
                    best = Some(server);
                }
            }
            Err(err) => debug!("probe failed for server {}: {err}", server.id),
        }
        // conn drops here, one connection per candidate
    }

    best.ok_or(SprintError::SelectionExhausted)
}
