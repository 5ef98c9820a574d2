use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use log::debug;
use rand::{rngs::OsRng, RngCore};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    time::timeout,
};

use crate::error::{Result, SprintError};

/// Absolute deadline applied to each read or write, so a stalled peer can
/// never park a worker. The deadline is scoped to one operation; back-to-back
/// operations each get a fresh one.
pub const OP_TIMEOUT: Duration = Duration::from_secs(16);

/// Fixed tail the measurement server accounts for in a declared upload frame.
const UPLOAD_TRAILER: &str = "UPLOAD_0_\n\n";

const ENTROPY_RETRIES: u32 = 3;

/// One open line-protocol session with a measurement server. Exclusively
/// owned by a single task; dropping it closes the socket.
pub struct Connection {
    read: BufReader<OwnedReadHalf>,
    write: OwnedWriteHalf,
}

/// Outcome of one timed transfer operation.
#[derive(Debug, Clone, Copy)]
pub struct TransferResult {
    pub start: Instant,
    pub finish: Instant,
    pub duration_ms: i64,
    pub bytes: usize,
}

impl TransferResult {
    fn new(start: Instant, finish: Instant, bytes: usize) -> Self {
        Self {
            start,
            finish,
            duration_ms: finish.duration_since(start).as_millis() as i64,
            bytes,
        }
    }
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        let (read, write) = stream.into_split();
        Self {
            read: BufReader::new(read),
            write,
        }
    }

    /// Writes `text` plus the newline terminator, in full.
    pub async fn send_line(&mut self, text: &str) -> Result<usize> {
        let frame = format!("{text}\n");
        timeout(OP_TIMEOUT, self.write.write_all(frame.as_bytes()))
            .await
            .map_err(|_| SprintError::Timeout(OP_TIMEOUT))??;
        Ok(frame.len())
    }

    /// Writes a raw payload frame terminated by a newline.
    pub async fn send_frame(&mut self, payload: &[u8]) -> Result<usize> {
        timeout(OP_TIMEOUT, async {
            self.write.write_all(payload).await?;
            self.write.write_all(b"\n").await
        })
        .await
        .map_err(|_| SprintError::Timeout(OP_TIMEOUT))??;
        Ok(payload.len() + 1)
    }

    /// Reads until and including the next newline. EOF before the terminator
    /// is a protocol error.
    pub async fn read_line(&mut self) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        let n = timeout(OP_TIMEOUT, self.read.read_until(b'\n', &mut line))
            .await
            .map_err(|_| SprintError::Timeout(OP_TIMEOUT))??;
        if n == 0 || line.last() != Some(&b'\n') {
            return Err(SprintError::Protocol(
                "peer closed the stream mid-line".to_string(),
            ));
        }
        Ok(line)
    }

    /// Sends one command and returns the trimmed response line.
    pub async fn exchange(&mut self, text: &str) -> Result<String> {
        self.send_line(text).await?;
        let line = self.read_line().await?;
        Ok(String::from_utf8_lossy(&line).trim().to_string())
    }

    /// `HI` greeting. The reported protocol version is diagnostic only, so
    /// neither a failed exchange nor a short response aborts the caller.
    pub async fn handshake(&mut self) -> Option<String> {
        match self.exchange("HI").await {
            Ok(resp) => resp.split(' ').nth(1).map(str::to_string),
            Err(err) => {
                debug!("handshake failed: {err}");
                None
            }
        }
    }

    /// One `PING` round trip. The token is an opaque correlation value; the
    /// echo content is not validated, only completion.
    pub async fn ping(&mut self) -> Result<i64> {
        let token = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let start = Instant::now();
        self.exchange(&format!("PING {token}")).await?;
        Ok(start.elapsed().as_millis() as i64)
    }

    /// `DOWNLOAD <n>`: times the full receipt of the n-byte response line.
    pub async fn download(&mut self, num_bytes: usize) -> Result<TransferResult> {
        let start = Instant::now();
        self.send_line(&format!("DOWNLOAD {num_bytes}")).await?;
        self.read_line().await?;
        Ok(TransferResult::new(start, Instant::now(), num_bytes))
    }

    /// `UPLOAD <frameLen> 0` followed by `num_bytes` of random payload, then
    /// one acknowledgement line. The declared frame length must match the
    /// server's bookkeeping exactly or the peer misparses the payload
    /// boundary; see [`upload_frame_len`].
    pub async fn upload(&mut self, num_bytes: usize) -> Result<TransferResult> {
        let payload = random_payload(num_bytes)?;
        let frame_len = upload_frame_len(num_bytes);
        let start = Instant::now();
        self.send_line(&format!("UPLOAD {frame_len} 0")).await?;
        self.send_frame(&payload).await?;
        self.read_line().await?;
        Ok(TransferResult::new(start, Instant::now(), num_bytes))
    }
}

/// Frame length declared ahead of an upload body: the digit width of the
/// payload size, the payload itself, and the fixed trailer.
pub fn upload_frame_len(num_bytes: usize) -> usize {
    digit_length_of(num_bytes) + num_bytes + UPLOAD_TRAILER.len()
}

fn digit_length_of(n: usize) -> usize {
    n.to_string().len()
}

/// Cryptographically-sourced payload bytes. Entropy exhaustion is retried a
/// bounded number of times and then surfaced as fatal; it is not a transient
/// network condition.
pub fn random_payload(len: usize) -> Result<Vec<u8>> {
    let mut payload = vec![0u8; len];
    let mut attempt = 0;
    loop {
        attempt += 1;
        match OsRng.try_fill_bytes(&mut payload) {
            Ok(()) => return Ok(payload),
            Err(err) if attempt >= ENTROPY_RETRIES => return Err(SprintError::Entropy(err)),
            Err(err) => debug!("entropy source stalled (attempt {attempt}): {err}"),
        }
    }
}
