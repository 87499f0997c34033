//! NDJSON transport.
//!
//! One JSON object per line in each direction. Reads are bounded: a line
//! longer than the configured limit is drained and skipped without being
//! buffered in full.

use std::str::FromStr;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::Mutex;

use super::{
    DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_STDIO_BUFFER_SIZE, InboundInvocation, OutboundReply, Result,
    Transport,
};

/// Configuration for the NDJSON transport.
///
/// Values are read from environment variables with fallback to defaults.
#[derive(Debug, Clone, Copy)]
pub struct StdioConfig {
    /// Maximum line size in bytes.
    pub max_message_size: usize,
    /// Read/write buffer size in bytes.
    pub buffer_size: usize,
}

impl StdioConfig {
    /// Loads configuration from environment variables with defaults.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `SKRONK_MAX_MESSAGE_SIZE` | 64 KiB |
    /// | `SKRONK_STDIO_BUFFER_SIZE` | 8 KiB |
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            max_message_size: env_or("SKRONK_MAX_MESSAGE_SIZE", DEFAULT_MAX_MESSAGE_SIZE),
            buffer_size: env_or("SKRONK_STDIO_BUFFER_SIZE", DEFAULT_STDIO_BUFFER_SIZE),
        }
    }
}

impl Default for StdioConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            buffer_size: DEFAULT_STDIO_BUFFER_SIZE,
        }
    }
}

/// NDJSON transport over any async reader/writer pair.
///
/// Reader and writer sit behind separate async mutexes so replies can be
/// written while the next line is being read.
pub struct NdjsonTransport<R, W> {
    reader: Mutex<BufReader<R>>,
    writer: Mutex<BufWriter<W>>,
    config: StdioConfig,
}

/// NDJSON over the process's stdin and stdout.
pub type StdioTransport = NdjsonTransport<tokio::io::Stdin, tokio::io::Stdout>;

impl StdioTransport {
    /// Creates a transport on stdin/stdout configured from the environment.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout(), StdioConfig::from_env())
    }
}

impl<R, W> NdjsonTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Creates a transport over `reader` and `writer`.
    #[must_use]
    pub fn new(reader: R, writer: W, config: StdioConfig) -> Self {
        Self {
            reader: Mutex::new(BufReader::with_capacity(config.buffer_size, reader)),
            writer: Mutex::new(BufWriter::with_capacity(config.buffer_size, writer)),
            config,
        }
    }

    /// Reads one line into `buf`, keeping at most `max_message_size + 1`
    /// bytes. Returns `None` at EOF and `Some(overflowed)` otherwise.
    async fn read_bounded_line(
        &self,
        reader: &mut BufReader<R>,
        buf: &mut Vec<u8>,
    ) -> Result<Option<bool>> {
        let read_limit = self.config.max_message_size + 1;
        let mut overflowed = false;
        loop {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                // Last line may lack a trailing newline
                return Ok(if buf.is_empty() && !overflowed {
                    None
                } else {
                    Some(overflowed)
                });
            }

            let newline = available.iter().position(|&b| b == b'\n');
            let chunk_end = newline.unwrap_or(available.len());
            if !overflowed {
                let remaining_cap = read_limit.saturating_sub(buf.len());
                let copy_len = chunk_end.min(remaining_cap);
                buf.extend_from_slice(&available[..copy_len]);
                overflowed = chunk_end > remaining_cap || buf.len() >= read_limit;
            }

            match newline {
                Some(pos) => {
                    reader.consume(pos + 1);
                    return Ok(Some(overflowed));
                }
                None => {
                    let consumed = available.len();
                    reader.consume(consumed);
                }
            }
        }
    }
}

impl<R, W> std::fmt::Debug for NdjsonTransport<R, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NdjsonTransport")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl<R, W> Transport for NdjsonTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    #[allow(clippy::significant_drop_tightening)] // reader must be held across the loop
    async fn receive(&self) -> Result<Option<InboundInvocation>> {
        let mut reader = self.reader.lock().await;
        let mut buf: Vec<u8> = Vec::with_capacity(self.config.buffer_size);

        loop {
            buf.clear();
            let Some(overflowed) = self.read_bounded_line(&mut reader, &mut buf).await? else {
                return Ok(None);
            };

            if overflowed {
                tracing::warn!(
                    limit = self.config.max_message_size,
                    "message exceeds size limit, skipping"
                );
                continue;
            }

            let line = match std::str::from_utf8(&buf) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!("invalid UTF-8 in message, skipping line: {e}");
                    continue;
                }
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<InboundInvocation>(trimmed) {
                Ok(invocation) => return Ok(Some(invocation)),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        line = %sanitize_for_log(trimmed, 200),
                        "invalid invocation, skipping"
                    );
                }
            }
        }
    }

    async fn send(&self, reply: &OutboundReply) -> Result<()> {
        let serialized = serde_json::to_string(reply)?;
        let mut writer = self.writer.lock().await;
        writer.write_all(serialized.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        drop(writer);
        Ok(())
    }
}

/// Truncates and strips control characters from untrusted input before logging.
fn sanitize_for_log(input: &str, max_len: usize) -> String {
    input
        .chars()
        .take(max_len)
        .map(|c| {
            if c.is_control() && c != '\t' {
                '\u{FFFD}'
            } else {
                c
            }
        })
        .collect()
}

/// Reads an environment variable, parsing it to type `T`, or returns the default.
///
/// Logs a warning if the variable is set but cannot be parsed.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(v) => v.parse().unwrap_or_else(|_| {
            tracing::warn!(name, value = %v, "invalid env var value, using default");
            default
        }),
        Err(_) => default,
    }
}
