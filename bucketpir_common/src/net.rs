//! Blocking byte stream plumbing shared by both peers: chunked transfer, handshake bytes, and dialing with retry.

use crate::{
    error::BucketPIRError,
    params::{CHUNK_SIZE, CONNECTION_RETRIES},
};
use std::{
    io::{Read, Write},
    net::{TcpListener, TcpStream, ToSocketAddrs},
    thread,
    time::Duration,
};
use tracing::{debug, warn};

/// Byte signalling "hint ready" from the server and "ready for online" from the client.
pub const READY_BYTE: u8 = 1;

/// Delay before the first redial, doubled after every failed attempt.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Byte stream wrapper counting traffic in both directions.
pub struct MeteredStream<S> {
    inner: S,
    sent: u64,
    received: u64,
}

impl<S> MeteredStream<S> {
    pub fn new(inner: S) -> MeteredStream<S> {
        MeteredStream { inner, sent: 0, received: 0 }
    }

    #[inline(always)]
    pub const fn sent(&self) -> u64 {
        self.sent
    }

    #[inline(always)]
    pub const fn received(&self) -> u64 {
        self.received
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: Read> Read for MeteredStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.received += n as u64;
        Ok(n)
    }
}

impl<S: Write> Write for MeteredStream<S> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.sent += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Writes `data` in pieces of at most `CHUNK_SIZE` bytes.
pub fn write_chunked<W: Write>(stream: &mut W, data: &[u8]) -> Result<(), BucketPIRError> {
    for chunk in data.chunks(CHUNK_SIZE) {
        stream.write_all(chunk)?;
    }
    stream.flush()?;

    Ok(())
}

/// Reads exactly `len` bytes, in pieces of at most `CHUNK_SIZE` bytes. A stream closing early is an error, never a
/// short result.
pub fn read_chunked<R: Read>(stream: &mut R, len: usize) -> Result<Vec<u8>, BucketPIRError> {
    let mut data = vec![0u8; len];
    for chunk in data.chunks_mut(CHUNK_SIZE) {
        stream.read_exact(chunk)?;
    }

    Ok(data)
}

pub fn write_ready<W: Write>(stream: &mut W) -> Result<(), BucketPIRError> {
    stream.write_all(&[READY_BYTE])?;
    stream.flush()?;

    Ok(())
}

/// Blocks until the peer's ready byte arrives.
pub fn read_ready<R: Read>(stream: &mut R) -> Result<(), BucketPIRError> {
    let mut byte = [0u8; 1];
    stream.read_exact(&mut byte)?;

    if byte[0] != READY_BYTE {
        return Err(BucketPIRError::UnexpectedHandshakeByte {
            expected: READY_BYTE,
            actual: byte[0],
        });
    }

    Ok(())
}

pub fn write_u64<W: Write>(stream: &mut W, value: u64) -> Result<(), BucketPIRError> {
    stream.write_all(&value.to_le_bytes())?;
    Ok(())
}

pub fn read_u64<R: Read>(stream: &mut R) -> Result<u64, BucketPIRError> {
    let mut bytes = [0u8; std::mem::size_of::<u64>()];
    stream.read_exact(&mut bytes)?;

    Ok(u64::from_le_bytes(bytes))
}

/// Session streams block indefinitely and send small writes immediately.
fn configure(stream: &TcpStream) -> Result<(), BucketPIRError> {
    stream.set_read_timeout(None)?;
    stream.set_write_timeout(None)?;
    stream.set_nodelay(true)?;

    Ok(())
}

/// Dials `addr`, retrying up to `retries` times with exponential backoff starting at `backoff`.
///
/// # Returns
///
/// * `Result<TcpStream, BucketPIRError>` - Connected and configured stream, or `ConnectionFailed` carrying the last
///   dial error once every attempt failed.
pub fn connect_with_retry<A: ToSocketAddrs + std::fmt::Display>(addr: A, retries: u32, mut backoff: Duration) -> Result<TcpStream, BucketPIRError> {
    let attempts = retries.max(1);
    let mut attempt = 1;

    loop {
        match TcpStream::connect(&addr) {
            Ok(stream) => {
                configure(&stream)?;
                debug!(%addr, attempt, "connected");

                return Ok(stream);
            }
            Err(source) if attempt >= attempts => {
                return Err(BucketPIRError::ConnectionFailed {
                    addr: addr.to_string(),
                    attempts,
                    source,
                });
            }
            Err(err) => {
                warn!(%addr, attempt, ?backoff, error = %err, "dial failed, retrying");

                thread::sleep(backoff);
                backoff *= 2;
                attempt += 1;
            }
        }
    }
}

/// Dials `addr` with the default retry policy.
pub fn connect<A: ToSocketAddrs + std::fmt::Display>(addr: A) -> Result<TcpStream, BucketPIRError> {
    connect_with_retry(addr, CONNECTION_RETRIES, INITIAL_BACKOFF)
}

/// Waits for exactly one peer on `listener`.
pub fn accept_one(listener: &TcpListener) -> Result<TcpStream, BucketPIRError> {
    let (stream, peer) = listener.accept()?;
    configure(&stream)?;
    debug!(%peer, "accepted");

    Ok(stream)
}
