//! SSH 1.5 session channel streams.
//!
//! After authentication the connection carries exactly one logical
//! stdin/stdout/stderr stream, multiplexed over data packets:
//!
//! - [`SessionOutput`] buffers stdin writes and emits bounded
//!   `SSH_CMSG_STDIN_DATA` packets
//! - [`SessionInput`] demultiplexes `SSH_SMSG_STDOUT_DATA`,
//!   `SSH_SMSG_STDERR_DATA`, `SSH_MSG_DEBUG`, `SSH_SMSG_EXITSTATUS`, and
//!   `SSH_MSG_DISCONNECT` packets into one readable byte sequence (stdout
//!   and stderr are merged; callers cannot separate them)
//!
//! The two streams are independent and may be driven concurrently. The
//! one point of contact is the packet writer: the exit-status
//! acknowledgement is sent from the read side, so both streams hold the
//! writer behind a mutex and every packet goes out whole.

use std::sync::Arc;

use skiff_platform::{SkiffError, SkiffResult};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tracing::debug;

use crate::ssh1::message::MessageType;
use crate::ssh1::packet::{encode_string, PacketReader, PacketWriter};

/// Maximum payload carried by one outgoing data packet.
pub const MAX_CLIENT_PACKET_SIZE: usize = 1024;

/// Description used when a disconnect message carries none.
const NO_DISCONNECT_DESCRIPTION: &str = "connection closed by server";

/// Packet writer shared between the two session streams.
pub(crate) type SharedWriter<W> = Arc<Mutex<PacketWriter<W>>>;

/// Outbound (stdin) stream of a session.
///
/// Writes accumulate in a fixed 1024-byte buffer; the buffer goes out as
/// one `SSH_CMSG_STDIN_DATA` packet when it fills, on [`flush`], or on
/// [`close`]. Writes larger than the buffer are sent as a run of full-size
/// packets followed by a partial buffer fill.
///
/// [`flush`]: SessionOutput::flush
/// [`close`]: SessionOutput::close
#[derive(Debug)]
pub struct SessionOutput<W> {
    writer: SharedWriter<W>,
    buffer: Vec<u8>,
    closed: bool,
}

impl<W: AsyncWrite + Unpin> SessionOutput<W> {
    pub(crate) fn new(writer: SharedWriter<W>) -> Self {
        Self {
            writer,
            buffer: Vec::with_capacity(MAX_CLIENT_PACKET_SIZE),
            closed: false,
        }
    }

    /// Writes bytes to the stream, emitting data packets as the buffer
    /// fills.
    ///
    /// # Errors
    ///
    /// Returns [`SkiffError::StreamClosed`] after [`close`], and transport
    /// errors from packet sends.
    ///
    /// [`close`]: SessionOutput::close
    pub async fn write(&mut self, data: &[u8]) -> SkiffResult<()> {
        if self.closed {
            return Err(SkiffError::StreamClosed);
        }

        let mut data = data;

        // Top up a partially filled buffer first.
        if !self.buffer.is_empty() {
            let take = (MAX_CLIENT_PACKET_SIZE - self.buffer.len()).min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.buffer.len() == MAX_CLIENT_PACKET_SIZE {
                self.flush_buffer().await?;
            }
        }

        // Full packets straight from the caller's buffer.
        while data.len() >= MAX_CLIENT_PACKET_SIZE {
            let (chunk, rest) = data.split_at(MAX_CLIENT_PACKET_SIZE);
            self.send_stdin(chunk).await?;
            data = rest;
        }

        if !data.is_empty() {
            self.buffer.extend_from_slice(data);
        }
        Ok(())
    }

    /// Sends any buffered bytes as one data packet.
    pub async fn flush(&mut self) -> SkiffResult<()> {
        if self.closed {
            return Err(SkiffError::StreamClosed);
        }
        self.flush_buffer().await
    }

    /// Flushes, then marks the stream terminally closed.
    ///
    /// The stream ends closed even if the final flush fails; that flush
    /// error is what the call returns.
    pub async fn close(&mut self) -> SkiffResult<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.flush_buffer().await;
        self.closed = true;
        result
    }

    /// Returns whether the stream is closed.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    async fn flush_buffer(&mut self) -> SkiffResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::take(&mut self.buffer);
        self.send_stdin(&chunk).await
    }

    async fn send_stdin(&mut self, data: &[u8]) -> SkiffResult<()> {
        let payload = encode_string(data);
        self.writer
            .lock()
            .await
            .send(MessageType::CmsgStdinData, &payload)
            .await
    }

    pub(crate) fn writer(&self) -> SharedWriter<W> {
        Arc::clone(&self.writer)
    }
}

/// Inbound (stdout/stderr) stream of a session.
///
/// Holds at most one decoded packet's data at a time and refills lazily,
/// one packet per refill. End-of-stream (exit status or disconnect) is
/// terminal: once reached, reads return zero bytes without touching the
/// transport again.
#[derive(Debug)]
pub struct SessionInput<R, W> {
    reader: PacketReader<R>,
    writer: SharedWriter<W>,
    buffer: Vec<u8>,
    pos: usize,
    at_end: bool,
    exit_status: Option<u32>,
    closed: bool,
}

impl<R, W> SessionInput<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub(crate) fn new(reader: PacketReader<R>, writer: SharedWriter<W>) -> Self {
        Self {
            reader,
            writer,
            buffer: Vec::new(),
            pos: 0,
            at_end: false,
            exit_status: None,
            closed: false,
        }
    }

    /// Reads up to `buf.len()` bytes from the merged stdout/stderr
    /// sequence.
    ///
    /// # Returns
    ///
    /// The number of bytes read; zero once the stream has ended (exit
    /// status received, disconnect already reported, or `buf` empty).
    ///
    /// # Errors
    ///
    /// - [`SkiffError::StreamClosed`] after [`close`](SessionInput::close)
    /// - [`SkiffError::Disconnected`] on the read that encounters the
    ///   server's disconnect message
    /// - [`SkiffError::UnexpectedPacket`] on packet types that do not
    ///   belong to a running session
    pub async fn read(&mut self, buf: &mut [u8]) -> SkiffResult<usize> {
        if self.closed {
            return Err(SkiffError::StreamClosed);
        }
        if buf.is_empty() {
            return Ok(0);
        }

        while self.remaining() == 0 {
            if self.at_end {
                return Ok(0);
            }
            self.fill().await?;
        }

        let take = self.remaining().min(buf.len());
        buf[..take].copy_from_slice(&self.buffer[self.pos..self.pos + take]);
        self.pos += take;
        Ok(take)
    }

    /// Reads the whole remaining stream, up to end-of-stream.
    pub async fn read_to_end(&mut self) -> SkiffResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&chunk[..n]);
        }
    }

    /// Returns the remote exit status, once reported.
    pub fn exit_status(&self) -> Option<u32> {
        self.exit_status
    }

    /// Returns whether end-of-stream has been reached.
    pub fn at_end(&self) -> bool {
        self.at_end
    }

    /// Marks the stream closed; further reads fail with
    /// [`SkiffError::StreamClosed`].
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.buffer.clear();
            self.pos = 0;
        }
    }

    fn remaining(&self) -> usize {
        self.buffer.len() - self.pos
    }

    /// Decodes the next packet and dispatches it by type.
    async fn fill(&mut self) -> SkiffResult<()> {
        let packet = self.reader.recv().await?;
        match packet.message_type() {
            Some(
                MessageType::SmsgStdoutData | MessageType::SmsgStderrData | MessageType::Debug,
            ) => {
                self.buffer = read_data_payload(packet.payload())?;
                self.pos = 0;
                Ok(())
            }
            Some(MessageType::SmsgExitStatus) => {
                let payload = packet.payload();
                if payload.len() < 4 {
                    return Err(SkiffError::Protocol(
                        "Exit-status payload shorter than 4 bytes".to_string(),
                    ));
                }
                let status = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
                debug!(status, "remote exit status received");
                self.exit_status = Some(status);
                self.at_end = true;
                // The protocol requires an acknowledgement so the server
                // can close cleanly.
                self.writer
                    .lock()
                    .await
                    .send(MessageType::CmsgExitConfirmation, &[])
                    .await
            }
            Some(MessageType::Disconnect) => {
                self.at_end = true;
                let description = read_disconnect_description(packet.payload());
                debug!(%description, "server disconnected");
                Err(SkiffError::Disconnected(description))
            }
            _ => Err(SkiffError::UnexpectedPacket {
                packet_type: packet.packet_type(),
                expected: "session data, exit status, or disconnect",
            }),
        }
    }
}

/// Parses a data packet payload: uint32 length prefix plus that many bytes.
fn read_data_payload(payload: &[u8]) -> SkiffResult<Vec<u8>> {
    if payload.len() < 4 {
        return Err(SkiffError::Protocol(
            "Data payload shorter than its length prefix".to_string(),
        ));
    }
    let len = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
    if payload.len() - 4 < len {
        return Err(SkiffError::Protocol(format!(
            "Data payload declares {} bytes but carries {}",
            len,
            payload.len() - 4
        )));
    }
    Ok(payload[4..4 + len].to_vec())
}

/// Extracts the optional description string from a disconnect payload.
fn read_disconnect_description(payload: &[u8]) -> String {
    match read_data_payload(payload) {
        Ok(bytes) if !bytes.is_empty() => String::from_utf8_lossy(&bytes).into_owned(),
        _ => NO_DISCONNECT_DESCRIPTION.to_string(),
    }
}

/// Builds the `SSH_CMSG_REQUEST_PTY` payload: terminal type "dumb" and
/// zeroed geometry and modes.
pub(crate) fn pty_request_payload() -> Vec<u8> {
    let mut payload = encode_string(b"dumb");
    payload.extend_from_slice(&0u32.to_be_bytes()); // rows
    payload.extend_from_slice(&0u32.to_be_bytes()); // columns
    payload.extend_from_slice(&0u32.to_be_bytes()); // x pixels
    payload.extend_from_slice(&0u32.to_be_bytes()); // y pixels
    payload.push(0); // TTY_OP_END
    payload
}
