//! SSH 1.5 client.
//!
//! [`Ssh1Client`] drives the whole connection lifecycle: identification
//! exchange, key exchange, authentication, shell or command startup, and
//! access to the session streams.
//!
//! # Example
//!
//! ```rust,no_run
//! use skiff_proto::ssh1::auth::Credentials;
//! use skiff_proto::ssh1::client::{Ssh1Client, Ssh1ClientConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Connect, authenticate, and run one remote command
//! let mut client = Ssh1Client::dial(
//!     "legacy-host.example.com",
//!     22,
//!     Credentials::new("user", "password"),
//!     Some("uname -a".to_string()),
//!     Ssh1ClientConfig::default(),
//! )
//! .await?;
//!
//! let output = client.input()?.read_to_end().await?;
//! println!("{}", String::from_utf8_lossy(&output));
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use skiff_platform::{SkiffError, SkiffResult};
use tokio::io::{split, AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::ssh1::auth::{interpret_password_reply, interpret_user_reply, Credentials};
use crate::ssh1::channel::{pty_request_payload, SessionInput, SessionOutput, SharedWriter};
use crate::ssh1::crypto::CipherState;
use crate::ssh1::kex::{PublicKeyMessage, SessionKeyMessage};
use crate::ssh1::message::{CipherId, MessageType};
use crate::ssh1::packet::{encode_string, PacketReader, PacketWriter};
use crate::ssh1::version::Version;

/// SSH 1.5 client configuration.
#[derive(Debug, Clone)]
pub struct Ssh1ClientConfig {
    /// Our identification string.
    pub version: Version,
    /// TCP connection timeout for [`Ssh1Client::dial`].
    pub connect_timeout: Duration,
    /// Optional per-operation transport timeout. Reads and writes that
    /// would block longer fail with a timed-out I/O error instead of
    /// blocking forever; `None` disables the limit.
    pub io_timeout: Option<Duration>,
}

impl Default for Ssh1ClientConfig {
    fn default() -> Self {
        Self {
            version: Version::default_skiff(),
            connect_timeout: Duration::from_secs(30),
            io_timeout: None,
        }
    }
}

/// SSH 1.5 client.
///
/// Owns the transport and, once connected, the two session streams.
/// Exactly one connection per client: after a failed `connect()` the
/// transport has been torn down and a new client must be constructed
/// to retry.
#[derive(Debug)]
pub struct Ssh1Client<S> {
    /// Configuration.
    config: Ssh1ClientConfig,
    /// Session credentials.
    credentials: Credentials,
    /// Command to execute; `None` starts an interactive shell.
    command: Option<String>,
    /// The transport, present until `connect()` consumes it.
    transport: Option<S>,
    /// Server identification, set during the handshake.
    server_version: Option<Version>,
    /// Negotiated cipher, set during the handshake.
    cipher: Option<CipherId>,
    /// Inbound session stream (present while connected).
    input: Option<SessionInput<ReadHalf<S>, WriteHalf<S>>>,
    /// Outbound session stream (present while connected).
    output: Option<SessionOutput<WriteHalf<S>>>,
    /// Connection flag.
    connected: bool,
}

impl<S: AsyncRead + AsyncWrite> Ssh1Client<S> {
    /// Creates a client over a caller-supplied transport.
    ///
    /// The session starts an interactive shell unless a command is set
    /// with [`Ssh1Client::with_command`].
    pub fn new(transport: S, credentials: Credentials, config: Ssh1ClientConfig) -> Self {
        Self {
            config,
            credentials,
            command: None,
            transport: Some(transport),
            server_version: None,
            cipher: None,
            input: None,
            output: None,
            connected: false,
        }
    }

    /// Configures the session to execute a single remote command instead
    /// of starting a shell.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Connects: runs the identification exchange, key exchange,
    /// authentication, and shell/command startup.
    ///
    /// Calling `connect()` while connected is a no-op. On failure at any
    /// stage the transport is torn down before the error is returned and
    /// the client is left not-connected; the session streams only exist
    /// after the whole handshake has succeeded.
    ///
    /// # Errors
    ///
    /// Any of the error kinds in [`SkiffError`]; notably
    /// [`SkiffError::AuthenticationFailed`] on a rejected password and
    /// [`SkiffError::NoSupportedCipher`] when cipher negotiation fails.
    pub async fn connect(&mut self) -> SkiffResult<()> {
        if self.connected {
            return Ok(());
        }

        let transport = self.transport.take().ok_or_else(|| {
            SkiffError::Config(
                "Transport was consumed by a failed connect; create a new client".to_string(),
            )
        })?;

        let (read_half, write_half) = split(transport);
        let mut reader = PacketReader::new(read_half, self.config.io_timeout);
        let mut writer = PacketWriter::new(write_half, self.config.io_timeout);

        match self.handshake(&mut reader, &mut writer).await {
            Ok(()) => {
                let writer: SharedWriter<WriteHalf<S>> = Arc::new(Mutex::new(writer));
                self.input = Some(SessionInput::new(reader, Arc::clone(&writer)));
                self.output = Some(SessionOutput::new(writer));
                self.connected = true;
                Ok(())
            }
            Err(e) => {
                teardown(reader, writer).await;
                Err(e)
            }
        }
    }

    /// Runs the handshake stages over the split transport.
    async fn handshake(
        &mut self,
        reader: &mut PacketReader<ReadHalf<S>>,
        writer: &mut PacketWriter<WriteHalf<S>>,
    ) -> SkiffResult<()> {
        // Identification exchange.
        writer
            .write_raw(&self.config.version.to_wire_format())
            .await?;
        let line = reader.read_line().await?;
        let server_version = Version::parse(&line)?;
        debug!(server = %server_version, "identification exchanged");
        self.server_version = Some(server_version);

        // Server public keys.
        let packet = reader.recv().await?.expect(MessageType::SmsgPublicKey)?;
        let public_key = PublicKeyMessage::from_payload(packet.payload())?;
        if !public_key.supports_password_auth() {
            warn!("server does not advertise password authentication; proceeding anyway");
        }

        // Session key transport. The session-key packet itself travels in
        // clear text; everything after it is encrypted in both directions.
        let (session_key_msg, session_key) = SessionKeyMessage::build(&public_key)?;
        writer
            .send(MessageType::CmsgSessionKey, &session_key_msg.to_payload())
            .await?;

        let cipher_state = CipherState::new(session_key_msg.cipher(), session_key)?;
        writer.install_cipher(cipher_state.encryptor());
        reader.install_cipher(cipher_state.decryptor());
        self.cipher = Some(cipher_state.id());
        debug!(cipher = cipher_state.id().name(), "cipher installed");

        reader.recv().await?.expect(MessageType::SmsgSuccess)?;

        // Password authentication.
        writer
            .send(MessageType::CmsgUser, &self.credentials.user_payload())
            .await?;
        interpret_user_reply(reader.recv().await?)?;
        writer
            .send(
                MessageType::CmsgAuthPassword,
                &self.credentials.password_payload(),
            )
            .await?;
        interpret_password_reply(reader.recv().await?)?;
        debug!(username = self.credentials.username(), "authenticated");

        // Shell or command startup. Neither the shell nor the exec packet
        // is acknowledged; the channel is open once it is sent.
        match &self.command {
            None => {
                writer
                    .send(MessageType::CmsgRequestPty, &pty_request_payload())
                    .await?;
                reader.recv().await?.expect(MessageType::SmsgSuccess)?;
                writer.send(MessageType::CmsgExecShell, &[]).await?;
                debug!("interactive shell started");
            }
            Some(command) => {
                writer
                    .send(MessageType::CmsgExecCmd, &encode_string(command.as_bytes()))
                    .await?;
                debug!(%command, "remote command started");
            }
        }
        Ok(())
    }

    /// Disconnects: best-effort sends the disconnect notice, then tears
    /// the session streams and transport down.
    ///
    /// Calling `disconnect()` while not connected is a no-op. Teardown
    /// errors are logged and suppressed.
    pub async fn disconnect(&mut self) -> SkiffResult<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;

        let input = self.input.take();
        let output = self.output.take();
        if let (Some(mut input), Some(mut output)) = (input, output) {
            {
                let writer = output.writer();
                let mut writer = writer.lock().await;
                if let Err(e) = writer
                    .send(MessageType::Disconnect, &encode_string(b""))
                    .await
                {
                    debug!(error = %e, "disconnect notice failed; continuing teardown");
                }
            }

            // Input before output before transport.
            input.close();
            if let Err(e) = output.close().await {
                debug!(error = %e, "output close failed during teardown");
            }
            let writer = output.writer();
            if let Err(e) = writer.lock().await.shutdown().await {
                debug!(error = %e, "transport shutdown failed during teardown");
            };
        }
        Ok(())
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Returns the server's identification, once exchanged.
    pub fn server_version(&self) -> Option<&Version> {
        self.server_version.as_ref()
    }

    /// Returns the negotiated cipher, once selected.
    pub fn cipher(&self) -> Option<CipherId> {
        self.cipher
    }

    /// Returns the remote exit status, once reported on the inbound
    /// stream.
    pub fn exit_status(&self) -> Option<u32> {
        self.input.as_ref().and_then(|input| input.exit_status())
    }

    /// Returns the inbound session stream.
    ///
    /// # Errors
    ///
    /// Returns [`SkiffError::Config`] when not connected.
    pub fn input(&mut self) -> SkiffResult<&mut SessionInput<ReadHalf<S>, WriteHalf<S>>> {
        self.input.as_mut().ok_or_else(not_connected)
    }

    /// Returns the outbound session stream.
    ///
    /// # Errors
    ///
    /// Returns [`SkiffError::Config`] when not connected.
    pub fn output(&mut self) -> SkiffResult<&mut SessionOutput<WriteHalf<S>>> {
        self.output.as_mut().ok_or_else(not_connected)
    }

    /// Returns both session streams, for driving reads and writes
    /// concurrently (e.g. under `tokio::join!`).
    ///
    /// # Errors
    ///
    /// Returns [`SkiffError::Config`] when not connected.
    #[allow(clippy::type_complexity)]
    pub fn split(
        &mut self,
    ) -> SkiffResult<(
        &mut SessionInput<ReadHalf<S>, WriteHalf<S>>,
        &mut SessionOutput<WriteHalf<S>>,
    )> {
        match (self.input.as_mut(), self.output.as_mut()) {
            (Some(input), Some(output)) => Ok((input, output)),
            _ => Err(not_connected()),
        }
    }
}

impl Ssh1Client<TcpStream> {
    /// Connects to `host:port` over TCP and runs the full handshake.
    ///
    /// # Arguments
    ///
    /// * `host` - Server hostname or address
    /// * `port` - Server port (the protocol default is 22)
    /// * `credentials` - Username and password
    /// * `command` - Remote command, or `None` for an interactive shell
    /// * `config` - Client configuration
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use skiff_proto::ssh1::auth::Credentials;
    /// use skiff_proto::ssh1::client::{Ssh1Client, Ssh1ClientConfig};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = Ssh1Client::dial(
    ///     "127.0.0.1",
    ///     22,
    ///     Credentials::new("user", "password"),
    ///     None,
    ///     Ssh1ClientConfig::default(),
    /// )
    /// .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn dial(
        host: &str,
        port: u16,
        credentials: Credentials,
        command: Option<String>,
        config: Ssh1ClientConfig,
    ) -> SkiffResult<Self> {
        let addr = format!("{}:{}", host, port);
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                SkiffError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("Connection to {} timed out", addr),
                ))
            })?
            .map_err(SkiffError::Io)?;

        let mut client = Self::new(stream, credentials, config);
        if let Some(command) = command {
            client = client.with_command(command);
        }
        client.connect().await?;
        Ok(client)
    }
}

fn not_connected() -> SkiffError {
    SkiffError::Config("Client is not connected".to_string())
}

/// Tears down a split transport after a failed handshake: the read half
/// first, then the write half, suppressing secondary errors so the
/// handshake failure is what propagates.
async fn teardown<R, W>(reader: PacketReader<R>, mut writer: PacketWriter<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    drop(reader);
    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "transport shutdown failed during teardown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Ssh1ClientConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.io_timeout, None);
        assert!(config.version.to_string().starts_with("SSH-1.5-Skiff"));
    }

    #[tokio::test]
    async fn test_not_connected_accessors() {
        let (transport, _peer) = tokio::io::duplex(64);
        let mut client = Ssh1Client::new(
            transport,
            Credentials::new("user", "password"),
            Ssh1ClientConfig::default(),
        );

        assert!(!client.is_connected());
        assert!(client.server_version().is_none());
        assert!(client.cipher().is_none());
        assert!(client.exit_status().is_none());
        assert!(matches!(client.input(), Err(SkiffError::Config(_))));
        assert!(matches!(client.output(), Err(SkiffError::Config(_))));
        assert!(matches!(client.split(), Err(SkiffError::Config(_))));
    }

    #[tokio::test]
    async fn test_disconnect_when_not_connected_is_noop() {
        let (transport, _peer) = tokio::io::duplex(64);
        let mut client = Ssh1Client::new(
            transport,
            Credentials::new("user", "password"),
            Ssh1ClientConfig::default(),
        );
        assert!(client.disconnect().await.is_ok());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_failed_connect_consumes_transport() {
        // The peer closes immediately, so the handshake dies in the
        // identification exchange.
        let (transport, peer) = tokio::io::duplex(64);
        drop(peer);

        let mut client = Ssh1Client::new(
            transport,
            Credentials::new("user", "password"),
            Ssh1ClientConfig::default(),
        );
        assert!(client.connect().await.is_err());
        assert!(!client.is_connected());

        // A second attempt reports the consumed transport.
        match client.connect().await {
            Err(SkiffError::Config(msg)) => assert!(msg.contains("new client")),
            other => panic!("Expected Config error, got {:?}", other),
        }
    }
}
