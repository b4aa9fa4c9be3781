//! SSH 1.5 password authentication.
//!
//! Authentication in protocol 1.5 is a fixed four-step exchange:
//!
//! 1. Client sends `SSH_CMSG_USER` with the username
//! 2. Server answers `SSH_SMSG_FAILURE`, which is not a failure but the prompt to
//!    supply a password (a server that required no authentication would
//!    answer `SSH_SMSG_SUCCESS`, which password-only servers never do)
//! 3. Client sends `SSH_CMSG_AUTH_PASSWORD` with the password
//! 4. Server answers `SSH_SMSG_SUCCESS` or `SSH_SMSG_FAILURE`
//!
//! A rejected password surfaces as [`SkiffError::AuthenticationFailed`],
//! distinct from protocol errors, so callers can re-prompt for credentials
//! instead of treating the reply as a bug.
//!
//! The reply interpretation lives here as pure functions; the client drives
//! the packet I/O around them.

use skiff_platform::{SkiffError, SkiffResult};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::ssh1::message::MessageType;
use crate::ssh1::packet::{encode_string, IncomingPacket};

/// Username and password for the session.
///
/// The password is wiped on drop and never appears in `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    /// Creates credentials for a session.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the username.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Builds the `SSH_CMSG_USER` payload (length-prefixed username).
    pub fn user_payload(&self) -> Vec<u8> {
        encode_string(self.username.as_bytes())
    }

    /// Builds the `SSH_CMSG_AUTH_PASSWORD` payload (length-prefixed
    /// password).
    pub fn password_payload(&self) -> Vec<u8> {
        encode_string(self.password.as_bytes())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Interprets the server's reply to `SSH_CMSG_USER`.
///
/// `SSH_SMSG_FAILURE` is the expected password prompt; anything else is
/// out of sequence.
pub fn interpret_user_reply(packet: IncomingPacket) -> SkiffResult<()> {
    packet.expect(MessageType::SmsgFailure).map(|_| ())
}

/// Interprets the server's reply to `SSH_CMSG_AUTH_PASSWORD`.
///
/// # Errors
///
/// - [`SkiffError::AuthenticationFailed`] when the server rejects the
///   password
/// - [`SkiffError::UnexpectedPacket`] on any reply other than
///   success/failure
pub fn interpret_password_reply(packet: IncomingPacket) -> SkiffResult<()> {
    match packet.message_type() {
        Some(MessageType::SmsgSuccess) => Ok(()),
        Some(MessageType::SmsgFailure) => Err(SkiffError::AuthenticationFailed),
        _ => Err(SkiffError::UnexpectedPacket {
            packet_type: packet.packet_type(),
            expected: "SSH_SMSG_SUCCESS",
        }),
    }
}
