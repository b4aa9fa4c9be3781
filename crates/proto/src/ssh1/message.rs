//! SSH 1.5 protocol message types and cipher identifiers.
//!
//! This module owns the fixed protocol tables: the one-byte packet type
//! tags and the symmetric cipher identifier space of protocol 1.5. Both
//! are immutable lookup data; nothing here performs I/O.
//!
//! Message names keep the protocol's `CMSG`/`SMSG` convention: `CMSG`
//! messages travel client-to-server, `SMSG` messages server-to-client,
//! and unprefixed messages may travel in either direction.
//!
//! # Example
//!
//! ```rust
//! use skiff_proto::ssh1::message::MessageType;
//!
//! let msg_type = MessageType::SmsgPublicKey;
//! assert_eq!(msg_type as u8, 2);
//! ```

/// SSH 1.5 message types.
///
/// Each message type has a unique numeric identifier used as the type byte
/// of the binary packet format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Disconnect message - terminates the connection (either direction).
    Disconnect = 1,
    /// Server public-key message - opens the key exchange.
    SmsgPublicKey = 2,
    /// Client session-key message - transports the encrypted session key.
    CmsgSessionKey = 3,
    /// Client username announcement.
    CmsgUser = 4,
    /// Client password authentication.
    CmsgAuthPassword = 9,
    /// Client pseudo-terminal request.
    CmsgRequestPty = 10,
    /// Client request to start an interactive shell.
    CmsgExecShell = 12,
    /// Client request to execute a single command.
    CmsgExecCmd = 13,
    /// Server success reply.
    SmsgSuccess = 14,
    /// Server failure reply.
    SmsgFailure = 15,
    /// Client standard-input data.
    CmsgStdinData = 16,
    /// Server standard-output data.
    SmsgStdoutData = 17,
    /// Server standard-error data.
    SmsgStderrData = 18,
    /// Server exit-status report.
    SmsgExitStatus = 20,
    /// Client acknowledgement of the exit status.
    CmsgExitConfirmation = 33,
    /// Debug message (either direction).
    Debug = 36,
}

impl MessageType {
    /// Converts a type byte to a message type.
    ///
    /// # Arguments
    ///
    /// * `byte` - The message type byte
    ///
    /// # Returns
    ///
    /// Some(MessageType) if the byte is a known 1.5 message, None otherwise.
    ///
    /// # Example
    ///
    /// ```rust
    /// use skiff_proto::ssh1::message::MessageType;
    ///
    /// assert_eq!(MessageType::from_u8(2), Some(MessageType::SmsgPublicKey));
    /// assert_eq!(MessageType::from_u8(255), None);
    /// ```
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(MessageType::Disconnect),
            2 => Some(MessageType::SmsgPublicKey),
            3 => Some(MessageType::CmsgSessionKey),
            4 => Some(MessageType::CmsgUser),
            9 => Some(MessageType::CmsgAuthPassword),
            10 => Some(MessageType::CmsgRequestPty),
            12 => Some(MessageType::CmsgExecShell),
            13 => Some(MessageType::CmsgExecCmd),
            14 => Some(MessageType::SmsgSuccess),
            15 => Some(MessageType::SmsgFailure),
            16 => Some(MessageType::CmsgStdinData),
            17 => Some(MessageType::SmsgStdoutData),
            18 => Some(MessageType::SmsgStderrData),
            20 => Some(MessageType::SmsgExitStatus),
            33 => Some(MessageType::CmsgExitConfirmation),
            36 => Some(MessageType::Debug),
            _ => None,
        }
    }

    /// Returns the protocol name of this message type.
    pub fn name(&self) -> &'static str {
        match self {
            MessageType::Disconnect => "SSH_MSG_DISCONNECT",
            MessageType::SmsgPublicKey => "SSH_SMSG_PUBLIC_KEY",
            MessageType::CmsgSessionKey => "SSH_CMSG_SESSION_KEY",
            MessageType::CmsgUser => "SSH_CMSG_USER",
            MessageType::CmsgAuthPassword => "SSH_CMSG_AUTH_PASSWORD",
            MessageType::CmsgRequestPty => "SSH_CMSG_REQUEST_PTY",
            MessageType::CmsgExecShell => "SSH_CMSG_EXEC_SHELL",
            MessageType::CmsgExecCmd => "SSH_CMSG_EXEC_CMD",
            MessageType::SmsgSuccess => "SSH_SMSG_SUCCESS",
            MessageType::SmsgFailure => "SSH_SMSG_FAILURE",
            MessageType::CmsgStdinData => "SSH_CMSG_STDIN_DATA",
            MessageType::SmsgStdoutData => "SSH_SMSG_STDOUT_DATA",
            MessageType::SmsgStderrData => "SSH_SMSG_STDERR_DATA",
            MessageType::SmsgExitStatus => "SSH_SMSG_EXITSTATUS",
            MessageType::CmsgExitConfirmation => "SSH_CMSG_EXIT_CONFIRMATION",
            MessageType::Debug => "SSH_MSG_DEBUG",
        }
    }
}

/// Symmetric cipher identifiers of protocol 1.5.
///
/// The server advertises the ciphers it supports as a 32-bit mask in the
/// public-key message (bit `n` set means cipher `n` is available); the
/// client echoes its choice as a single identifier byte in the session-key
/// message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CipherId {
    /// No encryption.
    None = 0,
    /// IDEA in CFB mode.
    Idea = 1,
    /// DES in CBC mode.
    Des = 2,
    /// Triple-DES in CBC mode.
    TripleDes = 3,
    /// TSS (historical; never seen in deployed servers).
    Tss = 4,
    /// RC4 stream cipher.
    Rc4 = 5,
    /// Blowfish in CBC mode.
    Blowfish = 6,
}

impl CipherId {
    /// Converts an identifier byte to a cipher id.
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(CipherId::None),
            1 => Some(CipherId::Idea),
            2 => Some(CipherId::Des),
            3 => Some(CipherId::TripleDes),
            4 => Some(CipherId::Tss),
            5 => Some(CipherId::Rc4),
            6 => Some(CipherId::Blowfish),
            _ => None,
        }
    }

    /// Returns the canonical cipher name.
    pub fn name(&self) -> &'static str {
        match self {
            CipherId::None => "None",
            CipherId::Idea => "IDEA",
            CipherId::Des => "DES",
            CipherId::TripleDes => "3DES",
            CipherId::Tss => "TSS",
            CipherId::Rc4 => "RC4",
            CipherId::Blowfish => "Blowfish",
        }
    }

    /// Tests whether this cipher is set in a server-advertised cipher mask.
    ///
    /// The mask is the 4-byte field exactly as transmitted (big-endian
    /// byte order); all defined cipher identifiers fall in the mask's
    /// lowest-order byte.
    pub fn advertised_in(&self, mask: &[u8; 4]) -> bool {
        mask[3] & (1u8 << (*self as u8)) != 0
    }
}

/// Authentication method identifiers of protocol 1.5.
///
/// The server advertises supported methods as a 32-bit mask in the
/// public-key message. Only password authentication is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AuthMethod {
    /// Rhosts authentication.
    Rhosts = 1,
    /// RSA challenge-response authentication.
    Rsa = 2,
    /// Plain password authentication.
    Password = 3,
    /// Rhosts with RSA host authentication.
    RhostsRsa = 4,
}

impl AuthMethod {
    /// Tests whether this method is set in a server-advertised
    /// authentication mask.
    pub fn advertised_in(&self, mask: u32) -> bool {
        mask & (1u32 << (*self as u8)) != 0
    }
}
