//! SSH protocol version 1.5 client implementation.
//!
//! # Architecture
//!
//! The engine is layered, leaves first:
//!
//! 1. **Packet Layer** ([`packet`]) - Binary packet protocol: length word,
//!    1-8 bytes of random padding, type byte, payload, CRC-32 trailer;
//!    everything after the length word is encrypted once a cipher is active
//! 2. **Key Exchange** ([`kex`]) - Public-key message parsing, session-id
//!    derivation, double-RSA session-key transport, cipher selection
//! 3. **Authentication** ([`auth`]) - Username/password exchange
//! 4. **Channel Layer** ([`channel`]) - One logical stdin/stdout/stderr
//!    stream multiplexed over data packets after authentication
//! 5. **Client API** ([`client`]) - [`client::Ssh1Client`] lifecycle
//!
//! # Protocol flow
//!
//! ```text
//! client                                server
//!   |  <----------- identification ------ |
//!   |  ------------ identification -----> |   (clear text)
//!   |  <----------- SMSG_PUBLIC_KEY ----- |   (clear text)
//!   |  ------------ CMSG_SESSION_KEY ---> |   (clear text; cipher installed)
//!   |  <----------- SMSG_SUCCESS -------- |   (encrypted from here on)
//!   |  ------------ CMSG_USER ----------> |
//!   |  <----------- SMSG_FAILURE -------- |   (password prompt)
//!   |  ------------ CMSG_AUTH_PASSWORD -> |
//!   |  <----------- SMSG_SUCCESS -------- |
//!   |  ------------ pty/shell or cmd ---> |
//!   |  <==========> data / exit status    |
//! ```

pub mod auth;
pub mod channel;
pub mod client;
pub mod crypto;
pub mod kex;
pub mod message;
pub mod packet;
pub mod version;

// Re-export main types
pub use auth::{interpret_password_reply, interpret_user_reply, Credentials};
pub use channel::{SessionInput, SessionOutput, MAX_CLIENT_PACKET_SIZE};
pub use client::{Ssh1Client, Ssh1ClientConfig};
pub use crypto::{CipherState, PacketDecryptor, PacketEncryptor, SessionKey};
pub use kex::{
    select_cipher, session_id, PublicKeyMessage, RsaKeyParams, SessionKeyMessage,
    PREFERRED_CIPHERS,
};
pub use message::{AuthMethod, CipherId, MessageType};
pub use packet::{IncomingPacket, PacketReader, PacketWriter};
pub use version::Version;
