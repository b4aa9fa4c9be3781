//! Client implementation of the legacy SSH 1.5 protocol.
//!
//! This crate implements the client side of SSH protocol version 1.5: the
//! version handshake, RSA session-key transport, symmetric cipher
//! negotiation, password authentication, and a single shell/exec channel
//! carrying stdin, stdout, stderr, and the remote exit status over
//! encrypted, checksummed packets.
//!
//! # Architecture
//!
//! The implementation is layered:
//!
//! 1. **Packet Layer** ([`ssh1::packet`]) - Binary packet protocol with
//!    length, padding, and CRC-32 framing
//! 2. **Key Exchange** ([`ssh1::kex`]) - Server key receipt, session-key
//!    transport, cipher selection
//! 3. **Authentication** ([`ssh1::auth`]) - Password authentication
//! 4. **Channel Layer** ([`ssh1::channel`]) - Buffered stdin stream and
//!    demultiplexed stdout/stderr/exit stream
//! 5. **Client API** ([`ssh1::client`]) - Connection lifecycle
//!
//! # Example
//!
//! ```rust
//! use skiff_proto::ssh1::MessageType;
//!
//! // Every protocol message carries a one-byte type tag
//! assert_eq!(MessageType::SmsgPublicKey as u8, 2);
//! assert_eq!(MessageType::from_u8(14), Some(MessageType::SmsgSuccess));
//! ```
//!
//! # Security
//!
//! Protocol 1.5 is obsolete and cryptographically weak by modern standards
//! (CRC-32 integrity, RSA-PKCS#1 key transport, Blowfish/DES/3DES ciphers).
//! This crate exists to talk to legacy servers that speak nothing newer;
//! do not use it where an SSH 2 implementation is an option.
//!
//! - Session keys and passwords are zeroized on drop using [`zeroize`]
//! - All packet parsing validates declared lengths before allocation
//! - No `unsafe` code

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod ssh1;
