//! SSH 1.5 key exchange and session setup.
//!
//! Protocol 1.5 has no negotiated key exchange: the server simply sends its
//! two RSA public keys (the long-lived host key and the regenerated server
//! key) in `SSH_SMSG_PUBLIC_KEY`, and the client picks a session key,
//! double-encrypts it, and returns it in `SSH_CMSG_SESSION_KEY`.
//!
//! The session key is masked before encryption: the first 16 bytes are
//! XOR'd with the session id, `MD5(host_modulus || server_modulus ||
//! cookie)`. The masked key is RSA-PKCS#1 encrypted first under the server
//! key and then under the host key. The order is protocol-mandated (server
//! key innermost) and is preserved exactly even though the packet layout
//! does not make it self-evident.
//!
//! Cipher selection walks a fixed preference list against the server's
//! advertised cipher mask. The list contains Blowfish alone.
//!
//! # Example
//!
//! ```rust
//! use skiff_proto::ssh1::kex::select_cipher;
//! use skiff_proto::ssh1::message::CipherId;
//!
//! let mask = [0, 0, 0, 1u8 << 6]; // Blowfish advertised
//! assert_eq!(select_cipher(&mask).unwrap(), CipherId::Blowfish);
//! ```

use md5::{Digest, Md5};
use rand::rngs::OsRng;
use rand::RngCore;
use skiff_platform::{SkiffError, SkiffResult};
use zeroize::Zeroize;

use crate::ssh1::crypto::{SessionKey, SESSION_KEY_LEN};
use crate::ssh1::message::{AuthMethod, CipherId};

/// Length of the anti-spoofing cookie.
pub const COOKIE_LEN: usize = 8;

/// Length of the session id (an MD5 digest).
pub const SESSION_ID_LEN: usize = 16;

/// Ordered cipher preference list.
///
/// Deliberately a single entry; the selection routine below handles longer
/// lists unchanged.
pub const PREFERRED_CIPHERS: &[CipherId] = &[CipherId::Blowfish];

/// One RSA public key as transmitted in the public-key message: a 32-bit
/// bit count followed by exponent and modulus as protocol mpints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaKeyParams {
    /// Advertised key size in bits.
    pub bits: u32,
    /// Public exponent, big-endian.
    pub exponent: Vec<u8>,
    /// Public modulus, big-endian.
    pub modulus: Vec<u8>,
}

/// Parsed `SSH_SMSG_PUBLIC_KEY` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyMessage {
    /// Anti-spoofing cookie, echoed back in the session-key message.
    pub cookie: [u8; COOKIE_LEN],
    /// The regenerated server key (the smaller key, encrypts first).
    pub server_key: RsaKeyParams,
    /// The long-lived host key.
    pub host_key: RsaKeyParams,
    /// Protocol flags.
    pub protocol_flags: u32,
    /// Supported-ciphers mask, as transmitted.
    pub supported_ciphers: [u8; 4],
    /// Supported-authentications mask.
    pub supported_authentications: u32,
}

impl PublicKeyMessage {
    /// Parses the public-key message payload.
    ///
    /// Layout: 8-byte cookie, server key (uint32 bits, mpint exponent,
    /// mpint modulus), host key (same shape), uint32 protocol flags,
    /// 4-byte cipher mask, uint32 authentication mask.
    ///
    /// # Errors
    ///
    /// Returns [`SkiffError::Protocol`] on a truncated or malformed
    /// payload.
    pub fn from_payload(payload: &[u8]) -> SkiffResult<Self> {
        let mut buf = payload;

        let mut cookie = [0u8; COOKIE_LEN];
        take(&mut buf, &mut cookie, "anti-spoofing cookie")?;

        let server_key = read_key(&mut buf, "server key")?;
        let host_key = read_key(&mut buf, "host key")?;

        let protocol_flags = read_u32(&mut buf, "protocol flags")?;

        let mut supported_ciphers = [0u8; 4];
        take(&mut buf, &mut supported_ciphers, "cipher mask")?;

        let supported_authentications = read_u32(&mut buf, "authentication mask")?;

        Ok(Self {
            cookie,
            server_key,
            host_key,
            protocol_flags,
            supported_ciphers,
            supported_authentications,
        })
    }

    /// Returns whether the server advertises password authentication.
    pub fn supports_password_auth(&self) -> bool {
        AuthMethod::Password.advertised_in(self.supported_authentications)
    }
}

/// Selects the first preferred cipher the server advertises.
///
/// The mask bit for cipher `n` is tested in the lowest-order byte of the
/// 4-byte mask as transmitted.
///
/// # Errors
///
/// Returns [`SkiffError::NoSupportedCipher`] when no preferred cipher is
/// advertised.
pub fn select_cipher(supported_ciphers: &[u8; 4]) -> SkiffResult<CipherId> {
    PREFERRED_CIPHERS
        .iter()
        .copied()
        .find(|cipher| cipher.advertised_in(supported_ciphers))
        .ok_or(SkiffError::NoSupportedCipher)
}

/// Computes the session id: `MD5(host_modulus || server_modulus || cookie)`.
///
/// The moduli are digested exactly as transmitted (mpint magnitude bytes).
pub fn session_id(
    host_modulus: &[u8],
    server_modulus: &[u8],
    cookie: &[u8; COOKIE_LEN],
) -> [u8; SESSION_ID_LEN] {
    let mut hasher = Md5::new();
    hasher.update(host_modulus);
    hasher.update(server_modulus);
    hasher.update(cookie);
    hasher.finalize().into()
}

/// The `SSH_CMSG_SESSION_KEY` message, ready to serialize.
#[derive(Debug, Clone)]
pub struct SessionKeyMessage {
    cipher: CipherId,
    cookie: [u8; COOKIE_LEN],
    encrypted_key: Vec<u8>,
    protocol_flags: u32,
}

impl SessionKeyMessage {
    /// Builds the session-key message for a received public-key message.
    ///
    /// Selects the cipher, generates 32 random session-key bytes, masks
    /// them with the session id, and double-encrypts the masked key
    /// (server key first, then host key).
    ///
    /// # Returns
    ///
    /// The message plus the un-XOR'd session key the negotiated cipher
    /// must be keyed with.
    ///
    /// # Errors
    ///
    /// - [`SkiffError::NoSupportedCipher`] if the server advertises no
    ///   preferred cipher
    /// - [`SkiffError::Protocol`] if the server's RSA keys are unusable
    pub fn build(public_key: &PublicKeyMessage) -> SkiffResult<(Self, SessionKey)> {
        let cipher = select_cipher(&public_key.supported_ciphers)?;

        let mut key_bytes = [0u8; SESSION_KEY_LEN];
        OsRng.fill_bytes(&mut key_bytes);

        Self::build_with_key(public_key, cipher, key_bytes)
    }

    /// Deterministic core of [`SessionKeyMessage::build`].
    fn build_with_key(
        public_key: &PublicKeyMessage,
        cipher: CipherId,
        key_bytes: [u8; SESSION_KEY_LEN],
    ) -> SkiffResult<(Self, SessionKey)> {
        let session_id = session_id(
            &public_key.host_key.modulus,
            &public_key.server_key.modulus,
            &public_key.cookie,
        );

        let mut masked = key_bytes;
        for (byte, id_byte) in masked.iter_mut().zip(session_id.iter()) {
            *byte ^= id_byte;
        }

        // Server key innermost, host key outermost.
        let mut inner = rsa_encrypt_pkcs1(&masked, &public_key.server_key)?;
        let encrypted_key = rsa_encrypt_pkcs1(&inner, &public_key.host_key)?;
        inner.zeroize();
        masked.zeroize();

        let message = Self {
            cipher,
            cookie: public_key.cookie,
            encrypted_key,
            protocol_flags: 0,
        };
        Ok((message, SessionKey::new(key_bytes)))
    }

    /// Returns the selected cipher.
    pub fn cipher(&self) -> CipherId {
        self.cipher
    }

    /// Serializes the message payload: cipher id byte, echoed cookie,
    /// mpint-encoded encrypted key, uint32 protocol flags.
    pub fn to_payload(&self) -> Vec<u8> {
        let mut payload =
            Vec::with_capacity(1 + COOKIE_LEN + 2 + self.encrypted_key.len() + 4);
        payload.push(self.cipher as u8);
        payload.extend_from_slice(&self.cookie);
        write_mpint(&mut payload, &self.encrypted_key);
        payload.extend_from_slice(&self.protocol_flags.to_be_bytes());
        payload
    }
}

/// RSA-PKCS#1 encrypts data under a raw public key.
fn rsa_encrypt_pkcs1(data: &[u8], key: &RsaKeyParams) -> SkiffResult<Vec<u8>> {
    let public_key = rsa::RsaPublicKey::new(
        rsa::BigUint::from_bytes_be(&key.modulus),
        rsa::BigUint::from_bytes_be(&key.exponent),
    )
    .map_err(|e| SkiffError::Protocol(format!("Unusable server RSA key: {}", e)))?;

    public_key
        .encrypt(&mut OsRng, rsa::Pkcs1v15Encrypt, data)
        .map_err(|e| SkiffError::Protocol(format!("RSA encryption failed: {}", e)))
}

fn read_key(buf: &mut &[u8], what: &'static str) -> SkiffResult<RsaKeyParams> {
    let bits = read_u32(buf, what)?;
    let exponent = read_mpint(buf, what)?;
    let modulus = read_mpint(buf, what)?;
    Ok(RsaKeyParams {
        bits,
        exponent,
        modulus,
    })
}

fn read_u32(buf: &mut &[u8], what: &'static str) -> SkiffResult<u32> {
    if buf.len() < 4 {
        return Err(truncated(what));
    }
    let (head, rest) = buf.split_at(4);
    *buf = rest;
    Ok(u32::from_be_bytes([head[0], head[1], head[2], head[3]]))
}

fn take(buf: &mut &[u8], out: &mut [u8], what: &'static str) -> SkiffResult<()> {
    if buf.len() < out.len() {
        return Err(truncated(what));
    }
    let (head, rest) = buf.split_at(out.len());
    out.copy_from_slice(head);
    *buf = rest;
    Ok(())
}

/// Reads a protocol mpint: a 16-bit bit count followed by
/// `(bits + 7) / 8` magnitude bytes.
fn read_mpint(buf: &mut &[u8], what: &'static str) -> SkiffResult<Vec<u8>> {
    if buf.len() < 2 {
        return Err(truncated(what));
    }
    let bits = u16::from_be_bytes([buf[0], buf[1]]) as usize;
    *buf = &buf[2..];
    let len = (bits + 7) / 8;
    if buf.len() < len {
        return Err(truncated(what));
    }
    let (head, rest) = buf.split_at(len);
    *buf = rest;
    Ok(head.to_vec())
}

/// Writes a protocol mpint with the bit count taken as 8 times the byte
/// length, as the original client did for the encrypted session key.
fn write_mpint(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&((bytes.len() * 8) as u16).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn truncated(what: &'static str) -> SkiffError {
    SkiffError::Protocol(format!("Truncated public-key message: {}", what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::traits::PublicKeyParts;

    fn mpint_of(bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        write_mpint(&mut out, bytes);
        out
    }

    /// Builds a public-key payload around the given RSA keys and masks.
    fn build_payload(
        cookie: [u8; 8],
        server: &RsaKeyParams,
        host: &RsaKeyParams,
        cipher_mask: [u8; 4],
        auth_mask: u32,
    ) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(&cookie);
        payload.extend_from_slice(&server.bits.to_be_bytes());
        payload.extend_from_slice(&mpint_of(&server.exponent));
        payload.extend_from_slice(&mpint_of(&server.modulus));
        payload.extend_from_slice(&host.bits.to_be_bytes());
        payload.extend_from_slice(&mpint_of(&host.exponent));
        payload.extend_from_slice(&mpint_of(&host.modulus));
        payload.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(&cipher_mask);
        payload.extend_from_slice(&auth_mask.to_be_bytes());
        payload
    }

    fn toy_key(bits: u32, modulus: &[u8]) -> RsaKeyParams {
        RsaKeyParams {
            bits,
            exponent: vec![0x01, 0x00, 0x01],
            modulus: modulus.to_vec(),
        }
    }

    #[test]
    fn test_mpint_round_trip() {
        let values: [&[u8]; 3] = [&[0x01], &[0xff, 0x00, 0x80], &[0xab; 96]];
        for value in values {
            let encoded = mpint_of(value);
            let mut buf = encoded.as_slice();
            let decoded = read_mpint(&mut buf, "test").unwrap();
            assert_eq!(decoded, value);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_mpint_truncated() {
        let mut buf: &[u8] = &[0x00, 0x40, 0x01]; // claims 64 bits, has 1 byte
        assert!(matches!(
            read_mpint(&mut buf, "test"),
            Err(SkiffError::Protocol(_))
        ));
    }

    #[test]
    fn test_parse_public_key_message() {
        let cookie = [1, 2, 3, 4, 5, 6, 7, 8];
        let server = toy_key(24, &[0x11, 0x22, 0x33]);
        let host = toy_key(32, &[0x44, 0x55, 0x66, 0x77]);
        let payload = build_payload(cookie, &server, &host, [0, 0, 0, 0x44], 1 << 3);

        let message = PublicKeyMessage::from_payload(&payload).unwrap();
        assert_eq!(message.cookie, cookie);
        assert_eq!(message.server_key, server);
        assert_eq!(message.host_key, host);
        assert_eq!(message.protocol_flags, 0);
        assert_eq!(message.supported_ciphers, [0, 0, 0, 0x44]);
        assert!(message.supports_password_auth());
    }

    #[test]
    fn test_parse_truncated_message() {
        let cookie = [0u8; 8];
        let server = toy_key(24, &[1, 2, 3]);
        let host = toy_key(24, &[4, 5, 6]);
        let payload = build_payload(cookie, &server, &host, [0; 4], 0);

        for len in 0..payload.len() {
            let result = PublicKeyMessage::from_payload(&payload[..len]);
            assert!(
                matches!(result, Err(SkiffError::Protocol(_))),
                "prefix of {} bytes should not parse",
                len
            );
        }
    }

    #[test]
    fn test_select_cipher_prefers_blowfish() {
        // Blowfish and DES advertised: Blowfish wins.
        let mask = [0, 0, 0, (1u8 << 6) | (1u8 << 2)];
        assert_eq!(select_cipher(&mask).unwrap(), CipherId::Blowfish);
    }

    #[test]
    fn test_select_cipher_no_overlap() {
        // Only DES advertised: nothing in the preference list matches.
        let mask = [0, 0, 0, 1u8 << 2];
        assert!(matches!(
            select_cipher(&mask),
            Err(SkiffError::NoSupportedCipher)
        ));
    }

    #[test]
    fn test_session_id_definition() {
        let cookie = [9u8; 8];
        let host_modulus = [1u8, 2, 3];
        let server_modulus = [4u8, 5];

        let mut hasher = Md5::new();
        hasher.update(host_modulus);
        hasher.update(server_modulus);
        hasher.update(cookie);
        let expected: [u8; 16] = hasher.finalize().into();

        assert_eq!(session_id(&host_modulus, &server_modulus, &cookie), expected);

        // Any input change moves the digest.
        let other = session_id(&host_modulus, &server_modulus, &[8u8; 8]);
        assert_ne!(other, expected);
    }

    #[test]
    fn test_session_key_message_layout_and_transport() {
        // Real RSA keys so the double encryption can be unwound.
        let mut rng = OsRng;
        let server_private = rsa::RsaPrivateKey::new(&mut rng, 512).unwrap();
        let host_private = rsa::RsaPrivateKey::new(&mut rng, 768).unwrap();

        let server = RsaKeyParams {
            bits: 512,
            exponent: server_private.e().to_bytes_be(),
            modulus: server_private.n().to_bytes_be(),
        };
        let host = RsaKeyParams {
            bits: 768,
            exponent: host_private.e().to_bytes_be(),
            modulus: host_private.n().to_bytes_be(),
        };

        let cookie = [0xa5u8; 8];
        let payload = build_payload(cookie, &server, &host, [0, 0, 0, 1 << 6], 1 << 3);
        let public_key = PublicKeyMessage::from_payload(&payload).unwrap();

        let key_bytes = [0x3cu8; 32];
        let (message, session_key) =
            SessionKeyMessage::build_with_key(&public_key, CipherId::Blowfish, key_bytes)
                .unwrap();

        // The installed key is the un-XOR'd one.
        assert_eq!(session_key.as_bytes(), &key_bytes);

        // Payload layout: cipher byte, cookie, mpint, flags.
        let out = message.to_payload();
        assert_eq!(out[0], CipherId::Blowfish as u8);
        assert_eq!(&out[1..9], &cookie);
        let mut rest = &out[9..];
        let encrypted = read_mpint(&mut rest, "encrypted key").unwrap();
        assert_eq!(rest, &0u32.to_be_bytes());

        // Unwind: host key outermost, server key innermost.
        let inner = host_private
            .decrypt(rsa::Pkcs1v15Encrypt, &encrypted)
            .unwrap();
        let masked = server_private.decrypt(rsa::Pkcs1v15Encrypt, &inner).unwrap();

        let id = session_id(&host.modulus, &server.modulus, &cookie);
        let mut recovered = [0u8; 32];
        recovered.copy_from_slice(&masked);
        for (byte, id_byte) in recovered.iter_mut().zip(id.iter()) {
            *byte ^= id_byte;
        }
        assert_eq!(&recovered, &key_bytes);
    }
}
