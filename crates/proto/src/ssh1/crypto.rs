//! Symmetric cipher state for SSH 1.5 packet encryption.
//!
//! Protocol 1.5 encrypts every packet after the session-key message with a
//! single negotiated cipher keyed by the 32-byte session key. The cipher
//! runs in CBC mode with a zero initial vector, and the chaining state
//! carries across packets for the life of the connection: each direction
//! of the connection is one continuous CBC stream.
//!
//! [`CipherState`] is the negotiated, immutable (cipher id, session key)
//! pair installed exactly once after key exchange. Each direction derives
//! its own stateful instance from it ([`PacketEncryptor`] for outgoing
//! packets, [`PacketDecryptor`] for incoming ones), so concurrent readers
//! and writers never share mutable cipher state.
//!
//! Key usage per cipher:
//!
//! - Blowfish: all 32 session-key bytes
//! - DES: the first 8 bytes
//! - 3DES: the first 24 bytes
//!
//! # Example
//!
//! ```rust
//! use skiff_proto::ssh1::crypto::{CipherState, SessionKey};
//! use skiff_proto::ssh1::message::CipherId;
//!
//! let state = CipherState::new(CipherId::Blowfish, SessionKey::new([7u8; 32])).unwrap();
//! let mut enc = state.encryptor();
//! let mut dec = state.decryptor();
//!
//! let mut block = *b"exactly8";
//! enc.encrypt(&mut block).unwrap();
//! dec.decrypt(&mut block).unwrap();
//! assert_eq!(&block, b"exactly8");
//! ```

use blowfish::Blowfish;
use cipher::generic_array::GenericArray;
use cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use des::{Des, TdesEde3};
use skiff_platform::{SkiffError, SkiffResult};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::ssh1::message::CipherId;

/// Length of the session key in bytes.
pub const SESSION_KEY_LEN: usize = 32;

/// Cipher block size in bytes. All protocol 1.5 block ciphers use 8-byte
/// blocks, which is also the packet padding granularity.
pub const CIPHER_BLOCK_SIZE: usize = 8;

/// The 32-byte session key.
///
/// Wiped on drop. The `Debug` representation never prints key material.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl SessionKey {
    /// Wraps raw session-key bytes.
    pub fn new(bytes: [u8; SESSION_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SessionKey").field(&"<redacted>").finish()
    }
}

/// The negotiated cipher state: chosen cipher identifier plus session key.
///
/// Installed exactly once, immediately after the session-key message is
/// sent, and immutable afterwards. Stateful per-direction cipher instances
/// are derived from it with [`CipherState::encryptor`] and
/// [`CipherState::decryptor`].
pub struct CipherState {
    id: CipherId,
    key: SessionKey,
}

impl CipherState {
    /// Creates the cipher state for a negotiated cipher.
    ///
    /// # Errors
    ///
    /// Returns [`SkiffError::Config`] if the identifier names a cipher this
    /// implementation cannot activate (`None`, IDEA, TSS, RC4). The fixed
    /// preference list in [`crate::ssh1::kex`] never selects those.
    pub fn new(id: CipherId, key: SessionKey) -> SkiffResult<Self> {
        match id {
            CipherId::Blowfish | CipherId::Des | CipherId::TripleDes => Ok(Self { id, key }),
            other => Err(SkiffError::Config(format!(
                "Cipher {} is not supported",
                other.name()
            ))),
        }
    }

    /// Returns the negotiated cipher identifier.
    pub fn id(&self) -> CipherId {
        self.id
    }

    /// Derives the outgoing-direction cipher instance.
    pub fn encryptor(&self) -> PacketEncryptor {
        let key = self.key.as_bytes();
        let iv = [0u8; CIPHER_BLOCK_SIZE];
        let inner = match self.id {
            CipherId::Blowfish => EncryptorInner::Blowfish(
                cbc::Encryptor::<Blowfish>::new_from_slices(key, &iv)
                    .expect("blowfish accepts 32-byte keys"),
            ),
            CipherId::Des => EncryptorInner::Des(
                cbc::Encryptor::<Des>::new_from_slices(&key[..8], &iv)
                    .expect("des accepts 8-byte keys"),
            ),
            CipherId::TripleDes => EncryptorInner::TripleDes(
                cbc::Encryptor::<TdesEde3>::new_from_slices(&key[..24], &iv)
                    .expect("3des accepts 24-byte keys"),
            ),
            // Unreachable: the constructor rejects everything else.
            other => unreachable!("cipher {} cannot be activated", other.name()),
        };
        PacketEncryptor {
            algorithm: self.id,
            inner,
        }
    }

    /// Derives the incoming-direction cipher instance.
    pub fn decryptor(&self) -> PacketDecryptor {
        let key = self.key.as_bytes();
        let iv = [0u8; CIPHER_BLOCK_SIZE];
        let inner = match self.id {
            CipherId::Blowfish => DecryptorInner::Blowfish(
                cbc::Decryptor::<Blowfish>::new_from_slices(key, &iv)
                    .expect("blowfish accepts 32-byte keys"),
            ),
            CipherId::Des => DecryptorInner::Des(
                cbc::Decryptor::<Des>::new_from_slices(&key[..8], &iv)
                    .expect("des accepts 8-byte keys"),
            ),
            CipherId::TripleDes => DecryptorInner::TripleDes(
                cbc::Decryptor::<TdesEde3>::new_from_slices(&key[..24], &iv)
                    .expect("3des accepts 24-byte keys"),
            ),
            other => unreachable!("cipher {} cannot be activated", other.name()),
        };
        PacketDecryptor {
            algorithm: self.id,
            inner,
        }
    }
}

impl std::fmt::Debug for CipherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherState")
            .field("id", &self.id)
            .field("key", &"<redacted>")
            .finish()
    }
}

enum EncryptorInner {
    Blowfish(cbc::Encryptor<Blowfish>),
    Des(cbc::Encryptor<Des>),
    TripleDes(cbc::Encryptor<TdesEde3>),
}

/// Stateful cipher instance for outgoing packets.
///
/// The CBC chaining state advances with every call, so packets must be
/// encrypted in the order they are sent.
pub struct PacketEncryptor {
    algorithm: CipherId,
    inner: EncryptorInner,
}

impl PacketEncryptor {
    /// Encrypts a buffer in place.
    ///
    /// # Errors
    ///
    /// Returns [`SkiffError::Protocol`] if the buffer is not a multiple of
    /// the 8-byte block size. Packet framing pads to that granularity, so
    /// this only fires on a caller bug.
    pub fn encrypt(&mut self, data: &mut [u8]) -> SkiffResult<()> {
        check_block_aligned(data.len())?;
        match &mut self.inner {
            EncryptorInner::Blowfish(enc) => {
                for block in data.chunks_exact_mut(CIPHER_BLOCK_SIZE) {
                    enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
                }
            }
            EncryptorInner::Des(enc) => {
                for block in data.chunks_exact_mut(CIPHER_BLOCK_SIZE) {
                    enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
                }
            }
            EncryptorInner::TripleDes(enc) => {
                for block in data.chunks_exact_mut(CIPHER_BLOCK_SIZE) {
                    enc.encrypt_block_mut(GenericArray::from_mut_slice(block));
                }
            }
        }
        Ok(())
    }

    /// Returns the cipher identifier.
    pub fn algorithm(&self) -> CipherId {
        self.algorithm
    }
}

impl std::fmt::Debug for PacketEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketEncryptor")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

enum DecryptorInner {
    Blowfish(cbc::Decryptor<Blowfish>),
    Des(cbc::Decryptor<Des>),
    TripleDes(cbc::Decryptor<TdesEde3>),
}

/// Stateful cipher instance for incoming packets.
pub struct PacketDecryptor {
    algorithm: CipherId,
    inner: DecryptorInner,
}

impl PacketDecryptor {
    /// Decrypts a buffer in place.
    ///
    /// # Errors
    ///
    /// Returns [`SkiffError::Protocol`] if the buffer is not a multiple of
    /// the 8-byte block size.
    pub fn decrypt(&mut self, data: &mut [u8]) -> SkiffResult<()> {
        check_block_aligned(data.len())?;
        match &mut self.inner {
            DecryptorInner::Blowfish(dec) => {
                for block in data.chunks_exact_mut(CIPHER_BLOCK_SIZE) {
                    dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
                }
            }
            DecryptorInner::Des(dec) => {
                for block in data.chunks_exact_mut(CIPHER_BLOCK_SIZE) {
                    dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
                }
            }
            DecryptorInner::TripleDes(dec) => {
                for block in data.chunks_exact_mut(CIPHER_BLOCK_SIZE) {
                    dec.decrypt_block_mut(GenericArray::from_mut_slice(block));
                }
            }
        }
        Ok(())
    }

    /// Returns the cipher identifier.
    pub fn algorithm(&self) -> CipherId {
        self.algorithm
    }
}

impl std::fmt::Debug for PacketDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketDecryptor")
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

fn check_block_aligned(len: usize) -> SkiffResult<()> {
    if len % CIPHER_BLOCK_SIZE != 0 {
        return Err(SkiffError::Protocol(format!(
            "Cipher input length {} is not a multiple of {}",
            len, CIPHER_BLOCK_SIZE
        )));
    }
    Ok(())
}
