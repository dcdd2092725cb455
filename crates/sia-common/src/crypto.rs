//! AES-CBC encryption/decryption of SIA-DCS content blocks.
//!
//! DC-09 keys the content block (everything between `[` and `]`) with
//! AES-128/192/256 in CBC mode, zero IV, blocks front-padded with `|`
//! or space bytes up to a 16-byte boundary. This mirrors the hand-rolled
//! per-block loop `ro2-common`'s crypto layer uses for its AES-ECB game
//! message cipher, generalized to CBC chaining and to all three AES key
//! sizes instead of a single fixed 128-bit key.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit, generic_array::GenericArray};
use aes::{Aes128, Aes192, Aes256};
use thiserror::Error;

pub const BLOCK_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("AES key must be 16, 24, or 32 bytes, got {0}")]
    BadKeyLength(usize),
    #[error("DECRYPT_FAIL: ciphertext length {0} is not a multiple of 16")]
    NotBlockAligned(usize),
    #[error("DECRYPT_FAIL: ciphertext is empty")]
    Empty,
}

/// An AES session key, sized at construction time. Immutable once an
/// [`crate::account::Account`] is built — keys never change for the
/// lifetime of the process.
#[derive(Clone)]
pub enum AesKey {
    Aes128([u8; 16]),
    Aes192([u8; 24]),
    Aes256([u8; 32]),
}

impl AesKey {
    /// Build a key from raw bytes, validating the length per the DC-09
    /// key-size rule (16/24/32 bytes only).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        match bytes.len() {
            16 => Ok(Self::Aes128(bytes.try_into().unwrap())),
            24 => Ok(Self::Aes192(bytes.try_into().unwrap())),
            32 => Ok(Self::Aes256(bytes.try_into().unwrap())),
            n => Err(CryptoError::BadKeyLength(n)),
        }
    }
}

fn xor_block(block: &mut [u8; BLOCK_LEN], prev: &[u8; BLOCK_LEN]) {
    for i in 0..BLOCK_LEN {
        block[i] ^= prev[i];
    }
}

/// Encrypt `plaintext` (already padded to a 16-byte multiple by the
/// caller) with AES-CBC and an all-zero IV, as DC-09 requires.
pub fn encrypt_cbc_zero_iv(key: &AesKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if plaintext.is_empty() {
        return Err(CryptoError::Empty);
    }
    if !plaintext.len().is_multiple_of(BLOCK_LEN) {
        return Err(CryptoError::NotBlockAligned(plaintext.len()));
    }

    let mut prev = [0u8; BLOCK_LEN]; // zero IV
    let mut out = Vec::with_capacity(plaintext.len());

    macro_rules! run {
        ($cipher:expr) => {{
            for chunk in plaintext.chunks(BLOCK_LEN) {
                let mut block: [u8; BLOCK_LEN] = chunk.try_into().unwrap();
                xor_block(&mut block, &prev);
                let mut ga = GenericArray::clone_from_slice(&block);
                $cipher.encrypt_block(&mut ga);
                block.copy_from_slice(&ga);
                out.extend_from_slice(&block);
                prev = block;
            }
        }};
    }

    match key {
        AesKey::Aes128(k) => run!(Aes128::new(GenericArray::from_slice(k))),
        AesKey::Aes192(k) => run!(Aes192::new(GenericArray::from_slice(k))),
        AesKey::Aes256(k) => run!(Aes256::new(GenericArray::from_slice(k))),
    }

    Ok(out)
}

/// Decrypt a DC-09 content block with AES-CBC and an all-zero IV.
pub fn decrypt_cbc_zero_iv(key: &AesKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() {
        return Err(CryptoError::Empty);
    }
    if !ciphertext.len().is_multiple_of(BLOCK_LEN) {
        return Err(CryptoError::NotBlockAligned(ciphertext.len()));
    }

    let mut prev = [0u8; BLOCK_LEN]; // zero IV
    let mut out = Vec::with_capacity(ciphertext.len());

    macro_rules! run {
        ($cipher:expr) => {{
            for chunk in ciphertext.chunks(BLOCK_LEN) {
                let cipher_block: [u8; BLOCK_LEN] = chunk.try_into().unwrap();
                let mut ga = GenericArray::clone_from_slice(&cipher_block);
                $cipher.decrypt_block(&mut ga);
                let mut plain = [0u8; BLOCK_LEN];
                plain.copy_from_slice(&ga);
                xor_block(&mut plain, &prev);
                out.extend_from_slice(&plain);
                prev = cipher_block;
            }
        }};
    }

    match key {
        AesKey::Aes128(k) => run!(Aes128::new(GenericArray::from_slice(k))),
        AesKey::Aes192(k) => run!(Aes192::new(GenericArray::from_slice(k))),
        AesKey::Aes256(k) => run!(Aes256::new(GenericArray::from_slice(k))),
    }

    Ok(out)
}

/// Strip the leading pad bytes (`|` or space) a decrypted content
/// block is front-padded with, stopping at the first byte that looks
/// like real content (`#` — the account marker — or a bare `|`).
pub fn strip_leading_pad(data: &[u8]) -> &[u8] {
    let mut i = 0;
    while i < data.len() && (data[i] == b'|' || data[i] == b' ' || data[i] == 0) {
        i += 1;
    }
    &data[i..]
}

/// Front-pad `content` with `|` bytes up to the next 16-byte boundary,
/// the encode-side counterpart of [`strip_leading_pad`]. Empty content
/// (the ACK bracket on a keyed account) still yields one full pad
/// block — there must always be at least 16 bytes to encrypt.
pub fn pad_front_to_block(content: &[u8]) -> Vec<u8> {
    if content.is_empty() {
        return vec![b'|'; BLOCK_LEN];
    }
    let remainder = content.len() % BLOCK_LEN;
    let pad_len = if remainder == 0 { 0 } else { BLOCK_LEN - remainder };
    let mut out = vec![b'|'; pad_len];
    out.extend_from_slice(content);
    out
}
