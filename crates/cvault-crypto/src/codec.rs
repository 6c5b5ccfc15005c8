//! AES-256-CBC with PKCS#7 padding
//!
//! Ciphertext layout is the raw CBC output with no IV prefix and no tag. The
//! IV travels with the key in the metadata record.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use cbc::{Decryptor, Encryptor};
use cvault_core::{VaultError, VaultResult};

use crate::{BLOCK_SIZE, IV_SIZE, KEY_SIZE};

type Aes256CbcEnc = Encryptor<Aes256>;
type Aes256CbcDec = Decryptor<Aes256>;

/// Encrypt `plaintext`. Output length is the next multiple of 16 strictly
/// greater than the input length.
pub fn encrypt(
    plaintext: &[u8],
    key: &[u8; KEY_SIZE],
    iv: &[u8; IV_SIZE],
) -> VaultResult<Vec<u8>> {
    let mut buf = vec![0u8; plaintext.len() + BLOCK_SIZE];
    buf[..plaintext.len()].copy_from_slice(plaintext);

    let ct_len = Aes256CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_mut::<Pkcs7>(&mut buf, plaintext.len())
        .map_err(|_| VaultError::Encryption("padding buffer too small".into()))?
        .len();

    buf.truncate(ct_len);
    Ok(buf)
}

/// Decrypt `ciphertext` produced by [`encrypt`].
///
/// Structurally invalid input and bad padding both yield `Decryption`, so a
/// wrong key or corrupted object is distinguishable from a missing one.
pub fn decrypt(
    ciphertext: &[u8],
    key: &[u8; KEY_SIZE],
    iv: &[u8; IV_SIZE],
) -> VaultResult<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(VaultError::Decryption(format!(
            "ciphertext length {} is not a positive multiple of {BLOCK_SIZE}",
            ciphertext.len()
        )));
    }

    let mut buf = ciphertext.to_vec();
    let pt_len = Aes256CbcDec::new(key.into(), iv.into())
        .decrypt_padded_mut::<Pkcs7>(&mut buf)
        .map_err(|_| {
            VaultError::Decryption("invalid padding: wrong key or corrupted data".into())
        })?
        .len();

    buf.truncate(pt_len);
    Ok(buf)
}
