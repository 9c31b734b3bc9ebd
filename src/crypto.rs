use sodiumoxide::crypto::aead::chacha20poly1305_ietf as aead;
use sodiumoxide::crypto::pwhash::argon2id13;
use sodiumoxide::randombytes::randombytes_into;
use zeroize::Zeroizing;

use crate::error::CipherError;

pub const SALT_LEN: usize = argon2id13::SALTBYTES;
pub const NONCE_LEN: usize = aead::NONCEBYTES;
/// Smallest byte length a well-formed blob can have.
pub const HEADER_LEN: usize = SALT_LEN + NONCE_LEN;

/// Initializes libsodium. Safe to call repeatedly.
pub fn init() -> Result<(), CipherError> {
    sodiumoxide::init().map_err(|()| CipherError::Unavailable)
}

/// Symmetric key derived from the master password.
///
/// The inner `aead::Key` wipes itself on drop.
pub struct MasterKey {
    key: aead::Key,
}

impl MasterKey {
    pub fn from_password(password: &[u8], salt: &argon2id13::Salt) -> Result<Self, CipherError> {
        init()?;
        let mut key = aead::Key([0; aead::KEYBYTES]);

        argon2id13::derive_key(
            &mut key.0,
            password,
            salt,
            argon2id13::OPSLIMIT_INTERACTIVE,
            argon2id13::MEMLIMIT_INTERACTIVE,
        )
        .map_err(|()| CipherError::Unavailable)?;

        Ok(Self { key })
    }

    pub fn seal(&self, plaintext: &[u8]) -> (aead::Nonce, Vec<u8>) {
        // The IETF variant has no nonce generator of its own.
        let mut nonce = aead::Nonce([0; NONCE_LEN]);
        randombytes_into(&mut nonce.0);
        let ciphertext = aead::seal(plaintext, None, &nonce, &self.key);
        (nonce, ciphertext)
    }

    pub fn open(
        &self,
        ciphertext: &[u8],
        nonce: &aead::Nonce,
    ) -> Result<Zeroizing<Vec<u8>>, CipherError> {
        aead::open(ciphertext, None, nonce, &self.key)
            .map(Zeroizing::new)
            .map_err(|()| CipherError::AuthenticationFailure)
    }
}

/// On-disk layout: `salt(16) || nonce(12) || ciphertext`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedBlob {
    pub salt: argon2id13::Salt,
    pub nonce: aead::Nonce,
    pub ciphertext: Vec<u8>,
}

impl EncryptedBlob {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        if bytes.len() < HEADER_LEN {
            return Err(CipherError::MalformedInput);
        }
        let (salt, rest) = bytes.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        Ok(Self {
            salt: argon2id13::Salt::from_slice(salt).ok_or(CipherError::MalformedInput)?,
            nonce: aead::Nonce::from_slice(nonce).ok_or(CipherError::MalformedInput)?,
            ciphertext: ciphertext.to_vec(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.ciphertext.len());
        out.extend_from_slice(&self.salt.0);
        out.extend_from_slice(&self.nonce.0);
        out.extend_from_slice(&self.ciphertext);
        out
    }
}

/// Encrypts `plaintext` under a key derived from `password` with a fresh salt and nonce.
pub fn encrypt(password: &[u8], plaintext: &[u8]) -> Result<EncryptedBlob, CipherError> {
    init()?;
    let salt = argon2id13::gen_salt();
    let key = MasterKey::from_password(password, &salt)?;
    let (nonce, ciphertext) = key.seal(plaintext);

    Ok(EncryptedBlob {
        salt,
        nonce,
        ciphertext,
    })
}

pub fn decrypt(password: &[u8], blob: &EncryptedBlob) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    let key = MasterKey::from_password(password, &blob.salt)?;
    key.open(&blob.ciphertext, &blob.nonce)
}

/// Parses and decrypts a raw blob in one step.
pub fn decrypt_bytes(password: &[u8], bytes: &[u8]) -> Result<Zeroizing<Vec<u8>>, CipherError> {
    let blob = EncryptedBlob::from_bytes(bytes)?;
    decrypt(password, &blob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn round_trip() {
        let blob = encrypt(b"masterpw", b"hello vault").unwrap();
        let plain = decrypt(b"masterpw", &blob).unwrap();
        assert_eq!(plain.as_slice(), b"hello vault");
    }

    #[test]
    fn salt_and_nonce_are_fresh_per_call() {
        let a = encrypt(b"same", b"same").unwrap();
        let b = encrypt(b"same", b"same").unwrap();
        assert_ne!(a.salt, b.salt);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn seal_uses_a_twelve_byte_random_nonce() {
        assert_eq!(NONCE_LEN, 12);
        let key = MasterKey::from_password(b"pw", &argon2id13::gen_salt()).unwrap();
        let (first, sealed) = key.seal(b"data");
        let (second, _) = key.seal(b"data");
        assert_ne!(first, second);
        assert_eq!(key.open(&sealed, &first).unwrap().as_slice(), b"data");
    }

    #[test]
    fn wrong_password_fails_authentication() {
        let blob = encrypt(b"right", b"secret").unwrap();
        let err = decrypt(b"wrong", &blob).unwrap_err();
        assert!(matches!(err, CipherError::AuthenticationFailure));
    }

    #[test]
    fn short_blob_is_malformed() {
        let err = decrypt_bytes(b"pw", &[0u8; HEADER_LEN - 1]).unwrap_err();
        assert!(matches!(err, CipherError::MalformedInput));
    }

    #[test]
    fn header_only_blob_fails_authentication() {
        let err = decrypt_bytes(b"pw", &[0u8; HEADER_LEN]).unwrap_err();
        assert!(matches!(err, CipherError::AuthenticationFailure));
    }

    #[test]
    fn blob_bytes_layout() {
        let blob = encrypt(b"pw", b"abc").unwrap();
        let bytes = blob.to_bytes();
        assert_eq!(&bytes[..SALT_LEN], &blob.salt.0[..]);
        assert_eq!(&bytes[SALT_LEN..HEADER_LEN], &blob.nonce.0[..]);
        assert_eq!(&bytes[HEADER_LEN..], blob.ciphertext.as_slice());
        assert_eq!(EncryptedBlob::from_bytes(&bytes).unwrap(), blob);
    }

    #[test]
    fn any_flipped_byte_is_rejected() {
        let bytes = encrypt(b"pw", b"{\"entries\":{}}").unwrap().to_bytes();
        for i in 0..bytes.len() {
            let mut tampered = bytes.clone();
            tampered[i] ^= 0x01;
            let err = decrypt_bytes(b"pw", &tampered).unwrap_err();
            assert!(
                matches!(err, CipherError::AuthenticationFailure),
                "byte {} accepted",
                i
            );
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn prop_round_trip(password in ".{0,24}", plaintext in proptest::collection::vec(any::<u8>(), 0..256)) {
            let blob = encrypt(password.as_bytes(), &plaintext).unwrap();
            let plain = decrypt(password.as_bytes(), &blob).unwrap();
            prop_assert_eq!(plain.as_slice(), plaintext.as_slice());
        }

        #[test]
        fn prop_other_password_rejected(a in "[a-z]{1,12}", b in "[A-Z]{1,12}") {
            let blob = encrypt(a.as_bytes(), b"payload").unwrap();
            prop_assert!(matches!(decrypt(b.as_bytes(), &blob), Err(CipherError::AuthenticationFailure)));
        }
    }
}
