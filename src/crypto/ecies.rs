use crate::traits::Curve;
use crate::traits::Point;
use crate::traits::ScalarField;

use aes_gcm::aead::Aead;
use aes_gcm::Aes256Gcm;
use aes_gcm::Key;
use aes_gcm::KeyInit;
use hkdf::Hkdf;
use sha2::Sha256;

// Elliptic Curve Integrated Encryption Scheme (ECIES) over the node key base h.
// ref: https://github.com/drand/kyber/blob/master/encrypt/ecies/ecies.go

const KEY_LEN: usize = 32;
const PAYLOAD_LEN: usize = 44; // key + nonce
const TAG_LEN: usize = 16;

/// To simplify error nesting structures, the [`EciesError`] has prefixes on variants `Decr` and `Encr`.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum EciesError {
    #[error("decrypt: invalid message lenght")]
    DecrInvalidMsgLenght,
    #[error("decrypt: hkdf: invalid number of blocks")]
    DecrHkdf,
    #[error("decrypt: failed to reconstruct the ephemeral point R")]
    DecrDeserializeR,
    #[error("decrypt: failed to serialize ikm")]
    DecrSerializeIKM,
    #[error("decrypt: aead error")]
    DecrAead,
    #[error("decrypt: failed to deserialize a field element from plain")]
    DecrScalarDeserialize,
    #[error("ecrypt: failed to serialize ikm")]
    EncrSerializeIKM,
    #[error("ecrypt: hkdf: invalid number of blocks")]
    EncrHkdf,
    #[error("ecrypt: failed to serialize scalar")]
    EncrScalarSerialize,
    #[error("ecrypt: aead error")]
    EncrAead,
    #[error("ecrypt: failed to serialize ephemeral point")]
    EncrPointSerialize,
}

/// Encrypts `msg` to `public`. The `info` string binds the ciphertext to its context.
/// Output: ephemeral point || aes-gcm(msg).
pub fn encrypt<C: Curve>(
    public: &C::Point,
    msg: &[u8],
    info: &[u8],
) -> Result<Vec<u8>, EciesError> {
    let eph_sk = C::Scalar::random();
    let eph_pk = C::sk_to_pk(&eph_sk);

    // Produce Diffie–Hellman key and nonce
    let ikm = (public.clone() * &eph_sk)
        .serialize()
        .map_err(|_| EciesError::EncrSerializeIKM)?;
    let mut okm = [0; PAYLOAD_LEN];

    Hkdf::<Sha256>::new(None, ikm.as_ref())
        .expand(info, &mut okm)
        .map_err(|_| EciesError::EncrHkdf)?;
    let (key, nonce) = okm.split_at(KEY_LEN);

    let aes = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut c = aes
        .encrypt(nonce.into(), msg)
        .map_err(|_| EciesError::EncrAead)?;

    let mut out: Vec<u8> = eph_pk
        .serialize()
        .map_err(|_| EciesError::EncrPointSerialize)?
        .into();
    out.append(&mut c);

    Ok(out)
}

pub fn decrypt<C: Curve>(
    private: &C::Scalar,
    encrypted: &[u8],
    info: &[u8],
) -> Result<Vec<u8>, EciesError> {
    if encrypted.len() < C::POINT_SIZE + TAG_LEN {
        return Err(EciesError::DecrInvalidMsgLenght);
    }

    let (r_bytes, msg_bytes) = encrypted.split_at(C::POINT_SIZE);
    let r = C::Point::deserialize(r_bytes).map_err(|_| EciesError::DecrDeserializeR)?;

    // Compute shared DH key and derive the symmetric key and nonce via HKDF
    let ikm = (r * private)
        .serialize()
        .map_err(|_| EciesError::DecrSerializeIKM)?;
    let mut okm = [0; PAYLOAD_LEN];

    Hkdf::<Sha256>::new(None, ikm.as_ref())
        .expand(info, okm.as_mut_slice())
        .map_err(|_| EciesError::DecrHkdf)?;
    let (key, nonce) = okm.split_at(KEY_LEN);

    let aes = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    aes.decrypt(nonce.into(), msg_bytes)
        .map_err(|_| EciesError::DecrAead)
}

pub fn encrypt_share<C: Curve>(
    public: &C::Point,
    share: &C::Scalar,
    info: &[u8],
) -> Result<Vec<u8>, EciesError> {
    let plain = share
        .to_bytes_be()
        .map_err(|_| EciesError::EncrScalarSerialize)?;

    encrypt::<C>(public, plain.as_ref(), info)
}

pub fn decrypt_share<C: Curve>(
    private: &C::Scalar,
    encrypted: &[u8],
    info: &[u8],
) -> Result<C::Scalar, EciesError> {
    let plain = decrypt::<C>(private, encrypted, info)?;

    C::Scalar::from_bytes_be(&plain).map_err(|_| EciesError::DecrScalarDeserialize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bls12381;
    use crate::Bn254;

    fn roundtrip<C: Curve>() {
        let private = C::Scalar::random();
        let public = C::sk_to_pk(&private);
        let share = C::Scalar::random();

        let cipher = encrypt_share::<C>(&public, &share, b"round").unwrap();
        assert_eq!(cipher.len(), C::POINT_SIZE + C::Scalar::SCALAR_SIZE + TAG_LEN);
        assert_eq!(decrypt_share::<C>(&private, &cipher, b"round").unwrap(), share);
    }

    #[test]
    fn share_encryption() {
        roundtrip::<Bls12381>();
        roundtrip::<Bn254>();
    }

    #[test]
    fn wrong_key_or_context_fails() {
        type S = <Bls12381 as Curve>::Scalar;
        let private = S::random();
        let public = Bls12381::sk_to_pk(&private);
        let cipher = encrypt_share::<Bls12381>(&public, &S::random(), b"round-1").unwrap();

        assert_eq!(
            decrypt_share::<Bls12381>(&S::random(), &cipher, b"round-1"),
            Err(EciesError::DecrAead)
        );
        assert_eq!(
            decrypt_share::<Bls12381>(&private, &cipher, b"round-2"),
            Err(EciesError::DecrAead)
        );
        assert_eq!(
            decrypt_share::<Bls12381>(&private, &cipher[..20], b"round-1"),
            Err(EciesError::DecrInvalidMsgLenght)
        );
    }
}
