// Base58check addresses and WIF keys

use crate::core::hash160;
use crate::params::Params;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("base58 decode failed: {0}")]
    Base58(#[from] bs58::decode::Error),
    #[error("payload has wrong length: {0}")]
    BadLength(usize),
    #[error("version byte {0:#04x} is not valid for this network")]
    WrongNetwork(u8),
    #[error("invalid secret key")]
    BadSecretKey,
}

/// base58check-encode `payload` under a one-byte version prefix.
/// The 4-byte double-SHA-256 checksum is appended by the encoder.
pub fn encode(version: u8, payload: &[u8]) -> String {
    bs58::encode(payload)
        .with_check_version(version)
        .into_string()
}

/// Decode a base58check string into (version, payload).
pub fn decode(s: &str) -> Result<(u8, Vec<u8>), AddressError> {
    let raw = bs58::decode(s).with_check(None).into_vec()?;
    if raw.is_empty() {
        return Err(AddressError::BadLength(0));
    }
    Ok((raw[0], raw[1..].to_vec()))
}

/// P2PKH address for a SEC-encoded public key
pub fn p2pkh_address(params: &Params, pubkey_sec: &[u8]) -> String {
    encode(params.address_version, &hash160(pubkey_sec))
}

/// Decode a P2PKH address into its 20-byte pubkey hash
pub fn decode_p2pkh_address(params: &Params, addr: &str) -> Result<[u8; 20], AddressError> {
    let (version, payload) = decode(addr)?;
    if version != params.address_version {
        return Err(AddressError::WrongNetwork(version));
    }
    if payload.len() != 20 {
        return Err(AddressError::BadLength(payload.len()));
    }
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload);
    Ok(hash)
}

/// Encode a secret scalar as WIF. Compressed keys carry a trailing 0x01.
pub fn encode_wif(params: &Params, secret: &[u8; 32], compressed: bool) -> String {
    let mut payload = Vec::with_capacity(33);
    payload.extend_from_slice(secret);
    if compressed {
        payload.push(0x01);
    }
    encode(params.wif_version, &payload)
}

/// Decode a WIF string into (secret scalar, compressed flag).
/// Both historical version bytes of the network are accepted.
pub fn decode_wif(params: &Params, wif: &str) -> Result<([u8; 32], bool), AddressError> {
    let (version, payload) = decode(wif)?;
    if version != params.wif_version && version != params.wif_version_alt {
        return Err(AddressError::WrongNetwork(version));
    }
    let compressed = match payload.len() {
        32 => false,
        33 if payload[32] == 0x01 => true,
        n => return Err(AddressError::BadLength(n)),
    };
    let mut secret = [0u8; 32];
    secret.copy_from_slice(&payload[..32]);
    Ok((secret, compressed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Params;

    #[test]
    fn test_base58check_roundtrip() {
        let params = Params::mainnet();
        let payload = [0x42u8; 20];
        let s = encode(params.address_version, &payload);
        let (version, decoded) = decode(&s).unwrap();
        assert_eq!(version, params.address_version);
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_corrupted_checksum_rejected() {
        let s = encode(50, &[0x42u8; 20]);
        let mut corrupted = s.into_bytes();
        let last = corrupted.len() - 1;
        corrupted[last] = if corrupted[last] == b'2' { b'3' } else { b'2' };
        let corrupted = String::from_utf8(corrupted).unwrap();
        assert!(decode(&corrupted).is_err());
    }

    #[test]
    fn test_wif_roundtrip() {
        let params = Params::mainnet();
        let secret = [0x11u8; 32];
        for compressed in [false, true] {
            let wif = encode_wif(&params, &secret, compressed);
            let (decoded, flag) = decode_wif(&params, &wif).unwrap();
            assert_eq!(decoded, secret);
            assert_eq!(flag, compressed);
        }
    }

    #[test]
    fn test_known_key_vector() {
        // Seeded vector from the reference wallet's key tests:
        // uncompressed key 3954e0.. maps to this WIF and address.
        let params = Params::mainnet();
        let secret: [u8; 32] =
            hex::decode("3954e0c9a3ce58a8dca793e214232e569ff0cb9da79689ca56d0af614227d540")
                .unwrap()
                .try_into()
                .unwrap();
        let wif = encode_wif(&params, &secret, false);
        assert_eq!(wif, "6ySkrpLpwm6gKsWo2aS6EL1SZxidZNdJkKqsKRNjXzv9WSrpHjR");

        let secp = secp256k1::Secp256k1::new();
        let sk = secp256k1::SecretKey::from_slice(&secret).unwrap();
        let pk = sk.public_key(&secp);
        let addr = p2pkh_address(&params, &pk.serialize_uncompressed());
        assert_eq!(addr, "MB3D45ngvaWRcACUmAFUf6fzcdXR8bVM6k");
    }
}
