// Payload ciphers for broker messages.
//
// Both versions key AES-128 with bytes 8..24 of the broker password.
// v1.0: base64(AES-128-ECB, PKCS#7).
// v2.0: base64([iv_len: u32 BE][iv][ciphertext][tag: 16]), AES-128-GCM,
//       AAD = message timestamp as a 6-byte big-endian integer. The IV is
//       12 bytes in practice; 16-byte IVs are accepted as well.

use aes::Aes128;
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, KeyInit};
use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes128Gcm, AesGcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;

use super::ProtocolVersion;
use crate::error::Error;

type Aes128EcbDec = ecb::Decryptor<Aes128>;
type Aes128GcmLongIv = AesGcm<Aes128, U16>;

const KEY_LEN: usize = 16;
const GCM_IV_LEN: usize = 12;
const GCM_LONG_IV_LEN: usize = 16;
const GCM_TAG_LEN: usize = 16;
const IV_LEN_PREFIX: usize = 4;
const MAX_AAD_TIMESTAMP: u64 = 1 << 48;

/// Derive the 16-byte AES key from a broker password.
pub fn derive_key(password: &str) -> Result<[u8; KEY_LEN], Error> {
    let slice = password
        .get(8..24)
        .ok_or_else(|| Error::Decode("broker password too short for key derivation".into()))?;
    slice
        .as_bytes()
        .try_into()
        .map_err(|_| Error::Decode("derived key is not 16 bytes".into()))
}

/// Decrypt a v1.0 payload to plaintext bytes.
pub fn decrypt_v1(data: &str, password: &str) -> Result<Vec<u8>, Error> {
    let key = derive_key(password)?;
    let ciphertext = BASE64
        .decode(data.trim())
        .map_err(|e| Error::Decode(format!("invalid base64: {e}")))?;

    Aes128EcbDec::new_from_slice(&key)
        .map_err(|e| Error::Decode(e.to_string()))?
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|e| Error::Decode(format!("ECB decrypt failed: {e}")))
}

/// Decrypt a v2.0 payload to plaintext bytes, authenticating `t`.
pub fn decrypt_v2(data: &str, password: &str, t: u64) -> Result<Vec<u8>, Error> {
    let key = derive_key(password)?;
    let raw = BASE64
        .decode(data.trim())
        .map_err(|e| Error::Decode(format!("invalid base64: {e}")))?;

    let (len_prefix, rest) = raw
        .split_first_chunk::<IV_LEN_PREFIX>()
        .ok_or_else(|| Error::Decode("payload shorter than IV length prefix".into()))?;
    let iv_len = usize::try_from(u32::from_be_bytes(*len_prefix))
        .map_err(|_| Error::Decode("IV length overflow".into()))?;
    if iv_len != GCM_IV_LEN && iv_len != GCM_LONG_IV_LEN {
        return Err(Error::Decode(format!(
            "unsupported IV length {iv_len} (expected {GCM_IV_LEN} or {GCM_LONG_IV_LEN})"
        )));
    }
    if rest.len() < iv_len + GCM_TAG_LEN {
        return Err(Error::Decode("payload truncated".into()));
    }
    let (iv, sealed) = rest.split_at(iv_len);

    if t >= MAX_AAD_TIMESTAMP {
        return Err(Error::Decode(format!("timestamp {t} does not fit 48 bits")));
    }
    let t_bytes = t.to_be_bytes();
    let aad = t_bytes.get(2..).unwrap_or_default();

    let payload = Payload { msg: sealed, aad };
    let opened = if iv_len == GCM_IV_LEN {
        Aes128Gcm::new_from_slice(&key)
            .map_err(|e| Error::Decode(e.to_string()))?
            .decrypt(Nonce::from_slice(iv), payload)
    } else {
        Aes128GcmLongIv::new_from_slice(&key)
            .map_err(|e| Error::Decode(e.to_string()))?
            .decrypt(Nonce::<U16>::from_slice(iv), payload)
    };
    opened.map_err(|_| Error::Decode("GCM authentication failed".into()))
}

/// Decrypt `data` with the given version and parse the plaintext as JSON.
pub fn decode(
    version: ProtocolVersion,
    data: &str,
    password: &str,
    t: u64,
) -> Result<Value, Error> {
    let plain = match version {
        ProtocolVersion::V1 => decrypt_v1(data, password)?,
        ProtocolVersion::V2 => decrypt_v2(data, password, t)?,
    };
    serde_json::from_slice(&plain).map_err(|e| Error::Decode(format!("payload is not JSON: {e}")))
}


#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::seal::{encrypt_v1, encrypt_v2};
    use super::*;
    use serde_json::json;

    const PASSWORD: &str = "abcdefgh0123456789ABCDEFtail";

    #[test]
    fn key_is_password_bytes_8_to_24() {
        assert_eq!(&derive_key(PASSWORD).unwrap(), b"0123456789ABCDEF");
        assert!(derive_key("short").is_err());
    }

    #[test]
    fn v1_decodes_to_json() {
        let payload = json!({ "devId": "d1", "status": [{ "code": "switch_1", "value": true }] });
        let data = encrypt_v1(payload.to_string().as_bytes(), PASSWORD);

        let decoded = decode(ProtocolVersion::V1, &data, PASSWORD, 0).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn v2_decodes_to_json() {
        let payload = json!({ "bizCode": "delete", "devId": "d1" });
        let t = 1_700_000_000;
        let data = encrypt_v2(payload.to_string().as_bytes(), PASSWORD, t, &[7; 12]);

        let decoded = decode(ProtocolVersion::V2, &data, PASSWORD, t).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn v2_tampered_tag_is_rejected() {
        let t = 42;
        let data = encrypt_v2(b"{}", PASSWORD, t, &[1; 12]);
        let mut raw = BASE64.decode(&data).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = BASE64.encode(raw);

        let err = decrypt_v2(&tampered, PASSWORD, t).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn v2_wrong_timestamp_is_rejected() {
        let data = encrypt_v2(b"{}", PASSWORD, 100, &[1; 12]);
        assert!(decrypt_v2(&data, PASSWORD, 101).is_err());
    }

    #[test]
    fn v2_accepts_16_byte_iv() {
        let payload = json!({ "bizCode": "bindUser", "bizData": { "devId": "d9" } });
        let t = 1_700_000_123;
        let data = encrypt_v2(payload.to_string().as_bytes(), PASSWORD, t, &[3; 16]);

        let decoded = decode(ProtocolVersion::V2, &data, PASSWORD, t).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn v2_rejects_odd_iv_length() {
        let mut raw = 8u32.to_be_bytes().to_vec();
        raw.extend_from_slice(&[0; 40]);
        let err = decrypt_v2(&BASE64.encode(raw), PASSWORD, 1).unwrap_err();
        assert!(err.to_string().contains("IV length"));
    }

    #[test]
    fn v1_wrong_key_fails() {
        let data = encrypt_v1(b"{\"a\":1}", PASSWORD);
        let other = "abcdefghZZZZZZZZZZZZZZZZtail";
        assert!(decode(ProtocolVersion::V1, &data, other, 0).is_err());
    }
}
