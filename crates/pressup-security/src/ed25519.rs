use anyhow::{anyhow, Context, Result};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

pub fn verify_ed25519_signature_hex(
    payload: &[u8],
    public_key_hex: &str,
    signature_hex: &str,
) -> Result<bool> {
    let public_key_bytes =
        hex::decode(public_key_hex.trim()).context("failed to decode Ed25519 public key hex")?;
    let signature_bytes =
        hex::decode(signature_hex.trim()).context("failed to decode Ed25519 signature hex")?;
    let public_key_len = public_key_bytes.len();
    let signature_len = signature_bytes.len();

    let public_key_array: [u8; 32] = public_key_bytes.try_into().map_err(|_| {
        anyhow!(
            "invalid Ed25519 public key length: expected 32 bytes, got {}",
            public_key_len
        )
    })?;
    let signature_array: [u8; 64] = signature_bytes.try_into().map_err(|_| {
        anyhow!(
            "invalid Ed25519 signature length: expected 64 bytes, got {}",
            signature_len
        )
    })?;

    let verifying_key =
        VerifyingKey::from_bytes(&public_key_array).context("invalid Ed25519 public key bytes")?;
    let signature = Signature::from_bytes(&signature_array);

    Ok(verifying_key.verify(payload, &signature).is_ok())
}

/// Checks a release package against every trusted key and every signature
/// line published for it. Returns the index of the key that verified.
///
/// Malformed keys or signatures are skipped rather than reported so a single
/// bad line in a `.sig` file cannot mask a valid one.
pub fn verify_package_signature(
    payload: &[u8],
    trusted_keys_hex: &[String],
    signatures_hex: &[String],
) -> Option<usize> {
    for (key_index, key) in trusted_keys_hex.iter().enumerate() {
        for signature in signatures_hex {
            if let Ok(true) = verify_ed25519_signature_hex(payload, key, signature) {
                return Some(key_index);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const PUBLIC_KEY_HEX: &str = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";
    const SIGNATURE_HEX: &str = concat!(
        "e5564300c360ac729086e2cc806e828a84877f1eb8e5d974d873e06522490155",
        "5fb8821590a33bacc61e39701cf9b46bd25bf5f0595bbe24655141438e7a100b"
    );

    #[test]
    fn verify_ed25519_accepts_valid_signature() {
        let verified = verify_ed25519_signature_hex(b"", PUBLIC_KEY_HEX, SIGNATURE_HEX)
            .expect("verification must complete");

        assert!(verified);
    }

    #[test]
    fn verify_ed25519_returns_false_for_tampered_payload() {
        let verified = verify_ed25519_signature_hex(b"tampered", PUBLIC_KEY_HEX, SIGNATURE_HEX)
            .expect("verification must complete");

        assert!(!verified);
    }

    #[test]
    fn verify_ed25519_errors_for_invalid_signature_hex_or_length() {
        assert!(verify_ed25519_signature_hex(b"", PUBLIC_KEY_HEX, "zz").is_err());
        assert!(verify_ed25519_signature_hex(b"", PUBLIC_KEY_HEX, "00").is_err());
    }

    #[test]
    fn verify_package_signature_skips_malformed_lines() {
        let keys = vec!["zz".to_string(), PUBLIC_KEY_HEX.to_string()];
        let signatures = vec!["00".to_string(), SIGNATURE_HEX.to_string()];

        assert_eq!(verify_package_signature(b"", &keys, &signatures), Some(1));
        assert_eq!(verify_package_signature(b"x", &keys, &signatures), None);
        assert_eq!(verify_package_signature(b"", &[], &signatures), None);
    }
}
