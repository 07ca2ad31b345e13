mod checksum;
mod ed25519;

pub use checksum::{sha256_hex, verify_sha256};
pub use ed25519::{verify_ed25519_signature_hex, verify_package_signature};
