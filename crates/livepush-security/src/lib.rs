mod error;
mod hash;
mod signature;

pub use error::VerificationError;
pub use hash::{
    bundle_hash, bundle_manifest, sha256_file, sha256_hex, IGNORED_BUNDLE_ENTRIES,
    SIGNATURE_FILE_NAME,
};
pub use signature::{parse_public_key_pem, verify_signed_content_hash, CONTENT_HASH_CLAIM};
