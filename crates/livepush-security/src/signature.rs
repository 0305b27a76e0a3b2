use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::RsaPublicKey;
use serde_json::{Map, Value};
use tracing::debug;

use crate::VerificationError;

pub const CONTENT_HASH_CLAIM: &str = "contentHash";

const PEM_MARKERS: [&str; 4] = [
    "-----BEGIN PUBLIC KEY-----",
    "-----END PUBLIC KEY-----",
    "-----BEGIN RSA PUBLIC KEY-----",
    "-----END RSA PUBLIC KEY-----",
];

// Build tooling may substitute newlines with an XML entity or a literal escape.
const NEWLINE_SUBSTITUTES: [&str; 3] = ["&#xA;", "&#10;", "\\n"];

/// Verifies a signed release attestation and returns its `contentHash` claim.
pub fn verify_signed_content_hash(
    signed_attestation: &str,
    public_key_pem: &str,
) -> Result<String, VerificationError> {
    let public_key = parse_public_key_pem(public_key_pem)?;
    let claims = verify_token(signed_attestation.trim(), &public_key)?;

    let content_hash = claims
        .get(CONTENT_HASH_CLAIM)
        .and_then(Value::as_str)
        .filter(|hash| !hash.is_empty())
        .ok_or(VerificationError::MissingClaim(CONTENT_HASH_CLAIM))?;
    debug!(content_hash, "release attestation verified");
    Ok(content_hash.to_string())
}

/// Accepts SPKI or PKCS#1 RSA keys, with or without PEM armor.
pub fn parse_public_key_pem(public_key_pem: &str) -> Result<RsaPublicKey, VerificationError> {
    let mut body = public_key_pem.to_string();
    for marker in PEM_MARKERS.iter().chain(NEWLINE_SUBSTITUTES.iter()) {
        body = body.replace(marker, "");
    }
    let body: String = body.chars().filter(|ch| !ch.is_whitespace()).collect();
    if body.is_empty() {
        return Err(VerificationError::MalformedKey(
            "public key is empty".to_string(),
        ));
    }

    let der = STANDARD.decode(body.as_bytes()).map_err(|err| {
        VerificationError::MalformedKey(format!("public key is not valid base64: {err}"))
    })?;

    RsaPublicKey::from_public_key_der(&der)
        .or_else(|_| RsaPublicKey::from_pkcs1_der(&der))
        .map_err(|err| VerificationError::MalformedKey(format!("not an RSA public key: {err}")))
}

/// Checks an RS256/RS384/RS512 JWS and returns its claims. Time-based claims are
/// not enforced; attestations are long-lived.
fn verify_token(
    token: &str,
    public_key: &RsaPublicKey,
) -> Result<Map<String, Value>, VerificationError> {
    let key = DecodingKey::from_rsa_raw_components(
        &public_key.n().to_bytes_be(),
        &public_key.e().to_bytes_be(),
    );

    let mut validation = Validation::new(Algorithm::RS256);
    validation.algorithms = vec![Algorithm::RS256, Algorithm::RS384, Algorithm::RS512];
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_aud = false;

    decode::<Map<String, Value>>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|err| VerificationError::SignatureInvalid(err.to_string()))
}
