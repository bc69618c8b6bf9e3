use base64::{engine::general_purpose, Engine as _};
use p521::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{AppError, Result};

/// The JWK curve identifier for NIST P-521.
pub const CURVE_ID: &str = "P-521";
/// The JWK key type for elliptic-curve keys.
pub const KEY_TYPE: &str = "EC";
/// The size of one P-521 coordinate (and of the private scalar) in bytes.
pub const COORDINATE_SIZE: usize = 66;

/// A P-521 public key that has passed curve validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey(p521::PublicKey);

impl PublicKey {
    pub(crate) fn inner(&self) -> &p521::PublicKey {
        &self.0
    }
}

/// A P-521 private key. Never serialized outside of the UEK wrap path.
#[derive(Clone)]
pub struct PrivateKey(p521::SecretKey);

impl PrivateKey {
    pub(crate) fn inner(&self) -> &p521::SecretKey {
        &self.0
    }

    /// Returns the matching public key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.public_key())
    }

    /// Big-endian scalar bytes, for wrapping only.
    pub(crate) fn to_scalar_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.0.to_bytes().to_vec())
    }

    /// Rebuilds a private key from big-endian scalar bytes.
    pub(crate) fn from_scalar_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != COORDINATE_SIZE {
            return Err(AppError::MalformedKeyMaterial(format!(
                "private scalar must be {} bytes, got {}",
                COORDINATE_SIZE,
                bytes.len()
            )));
        }
        p521::SecretKey::from_slice(bytes)
            .map(PrivateKey)
            .map_err(|_| AppError::MalformedKeyMaterial("invalid private scalar".to_string()))
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;
        self.to_scalar_bytes().ct_eq(&other.to_scalar_bytes()).into()
    }
}

/// A key-agreement capable P-521 key pair.
#[derive(Clone, Debug)]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

/// The portable public-key format (JWK subset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicJwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub y: String,
    #[serde(default = "default_ext")]
    pub ext: bool,
    #[serde(default)]
    pub key_ops: Vec<String>,
}

fn default_ext() -> bool {
    true
}

/// Generates a fresh P-521 key pair.
pub fn generate_key_pair() -> KeyPair {
    let secret = p521::SecretKey::random(&mut OsRng);
    let public_key = PublicKey(secret.public_key());
    tracing::debug!("Generated P-521 key pair");
    KeyPair {
        public_key,
        private_key: PrivateKey(secret),
    }
}

/// Exports a public key to its JWK form.
pub fn export_public_key(key: &PublicKey) -> PublicJwk {
    let point = key.0.to_encoded_point(false);
    // Uncompressed encoding of a non-identity point always has both coordinates
    let x = point.x().map(|x| x.as_slice()).unwrap_or_default();
    let y = point.y().map(|y| y.as_slice()).unwrap_or_default();

    PublicJwk {
        kty: KEY_TYPE.to_string(),
        crv: CURVE_ID.to_string(),
        x: general_purpose::URL_SAFE_NO_PAD.encode(x),
        y: general_purpose::URL_SAFE_NO_PAD.encode(y),
        ext: true,
        key_ops: Vec::new(),
    }
}

fn decode_coordinate(name: &str, value: &str) -> Result<Vec<u8>> {
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('=').as_bytes())
        .map_err(|_| AppError::MalformedKeyMaterial(format!("{} is not base64url", name)))?;

    if bytes.len() != COORDINATE_SIZE {
        return Err(AppError::MalformedKeyMaterial(format!(
            "{} must be {} bytes, got {}",
            name,
            COORDINATE_SIZE,
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Imports a public key from its JWK form.
///
/// Rejects any key type other than `EC`, any curve other than P-521,
/// coordinates of the wrong length, and points that are not on the curve.
pub fn import_public_key(jwk: &PublicJwk) -> Result<PublicKey> {
    if jwk.kty != KEY_TYPE {
        return Err(AppError::MalformedKeyMaterial(format!(
            "unsupported key type {:?}",
            jwk.kty
        )));
    }
    if jwk.crv != CURVE_ID {
        return Err(AppError::MalformedKeyMaterial(format!(
            "unsupported curve {:?}",
            jwk.crv
        )));
    }

    let x = decode_coordinate("x", &jwk.x)?;
    let y = decode_coordinate("y", &jwk.y)?;

    let mut sec1 = Vec::with_capacity(1 + 2 * COORDINATE_SIZE);
    sec1.push(0x04);
    sec1.extend_from_slice(&x);
    sec1.extend_from_slice(&y);

    p521::PublicKey::from_sec1_bytes(&sec1)
        .map(PublicKey)
        .map_err(|_| AppError::MalformedKeyMaterial("point is not on P-521".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_import_preserves_key() {
        let pair = generate_key_pair();
        let jwk = export_public_key(&pair.public_key);

        assert_eq!(jwk.kty, "EC");
        assert_eq!(jwk.crv, "P-521");
        assert!(jwk.ext);

        let imported = import_public_key(&jwk).unwrap();
        assert_eq!(imported, pair.public_key);
    }

    #[test]
    fn test_private_key_derives_public_key() {
        let pair = generate_key_pair();
        assert_eq!(pair.private_key.public_key(), pair.public_key);
    }

    #[test]
    fn test_wrong_curve_rejected() {
        let mut jwk = export_public_key(&generate_key_pair().public_key);
        jwk.crv = "P-256".to_string();
        assert!(matches!(
            import_public_key(&jwk),
            Err(AppError::MalformedKeyMaterial(_))
        ));
    }

    #[test]
    fn test_wrong_key_type_rejected() {
        let mut jwk = export_public_key(&generate_key_pair().public_key);
        jwk.kty = "OKP".to_string();
        assert!(import_public_key(&jwk).is_err());
    }

    #[test]
    fn test_short_coordinate_rejected() {
        let mut jwk = export_public_key(&generate_key_pair().public_key);
        jwk.x = general_purpose::URL_SAFE_NO_PAD.encode([1u8; 32]);
        assert!(matches!(
            import_public_key(&jwk),
            Err(AppError::MalformedKeyMaterial(_))
        ));
    }

    #[test]
    fn test_point_off_curve_rejected() {
        let mut jwk = export_public_key(&generate_key_pair().public_key);
        let mut y = general_purpose::URL_SAFE_NO_PAD.decode(&jwk.y).unwrap();
        y[COORDINATE_SIZE - 1] ^= 0x01;
        jwk.y = general_purpose::URL_SAFE_NO_PAD.encode(&y);
        assert!(matches!(
            import_public_key(&jwk),
            Err(AppError::MalformedKeyMaterial(_))
        ));
    }

    #[test]
    fn test_garbage_coordinate_rejected() {
        let mut jwk = export_public_key(&generate_key_pair().public_key);
        jwk.x = "not base64!!".to_string();
        assert!(import_public_key(&jwk).is_err());
    }

    #[test]
    fn test_jwk_json_shape() {
        let jwk = export_public_key(&generate_key_pair().public_key);
        let json = sonic_rs::to_string(&jwk).unwrap();
        let parsed: PublicJwk = sonic_rs::from_str(&json).unwrap();
        assert_eq!(parsed, jwk);
        assert!(json.contains("\"crv\":\"P-521\""));
    }
}
