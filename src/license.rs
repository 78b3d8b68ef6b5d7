//! License verification
//!
//! A license is a JSON blob `{information, signature}` where the
//! signature is the base64 RSA-SHA1 of the serialised information block.
//! The verify key ships inside the binary; computation refuses to start
//! when the blob fails to parse, the signature mismatches or the license
//! has expired.

use crate::error::{EngineError, Result};
use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;
use chrono::NaiveDate;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::path::Path;

/// Verify key baked into the binary
const VERIFY_KEY_PEM: &str = include_str!("../data/verify.key");

/// The signed information block
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LicenseInformation {
    pub company_name: String,
    pub email: String,
    /// ISO date `YYYY-MM-DD`
    pub expiration_date: String,
    pub author: String,
}

/// A signed license blob
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub information: LicenseInformation,
    pub signature: String,
}

impl License {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::LicenseInvalid(format!("cannot read license: {e}")))?;
        serde_json::from_str(&raw)
            .map_err(|e| EngineError::LicenseInvalid(format!("cannot parse license: {e}")))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| EngineError::LicenseInvalid(e.to_string()))?;
        std::fs::write(path, raw).map_err(|e| EngineError::io(path.display().to_string(), e))
    }

    /// Days until expiry relative to `today` (negative when expired).
    pub fn days_remaining(&self, today: NaiveDate) -> Result<i64> {
        let expiry = NaiveDate::parse_from_str(&self.information.expiration_date, "%Y-%m-%d")
            .map_err(|_| {
                EngineError::LicenseInvalid(format!(
                    "unparseable expiration date '{}'",
                    self.information.expiration_date
                ))
            })?;
        Ok((expiry - today).num_days())
    }

    /// Check expiry and signature against the embedded verify key.
    pub fn validate(&self, today: NaiveDate) -> Result<()> {
        let verify_key = RsaPublicKey::from_pkcs1_pem(VERIFY_KEY_PEM)
            .map_err(|e| EngineError::LicenseInvalid(format!("bad verify key: {e}")))?;
        self.validate_with_key(&verify_key, today)
    }

    /// Check expiry and signature against an explicit key.
    pub fn validate_with_key(&self, verify_key: &RsaPublicKey, today: NaiveDate) -> Result<()> {
        if self.days_remaining(today)? < 0 {
            return Err(EngineError::LicenseInvalid(format!(
                "license expired on {}",
                self.information.expiration_date
            )));
        }

        let message = serde_json::to_vec(&self.information)
            .map_err(|e| EngineError::LicenseInvalid(e.to_string()))?;
        let signature = BASE64_STANDARD
            .decode(self.signature.as_bytes())
            .map_err(|e| EngineError::LicenseInvalid(format!("bad signature encoding: {e}")))?;

        verify_key
            .verify(
                Pkcs1v15Sign::new::<Sha1>(),
                &Sha1::digest(&message),
                &signature,
            )
            .map_err(|_| EngineError::LicenseInvalid("signature mismatch".into()))
    }

    /// Sign an information block with the private key.
    pub fn create(information: LicenseInformation, sign_key: &RsaPrivateKey) -> Result<Self> {
        let message = serde_json::to_vec(&information)
            .map_err(|e| EngineError::LicenseInvalid(e.to_string()))?;
        let signature = sign_key
            .sign(Pkcs1v15Sign::new::<Sha1>(), &Sha1::digest(&message))
            .map_err(|e| EngineError::LicenseInvalid(format!("signing failed: {e}")))?;
        Ok(Self {
            information,
            signature: BASE64_STANDARD.encode(signature),
        })
    }
}

/// Load a PEM private key (PKCS#1 or PKCS#8).
pub fn load_sign_key(path: &Path) -> Result<RsaPrivateKey> {
    let pem = std::fs::read_to_string(path)
        .map_err(|e| EngineError::io(path.display().to_string(), e))?;
    RsaPrivateKey::from_pkcs1_pem(&pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(&pem))
        .map_err(|e| EngineError::LicenseInvalid(format!("cannot parse sign key: {e}")))
}
