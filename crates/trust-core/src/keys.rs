//! RSA key material, tagged with the trust domain it belongs to.
//!
//! Two independent trust domains exist:
//!
//! | Domain | Minted by | Verified by |
//! |--------|-----------|-------------|
//! | [`User`] | authorization service (login) | gateway |
//! | [`Robot`] | gateway (every forwarded request) | every internal service |
//!
//! The domain is a type parameter, so a robot token can never be checked
//! against the user public key (or the reverse): the validators only accept
//! the matching `VerifyingKey<D>`.

use std::fmt;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod sealed {
    pub trait Sealed {}
}

/// A signing trust domain. Implemented only by [`User`] and [`Robot`].
pub trait TrustDomain: sealed::Sealed + Send + Sync + 'static {
    /// Short name used in logs and error messages.
    const NAME: &'static str;
}

/// The user trust domain: long-lived tokens proving a human authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum User {}

/// The robot trust domain: 60-second tokens proving a request transited the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Robot {}

impl sealed::Sealed for User {}
impl sealed::Sealed for Robot {}

impl TrustDomain for User {
    const NAME: &'static str = "user";
}

impl TrustDomain for Robot {
    const NAME: &'static str = "robot";
}

/// Errors raised while loading key material.
#[derive(Debug, Error)]
pub enum KeyError {
    /// A key file could not be read.
    #[error("failed to read {domain} key file {path}: {source}")]
    Read {
        /// Trust domain the key belongs to.
        domain: &'static str,
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The PEM text is not a usable RSA key.
    #[error("invalid {domain} {half} key: {reason}")]
    InvalidPem {
        /// Trust domain the key belongs to.
        domain: &'static str,
        /// `"private"` or `"public"`.
        half: &'static str,
        /// Parser message.
        reason: String,
    },

    /// The private and public halves do not belong to the same key pair.
    #[error("{domain} private key does not match its public key")]
    Mismatch {
        /// Trust domain the key pair belongs to.
        domain: &'static str,
    },
}

/// Public half of a trust domain's key pair.
///
/// Internal services hold only `VerifyingKey<Robot>`; the gateway additionally
/// holds `VerifyingKey<User>`.
pub struct VerifyingKey<D: TrustDomain> {
    decoding: Arc<DecodingKey>,
    _domain: PhantomData<fn() -> D>,
}

impl<D: TrustDomain> VerifyingKey<D> {
    /// Parse a PEM-encoded RSA public key (PKCS#1 or SPKI).
    pub fn from_pem(pem: &[u8]) -> Result<Self, KeyError> {
        let decoding = DecodingKey::from_rsa_pem(pem).map_err(|e| KeyError::InvalidPem {
            domain: D::NAME,
            half: "public",
            reason: e.to_string(),
        })?;
        Ok(Self {
            decoding: Arc::new(decoding),
            _domain: PhantomData,
        })
    }

    /// Read and parse a PEM-encoded RSA public key file.
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, KeyError> {
        let pem = read_key_file::<D>(path.as_ref())?;
        Self::from_pem(&pem)
    }

    pub(crate) fn decoding_key(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl<D: TrustDomain> Clone for VerifyingKey<D> {
    fn clone(&self) -> Self {
        Self {
            decoding: Arc::clone(&self.decoding),
            _domain: PhantomData,
        }
    }
}

impl<D: TrustDomain> fmt::Debug for VerifyingKey<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifyingKey")
            .field("domain", &D::NAME)
            .finish_non_exhaustive()
    }
}

/// Both halves of a trust domain's key pair. Never transmitted.
pub struct SigningKeys<D: TrustDomain> {
    encoding: Arc<EncodingKey>,
    verifying: VerifyingKey<D>,
}

impl<D: TrustDomain> SigningKeys<D> {
    /// Parse a PEM private key (PKCS#1 or PKCS#8) and its PEM public key.
    ///
    /// The pair is checked by signing and verifying a probe token, so a
    /// private key paired with the wrong public key fails here rather than on
    /// the first request.
    pub fn from_pem(private_pem: &[u8], public_pem: &[u8]) -> Result<Self, KeyError> {
        let encoding = EncodingKey::from_rsa_pem(private_pem).map_err(|e| KeyError::InvalidPem {
            domain: D::NAME,
            half: "private",
            reason: e.to_string(),
        })?;
        let verifying = VerifyingKey::from_pem(public_pem)?;

        let keys = Self {
            encoding: Arc::new(encoding),
            verifying,
        };
        keys.check_pair()?;
        Ok(keys)
    }

    /// Read both halves from PEM files.
    pub fn from_pem_files(
        private_path: impl AsRef<Path>,
        public_path: impl AsRef<Path>,
    ) -> Result<Self, KeyError> {
        let private_pem = read_key_file::<D>(private_path.as_ref())?;
        let public_pem = read_key_file::<D>(public_path.as_ref())?;
        Self::from_pem(&private_pem, &public_pem)
    }

    /// The public half, for verifying tokens this process minted itself.
    pub fn verifying_key(&self) -> &VerifyingKey<D> {
        &self.verifying
    }

    pub(crate) fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    fn check_pair(&self) -> Result<(), KeyError> {
        #[derive(Serialize, Deserialize)]
        struct Probe {
            probe: String,
        }

        let probe = Probe {
            probe: D::NAME.to_string(),
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::RS256), &probe, &self.encoding)
            .map_err(|e| KeyError::InvalidPem {
                domain: D::NAME,
                half: "private",
                reason: e.to_string(),
            })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;

        jsonwebtoken::decode::<Probe>(&token, self.verifying.decoding_key(), &validation)
            .map(|_| ())
            .map_err(|_| KeyError::Mismatch { domain: D::NAME })
    }
}

impl<D: TrustDomain> Clone for SigningKeys<D> {
    fn clone(&self) -> Self {
        Self {
            encoding: Arc::clone(&self.encoding),
            verifying: self.verifying.clone(),
        }
    }
}

impl<D: TrustDomain> fmt::Debug for SigningKeys<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeys")
            .field("domain", &D::NAME)
            .finish_non_exhaustive()
    }
}

/// User-domain key pair (held by the authorization service).
pub type UserSigningKeys = SigningKeys<User>;
/// Robot-domain key pair (held by the gateway).
pub type RobotSigningKeys = SigningKeys<Robot>;
/// User-domain public key (held by the gateway).
pub type UserVerifyingKey = VerifyingKey<User>;
/// Robot-domain public key (held by every internal service).
pub type RobotVerifyingKey = VerifyingKey<Robot>;

fn read_key_file<D: TrustDomain>(path: &Path) -> Result<Vec<u8>, KeyError> {
    std::fs::read(path).map_err(|source| KeyError::Read {
        domain: D::NAME,
        path: path.display().to_string(),
        source,
    })
}
