//! Local credential store.
//!
//! Stored passwords are either `sha256:<hex>` digests or, for development,
//! plain values. Both are compared in constant time.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::config::UserConfig;

/// A user the store vouches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedUser {
    /// Username, used as the user token subject.
    pub username: String,
    /// Role names as configured.
    pub roles: Vec<String>,
}

/// Trait abstracting the credential backend.
///
/// Implementations must be `Send + Sync` because the store is shared across
/// async tasks.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Verify a username/password pair. `None` for unknown users and wrong passwords alike.
    async fn verify(&self, username: &str, password: &str) -> Option<VerifiedUser>;
}

#[derive(Clone)]
enum StoredSecret {
    Sha256([u8; 32]),
    Plain(Vec<u8>),
}

impl StoredSecret {
    fn parse(value: &str) -> Self {
        value
            .strip_prefix("sha256:")
            .and_then(|digest| hex::decode(digest.trim()).ok())
            .and_then(|bytes| <[u8; 32]>::try_from(bytes).ok())
            .map_or_else(|| Self::Plain(value.as_bytes().to_vec()), Self::Sha256)
    }

    fn matches(&self, password: &str) -> bool {
        match self {
            Self::Sha256(expected) => {
                let actual = Sha256::digest(password.as_bytes());
                actual.as_slice().ct_eq(expected.as_slice()).into()
            }
            Self::Plain(expected) => password.as_bytes().ct_eq(expected.as_slice()).into(),
        }
    }
}

struct StoredUser {
    secret: StoredSecret,
    roles: Vec<String>,
}

/// In-memory credential store loaded from configuration.
pub struct InMemoryCredentialStore {
    users: HashMap<String, StoredUser>,
    // Compared against when the username is unknown, so both paths hash once.
    decoy: StoredSecret,
}

impl InMemoryCredentialStore {
    /// Build a store from configured users.
    pub fn from_config(users: &[UserConfig]) -> Self {
        let users = users
            .iter()
            .map(|user| {
                (
                    user.username.clone(),
                    StoredUser {
                        secret: StoredSecret::parse(&user.password),
                        roles: user.roles.clone(),
                    },
                )
            })
            .collect();
        Self {
            users,
            decoy: StoredSecret::Sha256([0; 32]),
        }
    }

    /// Number of users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the store has no users.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

/// `sha256:<hex>` digest of `password`, the format the store accepts.
pub fn hash_password(password: &str) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(password.as_bytes())))
}

#[async_trait::async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn verify(&self, username: &str, password: &str) -> Option<VerifiedUser> {
        let Some(user) = self.users.get(username) else {
            let _ = self.decoy.matches(password);
            return None;
        };
        user.secret.matches(password).then(|| VerifiedUser {
            username: username.to_string(),
            roles: user.roles.clone(),
        })
    }
}
