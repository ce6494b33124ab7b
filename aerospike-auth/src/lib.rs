// The authentication handshake contract (spec §9): the server's
// password-hashing scheme is treated as an opaque function
// `hash(user, password, salt) -> bytes`, supplied by the caller
// rather than hard-coded, since the original source does not carry
// the hashing implementation and the spec explicitly asks us not to
// guess at it.

use aerospike_base::Result;

/// Plugs in the server-specific password hash. Production
/// deployments provide a real implementation of whatever scheme their
/// cluster's security feature expects; `NullHasher` below exists for
/// clusters that run without authentication and for tests.
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, user: &str, password: &str, salt: &[u8]) -> Result<Vec<u8>>;
}

/// A hasher that never runs: used when the client policy has no
/// credentials configured. Calling it is a programming error.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHasher;

impl PasswordHasher for NullHasher {
    fn hash(&self, _user: &str, _password: &str, _salt: &[u8]) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// A resolved `(user, password-hash)` pair, computed once up front so
/// the hot path never touches the plaintext password again.
#[derive(Clone)]
pub struct Credential {
    pub user: String,
    pub password_hash: Vec<u8>,
}

impl Credential {
    pub fn new(hasher: &dyn PasswordHasher, user: impl Into<String>, password: &str, salt: &[u8]) -> Result<Self> {
        let user = user.into();
        let password_hash = hasher.hash(&user, password, salt)?;
        Ok(Self { user, password_hash })
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("user", &self.user)
            .field("password_hash", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct ReverseHasher;
    impl PasswordHasher for ReverseHasher {
        fn hash(&self, _user: &str, password: &str, salt: &[u8]) -> Result<Vec<u8>> {
            let mut bytes = password.as_bytes().to_vec();
            bytes.extend_from_slice(salt);
            bytes.reverse();
            Ok(bytes)
        }
    }

    #[test]
    fn credential_runs_the_supplied_hasher() {
        let cred = Credential::new(&ReverseHasher, "admin", "secret", b"NaCl").unwrap();
        assert_eq!(cred.user, "admin");
        assert!(!cred.password_hash.is_empty());
    }

    #[test]
    fn debug_redacts_the_hash() {
        let cred = Credential::new(&ReverseHasher, "admin", "secret", b"NaCl").unwrap();
        let rendered = format!("{cred:?}");
        assert!(rendered.contains("redacted"));
        assert!(!rendered.contains("secret"));
    }
}
