//! Connection parameters and authentication material.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::HubError;
use crate::Result;

/// Default SSH port.
pub const DEFAULT_PORT: u16 = 22;

/// How a connection authenticates. Exactly one method is always present.
#[derive(Debug)]
pub enum AuthMethod {
    /// Password authentication.
    Password(SecretString),
    /// Public key authentication with a private key file.
    PrivateKey {
        /// Path to the private key on the local host.
        path: PathBuf,
        /// Passphrase protecting the key, if any.
        passphrase: Option<SecretString>,
    },
}

impl AuthMethod {
    /// Build an auth method from optional raw fields.
    ///
    /// Fails unless exactly one of `password` or `private_key` is given, and
    /// rejects a passphrase that has no key to unlock.
    pub fn from_parts(
        password: Option<String>,
        private_key: Option<PathBuf>,
        passphrase: Option<String>,
    ) -> Result<Self> {
        match (password, private_key) {
            (Some(_), Some(_)) => Err(HubError::InvalidParams(
                "provide either a password or a private key, not both".into(),
            )),
            (None, None) => Err(HubError::InvalidParams(
                "an authentication method is required (password or private key)".into(),
            )),
            (Some(password), None) => {
                if passphrase.is_some() {
                    return Err(HubError::InvalidParams(
                        "passphrase given without a private key".into(),
                    ));
                }
                Ok(Self::Password(SecretString::from(password)))
            }
            (None, Some(path)) => {
                if path.as_os_str().is_empty() {
                    return Err(HubError::InvalidParams("private key path is empty".into()));
                }
                Ok(Self::PrivateKey {
                    path,
                    passphrase: passphrase.map(SecretString::from),
                })
            }
        }
    }

    pub fn has_password(&self) -> bool {
        matches!(self, Self::Password(_))
    }

    pub fn has_private_key(&self) -> bool {
        matches!(self, Self::PrivateKey { .. })
    }
}

impl Clone for AuthMethod {
    fn clone(&self) -> Self {
        match self {
            Self::Password(secret) => {
                Self::Password(SecretString::from(secret.expose_secret().to_owned()))
            }
            Self::PrivateKey { path, passphrase } => Self::PrivateKey {
                path: path.clone(),
                passphrase: passphrase
                    .as_ref()
                    .map(|p| SecretString::from(p.expose_secret().to_owned())),
            },
        }
    }
}

/// Everything needed to open one remote connection.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: AuthMethod,
    /// Upper bound for TCP connect plus handshake, if set.
    pub connect_timeout: Option<Duration>,
}

impl ConnectParams {
    /// Create validated connection parameters.
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        auth: AuthMethod,
    ) -> Result<Self> {
        let host = host.into();
        let username = username.into();

        if host.trim().is_empty() {
            return Err(HubError::InvalidParams("host is required".into()));
        }
        if username.trim().is_empty() {
            return Err(HubError::InvalidParams("username is required".into()));
        }
        if port == 0 {
            return Err(HubError::InvalidParams("port must be non-zero".into()));
        }

        Ok(Self {
            host,
            port,
            username,
            auth,
            connect_timeout: None,
        })
    }

    /// Convenience constructor for password authentication on the default port.
    pub fn password(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let auth = AuthMethod::from_parts(Some(password.into()), None, None)?;
        Self::new(host, DEFAULT_PORT, username, auth)
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// `user@host:port`, used in logs and listings.
    pub fn target(&self) -> String {
        format!("{}@{}:{}", self.username, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_only() {
        let auth = AuthMethod::from_parts(Some("pw".into()), None, None).unwrap();
        assert!(auth.has_password());
        assert!(!auth.has_private_key());
    }

    #[test]
    fn test_key_with_passphrase() {
        let auth =
            AuthMethod::from_parts(None, Some("/home/u/.ssh/id_ed25519".into()), Some("x".into()))
                .unwrap();
        match auth {
            AuthMethod::PrivateKey { path, passphrase } => {
                assert_eq!(path, PathBuf::from("/home/u/.ssh/id_ed25519"));
                assert_eq!(passphrase.unwrap().expose_secret(), "x");
            }
            AuthMethod::Password(_) => panic!("expected key auth"),
        }
    }

    #[test]
    fn test_no_auth_rejected() {
        let err = AuthMethod::from_parts(None, None, None).unwrap_err();
        assert!(matches!(err, HubError::InvalidParams(_)));
    }

    #[test]
    fn test_both_methods_rejected() {
        let err = AuthMethod::from_parts(Some("pw".into()), Some("/k".into()), None).unwrap_err();
        assert!(matches!(err, HubError::InvalidParams(_)));
    }

    #[test]
    fn test_passphrase_without_key_rejected() {
        let err = AuthMethod::from_parts(Some("pw".into()), None, Some("pp".into())).unwrap_err();
        assert!(err.to_string().contains("passphrase"));
    }

    #[test]
    fn test_connect_params_validation() {
        let auth = AuthMethod::from_parts(Some("pw".into()), None, None).unwrap();
        assert!(ConnectParams::new("", 22, "u", auth.clone()).is_err());
        assert!(ConnectParams::new("h", 22, " ", auth.clone()).is_err());
        assert!(ConnectParams::new("h", 0, "u", auth.clone()).is_err());

        let params = ConnectParams::new("h", 2222, "u", auth).unwrap();
        assert_eq!(params.target(), "u@h:2222");
        assert!(params.connect_timeout.is_none());
    }

    #[test]
    fn test_secret_not_in_debug() {
        let params = ConnectParams::password("h", "u", "hunter2").unwrap();
        assert_eq!(params.port, DEFAULT_PORT);
        assert!(!format!("{:?}", params).contains("hunter2"));
    }

    #[test]
    fn test_clone_keeps_secret() {
        let auth = AuthMethod::from_parts(Some("pw".into()), None, None).unwrap();
        match auth.clone() {
            AuthMethod::Password(secret) => assert_eq!(secret.expose_secret(), "pw"),
            AuthMethod::PrivateKey { .. } => panic!("expected password"),
        }
    }
}
