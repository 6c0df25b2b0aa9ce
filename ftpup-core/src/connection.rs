//! Connection establishment
//!
//! Opens the control connection, logs in and moves into the remote
//! directory the upload is destined for. No retries: the first failure is
//! returned to the caller.

use crate::error::Result;
use crate::transport::{FtpSession, TransportConfig};
use std::fmt;
use zeroize::Zeroizing;

/// Login credentials; the password is wiped from memory on drop
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    password: Zeroizing<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"****")
            .finish()
    }
}

/// Connect, authenticate and change into `remote_dir`.
///
/// The returned session is owned by the caller, who closes it with
/// [`FtpSession::quit`] or by dropping it.
pub fn establish(
    config: TransportConfig,
    credentials: &Credentials,
    remote_dir: &str,
) -> Result<FtpSession> {
    tracing::info!("Connecting to {}:{}", config.host, config.port);
    let mut session = FtpSession::connect(config)?;

    session.login(&credentials.username, credentials.password())?;
    for line in session.welcome().lines() {
        tracing::info!("{}", line);
    }

    tracing::info!("Changing remote directory to: {}", remote_dir);
    session.cwd(remote_dir)?;

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = Credentials::new("deliveries", "s3cret!");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("deliveries"));
        assert!(!rendered.contains("s3cret!"));
        assert_eq!(creds.password(), "s3cret!");
    }
}
