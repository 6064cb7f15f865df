use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use crate::history::UserId;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("sign-in token is empty")]
    EmptyToken,
    #[error("could not load anonymous identity: {0}")]
    Io(#[from] std::io::Error),
    #[error("no identity available")]
    Unavailable,
}

/// Hands out the opaque id that solve history is stored under
pub trait IdentityProvider: Send + 'static {
    fn sign_in(&self) -> Result<UserId, IdentityError>;
}

impl<P: IdentityProvider + ?Sized> IdentityProvider for Box<P> {
    fn sign_in(&self) -> Result<UserId, IdentityError> {
        (**self).sign_in()
    }
}

/// Identity issued elsewhere and passed in on the command line
#[derive(Debug, Clone)]
pub struct TokenIdentity {
    token: String,
}

impl TokenIdentity {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl IdentityProvider for TokenIdentity {
    fn sign_in(&self) -> Result<UserId, IdentityError> {
        let token = self.token.trim();
        if token.is_empty() {
            return Err(IdentityError::EmptyToken);
        }
        Ok(UserId::new(token))
    }
}

/// Anonymous identity, generated once and remembered in a file
#[derive(Debug, Clone)]
pub struct AnonymousIdentity {
    path: PathBuf,
}

impl AnonymousIdentity {
    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    fn generate() -> String {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..16)
            .map(|_| char::from_digit(rng.gen_range(0..16), 16).unwrap_or('0'))
            .collect();
        format!("anon-{suffix}")
    }
}

impl IdentityProvider for AnonymousIdentity {
    fn sign_in(&self) -> Result<UserId, IdentityError> {
        if let Ok(existing) = fs::read_to_string(&self.path) {
            let existing = existing.trim();
            if !existing.is_empty() {
                return Ok(UserId::new(existing));
            }
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let id = Self::generate();
        fs::write(&self.path, &id)?;
        tracing::info!(user = %id, "created anonymous identity");
        Ok(UserId::new(id))
    }
}

/// Run the sign-in off the UI thread and report back through `on_done`
pub fn sign_in_in_background<P, F>(provider: P, on_done: F)
where
    P: IdentityProvider,
    F: FnOnce(Result<UserId, IdentityError>) + Send + 'static,
{
    thread::spawn(move || {
        let result = provider.sign_in();
        if let Err(e) = &result {
            tracing::warn!("sign-in failed: {e}");
        }
        on_done(result);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::sync::mpsc;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn token_identity_is_passed_through() {
        let user = TokenIdentity::new("  abc123 ").sign_in().unwrap();
        assert_eq!(user.as_str(), "abc123");
    }

    #[test]
    fn empty_token_is_rejected() {
        assert_matches!(
            TokenIdentity::new("   ").sign_in(),
            Err(IdentityError::EmptyToken)
        );
    }

    #[test]
    fn anonymous_identity_is_stable() {
        let dir = tempdir().unwrap();
        let provider = AnonymousIdentity::with_path(dir.path().join("state").join("identity"));

        let first = provider.sign_in().unwrap();
        let second = provider.sign_in().unwrap();
        assert_eq!(first, second);
        assert!(first.as_str().starts_with("anon-"));
        assert_eq!(first.as_str().len(), "anon-".len() + 16);
    }

    #[test]
    fn anonymous_identity_fails_when_path_is_unusable() {
        let dir = tempdir().unwrap();
        // a directory where the file should be
        let provider = AnonymousIdentity::with_path(dir.path());
        assert_matches!(provider.sign_in(), Err(IdentityError::Io(_)));
    }

    #[test]
    fn background_sign_in_reports_back() {
        let (tx, rx) = mpsc::channel();
        sign_in_in_background(TokenIdentity::new("racer"), move |r| {
            let _ = tx.send(r);
        });

        let user = rx.recv_timeout(Duration::from_secs(2)).unwrap().unwrap();
        assert_eq!(user, UserId::new("racer"));
    }
}
