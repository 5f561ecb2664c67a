//! Session authentication.
//!
//! One shared token identifies the Creator's device. No token configured
//! means open access (development only).

use eidolon_core::{Error, Result};

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[derive(Clone, Debug)]
pub struct ResolvedAuth {
    token: Option<String>,
}

impl ResolvedAuth {
    pub fn new(config_token: Option<String>, env_token: Option<String>) -> Self {
        Self {
            token: config_token.or(env_token),
        }
    }

    pub fn verify_token(&self, provided: Option<&str>) -> Result<()> {
        match &self.token {
            None => Ok(()),
            Some(expected) => {
                let provided = provided.ok_or_else(|| Error::auth_failed("token required"))?;
                if !constant_time_eq(expected.as_bytes(), provided.as_bytes()) {
                    return Err(Error::auth_failed("invalid token"));
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_auth_accepts_only_the_token() {
        let auth = ResolvedAuth::new(Some("secret-123".into()), None);
        assert!(auth.verify_token(Some("secret-123")).is_ok());
        assert!(auth.verify_token(Some("wrong")).is_err());
        assert!(auth.verify_token(None).is_err());
    }

    #[test]
    fn open_access_when_no_token_configured() {
        let auth = ResolvedAuth::new(None, None);
        assert!(auth.verify_token(None).is_ok());
        assert!(auth.verify_token(Some("anything")).is_ok());
    }

    #[test]
    fn env_token_fills_in_when_config_is_silent() {
        let auth = ResolvedAuth::new(None, Some("from-env".into()));
        assert!(auth.verify_token(Some("from-env")).is_ok());
        assert!(auth.verify_token(None).is_err());
    }
}
