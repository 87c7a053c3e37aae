use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use nanoid::nanoid;
use rand::Rng;
use rand::distributions::Alphanumeric;
use tracing::debug;

use crate::error::{Error, Result};
use crate::session::{AuthProvider, AuthUser, NewUser, SessionToken};

const TOKEN_TTL_SECS: u64 = 600;

struct Account {
    uid: String,
    password: String,
    display_name: String,
    avatar_url: Option<String>,
}

struct TokenEntry {
    email: String,
    expires_at: u64,
}

/// Credential + token table behind the AuthProvider seam. Tokens are
/// opaque prefixed strings with a TTL; verification re-checks expiry on
/// every call.
pub struct MemoryAuth {
    accounts: Mutex<HashMap<String, Account>>,
    tokens: Mutex<HashMap<String, TokenEntry>>,
}

fn generate_token() -> String {
    let rand_string: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();

    format!("plm_{}", rand_string)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            tokens: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn sign_up(&self, new_user: NewUser) -> Result<AuthUser> {
        if new_user.email.trim().is_empty() || !new_user.email.contains('@') {
            return Err(Error::Validation("invalid email".to_string()));
        }
        if new_user.password.is_empty() {
            return Err(Error::Validation("password is empty".to_string()));
        }

        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(&new_user.email) {
            return Err(Error::Validation("account already exists".to_string()));
        }

        let uid = nanoid!();
        accounts.insert(
            new_user.email.clone(),
            Account {
                uid: uid.clone(),
                password: new_user.password,
                display_name: new_user.display_name.clone(),
                avatar_url: None,
            },
        );

        debug!(email = %new_user.email, "account created");
        Ok(AuthUser {
            uid,
            email: new_user.email,
            display_name: new_user.display_name,
            avatar_url: None,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<SessionToken> {
        let accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get(email)
            .filter(|account| account.password == password)
            .ok_or_else(|| Error::Validation("invalid credentials".to_string()))?;

        let token = generate_token();
        self.tokens.lock().unwrap().insert(
            token.clone(),
            TokenEntry {
                email: email.to_string(),
                expires_at: now_secs() + TOKEN_TTL_SECS,
            },
        );

        debug!(uid = %account.uid, "token issued");
        Ok(SessionToken(token))
    }

    async fn verify(&self, token: &SessionToken) -> Result<AuthUser> {
        if !token.0.starts_with("plm_") {
            return Err(Error::Unauthenticated);
        }

        let mut tokens = self.tokens.lock().unwrap();
        let entry = tokens.get(&token.0).ok_or(Error::Unauthenticated)?;

        if now_secs() > entry.expires_at {
            tokens.remove(&token.0);
            return Err(Error::Unauthenticated);
        }

        let email = entry.email.clone();
        drop(tokens);

        let accounts = self.accounts.lock().unwrap();
        let account = accounts.get(&email).ok_or(Error::Unauthenticated)?;

        Ok(AuthUser {
            uid: account.uid.clone(),
            email,
            display_name: account.display_name.clone(),
            avatar_url: account.avatar_url.clone(),
        })
    }

    async fn sign_out(&self, token: &SessionToken) -> Result<()> {
        self.tokens.lock().unwrap().remove(&token.0);
        Ok(())
    }
}
