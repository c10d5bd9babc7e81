// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Security service collaborator (§6): credential/role lookup and RIVA
//! login. Authentication cryptography itself (password hashing/encryption)
//! is a Non-goal — this crate only consumes the service through the trait
//! below, the same way the real server calls out to the security server
//! over an RPC façade.

use thiserror::Error;

use crate::auth::Role;

/// Errors the security service can report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecurityError {
    /// No such account.
    #[error("unknown user")]
    UnknownUser,
    /// Credentials did not validate.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// The service itself is unreachable/misbehaving.
    #[error("security service error: {0}")]
    ServiceError(String),
}

/// A web account's role and (already-decrypted, in this façade) password.
///
/// In the full system the password travels encrypted and is decrypted by
/// the caller using the server's own password hash as a symmetric key; that
/// decryption step is part of the Non-goal ("authentication cryptography")
/// and is not modeled here beyond this trait boundary.
#[derive(Debug, Clone)]
pub struct WebAccount {
    /// The account's plaintext web password, for Digest `A1` computation.
    pub password: String,
    /// The account's role tier.
    pub role: Role,
}

/// A RIVA login token, opaque to everything but the security service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token(pub String);

/// Result of a successful RIVA login.
#[derive(Debug, Clone)]
pub struct LoginResult {
    /// Opaque session token.
    pub token: Token,
    /// Account name the token was issued for.
    pub account: String,
}

/// The narrow façade onto the security server (§6).
pub trait SecurityService: Send + Sync {
    /// Looks up a web account's role and password material for Digest auth.
    fn query_web_account(&self, user: &str) -> Result<WebAccount, SecurityError>;

    /// Validates a RIVA login's username/password and issues a token.
    fn login(&self, user: &str, password: &str) -> Result<LoginResult, SecurityError>;
}

/// An in-memory security service sufficient for tests and local
/// development.
#[derive(Debug, Default)]
pub struct MockSecurityService {
    accounts: std::collections::HashMap<String, (String, Role)>,
}

impl MockSecurityService {
    /// An empty account store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an account for tests.
    pub fn with_account(mut self, user: &str, password: &str, role: Role) -> Self {
        self.accounts
            .insert(user.to_string(), (password.to_string(), role));
        self
    }
}

impl SecurityService for MockSecurityService {
    fn query_web_account(&self, user: &str) -> Result<WebAccount, SecurityError> {
        self.accounts
            .get(user)
            .map(|(password, role)| WebAccount {
                password: password.clone(),
                role: *role,
            })
            .ok_or(SecurityError::UnknownUser)
    }

    fn login(&self, user: &str, password: &str) -> Result<LoginResult, SecurityError> {
        match self.accounts.get(user) {
            Some((expected, _)) if expected == password => Ok(LoginResult {
                token: Token(format!("token-{user}")),
                account: user.to_string(),
            }),
            Some(_) => Err(SecurityError::InvalidCredentials),
            None => Err(SecurityError::UnknownUser),
        }
    }
}
