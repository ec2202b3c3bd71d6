//! JWT claim shapes shared between the IdP (issuer) and its dependents (verifiers).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Claims carried in every issued token. See spec §3 (IssuedToken) and §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: account id, carried as a string per JWT convention.
    pub sub: String,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
    pub kind: TokenKind,
    /// Copy of the account's token-version counter at issuance.
    pub ver: i64,
    /// Unique token id.
    pub jti: String,
    /// Signed-in admin flag, resolved at issuance time (see DESIGN.md).
    #[serde(default)]
    pub is_admin: bool,
}

impl Claims {
    pub fn account_id(&self) -> Result<i64, std::num::ParseIntError> {
        self.sub.parse()
    }
}
