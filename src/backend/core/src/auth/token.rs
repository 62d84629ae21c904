//! Signed credential issuance and validation.
//!
//! Credentials are HS256 JWTs carrying a full authorization snapshot. Beyond
//! signature and expiry, a credential is only accepted while:
//!
//! - its `tokenVersion` is at least the user's stored version counter
//! - its `jti` is not in the revoked set
//!
//! Bumping the version counter ([`TokenService::invalidate_all_sessions`])
//! invalidates every credential issued to that user so far in one store
//! operation. [`TokenService::revoke`] kills a single credential.
//!
//! All rejection reasons look the same to callers (`false` or
//! `AccessTokenInvalid` / `RefreshTokenInvalid`); the reason is only logged.

use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::claims::Claims;
use super::principal::Principal;
use super::store::{record_store_failure, SessionStore};
use crate::config::SecurityConfig;
use crate::error::{BastionError, ErrorCode, Result};
use crate::tenant::TenantDirectory;

/// TTL value meaning "never expires".
pub const NEVER_EXPIRES: i64 = -1;

const MIN_SECRET_LEN: usize = 32;
const BEARER_PREFIX: &str = "Bearer ";

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// Token service settings.
#[derive(Clone)]
pub struct TokenConfig {
    pub secret: String,
    /// Seconds; [`NEVER_EXPIRES`] disables expiry
    pub access_token_ttl: i64,
    /// Seconds; [`NEVER_EXPIRES`] disables expiry
    pub refresh_token_ttl: i64,
    pub leeway_secs: u64,
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"[REDACTED]")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("leeway_secs", &self.leeway_secs)
            .finish()
    }
}

impl From<&SecurityConfig> for TokenConfig {
    fn from(cfg: &SecurityConfig) -> Self {
        Self {
            secret: cfg.jwt_secret.clone(),
            access_token_ttl: cfg.access_token_ttl,
            refresh_token_ttl: cfg.refresh_token_ttl,
            leeway_secs: cfg.leeway_secs,
        }
    }
}

impl TokenConfig {
    pub fn builder(secret: impl Into<String>) -> TokenConfigBuilder {
        TokenConfigBuilder {
            config: Self {
                secret: secret.into(),
                access_token_ttl: 7200,
                refresh_token_ttl: 604_800,
                leeway_secs: 0,
            },
        }
    }
}

/// Builder for [`TokenConfig`].
pub struct TokenConfigBuilder {
    config: TokenConfig,
}

impl TokenConfigBuilder {
    pub fn access_token_ttl(mut self, secs: i64) -> Self {
        self.config.access_token_ttl = secs;
        self
    }

    pub fn refresh_token_ttl(mut self, secs: i64) -> Self {
        self.config.refresh_token_ttl = secs;
        self
    }

    pub fn leeway_secs(mut self, secs: u64) -> Self {
        self.config.leeway_secs = secs;
        self
    }

    pub fn build(self) -> TokenConfig {
        self.config
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Results
// ═══════════════════════════════════════════════════════════════════════════════

/// Credentials handed to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    /// Access token lifetime in seconds (`-1` = never expires)
    pub expires_in: i64,
}

/// Why a credential was rejected. Only ever surfaced in logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Malformed,
    BadSignature,
    Expired,
    WrongType,
    Superseded,
    Revoked,
    StoreUnavailable,
}

impl Rejection {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::BadSignature => "bad_signature",
            Self::Expired => "expired",
            Self::WrongType => "wrong_type",
            Self::Superseded => "superseded",
            Self::Revoked => "revoked",
            Self::StoreUnavailable => "store_unavailable",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Token Service
// ═══════════════════════════════════════════════════════════════════════════════

/// Issues, validates, refreshes and revokes credentials.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    revoke_validation: Validation,
    unverified: Validation,
    access_token_ttl: i64,
    refresh_token_ttl: i64,
    store: Arc<dyn SessionStore>,
}

impl TokenService {
    /// Create a token service. The secret must be at least 32 bytes.
    pub fn new(config: TokenConfig, store: Arc<dyn SessionStore>) -> Result<Self> {
        if config.secret.len() < MIN_SECRET_LEN {
            return Err(BastionError::configuration(format!(
                "security.jwt_secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }
        for ttl in [config.access_token_ttl, config.refresh_token_ttl] {
            if ttl <= 0 && ttl != NEVER_EXPIRES {
                return Err(BastionError::configuration(format!(
                    "token ttl must be positive or {}, got {}",
                    NEVER_EXPIRES, ttl
                )));
            }
        }

        // exp is optional: never-expiring credentials carry none.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.leeway_secs;
        validation.required_spec_claims.clear();

        let mut revoke_validation = validation.clone();
        revoke_validation.validate_exp = false;

        let mut unverified = revoke_validation.clone();
        unverified.insecure_disable_signature_validation();

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            revoke_validation,
            unverified,
            access_token_ttl: config.access_token_ttl,
            refresh_token_ttl: config.refresh_token_ttl,
            store,
        })
    }

    pub fn access_token_ttl(&self) -> i64 {
        self.access_token_ttl
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Issuance
    // ─────────────────────────────────────────────────────────────────────────

    /// Issue an access/refresh pair for `principal`.
    pub async fn issue(&self, principal: &Principal) -> Result<TokenPair> {
        let version = self.store.current_version(principal.user_id).await?;
        let access_token = self.sign_for(principal, false, version)?;
        let refresh_token = self.sign_for(principal, true, version)?;

        counter!("bastion_tokens_issued_total", "kind" => "pair").increment(1);
        debug!(
            user_id = principal.user_id,
            tenant_id = ?principal.tenant_id,
            token_version = version,
            "Issued credential pair"
        );

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: BEARER_PREFIX.trim_end().to_string(),
            expires_in: self.access_token_ttl,
        })
    }

    fn sign_for(&self, principal: &Principal, refresh: bool, version: u64) -> Result<String> {
        let now = Utc::now().timestamp();
        let ttl = if refresh {
            self.refresh_token_ttl
        } else {
            self.access_token_ttl
        };
        let exp = (ttl != NEVER_EXPIRES).then(|| now + ttl);
        let jti = Uuid::new_v4().simple().to_string();
        let claims = Claims::for_principal(principal, refresh, version, now, exp, jti);
        self.sign(&claims)
    }

    /// Sign an arbitrary claim set with the service key.
    pub fn sign(&self, claims: &Claims) -> Result<String> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Decoding
    // ─────────────────────────────────────────────────────────────────────────

    /// Decode claims without checking signature or expiry.
    ///
    /// Only for input that has just passed [`TokenService::validate`].
    pub fn decode_unverified(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(strip_bearer(token), &self.decoding_key, &self.unverified)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Credential payload could not be decoded");
                BastionError::access_token_invalid()
            })
    }

    /// Principal encoded in `token`, without verification.
    pub fn parse(&self, token: &str) -> Result<Principal> {
        Ok(self.decode_unverified(token)?.to_principal())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────────

    /// Full check in order signature, expiry, type, version, revocation.
    pub async fn verify(&self, token: &str, expect_refresh: bool) -> std::result::Result<Claims, Rejection> {
        let claims = decode::<Claims>(strip_bearer(token), &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => Rejection::Expired,
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => Rejection::BadSignature,
                _ => Rejection::Malformed,
            })?;

        if claims.is_refresh() != expect_refresh {
            return Err(Rejection::WrongType);
        }

        let current = self.store.current_version(claims.user_id).await.map_err(|e| {
            self.log_store_failure(&e, "current_version");
            Rejection::StoreUnavailable
        })?;
        if claims.token_version < current {
            return Err(Rejection::Superseded);
        }

        let revoked = self.store.is_revoked(&claims.jti).await.map_err(|e| {
            self.log_store_failure(&e, "is_revoked");
            Rejection::StoreUnavailable
        })?;
        if revoked {
            return Err(Rejection::Revoked);
        }

        Ok(claims)
    }

    fn log_store_failure(&self, err: &BastionError, operation: &'static str) {
        record_store_failure(self.store.as_ref(), operation);
        error!(
            error = %err,
            backend = self.store.name(),
            operation,
            "Session store unavailable, rejecting credential"
        );
    }

    /// Whether `token` is currently acceptable as the expected credential type.
    pub async fn validate(&self, token: &str, expect_refresh: bool) -> bool {
        let kind = if expect_refresh { "refresh" } else { "access" };
        match self.verify(token, expect_refresh).await {
            Ok(_) => {
                counter!("bastion_token_validations_total", "kind" => kind, "result" => "valid").increment(1);
                true
            }
            Err(reason) => {
                counter!(
                    "bastion_token_validations_total",
                    "kind" => kind,
                    "result" => reason.as_str(),
                )
                .increment(1);
                debug!(reason = reason.as_str(), kind, "Credential rejected");
                false
            }
        }
    }

    /// Validate an access token and return its principal.
    pub async fn authenticate(&self, token: &str) -> Result<Principal> {
        if !self.validate(token, false).await {
            return Err(BastionError::access_token_invalid());
        }
        self.parse(token)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// New access token from a refresh token. The refresh token is returned
    /// unchanged and the principal snapshot is taken from it as-is.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        if !self.validate(refresh_token, true).await {
            return Err(BastionError::refresh_token_invalid());
        }
        let claims = self
            .decode_unverified(refresh_token)
            .map_err(|_| BastionError::refresh_token_invalid())?;
        let principal = claims.to_principal();
        // Carry the version that was just checked; a later bump must supersede this token too.
        let access_token = self.sign_for(&principal, false, claims.token_version)?;

        counter!("bastion_tokens_issued_total", "kind" => "refresh").increment(1);
        debug!(user_id = principal.user_id, "Access token refreshed");

        Ok(TokenPair {
            access_token,
            refresh_token: strip_bearer(refresh_token).to_string(),
            token_type: BEARER_PREFIX.trim_end().to_string(),
            expires_in: self.access_token_ttl,
        })
    }

    /// Revoke a single credential until it would have expired anyway.
    ///
    /// Blank and already expired tokens are a no-op, as is revoking twice.
    pub async fn revoke(&self, token: &str) -> Result<()> {
        let token = strip_bearer(token);
        if token.trim().is_empty() {
            return Ok(());
        }

        let claims = decode::<Claims>(token, &self.decoding_key, &self.revoke_validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "Refusing to revoke unverifiable credential");
                BastionError::access_token_invalid()
            })?;
        if claims.jti.trim().is_empty() {
            return Ok(());
        }

        let ttl = match claims.remaining_secs(Utc::now().timestamp()) {
            None => None,
            Some(secs) if secs <= 0 => return Ok(()),
            Some(secs) => Some(Duration::from_secs(secs as u64)),
        };

        self.store.revoke(&claims.jti, ttl).await?;
        counter!("bastion_tokens_revoked_total").increment(1);
        info!(
            user_id = claims.user_id,
            jti = %claims.jti,
            ttl_secs = ?ttl.map(|t| t.as_secs()),
            "Credential revoked"
        );
        Ok(())
    }

    /// Invalidate every credential issued to `user_id` so far.
    /// Returns the new version.
    pub async fn invalidate_all_sessions(&self, user_id: i64) -> Result<u64> {
        let version = self.store.bump_version(user_id).await?;
        counter!("bastion_session_invalidations_total").increment(1);
        info!(user_id, token_version = version, "All sessions invalidated");
        Ok(version)
    }

    /// Issue a fresh pair scoped to `target_tenant`.
    ///
    /// Requires the tenant-switch capability and an active target tenant.
    pub async fn switch_tenant(
        &self,
        principal: &Principal,
        target_tenant: i64,
        directory: &dyn TenantDirectory,
    ) -> Result<TokenPair> {
        if !principal.can_switch_tenant {
            return Err(tenant_switch_denied(principal, target_tenant, "capability missing"));
        }
        let active = directory
            .find_by_id(target_tenant)
            .await?
            .is_some_and(|t| t.is_active());
        if !active {
            return Err(tenant_switch_denied(principal, target_tenant, "tenant missing or inactive"));
        }

        let mut switched = principal.clone();
        switched.tenant_id = Some(target_tenant);
        let pair = self.issue(&switched).await?;
        info!(
            user_id = principal.user_id,
            from_tenant = ?principal.tenant_id,
            to_tenant = target_tenant,
            "Tenant switched"
        );
        Ok(pair)
    }
}

fn tenant_switch_denied(principal: &Principal, target: i64, reason: &str) -> BastionError {
    BastionError::with_internal(
        ErrorCode::TenantSwitchDenied,
        "Tenant switch is not allowed",
        reason.to_string(),
    )
    .with_context("user_id", principal.user_id)
    .with_context("target_tenant", target)
}

fn strip_bearer(token: &str) -> &str {
    token.strip_prefix(BEARER_PREFIX).unwrap_or(token).trim()
}
