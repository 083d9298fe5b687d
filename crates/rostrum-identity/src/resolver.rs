use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use rostrum_crypto::{PasswordHasher, TokenIssuer};
use rostrum_db::models::{NewUser, UserRow};
use rostrum_db::{Database, DbError, UniqueField};
use rostrum_types::api::{LoginRequest, OAuthRequest, RegisterRequest, SessionIdentity};
use rostrum_types::models::{AuthProvider, FederatedProvider, User, UserId};

use crate::providers::{ProviderIdentity, ProviderVerifier};
use crate::username::{allocate_unique, derive_candidate};
use crate::IdentityError;

/// Insert attempts for one federated sign-in before giving up with `Transient`.
pub const MAX_CONFLICT_RETRIES: usize = 8;

/// Upper bound on a whole provider verification, including key fetches.
pub const DEFAULT_PROVIDER_DEADLINE: Duration = Duration::from_secs(10);

const MAX_USERNAME_LEN: usize = 50;
const MAX_EMAIL_LEN: usize = 100;
const MIN_PASSWORD_LEN: usize = 6;
const FALLBACK_USERNAME: &str = "user";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    NewLocalAccount,
    ExistingLocalLogin,
    NewFederatedAccount,
    LinkedFederatedAccount,
}

/// A freshly issued session and the user it belongs to.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub token: String,
    pub user: User,
    pub outcome: AuthOutcome,
}

/// Maps every way of signing in onto exactly one user row and mints a session for it.
pub struct IdentityResolver {
    db: Arc<Database>,
    hasher: PasswordHasher,
    tokens: TokenIssuer,
    google: Arc<dyn ProviderVerifier>,
    apple: Arc<dyn ProviderVerifier>,
    provider_deadline: Duration,
}

impl IdentityResolver {
    pub fn new(
        db: Arc<Database>,
        hasher: PasswordHasher,
        tokens: TokenIssuer,
        google: Arc<dyn ProviderVerifier>,
        apple: Arc<dyn ProviderVerifier>,
    ) -> Self {
        debug_assert_eq!(google.provider(), FederatedProvider::Google);
        debug_assert_eq!(apple.provider(), FederatedProvider::Apple);
        Self {
            db,
            hasher,
            tokens,
            google,
            apple,
            provider_deadline: DEFAULT_PROVIDER_DEADLINE,
        }
    }

    pub fn with_provider_deadline(mut self, deadline: Duration) -> Self {
        self.provider_deadline = deadline;
        self
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<AuthSession, IdentityError> {
        let username = req.username.trim().to_string();
        let email = normalize_email(&req.email);
        validate_username(&username)?;
        validate_email(&email)?;
        if req.password.len() < MIN_PASSWORD_LEN {
            return Err(IdentityError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let avatar = req
            .avatar
            .map(|a| a.trim().to_string())
            .unwrap_or_default();

        let db = self.db.clone();
        let hasher = self.hasher.clone();
        let password = req.password;
        let row = tokio::task::spawn_blocking(move || -> Result<UserRow, IdentityError> {
            if db.username_or_email_exists(&username, &email)? {
                return Err(duplicate_account());
            }

            let password_hash = hasher.hash(&password)?;
            db.insert_user(&NewUser {
                username: &username,
                email: &email,
                password_hash: &password_hash,
                avatar: &avatar,
                auth_provider: AuthProvider::Email,
                google_id: None,
                apple_id: None,
            })
            .map_err(|e| match e {
                // Lost the race to a concurrent registration.
                DbError::Conflict(UniqueField::Username | UniqueField::Email) => {
                    duplicate_account()
                }
                other => other.into(),
            })
        })
        .await??;

        let user = row.into_user()?;
        info!("Registered user {} ({})", user.username, user.id);
        self.session(user, AuthOutcome::NewLocalAccount)
    }

    pub async fn login(&self, req: LoginRequest) -> Result<AuthSession, IdentityError> {
        let email = normalize_email(&req.email);
        if email.is_empty() || req.password.is_empty() {
            return Err(IdentityError::Validation(
                "email and password are required".into(),
            ));
        }

        let db = self.db.clone();
        let hasher = self.hasher.clone();
        let password = req.password;
        let row = tokio::task::spawn_blocking(move || -> Result<UserRow, IdentityError> {
            match db.get_local_user_by_email(&email)? {
                Some(row) if hasher.verify(&password, &row.password_hash) => Ok(row),
                Some(_) => Err(IdentityError::InvalidCredentials),
                None => {
                    hasher.verify_absent(&password);
                    Err(IdentityError::InvalidCredentials)
                }
            }
        })
        .await??;

        let user = row.into_user()?;
        debug!("User {} logged in", user.id);
        self.session(user, AuthOutcome::ExistingLocalLogin)
    }

    pub async fn oauth_login(
        &self,
        provider: FederatedProvider,
        req: OAuthRequest,
    ) -> Result<AuthSession, IdentityError> {
        if req.token.trim().is_empty() {
            return Err(IdentityError::Validation("token is required".into()));
        }
        let requested_username = non_empty(req.username);
        let client_avatar = non_empty(req.avatar);

        let identity = self.verify_with_provider(provider, &req.token).await?;

        let db = self.db.clone();
        let (row, outcome) = tokio::task::spawn_blocking(move || {
            resolve_federated(
                &db,
                provider,
                &identity,
                requested_username.as_deref(),
                client_avatar.as_deref(),
            )
        })
        .await??;

        let user = row.into_user()?;
        self.session(user, outcome)
    }

    pub async fn current_user(&self, id: UserId) -> Result<User, IdentityError> {
        let db = self.db.clone();
        let row = tokio::task::spawn_blocking(move || db.get_user_by_id(id)).await??;
        match row {
            Some(row) => Ok(row.into_user()?),
            None => Err(IdentityError::NotFound),
        }
    }

    async fn verify_with_provider(
        &self,
        provider: FederatedProvider,
        token: &str,
    ) -> Result<ProviderIdentity, IdentityError> {
        let verifier = match provider {
            FederatedProvider::Google => &self.google,
            FederatedProvider::Apple => &self.apple,
        };

        match tokio::time::timeout(self.provider_deadline, verifier.verify(token)).await {
            Ok(Ok(identity)) => Ok(identity),
            Ok(Err(e)) => {
                warn!("Rejected {} token: {}", verifier.provider(), e);
                Err(IdentityError::InvalidProviderToken(provider))
            }
            Err(_) => {
                warn!(
                    "{} verification exceeded {:?}",
                    provider, self.provider_deadline
                );
                Err(IdentityError::InvalidProviderToken(provider))
            }
        }
    }

    fn session(&self, user: User, outcome: AuthOutcome) -> Result<AuthSession, IdentityError> {
        let token = self.tokens.issue(&SessionIdentity::from(&user))?;
        Ok(AuthSession {
            token,
            user,
            outcome,
        })
    }
}

/// Find or create the account for a verified provider identity.
fn resolve_federated(
    db: &Database,
    provider: FederatedProvider,
    identity: &ProviderIdentity,
    requested_username: Option<&str>,
    client_avatar: Option<&str>,
) -> Result<(UserRow, AuthOutcome), IdentityError> {
    let email = normalize_email(&identity.email);
    let subject = identity.subject.as_str();

    for attempt in 1..=MAX_CONFLICT_RETRIES {
        if let Some(row) = db.find_federated_match(provider, &email, subject)? {
            let row = link_existing(db, row, provider, subject, client_avatar)?;
            return Ok((row, AuthOutcome::LinkedFederatedAccount));
        }

        if email.is_empty() {
            return Err(IdentityError::Validation(format!(
                "{provider} account did not share an email address"
            )));
        }

        // Only a new account takes the requested name.
        let base = match requested_username {
            Some(name) => {
                validate_username(name)?;
                name.to_string()
            }
            None => derive_candidate(&email),
        };
        let base = if base.is_empty() {
            FALLBACK_USERNAME.to_string()
        } else {
            base
        };
        let username = allocate_unique(&base, |name| db.username_exists(name))?;
        let avatar = client_avatar
            .or(identity.picture.as_deref())
            .unwrap_or_default();

        let inserted = db.insert_user(&NewUser {
            username: &username,
            email: &email,
            password_hash: "",
            avatar,
            auth_provider: provider.into(),
            google_id: (provider == FederatedProvider::Google).then_some(subject),
            apple_id: (provider == FederatedProvider::Apple).then_some(subject),
        });

        match inserted {
            Ok(row) => {
                info!(
                    "Created {} account {} ({})",
                    provider, row.username, row.id
                );
                return Ok((row, AuthOutcome::NewFederatedAccount));
            }
            Err(DbError::Conflict(field)) => {
                debug!(
                    "{} sign-in collided on {:?} (attempt {}/{})",
                    provider, field, attempt, MAX_CONFLICT_RETRIES
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    warn!(
        "{} sign-in for {} still conflicting after {} attempts",
        provider, email, MAX_CONFLICT_RETRIES
    );
    Err(IdentityError::Transient)
}

/// Backfill the provider subject and avatar on an existing account. Username and
/// auth provider are never touched.
fn link_existing(
    db: &Database,
    row: UserRow,
    provider: FederatedProvider,
    subject: &str,
    client_avatar: Option<&str>,
) -> Result<UserRow, IdentityError> {
    let id = row.user_id();
    let mut changed = false;

    if row.subject_for(provider).is_none() {
        match db.link_provider_subject(id, provider, subject) {
            Ok(true) => {
                info!("Linked {} subject to user {}", provider, id);
                changed = true;
            }
            // A concurrent sign-in linked it first.
            Ok(false) => {}
            Err(DbError::Conflict(_)) => {
                warn!(
                    "{} subject already belongs to another account; user {} left unlinked",
                    provider, id
                );
            }
            Err(e) => return Err(e.into()),
        }
    }

    if let Some(avatar) = client_avatar {
        if row.avatar.is_empty() && db.backfill_avatar(id, avatar)? {
            changed = true;
        }
    }

    if !changed {
        return Ok(row);
    }
    db.get_user_by_id(id)?.ok_or(IdentityError::NotFound)
}

fn duplicate_account() -> IdentityError {
    IdentityError::Conflict("username or email already exists".into())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_username(username: &str) -> Result<(), IdentityError> {
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN {
        return Err(IdentityError::Validation(format!(
            "username must be 1-{MAX_USERNAME_LEN} characters"
        )));
    }
    if username.chars().any(|c| c.is_whitespace() || c == '@') {
        return Err(IdentityError::Validation(
            "username may not contain spaces or '@'".into(),
        ));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), IdentityError> {
    let valid = email.len() <= MAX_EMAIL_LEN
        && !email.chars().any(char::is_whitespace)
        && matches!(
            email.split_once('@'),
            Some((local, domain)) if !local.is_empty() && domain.contains('.') && !domain.contains('@')
        );
    if valid {
        Ok(())
    } else {
        Err(IdentityError::Validation("a valid email is required".into()))
    }
}
