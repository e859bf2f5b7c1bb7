//! Identity, profile and the session context every guarded view reads.

use crate::db::now_stamp;
use crate::model::{Gender, Level, Role};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Rejected before any store call.
    #[error("{0}")]
    Validation(String),
    #[error("Invalid login credentials")]
    InvalidCredentials,
    #[error("User already registered")]
    EmailTaken,
    #[error("Session expired or invalid")]
    InvalidSession,
    #[error("An admin account already exists")]
    AdminExists,
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Store(#[from] rusqlite::Error),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Validation(_) => "validation",
            _ => "auth_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    /// `None` when the stored tag is not one of the four portals.
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub identity: Option<Identity>,
    pub profile: Option<Profile>,
    pub loading: bool,
}

impl SessionState {
    pub fn role(&self) -> Option<Role> {
        self.profile.as_ref().and_then(|p| p.role)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.id.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedIn {
    pub identity: Identity,
    pub profile: Option<Profile>,
    pub token: String,
    /// Portal landing path, absent when the identity has no usable profile.
    pub redirect: Option<&'static str>,
}

/// Role-specific sign-up fields. Only the selected role's branch exists,
/// so switching role drops whatever the other branch held.
#[derive(Debug, Clone, PartialEq)]
pub enum RoleFields {
    Student {
        date_of_birth: String,
        gender: Gender,
        level: Level,
    },
    Teacher {
        qualification: String,
        specialization: Vec<String>,
    },
    Parent,
}

impl RoleFields {
    pub fn role(&self) -> Role {
        match self {
            RoleFields::Student { .. } => Role::Student,
            RoleFields::Teacher { .. } => Role::Teacher,
            RoleFields::Parent => Role::Parent,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Registration {
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
    pub confirm_password: String,
    pub fields: RoleFields,
}

impl Registration {
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.password != self.confirm_password {
            return Err(AuthError::Validation("Passwords do not match".to_string()));
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if self.full_name.trim().is_empty() {
            return Err(AuthError::Validation("Full name is required".to_string()));
        }
        if normalize_email(&self.email).is_empty() {
            return Err(AuthError::Validation("Email is required".to_string()));
        }
        Ok(())
    }
}

/// Holds the signed-in identity for one front end. Created in the loading
/// state; `init` resolves it once a workspace is open and `sign_out` tears
/// it down again.
#[derive(Debug)]
pub struct SessionProvider {
    state: SessionState,
    token: Option<String>,
}

impl Default for SessionProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionProvider {
    pub fn new() -> Self {
        Self {
            state: SessionState {
                identity: None,
                profile: None,
                loading: true,
            },
            token: None,
        }
    }

    pub fn current(&self) -> &SessionState {
        &self.state
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Finishes the initial session check. A persisted token that no
    /// longer resolves leaves the session signed out rather than failing.
    pub fn init(&mut self, conn: &Connection, token: Option<&str>) {
        self.clear();
        if let Some(token) = token {
            if let Err(e) = self.restore(conn, token) {
                tracing::info!(error = %e, "persisted session not restored");
            }
        }
        self.state.loading = false;
    }

    pub fn restore(&mut self, conn: &Connection, token: &str) -> Result<SignedIn, AuthError> {
        let identity_id: Option<String> = conn
            .query_row(
                "SELECT identity_id FROM sessions WHERE token_hash = ?",
                [hash_token(token)],
                |r| r.get(0),
            )
            .optional()?;
        let Some(identity_id) = identity_id else {
            return Err(AuthError::InvalidSession);
        };
        let identity = load_identity(conn, &identity_id)?.ok_or(AuthError::InvalidSession)?;
        let profile = load_profile(conn, &identity.id)?;
        self.establish(conn, identity, profile, token.to_string())
    }

    pub fn sign_in(
        &mut self,
        conn: &Connection,
        email: &str,
        password: &str,
    ) -> Result<SignedIn, AuthError> {
        let email = normalize_email(email);
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT id, password_hash FROM identities WHERE email = ?",
                [&email],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let Some((identity_id, password_hash)) = row else {
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(password, &password_hash) {
            return Err(AuthError::InvalidCredentials);
        }

        let token = issue_token(conn, &identity_id)?;
        let profile = load_profile(conn, &identity_id)?;
        tracing::info!(identity = %identity_id, "signed in");
        self.establish(
            conn,
            Identity {
                id: identity_id,
                email,
            },
            profile,
            token,
        )
    }

    /// Validates locally, then writes identity, profile and the role row in
    /// one transaction before signing the new identity in.
    pub fn sign_up(
        &mut self,
        conn: &Connection,
        reg: &Registration,
    ) -> Result<SignedIn, AuthError> {
        reg.validate()?;
        let email = normalize_email(&reg.email);
        if email_taken(conn, &email)? {
            return Err(AuthError::EmailTaken);
        }
        let password_hash = hash_password(&reg.password)?;
        let identity_id = Uuid::new_v4().to_string();
        let created_at = now_stamp();
        let role = reg.fields.role();

        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO identities(id, email, password_hash, created_at) VALUES(?, ?, ?, ?)",
            (&identity_id, &email, &password_hash, &created_at),
        )?;
        tx.execute(
            "INSERT INTO profiles(id, full_name, email, phone, role, created_at)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                &identity_id,
                reg.full_name.trim(),
                &email,
                reg.phone.as_deref(),
                role.as_str(),
                &created_at,
            ),
        )?;
        match &reg.fields {
            RoleFields::Student {
                date_of_birth,
                gender,
                level,
            } => {
                tx.execute(
                    "INSERT INTO students(id, user_id, level, gender, date_of_birth, is_active, created_at)
                     VALUES(?, ?, ?, ?, ?, 1, ?)",
                    (
                        Uuid::new_v4().to_string(),
                        &identity_id,
                        level.as_str(),
                        gender.as_str(),
                        date_of_birth,
                        &created_at,
                    ),
                )?;
            }
            RoleFields::Teacher {
                qualification,
                specialization,
            } => {
                let specialization = serde_json::to_string(specialization)
                    .unwrap_or_else(|_| "[]".to_string());
                tx.execute(
                    "INSERT INTO teachers(id, user_id, qualification, specialization, is_active, created_at)
                     VALUES(?, ?, ?, ?, 1, ?)",
                    (
                        Uuid::new_v4().to_string(),
                        &identity_id,
                        qualification,
                        &specialization,
                        &created_at,
                    ),
                )?;
            }
            RoleFields::Parent => {}
        }
        tx.commit()?;
        tracing::info!(identity = %identity_id, role = %role, "registered");

        let token = issue_token(conn, &identity_id)?;
        let profile = load_profile(conn, &identity_id)?;
        self.establish(
            conn,
            Identity {
                id: identity_id,
                email,
            },
            profile,
            token,
        )
    }

    /// Drops the persisted token (when a store is open) and clears the
    /// cached identity and profile.
    pub fn sign_out(&mut self, conn: Option<&Connection>) -> Result<(), AuthError> {
        if let (Some(conn), Some(token)) = (conn, self.token.as_deref()) {
            conn.execute(
                "DELETE FROM sessions WHERE token_hash = ?",
                [hash_token(token)],
            )?;
        }
        if let Some(id) = self.state.user_id() {
            tracing::info!(identity = %id, "signed out");
        }
        self.clear();
        Ok(())
    }

    fn clear(&mut self) {
        self.state.identity = None;
        self.state.profile = None;
        self.token = None;
    }

    /// Installs a new session. A different token already held is revoked
    /// first so only one stays restorable.
    fn establish(
        &mut self,
        conn: &Connection,
        identity: Identity,
        profile: Option<Profile>,
        token: String,
    ) -> Result<SignedIn, AuthError> {
        if let Some(held) = self.token.as_deref().filter(|held| *held != token) {
            conn.execute("DELETE FROM sessions WHERE token_hash = ?", [hash_token(held)])?;
        }
        self.state.identity = Some(identity.clone());
        self.state.profile = profile.clone();
        self.state.loading = false;
        self.token = Some(token.clone());
        let redirect = profile.as_ref().and_then(|p| p.role).map(Role::home_path);
        Ok(SignedIn {
            identity,
            profile,
            token,
            redirect,
        })
    }
}

/// Creates the first admin account. Admins are never self-registered, so
/// this only succeeds while the workspace has none.
pub fn bootstrap_admin(
    conn: &Connection,
    email: &str,
    password: &str,
    full_name: &str,
) -> Result<Identity, AuthError> {
    let existing: i64 = conn.query_row(
        "SELECT COUNT(*) FROM profiles WHERE role = 'admin'",
        [],
        |r| r.get(0),
    )?;
    if existing > 0 {
        return Err(AuthError::AdminExists);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(AuthError::Validation("Email is required".to_string()));
    }
    if email_taken(conn, &email)? {
        return Err(AuthError::EmailTaken);
    }

    let id = Uuid::new_v4().to_string();
    let created_at = now_stamp();
    let password_hash = hash_password(password)?;
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO identities(id, email, password_hash, created_at) VALUES(?, ?, ?, ?)",
        (&id, &email, &password_hash, &created_at),
    )?;
    tx.execute(
        "INSERT INTO profiles(id, full_name, email, phone, role, created_at)
         VALUES(?, ?, ?, NULL, 'admin', ?)",
        (&id, full_name.trim(), &email, &created_at),
    )?;
    tx.commit()?;
    tracing::info!(identity = %id, "admin account created");
    Ok(Identity { id, email })
}

pub fn load_profile(conn: &Connection, id: &str) -> Result<Option<Profile>, AuthError> {
    let profile = conn
        .query_row(
            "SELECT id, full_name, email, phone, role FROM profiles WHERE id = ?",
            [id],
            |r| {
                let role: String = r.get(4)?;
                Ok(Profile {
                    id: r.get(0)?,
                    full_name: r.get(1)?,
                    email: r.get(2)?,
                    phone: r.get(3)?,
                    role: Role::parse(&role),
                })
            },
        )
        .optional()?;
    Ok(profile)
}

fn load_identity(conn: &Connection, id: &str) -> Result<Option<Identity>, AuthError> {
    let identity = conn
        .query_row("SELECT id, email FROM identities WHERE id = ?", [id], |r| {
            Ok(Identity {
                id: r.get(0)?,
                email: r.get(1)?,
            })
        })
        .optional()?;
    Ok(identity)
}

fn email_taken(conn: &Connection, email: &str) -> Result<bool, AuthError> {
    let hit = conn
        .query_row("SELECT 1 FROM identities WHERE email = ?", [email], |r| {
            r.get::<_, i64>(0)
        })
        .optional()?;
    Ok(hit.is_some())
}

fn issue_token(conn: &Connection, identity_id: &str) -> Result<String, AuthError> {
    let token = Uuid::new_v4().simple().to_string();
    conn.execute(
        "INSERT INTO sessions(token_hash, identity_id, created_at) VALUES(?, ?, ?)",
        (hash_token(&token), identity_id, now_stamp()),
    )?;
    Ok(token)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn hash_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| AuthError::Hash(e.to_string()))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
