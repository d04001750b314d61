use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tonic::{Request, Response, Status};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::{decode_claims, load_user};
use crate::middleware::AuthenticatedUser;
use crate::models::normalize_email;
use crate::proto::auth::auth_service_server::AuthService;
use crate::proto::auth::{
    AuthResponse, LoginRequest, RegisterRequest, ValidateTokenRequest, ValidateTokenResponse,
};

pub const MIN_PASSWORD_LEN: usize = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: String,
    /// Admin flag at issue time. The middleware re-reads it from the database.
    #[serde(default)]
    pub adm: bool,
    pub iat: i64,
    pub exp: i64,
}

/// Token check result. Identity and admin flag come from the stored user,
/// so a revoked admin or a deleted account is reported as it is now.
fn validation_response(claims: &Claims, user: Option<&AuthenticatedUser>) -> ValidateTokenResponse {
    match user {
        Some(user) => ValidateTokenResponse {
            valid: true,
            user_id: user.user_id.to_string(),
            email: user.email.clone(),
            is_admin: user.is_admin,
            expires_at: Utc
                .timestamp_opt(claims.exp, 0)
                .single()
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
        },
        None => invalid_token(),
    }
}

fn invalid_token() -> ValidateTokenResponse {
    ValidateTokenResponse {
        valid: false,
        user_id: String::new(),
        email: String::new(),
        is_admin: false,
        expires_at: String::new(),
    }
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal("Invalid password hash in database".to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

pub struct AuthServiceImpl {
    pool: PgPool,
    jwt_secret: String,
    ttl_hours: i64,
}

impl AuthServiceImpl {
    pub fn new(pool: PgPool, jwt_secret: String, ttl_hours: i64) -> Self {
        Self {
            pool,
            jwt_secret,
            ttl_hours,
        }
    }

    fn issue_jwt(&self, user_id: Uuid, email: &str, is_admin: bool) -> Result<(String, DateTime<Utc>), Status> {
        let now = Utc::now();
        let exp = now + chrono::Duration::hours(self.ttl_hours);
        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            adm: is_admin,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| Status::internal(format!("JWT error: {}", e)))?;
        Ok((token, exp))
    }

    fn auth_response(&self, user_id: Uuid, email: &str, is_admin: bool) -> Result<AuthResponse, Status> {
        let (token, exp) = self.issue_jwt(user_id, email, is_admin)?;
        Ok(AuthResponse {
            token,
            expires_at: exp.to_rfc3339(),
            user_id: user_id.to_string(),
            is_admin,
        })
    }
}

#[tonic::async_trait]
impl AuthService for AuthServiceImpl {
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<AuthResponse>, Status> {
        let req = request.into_inner();

        let email = req.email.trim().to_string();
        let first_name = req.first_name.trim().to_string();
        if email.is_empty() || !email.contains('@') {
            return Err(Status::invalid_argument("A valid email is required"));
        }
        if first_name.is_empty() {
            return Err(Status::invalid_argument("First name is required"));
        }
        if req.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Status::invalid_argument("Password is required"));
        }
        let last_name = Some(req.last_name.trim().to_string()).filter(|s| !s.is_empty());

        let password_hash = hash_password(&req.password)?;

        let (user_id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO users (email, normalized_email, password_hash, first_name, last_name)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id",
        )
        .bind(&email)
        .bind(normalize_email(&email))
        .bind(&password_hash)
        .bind(&first_name)
        .bind(&last_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::AlreadyExists(_) => Status::already_exists("Email is already registered"),
            other => other.into(),
        })?;

        tracing::info!("Registered user {}", user_id);
        Ok(Response::new(self.auth_response(user_id, &email, false)?))
    }

    async fn login(
        &self,
        request: Request<LoginRequest>,
    ) -> Result<Response<AuthResponse>, Status> {
        let req = request.into_inner();

        if req.email.trim().is_empty() || req.password.is_empty() {
            return Err(Status::invalid_argument("email and password are required"));
        }

        let row: Option<(Uuid, String, String, bool)> = sqlx::query_as(
            "SELECT id, email, password_hash, is_admin FROM users WHERE normalized_email = $1",
        )
        .bind(normalize_email(&req.email))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Status::internal(format!("Database error: {}", e)))?;

        let (user_id, email, password_hash, is_admin) =
            row.ok_or_else(|| Status::unauthenticated("Invalid credentials"))?;

        if !verify_password(&req.password, &password_hash)? {
            return Err(Status::unauthenticated("Invalid credentials"));
        }

        Ok(Response::new(self.auth_response(user_id, &email, is_admin)?))
    }

    async fn validate_token(
        &self,
        request: Request<ValidateTokenRequest>,
    ) -> Result<Response<ValidateTokenResponse>, Status> {
        let req = request.into_inner();
        let header = format!("Bearer {}", req.token);

        let response = match decode_claims(Some(&header), &self.jwt_secret) {
            Some(claims) => {
                let user = load_user(&self.pool, &claims).await.map_err(AppError::from)?;
                validation_response(&claims, user.as_ref())
            }
            None => invalid_token(),
        };
        Ok(Response::new(response))
    }
}
