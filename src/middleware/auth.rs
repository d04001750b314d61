use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use http::header::HeaderValue;
use http::Request as HttpRequest;
use http::Response as HttpResponse;
use http_body_util::combinators::UnsyncBoxBody;
use jsonwebtoken::{DecodingKey, Validation};
use sqlx::PgPool;
use tonic::Status;
use tower::{Layer, Service};
use uuid::Uuid;

use crate::services::auth_service::Claims;

/// Authenticated user info injected by the auth middleware into request extensions.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub is_admin: bool,
}

/// Paths reachable without a token. A valid token is still honoured on them.
const PUBLIC_PATHS: &[&str] = &[
    "/catalog.auth.AuthService/Register",
    "/catalog.auth.AuthService/Login",
    "/catalog.auth.AuthService/ValidateToken",
    "/catalog.inventory.InventoryService/ListCategories",
    "/catalog.inventory.InventoryService/ListInventories",
    "/catalog.inventory.InventoryService/GetInventory",
    "/catalog.inventory.InventoryService/PreviewCustomId",
    "/catalog.items.ItemService/ListItems",
    "/catalog.items.ItemService/GetItem",
    "/catalog.discussion.DiscussionService/ListPosts",
    "/catalog.search.SearchService/SearchUsers",
    "/catalog.search.SearchService/SearchInventories",
    "/catalog.search.SearchService/SearchTags",
    "/grpc.health.v1.Health/Check",
    "/grpc.health.v1.Health/Watch",
    "/grpc.reflection.v1.ServerReflection/ServerReflectionInfo",
    "/grpc.reflection.v1alpha.ServerReflection/ServerReflectionInfo",
];

pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.iter().any(|p| path == *p)
}

#[derive(Clone)]
pub struct AuthLayer {
    pool: PgPool,
    jwt_secret: String,
}

impl AuthLayer {
    pub fn new(pool: PgPool, jwt_secret: String) -> Self {
        Self { pool, jwt_secret }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            pool: self.pool.clone(),
            jwt_secret: self.jwt_secret.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    pool: PgPool,
    jwt_secret: String,
}

type BoxBody = UnsyncBoxBody<bytes::Bytes, Status>;

fn grpc_status_response(status: Status) -> HttpResponse<BoxBody> {
    let code = status.code() as i32;
    let message = status.message().to_string();

    let mut response = HttpResponse::new(UnsyncBoxBody::default());
    response.headers_mut().insert(
        "content-type",
        HeaderValue::from_static("application/grpc"),
    );
    response
        .headers_mut()
        .insert("grpc-status", HeaderValue::from(code));
    if !message.is_empty() {
        if let Ok(val) = HeaderValue::from_str(&message) {
            response.headers_mut().insert("grpc-message", val);
        }
    }
    response
}

/// Decodes a bearer token; `None` for missing, malformed or expired tokens.
pub fn decode_claims(authorization: Option<&str>, jwt_secret: &str) -> Option<Claims> {
    let token = authorization?.strip_prefix("Bearer ")?;
    jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

impl<S, ReqBody> Service<HttpRequest<ReqBody>> for AuthMiddleware<S>
where
    S: Service<HttpRequest<ReqBody>, Response = HttpResponse<BoxBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = HttpResponse<BoxBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: HttpRequest<ReqBody>) -> Self::Future {
        let mut inner = self.inner.clone();
        std::mem::swap(&mut self.inner, &mut inner);

        let pool = self.pool.clone();
        let jwt_secret = self.jwt_secret.clone();

        Box::pin(async move {
            let path = req.uri().path().to_string();
            let public = is_public_path(&path);

            let claims = decode_claims(
                req.headers()
                    .get("authorization")
                    .and_then(|v| v.to_str().ok()),
                &jwt_secret,
            );

            let user = match claims {
                Some(claims) => match load_user(&pool, &claims).await {
                    Ok(user) => user,
                    Err(e) => {
                        tracing::error!("Failed to load user {}: {}", claims.sub, e);
                        return Ok(grpc_status_response(Status::internal(
                            "Failed to load user",
                        )));
                    }
                },
                None => None,
            };

            match user {
                Some(user) => {
                    req.extensions_mut().insert(user);
                }
                None if !public => {
                    tracing::debug!("Rejecting unauthenticated call to {}", path);
                    return Ok(grpc_status_response(Status::unauthenticated(
                        "Authentication required",
                    )));
                }
                None => {}
            }

            inner.call(req).await
        })
    }
}

/// Resolves the token subject. Admin status comes from the database so that
/// revoking it takes effect before the token expires.
pub(crate) async fn load_user(pool: &PgPool, claims: &Claims) -> Result<Option<AuthenticatedUser>, sqlx::Error> {
    let Ok(user_id) = Uuid::parse_str(&claims.sub) else {
        return Ok(None);
    };

    let row: Option<(String, bool)> =
        sqlx::query_as("SELECT email, is_admin FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(email, is_admin)| AuthenticatedUser {
        user_id,
        email,
        is_admin,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, exp_offset: i64) -> String {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4().to_string(),
            email: "a@example.com".into(),
            adm: false,
            iat: now,
            exp: now + exp_offset,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn public_paths() {
        assert!(is_public_path("/catalog.auth.AuthService/Login"));
        assert!(is_public_path("/grpc.health.v1.Health/Check"));
        assert!(!is_public_path("/catalog.items.ItemService/CreateItem"));
        assert!(!is_public_path("/catalog.users.UserService/DeleteUsers"));
    }

    #[test]
    fn tagging_needs_a_signed_in_user() {
        assert!(is_public_path("/catalog.inventory.InventoryService/GetInventory"));
        assert!(!is_public_path("/catalog.inventory.InventoryService/AddTag"));
    }

    #[test]
    fn decodes_valid_bearer_token() {
        let header = format!("Bearer {}", token("s3cret", 3600));
        let claims = decode_claims(Some(&header), "s3cret").unwrap();
        assert_eq!(claims.email, "a@example.com");
    }

    #[test]
    fn rejects_bad_tokens() {
        let good = token("s3cret", 3600);
        assert!(decode_claims(None, "s3cret").is_none());
        assert!(decode_claims(Some(&good), "s3cret").is_none());
        assert!(decode_claims(Some(&format!("Bearer {}", good)), "other").is_none());
        let expired = format!("Bearer {}", token("s3cret", -3600));
        assert!(decode_claims(Some(&expired), "s3cret").is_none());
    }

    #[test]
    fn status_response_carries_code() {
        let response = grpc_status_response(Status::unauthenticated("Authentication required"));
        assert_eq!(response.headers()["grpc-status"], "16");
        assert_eq!(response.headers()["grpc-message"], "Authentication required");
    }
}
