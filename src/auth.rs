use std::future::{ready, Ready};

use actix_web::{dev::Payload, http::header::HeaderMap, web, FromRequest, HttpRequest};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use uuid::Uuid;

use crate::{
    error::{Error, UploadError},
    error_code::ErrorCode,
};

#[derive(Debug, thiserror::Error)]
pub(crate) enum AuthError {
    #[error("No authorization header included")]
    MissingHeader,

    #[error("Malformed authorization header")]
    MalformedHeader,

    #[error("Invalid token")]
    Token(#[source] jsonwebtoken::errors::Error),

    #[error("Token subject is not a user id")]
    Subject(#[source] uuid::Error),

    #[error("Token validation is not configured")]
    Unconfigured,
}

impl AuthError {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        match self {
            Self::MissingHeader | Self::MalformedHeader => ErrorCode::MISSING_TOKEN,
            Self::Token(_) | Self::Subject(_) => ErrorCode::INVALID_TOKEN,
            Self::Unconfigured => ErrorCode::UNKNOWN_ERROR,
        }
    }

    pub(crate) const fn is_server_error(&self) -> bool {
        matches!(self, Self::Unconfigured)
    }
}

/// Pull the token out of an `Authorization: Bearer <token>` header
pub(crate) fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get(actix_web::http::header::AUTHORIZATION)
        .ok_or(AuthError::MissingHeader)?
        .to_str()
        .map_err(|_| AuthError::MalformedHeader)?;

    if header.is_empty() {
        return Err(AuthError::MissingHeader);
    }

    match header.strip_prefix("Bearer ") {
        Some(token) if !token.is_empty() && !token.contains(' ') => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}

#[derive(serde::Deserialize)]
struct Claims {
    sub: String,
}

/// Validates HS256 access tokens issued for tubely
#[derive(Clone)]
pub(crate) struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for JwtValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtValidator")
            .field("issuer", &self.validation.iss)
            .finish()
    }
}

impl JwtValidator {
    pub(crate) fn new(secret: &str, issuer: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.leeway = 0;

        JwtValidator {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Returns the id of the user the token was issued to
    pub(crate) fn validate(&self, token: &str) -> Result<Uuid, AuthError> {
        let data = jsonwebtoken::decode::<Claims>(token, &self.key, &self.validation)
            .map_err(AuthError::Token)?;

        Uuid::parse_str(&data.claims.sub).map_err(AuthError::Subject)
    }
}

/// The user id from a validated bearer token
#[derive(Clone, Copy, Debug)]
pub(crate) struct Authenticated(pub(crate) Uuid);

fn authenticate(req: &HttpRequest) -> Result<Authenticated, AuthError> {
    let validator = req
        .app_data::<web::Data<JwtValidator>>()
        .ok_or(AuthError::Unconfigured)?;

    let token = bearer_token(req.headers())?;

    validator.validate(token).map(Authenticated)
}

impl FromRequest for Authenticated {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let res = authenticate(req).map_err(|e| {
            tracing::debug!("Rejected request: {e}");
            Error::from(UploadError::Auth(e))
        });

        ready(res)
    }
}

#[cfg(test)]
mod tests {
    use actix_web::http::header::{HeaderMap, HeaderValue, AUTHORIZATION};
    use jsonwebtoken::{EncodingKey, Header};
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::{bearer_token, AuthError, JwtValidator};

    const SECRET: &str = "correct horse battery staple";
    const ISSUER: &str = "tubely-access";

    fn token(secret: &str, issuer: &str, subject: &str, expires_in: i64) -> String {
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let claims = serde_json::json!({
            "iss": issuer,
            "sub": subject,
            "iat": now,
            "exp": now + expires_in,
        });

        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("Encoded token")
    }

    fn headers(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn extracts_bearer_token() {
        let headers = headers("Bearer abc.def.ghi");

        assert_eq!(bearer_token(&headers).expect("Token"), "abc.def.ghi");
    }

    #[test]
    fn missing_header() {
        let headers = HeaderMap::new();
        let res = bearer_token(&headers);

        assert!(matches!(res, Err(AuthError::MissingHeader)));
    }

    #[test]
    fn malformed_header() {
        for value in [
            "Bearer",
            "Basic abc",
            "Bearer ",
            "bearer abc",
            "abc",
            "Bearer a b",
            "Bearer  abc",
            "Bearer abc ",
        ] {
            let headers = headers(value);
            let res = bearer_token(&headers);

            assert!(matches!(res, Err(AuthError::MalformedHeader)), "{value}");
        }
    }

    #[test]
    fn valid_token() {
        let user_id = Uuid::new_v4();
        let validator = JwtValidator::new(SECRET, ISSUER);

        let token = token(SECRET, ISSUER, &user_id.to_string(), 3600);

        assert_eq!(validator.validate(&token).expect("Valid token"), user_id);
    }

    #[test]
    fn expired_token() {
        let validator = JwtValidator::new(SECRET, ISSUER);

        let token = token(SECRET, ISSUER, &Uuid::new_v4().to_string(), -3600);

        assert!(matches!(
            validator.validate(&token),
            Err(AuthError::Token(_))
        ));
    }

    #[test]
    fn wrong_secret() {
        let validator = JwtValidator::new(SECRET, ISSUER);

        let token = token("hunter2", ISSUER, &Uuid::new_v4().to_string(), 3600);

        assert!(matches!(
            validator.validate(&token),
            Err(AuthError::Token(_))
        ));
    }

    #[test]
    fn wrong_issuer() {
        let validator = JwtValidator::new(SECRET, ISSUER);

        let token = token(SECRET, "someone-else", &Uuid::new_v4().to_string(), 3600);

        assert!(matches!(
            validator.validate(&token),
            Err(AuthError::Token(_))
        ));
    }

    #[test]
    fn subject_not_uuid() {
        let validator = JwtValidator::new(SECRET, ISSUER);

        let token = token(SECRET, ISSUER, "not-a-user", 3600);

        assert!(matches!(
            validator.validate(&token),
            Err(AuthError::Subject(_))
        ));
    }
}
