use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "X-User-ID";

/// The user processing a payment, taken from the `X-User-ID` header set by
/// the trusted frontend.
#[derive(Debug, Clone, Copy)]
pub struct ProcessorId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for ProcessorId
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing X-User-ID header")))?;

        let user_id = Uuid::parse_str(raw.trim()).map_err(|_| {
            AppError::BadRequest(anyhow::anyhow!("X-User-ID must be a UUID, got '{}'", raw))
        })?;

        tracing::Span::current().record("user_id", tracing::field::display(user_id));

        Ok(ProcessorId(user_id))
    }
}
