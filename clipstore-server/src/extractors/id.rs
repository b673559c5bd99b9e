use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use clipstore_service::id::{ObjectId, RecordId};

use crate::error::ApiError;
use crate::extractors::Xt;

/// Extracts the record id from the single path parameter. Malformed ids are bad requests.
impl<S> FromRequestParts<S> for Xt<RecordId>
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

        let id = raw
            .parse()
            .map_err(|_| ApiError::bad_request(format!("invalid record id {raw:?}")))?;
        Ok(Xt(id))
    }
}

/// Extracts the object id from the single path parameter.
///
/// A malformed object id cannot refer to a stored video, so it is reported as not found.
impl<S> FromRequestParts<S> for Xt<ObjectId>
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|_| ApiError::NotFound)?;

        let id = raw.parse().map_err(|_| ApiError::NotFound)?;
        Ok(Xt(id))
    }
}
