use axum::extract::{FromRequest, Request};
use axum::http::header::CONTENT_TYPE;

use crate::error::ApiError;

/// Name of the multipart field carrying the video file.
pub const FILE_FIELD: &str = "videoFile";

/// Maximum size of any field other than [`FILE_FIELD`].
pub const TEXT_FIELD_LIMIT: u64 = 64 * 1024; // 64 KiB

/// A streaming `multipart/form-data` request body.
///
/// Fields are read one at a time in the order the client sent them. A field must be fully
/// consumed or dropped before the next one can be read.
///
/// Text fields larger than [`TEXT_FIELD_LIMIT`] fail with
/// [`multer::Error::FieldSizeExceeded`]. The file field is streamed and is not limited here.
pub struct FormData(pub multer::Multipart<'static>);

impl std::fmt::Debug for FormData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormData").finish_non_exhaustive()
    }
}

impl<S> FromRequest<S> for FormData
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, _: &S) -> Result<Self, Self::Rejection> {
        let content_type = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .ok_or_else(|| ApiError::bad_request("expected valid Content-Type"))?;

        let mime = content_type
            .parse::<mime::Mime>()
            .map_err(|_| ApiError::bad_request("expected valid Content-Type"))?;
        if !(mime.type_() == mime::MULTIPART && mime.subtype() == mime::FORM_DATA) {
            return Err(ApiError::bad_request(
                "expected Content-Type: multipart/form-data",
            ));
        }

        let boundary = multer::parse_boundary(content_type)?;
        let multipart = multer::Multipart::with_constraints(
            request.into_body().into_data_stream(),
            boundary,
            multer::Constraints::new().size_limit(
                multer::SizeLimit::new()
                    .per_field(TEXT_FIELD_LIMIT)
                    .for_field(FILE_FIELD, u64::MAX),
            ),
        );
        Ok(Self(multipart))
    }
}
