use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::header::RANGE;
use axum::http::request::Parts;
use clipstore_service::chunks::ByteRange;

/// The single byte range requested via the `Range` header, if any.
///
/// Headers that are malformed, use a unit other than `bytes` or request multiple ranges are
/// ignored, and the full object is served instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeHeader(pub Option<ByteRange>);

impl<S> FromRequestParts<S> for RangeHeader
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _: &S) -> Result<Self, Self::Rejection> {
        let range = parts
            .headers
            .get(RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_range);

        Ok(Self(range))
    }
}

fn parse_range(header: &str) -> Option<ByteRange> {
    let range_spec = header.trim().strip_prefix("bytes=")?.trim();
    if range_spec.contains(',') {
        return None;
    }

    let (start, end) = range_spec.split_once('-')?;
    let (start, end) = (start.trim(), end.trim());

    let range = match (start.is_empty(), end.is_empty()) {
        (false, false) => ByteRange::Bounded(start.parse().ok()?, end.parse().ok()?),
        (false, true) => ByteRange::From(start.parse().ok()?),
        (true, false) => ByteRange::Suffix(end.parse().ok()?),
        (true, true) => return None,
    };

    Some(range)
}
