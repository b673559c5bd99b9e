//! Request extractors for clipstore types.

mod form;
mod id;
mod json;
mod range;

pub use form::{FILE_FIELD, FormData, TEXT_FIELD_LIMIT};
pub use json::JsonBody;
pub use range::RangeHeader;

/// An extractor for a remote type.
///
/// This is a helper type that allows extracting a type `T` from a request, where `T` is defined
/// in another crate. There must be an implementation of `FromRequestParts` or `FromRequest` for
/// `Xt<T>` for this to work.
#[derive(Debug)]
pub struct Xt<T>(pub T);
