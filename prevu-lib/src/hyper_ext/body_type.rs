use bytes::Bytes;
use http_body_util::{combinators, BodyExt, Empty, Full};

/// Type for synthetic boxed body. Every response leaving this proxy is fully
/// buffered before transformation, so a boxed full/empty body suffices.
pub(crate) type BoxBody = combinators::BoxBody<Bytes, hyper::Error>;

/// helper function to build a empty body
pub(crate) fn empty() -> BoxBody {
  Empty::<Bytes>::new().map_err(|never| match never {}).boxed()
}

/// helper function to build a full body
pub(crate) fn full(body: Bytes) -> BoxBody {
  Full::new(body).map_err(|never| match never {}).boxed()
}
