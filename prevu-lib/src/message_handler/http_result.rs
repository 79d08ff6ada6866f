use crate::{classifier::ContentExpectation, policy::PolicyRejection};
use http::StatusCode;
use thiserror::Error;

/// HTTP result type, T is typically a hyper::Response.
/// HttpError is used to generate a synthetic error response.
pub(crate) type HttpResult<T> = std::result::Result<T, HttpError>;

/// Describes things that can go wrong while serving a single request. Every
/// variant terminates in a well-formed response carrying a reason code.
#[derive(Debug, Error)]
pub(crate) enum HttpError {
  #[error("Method not allowed")]
  MethodNotAllowed,
  #[error("Missing url query parameter")]
  MissingUrlParameter,
  #[error("{0}")]
  PolicyRejected(#[from] PolicyRejection),
  #[error("Not handled by the proxy")]
  PassThrough,
  #[error("Failed to fetch {target}: {message}")]
  UpstreamFailed {
    target: String,
    message: String,
    expectation: ContentExpectation,
  },
  #[error("Failed to read upstream body: {message}")]
  UpstreamBodyRead {
    message: String,
    expectation: ContentExpectation,
  },
  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

impl HttpError {
  pub(crate) fn status(&self) -> StatusCode {
    match self {
      Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
      Self::MissingUrlParameter => StatusCode::BAD_REQUEST,
      Self::PolicyRejected(rejection) => rejection.status(),
      Self::PassThrough => StatusCode::NOT_FOUND,
      Self::UpstreamFailed { .. } | Self::UpstreamBodyRead { .. } => StatusCode::BAD_GATEWAY,
      Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  pub(crate) fn reason_code(&self) -> &'static str {
    match self {
      Self::MethodNotAllowed => "method_not_allowed",
      Self::MissingUrlParameter => "missing_url",
      Self::PolicyRejected(rejection) => rejection.reason_code(),
      Self::PassThrough => "pass_through",
      Self::UpstreamFailed { .. } | Self::UpstreamBodyRead { .. } => "upstream_failure",
      Self::Other(_) => "internal_error",
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn statuses_follow_the_taxonomy() {
    assert_eq!(HttpError::MissingUrlParameter.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
      HttpError::PolicyRejected(PolicyRejection::HostNotAllowed("x".into())).status(),
      StatusCode::BAD_REQUEST
    );
    assert_eq!(
      HttpError::PolicyRejected(PolicyRejection::DomainBlocklist("x".into())).status(),
      StatusCode::FORBIDDEN
    );
    assert_eq!(HttpError::MethodNotAllowed.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(HttpError::PassThrough.status(), StatusCode::NOT_FOUND);
  }

  #[test]
  fn reason_codes_are_stable() {
    assert_eq!(HttpError::MissingUrlParameter.reason_code(), "missing_url");
    assert_eq!(
      HttpError::PolicyRejected(PolicyRejection::HostNotAllowed("x".into())).reason_code(),
      "host_not_allowed"
    );
  }
}
