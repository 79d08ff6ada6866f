use thiserror::Error;

pub type PrevuResult<T> = std::result::Result<T, PrevuError>;

/// Describes things that can go wrong in prevu
#[derive(Debug, Error)]
pub enum PrevuError {
  // general errors
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),

  // hyper errors
  #[error("hyper body manipulation error: {0}")]
  HyperBodyManipulationError(String),

  // upstream forwarder errors
  #[error("Failed to build upstream client: {0}")]
  FailedToBuildForwarder(String),
  #[error("Failed to fetch from upstream: {0}")]
  FailedToFetchFromUpstream(String),
  #[error("Redirect loop or broken redirect location: {0}")]
  BrokenRedirect(String),

  // handler errors
  #[error("Failed to build message handler: {0}")]
  FailedToBuildMessageHandler(#[from] crate::message_handler::HttpMessageHandlerBuilderError),
  #[error("Failed to build proxy: {0}")]
  FailedToBuildProxy(String),

  // Others
  #[error("Infallible")]
  Infallible(#[from] std::convert::Infallible),
}
