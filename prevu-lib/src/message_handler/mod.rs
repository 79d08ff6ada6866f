mod handler_main;
mod http_result;
mod synthetic_response;
mod utils_headers;
mod utils_request;

pub use handler_main::{HttpMessageHandler, HttpMessageHandlerBuilder, HttpMessageHandlerBuilderError};
