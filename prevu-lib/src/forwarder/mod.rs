mod client;

pub use client::{ForwardRequest, Forwarder};
