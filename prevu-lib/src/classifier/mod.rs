mod challenge;
mod expectation;
mod inbound;
mod origin;

pub use challenge::{classify_response, looks_like_html, BlockReason, ChallengeVerdict};
pub use expectation::{ContentExpectation, ContentKind};
pub use inbound::{classify_path, repair_chunk_path, PathClass};
pub use origin::resolve_target_origin;
