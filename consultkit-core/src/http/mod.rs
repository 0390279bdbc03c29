//! Outbound API calls.
//!
//! Every backend call goes through the [`RequestPipeline`], driven by the
//! declarative [`EndpointId`] catalog: the descriptor decides the method, the
//! parameter encoding and whether the session's `Authorization` header is
//! attached.

mod encoding;
mod endpoint;
mod pipeline;
mod request;

pub use encoding::{encode_form, encode_json, encode_query, Parameters};
pub use endpoint::{ContentType, EndpointDescriptor, EndpointId, Route};
pub use pipeline::{AuthHeaderSource, RequestPipeline};
