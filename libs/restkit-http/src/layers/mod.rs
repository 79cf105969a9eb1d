//! Tower layers for the transport stack
//!
//! - [`DefaultHeadersLayer`] - Adds User-Agent and client-wide static headers

mod default_headers;

pub use default_headers::{DefaultHeadersLayer, DefaultHeadersService};
