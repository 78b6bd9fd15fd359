//! Talking to package sources: the session wrapper, the page parsers and the link
//! collector.

mod collector;
pub mod html;
mod http;

pub use collector::{CollectError, CollectedLink, LinkCollector, Source};
pub use http::{Http, HttpError, HttpResponse};
