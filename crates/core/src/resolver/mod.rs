//! Episode and stream resolution.

mod episodes;
mod inflight;
mod stream;
mod types;

pub use episodes::EpisodeResolver;
pub use inflight::InFlight;
pub use stream::StreamResolver;
pub use types::{ResolutionPath, StreamRequest, StreamResolution};
