//! Source resolution, host guard and fetching

pub mod fetch;
pub mod guard;
pub mod resolve;

pub use fetch::{Fetcher, SourceFetcher};
pub use guard::HostGuard;
pub use resolve::{Location, SourceDescriptor, SourceResolver};
