pub mod fetcher;
pub mod rate;
pub mod tor;

pub use fetcher::{DocumentFetcher, HttpFetcher};
pub use rate::RateGovernor;
pub use tor::{TorTransport, TransportController, TransportStatus};
