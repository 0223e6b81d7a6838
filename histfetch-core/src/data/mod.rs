//! Data source access, batch orchestration, and result shaping

pub mod combine;
pub mod credentials;
pub mod download;
pub mod parse;
pub mod progress;
pub mod provider;
pub mod throttle;
pub mod transport;
pub mod yahoo;

pub use combine::{CombinedTable, GroupBy, Point, SeriesKey};
pub use credentials::{extract_crumb, Clock, CredentialCache, Credentials, SystemClock};
pub use download::{
    BatchDownloader, Download, DownloadOptions, DownloadReport, PriceData, TickerOutcome,
    TickerState, PROVIDER_NAME,
};
pub use parse::parse_ticker_csv;
pub use progress::{DownloadProgress, NoProgress, ProgressBar};
pub use provider::{BatchError, DataProvider, FetchError, ProviderRegistry};
pub use throttle::Throttle;
pub use transport::{HttpResponse, HttpTransport, ReqwestTransport};
pub use yahoo::TickerFetcher;
