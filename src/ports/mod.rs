pub mod clock;
pub mod http_client;

pub use clock::{Clock, ManualClock, SystemClock};
pub use http_client::{HttpClient, HttpClientError, HttpClientResult};
