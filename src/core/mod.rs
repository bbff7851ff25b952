pub mod backend;
pub mod circuit_breaker;
pub mod fallback;
pub mod forwarder;
pub mod gateway;
pub mod router;

pub use backend::{BackendError, BackendRegistry, BackendUrl, ServiceTarget};
pub use circuit_breaker::{
    Admission, BreakerSettings, BreakerSnapshot, BreakerStatus, CircuitBreaker, CircuitBreakers,
};
pub use forwarder::{ErrorKind, ForwardOutcome, ForwardResult, Forwarder};
pub use gateway::{GatewayError, GatewayService};
pub use router::{Route, RouteKind, RouteTable};
