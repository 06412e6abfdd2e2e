//! Ports (traits at the transport seam).

pub mod transport;

pub use transport::{
    Headers, HttpMethod, HttpRequest, HttpResponse, HttpTransport, TransportError, VersionObserver,
};
