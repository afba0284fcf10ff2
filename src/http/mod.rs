pub mod client;
pub mod request;
pub mod response;
pub mod transport;
pub mod types;

// Re-export commonly used types for convenient access
pub use client::{HttpTransport, SuiteClient};
pub use request::{OutboundRequest, RequestBody, UploadSpec};
pub use response::CallResponse;
pub use transport::{Transport, TransportError};
pub use types::Method;
