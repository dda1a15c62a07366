pub mod client;
pub mod error;
pub mod reqwest_transport;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use client::{normalize_base_url, ApiClient, ApiResponse, RequestOptions};
pub use error::ApiError;
pub use reqwest_transport::ReqwestTransport;
pub use transport::{
    FilePart, HttpRequest, HttpResponse, HttpTransport, Method, MultipartForm, RequestBody,
    TransportError,
};
