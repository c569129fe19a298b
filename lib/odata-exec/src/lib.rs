//! Single-request execution pipeline for OData clients.
//!
//! [`RequestRunner`] takes a prepared [`RequestDescriptor`], builds a
//! fresh transport for it, applies the OData headers and the caller's
//! [`Session`] hooks, dispatches it under a [`CancellationToken`], and
//! hands back the raw [`Response`] or a classified [`Error`].
//!
//! # Example
//!
//! ```ignore
//! use odata_exec::prelude::*;
//!
//! let runner = RequestRunner::new(HyperTransportFactory::default(), Session::new());
//!
//! let url = Url::parse("https://services.odata.org/V4/Northwind/Northwind.svc/Products(1)")?;
//! let request = RequestDescriptor::builder(Method::Get, url)
//!     .accept("application/json;odata.metadata=minimal")
//!     .build()?;
//!
//! let product: serde_json::Value = runner.execute(request).await?.json().await?;
//! ```

mod config;
mod connector;
pub mod prelude;
mod runner;
mod transport;

// Re-export execution types
pub use config::{TransportConfig, TransportConfigBuilder};
pub use connector::{default_tls_config, https_connector};
pub use runner::{RequestRunner, ServiceFuture, TransportBody};
pub use transport::{HyperTransport, HyperTransportFactory};

// Re-export tower for middleware composition
pub use tower;

// Re-export the cancellation primitive
pub use tokio_util::sync::CancellationToken;

// Re-export core types
pub use odata_exec_core::{
    AfterResponseHook, BeforeRequestHook, BoxBody, BoxError, ConfigureTransportHook, Credentials,
    Error, HeaderCollection, MakeTransport, MakeTransportFn, Method, RequestDescriptor,
    RequestDescriptorBuilder, RequestParts, Response, Result, Session, Transport,
    TransportErrorKind, TransportFault, make_transport_fn,
};

// Re-export http types for status codes and headers
pub use odata_exec_core::{StatusCode, header};

pub use url::{self, Url};
