//! Core types and traits for the odata-exec request pipeline.
//!
//! This crate provides the foundational types used by odata-exec:
//! - [`Method`] - HTTP method enum
//! - [`RequestDescriptor`] and [`RequestDescriptorBuilder`] - one call to execute
//! - [`HeaderCollection`] - caller-supplied, case-insensitive, multi-valued headers
//! - [`Credentials`] - credential material handed to the transport
//! - [`Response`] - raw response with an unread body
//! - [`Session`] - caller hooks shared across requests
//! - [`Transport`] and [`MakeTransport`] - per-request transport abstraction
//! - [`Error`], [`TransportFault`] and [`Result`] - error handling
//! - [`StatusCode`] - HTTP status codes (re-exported from `http` crate)
//! - [`header`] - HTTP header names (re-exported from `http` crate)

mod credentials;
mod error;
mod headers;
mod method;
pub mod prelude;
mod request;
mod response;
mod session;
mod transport;

pub use credentials::Credentials;
pub use error::{BoxError, Error, Result, TransportErrorKind, TransportFault};
pub use headers::HeaderCollection;
pub use method::Method;
pub use request::{RequestDescriptor, RequestDescriptorBuilder, RequestParts};
pub use response::{BoxBody, Response};
pub use session::{AfterResponseHook, BeforeRequestHook, ConfigureTransportHook, Session};
pub use transport::{MakeTransport, MakeTransportFn, Transport, make_transport_fn};

// Re-export http crate types for status codes and headers
pub use http::{StatusCode, header};
