//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types
//! for easy glob importing:
//!
//! ```ignore
//! use odata_exec::prelude::*;
//! ```

pub use crate::{
    CancellationToken, Credentials, Error, HyperTransport, HyperTransportFactory, Method,
    RequestDescriptor, RequestRunner, Response, Result, Session, StatusCode, TransportConfig,
    TransportErrorKind, Url, header,
};
