//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types
//! for easy glob importing:
//!
//! ```ignore
//! use odata_exec_core::prelude::*;
//! ```

pub use crate::{
    Credentials, Error, HeaderCollection, MakeTransport, Method, RequestDescriptor, Response,
    Result, Session, StatusCode, Transport, TransportErrorKind, TransportFault,
};
