//! Mutating admission webhook for Pods.
//!
//! On Pod creation the webhook makes sure every container and init container
//! carries the downward-API env vars of a [`MutationRules`] set, and that the
//! Pod's DNS config carries its resolver option. Existing values always win.
//!
//! ```no_run
//! use std::sync::Arc;
//! use podenv::{server, MutationRules};
//!
//! # async fn wrapper() -> Result<(), server::Error> {
//! let app = server::router(Arc::new(MutationRules::default()));
//! server::serve(app, ([0, 0, 0, 0], 8080).into()).await?;
//! # Ok(())
//! # }
//! ```
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod admission;
pub mod manifest;
pub mod server;

pub use podenv_core as core;
pub use podenv_core::MutationRules;
