//! Client-less Pod mutation for the podenv admission webhook.
//!
//! This crate holds the pure part of the webhook: the immutable [`MutationRules`]
//! and the functions that apply them to a [`Pod`](k8s_openapi::api::core::v1::Pod).
//! It knows nothing about HTTP or `AdmissionReview`s; those live in the `podenv` crate.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod mutate;
pub use mutate::{mutate_pod, mutated};

pub mod rules;
pub use rules::MutationRules;

mod error;
pub use error::Error;

/// Convient alias for `Result<T, Error>`
pub type Result<T, E = Error> = std::result::Result<T, E>;
