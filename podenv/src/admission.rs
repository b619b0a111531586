//! Turning an `AdmissionReview` for a Pod into a patch response.
//!
//! Only `CREATE` requests for the core `Pod` kind are mutated; everything else is
//! allowed untouched. The patch is the JSON diff between the decoded Pod and
//! the Pod after [`mutate_pod`] ran on it.
use k8s_openapi::api::core::v1::Pod;
use kube::core::{
    admission::{
        AdmissionRequest, AdmissionResponse, AdmissionReview, Operation, SerializePatchError,
    },
    dynamic::ParseDynamicObjectError,
    response::Status,
    DynamicObject,
};
use podenv_core::{mutate_pod, MutationRules};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Kind of the objects this webhook mutates
pub const POD_KIND: &str = "Pod";

/// Failures while handling an admission request
#[derive(Debug, Error)]
pub enum Error {
    /// The request carried no object
    #[error("admission request has no object")]
    MissingObject,

    /// The embedded object could not be decoded into a Pod
    #[error("failed to decode Pod: {0}")]
    DecodePod(#[source] ParseDynamicObjectError),

    /// A Pod could not be encoded back to JSON
    #[error("failed to encode Pod: {0}")]
    EncodePod(#[source] serde_json::Error),

    /// The computed patch could not be serialized
    #[error("failed to serialize patch: {0}")]
    SerializePatch(#[source] SerializePatchError),
}

impl Error {
    /// HTTP-style status code reported in the admission response
    pub fn code(&self) -> u16 {
        match self {
            Error::MissingObject | Error::DecodePod(_) => 400,
            Error::EncodePod(_) | Error::SerializePatch(_) => 500,
        }
    }

    /// Machine-readable reason reported in the admission response
    pub fn reason(&self) -> &'static str {
        match self.code() {
            400 => "BadRequest",
            _ => "InternalError",
        }
    }
}

/// Handle a full `AdmissionReview`, always producing a response
///
/// A review without a request gets an [`AdmissionResponse::invalid`] response.
pub fn review(rules: &MutationRules, review: AdmissionReview<DynamicObject>) -> AdmissionResponse {
    let req: AdmissionRequest<DynamicObject> = match review.try_into() {
        Ok(req) => req,
        Err(err) => {
            warn!("invalid review: {err}");
            return AdmissionResponse::invalid(err);
        }
    };
    match mutate(rules, &req) {
        Ok(res) => res,
        Err(err) => {
            warn!(uid = %req.uid, code = err.code(), "mutate failed: {err}");
            errored(&req, &err)
        }
    }
}

/// Mutate the Pod in `req`, returning the patch response
///
/// Requests for kinds other than the core group `Pod`, and operations other
/// than `CREATE`, are allowed without a patch.
pub fn mutate(
    rules: &MutationRules,
    req: &AdmissionRequest<DynamicObject>,
) -> Result<AdmissionResponse, Error> {
    let res = AdmissionResponse::from(req);
    if !req.kind.group.is_empty() || req.kind.kind != POD_KIND {
        debug!(uid = %req.uid, group = %req.kind.group, kind = %req.kind.kind, "not a pod, skipping");
        return Ok(res);
    }
    if req.operation != Operation::Create {
        debug!(uid = %req.uid, operation = ?req.operation, "not a create, skipping");
        return Ok(res);
    }

    let obj = req.object.clone().ok_or(Error::MissingObject)?;
    let pod: Pod = obj.try_parse().map_err(Error::DecodePod)?;
    let original = serde_json::to_value(&pod).map_err(Error::EncodePod)?;

    let mut pod = pod;
    mutate_pod(rules, &mut pod);
    let mutated = serde_json::to_value(&pod).map_err(Error::EncodePod)?;

    let patch = json_patch::diff(&original, &mutated);
    if patch.0.is_empty() {
        info!(uid = %req.uid, name = %req.name, namespace = ?req.namespace, "pod already mutated");
        return Ok(res);
    }
    info!(
        uid = %req.uid,
        name = %req.name,
        namespace = ?req.namespace,
        dry_run = req.dry_run,
        ops = patch.0.len(),
        "patching pod"
    );
    res.with_patch(patch).map_err(Error::SerializePatch)
}

/// Reject `req` with the status code and reason of `err`
pub fn errored(req: &AdmissionRequest<DynamicObject>, err: &Error) -> AdmissionResponse {
    let mut res = AdmissionResponse::from(req);
    res.allowed = false;
    res.result = Status::failure(&err.to_string(), err.reason()).with_code(err.code());
    res
}
