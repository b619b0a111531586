//! Registration of the webhook with the API server.
use k8s_openapi::{
    api::admissionregistration::v1::{
        MutatingWebhook, MutatingWebhookConfiguration, RuleWithOperations, ServiceReference,
        WebhookClientConfig,
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
    ByteString,
};

use crate::server::MUTATE_PATH;

/// Where the platform should reach the webhook
#[derive(Clone, Debug)]
pub struct ManifestParams {
    /// Fully qualified webhook name, also used as the configuration name
    pub name: String,
    /// Name of the Service in front of the webhook
    pub service: String,
    /// Namespace of the Service
    pub namespace: String,
    /// Port of the Service
    pub port: i32,
    /// PEM encoded CA bundle the API server verifies the webhook with
    pub ca_bundle: Option<Vec<u8>>,
}

impl Default for ManifestParams {
    fn default() -> Self {
        Self {
            name: "pod-env.podenv.dev".into(),
            service: "podenv".into(),
            namespace: "podenv-system".into(),
            port: 443,
            ca_bundle: None,
        }
    }
}

/// Build the `MutatingWebhookConfiguration` for Pod creation
///
/// The webhook fails closed, has no side effects on dry-run and only
/// receives `CREATE` requests for v1 Pods.
pub fn webhook_configuration(params: &ManifestParams) -> MutatingWebhookConfiguration {
    MutatingWebhookConfiguration {
        metadata: ObjectMeta {
            name: Some(params.name.clone()),
            ..Default::default()
        },
        webhooks: Some(vec![MutatingWebhook {
            name: params.name.clone(),
            admission_review_versions: vec!["v1".into()],
            client_config: WebhookClientConfig {
                ca_bundle: params.ca_bundle.clone().map(ByteString),
                service: Some(ServiceReference {
                    name: params.service.clone(),
                    namespace: params.namespace.clone(),
                    path: Some(MUTATE_PATH.into()),
                    port: Some(params.port),
                }),
                ..Default::default()
            },
            failure_policy: Some("Fail".into()),
            side_effects: "NoneOnDryRun".into(),
            rules: Some(vec![RuleWithOperations {
                api_groups: strings(&[""]),
                api_versions: strings(&["v1"]),
                operations: strings(&["CREATE"]),
                resources: strings(&["pods"]),
                ..Default::default()
            }]),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn strings(s: &[&str]) -> Option<Vec<String>> {
    Some(s.iter().map(|s| (*s).to_owned()).collect())
}

/// Render the configuration as a YAML document
pub fn to_yaml(params: &ManifestParams) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(&webhook_configuration(params))
}
