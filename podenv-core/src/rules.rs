//! The immutable rule set applied to every admitted Pod.
use std::{fs, path::Path};

use k8s_openapi::api::core::v1::{EnvVar, EnvVarSource, ObjectFieldSelector, PodDNSConfigOption};
use serde::Deserialize;

use crate::{Error, Result};

/// Name of the variable exposing the node the Pod is scheduled on
pub const WORKER_NAME: &str = "K8S_WORKER_NAME";
/// Name of the variable exposing the Pod name
pub const POD_NAME: &str = "K8S_POD_NAME";
/// Name of the variable exposing the Pod namespace
pub const POD_NAMESPACE: &str = "K8S_POD_NAMESPACE";
/// Name of the variable exposing the Pod IP
pub const POD_IP: &str = "K8S_POD_IP";
/// Name of the variable exposing the host IP of the node
pub const WORKER_IP: &str = "K8S_WORKER_IP";

/// Resolver option retrying on a fresh socket when a single UDP request fails
pub const SINGLE_REQUEST_REOPEN: &str = "single-request-reopen";

/// Rules for mutating admitted Pods.
///
/// Built once at startup and shared read-only between requests.
/// The [`Default`] value is the canonical rule set:
///
/// | name                | fieldPath            |
/// |---------------------|----------------------|
/// | `K8S_WORKER_NAME`   | `spec.nodeName`      |
/// | `K8S_POD_NAME`      | `metadata.name`      |
/// | `K8S_POD_NAMESPACE` | `metadata.namespace` |
/// | `K8S_POD_IP`        | `status.podIP`       |
/// | `K8S_WORKER_IP`     | `status.hostIP`      |
///
/// together with the `single-request-reopen` DNS option.
#[derive(Clone, Debug, PartialEq)]
pub struct MutationRules {
    env: Vec<EnvVar>,
    dns_option: PodDNSConfigOption,
}

/// On-disk layout of a rules file
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RulesFile {
    #[serde(default)]
    env: Vec<EnvVar>,
    dns_option: Option<PodDNSConfigOption>,
}

impl Default for MutationRules {
    fn default() -> Self {
        Self {
            env: vec![
                field_ref(WORKER_NAME, "spec.nodeName"),
                field_ref(POD_NAME, "metadata.name"),
                field_ref(POD_NAMESPACE, "metadata.namespace"),
                field_ref(POD_IP, "status.podIP"),
                field_ref(WORKER_IP, "status.hostIP"),
            ],
            dns_option: PodDNSConfigOption {
                name: Some(SINGLE_REQUEST_REOPEN.to_owned()),
                value: None,
            },
        }
    }
}

impl MutationRules {
    /// Construct a rule set from explicit env vars and a DNS option
    ///
    /// Env rules are applied in the given order.
    pub fn new(env: Vec<EnvVar>, dns_option: PodDNSConfigOption) -> Result<Self> {
        if let Some(idx) = env.iter().position(|e| e.name.is_empty()) {
            return Err(Error::InvalidRule(format!("env rule {idx} has an empty name")));
        }
        if dns_option.name.as_deref().unwrap_or_default().is_empty() {
            return Err(Error::InvalidRule("dns option has an empty name".into()));
        }
        Ok(Self { env, dns_option })
    }

    /// Parse a rule set from YAML
    ///
    /// ```yaml
    /// env:
    /// - name: K8S_NODE
    ///   valueFrom:
    ///     fieldRef:
    ///       fieldPath: spec.nodeName
    /// dnsOption:
    ///   name: single-request-reopen
    /// ```
    ///
    /// A missing `dnsOption` falls back to `single-request-reopen`.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: RulesFile = serde_yaml::from_str(yaml).map_err(Error::ParseRules)?;
        let dns_option = file.dns_option.unwrap_or_else(|| Self::default().dns_option);
        Self::new(file.env, dns_option)
    }

    /// Read a rule set from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let yaml = fs::read_to_string(&path).map_err(|source| Error::ReadRules {
            path: path.as_ref().into(),
            source,
        })?;
        Self::from_yaml(&yaml)
    }

    /// Env vars ensured on every container, in application order
    pub fn env(&self) -> &[EnvVar] {
        &self.env
    }

    /// DNS option ensured on every Pod
    pub fn dns_option(&self) -> &PodDNSConfigOption {
        &self.dns_option
    }
}

fn field_ref(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_owned(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_owned(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_rules_are_canonical() {
        let rules = MutationRules::default();
        let names: Vec<_> = rules.env().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, [WORKER_NAME, POD_NAME, POD_NAMESPACE, POD_IP, WORKER_IP]);

        let paths: Vec<_> = rules
            .env()
            .iter()
            .filter_map(|e| e.value_from.as_ref()?.field_ref.as_ref())
            .map(|f| f.field_path.as_str())
            .collect();
        assert_eq!(paths, [
            "spec.nodeName",
            "metadata.name",
            "metadata.namespace",
            "status.podIP",
            "status.hostIP"
        ]);
        assert_eq!(rules.dns_option().name.as_deref(), Some(SINGLE_REQUEST_REOPEN));
        assert_eq!(rules.dns_option().value, None);
    }

    #[test]
    fn rules_parse_from_yaml() {
        let yaml = r#"
env:
- name: NODE
  valueFrom:
    fieldRef:
      fieldPath: spec.nodeName
- name: STATIC
  value: "1"
dnsOption:
  name: ndots
  value: "2"
"#;
        let rules = MutationRules::from_yaml(yaml).unwrap();
        assert_eq!(rules.env().len(), 2);
        assert_eq!(rules.env()[0].name, "NODE");
        assert_eq!(rules.env()[1].value.as_deref(), Some("1"));
        assert_eq!(rules.dns_option().name.as_deref(), Some("ndots"));
        assert_eq!(rules.dns_option().value.as_deref(), Some("2"));
    }

    #[test]
    fn missing_dns_option_falls_back_to_default() {
        let rules = MutationRules::from_yaml("env: []").unwrap();
        assert!(rules.env().is_empty());
        assert_eq!(rules.dns_option(), MutationRules::default().dns_option());
    }

    #[test]
    fn empty_names_are_rejected() {
        let err = MutationRules::from_yaml("env:\n- name: \"\"\n  value: x\n").unwrap_err();
        assert!(matches!(err, Error::InvalidRule(_)), "{err}");

        let err = MutationRules::from_yaml("dnsOption:\n  value: x\n").unwrap_err();
        assert!(matches!(err, Error::InvalidRule(_)), "{err}");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = MutationRules::from_yaml("envs: []").unwrap_err();
        assert!(matches!(err, Error::ParseRules(_)), "{err}");
    }

    #[test]
    fn rules_load_from_file() {
        let file = tempfile::NamedTempFile::new().expect("create rules tempfile");
        std::fs::write(
            file.path(),
            "env:\n- name: NODE\n  valueFrom:\n    fieldRef:\n      fieldPath: spec.nodeName\n",
        )
        .unwrap();

        let rules = MutationRules::from_file(file.path()).unwrap();
        assert_eq!(rules.env().len(), 1);
        assert_eq!(rules.env()[0].name, "NODE");
        let field_ref = rules.env()[0].value_from.as_ref().and_then(|v| v.field_ref.as_ref());
        assert_eq!(field_ref.map(|f| f.field_path.as_str()), Some("spec.nodeName"));
        assert_eq!(rules.dns_option(), MutationRules::default().dns_option());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = MutationRules::from_file("/nonexistent/podenv-rules.yaml").unwrap_err();
        match err {
            Error::ReadRules { path, .. } => assert!(path.ends_with("podenv-rules.yaml")),
            other => panic!("unexpected error {other}"),
        }
    }
}
