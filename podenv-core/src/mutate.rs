//! Applying [`MutationRules`] to a Pod.
//!
//! Every insertion is guarded by a presence check, so the functions here are
//! idempotent: applying them to their own output changes nothing. Existing env
//! vars and DNS options are never removed, reordered or rewritten; missing ones
//! are appended at the end of their list.
use k8s_openapi::api::core::v1::{Container, EnvVar, Pod, PodDNSConfigOption};

use crate::MutationRules;

/// Apply `rules` to `pod` in place
///
/// Containers and init containers get every env rule whose name is not already
/// present on them, and the Pod's DNS options get the rule's option unless an
/// option with the same name and value already exists.
pub fn mutate_pod(rules: &MutationRules, pod: &mut Pod) {
    let spec = pod.spec.get_or_insert_with(Default::default);

    fill_env(rules.env(), &mut spec.containers);
    if let Some(init_containers) = spec.init_containers.as_mut() {
        fill_env(rules.env(), init_containers);
    }

    let options = spec
        .dns_config
        .get_or_insert_with(Default::default)
        .options
        .get_or_insert_with(Vec::new);
    if !has_dns_option(options, rules.dns_option()) {
        options.push(rules.dns_option().clone());
    }
}

/// Apply `rules` to an owned `pod` and return it
#[must_use]
pub fn mutated(rules: &MutationRules, mut pod: Pod) -> Pod {
    mutate_pod(rules, &mut pod);
    pod
}

fn fill_env(rules: &[EnvVar], containers: &mut [Container]) {
    for container in containers {
        for rule in rules {
            if has_env_var(container, &rule.name) {
                continue;
            }
            container.env.get_or_insert_with(Vec::new).push(rule.clone());
        }
    }
}

// name only, the value source of an existing var wins
fn has_env_var(container: &Container, name: &str) -> bool {
    container.env.iter().flatten().any(|e| e.name == name)
}

// an absent value and an empty one are the same option
fn has_dns_option(options: &[PodDNSConfigOption], target: &PodDNSConfigOption) -> bool {
    let name = target.name.as_deref().unwrap_or_default();
    let value = target.value.as_deref().unwrap_or_default();
    options.iter().any(|o| {
        o.name.as_deref().unwrap_or_default() == name && o.value.as_deref().unwrap_or_default() == value
    })
}
