//! Secret discovery over a pod template.
//!
//! Collects every Secret a pod would consume:
//!
//! - `env[].valueFrom.secretKeyRef` and `envFrom[].secretRef`, for containers and init containers
//! - `volumes[].secret` and secret sources of `volumes[].projected`

use k8s_openapi::api::core::v1::{Container, PodTemplateSpec};
use std::collections::BTreeSet;

/// Sorted, de-duplicated names of the secrets referenced by `template`
#[must_use]
pub fn discover_secret_names(template: &PodTemplateSpec) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let Some(spec) = template.spec.as_ref() else {
        return names;
    };

    let init_containers = spec.init_containers.iter().flatten();
    for container in spec.containers.iter().chain(init_containers) {
        collect_from_container(container, &mut names);
    }

    for volume in spec.volumes.iter().flatten() {
        if let Some(name) = volume.secret.as_ref().and_then(|s| s.secret_name.as_ref()) {
            insert(&mut names, name);
        }

        let projected = volume
            .projected
            .as_ref()
            .and_then(|p| p.sources.as_ref())
            .into_iter()
            .flatten();
        for source in projected {
            if let Some(secret) = &source.secret {
                insert(&mut names, &secret.name);
            }
        }
    }

    names
}

fn collect_from_container(container: &Container, names: &mut BTreeSet<String>) {
    for env in container.env.iter().flatten() {
        if let Some(selector) = env
            .value_from
            .as_ref()
            .and_then(|source| source.secret_key_ref.as_ref())
        {
            insert(names, &selector.name);
        }
    }

    for env_from in container.env_from.iter().flatten() {
        if let Some(secret_ref) = &env_from.secret_ref {
            insert(names, &secret_ref.name);
        }
    }
}

fn insert(names: &mut BTreeSet<String>, name: &str) {
    if !name.is_empty() {
        names.insert(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template(spec: serde_json::Value) -> PodTemplateSpec {
        serde_json::from_value(json!({ "spec": spec })).unwrap()
    }

    #[test]
    fn test_env_envfrom_and_volume_union() {
        let t = template(json!({
            "containers": [{
                "name": "app",
                "env": [
                    {"name": "PASSWORD", "valueFrom": {"secretKeyRef": {"name": "A", "key": "password"}}},
                    {"name": "PLAIN", "value": "x"},
                    {"name": "AGAIN", "valueFrom": {"secretKeyRef": {"name": "A", "key": "user"}}}
                ],
                "envFrom": [{"secretRef": {"name": "B"}}, {"configMapRef": {"name": "cm"}}]
            }],
            "volumes": [{"name": "certs", "secret": {"secretName": "C"}}]
        }));

        let names: Vec<String> = discover_secret_names(&t).into_iter().collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_init_containers_and_projected_volumes() {
        let t = template(json!({
            "initContainers": [{
                "name": "migrate",
                "envFrom": [{"secretRef": {"name": "migrations"}}]
            }],
            "containers": [{"name": "app"}],
            "volumes": [{
                "name": "bundle",
                "projected": {"sources": [
                    {"secret": {"name": "tls"}},
                    {"configMap": {"name": "ca"}}
                ]}
            }]
        }));

        let names: Vec<String> = discover_secret_names(&t).into_iter().collect();
        assert_eq!(names, vec!["migrations", "tls"]);
    }

    #[test]
    fn test_no_spec_or_no_references() {
        assert!(discover_secret_names(&PodTemplateSpec::default()).is_empty());
        let t = template(json!({"containers": [{"name": "app", "image": "nginx"}]}));
        assert!(discover_secret_names(&t).is_empty());
    }
}
