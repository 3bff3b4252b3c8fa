use std::collections::HashSet;

use canal_api::v1alpha1::proxy_profile::{RestartPolicy, RestartScope};
use canal_api::ProxyProfile;

use super::is_dns_label;
use crate::hook::{AdmissionHook, ValidationErrors};

pub struct ProxyProfileHook;

impl AdmissionHook for ProxyProfileHook {
    type Object = ProxyProfile;

    fn set_defaults(&self, profile: &mut ProxyProfile) {
        let spec = &mut profile.spec;
        if spec.restart_policy.is_none() {
            spec.restart_policy = Some(RestartPolicy::Never);
        }
        if spec.restart_scope.is_none() {
            spec.restart_scope = Some(RestartScope::Owner);
        }
    }

    fn validate_create(&self, profile: &ProxyProfile) -> Result<(), ValidationErrors> {
        validate(profile)
    }

    fn validate_update(&self, _old: &ProxyProfile, profile: &ProxyProfile) -> Result<(), ValidationErrors> {
        validate(profile)
    }
}

fn validate(profile: &ProxyProfile) -> Result<(), ValidationErrors> {
    let spec = &profile.spec;
    let mut errors = ValidationErrors::new();

    let has_config = !spec.config.is_empty();
    let has_repo = spec.repo_base_url.as_deref().map_or(false, |u| !u.is_empty());
    match (has_config, has_repo) {
        (true, true) => errors.push("spec", "config and repoBaseUrl are mutually exclusive"),
        (false, false) => errors.push("spec", "one of config or repoBaseUrl is required"),
        _ => {}
    }

    if let Some(url) = spec.repo_base_url.as_deref().filter(|u| !u.is_empty()) {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push("spec.repoBaseUrl", format!("{:?} is not an http(s) URL", url));
        }
    }
    if spec.parent_codebase_path.is_some() && !has_repo {
        errors.push("spec.parentCodebasePath", "requires repoBaseUrl");
    }

    if spec.sidecars.is_empty() {
        errors.push("spec.sidecars", "at least one sidecar is required");
    }
    let mut names = HashSet::new();
    for (i, sidecar) in spec.sidecars.iter().enumerate() {
        let field = format!("spec.sidecars[{}].name", i);
        if !is_dns_label(&sidecar.name) {
            errors.push(field, format!("{:?} is not a DNS label", sidecar.name));
        } else if !names.insert(sidecar.name.as_str()) {
            errors.push(field, format!("duplicate sidecar name {:?}", sidecar.name));
        }
    }

    errors.into_result()
}
