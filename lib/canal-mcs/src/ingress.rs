//! The ingress generated for each ServiceExport

use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule, IngressServiceBackend,
    IngressSpec, ServiceBackendPort,
};
use kube::api::ObjectMeta;
use kube::ResourceExt;

use canal_api::names::{
    export_ingress_name, INGRESS_LOAD_BALANCER_ANNOTATION, INGRESS_REWRITE_FROM_ANNOTATION,
    INGRESS_REWRITE_TO_ANNOTATION, INGRESS_SESSION_STICKY_ANNOTATION,
};
use canal_api::ServiceExport;
use canal_core::CoreError;

/// One HTTP path per export rule, each backed by the exported service
pub fn http_paths(export: &ServiceExport) -> Vec<HTTPIngressPath> {
    let service = export.name_any();
    export
        .spec
        .rules
        .iter()
        .map(|rule| HTTPIngressPath {
            path: Some(rule.path.clone()),
            path_type: rule.effective_path_type().as_str().to_string(),
            backend: IngressBackend {
                service: Some(IngressServiceBackend {
                    name: service.clone(),
                    port: Some(ServiceBackendPort {
                        number: Some(rule.port_number),
                        name: None,
                    }),
                }),
                resource: None,
            },
        })
        .collect()
}

/// A single host-less rule carrying every export path
pub fn ingress_rules(export: &ServiceExport) -> Vec<IngressRule> {
    vec![IngressRule {
        host: None,
        http: Some(HTTPIngressRuleValue {
            paths: http_paths(export),
        }),
    }]
}

/// Annotations the ingress controller reads for rewrite, stickiness and balancing
pub fn export_annotations(export: &ServiceExport) -> BTreeMap<String, String> {
    let mut annotations = BTreeMap::new();
    let spec = &export.spec;

    if let Some(rewrite) = &spec.path_rewrite {
        if !rewrite.from.is_empty() && !rewrite.to.is_empty() {
            annotations.insert(INGRESS_REWRITE_FROM_ANNOTATION.to_string(), rewrite.from.clone());
            annotations.insert(INGRESS_REWRITE_TO_ANNOTATION.to_string(), rewrite.to.clone());
        }
    }
    if spec.session_sticky {
        annotations.insert(INGRESS_SESSION_STICKY_ANNOTATION.to_string(), "true".to_string());
    }
    if let Some(lb) = spec.load_balancer {
        annotations.insert(INGRESS_LOAD_BALANCER_ANNOTATION.to_string(), lb.as_str().to_string());
    }

    annotations
}

/// The ingress for `export`, without owner references
pub fn build_ingress(export: &ServiceExport, class_name: &str) -> Ingress {
    let annotations = export_annotations(export);
    Ingress {
        metadata: ObjectMeta {
            name: Some(export_ingress_name(&export.name_any())),
            namespace: export.namespace(),
            annotations: (!annotations.is_empty()).then_some(annotations),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: Some(class_name.to_string()),
            rules: Some(ingress_rules(export)),
            ..Default::default()
        }),
        status: None,
    }
}

/// Whether `ingress` names the object with `uid` as its controller
pub fn is_controlled_by(ingress: &Ingress, uid: &str) -> bool {
    ingress
        .owner_references()
        .iter()
        .any(|owner| owner.controller == Some(true) && owner.uid == uid)
}

/// First ingress path, in listing order, that another owner already serves
/// for one of the export's rules. Paths are compared literally.
pub fn find_path_conflict(ingresses: &[Ingress], export: &ServiceExport) -> Option<CoreError> {
    let uid = export.uid().unwrap_or_default();

    for rule in &export.spec.rules {
        let path_type = rule.effective_path_type();
        for ingress in ingresses {
            if !uid.is_empty() && is_controlled_by(ingress, &uid) {
                continue;
            }
            let rules = ingress.spec.as_ref().and_then(|s| s.rules.as_ref());
            let taken = rules.into_iter().flatten().filter_map(|r| r.http.as_ref()).any(|http| {
                http.paths
                    .iter()
                    .any(|p| p.path.as_deref() == Some(rule.path.as_str()) && p.path_type == path_type.as_str())
            });
            if taken {
                return Some(CoreError::PathConflict {
                    path: rule.path.clone(),
                    ingress: format!("{}/{}", ingress.namespace().unwrap_or_default(), ingress.name_any()),
                });
            }
        }
    }

    None
}
