use std::collections::HashSet;

use canal_api::v1alpha1::service_export::PathType;
use canal_api::ServiceExport;

use super::{check_cluster_key, check_http_path, check_port};
use crate::hook::{AdmissionHook, ValidationErrors};

pub struct ServiceExportHook;

/// `from` is a regular expression matched against the request path
fn check_rewrite_pattern(errors: &mut ValidationErrors, field: &str, pattern: &str) {
    if !(pattern.starts_with('^') || pattern.starts_with('/')) {
        errors.push(field, format!("pattern {:?} must start with '^' or '/'", pattern));
    } else if pattern.chars().any(char::is_whitespace) {
        errors.push(field, format!("pattern {:?} must not contain whitespace", pattern));
    }
}

impl AdmissionHook for ServiceExportHook {
    type Object = ServiceExport;

    fn set_defaults(&self, export: &mut ServiceExport) {
        for rule in &mut export.spec.rules {
            if rule.path_type.is_none() {
                rule.path_type = Some(PathType::Prefix);
            }
        }
    }

    fn validate_create(&self, export: &ServiceExport) -> Result<(), ValidationErrors> {
        validate(export)
    }

    fn validate_update(&self, _old: &ServiceExport, export: &ServiceExport) -> Result<(), ValidationErrors> {
        validate(export)
    }
}

fn validate(export: &ServiceExport) -> Result<(), ValidationErrors> {
    let spec = &export.spec;
    let mut errors = ValidationErrors::new();

    if spec.rules.is_empty() {
        errors.push("spec.rules", "at least one rule is required");
    }

    let mut seen = HashSet::new();
    for (i, rule) in spec.rules.iter().enumerate() {
        check_port(&mut errors, format!("spec.rules[{}].portNumber", i), rule.port_number);
        check_http_path(&mut errors, format!("spec.rules[{}].path", i), &rule.path);

        let path_type = rule.effective_path_type();
        if !seen.insert((rule.path.as_str(), path_type)) {
            errors.push(
                format!("spec.rules[{}]", i),
                format!("duplicate rule for path {:?} with type {}", rule.path, path_type),
            );
        }
    }

    if let Some(rewrite) = &spec.path_rewrite {
        match (rewrite.from.is_empty(), rewrite.to.is_empty()) {
            (true, true) | (false, false) => {}
            _ => errors.push(
                "spec.pathRewrite",
                "from and to must be set together",
            ),
        }
        if !rewrite.from.is_empty() {
            check_rewrite_pattern(&mut errors, "spec.pathRewrite.from", &rewrite.from);
        }
    }

    for (i, key) in spec.target_clusters.iter().enumerate() {
        check_cluster_key(&mut errors, format!("spec.targetClusters[{}]", i), key);
    }

    errors.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use canal_api::v1alpha1::service_export::{PathRewrite, ServiceExportRule, ServiceExportSpec};

    fn rule(path: &str, path_type: Option<PathType>, port: i32) -> ServiceExportRule {
        ServiceExportRule {
            port_number: port,
            path: path.to_string(),
            path_type,
        }
    }

    fn export(rules: Vec<ServiceExportRule>) -> ServiceExport {
        ServiceExport::new(
            "s",
            ServiceExportSpec {
                rules,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_valid_export() {
        let sexp = export(vec![rule("/p", Some(PathType::Prefix), 80), rule("/p", Some(PathType::Exact), 80)]);
        assert!(ServiceExportHook.validate_create(&sexp).is_ok());
    }

    #[test]
    fn test_rule_shape_errors() {
        let sexp = export(vec![rule("p", None, 0), rule("/q", None, 70000)]);
        let errors = ServiceExportHook.validate_create(&sexp).unwrap_err();
        assert!(errors.has_field("spec.rules[0].portNumber"));
        assert!(errors.has_field("spec.rules[0].path"));
        assert!(errors.has_field("spec.rules[1].portNumber"));

        let empty = export(vec![]);
        assert!(ServiceExportHook.validate_create(&empty).unwrap_err().has_field("spec.rules"));
    }

    #[test]
    fn test_duplicate_rules_compare_effective_path_type() {
        let sexp = export(vec![rule("/p", None, 80), rule("/p", Some(PathType::Prefix), 8080)]);
        let errors = ServiceExportHook.validate_create(&sexp).unwrap_err();
        assert!(errors.has_field("spec.rules[1]"));
    }

    #[test]
    fn test_rewrite_pair_and_target_clusters() {
        let mut sexp = export(vec![rule("/p", None, 80)]);
        sexp.spec.path_rewrite = Some(PathRewrite {
            from: "/p".to_string(),
            to: String::new(),
        });
        sexp.spec.target_clusters = vec!["eu/fra/blue/c1".to_string(), "bad".to_string()];
        let errors = ServiceExportHook.validate_update(&sexp, &sexp).unwrap_err();
        assert!(errors.has_field("spec.pathRewrite"));
        assert!(errors.has_field("spec.targetClusters[1]"));
        assert!(!errors.has_field("spec.targetClusters[0]"));
    }

    #[test]
    fn test_rewrite_from_is_a_pattern() {
        let mut sexp = export(vec![rule("/p", None, 80)]);
        for from in ["^/p", "/p"] {
            sexp.spec.path_rewrite = Some(PathRewrite {
                from: from.to_string(),
                to: "/".to_string(),
            });
            assert!(ServiceExportHook.validate_create(&sexp).is_ok(), "{}", from);
        }

        for from in ["p", "^/p q"] {
            sexp.spec.path_rewrite = Some(PathRewrite {
                from: from.to_string(),
                to: "/".to_string(),
            });
            let errors = ServiceExportHook.validate_create(&sexp).unwrap_err();
            assert!(errors.has_field("spec.pathRewrite.from"), "{}", from);
        }
    }

    #[test]
    fn test_defaults_path_type() {
        let mut sexp = export(vec![rule("/p", None, 80), rule("/q", Some(PathType::Exact), 80)]);
        ServiceExportHook.set_defaults(&mut sexp);
        let once = sexp.clone();
        ServiceExportHook.set_defaults(&mut sexp);

        assert_eq!(sexp, once);
        assert_eq!(sexp.spec.rules[0].path_type, Some(PathType::Prefix));
        assert_eq!(sexp.spec.rules[1].path_type, Some(PathType::Exact));
    }
}
