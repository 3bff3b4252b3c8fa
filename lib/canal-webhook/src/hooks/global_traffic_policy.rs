use canal_api::v1alpha1::global_traffic_policy::GlobalTrafficPolicySpec;
use canal_api::v1alpha1::LoadBalancerType;
use canal_api::GlobalTrafficPolicy;

use crate::hook::{AdmissionHook, ValidationErrors};

pub struct GlobalTrafficPolicyHook;

impl AdmissionHook for GlobalTrafficPolicyHook {
    type Object = GlobalTrafficPolicy;

    fn set_defaults(&self, policy: &mut GlobalTrafficPolicy) {
        if policy.spec.lb_type.is_none() {
            policy.spec.lb_type = Some(LoadBalancerType::Locality);
        }
    }

    fn validate_create(&self, policy: &GlobalTrafficPolicy) -> Result<(), ValidationErrors> {
        validate(&policy.spec)
    }

    fn validate_update(
        &self,
        _old: &GlobalTrafficPolicy,
        policy: &GlobalTrafficPolicy,
    ) -> Result<(), ValidationErrors> {
        validate(&policy.spec)
    }
}

fn validate(spec: &GlobalTrafficPolicySpec) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let lb_type = spec.lb_type.unwrap_or(LoadBalancerType::Locality);

    match lb_type {
        LoadBalancerType::Locality => {
            if spec.targets.len() > 1 {
                errors.push(
                    "spec.targets",
                    format!(
                        "{} load balancing can have at most one target, got {}",
                        lb_type,
                        spec.targets.len()
                    ),
                );
            }
        }
        LoadBalancerType::FailOver => {
            if spec.targets.is_empty() {
                errors.push(
                    "spec.targets",
                    format!("{} load balancing requires at least one target", lb_type),
                );
            }
        }
        LoadBalancerType::ActiveActive => {
            for (i, target) in spec.targets.iter().enumerate() {
                if let Some(weight) = target.weight {
                    if weight < 0 {
                        errors.push(
                            format!("spec.targets[{}].weight", i),
                            format!("weight {} of {} must not be negative", weight, target.cluster_key),
                        );
                    }
                }
            }
        }
    }

    errors.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use canal_api::v1alpha1::global_traffic_policy::TrafficTarget;

    fn target(key: &str, weight: Option<i32>) -> TrafficTarget {
        TrafficTarget {
            cluster_key: key.to_string(),
            weight,
        }
    }

    fn policy(lb_type: Option<LoadBalancerType>, targets: Vec<TrafficTarget>) -> GlobalTrafficPolicy {
        GlobalTrafficPolicy::new("s", GlobalTrafficPolicySpec { lb_type, targets })
    }

    #[test]
    fn test_locality_rejects_two_targets() {
        let gtp = policy(
            Some(LoadBalancerType::Locality),
            vec![target("r/z/g/c1", None), target("r/z/g/c2", None)],
        );
        let errors = GlobalTrafficPolicyHook.validate_create(&gtp).unwrap_err();
        assert!(errors.has_field("spec.targets"));
        assert!(errors.to_string().contains("at most one target"));
    }

    #[test]
    fn test_locality_accepts_single_or_no_target() {
        let hook = GlobalTrafficPolicyHook;
        assert!(hook.validate_create(&policy(None, vec![])).is_ok());
        assert!(hook
            .validate_create(&policy(None, vec![target("r/z/g/c1", None)]))
            .is_ok());
    }

    #[test]
    fn test_failover_requires_target() {
        let hook = GlobalTrafficPolicyHook;
        assert!(hook
            .validate_create(&policy(Some(LoadBalancerType::FailOver), vec![]))
            .is_err());
        assert!(hook
            .validate_create(&policy(
                Some(LoadBalancerType::FailOver),
                vec![target("r/z/g/c1", None)]
            ))
            .is_ok());
    }

    #[test]
    fn test_active_active_rejects_negative_weight() {
        let hook = GlobalTrafficPolicyHook;
        let gtp = policy(
            Some(LoadBalancerType::ActiveActive),
            vec![target("r/z/g/c1", Some(0)), target("r/z/g/c2", Some(-1))],
        );
        let errors = hook.validate_update(&gtp, &gtp).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors.has_field("spec.targets[1].weight"));

        let gtp = policy(
            Some(LoadBalancerType::ActiveActive),
            vec![target("r/z/g/c1", Some(3)), target("r/z/g/c2", None)],
        );
        assert!(hook.validate_create(&gtp).is_ok());
    }

    #[test]
    fn test_defaults_to_locality_idempotently() {
        let mut gtp = policy(None, vec![]);
        GlobalTrafficPolicyHook.set_defaults(&mut gtp);
        assert_eq!(gtp.spec.lb_type, Some(LoadBalancerType::Locality));

        let once = serde_json::to_vec(&gtp).unwrap();
        GlobalTrafficPolicyHook.set_defaults(&mut gtp);
        assert_eq!(serde_json::to_vec(&gtp).unwrap(), once);

        let mut explicit = policy(Some(LoadBalancerType::FailOver), vec![]);
        GlobalTrafficPolicyHook.set_defaults(&mut explicit);
        assert_eq!(explicit.spec.lb_type, Some(LoadBalancerType::FailOver));
    }
}
