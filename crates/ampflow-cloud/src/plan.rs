//! Single-resource diff
//!
//! Compares the desired configuration with the last observed record and
//! decides between create, in-place update, replacement and no-op, using
//! the attribute declarations from [`ResourceSchema`].

use crate::action::{Action, ActionType, AttributeChange};
use crate::error::Result;
use crate::lifecycle::LifecyclePhase;
use crate::provider::ResourceConfig;
use crate::schema::ResourceSchema;
use crate::state::ResourceRecord;

/// Plan the action that converges `address` to `desired`
pub fn diff(
    schema: &ResourceSchema,
    address: &str,
    prior: Option<&ResourceRecord>,
    desired: &ResourceConfig,
) -> Result<Action> {
    schema.validate(&desired.config)?;
    let normalized = schema.normalize(&desired.config);

    let Some(prior) = prior else {
        let changes = normalized
            .into_iter()
            .map(|(attribute, after)| AttributeChange {
                attribute,
                before: None,
                after: Some(after),
                requires_replace: false,
            })
            .collect();
        return Ok(Action::new(
            ActionType::Create,
            &schema.resource_type,
            address,
            None,
            changes,
        ));
    };

    let mut changes = Vec::new();
    for attribute in schema.configurable() {
        let before = prior
            .attributes
            .get(&attribute.name)
            .filter(|v| !v.is_null())
            .cloned()
            .or_else(|| attribute.default.clone());
        let after = normalized.get(&attribute.name).cloned();
        if before != after {
            changes.push(AttributeChange {
                attribute: attribute.name.clone(),
                before,
                after,
                requires_replace: attribute.force_new,
            });
        }
    }

    let action_type = if prior.phase == LifecyclePhase::Failed
        || changes.iter().any(|c| c.requires_replace)
    {
        ActionType::Replace
    } else if changes.is_empty() {
        ActionType::NoOp
    } else {
        ActionType::Update
    };

    Ok(Action::new(
        action_type,
        &schema.resource_type,
        address,
        Some(prior.id.clone()),
        changes,
    ))
}

/// Plan removal of `address`
pub fn destroy(schema: &ResourceSchema, address: &str, prior: Option<&ResourceRecord>) -> Action {
    match prior {
        Some(prior) => Action::new(
            ActionType::Delete,
            &schema.resource_type,
            address,
            Some(prior.id.clone()),
            Vec::new(),
        ),
        None => Action::new(ActionType::NoOp, &schema.resource_type, address, None, Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AttributeSchema;
    use serde_json::json;

    fn schema() -> ResourceSchema {
        ResourceSchema::new("aws_prometheus_workspace")
            .with_attribute(
                AttributeSchema::optional_string("alias")
                    .with_max_length(100)
                    .with_default(json!("")),
            )
            .with_attribute(AttributeSchema::optional_string("kms_key_arn").force_new())
            .with_attribute(AttributeSchema::computed_string("arn"))
    }

    fn record(alias: &str) -> ResourceRecord {
        ResourceRecord::new("ws-1", "aws_prometheus_workspace")
            .with_phase(LifecyclePhase::Active)
            .with_attribute("alias", json!(alias))
            .with_attribute("arn", json!("arn:aws:aps:us-east-1:123:workspace/ws-1"))
    }

    fn desired(config: serde_json::Value) -> ResourceConfig {
        ResourceConfig::new("aws_prometheus_workspace", config)
    }

    #[test]
    fn test_create_when_no_prior() {
        let action = diff(&schema(), "w.test", None, &desired(json!({ "alias": "a" }))).unwrap();
        assert_eq!(action.action_type, ActionType::Create);
        assert_eq!(action.resource_id, None);
    }

    #[test]
    fn test_noop_when_converged() {
        let prior = record("a");
        let action = diff(&schema(), "w.test", Some(&prior), &desired(json!({ "alias": "a" }))).unwrap();
        assert_eq!(action.action_type, ActionType::NoOp);
    }

    #[test]
    fn test_removing_alias_is_update_to_empty() {
        let prior = record("a");
        let action = diff(&schema(), "w.test", Some(&prior), &desired(json!({}))).unwrap();
        assert_eq!(action.action_type, ActionType::Update);
        assert_eq!(
            action.changes,
            vec![AttributeChange {
                attribute: "alias".into(),
                before: Some(json!("a")),
                after: Some(json!("")),
                requires_replace: false,
            }]
        );
    }

    #[test]
    fn test_empty_alias_matches_omitted() {
        let prior = record("");
        let action = diff(&schema(), "w.test", Some(&prior), &desired(json!({}))).unwrap();
        assert_eq!(action.action_type, ActionType::NoOp);
    }

    #[test]
    fn test_force_new_change_replaces() {
        let prior = record("a");
        let action = diff(
            &schema(),
            "w.test",
            Some(&prior),
            &desired(json!({ "alias": "b", "kms_key_arn": "arn:key" })),
        )
        .unwrap();
        assert_eq!(action.action_type, ActionType::Replace);
        assert!(action.changes.iter().any(|c| c.requires_replace));
    }

    #[test]
    fn test_failed_record_is_replaced() {
        let prior = record("a").with_phase(LifecyclePhase::Failed);
        let action = diff(&schema(), "w.test", Some(&prior), &desired(json!({ "alias": "a" }))).unwrap();
        assert_eq!(action.action_type, ActionType::Replace);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let long = "x".repeat(101);
        assert!(diff(&schema(), "w.test", None, &desired(json!({ "alias": long }))).is_err());
    }

    #[test]
    fn test_destroy() {
        let prior = record("a");
        assert_eq!(
            destroy(&schema(), "w.test", Some(&prior)).action_type,
            ActionType::Delete
        );
        assert_eq!(destroy(&schema(), "w.test", None).action_type, ActionType::NoOp);
    }
}
