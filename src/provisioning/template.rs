/// Turning a template workflow into a per-user copy

use serde_json::{json, Map, Value};

/// Fields n8n assigns itself and rejects on create
const TEMPLATE_ONLY_FIELDS: [&str; 4] = ["id", "versionId", "createdAt", "updatedAt"];

/// Build the create-workflow payload for a user's copy of a template
///
/// The copy starts inactive; every node that references `credential_type` is
/// rebound to the new credential. Nodes using other credential types keep theirs.
pub fn prepare_workflow_copy(
    template: &Map<String, Value>,
    new_name: &str,
    credential_type: &str,
    credential_id: &str,
    credential_name: &str,
) -> Value {
    let mut workflow: Map<String, Value> = template
        .iter()
        .filter(|(key, _)| !TEMPLATE_ONLY_FIELDS.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    workflow.insert("name".to_string(), json!(new_name));
    workflow.insert("active".to_string(), json!(false));

    let mut rebound = 0;
    if let Some(Value::Array(nodes)) = workflow.get_mut("nodes") {
        for node in nodes.iter_mut() {
            let Some(credentials) = node.get_mut("credentials").and_then(Value::as_object_mut) else {
                continue;
            };
            if credentials.contains_key(credential_type) {
                credentials.insert(
                    credential_type.to_string(),
                    json!({ "id": credential_id, "name": credential_name }),
                );
                rebound += 1;
            }
        }
    }

    tracing::debug!(
        "🔗 Rebound {} node(s) of '{}' to credential {}",
        rebound,
        new_name,
        credential_id
    );

    Value::Object(workflow)
}
