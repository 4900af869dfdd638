// Minimal Resource Manager domain types. The workcell engine doesn't own
// resource tracking (that's the Resource Manager collaborator's job, §6.2) -
// it only needs enough of a shape to ask that collaborator to create a
// resource for a location at init time and to remember the id it hands back.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// What a location's embedded resource should look like, declared once in
/// the workcell definition. `initialize_workcell_state` sends this to the
/// Resource Manager the first time a location with no `resource_id` is seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDefinition {
    pub resource_name: String,
    pub resource_type: String,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

/// A resource as the Resource Manager reports it back after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub resource_id: String,
    pub resource_name: String,
    pub resource_type: String,
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Resource {
    pub fn from_definition(id: impl Into<String>, definition: &ResourceDefinition) -> Self {
        Self {
            resource_id: id.into(),
            resource_name: definition.resource_name.clone(),
            resource_type: definition.resource_type.clone(),
            attributes: definition.attributes.clone(),
        }
    }
}
