// Locations: named points in the workcell a resource can sit at, and the
// per-node arguments nodes use to address them (slot numbers, well names,
// joint poses - whatever a given node's driver needs).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ids::new_ulid;
use super::ownership::OwnershipInfo;
use super::resource::ResourceDefinition;

/// One node's way of addressing a `Location`. Kept opaque (`serde_json::Value`)
/// because different node types need wildly different shapes here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationArgument {
    pub location_name: String,
    pub argument: serde_json::Value,
}

/// Static definition of a location, as it appears in a `WorkcellDefinition`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationDefinition {
    pub location_name: String,
    #[serde(default = "new_ulid")]
    pub location_id: String,
    #[serde(default)]
    pub description: Option<String>,
    /// node_name -> that node's argument for reaching this location.
    #[serde(default)]
    pub reference: HashMap<String, serde_json::Value>,
    /// Args folded into every transfer step that uses this location as its
    /// source or destination, before any per-node override or user-supplied
    /// value (§4.D.4 merge precedence).
    #[serde(default)]
    pub default_args: HashMap<String, serde_json::Value>,
    /// Per-node overrides of `default_args`, keyed by the node executing the
    /// transfer step.
    #[serde(default)]
    pub node_overrides: HashMap<String, HashMap<String, serde_json::Value>>,
    /// If set, `initialize_workcell_state` creates a resource from this
    /// definition via the Resource Manager the first time the location is
    /// seen with no `resource_id` recorded yet.
    #[serde(default)]
    pub resource_definition: Option<ResourceDefinition>,
}

/// A reservation held against a location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationReservation {
    pub owned_by: OwnershipInfo,
    pub created: chrono::DateTime<chrono::Utc>,
    pub start: chrono::DateTime<chrono::Utc>,
    pub end: chrono::DateTime<chrono::Utc>,
}

impl LocationReservation {
    /// True if `requester` may use the reserved location right now: either
    /// `requester` is the owner, or the reservation window isn't active.
    pub fn check(&self, requester: &OwnershipInfo) -> bool {
        let now = chrono::Utc::now();
        let within_window = self.start <= now && now <= self.end;
        self.owned_by.matches(requester) || !within_window
    }
}

/// Runtime record of a location: its static identity plus whatever resource
/// currently occupies it and any active reservation. Persisted under
/// `madsci:workcell:{id}:locations:{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub location_id: String,
    pub location_name: String,
    #[serde(default)]
    pub reference: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub default_args: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub node_overrides: HashMap<String, HashMap<String, serde_json::Value>>,
    pub resource_id: Option<String>,
    pub reserved_by: Option<LocationReservation>,
}

impl Location {
    pub fn from_definition(def: &LocationDefinition) -> Self {
        Self {
            location_id: def.location_id.clone(),
            location_name: def.location_name.clone(),
            reference: def.reference.clone(),
            default_args: def.default_args.clone(),
            node_overrides: def.node_overrides.clone(),
            resource_id: None,
            reserved_by: None,
        }
    }

    /// A node can reach this location only if the location's definition
    /// carries a reference entry for it.
    pub fn reachable_by(&self, node_name: &str) -> bool {
        self.reference.contains_key(node_name)
    }

    pub fn available_to(&self, requester: &OwnershipInfo) -> bool {
        self.reserved_by.as_ref().map(|r| r.check(requester)).unwrap_or(true)
    }

    /// This location's args for a transfer step executed by `node_name`:
    /// `default_args` overridden key-by-key by any `node_overrides` entry
    /// for that node.
    pub fn transfer_args_for(&self, node_name: &str) -> HashMap<String, serde_json::Value> {
        let mut args = self.default_args.clone();
        if let Some(overrides) = self.node_overrides.get(node_name) {
            args.extend(overrides.clone());
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_definition(name: &str) -> LocationDefinition {
        LocationDefinition {
            location_name: name.into(),
            location_id: new_ulid(),
            description: None,
            reference: HashMap::new(),
            default_args: HashMap::new(),
            node_overrides: HashMap::new(),
            resource_definition: None,
        }
    }

    #[test]
    fn reachable_by_checks_reference_map() {
        let mut def = empty_definition("bench");
        def.reference.insert("arm1".to_string(), serde_json::json!({"slot": 3}));
        let loc = Location::from_definition(&def);
        assert!(loc.reachable_by("arm1"));
        assert!(!loc.reachable_by("arm2"));
    }

    #[test]
    fn unreserved_location_is_available_to_anyone() {
        let def = empty_definition("bench");
        let loc = Location::from_definition(&def);
        assert!(loc.available_to(&OwnershipInfo::for_workflow("wf-1")));
    }

    #[test]
    fn node_override_wins_over_default_args() {
        let mut def = empty_definition("bench");
        def.default_args.insert("speed".into(), serde_json::json!("slow"));
        def.node_overrides.insert(
            "arm1".into(),
            HashMap::from([("speed".to_string(), serde_json::json!("fast"))]),
        );
        let loc = Location::from_definition(&def);
        assert_eq!(loc.transfer_args_for("arm1")["speed"], serde_json::json!("fast"));
        assert_eq!(loc.transfer_args_for("arm2")["speed"], serde_json::json!("slow"));
    }
}
