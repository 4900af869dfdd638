// Identifier newtypes shared across the workcell domain.
//
// Every identifier minted by the engine - workflow ids, step ids, location
// ids - is a 26-character Crockford-base32 ULID: lexicographically sortable
// by creation time, which keeps the workflow queue and archive naturally
// ordered without a separate `created_at` index.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

/// Mint a fresh ULID as a string. The one place every other `new()` on this
/// page delegates to.
pub fn new_ulid() -> String {
    Ulid::new().to_string()
}

macro_rules! id_newtype {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                $name(new_ulid())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(WorkflowId, "Identifies one materialized workflow run.");
id_newtype!(StepId, "Identifies one step inside a workflow run.");
id_newtype!(LocationId, "Identifies one Location in the workcell.");

/// Node names are caller-chosen (not ULIDs) - they come from the workcell
/// definition's `nodes` map, not from `new_ulid`. Wrapped for the same
/// type-safety reasons as the ULID ids above, without the `new()` minting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeName(pub String);

impl NodeName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeName {
    fn from(s: &str) -> Self {
        NodeName(s.to_string())
    }
}

impl From<String> for NodeName {
    fn from(s: String) -> Self {
        NodeName(s)
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
