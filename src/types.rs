//! Type-safe enums shared across the client
//!
//! Template type names and remote statuses arrive as strings; these enums give
//! them exhaustive matching and a single parse/display spelling.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Kind of value a property holds, as named by block templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum ValueKind {
    #[strum(to_string = "str", serialize = "string")]
    Str,
    #[strum(to_string = "int", serialize = "integer")]
    Int,
    #[strum(to_string = "float", serialize = "number")]
    Float,
    #[strum(to_string = "bool", serialize = "boolean")]
    Bool,
    #[strum(to_string = "enum", serialize = "select")]
    Enum,
    #[strum(to_string = "list", serialize = "array")]
    List,
    /// Mappings, including nested property groups
    #[strum(to_string = "dict", serialize = "object")]
    Dict,
}

/// Status reported by the server for a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Status {
    Starting,
    Started,
    Stopping,
    Stopped,
    Configuring,
    Configured,
    Error,
}
