use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Discriminates what kind of payload an event carried when it was ingested.
/// Stored on both issues and issue events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
pub enum EventType {
    #[sea_orm(num_value = 0)]
    Default,
    #[sea_orm(num_value = 1)]
    Error,
    #[sea_orm(num_value = 2)]
    Csp,
    #[sea_orm(num_value = 3)]
    Transaction,
}

/// Issue lifecycle state. New issues start unresolved; resolved issues flip
/// back to unresolved when a matching event arrives again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
pub enum EventStatus {
    #[sea_orm(num_value = 0)]
    Unresolved,
    #[sea_orm(num_value = 1)]
    Resolved,
    #[sea_orm(num_value = 2)]
    Ignored,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "i32", db_type = "Integer")]
pub enum LogLevel {
    #[sea_orm(num_value = 0)]
    NotSet,
    #[sea_orm(num_value = 1)]
    Debug,
    #[sea_orm(num_value = 2)]
    Info,
    #[sea_orm(num_value = 3)]
    Warning,
    #[sea_orm(num_value = 4)]
    Error,
    #[sea_orm(num_value = 5)]
    Fatal,
}

impl LogLevel {
    /// Maps the free-form `level` string clients send to a severity.
    /// Unrecognized strings fall back to `Error`.
    pub fn from_string(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "sample" => LogLevel::NotSet,
            "debug" => LogLevel::Debug,
            "info" | "log" => LogLevel::Info,
            "warning" => LogLevel::Warning,
            "error" => LogLevel::Error,
            "fatal" | "critical" => LogLevel::Fatal,
            _ => LogLevel::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_parses_known_labels() {
        assert_eq!(LogLevel::from_string("sample"), LogLevel::NotSet);
        assert_eq!(LogLevel::from_string("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from_string("info"), LogLevel::Info);
        assert_eq!(LogLevel::from_string("warning"), LogLevel::Warning);
        assert_eq!(LogLevel::from_string("error"), LogLevel::Error);
        assert_eq!(LogLevel::from_string("fatal"), LogLevel::Fatal);
    }

    #[test]
    fn log_level_maps_aliases() {
        assert_eq!(LogLevel::from_string("critical"), LogLevel::Fatal);
        assert_eq!(LogLevel::from_string("log"), LogLevel::Info);
        assert_eq!(LogLevel::from_string("WARNING"), LogLevel::Warning);
    }

    #[test]
    fn log_level_defaults_to_error_for_unknown() {
        assert_eq!(LogLevel::from_string("verbose"), LogLevel::Error);
        assert_eq!(LogLevel::from_string(""), LogLevel::Error);
    }
}
