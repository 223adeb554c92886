//! Database server kinds and their default ports.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Database servers the transport is commonly pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    /// PostgreSQL.
    Postgres,
    /// MySQL.
    Mysql,
    /// MariaDB.
    Mariadb,
    /// SQLite (file based, no network port).
    Sqlite,
    /// CockroachDB.
    Cockroachdb,
    /// MongoDB.
    Mongodb,
}

impl DatabaseKind {
    /// Default TCP port, or `None` for file-based engines.
    pub fn default_port(self) -> Option<u16> {
        match self {
            Self::Postgres => Some(5432),
            Self::Mysql | Self::Mariadb => Some(3306),
            Self::Sqlite => None,
            Self::Cockroachdb => Some(26257),
            Self::Mongodb => Some(27017),
        }
    }

    /// Whether this engine is reached over TCP at all.
    pub fn uses_network(self) -> bool {
        self.default_port().is_some()
    }
}

/// Error returned when a scheme or name does not match any [`DatabaseKind`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown database kind: {0}")]
pub struct UnknownDatabaseKind(pub String);

impl FromStr for DatabaseKind {
    type Err = UnknownDatabaseKind;

    /// Accepts kind names and connection-URL scheme aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_end_matches("://").to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "mysql" => Ok(Self::Mysql),
            "mariadb" => Ok(Self::Mariadb),
            "sqlite" | "file" => Ok(Self::Sqlite),
            "cockroachdb" | "crdb" => Ok(Self::Cockroachdb),
            "mongodb" | "mongodb+srv" => Ok(Self::Mongodb),
            _ => Err(UnknownDatabaseKind(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ports() {
        assert_eq!(DatabaseKind::Postgres.default_port(), Some(5432));
        assert_eq!(DatabaseKind::Mariadb.default_port(), Some(3306));
        assert_eq!(DatabaseKind::Cockroachdb.default_port(), Some(26257));
        assert_eq!(DatabaseKind::Mongodb.default_port(), Some(27017));
        assert!(!DatabaseKind::Sqlite.uses_network());
    }

    #[test]
    fn parses_scheme_aliases() {
        assert_eq!("postgresql".parse::<DatabaseKind>(), Ok(DatabaseKind::Postgres));
        assert_eq!("crdb://".parse::<DatabaseKind>(), Ok(DatabaseKind::Cockroachdb));
        assert_eq!("mongodb+srv".parse::<DatabaseKind>(), Ok(DatabaseKind::Mongodb));
        assert_eq!("FILE".parse::<DatabaseKind>(), Ok(DatabaseKind::Sqlite));
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = "oracle".parse::<DatabaseKind>().unwrap_err();
        assert_eq!(err.to_string(), "unknown database kind: oracle");
    }
}
