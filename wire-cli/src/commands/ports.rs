//! List default database ports.

use dbwire_core::DatabaseKind;

/// Every engine, in display order.
const KINDS: [DatabaseKind; 6] = [
    DatabaseKind::Postgres,
    DatabaseKind::Mysql,
    DatabaseKind::Mariadb,
    DatabaseKind::Cockroachdb,
    DatabaseKind::Mongodb,
    DatabaseKind::Sqlite,
];

/// Run the ports command.
pub fn run() {
    println!("=== dbwire ports ===");
    println!();
    for kind in KINDS {
        println!("  {:<12} {}", format!("{kind:?}").to_lowercase(), describe(kind));
    }
}

fn describe(kind: DatabaseKind) -> String {
    match kind.default_port() {
        Some(port) => port.to_string(),
        None => "(no network listener)".to_string(),
    }
}
