//! Stats command implementation

use anyhow::Result;

use crate::store::EventStore;

pub fn run(store: &EventStore) -> Result<()> {
    let stats = store.stats()?;

    println!("{:<18} {:>10}", "Table", "Rows");
    println!("{}", "-".repeat(29));
    println!("{:<18} {:>10}", "messages", stats.messages);
    println!("{:<18} {:>10}", "status_changes", stats.status_changes);
    println!("{:<18} {:>10}", "sites", stats.sites);
    println!("{:<18} {:>10}", "classifications", stats.classifications);

    let unclassified = stats.messages.saturating_sub(stats.classifications);
    if unclassified > 0 {
        println!("\n{} messages are not classified yet.", unclassified);
    }
    Ok(())
}
