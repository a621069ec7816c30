//! Basic usage example for ehash
//!
//! This example demonstrates the fundamental operations:
//! - Opening a database
//! - Creating an extendable hash index
//! - Inserting and looking up entries
//! - Deleting an entry

use ehash::{Database, Index, IndexOptions, Options, RecordId, Value};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::init();

    // Configure database options
    let options = Options::default().block_size(1024);

    // Open database (will be created if it doesn't exist)
    let db = Database::open("./example_data", options)?;
    println!("Database opened successfully");

    // Small buckets so the directory visibly grows
    let tx = db.begin();
    let mut index = db.open_index(&tx, "student_id", IndexOptions::default().bucket_capacity(4))?;

    println!("Inserting entries...");
    for id in 0..100 {
        index.insert(&Value::Int(id), RecordId::new(id as u32 / 10, id as u32 % 10))?;
    }
    let stats = index.stats()?;
    println!(
        "global depth {}, {} buckets, {} entries",
        stats.global_depth, stats.bucket_count, stats.entry_count
    );

    // Look up a key
    index.position(&Value::Int(42))?;
    while index.advance()? {
        println!("42 => {}", index.current_locator()?);
    }

    // Delete an entry
    println!("Deleting 42...");
    let removed = index.delete(&Value::Int(42), RecordId::new(4, 2))?;
    println!("removed: {}", removed);

    index.close();
    tx.commit()?;

    // Close database
    db.close()?;
    println!("Database closed");

    Ok(())
}
