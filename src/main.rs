use slate::common::{AttrType, AttrValue, CmpOp};
use slate::engine::Engine;

fn main() {
    println!("Slate - a single-file block storage engine");
    println!("==========================================\n");

    let db_path = "demo.db";
    let _ = std::fs::remove_file(db_path);
    let engine = Engine::open(db_path).expect("Failed to open disk");
    println!("Opened disk file: {}", db_path);

    engine
        .create_relation(
            "Employees",
            &[
                ("Id", AttrType::Number),
                ("Name", AttrType::Text),
                ("Age", AttrType::Number),
            ],
        )
        .expect("Failed to create relation");
    println!("Created relation Employees(Id, Name, Age)");

    let rel = engine
        .open_relation("Employees")
        .expect("Failed to open relation");

    let rows: [(f64, &str, f64); 5] = [
        (1.0, "Ada", 36.0),
        (2.0, "Grace", 45.0),
        (3.0, "Edsger", 41.0),
        (4.0, "Barbara", 38.0),
        (5.0, "Donald", 29.0),
    ];
    for (id, name, age) in rows {
        engine
            .insert(
                rel,
                &[
                    AttrValue::Number(id),
                    AttrValue::Text(name.to_string()),
                    AttrValue::Number(age),
                ],
            )
            .expect("Failed to insert record");
    }
    println!("Inserted {} records", rows.len());

    engine
        .create_index(rel, "Age")
        .expect("Failed to build index");
    println!("Built B+ tree index on Age\n");

    println!("Employees with Age >= 38:");
    engine.catalog().reset_index_cursor(rel, "Age").unwrap();
    loop {
        match engine.search(rel, "Age", &AttrValue::Number(38.0), CmpOp::Ge) {
            Ok(record) => println!("  {} {} {}", record[0], record[1], record[2]),
            Err(slate::SlateError::NotFound) => break,
            Err(e) => panic!("search failed: {}", e),
        }
    }

    engine.close().expect("Failed to close engine");
    println!("\nFlushed and closed.");
}
