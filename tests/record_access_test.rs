//! Integration tests for the record-block access layer and the catalog
//! maintenance operations built on it.

use slate::common::{
    AttrType, AttrValue, CmpOp, SlateError, ATTRCAT_RELID, CATALOG_SLOTS_PER_BLOCK, RELCAT_RELID,
};
use slate::engine::Engine;

use tempfile::NamedTempFile;

fn open_engine() -> (Engine, NamedTempFile) {
    let temp = NamedTempFile::new().unwrap();
    let engine = Engine::open(temp.path()).unwrap();
    (engine, temp)
}

fn number(record: &[AttrValue], index: usize) -> f64 {
    record[index].as_number().unwrap()
}

#[test]
fn test_insert_and_search_single_block() {
    let (engine, _temp) = open_engine();

    engine
        .create_relation("Pairs", &[("K", AttrType::Number), ("V", AttrType::Text)])
        .unwrap();
    let rel = engine.open_relation("Pairs").unwrap();

    for (k, v) in [(1.0, "a"), (3.0, "b"), (2.0, "c")] {
        engine
            .insert(rel, &[AttrValue::Number(k), AttrValue::Text(v.into())])
            .unwrap();
    }

    let record = engine
        .search(rel, "K", &AttrValue::Number(2.0), CmpOp::Eq)
        .unwrap();
    assert_eq!(record[1], AttrValue::Text("c".into()));
}

#[test]
fn test_insert_extends_chain_past_first_block() {
    let (engine, _temp) = open_engine();

    engine
        .create_relation("Wide", &[("K", AttrType::Number), ("V", AttrType::Text)])
        .unwrap();
    let rel = engine.open_relation("Wide").unwrap();

    let slots = engine.catalog().rel_meta(rel).unwrap().slots_per_block;

    // Fill the first block exactly, then spill into a second.
    for i in 0..=slots {
        engine
            .insert(
                rel,
                &[AttrValue::Number(i as f64), AttrValue::Text("x".into())],
            )
            .unwrap();
    }

    let meta = engine.catalog().rel_meta(rel).unwrap();
    assert_eq!(meta.record_count, slots + 1);
    assert_ne!(meta.first_block, meta.last_block, "chain has two blocks");

    // The spilled record is reachable by scan.
    let record = engine
        .search(rel, "K", &AttrValue::Number(slots as f64), CmpOp::Eq)
        .unwrap();
    assert_eq!(number(&record, 0), slots as f64);
}

#[test]
fn test_scan_cursor_yields_each_match_once() {
    let (engine, _temp) = open_engine();

    engine
        .create_relation("Nums", &[("K", AttrType::Number)])
        .unwrap();
    let rel = engine.open_relation("Nums").unwrap();

    for k in [5.0, 3.0, 8.0, 3.0, 1.0, 3.0] {
        engine.insert(rel, &[AttrValue::Number(k)]).unwrap();
    }

    // Three records match K = 3; the cursor advances past each hit.
    engine.catalog().reset_scan_cursor(rel).unwrap();
    let mut hits = 0;
    loop {
        match engine.search(rel, "K", &AttrValue::Number(3.0), CmpOp::Eq) {
            Ok(record) => {
                assert_eq!(number(&record, 0), 3.0);
                hits += 1;
            }
            Err(SlateError::NotFound) => break,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
    assert_eq!(hits, 3);

    // After a reset the same matches come back.
    engine.catalog().reset_scan_cursor(rel).unwrap();
    assert!(engine
        .search(rel, "K", &AttrValue::Number(3.0), CmpOp::Eq)
        .is_ok());
}

#[test]
fn test_scan_operators() {
    let (engine, _temp) = open_engine();

    engine
        .create_relation("Ops", &[("K", AttrType::Number)])
        .unwrap();
    let rel = engine.open_relation("Ops").unwrap();

    for k in 1..=6 {
        engine.insert(rel, &[AttrValue::Number(k as f64)]).unwrap();
    }

    let count_matches = |op: CmpOp, value: f64| -> usize {
        engine.catalog().reset_scan_cursor(rel).unwrap();
        let mut count = 0;
        while engine
            .search(rel, "K", &AttrValue::Number(value), op)
            .is_ok()
        {
            count += 1;
        }
        count
    };

    assert_eq!(count_matches(CmpOp::Eq, 4.0), 1);
    assert_eq!(count_matches(CmpOp::Ne, 4.0), 5);
    assert_eq!(count_matches(CmpOp::Lt, 4.0), 3);
    assert_eq!(count_matches(CmpOp::Le, 4.0), 4);
    assert_eq!(count_matches(CmpOp::Gt, 4.0), 2);
    assert_eq!(count_matches(CmpOp::Ge, 4.0), 3);
}

#[test]
fn test_relation_catalog_never_grows() {
    let (engine, _temp) = open_engine();

    // The relation catalog block has CATALOG_SLOTS_PER_BLOCK slots, two of
    // which the catalogs themselves occupy.
    let available = CATALOG_SLOTS_PER_BLOCK - 2;
    for i in 0..available {
        engine
            .create_relation(&format!("Rel{}", i), &[("K", AttrType::Number)])
            .unwrap();
    }

    assert!(matches!(
        engine.create_relation("OneTooMany", &[("K", AttrType::Number)]),
        Err(SlateError::MaxRelations)
    ));
}

#[test]
fn test_create_duplicate_relation_rejected() {
    let (engine, _temp) = open_engine();

    engine
        .create_relation("Dup", &[("K", AttrType::Number)])
        .unwrap();
    assert!(matches!(
        engine.create_relation("Dup", &[("K", AttrType::Number)]),
        Err(SlateError::RelationExists(_))
    ));
    assert!(matches!(
        engine.create_relation("RELATIONCAT", &[("K", AttrType::Number)]),
        Err(SlateError::RelationExists(_))
    ));
}

#[test]
fn test_rename_relation() {
    let (engine, _temp) = open_engine();

    engine
        .create_relation("Before", &[("K", AttrType::Number), ("V", AttrType::Text)])
        .unwrap();

    engine.rename_relation("Before", "After").unwrap();

    assert!(matches!(
        engine.open_relation("Before"),
        Err(SlateError::RelationNotFound(_))
    ));

    // The attribute catalog entries moved with the relation.
    let rel = engine.open_relation("After").unwrap();
    let attrs = engine.catalog().attrs(rel).unwrap();
    assert_eq!(attrs.len(), 2);
    assert_eq!(attrs[0].name, "K");

    engine
        .insert(rel, &[AttrValue::Number(1.0), AttrValue::Text("v".into())])
        .unwrap();
}

#[test]
fn test_rename_relation_guards() {
    let (engine, _temp) = open_engine();

    engine
        .create_relation("A", &[("K", AttrType::Number)])
        .unwrap();
    engine
        .create_relation("B", &[("K", AttrType::Number)])
        .unwrap();

    assert!(matches!(
        engine.rename_relation("A", "B"),
        Err(SlateError::RelationExists(_))
    ));
    assert!(matches!(
        engine.rename_relation("Missing", "C"),
        Err(SlateError::RelationNotFound(_))
    ));
    assert!(matches!(
        engine.rename_relation("RELATIONCAT", "C"),
        Err(SlateError::NotPermitted)
    ));

    // An open relation cannot be renamed.
    let rel = engine.open_relation("A").unwrap();
    assert!(matches!(
        engine.rename_relation("A", "C"),
        Err(SlateError::RelationOpen(_))
    ));
    engine.close_relation(rel).unwrap();
    engine.rename_relation("A", "C").unwrap();
}

#[test]
fn test_rename_attribute() {
    let (engine, _temp) = open_engine();

    engine
        .create_relation("R", &[("K", AttrType::Number), ("V", AttrType::Text)])
        .unwrap();

    assert!(matches!(
        engine.rename_attribute("R", "K", "V"),
        Err(SlateError::AttributeExists(_))
    ));
    assert!(matches!(
        engine.rename_attribute("R", "Missing", "W"),
        Err(SlateError::AttributeNotFound(_))
    ));

    engine.rename_attribute("R", "K", "Key").unwrap();

    let rel = engine.open_relation("R").unwrap();
    assert!(engine.catalog().attr_meta(rel, "Key").is_ok());
    assert!(matches!(
        engine.catalog().attr_meta(rel, "K"),
        Err(SlateError::AttributeNotFound(_))
    ));
}

#[test]
fn test_delete_relation_releases_blocks_and_catalog_entries() {
    let (engine, _temp) = open_engine();

    engine
        .create_relation("Doomed", &[("K", AttrType::Number), ("V", AttrType::Text)])
        .unwrap();
    let rel = engine.open_relation("Doomed").unwrap();

    let slots = engine.catalog().rel_meta(rel).unwrap().slots_per_block;
    for i in 0..slots + 5 {
        engine
            .insert(
                rel,
                &[AttrValue::Number(i as f64), AttrValue::Text("x".into())],
            )
            .unwrap();
    }
    let meta = engine.catalog().rel_meta(rel).unwrap();
    let (first, last) = (meta.first_block, meta.last_block);

    let relcat_before = engine.catalog().rel_meta(RELCAT_RELID).unwrap().record_count;
    let attrcat_before = engine.catalog().rel_meta(ATTRCAT_RELID).unwrap().record_count;

    // Deletion requires the relation closed.
    assert!(matches!(
        engine.delete_relation("Doomed"),
        Err(SlateError::RelationOpen(_))
    ));
    engine.close_relation(rel).unwrap();
    engine.delete_relation("Doomed").unwrap();

    use slate::common::BlockType;
    assert_eq!(
        engine.pool().block_type(first).unwrap(),
        BlockType::Unused,
        "record chain head released"
    );
    assert_eq!(
        engine.pool().block_type(last).unwrap(),
        BlockType::Unused,
        "record chain tail released"
    );

    assert!(matches!(
        engine.open_relation("Doomed"),
        Err(SlateError::RelationNotFound(_))
    ));
    assert_eq!(
        engine.catalog().rel_meta(RELCAT_RELID).unwrap().record_count,
        relcat_before - 1
    );
    assert_eq!(
        engine.catalog().rel_meta(ATTRCAT_RELID).unwrap().record_count,
        attrcat_before - 2
    );

    // The name is reusable.
    engine
        .create_relation("Doomed", &[("K", AttrType::Number)])
        .unwrap();
}

#[test]
fn test_delete_relation_guards() {
    let (engine, _temp) = open_engine();

    assert!(matches!(
        engine.delete_relation("RELATIONCAT"),
        Err(SlateError::NotPermitted)
    ));
    assert!(matches!(
        engine.delete_relation("ATTRIBUTECAT"),
        Err(SlateError::NotPermitted)
    ));
    assert!(matches!(
        engine.delete_relation("Missing"),
        Err(SlateError::RelationNotFound(_))
    ));
}

#[test]
fn test_emptied_attrcat_block_is_unlinked() {
    let (engine, _temp) = open_engine();

    // Fill the first attribute catalog block (8 free slots after the 12
    // catalog attributes) and spill ten more entries into a second block.
    let total = CATALOG_SLOTS_PER_BLOCK - 2;
    for i in 0..total {
        engine
            .create_relation(&format!("Rel{}", i), &[("K", AttrType::Number)])
            .unwrap();
    }
    let spilled = engine.catalog().rel_meta(ATTRCAT_RELID).unwrap().last_block;
    assert_ne!(spilled, slate::common::ATTRCAT_BLOCK);

    // Deleting every relation whose attribute landed in the second block
    // empties it; the chain contracts back to the first block.
    for i in 8..total {
        engine.delete_relation(&format!("Rel{}", i)).unwrap();
    }

    use slate::common::BlockType;
    assert_eq!(engine.pool().block_type(spilled).unwrap(), BlockType::Unused);
    let attrcat = engine.catalog().rel_meta(ATTRCAT_RELID).unwrap();
    assert_eq!(attrcat.last_block, slate::common::ATTRCAT_BLOCK);
}

#[test]
fn test_catalog_state_survives_reopen() {
    let temp = NamedTempFile::new().unwrap();
    let path = temp.path().to_path_buf();

    {
        let engine = Engine::open(&path).unwrap();
        engine
            .create_relation(
                "Persisted",
                &[("K", AttrType::Number), ("V", AttrType::Text)],
            )
            .unwrap();
        let rel = engine.open_relation("Persisted").unwrap();
        for i in 0..10 {
            engine
                .insert(
                    rel,
                    &[
                        AttrValue::Number(i as f64),
                        AttrValue::Text(format!("v{}", i)),
                    ],
                )
                .unwrap();
        }
        engine.close().unwrap();
    }

    let engine = Engine::open(&path).unwrap();
    let rel = engine.open_relation("Persisted").unwrap();
    assert_eq!(engine.catalog().rel_meta(rel).unwrap().record_count, 10);

    let record = engine
        .search(rel, "K", &AttrValue::Number(7.0), CmpOp::Eq)
        .unwrap();
    assert_eq!(record[1], AttrValue::Text("v7".into()));
}
