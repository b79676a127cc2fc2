//! Reads across the loose store, packs, and the alternates chain.

use grit_object::ObjectType;
use grit_odb::ObjectDb;
use grit_pack::build::PackBuilder;

#[test]
fn packed_object_read_matches_loose() {
    let dir = tempfile::tempdir().unwrap();
    let objects_dir = dir.path().join("objects");
    std::fs::create_dir_all(objects_dir.join("pack")).unwrap();

    let content = b"identical bytes either way\n";

    let mut builder = PackBuilder::new();
    let oid = builder.add_object(ObjectType::Blob, content);
    builder
        .write_to(objects_dir.join("pack"), "pack-one")
        .unwrap();

    let odb = ObjectDb::open_with_alternates(&objects_dir, &[]).unwrap();
    let (_, packed) = odb.read(&oid).unwrap().unwrap();

    // Write the same content loose into a second database; both reads
    // must agree byte for byte.
    let dir2 = tempfile::tempdir().unwrap();
    let odb2 = ObjectDb::open_with_alternates(dir2.path(), &[]).unwrap();
    let loose_oid = odb2.write(ObjectType::Blob, content).unwrap();
    assert_eq!(loose_oid, oid);
    let (_, loose) = odb2.read(&oid).unwrap().unwrap();

    assert_eq!(packed, loose);
}

#[test]
fn loose_shadows_pack() {
    let dir = tempfile::tempdir().unwrap();
    let objects_dir = dir.path().join("objects");
    std::fs::create_dir_all(objects_dir.join("pack")).unwrap();

    let content = b"stored twice";
    let mut builder = PackBuilder::new();
    let oid = builder.add_object(ObjectType::Blob, content);
    builder
        .write_to(objects_dir.join("pack"), "pack-dup")
        .unwrap();

    let odb = ObjectDb::open_with_alternates(&objects_dir, &[]).unwrap();
    odb.write(ObjectType::Blob, content).unwrap();

    assert_eq!(odb.read(&oid).unwrap().unwrap().1, content);
    // Both storages known, one digest reported.
    let all = odb.iter_all_oids().unwrap();
    assert_eq!(all.iter().filter(|o| **o == oid).count(), 1);
}

#[test]
fn alternate_chain_is_searched() {
    let primary = tempfile::tempdir().unwrap();
    let alt = tempfile::tempdir().unwrap();

    let alt_odb = ObjectDb::open_with_alternates(alt.path(), &[]).unwrap();
    let oid = alt_odb.write(ObjectType::Blob, b"borrowed").unwrap();

    let odb =
        ObjectDb::open_with_alternates(primary.path(), &[alt.path().to_path_buf()]).unwrap();
    assert!(odb.contains(&oid));
    assert_eq!(odb.read(&oid).unwrap().unwrap().1, b"borrowed");

    // Writes still land in the primary directory only.
    let new_oid = odb.write(ObjectType::Blob, b"local").unwrap();
    assert!(primary.path().join(new_oid.loose_path()).exists());
    assert!(!alt.path().join(new_oid.loose_path()).exists());
}

#[test]
fn missing_alternate_is_skipped() {
    let primary = tempfile::tempdir().unwrap();
    let odb = ObjectDb::open_with_alternates(
        primary.path(),
        &[primary.path().join("no-such-dir")],
    )
    .unwrap();
    let oid = odb.write(ObjectType::Blob, b"fine").unwrap();
    assert!(odb.contains(&oid));
}
