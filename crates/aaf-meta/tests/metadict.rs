//! End-to-end tests: build a metadictionary in memory, reopen it, and drive
//! objects through the runtime.

use std::sync::Arc;

use aaf_meta::codec::primitives::{WeakRef, encode_ref, encode_utf16_string};
use aaf_meta::codec::{PropertyFormat, PropertyStream, SetIndex, member_name};
use aaf_meta::model::well_known::{CLASS_DEF_CLASS, ROOT_CLASS_ID, ROOT_CLASS_NAME, classes, pids, types};
use aaf_meta::storage::join;
use aaf_meta::{
    Auid, ErrorKind, Identifier, MemoryStorage, ObjectError, ObjectRuntime, PropertyDefinition, Registries, SchemaError,
    Storage, TypeDefinition, TypeKind, Value, open_metadictionary, save_metadictionary,
};

const MD: &str = "/MetaDictionary-1";

fn baseline_file() -> MemoryStorage {
    let mut storage = MemoryStorage::new();
    let mut registries = Registries::new();
    registries
        .register_class("InterchangeObject", classes::INTERCHANGE_OBJECT, None, false)
        .unwrap();
    registries
        .register_class(
            "EssenceDescriptor",
            classes::ESSENCE_DESCRIPTOR,
            Some("InterchangeObject"),
            false,
        )
        .unwrap();
    save_metadictionary(&mut registries, &mut storage).unwrap();
    storage
}

#[test]
fn test_registered_class_survives_reopen() {
    let mut storage = baseline_file();
    let descriptor_node = join(MD, &member_name("ClassDefinitions-3", 1));
    let descriptor_bytes = storage.read_stream(&join(&descriptor_node, "properties")).unwrap();

    let mut registries = open_metadictionary(&storage).unwrap();
    registries
        .register_class("TestClass", Auid::from_u128(1), Some("EssenceDescriptor"), true)
        .unwrap();
    let int64 = registries.lookup_type_by_name("aafInt64").unwrap().id;
    registries
        .register_property(
            "TestClass",
            PropertyDefinition::new(Auid::from_u128(42), "TheAnswer", 0xBEEF, int64, true, false),
        )
        .unwrap();
    save_metadictionary(&mut registries, &mut storage).unwrap();

    // Definitions that were already in the file are not rewritten.
    assert_eq!(
        storage.read_stream(&join(&descriptor_node, "properties")).unwrap(),
        descriptor_bytes
    );

    let reopened = open_metadictionary(&storage).unwrap();
    let class = reopened.lookup_class("TestClass").unwrap();
    assert_eq!(class.id, Auid::from_u128(1));
    assert_eq!(class.parent, Some(classes::ESSENCE_DESCRIPTOR));
    assert!(class.is_concrete);
    assert_eq!(class.properties().len(), 1);

    let prop = class.property("TheAnswer").unwrap();
    assert_eq!(prop.id, Auid::from_u128(42));
    assert_eq!(prop.pid, 0xBEEF);
    assert_eq!(prop.type_id, types::INT64);
    assert!(prop.is_optional);
    assert!(!prop.is_unique);

    let ancestors: Vec<&str> = reopened
        .ancestors("TestClass")
        .unwrap()
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(ancestors, vec!["EssenceDescriptor", "InterchangeObject"]);
}

#[test]
fn test_root_class_is_never_written() {
    let mut storage = MemoryStorage::new();
    let mut registries = Registries::new();
    save_metadictionary(&mut registries, &mut storage).unwrap();

    let reopened = open_metadictionary(&storage).unwrap();
    assert!(reopened.lookup_class(ROOT_CLASS_NAME).is_none());
    assert!(reopened.lookup_class_by_id(&ROOT_CLASS_ID).is_none());
    assert!(storage.paths().iter().all(|p| !p.starts_with("/MetaDictionary-1/ClassDefinitions-3{")));
}

#[test]
fn test_stored_root_class_is_skipped_and_kept() {
    let mut storage = baseline_file();

    // Add a root class node the way other writers store it.
    let index_path = join(MD, "ClassDefinitions-3 index");
    let mut index = SetIndex::decode(&storage.read_stream(&index_path).unwrap()).unwrap();
    let root_key = index.insert(Identifier::Auid(ROOT_CLASS_ID)).unwrap();
    storage.write_stream(&index_path, index.encode().unwrap()).unwrap();

    let mut props = PropertyStream::new();
    props.insert(pids::IDENTIFICATION, PropertyFormat::Data, ROOT_CLASS_ID.to_bytes_le().to_vec());
    props.insert(pids::NAME, PropertyFormat::Data, encode_utf16_string(ROOT_CLASS_NAME));
    props.insert(
        pids::CLASS_PARENT,
        PropertyFormat::WeakRef,
        encode_ref(&WeakRef::new(pids::IDENTIFICATION, ROOT_CLASS_ID)),
    );
    props.insert(pids::CLASS_IS_CONCRETE, PropertyFormat::Data, vec![0]);
    let root_node = join(MD, &member_name("ClassDefinitions-3", root_key));
    storage.create_storage(&root_node, CLASS_DEF_CLASS).unwrap();
    storage
        .write_stream(&join(&root_node, "properties"), props.encode().unwrap())
        .unwrap();
    let root_bytes = storage.read_stream(&join(&root_node, "properties")).unwrap();

    let mut registries = open_metadictionary(&storage).unwrap();
    assert!(registries.lookup_class(ROOT_CLASS_NAME).is_none());
    assert_eq!(registries.classes().len(), 2);

    let added = registries
        .register_class("Extra", Auid::from_u128(7), Some("InterchangeObject"), true)
        .unwrap()
        .id;
    save_metadictionary(&mut registries, &mut storage).unwrap();
    assert_eq!(storage.read_stream(&join(&root_node, "properties")).unwrap(), root_bytes);

    let reopened = open_metadictionary(&storage).unwrap();
    let extra = reopened.lookup_class_by_id(&added).unwrap();
    assert_ne!(extra.local_key(), Some(root_key));
    assert!(reopened.lookup_class(ROOT_CLASS_NAME).is_none());
}

#[test]
fn test_unknown_type_kind_aborts_open() {
    let mut storage = MemoryStorage::new();
    let mut registries = Registries::new();
    registries
        .register_type(TypeDefinition::new(
            Auid::from_u128(0x900),
            "Counter",
            TypeKind::Int { size: 4, signed: false },
        ))
        .unwrap();
    registries.register_class("A", Auid::from_u128(0x901), None, true).unwrap();
    save_metadictionary(&mut registries, &mut storage).unwrap();

    let type_node = join(MD, &member_name("TypeDefinitions-4", 0));
    storage.create_storage(&type_node, Auid::from_u128(0xbad)).unwrap();

    let err = open_metadictionary(&storage).unwrap_err();
    assert!(matches!(err, SchemaError::UnknownTypeKind { .. }));
    assert_eq!(err.kind(), ErrorKind::UnknownTypeKind);
    assert!(err.kind().is_schema_fatal());
}

#[test]
fn test_shadowing_survives_reopen() {
    let mut storage = MemoryStorage::new();
    let mut registries = Registries::new();
    registries.register_class("A", Auid::from_u128(0xa), None, false).unwrap();
    registries.register_class("B", Auid::from_u128(0xb), Some("A"), false).unwrap();
    registries.register_class("C", Auid::from_u128(0xc), Some("B"), true).unwrap();
    for (class, id, name, pid, type_id) in [
        ("A", 0xa1, "Length", 0x8101, types::INT32),
        ("A", 0xa2, "Label", 0x8102, types::STRING),
        ("B", 0xb1, "Flags", 0x8201, types::UINT16),
        ("C", 0xc1, "Length", 0x8301, types::INT64),
    ] {
        registries
            .register_property(
                class,
                PropertyDefinition::new(Auid::from_u128(id), name, pid, type_id, true, false),
            )
            .unwrap();
    }
    save_metadictionary(&mut registries, &mut storage).unwrap();

    let reopened = open_metadictionary(&storage).unwrap();
    let effective = reopened.effective_properties("C").unwrap();
    let names: Vec<&str> = effective.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Length", "Flags", "Label"]);
    assert_eq!(effective.by_name("Length").unwrap().type_id, types::INT64);
    assert!(effective.by_pid(0x8101).is_none());
    assert_eq!(reopened.effective_properties("B").unwrap().by_pid(0x8101).unwrap().name, "Length");
}

// =============================================================================
// RUNTIME
// =============================================================================

const CONTAINER: Auid = Auid::from_u128(0x1000);
const ITEM: Auid = Auid::from_u128(0x1001);

const COLOR: Auid = Auid::from_u128(0x2000);
const POINT: Auid = Auid::from_u128(0x2001);
const STRINGS: Auid = Auid::from_u128(0x2002);
const QUAD: Auid = Auid::from_u128(0x2003);
const ANY: Auid = Auid::from_u128(0x2004);
const ITEM_REF: Auid = Auid::from_u128(0x2005);
const ITEM_SET: Auid = Auid::from_u128(0x2006);

fn object_file() -> MemoryStorage {
    let mut registries = Registries::new();
    for def in [
        TypeDefinition::new(
            COLOR,
            "Color",
            TypeKind::Enum {
                element_type: types::UINT8,
                elements: vec![(0, "Red".to_string()), (1, "Green".to_string())],
            },
        ),
        TypeDefinition::new(
            POINT,
            "Point",
            TypeKind::Record {
                members: vec![("X".to_string(), types::INT32), ("Y".to_string(), types::INT32)],
            },
        ),
        TypeDefinition::new(STRINGS, "StringArray", TypeKind::VarArray { element_type: types::STRING }),
        TypeDefinition::new(
            QUAD,
            "Quad",
            TypeKind::FixedArray {
                element_type: types::UINT8,
                count: 4,
            },
        ),
        TypeDefinition::new(ANY, "Indirect", TypeKind::Indirect),
        TypeDefinition::new(ITEM_REF, "ItemStrongReference", TypeKind::StrongRef { referenced_type: ITEM }),
        TypeDefinition::new(ITEM_SET, "ItemStrongReferenceSet", TypeKind::Set { element_type: ITEM_REF }),
    ] {
        registries.register_type(def).unwrap();
    }

    registries.register_class("Container", CONTAINER, None, true).unwrap();
    registries.register_class("Item", ITEM, None, true).unwrap();
    for (id, name, pid, type_id) in [
        (0x3000, "Color", 0x9001, COLOR),
        (0x3001, "Origin", 0x9002, POINT),
        (0x3002, "Tags", 0x9003, STRINGS),
        (0x3003, "Quad", 0x9004, QUAD),
        (0x3004, "Anything", 0x9005, ANY),
        (0x3005, "Items", 0x9006, ITEM_SET),
    ] {
        registries
            .register_property(
                "Container",
                PropertyDefinition::new(Auid::from_u128(id), name, pid, type_id, true, false),
            )
            .unwrap();
    }
    registries
        .register_property(
            "Item",
            PropertyDefinition::new(Auid::from_u128(0x3100), "ItemID", 0x9101, types::AUID, false, true),
        )
        .unwrap();

    let mut runtime = ObjectRuntime::new(MemoryStorage::new(), Arc::new(registries));
    runtime.save_metadictionary().unwrap();
    runtime.into_storage()
}

#[test]
fn test_values_survive_reopen() {
    let mut runtime = ObjectRuntime::open(object_file()).unwrap();
    let mut obj = runtime.create_object("Container").unwrap();
    let origin = Value::Record(vec![("X".to_string(), Value::Int(-3)), ("Y".to_string(), Value::Int(9))]);
    let tags = Value::Array(vec![Value::from("one"), Value::from("two")]);
    let quad = Value::Array(vec![Value::UInt(1), Value::UInt(2), Value::UInt(3), Value::UInt(4)]);
    let anything = Value::Indirect {
        type_id: types::INT16,
        value: Box::new(Value::Int(-2)),
    };
    runtime.set_property(&mut obj, "Color", "Green").unwrap();
    runtime.set_property(&mut obj, "Origin", origin.clone()).unwrap();
    runtime.set_property(&mut obj, "Tags", tags.clone()).unwrap();
    runtime.set_property(&mut obj, "Quad", quad.clone()).unwrap();
    runtime.set_property(&mut obj, "Anything", anything.clone()).unwrap();
    runtime.store_object(&mut obj, "/Container-1").unwrap();
    runtime.validate_object(&obj).unwrap();

    let mut reopened = ObjectRuntime::open(runtime.into_storage()).unwrap();
    let obj = reopened.decode_object("/Container-1").unwrap();
    assert_eq!(
        reopened.get_property(&obj, "Color").unwrap(),
        Some(Value::Enum {
            value: 1,
            name: Some("Green".to_string())
        })
    );
    assert_eq!(reopened.get_property(&obj, "Origin").unwrap(), Some(origin));
    assert_eq!(reopened.get_property(&obj, "Tags").unwrap(), Some(tags));
    assert_eq!(reopened.get_property(&obj, "Quad").unwrap(), Some(quad));
    assert_eq!(reopened.get_property(&obj, "Anything").unwrap(), Some(anything));
}

#[test]
fn test_duplicate_unique_key_after_reopen() {
    let mut runtime = ObjectRuntime::open(object_file()).unwrap();
    let mut owner = runtime.create_object("Container").unwrap();
    runtime.store_object(&mut owner, "/Container-1").unwrap();
    for id in [1u128, 2] {
        let mut item = runtime.create_object("Item").unwrap();
        runtime.set_property(&mut item, "ItemID", Auid::from_u128(id)).unwrap();
        runtime.insert_set_member(&mut owner, "Items", &mut item).unwrap();
    }

    let mut reopened = ObjectRuntime::open(runtime.into_storage()).unwrap();
    let owner = reopened.decode_object("/Container-1").unwrap();
    let Some(Value::StrongRefSet(members)) = reopened.get_property(&owner, "Items").unwrap() else {
        panic!("expected a strong reference set");
    };
    assert_eq!(members.len(), 2);
    let first = reopened.open_ref(&members[0]).unwrap();
    let mut second = reopened.open_ref(&members[1]).unwrap();
    let first_before = first.clone();
    let second_before = second.clone();

    let err = reopened
        .set_property(&mut second, "ItemID", Auid::from_u128(1))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateUniqueKey);
    assert!(matches!(err, ObjectError::DuplicateUniqueKey { ref holder, .. } if holder == first.path().unwrap()));
    assert_eq!(first, first_before);
    assert_eq!(second, second_before);
    assert_eq!(
        reopened.get_property(&second, "ItemID").unwrap(),
        Some(Value::Auid(Auid::from_u128(2)))
    );
}
