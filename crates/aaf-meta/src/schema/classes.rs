//! Class definition registry.
//!
//! Classes form a tree below the root sentinel. Effective property tables
//! (own properties plus every ancestor's, own winning on name collision)
//! are built eagerly whenever the class set changes.

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::codec::index::{SetIndex, member_name};
use crate::codec::properties::PropertyFormat;
use crate::error::SchemaError;
use crate::limits::{INDEX_SUFFIX, MANGLED_NAME_SIZE, MAX_CLASS_DEPTH, PROPERTIES_STREAM};
use crate::model::classdef::StoredSet;
use crate::model::well_known::{CLASS_DEF_CLASS, PROPERTY_DEF_CLASS, ROOT_CLASS_ID, ROOT_CLASS_NAME, pids};
use crate::model::{Auid, ClassDefinition, Identifier, PropertyDefinition};
use crate::schema::{DefinitionReader, DefinitionWriter, StagedWrites, mangle_name, read_properties};
use crate::storage::{Storage, join};

/// The properties an object of some class may carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveProperties {
    list: Vec<PropertyDefinition>,
    by_name: FxHashMap<String, usize>,
    by_pid: FxHashMap<u16, usize>,
}

impl EffectiveProperties {
    fn push(&mut self, prop: &PropertyDefinition) {
        if self.by_name.contains_key(&prop.name) {
            return;
        }
        let idx = self.list.len();
        self.by_name.insert(prop.name.clone(), idx);
        self.by_pid.entry(prop.pid).or_insert(idx);
        self.list.push(prop.clone());
    }

    /// Looks up a property by name.
    pub fn by_name(&self, name: &str) -> Option<&PropertyDefinition> {
        self.by_name.get(name).map(|&i| &self.list[i])
    }

    /// Looks up a property by pid.
    pub fn by_pid(&self, pid: u16) -> Option<&PropertyDefinition> {
        self.by_pid.get(&pid).map(|&i| &self.list[i])
    }

    /// Iterates own properties first, then each ancestor's, nearest first.
    pub fn iter(&self) -> impl Iterator<Item = &PropertyDefinition> {
        self.list.iter()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Returns the first property marked as unique identifier.
    pub fn unique_identifier(&self) -> Option<&PropertyDefinition> {
        self.list.iter().find(|p| p.is_unique)
    }
}

/// Class definitions keyed by identification and by name.
#[derive(Debug, Clone)]
pub struct ClassRegistry {
    classes: FxHashMap<Auid, ClassDefinition>,
    order: Vec<Auid>,
    by_name: FxHashMap<String, Auid>,
    effective: FxHashMap<Auid, EffectiveProperties>,
    max_depth: usize,
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new(MAX_CLASS_DEPTH)
    }
}

impl ClassRegistry {
    /// Creates an empty registry; parent chains longer than `max_depth`
    /// are reported as cycles.
    pub fn new(max_depth: usize) -> Self {
        Self {
            classes: FxHashMap::default(),
            order: Vec::new(),
            by_name: FxHashMap::default(),
            effective: FxHashMap::default(),
            max_depth,
        }
    }

    /// Adds a class without linking it. Call [`ClassRegistry::link`] once
    /// every class is in.
    pub fn insert(&mut self, class: ClassDefinition) -> Result<(), SchemaError> {
        if class.id == ROOT_CLASS_ID || class.name == ROOT_CLASS_NAME {
            return Err(SchemaError::RootClassReserved { name: class.name });
        }
        if self.classes.contains_key(&class.id) || self.by_name.contains_key(&class.name) {
            return Err(SchemaError::DuplicateClass {
                id: class.id,
                name: class.name,
            });
        }
        self.by_name.insert(class.name.clone(), class.id);
        self.order.push(class.id);
        self.classes.insert(class.id, class);
        Ok(())
    }

    /// Checks every parent link and rebuilds the effective property tables.
    pub fn link(&mut self) -> Result<(), SchemaError> {
        for id in &self.order {
            let class = &self.classes[id];
            if let Some(parent) = class.parent {
                if !self.classes.contains_key(&parent) {
                    return Err(SchemaError::UnknownParent {
                        class: class.name.clone(),
                        parent: parent.to_string(),
                    });
                }
            }
        }

        let mut effective = FxHashMap::default();
        for id in &self.order {
            let mut table = EffectiveProperties::default();
            for prop in &self.classes[id].properties {
                table.push(prop);
            }
            for ancestor in self.ancestors(id)? {
                for prop in &ancestor.properties {
                    table.push(prop);
                }
            }
            effective.insert(*id, table);
        }
        self.effective = effective;
        Ok(())
    }

    /// Looks up a class by identification.
    pub fn get(&self, id: &Auid) -> Option<&ClassDefinition> {
        self.classes.get(id)
    }

    /// Looks up a class by name.
    pub fn by_name(&self, name: &str) -> Option<&ClassDefinition> {
        self.by_name.get(name).and_then(|id| self.classes.get(id))
    }

    /// Iterates classes in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ClassDefinition> {
        self.order.iter().filter_map(|id| self.classes.get(id))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Returns the parent chain of a class, nearest first, root excluded.
    pub fn ancestors(&self, id: &Auid) -> Result<Vec<&ClassDefinition>, SchemaError> {
        let Some(class) = self.classes.get(id) else {
            return Err(SchemaError::UnknownClass { name: id.to_string() });
        };
        let mut chain = Vec::new();
        let mut next = class.parent;
        while let Some(parent_id) = next {
            if chain.len() >= self.max_depth {
                return Err(SchemaError::SchemaCycle {
                    class: class.name.clone(),
                    max_depth: self.max_depth,
                });
            }
            let parent = self.classes.get(&parent_id).ok_or_else(|| SchemaError::UnknownParent {
                class: class.name.clone(),
                parent: parent_id.to_string(),
            })?;
            chain.push(parent);
            next = parent.parent;
        }
        Ok(chain)
    }

    /// Returns true if `id` is `ancestor` or derives from it.
    pub fn is_a(&self, id: &Auid, ancestor: &Auid) -> bool {
        id == ancestor
            || self
                .ancestors(id)
                .map(|chain| chain.iter().any(|c| c.id == *ancestor))
                .unwrap_or(false)
    }

    /// Returns the effective property table of a class.
    pub fn effective_properties(&self, id: &Auid) -> Option<&EffectiveProperties> {
        self.effective.get(id)
    }

    /// Adds a class below `parent_name` (`None` or the root name for a
    /// top-level class) and relinks.
    pub fn register_class(
        &mut self,
        name: &str,
        id: Auid,
        parent_name: Option<&str>,
        is_concrete: bool,
    ) -> Result<&ClassDefinition, SchemaError> {
        let parent = match parent_name {
            None => None,
            Some(p) if p == ROOT_CLASS_NAME => None,
            Some(p) => Some(
                self.by_name
                    .get(p)
                    .copied()
                    .ok_or_else(|| SchemaError::UnknownParent {
                        class: name.to_string(),
                        parent: p.to_string(),
                    })?,
            ),
        };
        self.insert(ClassDefinition::new(id, name, parent, is_concrete))?;
        self.link()?;
        Ok(&self.classes[&id])
    }

    /// Adds a property to a class and relinks. The caller checks the type.
    ///
    /// The pid and identification must be free in the class, its ancestors,
    /// and every class deriving from it.
    pub fn register_property(
        &mut self,
        class_name: &str,
        prop: PropertyDefinition,
    ) -> Result<&PropertyDefinition, SchemaError> {
        let id = *self
            .by_name
            .get(class_name)
            .ok_or_else(|| SchemaError::UnknownClass {
                name: class_name.to_string(),
            })?;
        let duplicate = |class: &str, existing: &PropertyDefinition| SchemaError::DuplicateProperty {
            class: class.to_string(),
            name: existing.name.clone(),
            pid: existing.pid,
        };
        // Own properties of every ancestor and descendant, shadowed ones included.
        for class_id in &self.order {
            if !self.is_a(class_id, &id) && !self.is_a(&id, class_id) {
                continue;
            }
            let class = &self.classes[class_id];
            if let Some(existing) = class.properties.iter().find(|p| p.pid == prop.pid || p.id == prop.id) {
                return Err(duplicate(&class.name, existing));
            }
        }
        if let Some(existing) = self.classes[&id].properties.iter().find(|p| p.name == prop.name) {
            return Err(duplicate(class_name, existing));
        }

        let class = self.classes.get_mut(&id).ok_or_else(|| SchemaError::UnknownClass {
            name: class_name.to_string(),
        })?;
        class.properties.push(prop);
        let index = class.properties.len() - 1;
        self.link()?;
        Ok(&self.classes[&id].properties[index])
    }

    pub(crate) fn get_mut(&mut self, id: &Auid) -> Option<&mut ClassDefinition> {
        self.classes.get_mut(id)
    }

    pub(crate) fn ids(&self) -> Vec<Auid> {
        self.order.clone()
    }
}

// =============================================================================
// READING
// =============================================================================

/// Parses the class definition node stored at `path`.
///
/// Returns `None` for the root class sentinel, which is never surfaced.
pub(crate) fn parse_class_def<S: Storage + ?Sized>(
    storage: &S,
    path: &str,
) -> Result<Option<ClassDefinition>, SchemaError> {
    let def = DefinitionReader::open(storage, path)?;
    let id = def.auid(pids::IDENTIFICATION, "identification")?;
    let name = def.string(pids::NAME, "name")?;
    if id == ROOT_CLASS_ID {
        warn!(path, name = %name, "skipping root class definition");
        return Ok(None);
    }

    let parent_id = def.reference(pids::CLASS_PARENT, "class.parent")?;
    let parent = (parent_id != ROOT_CLASS_ID && parent_id != id).then_some(parent_id);

    let mut class = ClassDefinition::new(id, name, parent, def.flag(pids::CLASS_IS_CONCRETE, "class.is_concrete")?);
    class.description = def.optional_string(pids::DESCRIPTION)?;

    if def.contains(pids::CLASS_PROPERTIES) {
        let set_name = def.string(pids::CLASS_PROPERTIES, "class.properties")?;
        let data = storage.read_stream(&join(path, &format!("{}{}", set_name, INDEX_SUFFIX)))?;
        let index = SetIndex::decode(&data).map_err(|source| SchemaError::Definition {
            path: path.to_string(),
            source,
        })?;
        for entry in index.entries() {
            let prop_path = join(path, &member_name(&set_name, entry.local_key));
            let mut prop = parse_property_def(storage, &prop_path)?;
            prop.local_key = Some(entry.local_key);
            class.properties.push(prop);
        }
        class.property_set = Some(StoredSet { name: set_name, index });
    }
    Ok(Some(class))
}

fn parse_property_def<S: Storage + ?Sized>(storage: &S, path: &str) -> Result<PropertyDefinition, SchemaError> {
    let def = DefinitionReader::open(storage, path)?;
    let mut prop = PropertyDefinition::new(
        def.auid(pids::IDENTIFICATION, "identification")?,
        def.string(pids::NAME, "name")?,
        def.u16(pids::PROPERTY_LOCAL_ID, "property.local_id")?,
        def.auid(pids::PROPERTY_TYPE, "property.type")?,
        def.flag(pids::PROPERTY_IS_OPTIONAL, "property.is_optional")?,
        def.optional_flag(pids::PROPERTY_IS_UNIQUE),
    );
    prop.description = def.optional_string(pids::DESCRIPTION)?;
    Ok(prop)
}

// =============================================================================
// WRITING
// =============================================================================

fn stage_property_def(writes: &mut StagedWrites, path: &str, prop: &PropertyDefinition) -> Result<(), SchemaError> {
    let mut out = DefinitionWriter::new();
    out.header(&prop.id, &prop.name, prop.description.as_deref());
    out.auid(pids::PROPERTY_TYPE, &prop.type_id);
    out.flag(pids::PROPERTY_IS_OPTIONAL, prop.is_optional);
    out.bytes(pids::PROPERTY_LOCAL_ID, prop.pid.to_le_bytes().to_vec());
    out.flag(pids::PROPERTY_IS_UNIQUE, prop.is_unique);
    let data = out.finish().encode().map_err(|source| SchemaError::Encode {
        name: prop.name.clone(),
        source,
    })?;
    writes.storage(path.to_string(), PROPERTY_DEF_CLASS);
    writes.stream(join(path, PROPERTIES_STREAM), data);
    Ok(())
}

/// Stages a new class node (replacing anything left at `path`), or the
/// unsaved properties of an existing one.
///
/// Properties already in the file, and existing class nodes without new
/// properties, are not touched. The node's own property stream is staged
/// last, after its property set.
pub(crate) fn stage_class_def<S: Storage + ?Sized>(
    storage: &S,
    writes: &mut StagedWrites,
    path: &str,
    class: &mut ClassDefinition,
    is_new: bool,
) -> Result<(), SchemaError> {
    if !is_new && !class.has_unsaved_properties() {
        return Ok(());
    }
    let encode_err = |name: &str, source| SchemaError::Encode {
        name: name.to_string(),
        source,
    };

    let mut out = if is_new {
        let mut out = DefinitionWriter::new();
        out.header(&class.id, &class.name, class.description.as_deref());
        // Top-level classes point at themselves.
        out.reference(pids::CLASS_PARENT, &class.parent.unwrap_or(class.id));
        out.flag(pids::CLASS_IS_CONCRETE, class.is_concrete);
        writes.remove(path.to_string());
        writes.storage(path.to_string(), CLASS_DEF_CLASS);
        out
    } else {
        DefinitionWriter::from_stream(read_properties(storage, path)?)
    };

    if class.has_unsaved_properties() {
        let set = class.property_set.get_or_insert_with(|| StoredSet {
            name: mangle_name("Properties", pids::CLASS_PROPERTIES, MANGLED_NAME_SIZE),
            index: SetIndex::new(pids::IDENTIFICATION, 16),
        });
        out.collection(pids::CLASS_PROPERTIES, PropertyFormat::StrongRefSet, &set.name);

        for prop in class.properties.iter_mut().filter(|p| p.local_key.is_none()) {
            let local_key = set.index.insert(Identifier::Auid(prop.id)).ok_or_else(|| {
                SchemaError::DuplicateProperty {
                    class: class.name.clone(),
                    name: prop.name.clone(),
                    pid: prop.pid,
                }
            })?;
            let prop_path = join(path, &member_name(&set.name, local_key));
            writes.remove(prop_path.clone());
            stage_property_def(writes, &prop_path, prop)?;
            prop.local_key = Some(local_key);
        }
        let index = set.index.encode().map_err(|e| encode_err(&class.name, e))?;
        writes.stream(join(path, &format!("{}{}", set.name, INDEX_SUFFIX)), index);
    }

    let data = out.finish().encode().map_err(|e| encode_err(&class.name, e))?;
    writes.stream(join(path, PROPERTIES_STREAM), data);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::well_known::types;

    fn prop(name: &str, pid: u16, optional: bool) -> PropertyDefinition {
        PropertyDefinition::new(
            Auid::from_u128(0x5000 + pid as u128),
            name,
            pid,
            types::INT32,
            optional,
            false,
        )
    }

    fn three_levels() -> ClassRegistry {
        let mut registry = ClassRegistry::default();
        registry
            .register_class("InterchangeObject", Auid::from_u128(1), None, false)
            .unwrap();
        registry
            .register_class("Component", Auid::from_u128(2), Some("InterchangeObject"), false)
            .unwrap();
        registry
            .register_class("Filler", Auid::from_u128(3), Some("Component"), true)
            .unwrap();
        registry.register_property("InterchangeObject", prop("Generation", 0x0102, true)).unwrap();
        registry.register_property("Component", prop("Length", 0x0202, true)).unwrap();
        registry.register_property("Component", prop("DataDefinition", 0x0201, false)).unwrap();
        registry
    }

    #[test]
    fn test_effective_properties_three_levels() {
        let registry = three_levels();
        let filler = registry.by_name("Filler").unwrap();
        let effective = registry.effective_properties(&filler.id).unwrap();
        let names: Vec<&str> = effective.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Length", "DataDefinition", "Generation"]);
        assert_eq!(effective.by_pid(0x0102).map(|p| p.name.as_str()), Some("Generation"));

        let ancestors: Vec<&str> = registry
            .ancestors(&filler.id)
            .unwrap()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(ancestors, vec!["Component", "InterchangeObject"]);
        assert!(registry.is_a(&filler.id, &Auid::from_u128(1)));
        assert!(!registry.is_a(&Auid::from_u128(1), &filler.id));
    }

    #[test]
    fn test_own_property_shadows_ancestor() {
        let mut registry = three_levels();
        let mut shadow = prop("Length", 0x0300, false);
        shadow.type_id = types::INT64;
        registry.register_property("Filler", shadow).unwrap();

        let filler = registry.by_name("Filler").unwrap();
        let effective = registry.effective_properties(&filler.id).unwrap();
        let length = effective.by_name("Length").unwrap();
        assert_eq!(length.type_id, types::INT64);
        assert_eq!(length.pid, 0x0300);
        // The shadowed definition is gone from the effective table.
        assert!(effective.by_pid(0x0202).is_none());
        assert_eq!(effective.len(), 3);
    }

    #[test]
    fn test_duplicate_property() {
        let mut registry = three_levels();
        let err = registry
            .register_property("Filler", prop("Other", 0x0102, true))
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateProperty { pid: 0x0102, .. }));
        let err = registry
            .register_property("Component", prop("Length", 0x0400, true))
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateProperty { .. }));
    }

    #[test]
    fn test_duplicate_property_identification() {
        let mut registry = three_levels();
        let mut same_id = prop("Duration", 0x0203, true);
        same_id.id = Auid::from_u128(0x5202);
        assert_eq!(
            registry.register_property("Component", same_id).err(),
            Some(SchemaError::DuplicateProperty {
                class: "Component".to_string(),
                name: "Length".to_string(),
                pid: 0x0202,
            })
        );
        assert_eq!(registry.get(&Auid::from_u128(2)).unwrap().properties().len(), 2);
    }

    #[test]
    fn test_pid_taken_by_descendant() {
        let mut registry = three_levels();
        registry.register_property("Filler", prop("Gap", 0x0301, true)).unwrap();
        let err = registry
            .register_property("InterchangeObject", prop("ObjClass", 0x0301, true))
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::DuplicateProperty {
                class: "Filler".to_string(),
                name: "Gap".to_string(),
                pid: 0x0301,
            }
        );
        let filler = registry.by_name("Filler").unwrap();
        assert_eq!(
            registry.effective_properties(&filler.id).unwrap().by_pid(0x0301).map(|p| p.name.as_str()),
            Some("Gap")
        );
    }

    #[test]
    fn test_pid_of_shadowed_ancestor_property() {
        let mut registry = three_levels();
        registry.register_property("Filler", prop("Length", 0x0302, true)).unwrap();
        assert_eq!(
            registry.register_property("Filler", prop("Offset", 0x0202, true)).err(),
            Some(SchemaError::DuplicateProperty {
                class: "Component".to_string(),
                name: "Length".to_string(),
                pid: 0x0202,
            })
        );
    }

    #[test]
    fn test_root_name_reserved() {
        let mut registry = ClassRegistry::default();
        assert_eq!(
            registry.register_class("Root", Auid::from_u128(5), None, true).err(),
            Some(SchemaError::RootClassReserved {
                name: "Root".to_string()
            })
        );
        assert!(registry.register_class("A", Auid::from_u128(5), Some("Root"), true).is_ok());
        assert_eq!(registry.get(&Auid::from_u128(5)).unwrap().parent, None);
    }

    #[test]
    fn test_unknown_parent() {
        let mut registry = ClassRegistry::default();
        assert!(matches!(
            registry.register_class("A", Auid::from_u128(5), Some("Missing"), true),
            Err(SchemaError::UnknownParent { .. })
        ));

        registry
            .insert(ClassDefinition::new(Auid::from_u128(6), "B", Some(Auid::from_u128(99)), true))
            .unwrap();
        assert!(matches!(registry.link(), Err(SchemaError::UnknownParent { .. })));
    }

    #[test]
    fn test_parent_cycle_is_bounded() {
        let mut registry = ClassRegistry::new(8);
        registry
            .insert(ClassDefinition::new(Auid::from_u128(1), "A", Some(Auid::from_u128(2)), true))
            .unwrap();
        registry
            .insert(ClassDefinition::new(Auid::from_u128(2), "B", Some(Auid::from_u128(1)), true))
            .unwrap();
        let err = registry.link().unwrap_err();
        assert_eq!(
            err,
            SchemaError::SchemaCycle {
                class: "A".to_string(),
                max_depth: 8
            }
        );
        assert!(err.kind().is_schema_fatal());
    }

    #[test]
    fn test_class_node_roundtrip() {
        use crate::storage::MemoryStorage;

        let mut registry = three_levels();
        let mut storage = MemoryStorage::new();
        let id = registry.by_name("Component").unwrap().id;
        let class = registry.get_mut(&id).unwrap();
        let mut writes = StagedWrites::new();
        stage_class_def(&storage, &mut writes, "/C", class, true).unwrap();
        writes.apply(&mut storage).unwrap();
        assert!(!class.has_unsaved_properties());
        assert!(storage.exists("/C/Properties-9 index"));
        assert!(storage.exists("/C/Properties-9{1}/properties"));

        let parsed = parse_class_def(&storage, "/C").unwrap().unwrap();
        assert_eq!(parsed.name, "Component");
        assert_eq!(parsed.parent, Some(Auid::from_u128(1)));
        assert_eq!(parsed.properties.len(), 2);
        assert_eq!(parsed.properties[1].local_key, Some(1));
        assert_eq!(parsed, *class);
    }

    #[test]
    fn test_top_level_class_points_at_itself() {
        use crate::storage::MemoryStorage;

        let mut class = ClassDefinition::new(Auid::from_u128(7), "Top", None, false);
        let mut storage = MemoryStorage::new();
        let mut writes = StagedWrites::new();
        stage_class_def(&storage, &mut writes, "/C", &mut class, true).unwrap();
        writes.apply(&mut storage).unwrap();
        let props = read_properties(&storage, "/C").unwrap();
        let weakref = crate::codec::primitives::decode_ref(props.get(pids::CLASS_PARENT).unwrap()).unwrap();
        assert_eq!(weakref.key, Identifier::Auid(Auid::from_u128(7)));
        assert!(!props.contains(pids::CLASS_PROPERTIES));
        assert_eq!(parse_class_def(&storage, "/C").unwrap().unwrap().parent, None);
    }
}
