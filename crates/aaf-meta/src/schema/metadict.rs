//! Opening and saving the metadictionary.

use tracing::debug;

use crate::codec::index::{SetIndex, member_name};
use crate::codec::properties::{PropertyFormat, PropertyStream};
use crate::codec::value::TypeResolver;
use crate::error::SchemaError;
use crate::limits::{INDEX_SUFFIX, MANGLED_NAME_SIZE, MAX_CLASS_DEPTH, PROPERTIES_STREAM};
use crate::model::classdef::StoredSet;
use crate::model::well_known::{METADICTIONARY_CLASS, pids};
use crate::model::{Auid, ClassDefinition, Identifier, PropertyDefinition, TypeDefinition};
use crate::schema::classes::{ClassRegistry, EffectiveProperties, parse_class_def, stage_class_def};
use crate::schema::types::{TypeRegistry, parse_type_def, stage_type_def};
use crate::schema::{DefinitionReader, DefinitionWriter, StagedWrites, mangle_name, read_properties};
use crate::storage::{Storage, join};

/// Storage path used when a file has no metadictionary yet.
pub const DEFAULT_METADICTIONARY_PATH: &str = "/MetaDictionary-1";

/// Options for building registries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    /// Parent chains longer than this are treated as cycles.
    pub max_class_depth: usize,
    /// Resolve the baseline integer, boolean, character, string, and AUID
    /// types when the file does not define them.
    pub baseline_types: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            max_class_depth: MAX_CLASS_DEPTH,
            baseline_types: true,
        }
    }
}

/// Where the metadictionary lives and the two definition sets below it.
#[derive(Debug, Clone)]
struct Layout {
    path: String,
    class_set: StoredSet,
    type_set: StoredSet,
    /// True when the metadictionary's own property stream lacks the set
    /// names and must be (re)written on save.
    header_dirty: bool,
}

/// The type and class registries of one file.
///
/// Built once at open and shared immutably afterwards; registration is
/// copy-on-write through `Arc::make_mut` at the call site.
#[derive(Debug, Clone)]
pub struct Registries {
    types: TypeRegistry,
    classes: ClassRegistry,
    layout: Option<Layout>,
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}

impl Registries {
    /// Creates empty registries with default options.
    pub fn new() -> Self {
        Self::with_options(OpenOptions::default())
    }

    /// Creates empty registries.
    pub fn with_options(options: OpenOptions) -> Self {
        Self {
            types: if options.baseline_types {
                TypeRegistry::with_baseline()
            } else {
                TypeRegistry::new()
            },
            classes: ClassRegistry::new(options.max_class_depth),
            layout: None,
        }
    }

    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    pub fn classes(&self) -> &ClassRegistry {
        &self.classes
    }

    /// Storage path of the metadictionary, once opened or saved.
    pub fn path(&self) -> Option<&str> {
        self.layout.as_ref().map(|l| l.path.as_str())
    }

    pub fn lookup_class(&self, name: &str) -> Option<&ClassDefinition> {
        self.classes.by_name(name)
    }

    pub fn lookup_class_by_id(&self, id: &Auid) -> Option<&ClassDefinition> {
        self.classes.get(id)
    }

    pub fn lookup_type(&self, id: &Auid) -> Option<&TypeDefinition> {
        self.types.get(id)
    }

    pub fn lookup_type_by_name(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.by_name(name)
    }

    fn class_id(&self, name: &str) -> Result<Auid, SchemaError> {
        self.classes
            .by_name(name)
            .map(|c| c.id)
            .ok_or_else(|| SchemaError::UnknownClass { name: name.to_string() })
    }

    /// Returns the parent chain of a class, nearest first, root excluded.
    pub fn ancestors(&self, class_name: &str) -> Result<Vec<&ClassDefinition>, SchemaError> {
        self.classes.ancestors(&self.class_id(class_name)?)
    }

    /// Returns the effective property table of a class.
    pub fn effective_properties(&self, class_name: &str) -> Result<&EffectiveProperties, SchemaError> {
        let id = self.class_id(class_name)?;
        self.classes
            .effective_properties(&id)
            .ok_or_else(|| SchemaError::UnknownClass {
                name: class_name.to_string(),
            })
    }

    /// Returns the property holding the unique key of objects of a class.
    pub fn unique_identifier(&self, class_id: &Auid) -> Option<&PropertyDefinition> {
        self.classes
            .effective_properties(class_id)
            .and_then(EffectiveProperties::unique_identifier)
    }

    /// Adds a type definition.
    pub fn register_type(&mut self, def: TypeDefinition) -> Result<(), SchemaError> {
        let mut def = def;
        def.local_key = None;
        self.types.insert(def)
    }

    /// Adds a class below `parent_name` (`None` for a top-level class).
    pub fn register_class(
        &mut self,
        name: &str,
        id: Auid,
        parent_name: Option<&str>,
        is_concrete: bool,
    ) -> Result<&ClassDefinition, SchemaError> {
        self.classes.register_class(name, id, parent_name, is_concrete)
    }

    /// Adds a property definition to a class. Its type must resolve.
    pub fn register_property(
        &mut self,
        class_name: &str,
        prop: PropertyDefinition,
    ) -> Result<&PropertyDefinition, SchemaError> {
        if !self.types.contains(&prop.type_id) {
            return Err(SchemaError::UnknownType { id: prop.type_id });
        }
        let mut prop = prop;
        prop.local_key = None;
        self.classes.register_property(class_name, prop)
    }
}

impl TypeResolver for Registries {
    fn resolve_type(&self, id: &Auid) -> Option<&TypeDefinition> {
        self.types.get(id)
    }
}

// =============================================================================
// OPEN
// =============================================================================

fn find_metadictionary<S: Storage + ?Sized>(storage: &S) -> Result<String, SchemaError> {
    for name in storage.list_children("/")? {
        let path = join("/", &name);
        if storage.is_storage(&path) && storage.class_id(&path)? == METADICTIONARY_CLASS {
            return Ok(path);
        }
    }
    Err(SchemaError::MissingMetaDictionary)
}

fn read_set<S: Storage + ?Sized>(
    storage: &S,
    md: &DefinitionReader<'_>,
    pid: u16,
    default_name: &str,
) -> Result<StoredSet, SchemaError> {
    if !md.contains(pid) {
        return Ok(StoredSet {
            name: mangle_name(default_name, pid, MANGLED_NAME_SIZE),
            index: SetIndex::new(pids::IDENTIFICATION, 16),
        });
    }
    let name = md.string(pid, "metadictionary.set_name")?;
    let data = storage.read_stream(&join(md.path(), &format!("{}{}", name, INDEX_SUFFIX)))?;
    let index = SetIndex::decode(&data).map_err(|source| SchemaError::Definition {
        path: md.path().to_string(),
        source,
    })?;
    Ok(StoredSet { name, index })
}

fn read_layout<S: Storage + ?Sized>(storage: &S, path: String) -> Result<Layout, SchemaError> {
    let (class_set, type_set, header_dirty) = {
        let md = DefinitionReader::open(storage, &path)?;
        (
            read_set(storage, &md, pids::CLASS_DEFINITIONS, "ClassDefinitions")?,
            read_set(storage, &md, pids::TYPE_DEFINITIONS, "TypeDefinitions")?,
            !md.contains(pids::CLASS_DEFINITIONS) || !md.contains(pids::TYPE_DEFINITIONS),
        )
    };
    Ok(Layout {
        path,
        class_set,
        type_set,
        header_dirty,
    })
}

/// Builds the registries from the metadictionary in `storage`.
pub fn open_metadictionary<S: Storage + ?Sized>(storage: &S) -> Result<Registries, SchemaError> {
    open_metadictionary_with(storage, OpenOptions::default())
}

/// Builds the registries from the metadictionary in `storage`.
///
/// Any malformed definition aborts the whole build.
pub fn open_metadictionary_with<S: Storage + ?Sized>(
    storage: &S,
    options: OpenOptions,
) -> Result<Registries, SchemaError> {
    let path = find_metadictionary(storage)?;
    let layout = read_layout(storage, path)?;
    let mut registries = Registries::with_options(options);

    for entry in layout.type_set.index.entries() {
        let def_path = join(&layout.path, &member_name(&layout.type_set.name, entry.local_key));
        let mut def = parse_type_def(storage, &def_path)?;
        def.local_key = Some(entry.local_key);
        registries.types.insert(def)?;
    }

    for entry in layout.class_set.index.entries() {
        let def_path = join(&layout.path, &member_name(&layout.class_set.name, entry.local_key));
        if let Some(mut class) = parse_class_def(storage, &def_path)? {
            class.local_key = Some(entry.local_key);
            registries.classes.insert(class)?;
        }
    }
    registries.classes.link()?;

    debug!(
        path = %layout.path,
        types = registries.types.len(),
        classes = registries.classes.len(),
        "opened metadictionary"
    );
    registries.layout = Some(layout);
    Ok(registries)
}

// =============================================================================
// SAVE
// =============================================================================

fn stage_set_index(writes: &mut StagedWrites, md_path: &str, set: &StoredSet) -> Result<(), SchemaError> {
    let data = set.index.encode().map_err(|source| SchemaError::Encode {
        name: set.name.clone(),
        source,
    })?;
    writes.stream(join(md_path, &format!("{}{}", set.name, INDEX_SUFFIX)), data);
    Ok(())
}

/// Writes every definition registered since the registries were opened.
///
/// New types, classes, and properties get local keys from their owning set.
/// Definition nodes already in the file are left untouched unless a class
/// gained properties. A storage without a metadictionary gets one at
/// [`DEFAULT_METADICTIONARY_PATH`].
///
/// Every key is allocated and every node encoded before the first write,
/// and `registries` only changes once all writes succeeded. The set indices
/// are written after the nodes they list, so a failed write leaves the file
/// readable with its previous definitions.
pub fn save_metadictionary<S: Storage + ?Sized>(
    registries: &mut Registries,
    storage: &mut S,
) -> Result<(), SchemaError> {
    let mut layout = match &registries.layout {
        Some(layout) => layout.clone(),
        None => match find_metadictionary(storage) {
            Ok(path) => read_layout(storage, path)?,
            Err(SchemaError::MissingMetaDictionary) => Layout {
                path: DEFAULT_METADICTIONARY_PATH.to_string(),
                class_set: StoredSet {
                    name: mangle_name("ClassDefinitions", pids::CLASS_DEFINITIONS, MANGLED_NAME_SIZE),
                    index: SetIndex::new(pids::IDENTIFICATION, 16),
                },
                type_set: StoredSet {
                    name: mangle_name("TypeDefinitions", pids::TYPE_DEFINITIONS, MANGLED_NAME_SIZE),
                    index: SetIndex::new(pids::IDENTIFICATION, 16),
                },
                header_dirty: true,
            },
            Err(e) => return Err(e),
        },
    };
    let md_path = layout.path.clone();
    let mut staged = registries.clone();

    // The header and the indices as they were go first, so the set names
    // always resolve.
    let mut writes = StagedWrites::new();
    if layout.header_dirty {
        let md_stream = join(&md_path, PROPERTIES_STREAM);
        let existing = if storage.exists(&md_stream) {
            read_properties(storage, &md_path)?
        } else {
            writes.storage(md_path.clone(), METADICTIONARY_CLASS);
            PropertyStream::new()
        };
        let mut out = DefinitionWriter::from_stream(existing);
        out.collection(pids::CLASS_DEFINITIONS, PropertyFormat::StrongRefSet, &layout.class_set.name);
        out.collection(pids::TYPE_DEFINITIONS, PropertyFormat::StrongRefSet, &layout.type_set.name);
        let data = out.finish().encode().map_err(|source| SchemaError::Encode {
            name: "MetaDictionary".to_string(),
            source,
        })?;
        stage_set_index(&mut writes, &md_path, &layout.type_set)?;
        stage_set_index(&mut writes, &md_path, &layout.class_set)?;
        writes.stream(md_stream, data);
    }

    let mut nodes = StagedWrites::new();
    let new_types: Vec<Auid> = staged
        .types
        .iter()
        .filter(|d| d.local_key.is_none())
        .map(|d| d.id)
        .collect();
    for id in &new_types {
        let Some(def) = staged.types.get_mut(id) else {
            continue;
        };
        let local_key = layout
            .type_set
            .index
            .insert(Identifier::Auid(*id))
            .ok_or_else(|| SchemaError::DuplicateTypeId {
                id: *id,
                name: def.name.clone(),
            })?;
        let def_path = join(&md_path, &member_name(&layout.type_set.name, local_key));
        nodes.remove(def_path.clone());
        stage_type_def(&mut nodes, &def_path, def)?;
        def.local_key = Some(local_key);
    }

    let mut new_classes = 0usize;
    let mut extended_classes = 0usize;
    for id in staged.classes.ids() {
        let Some(class) = staged.classes.get_mut(&id) else {
            continue;
        };
        let (local_key, is_new) = match class.local_key {
            Some(_) if !class.has_unsaved_properties() => continue,
            Some(local_key) => {
                extended_classes += 1;
                (local_key, false)
            }
            None => {
                let local_key = layout
                    .class_set
                    .index
                    .insert(Identifier::Auid(id))
                    .ok_or_else(|| SchemaError::DuplicateClass {
                        id,
                        name: class.name.clone(),
                    })?;
                new_classes += 1;
                (local_key, true)
            }
        };
        let def_path = join(&md_path, &member_name(&layout.class_set.name, local_key));
        stage_class_def(storage, &mut nodes, &def_path, class, is_new)?;
        class.local_key = Some(local_key);
    }
    // Property lookups hold copies of the definitions; refresh their keys.
    staged.classes.link()?;

    writes.append(nodes);
    if !new_types.is_empty() {
        stage_set_index(&mut writes, &md_path, &layout.type_set)?;
    }
    if new_classes > 0 {
        stage_set_index(&mut writes, &md_path, &layout.class_set)?;
    }
    let staged_writes = writes.len();
    writes.apply(storage)?;

    layout.header_dirty = false;
    staged.layout = Some(layout);
    *registries = staged;
    debug!(
        path = %md_path,
        new_types = new_types.len(),
        new_classes,
        extended_classes,
        staged_writes,
        "saved metadictionary"
    );
    Ok(())
}
