//! Type-driven value encoding/decoding.
//!
//! A property payload has no self-description: its layout follows from the
//! property's type definition. Decoding resolves that definition and
//! dispatches on its kind, recursing into element, member, and renamed
//! types. Reference and stream kinds live outside the payload and are
//! handled by the object runtime.

use rustc_hash::FxHashMap;

use crate::codec::primitives::{
    Reader, Writer, check_int_range, decode_utf16_array, decode_utf16_string,
};
use crate::codec::properties::PropertyFormat;
use crate::error::{DecodeError, EncodeError};
use crate::limits::{BYTE_ORDER_LITTLE, MAX_TYPE_DEPTH};
use crate::model::well_known::types;
use crate::model::{Auid, TypeDefinition, TypeKind, Value};

/// Looks up type definitions by identifier.
pub trait TypeResolver {
    fn resolve_type(&self, id: &Auid) -> Option<&TypeDefinition>;
}

impl TypeResolver for FxHashMap<Auid, TypeDefinition> {
    fn resolve_type(&self, id: &Auid) -> Option<&TypeDefinition> {
        self.get(id)
    }
}

fn enter<'t, R: TypeResolver + ?Sized>(
    types: &'t R,
    id: &Auid,
    depth: usize,
) -> Result<&'t TypeDefinition, DecodeError> {
    let def = types
        .resolve_type(id)
        .ok_or(DecodeError::UnresolvedType { id: *id })?;
    if depth > MAX_TYPE_DEPTH {
        return Err(DecodeError::TypeNestingTooDeep {
            type_name: def.name.clone(),
            max: MAX_TYPE_DEPTH,
        });
    }
    Ok(def)
}

fn unalias_at<'t, R: TypeResolver + ?Sized>(
    types: &'t R,
    id: Auid,
    mut depth: usize,
) -> Result<&'t TypeDefinition, DecodeError> {
    let mut def = enter(types, &id, depth)?;
    while let TypeKind::Rename { renamed_type } = &def.kind {
        depth += 1;
        def = enter(types, renamed_type, depth)?;
    }
    Ok(def)
}

/// Resolves a type and follows rename definitions to the underlying type.
pub fn resolve_renames<R: TypeResolver + ?Sized>(
    types: &R,
    id: Auid,
) -> Result<&TypeDefinition, DecodeError> {
    unalias_at(types, id, 0)
}

fn int_width<R: TypeResolver + ?Sized>(
    types: &R,
    id: Auid,
    depth: usize,
) -> Result<(u8, bool), DecodeError> {
    let def = unalias_at(types, id, depth)?;
    match def.kind {
        TypeKind::Int { size, signed } => Ok((size, signed)),
        _ => Err(DecodeError::MalformedType {
            type_name: def.name.clone(),
            reason: "enumeration element type is not an integer",
        }),
    }
}

fn size_overflow(def: &TypeDefinition) -> DecodeError {
    DecodeError::MalformedType {
        type_name: def.name.clone(),
        reason: "fixed size overflows",
    }
}

fn fixed_size_at<R: TypeResolver + ?Sized>(
    types: &R,
    id: Auid,
    depth: usize,
) -> Result<Option<usize>, DecodeError> {
    let def = enter(types, &id, depth)?;
    let size = match &def.kind {
        TypeKind::Int { size, .. } => Some(*size as usize),
        TypeKind::Character => Some(2),
        TypeKind::ExtEnum { .. } => Some(16),
        TypeKind::Enum { element_type, .. } => fixed_size_at(types, *element_type, depth + 1)?,
        TypeKind::Rename { renamed_type } => fixed_size_at(types, *renamed_type, depth + 1)?,
        TypeKind::FixedArray { element_type, count } => {
            match fixed_size_at(types, *element_type, depth + 1)? {
                Some(n) => Some(n.checked_mul(*count as usize).ok_or_else(|| size_overflow(def))?),
                None => None,
            }
        }
        TypeKind::Record { .. } if def.id == types::AUID => Some(16),
        TypeKind::Record { .. } if def.id == types::MOB_ID => Some(32),
        TypeKind::Record { members } => {
            let mut total = 0;
            for (_, member_type) in members {
                match fixed_size_at(types, *member_type, depth + 1)? {
                    Some(n) => total = n.checked_add(total).ok_or_else(|| size_overflow(def))?,
                    None => return Ok(None),
                }
            }
            Some(total)
        }
        _ => None,
    };
    Ok(size)
}

/// Returns the encoded size of values of a type, or `None` when values
/// vary in size.
pub fn fixed_size<R: TypeResolver + ?Sized>(types: &R, id: Auid) -> Result<Option<usize>, DecodeError> {
    fixed_size_at(types, id, 0)
}

/// Returns the stream format that properties of a type are stored with.
pub fn property_format<R: TypeResolver + ?Sized>(
    types: &R,
    id: Auid,
) -> Result<PropertyFormat, DecodeError> {
    let def = unalias_at(types, id, 0)?;
    let format = match &def.kind {
        TypeKind::StrongRef { .. } => PropertyFormat::StrongRef,
        TypeKind::WeakRef { .. } => PropertyFormat::WeakRef,
        TypeKind::Stream => PropertyFormat::DataStream,
        TypeKind::VarArray { element_type } | TypeKind::Set { element_type } => {
            let is_set = matches!(def.kind, TypeKind::Set { .. });
            let element = unalias_at(types, *element_type, 1)?;
            match (&element.kind, is_set) {
                (TypeKind::StrongRef { .. }, true) => PropertyFormat::StrongRefSet,
                (TypeKind::StrongRef { .. }, false) => PropertyFormat::StrongRefVector,
                (TypeKind::WeakRef { .. }, true) => PropertyFormat::WeakRefSet,
                (TypeKind::WeakRef { .. }, false) => PropertyFormat::WeakRefVector,
                _ => PropertyFormat::Data,
            }
        }
        _ => PropertyFormat::Data,
    };
    Ok(format)
}

// =============================================================================
// DECODING
// =============================================================================

/// Decodes a whole property payload as a value of type `type_id`.
pub fn decode_value<R: TypeResolver + ?Sized>(
    data: &[u8],
    type_id: Auid,
    types: &R,
) -> Result<Value, DecodeError> {
    let mut reader = Reader::new(data);
    let value = decode_typed(&mut reader, type_id, types, 0)?;
    if !reader.is_empty() {
        return Err(DecodeError::TrailingBytes {
            context: "property value",
            len: reader.remaining_len(),
        });
    }
    Ok(value)
}

fn decode_typed<R: TypeResolver + ?Sized>(
    reader: &mut Reader<'_>,
    type_id: Auid,
    types: &R,
    depth: usize,
) -> Result<Value, DecodeError> {
    let def = enter(types, &type_id, depth)?;
    match &def.kind {
        TypeKind::Int { size, signed } => {
            if *signed {
                reader.read_sint(*size, "int").map(Value::Int)
            } else {
                reader.read_uint(*size, "uint").map(Value::UInt)
            }
        }
        TypeKind::Character => {
            let unit = reader.read_u16("character")?;
            char::from_u32(u32::from(unit))
                .map(Value::Char)
                .ok_or(DecodeError::InvalidUtf16 { context: "character" })
        }
        TypeKind::Enum { element_type, .. } => {
            let (size, signed) = int_width(types, *element_type, depth + 1)?;
            // 8-byte unsigned values above i64::MAX keep their bit pattern.
            let value = if signed {
                reader.read_sint(size, "enum")?
            } else {
                reader.read_uint(size, "enum")? as i64
            };
            Ok(Value::Enum {
                value,
                name: def.enum_name(value).map(str::to_string),
            })
        }
        TypeKind::ExtEnum { .. } => {
            let value = reader.read_auid("extendible enum")?;
            Ok(Value::ExtEnum {
                value,
                name: def.ext_enum_name(&value).map(str::to_string),
            })
        }
        TypeKind::Record { .. } if def.id == types::AUID => reader.read_auid("auid").map(Value::Auid),
        TypeKind::Record { .. } if def.id == types::MOB_ID => {
            reader.read_mobid("mob id").map(Value::MobId)
        }
        TypeKind::Record { members } => {
            let mut values = Vec::with_capacity(members.len());
            for (name, member_type) in members {
                values.push((name.clone(), decode_typed(reader, *member_type, types, depth + 1)?));
            }
            Ok(Value::Record(values))
        }
        TypeKind::FixedArray { element_type, count } => {
            let mut values = Vec::with_capacity((*count as usize).min(reader.remaining_len()));
            for _ in 0..*count {
                values.push(decode_typed(reader, *element_type, types, depth + 1)?);
            }
            Ok(Value::Array(values))
        }
        TypeKind::VarArray { element_type } | TypeKind::Set { element_type } => {
            decode_elements(reader, def, *element_type, types, depth)
        }
        TypeKind::String { element_type } => {
            let element = unalias_at(types, *element_type, depth + 1)?;
            if matches!(element.kind, TypeKind::Character) {
                decode_utf16_string(reader.read_rest()).map(Value::String)
            } else {
                decode_elements(reader, def, *element_type, types, depth)
            }
        }
        TypeKind::Rename { renamed_type } => decode_typed(reader, *renamed_type, types, depth + 1),
        TypeKind::Indirect => {
            let byte_order = reader.read_u8("indirect.byte_order")?;
            if byte_order != BYTE_ORDER_LITTLE {
                return Err(DecodeError::UnsupportedByteOrder { found: byte_order });
            }
            let type_id = reader.read_auid("indirect.type")?;
            let value = decode_typed(reader, type_id, types, depth + 1)?;
            Ok(Value::Indirect {
                type_id,
                value: Box::new(value),
            })
        }
        TypeKind::Opaque => Ok(Value::Bytes(reader.read_rest().to_vec())),
        TypeKind::WeakRef { .. } => reader.read_weakref().map(Value::WeakRef),
        TypeKind::StrongRef { .. } | TypeKind::Stream => Err(DecodeError::NotInlineData {
            type_name: def.name.clone(),
        }),
    }
}

/// Decodes the rest of the payload as a sequence of `element_type` values.
fn decode_elements<R: TypeResolver + ?Sized>(
    reader: &mut Reader<'_>,
    def: &TypeDefinition,
    element_type: Auid,
    types: &R,
    depth: usize,
) -> Result<Value, DecodeError> {
    let element = unalias_at(types, element_type, depth + 1)?;
    match &element.kind {
        TypeKind::String { .. } => {
            let strings = decode_utf16_array(reader.read_rest())?;
            return Ok(Value::Array(strings.into_iter().map(Value::String).collect()));
        }
        TypeKind::StrongRef { .. } | TypeKind::WeakRef { .. } => {
            return Err(DecodeError::NotInlineData {
                type_name: def.name.clone(),
            });
        }
        _ => {}
    }

    let size = match fixed_size_at(types, element_type, depth + 1)? {
        Some(size) if size > 0 => size,
        _ => {
            return Err(DecodeError::VariableSizeElement {
                type_name: element.name.clone(),
            });
        }
    };
    let data = reader.read_rest();
    if data.len() % size != 0 {
        return Err(DecodeError::MisalignedArray {
            len: data.len(),
            element_size: size,
        });
    }

    let mut inner = Reader::new(data);
    let mut values = Vec::with_capacity(data.len() / size);
    while !inner.is_empty() {
        values.push(decode_typed(&mut inner, element_type, types, depth + 1)?);
    }
    Ok(Value::Array(values))
}

// =============================================================================
// ENCODING
// =============================================================================

/// Encodes a value as a property payload of type `type_id`.
pub fn encode_value<R: TypeResolver + ?Sized>(
    value: &Value,
    type_id: Auid,
    types: &R,
) -> Result<Vec<u8>, EncodeError> {
    let mut writer = Writer::new();
    encode_typed(&mut writer, value, type_id, types, 0)?;
    Ok(writer.into_bytes())
}

fn encode_typed<R: TypeResolver + ?Sized>(
    writer: &mut Writer,
    value: &Value,
    type_id: Auid,
    types: &R,
    depth: usize,
) -> Result<(), EncodeError> {
    let def = enter(types, &type_id, depth)?;
    let mismatch = |expected: &'static str| EncodeError::TypeMismatch {
        type_name: def.name.clone(),
        expected,
    };

    match &def.kind {
        TypeKind::Int { size, signed } => {
            let v = match value {
                Value::Int(v) => i128::from(*v),
                Value::UInt(v) => i128::from(*v),
                _ => return Err(mismatch("integer")),
            };
            check_int_range(v, *size, *signed)?;
            writer.write_int(v, *size);
        }
        TypeKind::Character => {
            let Value::Char(c) = value else {
                return Err(mismatch("character"));
            };
            let mut buf = [0u16; 2];
            let units = c.encode_utf16(&mut buf);
            if units.len() != 1 {
                return Err(mismatch("single UTF-16 unit character"));
            }
            writer.write_u16(units[0]);
        }
        TypeKind::Enum { element_type, .. } => {
            let v = match value {
                Value::Enum { value, .. } | Value::Int(value) => *value,
                Value::String(name) => def.enum_value(name).ok_or_else(|| EncodeError::UnknownEnumName {
                    type_name: def.name.clone(),
                    name: name.clone(),
                })?,
                _ => return Err(mismatch("enumeration element")),
            };
            let (size, signed) = int_width(types, *element_type, depth + 1)?;
            // Values are i64 like the element table; 8-byte unsigned
            // elements keep the bit pattern.
            let v = if !signed && size == 8 {
                i128::from(v as u64)
            } else {
                i128::from(v)
            };
            check_int_range(v, size, signed)?;
            writer.write_int(v, size);
        }
        TypeKind::ExtEnum { .. } => {
            let id = match value {
                Value::ExtEnum { value, .. } | Value::Auid(value) => *value,
                Value::String(name) => {
                    def.ext_enum_value(name).ok_or_else(|| EncodeError::UnknownEnumName {
                        type_name: def.name.clone(),
                        name: name.clone(),
                    })?
                }
                _ => return Err(mismatch("extendible enumeration element")),
            };
            writer.write_auid(&id);
        }
        TypeKind::Record { .. } if def.id == types::AUID => {
            let Value::Auid(id) = value else {
                return Err(mismatch("auid"));
            };
            writer.write_auid(id);
        }
        TypeKind::Record { .. } if def.id == types::MOB_ID => {
            let Value::MobId(id) = value else {
                return Err(mismatch("mob id"));
            };
            writer.write_bytes(id.as_bytes());
        }
        TypeKind::Record { members } => {
            let Value::Record(values) = value else {
                return Err(mismatch("record"));
            };
            for (name, member_type) in members {
                let member = values
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, v)| v)
                    .ok_or_else(|| EncodeError::MissingRecordMember {
                        type_name: def.name.clone(),
                        member: name.clone(),
                    })?;
                encode_typed(writer, member, *member_type, types, depth + 1)?;
            }
        }
        TypeKind::FixedArray { element_type, count } => {
            let Value::Array(items) = value else {
                return Err(mismatch("array"));
            };
            if items.len() != *count as usize {
                return Err(EncodeError::ArrayLengthMismatch {
                    expected: *count as usize,
                    actual: items.len(),
                });
            }
            for item in items {
                encode_typed(writer, item, *element_type, types, depth + 1)?;
            }
        }
        TypeKind::VarArray { element_type } | TypeKind::Set { element_type } => {
            encode_elements(writer, value, def, *element_type, types, depth)?;
        }
        TypeKind::String { element_type } => {
            let element = unalias_at(types, *element_type, depth + 1)?;
            if matches!(element.kind, TypeKind::Character) {
                let Value::String(s) = value else {
                    return Err(mismatch("string"));
                };
                writer.write_utf16z(s);
            } else {
                encode_elements(writer, value, def, *element_type, types, depth)?;
            }
        }
        TypeKind::Rename { renamed_type } => {
            encode_typed(writer, value, *renamed_type, types, depth + 1)?;
        }
        TypeKind::Indirect => {
            let Value::Indirect { type_id, value } = value else {
                return Err(mismatch("indirect value"));
            };
            writer.write_u8(BYTE_ORDER_LITTLE);
            writer.write_auid(type_id);
            encode_typed(writer, value, *type_id, types, depth + 1)?;
        }
        TypeKind::Opaque => {
            let Value::Bytes(bytes) = value else {
                return Err(mismatch("bytes"));
            };
            writer.write_bytes(bytes);
        }
        TypeKind::WeakRef { .. } => {
            let Value::WeakRef(weakref) = value else {
                return Err(mismatch("weak reference"));
            };
            writer.write_weakref(weakref);
        }
        TypeKind::StrongRef { .. } | TypeKind::Stream => {
            return Err(EncodeError::NotInlineData {
                type_name: def.name.clone(),
            });
        }
    }
    Ok(())
}

fn encode_elements<R: TypeResolver + ?Sized>(
    writer: &mut Writer,
    value: &Value,
    def: &TypeDefinition,
    element_type: Auid,
    types: &R,
    depth: usize,
) -> Result<(), EncodeError> {
    let element = unalias_at(types, element_type, depth + 1)?;
    if matches!(element.kind, TypeKind::StrongRef { .. } | TypeKind::WeakRef { .. }) {
        return Err(EncodeError::NotInlineData {
            type_name: def.name.clone(),
        });
    }
    let Value::Array(items) = value else {
        return Err(EncodeError::TypeMismatch {
            type_name: def.name.clone(),
            expected: "array",
        });
    };
    for item in items {
        encode_typed(writer, item, element_type, types, depth + 1)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::primitives::WeakRef;
    use crate::model::well_known::types;
    use crate::model::{Identifier, MobId};

    const RATIONAL: Auid = Auid::from_u128(0x03010100_0000_0000_060e_2b3401040101);
    const INT32_ARRAY: Auid = Auid::from_u128(0x04010300_0000_0000_060e_2b3401040101);
    const STRING_ARRAY: Auid = Auid::from_u128(0x04010500_0000_0000_060e_2b3401040101);
    const INDIRECT: Auid = Auid::from_u128(0x04100300_0000_0000_060e_2b3401040101);
    const COLOR: Auid = Auid::from_u128(0x1000);
    const LOOP_A: Auid = Auid::from_u128(0x2000);
    const LOOP_B: Auid = Auid::from_u128(0x2001);
    const OBJECT_REF: Auid = Auid::from_u128(0x3000);
    const OBJECT_SET: Auid = Auid::from_u128(0x3001);

    fn registry() -> FxHashMap<Auid, TypeDefinition> {
        let defs = vec![
            TypeDefinition::new(types::UINT8, "aafUInt8", TypeKind::Int { size: 1, signed: false }),
            TypeDefinition::new(types::INT16, "aafInt16", TypeKind::Int { size: 2, signed: true }),
            TypeDefinition::new(types::UINT32, "aafUInt32", TypeKind::Int { size: 4, signed: false }),
            TypeDefinition::new(types::INT32, "aafInt32", TypeKind::Int { size: 4, signed: true }),
            TypeDefinition::new(types::CHARACTER, "aafCharacter", TypeKind::Character),
            TypeDefinition::new(
                types::STRING,
                "aafString",
                TypeKind::String { element_type: types::CHARACTER },
            ),
            TypeDefinition::new(
                types::BOOLEAN,
                "aafBoolean",
                TypeKind::Enum {
                    element_type: types::UINT8,
                    elements: vec![(0, "False".to_string()), (1, "True".to_string())],
                },
            ),
            TypeDefinition::new(
                types::AUID,
                "aafUID_t",
                TypeKind::Record {
                    members: vec![("Data1".to_string(), types::UINT32)],
                },
            ),
            TypeDefinition::new(
                types::MOB_ID,
                "aafMobID_t",
                TypeKind::Record { members: Vec::new() },
            ),
            TypeDefinition::new(
                RATIONAL,
                "aafRational",
                TypeKind::Record {
                    members: vec![
                        ("Numerator".to_string(), types::INT32),
                        ("Denominator".to_string(), types::INT32),
                    ],
                },
            ),
            TypeDefinition::new(
                INT32_ARRAY,
                "aafInt32Array",
                TypeKind::VarArray { element_type: types::INT32 },
            ),
            TypeDefinition::new(
                STRING_ARRAY,
                "aafStringArray",
                TypeKind::VarArray { element_type: types::STRING },
            ),
            TypeDefinition::new(INDIRECT, "aafIndirect", TypeKind::Indirect),
            TypeDefinition::new(
                COLOR,
                "Color",
                TypeKind::ExtEnum {
                    elements: vec![(Auid::from_u128(0x1001), "Red".to_string())],
                },
            ),
            TypeDefinition::new(LOOP_A, "LoopA", TypeKind::Rename { renamed_type: LOOP_B }),
            TypeDefinition::new(LOOP_B, "LoopB", TypeKind::Rename { renamed_type: LOOP_A }),
            TypeDefinition::new(
                OBJECT_REF,
                "kAAFTypeID_InterchangeObjectStrongReference",
                TypeKind::StrongRef { referenced_type: Auid::from_u128(0x9) },
            ),
            TypeDefinition::new(
                OBJECT_SET,
                "kAAFTypeID_InterchangeObjectStrongReferenceSet",
                TypeKind::Set { element_type: OBJECT_REF },
            ),
        ];
        defs.into_iter().map(|d| (d.id, d)).collect()
    }

    #[test]
    fn test_boolean_enum() {
        let types = registry();
        assert_eq!(
            decode_value(&[1], types::BOOLEAN, &types).unwrap(),
            Value::Enum { value: 1, name: Some("True".to_string()) }
        );
        assert_eq!(encode_value(&Value::from("False"), types::BOOLEAN, &types).unwrap(), vec![0]);
        assert!(matches!(
            encode_value(&Value::from("Maybe"), types::BOOLEAN, &types),
            Err(EncodeError::UnknownEnumName { .. })
        ));
        // Values outside the element list still decode.
        assert_eq!(
            decode_value(&[7], types::BOOLEAN, &types).unwrap(),
            Value::Enum { value: 7, name: None }
        );
    }

    #[test]
    fn test_int_range_checked_on_encode() {
        let types = registry();
        assert_eq!(
            encode_value(&Value::Int(40_000), types::INT16, &types),
            Err(EncodeError::IntOutOfRange { value: 40_000, size: 2, signed: true })
        );
        let bytes = encode_value(&Value::Int(-2), types::INT16, &types).unwrap();
        assert_eq!(bytes, vec![0xfe, 0xff]);
        assert_eq!(decode_value(&bytes, types::INT16, &types).unwrap(), Value::Int(-2));
        assert_eq!(
            decode_value(&[0xff, 0xff, 0xff, 0xff], types::UINT32, &types).unwrap(),
            Value::UInt(u32::MAX as u64)
        );
    }

    #[test]
    fn test_unsigned_64_bit_enum_keeps_bit_pattern() {
        let mut types = registry();
        let wide = Auid::from_u128(0x5000);
        types.insert(
            types::UINT64,
            TypeDefinition::new(types::UINT64, "aafUInt64", TypeKind::Int { size: 8, signed: false }),
        );
        types.insert(
            wide,
            TypeDefinition::new(
                wide,
                "WideEnum",
                TypeKind::Enum {
                    element_type: types::UINT64,
                    elements: vec![(-1, "All".to_string())],
                },
            ),
        );
        let decoded = decode_value(&[0xff; 8], wide, &types).unwrap();
        assert_eq!(decoded, Value::Enum { value: -1, name: Some("All".to_string()) });
        assert_eq!(encode_value(&decoded, wide, &types).unwrap(), vec![0xff; 8]);
        assert_eq!(encode_value(&Value::from("All"), wide, &types).unwrap(), vec![0xff; 8]);
    }

    #[test]
    fn test_fixed_size_overflow_is_an_error() {
        let mut types = registry();
        let inner = Auid::from_u128(0x5100);
        let outer = Auid::from_u128(0x5101);
        let list = Auid::from_u128(0x5102);
        types.insert(
            types::UINT64,
            TypeDefinition::new(types::UINT64, "aafUInt64", TypeKind::Int { size: 8, signed: false }),
        );
        types.insert(
            inner,
            TypeDefinition::new(inner, "Inner", TypeKind::FixedArray { element_type: types::UINT64, count: u32::MAX }),
        );
        types.insert(
            outer,
            TypeDefinition::new(outer, "Outer", TypeKind::FixedArray { element_type: inner, count: u32::MAX }),
        );
        types.insert(list, TypeDefinition::new(list, "OuterList", TypeKind::VarArray { element_type: outer }));

        assert!(matches!(
            fixed_size(&types, outer),
            Err(DecodeError::MalformedType { reason: "fixed size overflows", .. })
        ));
        assert!(decode_value(&[0; 8], list, &types).is_err());
    }

    #[test]
    fn test_record_members() {
        let types = registry();
        let rational = Value::Record(vec![
            ("Numerator".to_string(), Value::Int(30000)),
            ("Denominator".to_string(), Value::Int(1001)),
        ]);
        let bytes = encode_value(&rational, RATIONAL, &types).unwrap();
        assert_eq!(bytes.len(), 8);
        assert_eq!(decode_value(&bytes, RATIONAL, &types).unwrap(), rational);
        assert_eq!(fixed_size(&types, RATIONAL).unwrap(), Some(8));

        let partial = Value::Record(vec![("Numerator".to_string(), Value::Int(1))]);
        assert!(matches!(
            encode_value(&partial, RATIONAL, &types),
            Err(EncodeError::MissingRecordMember { .. })
        ));
    }

    #[test]
    fn test_identifier_records() {
        let types = registry();
        let id = Auid::from_u128(0x0d010101_0101_2400_060e_2b3402060101);
        let bytes = id.to_bytes_le();
        assert_eq!(decode_value(&bytes, types::AUID, &types).unwrap(), Value::Auid(id));
        assert_eq!(encode_value(&Value::Auid(id), types::AUID, &types).unwrap(), bytes.to_vec());

        let mob = MobId([0x42; 32]);
        assert_eq!(decode_value(&[0x42; 32], types::MOB_ID, &types).unwrap(), Value::MobId(mob));
        assert_eq!(fixed_size(&types, types::MOB_ID).unwrap(), Some(32));
    }

    #[test]
    fn test_string_and_string_array() {
        let types = registry();
        assert_eq!(
            decode_value(b"T\0e\0s\0t\0\0\0", types::STRING, &types).unwrap(),
            Value::from("Test")
        );
        let names = Value::Array(vec![Value::from("Numerator"), Value::from("Denominator")]);
        let bytes = encode_value(&names, STRING_ARRAY, &types).unwrap();
        assert_eq!(decode_value(&bytes, STRING_ARRAY, &types).unwrap(), names);
    }

    #[test]
    fn test_var_array_misaligned() {
        let types = registry();
        assert_eq!(
            decode_value(&[0u8; 6], INT32_ARRAY, &types),
            Err(DecodeError::MisalignedArray { len: 6, element_size: 4 })
        );
        let values = Value::Array(vec![Value::Int(1), Value::Int(-1)]);
        let bytes = encode_value(&values, INT32_ARRAY, &types).unwrap();
        assert_eq!(decode_value(&bytes, INT32_ARRAY, &types).unwrap(), values);
    }

    #[test]
    fn test_indirect() {
        let types = registry();
        let mut bytes = vec![0x4c];
        bytes.extend_from_slice(&types::INT32.to_bytes_le());
        bytes.extend_from_slice(&25i32.to_le_bytes());

        let expected = Value::Indirect {
            type_id: types::INT32,
            value: Box::new(Value::Int(25)),
        };
        assert_eq!(decode_value(&bytes, INDIRECT, &types).unwrap(), expected);
        assert_eq!(encode_value(&expected, INDIRECT, &types).unwrap(), bytes);

        bytes[0] = 0x4d;
        assert_eq!(
            decode_value(&bytes, INDIRECT, &types),
            Err(DecodeError::UnsupportedByteOrder { found: 0x4d })
        );
    }

    #[test]
    fn test_ext_enum_by_name() {
        let types = registry();
        let red = Auid::from_u128(0x1001);
        assert_eq!(encode_value(&Value::from("Red"), COLOR, &types).unwrap(), red.to_bytes_le().to_vec());
        assert_eq!(
            decode_value(&red.to_bytes_le(), COLOR, &types).unwrap(),
            Value::ExtEnum { value: red, name: Some("Red".to_string()) }
        );
    }

    #[test]
    fn test_unresolved_type() {
        let types = registry();
        let missing = Auid::from_u128(0xdead);
        assert_eq!(
            decode_value(&[0], missing, &types),
            Err(DecodeError::UnresolvedType { id: missing })
        );
        assert_eq!(
            encode_value(&Value::Int(0), missing, &types),
            Err(EncodeError::UnresolvedType { id: missing })
        );
    }

    #[test]
    fn test_rename_cycle_is_bounded() {
        let types = registry();
        assert!(matches!(
            decode_value(&[0], LOOP_A, &types),
            Err(DecodeError::TypeNestingTooDeep { .. })
        ));
        assert!(matches!(
            resolve_renames(&types, LOOP_B),
            Err(DecodeError::TypeNestingTooDeep { .. })
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let types = registry();
        assert_eq!(
            decode_value(&[1, 2, 3, 4, 5], types::INT32, &types),
            Err(DecodeError::TrailingBytes { context: "property value", len: 1 })
        );
    }

    #[test]
    fn test_reference_types_are_out_of_line() {
        let types = registry();
        assert!(matches!(
            decode_value(&[], OBJECT_REF, &types),
            Err(DecodeError::NotInlineData { .. })
        ));
        assert_eq!(property_format(&types, OBJECT_SET).unwrap(), PropertyFormat::StrongRefSet);
        assert_eq!(property_format(&types, OBJECT_REF).unwrap(), PropertyFormat::StrongRef);
        assert_eq!(property_format(&types, RATIONAL).unwrap(), PropertyFormat::Data);
    }

    #[test]
    fn test_weak_reference_payload() {
        let mut types = registry();
        let target = Auid::from_u128(0x4000);
        types.insert(
            target,
            TypeDefinition::new(
                target,
                "ClassDefinitionWeakReference",
                TypeKind::WeakRef { referenced_type: Auid::from_u128(0x9), target_set: Vec::new() },
            ),
        );
        let weakref = WeakRef::new(0x0005, Identifier::Auid(Auid::from_u128(7)));
        let bytes = encode_value(&Value::WeakRef(weakref), target, &types).unwrap();
        assert_eq!(decode_value(&bytes, target, &types).unwrap(), Value::WeakRef(weakref));
        assert_eq!(property_format(&types, target).unwrap(), PropertyFormat::WeakRef);
    }
}
