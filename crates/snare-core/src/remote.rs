//! # Remote Types
//!
//! Reinterpreting raw machine words as typed values from the target.
//!
//! An argument retriever only produces raw words. A function prototype says
//! what those words *mean*: a 32-bit flag, a signed length, a pointer to a
//! structure living in the target's memory. [`Reinterpret`] turns the raw word
//! into a [`Value`] given the declared [`NativeType`] and the bitness of the
//! stop.
//!
//! Scalars are copied out immediately. Pointers become a [`RemotePointer`]: a
//! view into the other process that reads on demand and can be walked field by
//! field.

use std::fmt;
use std::sync::Arc;

use crate::error::{SnareError, SnareResult};
use crate::target::TargetProcess;
use crate::types::{Address, Bitness};

/// Declared type of a parameter or structure field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeType
{
    /// Unsigned 8-bit integer (`BYTE`)
    U8,
    /// Unsigned 16-bit integer (`WORD`)
    U16,
    /// Unsigned 32-bit integer (`DWORD`)
    U32,
    /// Unsigned 64-bit integer (`ULONGLONG`)
    U64,
    /// Signed 8-bit integer
    I8,
    /// Signed 16-bit integer
    I16,
    /// Signed 32-bit integer (`LONG`, `INT`)
    I32,
    /// Signed 64-bit integer
    I64,
    /// 32-bit boolean (`BOOL`)
    Bool,
    /// Pointer-sized unsigned integer (`SIZE_T`, `HANDLE`, `ULONG_PTR`)
    UPtr,
    /// Pointer to another type
    Pointer(Box<NativeType>),
    /// Structure (only meaningful behind a pointer or as a field)
    Struct(Arc<StructDef>),
}

impl NativeType
{
    /// Pointer to `pointee`.
    #[must_use]
    pub fn pointer_to(pointee: NativeType) -> Self
    {
        NativeType::Pointer(Box::new(pointee))
    }

    /// Pointer to a structure.
    #[must_use]
    pub fn pointer_to_struct(def: StructDef) -> Self
    {
        NativeType::Pointer(Box::new(NativeType::Struct(Arc::new(def))))
    }

    /// Size in bytes for the given bitness.
    #[must_use]
    pub fn size_of(&self, bitness: Bitness) -> u64
    {
        match self {
            NativeType::U8 | NativeType::I8 => 1,
            NativeType::U16 | NativeType::I16 => 2,
            NativeType::U32 | NativeType::I32 | NativeType::Bool => 4,
            NativeType::U64 | NativeType::I64 => 8,
            NativeType::UPtr | NativeType::Pointer(_) => bitness.pointer_size(),
            NativeType::Struct(def) => def.size_of(bitness),
        }
    }

    /// Natural alignment in bytes for the given bitness.
    #[must_use]
    pub fn align_of(&self, bitness: Bitness) -> u64
    {
        match self {
            NativeType::Struct(def) => def.align_of(bitness),
            other => other.size_of(bitness),
        }
    }

    /// Whether values of this type are remote views rather than scalars.
    #[must_use]
    pub const fn is_indirect(&self) -> bool
    {
        matches!(self, NativeType::Pointer(_) | NativeType::Struct(_))
    }
}

impl fmt::Display for NativeType
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            NativeType::U8 => f.write_str("u8"),
            NativeType::U16 => f.write_str("u16"),
            NativeType::U32 => f.write_str("u32"),
            NativeType::U64 => f.write_str("u64"),
            NativeType::I8 => f.write_str("i8"),
            NativeType::I16 => f.write_str("i16"),
            NativeType::I32 => f.write_str("i32"),
            NativeType::I64 => f.write_str("i64"),
            NativeType::Bool => f.write_str("bool"),
            NativeType::UPtr => f.write_str("uptr"),
            NativeType::Pointer(pointee) => write!(f, "*{pointee}"),
            NativeType::Struct(def) => f.write_str(&def.name),
        }
    }
}

/// One field of a [`StructDef`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructField
{
    /// Field name
    pub name: String,
    /// Field type
    pub ty: NativeType,
}

/// A native structure description, laid out with natural alignment
///
/// ```rust
/// use snare_core::remote::{NativeType, StructDef};
/// use snare_core::types::Bitness;
///
/// let unicode_string = StructDef::new("UNICODE_STRING")
///     .field("Length", NativeType::U16)
///     .field("MaximumLength", NativeType::U16)
///     .field("Buffer", NativeType::pointer_to(NativeType::U16));
///
/// assert_eq!(unicode_string.size_of(Bitness::Bits32), 8);
/// assert_eq!(unicode_string.field_offset("Buffer", Bitness::Bits64), Some(8));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDef
{
    /// Structure name
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<StructField>,
}

impl StructDef
{
    /// Start an empty structure.
    pub fn new(name: impl Into<String>) -> Self
    {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: NativeType) -> Self
    {
        self.fields.push(StructField { name: name.into(), ty });
        self
    }

    /// Alignment of the whole structure (largest field alignment, at least 1).
    #[must_use]
    pub fn align_of(&self, bitness: Bitness) -> u64
    {
        self.fields.iter().map(|field| field.ty.align_of(bitness)).max().unwrap_or(1)
    }

    /// Size including trailing padding.
    #[must_use]
    pub fn size_of(&self, bitness: Bitness) -> u64
    {
        let end = self
            .offsets(bitness)
            .zip(&self.fields)
            .map(|(offset, field)| offset + field.ty.size_of(bitness))
            .last()
            .unwrap_or(0);
        align_up(end, self.align_of(bitness))
    }

    /// Byte offset of a field, if it exists.
    #[must_use]
    pub fn field_offset(&self, name: &str, bitness: Bitness) -> Option<u64>
    {
        self.offsets(bitness)
            .zip(&self.fields)
            .find(|(_, field)| field.name == name)
            .map(|(offset, _)| offset)
    }

    /// Look up a field by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&StructField>
    {
        self.fields.iter().find(|field| field.name == name)
    }

    fn offsets(&self, bitness: Bitness) -> impl Iterator<Item = u64> + '_
    {
        let mut cursor = 0u64;
        self.fields.iter().map(move |field| {
            let offset = align_up(cursor, field.ty.align_of(bitness));
            cursor = offset + field.ty.size_of(bitness);
            offset
        })
    }
}

fn align_up(value: u64, align: u64) -> u64
{
    value.div_ceil(align.max(1)) * align.max(1)
}

/// A value read out of the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value
{
    /// Unsigned integer (including pointer-sized handles)
    Unsigned(u64),
    /// Signed integer, sign-extended from its declared width
    Signed(i64),
    /// Boolean
    Bool(bool),
    /// A view into the target's memory
    Remote(RemotePointer),
}

impl Value
{
    /// Whether this is a remote-memory view rather than a plain scalar.
    #[must_use]
    pub const fn is_remote(&self) -> bool
    {
        matches!(self, Value::Remote(_))
    }

    /// The value as an unsigned integer (remote views yield their address).
    #[allow(clippy::cast_sign_loss)]
    #[must_use]
    pub const fn as_u64(&self) -> Option<u64>
    {
        match self {
            Value::Unsigned(value) => Some(*value),
            Value::Signed(value) => Some(*value as u64),
            Value::Bool(value) => Some(*value as u64),
            Value::Remote(pointer) => Some(pointer.address.value()),
        }
    }

    /// The value as a signed integer, if it is one.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64>
    {
        match self {
            Value::Signed(value) => Some(*value),
            _ => None,
        }
    }

    /// The value as a boolean, if it is one.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool>
    {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// The remote view, if this is one.
    #[must_use]
    pub const fn as_remote(&self) -> Option<&RemotePointer>
    {
        match self {
            Value::Remote(pointer) => Some(pointer),
            _ => None,
        }
    }
}

impl fmt::Display for Value
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Value::Unsigned(value) => write!(f, "0x{value:x}"),
            Value::Signed(value) => write!(f, "{value}"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Remote(pointer) => write!(f, "{pointer}"),
        }
    }
}

/// Typed pointer into another process's address space
///
/// Nothing is read when the view is created. Each [`read`](Self::read) or
/// [`field`](Self::field) call goes back to the process, so a view taken at a
/// call site can be re-read at the matching return to see what the callee
/// wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePointer
{
    /// Address the pointer holds.
    pub address: Address,
    /// Type of the data pointed at.
    pub pointee: NativeType,
    /// Bitness used to read pointers and lay out structures.
    pub bitness: Bitness,
}

impl RemotePointer
{
    /// Create a view.
    #[must_use]
    pub fn new(address: Address, pointee: NativeType, bitness: Bitness) -> Self
    {
        Self {
            address,
            pointee,
            bitness,
        }
    }

    /// Whether the pointer is null.
    #[must_use]
    pub const fn is_null(&self) -> bool
    {
        self.address.is_null()
    }

    /// View of the `index`-th element when the pointer is used as an array.
    #[must_use]
    pub fn offset(&self, index: u64) -> Self
    {
        let stride = self.pointee.size_of(self.bitness);
        Self::new(self.address + stride.wrapping_mul(index), self.pointee.clone(), self.bitness)
    }

    /// Dereference a scalar or pointer pointee.
    ///
    /// Structures have no scalar form; use [`field`](Self::field) on them.
    pub fn read(&self, process: &dyn TargetProcess) -> SnareResult<Value>
    {
        if let NativeType::Struct(def) = &self.pointee {
            return Err(SnareError::NotScalar(def.name.clone()));
        }
        // Scalars and pointers are at most eight bytes wide
        let size = usize::try_from(self.pointee.size_of(self.bitness)).unwrap_or(8).min(8);
        let mut bytes = [0u8; 8];
        process.read_bytes(self.address, &mut bytes[..size])?;
        let raw = u64::from_le_bytes(bytes);
        tracing::trace!(address = %self.address, pointee = %self.pointee, raw, "remote read");
        RemoteTypes.reinterpret(raw, &self.pointee, self.bitness)
    }

    /// Read one field of a structure pointee.
    ///
    /// Nested structures come back as another view at the field's address.
    pub fn field(&self, name: &str, process: &dyn TargetProcess) -> SnareResult<Value>
    {
        let NativeType::Struct(def) = &self.pointee else {
            return Err(SnareError::InvalidArgument(format!(
                "field {name} requested on non-structure pointee {}",
                self.pointee
            )));
        };
        let field = def.find(name).ok_or_else(|| SnareError::UnknownField {
            structure: def.name.clone(),
            field: name.to_string(),
        })?;
        let offset = def.field_offset(name, self.bitness).unwrap_or(0);
        let view = Self::new(self.address + offset, field.ty.clone(), self.bitness);
        match field.ty {
            NativeType::Struct(_) => Ok(Value::Remote(view)),
            _ => view.read(process),
        }
    }
}

impl fmt::Display for RemotePointer
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "({}*){}", self.pointee, self.address)
    }
}

/// Turns raw machine words into typed values
///
/// This is the seam where a richer type system (struct definitions parsed
/// from headers, string readers, enum names) plugs in. [`RemoteTypes`] is the
/// default implementation.
pub trait Reinterpret: Send + Sync
{
    /// Interpret `raw` as a value of type `ty` at the given bitness.
    fn reinterpret(&self, raw: u64, ty: &NativeType, bitness: Bitness) -> SnareResult<Value>;
}

/// Default reinterpreter: scalars truncated to their width, pointers as views
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteTypes;

impl Reinterpret for RemoteTypes
{
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn reinterpret(&self, raw: u64, ty: &NativeType, bitness: Bitness) -> SnareResult<Value>
    {
        let value = match ty {
            NativeType::U8 => Value::Unsigned(raw & 0xff),
            NativeType::U16 => Value::Unsigned(raw & 0xffff),
            NativeType::U32 => Value::Unsigned(raw & 0xffff_ffff),
            NativeType::U64 => Value::Unsigned(raw),
            NativeType::I8 => Value::Signed(i64::from(raw as u8 as i8)),
            NativeType::I16 => Value::Signed(i64::from(raw as u16 as i16)),
            NativeType::I32 => Value::Signed(i64::from(raw as u32 as i32)),
            NativeType::I64 => Value::Signed(raw as i64),
            NativeType::Bool => Value::Bool(raw & 0xffff_ffff != 0),
            NativeType::UPtr => Value::Unsigned(truncate_pointer(raw, bitness)),
            NativeType::Pointer(pointee) => Value::Remote(RemotePointer::new(
                Address::from(truncate_pointer(raw, bitness)),
                (**pointee).clone(),
                bitness,
            )),
            NativeType::Struct(def) => {
                return Err(SnareError::InvalidArgument(format!(
                    "structure {} cannot be reinterpreted from a single machine word",
                    def.name
                )))
            }
        };
        Ok(value)
    }
}

fn truncate_pointer(raw: u64, bitness: Bitness) -> u64
{
    match bitness {
        Bitness::Bits32 => raw & 0xffff_ffff,
        Bitness::Bits64 => raw,
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_struct_layout_padding()
    {
        let def = StructDef::new("MIXED")
            .field("a", NativeType::U8)
            .field("b", NativeType::U32)
            .field("c", NativeType::UPtr)
            .field("d", NativeType::U16);

        assert_eq!(def.field_offset("a", Bitness::Bits64), Some(0));
        assert_eq!(def.field_offset("b", Bitness::Bits64), Some(4));
        assert_eq!(def.field_offset("c", Bitness::Bits64), Some(8));
        assert_eq!(def.field_offset("d", Bitness::Bits64), Some(16));
        assert_eq!(def.size_of(Bitness::Bits64), 24);

        assert_eq!(def.field_offset("c", Bitness::Bits32), Some(8));
        assert_eq!(def.field_offset("d", Bitness::Bits32), Some(12));
        assert_eq!(def.size_of(Bitness::Bits32), 16);
        assert_eq!(def.field_offset("missing", Bitness::Bits32), None);
    }

    #[test]
    fn test_empty_struct_layout()
    {
        let def = StructDef::new("EMPTY");
        assert_eq!(def.size_of(Bitness::Bits64), 0);
        assert_eq!(def.align_of(Bitness::Bits64), 1);
    }

    #[test]
    fn test_reinterpret_truncates_and_sign_extends()
    {
        let types = RemoteTypes;
        let raw = 0xdead_beef_ffff_fffe;

        assert_eq!(types.reinterpret(raw, &NativeType::U32, Bitness::Bits64).unwrap(), Value::Unsigned(0xffff_fffe));
        assert_eq!(types.reinterpret(raw, &NativeType::I32, Bitness::Bits64).unwrap(), Value::Signed(-2));
        assert_eq!(types.reinterpret(raw, &NativeType::I8, Bitness::Bits64).unwrap(), Value::Signed(-2));
        assert_eq!(types.reinterpret(raw, &NativeType::U8, Bitness::Bits64).unwrap(), Value::Unsigned(0xfe));
        assert_eq!(types.reinterpret(raw, &NativeType::UPtr, Bitness::Bits32).unwrap(), Value::Unsigned(0xffff_fffe));
        assert_eq!(types.reinterpret(raw, &NativeType::UPtr, Bitness::Bits64).unwrap(), Value::Unsigned(raw));
        assert_eq!(types.reinterpret(0x1_0000_0000, &NativeType::Bool, Bitness::Bits64).unwrap(), Value::Bool(false));
        assert_eq!(types.reinterpret(1, &NativeType::Bool, Bitness::Bits64).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_reinterpret_pointer_is_remote_view()
    {
        let value = RemoteTypes
            .reinterpret(0xffff_ffff_0040_1000, &NativeType::pointer_to(NativeType::U32), Bitness::Bits32)
            .unwrap();

        let view = value.as_remote().expect("pointer must become a remote view");
        assert_eq!(view.address, Address::from(0x0040_1000));
        assert_eq!(view.pointee, NativeType::U32);
        assert_eq!(view.bitness, Bitness::Bits32);
    }

    #[test]
    fn test_narrow_fields_read_only_their_bytes()
    {
        use crate::target::SimulatedProcess;
        use crate::types::ProcessId;

        let mut process = SimulatedProcess::new(ProcessId(1), Bitness::Bits64);
        process.write_bytes(Address::from(0x1000), &[0x11, 0x22]);
        let pair = NativeType::Struct(Arc::new(
            StructDef::new("PAIR")
                .field("a", NativeType::U8)
                .field("b", NativeType::U8),
        ));
        let view = RemotePointer::new(Address::from(0x1000), pair, Bitness::Bits64);

        assert_eq!(view.field("a", &process).unwrap(), Value::Unsigned(0x11));
        assert_eq!(view.field("b", &process).unwrap(), Value::Unsigned(0x22));

        let last = RemotePointer::new(Address::from(0x1001), NativeType::U8, Bitness::Bits64);
        assert_eq!(last.read(&process).unwrap(), Value::Unsigned(0x22));

        let word = RemotePointer::new(Address::from(0x1000), NativeType::I16, Bitness::Bits64);
        assert_eq!(word.read(&process).unwrap(), Value::Signed(0x2211));

        // A U16 one byte before the end needs a byte that does not exist
        let straddling = RemotePointer::new(Address::from(0x1001), NativeType::U16, Bitness::Bits64);
        assert!(matches!(
            straddling.read(&process),
            Err(SnareError::MemoryRead { address: 0x1001, size: 2 })
        ));
    }

    #[test]
    fn test_reinterpret_struct_by_value_is_rejected()
    {
        let ty = NativeType::Struct(Arc::new(StructDef::new("POINT").field("x", NativeType::I32)));
        assert!(matches!(
            RemoteTypes.reinterpret(0, &ty, Bitness::Bits64),
            Err(SnareError::InvalidArgument(_))
        ));
    }
}
