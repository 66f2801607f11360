//! Converters between Rust values and OSC arguments
//!
//! A [`Converter`] pairs a decode and an encode function with the type tag it
//! expects. Converters with a declared tag write that tag themselves and
//! reject packets carrying any other one. Converters without a declared tag
//! (booleans, lists, [`OscArg`] lists) derive the tag from the value.
//!
//! The [`ConverterRegistry`] maps a Rust type to its converter and is seeded
//! with one for every default wire kind and for homogeneous lists of them.

use bytes::Bytes;
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::address::validate_address;
use crate::codec::{OscReader, OscWriter};
use crate::collections::CopyOnWriteMap;
use crate::types::OscValue;
use crate::{Error, Result, TimeTag};

type DecodeFn<T> = dyn Fn(&mut OscReader<'_>) -> Result<T> + Send + Sync;
type EncodeFn<T> = dyn Fn(&mut OscWriter, &T) -> Result<()> + Send + Sync;

/// Bidirectional mapping between `T` and its OSC wire form
pub struct Converter<T> {
    type_tag: Option<String>,
    decode: Arc<DecodeFn<T>>,
    encode: Arc<EncodeFn<T>>,
}

impl<T> Clone for Converter<T> {
    fn clone(&self) -> Self {
        Self {
            type_tag: self.type_tag.clone(),
            decode: self.decode.clone(),
            encode: self.encode.clone(),
        }
    }
}

impl<T> fmt::Debug for Converter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Converter")
            .field("type", &type_name::<T>())
            .field("type_tag", &self.type_tag)
            .finish()
    }
}

impl<T: 'static> Converter<T> {
    /// Converter with a fixed type tag.
    ///
    /// `encode` writes the argument payload only, the tag is written for it.
    pub fn new<D, E>(type_tag: impl Into<String>, decode: D, encode: E) -> Self
    where
        D: Fn(&mut OscReader<'_>) -> Result<T> + Send + Sync + 'static,
        E: Fn(&mut OscWriter, &T) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            type_tag: Some(type_tag.into()),
            decode: Arc::new(decode),
            encode: Arc::new(encode),
        }
    }

    /// Converter whose type tag depends on the value.
    ///
    /// `encode` must write the type tag itself and `decode` must check
    /// [`OscReader::type_tag`].
    pub fn untagged<D, E>(decode: D, encode: E) -> Self
    where
        D: Fn(&mut OscReader<'_>) -> Result<T> + Send + Sync + 'static,
        E: Fn(&mut OscWriter, &T) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            type_tag: None,
            decode: Arc::new(decode),
            encode: Arc::new(encode),
        }
    }

    /// The declared type tag, without the leading comma
    pub fn type_tag(&self) -> Option<&str> {
        self.type_tag.as_deref()
    }

    /// Compare an incoming type tag with the declared one
    pub fn check_type_tag(&self, actual: &str) -> Result<()> {
        match &self.type_tag {
            Some(expected) if expected != actual => Err(Error::TypeTagMismatch {
                expected: expected.clone(),
                actual: actual.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Decode the arguments of a message whose type tag was already read
    pub fn decode(&self, reader: &mut OscReader<'_>) -> Result<T> {
        self.check_type_tag(reader.type_tag())?;
        (self.decode)(reader)
    }

    /// Write the type tag (when declared) followed by the arguments
    pub fn encode(&self, writer: &mut OscWriter, value: &T) -> Result<()> {
        if let Some(tag) = &self.type_tag {
            writer.write_type_tag(tag)?;
        }
        (self.encode)(writer, value)
    }

    /// Converter for `Vec<T>`, whose tag repeats this converter's tag once per
    /// element. Only single character tags can be repeated.
    pub fn list(&self) -> Result<Converter<Vec<T>>> {
        let mut chars = self.type_tag.as_deref().unwrap_or_default().chars();
        match (chars.next(), chars.next()) {
            (Some(tag), None) => Ok(homogeneous_list(tag, self)),
            _ => Err(Error::InvalidTypeTag(format!(
                "cannot build a list from type tag {:?}",
                self.type_tag
            ))),
        }
    }
}

fn homogeneous_list<T: 'static>(tag: char, element: &Converter<T>) -> Converter<Vec<T>> {
    let read = element.decode.clone();
    let write = element.encode.clone();
    Converter::untagged(
        move |reader| {
            let tags = reader.type_tag().to_string();
            let mut values = Vec::with_capacity(tags.len());
            for actual in tags.chars() {
                if actual != tag {
                    return Err(Error::TypeTagMismatch {
                        expected: tag.to_string(),
                        actual: tags.clone(),
                    });
                }
                values.push(read(reader)?);
            }
            Ok(values)
        },
        move |writer, values: &Vec<T>| {
            let tags: String = std::iter::repeat(tag).take(values.len()).collect();
            writer.write_arg_tags(&tags);
            for value in values {
                write(writer, value)?;
            }
            Ok(())
        },
    )
}

// ============================================================================
// DEFAULT CONVERTERS
// ============================================================================

pub fn int32() -> Converter<i32> {
    Converter::new("i", |r| r.read_int32(), |w, v| {
        w.write_int32(*v);
        Ok(())
    })
}

pub fn float32() -> Converter<f32> {
    Converter::new("f", |r| r.read_float32(), |w, v| {
        w.write_float32(*v);
        Ok(())
    })
}

pub fn string() -> Converter<String> {
    Converter::new("s", |r| r.read_string(), |w, v: &String| w.write_string(v))
}

pub fn blob() -> Converter<Bytes> {
    Converter::new("b", |r| r.read_blob(), |w, v: &Bytes| w.write_blob(v))
}

pub fn int64() -> Converter<i64> {
    Converter::new("h", |r| r.read_int64(), |w, v| {
        w.write_int64(*v);
        Ok(())
    })
}

pub fn time_tag() -> Converter<TimeTag> {
    Converter::new("t", |r| r.read_time_tag(), |w, v| {
        w.write_time_tag(*v);
        Ok(())
    })
}

pub fn float64() -> Converter<f64> {
    Converter::new("d", |r| r.read_float64(), |w, v| {
        w.write_float64(*v);
        Ok(())
    })
}

pub fn character() -> Converter<char> {
    Converter::new("c", |r| r.read_char(), |w, v| {
        w.write_char(*v);
        Ok(())
    })
}

fn bool_from_tag(tag: char) -> Result<bool> {
    match tag {
        'T' => Ok(true),
        'F' => Ok(false),
        other => Err(Error::TypeTagMismatch {
            expected: "T or F".to_string(),
            actual: other.to_string(),
        }),
    }
}

fn bool_tag(value: bool) -> char {
    if value {
        'T'
    } else {
        'F'
    }
}

/// Booleans live entirely in the type tag
pub fn boolean() -> Converter<bool> {
    Converter::untagged(
        |reader| {
            let mut tags = reader.type_tag().chars();
            match (tags.next(), tags.next()) {
                (Some(tag), None) => bool_from_tag(tag),
                _ => Err(Error::TypeTagMismatch {
                    expected: "T or F".to_string(),
                    actual: reader.type_tag().to_string(),
                }),
            }
        },
        |writer, value| writer.write_type_tag(&bool_tag(*value).to_string()),
    )
}

pub fn boolean_list() -> Converter<Vec<bool>> {
    Converter::untagged(
        |reader| reader.type_tag().chars().map(bool_from_tag).collect(),
        |writer, values: &Vec<bool>| {
            let tags: String = values.iter().map(|v| bool_tag(*v)).collect();
            writer.write_arg_tags(&tags);
            Ok(())
        },
    )
}

// ============================================================================
// MIXED ARGUMENT LISTS
// ============================================================================

/// A single OSC argument of any default wire kind
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Int(i32),
    Float(f32),
    String(String),
    Blob(Bytes),
    Long(i64),
    TimeTag(TimeTag),
    Double(f64),
    Char(char),
    Bool(bool),
}

impl OscArg {
    /// The type tag character of this argument
    pub fn tag(&self) -> char {
        match self {
            OscArg::Int(_) => 'i',
            OscArg::Float(_) => 'f',
            OscArg::String(_) => 's',
            OscArg::Blob(_) => 'b',
            OscArg::Long(_) => 'h',
            OscArg::TimeTag(_) => 't',
            OscArg::Double(_) => 'd',
            OscArg::Char(_) => 'c',
            OscArg::Bool(v) => bool_tag(*v),
        }
    }

    fn read(tag: char, reader: &mut OscReader<'_>) -> Result<Self> {
        Ok(match tag {
            'i' => OscArg::Int(reader.read_int32()?),
            'f' => OscArg::Float(reader.read_float32()?),
            's' => OscArg::String(reader.read_string()?),
            'b' => OscArg::Blob(reader.read_blob()?),
            'h' => OscArg::Long(reader.read_int64()?),
            't' => OscArg::TimeTag(reader.read_time_tag()?),
            'd' => OscArg::Double(reader.read_float64()?),
            'c' => OscArg::Char(reader.read_char()?),
            'T' => OscArg::Bool(true),
            'F' => OscArg::Bool(false),
            other => return Err(Error::UnsupportedTypeTag(other)),
        })
    }

    fn write(&self, writer: &mut OscWriter) -> Result<()> {
        match self {
            OscArg::Int(v) => writer.write_int32(*v),
            OscArg::Float(v) => writer.write_float32(*v),
            OscArg::String(v) => writer.write_string(v)?,
            OscArg::Blob(v) => writer.write_blob(v)?,
            OscArg::Long(v) => writer.write_int64(*v),
            OscArg::TimeTag(v) => writer.write_time_tag(*v),
            OscArg::Double(v) => writer.write_float64(*v),
            OscArg::Char(v) => writer.write_char(*v),
            OscArg::Bool(_) => {}
        }
        Ok(())
    }
}

macro_rules! impl_from_arg {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for OscArg {
            fn from(v: $ty) -> Self {
                OscArg::$variant(v)
            }
        })*
    };
}

impl_from_arg! {
    i32 => Int,
    f32 => Float,
    String => String,
    Bytes => Blob,
    i64 => Long,
    TimeTag => TimeTag,
    f64 => Double,
    char => Char,
    bool => Bool,
}

impl From<&str> for OscArg {
    fn from(v: &str) -> Self {
        OscArg::String(v.to_string())
    }
}

/// Arguments of any kinds, in order. The type tag follows the values.
pub fn args() -> Converter<Vec<OscArg>> {
    Converter::untagged(
        |reader| {
            let tags = reader.type_tag().to_string();
            tags.chars().map(|tag| OscArg::read(tag, reader)).collect()
        },
        |writer, values: &Vec<OscArg>| {
            let tags: String = values.iter().map(OscArg::tag).collect();
            writer.write_arg_tags(&tags);
            values.iter().try_for_each(|v| v.write(writer))
        },
    )
}

// ============================================================================
// REGISTRY
// ============================================================================

#[derive(Clone)]
struct Registered {
    type_name: &'static str,
    converter: Arc<dyn Any + Send + Sync>,
}

/// Type to converter lookup, safe to extend while other threads resolve
pub struct ConverterRegistry {
    converters: CopyOnWriteMap<TypeId, Registered>,
}

impl ConverterRegistry {
    /// A registry with no converters at all
    pub fn empty() -> Self {
        Self {
            converters: CopyOnWriteMap::new(),
        }
    }

    /// A registry seeded with the default converters
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register_with_list(int32());
        registry.register_with_list(float32());
        registry.register_with_list(string());
        registry.register_with_list(blob());
        registry.register_with_list(int64());
        registry.register_with_list(time_tag());
        registry.register_with_list(float64());
        registry.register_with_list(character());
        registry.register(boolean());
        registry.register(boolean_list());
        registry.register(args());
        registry
    }

    fn register_with_list<T: OscValue>(&self, converter: Converter<T>) {
        if let Some(tag) = converter.type_tag().and_then(|t| t.chars().next()) {
            self.register(homogeneous_list(tag, &converter));
        }
        self.register(converter);
    }

    /// Install the converter for `T`, replacing any previous one
    pub fn register<T: OscValue>(&self, converter: Converter<T>) {
        self.converters.insert(
            TypeId::of::<T>(),
            Registered {
                type_name: type_name::<T>(),
                converter: Arc::new(converter),
            },
        );
    }

    /// Copy every converter of `other` into this registry
    pub fn merge(&self, other: &ConverterRegistry) {
        let entries = other.converters.snapshot();
        self.converters
            .merge(entries.iter().map(|(k, v)| (*k, v.clone())));
    }

    /// The converter registered for `T`
    pub fn resolve<T: OscValue>(&self) -> Result<Converter<T>> {
        self.converters
            .get(&TypeId::of::<T>())
            .and_then(|r| r.converter.downcast_ref::<Converter<T>>().cloned())
            .ok_or(Error::NoConverter(type_name::<T>()))
    }

    pub fn contains<T: OscValue>(&self) -> bool {
        self.converters.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// Names of the registered types, sorted
    pub fn type_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .converters
            .snapshot()
            .values()
            .map(|r| r.type_name)
            .collect();
        names.sort_unstable();
        names
    }
}

impl Default for ConverterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}

// ============================================================================
// MESSAGES
// ============================================================================

/// Serialize one complete message
pub fn encode_message<T: 'static>(
    address: &str,
    value: &T,
    converter: &Converter<T>,
) -> Result<Bytes> {
    validate_address(address)?;
    let mut writer = OscWriter::with_capacity(64);
    writer.write_string(address)?;
    converter.encode(&mut writer, value)?;
    Ok(writer.freeze())
}

/// Parse one complete message into its address and value
pub fn decode_message<T: 'static>(bytes: &[u8], converter: &Converter<T>) -> Result<(String, T)> {
    let mut reader = OscReader::new(bytes);
    let address = reader.read_string()?;
    reader.read_type_tag()?;
    let value = converter.decode(&mut reader)?;
    Ok((address, value))
}
