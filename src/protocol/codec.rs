//! Argument type codec.
//!
//! Maps the primitive type tags used by command definitions to their wire
//! representation. All numbers are little-endian:
//!
//! ```text
//! u8/i8   1 byte      float   4 bytes (IEEE-754)
//! u16/i16 2 bytes     double  8 bytes (IEEE-754)
//! u32/i32 4 bytes     enum    4 bytes (signed ordinal)
//! u64/i64 8 bytes     string  ASCII + trailing NUL
//! ```

use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::FrameError;

/// Primitive argument type declared by a command definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    Float,
    Double,
    String,
    Enum,
}

impl ArgType {
    /// Returns the definition spelling of the type tag.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U32 => "u32",
            Self::U64 => "u64",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::Float => "float",
            Self::Double => "double",
            Self::String => "string",
            Self::Enum => "enum",
        }
    }

    /// Returns the encoded width in bytes, or `None` for variable-length strings.
    #[must_use]
    pub const fn fixed_width(&self) -> Option<usize> {
        match self {
            Self::U8 | Self::I8 => Some(1),
            Self::U16 | Self::I16 => Some(2),
            Self::U32 | Self::I32 | Self::Float | Self::Enum => Some(4),
            Self::U64 | Self::I64 | Self::Double => Some(8),
            Self::String => None,
        }
    }

    /// Returns the value a freshly built command holds for this type.
    #[must_use]
    pub const fn default_value(&self) -> ArgValue {
        match self {
            Self::U8 => ArgValue::U8(0),
            Self::U16 => ArgValue::U16(0),
            Self::U32 => ArgValue::U32(0),
            Self::U64 => ArgValue::U64(0),
            Self::I8 => ArgValue::I8(0),
            Self::I16 => ArgValue::I16(0),
            Self::I32 => ArgValue::I32(0),
            Self::I64 => ArgValue::I64(0),
            Self::Float => ArgValue::Float(0.0),
            Self::Double => ArgValue::Double(0.0),
            Self::String => ArgValue::String(String::new()),
            Self::Enum => ArgValue::Enum(0),
        }
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArgType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "u8" => Ok(Self::U8),
            "u16" => Ok(Self::U16),
            "u32" => Ok(Self::U32),
            "u64" => Ok(Self::U64),
            "i8" => Ok(Self::I8),
            "i16" => Ok(Self::I16),
            "i32" => Ok(Self::I32),
            "i64" => Ok(Self::I64),
            "float" => Ok(Self::Float),
            "double" => Ok(Self::Double),
            "string" => Ok(Self::String),
            "enum" => Ok(Self::Enum),
            other => Err(other.to_string()),
        }
    }
}

/// Ordered name → ordinal mapping of an enum argument.
///
/// Ordinals follow definition order starting at 0.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnumSpec {
    names: Vec<String>,
}

impl EnumSpec {
    /// Creates an enum mapping from names in definition order.
    #[must_use]
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the ordinal of a name.
    #[must_use]
    pub fn ordinal(&self, name: &str) -> Option<i32> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|i| i32::try_from(i).ok())
    }

    /// Returns the name of an ordinal.
    #[must_use]
    pub fn name(&self, ordinal: i32) -> Option<&str> {
        usize::try_from(ordinal)
            .ok()
            .and_then(|i| self.names.get(i))
            .map(String::as_str)
    }

    /// Returns the names in ordinal order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Returns the number of options.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if the enum has no options.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl fmt::Display for EnumSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, name) in self.names.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={i}")?;
        }
        Ok(())
    }
}

/// A typed argument value as stored in a command.
///
/// Strings are held without their trailing NUL.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Float(f32),
    Double(f64),
    String(String),
    Enum(i32),
}

impl ArgValue {
    /// Returns the type tag of this value.
    #[must_use]
    pub const fn arg_type(&self) -> ArgType {
        match self {
            Self::U8(_) => ArgType::U8,
            Self::U16(_) => ArgType::U16,
            Self::U32(_) => ArgType::U32,
            Self::U64(_) => ArgType::U64,
            Self::I8(_) => ArgType::I8,
            Self::I16(_) => ArgType::I16,
            Self::I32(_) => ArgType::I32,
            Self::I64(_) => ArgType::I64,
            Self::Float(_) => ArgType::Float,
            Self::Double(_) => ArgType::Double,
            Self::String(_) => ArgType::String,
            Self::Enum(_) => ArgType::Enum,
        }
    }

    /// Returns the number of bytes this value occupies on the wire.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::String(s) => s.len() + 1,
            other => other.arg_type().fixed_width().unwrap_or(0),
        }
    }

    /// Appends the wire representation of this value.
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::U8(v) => buf.put_u8(*v),
            Self::U16(v) => buf.put_u16_le(*v),
            Self::U32(v) => buf.put_u32_le(*v),
            Self::U64(v) => buf.put_u64_le(*v),
            Self::I8(v) => buf.put_i8(*v),
            Self::I16(v) => buf.put_i16_le(*v),
            Self::I32(v) | Self::Enum(v) => buf.put_i32_le(*v),
            Self::I64(v) => buf.put_i64_le(*v),
            Self::Float(v) => buf.put_f32_le(*v),
            Self::Double(v) => buf.put_f64_le(*v),
            Self::String(s) => {
                buf.put_slice(s.as_bytes());
                buf.put_u8(0);
            }
        }
    }

    /// Returns the value as a signed integer if it is integral.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::U8(v) => Some(i64::from(v)),
            Self::U16(v) => Some(i64::from(v)),
            Self::U32(v) => Some(i64::from(v)),
            Self::U64(v) => i64::try_from(v).ok(),
            Self::I8(v) => Some(i64::from(v)),
            Self::I16(v) => Some(i64::from(v)),
            Self::I32(v) | Self::Enum(v) => Some(i64::from(v)),
            Self::I64(v) => Some(v),
            Self::Float(_) | Self::Double(_) | Self::String(_) => None,
        }
    }

    /// Returns the value as a float if it is numeric.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float(v) => Some(f64::from(v)),
            Self::Double(v) => Some(v),
            Self::U64(v) => Some(v as f64),
            Self::String(_) => None,
            ref other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Returns the value as a string slice if it is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Untyped input accepted when setting an argument.
///
/// Coerced into an [`ArgValue`] according to the argument's declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
}

macro_rules! value_from_int {
    ($variant:ident: $($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v.into())
                }
            }
        )*
    };
}

value_from_int!(Int: i8, i16, i32, i64);
value_from_int!(UInt: u8, u16, u32, u64);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::UInt(u64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<ArgValue> for Value {
    fn from(v: ArgValue) -> Self {
        match v {
            ArgValue::U8(v) => Self::UInt(v.into()),
            ArgValue::U16(v) => Self::UInt(v.into()),
            ArgValue::U32(v) => Self::UInt(v.into()),
            ArgValue::U64(v) => Self::UInt(v),
            ArgValue::I8(v) => Self::Int(v.into()),
            ArgValue::I16(v) => Self::Int(v.into()),
            ArgValue::I32(v) | ArgValue::Enum(v) => Self::Int(v.into()),
            ArgValue::I64(v) => Self::Int(v),
            ArgValue::Float(v) => Self::Float(v.into()),
            ArgValue::Double(v) => Self::Float(v),
            ArgValue::String(s) => Self::Text(s),
        }
    }
}

/// Numeric view of an input used during coercion.
enum Number {
    Int(i128),
    Float(f64),
}

fn to_number(value: &Value) -> Result<Number, String> {
    match value {
        Value::Int(v) => Ok(Number::Int(i128::from(*v))),
        Value::UInt(v) => Ok(Number::Int(i128::from(*v))),
        // Negative zero is normalized before anything else looks at it.
        Value::Float(v) if *v == 0.0 => Ok(Number::Float(0.0)),
        Value::Float(v) => Ok(Number::Float(*v)),
        Value::Text(s) => {
            let s = s.trim();
            if let Ok(v) = s.parse::<i128>() {
                Ok(Number::Int(v))
            } else {
                s.parse::<f64>()
                    .map(|v| Number::Float(if v == 0.0 { 0.0 } else { v }))
                    .map_err(|_| format!("\"{s}\" is not a number"))
            }
        }
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn to_integer(value: &Value) -> Result<i128, String> {
    match to_number(value)? {
        Number::Int(v) => Ok(v),
        Number::Float(v) if !v.is_finite() => Err(format!("{v} is not a finite number")),
        Number::Float(v) => {
            let floored = v.floor();
            if floored < i128::MIN as f64 || floored > i128::MAX as f64 {
                Err(format!("{v} is out of range"))
            } else {
                Ok(floored as i128)
            }
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_float(value: &Value) -> Result<f64, String> {
    match to_number(value)? {
        Number::Int(v) => Ok(v as f64),
        Number::Float(v) => Ok(v),
    }
}

macro_rules! narrow {
    ($value:expr, $ty:ty, $variant:ident) => {{
        let wide = to_integer($value)?;
        <$ty>::try_from(wide)
            .map(ArgValue::$variant)
            .map_err(|_| format!("{wide} is out of range for {}", stringify!($ty)))
    }};
}

/// Coerces an input into the declared type of an argument.
///
/// Integers are range-checked (floats are floored first), floats are
/// truncated to 32-bit precision, strings must be ASCII, and enums accept
/// either a known option name or a known ordinal. The error is a
/// human-readable reason.
#[allow(clippy::cast_possible_truncation)]
pub fn coerce(ty: ArgType, enum_spec: Option<&EnumSpec>, value: &Value) -> Result<ArgValue, String> {
    match ty {
        ArgType::U8 => narrow!(value, u8, U8),
        ArgType::U16 => narrow!(value, u16, U16),
        ArgType::U32 => narrow!(value, u32, U32),
        ArgType::U64 => narrow!(value, u64, U64),
        ArgType::I8 => narrow!(value, i8, I8),
        ArgType::I16 => narrow!(value, i16, I16),
        ArgType::I32 => narrow!(value, i32, I32),
        ArgType::I64 => narrow!(value, i64, I64),
        ArgType::Float => to_float(value).map(|v| ArgValue::Float(v as f32)),
        ArgType::Double => to_float(value).map(ArgValue::Double),
        ArgType::String => {
            let text = match value {
                Value::Text(s) => s.trim_end_matches('\0').to_string(),
                Value::Int(v) => v.to_string(),
                Value::UInt(v) => v.to_string(),
                Value::Float(v) => v.to_string(),
            };
            if !text.is_ascii() {
                return Err(format!("\"{text}\" is not ASCII"));
            }
            if text.contains('\0') {
                return Err("strings can't contain NUL bytes".into());
            }
            Ok(ArgValue::String(text))
        }
        ArgType::Enum => {
            let Some(spec) = enum_spec else {
                return Err("enum argument has no options".into());
            };
            let ordinal = match value {
                Value::Text(name) => spec.ordinal(name),
                other => to_integer(other)
                    .ok()
                    .and_then(|v| i32::try_from(v).ok())
                    .filter(|v| spec.name(*v).is_some()),
            };
            ordinal.map(ArgValue::Enum).ok_or_else(|| {
                format!(
                    "{} could not be interpreted as an enum value. Available options are {spec}",
                    display_input(value)
                )
            })
        }
    }
}

fn display_input(value: &Value) -> String {
    match value {
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Text(s) => format!("\"{s}\""),
    }
}

/// Decodes one argument starting at `offset`.
///
/// Returns the value and the number of bytes consumed. Strings run up to
/// and including the first NUL, or to the end of the buffer. Enum ordinals
/// missing from `enum_spec` are kept as received.
pub fn decode(
    ty: ArgType,
    enum_spec: Option<&EnumSpec>,
    name: &str,
    data: &[u8],
    offset: usize,
) -> Result<(ArgValue, usize), FrameError> {
    let rest = data.get(offset..).unwrap_or_default();

    if ty == ArgType::String {
        return Ok(match rest.iter().position(|&b| b == 0) {
            Some(end) => (
                ArgValue::String(String::from_utf8_lossy(&rest[..end]).into_owned()),
                end + 1,
            ),
            None => (
                ArgValue::String(String::from_utf8_lossy(rest).into_owned()),
                rest.len(),
            ),
        });
    }

    let width = ty.fixed_width().unwrap_or(0);
    if rest.len() < width {
        return Err(FrameError::Incomplete {
            field: format!("{ty} argument {name}"),
            expected: width,
            got: rest.len(),
        });
    }

    let mut cursor = &rest[..width];
    let value = match ty {
        ArgType::U8 => ArgValue::U8(cursor.get_u8()),
        ArgType::U16 => ArgValue::U16(cursor.get_u16_le()),
        ArgType::U32 => ArgValue::U32(cursor.get_u32_le()),
        ArgType::U64 => ArgValue::U64(cursor.get_u64_le()),
        ArgType::I8 => ArgValue::I8(cursor.get_i8()),
        ArgType::I16 => ArgValue::I16(cursor.get_i16_le()),
        ArgType::I32 => ArgValue::I32(cursor.get_i32_le()),
        ArgType::I64 => ArgValue::I64(cursor.get_i64_le()),
        ArgType::Float => ArgValue::Float(cursor.get_f32_le()),
        ArgType::Double => ArgValue::Double(cursor.get_f64_le()),
        ArgType::Enum => {
            let ordinal = cursor.get_i32_le();
            if enum_spec.is_some_and(|spec| spec.name(ordinal).is_none()) {
                tracing::debug!("argument {name} has unknown enum ordinal {ordinal}");
            }
            ArgValue::Enum(ordinal)
        }
        ArgType::String => unreachable!("strings are decoded above"),
    };

    Ok((value, width))
}
