//! Command instances.
//!
//! A [`Command`] binds argument values to a shared [`CommandTemplate`]. Its
//! wire form is:
//! ```text
//! ┌────────┬────────┬───────────┬─────────┬──────────────┬───────────┐
//! │  flag  │  seq   │ projectId │ classId │ commandId LE │ arguments │
//! │ 1 byte │ 1 byte │  1 byte   │ 1 byte  │   2 bytes    │    ...    │
//! └────────┴────────┴───────────┴─────────┴──────────────┴───────────┘
//! ```
//! The sequence byte is a placeholder until the connection stamps it.

use std::fmt;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use super::template::{ArgumentSpec, CommandTemplate};
use crate::error::{Error, FrameError, Result};
use crate::protocol::{ArgType, ArgValue, BufferClass, DataType, Value, codec};

/// Size of the command header (flag, sequence, ids).
pub const HEADER_SIZE: usize = 6;

/// Offset of the sequence byte.
pub const SEQUENCE_OFFSET: usize = 1;

/// Offset of the first argument in an inbound payload (`[pid][cid][cmd LE]`).
pub const ARGUMENTS_OFFSET: usize = 4;

/// A command template with concrete argument values.
///
/// Cloning shares the template and copies the values.
#[derive(Debug, Clone)]
pub struct Command {
    template: Arc<CommandTemplate>,
    values: Vec<ArgValue>,
}

impl Command {
    /// Creates a command with every argument at its default value.
    #[must_use]
    pub fn new(template: Arc<CommandTemplate>) -> Self {
        let values = template
            .arguments()
            .iter()
            .map(|arg| arg.arg_type.default_value())
            .collect();
        Self { template, values }
    }

    /// Decodes the arguments of an inbound payload.
    ///
    /// `payload` starts at the project id; arguments are read sequentially
    /// from [`ARGUMENTS_OFFSET`].
    pub fn decode(template: Arc<CommandTemplate>, payload: &[u8]) -> Result<Self, FrameError> {
        let mut values = Vec::with_capacity(template.arguments().len());
        let mut offset = ARGUMENTS_OFFSET;

        for arg in template.arguments() {
            let (value, consumed) = codec::decode(
                arg.arg_type,
                arg.enum_spec.as_ref(),
                &arg.name,
                payload,
                offset,
            )?;
            values.push(value);
            offset += consumed;
        }

        Ok(Self { template, values })
    }

    /// Returns the shared template.
    #[must_use]
    pub const fn template(&self) -> &Arc<CommandTemplate> {
        &self.template
    }

    /// Returns the `project/class/command` token.
    #[must_use]
    pub fn token(&self) -> String {
        self.template.token()
    }

    #[must_use]
    pub fn buffer_class(&self) -> BufferClass {
        self.template.buffer_class()
    }

    /// Returns the logical channel this command is sent on.
    #[must_use]
    pub fn buffer_id(&self) -> u8 {
        self.template.buffer_class().buffer_id()
    }

    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.template.buffer_class().data_type()
    }

    /// Returns true if sending this command waits for an ack.
    #[must_use]
    pub fn requires_ack(&self) -> bool {
        self.template.buffer_class().requires_ack()
    }

    /// Returns true if the command has an argument with this name.
    #[must_use]
    pub fn has_argument(&self, name: &str) -> bool {
        self.template.argument_index(name).is_some()
    }

    /// Returns the value of a named argument.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.template
            .argument_index(name)
            .and_then(|i| self.values.get(i))
    }

    /// Returns the option name of an enum argument.
    #[must_use]
    pub fn get_enum(&self, name: &str) -> Option<&str> {
        let index = self.template.argument_index(name)?;
        let spec = self.template.arguments()[index].enum_spec.as_ref()?;
        match self.values[index] {
            ArgValue::Enum(ordinal) => spec.name(ordinal),
            _ => None,
        }
    }

    /// Sets a named argument, coercing the value to its declared type.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let Some(index) = self.template.argument_index(name) else {
            return Err(Error::InvalidArgumentValue {
                name: name.to_string(),
                reason: format!("{} has no such argument", self.template.token()),
            });
        };
        let spec = &self.template.arguments()[index];
        let value = codec::coerce(spec.arg_type, spec.enum_spec.as_ref(), &value.into())
            .map_err(|reason| Error::InvalidArgumentValue {
                name: name.to_string(),
                reason,
            })?;
        self.values[index] = value;
        Ok(())
    }

    /// Builder form of [`Command::set`].
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Iterates over argument specs and their values.
    pub fn arguments(&self) -> impl Iterator<Item = (&ArgumentSpec, &ArgValue)> {
        self.template.arguments().iter().zip(&self.values)
    }

    /// Returns the encoded length.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.values.iter().map(ArgValue::encoded_len).sum::<usize>()
    }

    /// Encodes the command with a zero sequence placeholder.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u8(self.data_type().into());
        buf.put_u8(0);
        // Templates reject project and class ids above 255.
        buf.put_u8(self.template.project_id() as u8);
        buf.put_u8(self.template.class_id() as u8);
        buf.put_u16_le(self.template.command_id());
        for value in &self.values {
            value.encode(&mut buf);
        }
        buf.freeze()
    }
}

fn fmt_float(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    let s = format!("{v:.3}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    f.write_str(if s == "-0" { "0" } else { s })
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.template)?;

        for (spec, value) in self.arguments() {
            write!(f, " {}=", spec.name)?;
            match (spec.arg_type, value) {
                (ArgType::Enum, ArgValue::Enum(ordinal)) => {
                    let name = spec
                        .enum_spec
                        .as_ref()
                        .and_then(|e| e.name(*ordinal))
                        .unwrap_or("?");
                    write!(f, "\"{name}\"({ordinal})")?;
                }
                (_, ArgValue::String(s)) => write!(f, "\"{s}\"")?,
                (_, ArgValue::Float(v)) => fmt_float(f, f64::from(*v))?,
                (_, ArgValue::Double(v)) => fmt_float(f, *v)?,
                (_, ArgValue::U64(v)) => write!(f, "{v}")?,
                (_, other) => write!(f, "{}", other.as_i64().unwrap_or_default())?,
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Element;

    fn template(command: Element) -> Arc<CommandTemplate> {
        let project = Element::new("project").attr("name", "minidrone").attr("id", 2);
        let class = Element::new("class").attr("name", "Test").attr("id", 7);
        Arc::new(CommandTemplate::from_elements(&project, &class, &command).unwrap())
    }

    fn arg(name: &str, ty: &str) -> Element {
        Element::new("arg").attr("name", name).attr("type", ty)
    }

    fn mixed() -> Arc<CommandTemplate> {
        template(
            Element::new("cmd")
                .attr("name", "Mixed")
                .attr("id", 0x0102)
                .attr("buffer", "NON_ACK")
                .child(arg("speed", "float"))
                .child(arg("label", "string"))
                .child(
                    arg("mode", "enum")
                        .child(Element::new("enum").attr("name", "slow"))
                        .child(Element::new("enum").attr("name", "fast")),
                )
                .child(arg("offset", "i16")),
        )
    }

    #[test]
    fn test_defaults() {
        let command = Command::new(mixed());
        assert_eq!(command.get("speed"), Some(&ArgValue::Float(0.0)));
        assert_eq!(command.get("label"), Some(&ArgValue::String(String::new())));
        assert_eq!(command.get_enum("mode"), Some("slow"));
        assert_eq!(command.get("missing"), None);
    }

    #[test]
    fn test_to_bytes() {
        let command = Command::new(mixed())
            .with("speed", 1.5)
            .unwrap()
            .with("label", "ab")
            .unwrap()
            .with("mode", "fast")
            .unwrap()
            .with("offset", -2)
            .unwrap();

        let bytes = command.to_bytes();
        let mut expected = vec![0x02, 0x00, 0x02, 0x07, 0x02, 0x01];
        expected.extend_from_slice(&1.5_f32.to_le_bytes());
        expected.extend_from_slice(b"ab\0");
        expected.extend_from_slice(&1_i32.to_le_bytes());
        expected.extend_from_slice(&[0xFE, 0xFF]);

        assert_eq!(&bytes[..], &expected[..]);
        assert_eq!(bytes.len(), command.encoded_len());
    }

    #[test]
    fn test_decode_payload() {
        let original = Command::new(mixed())
            .with("label", "hello")
            .unwrap()
            .with("mode", 1)
            .unwrap()
            .with("offset", 300)
            .unwrap();
        let bytes = original.to_bytes();

        let decoded = Command::decode(mixed(), &bytes[2..]).unwrap();
        assert_eq!(decoded.get("label"), Some(&ArgValue::String("hello".into())));
        assert_eq!(decoded.get_enum("mode"), Some("fast"));
        assert_eq!(decoded.get("offset"), Some(&ArgValue::I16(300)));
    }

    #[test]
    fn test_set_rejects_bad_values() {
        let mut command = Command::new(mixed());
        assert!(matches!(
            command.set("mode", "turbo"),
            Err(Error::InvalidArgumentValue { ref name, .. }) if name == "mode"
        ));
        assert!(matches!(
            command.set("unknown", 1),
            Err(Error::InvalidArgumentValue { .. })
        ));
        assert!(command.set("offset", 40_000).is_err());
        assert_eq!(command.get("offset"), Some(&ArgValue::I16(0)));
    }

    #[test]
    fn test_clone_is_independent() {
        let original = Command::new(mixed());
        let mut copy = original.clone();
        copy.set("offset", 5).unwrap();

        assert_eq!(original.get("offset"), Some(&ArgValue::I16(0)));
        assert_eq!(copy.get("offset"), Some(&ArgValue::I16(5)));
        assert!(Arc::ptr_eq(original.template(), copy.template()));
    }

    #[test]
    fn test_display() {
        let command = Command::new(mixed())
            .with("speed", 0.25)
            .unwrap()
            .with("label", "x")
            .unwrap()
            .with("mode", "fast")
            .unwrap();
        assert_eq!(
            command.to_string(),
            "minidrone Test Mixed speed=0.25 label=\"x\" mode=\"fast\"(1) offset=0"
        );
    }

    #[test]
    fn test_display_large_unsigned() {
        let command = Command::new(template(
            Element::new("cmd")
                .attr("name", "Counter")
                .attr("id", 3)
                .child(arg("big", "u64")),
        ))
        .with("big", u64::MAX)
        .unwrap();
        assert_eq!(
            command.to_string(),
            "minidrone Test Counter big=18446744073709551615"
        );
    }

    #[test]
    fn test_decode_truncated_arguments() {
        let payload = [0x02, 0x07, 0x02, 0x01, 0x00, 0x00];
        assert!(matches!(
            Command::decode(mixed(), &payload),
            Err(FrameError::Incomplete { .. })
        ));
    }
}
