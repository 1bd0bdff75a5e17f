//! Command templates and argument specs.
//!
//! A template is the immutable metadata of one command: where it lives in
//! the project/class/command namespace, its arguments and how it travels.

use std::collections::HashMap;
use std::fmt;

use super::element::Element;
use crate::error::{ElementKind, Error, Result};
use crate::protocol::{ArgType, BufferClass, EnumSpec, TimeoutPolicy};

/// Declaration of one command argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentSpec {
    /// Argument name, unique within its command.
    pub name: String,
    /// Declared type.
    pub arg_type: ArgType,
    /// Free-form description from the definition.
    pub description: String,
    /// Options of an enum argument, in ordinal order.
    pub enum_spec: Option<EnumSpec>,
}

impl ArgumentSpec {
    fn from_element(element: &Element, token: &str) -> Result<Self> {
        let name = element.name().to_string();
        let type_name = element.get("type").unwrap_or_default();
        let arg_type: ArgType = type_name.parse().map_err(|type_name| Error::UnsupportedType {
            type_name,
            argument: name.clone(),
            token: token.to_string(),
        })?;

        let enum_spec = (arg_type == ArgType::Enum)
            .then(|| EnumSpec::new(element.children_named("enum").map(|e| e.name().to_string())));

        Ok(Self {
            name,
            arg_type,
            description: element.text.trim().to_string(),
            enum_spec,
        })
    }
}

/// Immutable metadata of a command.
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    project_id: u16,
    project_name: String,
    class_id: u16,
    class_name: String,
    command_id: u16,
    command_name: String,
    description: String,
    arguments: Vec<ArgumentSpec>,
    index: HashMap<String, usize>,
    buffer_class: BufferClass,
    timeout_policy: TimeoutPolicy,
    deprecated: bool,
}

/// Reads the `id` attribute of a definition level, bounded by `max`.
fn element_id(element: &Element, kind: ElementKind, max: u16, token: &str) -> Result<u16> {
    let invalid = |reason: String| Error::InvalidDefinition {
        token: token.to_string(),
        reason,
    };
    let id = element.id().ok_or_else(|| {
        invalid(format!(
            "{kind} has a missing or invalid id {:?}",
            element.get("id").unwrap_or_default()
        ))
    })?;
    if id > max {
        return Err(invalid(format!("{kind} id {id} exceeds {max}")));
    }
    Ok(id)
}

impl CommandTemplate {
    /// Builds a template from its project, class and command definitions.
    ///
    /// Fails with [`Error::UnsupportedType`] if an argument declares an
    /// unknown type.
    pub fn from_elements(project: &Element, class: &Element, command: &Element) -> Result<Self> {
        let project_name = project.name().to_string();
        let class_name = class.name().to_string();
        let command_name = command.name().to_string();
        let token = format!("{project_name}/{class_name}/{command_name}");

        let arguments = command
            .children_named("arg")
            .map(|arg| ArgumentSpec::from_element(arg, &token))
            .collect::<Result<Vec<_>>>()?;
        let index = arguments
            .iter()
            .enumerate()
            .map(|(i, arg)| (arg.name.clone(), i))
            .collect();

        let buffer_class = match command.get("buffer") {
            None => BufferClass::default(),
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!("{token}: {e}, using {}", BufferClass::default());
                BufferClass::default()
            }),
        };
        let timeout_policy = command
            .get("timeout")
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default();

        Ok(Self {
            project_id: element_id(project, ElementKind::Project, u8::MAX.into(), &token)?,
            project_name,
            class_id: element_id(class, ElementKind::Class, u8::MAX.into(), &token)?,
            class_name,
            command_id: element_id(command, ElementKind::Command, u16::MAX, &token)?,
            command_name,
            description: command.text.trim().to_string(),
            arguments,
            index,
            buffer_class,
            timeout_policy,
            deprecated: command.get("deprecated") == Some("true"),
        })
    }

    /// Returns the project id.
    #[must_use]
    pub const fn project_id(&self) -> u16 {
        self.project_id
    }

    /// Returns the project name.
    #[must_use]
    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Returns the class id.
    #[must_use]
    pub const fn class_id(&self) -> u16 {
        self.class_id
    }

    /// Returns the class name.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Returns the command id.
    #[must_use]
    pub const fn command_id(&self) -> u16 {
        self.command_id
    }

    /// Returns the command name.
    #[must_use]
    pub fn command_name(&self) -> &str {
        &self.command_name
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the argument specs in declaration order.
    #[must_use]
    pub fn arguments(&self) -> &[ArgumentSpec] {
        &self.arguments
    }

    /// Returns the position of a named argument.
    #[must_use]
    pub fn argument_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    #[must_use]
    pub const fn buffer_class(&self) -> BufferClass {
        self.buffer_class
    }

    #[must_use]
    pub const fn timeout_policy(&self) -> TimeoutPolicy {
        self.timeout_policy
    }

    #[must_use]
    pub const fn deprecated(&self) -> bool {
        self.deprecated
    }

    /// Returns the `project/class/command` token.
    #[must_use]
    pub fn token(&self) -> String {
        format!(
            "{}/{}/{}",
            self.project_name, self.class_name, self.command_name
        )
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.project_name, self.class_name, self.command_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flip() -> (Element, Element, Element) {
        let project = Element::new("project").attr("name", "minidrone").attr("id", 2);
        let class = Element::new("class").attr("name", "Animations").attr("id", 4);
        let command = Element::new("cmd")
            .attr("name", "Flip")
            .attr("id", 0)
            .text("  Make a flip  ")
            .child(
                Element::new("arg")
                    .attr("name", "direction")
                    .attr("type", "enum")
                    .children(
                        ["front", "back", "right", "left"]
                            .map(|n| Element::new("enum").attr("name", n)),
                    ),
            );
        (project, class, command)
    }

    #[test]
    fn test_build_template() {
        let (project, class, command) = flip();
        let template = CommandTemplate::from_elements(&project, &class, &command).unwrap();

        assert_eq!(template.token(), "minidrone/Animations/Flip");
        assert_eq!(template.project_id(), 2);
        assert_eq!(template.class_id(), 4);
        assert_eq!(template.command_id(), 0);
        assert_eq!(template.description(), "Make a flip");
        assert_eq!(template.buffer_class(), BufferClass::DataWithAck);
        assert_eq!(template.timeout_policy(), TimeoutPolicy::Pop);
        assert!(!template.deprecated());
        assert_eq!(template.argument_index("direction"), Some(0));

        let spec = template.arguments()[0].enum_spec.as_ref().unwrap();
        assert_eq!(spec.ordinal("back"), Some(1));
        assert_eq!(spec.len(), 4);
    }

    #[test]
    fn test_unsupported_type() {
        let (project, class, _) = flip();
        let command = Element::new("cmd")
            .attr("name", "Weird")
            .attr("id", 9)
            .child(Element::new("arg").attr("name", "blob").attr("type", "bitfield"));

        match CommandTemplate::from_elements(&project, &class, &command) {
            Err(Error::UnsupportedType {
                type_name,
                argument,
                token,
            }) => {
                assert_eq!(type_name, "bitfield");
                assert_eq!(argument, "blob");
                assert_eq!(token, "minidrone/Animations/Weird");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let (project, class, _) = flip();
        let command = Element::new("cmd").attr("name", "Anonymous");

        match CommandTemplate::from_elements(&project, &class, &command) {
            Err(Error::InvalidDefinition { token, reason }) => {
                assert_eq!(token, "minidrone/Animations/Anonymous");
                assert!(reason.starts_with("command has a missing or invalid id"));
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let command = Element::new("cmd").attr("name", "Typo").attr("id", "x1");
        assert!(matches!(
            CommandTemplate::from_elements(&project, &class, &command),
            Err(Error::InvalidDefinition { .. })
        ));
    }

    #[test]
    fn test_ids_must_fit_the_wire() {
        let (project, _, command) = flip();
        let class = Element::new("class").attr("name", "Wide").attr("id", 300);

        match CommandTemplate::from_elements(&project, &class, &command) {
            Err(Error::InvalidDefinition { reason, .. }) => {
                assert_eq!(reason, "class id 300 exceeds 255");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        let project = Element::new("project").attr("name", "big").attr("id", 256);
        let class = Element::new("class").attr("name", "Animations").attr("id", 4);
        assert!(CommandTemplate::from_elements(&project, &class, &command).is_err());

        // Command ids are 16-bit on the wire.
        let command = Element::new("cmd").attr("name", "High").attr("id", 0x0102);
        let project = Element::new("project").attr("name", "minidrone").attr("id", 2);
        let template = CommandTemplate::from_elements(&project, &class, &command).unwrap();
        assert_eq!(template.command_id(), 0x0102);
    }

    #[test]
    fn test_buffer_and_timeout_attributes() {
        let (project, class, _) = flip();
        let command = Element::new("cmd")
            .attr("name", "PCMD")
            .attr("id", 2)
            .attr("buffer", "NON_ACK")
            .attr("timeout", "RETRY")
            .attr("deprecated", "true");

        let template = CommandTemplate::from_elements(&project, &class, &command).unwrap();
        assert_eq!(template.buffer_class(), BufferClass::NonAck);
        assert_eq!(template.timeout_policy(), TimeoutPolicy::Retry);
        assert!(template.deprecated());
    }
}
