//! Command catalog.
//!
//! Resolves `(project, class, command)` name or id triplets to
//! [`CommandTemplate`]s, building each template on first use and caching it
//! for the catalog's lifetime. Lookups by name and by id share the same
//! template instance.

pub mod builtin;
pub mod command;
pub mod element;
pub mod template;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

pub use command::Command;
pub use element::Element;
pub use template::{ArgumentSpec, CommandTemplate};

use crate::error::{ElementKind, Error, FrameError, Identifier, Result};
use crate::protocol::Value;

type NameKey = (String, String, String);
type IdKey = (u16, u16, u16);

/// Catalog of command definitions.
#[derive(Debug, Default)]
pub struct Catalog {
    projects: Vec<Element>,
    by_name: RwLock<HashMap<NameKey, Arc<CommandTemplate>>>,
    by_id: RwLock<HashMap<IdKey, Arc<CommandTemplate>>>,
}

fn unknown(kind: ElementKind, identifier: Identifier, context: &[&str]) -> Error {
    Error::UnknownElement {
        kind,
        identifier,
        context: context.iter().map(ToString::to_string).collect(),
    }
}

impl Catalog {
    /// Creates a catalog over parsed project definitions.
    #[must_use]
    pub fn new(projects: Vec<Element>) -> Self {
        Self {
            projects: projects
                .into_iter()
                .filter(|p| p.tag == "project")
                .collect(),
            by_name: RwLock::new(HashMap::new()),
            by_id: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a catalog with the bundled `common` and `minidrone` definitions.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(builtin::definitions())
    }

    /// Creates a catalog from a JSON array of project element trees.
    pub fn from_json(json: &str) -> Result<Self> {
        let projects: Vec<Element> = serde_json::from_str(json)?;
        Ok(Self::new(projects))
    }

    /// Returns the names of the loaded projects.
    #[must_use]
    pub fn projects(&self) -> Vec<&str> {
        self.projects.iter().map(Element::name).collect()
    }

    /// Looks up a template by names.
    pub fn lookup_by_name(
        &self,
        project: &str,
        class: &str,
        command: &str,
    ) -> Result<Arc<CommandTemplate>> {
        let key = (project.to_string(), class.to_string(), command.to_string());
        if let Some(template) = self.by_name.read().get(&key) {
            return Ok(Arc::clone(template));
        }

        let project_el = self
            .projects
            .iter()
            .find(|p| p.name() == project)
            .ok_or_else(|| unknown(ElementKind::Project, Identifier::Name(key.0.clone()), &[]))?;
        let class_el = project_el.find_by_name("class", class).ok_or_else(|| {
            unknown(ElementKind::Class, Identifier::Name(key.1.clone()), &[project])
        })?;
        let command_el = class_el.find_by_name("cmd", command).ok_or_else(|| {
            unknown(
                ElementKind::Command,
                Identifier::Name(key.2.clone()),
                &[project, class],
            )
        })?;

        self.insert(project_el, class_el, command_el)
    }

    /// Looks up a template by numeric ids.
    pub fn lookup_by_id(
        &self,
        project_id: u16,
        class_id: u16,
        command_id: u16,
    ) -> Result<Arc<CommandTemplate>> {
        if let Some(template) = self.by_id.read().get(&(project_id, class_id, command_id)) {
            return Ok(Arc::clone(template));
        }

        let project_el = self
            .projects
            .iter()
            .find(|p| p.id() == Some(project_id))
            .ok_or_else(|| unknown(ElementKind::Project, Identifier::Id(project_id), &[]))?;
        let class_el = project_el.find_by_id("class", class_id).ok_or_else(|| {
            unknown(
                ElementKind::Class,
                Identifier::Id(class_id),
                &[project_el.name()],
            )
        })?;
        let command_el = class_el.find_by_id("cmd", command_id).ok_or_else(|| {
            unknown(
                ElementKind::Command,
                Identifier::Id(command_id),
                &[project_el.name(), class_el.name()],
            )
        })?;

        self.insert(project_el, class_el, command_el)
    }

    /// Builds a template and stores it under both keys.
    ///
    /// If another lookup built the same command first, its instance wins.
    fn insert(
        &self,
        project: &Element,
        class: &Element,
        command: &Element,
    ) -> Result<Arc<CommandTemplate>> {
        let built = CommandTemplate::from_elements(project, class, command)?;
        let id_key = (built.project_id(), built.class_id(), built.command_id());
        let name_key = (
            built.project_name().to_string(),
            built.class_name().to_string(),
            built.command_name().to_string(),
        );

        let mut by_id = self.by_id.write();
        let mut by_name = self.by_name.write();
        if let Some(existing) = by_name.get(&name_key) {
            return Ok(Arc::clone(existing));
        }

        if built.deprecated() {
            tracing::warn!("command {} is deprecated", built.token());
        }
        tracing::trace!("built template {}", built.token());

        let template = Arc::new(built);
        by_id.insert(id_key, Arc::clone(&template));
        by_name.insert(name_key, Arc::clone(&template));
        Ok(template)
    }

    /// Creates a command with default values, then applies `initial`.
    ///
    /// Names that don't match an argument are ignored.
    pub fn new_command(
        &self,
        project: &str,
        class: &str,
        command: &str,
        initial: &[(&str, Value)],
    ) -> Result<Command> {
        let mut instance = Command::new(self.lookup_by_name(project, class, command)?);
        for (name, value) in initial {
            if instance.has_argument(name) {
                instance.set(name, value.clone())?;
            }
        }
        Ok(instance)
    }

    /// Decodes an inbound payload (`[projectId][classId][commandId LE][args]`).
    pub fn decode_frame(&self, payload: &[u8]) -> Result<Command> {
        if payload.len() < command::ARGUMENTS_OFFSET {
            return Err(FrameError::TooShort {
                need: command::ARGUMENTS_OFFSET,
                got: payload.len(),
            }
            .into());
        }

        let template = self.lookup_by_id(
            u16::from(payload[0]),
            u16::from(payload[1]),
            u16::from(payload[2]),
        )?;
        Ok(Command::decode(template, payload)?)
    }

    /// Builds every template of every project.
    ///
    /// Returns the number of templates available afterwards. Commands that
    /// fail to build are logged and skipped.
    pub fn warmup(&self) -> usize {
        let mut count = 0;
        for project in &self.projects {
            for class in project.children_named("class") {
                for command in class.children_named("cmd") {
                    match self.lookup_by_name(project.name(), class.name(), command.name()) {
                        Ok(_) => count += 1,
                        Err(e) => tracing::warn!("skipping definition: {e}"),
                    }
                }
            }
        }
        tracing::debug!("catalog warmed up with {count} templates");
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ArgValue, BufferClass};

    #[test]
    fn test_take_off_frame() {
        let catalog = Catalog::builtin();
        let command = catalog
            .new_command("minidrone", "Piloting", "TakeOff", &[])
            .unwrap();

        assert_eq!(&command.to_bytes()[..], &[0x04, 0x00, 0x02, 0x00, 0x01, 0x00]);
        assert!(command.requires_ack());
        assert_eq!(command.buffer_id(), 0x0b);
    }

    #[test]
    fn test_flip_frame() {
        let catalog = Catalog::builtin();
        let command = catalog
            .new_command(
                "minidrone",
                "Animations",
                "Flip",
                &[("direction", Value::from("back"))],
            )
            .unwrap();

        let bytes = command.to_bytes();
        assert_eq!(bytes.len(), 10);
        assert_eq!(&bytes[..6], &[0x04, 0x00, 0x02, 0x04, 0x00, 0x00]);
        assert_eq!(&bytes[6..], &1_i32.to_le_bytes());
    }

    #[test]
    fn test_lookup_equivalence() {
        let catalog = Catalog::builtin();
        let by_name = catalog.lookup_by_name("minidrone", "Piloting", "TakeOff").unwrap();
        let by_id = catalog.lookup_by_id(2, 0, 1).unwrap();

        assert!(Arc::ptr_eq(&by_name, &by_id));
        assert_eq!(
            Command::new(by_name).to_bytes(),
            Command::new(by_id).to_bytes()
        );
    }

    #[test]
    fn test_lookup_by_id_first_shares_instance() {
        let catalog = Catalog::builtin();
        let by_id = catalog.lookup_by_id(2, 4, 0).unwrap();
        let by_name = catalog.lookup_by_name("minidrone", "Animations", "Flip").unwrap();
        assert!(Arc::ptr_eq(&by_name, &by_id));
    }

    #[test]
    fn test_unknown_elements() {
        let catalog = Catalog::builtin();

        let err = catalog.lookup_by_name("bebop", "Piloting", "TakeOff").unwrap_err();
        assert_eq!(err.to_string(), "can't find project called \"bebop\"");

        let err = catalog
            .lookup_by_name("minidrone", "Animations", "Barrel")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "can't find command called \"Barrel\" (minidrone, Animations)"
        );

        match catalog.lookup_by_id(2, 0x0f, 0) {
            Err(Error::UnknownElement {
                kind,
                identifier,
                context,
            }) => {
                assert_eq!(kind, ElementKind::Class);
                assert_eq!(identifier, Identifier::Id(0x0f));
                assert_eq!(context, ["minidrone"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_initial_values_are_ignored() {
        let catalog = Catalog::builtin();
        let command = catalog
            .new_command(
                "minidrone",
                "Animations",
                "Cap",
                &[("offset", Value::from(-90)), ("speed", Value::from(3))],
            )
            .unwrap();
        assert_eq!(command.get("offset"), Some(&ArgValue::I16(-90)));
        assert!(!command.has_argument("speed"));
    }

    #[test]
    fn test_invalid_initial_value() {
        let catalog = Catalog::builtin();
        let result = catalog.new_command(
            "minidrone",
            "Animations",
            "Flip",
            &[("direction", Value::from("up"))],
        );
        assert!(matches!(result, Err(Error::InvalidArgumentValue { .. })));
    }

    #[test]
    fn test_decode_frame() {
        let catalog = Catalog::builtin();
        let payload = [0x02, 0x03, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00];
        let command = catalog.decode_frame(&payload).unwrap();

        assert_eq!(command.token(), "minidrone/PilotingState/FlyingStateChanged");
        assert_eq!(command.get_enum("state"), Some("hovering"));

        let battery = catalog.decode_frame(&[0x00, 0x05, 0x01, 0x00, 87]).unwrap();
        assert_eq!(battery.get("percent"), Some(&ArgValue::U8(87)));
        assert_eq!(
            battery.to_string(),
            "common CommonState BatteryStateChanged percent=87"
        );
    }

    #[test]
    fn test_decode_frame_errors() {
        let catalog = Catalog::builtin();
        assert!(matches!(
            catalog.decode_frame(&[0x02, 0x03]),
            Err(Error::Frame(FrameError::TooShort { need: 4, got: 2 }))
        ));
        assert!(matches!(
            catalog.decode_frame(&[0x09, 0x00, 0x00, 0x00]),
            Err(Error::UnknownElement {
                kind: ElementKind::Project,
                ..
            })
        ));
    }

    #[test]
    fn test_decode_frame_keeps_unknown_ordinal() {
        let catalog = Catalog::builtin();
        let state = catalog
            .decode_frame(&[0x02, 0x03, 0x01, 0x00, 0x09, 0x00, 0x00, 0x00])
            .unwrap();
        assert_eq!(state.get("state"), Some(&ArgValue::Enum(9)));
        assert_eq!(state.get_enum("state"), None);
        assert_eq!(
            state.to_string(),
            "minidrone PilotingState FlyingStateChanged state=\"?\"(9)"
        );
    }

    #[test]
    fn test_warmup() {
        let catalog = Catalog::builtin();
        let count = catalog.warmup();
        assert!(count > 40);
        assert_eq!(catalog.by_id.read().len(), count);
        assert_eq!(catalog.projects(), ["common", "minidrone"]);
    }

    #[test]
    fn test_unsupported_type_is_isolated() {
        let json = r#"[{
            "tag": "project",
            "attributes": {"name": "custom", "id": "9"},
            "children": [{
                "tag": "class",
                "attributes": {"name": "Misc", "id": "0"},
                "children": [
                    {"tag": "cmd", "attributes": {"name": "Bad", "id": "0"},
                     "children": [{"tag": "arg", "attributes": {"name": "x", "type": "u128"}}]},
                    {"tag": "cmd", "attributes": {"name": "Good", "id": "1", "buffer": "HIGH_PRIO"}}
                ]
            }]
        }]"#;
        let catalog = Catalog::from_json(json).unwrap();

        assert!(matches!(
            catalog.lookup_by_name("custom", "Misc", "Bad"),
            Err(Error::UnsupportedType { .. })
        ));
        let good = catalog.lookup_by_name("custom", "Misc", "Good").unwrap();
        assert_eq!(good.buffer_class(), BufferClass::HighPrio);
        assert_eq!(catalog.warmup(), 1);
    }
}
