//! Latest-value store for drone telemetry.

use std::collections::HashMap;

use crate::catalog::Command;

/// Most recent command received for each `project/class/command` token.
#[derive(Debug, Default)]
pub struct SensorStore {
    sensors: HashMap<String, Command>,
}

impl SensorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `command` as the latest value for its token.
    pub fn update(&mut self, command: Command) {
        self.sensors.insert(command.token(), command);
    }

    /// Returns a copy of the latest value for `token`.
    #[must_use]
    pub fn get(&self, token: &str) -> Option<Command> {
        self.sensors.get(token).cloned()
    }

    /// Returns the tokens with a stored value.
    #[must_use]
    pub fn tokens(&self) -> Vec<String> {
        let mut tokens: Vec<_> = self.sensors.keys().cloned().collect();
        tokens.sort_unstable();
        tokens
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn clear(&mut self) {
        self.sensors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::protocol::ArgValue;

    #[test]
    fn test_update_replaces_and_returns_copies() {
        let catalog = Catalog::builtin();
        let mut store = SensorStore::new();
        let token = "common/CommonState/BatteryStateChanged";

        store.update(catalog.decode_frame(&[0x00, 0x05, 0x01, 0x00, 90]).unwrap());
        store.update(catalog.decode_frame(&[0x00, 0x05, 0x01, 0x00, 89]).unwrap());
        assert_eq!(store.len(), 1);

        let mut snapshot = store.get(token).unwrap();
        assert_eq!(snapshot.get("percent"), Some(&ArgValue::U8(89)));

        snapshot.set("percent", 10).unwrap();
        assert_eq!(
            store.get(token).unwrap().get("percent"),
            Some(&ArgValue::U8(89))
        );
        assert_eq!(store.tokens(), [token]);
        assert!(store.get("common/CommonState/WifiSignalChanged").is_none());
    }
}
