//! Bundled definitions for the `common` and `minidrone` projects.
//!
//! Covers the commands a minidrone controller needs: piloting, animations,
//! speed/piloting settings, media and the shared state notifications.

use super::element::Element;

fn project(name: &str, id: u16, classes: impl IntoIterator<Item = Element>) -> Element {
    Element::new("project")
        .attr("name", name)
        .attr("id", id)
        .children(classes)
}

fn class(name: &str, id: u16, commands: impl IntoIterator<Item = Element>) -> Element {
    Element::new("class")
        .attr("name", name)
        .attr("id", id)
        .children(commands)
}

fn cmd(name: &str, id: u16, description: &str) -> Element {
    Element::new("cmd")
        .attr("name", name)
        .attr("id", id)
        .text(description)
}

fn arg(name: &str, ty: &str) -> Element {
    Element::new("arg").attr("name", name).attr("type", ty)
}

fn enum_arg(name: &str, options: &[&str]) -> Element {
    arg(name, "enum").children(options.iter().map(|o| Element::new("enum").attr("name", o)))
}

/// Returns the bundled project definitions.
#[must_use]
pub fn definitions() -> Vec<Element> {
    vec![common(), minidrone()]
}

#[allow(clippy::too_many_lines)]
fn minidrone() -> Element {
    const FLYING_STATES: &[&str] = &[
        "landed",
        "takingoff",
        "hovering",
        "flying",
        "landing",
        "emergency",
        "rolling",
        "init",
    ];

    project(
        "minidrone",
        2,
        [
            class(
                "Piloting",
                0,
                [
                    cmd("FlatTrim", 0, "Do a flat trim"),
                    cmd("TakeOff", 1, "Ask the drone to take off"),
                    cmd("PCMD", 2, "Ask the drone to move around")
                        .attr("buffer", "NON_ACK")
                        .children([
                            arg("flag", "u8"),
                            arg("roll", "i8"),
                            arg("pitch", "i8"),
                            arg("yaw", "i8"),
                            arg("gaz", "i8"),
                            arg("timestamp", "u32"),
                        ]),
                    cmd("Landing", 3, "Ask the drone to land"),
                    cmd("Emergency", 4, "Cut out the motors").attr("buffer", "HIGH_PRIO"),
                    cmd("AutoTakeOffMode", 5, "Set the drone in ready for auto take off")
                        .child(arg("state", "u8")),
                    cmd("FlyingMode", 6, "Set the plane flying mode")
                        .child(enum_arg("mode", &["quadricopter", "plane"])),
                    cmd("PlaneGearBox", 7, "Set the plane gear box")
                        .child(enum_arg("state", &["gear_1", "gear_2", "gear_3"])),
                    cmd("TogglePilotingMode", 8, "Change the piloting mode"),
                ],
            ),
            class(
                "SpeedSettings",
                1,
                [
                    cmd("MaxVerticalSpeed", 0, "Set max vertical speed")
                        .child(arg("current", "float")),
                    cmd("MaxRotationSpeed", 1, "Set max rotation speed")
                        .child(arg("current", "float")),
                    cmd("Wheels", 2, "Set the presence of wheels").child(arg("present", "u8")),
                    cmd("MaxHorizontalSpeed", 3, "Set max horizontal speed")
                        .child(arg("current", "float")),
                ],
            ),
            class(
                "PilotingState",
                3,
                [
                    cmd("FlatTrimChanged", 0, "Drone acknowledges that flat trim was computed"),
                    cmd("FlyingStateChanged", 1, "Flying state")
                        .child(enum_arg("state", FLYING_STATES)),
                    cmd("AlertStateChanged", 2, "Alert state").child(enum_arg(
                        "state",
                        &["none", "user", "cut_out", "critical_battery", "low_battery"],
                    )),
                    cmd("AutoTakeOffModeChanged", 3, "Auto take off mode")
                        .child(arg("state", "u8")),
                ],
            ),
            class(
                "Animations",
                4,
                [
                    cmd("Flip", 0, "Make a flip")
                        .child(enum_arg("direction", &["front", "back", "right", "left"])),
                    cmd("Cap", 1, "Change the product cap").child(arg("offset", "i16")),
                ],
            ),
            class(
                "SpeedSettingsState",
                5,
                [
                    cmd("MaxVerticalSpeedChanged", 0, "Max vertical speed").children([
                        arg("current", "float"),
                        arg("min", "float"),
                        arg("max", "float"),
                    ]),
                    cmd("MaxRotationSpeedChanged", 1, "Max rotation speed").children([
                        arg("current", "float"),
                        arg("min", "float"),
                        arg("max", "float"),
                    ]),
                    cmd("WheelsChanged", 2, "Presence of wheels").child(arg("present", "u8")),
                    cmd("MaxHorizontalSpeedChanged", 3, "Max horizontal speed").children([
                        arg("current", "float"),
                        arg("min", "float"),
                        arg("max", "float"),
                    ]),
                ],
            ),
            class(
                "MediaRecord",
                6,
                [
                    cmd("Picture", 0, "Take a picture")
                        .attr("deprecated", "true")
                        .child(arg("mass_storage_id", "u8")),
                    cmd("PictureV2", 1, "Take a picture"),
                ],
            ),
            class(
                "MediaRecordState",
                7,
                [
                    cmd("PictureStateChanged", 0, "State of picture taking")
                        .attr("deprecated", "true")
                        .children([arg("state", "u8"), arg("mass_storage_id", "u8")]),
                    cmd("PictureStateChangedV2", 1, "State of device picture recording")
                        .children([
                            enum_arg("state", &["ready", "busy", "notAvailable"]),
                            enum_arg(
                                "error",
                                &["ok", "unknown", "camera_ko", "memoryFull", "lowBattery"],
                            ),
                        ]),
                ],
            ),
            class(
                "PilotingSettings",
                8,
                [
                    cmd("MaxAltitude", 0, "Set max altitude").child(arg("current", "float")),
                    cmd("MaxTilt", 1, "Set max tilt").child(arg("current", "float")),
                ],
            ),
            class(
                "PilotingSettingsState",
                9,
                [
                    cmd("MaxAltitudeChanged", 0, "Max altitude").children([
                        arg("current", "float"),
                        arg("min", "float"),
                        arg("max", "float"),
                    ]),
                    cmd("MaxTiltChanged", 1, "Max tilt").children([
                        arg("current", "float"),
                        arg("min", "float"),
                        arg("max", "float"),
                    ]),
                ],
            ),
        ],
    )
}

fn common() -> Element {
    project(
        "common",
        0,
        [
            class(
                "Network",
                0,
                [cmd("Disconnect", 0, "Signals the remote that the host will disconnect")],
            ),
            class(
                "NetworkEvent",
                1,
                [cmd("Disconnection", 0, "Drone will disconnect")
                    .child(enum_arg("cause", &["off_button", "unknown"]))],
            ),
            class(
                "Settings",
                2,
                [
                    cmd("AllSettings", 0, "Ask for all settings"),
                    cmd("Reset", 1, "Reset all settings"),
                    cmd("ProductName", 2, "Set product name").child(arg("name", "string")),
                    cmd("Country", 3, "Set the country").child(arg("code", "string")),
                ],
            ),
            class(
                "SettingsState",
                3,
                [
                    cmd("AllSettingsChanged", 0, "All settings have been sent"),
                    cmd("ResetChanged", 1, "All settings have been reset"),
                    cmd("ProductNameChanged", 2, "Product name").child(arg("name", "string")),
                    cmd("ProductVersionChanged", 3, "Product version")
                        .children([arg("software", "string"), arg("hardware", "string")]),
                    cmd("ProductSerialHighChanged", 4, "Product serial, high part")
                        .child(arg("high", "string")),
                    cmd("ProductSerialLowChanged", 5, "Product serial, low part")
                        .child(arg("low", "string")),
                ],
            ),
            class(
                "Common",
                4,
                [
                    cmd("AllStates", 0, "Ask for all states"),
                    cmd("CurrentDate", 1, "Set the date (ISO-8601)").child(arg("date", "string")),
                    cmd("CurrentTime", 2, "Set the time (ISO-8601)").child(arg("time", "string")),
                    cmd("Reboot", 3, "Reboot the product"),
                ],
            ),
            class(
                "CommonState",
                5,
                [
                    cmd("AllStatesChanged", 0, "All states have been sent"),
                    cmd("BatteryStateChanged", 1, "Battery state").child(arg("percent", "u8")),
                    cmd("MassStorageStateListChanged", 2, "Mass storage state list")
                        .children([arg("mass_storage_id", "u8"), arg("name", "string")]),
                    cmd("CurrentDateChanged", 4, "Date changed").child(arg("date", "string")),
                    cmd("CurrentTimeChanged", 5, "Time changed").child(arg("time", "string")),
                    cmd("WifiSignalChanged", 7, "Wifi signal strength")
                        .child(arg("rssi", "i16")),
                ],
            ),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_ids() {
        let projects = definitions();
        let ids: Vec<_> = projects.iter().map(|p| (p.name(), p.id())).collect();
        assert_eq!(ids, [("common", Some(0)), ("minidrone", Some(2))]);
    }

    #[test]
    fn test_ids_are_unique_per_class() {
        for project in definitions() {
            for class in project.children_named("class") {
                let mut ids: Vec<_> = class.children_named("cmd").filter_map(Element::id).collect();
                let count = ids.len();
                ids.sort_unstable();
                ids.dedup();
                assert_eq!(ids.len(), count, "duplicate id in {}", class.name());
            }
        }
    }
}
