// ── Device categories ──
//
// Fixed mapping from the platform's short category codes to the device
// kinds a consumer knows how to expose. Anything unlisted is `Unknown`.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

/// Consumer-facing device kind, derived from the category code.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[non_exhaustive]
pub enum DeviceKind {
    AirPurifier,
    Light,
    Outlet,
    Switch,
    Fan,
    SmokeSensor,
    Heater,
    GarageDoor,
    WindowCovering,
    ContactSensor,
    LeakSensor,
    Unknown,
}

impl DeviceKind {
    /// Look up the kind for a category code such as `"dj"` or `"cz"`.
    pub fn from_category(code: &str) -> Self {
        match code {
            "kj" => Self::AirPurifier,
            "dj" | "dd" | "fwd" | "tgq" | "xdd" | "dc" | "tgkg" => Self::Light,
            "cz" | "pc" => Self::Outlet,
            "kg" | "tdq" => Self::Switch,
            "fs" | "fskg" => Self::Fan,
            "ywbj" => Self::SmokeSensor,
            "qn" => Self::Heater,
            "ckmkzq" => Self::GarageDoor,
            "cl" => Self::WindowCovering,
            "mcs" => Self::ContactSensor,
            "rqbj" | "jwbj" => Self::LeakSensor,
            _ => Self::Unknown,
        }
    }

    /// The category name carried in discovery notifications.
    pub fn name(self) -> &'static str {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes() {
        assert_eq!(DeviceKind::from_category("kj"), DeviceKind::AirPurifier);
        assert_eq!(DeviceKind::from_category("tgkg"), DeviceKind::Light);
        assert_eq!(DeviceKind::from_category("pc"), DeviceKind::Outlet);
        assert_eq!(DeviceKind::from_category("tdq"), DeviceKind::Switch);
        assert_eq!(DeviceKind::from_category("fskg"), DeviceKind::Fan);
        assert_eq!(DeviceKind::from_category("ckmkzq"), DeviceKind::GarageDoor);
        assert_eq!(DeviceKind::from_category("jwbj"), DeviceKind::LeakSensor);
    }

    #[test]
    fn unlisted_codes_are_unknown() {
        assert_eq!(DeviceKind::from_category("wg2"), DeviceKind::Unknown);
        assert_eq!(DeviceKind::from_category(""), DeviceKind::Unknown);
        assert_eq!(DeviceKind::Unknown.name(), "Unknown");
    }

    #[test]
    fn names_match_display() {
        assert_eq!(DeviceKind::WindowCovering.name(), "WindowCovering");
        assert_eq!(DeviceKind::SmokeSensor.to_string(), "SmokeSensor");
        assert_eq!("Heater".parse::<DeviceKind>().ok(), Some(DeviceKind::Heater));
    }
}
