//! Reader settings persisted under the `readerSettings` key.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Color schemes understood by the theme stylesheet, in cycling order.
pub const COLOR_SCHEMES: [&str; 5] = ["light", "tan", "blue", "gray", "black"];

pub const DEFAULT_COLOR_SCHEME: &str = "tan";
pub const DEFAULT_FONT_FAMILY: &str = "serif";
pub const DEFAULT_FONT_SIZE: f64 = 1.0;

/// Generate a random 128-bit identifier as 32 uppercase hex digits.
///
/// Used for device ids and worker channel correlation ids.
pub fn random_id() -> String {
    Uuid::new_v4().simple().to_string().to_uppercase()
}

/// Theme preferences. Missing values fall back to the defaults above.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
}

impl ThemeSettings {
    pub fn color_scheme(&self) -> &str {
        self.color_scheme.as_deref().unwrap_or(DEFAULT_COLOR_SCHEME)
    }

    pub fn font_family(&self) -> &str {
        self.font_family.as_deref().unwrap_or(DEFAULT_FONT_FAMILY)
    }

    pub fn font_size(&self) -> f64 {
        self.font_size.unwrap_or(DEFAULT_FONT_SIZE)
    }

    /// Advance to the next color scheme, wrapping around.
    ///
    /// An unknown current scheme restarts the cycle at the first entry.
    pub fn cycle_color_scheme(&mut self) -> &str {
        let next = match COLOR_SCHEMES.iter().position(|s| *s == self.color_scheme()) {
            Some(idx) => COLOR_SCHEMES[(idx + 1) % COLOR_SCHEMES.len()],
            None => COLOR_SCHEMES[0],
        };
        self.color_scheme = Some(next.to_string());
        next
    }

    /// Grow (`steps > 0`) or shrink the font size by 1% per step.
    pub fn adjust_font_size(&mut self, steps: i32) -> f64 {
        let factor = if steps >= 0 { 1.01f64 } else { 0.99f64 };
        let size = self.font_size() * factor.powi(steps.abs());
        self.font_size = Some(size);
        size
    }
}

/// Device identity and theme preferences.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReaderSettings {
    #[serde(rename = "deviceID", default)]
    pub device_id: String,
    #[serde(rename = "deviceName", default)]
    pub device_name: String,
    #[serde(default)]
    pub theme: ThemeSettings,
}

impl ReaderSettings {
    /// Fill in a missing device id or name. Returns true when anything changed.
    pub fn ensure_device(&mut self, default_device_name: &str) -> bool {
        let mut changed = false;
        if self.device_id.is_empty() {
            self.device_id = random_id();
            changed = true;
        }
        if self.device_name.is_empty() {
            self.device_name = default_device_name.to_string();
            changed = true;
        }
        changed
    }
}
