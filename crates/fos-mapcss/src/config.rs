//! Style Configuration
//!
//! Engine configuration, user settings declared by style sheets, and
//! style sheet metadata.

use indexmap::IndexMap;

use crate::value::{Value, ValueType};
use crate::MapCssError;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct StyleConfig {
    /// Sub-layer used by selectors without `::name`
    pub default_subpart: String,
    /// Upper bound of bounding box candidates inspected by one spatial
    /// link evaluation
    pub max_spatial_candidates: usize,
    /// Worker count for batch application (`None` = available parallelism)
    pub threads: Option<usize>,
    /// Fail the whole load on the first rejected rule
    pub strict: bool,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            default_subpart: "default".to_string(),
            max_spatial_candidates: 1000,
            threads: None,
            strict: false,
        }
    }
}

impl StyleConfig {
    /// Effective worker count
    pub fn worker_count(&self) -> usize {
        self.threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4))
            .max(1)
    }
}

/// A user setting declared with `setting::name { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct Setting {
    pub name: String,
    pub label: String,
    /// Declared type, `boolean`, `double`, `string` or `color`
    pub kind: ValueType,
    pub default: Value,
    /// Caller override
    pub value: Option<Value>,
}

impl Setting {
    /// Override if set, default otherwise
    pub fn current(&self) -> &Value {
        self.value.as_ref().unwrap_or(&self.default)
    }
}

/// Settings by name in declaration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleSettings {
    settings: IndexMap<String, Setting>,
}

impl StyleSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a setting; a redeclaration keeps an existing override
    pub fn declare(&mut self, setting: Setting) {
        let previous = self.settings.get(&setting.name).and_then(|s| s.value.clone());
        let name = setting.name.clone();
        self.settings.insert(name, Setting { value: previous, ..setting });
    }

    /// Override a declared setting, coerced to its declared type
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), MapCssError> {
        let setting = self
            .settings
            .get_mut(name)
            .ok_or_else(|| MapCssError::UnknownSetting(name.to_string()))?;
        let coerced = value.coerce(setting.kind).ok_or(MapCssError::ArgumentType {
            function: format!("setting::{}", name),
            index: 0,
            expected: setting.kind.name(),
        })?;
        setting.value = Some(coerced);
        Ok(())
    }

    /// Current value of a setting
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.settings.get(name).map(Setting::current)
    }

    pub fn setting(&self, name: &str) -> Option<&Setting> {
        self.settings.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Setting> {
        self.settings.values()
    }

    pub fn len(&self) -> usize {
        self.settings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }
}

/// Properties of the `meta { ... }` block
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleMeta {
    pub properties: IndexMap<String, Value>,
}

impl StyleMeta {
    pub fn title(&self) -> Option<String> {
        self.properties.get("title").and_then(Value::as_string)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}
