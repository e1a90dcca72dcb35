//! Recognised attribute keys and their value grammar (§4.3).
//!
//! Matching is case-insensitive and the key is whitespace-trimmed; values are
//! passed through as the raw catalogue strings and parsed per the consuming
//! site's own type (a numeric bound, say, parses differently for an `F64`
//! than for a `U64`). Unknown keys are ignored silently — the catalogue is
//! free to carry vendor extensions we don't understand.

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    pub read_only: bool,
    pub ignored: bool,
    pub on_set: Option<String>,
    pub on_get: Option<String>,
    pub on_clear: Option<String>,
    pub on_change: Option<String>,
    pub default: Option<String>,
    pub lower_border: Option<String>,
    pub upper_border: Option<String>,
}

impl Attributes {
    pub fn parse(raw: &[(String, String)]) -> Self {
        let mut attrs = Self::default();
        for (key, value) in raw {
            match key.trim().to_ascii_lowercase().as_str() {
                "readonly" => attrs.read_only = true,
                "ignored" => attrs.ignored = true,
                "onset" => attrs.on_set = Some(value.clone()),
                "onget" => attrs.on_get = Some(value.clone()),
                "onclear" => attrs.on_clear = Some(value.clone()),
                "onchange" => attrs.on_change = Some(value.clone()),
                "default" => attrs.default = Some(value.clone()),
                "lowerborder" => attrs.lower_border = Some(value.clone()),
                "upperborder" => attrs.upper_border = Some(value.clone()),
                _ => {}
            }
        }
        attrs
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
