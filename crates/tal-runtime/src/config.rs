#![forbid(unsafe_code)]

//! Renderer configuration.
//!
//! | Field | Default | Source |
//! |---|---|---|
//! | `prefix` | `tal:` | `TAL_PREFIX`, TOML/JSON `prefix` |
//! | `strip_unknown` | `true` | TOML/JSON `strip_unknown` |
//!
//! File formats are available with the `config` feature.

use std::env;

use crate::error::{Result, TalError};

/// Default directive attribute prefix.
pub const DEFAULT_PREFIX: &str = "tal:";

/// Environment variable overriding the prefix.
pub const PREFIX_ENV: &str = "TAL_PREFIX";

/// Directive names, in application order.
pub const DIRECTIVES: [&str; 9] = [
    "define",
    "condition",
    "with",
    "repeat",
    "content",
    "replace",
    "attributes",
    "omit-tag",
    "listen",
];

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(serde::Deserialize, serde::Serialize))]
#[cfg_attr(feature = "config", serde(default, deny_unknown_fields))]
pub struct TalConfig {
    /// Attribute prefix of directives (`tal:` gives `tal:content`).
    pub prefix: String,
    /// Remove every remaining prefixed attribute after processing a node.
    pub strip_unknown: bool,
}

impl Default for TalConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_owned(),
            strip_unknown: true,
        }
    }
}

impl TalConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_strip_unknown(mut self, strip: bool) -> Self {
        self.strip_unknown = strip;
        self
    }

    /// Defaults overridden by `TAL_PREFIX`.
    pub fn from_env() -> Result<Self> {
        Self::from_env_value(env::var(PREFIX_ENV).ok().as_deref())
    }

    fn from_env_value(prefix: Option<&str>) -> Result<Self> {
        let config = match prefix {
            Some(prefix) => Self::default().with_prefix(prefix.trim()),
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject prefixes that cannot appear in an attribute name.
    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(TalError::config("prefix must not be empty"));
        }
        if self
            .prefix
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '>' | '/' | '='))
        {
            return Err(TalError::config(format!(
                "prefix {:?} is not a valid attribute name prefix",
                self.prefix
            )));
        }
        Ok(())
    }

    /// Full attribute name of `directive`.
    #[must_use]
    pub fn attribute(&self, directive: &str) -> String {
        format!("{}{directive}", self.prefix)
    }

    /// Attribute names of all directives, in application order.
    #[must_use]
    pub fn attributes(&self) -> Vec<String> {
        DIRECTIVES.iter().map(|d| self.attribute(d)).collect()
    }

    /// Attribute names are matched lowercased, like the HTML parser stores them.
    #[must_use]
    pub fn is_prefixed(&self, attribute: &str) -> bool {
        attribute
            .get(..self.prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(&self.prefix))
    }

    #[cfg(feature = "config")]
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|err| TalError::config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "config")]
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(text).map_err(|err| TalError::config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
