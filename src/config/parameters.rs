//! `key=value|key=value` parameter strings

use super::mapping::{FieldMapping, parse_mapping};
use crate::error::{Result, TransferError};

use regex::Regex;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::OnceLock;

/// Separator between `key=value` pairs
pub const PAIR_SEPARATOR: char = '|';
/// Separator between a key and its value
pub const KEY_VALUE_SEPARATOR: char = '=';
/// Parameter key holding the nested mapping string
pub const MAPPING_KEY: &str = "mapping";

/// Parsed adapter/manager parameters
///
/// # Example
/// ```
/// use record_transfer::config::parse_parameters;
///
/// let params = parse_parameters("filepath = /tmp/in.csv | separator=;").unwrap();
/// assert_eq!(params.get("filepath"), Some("/tmp/in.csv"));
/// assert_eq!(params.get("separator"), Some(";"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParameterSet {
    values: BTreeMap<String, String>,
}

/// Parse a parameter string
///
/// Pairs are separated by `|` and split on the first `=`; both sides are
/// trimmed. Empty input, a pair without `=`, an empty key or a repeated key
/// is a [`TransferError::ConfigParse`].
pub fn parse_parameters(raw: &str) -> Result<ParameterSet> {
    if raw.trim().is_empty() {
        return Err(TransferError::config(raw, "empty configuration"));
    }

    let mut values = BTreeMap::new();
    for pair in raw.split(PAIR_SEPARATOR) {
        let (key, value) = pair
            .split_once(KEY_VALUE_SEPARATOR)
            .ok_or_else(|| TransferError::config(pair, "missing '='"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(TransferError::config(pair, "empty key"));
        }
        if values.contains_key(key) {
            return Err(TransferError::config(pair, "duplicate key"));
        }
        values.insert(key.to_string(), value.trim().to_string());
    }

    Ok(ParameterSet { values })
}

impl FromStr for ParameterSet {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self> {
        parse_parameters(s)
    }
}

impl ParameterSet {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Insert or replace a parameter; used by callers that assemble
    /// parameters programmatically
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// A parameter that must be present and non-blank
    pub fn require(&self, adapter: &str, key: &str) -> Result<&str> {
        match self.get(key) {
            Some(value) if !value.is_empty() => Ok(value),
            Some(_) => Err(TransferError::init(
                adapter,
                format!("'{}' parameter is empty", key),
            )),
            None => Err(TransferError::init(
                adapter,
                format!("missing '{}' parameter", key),
            )),
        }
    }

    /// An optional `true`/`false` parameter (case-insensitive)
    pub fn bool(&self, adapter: &str, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "true" => Ok(Some(true)),
                "false" => Ok(Some(false)),
                _ => Err(TransferError::init(
                    adapter,
                    format!("'{}' must be true or false, got '{}'", key, value),
                )),
            },
        }
    }

    pub fn require_bool(&self, adapter: &str, key: &str) -> Result<bool> {
        self.require(adapter, key)?;
        self.bool(adapter, key)
            .map(|v| v.unwrap_or_default())
    }

    /// The nested `mapping` parameter, if present
    pub fn mapping(&self) -> Result<Option<FieldMapping>> {
        self.get(MAPPING_KEY).map(parse_mapping).transpose()
    }

    pub fn require_mapping(&self, adapter: &str) -> Result<FieldMapping> {
        parse_mapping(self.require(adapter, MAPPING_KEY)?)
    }

    /// Substitute `${NAME}` references in every value from the environment
    pub fn expand_env(&mut self) -> Result<()> {
        self.expand_with(|name| std::env::var(name).ok())
    }

    /// Substitute `${NAME}` references using `lookup`
    pub fn expand_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
        let placeholder = PLACEHOLDER.get_or_init(|| {
            Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
        });

        for (key, value) in self.values.iter_mut() {
            if !placeholder.is_match(value) {
                continue;
            }
            let mut expanded = String::with_capacity(value.len());
            let mut last = 0;
            for caps in placeholder.captures_iter(value) {
                let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
                let name = &caps[1];
                let replacement = lookup(name).ok_or_else(|| {
                    TransferError::config(
                        format!("{}={}", key, value),
                        format!("environment variable '{}' is not set", name),
                    )
                })?;
                expanded.push_str(&value[last..whole.start]);
                expanded.push_str(&replacement);
                last = whole.end;
            }
            expanded.push_str(&value[last..]);
            log::debug!("Expanded environment references in '{}'", key);
            *value = expanded;
        }
        Ok(())
    }
}
