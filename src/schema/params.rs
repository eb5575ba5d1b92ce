//! Parameter maps shared by layers, evaluators and callbacks.
//!
//! Every configurable component carries a [`Parameters`] map. Parameters are
//! either *static* (fixed at construction) or *dynamic* (adjustable while the
//! evolution runs). Writes to static or locked parameters are dropped without
//! error so that adaptive callbacks can blindly restore whole maps.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Tagged value stored in parameter maps and in the generation context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    FloatList(Vec<f64>),
    TextList(Vec<String>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        match self {
            Value::Int(i) if *i >= 0 => Some(*i as usize),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_float_list(&self) -> Option<&[f64]> {
        match self {
            Value::FloatList(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text_list(&self) -> Option<&[String]> {
        match self {
            Value::TextList(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::FloatList(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::TextList(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Parameter lookup errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterError {
    #[error("Parameter `{0}` does not exist")]
    Missing(String),
    #[error("Parameter `{key}` is not a valid {expected}")]
    WrongType { key: String, expected: &'static str },
}

/// Configuration map with static and dynamic entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    values: BTreeMap<String, Value>,
    /// Dynamic parameter names mapped to their unlocked state.
    dynamic: BTreeMap<String, bool>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw maps. Every dynamic name must have a value.
    pub fn from_maps(
        values: BTreeMap<String, Value>,
        dynamic: BTreeSet<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(missing) = dynamic.iter().find(|name| !values.contains_key(*name)) {
            return Err(ConfigError::UnknownParameter(missing.clone()));
        }
        Ok(Self {
            values,
            dynamic: dynamic.into_iter().map(|name| (name, true)).collect(),
        })
    }

    /// Add a static (locked) parameter.
    pub fn with_static(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    /// Add a dynamic (adjustable) parameter.
    pub fn with_dynamic(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self.dynamic.insert(key.to_string(), true);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Whether `key` is declared dynamic and currently unlocked.
    pub fn is_writable(&self, key: &str) -> bool {
        self.dynamic.get(key).copied().unwrap_or(false)
    }

    /// Write a dynamic parameter. Returns whether the write was applied;
    /// static or locked parameters are left untouched.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> bool {
        if !self.is_writable(key) {
            log::debug!("Ignoring write to locked parameter `{}`", key);
            return false;
        }
        self.values.insert(key.to_string(), value.into());
        true
    }

    /// Apply every writable entry of `values`, returning how many were applied.
    pub fn update(&mut self, values: &BTreeMap<String, Value>) -> usize {
        values
            .iter()
            .filter(|(key, value)| self.set(key, (*value).clone()))
            .count()
    }

    /// Owner-side write that bypasses the dynamic lock.
    pub fn force(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn lock(&mut self, key: &str) {
        if let Some(unlocked) = self.dynamic.get_mut(key) {
            *unlocked = false;
        }
    }

    pub fn unlock(&mut self, key: &str) {
        if let Some(unlocked) = self.dynamic.get_mut(key) {
            *unlocked = true;
        }
    }

    pub fn all(&self) -> &BTreeMap<String, Value> {
        &self.values
    }

    /// Parameters declared dynamic, locked or not.
    pub fn dynamic(&self) -> BTreeMap<String, Value> {
        self.values
            .iter()
            .filter(|(key, _)| self.dynamic.contains_key(*key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn statics(&self) -> BTreeMap<String, Value> {
        self.values
            .iter()
            .filter(|(key, _)| !self.dynamic.contains_key(*key))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn require(&self, key: &str) -> Result<&Value, ParameterError> {
        self.values
            .get(key)
            .ok_or_else(|| ParameterError::Missing(key.to_string()))
    }

    pub fn get_f64(&self, key: &str) -> Result<f64, ParameterError> {
        self.require(key)?
            .as_f64()
            .ok_or_else(|| wrong_type(key, "number"))
    }

    pub fn get_usize(&self, key: &str) -> Result<usize, ParameterError> {
        self.require(key)?
            .as_usize()
            .ok_or_else(|| wrong_type(key, "non-negative integer"))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, ParameterError> {
        self.require(key)?
            .as_bool()
            .ok_or_else(|| wrong_type(key, "boolean"))
    }

    /// `Null` maps to `None`.
    pub fn get_str_list(&self, key: &str) -> Result<Option<Vec<String>>, ParameterError> {
        match self.require(key)? {
            Value::Null => Ok(None),
            Value::TextList(list) => Ok(Some(list.clone())),
            Value::Text(single) => Ok(Some(vec![single.clone()])),
            _ => Err(wrong_type(key, "list of names")),
        }
    }

    /// `Null` maps to `None`.
    pub fn get_float_list(&self, key: &str) -> Result<Option<Vec<f64>>, ParameterError> {
        match self.require(key)? {
            Value::Null => Ok(None),
            Value::FloatList(list) => Ok(Some(list.clone())),
            _ => Err(wrong_type(key, "list of numbers")),
        }
    }
}

fn wrong_type(key: &str, expected: &'static str) -> ParameterError {
    ParameterError::WrongType {
        key: key.to_string(),
        expected,
    }
}
