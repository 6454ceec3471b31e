use std::fmt;

use serde::de::{Deserialize, Deserializer, Error as DeError, Visitor};
use serde::ser::{Serialize, Serializer};

use super::store::SettingsStore;
use super::{ErrorKind, Result};

/// A leaf of a config values map: either a literal scalar, or an
/// unresolved `${a.b.c}` interpolation naming a settings-store path.
///
/// This is the one piece of machinery that lets an instance's persisted
/// config survive a load/save round-trip without freezing an interpolation
/// into the literal it currently resolves to (spec invariant i).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Literal(Scalar),
    Interp(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl Scalar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            Scalar::Str(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::Null => String::new(),
        }
    }
}

impl Value {
    pub fn literal<S: Into<String>>(s: S) -> Self {
        Value::Literal(Scalar::Str(s.into()))
    }

    pub fn interp<S: Into<String>>(path: S) -> Self {
        Value::Interp(path.into())
    }

    /// True if this leaf is a `${...}` reference rather than a direct value.
    pub fn is_interpolation(&self) -> bool {
        matches!(self, Value::Interp(_))
    }

    /// Resolve against the settings store. Literals return immediately;
    /// interpolations are looked up (one level — settings-store values are
    /// not themselves re-interpolated, avoiding the need for cycle
    /// detection at call sites that only read one hop).
    pub fn resolve(&self, store: &SettingsStore) -> Result<Scalar> {
        match self {
            Value::Literal(s) => Ok(s.clone()),
            Value::Interp(path) => store
                .get_scalar(path)
                .ok_or_else(|| ErrorKind::PathNotFound(path.clone()).into()),
        }
    }

    /// The raw, unresolved form — what gets persisted.
    pub fn as_raw(&self) -> String {
        match self {
            Value::Literal(s) => s.clone().into_string(),
            Value::Interp(path) => format!("${{{}}}", path),
        }
    }
}

fn parse_interp(s: &str) -> Option<String> {
    let s = s.trim();
    if s.starts_with("${") && s.ends_with('}') && s.len() > 3 {
        Some(s[2..s.len() - 1].to_string())
    } else {
        None
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Interp(path) => serializer.serialize_str(&format!("${{{}}}", path)),
            Value::Literal(Scalar::Str(s)) => serializer.serialize_str(s),
            Value::Literal(Scalar::Int(i)) => serializer.serialize_i64(*i),
            Value::Literal(Scalar::Float(f)) => serializer.serialize_f64(*f),
            Value::Literal(Scalar::Bool(b)) => serializer.serialize_bool(*b),
            Value::Literal(Scalar::Null) => serializer.serialize_none(),
        }
    }
}

struct ValueVisitor;

macro_rules! visit_scalar {
    ($name:ident, $type:ty, $variant:ident) => {
        fn $name<E>(self, v: $type) -> std::result::Result<Self::Value, E>
        where
            E: DeError,
        {
            Ok(Value::Literal(Scalar::$variant(v.into())))
        }
    };
}

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a string, number, boolean or null config value")
    }

    fn visit_str<E>(self, v: &str) -> std::result::Result<Self::Value, E>
    where
        E: DeError,
    {
        if let Some(path) = parse_interp(v) {
            Ok(Value::Interp(path))
        } else {
            Ok(Value::Literal(Scalar::Str(v.to_string())))
        }
    }

    fn visit_string<E>(self, v: String) -> std::result::Result<Self::Value, E>
    where
        E: DeError,
    {
        self.visit_str(&v)
    }

    fn visit_unit<E>(self) -> std::result::Result<Self::Value, E>
    where
        E: DeError,
    {
        Ok(Value::Literal(Scalar::Null))
    }

    visit_scalar!(visit_bool, bool, Bool);
    visit_scalar!(visit_i64, i64, Int);
    visit_scalar!(visit_u64, u64, Int);
    visit_scalar!(visit_f64, f64, Float);
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_round_trips_as_raw() {
        let v = Value::literal("sk-xyz");
        assert_eq!(v.as_raw(), "sk-xyz");
    }

    #[test]
    fn interp_round_trips_as_raw() {
        let v: Value = serde_yaml::from_str("\"${api_keys.openai}\"").unwrap();
        assert!(v.is_interpolation());
        assert_eq!(v.as_raw(), "${api_keys.openai}");
    }

    #[test]
    fn deserialize_non_string_scalars() {
        let v: Value = serde_yaml::from_str("42").unwrap();
        assert_eq!(v, Value::Literal(Scalar::Int(42)));
        let v: Value = serde_yaml::from_str("true").unwrap();
        assert_eq!(v, Value::Literal(Scalar::Bool(true)));
    }

    #[test]
    fn plain_string_is_not_an_interpolation() {
        let v: Value = serde_yaml::from_str("\"http://localhost:8080\"").unwrap();
        assert!(!v.is_interpolation());
    }
}
