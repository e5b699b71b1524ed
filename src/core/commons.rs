// src/core/commons.rs

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;

/// Wraps a string in double quotes, escaping internal quotes.
pub fn wrap_value(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\\\""))
}

/// Treats an explicit YAML `null` (e.g. `hosts:` with nothing under it) like an absent key.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Deserializes any scalar (string, number, bool, null) into its textual form.
///
/// `version: 0.4` arrives as a float and `PORT: 8080` as an integer; both must
/// be handled as the text the operator typed.
pub fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(ScalarVisitor)
}

/// A scalar value read through [`scalar_string`]. Used as a map key/value type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scalar(pub String);

impl<'de> Deserialize<'de> for Scalar {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        scalar_string(deserializer).map(Scalar)
    }
}

struct ScalarVisitor;

impl<'de> Visitor<'de> for ScalarVisitor {
    type Value = String;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, number, boolean or null")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<String, E> {
        Ok(v)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<String, E> {
        Ok(v.to_string())
    }

    fn visit_unit<E: de::Error>(self) -> Result<String, E> {
        Ok(String::new())
    }

    fn visit_none<E: de::Error>(self) -> Result<String, E> {
        Ok(String::new())
    }

    fn visit_some<D>(self, deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(ScalarVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Doc {
        #[serde(default, deserialize_with = "scalar_string")]
        version: String,
        #[serde(default, deserialize_with = "null_as_default")]
        hosts: Vec<String>,
    }

    #[test]
    fn test_wrap_value_escapes_quotes() {
        assert_eq!(wrap_value("dog milk"), "\"dog milk\"");
        assert_eq!(wrap_value("-e A=\"b\""), "\"-e A=\\\"b\\\"\"");
    }

    #[test]
    fn test_scalar_accepts_floats_and_null_lists() {
        let doc: Doc = serde_yaml::from_str("version: 0.4\nhosts:\n").unwrap();
        assert_eq!(doc.version, "0.4");
        assert!(doc.hosts.is_empty());

        let doc: Doc = serde_yaml::from_str("version: \"0.6\"").unwrap();
        assert_eq!(doc.version, "0.6");
    }
}
