//! Tagged union for task message arguments
//!
//! Task kwargs cross a process boundary as JSON, but only primitive shapes
//! are meaningful to the task runner. `TaskValue` covers exactly those kinds;
//! decoding an array or object is a defined error instead of an open-ended
//! "any" representation.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum TaskValueError {
    #[error("unsupported task value shape: {0}")]
    UnsupportedShape(&'static str),
}

/// A single task argument value: one of the JSON primitive kinds
#[derive(Debug, Clone, PartialEq)]
pub enum TaskValue {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
}

impl TaskValue {
    /// Convert from an already-parsed JSON value.
    ///
    /// Arrays and objects are rejected; the task protocol has no use for
    /// nested shapes and silently flattening them would hide caller bugs.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, TaskValueError> {
        match value {
            serde_json::Value::Null => Ok(TaskValue::Null),
            serde_json::Value::Bool(b) => Ok(TaskValue::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(TaskValue::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(TaskValue::Float(f))
                } else {
                    Err(TaskValueError::UnsupportedShape("non-finite number"))
                }
            }
            serde_json::Value::String(s) => Ok(TaskValue::Str(s.clone())),
            serde_json::Value::Array(_) => Err(TaskValueError::UnsupportedShape("array")),
            serde_json::Value::Object(_) => Err(TaskValueError::UnsupportedShape("object")),
        }
    }

    /// Display form used for the human-readable `kwargsrepr` header field
    pub fn repr(&self) -> String {
        match self {
            TaskValue::Int(i) => i.to_string(),
            TaskValue::Float(f) => f.to_string(),
            TaskValue::Str(s) => format!("{s:?}"),
            TaskValue::Bool(b) => b.to_string(),
            TaskValue::Null => "None".to_string(),
        }
    }
}

impl From<&str> for TaskValue {
    fn from(s: &str) -> Self {
        TaskValue::Str(s.to_string())
    }
}

impl From<String> for TaskValue {
    fn from(s: String) -> Self {
        TaskValue::Str(s)
    }
}

impl From<i64> for TaskValue {
    fn from(i: i64) -> Self {
        TaskValue::Int(i)
    }
}

impl From<bool> for TaskValue {
    fn from(b: bool) -> Self {
        TaskValue::Bool(b)
    }
}

impl Serialize for TaskValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            TaskValue::Int(i) => serializer.serialize_i64(*i),
            TaskValue::Float(f) => serializer.serialize_f64(*f),
            TaskValue::Str(s) => serializer.serialize_str(s),
            TaskValue::Bool(b) => serializer.serialize_bool(*b),
            TaskValue::Null => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for TaskValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TaskValueVisitor;

        impl<'de> Visitor<'de> for TaskValueVisitor {
            type Value = TaskValue;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a JSON primitive (integer, float, string, boolean, or null)")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<TaskValue, E> {
                Ok(TaskValue::Int(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<TaskValue, E> {
                i64::try_from(v).map(TaskValue::Int).map_err(|_| {
                    E::custom("integer out of range for task value")
                })
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<TaskValue, E> {
                Ok(TaskValue::Float(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<TaskValue, E> {
                Ok(TaskValue::Str(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<TaskValue, E> {
                Ok(TaskValue::Str(v))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<TaskValue, E> {
                Ok(TaskValue::Bool(v))
            }

            fn visit_none<E: de::Error>(self) -> Result<TaskValue, E> {
                Ok(TaskValue::Null)
            }

            fn visit_unit<E: de::Error>(self) -> Result<TaskValue, E> {
                Ok(TaskValue::Null)
            }

            fn visit_seq<A>(self, _seq: A) -> Result<TaskValue, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                Err(de::Error::custom("unsupported task value shape: array"))
            }

            fn visit_map<A>(self, _map: A) -> Result<TaskValue, A::Error>
            where
                A: de::MapAccess<'de>,
            {
                Err(de::Error::custom("unsupported task value shape: object"))
            }
        }

        deserializer.deserialize_any(TaskValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_round_trip() {
        for (value, json) in [
            (TaskValue::Int(42), "42"),
            (TaskValue::Float(2.5), "2.5"),
            (TaskValue::Str("hi".to_string()), "\"hi\""),
            (TaskValue::Bool(true), "true"),
            (TaskValue::Null, "null"),
        ] {
            assert_eq!(serde_json::to_string(&value).unwrap(), json);
            let back: TaskValue = serde_json::from_str(json).unwrap();
            assert_eq!(back, value);
        }
    }

    #[test]
    fn test_nested_shapes_rejected() {
        assert!(serde_json::from_str::<TaskValue>("[1, 2]").is_err());
        assert!(serde_json::from_str::<TaskValue>("{\"a\": 1}").is_err());
    }

    #[test]
    fn test_from_json_rejects_containers() {
        let arr = serde_json::json!([1]);
        assert_eq!(
            TaskValue::from_json(&arr),
            Err(TaskValueError::UnsupportedShape("array"))
        );
        let obj = serde_json::json!({"k": 1});
        assert_eq!(
            TaskValue::from_json(&obj),
            Err(TaskValueError::UnsupportedShape("object"))
        );
        assert_eq!(TaskValue::from_json(&serde_json::json!(7)), Ok(TaskValue::Int(7)));
    }

    #[test]
    fn test_repr() {
        assert_eq!(TaskValue::Str("a\"b".to_string()).repr(), "\"a\\\"b\"");
        assert_eq!(TaskValue::Null.repr(), "None");
        assert_eq!(TaskValue::Int(-3).repr(), "-3");
    }
}
