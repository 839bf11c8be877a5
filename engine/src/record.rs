//! Record types and field selectors.
//!
//! A [`Record`] wraps an opaque payload together with the transient
//! "created while offline" marker. The engine never inspects the payload
//! directly: it reaches the identifier and modification timestamp through
//! [`Field`] selectors configured per collection.

use crate::RecordId;
use serde::{
    de::{DeserializeOwned, Error as _},
    ser::{Error as _, SerializeMap},
    Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Reserved property carrying the created-while-offline marker.
pub const OFFLINE_MARKER: &str = "createdOffline";

/// Bounds every record payload must satisfy.
pub trait Payload: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

type Getter<T> = Arc<dyn Fn(&T) -> Option<String> + Send + Sync>;
type Setter<T> = Arc<dyn Fn(&mut T, String) + Send + Sync>;

/// Accessor pair for one string-valued field of a payload.
pub struct Field<T> {
    name: String,
    get: Getter<T>,
    set: Setter<T>,
}

impl<T> Field<T> {
    /// Create a selector from a getter and a setter.
    pub fn new(
        name: impl Into<String>,
        get: impl Fn(&T) -> Option<String> + Send + Sync + 'static,
        set: impl Fn(&mut T, String) + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            get: Arc::new(get),
            set: Arc::new(set),
        }
    }

    /// Field name, used in log output.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read the field value.
    pub fn get(&self, payload: &T) -> Option<String> {
        (self.get)(payload)
    }

    /// Overwrite the field value.
    pub fn set(&self, payload: &mut T, value: String) {
        (self.set)(payload, value)
    }
}

impl Field<serde_json::Value> {
    /// Selector for a property of a JSON object payload.
    ///
    /// Numbers are read as their decimal text so numeric identifiers
    /// compare equal to their string form.
    pub fn json(name: impl Into<String>) -> Self {
        let name = name.into();
        let get_key = name.clone();
        let set_key = name.clone();
        Self::new(
            name,
            move |value: &serde_json::Value| match value.get(&get_key)? {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            },
            move |value: &mut serde_json::Value, new_value: String| {
                if let Some(object) = value.as_object_mut() {
                    object.insert(set_key.clone(), serde_json::Value::String(new_value));
                }
            },
        )
    }
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            get: Arc::clone(&self.get),
            set: Arc::clone(&self.set),
        }
    }
}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field").field("name", &self.name).finish()
    }
}

/// The identifier and timestamp selectors, present only when both are
/// configured. Diffing and offline mutation require this pair.
#[derive(Debug, Clone)]
pub struct Fields<T> {
    pub id: Field<T>,
    pub modified: Field<T>,
}

impl<T> Fields<T> {
    pub fn new(id: Field<T>, modified: Field<T>) -> Self {
        Self { id, modified }
    }
}

/// A record in a collection snapshot.
///
/// Serializes as the payload itself, with a `createdOffline: true`
/// property added while the record has never been pushed upstream. The
/// property name is reserved: a payload's own `createdOffline` key is
/// dropped when the record is written and consumed as the marker when it
/// is read back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<T> {
    /// The caller's payload
    pub payload: T,
    /// Set for records created locally and not yet created remotely
    pub created_offline: bool,
}

impl<T> Record<T> {
    /// Wrap a payload known to the remote side.
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            created_offline: false,
        }
    }

    /// Wrap a payload that only exists locally.
    pub fn offline(payload: T) -> Self {
        Self {
            payload,
            created_offline: true,
        }
    }

    /// Identifier value read through a selector.
    pub fn id(&self, field: &Field<T>) -> Option<RecordId> {
        field.get(&self.payload)
    }

    /// Modification timestamp read through a selector.
    pub fn modified_at(&self, field: &Field<T>) -> Option<String> {
        field.get(&self.payload)
    }

    pub fn into_payload(self) -> T {
        self.payload
    }
}

impl<T: Serialize> Serialize for Record<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let object = match serde_json::to_value(&self.payload).map_err(S::Error::custom)? {
            Value::Object(object) => object,
            // Only objects can carry the marker
            other => return other.serialize(serializer),
        };

        let mut map = serializer.serialize_map(None)?;
        for (key, value) in object.iter().filter(|(key, _)| *key != OFFLINE_MARKER) {
            map.serialize_entry(key, value)?;
        }
        if self.created_offline {
            map.serialize_entry(OFFLINE_MARKER, &true)?;
        }
        map.end()
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Record<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut value = Value::deserialize(deserializer)?;
        let created_offline = value
            .as_object_mut()
            .and_then(|object| object.remove(OFFLINE_MARKER))
            .is_some_and(|marker| marker == Value::Bool(true));
        let payload = T::deserialize(value).map_err(D::Error::custom)?;
        Ok(Self {
            payload,
            created_offline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: String,
        title: String,
    }

    fn note_id() -> Field<Note> {
        Field::new("id", |n: &Note| Some(n.id.clone()), |n, v| n.id = v)
    }

    #[test]
    fn typed_field_get_set() {
        let field = note_id();
        let mut note = Note {
            id: "n-1".into(),
            title: "hello".into(),
        };

        assert_eq!(field.get(&note), Some("n-1".to_string()));
        field.set(&mut note, "n-2".into());
        assert_eq!(note.id, "n-2");
        assert_eq!(field.name(), "id");
    }

    #[test]
    fn json_field_reads_strings_and_numbers() {
        let field = Field::json("id");

        assert_eq!(field.get(&json!({"id": "abc"})), Some("abc".to_string()));
        assert_eq!(field.get(&json!({"id": 42})), Some("42".to_string()));
        assert_eq!(field.get(&json!({"id": null})), None);
        assert_eq!(field.get(&json!({"other": 1})), None);
        assert_eq!(field.get(&json!([1, 2])), None);
    }

    #[test]
    fn json_field_set_inserts_string() {
        let field = Field::json("mod");
        let mut value = json!({"id": "1"});
        field.set(&mut value, "2024-01-01".into());
        assert_eq!(value, json!({"id": "1", "mod": "2024-01-01"}));

        // Non-objects are left alone
        let mut scalar = json!(5);
        field.set(&mut scalar, "x".into());
        assert_eq!(scalar, json!(5));
    }

    #[test]
    fn marker_serialized_only_when_set() {
        let synced = Record::new(json!({"id": "1"}));
        assert_eq!(serde_json::to_value(&synced).unwrap(), json!({"id": "1"}));

        let offline = Record::offline(json!({"id": "1"}));
        assert_eq!(
            serde_json::to_value(&offline).unwrap(),
            json!({"id": "1", "createdOffline": true})
        );
    }

    #[test]
    fn payload_marker_key_written_once() {
        let offline = Record::offline(json!({"id": "1", "createdOffline": true}));
        let json = serde_json::to_string(&offline).unwrap();
        assert_eq!(json.matches("createdOffline").count(), 1);
        let parsed: Record<Value> = serde_json::from_str(&json).unwrap();
        assert!(parsed.created_offline);
        assert_eq!(parsed.payload, json!({"id": "1"}));

        // A synced record never gains the marker from its payload
        let synced = Record::new(json!({"id": "2", "createdOffline": true}));
        let json = serde_json::to_string(&synced).unwrap();
        assert_eq!(json, r#"{"id":"2"}"#);
        let parsed: Record<Value> = serde_json::from_str(&json).unwrap();
        assert!(!parsed.created_offline);
    }

    #[test]
    fn non_object_payload_serializes_bare() {
        let record = Record::new("plain".to_string());
        assert_eq!(serde_json::to_string(&record).unwrap(), r#""plain""#);
        let parsed: Record<String> = serde_json::from_str(r#""plain""#).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn typed_record_roundtrip() {
        let record = Record::offline(Note {
            id: "n-1".into(),
            title: "draft".into(),
        });

        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("createdOffline"));
        let parsed: Record<Note> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);

        let parsed: Record<Note> = serde_json::from_str(r#"{"id":"n-2","title":"x"}"#).unwrap();
        assert!(!parsed.created_offline);
    }

    #[test]
    fn record_accessors() {
        let fields = Fields::new(Field::json("id"), Field::json("mod"));
        let record = Record::new(json!({"id": "7", "mod": "2024-01-01"}));

        assert_eq!(record.id(&fields.id), Some("7".to_string()));
        assert_eq!(
            record.modified_at(&fields.modified),
            Some("2024-01-01".to_string())
        );
    }
}
