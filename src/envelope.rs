use crate::error::{Result, TimberlineError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use std::ops::Index;

/// Field name under which the payload is stored.
pub const CONTENTS: &str = "contents";

/// Open-ended metadata attached to an [`Envelope`].
pub type Metadata = Map<String, Value>;

/// The wrapper placed around every payload that goes through a queue.
///
/// An envelope carries the payload itself (`contents`) plus any number of
/// named metadata fields. Metadata fields are read with the same accessor as
/// the payload, so `envelope["special_notes"]` works the same way as
/// `envelope["contents"]`.
///
/// On the wire an envelope is a flat JSON object: `contents` next to one key
/// per metadata field.
///
/// # Examples
///
/// ```
/// use timberline::Envelope;
/// use serde_json::json;
///
/// let mut envelope = Envelope::wrap("Howdy kids.");
/// envelope.set("special_notes", "Super-awesome.");
///
/// assert_eq!(envelope["contents"], json!("Howdy kids."));
/// assert_eq!(envelope["special_notes"], json!("Super-awesome."));
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// The payload
    pub contents: Value,
    /// Every other named field; never holds `contents`.
    #[serde(flatten)]
    metadata: Metadata,
}

impl Envelope {
    /// Creates an envelope around `contents` with no metadata.
    pub fn new(contents: impl Into<Value>) -> Self {
        Self {
            contents: contents.into(),
            metadata: Metadata::new(),
        }
    }

    /// Wraps a value for queueing.
    ///
    /// An [`Envelope`] passed in comes back untouched, so envelopes are never
    /// nested inside one another. Anything else becomes the `contents` of a
    /// fresh envelope.
    ///
    /// ```
    /// use timberline::Envelope;
    ///
    /// let original = Envelope::new("payload");
    /// let wrapped = Envelope::wrap(original.clone());
    /// assert_eq!(wrapped, original);
    /// ```
    pub fn wrap(value: impl Into<Envelope>) -> Self {
        value.into()
    }

    /// Wraps any serializable value.
    pub fn from_serializable<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::new(serde_json::to_value(value)?))
    }

    /// Reads a field by name. `"contents"` yields the payload, any other
    /// name looks into the metadata.
    pub fn get(&self, field: &str) -> Option<&Value> {
        if field == CONTENTS {
            Some(&self.contents)
        } else {
            self.metadata.get(field)
        }
    }

    /// Writes a field by name. Setting `"contents"` replaces the payload.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        if field == CONTENTS {
            self.contents = value.into();
        } else {
            self.metadata.insert(field, value.into());
        }
    }

    /// Metadata fields, without `contents`.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn contains(&self, field: &str) -> bool {
        field == CONTENTS || self.metadata.contains_key(field)
    }

    /// Merges every entry of `metadata` into this envelope, overwriting
    /// fields that already exist.
    pub fn attach_metadata<I, K, V>(&mut self, metadata: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (field, value) in metadata {
            self.set(field, value);
        }
    }

    /// Builder flavour of [`attach_metadata`](Self::attach_metadata).
    pub fn with_metadata<I, K, V>(mut self, metadata: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.attach_metadata(metadata);
        self
    }

    /// Deserializes the payload into a concrete type.
    pub fn contents_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.contents.clone()).map_err(TimberlineError::Decode)
    }

    /// Encodes the envelope into the bytes stored in the queue.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes bytes previously produced by [`serialize`](Self::serialize).
    ///
    /// # Errors
    ///
    /// [`TimberlineError::Decode`] if the bytes are not a JSON object with a
    /// `contents` field.
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(TimberlineError::Decode)
    }
}

impl<'a> Index<&'a str> for Envelope {
    type Output = Value;

    /// Missing fields read as `null`, like indexing a JSON object.
    fn index(&self, field: &'a str) -> &Value {
        static NULL: Value = Value::Null;
        self.get(field).unwrap_or(&NULL)
    }
}

impl From<Value> for Envelope {
    fn from(contents: Value) -> Self {
        Self::new(contents)
    }
}

macro_rules! wrap_plain_values {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Envelope {
                fn from(contents: $ty) -> Self {
                    Self::new(contents)
                }
            }
        )*
    };
}

wrap_plain_values!(String, &str, bool, i32, i64, u32, u64, f64);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wrap_plain_value() {
        let envelope = Envelope::wrap("Test Queue Item");
        assert_eq!(envelope.contents, json!("Test Queue Item"));
        assert!(envelope.metadata().is_empty());
    }

    #[test]
    fn test_wrap_does_not_nest_envelopes() {
        let mut original = Envelope::new("Test Queue Item");
        original.set("special_notes", "keep me");

        let wrapped = Envelope::wrap(original.clone());
        assert_eq!(wrapped, original);
        assert_eq!(wrapped.contents, json!("Test Queue Item"));
        assert!(!wrapped.contents.is_object());
    }

    #[test]
    fn test_wrap_json_value_keeps_structure() {
        let envelope = Envelope::wrap(json!({"user": 7, "tags": ["a", "b"]}));
        assert_eq!(envelope["contents"]["user"], json!(7));
        assert!(envelope.metadata().is_empty());
    }

    #[test]
    fn test_metadata_reads_like_contents() {
        let envelope = Envelope::new("Howdy kids.")
            .with_metadata([("special_notes", "Super-awesome.")]);

        assert_eq!(envelope["contents"], json!("Howdy kids."));
        assert_eq!(envelope["special_notes"], json!("Super-awesome."));
        assert_eq!(envelope.get("special_notes"), Some(&json!("Super-awesome.")));
        assert_eq!(envelope["missing"], Value::Null);
        assert_eq!(envelope.get("missing"), None);
    }

    #[test]
    fn test_setting_contents_field_replaces_payload() {
        let mut envelope = Envelope::new("old");
        envelope.attach_metadata([("contents", json!("new")), ("attempt", json!(2))]);

        assert_eq!(envelope.contents, json!("new"));
        assert!(!envelope.metadata().contains_key("contents"));
        assert_eq!(envelope["attempt"], json!(2));
        assert!(envelope.contains("contents"));
        assert!(envelope.contains("attempt"));
    }

    #[test]
    fn test_contents_metadata_never_duplicates_the_field() {
        let mut metadata = Metadata::new();
        metadata.insert("contents".to_string(), json!("b"));
        let envelope = Envelope::new("a").with_metadata(metadata);

        let bytes = envelope.serialize().unwrap();
        assert_eq!(bytes, br#"{"contents":"b"}"#.to_vec());
        assert_eq!(Envelope::deserialize(&bytes).unwrap(), envelope);
    }

    #[test]
    fn test_serialized_form_is_flat() {
        let envelope = Envelope::new("body").with_metadata([("origin_queue", "mail")]);
        let bytes = envelope.serialize().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value, json!({"contents": "body", "origin_queue": "mail"}));
    }

    #[test]
    fn test_deserialize_restores_contents_and_metadata() {
        let mut envelope = Envelope::new(json!({"id": 42}));
        envelope.attach_metadata([
            ("special_notes", json!("Super-awesome.")),
            ("priority", json!(3)),
            ("tags", json!(["x", "y"])),
        ]);

        let decoded = Envelope::deserialize(&envelope.serialize().unwrap()).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(decoded["special_notes"], json!("Super-awesome."));
    }

    #[test]
    fn test_deserialize_rejects_garbage() {
        let result = Envelope::deserialize(b"not json at all");
        assert!(matches!(result, Err(TimberlineError::Decode(_))));
    }

    #[test]
    fn test_deserialize_rejects_object_without_contents() {
        let result = Envelope::deserialize(br#"{"special_notes": "orphan"}"#);
        assert!(result.unwrap_err().is_decode());
    }

    #[test]
    fn test_deserialize_rejects_non_object() {
        assert!(Envelope::deserialize(b"[1, 2, 3]").is_err());
        assert!(Envelope::deserialize(b"\"just a string\"").is_err());
    }

    #[test]
    fn test_null_contents_round_trip() {
        let envelope = Envelope::new(Value::Null);
        let decoded = Envelope::deserialize(&envelope.serialize().unwrap()).unwrap();
        assert_eq!(decoded.contents, Value::Null);
    }

    #[test]
    fn test_from_serializable_and_contents_as() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Job {
            name: String,
            retries: u32,
        }

        let job = Job {
            name: "resize".to_string(),
            retries: 2,
        };
        let envelope = Envelope::from_serializable(&job).unwrap();
        assert_eq!(envelope.contents_as::<Job>().unwrap(), job);

        let err = Envelope::new("not a job").contents_as::<Job>().unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_special_characters_survive_encoding() {
        let body = "Test with 🦀 emojis and \"quotes\" and \n newlines \t tabs";
        let envelope = Envelope::wrap(body);
        let decoded = Envelope::deserialize(&envelope.serialize().unwrap()).unwrap();
        assert_eq!(decoded.contents, json!(body));
    }
}
