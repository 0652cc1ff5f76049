//! Local field name to remote path mapping

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::record::{FieldPath, RemoteRecord};

/// Values for one local member, keyed by local field name
pub type FieldValues = BTreeMap<String, String>;

/// Default local field used to match members against remote users
pub const DEFAULT_UNIQUE_FIELD: &str = "Email";

/// Error raised when a mapping cannot be built
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    #[error("unique identity field {0:?} is not part of the field mapping")]
    MissingUniqueField(String),
    #[error("local field {0:?} is mapped twice")]
    DuplicateField(String),
    #[error(transparent)]
    Path(#[from] super::record::FieldPathError),
}

/// Ordered mapping from local field name to remote dotted path.
///
/// Exactly one entry is the unique identity field used to match local
/// members to remote users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FieldMappingFile", into = "FieldMappingFile")]
pub struct FieldMapping {
    fields: Vec<(String, FieldPath)>,
    unique_index: usize,
}

impl FieldMapping {
    /// Build a mapping from already parsed paths
    pub fn new(
        fields: impl IntoIterator<Item = (String, FieldPath)>,
        unique_field: impl Into<String>,
    ) -> Result<Self, MappingError> {
        let unique_field = unique_field.into();
        let mut seen = Vec::new();
        let mut entries = Vec::new();

        for (local, path) in fields {
            if seen.contains(&local) {
                return Err(MappingError::DuplicateField(local));
            }
            seen.push(local.clone());
            entries.push((local, path));
        }

        let unique_index = seen
            .iter()
            .position(|local| *local == unique_field)
            .ok_or(MappingError::MissingUniqueField(unique_field))?;

        Ok(Self {
            fields: entries,
            unique_index,
        })
    }

    /// Build a mapping from `(local field, dotted path)` string pairs
    pub fn from_pairs<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
        unique_field: impl Into<String>,
    ) -> Result<Self, MappingError> {
        let fields = pairs
            .into_iter()
            .map(|(local, path)| Ok((local.to_string(), FieldPath::parse(path)?)))
            .collect::<Result<Vec<_>, MappingError>>()?;
        Self::new(fields, unique_field)
    }

    /// The directory profile mapping used when no mapping is configured
    pub fn directory_default() -> Self {
        let fields = [
            ("FirstName", FieldPath::Nested("profile".into(), "firstName".into())),
            ("Surname", FieldPath::Nested("profile".into(), "lastName".into())),
            ("Email", FieldPath::Nested("profile".into(), "email".into())),
            ("PrimaryPhone", FieldPath::Nested("profile".into(), "primaryPhone".into())),
            ("JobTitle", FieldPath::Nested("profile".into(), "title".into())),
            (
                "EncodedProfilePicture",
                FieldPath::Nested("profile".into(), "thumbnailPhoto".into()),
            ),
            ("LastEdited", FieldPath::Top("lastUpdated".into())),
            ("DeskNumber", FieldPath::Nested("profile".into(), "DeskNumber".into())),
            ("Location", FieldPath::Nested("profile".into(), "Location".into())),
            ("OktaID", FieldPath::Top("id".into())),
        ];

        let fields: Vec<(String, FieldPath)> = fields
            .into_iter()
            .map(|(local, path)| (local.to_string(), path))
            .collect();
        let unique_index = fields
            .iter()
            .position(|(local, _)| local == DEFAULT_UNIQUE_FIELD)
            .unwrap_or_default();

        Self {
            fields,
            unique_index,
        }
    }

    /// Return a copy of this mapping keyed on a different unique field
    pub fn with_unique_field(&self, unique_field: impl Into<String>) -> Result<Self, MappingError> {
        Self::new(self.fields.clone(), unique_field)
    }

    pub fn unique_field(&self) -> &str {
        &self.fields[self.unique_index].0
    }

    /// Remote path of the given local field
    pub fn path_for(&self, local_field: &str) -> Option<&FieldPath> {
        self.fields
            .iter()
            .find(|(local, _)| local == local_field)
            .map(|(_, path)| path)
    }

    /// Remote path of the unique identity field
    pub fn unique_path(&self) -> &FieldPath {
        &self.fields[self.unique_index].1
    }

    /// Iterate over `(local field, remote path)` in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldPath)> {
        self.fields.iter().map(|(local, path)| (local.as_str(), path))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Value of `local_field` on a remote record, if non-empty
    pub fn key_of(&self, record: &RemoteRecord, local_field: &str) -> Option<String> {
        self.path_for(local_field)
            .and_then(|path| record.resolve(path))
            .filter(|value| !value.is_empty())
    }

    /// Unique identity value of a remote record, if non-empty
    pub fn identity_of(&self, record: &RemoteRecord) -> Option<String> {
        record
            .resolve(self.unique_path())
            .filter(|value| !value.is_empty())
    }

    /// Local field values for a remote record.
    ///
    /// Fields whose path does not resolve are left out of the result.
    pub fn values_for(&self, record: &RemoteRecord) -> FieldValues {
        self.iter()
            .filter_map(|(local, path)| record.resolve(path).map(|v| (local.to_string(), v)))
            .collect()
    }
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self::directory_default()
    }
}

/// On-disk form of a mapping: `{"unique_field": "...", "fields": {local: path}}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMappingFile {
    pub unique_field: String,
    pub fields: BTreeMap<String, FieldPath>,
}

impl TryFrom<FieldMappingFile> for FieldMapping {
    type Error = MappingError;

    fn try_from(file: FieldMappingFile) -> Result<Self, Self::Error> {
        Self::new(file.fields, file.unique_field)
    }
}

impl From<FieldMapping> for FieldMappingFile {
    fn from(mapping: FieldMapping) -> Self {
        Self {
            unique_field: mapping.unique_field().to_string(),
            fields: mapping.fields.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> RemoteRecord {
        RemoteRecord::new(json!({
            "id": "456",
            "lastUpdated": "2017-06-07T02:35:15.000Z",
            "profile": {
                "firstName": "user2",
                "lastName": "surname2",
                "email": "user2@test.com",
                "title": ""
            }
        }))
    }

    #[test]
    fn test_default_mapping_identity() {
        let mapping = FieldMapping::directory_default();
        assert_eq!(mapping.unique_field(), "Email");
        assert_eq!(mapping.unique_path().to_string(), "profile.email");
        assert_eq!(mapping.identity_of(&record()), Some("user2@test.com".into()));
        assert_eq!(mapping.key_of(&record(), "OktaID"), Some("456".into()));
    }

    #[test]
    fn test_values_skip_unresolved_fields() {
        let mapping = FieldMapping::directory_default();
        let values = mapping.values_for(&record());

        assert_eq!(values.get("FirstName").map(String::as_str), Some("user2"));
        assert_eq!(values.get("JobTitle").map(String::as_str), Some(""));
        assert_eq!(
            values.get("LastEdited").map(String::as_str),
            Some("2017-06-07T02:35:15.000Z")
        );
        assert!(!values.contains_key("PrimaryPhone"));
        assert!(!values.contains_key("DeskNumber"));
    }

    #[test]
    fn test_empty_identity_is_absent() {
        let mapping = FieldMapping::from_pairs([("Email", "profile.email")], "Email").unwrap();
        let record = RemoteRecord::new(json!({"profile": {"email": ""}}));
        assert_eq!(mapping.identity_of(&record), None);
    }

    #[test]
    fn test_unique_field_must_be_mapped() {
        let err = FieldMapping::from_pairs([("FirstName", "profile.firstName")], "Email");
        assert_eq!(err, Err(MappingError::MissingUniqueField("Email".into())));
    }

    #[test]
    fn test_deep_path_rejected_at_build() {
        let err = FieldMapping::from_pairs([("Email", "profile.emails.work")], "Email");
        assert!(matches!(err, Err(MappingError::Path(_))));
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let err = FieldMapping::from_pairs(
            [("Email", "profile.email"), ("Email", "profile.login")],
            "Email",
        );
        assert_eq!(err, Err(MappingError::DuplicateField("Email".into())));
    }

    #[test]
    fn test_switch_unique_field() {
        let mapping = FieldMapping::directory_default()
            .with_unique_field("OktaID")
            .unwrap();
        assert_eq!(mapping.identity_of(&record()), Some("456".into()));
    }

    #[test]
    fn test_serialize_through_file_form() {
        let mapping = FieldMapping::from_pairs(
            [("Email", "profile.email"), ("OktaID", "id")],
            "Email",
        )
        .unwrap();
        let json = serde_json::to_string(&mapping).unwrap();
        assert_eq!(
            json,
            r#"{"unique_field":"Email","fields":{"Email":"profile.email","OktaID":"id"}}"#
        );
    }

    #[test]
    fn test_mapping_file_roundtrip() {
        let json = r#"{
            "unique_field": "Email",
            "fields": {"Email": "profile.email", "FirstName": "profile.firstName"}
        }"#;
        let file: FieldMappingFile = serde_json::from_str(json).unwrap();
        let mapping = FieldMapping::try_from(file).unwrap();
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.identity_of(&record()), Some("user2@test.com".into()));
    }
}
