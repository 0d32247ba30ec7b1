use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, de};
use std::fmt;

/// Contact and context details for a prospective customer.
///
/// A lead is assembled one field at a time over the course of a call and is
/// sent to the lead store once. Optional fields that were never collected are
/// serialized as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Lead {
    #[schemars(description = "The caller's full name")]
    pub name: String,
    #[schemars(description = "The best email address to reach the caller")]
    pub email: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub use_case: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    #[schemars(with = "Option<String>")]
    pub team_size: Option<String>,
    #[serde(default)]
    #[schemars(description = "When the caller plans to start: 'now', 'soon', 'later' or free text")]
    pub timeline: Option<String>,
    #[serde(default, deserialize_with = "faq_ids")]
    #[schemars(with = "Vec<String>")]
    #[schemars(description = "Identifiers of the FAQ entries used during the call")]
    pub matched_faq_ids: Vec<String>,
}

/// Coarse buckets the conversational policy asks callers to choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Timeline {
    Now,
    Soon,
    Later,
}

impl Timeline {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "now" => Some(Timeline::Now),
            "soon" => Some(Timeline::Soon),
            "later" => Some(Timeline::Later),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LeadError {
    #[error("lead name is required")]
    MissingName,
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
}

impl Lead {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            company: None,
            role: None,
            use_case: None,
            team_size: None,
            timeline: None,
            matched_faq_ids: Vec::new(),
        }
    }

    /// Strips surrounding whitespace from the name and email.
    pub fn trimmed(mut self) -> Self {
        self.name = self.name.trim().to_string();
        self.email = self.email.trim().to_string();
        self
    }

    /// Checks the two fields the lead store cannot do without.
    pub fn validate(&self) -> Result<(), LeadError> {
        if self.name.trim().is_empty() {
            return Err(LeadError::MissingName);
        }
        if !is_valid_email(&self.email) {
            return Err(LeadError::InvalidEmail(self.email.clone()));
        }
        Ok(())
    }

    /// The timeline as one of the known buckets, if the caller used one.
    pub fn timeline_bucket(&self) -> Option<Timeline> {
        self.timeline.as_deref().and_then(Timeline::parse)
    }
}

/// An email needs an `@` followed somewhere later by a `.`.
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    match email.find('@') {
        Some(at) => email[at + 1..].contains('.'),
        None => false,
    }
}

/// The end-of-call record: a short recap plus the lead that was saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CallSummary {
    pub summary: String,
    pub lead: Lead,
}

// The model is loose about JSON types, so numbers and single values are accepted.

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(de::Error::custom(format!(
            "expected a string or number, found {}",
            other
        ))),
    }
}

fn faq_ids<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct FaqIds;

    impl<'de> de::Visitor<'de> for FaqIds {
        type Value = Vec<String>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an identifier or a list of identifiers")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_some<D2: Deserializer<'de>>(self, d: D2) -> Result<Self::Value, D2::Error> {
            d.deserialize_any(self)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect())
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut ids = Vec::new();
            while let Some(item) = seq.next_element::<serde_json::Value>()? {
                match item {
                    serde_json::Value::String(s) => ids.push(s),
                    serde_json::Value::Number(n) => ids.push(n.to_string()),
                    serde_json::Value::Null => {}
                    other => {
                        return Err(de::Error::custom(format!("invalid FAQ id: {}", other)));
                    }
                }
            }
            Ok(ids)
        }
    }

    deserializer.deserialize_any(FaqIds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_email_shape() {
        assert!(is_valid_email("priya@acme.io"));
        assert!(is_valid_email("  a@b.c "));
        assert!(!is_valid_email("priya.acme.io"));
        assert!(!is_valid_email("priya@acme"));
        assert!(!is_valid_email("first.last@localhost"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_validate_requires_name_and_email() {
        assert_eq!(
            Lead::new("  ", "priya@acme.io").validate(),
            Err(LeadError::MissingName)
        );
        assert_eq!(
            Lead::new("Priya", "priya-at-acme").validate(),
            Err(LeadError::InvalidEmail("priya-at-acme".to_string()))
        );
        assert!(Lead::new("Priya", "priya@acme.io").validate().is_ok());
    }

    #[test]
    fn test_trimmed_cleans_contact_fields() {
        let lead = Lead::new("  Priya Raman ", " priya@acme.io\n").trimmed();
        assert_eq!(lead.name, "Priya Raman");
        assert_eq!(lead.email, "priya@acme.io");
        assert!(lead.validate().is_ok());
    }

    #[test]
    fn test_timeline_bucket() {
        let mut lead = Lead::new("Priya", "priya@acme.io");
        assert_eq!(lead.timeline_bucket(), None);
        lead.timeline = Some(" Soon ".to_string());
        assert_eq!(lead.timeline_bucket(), Some(Timeline::Soon));
        lead.timeline = Some("after the Q3 budget review".to_string());
        assert_eq!(lead.timeline_bucket(), None);
    }

    #[test]
    fn test_uncollected_fields_serialize_as_null() {
        let lead = Lead::new("Priya", "priya@acme.io");
        let value = serde_json::to_value(&lead).unwrap();
        assert_eq!(value["company"], serde_json::Value::Null);
        assert_eq!(value["timeline"], serde_json::Value::Null);
        assert_eq!(value["matched_faq_ids"], json!([]));
    }

    #[test]
    fn test_faq_ids_accept_loose_shapes() {
        let from_number: Lead = serde_json::from_value(
            json!({"name": "A", "email": "a@b.co", "matched_faq_ids": 7}),
        )
        .unwrap();
        assert_eq!(from_number.matched_faq_ids, vec!["7"]);

        let from_mixed: Lead = serde_json::from_value(
            json!({"name": "A", "email": "a@b.co", "matched_faq_ids": ["faq-1", 2, null]}),
        )
        .unwrap();
        assert_eq!(from_mixed.matched_faq_ids, vec!["faq-1", "2"]);

        let from_csv: Lead = serde_json::from_value(
            json!({"name": "A", "email": "a@b.co", "matched_faq_ids": "3, 5"}),
        )
        .unwrap();
        assert_eq!(from_csv.matched_faq_ids, vec!["3", "5"]);

        let from_null: Lead = serde_json::from_value(
            json!({"name": "A", "email": "a@b.co", "matched_faq_ids": null}),
        )
        .unwrap();
        assert!(from_null.matched_faq_ids.is_empty());
    }

    #[test]
    fn test_team_size_accepts_numbers() {
        let lead: Lead = serde_json::from_value(
            json!({"name": "A", "email": "a@b.co", "team_size": 40}),
        )
        .unwrap();
        assert_eq!(lead.team_size.as_deref(), Some("40"));

        let bad: Result<Lead, _> = serde_json::from_value(
            json!({"name": "A", "email": "a@b.co", "team_size": {"min": 4}}),
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_missing_required_fields_rejected() {
        let result: Result<Lead, _> = serde_json::from_value(json!({"name": "A"}));
        assert!(result.is_err());
    }
}
