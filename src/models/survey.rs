use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CURRENT_SURVEY_VERSION: u32 = 1;

fn current_version() -> u32 {
    CURRENT_SURVEY_VERSION
}

/// Optional answers collected on the registration form.
///
/// Keys the current survey version does not know about are kept in
/// `extensions` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyAnswers {
    #[serde(default = "current_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hear_about: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hear_about_other_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contact_interests: Vec<String>,
    #[serde(default)]
    pub want_prayer: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prayer_request: Option<String>,
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

impl Default for SurveyAnswers {
    fn default() -> Self {
        Self {
            version: CURRENT_SURVEY_VERSION,
            hear_about: Vec::new(),
            hear_about_other_text: None,
            contact_interests: Vec::new(),
            want_prayer: false,
            prayer_request: None,
            extensions: BTreeMap::new(),
        }
    }
}

impl SurveyAnswers {
    /// True when nothing was answered; such payloads are stored as null.
    pub fn is_blank(&self) -> bool {
        self.hear_about.is_empty()
            && self.hear_about_other_text.is_none()
            && self.contact_interests.is_empty()
            && !self.want_prayer
            && self.prayer_request.is_none()
            && self.extensions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_keys_land_in_extensions() {
        let answers: SurveyAnswers = serde_json::from_value(json!({
            "hear_about": ["Poster Ad"],
            "want_prayer": true,
            "favorite_booth": "blood-pressure"
        }))
        .unwrap();

        assert_eq!(answers.version, CURRENT_SURVEY_VERSION);
        assert_eq!(answers.hear_about, vec!["Poster Ad".to_string()]);
        assert!(answers.want_prayer);
        assert_eq!(
            answers.extensions.get("favorite_booth"),
            Some(&json!("blood-pressure"))
        );

        let back = serde_json::to_value(&answers).unwrap();
        assert_eq!(back["favorite_booth"], json!("blood-pressure"));
    }

    #[test]
    fn test_default_is_blank() {
        assert!(SurveyAnswers::default().is_blank());
    }
}
