use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle action of an OSM edit point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsmAction {
    Create,
    Modify,
    Delete,
    Reopen,
}

impl OsmAction {
    pub const ALL: [OsmAction; 4] = [
        OsmAction::Create,
        OsmAction::Modify,
        OsmAction::Delete,
        OsmAction::Reopen,
    ];

    /// The protocol token for this action
    pub fn as_str(self) -> &'static str {
        match self {
            OsmAction::Create => "create",
            OsmAction::Modify => "modify",
            OsmAction::Delete => "delete",
            OsmAction::Reopen => "reopen",
        }
    }
}

impl fmt::Display for OsmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OsmError {
    #[error("unknown edit action: {0:?}")]
    UnknownAction(String),
}

impl FromStr for OsmAction {
    type Err = OsmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(OsmAction::Create),
            "modify" => Ok(OsmAction::Modify),
            "delete" => Ok(OsmAction::Delete),
            "reopen" => Ok(OsmAction::Reopen),
            other => Err(OsmError::UnknownAction(other.to_string())),
        }
    }
}

/// Which kind of correction an edit point carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsmGroup {
    Undetermined,
    Bug,
    Poi,
}

/// Free-form OSM tags, kept in key order for stable output
pub type OsmTags = BTreeMap<String, String>;

/// Common surface of every edit point.
pub trait OsmPoint {
    fn id(&self) -> i64;
    fn latitude(&self) -> f64;
    fn longitude(&self) -> f64;
    fn group(&self) -> OsmGroup;
    fn tags(&self) -> &OsmTags;
    fn name(&self) -> String;
    fn action(&self) -> OsmAction;
    fn set_action(&mut self, action: OsmAction);

    /// One-line human-readable description.
    fn to_text(&self) -> String;

    fn action_str(&self) -> &'static str {
        self.action().as_str()
    }

    /// Set the action from its protocol token; unknown tokens leave the
    /// current action untouched.
    fn set_action_str(&mut self, token: &str) -> Result<(), OsmError> {
        let action = token.parse()?;
        self.set_action(action);
        Ok(())
    }
}

/// A map note (bug report) with its comment text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsmBugPoint {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    pub text: String,
    #[serde(default)]
    pub author: String,
    pub action: OsmAction,
    #[serde(default)]
    pub tags: OsmTags,
}

impl OsmBugPoint {
    pub fn new(id: i64, lat: f64, lon: f64, text: &str) -> Self {
        OsmBugPoint {
            id,
            lat,
            lon,
            text: text.to_string(),
            author: String::new(),
            action: OsmAction::Create,
            tags: OsmTags::new(),
        }
    }
}

impl OsmPoint for OsmBugPoint {
    fn id(&self) -> i64 {
        self.id
    }
    fn latitude(&self) -> f64 {
        self.lat
    }
    fn longitude(&self) -> f64 {
        self.lon
    }
    fn group(&self) -> OsmGroup {
        OsmGroup::Bug
    }
    fn tags(&self) -> &OsmTags {
        &self.tags
    }
    fn name(&self) -> String {
        self.text.clone()
    }
    fn action(&self) -> OsmAction {
        self.action
    }
    fn set_action(&mut self, action: OsmAction) {
        self.action = action;
    }

    fn to_text(&self) -> String {
        format!("Bug id: {} action: {} text: {}", self.id, self.action, self.text)
    }
}

/// A point of interest edit, with its full tag set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsmPoiPoint {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    pub action: OsmAction,
    #[serde(default)]
    pub tags: OsmTags,
    #[serde(default)]
    pub comment: String,
}

impl OsmPoiPoint {
    pub fn new(id: i64, lat: f64, lon: f64, tags: OsmTags) -> Self {
        OsmPoiPoint {
            id,
            lat,
            lon,
            action: OsmAction::Create,
            tags,
            comment: String::new(),
        }
    }

    /// The POI's subtype, taken from the first recognized feature tag.
    pub fn sub_type(&self) -> String {
        const FEATURE_KEYS: [&str; 5] = ["amenity", "shop", "tourism", "leisure", "highway"];
        FEATURE_KEYS
            .iter()
            .find_map(|k| self.tags.get(*k))
            .cloned()
            .unwrap_or_default()
    }
}

impl OsmPoint for OsmPoiPoint {
    fn id(&self) -> i64 {
        self.id
    }
    fn latitude(&self) -> f64 {
        self.lat
    }
    fn longitude(&self) -> f64 {
        self.lon
    }
    fn group(&self) -> OsmGroup {
        OsmGroup::Poi
    }
    fn tags(&self) -> &OsmTags {
        &self.tags
    }
    fn name(&self) -> String {
        self.tags.get("name").cloned().unwrap_or_default()
    }
    fn action(&self) -> OsmAction {
        self.action
    }
    fn set_action(&mut self, action: OsmAction) {
        self.action = action;
    }

    fn to_text(&self) -> String {
        format!(
            "Amenity id: {} action: {} name: {} type: {}",
            self.id,
            self.action,
            self.name(),
            self.sub_type()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_tokens_round_trip() {
        for action in OsmAction::ALL {
            assert_eq!(action.as_str().parse::<OsmAction>().unwrap(), action);
        }
        assert_eq!(OsmAction::Reopen.to_string(), "reopen");
    }

    #[test]
    fn unknown_action_token_is_rejected() {
        assert_eq!(
            "CREATE".parse::<OsmAction>(),
            Err(OsmError::UnknownAction("CREATE".into()))
        );
        assert!("".parse::<OsmAction>().is_err());
    }

    #[test]
    fn set_action_str_keeps_action_on_error() {
        let mut bug = OsmBugPoint::new(7, 1.0, 2.0, "road closed");
        assert_eq!(bug.action(), OsmAction::Create);
        bug.set_action_str("modify").unwrap();
        assert_eq!(bug.action_str(), "modify");
        assert!(bug.set_action_str("archive").is_err());
        assert_eq!(bug.action(), OsmAction::Modify);
        // any action can follow any other
        bug.set_action(OsmAction::Create);
        bug.set_action(OsmAction::Reopen);
        assert_eq!(bug.action(), OsmAction::Reopen);
    }

    #[test]
    fn poi_tags_round_trip_through_json() {
        let mut tags = OsmTags::new();
        tags.insert("name".into(), "Corner Cafe".into());
        tags.insert("amenity".into(), "cafe".into());
        tags.insert("x-custom:key".into(), "anything".into());
        let poi = OsmPoiPoint::new(-1, 48.1, 11.5, tags.clone());

        let json = serde_json::to_string(&poi).unwrap();
        let back: OsmPoiPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back.tags, tags);
        assert_eq!(back.name(), "Corner Cafe");
        assert_eq!(back.sub_type(), "cafe");
        assert_eq!(back.group(), OsmGroup::Poi);
    }

    #[test]
    fn to_text_describes_point() {
        let bug = OsmBugPoint::new(3, 0.0, 0.0, "missing bridge");
        assert_eq!(bug.to_text(), "Bug id: 3 action: create text: missing bridge");

        let points: Vec<Box<dyn OsmPoint>> = vec![
            Box::new(bug),
            Box::new(OsmPoiPoint::new(4, 0.0, 0.0, OsmTags::new())),
        ];
        let groups: Vec<OsmGroup> = points.iter().map(|p| p.group()).collect();
        assert_eq!(groups, vec![OsmGroup::Bug, OsmGroup::Poi]);
    }
}
