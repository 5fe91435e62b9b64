//! Versioned page content document
//!
//! The editor stores one JSON document per page. Every nested section has a
//! default, so a document decoded here never misses an object the renderer
//! touches, whatever shape was stored. Older shapes are upgraded explicitly
//! in [`ContentDocument::decode`]; newer ones are rejected.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::tier::PlanTier;

/// Version written by this build
pub const CURRENT_VERSION: u64 = 2;

/// Reasons a content document cannot be accepted
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Content document must be a JSON object")]
    NotAnObject,

    #[error("Content version must be a positive integer")]
    InvalidVersion,

    #[error("Unsupported content version {0}")]
    UnsupportedVersion(u64),

    #[error("Invalid content document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Treat an explicit `null` like a missing key
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A nested object of the wrong shape decodes to its default
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + DeserializeOwned,
{
    Ok(T::deserialize(Value::deserialize(deserializer)?).unwrap_or_default())
}

/// Lists keep their well-formed entries; anything else becomes an empty list
fn lenient_items<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Default + DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .map(|item| T::deserialize(item).unwrap_or_default())
            .collect(),
        _ => Vec::new(),
    })
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Text fields also take numbers and booleans, e.g. `"price": 19`
fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_text(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_text(Value::deserialize(deserializer)?))
}

fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    })
}

/// The whole editable page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContentDocument {
    pub version: u64,
    #[serde(deserialize_with = "lenient")]
    pub theme: Theme,
    #[serde(deserialize_with = "lenient")]
    pub announcement: AnnouncementBar,
    #[serde(deserialize_with = "lenient")]
    pub hero: Hero,
    #[serde(deserialize_with = "lenient_items")]
    pub nav_links: Vec<NavLink>,
    #[serde(deserialize_with = "lenient")]
    pub about: AboutSection,
    #[serde(deserialize_with = "lenient")]
    pub events: EventsSection,
    #[serde(deserialize_with = "lenient")]
    pub stations: StationsSection,
    #[serde(deserialize_with = "lenient")]
    pub sales: SalesSection,
    /// Section kinds are a closed set, so an unknown kind rejects the document
    #[serde(deserialize_with = "nullable")]
    pub custom_sections: Vec<CustomSection>,
    #[serde(deserialize_with = "lenient")]
    pub footer: Footer,
    /// Keys this build does not know about, kept verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Brand colours and font
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Theme {
    #[serde(deserialize_with = "text")]
    pub primary_color: String,
    #[serde(deserialize_with = "text")]
    pub secondary_color: String,
    #[serde(deserialize_with = "text")]
    pub background_color: String,
    #[serde(deserialize_with = "text")]
    pub text_color: String,
    #[serde(deserialize_with = "text")]
    pub font_family: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary_color: "#1f2937".to_string(),
            secondary_color: "#f59e0b".to_string(),
            background_color: "#ffffff".to_string(),
            text_color: "#111827".to_string(),
            font_family: "Inter".to_string(),
            extra: Map::new(),
        }
    }
}

/// Top announcement bar
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnnouncementBar {
    #[serde(deserialize_with = "flag")]
    pub enabled: bool,
    #[serde(deserialize_with = "text")]
    pub text: String,
    #[serde(deserialize_with = "text")]
    pub link: String,
    #[serde(deserialize_with = "optional_text")]
    pub background_color: Option<String>,
    #[serde(deserialize_with = "optional_text")]
    pub text_color: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Hero {
    #[serde(deserialize_with = "text")]
    pub title: String,
    #[serde(deserialize_with = "text")]
    pub subtitle: String,
    #[serde(deserialize_with = "text")]
    pub background_image: String,
    #[serde(deserialize_with = "text")]
    pub logo: String,
    #[serde(deserialize_with = "text")]
    pub cta_text: String,
    #[serde(deserialize_with = "text")]
    pub cta_link: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NavLink {
    #[serde(deserialize_with = "text")]
    pub label: String,
    #[serde(deserialize_with = "text")]
    pub href: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AboutSection {
    #[serde(deserialize_with = "flag")]
    pub enabled: bool,
    #[serde(deserialize_with = "text")]
    pub title: String,
    #[serde(deserialize_with = "text")]
    pub text: String,
    #[serde(deserialize_with = "text")]
    pub image: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EventsSection {
    #[serde(deserialize_with = "flag")]
    pub enabled: bool,
    #[serde(deserialize_with = "text")]
    pub title: String,
    #[serde(deserialize_with = "lenient_items")]
    pub items: Vec<EventItem>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EventItem {
    #[serde(deserialize_with = "text")]
    pub title: String,
    #[serde(deserialize_with = "text")]
    pub date: String,
    #[serde(deserialize_with = "text")]
    pub location: String,
    #[serde(deserialize_with = "text")]
    pub description: String,
    #[serde(deserialize_with = "text")]
    pub image: String,
    #[serde(deserialize_with = "text")]
    pub link: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StationsSection {
    #[serde(deserialize_with = "flag")]
    pub enabled: bool,
    #[serde(deserialize_with = "text")]
    pub title: String,
    #[serde(deserialize_with = "lenient_items")]
    pub items: Vec<Station>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Station {
    #[serde(deserialize_with = "text")]
    pub name: String,
    #[serde(deserialize_with = "text")]
    pub description: String,
    #[serde(deserialize_with = "text")]
    pub image: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Pricing block; rendered publicly only for premium owners
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SalesSection {
    #[serde(deserialize_with = "flag")]
    pub enabled: bool,
    #[serde(deserialize_with = "text")]
    pub title: String,
    #[serde(deserialize_with = "text")]
    pub subtitle: String,
    #[serde(deserialize_with = "lenient_items")]
    pub cards: Vec<SalesCard>,
    #[serde(deserialize_with = "lenient_items")]
    pub highlights: Vec<Highlight>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SalesCard {
    #[serde(deserialize_with = "text")]
    pub title: String,
    #[serde(deserialize_with = "text")]
    pub price: String,
    #[serde(deserialize_with = "text")]
    pub period: String,
    #[serde(deserialize_with = "text")]
    pub description: String,
    #[serde(deserialize_with = "lenient_items")]
    pub features: Vec<SalesFeature>,
    #[serde(deserialize_with = "flag")]
    pub highlighted: bool,
    #[serde(deserialize_with = "text")]
    pub cta_text: String,
    #[serde(deserialize_with = "text")]
    pub cta_link: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SalesFeature {
    #[serde(deserialize_with = "text")]
    pub text: String,
    #[serde(deserialize_with = "flag")]
    pub included: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Highlight {
    #[serde(deserialize_with = "text")]
    pub icon: String,
    #[serde(deserialize_with = "text")]
    pub title: String,
    #[serde(deserialize_with = "text")]
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomSectionKind {
    #[default]
    Text,
    Gallery,
    Grid,
    Sales,
}

/// User-defined section with its own style overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CustomSection {
    #[serde(deserialize_with = "text")]
    pub id: String,
    #[serde(rename = "type", deserialize_with = "nullable")]
    pub kind: CustomSectionKind,
    #[serde(deserialize_with = "flag")]
    pub enabled: bool,
    #[serde(deserialize_with = "text")]
    pub title: String,
    #[serde(deserialize_with = "text")]
    pub text: String,
    #[serde(deserialize_with = "lenient_items")]
    pub images: Vec<String>,
    #[serde(deserialize_with = "lenient_items")]
    pub items: Vec<GridItem>,
    #[serde(deserialize_with = "lenient")]
    pub sales: SalesSection,
    #[serde(deserialize_with = "lenient")]
    pub style: SectionStyle,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GridItem {
    #[serde(deserialize_with = "text")]
    pub title: String,
    #[serde(deserialize_with = "text")]
    pub text: String,
    #[serde(deserialize_with = "text")]
    pub image: String,
    #[serde(deserialize_with = "text")]
    pub link: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SectionStyle {
    #[serde(
        deserialize_with = "optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub background_color: Option<String>,
    #[serde(
        deserialize_with = "optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub text_color: Option<String>,
    #[serde(
        deserialize_with = "optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub accent_color: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Footer {
    #[serde(deserialize_with = "text")]
    pub text: String,
    #[serde(deserialize_with = "lenient_items")]
    pub social_links: Vec<SocialLink>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SocialLink {
    #[serde(deserialize_with = "text")]
    pub platform: String,
    #[serde(deserialize_with = "text")]
    pub url: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ContentDocument {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            theme: Theme::default(),
            announcement: AnnouncementBar::default(),
            hero: Hero::default(),
            nav_links: Vec::new(),
            about: AboutSection::default(),
            events: EventsSection::default(),
            stations: StationsSection::default(),
            sales: SalesSection::default(),
            custom_sections: Vec::new(),
            footer: Footer::default(),
            extra: Map::new(),
        }
    }
}

impl ContentDocument {
    /// Starter page created alongside a new account
    pub fn starter(display_name: &str) -> Self {
        Self {
            hero: Hero {
                title: display_name.to_string(),
                subtitle: "Welcome to my page".to_string(),
                cta_text: "Contact me".to_string(),
                cta_link: "#about".to_string(),
                ..Hero::default()
            },
            nav_links: vec![
                NavLink {
                    label: "About".to_string(),
                    href: "#about".to_string(),
                    ..NavLink::default()
                },
                NavLink {
                    label: "Events".to_string(),
                    href: "#events".to_string(),
                    ..NavLink::default()
                },
            ],
            about: AboutSection {
                enabled: true,
                title: "About".to_string(),
                ..AboutSection::default()
            },
            events: EventsSection {
                enabled: true,
                title: "Upcoming events".to_string(),
                ..EventsSection::default()
            },
            footer: Footer {
                text: format!("© {}", display_name),
                ..Footer::default()
            },
            ..Self::default()
        }
    }

    /// Decode a document of any supported version into the current shape
    pub fn decode(value: Value) -> Result<Self, ContentError> {
        let Value::Object(mut map) = value else {
            return Err(ContentError::NotAnObject);
        };

        let version = match map.get("version") {
            None | Some(Value::Null) => 1,
            Some(v) => v
                .as_u64()
                .filter(|v| *v > 0)
                .ok_or(ContentError::InvalidVersion)?,
        };

        if version > CURRENT_VERSION {
            return Err(ContentError::UnsupportedVersion(version));
        }
        if version < 2 {
            upgrade_v1(&mut map);
        }
        map.insert("version".to_string(), json!(CURRENT_VERSION));

        Ok(serde_json::from_value(Value::Object(map))?)
    }

    /// Decode the JSON text stored in the `pages.content` column
    pub fn from_stored(raw: &str) -> Result<Self, ContentError> {
        Self::decode(serde_json::from_str(raw)?)
    }

    /// Encode for the `pages.content` column
    pub fn to_stored(&self) -> Result<String, ContentError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Public view of the document for an owner on `tier`.
    ///
    /// Only the top-level sales section is premium-gated.
    pub fn gated_for(mut self, tier: PlanTier) -> Self {
        if !tier.includes_premium_sections() {
            self.sales.enabled = false;
        }
        self
    }
}

/// Version 1 kept events and stations as bare arrays and social links at
/// the top level.
fn upgrade_v1(map: &mut Map<String, Value>) {
    for key in ["events", "stations"] {
        if let Some(value) = map.get_mut(key) {
            if value.is_array() {
                let items = value.take();
                *value = json!({ "enabled": true, "items": items });
            }
        }
    }

    if let Some(links) = map.remove("socialLinks") {
        let footer = map
            .entry("footer")
            .or_insert_with(|| Value::Object(Map::new()));
        if !footer.is_object() {
            *footer = Value::Object(Map::new());
        }
        if let Value::Object(footer) = footer {
            footer.entry("socialLinks").or_insert(links);
        }
    }
}
