//! Source descriptors and the catalog they are loaded from.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

/// Kind of external origin, selecting the fetch adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceClass {
    #[serde(alias = "Website", alias = "website")]
    Web,
    #[serde(alias = "Facebook", alias = "facebook", alias = "social")]
    SocialPage,
}

impl fmt::Display for SourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceClass::Web => write!(f, "web"),
            SourceClass::SocialPage => write!(f, "social_page"),
        }
    }
}

/// One external origin of event listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Stable identifier, carried into every event from this source
    #[serde(alias = "source_id")]
    pub id: String,

    /// Display name
    #[serde(alias = "source_name")]
    pub name: String,

    /// Target address
    #[serde(alias = "source_url")]
    pub url: String,

    #[serde(alias = "source_type", default = "default_class")]
    pub class: SourceClass,

    /// Page needs a scripted browser to render its listings
    #[serde(alias = "requires_selenium", default, deserialize_with = "interactive_flag")]
    pub requires_interactive: bool,

    #[serde(default = "default_active", deserialize_with = "active_flag")]
    pub active: bool,
}

fn default_class() -> SourceClass {
    SourceClass::Web
}

fn default_active() -> bool {
    true
}

/// Boolean written as `true`/`false`, `yes`/`no`, `y`/`n` or `1`/`0`.
/// A blank value reads as `None`.
struct FlagVisitor;

impl<'de> Visitor<'de> for FlagVisitor {
    type Value = Option<bool>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a boolean or one of yes/no, y/n, 1/0")
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> std::result::Result<Self::Value, E> {
        Ok(Some(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<Self::Value, E> {
        match value {
            0 => Ok(Some(false)),
            1 => Ok(Some(true)),
            _ => Err(E::invalid_value(de::Unexpected::Unsigned(value), &self)),
        }
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<Self::Value, E> {
        match u64::try_from(value) {
            Ok(value) => self.visit_u64(value),
            Err(_) => Err(E::invalid_value(de::Unexpected::Signed(value), &self)),
        }
    }

    fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<Self::Value, E> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "yes" | "y" | "true" | "1" => Ok(Some(true)),
            "no" | "n" | "false" | "0" => Ok(Some(false)),
            _ => Err(E::invalid_value(de::Unexpected::Str(value), &self)),
        }
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(None)
    }
}

fn interactive_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserializer.deserialize_any(FlagVisitor)?.unwrap_or(false))
}

fn active_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(deserializer.deserialize_any(FlagVisitor)?.unwrap_or_else(default_active))
}

/// Catalog file layout, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CatalogFormat {
    Toml,
    Json,
    Csv,
}

impl CatalogFormat {
    fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Self::Json,
            Some("csv") => Self::Csv,
            _ => Self::Toml,
        }
    }
}

/// The list of sources for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceCatalog {
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
}

impl SourceCatalog {
    pub fn new(sources: Vec<SourceDescriptor>) -> Self {
        Self { sources }
    }

    /// Load a catalog from a TOML, JSON or CSV file, chosen by extension.
    ///
    /// JSON may be a bare array or an object with a `sources` array. CSV
    /// has one source per row under a header row.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::config(format!("cannot read catalog {}: {}", path.display(), e))
        })?;

        let catalog = match CatalogFormat::from_path(path) {
            CatalogFormat::Json => Self::from_json(&content),
            CatalogFormat::Csv => Self::from_csv(&content),
            CatalogFormat::Toml => toml::from_str::<Self>(&content).map_err(|e| e.to_string()),
        }
        .map_err(|e| AppError::config(format!("malformed catalog {}: {}", path.display(), e)))?;

        catalog.validate()?;
        Ok(catalog)
    }

    fn from_json(content: &str) -> std::result::Result<Self, String> {
        let value: serde_json::Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
        match value {
            serde_json::Value::Array(_) => serde_json::from_value::<Vec<SourceDescriptor>>(value)
                .map(Self::new)
                .map_err(|e| e.to_string()),
            serde_json::Value::Object(_) => {
                serde_json::from_value::<Self>(value).map_err(|e| e.to_string())
            }
            _ => Err("expected an array of sources or an object with a `sources` array".into()),
        }
    }

    fn from_csv(content: &str) -> std::result::Result<Self, String> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let sources = reader
            .deserialize::<SourceDescriptor>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?;
        Ok(Self::new(sources))
    }

    /// Reject duplicate identifiers and unusable addresses.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.id.trim().is_empty() {
                return Err(AppError::config(format!(
                    "source '{}' has an empty id",
                    source.name
                )));
            }
            if !seen.insert(source.id.as_str()) {
                return Err(AppError::config(format!(
                    "duplicate source id '{}'",
                    source.id
                )));
            }
            Url::parse(&source.url).map_err(|e| {
                AppError::config(format!("source '{}' has invalid url: {}", source.id, e))
            })?;
        }
        Ok(())
    }

    /// Active sources in catalog order, optionally truncated.
    pub fn active(&self, limit: Option<usize>) -> Vec<SourceDescriptor> {
        self.sources
            .iter()
            .filter(|s| s.active)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_toml_catalog() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sources.toml");
        fs::write(
            &path,
            r#"
            [[sources]]
            id = "heraklion-culture"
            name = "Heraklion Culture"
            url = "https://culture.example.gr/events"

            [[sources]]
            id = "chania-fb"
            name = "Chania Page"
            url = "https://social.example.com/chania"
            class = "social_page"
            requires_interactive = true
            active = false
            "#,
        )
        .unwrap();

        let catalog = SourceCatalog::load(&path).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.sources[0].class, SourceClass::Web);
        assert!(catalog.sources[0].active);
        assert_eq!(catalog.sources[1].class, SourceClass::SocialPage);

        let active = catalog.active(None);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "heraklion-culture");
    }

    #[test]
    fn load_json_with_legacy_column_names() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sources.json");
        fs::write(
            &path,
            r#"[
                {"source_id": "S1", "source_name": "One", "source_url": "https://one.example/",
                 "source_type": "Website", "requires_selenium": false},
                {"source_id": "S2", "source_name": "Two", "source_url": "https://two.example/",
                 "source_type": "Facebook"}
            ]"#,
        )
        .unwrap();

        let catalog = SourceCatalog::load(&path).unwrap();
        assert_eq!(catalog.sources[0].id, "S1");
        assert_eq!(catalog.sources[1].class, SourceClass::SocialPage);
    }

    #[test]
    fn legacy_yes_no_flags_are_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sources.json");
        fs::write(
            &path,
            r#"{"sources": [
                {"source_id": "S1", "source_name": "One", "source_url": "https://one.example/",
                 "source_type": "Website", "requires_selenium": "no", "active": "yes"},
                {"source_id": "S2", "source_name": "Two", "source_url": "https://two.example/",
                 "source_type": "Facebook", "requires_selenium": "yes", "active": "no"}
            ]}"#,
        )
        .unwrap();

        let catalog = SourceCatalog::load(&path).unwrap();
        assert!(!catalog.sources[0].requires_interactive);
        assert!(catalog.sources[0].active);
        assert!(catalog.sources[1].requires_interactive);
        assert!(!catalog.sources[1].active);
        assert_eq!(catalog.active(None).len(), 1);
    }

    #[test]
    fn load_csv_catalog() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sources.csv");
        fs::write(
            &path,
            "source_id,source_name,source_url,source_type,requires_selenium,active,notes\n\
             S1,Heraklion Culture,https://culture.example.gr/events,Website,no,yes,municipal\n\
             S2,Chania Page,https://social.example.com/chania,Facebook,yes,yes,\n\
             S3,Closed Venue,https://closed.example/,Website,no,no,moved\n",
        )
        .unwrap();

        let catalog = SourceCatalog::load(&path).unwrap();
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.sources[1].class, SourceClass::SocialPage);
        assert!(catalog.sources[1].requires_interactive);

        let active: Vec<_> = catalog.active(None).into_iter().map(|s| s.id).collect();
        assert_eq!(active, vec!["S1", "S2"]);
    }

    #[test]
    fn catalog_errors_name_the_offending_field() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sources.json");
        fs::write(
            &path,
            r#"[{"id": "S1", "name": "One", "url": "https://one.example/", "active": "maybe"}]"#,
        )
        .unwrap();

        let err = SourceCatalog::load(&path).unwrap_err().to_string();
        assert!(err.contains("maybe"), "{err}");
        assert!(!err.contains("untagged"), "{err}");

        fs::write(&path, r#"{"sources": [{"id": "S1", "name": "One"}]}"#).unwrap();
        let err = SourceCatalog::load(&path).unwrap_err().to_string();
        assert!(err.contains("missing field `url`"), "{err}");
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let source = SourceDescriptor {
            id: "dup".into(),
            name: "Dup".into(),
            url: "https://dup.example/".into(),
            class: SourceClass::Web,
            requires_interactive: false,
            active: true,
        };
        let catalog = SourceCatalog::new(vec![source.clone(), source]);
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn malformed_catalog_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sources.json");
        fs::write(&path, "{ not json").unwrap();

        let err = SourceCatalog::load(&path).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn active_respects_limit() {
        let sources = (0..5)
            .map(|i| SourceDescriptor {
                id: format!("s{i}"),
                name: format!("Source {i}"),
                url: format!("https://s{i}.example/"),
                class: SourceClass::Web,
                requires_interactive: false,
                active: true,
            })
            .collect();
        let catalog = SourceCatalog::new(sources);
        assert_eq!(catalog.active(Some(2)).len(), 2);
        assert_eq!(catalog.active(None).len(), 5);
    }
}
