//! Named style templates.
//!
//! Built-in styles are read from `<name>_template.png` in the styles
//! directory. Custom styles live next to them as `custom_<name>.png` and
//! are described by the `custom_templates.json` sidecar, which is reloaded
//! when the registry is opened.
//!
//! Lookups take a shared lock. Adding or removing a template takes the
//! exclusive lock for the duration of the update, including the file
//! writes, so readers never observe a half-registered style.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::RgbaImage;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codec::{decode_image, encode_png};
use crate::error::FacemojiError;

/// Styles that ship with the application. They can never be removed.
pub const BUILTIN_STYLES: [&str; 3] = ["panda", "mushroom", "dragon"];

/// File holding the metadata of every custom template.
pub const SIDECAR_FILE: &str = "custom_templates.json";

const MAX_NAME_LEN: usize = 32;

/// Caller-supplied description of a new custom template.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateInfo {
    /// Human-readable name; the style name is used when blank.
    pub display_name: String,
    /// Free-form description.
    pub description: String,
}

/// Persisted metadata of a custom template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateMetadata {
    /// Human-readable name.
    pub display_name: String,
    /// Free-form description.
    pub description: String,
    /// When the template was registered.
    pub created_at: DateTime<Utc>,
    /// Image file name relative to the styles directory.
    pub file: String,
}

/// A registered template image.
#[derive(Debug, Clone)]
pub struct StyleTemplate {
    /// Style name the template is registered under.
    pub name: String,
    /// Template pixels.
    pub image: RgbaImage,
    /// `None` for built-in styles.
    pub metadata: Option<TemplateMetadata>,
}

impl StyleTemplate {
    /// Whether this is one of [`BUILTIN_STYLES`].
    pub fn is_builtin(&self) -> bool {
        self.metadata.is_none()
    }
}

/// One row of [`TemplateRegistry::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateSummary {
    /// Style name.
    pub name: String,
    /// Display name, or the style name for built-ins.
    pub display_name: String,
    /// Whether the style ships with the application.
    pub builtin: bool,
    /// Template width in pixels.
    pub width: u32,
    /// Template height in pixels.
    pub height: u32,
}

/// Thread-safe map from style name to template.
#[derive(Debug)]
pub struct TemplateRegistry {
    dir: Option<PathBuf>,
    templates: RwLock<HashMap<String, Arc<StyleTemplate>>>,
    /// Sidecar entries whose image could not be loaded. They stay in the
    /// sidecar until deleted.
    orphans: RwLock<BTreeMap<String, TemplateMetadata>>,
}

impl TemplateRegistry {
    /// A registry with no backing directory. Custom templates added to it
    /// are kept in memory only.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            templates: RwLock::new(HashMap::new()),
            orphans: RwLock::new(BTreeMap::new()),
        }
    }

    /// Load built-in and custom templates from `dir`, creating the
    /// directory if needed.
    ///
    /// Missing or unreadable template images are logged and skipped; the
    /// pipeline renders the fallback canvas for those styles. A malformed
    /// sidecar is an error.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, FacemojiError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let mut templates = HashMap::new();
        let mut orphans = BTreeMap::new();

        for name in BUILTIN_STYLES {
            let path = dir.join(format!("{name}_template.png"));
            match load_rgba(&path) {
                Ok(image) => {
                    debug!(style = name, width = image.width(), height = image.height(), "built-in template loaded");
                    templates.insert(
                        name.to_string(),
                        Arc::new(StyleTemplate {
                            name: name.to_string(),
                            image,
                            metadata: None,
                        }),
                    );
                }
                Err(e) => warn!(style = name, path = %path.display(), error = %e, "built-in template unavailable"),
            }
        }

        for (name, metadata) in read_sidecar(&dir)? {
            let path = dir.join(&metadata.file);
            match load_rgba(&path) {
                Ok(image) => {
                    templates.insert(
                        name.clone(),
                        Arc::new(StyleTemplate {
                            name,
                            image,
                            metadata: Some(metadata),
                        }),
                    );
                }
                Err(e) => {
                    warn!(style = %name, path = %path.display(), error = %e, "custom template unavailable");
                    orphans.insert(name, metadata);
                }
            }
        }

        info!(dir = %dir.display(), count = templates.len(), "template registry opened");
        Ok(Self {
            dir: Some(dir),
            templates: RwLock::new(templates),
            orphans: RwLock::new(orphans),
        })
    }

    /// Backing directory, if any.
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Template registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<StyleTemplate>> {
        self.templates.read().get(name).cloned()
    }

    /// Whether a template is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.templates.read().contains_key(name)
    }

    /// Register a custom template.
    ///
    /// Fails with [`FacemojiError::TemplateExists`] if the name is taken.
    /// Built-in names count as taken even when their image is missing.
    pub fn put(&self, name: &str, image: RgbaImage, info: TemplateInfo) -> Result<Arc<StyleTemplate>, FacemojiError> {
        validate_name(name)?;
        if image.width() == 0 || image.height() == 0 {
            return Err(FacemojiError::ZeroDimensions);
        }

        let mut templates = self.templates.write();
        if BUILTIN_STYLES.contains(&name) || templates.contains_key(name) {
            return Err(FacemojiError::TemplateExists(name.to_string()));
        }

        let display_name = if info.display_name.trim().is_empty() {
            name.to_string()
        } else {
            info.display_name
        };
        let metadata = TemplateMetadata {
            display_name,
            description: info.description,
            created_at: Utc::now(),
            file: format!("custom_{name}.png"),
        };
        let template = Arc::new(StyleTemplate {
            name: name.to_string(),
            image,
            metadata: Some(metadata),
        });

        let mut orphans = self.orphans.write();
        if let Some(dir) = &self.dir {
            let path = dir.join(format!("custom_{name}.png"));
            std::fs::write(&path, encode_png(&template.image)?)?;
            let mut next = templates.clone();
            next.insert(name.to_string(), template.clone());
            let mut next_orphans = orphans.clone();
            next_orphans.remove(name);
            if let Err(e) = write_sidecar(dir, &next, &next_orphans) {
                let _ = std::fs::remove_file(&path);
                return Err(e);
            }
        }

        orphans.remove(name);
        templates.insert(name.to_string(), template.clone());
        info!(style = name, "custom template added");
        Ok(template)
    }

    /// Remove a custom template and its files.
    ///
    /// Also removes sidecar entries whose image failed to load at
    /// [`open`](Self::open).
    pub fn delete(&self, name: &str) -> Result<(), FacemojiError> {
        if BUILTIN_STYLES.contains(&name) {
            return Err(FacemojiError::BuiltinTemplate(name.to_string()));
        }

        let mut templates = self.templates.write();
        let mut orphans = self.orphans.write();
        let metadata = match templates.remove(name) {
            Some(removed) => {
                if let Some(dir) = &self.dir {
                    if let Err(e) = write_sidecar(dir, &templates, &orphans) {
                        templates.insert(name.to_string(), removed);
                        return Err(e);
                    }
                }
                removed.metadata.clone()
            }
            None => {
                let orphan = orphans
                    .remove(name)
                    .ok_or_else(|| FacemojiError::TemplateNotFound(name.to_string()))?;
                if let Some(dir) = &self.dir {
                    if let Err(e) = write_sidecar(dir, &templates, &orphans) {
                        orphans.insert(name.to_string(), orphan);
                        return Err(e);
                    }
                }
                Some(orphan)
            }
        };

        if let (Some(dir), Some(metadata)) = (&self.dir, &metadata) {
            let path = dir.join(&metadata.file);
            if path.exists() {
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "could not remove template image");
                }
            }
        }

        info!(style = name, "custom template removed");
        Ok(())
    }

    /// Every registered style, sorted by name.
    pub fn list(&self) -> Vec<TemplateSummary> {
        let templates = self.templates.read();
        let mut summaries: Vec<TemplateSummary> = templates
            .values()
            .map(|t| TemplateSummary {
                name: t.name.clone(),
                display_name: t
                    .metadata
                    .as_ref()
                    .map(|m| m.display_name.clone())
                    .unwrap_or_else(|| t.name.clone()),
                builtin: t.is_builtin(),
                width: t.image.width(),
                height: t.image.height(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }
}

/// Template names are 1-32 characters from `a-z`, `0-9`, `-` and `_`.
pub fn validate_name(name: &str) -> Result<(), FacemojiError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(FacemojiError::InvalidTemplateName(name.to_string()))
    }
}

fn load_rgba(path: &Path) -> Result<RgbaImage, FacemojiError> {
    let bytes = std::fs::read(path)?;
    Ok(decode_image(&bytes)?.to_rgba8())
}

fn read_sidecar(dir: &Path) -> Result<BTreeMap<String, TemplateMetadata>, FacemojiError> {
    let path = dir.join(SIDECAR_FILE);
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let contents = std::fs::read_to_string(&path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Rewrite the sidecar from the custom entries of `templates` plus the
/// unloadable `orphans`. The new file is written beside the old one and
/// renamed over it.
fn write_sidecar(
    dir: &Path,
    templates: &HashMap<String, Arc<StyleTemplate>>,
    orphans: &BTreeMap<String, TemplateMetadata>,
) -> Result<(), FacemojiError> {
    let entries: BTreeMap<&str, &TemplateMetadata> = templates
        .iter()
        .filter_map(|(name, t)| t.metadata.as_ref().map(|m| (name.as_str(), m)))
        .chain(orphans.iter().map(|(name, m)| (name.as_str(), m)))
        .collect();
    let json = serde_json::to_string_pretty(&entries)?;

    let mut staged = tempfile::NamedTempFile::new_in(dir)?;
    staged.write_all(json.as_bytes())?;
    staged
        .persist(dir.join(SIDECAR_FILE))
        .map_err(|e| FacemojiError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::tempdir;

    fn swatch(value: u8) -> RgbaImage {
        RgbaImage::from_pixel(16, 12, Rgba([value, value, value, 255]))
    }

    #[test]
    fn names_are_validated() {
        assert!(validate_name("cat_2-b").is_ok());
        let too_long = "x".repeat(33);
        for bad in ["", "Cat", "a b", "../x", too_long.as_str()] {
            assert!(
                matches!(validate_name(bad), Err(FacemojiError::InvalidTemplateName(_))),
                "{bad:?} accepted"
            );
        }
    }

    #[test]
    fn put_get_delete_in_memory() {
        let registry = TemplateRegistry::in_memory();
        registry.put("cat", swatch(9), TemplateInfo::default()).unwrap();
        let cat = registry.get("cat").unwrap();
        assert_eq!(cat.image.dimensions(), (16, 12));
        assert!(!cat.is_builtin());
        assert_eq!(cat.metadata.as_ref().unwrap().display_name, "cat");

        assert!(matches!(
            registry.put("cat", swatch(1), TemplateInfo::default()),
            Err(FacemojiError::TemplateExists(_))
        ));

        registry.delete("cat").unwrap();
        assert!(registry.get("cat").is_none());
        assert!(matches!(
            registry.delete("cat"),
            Err(FacemojiError::TemplateNotFound(_))
        ));
    }

    #[test]
    fn builtin_names_are_reserved() {
        let registry = TemplateRegistry::in_memory();
        assert!(matches!(
            registry.put("panda", swatch(1), TemplateInfo::default()),
            Err(FacemojiError::TemplateExists(_))
        ));
        assert!(matches!(
            registry.delete("dragon"),
            Err(FacemojiError::BuiltinTemplate(_))
        ));
    }

    #[test]
    fn builtins_load_from_disk_and_missing_ones_are_skipped() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("panda_template.png"),
            encode_png(&swatch(200)).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("mushroom_template.png"), b"garbage").unwrap();

        let registry = TemplateRegistry::open(dir.path()).unwrap();
        let panda = registry.get("panda").unwrap();
        assert!(panda.is_builtin());
        assert_eq!(panda.image.get_pixel(0, 0).0, [200, 200, 200, 255]);
        assert!(registry.get("mushroom").is_none());
        assert!(registry.get("dragon").is_none());
    }

    #[test]
    fn custom_templates_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let registry = TemplateRegistry::open(dir.path()).unwrap();
            registry
                .put(
                    "robot",
                    swatch(42),
                    TemplateInfo {
                        display_name: "Robot".into(),
                        description: "shiny".into(),
                    },
                )
                .unwrap();
        }
        assert!(dir.path().join("custom_robot.png").exists());
        assert!(dir.path().join(SIDECAR_FILE).exists());

        let reopened = TemplateRegistry::open(dir.path()).unwrap();
        let robot = reopened.get("robot").unwrap();
        assert_eq!(robot.image, swatch(42));
        let metadata = robot.metadata.as_ref().unwrap();
        assert_eq!(metadata.display_name, "Robot");
        assert_eq!(metadata.description, "shiny");
        assert_eq!(metadata.file, "custom_robot.png");

        reopened.delete("robot").unwrap();
        assert!(!dir.path().join("custom_robot.png").exists());
        let again = TemplateRegistry::open(dir.path()).unwrap();
        assert!(again.get("robot").is_none());
    }

    #[test]
    fn sidecar_entry_without_image_can_be_deleted() {
        let dir = tempdir().unwrap();
        {
            let registry = TemplateRegistry::open(dir.path()).unwrap();
            registry.put("robot", swatch(42), TemplateInfo::default()).unwrap();
            registry.put("ghost", swatch(7), TemplateInfo::default()).unwrap();
        }
        std::fs::remove_file(dir.path().join("custom_robot.png")).unwrap();

        let registry = TemplateRegistry::open(dir.path()).unwrap();
        assert!(registry.get("robot").is_none());
        assert!(registry.get("ghost").is_some());

        // Unrelated updates keep the entry in the sidecar.
        registry.delete("ghost").unwrap();
        let sidecar = read_sidecar(dir.path()).unwrap();
        assert!(sidecar.contains_key("robot"));
        assert!(!sidecar.contains_key("ghost"));

        registry.delete("robot").unwrap();
        assert!(read_sidecar(dir.path()).unwrap().is_empty());
        assert!(matches!(
            registry.delete("robot"),
            Err(FacemojiError::TemplateNotFound(_))
        ));
    }

    #[test]
    fn list_is_sorted_and_flags_builtins() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("dragon_template.png"),
            encode_png(&swatch(5)).unwrap(),
        )
        .unwrap();
        let registry = TemplateRegistry::open(dir.path()).unwrap();
        registry.put("alpha", swatch(1), TemplateInfo::default()).unwrap();

        let list = registry.list();
        let names: Vec<&str> = list.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["alpha", "dragon"]);
        assert!(!list[0].builtin);
        assert!(list[1].builtin);
        assert_eq!((list[1].width, list[1].height), (16, 12));
    }

    #[test]
    fn concurrent_readers_see_consistent_state() {
        let registry = Arc::new(TemplateRegistry::in_memory());
        registry.put("base", swatch(3), TemplateInfo::default()).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let name = format!("style-{i}");
                    registry.put(&name, swatch(i as u8), TemplateInfo::default()).unwrap();
                    assert!(registry.get("base").is_some());
                    assert!(registry.get(&name).is_some());
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.list().len(), 5);
    }
}
