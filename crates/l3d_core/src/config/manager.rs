//! Settings file handling.
//!
//! The file is one TOML table per [`ConfigSection`], each preceded by a
//! comment line. Writes go through [`atomic_write`]. `update_section`
//! rewrites a single table in place so hand edits elsewhere survive.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use toml_edit::{DocumentMut, Item};

use super::settings::{ConfigSection, Settings};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Settings file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Cannot access settings file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid settings in {}: {source}", .path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Settings file {} is not valid TOML: {source}", .path.display())]
    Syntax {
        path: PathBuf,
        #[source]
        source: toml_edit::TomlError,
    },

    #[error("Cannot serialize [{section}] settings: {source}")]
    Serialize {
        section: &'static str,
        #[source]
        source: toml::ser::Error,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

pub struct ConfigManager {
    path: PathBuf,
    settings: Settings,
}

impl ConfigManager {
    /// Nothing is read until `load` or `load_or_create`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            settings: Settings::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// In-memory only until `save` or `update_section`.
    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn load(&mut self) -> ConfigResult<()> {
        if !self.path.exists() {
            return Err(ConfigError::NotFound(self.path.clone()));
        }
        let content = self.read()?;
        self.settings = toml::from_str(&content).map_err(|source| ConfigError::Invalid {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }

    /// Load the file, writing defaults first if it does not exist.
    ///
    /// A file with unknown tables or keys missing from a known table is
    /// rewritten in full.
    pub fn load_or_create(&mut self) -> ConfigResult<()> {
        if !self.path.exists() {
            self.settings = Settings::default();
            self.save()?;
            tracing::info!("[Config] Wrote default settings to {}", self.path.display());
            return Ok(());
        }

        let content = self.read()?;
        self.settings = toml::from_str(&content).map_err(|source| ConfigError::Invalid {
            path: self.path.clone(),
            source,
        })?;
        let doc = self.parse(&content)?;

        let stale = stale_tables(&doc, &self.settings)?;
        if !stale.is_empty() {
            tracing::debug!(
                "[Config] Rewriting {} ({})",
                self.path.display(),
                stale.join(", ")
            );
            self.save()?;
        }
        Ok(())
    }

    pub fn save(&self) -> ConfigResult<()> {
        let mut out = String::from("# Label3D settings\n\n");
        for section in ConfigSection::ALL {
            out.push_str(&format!("# {}\n[{}]\n", section.description(), section.table_name()));
            out.push_str(&section_toml(&self.settings, section)?);
            out.push('\n');
        }
        self.write(&out)
    }

    /// Replace one table on disk with the in-memory values.
    pub fn update_section(&mut self, section: ConfigSection) -> ConfigResult<()> {
        let mut doc = if self.path.exists() {
            let content = self.read()?;
            self.parse(&content)?
        } else {
            DocumentMut::new()
        };

        let fresh = self.parse(&section_toml(&self.settings, section)?)?;
        let mut table = fresh.as_table().clone();
        // Keep the comment already above the table, if any
        if let Some(existing) = doc.get(section.table_name()).and_then(Item::as_table) {
            *table.decor_mut() = existing.decor().clone();
        } else {
            table
                .decor_mut()
                .set_prefix(format!("\n# {}\n", section.description()));
        }
        doc[section.table_name()] = Item::Table(table);

        self.write(&doc.to_string())
    }

    /// Record where projects were last opened or saved.
    pub fn remember_project_dir(&mut self, dir: &Path) -> ConfigResult<()> {
        let dir = dir.to_string_lossy().into_owned();
        if self.settings.paths.last_project_dir == dir {
            return Ok(());
        }
        self.settings.paths.last_project_dir = dir;
        self.update_section(ConfigSection::Paths)
    }

    fn read(&self) -> ConfigResult<String> {
        fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn parse(&self, content: &str) -> ConfigResult<DocumentMut> {
        content.parse().map_err(|source| ConfigError::Syntax {
            path: self.path.clone(),
            source,
        })
    }

    fn write(&self, content: &str) -> ConfigResult<()> {
        atomic_write(&self.path, content).map_err(|source| ConfigError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

fn section_value(settings: &Settings, section: ConfigSection) -> Result<toml::Table, toml::ser::Error> {
    match section {
        ConfigSection::Paths => toml::Table::try_from(&settings.paths),
        ConfigSection::Logging => toml::Table::try_from(&settings.logging),
        ConfigSection::Calibration => toml::Table::try_from(&settings.calibration),
        ConfigSection::Sync => toml::Table::try_from(&settings.sync),
    }
}

fn section_toml(settings: &Settings, section: ConfigSection) -> ConfigResult<String> {
    let table = section_value(settings, section).map_err(|source| ConfigError::Serialize {
        section: section.table_name(),
        source,
    })?;
    toml::to_string(&table).map_err(|source| ConfigError::Serialize {
        section: section.table_name(),
        source,
    })
}

/// Tables that need rewriting: unknown ones, and known ones whose key set
/// differs from what the settings serialize to.
fn stale_tables(doc: &DocumentMut, settings: &Settings) -> ConfigResult<Vec<String>> {
    let mut stale: Vec<String> = doc
        .iter()
        .map(|(key, _)| key)
        .filter(|key| ConfigSection::ALL.iter().all(|s| s.table_name() != *key))
        .map(|key| format!("unknown [{}]", key))
        .collect();

    for section in ConfigSection::ALL {
        let expected = section_value(settings, section).map_err(|source| ConfigError::Serialize {
            section: section.table_name(),
            source,
        })?;
        let present = doc.get(section.table_name()).and_then(Item::as_table);
        let complete = present.is_some_and(|t| {
            t.len() == expected.len() && expected.keys().all(|k| t.contains_key(k))
        });
        if !complete {
            stale.push(format!("incomplete [{}]", section.table_name()));
        }
    }
    Ok(stale)
}

/// Write `content` next to `path` and rename it into place. Missing parent
/// directories are created.
pub fn atomic_write(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut staging = path.as_os_str().to_os_string();
    staging.push(".partial");
    let staging = PathBuf::from(staging);

    let mut file = fs::File::create(&staging)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    drop(file);

    fs::rename(&staging, path)
}
