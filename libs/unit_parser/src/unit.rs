//! In-memory model of a unit file.
use crate::error::*;
use crate::parser::{logical_lines, parse_line, Line};
use snafu::ResultExt;
use std::fmt;
use std::path::{Path, PathBuf};

/// A single `key=value` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    key: String,
    value: String,
}

impl Entry {
    ///
    pub fn new(key: &str, value: &str) -> Self {
        Entry {
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    ///
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The raw value: continuation joined, quoting preserved.
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// One `[Name]` block and its entries in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    name: String,
    entries: Vec<Entry>,
}

impl Section {
    ///
    pub fn new(name: &str) -> Self {
        Section {
            name: name.to_string(),
            entries: Vec::new(),
        }
    }

    ///
    pub fn name(&self) -> &str {
        &self.name
    }

    ///
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// append an entry, existing entries with the same key are kept
    pub fn push(&mut self, key: &str, value: &str) {
        self.entries.push(Entry::new(key, value));
    }
}

/// A parsed unit file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitFile {
    path: Option<PathBuf>,
    sections: Vec<Section>,
}

impl UnitFile {
    ///
    pub fn new() -> Self {
        UnitFile::default()
    }

    /// Parse unit file text.
    pub fn parse(input: &str) -> Result<Self> {
        let mut unit = UnitFile::new();

        for line in logical_lines(input).iter() {
            match parse_line(line)? {
                Line::Blank => {}
                Line::Section(name) => unit.sections.push(Section::new(name)),
                Line::Entry(key, value) => match unit.sections.last_mut() {
                    Some(section) => section.push(key, value),
                    None => {
                        return Err(Error::EntryOutsideSection {
                            line: line.number,
                            key: key.to_string(),
                        })
                    }
                },
            }
        }

        Ok(unit)
    }

    /// Read and parse the unit file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        log::debug!("Loading unit file {:?}", path);
        let content = std::fs::read_to_string(path).context(ReadUnitSnafu {
            path: path.to_path_buf(),
        })?;

        let mut unit = UnitFile::parse(&content)?;
        unit.path = Some(path.to_path_buf());
        Ok(unit)
    }

    /// The file this unit was loaded from, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    ///
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    ///
    pub fn has_section(&self, name: &str) -> bool {
        self.sections.iter().any(|s| s.name == name)
    }

    /// All entries of every section called `name`, in file order.
    pub fn entries<'a, 'n>(&'a self, name: &'n str) -> impl Iterator<Item = &'a Entry> + use<'a, 'n> {
        self.sections
            .iter()
            .filter(move |s| s.name == name)
            .flat_map(|s| s.entries.iter())
    }

    /// Every raw value of `key` in section `section`, in order.
    pub fn lookup_all(&self, section: &str, key: &str) -> Vec<&str> {
        self.entries(section)
            .filter(|e| e.key == key)
            .map(|e| e.value.as_str())
            .collect()
    }

    /// The last value of `key`, which is the effective one for single-valued keys.
    pub fn lookup_last(&self, section: &str, key: &str) -> Option<&str> {
        self.entries(section)
            .filter(|e| e.key == key)
            .last()
            .map(|e| e.value.as_str())
    }

    /// The first section called `name`, created at the end if missing.
    pub fn section_mut(&mut self, name: &str) -> &mut Section {
        let idx = match self.sections.iter().position(|s| s.name == name) {
            Some(idx) => idx,
            None => {
                self.sections.push(Section::new(name));
                self.sections.len() - 1
            }
        };
        &mut self.sections[idx]
    }
}

impl fmt::Display for UnitFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, section) in self.sections.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            writeln!(f, "[{}]", section.name)?;
            for entry in section.entries.iter() {
                writeln!(f, "{}={}", entry.key, entry.value)?;
            }
        }
        Ok(())
    }
}
