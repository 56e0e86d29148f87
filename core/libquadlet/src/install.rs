// Copyright (c) 2022 Huawei Technologies Co.,Ltd. All rights reserved.
//
// sysMaster is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan
// PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//         http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY
// KIND, EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO
// NON-INFRINGEMENT, MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Install directive extraction: turns the `[Install]` section of a unit
//! into a normalized [`InstallSpec`].
use crate::error::*;
use basic::unit_name::unit_name_is_valid;
use std::iter::Peekable;
use std::str::Chars;
use unit_parser::prelude::UnitFile;

/// The section holding the install directives.
pub const INSTALL_SECTION: &str = "Install";

/// The three dependency relations a unit can be installed into.
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug)]
pub enum Relation {
    /// `WantedBy=`, links below `<target>.wants/`
    Wants,
    /// `RequiredBy=`, links below `<target>.requires/`
    Requires,
    /// `UpheldBy=`, links below `<target>.upholds/`
    Upholds,
}

impl Relation {
    /// In the fixed order links are planned in.
    pub fn iterator() -> impl Iterator<Item = Relation> {
        [Relation::Wants, Relation::Requires, Relation::Upholds]
            .iter()
            .copied()
    }

    /// the `[Install]` key declaring this relation
    pub fn key(&self) -> &'static str {
        match self {
            Relation::Wants => "WantedBy",
            Relation::Requires => "RequiredBy",
            Relation::Upholds => "UpheldBy",
        }
    }

    /// suffix of the relation subdirectory, e.g. `.wants`
    pub fn dir_suffix(&self) -> &'static str {
        match self {
            Relation::Wants => ".wants",
            Relation::Requires => ".requires",
            Relation::Upholds => ".upholds",
        }
    }
}

const ALIAS_KEY: &str = "Alias";

#[derive(Clone, Copy)]
enum Directive {
    Alias,
    Relation(Relation),
}

impl Directive {
    fn from_key(key: &str) -> Option<Directive> {
        if key == ALIAS_KEY {
            return Some(Directive::Alias);
        }
        Relation::iterator()
            .find(|r| r.key() == key)
            .map(Directive::Relation)
    }
}

/// Normalized install semantics of one source unit. Every list keeps the
/// order of first appearance and holds no duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSpec {
    aliases: Vec<String>,
    wanted_by: Vec<String>,
    required_by: Vec<String>,
    upheld_by: Vec<String>,
}

fn push_unique(list: &mut Vec<String>, name: String) {
    if !list.contains(&name) {
        list.push(name);
    }
}

impl InstallSpec {
    /// Extract from the `[Install]` section(s) of `unit`. A unit without
    /// that section yields an empty spec.
    pub fn from_unit(unit: &UnitFile) -> Result<Self> {
        InstallSpec::from_entries(
            unit.entries(INSTALL_SECTION)
                .map(|entry| (entry.key(), entry.value())),
        )
    }

    /// Extract from raw `(key, value)` pairs in file order.
    pub fn from_entries<'a, I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut spec = InstallSpec::default();

        for (key, raw) in entries {
            let directive = match Directive::from_key(key) {
                Some(d) => d,
                None => {
                    log::debug!("Ignoring [{}] key {}", INSTALL_SECTION, key);
                    continue;
                }
            };

            let malformed = |reason: String| Error::MalformedInstallDirective {
                key: key.to_string(),
                value: raw.to_string(),
                reason,
            };

            let words = split_words(raw).map_err(|r| malformed(r.to_string()))?;
            for word in words {
                let name = word.trim();
                if name.is_empty() {
                    return Err(malformed("empty unit name".to_string()));
                }
                if name == "/" {
                    return Err(malformed("bare path separator".to_string()));
                }

                match directive {
                    Directive::Alias => {
                        /* the directory part is judged by the planner */
                        let file_name = name.rsplit('/').next().unwrap_or(name);
                        if !unit_name_is_valid(file_name) {
                            return Err(malformed(format!(
                                "'{}' is not a valid unit name",
                                name
                            )));
                        }
                        push_unique(&mut spec.aliases, name.to_string());
                    }
                    Directive::Relation(relation) => {
                        if name.contains('/') {
                            return Err(malformed(format!(
                                "'{}' must be a plain unit name",
                                name
                            )));
                        }
                        if !unit_name_is_valid(name) {
                            return Err(malformed(format!(
                                "'{}' is not a valid unit name",
                                name
                            )));
                        }
                        push_unique(spec.relation_mut(relation), name.to_string());
                    }
                }
            }
        }

        Ok(spec)
    }

    /// Alias names, possibly containing directories.
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Target units of `relation`.
    pub fn relation(&self, relation: Relation) -> &[String] {
        match relation {
            Relation::Wants => &self.wanted_by,
            Relation::Requires => &self.required_by,
            Relation::Upholds => &self.upheld_by,
        }
    }

    fn relation_mut(&mut self, relation: Relation) -> &mut Vec<String> {
        match relation {
            Relation::Wants => &mut self.wanted_by,
            Relation::Requires => &mut self.required_by,
            Relation::Upholds => &mut self.upheld_by,
        }
    }

    /// true if installing the unit has no side effects at all
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty() && Relation::iterator().all(|r| self.relation(r).is_empty())
    }
}

fn unescape(c: char, chars: &mut Peekable<Chars>) -> std::result::Result<char, &'static str> {
    let r = match c {
        '\\' => '\\',
        '"' => '"',
        '\'' => '\'',
        'n' => '\n',
        't' => '\t',
        's' => ' ',
        'x' => {
            let hi = chars.next().and_then(|h| h.to_digit(16));
            let lo = chars.next().and_then(|l| l.to_digit(16));
            match (hi, lo) {
                (Some(hi), Some(lo)) if hi < 8 => char::from((hi * 16 + lo) as u8),
                _ => return Err("invalid \\x escape"),
            }
        }
        _ => return Err("invalid escape sequence"),
    };
    Ok(r)
}

/// Split a raw directive value into words the way systemd does: ASCII
/// whitespace separates, single and double quotes group (also in the
/// middle of a word) and C-style escapes are decoded.
pub fn split_words(raw: &str) -> std::result::Result<Vec<String>, &'static str> {
    let mut words = Vec::new();
    let mut chars = raw.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_ascii_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut word = String::new();
        let mut quote: Option<char> = None;
        while let Some(c) = chars.next() {
            match (quote, c) {
                (None, c) if c.is_ascii_whitespace() => break,
                (None, '"') | (None, '\'') => quote = Some(c),
                (Some(q), c) if c == q => quote = None,
                (_, '\\') => {
                    let escaped = chars.next().ok_or("trailing backslash")?;
                    word.push(unescape(escaped, &mut chars)?);
                }
                (_, c) => word.push(c),
            }
        }

        if quote.is_some() {
            return Err("unterminated quote");
        }
        words.push(word);
    }

    Ok(words)
}
