//! Command aliases as structured find/replace rules.
//!
//! `= name value` rewrites a leading `name` into `value`. A value of the form
//! `s/pattern/replacement/` (any punctuation delimiter) installs that rule
//! instead, with `$1`/`${name}` capture references in the replacement. A rule
//! is accepted once its pattern compiles and every capture reference in the
//! replacement names a group of that pattern; it need not match the bare name.

use std::collections::BTreeMap;

use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};

use crate::error::{DebugError, DebugResult};

#[derive(Debug, Clone)]
pub struct AliasRule {
    /// The value as the operator typed it.
    definition: String,
    pattern: Regex,
    replacement: String,
    /// Replacement is inserted verbatim, without capture expansion.
    literal: bool,
}

impl AliasRule {
    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn apply(&self, command: &str) -> String {
        if self.literal {
            self.pattern
                .replace(command, NoExpand(&self.replacement))
                .into_owned()
        } else {
            self.pattern
                .replace(command, self.replacement.as_str())
                .into_owned()
        }
    }
}

/// Serializable form, used to carry aliases across a restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasDefinition {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Default, Clone)]
pub struct AliasTable {
    rules: BTreeMap<String, AliasRule>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&AliasRule> {
        self.rules.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AliasRule)> {
        self.rules.iter().map(|(name, rule)| (name.as_str(), rule))
    }

    /// Validate and install an alias. On error the table is unchanged.
    pub fn define(&mut self, name: &str, value: &str) -> DebugResult<()> {
        let rule = compile(name, value)?;
        tracing::debug!(target: "sdb.core", alias = name, value, "alias installed");
        self.rules.insert(name.to_owned(), rule);
        Ok(())
    }

    /// Rewrite `command` if its first word names an alias.
    pub fn expand(&self, command: &str) -> Option<String> {
        let first = command.split_whitespace().next()?;
        let rule = self.rules.get(first)?;
        Some(rule.apply(command))
    }

    pub fn definitions(&self) -> Vec<AliasDefinition> {
        self.rules
            .iter()
            .map(|(name, rule)| AliasDefinition {
                name: name.clone(),
                value: rule.definition.clone(),
            })
            .collect()
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> DebugError {
    DebugError::InvalidAlias {
        name: name.to_owned(),
        reason: reason.into(),
    }
}

fn compile(name: &str, value: &str) -> DebugResult<AliasRule> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(invalid(name, "alias names are single words"));
    }
    let value = value.trim();

    Ok(match parse_substitution(value) {
        Some(parsed) => {
            let (pattern, replacement) = parsed.map_err(|reason| invalid(name, reason))?;
            let pattern = Regex::new(&pattern).map_err(|err| invalid(name, err.to_string()))?;
            check_references(&pattern, &replacement).map_err(|reason| invalid(name, reason))?;
            AliasRule {
                definition: value.to_owned(),
                pattern,
                replacement,
                literal: false,
            }
        }
        None => {
            if value.is_empty() {
                return Err(invalid(name, "empty substitution"));
            }
            let pattern = Regex::new(&format!("^{}", regex::escape(name)))
                .map_err(|err| invalid(name, err.to_string()))?;
            AliasRule {
                definition: value.to_owned(),
                pattern,
                replacement: value.to_owned(),
                literal: true,
            }
        }
    })
}

/// `s<d>pattern<d>replacement<d>` → `Some(Ok((pattern, replacement)))`.
/// Values that do not look like a substitution at all yield `None`.
fn parse_substitution(value: &str) -> Option<Result<(String, String), String>> {
    let mut chars = value.chars();
    if chars.next()? != 's' {
        return None;
    }
    let delim = chars.next()?;
    if delim.is_alphanumeric() || delim.is_whitespace() || delim == '_' {
        return None;
    }

    let mut parts = vec![String::new()];
    let mut escaped = false;
    for ch in chars {
        if escaped {
            if ch != delim {
                parts.last_mut()?.push('\\');
            }
            parts.last_mut()?.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == delim {
            parts.push(String::new());
        } else {
            parts.last_mut()?.push(ch);
        }
    }

    Some(match parts.as_slice() {
        [pattern, replacement, tail] if tail.is_empty() => {
            Ok((pattern.clone(), replacement.clone()))
        }
        [_, _, tail] => Err(format!("unexpected text `{tail}` after substitution")),
        _ => Err(format!("substitution must look like s{delim}pattern{delim}replacement{delim}")),
    })
}

/// Every `$n`, `${n}` and `${name}` in `replacement` must name a capture group.
fn check_references(pattern: &Regex, replacement: &str) -> Result<(), String> {
    // Same name rules as `regex::Captures::expand`: the longest run of word
    // characters, or anything between braces. `$$` is a literal dollar.
    let reference = Regex::new(r"\$(?:\{([^}]*)\}|([A-Za-z0-9_]+))").map_err(|err| err.to_string())?;
    let scanned = replacement.replace("$$", "");
    for caps in reference.captures_iter(&scanned) {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or_default();
        let known = match name.parse::<usize>() {
            Ok(idx) => idx < pattern.captures_len(),
            Err(_) => pattern.capture_names().flatten().any(|group| group == name),
        };
        if !known {
            return Err(format!("replacement refers to missing capture group `{name}`"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_alias_rewrites_the_leading_word() {
        let mut table = AliasTable::new();
        table.define("foo", "bar baz").unwrap();
        assert_eq!(table.expand("foo").as_deref(), Some("bar baz"));
        assert_eq!(table.expand("foo 12").as_deref(), Some("bar baz 12"));
        assert_eq!(table.expand("food"), None);
    }

    #[test]
    fn plain_alias_keeps_dollar_signs_literal() {
        let mut table = AliasTable::new();
        table.define("px", "p $x").unwrap();
        assert_eq!(table.expand("px").as_deref(), Some("p $x"));
    }

    #[test]
    fn substitution_alias_uses_capture_groups() {
        let mut table = AliasTable::new();
        table.define("len", r"s/^len\s+(\S+)/p length($1)/").unwrap();
        assert_eq!(
            table.expand("len $name").as_deref(),
            Some("p length($name)")
        );
    }

    #[test]
    fn substitution_alias_need_not_match_its_bare_name() {
        let mut table = AliasTable::new();
        table.define("show", r"s/^show\s+(?P<what>\S+)/p ${what}/").unwrap();
        assert_eq!(table.expand("show 42").as_deref(), Some("p 42"));
        // Without an argument the rule does not match and the line is unchanged.
        assert_eq!(table.expand("show").as_deref(), Some("show"));
    }

    #[test]
    fn invalid_rules_leave_the_table_unchanged() {
        let mut table = AliasTable::new();
        table.define("ok", "p 1").unwrap();

        for (name, value) in [
            ("bad", "s/(unclosed/x/"),
            ("bad", "s/^bad/$2/"),
            ("bad", "s/^bad (?P<arg>\\S+)/p ${argument}/"),
            ("bad", "s/^bad/x/trailing"),
            ("bad", ""),
            ("two words", "p 1"),
        ] {
            let err = table.define(name, value).unwrap_err();
            assert!(matches!(err, DebugError::InvalidAlias { .. }), "{err}");
        }
        assert_eq!(table.len(), 1);
        assert!(table.get("bad").is_none());
    }
}
