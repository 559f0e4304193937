use std::fmt;

use regex::Regex;

use crate::error::ProvisionError;

/// Title pattern shared by every SQL object kind: an optional `sid/` prefix and the object name.
pub const SID_QUALIFIED_TITLE: &str = r"^((.*?/)?(.*)?)$";

/// Oracle database names: a letter followed by at most seven name characters.
pub const DATABASE_TITLE: &str = r"^([A-Za-z][A-Za-z0-9_#$]{0,7})$";

/// The stable key correlating a declaration with discovered state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive match against a key reported by the external system.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A pattern plus the capture groups selecting the key (and optionally the sid) from a title.
#[derive(Debug, Clone)]
pub struct TitleRule {
    pattern: Regex,
    key_group: usize,
    sid_group: Option<usize>,
}

impl TitleRule {
    pub fn new(pattern: &str, key_group: usize) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            key_group,
            sid_group: None,
        })
    }

    pub fn with_sid_group(mut self, group: usize) -> Self {
        self.sid_group = Some(group);
        self
    }

    /// `sid/name` titles used by parameters, tablespaces, users and services.
    pub fn sid_qualified() -> Self {
        Self::new(SID_QUALIFIED_TITLE, 3)
            .map(|rule| rule.with_sid_group(2))
            .unwrap_or_else(|e| unreachable!("built-in title pattern is valid: {e}"))
    }

    pub fn database() -> Self {
        Self::new(DATABASE_TITLE, 1)
            .unwrap_or_else(|e| unreachable!("built-in title pattern is valid: {e}"))
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn derive_key(&self, title: &str) -> Result<IdentityKey, ProvisionError> {
        derive_key(title, self)
    }

    /// The sid prefix of the title, if the rule has one and the title carries it.
    pub fn derive_sid(&self, title: &str) -> Option<String> {
        let group = self.sid_group?;
        let captures = self.pattern.captures(title)?;
        let sid = captures.get(group)?.as_str().trim_end_matches('/').trim();
        (!sid.is_empty()).then(|| sid.to_string())
    }
}

/// Apply `rule` to `title` and return its designated capture group as the identity key.
///
/// A title the pattern does not match, or whose key group is absent or empty, is malformed.
pub fn derive_key(title: &str, rule: &TitleRule) -> Result<IdentityKey, ProvisionError> {
    let malformed = || ProvisionError::MalformedTitle {
        title: title.to_string(),
        pattern: rule.pattern().to_string(),
    };

    let captures = rule.pattern.captures(title).ok_or_else(malformed)?;
    let key = captures
        .get(rule.key_group)
        .map(|m| m.as_str().trim())
        .filter(|k| !k.is_empty())
        .ok_or_else(malformed)?;

    Ok(IdentityKey(key.to_string()))
}
