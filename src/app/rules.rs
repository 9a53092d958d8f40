use serde::{Deserialize, Deserializer};

/// Marker that turns a folder rule into a name match anywhere in the tree,
/// and that lifts every restriction when listed among inclusive extensions.
pub const WILDCARD: &str = "*";

/// Rule lists are written either as `"go,md"` or as `["go", "md"]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawRuleList {
    Joined(String),
    Items(Vec<String>),
}

impl RawRuleList {
    fn into_entries(self) -> Vec<String> {
        match self {
            RawRuleList::Joined(joined) if joined.is_empty() => Vec::new(),
            RawRuleList::Joined(joined) => joined.split(',').map(|e| e.trim().to_string()).collect(),
            RawRuleList::Items(items) => items.into_iter().map(|e| e.trim().to_string()).collect(),
        }
    }
}

/// An ordered list of extensions or file names.
///
/// Empty entries are kept: `"txt,"` is the only way to name the
/// extension-less case in an exclusive list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleList(Vec<String>);

impl RuleList {
    /// Splits a comma-joined list the same way config files are read.
    pub fn parse(joined: &str) -> Self {
        Self(RawRuleList::Joined(joined.to_string()).into_entries())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.0.iter().any(|entry| entry == value)
    }
}

impl<'de> Deserialize<'de> for RuleList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawRuleList::deserialize(deserializer).map(|raw| Self(raw.into_entries()))
    }
}

/// One folder exclusion, decided once when the rule is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderRule {
    /// Matches the directory at exactly this relative path.
    ExactPath(String),
    /// Matches every directory with this name, at any depth.
    AnyNamed(String),
}

impl FolderRule {
    pub fn parse(entry: &str) -> Self {
        match entry.strip_prefix(WILDCARD) {
            Some(name) => FolderRule::AnyNamed(name.trim_matches('/').to_string()),
            None => FolderRule::ExactPath(entry.trim_matches('/').to_string()),
        }
    }

    pub fn matches(&self, name: &str, relative_path: &str) -> bool {
        match self {
            FolderRule::AnyNamed(rule_name) => rule_name == name,
            FolderRule::ExactPath(path) => path == relative_path.trim_start_matches('/'),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderRules(Vec<FolderRule>);

impl FolderRules {
    pub fn parse(joined: &str) -> Self {
        Self::from_entries(RawRuleList::Joined(joined.to_string()).into_entries())
    }

    fn from_entries(entries: Vec<String>) -> Self {
        Self(entries.iter().map(|e| FolderRule::parse(e)).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FolderRule> {
        self.0.iter()
    }
}

impl<'de> Deserialize<'de> for FolderRules {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawRuleList::deserialize(deserializer).map(|raw| Self::from_entries(raw.into_entries()))
    }
}

/// The rules in force for one request, borrowed from the loaded configuration.
#[derive(Debug, Clone, Copy)]
pub struct RuleSet<'a> {
    pub inclusive_extensions: &'a RuleList,
    pub exclusive_extensions: &'a RuleList,
    pub exclusive_folders: &'a FolderRules,
    pub exclusive_files: &'a RuleList,
}

impl RuleSet<'_> {
    pub fn extension_allowed(&self, ext: &str) -> bool {
        extension_allowed(ext, self.inclusive_extensions, self.exclusive_extensions)
    }

    pub fn file_excluded(&self, name: &str) -> bool {
        file_excluded(name, self.exclusive_files)
    }

    pub fn folder_excluded(&self, name: &str, relative_path: &str) -> bool {
        folder_excluded(name, relative_path, self.exclusive_folders)
    }
}

pub fn extension_allowed(ext: &str, inclusive: &RuleList, exclusive: &RuleList) -> bool {
    let included = inclusive.is_empty() || inclusive.contains(WILDCARD) || inclusive.contains(ext);
    let not_excluded = exclusive.is_empty() || !exclusive.contains(ext);
    included && not_excluded
}

pub fn file_excluded(name: &str, exclusive_files: &RuleList) -> bool {
    exclusive_files.contains(name)
}

pub fn folder_excluded(name: &str, relative_path: &str, exclusive_folders: &FolderRules) -> bool {
    exclusive_folders.iter().any(|rule| rule.matches(name, relative_path))
}

/// Everything after the last `.` of a file name, or `""` when there is none.
pub fn extension_of(name: &str) -> &str {
    name.rfind('.').map_or("", |dot| &name[dot + 1..])
}
