use crate::app::rules::{FolderRules, RuleList};
use serde::{Deserialize, Deserializer};
use std::io;
use std::path::PathBuf;

/// Process-wide defaults, read once from the settings file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    #[serde(deserialize_with = "deserialize_port")]
    pub server_port: Option<u16>,
    pub disable_external_network_browsing: bool,
    pub show_hidden: bool,
    pub time_stamp: bool,
    pub inclusive_extensions: RuleList,
    pub exclusive_extensions: RuleList,
    pub exclusive_folders: FolderRules,
    pub exclusive_files: RuleList,
}

/// One registered project, read once from its config file.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    pub project_name: String,
    pub root_path: PathBuf,
    #[serde(default)]
    pub project_url: String,
    #[serde(default)]
    pub inclusive_extensions: RuleList,
    #[serde(default)]
    pub exclusive_extensions: RuleList,
    #[serde(default)]
    pub exclusive_folders: FolderRules,
    #[serde(default)]
    pub exclusive_files: RuleList,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u16),
    Text(String),
}

/// Ports appear both as `8080` and `"8080"` in settings files.
fn deserialize_port<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u16>, D::Error> {
    match PortValue::deserialize(deserializer)? {
        PortValue::Number(port) => Ok(Some(port)),
        PortValue::Text(text) if text.trim().is_empty() => Ok(None),
        PortValue::Text(text) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid server_port {:?}", text))),
    }
}

/// A visible entry found during a walk.
///
/// `relative_path` uses `/` separators and has no leading separator.
/// Children of the directory the walk started from have depth 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNode {
    Directory {
        name: String,
        relative_path: String,
        depth: usize,
    },
    File {
        name: String,
        relative_path: String,
        /// Everything after the last `.` of the name, possibly empty.
        extension: String,
        depth: usize,
    },
}

impl TreeNode {
    pub fn name(&self) -> &str {
        match self {
            TreeNode::Directory { name, .. } | TreeNode::File { name, .. } => name,
        }
    }

    pub fn relative_path(&self) -> &str {
        match self {
            TreeNode::Directory { relative_path, .. } | TreeNode::File { relative_path, .. } => {
                relative_path
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Directory { depth, .. } | TreeNode::File { depth, .. } => *depth,
        }
    }
}

/// Pre-order walk output. A `Directory` node is followed by its
/// descendants and closed by a matching `Leave`.
#[derive(Debug)]
pub enum WalkEvent {
    Node(TreeNode),
    /// The children of the directory just announced could not be listed.
    Unreadable {
        relative_path: String,
        depth: usize,
        error: io::Error,
    },
    Leave,
}
