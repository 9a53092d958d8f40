use crate::app::models::{TreeNode, WalkEvent};
use crate::app::rules::{extension_of, RuleSet};
use pathdiff::diff_paths;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use walkdir::{DirEntry, FilterEntry, WalkDir};

/// Walks one project root with the rules resolved for a request.
pub struct Scanner<'a> {
    root: PathBuf,
    rules: RuleSet<'a>,
    show_hidden: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(root: impl Into<PathBuf>, rules: RuleSet<'a>, show_hidden: bool) -> Self {
        Self {
            root: root.into(),
            rules,
            show_hidden,
        }
    }

    /// Absolute location of a relative path produced by [`confine`].
    pub fn resolve(&self, relative_path: &str) -> PathBuf {
        if relative_path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative_path)
        }
    }

    /// Starts a depth-first walk below `start`, a path already passed
    /// through [`confine`].
    ///
    /// The start directory is listed eagerly so that failing to read it is
    /// an error for the whole request. Nested directories that cannot be
    /// listed show up as [`WalkEvent::Unreadable`] instead.
    pub fn walk(&self, start: &str) -> io::Result<Walk<'_, 'a>> {
        let start = self.resolve(start);
        fs::read_dir(&start)?;

        let entries = WalkDir::new(start)
            .min_depth(1)
            .follow_links(true)
            .sort_by(dirs_first)
            .into_iter()
            .filter_entry(Box::new(move |entry: &DirEntry| self.admits(entry)) as EntryFilter<'_>);

        Ok(Walk {
            scanner: self,
            entries,
            open: Vec::new(),
            queued: VecDeque::new(),
            announced: None,
        })
    }

    /// Visibility of one entry. A rejected directory is pruned with its
    /// whole subtree.
    fn admits(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();

        if !self.show_hidden && name.starts_with('.') {
            return false;
        }
        if self.rules.file_excluded(&name) {
            return false;
        }

        let file_type = entry.file_type();
        if file_type.is_dir() {
            let relative_path = self.relative_path(entry.path());
            if self.rules.folder_excluded(&name, &relative_path) {
                log::trace!("Pruned /{}", relative_path);
                return false;
            }
            true
        } else {
            // sockets, fifos and devices have no content to serve
            file_type.is_file() && self.rules.extension_allowed(extension_of(&name))
        }
    }

    fn node(&self, entry: &DirEntry) -> TreeNode {
        let name = entry.file_name().to_string_lossy().into_owned();
        let relative_path = self.relative_path(entry.path());
        let depth = entry.depth() - 1;

        if entry.file_type().is_dir() {
            TreeNode::Directory {
                name,
                relative_path,
                depth,
            }
        } else {
            TreeNode::File {
                extension: extension_of(&name).to_string(),
                name,
                relative_path,
                depth,
            }
        }
    }

    fn relative_path(&self, path: &Path) -> String {
        diff_paths(path, &self.root)
            .map(|relative| {
                relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or_default()
    }
}

/// Directories before files, each group ordered by name.
///
/// Sorting sees entries before links are followed, so a link is checked
/// against its target here.
fn dirs_first(a: &DirEntry, b: &DirEntry) -> Ordering {
    is_dir(b)
        .cmp(&is_dir(a))
        .then_with(|| a.file_name().cmp(b.file_name()))
}

fn is_dir(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() || (entry.path_is_symlink() && entry.path().is_dir())
}

/// Normalizes a request path into a root-relative, `/`-separated path.
///
/// Empty and `.` segments are dropped. Returns `None` when the path tries
/// to climb out of the root.
pub fn confine(requested: &str) -> Option<String> {
    let mut segments = Vec::new();
    for segment in requested.split(['/', '\\']) {
        match Path::new(segment).components().next() {
            None | Some(Component::CurDir) => continue,
            Some(Component::Normal(_)) => segments.push(segment),
            _ => return None,
        }
    }
    Some(segments.join("/"))
}

type EntryFilter<'s> = Box<dyn FnMut(&DirEntry) -> bool + 's>;

/// Lazy pre-order sequence of [`WalkEvent`]s.
///
/// `Leave` events are derived from depth: a directory stays open until an
/// entry at its own depth or shallower arrives, or the walk ends.
pub struct Walk<'s, 'a> {
    scanner: &'s Scanner<'a>,
    entries: FilterEntry<walkdir::IntoIter, EntryFilter<'s>>,
    /// Depths of the directories still owed a `Leave`.
    open: Vec<usize>,
    queued: VecDeque<WalkEvent>,
    /// The directory announced last, whose listing may still fail.
    announced: Option<(PathBuf, String)>,
}

impl Walk<'_, '_> {
    fn close_to(&mut self, depth: usize) {
        while self.open.last().is_some_and(|&open| open >= depth) {
            self.open.pop();
            self.queued.push_back(WalkEvent::Leave);
        }
    }
}

impl Iterator for Walk<'_, '_> {
    type Item = WalkEvent;

    fn next(&mut self) -> Option<WalkEvent> {
        while self.queued.is_empty() {
            match self.entries.next() {
                Some(Ok(entry)) => {
                    let node = self.scanner.node(&entry);
                    self.close_to(node.depth());
                    self.announced = match &node {
                        TreeNode::Directory { relative_path, depth, .. } => {
                            self.open.push(*depth);
                            Some((entry.into_path(), relative_path.clone()))
                        }
                        TreeNode::File { .. } => None,
                    };
                    self.queued.push_back(WalkEvent::Node(node));
                }
                Some(Err(error)) => {
                    let depth = error.depth();
                    let path = error.path().map(Path::to_path_buf);
                    let listing_failed = matches!(
                        (&self.announced, &path),
                        (Some((announced, _)), Some(path)) if announced == path
                    );
                    if !listing_failed {
                        // broken links and directory loops are left out
                        log::debug!("Skipped entry: {}", error);
                        continue;
                    }

                    let Some((_, relative_path)) = self.announced.take() else {
                        continue;
                    };
                    log::warn!("Failed to list /{}: {}", relative_path, error);
                    let error = error
                        .into_io_error()
                        .unwrap_or_else(|| io::Error::other("directory loop"));
                    self.queued.push_back(WalkEvent::Unreadable {
                        relative_path,
                        depth,
                        error,
                    });
                }
                None => {
                    self.open.pop()?;
                    return Some(WalkEvent::Leave);
                }
            }
        }
        self.queued.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::rules::{FolderRules, RuleList};
    use tempfile::TempDir;

    struct Rules {
        inclusive: RuleList,
        exclusive: RuleList,
        folders: FolderRules,
        files: RuleList,
    }

    impl Rules {
        fn new(inclusive: &str, exclusive: &str, folders: &str, files: &str) -> Self {
            Self {
                inclusive: RuleList::parse(inclusive),
                exclusive: RuleList::parse(exclusive),
                folders: FolderRules::parse(folders),
                files: RuleList::parse(files),
            }
        }

        fn set(&self) -> RuleSet<'_> {
            RuleSet {
                inclusive_extensions: &self.inclusive,
                exclusive_extensions: &self.exclusive,
                exclusive_folders: &self.folders,
                exclusive_files: &self.files,
            }
        }
    }

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, relative).unwrap();
    }

    fn paths(scanner: &Scanner, start: &str) -> Vec<String> {
        scanner
            .walk(start)
            .unwrap()
            .filter_map(|event| match event {
                WalkEvent::Node(node) => Some(node.relative_path().to_string()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn directories_precede_files_and_both_are_sorted() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "zeta.txt");
        touch(dir.path(), "alpha.txt");
        touch(dir.path(), "src/main.rs");
        touch(dir.path(), "docs/guide.md");

        let rules = Rules::new("", "", "", "");
        let scanner = Scanner::new(dir.path(), rules.set(), false);
        assert_eq!(
            paths(&scanner, ""),
            vec!["docs", "docs/guide.md", "src", "src/main.rs", "alpha.txt", "zeta.txt"]
        );
    }

    #[test]
    fn events_nest_with_leave() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a/b/c.txt");
        touch(dir.path(), "a/d.txt");
        touch(dir.path(), "e.txt");

        let rules = Rules::new("", "", "", "");
        let scanner = Scanner::new(dir.path(), rules.set(), false);
        assert_eq!(
            shape(&scanner, ""),
            vec!["a@0", "a/b@1", "a/b/c.txt@2", "leave", "a/d.txt@1", "leave", "e.txt@0"]
        );
    }

    #[test]
    fn hidden_entries_follow_the_flag() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), ".env");
        touch(dir.path(), ".config/settings.txt");
        touch(dir.path(), "sub/.secret");
        touch(dir.path(), "visible.txt");

        let rules = Rules::new("", "", "", "");
        let hidden_off = Scanner::new(dir.path(), rules.set(), false);
        assert_eq!(paths(&hidden_off, ""), vec!["sub", "visible.txt"]);

        let hidden_on = Scanner::new(dir.path(), rules.set(), true);
        let all = paths(&hidden_on, "");
        assert!(all.contains(&".env".to_string()));
        assert!(all.contains(&".config/settings.txt".to_string()));
        assert!(all.contains(&"sub/.secret".to_string()));
    }

    #[test]
    fn wildcard_folder_rule_prunes_at_every_depth() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "target/debug.bin");
        touch(dir.path(), "crates/core/target/out.bin");
        touch(dir.path(), "crates/core/lib.rs");

        let rules = Rules::new("", "", "*target", "");
        let scanner = Scanner::new(dir.path(), rules.set(), false);
        assert_eq!(paths(&scanner, ""), vec!["crates", "crates/core", "crates/core/lib.rs"]);
    }

    #[test]
    fn exact_folder_rule_keeps_namesakes_elsewhere() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "build/a.o");
        touch(dir.path(), "tools/build/b.o");

        let rules = Rules::new("", "", "build", "");
        let scanner = Scanner::new(dir.path(), rules.set(), false);
        assert_eq!(paths(&scanner, ""), vec!["tools", "tools/build", "tools/build/b.o"]);
    }

    #[test]
    fn file_and_extension_rules_apply() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.go");
        touch(dir.path(), "a.txt");
        touch(dir.path(), "b.md");
        touch(dir.path(), "skip.go");

        let rules = Rules::new("go,md", "md", "", "skip.go");
        let scanner = Scanner::new(dir.path(), rules.set(), false);
        assert_eq!(paths(&scanner, ""), vec!["a.go"]);
    }

    #[test]
    fn file_nodes_carry_their_extension() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.tar.gz");
        touch(dir.path(), "Makefile");

        let rules = Rules::new("", "", "", "");
        let scanner = Scanner::new(dir.path(), rules.set(), false);
        let extensions: Vec<String> = scanner
            .walk("")
            .unwrap()
            .filter_map(|event| match event {
                WalkEvent::Node(TreeNode::File { extension, .. }) => Some(extension),
                _ => None,
            })
            .collect();
        assert_eq!(extensions, vec!["", "gz"]);
    }

    #[test]
    fn walk_from_subdirectory_keeps_root_relative_paths() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "src/app/mod.rs");
        touch(dir.path(), "src/lib.rs");

        let rules = Rules::new("", "", "", "");
        let scanner = Scanner::new(dir.path(), rules.set(), false);
        let nodes: Vec<TreeNode> = scanner
            .walk("src")
            .unwrap()
            .filter_map(|event| match event {
                WalkEvent::Node(node) => Some(node),
                _ => None,
            })
            .collect();
        assert_eq!(nodes[0].relative_path(), "src/app");
        assert_eq!(nodes[0].depth(), 0);
        assert_eq!(nodes[1].relative_path(), "src/app/mod.rs");
        assert_eq!(nodes[1].depth(), 1);
        assert_eq!(nodes[2].relative_path(), "src/lib.rs");
    }

    #[test]
    fn missing_start_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let rules = Rules::new("", "", "", "");
        let scanner = Scanner::new(dir.path(), rules.set(), false);
        assert!(scanner.walk("nowhere").is_err());
    }

    fn shape(scanner: &Scanner, start: &str) -> Vec<String> {
        scanner
            .walk(start)
            .unwrap()
            .map(|event| match event {
                WalkEvent::Node(node) => format!("{}@{}", node.relative_path(), node.depth()),
                WalkEvent::Leave => "leave".to_string(),
                WalkEvent::Unreadable {
                    relative_path,
                    depth,
                    ..
                } => format!("error {}@{}", relative_path, depth),
            })
            .collect()
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_subdirectory_is_reported_and_siblings_continue() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        touch(dir.path(), "locked/inner.txt");
        touch(dir.path(), "open/file.txt");
        let locked = dir.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // permission bits do not bind root
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let rules = Rules::new("", "", "", "");
        let scanner = Scanner::new(dir.path(), rules.set(), false);
        let events = shape(&scanner, "");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(
            events,
            vec!["locked@0", "error locked@1", "leave", "open@0", "open/file.txt@1", "leave"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlinked_directory_is_walked_as_a_directory() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "real/inner.txt");
        touch(dir.path(), "a.txt");
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("zlink")).unwrap();

        let rules = Rules::new("", "", "", "");
        let scanner = Scanner::new(dir.path(), rules.set(), false);
        assert_eq!(
            paths(&scanner, ""),
            vec!["real", "real/inner.txt", "zlink", "zlink/inner.txt", "a.txt"]
        );
    }

    #[cfg(unix)]
    #[test]
    fn broken_links_and_loops_are_left_out() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "sub/kept.txt");
        std::os::unix::fs::symlink(dir.path().join("nowhere"), dir.path().join("dangling")).unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("sub/up")).unwrap();

        let rules = Rules::new("", "", "", "");
        let scanner = Scanner::new(dir.path(), rules.set(), false);
        assert_eq!(shape(&scanner, ""), vec!["sub@0", "sub/kept.txt@1", "leave"]);
    }

    #[test]
    fn start_directory_that_is_a_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.txt");
        let rules = Rules::new("", "", "", "");
        let scanner = Scanner::new(dir.path(), rules.set(), false);
        assert!(scanner.walk("a.txt").is_err());
    }

    #[test]
    fn confine_rejects_escapes() {
        assert_eq!(confine("").as_deref(), Some(""));
        assert_eq!(confine("/src//app/./mod.rs").as_deref(), Some("src/app/mod.rs"));
        assert_eq!(confine("src/"), Some("src".to_string()));
        assert_eq!(confine("../etc/passwd"), None);
        assert_eq!(confine("src/../../etc"), None);
    }
}
