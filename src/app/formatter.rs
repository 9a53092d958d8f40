use crate::app::error::ServeError;
use crate::app::models::{TreeNode, WalkEvent};
use crate::app::scanner::Scanner;
use serde::Serialize;
use std::fs;

const CONTENTS_SEPARATOR: &str = "---------------";

#[derive(Serialize)]
struct FileLines<'a> {
    file: &'a str,
    path: String,
    data: Vec<Line<'a>>,
}

#[derive(Serialize)]
struct Line<'a> {
    line: usize,
    content: &'a str,
}

pub struct OutputGenerator;

impl OutputGenerator {
    /// One line per visible node, two spaces of indent per level.
    pub fn generate_structure(walk: impl Iterator<Item = WalkEvent>) -> String {
        let mut output = String::new();

        for event in walk {
            match event {
                WalkEvent::Node(TreeNode::Directory {
                    relative_path,
                    depth,
                    ..
                }) => {
                    output.push_str(&format!("{}[/{}]\n", indent(depth), relative_path));
                }
                WalkEvent::Node(TreeNode::File {
                    relative_path,
                    depth,
                    ..
                }) => {
                    output.push_str(&format!("{}/{}\n", indent(depth), relative_path));
                }
                WalkEvent::Unreadable { depth, error, .. } => {
                    output.push_str(&format!(
                        "{}Error reading directory: {}\n",
                        indent(depth),
                        error
                    ));
                }
                WalkEvent::Leave => {}
            }
        }

        output
    }

    /// Concatenates every visible file under a header. Any read failure
    /// discards the partial body.
    pub fn generate_contents(
        scanner: &Scanner,
        walk: impl Iterator<Item = WalkEvent>,
    ) -> Result<Vec<u8>, ServeError> {
        let mut output = Vec::new();

        for event in walk {
            match event {
                WalkEvent::Node(TreeNode::File { relative_path, .. }) => {
                    let content = fs::read(scanner.resolve(&relative_path))
                        .map_err(|e| ServeError::path_read(&relative_path, e))?;
                    output.extend_from_slice(
                        format!("{}\nFile: /{}:\n\n", CONTENTS_SEPARATOR, relative_path).as_bytes(),
                    );
                    output.extend_from_slice(&content);
                    output.extend_from_slice(b"\n\n");
                }
                WalkEvent::Unreadable {
                    relative_path,
                    error,
                    ..
                } => return Err(ServeError::path_read(&relative_path, error)),
                WalkEvent::Node(TreeNode::Directory { .. }) | WalkEvent::Leave => {}
            }
        }

        Ok(output)
    }

    /// `{file, path, data: [{line, content}]}` with 1-based line numbers.
    pub fn generate_json(relative_path: &str, content: &[u8]) -> Result<Vec<u8>, ServeError> {
        let text = String::from_utf8_lossy(content);
        let file = relative_path.rsplit('/').next().unwrap_or_default();

        let document = FileLines {
            file,
            path: format!("/{}", relative_path),
            data: text
                .split('\n')
                .enumerate()
                .map(|(i, content)| Line {
                    line: i + 1,
                    content,
                })
                .collect(),
        };

        let mut body = serde_json::to_vec(&document)?;
        body.push(b'\n');
        Ok(body)
    }
}

fn indent(depth: usize) -> String {
    "  ".repeat(depth)
}
