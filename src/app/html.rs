//! HTML pages: the project index, the browsable tree and the file viewer.

use crate::app::config::Registry;
use crate::app::links::{project_link, Links};
use crate::app::models::{ProjectConfig, TreeNode, WalkEvent};

const FONT_AWESOME: &str =
    "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/5.15.3/css/all.min.css";

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Flat list of every registered project.
pub fn render_index(registry: &Registry) -> String {
    let mut page = String::from(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n<title>Projects</title>\n\
         <link rel=\"stylesheet\" href=\"/static/style.css\">\n</head>\n<body>\n",
    );
    for (id, project) in registry.projects() {
        page.push_str(&format!(
            "<a href='{}'>{}</a><br>\n",
            escape_html(&project_link(id)),
            escape_html(&project.project_name)
        ));
    }
    page.push_str("</body>\n</html>\n");
    page
}

/// The browsable tree of one project.
pub fn render_tree(
    project_id: &str,
    project: &ProjectConfig,
    append_timestamp: bool,
    walk: impl Iterator<Item = WalkEvent>,
) -> String {
    let name = escape_html(&project.project_name);
    let root_links = Links::new(project_id, "", &project.project_url);

    let mut page = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>MinFileServer</title>
<link rel="stylesheet" href="/static/style.css">
<link rel="stylesheet" href="{FONT_AWESOME}">
<script>
    var appendTimestamp = {append_timestamp};
</script>
</head>
<body>
<a href="/" class="back-button"><i class="fas fa-arrow-left"></i> Projects</a>
<h1>{name}</h1>
<div class="tree-view">
<ul>
<li class="root-item expanded">
<div class='item'><span>{name}</span>{controls}</div>
<ul>
"#,
        controls = directory_controls(&root_links),
    );

    for event in walk {
        match event {
            WalkEvent::Node(node @ TreeNode::Directory { .. }) => {
                let links = Links::new(project_id, node.relative_path(), &project.project_url);
                page.push_str(&format!(
                    "<li><div class='item'><span>{}</span>{}</div><ul>\n",
                    escape_html(node.name()),
                    directory_controls(&links)
                ));
            }
            WalkEvent::Node(TreeNode::File {
                name,
                relative_path,
                extension,
                ..
            }) => {
                let links = Links::new(project_id, &relative_path, &project.project_url);
                page.push_str(&file_item(&name, &extension, &links));
            }
            WalkEvent::Unreadable { error, .. } => {
                page.push_str(&format!(
                    "<li class='error'>Error reading directory: {}</li>\n",
                    escape_html(&error.to_string())
                ));
            }
            WalkEvent::Leave => page.push_str("</ul></li>\n"),
        }
    }

    page.push_str(
        "</ul></li>\n</ul>\n</div>\n\
         <script src=\"/static/script.js\"></script>\n\
         <script src=\"/static/clipboard.js\"></script>\n\
         </body>\n</html>\n",
    );
    page
}

/// Minimal page wrapping one file's text.
pub fn render_viewer(content: &[u8]) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"UTF-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
         <title>File Content</title>\n</head>\n<body>\n<pre>{}</pre>\n</body>\n</html>\n",
        escape_html(&String::from_utf8_lossy(content))
    )
}

fn directory_controls(links: &Links) -> String {
    format!(
        "\n<a href='{}' target='_blank' class='buttons'><i class='fas fa-sitemap' style='color:orange'></i></a>\
         \n<a href='{}' target='_blank' class='buttons'><i class='fas fa-file-code' style='color:#6495ED'></i></a>\
         \n<button class='copy-button buttons' data-url='{}'><i class='fas fa-copy' style='color:#20B2AA'></i></button>\
         \n<button class='copy-button buttons' data-url='{}'><i class='fas fa-copy' style='color:green'></i></button>\n",
        escape_html(&links.structure),
        escape_html(&links.contents),
        escape_html(&links.external_structure),
        escape_html(&links.external_contents),
    )
}

fn file_item(name: &str, extension: &str, links: &Links) -> String {
    let info = format!("{}: {}", name, links.external_raw);
    format!(
        "<li class='file' data-ext='{ext}'><div class='item'>\
         \n<a href='{view}' target='_blank'>{name}</a>\
         \n<a href='{url}' target='_blank' class='buttons'><i class='fas fa-external-link-alt' style='color:orange'></i></a>\
         \n<button class='copy-button buttons' data-url='{url}'><i class='fas fa-copy' style='color:#20B2AA'></i></button>\
         \n<button class='copy-button-info buttons' data-info='{info}'><i class='fas fa-copy'></i></button>\
         \n<a href='{json}' target='_blank' class='buttons'><i class='fas fa-file-code' style='color:#87CEFA'></i></a>\
         \n</div></li>\n",
        ext = escape_html(extension),
        view = escape_html(&links.view),
        name = escape_html(name),
        url = escape_html(&links.external_raw),
        info = escape_html(&info),
        json = escape_html(&links.json),
    )
}
