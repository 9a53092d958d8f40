use url::Url;

/// Generated paths are built on this origin, then cut down to the path.
const PATH_ORIGIN: &str = "http://localhost/";

/// Every address a visible entry can be reached at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Links {
    pub view: String,
    pub raw: String,
    pub json: String,
    pub structure: String,
    pub contents: String,
    pub external_raw: String,
    pub external_structure: String,
    pub external_contents: String,
}

impl Links {
    pub fn new(project_id: &str, relative_path: &str, url_base: &str) -> Self {
        let raw = endpoint('f', project_id, relative_path);
        let structure = endpoint('s', project_id, relative_path);
        let contents = endpoint('c', project_id, relative_path);

        Self {
            view: endpoint('v', project_id, relative_path),
            json: endpoint('j', project_id, relative_path),
            external_raw: external_url(url_base, &raw),
            external_structure: external_url(url_base, &structure),
            external_contents: external_url(url_base, &contents),
            raw,
            structure,
            contents,
        }
    }
}

pub fn project_link(project_id: &str) -> String {
    encoded_path(["p", project_id])
}

fn endpoint(view: char, project_id: &str, relative_path: &str) -> String {
    let view = view.to_string();
    let segments = [view.as_str(), project_id]
        .into_iter()
        .chain(relative_path.trim_start_matches('/').split('/'));
    encoded_path(segments)
}

/// Percent-encodes each segment and joins them into an absolute path.
/// An empty last segment leaves a trailing `/`.
fn encoded_path<'s>(segments: impl IntoIterator<Item = &'s str>) -> String {
    let Ok(mut url) = Url::parse(PATH_ORIGIN) else {
        return String::from("/");
    };
    if let Ok(mut path) = url.path_segments_mut() {
        path.clear().extend(segments);
    }
    url.path().to_string()
}

/// Joins a project URL base with a server path, collapsing repeated `/`
/// in the path while keeping the scheme's `//`.
pub fn external_url(base: &str, path: &str) -> String {
    let joined = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    match Url::parse(&joined) {
        Ok(mut url) => {
            let collapsed = collapse_slashes(url.path());
            url.set_path(&collapsed);
            url.to_string()
        }
        Err(_) => collapse_slashes(&joined),
    }
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for ch in path.chars() {
        if ch == '/' && out.ends_with('/') {
            continue;
        }
        out.push(ch);
    }
    out
}
