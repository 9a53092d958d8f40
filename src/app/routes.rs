use crate::app::access::check_browsing;
use crate::app::config::{resolve_rules, RuntimeConfig};
use crate::app::error::ServeError;
use crate::app::formatter::OutputGenerator;
use crate::app::html;
use crate::app::models::ProjectConfig;
use crate::app::scanner::{confine, Scanner};
use crate::app::server::{percent_decode, Request, Response};
use std::fs;
use std::path::Path;

/// Views addressed as `/{view}/{project}/{relative path}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileView {
    Viewer,
    Raw,
    Json,
    Structure,
    Contents,
}

impl FileView {
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "v" => Some(FileView::Viewer),
            "f" => Some(FileView::Raw),
            "j" => Some(FileView::Json),
            "s" => Some(FileView::Structure),
            "c" => Some(FileView::Contents),
            _ => None,
        }
    }
}

pub fn dispatch(request: &Request, config: &RuntimeConfig) -> Response {
    if request.method != "GET" && request.method != "HEAD" {
        return Response::error(&ServeError::MethodNotAllowed);
    }

    match route(request, config) {
        Ok(response) => response,
        Err(err) => {
            if let ServeError::PathRead { .. } = err {
                log::warn!("{} {}: {}", request.method, request.path, err);
            }
            Response::error(&err)
        }
    }
}

fn route(request: &Request, config: &RuntimeConfig) -> Result<Response, ServeError> {
    let path = request.path.as_str();

    if path == "/" {
        return project_page(request, config, "");
    }
    if let Some(name) = path.strip_prefix("/static/") {
        return static_asset(&config.static_dir, &percent_decode(name)?);
    }
    if let Some(id) = path.strip_prefix("/p/") {
        if id.contains('/') {
            return Err(ServeError::NotFound);
        }
        return project_page(request, config, &percent_decode(id)?);
    }

    let mut parts = path.trim_start_matches('/').splitn(3, '/');
    let view = parts
        .next()
        .and_then(FileView::from_prefix)
        .ok_or(ServeError::NotFound)?;
    let id = percent_decode(parts.next().ok_or(ServeError::NotFound)?)?;
    let relative = confine(&percent_decode(parts.next().unwrap_or_default())?)
        .ok_or(ServeError::InvalidPath)?;

    let project = config
        .registry
        .project(&id)
        .ok_or(ServeError::UnknownProject)?;
    file_view(view, project, &relative, config)
}

/// Tree of a known project, or the project index for anything else.
fn project_page(request: &Request, config: &RuntimeConfig, id: &str) -> Result<Response, ServeError> {
    let registry = &config.registry;
    check_browsing(&registry.settings, request.peer)?;

    let Some(project) = registry.project(id) else {
        return Ok(Response::html(html::render_index(registry)));
    };

    let rules = resolve_rules(project, &registry.settings);
    let scanner = Scanner::new(&project.root_path, rules, registry.settings.show_hidden);
    let walk = scanner.walk("").map_err(|e| ServeError::path_read("", e))?;

    Ok(Response::html(html::render_tree(
        id,
        project,
        registry.settings.time_stamp,
        walk,
    )))
}

fn file_view(
    view: FileView,
    project: &ProjectConfig,
    relative: &str,
    config: &RuntimeConfig,
) -> Result<Response, ServeError> {
    let settings = &config.registry.settings;
    let scanner = Scanner::new(
        &project.root_path,
        resolve_rules(project, settings),
        settings.show_hidden,
    );

    match view {
        FileView::Raw => Ok(Response::text(read_file(&scanner, relative)?)),
        FileView::Viewer => Ok(Response::html(html::render_viewer(&read_file(
            &scanner, relative,
        )?))),
        FileView::Json => {
            let content = read_file(&scanner, relative)?;
            Ok(Response::json(OutputGenerator::generate_json(relative, &content)?))
        }
        FileView::Structure => {
            let walk = scanner
                .walk(relative)
                .map_err(|e| ServeError::path_read(relative, e))?;
            Ok(Response::text(OutputGenerator::generate_structure(walk)))
        }
        FileView::Contents => {
            let walk = scanner
                .walk(relative)
                .map_err(|e| ServeError::path_read(relative, e))?;
            Ok(Response::text(OutputGenerator::generate_contents(&scanner, walk)?))
        }
    }
}

fn read_file(scanner: &Scanner, relative: &str) -> Result<Vec<u8>, ServeError> {
    fs::read(scanner.resolve(relative)).map_err(|e| ServeError::path_read(relative, e))
}

fn static_asset(dir: &Path, name: &str) -> Result<Response, ServeError> {
    if name.is_empty() || name.contains(['/', '\\']) || confine(name).as_deref() != Some(name) {
        return Err(ServeError::NotFound);
    }

    match fs::read(dir.join(name)) {
        Ok(body) => Ok(Response::new(asset_type(name), body)),
        Err(err) => {
            log::debug!("Static asset {} unavailable: {}", name, err);
            Err(ServeError::NotFound)
        }
    }
}

fn asset_type(name: &str) -> &'static str {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some("css") => "text/css; charset=utf-8",
        Some("js") => "text/javascript; charset=utf-8",
        Some("html") => "text/html; charset=utf-8",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::Registry;
    use crate::app::models::GeneralSettings;
    use crate::app::rules::{FolderRules, RuleList};
    use crate::app::server::Status;
    use std::collections::BTreeMap;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        config: RuntimeConfig,
    }

    fn fixture(restricted: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("demo");
        fs::create_dir_all(root.join("src")).unwrap();
        fs::write(root.join("src/main.rs"), "fn main() {}\n").unwrap();
        fs::write(root.join("notes.txt"), "notes").unwrap();
        let static_dir = dir.path().join("static");
        fs::create_dir_all(&static_dir).unwrap();
        fs::write(static_dir.join("style.css"), "body {}").unwrap();

        let mut projects = BTreeMap::new();
        projects.insert(
            "demo".to_string(),
            ProjectConfig {
                project_name: "Demo".to_string(),
                root_path: root,
                project_url: "http://example.test".to_string(),
                inclusive_extensions: RuleList::default(),
                exclusive_extensions: RuleList::default(),
                exclusive_folders: FolderRules::default(),
                exclusive_files: RuleList::default(),
            },
        );
        let settings = GeneralSettings {
            disable_external_network_browsing: restricted,
            ..GeneralSettings::default()
        };

        Fixture {
            _dir: dir,
            config: RuntimeConfig {
                registry: Registry::new(settings, projects),
                listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
                static_dir,
            },
        }
    }

    fn get(config: &RuntimeConfig, path: &str, peer: [u8; 4]) -> Response {
        let request = Request {
            method: "GET".to_string(),
            path: path.to_string(),
            peer: IpAddr::from(peer),
        };
        dispatch(&request, config)
    }

    fn body(response: &Response) -> String {
        String::from_utf8_lossy(&response.body).into_owned()
    }

    #[test]
    fn unknown_project_falls_back_to_index() {
        let f = fixture(false);
        for path in ["/", "/p/", "/p/nope"] {
            let response = get(&f.config, path, [127, 0, 0, 1]);
            assert_eq!(response.status, Status::Ok);
            assert!(body(&response).contains("<a href='/p/demo'>Demo</a><br>"), "{path}");
        }
    }

    #[test]
    fn restricted_mode_refuses_external_callers() {
        let f = fixture(true);
        let response = get(&f.config, "/p/demo", [8, 8, 8, 8]);
        assert_eq!(response.status, Status::Forbidden);
        assert_eq!(body(&response), "Access denied\n");

        let local = get(&f.config, "/p/demo", [192, 168, 1, 5]);
        assert_eq!(local.status, Status::Ok);
        let file = get(&f.config, "/f/demo/notes.txt", [8, 8, 8, 8]);
        assert_eq!(file.status, Status::Ok);
    }

    #[test]
    fn file_views() {
        let f = fixture(false);
        let raw = get(&f.config, "/f/demo/src/main.rs", [127, 0, 0, 1]);
        assert_eq!(raw.content_type, "text/plain; charset=UTF-8");
        assert_eq!(raw.body, b"fn main() {}\n");

        let json = get(&f.config, "/j/demo/src/main.rs", [127, 0, 0, 1]);
        assert_eq!(json.content_type, "application/json");
        assert!(body(&json).contains(r#""path":"/src/main.rs""#));

        let viewer = get(&f.config, "/v/demo/notes.txt", [127, 0, 0, 1]);
        assert!(body(&viewer).contains("<pre>notes</pre>"));
    }

    #[test]
    fn structure_and_contents() {
        let f = fixture(false);
        let structure = get(&f.config, "/s/demo/", [127, 0, 0, 1]);
        assert_eq!(body(&structure), "[/src]\n  /src/main.rs\n/notes.txt\n");

        let contents = get(&f.config, "/c/demo/src", [127, 0, 0, 1]);
        assert_eq!(
            body(&contents),
            "---------------\nFile: /src/main.rs:\n\nfn main() {}\n\n\n"
        );
    }

    #[test]
    fn error_statuses() {
        let f = fixture(false);
        let missing = get(&f.config, "/f/demo/missing.txt", [127, 0, 0, 1]);
        assert_eq!(missing.status, Status::InternalServerError);
        assert!(body(&missing).starts_with("/missing.txt: "));

        let unknown = get(&f.config, "/f/nope/a.txt", [127, 0, 0, 1]);
        assert_eq!(unknown.status, Status::BadRequest);
        assert_eq!(body(&unknown), "Invalid project\n");

        let escape = get(&f.config, "/f/demo/../secret", [127, 0, 0, 1]);
        assert_eq!(escape.status, Status::BadRequest);
        let encoded = get(&f.config, "/f/demo/%2e%2e/secret", [127, 0, 0, 1]);
        assert_eq!(encoded.status, Status::BadRequest);

        let missing_dir = get(&f.config, "/s/demo/nowhere", [127, 0, 0, 1]);
        assert_eq!(missing_dir.status, Status::InternalServerError);

        assert_eq!(get(&f.config, "/x/demo/a", [127, 0, 0, 1]).status, Status::NotFound);
    }

    #[test]
    fn static_assets() {
        let f = fixture(false);
        let css = get(&f.config, "/static/style.css", [127, 0, 0, 1]);
        assert_eq!(css.status, Status::Ok);
        assert_eq!(css.content_type, "text/css; charset=utf-8");
        assert_eq!(get(&f.config, "/static/..%2Fdemo%2Fnotes.txt", [127, 0, 0, 1]).status, Status::NotFound);
        assert_eq!(get(&f.config, "/static/missing.js", [127, 0, 0, 1]).status, Status::NotFound);
    }

    #[test]
    fn other_methods_are_refused() {
        let f = fixture(false);
        let request = Request {
            method: "POST".to_string(),
            path: "/".to_string(),
            peer: IpAddr::V4(Ipv4Addr::LOCALHOST),
        };
        assert_eq!(dispatch(&request, &f.config).status, Status::MethodNotAllowed);
    }
}
