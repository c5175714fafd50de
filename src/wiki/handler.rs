//! Request routing for the wiki.
//!
//! Every request is classified by method, mode (`action=edit` or not) and
//! what the path points at, then dispatched through [`Route::select`].
//!
//! Writes are not coordinated: two POSTs to the same page race and the last
//! one wins, and a delete pruning empty directories can collide with a
//! concurrent write recreating one of them (the write or prune then fails
//! with a 500).

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{Authorization, CredentialStore, DigestAuthenticator};
use crate::config::{Config, WikiConfig};
use crate::http::form::FormData;
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};
use crate::wiki::error::WikiError;
use crate::wiki::path::{EntryKind, PathError, PathResolver, RequestPath};
use crate::wiki::template::{
    self, FileTemplate, HandlebarsRenderer, Renderer, TemplateData, TemplateSource, Value, View,
};

const DIRECTORY_UPDATE: &str = "Directory can't be updated";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    View,
    Edit,
}

/// What to do with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// POST to a directory
    Forbidden,
    /// POST to a file or missing path: write or delete
    Update,
    /// Edit-mode GET of a directory
    List,
    /// Edit-mode GET of a file or missing path
    Edit,
    /// Plain GET of an existing file
    Serve,
    /// Plain GET without an exact file
    Guess,
    MethodNotAllowed,
}

impl Route {
    pub fn select(method: &Method, mode: Mode, kind: EntryKind) -> Route {
        match (method, mode, kind) {
            (Method::POST, _, EntryKind::Directory) => Route::Forbidden,
            (Method::POST, _, _) => Route::Update,
            (Method::GET, Mode::Edit, EntryKind::Directory) => Route::List,
            (Method::GET, Mode::Edit, _) => Route::Edit,
            (Method::GET, Mode::View, EntryKind::File) => Route::Serve,
            (Method::GET, Mode::View, _) => Route::Guess,
            _ => Route::MethodNotAllowed,
        }
    }
}

/// POSTs and edit-mode GETs sit behind authentication.
pub fn requires_auth(method: &Method, mode: Mode) -> bool {
    matches!((method, mode), (Method::POST, _) | (Method::GET, Mode::Edit))
}

pub struct Wiki {
    resolver: PathResolver,
    auth: DigestAuthenticator,
    renderer: Box<dyn Renderer>,
    static_cache_control: Option<String>,
    template_extensions: Vec<String>,
    auto_redirect: bool,
}

impl Wiki {
    pub fn new(config: &WikiConfig, auth: DigestAuthenticator) -> Self {
        Self {
            resolver: PathResolver::new(&config.data_dir, config.fallback_extensions.clone()),
            auth,
            renderer: Box::new(HandlebarsRenderer::new()),
            static_cache_control: config.static_cache_control.clone(),
            template_extensions: config.template_extensions.clone(),
            auto_redirect: config.auto_redirect,
        }
    }

    pub fn from_config(config: &Config, store: Arc<CredentialStore>) -> Self {
        let auth = DigestAuthenticator::new(config.wiki.realm.clone(), store)
            .with_nonce_lifetime(config.auth.nonce_lifetime_secs.map(Duration::from_secs));
        Self::new(&config.wiki, auth)
    }

    pub fn with_renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Answers one request. A request nothing matched gets a plain 404.
    pub fn handle(&self, req: &Request) -> Response {
        let response = match self.dispatch(req) {
            Ok(Some(response)) => response,
            Ok(None) => Response::not_found(),
            Err(e) => {
                match e.status() {
                    StatusCode::Unauthorized => {}
                    status if status.is_server_error() => {
                        tracing::error!(error = %e, target = %req.target, "Request failed");
                    }
                    _ => tracing::warn!(error = %e, target = %req.target, "Request rejected"),
                }
                e.into_response()
            }
        };

        tracing::info!(
            method = req.method.as_str(),
            target = %req.target,
            status = response.status.as_u16(),
            "Request handled"
        );
        response
    }

    fn dispatch(&self, req: &Request) -> Result<Option<Response>, WikiError> {
        let params = req.query_params();
        let mode = match params.get("action").map(String::as_str) {
            Some("edit") => Mode::Edit,
            _ => Mode::View,
        };

        if requires_auth(&req.method, mode) {
            self.authorize(req)?;
        }

        let path = RequestPath::parse(req.path())?;
        let data = self.resolver.to_data_path(&path);
        if !self.resolver.is_confined(&data).map_err(WikiError::io(&data))? {
            return Err(PathError::Escape {
                raw: req.path().to_string(),
            }
            .into());
        }
        let kind = self.resolver.classify(&path);
        let overrides = !params.contains_key("default");

        match Route::select(&req.method, mode, kind) {
            Route::Forbidden => Err(WikiError::Forbidden(DIRECTORY_UPDATE)),
            Route::Update => self.update(req, &path).map(Some),
            Route::List => self.list(&path, overrides).map(Some),
            Route::Edit => self.edit(&path, overrides).map(Some),
            Route::Serve => self.serve(&path).map(Some),
            Route::Guess => self.guess(&path, kind, overrides),
            Route::MethodNotAllowed => Ok(Some(Response::method_not_allowed())),
        }
    }

    fn authorize(&self, req: &Request) -> Result<String, WikiError> {
        match self.auth.authorize(req) {
            Authorization::Granted { identifier } => {
                tracing::debug!(identifier = %identifier, "Authorized");
                Ok(identifier)
            }
            Authorization::Denied(challenge) => Err(WikiError::AuthRequired(challenge)),
        }
    }

    fn update(&self, req: &Request, path: &RequestPath) -> Result<Response, WikiError> {
        let form = FormData::from_request(req)?;
        let data = self.resolver.to_data_path(path);
        let text = form.field("body").unwrap_or("");

        match form.file("file") {
            Some(upload) => write_file(&data, &upload.content)?,
            None if !text.is_empty() => write_file(&data, text.as_bytes())?,
            None => self.delete(path, &data)?,
        }

        Ok(Response::see_other(format!("{}?action=edit", path.to_href())))
    }

    fn delete(&self, path: &RequestPath, data: &Path) -> Result<(), WikiError> {
        match fs::remove_file(data) {
            Ok(()) => tracing::info!(path = %path, "Deleted"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(WikiError::io(data)(e)),
        }

        // Walk the request path rather than the data path: its parents are
        // lexically confined to the root, so the walk cannot leave it.
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir.is_root() {
                break;
            }
            let dir_data = self.resolver.to_data_path(&dir);
            match fs::remove_dir(&dir_data) {
                Ok(()) => tracing::debug!(path = %dir, "Pruned empty directory"),
                Err(e) if e.kind() == io::ErrorKind::DirectoryNotEmpty => break,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(WikiError::io(dir_data)(e)),
            }
            current = dir.parent();
        }
        Ok(())
    }

    fn list(&self, path: &RequestPath, overrides: bool) -> Result<Response, WikiError> {
        let data = self.resolver.to_data_path(path);

        let mut children = Vec::new();
        for entry in fs::read_dir(&data).map_err(WikiError::io(&data))? {
            let entry = entry.map_err(WikiError::io(&data))?;
            if let Some(child) = self.resolver.to_request_path(&entry.path()) {
                children.push(child);
            }
        }
        children.sort();

        let entries = children
            .iter()
            .map(|child| {
                template_data([
                    ("path", child.to_string().into()),
                    ("href", child.to_href().into()),
                ])
            })
            .collect::<Vec<_>>();

        let data = template_data([
            ("path", path.to_string().into()),
            ("entries", entries.into()),
        ]);
        self.render_view(View::List, path, overrides, &data)
    }

    fn edit(&self, path: &RequestPath, overrides: bool) -> Result<Response, WikiError> {
        let data_path = self.resolver.to_data_path(path);
        let body = match fs::read(&data_path) {
            // Binary files degrade to replacement characters.
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
                String::new()
            }
            Err(e) => return Err(WikiError::io(data_path)(e)),
        };

        let data = template_data([
            ("path", path.to_string().into()),
            ("action", path.to_href().into()),
            ("body", body.into()),
        ]);
        self.render_view(View::Edit, &parent_or_root(path), overrides, &data)
    }

    fn serve(&self, path: &RequestPath) -> Result<Response, WikiError> {
        let data = self.resolver.to_data_path(path);
        let bytes = fs::read(&data).map_err(WikiError::io(&data))?;

        let mime = mime_guess::from_path(&data).first_or_octet_stream();
        let mut builder =
            ResponseBuilder::new(StatusCode::Ok).header("Content-Type", mime.essence_str());
        if let Some(cache_control) = &self.static_cache_control {
            builder = builder.header("Cache-Control", cache_control.as_str());
        }
        Ok(builder.body(bytes).build())
    }

    fn guess(
        &self,
        path: &RequestPath,
        kind: EntryKind,
        overrides: bool,
    ) -> Result<Option<Response>, WikiError> {
        let found = self
            .resolver
            .guess(path, kind)
            .map_err(WikiError::io(self.resolver.to_data_path(path)))?;
        let Some(found) = found else {
            return Ok(None);
        };
        if !self.resolver.is_confined(&found).map_err(WikiError::io(&found))? {
            tracing::warn!(requested = %path, found = %found.display(), "Guessed target leaves the data root");
            return Ok(None);
        }
        let target = self
            .resolver
            .to_request_path(&found)
            .ok_or_else(|| WikiError::OutsideRoot(found.clone()))?;
        tracing::debug!(requested = %path, found = %target, "Guessed target");

        let is_template = target.extension().is_some_and(|ext| {
            self.template_extensions
                .iter()
                .any(|t| t.eq_ignore_ascii_case(ext))
        });
        if is_template {
            let data = template_data([("path", target.to_string().into())]);
            return self.render(&FileTemplate::new(found), &data).map(Some);
        }

        let href = target.to_href();
        let data = template_data([
            ("path", target.to_string().into()),
            // The href is percent-encoded, so quoting it is a valid JS string.
            ("href_json", format!("\"{href}\"").into()),
            ("href", href.into()),
            ("auto_redirect", self.auto_redirect.into()),
        ]);
        let dir = match kind {
            EntryKind::Directory => path.clone(),
            _ => parent_or_root(path),
        };
        self.render_view(View::Redirect, &dir, overrides, &data).map(Some)
    }

    fn render_view(
        &self,
        view: View,
        dir: &RequestPath,
        overrides: bool,
        data: &TemplateData,
    ) -> Result<Response, WikiError> {
        let source = template::select_source(
            view,
            &self.resolver,
            dir,
            &self.template_extensions,
            overrides,
        );
        self.render(source.as_ref(), data)
    }

    fn render(&self, source: &dyn TemplateSource, data: &TemplateData) -> Result<Response, WikiError> {
        let text = source.load()?;
        let html = self.renderer.render(&text, data)?;
        Ok(Response::html(html))
    }
}

fn write_file(data: &Path, content: &[u8]) -> Result<(), WikiError> {
    if let Some(parent) = data.parent() {
        fs::create_dir_all(parent).map_err(WikiError::io(parent))?;
    }
    fs::write(data, content).map_err(WikiError::io(data))?;
    tracing::info!(path = %data.display(), bytes = content.len(), "Wrote");
    Ok(())
}

fn parent_or_root(path: &RequestPath) -> RequestPath {
    path.parent().unwrap_or_else(RequestPath::root)
}

fn template_data<const N: usize>(pairs: [(&str, Value); N]) -> TemplateData {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
