//! Views and the templates they are rendered from.
//!
//! Built-in views and per-directory overrides are Handlebars templates:
//! `{{name}}` is HTML-escaped, `{{{name}}}` is inserted verbatim, and
//! `{{#each}}`, `{{#if}}` and `{{#unless}}` cover lists and flags.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use handlebars::{Handlebars, RenderError as HandlebarsError};
use serde::Serialize;

use crate::wiki::path::{PathResolver, RequestPath};

pub type TemplateData = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Bool(bool),
    List(Vec<TemplateData>),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<TemplateData>> for Value {
    fn from(items: Vec<TemplateData>) -> Self {
        Value::List(items)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Template(#[from] HandlebarsError),
    #[error("reading template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The built-in views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    List,
    Edit,
    Redirect,
}

impl View {
    pub fn name(&self) -> &'static str {
        match self {
            View::List => "list",
            View::Edit => "edit",
            View::Redirect => "redirect",
        }
    }

    fn builtin_body(&self) -> &'static str {
        match self {
            View::List => LIST,
            View::Edit => EDIT,
            View::Redirect => REDIRECT,
        }
    }
}

/// Where a view's template text comes from.
pub trait TemplateSource {
    fn load(&self) -> Result<Cow<'_, str>, RenderError>;
}

/// Template text compiled into the binary.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinTemplate(View);

impl BuiltinTemplate {
    pub fn new(view: View) -> Self {
        Self(view)
    }
}

impl TemplateSource for BuiltinTemplate {
    fn load(&self) -> Result<Cow<'_, str>, RenderError> {
        Ok(Cow::Borrowed(self.0.builtin_body()))
    }
}

/// Template text read from a file under the data root.
#[derive(Debug, Clone)]
pub struct FileTemplate {
    path: PathBuf,
}

impl FileTemplate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl TemplateSource for FileTemplate {
    fn load(&self) -> Result<Cow<'_, str>, RenderError> {
        std::fs::read_to_string(&self.path)
            .map(Cow::Owned)
            .map_err(|source| RenderError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

/// Picks the template for `view` when rendering something in `dir`.
///
/// The nearest `.{view}.{ext}` file from `dir` up to the data root wins;
/// without one, or when `overrides` is false, the built-in view is used.
pub fn select_source(
    view: View,
    resolver: &PathResolver,
    dir: &RequestPath,
    extensions: &[String],
    overrides: bool,
) -> Box<dyn TemplateSource> {
    if overrides {
        let mut current = Some(dir.clone());
        while let Some(d) = current {
            let data_dir = resolver.to_data_path(&d);
            for ext in extensions {
                let candidate = data_dir.join(format!(".{}.{ext}", view.name()));
                if candidate.is_file() && resolver.is_confined(&candidate).unwrap_or(false) {
                    tracing::debug!(view = view.name(), path = %candidate.display(), "Using template override");
                    return Box::new(FileTemplate::new(candidate));
                }
            }
            current = d.parent();
        }
    }
    Box::new(BuiltinTemplate::new(view))
}

/// Turns template text plus data into a document.
pub trait Renderer: Send + Sync {
    fn render(&self, template: &str, data: &TemplateData) -> Result<String, RenderError>;
}

/// Renders Handlebars templates, escaping `{{name}}` output for HTML.
pub struct HandlebarsRenderer {
    registry: Handlebars<'static>,
}

impl HandlebarsRenderer {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(escape_html);
        Self { registry }
    }
}

impl Default for HandlebarsRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for HandlebarsRenderer {
    fn render(&self, template: &str, data: &TemplateData) -> Result<String, RenderError> {
        Ok(self.registry.render_template(template, data)?)
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

const LIST: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="UTF-8">
    <title>List: {{path}}</title>
  </head>
  <body>
    <ul>
{{#each entries}}      <li><a href="{{href}}?action=edit">{{path}}</a></li>
{{/each}}    </ul>
  </body>
</html>
"#;

const EDIT: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="UTF-8">
    <title>Edit: {{path}}</title>
  </head>
  <body>
    <form method="POST" action="{{action}}" enctype="multipart/form-data">
      <div class="row">
        <button type="submit">update</button>
        <input type="file" name="file">
      </div>
      <div class="row">
        <textarea name="body" rows="30" cols="80">{{body}}</textarea>
      </div>
    </form>
  </body>
</html>
"#;

const REDIRECT: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="UTF-8">
    <title>Redirect: {{path}}</title>
{{#if auto_redirect}}    <meta http-equiv="refresh" content="0; URL={{href}}">
    <script>location.replace({{{href_json}}})</script>
{{/if}}  </head>
  <body>
    <p><a href="{{href}}">{{path}}</a></p>
  </body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, Value)]) -> TemplateData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn escapes_by_default_and_not_in_triple_braces() {
        let d = data(&[("x", "<a href='/'>".into())]);
        let out = HandlebarsRenderer::new().render("{{x}}|{{{x}}}", &d).unwrap();
        assert_eq!(out, "&lt;a href=&#39;/&#39;&gt;|<a href='/'>");
    }

    #[test]
    fn each_sees_item_and_parent_names() {
        let items = vec![data(&[("n", "a".into())]), data(&[("n", "b".into())])];
        let d = data(&[("items", items.into()), ("sep", ",".into())]);
        let out = HandlebarsRenderer::new()
            .render("{{#each items}}{{n}}{{../sep}}{{/each}}", &d)
            .unwrap();
        assert_eq!(out, "a,b,");
    }

    #[test]
    fn boolean_sections() {
        let d = data(&[("on", true.into()), ("off", false.into())]);
        let out = HandlebarsRenderer::new()
            .render(
                "{{#if on}}1{{/if}}{{#if off}}2{{/if}}{{#unless off}}3{{/unless}}{{#unless missing}}4{{/unless}}",
                &d,
            )
            .unwrap();
        assert_eq!(out, "134");
    }

    #[test]
    fn unclosed_block_is_an_error() {
        let d = TemplateData::new();
        assert!(matches!(
            HandlebarsRenderer::new().render("{{#if a}}x", &d),
            Err(RenderError::Template(_))
        ));
    }

    #[test]
    fn builtin_views_render() {
        let d = data(&[
            ("path", "/a".into()),
            ("action", "/a".into()),
            ("body", "x < y".into()),
        ]);
        let template = BuiltinTemplate::new(View::Edit);
        let out = HandlebarsRenderer::new()
            .render(&template.load().unwrap(), &d)
            .unwrap();
        assert!(out.contains("<textarea name=\"body\" rows=\"30\" cols=\"80\">x &lt; y</textarea>"));
    }

    #[test]
    fn redirect_view_quotes_target_for_script() {
        let d = data(&[
            ("path", "/p.html".into()),
            ("href", "/p.html".into()),
            ("href_json", "\"/p.html\"".into()),
            ("auto_redirect", true.into()),
        ]);
        let template = BuiltinTemplate::new(View::Redirect);
        let out = HandlebarsRenderer::new()
            .render(&template.load().unwrap(), &d)
            .unwrap();
        assert!(out.contains("location.replace(\"/p.html\")"));
    }
}
