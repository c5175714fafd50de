#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use onewiki::auth::digest::compute_response;
use onewiki::auth::{hash_secret, CredentialStore, DigestAuthenticator};
use onewiki::config::WikiConfig;
use onewiki::http::request::{Method, Request, RequestBuilder};
use onewiki::http::response::Response;
use onewiki::wiki::Wiki;

pub const REALM: &str = "Test Wiki";
pub const USER: &str = "alice";
pub const SECRET: &str = "wonderland";

pub fn store() -> Arc<CredentialStore> {
    Arc::new(CredentialStore::from_entries([(
        USER,
        hash_secret(USER, REALM, SECRET),
    )]))
}

pub fn wiki_config(root: &Path) -> WikiConfig {
    WikiConfig {
        data_dir: root.to_path_buf(),
        realm: REALM.to_string(),
        ..WikiConfig::default()
    }
}

pub fn wiki(root: &Path) -> Wiki {
    wiki_with(wiki_config(root))
}

pub fn wiki_with(config: WikiConfig) -> Wiki {
    let auth = DigestAuthenticator::new(REALM, store());
    Wiki::new(&config, auth)
}

pub fn get(target: &str) -> Request {
    RequestBuilder::new()
        .method(Method::GET)
        .target(target)
        .build()
        .unwrap()
}

/// Pulls `name="value"` out of a challenge header.
pub fn challenge_param(header: &str, name: &str) -> String {
    let needle = format!(" {name}=\"");
    let start = header.find(&needle).unwrap() + needle.len();
    let end = header[start..].find('"').unwrap();
    header[start..start + end].to_string()
}

/// Asks the wiki for a challenge and answers it.
pub fn digest_header(wiki: &Wiki, method: &Method, target: &str, user: &str, secret: &str) -> String {
    let denied = wiki.handle(&get("/?action=edit"));
    let challenge = denied.header("WWW-Authenticate").unwrap().to_string();
    let nonce = challenge_param(&challenge, "nonce");
    let opaque = challenge_param(&challenge, "opaque");

    let ha1 = hash_secret(user, REALM, secret);
    let response = compute_response(
        &ha1,
        method.as_str(),
        target,
        &nonce,
        Some(("00000001", "0a4f113b")),
    );

    format!(
        "Digest username=\"{user}\", realm=\"{REALM}\", nonce=\"{nonce}\", uri=\"{target}\", \
         algorithm=MD5, response=\"{response}\", opaque=\"{opaque}\", qop=auth, \
         nc=00000001, cnonce=\"0a4f113b\""
    )
}

pub fn authed(wiki: &Wiki, builder: RequestBuilder, method: Method, target: &str) -> Request {
    let header = digest_header(wiki, &method, target, USER, SECRET);
    builder
        .method(method)
        .target(target)
        .header("Authorization", header)
        .build()
        .unwrap()
}

pub fn authed_get(wiki: &Wiki, target: &str) -> Response {
    wiki.handle(&authed(wiki, RequestBuilder::new(), Method::GET, target))
}

pub fn post_form(wiki: &Wiki, target: &str, form: &str) -> Response {
    let builder = RequestBuilder::new()
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(form.as_bytes().to_vec());
    wiki.handle(&authed(wiki, builder, Method::POST, target))
}

pub fn body_text(response: &Response) -> String {
    String::from_utf8_lossy(&response.body).into_owned()
}
