use onewiki::http::response::{Response, ResponseBuilder, StatusCode};
use onewiki::http::writer::serialize_response;

#[test]
fn test_status_code_as_u16() {
    assert_eq!(StatusCode::Ok.as_u16(), 200);
    assert_eq!(StatusCode::SeeOther.as_u16(), 303);
    assert_eq!(StatusCode::BadRequest.as_u16(), 400);
    assert_eq!(StatusCode::Unauthorized.as_u16(), 401);
    assert_eq!(StatusCode::Forbidden.as_u16(), 403);
    assert_eq!(StatusCode::NotFound.as_u16(), 404);
    assert_eq!(StatusCode::MethodNotAllowed.as_u16(), 405);
    assert_eq!(StatusCode::PayloadTooLarge.as_u16(), 413);
    assert_eq!(StatusCode::InternalServerError.as_u16(), 500);
}

#[test]
fn test_status_code_reason_phrase() {
    assert_eq!(StatusCode::Ok.reason_phrase(), "OK");
    assert_eq!(StatusCode::SeeOther.reason_phrase(), "See Other");
    assert_eq!(StatusCode::Unauthorized.reason_phrase(), "Unauthorized");
    assert_eq!(StatusCode::Forbidden.reason_phrase(), "Forbidden");
    assert_eq!(
        StatusCode::InternalServerError.reason_phrase(),
        "Internal Server Error"
    );
}

#[test]
fn test_status_code_server_error_range() {
    assert!(StatusCode::InternalServerError.is_server_error());
    assert!(!StatusCode::Forbidden.is_server_error());
}

#[test]
fn test_response_builder_auto_content_length() {
    let body = b"This is the body".to_vec();
    let response = ResponseBuilder::new(StatusCode::Ok)
        .body(body.clone())
        .build();

    let content_length = response.headers.get("Content-Length").unwrap();
    assert_eq!(content_length, &body.len().to_string());
}

#[test]
fn test_response_builder_preserves_custom_content_length() {
    let response = ResponseBuilder::new(StatusCode::Ok)
        .header("Content-Length", "999")
        .body(b"test".to_vec())
        .build();

    assert_eq!(response.headers.get("Content-Length").unwrap(), "999");
}

#[test]
fn test_response_html_helper() {
    let response = Response::html("<p>hi</p>");

    assert_eq!(response.status, StatusCode::Ok);
    assert_eq!(response.header("content-type"), Some("text/html; charset=utf-8"));
    assert_eq!(response.body, b"<p>hi</p>".to_vec());
}

#[test]
fn test_response_see_other_helper() {
    let response = Response::see_other("/page?action=edit");

    assert_eq!(response.status, StatusCode::SeeOther);
    assert_eq!(response.header("Location"), Some("/page?action=edit"));
    assert_eq!(response.header("Content-Length"), Some("0"));
}

#[test]
fn test_response_method_not_allowed_lists_methods() {
    let response = Response::method_not_allowed();

    assert_eq!(response.status, StatusCode::MethodNotAllowed);
    assert_eq!(response.header("Allow"), Some("GET, POST"));
}

#[test]
fn test_response_not_found_helper() {
    let response = Response::not_found();

    assert_eq!(response.status, StatusCode::NotFound);
    assert_eq!(response.body, b"404 Not Found".to_vec());
}

#[test]
fn test_response_internal_error_helper() {
    let response = Response::internal_error();

    assert_eq!(response.status, StatusCode::InternalServerError);
    assert_eq!(response.body, b"500 Internal Server Error".to_vec());
}

#[test]
fn test_serialize_response_wire_format() {
    let response = Response::text(StatusCode::Forbidden, "Directory can't be updated");
    let bytes = serialize_response(&response);
    let text = String::from_utf8(bytes).unwrap();

    assert!(text.starts_with("HTTP/1.1 403 Forbidden\r\n"));
    assert!(text.contains("Content-Length: 26\r\n"));
    assert!(text.ends_with("\r\n\r\nDirectory can't be updated"));
}
