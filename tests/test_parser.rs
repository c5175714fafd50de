use onewiki::http::parser::{ParseError, parse_http_request, parse_http_request_limited};
use onewiki::http::request::Method;

#[test]
fn test_parse_simple_get_request() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let (parsed, consumed) = parse_http_request(req).unwrap();

    assert_eq!(parsed.method, Method::GET);
    assert_eq!(parsed.target, "/");
    assert_eq!(parsed.version, "HTTP/1.1");
    assert_eq!(parsed.headers.get("Host").unwrap(), "example.com");
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_post_request_with_body() {
    let req = b"POST /notes HTTP/1.1\r\nHost: localhost\r\nContent-Length: 5\r\n\r\nhello";
    let (parsed, consumed) = parse_http_request(req).unwrap();

    assert_eq!(parsed.method, Method::POST);
    assert_eq!(parsed.target, "/notes");
    assert_eq!(parsed.version, "HTTP/1.1");
    assert_eq!(parsed.body, b"hello".to_vec());
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_multiple_headers() {
    let req = b"GET /path HTTP/1.1\r\nHost: example.com\r\nUser-Agent: test-client\r\nAccept: */*\r\n\r\n";
    let (parsed, _) = parse_http_request(req).unwrap();

    assert_eq!(parsed.headers.get("Host").unwrap(), "example.com");
    assert_eq!(parsed.headers.get("User-Agent").unwrap(), "test-client");
    assert_eq!(parsed.headers.get("Accept").unwrap(), "*/*");
}

#[test]
fn test_parse_request_with_path_and_query_string() {
    let req = b"GET /notes/today?action=edit HTTP/1.1\r\nHost: example.com\r\n\r\n";
    let (parsed, _) = parse_http_request(req).unwrap();

    assert_eq!(parsed.target, "/notes/today?action=edit");
    assert_eq!(parsed.path(), "/notes/today");
    assert_eq!(parsed.query(), Some("action=edit"));
}

#[test]
fn test_parse_incomplete_request_missing_blank_line() {
    let req = b"GET / HTTP/1.1\r\nHost: example.com\r\n";
    let result = parse_http_request(req);

    assert!(matches!(result, Err(ParseError::Incomplete)));
}

#[test]
fn test_parse_incomplete_request_partial_body() {
    let req = b"POST /notes HTTP/1.1\r\nContent-Length: 10\r\n\r\nhello";
    let result = parse_http_request(req);

    assert!(matches!(result, Err(ParseError::Incomplete)));
}

#[test]
fn test_parse_invalid_http_method() {
    let req = b"INVALID / HTTP/1.1\r\n\r\n";
    let result = parse_http_request(req);

    assert!(matches!(result, Err(ParseError::InvalidMethod)));
}

#[test]
fn test_parse_malformed_header() {
    let req = b"GET / HTTP/1.1\r\nBrokenHeader\r\n\r\n";
    let result = parse_http_request(req);

    assert!(matches!(result, Err(ParseError::InvalidHeader)));
}

#[test]
fn test_parse_various_http_methods() {
    let methods = vec![
        ("GET", Method::GET),
        ("POST", Method::POST),
        ("PUT", Method::PUT),
        ("DELETE", Method::DELETE),
        ("HEAD", Method::HEAD),
        ("OPTIONS", Method::OPTIONS),
        ("PATCH", Method::PATCH),
    ];

    for (method_str, expected_method) in methods {
        let req = format!("{} / HTTP/1.1\r\n\r\n", method_str);
        let (parsed, _) = parse_http_request(req.as_bytes()).unwrap();
        assert_eq!(parsed.method, expected_method);
    }
}

#[test]
fn test_parse_request_with_empty_body() {
    let req = b"POST /notes HTTP/1.1\r\nContent-Length: 0\r\n\r\n";
    let (parsed, _) = parse_http_request(req).unwrap();

    assert_eq!(parsed.body.len(), 0);
}

#[test]
fn test_parse_request_with_binary_body() {
    let req = b"POST /upload HTTP/1.1\r\nContent-Length: 4\r\n\r\n\x00\x01\x02\x03";
    let (parsed, _) = parse_http_request(req).unwrap();

    assert_eq!(parsed.body, vec![0, 1, 2, 3]);
}

#[test]
fn test_parse_header_case_preservation() {
    let req = b"GET / HTTP/1.1\r\nContent-Type: application/json\r\n\r\n";
    let (parsed, _) = parse_http_request(req).unwrap();

    // Headers are stored as-is with trimming
    assert!(parsed.headers.contains_key("Content-Type"));
}

#[test]
fn test_parse_pipelined_requests_consume_one_at_a_time() {
    let req = b"GET /a HTTP/1.1\r\n\r\nGET /b HTTP/1.1\r\n\r\n";
    let (first, consumed) = parse_http_request(req).unwrap();
    let (second, _) = parse_http_request(&req[consumed..]).unwrap();

    assert_eq!(first.target, "/a");
    assert_eq!(second.target, "/b");
}

#[test]
fn test_parse_invalid_content_length() {
    let req = b"POST /a HTTP/1.1\r\nContent-Length: lots\r\n\r\n";
    let result = parse_http_request(req);

    assert!(matches!(result, Err(ParseError::InvalidContentLength)));
}

#[test]
fn test_parse_body_within_limit() {
    let req = b"POST /a HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
    let (parsed, _) = parse_http_request_limited(req, 5).unwrap();

    assert_eq!(parsed.body, b"hello".to_vec());
}

#[test]
fn test_parse_endless_headers_are_rejected() {
    let mut req = b"GET / HTTP/1.1\r\n".to_vec();
    while req.len() <= 64 * 1024 {
        req.extend_from_slice(b"X-Filler: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n");
    }
    let result = parse_http_request(&req);

    assert!(matches!(result, Err(ParseError::TooLarge { .. })));
}

#[test]
fn test_parse_chunked_body() {
    let req = b"POST /page HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n\
9\r\nbody=new!\r\n0\r\n\r\nGET /next HTTP/1.1\r\nHost: x\r\n\r\n";

    let (parsed, consumed) = parse_http_request(req).unwrap();
    assert_eq!(parsed.body, b"body=new!".to_vec());

    let (next, _) = parse_http_request(&req[consumed..]).unwrap();
    assert_eq!(next.method, Method::GET);
    assert_eq!(next.target, "/next");
}

#[test]
fn test_parse_chunked_body_across_several_chunks() {
    let req = b"POST /a HTTP/1.1\r\ntransfer-encoding: Chunked\r\n\r\n\
5\r\nhello\r\nA\r\n, world!!!\r\n0\r\n\r\n";

    let (parsed, consumed) = parse_http_request(req).unwrap();

    assert_eq!(parsed.body, b"hello, world!!!".to_vec());
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_partial_chunked_body_is_incomplete() {
    let req = b"POST /a HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n9\r\nbody=";

    assert!(matches!(parse_http_request(req), Err(ParseError::Incomplete)));
}

#[test]
fn test_parse_chunked_body_over_limit() {
    let req = b"POST /a HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n20\r\n";

    let result = parse_http_request_limited(req, 16);

    assert!(matches!(result, Err(ParseError::TooLarge { limit: 16 })));
}

#[test]
fn test_parse_bad_chunk_size() {
    let req = b"POST /a HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\nabc\r\n0\r\n\r\n";

    assert!(matches!(parse_http_request(req), Err(ParseError::InvalidChunk)));
}

#[test]
fn test_parse_other_transfer_codings_are_unsupported() {
    let req = b"POST /a HTTP/1.1\r\nTransfer-Encoding: gzip, chunked\r\n\r\n";

    assert!(matches!(
        parse_http_request(req),
        Err(ParseError::UnsupportedTransferEncoding(_))
    ));
}

#[test]
fn test_parse_transfer_encoding_with_content_length() {
    let req = b"POST /a HTTP/1.1\r\nContent-Length: 3\r\nTransfer-Encoding: chunked\r\n\r\n0\r\n\r\n";

    assert!(matches!(parse_http_request(req), Err(ParseError::AmbiguousLength)));
}

#[test]
fn test_parse_conflicting_content_lengths() {
    let req = b"POST /a HTTP/1.1\r\nContent-Length: 3\r\ncontent-length: 5\r\n\r\nhello";

    assert!(matches!(
        parse_http_request(req),
        Err(ParseError::InvalidContentLength)
    ));
}

#[test]
fn test_parse_repeated_equal_content_lengths() {
    let req = b"POST /a HTTP/1.1\r\nContent-Length: 5\r\ncontent-length: 5\r\n\r\nhello";

    let (parsed, consumed) = parse_http_request(req).unwrap();

    assert_eq!(parsed.body, b"hello".to_vec());
    assert_eq!(consumed, req.len());
}

#[test]
fn test_parse_repeated_headers_are_folded() {
    let req = b"GET / HTTP/1.1\r\nAccept: text/html\r\naccept: */*\r\n\r\n";

    let (parsed, _) = parse_http_request(req).unwrap();

    assert_eq!(parsed.headers.len(), 1);
    assert_eq!(parsed.header("accept"), Some("text/html, */*"));
}
