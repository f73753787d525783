use super::Method;
use super::headers::*;
use super::request::RtspRequest;

#[test]
fn test_case_insensitive_get() {
    let mut headers = Headers::new();
    headers.insert("Content-Type", "text/parameters");

    assert_eq!(headers.get("content-type"), Some("text/parameters"));
    assert!(headers.contains("CONTENT-TYPE"));
}

#[test]
fn test_insert_replaces_in_place() {
    let mut headers = Headers::new();
    headers.insert("A", "1");
    headers.insert("B", "2");
    headers.insert("a", "3");

    let pairs: Vec<_> = headers.iter().collect();
    assert_eq!(pairs, vec![("a", "3"), ("B", "2")]);
}

#[test]
fn test_remove() {
    let mut headers = Headers::new();
    headers.insert(raop::APPLE_CHALLENGE, "abc");

    assert_eq!(headers.remove("apple-challenge"), Some("abc".to_string()));
    assert!(headers.is_empty());
    assert_eq!(headers.remove(raop::APPLE_CHALLENGE), None);
}

#[test]
fn test_request_encode_in_order() {
    let request = RtspRequest::builder(Method::Options, "*")
        .cseq(1)
        .user_agent("test/1.0")
        .header(raop::CLIENT_INSTANCE, "0011223344556677")
        .build();

    let encoded = String::from_utf8(request.encode()).unwrap();
    assert_eq!(
        encoded,
        "OPTIONS * RTSP/1.0\r\nCSeq: 1\r\nUser-Agent: test/1.0\r\n\
         Client-Instance: 0011223344556677\r\n\r\n"
    );
}

#[test]
fn test_request_encode_with_body() {
    let body = b"volume: -30.000000\r\n".to_vec();
    let request = RtspRequest::builder(Method::SetParameter, "rtsp://10.0.0.2/1")
        .cseq(5)
        .content_type("text/parameters")
        .body(body.clone())
        .build();

    let encoded = String::from_utf8(request.encode()).unwrap();
    assert!(encoded.starts_with("SET_PARAMETER rtsp://10.0.0.2/1 RTSP/1.0\r\n"));
    assert!(encoded.contains(&format!("Content-Length: {}\r\n", body.len())));
    assert!(encoded.ends_with("\r\n\r\nvolume: -30.000000\r\n"));
}

#[test]
fn test_method_round_trip() {
    for method in [Method::Options, Method::SetParameter, Method::Teardown] {
        assert_eq!(Method::parse(method.as_str()), Some(method));
    }
    assert_eq!(Method::parse("record"), Some(Method::Record));
    assert_eq!(Method::parse("PLAY"), None);
}
