use crate::error::ProtocolError;
use crate::protocol::{
    DEFAULT_TIMEOUT_MS, JsonMap, Method, Request, RequestParams, Response, ResponseStatus,
    peek_request_id,
};

use serde_json::{Value, json};

fn bytes(value: Value) -> Vec<u8> {
    serde_json::to_vec(&value).unwrap()
}

/// **VALUE**: Verifies that a request survives encode/decode with every field set.
///
/// **WHY THIS MATTERS**: The host only sees what `from_bytes` reconstructs. A dropped
/// `timeout` or `extra` field silently changes how code runs inside the host.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - Optional params are serialized but not read back
/// - The method name mapping is asymmetric
/// - The caller's id is regenerated on decode
#[test]
fn given_request_with_all_fields_when_round_tripped_then_identical() {
    // GIVEN: A request using every params field
    let mut extra = JsonMap::new();
    extra.insert("frame".to_string(), json!(12));
    let request = Request::new(
        Method::ExecuteCode,
        RequestParams {
            code: Some("print('hi')".to_string()),
            timeout: 1234,
            query: Some("objects".to_string()),
            extra,
        },
    );

    // WHEN: Encoding then decoding
    let decoded = Request::from_bytes(&request.to_bytes().unwrap()).unwrap();

    // THEN: Nothing changed
    assert_eq!(decoded, request);
}

#[test]
fn given_every_method_when_round_tripped_then_method_preserved() {
    for request in [
        Request::ping(),
        Request::execute("x = 1", 500),
        Request::query("materials"),
        Request::get_objects(),
        Request::shutdown(),
    ] {
        let decoded = Request::from_bytes(&request.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, request);
    }
}

#[test]
fn given_error_response_with_traceback_when_round_tripped_then_identical() {
    // GIVEN: An error response carrying logs, traceback and data
    let response = Response::error(
        "req-1",
        "ZeroDivisionError: division by zero",
        Some("Traceback (most recent call last): ...".to_string()),
        "partial output\n",
    )
    .with_data("stderr", json!("warning"));

    // WHEN: Encoding then decoding
    let decoded = Response::from_bytes(&response.to_bytes().unwrap()).unwrap();

    // THEN: Every field survives
    assert_eq!(decoded, response);
    assert!(decoded.is_error());
}

#[test]
fn given_success_response_when_encoded_then_error_fields_omitted() {
    let response = Response::success("req-2", JsonMap::new(), "").with_data("pong", json!(true));

    let value = response.to_value();

    assert_eq!(value["jsonrpc"], "2.0");
    assert_eq!(value["result"]["status"], "success");
    assert_eq!(value["result"]["data"]["pong"], true);
    assert!(value["result"].get("error").is_none());
    assert!(value["result"].get("traceback").is_none());
}

#[test]
fn given_wrong_version_when_decoding_request_then_invalid_version() {
    let raw = bytes(json!({"jsonrpc": "1.0", "id": "a", "method": "ping"}));

    let result = Request::from_bytes(&raw);

    assert!(matches!(
        result,
        Err(ProtocolError::InvalidVersion { ref found, .. }) if found == "\"1.0\""
    ));
}

#[test]
fn given_missing_method_when_decoding_request_then_missing_field() {
    let raw = bytes(json!({"jsonrpc": "2.0", "id": "a"}));

    let result = Request::from_bytes(&raw);

    assert!(matches!(
        result,
        Err(ProtocolError::MissingField { field: "method", .. })
    ));
}

/// **VALUE**: Verifies that unknown methods are rejected when decoding.
///
/// **BUG THIS CATCHES**: Would catch a fallback that routes unknown names to some
/// default handler on the host thread instead of failing fast on the transport task.
#[test]
fn given_unknown_method_when_decoding_request_then_unknown_method() {
    let raw = bytes(json!({"jsonrpc": "2.0", "id": "a", "method": "delete_everything"}));

    let result = Request::from_bytes(&raw);

    assert!(matches!(
        result,
        Err(ProtocolError::UnknownMethod { ref method, .. }) if method == "delete_everything"
    ));
}

#[test]
fn given_missing_params_when_decoding_request_then_defaults_applied() {
    let raw = bytes(json!({"jsonrpc": "2.0", "id": "a", "method": "execute_code"}));

    let request = Request::from_bytes(&raw).unwrap();

    assert_eq!(request.params.code, None);
    assert_eq!(request.params.timeout, DEFAULT_TIMEOUT_MS);
    assert!(request.params.extra.is_empty());
}

#[test]
fn given_non_object_json_when_decoding_then_invalid_message() {
    assert!(matches!(
        Request::from_bytes(b"[1, 2, 3]"),
        Err(ProtocolError::InvalidMessage { .. })
    ));
    assert!(matches!(
        Request::from_bytes(b"{not json"),
        Err(ProtocolError::InvalidMessage { .. })
    ));
}

#[test]
fn given_unknown_status_when_decoding_response_then_invalid_status() {
    let raw = bytes(json!({
        "jsonrpc": "2.0",
        "id": "a",
        "result": {"status": "pending", "data": {}, "logs": ""}
    }));

    let result = Response::from_bytes(&raw);

    assert!(matches!(
        result,
        Err(ProtocolError::InvalidStatus { ref status, .. }) if status == "pending"
    ));
}

#[test]
fn given_missing_status_and_data_when_decoding_response_then_error_with_empty_data() {
    let raw = bytes(json!({"jsonrpc": "2.0", "id": "a", "result": {"error": "boom"}}));

    let response = Response::from_bytes(&raw).unwrap();

    assert_eq!(response.result.status, ResponseStatus::Error);
    assert!(response.result.data.is_empty());
    assert_eq!(response.result.logs, "");
    assert_eq!(response.result.error.as_deref(), Some("boom"));
}

#[test]
fn given_invalid_request_with_id_when_peeking_then_id_recovered() {
    let raw = bytes(json!({"jsonrpc": "2.0", "id": "abc", "method": "nope"}));

    assert_eq!(peek_request_id(&raw), "abc");
    assert_eq!(peek_request_id(b"garbage"), "unknown");
}

#[test]
fn given_method_names_when_parsed_then_match_wire_names() {
    for method in Method::ALL {
        assert_eq!(method.as_str().parse::<Method>().unwrap(), method);
    }
}
