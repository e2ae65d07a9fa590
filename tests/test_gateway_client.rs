// Integration tests for the HTTP gateway adapter against a mock gateway.

use bytes::Bytes;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use media_stream::{
    Credential, ExportedAuthorization, FileKind, GatewayClient, MediaService, ObjectReference,
    ObjectResolver, RemoteStore, ShardSession, StreamConfig, StreamError,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> GatewayClient {
    GatewayClient::new(server.uri(), 2, Duration::from_secs(5)).unwrap()
}

fn session(shard_id: i32) -> ShardSession {
    ShardSession {
        shard_id,
        credential: Credential::new("cred-4"),
        authenticated: true,
    }
}

fn reference() -> ObjectReference {
    ObjectReference::new(FileKind::Video, 4, 42, 0x5eed)
}

#[tokio::test]
async fn test_resolve_object() {
    let server = MockServer::start().await;
    let reference = reference();

    Mock::given(method("GET"))
        .and(path("/objects/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "file_id": reference.encode(),
            "file_size": 2_500_000u64,
            "mime_type": "video/mp4",
            "file_name": "movie.mp4",
        })))
        .mount(&server)
        .await;

    let metadata = client(&server).resolve_object(42).await.unwrap();

    assert_eq!(metadata.reference, reference);
    assert_eq!(metadata.size, 2_500_000);
    assert_eq!(metadata.mime_type, "video/mp4");
    assert_eq!(metadata.file_name, "movie.mp4");
    assert_eq!(metadata.unique_id, reference.unique_id());
}

#[tokio::test]
async fn test_resolve_prefers_gateway_unique_id() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/objects/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "file_id": reference().encode(),
            "file_unique_id": "AgADxyz",
            "file_size": 10u64,
        })))
        .mount(&server)
        .await;

    let metadata = client(&server).resolve_object(42).await.unwrap();
    assert_eq!(metadata.unique_id, "AgADxyz");
    assert_eq!(metadata.capability_hash(4), "AgAD");
    assert!(metadata.mime_type.is_empty());
}

#[tokio::test]
async fn test_resolve_missing_payload_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/objects/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "file_id": "",
            "file_size": 0u64,
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/objects/8"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such message"))
        .mount(&server)
        .await;

    let gateway = client(&server);
    assert!(matches!(gateway.resolve_object(7).await, Err(StreamError::NotFound(_))));
    assert!(matches!(gateway.resolve_object(8).await, Err(StreamError::NotFound(_))));
}

#[tokio::test]
async fn test_resolve_garbage_reference_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/objects/9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "file_id": "!!not-a-reference!!",
            "file_size": 10u64,
        })))
        .mount(&server)
        .await;

    let err = client(&server).resolve_object(9).await.unwrap_err();
    assert!(matches!(err, StreamError::MalformedReference(_)));
}

#[tokio::test]
async fn test_authorization_handshake() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/shards/4/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "credential": "cred-4" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/shards/4/authorizations/export"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 77, "bytes": "ZXhwb3J0ZWQ=" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/shards/4/authorizations/import"))
        .and(header("authorization", "Bearer cred-4"))
        .and(body_json(json!({ "id": 77, "bytes": "ZXhwb3J0ZWQ=" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = client(&server);
    let credential = gateway.create_session(4).await.unwrap();
    assert_eq!(credential.as_str(), "cred-4");

    let authorization = gateway.export_authorization(4).await.unwrap();
    assert_eq!(authorization.id, 77);
    assert_eq!(authorization.bytes, Bytes::from_static(b"exported"));

    gateway
        .import_authorization(4, &credential, &authorization)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_import_rejected_bytes() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/shards/4/authorizations/import"))
        .respond_with(ResponseTemplate::new(401).set_body_string("AUTH_BYTES_INVALID"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/shards/5/authorizations/import"))
        .respond_with(ResponseTemplate::new(401).set_body_string("SESSION_REVOKED"))
        .mount(&server)
        .await;

    let gateway = client(&server);
    let credential = Credential::new("cred");
    let authorization = ExportedAuthorization {
        id: 1,
        bytes: Bytes::from_static(b"x"),
    };

    let err = gateway
        .import_authorization(4, &credential, &authorization)
        .await
        .unwrap_err();
    assert!(matches!(err, StreamError::AuthBytesInvalid { shard_id: 4 }));

    let err = gateway
        .import_authorization(5, &credential, &authorization)
        .await
        .unwrap_err();
    assert!(matches!(err, StreamError::UpstreamRejected { status: 401, .. }));
}

#[tokio::test]
async fn test_read_chunk() {
    let server = MockServer::start().await;
    let reference = reference();

    Mock::given(method("GET"))
        .and(path("/shards/4/chunks"))
        .and(header("authorization", "Bearer cred-4"))
        .and(query_param("location", reference.encode().as_str()))
        .and(query_param("offset", "1048576"))
        .and(query_param("limit", "1048576"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 1024]))
        .mount(&server)
        .await;

    let chunk = client(&server)
        .read_chunk(&session(4), &reference, 1_048_576, 1_048_576)
        .await
        .unwrap();
    assert_eq!(chunk.len(), 1024);
    assert!(chunk.iter().all(|&b| b == 7));
}

#[tokio::test]
async fn test_read_chunk_error_mapping() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/shards/4/chunks"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/shards/5/chunks"))
        .respond_with(ResponseTemplate::new(503).set_body_string("flood wait"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/shards/6/chunks"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad offset"))
        .mount(&server)
        .await;

    let gateway = client(&server);
    let reference = reference();

    let err = gateway.read_chunk(&session(4), &reference, 0, 1024).await.unwrap_err();
    assert!(err.invalidates_session());

    let err = gateway.read_chunk(&session(5), &reference, 0, 1024).await.unwrap_err();
    assert!(matches!(err, StreamError::UpstreamTransient(_)));
    assert!(err.should_retry());

    let err = gateway.read_chunk(&session(6), &reference, 0, 1024).await.unwrap_err();
    assert!(matches!(err, StreamError::UpstreamRejected { status: 400, .. }));
}

#[tokio::test]
async fn test_slow_gateway_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/shards/4/sessions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "credential": "late" }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let gateway = GatewayClient::new(server.uri(), 2, Duration::from_millis(200)).unwrap();
    let err = gateway.create_session(4).await.unwrap_err();
    assert!(matches!(err, StreamError::Timeout(_)));
}

#[tokio::test]
async fn test_close_session_tolerates_refusal() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/shards/4/sessions"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = client(&server);
    assert!(gateway.close_session(4, &Credential::new("cred")).await.is_ok());
}

#[tokio::test]
async fn test_service_streams_through_gateway() {
    let server = MockServer::start().await;
    let reference = reference();
    let data: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();

    Mock::given(method("GET"))
        .and(path("/objects/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "file_id": reference.encode(),
            "file_size": 4096u64,
            "mime_type": "video/mp4",
            "file_name": "clip.mp4",
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/shards/4/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "credential": "cred-4" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/shards/4/authorizations/export"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": 1, "bytes": "YQ==" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/shards/4/authorizations/import"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/shards/4/chunks"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(data.clone()))
        .mount(&server)
        .await;

    let config = StreamConfig {
        gateway_url: server.uri(),
        ..StreamConfig::default()
    };
    let service = MediaService::from_config(config).unwrap();

    let uri = format!("/stream/42?hash={}", reference.capability_hash(6));
    let (parts, _) = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("range", "bytes=1000-1999")
        .body(())
        .unwrap()
        .into_parts();

    let response = service.server().route(parts).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], &data[1000..2000]);
}
