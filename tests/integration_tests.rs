//! Integration tests for the kbchat client.
//! These run the real HTTP transport against a local mock service.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kbchat::transport::base_url;
    use kbchat::{
        CredentialPair, CredentialStore, KbClient, MemoryCredentialStore, PipelineOutcome,
        ReqwestTransport, Source, Token,
    };
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ANSWER: &str = concat!(
        "data: {\"type\":\"searching_end\",\"sources\":[{\"filename\":\"handbook.pdf\",\"page\":4}]}\n\n",
        "data: {\"type\":\"content\",\"content\":\"Vacation is \"}\n\n",
        "data: {\"type\":\"content\",\"content\":\"25 days.\"}\n\n",
        "data: [DONE]\n\n",
    );

    fn stream(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.as_bytes().to_vec(), "text/event-stream")
    }

    fn client(server: &MockServer, pair: Option<CredentialPair>) -> (Arc<MemoryCredentialStore>, KbClient) {
        let store = Arc::new(match pair {
            Some(pair) => MemoryCredentialStore::with_pair(pair),
            None => MemoryCredentialStore::new(),
        });
        let client = KbClient::from_parts(
            Arc::new(ReqwestTransport::new().expect("Failed to build transport")),
            store.clone(),
            base_url(&format!("{}/api/", server.uri())).expect("Invalid base URL"),
        )
        .expect("Failed to create client");
        (store, client)
    }

    fn pair(access: &str, refresh: Option<&str>) -> CredentialPair {
        CredentialPair::new(Token::new(access).unwrap(), refresh.and_then(Token::new))
    }

    #[tokio::test]
    async fn test_chat_turn_is_assembled() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(header("authorization", "Bearer A1"))
            .and(body_json(serde_json::json!({"message": "How much vacation?", "use_rag": true})))
            .respond_with(stream(ANSWER))
            .expect(1)
            .mount(&server)
            .await;

        let (_store, client) = client(&server, Some(pair("A1", Some("R1"))));
        let message = client.chat_turn("How much vacation?", true).await;
        assert_eq!(message.content, "Vacation is 25 days.");
        assert_eq!(message.sources, vec![Source::new("handbook.pdf", 4)]);
        assert!(!message.searching);
    }

    #[tokio::test]
    async fn test_expired_credential_is_refreshed_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(header("authorization", "Bearer A1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/refresh"))
            .and(header("authorization", "Bearer R1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 200,
                "message": "ok",
                "data": {"access_token": "A2"}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(header("authorization", "Bearer A2"))
            .respond_with(stream("data: {\"type\":\"content\",\"content\":\"hello\"}\n\ndata: [DONE]\n\n"))
            .expect(1)
            .mount(&server)
            .await;

        let (store, client) = client(&server, Some(pair("A1", Some("R1"))));
        let message = client.chat_turn("hi", false).await;
        assert_eq!(message.content, "hello");

        let stored = store.get();
        assert_eq!(stored.access.as_ref().map(Token::as_str), Some("A2"));
        assert_eq!(stored.refresh.as_ref().map(Token::as_str), Some("R1"));
    }

    #[tokio::test]
    async fn test_unauthorized_without_refresh_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (store, client) = client(&server, Some(pair("A1", None)));
        let outcome = client.chat("hi", true).await;
        assert!(matches!(outcome, PipelineOutcome::AuthFailed));
        assert!(store.get().is_empty());
        assert!(!client.is_authenticated());
    }

    #[tokio::test]
    async fn test_retry_is_not_repeated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 200,
                "message": "ok",
                "data": {"access_token": "A2"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (store, client) = client(&server, Some(pair("A1", Some("R1"))));
        let outcome = client.chat("hi", true).await;
        assert!(matches!(outcome, PipelineOutcome::AuthFailed));
        assert!(store.get().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_credential_format_clears_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(422))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/refresh"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (store, client) = client(&server, Some(pair("A1", Some("R1"))));
        let message = client.chat_turn("hi", true).await;
        assert!(store.get().is_empty());
        assert_eq!(message.content, "Your session has expired. Please log in again.");
    }

    #[tokio::test]
    async fn test_http_error_becomes_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_json(serde_json::json!({"message": "index unavailable"})),
            )
            .mount(&server)
            .await;

        let (store, client) = client(&server, Some(pair("A1", Some("R1"))));
        let message = client.chat_turn("hi", true).await;
        assert_eq!(message.content, "Request failed (500): index unavailable");
        assert!(!store.get().is_empty());
    }

    #[tokio::test]
    async fn test_login_stores_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .and(body_json(serde_json::json!({"username": "ada", "password": "pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": 200,
                "message": "Login successful",
                "data": {"access_token": "A1", "refresh_token": "R1", "username": "ada"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (store, client) = client(&server, None);
        let username = client.login("ada", "pw").await.unwrap();
        assert_eq!(username, "ada");
        assert!(client.is_authenticated());
        assert_eq!(store.get().refresh.as_ref().map(Token::as_str), Some("R1"));
    }

    #[tokio::test]
    async fn test_rejected_login_keeps_store_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({"code": 401, "message": "bad password"})),
            )
            .mount(&server)
            .await;

        let (store, client) = client(&server, None);
        let err = client.login("ada", "nope").await.unwrap_err();
        assert!(err.requires_login());
        assert!(store.get().is_empty());
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_server_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/logout"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let (store, client) = client(&server, Some(pair("A1", Some("R1"))));
        client.logout().await;
        assert!(store.get().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_service() {
        let store = Arc::new(MemoryCredentialStore::with_pair(pair("A1", Some("R1"))));
        let client = KbClient::from_parts(
            Arc::new(ReqwestTransport::new().unwrap()),
            store.clone(),
            base_url("http://127.0.0.1:1/api/").unwrap(),
        )
        .unwrap();
        let message = client.chat_turn("hi", true).await;
        assert!(
            message
                .content
                .starts_with("System error, check the backend connection or network:")
        );
        assert!(!store.get().is_empty());
    }
}
