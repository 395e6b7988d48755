use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

use juben_core::{
    ChatOptions, ClientContext, ErrorPolicy, FileAttachment, FileStore, IdentityStore,
    JubenConfig, JubenError, ReqwestClient, SessionController, SessionState,
};

fn sse(frames: &[&str]) -> String {
    frames
        .iter()
        .map(|frame| format!("data: {}\n\n", frame))
        .collect()
}

fn config_for(server: &MockServer) -> JubenConfig {
    let mut config = JubenConfig::default();
    config.api.base_url = server.uri();
    config.api.retry_delay_ms = 1;
    config.api.request_timeout_ms = 2_000;
    config
}

fn file_controller(server: &MockServer, dir: &TempDir) -> SessionController {
    let mut config = config_for(server);
    config.storage.path = Some(dir.path().join("identity.json"));
    SessionController::new(ClientContext::from_config(&config).unwrap())
}

mod conversation_tests {
    use super::*;

    #[tokio::test]
    async fn test_full_conversation_keeps_session() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let controller = file_controller(&server, &dir);
        let session_id = controller.current_session_id();

        Mock::given(method("POST"))
            .and(path("/juben/short_drama_creator"))
            .and(body_partial_json(json!({"session_id": session_id})))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse(&[
                r#"{"type":"content","content":"Scene 1"}"#,
                r#"{"type":"complete","content":"","payload":{"content_type":"summary","data":{"scenes":1}}}"#,
            ])))
            .expect(2)
            .mount(&server)
            .await;

        for _ in 0..2 {
            let completion = controller
                .send_message("short_drama_creator", "continue", ChatOptions::new())
                .await
                .unwrap()
                .into_completion()
                .await
                .unwrap();
            assert_eq!(completion.content, "Scene 1");
            assert!(!completion.synthesized);
            assert_eq!(completion.metadata.unwrap().content_type, "summary");
        }

        assert_eq!(controller.current_session_id(), session_id);
    }

    #[tokio::test]
    async fn test_identity_survives_new_controller() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();

        let first = file_controller(&server, &dir);
        let user = first.current_user_id();
        let session = first.current_session_id();
        drop(first);

        let second = file_controller(&server, &dir);
        assert_eq!(second.current_user_id(), user);
        assert_eq!(second.current_session_id(), session);

        let rotated = second.create_new_session();
        assert_ne!(rotated, session);

        let third = file_controller(&server, &dir);
        assert_eq!(third.current_user_id(), user);
        assert_eq!(third.current_session_id(), rotated);
    }

    #[tokio::test]
    async fn test_options_and_files_reach_backend() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let controller = file_controller(&server, &dir);

        Mock::given(method("POST"))
            .and(path("/juben/short_drama_evaluator"))
            .and(body_partial_json(json!({
                "request_data": {
                    "query": "rate this",
                    "agent_type": "short_drama_evaluator",
                    "evaluation_type": "script",
                    "background": {"genre": "suspense"},
                    "files": [{"type": "txt", "name": "draft.txt", "content": "Act one"}]
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse(&[
                r#"{"type":"content","content":"8/10"}"#,
                "[DONE]",
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let options = ChatOptions::new()
            .with_evaluation_type("script")
            .with_background("genre", "suspense")
            .with_file(FileAttachment::new("txt", "draft.txt", "Act one"));

        let completion = controller
            .send_message("short_drama_evaluator", "rate this", options)
            .await
            .unwrap()
            .into_completion()
            .await
            .unwrap();

        assert_eq!(completion.content, "8/10");
    }
}

mod error_flow_tests {
    use super::*;

    #[tokio::test]
    async fn test_agent_errors_do_not_end_default_stream() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let controller = file_controller(&server, &dir);

        Mock::given(method("POST"))
            .and(path("/juben/agent"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse(&[
                r#"{"type":"content","content":"a"}"#,
                r#"{"type":"error","content":"tool lookup failed"}"#,
                "not json",
                r#"{"type":"content","content":"b"}"#,
            ])))
            .mount(&server)
            .await;

        let mut stream = controller
            .send_message("agent", "go", ChatOptions::new())
            .await
            .unwrap();
        let events: Vec<_> = (&mut stream).collect().await;

        assert_eq!(events.len(), 4);
        assert_eq!(events.iter().filter(|e| e.is_error()).count(), 2);
        assert_eq!(stream.state(), SessionState::Completed);
        assert_eq!(stream.content(), "ab");

        let completion = stream.into_completion().await.unwrap();
        assert!(completion.synthesized);
    }

    #[tokio::test]
    async fn test_stop_on_error_fails_the_exchange() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let controller = file_controller(&server, &dir);

        Mock::given(method("POST"))
            .and(path("/juben/agent"))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse(&[
                r#"{"type":"content","content":"a"}"#,
                r#"{"type":"error","content":"quota exceeded"}"#,
                r#"{"type":"content","content":"never"}"#,
            ])))
            .mount(&server)
            .await;

        let stream = controller
            .send_message_with_policy("agent", "go", ChatOptions::new(), ErrorPolicy::StopOnError)
            .await
            .unwrap();

        let err = stream.into_completion().await.unwrap_err();
        assert!(matches!(err, JubenError::TerminalEvent(ref msg) if msg == "quota exceeded"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_last_status() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let controller = file_controller(&server, &dir);

        Mock::given(method("POST"))
            .and(path("/juben/agent"))
            .respond_with(ResponseTemplate::new(502).set_body_string("upstream down"))
            .expect(3)
            .mount(&server)
            .await;

        let err = controller
            .send_message("agent", "go", ChatOptions::new())
            .await
            .err()
            .unwrap();

        assert!(matches!(err, JubenError::HttpStatus { status: 502, .. }));
        assert!(err.is_transient());

        let stats = controller.context().monitor().stats();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.success_rate, 0.0);
    }
}

mod remote_session_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_chat_then_delete() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let controller = file_controller(&server, &dir);
        let user = controller.current_user_id();

        Mock::given(method("POST"))
            .and(path(format!("/juben/sessions/{}", user)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {"session_id": "remote-42"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/juben/agent"))
            .and(body_partial_json(json!({"session_id": "remote-42"})))
            .respond_with(ResponseTemplate::new(200).set_body_string(sse(&["[DONE]"])))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("DELETE"))
            .and(path_regex(r"^/juben/sessions/[^/]+/remote-42$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .expect(1)
            .mount(&server)
            .await;

        let created = controller.create_remote_session().await.unwrap();
        assert_eq!(created.session_id, "remote-42");
        assert_eq!(controller.current_session_id(), "remote-42");

        let completion = controller
            .send_message("agent", "hello", ChatOptions::new())
            .await
            .unwrap()
            .into_completion()
            .await
            .unwrap();
        assert!(completion.content.is_empty());

        controller.delete_session("remote-42").await.unwrap();
        assert_ne!(controller.current_session_id(), "remote-42");
    }

    #[tokio::test]
    async fn test_shared_context_shares_identity() {
        let server = MockServer::start().await;
        let client = ReqwestClient::new(std::time::Duration::from_secs(2)).unwrap();
        let ctx = Arc::new(ClientContext::new(
            config_for(&server),
            Arc::new(IdentityStore::in_memory()),
            Arc::new(client),
        ));

        let a = SessionController::from_shared(ctx.clone());
        let b = SessionController::from_shared(ctx);

        let rotated = a.create_new_session();
        assert_eq!(b.current_session_id(), rotated);
        assert_eq!(a.current_user_id(), b.current_user_id());
    }
}

mod storage_fallback_tests {
    use super::*;

    #[tokio::test]
    async fn test_unwritable_storage_still_yields_ids() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();

        let store = FileStore::new(blocker.join("identity.json"));
        let identity = IdentityStore::new(Arc::new(store));

        let user = identity.get_or_create_user_id();
        assert!(user.starts_with("user_"));
        assert_eq!(identity.get_or_create_user_id(), user);
    }
}
