#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use taskpilot_core::{PromptMessage, TaskPilotError};
    use taskpilot_llm::mock::{MockProvider, MockResponse};
    use taskpilot_llm::provider::{LlmProvider, LlmRequest, LlmResponse, extract_completion_text};
    use taskpilot_llm::router::ModelRouter;

    fn make_request(model: &str) -> LlmRequest {
        LlmRequest::new(
            model,
            vec![PromptMessage::system("You are helpful"), PromptMessage::user("Hello")],
        )
    }

    fn fast_router() -> ModelRouter {
        ModelRouter::new().with_base_delay(Duration::from_millis(1))
    }

    // ── Response extraction ────────────────────────────────────

    #[test]
    fn test_extract_workers_ai_shapes() {
        assert_eq!(extract_completion_text(&json!({"response": "hi"})).as_deref(), Some("hi"));
        assert_eq!(
            extract_completion_text(&json!({"result": {"response": "nested"}, "success": true}))
                .as_deref(),
            Some("nested")
        );
    }

    #[test]
    fn test_extract_openai_and_ollama_shapes() {
        let openai = json!({"choices": [{"message": {"role": "assistant", "content": "chat"}}]});
        assert_eq!(extract_completion_text(&openai).as_deref(), Some("chat"));
        let legacy = json!({"choices": [{"text": "legacy"}]});
        assert_eq!(extract_completion_text(&legacy).as_deref(), Some("legacy"));
        let ollama = json!({"message": {"role": "assistant", "content": "local"}});
        assert_eq!(extract_completion_text(&ollama).as_deref(), Some("local"));
        let blocks = json!({"content": [{"type": "text", "text": "block"}]});
        assert_eq!(extract_completion_text(&blocks).as_deref(), Some("block"));
        assert_eq!(extract_completion_text(&json!("bare")).as_deref(), Some("bare"));
    }

    #[test]
    fn test_extract_priority_order() {
        let both = json!({
            "response": "top",
            "result": {"response": "second"},
            "choices": [{"message": {"content": "third"}}]
        });
        assert_eq!(extract_completion_text(&both).as_deref(), Some("top"));

        // blank candidates fall through to the next field
        let blank = json!({"response": "  ", "result": {"response": "used"}});
        assert_eq!(extract_completion_text(&blank).as_deref(), Some("used"));
    }

    #[test]
    fn test_extract_unrecognized_shapes() {
        assert!(extract_completion_text(&json!(null)).is_none());
        assert!(extract_completion_text(&json!({"output": "x"})).is_none());
        assert!(extract_completion_text(&json!({"response": 42})).is_none());
        assert!(extract_completion_text(&json!({"choices": []})).is_none());
        assert!(LlmResponse::new(json!({})).text().is_none());
    }

    #[test]
    fn test_request_messages_json() {
        let req = make_request("x/y");
        let msgs = req.messages_json();
        assert_eq!(msgs[0], json!({"role": "system", "content": "You are helpful"}));
        assert_eq!(msgs[1]["role"], "user");
    }

    // ── Router resolve / complete ──────────────────────────────

    #[tokio::test]
    async fn test_complete_with_prefix_resolution() {
        let mock = MockProvider::new("testprovider").with_response("Hello from mock!");
        let requests = mock.recorded_requests();
        let mut router = ModelRouter::new();
        router.add_provider(Arc::new(mock));
        let resp = router
            .complete(&make_request("testprovider/@cf/meta/llama"), None)
            .await
            .unwrap();
        assert_eq!(resp.text().as_deref(), Some("Hello from mock!"));
        // prefix stripped before the provider sees the model
        assert_eq!(requests.lock().unwrap()[0].model, "@cf/meta/llama");
    }

    #[tokio::test]
    async fn test_resolve_by_model_list() {
        let mock = MockProvider::new("other").with_response("by list");
        let mut router = ModelRouter::new();
        router.add_provider(Arc::new(mock));
        let resp = router.complete(&make_request("mock/test-model"), None).await.unwrap();
        assert_eq!(resp.text().as_deref(), Some("by list"));
    }

    #[tokio::test]
    async fn test_model_not_found() {
        let router = ModelRouter::new();
        assert!(router.is_empty());
        let result = router.complete(&make_request("nonexistent/model"), None).await;
        assert!(matches!(result, Err(TaskPilotError::ModelNotFound(_))));
    }

    #[tokio::test]
    async fn test_non_retryable_error_surfaces() {
        let mock = MockProvider::new("p").with_error("bad request");
        let requests = mock.recorded_requests();
        let mut router = fast_router();
        router.add_provider(Arc::new(mock));
        let err = router.complete(&make_request("p/m"), None).await.unwrap_err();
        assert!(err.to_string().contains("bad request"));
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let mock = MockProvider::new("p")
            .with_error("HTTP 503 Service Unavailable: p: busy")
            .with_response("recovered");
        let requests = mock.recorded_requests();
        let mut router = fast_router();
        router.add_provider(Arc::new(mock));
        let resp = router.complete(&make_request("p/m"), None).await.unwrap();
        assert_eq!(resp.text().as_deref(), Some("recovered"));
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failover_to_fallback() {
        let primary = MockProvider::new("primary");
        for _ in 0..4 {
            primary.push(MockResponse::error("HTTP 500 Internal Server Error: primary"));
        }
        let fallback = MockProvider::new("fallback").with_response("Fallback reply");

        let mut router = fast_router();
        router.add_provider(Arc::new(primary));
        router.add_provider(Arc::new(fallback));

        let resp = router
            .complete(&make_request("primary/model"), Some("fallback/model"))
            .await
            .unwrap();
        assert_eq!(resp.text().as_deref(), Some("Fallback reply"));
    }

    #[tokio::test]
    async fn test_circuit_opens_after_repeated_failures() {
        let primary = MockProvider::new("primary");
        for _ in 0..5 {
            primary.push(MockResponse::error("invalid api key"));
        }
        let requests = primary.recorded_requests();
        let fallback = MockProvider::new("fallback");
        for _ in 0..6 {
            fallback.push(MockResponse::text("ok"));
        }

        let mut router = fast_router();
        router.add_provider(Arc::new(primary));
        router.add_provider(Arc::new(fallback));

        for _ in 0..6 {
            router
                .complete(&make_request("primary/m"), Some("fallback/m"))
                .await
                .unwrap();
        }
        // the sixth call skipped the open circuit
        assert_eq!(requests.lock().unwrap().len(), 5);
    }

    // ── Mock provider ──────────────────────────────────────────

    #[tokio::test]
    async fn test_mock_raw_and_empty_queue() {
        let mock = MockProvider::new("m").with_raw(json!({"weird": true}));
        let req = make_request("m/x");
        let resp = mock.complete(&req).await.unwrap();
        assert!(resp.text().is_none());
        let resp = mock.complete(&req).await.unwrap();
        assert!(resp.text().unwrap().contains("no more queued"));
    }

    #[tokio::test]
    async fn test_mock_delay() {
        let mock = MockProvider::new("m")
            .with_mock_response(MockResponse::text("slow").delayed(Duration::from_millis(50)));
        let req = make_request("m/x");
        let result = tokio::time::timeout(Duration::from_millis(5), mock.complete(&req)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_health_check_all() {
        let mut router = ModelRouter::new();
        router.add_provider(Arc::new(MockProvider::new("good")));
        router.add_provider(Arc::new(MockProvider::new("bad").unhealthy()));
        let results = router.health_check_all().await;
        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
        assert_eq!(router.provider_names(), vec!["good", "bad"]);
    }
}
