//! Drives real `loom_agent::{LlmAgent, CustomAgent}` instances through a
//! `Runner`, instead of the bare `Agent` stubs used by `loom-runner`'s own
//! unit tests. Exercises the model/tool loop and the custom-agent
//! before/after chain end to end against an in-memory session.

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use loom_agent::{CustomAgent, LlmAgent, LlmAgentBuilder};
use loom_core::{
    Content, FunctionCall, Llm, LlmRequest, LlmResponse, LlmResponseStream, Part, Result,
};
use loom_runner::{Runner, RunnerConfig};
use loom_session::{InMemorySessionService, SessionService};
use loom_tool::FunctionTool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Replies with one function call, then a final text response on the
/// following call — just enough to drive `LlmAgent`'s tool loop twice.
struct ScriptedLlm {
    calls: AtomicUsize,
}

#[async_trait]
impl Llm for ScriptedLlm {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate_content(&self, _req: LlmRequest, _stream: bool) -> Result<LlmResponseStream> {
        let turn = self.calls.fetch_add(1, Ordering::SeqCst);
        let response = if turn == 0 {
            let call = FunctionCall { name: "get_weather".to_string(), id: Some("call-1".to_string()), args: serde_json::json!({"city": "paris"}) };
            LlmResponse::new(Content::new("model").with_part(Part::function_call(call)))
        } else {
            LlmResponse::new(Content::new("model").with_text("it's sunny in paris"))
        };
        let s = stream! { yield Ok(response); };
        Ok(Box::pin(s))
    }
}

async fn seeded_session_service(app_name: &str, user_id: &str, session_id: &str) -> Arc<InMemorySessionService> {
    let service = Arc::new(InMemorySessionService::new());
    service
        .create(loom_session::CreateRequest {
            app_name: app_name.to_string(),
            user_id: user_id.to_string(),
            session_id: Some(session_id.to_string()),
            state: Default::default(),
        })
        .await
        .unwrap();
    service
}

#[tokio::test]
async fn test_llm_agent_completes_a_tool_call_then_final_response() {
    let weather_tool = Arc::new(FunctionTool::new("get_weather", "look up the weather", |_ctx, args| async move {
        let city = args.get("city").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
        Ok(serde_json::json!({ "city": city, "forecast": "sunny" }))
    }));

    let agent = Arc::new(
        LlmAgentBuilder::new("weather_agent")
            .description("answers weather questions")
            .model(Arc::new(ScriptedLlm { calls: AtomicUsize::new(0) }))
            .tool(weather_tool)
            .build()
            .unwrap(),
    ) as Arc<dyn loom_core::Agent>;

    let session_service = seeded_session_service("app", "user", "s1").await;
    let runner = Runner::new(RunnerConfig {
        app_name: "app".to_string(),
        agent,
        session_service,
        artifact_service: None,
        memory_service: None,
        plugins: vec![],
        run_config: None,
    })
    .unwrap();

    let stream = runner.run("user".to_string(), "s1".to_string(), Content::new("user").with_text("what's the weather in paris?")).await.unwrap();
    let events: Vec<_> = stream.collect::<Vec<_>>().await.into_iter().map(|e| e.unwrap()).collect();

    assert_eq!(events[0].author, "user");
    let final_event = events.last().unwrap();
    assert_eq!(final_event.author, "weather_agent");
    assert_eq!(final_event.llm_response.content.as_ref().unwrap().text(), "it's sunny in paris");

    // the function call and its response are both somewhere in the committed history
    assert!(events.iter().any(|e| !e.llm_response.content.as_ref().map(|c| c.function_calls()).unwrap_or_default().is_empty()));
}

#[tokio::test]
async fn test_custom_agent_transfers_into_an_llm_agent() {
    let llm = Arc::new(
        LlmAgentBuilder::new("specialist")
            .description("handles escalated questions")
            .model(Arc::new(ScriptedLlm { calls: AtomicUsize::new(1) }))
            .build()
            .unwrap(),
    ) as Arc<dyn loom_core::Agent>;

    let specialist = llm.clone();
    let router = Arc::new(
        CustomAgent::builder("router")
            .description("routes everything to the specialist")
            .sub_agent(specialist.clone())
            .handler(move |ctx| {
                let invocation_id = ctx.invocation_id().to_string();
                async move {
                    let s = stream! {
                        let mut event = loom_core::Event::new(&invocation_id);
                        event.author = "router".to_string();
                        event.actions = loom_core::EventActions { transfer_to_agent: Some("specialist".to_string()), ..Default::default() };
                        yield Ok(event);
                    };
                    Ok(Box::pin(s) as loom_core::EventStream)
                }
            })
            .build()
            .unwrap(),
    ) as Arc<dyn loom_core::Agent>;

    let session_service = seeded_session_service("app", "user", "s1").await;
    let runner = Runner::new(RunnerConfig {
        app_name: "app".to_string(),
        agent: router,
        session_service,
        artifact_service: None,
        memory_service: None,
        plugins: vec![],
        run_config: None,
    })
    .unwrap();

    let stream = runner.run("user".to_string(), "s1".to_string(), Content::new("user").with_text("escalate this")).await.unwrap();
    let events: Vec<_> = stream.collect::<Vec<_>>().await.into_iter().map(|e| e.unwrap()).collect();

    assert_eq!(events[0].author, "user");
    assert_eq!(events[1].author, "router");
    assert_eq!(events[1].actions.transfer_to_agent, Some("specialist".to_string()));
    let final_event = events.last().unwrap();
    assert_eq!(final_event.author, "specialist");
    assert_eq!(final_event.llm_response.content.as_ref().unwrap().text(), "it's sunny in paris");
}
