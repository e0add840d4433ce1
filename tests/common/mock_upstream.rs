//! Mock completion provider for testing

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::dev::ServerHandle;
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
use serde_json::{Value, json};

/// How the mock answers chat completion requests
#[derive(Debug, Clone)]
pub enum UpstreamBehavior {
    /// Answer with a fixed reply
    Reply(String),
    /// Answer with "echo: " followed by the last message content
    EchoLast,
    /// 200 with an empty `choices` list
    EmptyChoices,
    /// 200 with an empty message content
    EmptyContent,
    /// Error status with a small JSON body
    Status(u16),
    /// 200 with a body that is not JSON
    Garbage,
    /// Wait before answering as the inner behavior
    Delayed(Duration, Box<UpstreamBehavior>),
}

/// A request as the mock saw it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub body: Value,
    pub authorization: Option<String>,
    pub referer: Option<String>,
    pub title: Option<String>,
    pub content_type: Option<String>,
}

impl RecordedRequest {
    /// `(role, content)` pairs of the request's message list
    pub fn messages(&self) -> Vec<(String, String)> {
        self.body["messages"]
            .as_array()
            .map(|messages| {
                messages
                    .iter()
                    .map(|m| {
                        (
                            m["role"].as_str().unwrap_or_default().to_string(),
                            m["content"].as_str().unwrap_or_default().to_string(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

struct MockState {
    behavior: Mutex<UpstreamBehavior>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Mock OpenAI-compatible chat completion server
pub struct MockUpstream {
    addr: SocketAddr,
    state: Arc<MockState>,
    handle: ServerHandle,
}

impl MockUpstream {
    /// Start the mock on an ephemeral port. Must run inside an actix runtime.
    pub async fn start(behavior: UpstreamBehavior) -> Self {
        let state = Arc::new(MockState {
            behavior: Mutex::new(behavior),
            requests: Mutex::new(Vec::new()),
        });
        let data = web::Data::from(state.clone());

        let server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .route("/v1/chat/completions", web::post().to(mock_chat_completions))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .expect("Failed to bind mock upstream");

        let addr = server.addrs()[0];
        let server = server.run();
        let handle = server.handle();
        actix_web::rt::spawn(server);

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}/v1/chat/completions", self.addr)
    }

    pub fn set_behavior(&self, behavior: UpstreamBehavior) {
        *self.state.behavior.lock().unwrap() = behavior;
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.state.requests.lock().unwrap().last().cloned()
    }

    pub async fn stop(self) {
        self.handle.stop(true).await;
    }
}

/// An endpoint nothing is listening on
pub fn unreachable_endpoint() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/v1/chat/completions", port)
}

fn completion_body(content: Value) -> Value {
    json!({
        "id": "chatcmpl-123456789",
        "object": "chat.completion",
        "created": 1677652288,
        "model": "openai/gpt-3.5-turbo",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": content
            },
            "finish_reason": "stop"
        }]
    })
}

async fn mock_chat_completions(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<MockState>,
) -> HttpResponse {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let body: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);

    state.requests.lock().unwrap().push(RecordedRequest {
        body: body.clone(),
        authorization: header("authorization"),
        referer: header("http-referer"),
        title: header("x-title"),
        content_type: header("content-type"),
    });

    let mut behavior = state.behavior.lock().unwrap().clone();
    while let UpstreamBehavior::Delayed(delay, inner) = behavior {
        actix_web::rt::time::sleep(delay).await;
        behavior = *inner;
    }

    match behavior {
        UpstreamBehavior::Reply(text) => HttpResponse::Ok().json(completion_body(json!(text))),
        UpstreamBehavior::EchoLast => {
            let last = body["messages"]
                .as_array()
                .and_then(|messages| messages.last())
                .and_then(|m| m["content"].as_str())
                .unwrap_or_default()
                .to_string();
            HttpResponse::Ok().json(completion_body(json!(format!("echo: {}", last))))
        }
        UpstreamBehavior::EmptyChoices => HttpResponse::Ok().json(json!({
            "id": "chatcmpl-123456789",
            "object": "chat.completion",
            "choices": []
        })),
        UpstreamBehavior::EmptyContent => HttpResponse::Ok().json(completion_body(json!(""))),
        UpstreamBehavior::Status(status) => HttpResponse::build(
            actix_web::http::StatusCode::from_u16(status).unwrap(),
        )
        .json(json!({"error": {"message": "mock upstream failure", "code": status}})),
        UpstreamBehavior::Garbage => HttpResponse::Ok()
            .content_type("application/json")
            .body("this is not json"),
        UpstreamBehavior::Delayed(..) => unreachable!(),
    }
}
