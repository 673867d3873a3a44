//! Mock analysis backend and storage for integration tests.
#![allow(dead_code)]

use serde_json::{json, Value};
use std::convert::Infallible;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use swing_submit::config::SubmitConfig;
use swing_submit::submission::{
    AnalysisRecord, AnalysisStore, FeedbackRecord, SubmissionMetadata, VideoFile,
};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::Filter;

pub const OBJECT_KEY: &str = "uploads/abc.mp4";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Health {
    Json,
    PlainText,
    Unavailable,
}

#[derive(Debug, Clone)]
pub enum Finish {
    Done(Value),
    /// `{"status":"done"}` with no result once, then done with the value
    DoneWithoutResult(Value),
    Error(String),
    Never,
}

#[derive(Debug, Clone)]
pub struct MockConfig {
    pub health: Health,
    pub health_delay: Duration,
    pub authorize_status: u16,
    pub storage_status: u16,
    pub notify_status: u16,
    /// "running" responses served before the finish response
    pub running_polls: usize,
    /// Status call indices answered with a 500
    pub failing_polls: Vec<usize>,
    /// Status call indices answered with a 200 whose body is not JSON
    pub garbled_polls: Vec<usize>,
    pub finish: Finish,
    pub direct_status: u16,
    pub direct_result: Value,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            health: Health::Json,
            health_delay: Duration::ZERO,
            authorize_status: 200,
            storage_status: 204,
            notify_status: 200,
            running_polls: 0,
            failing_polls: Vec::new(),
            garbled_polls: Vec::new(),
            finish: Finish::Done(json!({"score": 8})),
            direct_status: 200,
            direct_result: json!({"swing_score": 7, "feedback": ["keep your eye on the ball"]}),
        }
    }
}

#[derive(Debug, Default)]
pub struct MockState {
    pub health_calls: AtomicUsize,
    pub authorize_calls: AtomicUsize,
    pub storage_calls: AtomicUsize,
    pub notify_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub direct_calls: AtomicUsize,
    pub save_analysis_calls: AtomicUsize,
    pub save_feedback_calls: AtomicUsize,
    pub authorize_body: Mutex<Option<Value>>,
    pub storage_body: Mutex<Vec<u8>>,
    pub notify_body: Mutex<Option<Value>>,
    pub direct_body: Mutex<Vec<u8>>,
    pub save_analysis_body: Mutex<Option<Value>>,
    pub save_feedback_body: Mutex<Option<Value>>,
}

impl MockState {
    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> usize {
        Self::count(&self.authorize_calls)
            + Self::count(&self.storage_calls)
            + Self::count(&self.notify_calls)
            + Self::count(&self.status_calls)
            + Self::count(&self.direct_calls)
    }

    pub fn persist_calls(&self) -> usize {
        Self::count(&self.save_analysis_calls) + Self::count(&self.save_feedback_calls)
    }

    pub fn total_calls(&self) -> usize {
        Self::count(&self.health_calls) + self.upload_calls() + self.persist_calls()
    }
}

pub struct MockBackend {
    pub url: String,
    pub state: Arc<MockState>,
}

fn json_reply(status: u16, body: Value) -> warp::reply::WithStatus<warp::reply::Json> {
    let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    warp::reply::with_status(warp::reply::json(&body), code)
}

/// Serve the backend routes and a storage endpoint on an ephemeral loopback port
pub fn spawn_backend(config: MockConfig) -> MockBackend {
    let state = Arc::new(MockState::default());

    let health = {
        let state = state.clone();
        let mode = config.health;
        let delay = config.health_delay;
        warp::path!("health").and(warp::get()).and_then(move || {
            let state = state.clone();
            async move {
                state.health_calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                let reply: Box<dyn warp::Reply> = match mode {
                    Health::Json => Box::new(json_reply(200, json!({"status": "healthy"}))),
                    Health::PlainText => Box::new(warp::reply::html("<html>router login</html>")),
                    Health::Unavailable => Box::new(json_reply(503, json!({"status": "down"}))),
                };
                Ok::<_, Infallible>(reply)
            }
        })
    };

    let authorize = {
        let state = state.clone();
        let status = config.authorize_status;
        warp::path!("upload-url")
            .and(warp::post())
            .and(warp::header::<String>("host"))
            .and(warp::body::json())
            .map(move |host: String, body: Value| {
                state.authorize_calls.fetch_add(1, Ordering::SeqCst);
                *state.authorize_body.lock().unwrap() = Some(body);
                if status != 200 {
                    return json_reply(status, json!({"error": "authorization denied"}));
                }
                json_reply(
                    200,
                    json!({
                        "presigned": {
                            "url": format!("http://{}/storage", host),
                            "fields": {
                                "key": OBJECT_KEY,
                                "policy": "cG9saWN5",
                                "x-amz-signature": "5ig"
                            }
                        },
                        "s3_key": OBJECT_KEY
                    }),
                )
            })
    };

    let storage = {
        let state = state.clone();
        let status = config.storage_status;
        warp::path!("storage")
            .and(warp::post())
            .and(warp::body::bytes())
            .map(move |body: Bytes| {
                state.storage_calls.fetch_add(1, Ordering::SeqCst);
                *state.storage_body.lock().unwrap() = body.to_vec();
                let code = StatusCode::from_u16(status).unwrap_or(StatusCode::FORBIDDEN);
                warp::reply::with_status(warp::reply(), code)
            })
    };

    let notify = {
        let state = state.clone();
        let status = config.notify_status;
        warp::path!("notify")
            .and(warp::post())
            .and(warp::body::json())
            .map(move |body: Value| {
                state.notify_calls.fetch_add(1, Ordering::SeqCst);
                *state.notify_body.lock().unwrap() = Some(body);
                if status != 200 {
                    return json_reply(status, json!({"error": "queue unavailable"}));
                }
                json_reply(200, json!({"job_id": "J1"}))
            })
    };

    let status = {
        let state = state.clone();
        let running_polls = config.running_polls;
        let failing_polls = config.failing_polls.clone();
        let garbled_polls = config.garbled_polls.clone();
        let finish = config.finish.clone();
        let finishes = Arc::new(AtomicUsize::new(0));
        warp::path!("status" / String)
            .and(warp::get())
            .map(move |job_id: String| -> Box<dyn warp::Reply> {
                let served = state.status_calls.fetch_add(1, Ordering::SeqCst);
                if job_id != "J1" {
                    return Box::new(json_reply(404, json!({"error": "unknown job"})));
                }
                if failing_polls.contains(&served) {
                    return Box::new(json_reply(500, json!({"error": "worker restarting"})));
                }
                if garbled_polls.contains(&served) {
                    return Box::new(warp::reply::html("<html>502 Bad Gateway</html>"));
                }
                if served < running_polls {
                    return Box::new(json_reply(200, json!({"status": "running"})));
                }
                let finished_before = finishes.fetch_add(1, Ordering::SeqCst);
                let body = match finish {
                    Finish::Done(ref result) => json!({"status": "done", "result": result}),
                    Finish::DoneWithoutResult(_) if finished_before == 0 => {
                        json!({"status": "done"})
                    }
                    Finish::DoneWithoutResult(ref result) => {
                        json!({"status": "done", "result": result})
                    }
                    Finish::Error(ref message) => json!({"status": "error", "error": message}),
                    Finish::Never => json!({"status": "running"}),
                };
                Box::new(json_reply(200, body))
            })
    };

    let save_analysis = {
        let state = state.clone();
        warp::path!("save-analysis-data")
            .and(warp::post())
            .and(warp::body::json())
            .map(move |body: Value| {
                state.save_analysis_calls.fetch_add(1, Ordering::SeqCst);
                *state.save_analysis_body.lock().unwrap() = Some(body);
                json_reply(200, json!({"success": true}))
            })
    };

    let save_feedback = {
        let state = state.clone();
        warp::path!("save-feedback")
            .and(warp::post())
            .and(warp::body::json())
            .map(move |body: Value| {
                state.save_feedback_calls.fetch_add(1, Ordering::SeqCst);
                *state.save_feedback_body.lock().unwrap() = Some(body);
                json_reply(200, json!({"success": true}))
            })
    };

    let direct = {
        let state = state.clone();
        let status = config.direct_status;
        let result = config.direct_result.clone();
        warp::path!("upload")
            .and(warp::post())
            .and(warp::body::bytes())
            .map(move |body: Bytes| {
                state.direct_calls.fetch_add(1, Ordering::SeqCst);
                *state.direct_body.lock().unwrap() = body.to_vec();
                if status != 200 {
                    return json_reply(status, json!({"error": "analysis crashed"}));
                }
                json_reply(200, result.clone())
            })
    };

    let routes = health
        .or(authorize)
        .or(storage)
        .or(notify)
        .or(status)
        .or(direct)
        .or(save_analysis)
        .or(save_feedback);

    let (addr, server) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);

    MockBackend {
        url: format!("http://{}", addr),
        state,
    }
}

/// Store that records every outcome it is handed
#[derive(Debug, Default)]
pub struct RecordingStore {
    pub records: Mutex<Vec<AnalysisRecord>>,
    pub feedback: Mutex<Vec<FeedbackRecord>>,
}

impl RecordingStore {
    pub fn persisted(&self) -> Vec<AnalysisRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AnalysisStore for RecordingStore {
    async fn persist(&self, record: AnalysisRecord) -> Result<(), String> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }

    async fn persist_feedback(&self, record: FeedbackRecord) -> Result<(), String> {
        self.feedback.lock().unwrap().push(record);
        Ok(())
    }
}

/// Config pointing only at `backend_url`, with fast probes and polls
pub fn test_config(backend_url: &str) -> SubmitConfig {
    SubmitConfig {
        backend_url: Some(backend_url.to_string()),
        lan_guesses: Vec::new(),
        loopback_fallbacks: Vec::new(),
        probe_timeout_ms: 1_000,
        poll_interval_ms: 1,
        ..SubmitConfig::default()
    }
}

pub fn write_video(dir: &Path, name: &str, len: usize) -> VideoFile {
    let path = dir.join(name);
    std::fs::write(&path, vec![0x42u8; len]).unwrap();
    VideoFile::from_path(&path).unwrap()
}

pub fn metadata() -> SubmissionMetadata {
    SubmissionMetadata {
        email: "player@example.com".to_string(),
        stroke_type: "forehand".to_string(),
        handedness: "right".to_string(),
        experience: Some("beginner".to_string()),
    }
}

/// Position of `needle` in `haystack`
pub fn find(haystack: &[u8], needle: &str) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle.as_bytes())
}
