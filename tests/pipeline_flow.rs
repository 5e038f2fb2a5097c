//! End-to-end pipeline flow over in-memory fakes.
//!
//! Drives one job request through all six stages - scheduler fan-out,
//! orchestration, data fetching, script generation, audio synthesis, and
//! upload - asserting the hand-off contract at each hop and the final brief
//! at the end.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{Duration, Utc};

use briefcast::dialogue::DialogueWriter;
use briefcast::error::{DialogueError, SearchError, SpeechError};
use briefcast::jobs::{
    Bill, DialogueScript, JobRecord, JobStatus, NewsItem, ScriptLine, Speaker,
};
use briefcast::queue::{Envelope, MemorySink, MessageContext};
use briefcast::search::NewsSearch;
use briefcast::speech::{DialogueInput, SpeechSynthesizer, VoiceMap};
use briefcast::stages::fetcher::FetchLimits;
use briefcast::stages::{
    AudioGenerator, DailyScheduler, DataFetcher, Orchestrator, ScriptGenerator, Uploader,
};
use briefcast::storage::{MemoryDatabase, UserRow};
use briefcast::store::{get_json, keys, JobStore, MemoryJobStore};
use briefcast::upload::MemoryAudioStorage;
use briefcast::queue::Stage;

struct FixedSearch;

#[async_trait]
impl NewsSearch for FixedSearch {
    async fn search(&self, _query: &str, count: usize) -> Result<Vec<NewsItem>, SearchError> {
        Ok((0..7)
            .map(|i| NewsItem {
                title: format!("Story {}", i),
                url: format!("https://news.example/{}", i),
                description: "Coverage of the vote.".to_string(),
            })
            .take(count)
            .collect())
    }
}

struct FixedWriter;

#[async_trait]
impl DialogueWriter for FixedWriter {
    async fn write_dialogue(
        &self,
        bills: &[Bill],
        _news: &[NewsItem],
    ) -> Result<DialogueScript, DialogueError> {
        let mut lines = vec![ScriptLine {
            speaker: Speaker::Host,
            text: "Welcome back to your daily brief.".to_string(),
        }];
        for bill in bills {
            lines.push(ScriptLine {
                speaker: Speaker::Analyst,
                text: format!("{} saw movement this week.", bill.title),
            });
        }
        Ok(DialogueScript { lines })
    }
}

struct FixedSpeech;

#[async_trait]
impl SpeechSynthesizer for FixedSpeech {
    async fn synthesize_dialogue(
        &self,
        inputs: &[DialogueInput],
    ) -> Result<Vec<u8>, SpeechError> {
        // One marker byte per line keeps the assertion cheap.
        Ok(vec![0xAB; inputs.len()])
    }
}

fn bill(id: &str, area: &str, score: f64, days_ago: i64) -> Bill {
    Bill {
        id: id.to_string(),
        title: format!("Bill {}", id),
        summary: "A summary.".to_string(),
        policy_area: area.to_string(),
        impact_score: score,
        last_action_date: Utc::now() - Duration::days(days_ago),
    }
}

fn voices() -> VoiceMap {
    VoiceMap {
        host: "voice-host".to_string(),
        analyst: "voice-analyst".to_string(),
    }
}

#[tokio::test]
async fn one_user_flows_through_every_stage() {
    let store = Arc::new(MemoryJobStore::new());
    let db = Arc::new(MemoryDatabase::with_data(
        vec![UserRow {
            id: "u1".to_string(),
            email: "u1@example.com".to_string(),
            name: Some("Ada".to_string()),
            state: Some("CA".to_string()),
            district: Some("12".to_string()),
            interests: Some(r#"["healthcare","education"]"#.to_string()),
        }],
        vec![
            bill("b1", "healthcare", 0.9, 3),
            bill("b2", "healthcare", 0.4, 8),
            bill("b3", "education", 0.7, 2),
            bill("b4", "education", 0.2, 60),
            bill("b5", "economy", 1.0, 1),
        ],
    ));
    let storage = Arc::new(MemoryAudioStorage::new("https://cdn.example"));

    // Stage fan-in/fan-out goes through captured sinks so each hop's
    // contract can be asserted before the next stage runs.
    let jobs_sink = Arc::new(MemorySink::new());
    let fetch_sink = Arc::new(MemorySink::new());
    let script_sink = Arc::new(MemorySink::new());
    let audio_sink = Arc::new(MemorySink::new());
    let upload_sink = Arc::new(MemorySink::new());

    // 1. Scheduler fan-out.
    let scheduler = DailyScheduler::new(db.clone(), jobs_sink.clone());
    let summary = scheduler.run_once().await.expect("schedule");
    assert_eq!(summary.enqueued, 1);

    let mut job_requests = jobs_sink.drain();
    let job_request = job_requests.pop().expect("one job request");
    assert_eq!(job_request.user_id, "u1");
    assert_eq!(job_request.policy_interests, vec!["healthcare", "education"]);
    assert!(!job_request.force_regenerate);

    // 2. Orchestration.
    let orchestrator = Orchestrator::new(store.clone(), fetch_sink.clone());
    let envelope = Envelope::new(job_request);
    let ctx = MessageContext::for_envelope(&envelope);
    orchestrator
        .handle(&ctx, envelope.payload.clone())
        .await
        .expect("orchestrate");

    let fetch_request = fetch_sink.drain().pop().expect("fetch request");
    let job_id = fetch_request.job_id.clone();
    assert!(job_id.starts_with("brief-"));

    let record: JobRecord = get_json(store.as_ref(), &keys::meta(&job_id))
        .await
        .expect("get meta")
        .expect("meta present");
    assert_eq!(record.status, JobStatus::Pending);

    // 3. Data fetching: top-2 bills by impact, top-5 news.
    let fetcher = DataFetcher::new(
        db.clone(),
        store.clone(),
        Arc::new(FixedSearch),
        script_sink.clone(),
        FetchLimits::default(),
    );
    let envelope = Envelope::new(fetch_request);
    let ctx = MessageContext::for_envelope(&envelope);
    fetcher
        .handle(&ctx, envelope.payload.clone())
        .await
        .expect("fetch");

    let bills: Vec<Bill> = get_json(store.as_ref(), &keys::bills(&job_id))
        .await
        .expect("get bills")
        .expect("bills present");
    assert_eq!(bills.len(), 2);
    let ids: Vec<&str> = bills.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["b1", "b3"]);

    let news: Vec<NewsItem> = get_json(store.as_ref(), &keys::news(&job_id))
        .await
        .expect("get news")
        .expect("news present");
    assert_eq!(news.len(), 5);

    // 4. Script generation consumes bills/news and writes script/digest.
    let scripter = ScriptGenerator::new(store.clone(), Arc::new(FixedWriter), audio_sink.clone());
    let script_request = script_sink.drain().pop().expect("script request");
    let envelope = Envelope::new(script_request);
    let ctx = MessageContext::for_envelope(&envelope);
    scripter
        .handle(&ctx, envelope.payload.clone())
        .await
        .expect("script");

    assert!(store
        .get(&keys::bills(&job_id))
        .await
        .expect("get")
        .is_none());
    assert!(store.get(&keys::news(&job_id)).await.expect("get").is_none());

    // 5. Audio synthesis consumes the script.
    let synthesizer = AudioGenerator::new(
        store.clone(),
        Arc::new(FixedSpeech),
        voices(),
        upload_sink.clone(),
    );
    let audio_request = audio_sink.drain().pop().expect("audio request");
    let envelope = Envelope::new(audio_request);
    let ctx = MessageContext::for_envelope(&envelope);
    synthesizer
        .handle(&ctx, envelope.payload.clone())
        .await
        .expect("audio");

    // Script deleted after a successful audio write.
    assert!(store
        .get(&keys::script(&job_id))
        .await
        .expect("get")
        .is_none());

    let encoded = store
        .get(&keys::audio(&job_id))
        .await
        .expect("get")
        .expect("audio present");
    // Three script lines (host intro + one per bill) -> three marker bytes.
    assert_eq!(BASE64.decode(encoded).expect("decode").len(), 3);

    // 6. Upload finalizes the brief.
    let uploader = Uploader::new(store.clone(), storage.clone(), db.clone());
    let upload_request = upload_sink.drain().pop().expect("upload request");
    let envelope = Envelope::new(upload_request);
    let ctx = MessageContext::for_envelope(&envelope);
    uploader
        .handle(&ctx, envelope.payload.clone())
        .await
        .expect("upload");

    let briefs = db.briefs();
    assert_eq!(briefs.len(), 1);
    let brief = &briefs[0];
    assert_eq!(brief.user_id, "u1");
    assert_eq!(brief.bill_ids, vec!["b1", "b3"]);
    assert_eq!(brief.policy_areas, vec!["healthcare", "education"]);
    assert_eq!(
        brief.audio_url,
        format!("https://cdn.example/briefs/u1/{}.mp3", job_id)
    );
    assert!(brief.transcript.contains("Welcome back"));

    assert_eq!(storage.len(), 1);

    // Intermediate blobs are all gone; only the completed metadata remains.
    assert!(store
        .get(&keys::audio(&job_id))
        .await
        .expect("get")
        .is_none());
    assert!(store
        .get(&keys::digest(&job_id))
        .await
        .expect("get")
        .is_none());
    let record: JobRecord = get_json(store.as_ref(), &keys::meta(&job_id))
        .await
        .expect("get meta")
        .expect("meta present");
    assert_eq!(record.status, JobStatus::Complete);
}

#[tokio::test]
async fn redelivered_orchestration_message_keeps_one_record() {
    let store = Arc::new(MemoryJobStore::new());
    let fetch_sink = Arc::new(MemorySink::new());
    let orchestrator = Orchestrator::new(store.clone(), fetch_sink.clone());

    let envelope = Envelope::new(briefcast::jobs::JobRequest {
        user_id: "u1".to_string(),
        email: "u1@example.com".to_string(),
        name: None,
        state: None,
        district: None,
        policy_interests: vec!["healthcare".to_string()],
        force_regenerate: false,
    });

    // Two deliveries of the same envelope, as after a crashed ack.
    let ctx = MessageContext::for_envelope(&envelope);
    orchestrator
        .handle(&ctx, envelope.payload.clone())
        .await
        .expect("first delivery");
    orchestrator
        .handle(&ctx, envelope.payload.clone())
        .await
        .expect("redelivery");

    let forwarded = fetch_sink.drain();
    assert_eq!(forwarded[0].job_id, forwarded[1].job_id);
    assert_eq!(store.len(), 1);
}
