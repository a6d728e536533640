//! Integration tests for the Jarvix client

use jarvix::transcript::FAILED_PHRASE;
use jarvix::voice::{Recognition, RecognitionEvent, SpeechInput, SpeechOutput};
use jarvix::{
    Applied, ClientSession, CorrelationId, InboundEvent, JarvixConfig, Outbox, OutboundRequest,
    Outcome, TurnStatus,
};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

#[derive(Clone, Default)]
struct RecordingOutbox(Arc<Mutex<Vec<OutboundRequest>>>);

impl Outbox for RecordingOutbox {
    fn send(&self, request: OutboundRequest) -> bool {
        self.0.lock().unwrap().push(request);
        true
    }
}

#[derive(Clone, Default)]
struct RecordingSpeaker(Arc<Mutex<Vec<String>>>);

impl SpeechOutput for RecordingSpeaker {
    fn is_available(&self) -> bool {
        true
    }
    fn speak(&self, text: &str) {
        self.0.lock().unwrap().push(text.to_string());
    }
    fn stop(&self) {}
}

/// Hears one fixed utterance.
struct ScriptedListener(String);

impl SpeechInput for ScriptedListener {
    fn is_available(&self) -> bool {
        true
    }
    fn listen_once(&self) -> Recognition {
        Recognition::from_events(vec![
            RecognitionEvent::Start,
            RecognitionEvent::Result(self.0.clone()),
            RecognitionEvent::End,
        ])
    }
}

struct Harness {
    session: ClientSession,
    sent: RecordingOutbox,
    spoken: RecordingSpeaker,
}

fn harness() -> Harness {
    let sent = RecordingOutbox::default();
    let spoken = RecordingSpeaker::default();
    let session = ClientSession::new(
        Box::new(sent.clone()),
        Box::new(spoken.clone()),
        Box::new(ScriptedListener("what time is it".to_string())),
    );
    Harness { session, sent, spoken }
}

fn frame(session: &mut ClientSession, json: serde_json::Value) -> Applied {
    let event = InboundEvent::from_json(&json.to_string()).expect("valid frame");
    session.handle_event(event)
}

/// A full exchange: one request out, start, two fragments, end.
#[test]
fn test_hello_round_trip() {
    let mut h = harness();
    let id = h.session.submit("hello").unwrap();
    assert!(id.as_str().starts_with("cmd-"));
    {
        let sent = h.sent.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let wire: serde_json::Value = serde_json::from_str(&sent[0].to_json().unwrap()).unwrap();
        assert_eq!(wire, serde_json::json!({ "id": id.as_str(), "prompt": "hello" }));
    }
    assert_eq!(h.session.transcript().get(&id).unwrap().status, TurnStatus::Queued);

    frame(&mut h.session, serde_json::json!({ "id": id.as_str(), "type": "start_processing" }));
    assert_eq!(h.session.transcript().get(&id).unwrap().status, TurnStatus::Processing);
    assert_eq!(h.session.transcript().in_flight(), 1);

    frame(&mut h.session, serde_json::json!({ "id": id.as_str(), "type": "stream", "message": "Hel" }));
    frame(&mut h.session, serde_json::json!({ "id": id.as_str(), "type": "stream", "message": "lo!" }));
    let applied = frame(&mut h.session, serde_json::json!({ "id": id.as_str(), "type": "end_processing" }));

    assert_eq!(
        applied,
        Applied::Finished {
            outcome: Outcome::Completed,
            summary: "Hello!".to_string()
        }
    );
    let turn = h.session.transcript().get(&id).unwrap();
    assert_eq!(turn.status, TurnStatus::Completed);
    assert_eq!(turn.response_markup(), Some("Hello!"));
    assert_eq!(h.session.transcript().in_flight(), 0);
    assert_eq!(*h.spoken.0.lock().unwrap(), vec!["Hello!".to_string()]);
    assert_eq!(h.sent.0.lock().unwrap().len(), 1);
}

#[test]
fn test_ids_are_unique_across_rapid_submissions() {
    let mut h = harness();
    let ids: Vec<CorrelationId> = (0..20).map(|i| h.session.submit(&format!("p{i}")).unwrap()).collect();
    let mut unique = ids.clone();
    unique.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    unique.dedup();
    assert_eq!(unique.len(), ids.len());
    assert_eq!(h.session.transcript().len(), 20);
}

#[test]
fn test_failure_glyph_in_log_marks_turn_failed() {
    let mut h = harness();
    let bad = h.session.submit("break it").unwrap();
    let good = h.session.submit("fix it").unwrap();

    frame(&mut h.session, serde_json::json!({ "id": bad.as_str(), "type": "log", "message": "❌ bad" }));
    frame(&mut h.session, serde_json::json!({ "id": good.as_str(), "type": "log", "message": "done" }));
    let bad_end = frame(&mut h.session, serde_json::json!({ "id": bad.as_str(), "type": "end_processing" }));
    let good_end = frame(&mut h.session, serde_json::json!({ "id": good.as_str(), "type": "end_processing" }));

    assert!(matches!(bad_end, Applied::Finished { outcome: Outcome::Failed, .. }));
    assert!(matches!(good_end, Applied::Finished { outcome: Outcome::Completed, .. }));
    assert_eq!(h.session.transcript().get(&bad).unwrap().status.glyph(), "❌");
    assert_eq!(h.session.transcript().get(&good).unwrap().status.glyph(), "✅");
}

#[test]
fn test_failed_turn_without_text_speaks_fallback() {
    let mut h = harness();
    let id = h.session.submit("x").unwrap();
    frame(
        &mut h.session,
        serde_json::json!({ "id": id.as_str(), "type": "end_processing", "status": "failed" }),
    );
    assert_eq!(*h.spoken.0.lock().unwrap(), vec![FAILED_PHRASE.to_string()]);
}

#[test]
fn test_unknown_id_changes_nothing() {
    let mut h = harness();
    let id = h.session.submit("hello").unwrap();
    let before = h.session.transcript().clone();

    for kind in ["start_processing", "stream", "log", "end_processing"] {
        let applied = frame(
            &mut h.session,
            serde_json::json!({ "id": "cmd-0", "type": kind, "message": "stray" }),
        );
        assert_eq!(applied, Applied::Ignored);
    }

    assert_eq!(*h.session.transcript(), before);
    assert_eq!(h.session.transcript().get(&id).unwrap().status, TurnStatus::Queued);
    assert!(h.spoken.0.lock().unwrap().is_empty());
}

#[test]
fn test_tts_off_never_speaks() {
    let mut h = harness();
    h.session.toggle_tts();
    let id = h.session.submit("hello").unwrap();
    frame(&mut h.session, serde_json::json!({ "id": id.as_str(), "type": "stream", "message": "Hi." }));
    frame(&mut h.session, serde_json::json!({ "id": id.as_str(), "type": "end_processing" }));
    assert!(h.spoken.0.lock().unwrap().is_empty());
}

#[test]
fn test_final_markup_ignores_chunk_boundaries() {
    let text = "Run `ls -la`:\n```sh\nls -la | grep <x>\n```\n**done**";
    let split_points = [1, 5, 9, 15, 17, 30, text.len() - 2];

    let mut results = Vec::new();
    for &cut in &split_points {
        let mut h = harness();
        let id = h.session.submit("p").unwrap();
        let (a, b) = text.split_at(cut);
        for part in [a, b] {
            frame(&mut h.session, serde_json::json!({ "id": id.as_str(), "type": "stream", "message": part }));
        }
        frame(&mut h.session, serde_json::json!({ "id": id.as_str(), "type": "end_processing" }));
        results.push(h.session.transcript().get(&id).unwrap().response_markup().unwrap().to_string());
    }

    let mut h = harness();
    let id = h.session.submit("p").unwrap();
    frame(&mut h.session, serde_json::json!({ "id": id.as_str(), "type": "stream", "message": text }));
    frame(&mut h.session, serde_json::json!({ "id": id.as_str(), "type": "end_processing" }));
    let whole = h.session.transcript().get(&id).unwrap().response_markup().unwrap().to_string();

    assert!(whole.contains("<pre data-copy=\"1\"><code class=\"language-sh\">"));
    assert!(whole.contains("&lt;x&gt;"));
    for markup in results {
        assert_eq!(markup, whole);
    }
}

#[tokio::test]
async fn test_voice_result_is_submitted_like_typing() {
    let mut h = harness();
    let mut recognition = h.session.start_listening();
    let mut submitted = None;
    while let Some(event) = recognition.next().await {
        match h.session.handle_recognition(event) {
            Some(jarvix::VoiceUpdate::Submitted(id)) => submitted = Some(id),
            Some(jarvix::VoiceUpdate::Dismiss) => break,
            _ => {}
        }
    }

    let id = submitted.expect("utterance submitted");
    assert_eq!(h.session.transcript().get(&id).unwrap().prompt, "what time is it");
    assert_eq!(h.sent.0.lock().unwrap()[0].prompt, "what time is it");
}

#[test]
fn test_config_file_then_env() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    std::fs::write(
        &path,
        "url = \"ws://10.0.0.2:8000/ws\"\ntts = false\n\n[voice]\nlisten_command = [\"whisper-listen\"]\n",
    )
    .unwrap();

    let config = JarvixConfig::new().merge_file(&path).unwrap();
    assert_eq!(config.url, "ws://10.0.0.2:8000/ws");
    assert!(!config.tts);
    assert_eq!(config.listen_command, vec!["whisper-listen".to_string()]);

    let config = config.merge_env(|key| (key == "JARVIX_TTS").then(|| "on".to_string()));
    assert!(config.tts);
}

/// Backend that answers exactly one prompt, then waits for the client to go.
async fn serve_one_reply(listener: tokio::net::TcpListener) -> Vec<serde_json::Value> {
    use futures::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    let (tcp, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
    let mut received = Vec::new();
    while let Some(Ok(msg)) = ws.next().await {
        let Message::Text(text) = msg else {
            continue;
        };
        let request: serde_json::Value = serde_json::from_str(&text).unwrap();
        let id = request["id"].as_str().unwrap().to_string();
        received.push(request);
        if received.len() > 1 {
            continue;
        }
        // A short pause so the reply lands after stdin has already closed
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        for reply in [
            serde_json::json!({ "id": id, "type": "start_processing" }),
            serde_json::json!({ "id": id, "type": "stream", "message": "Hello there." }),
            serde_json::json!({ "id": id, "type": "end_processing" }),
        ] {
            ws.send(Message::Text(reply.to_string())).await.unwrap();
        }
    }
    received
}

/// `jarvix --no-tui hello < /dev/null` prints the reply before exiting.
#[tokio::test(flavor = "multi_thread")]
async fn test_plain_mode_waits_for_reply_after_stdin_closes() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    let server = tokio::spawn(serve_one_reply(listener));

    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("config.toml");
    std::fs::write(&config, "").unwrap();

    let output = tokio::process::Command::new(env!("CARGO_BIN_EXE_jarvix"))
        .args(["--no-tui", "--no-tts", "--url", &url, "-c"])
        .arg(&config)
        .arg("hello")
        .stdin(std::process::Stdio::null())
        .kill_on_drop(true)
        .output();
    let output = tokio::time::timeout(std::time::Duration::from_secs(20), output)
        .await
        .expect("jarvix exits once the turn is done")
        .unwrap();

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stdout: {stdout}");
    assert!(stdout.contains("Hello there."), "stdout: {stdout}");
    assert!(stdout.contains("✅ Completed"), "stdout: {stdout}");

    let received = server.await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["prompt"], "hello");
}
