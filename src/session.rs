//! Client session context
//!
//! Everything one chat window needs: the transcript, the outbound channel,
//! the speech adapters and the voice-output toggle. Frontends own one
//! session and feed it user input and inbound events.

use tracing::{debug, info};

use crate::connection::Outbox;
use crate::protocol::{CorrelationId, IdGenerator, InboundEvent, OutboundRequest};
use crate::transcript::{Applied, Transcript};
use crate::voice::{Recognition, RecognitionEvent, SpeechInput, SpeechOutput};

/// What a recognition event means for the frontend's voice modal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceUpdate {
    /// Show this text in the modal.
    Status(String),
    /// Recognition failed; show this text in the modal.
    Error(String),
    /// The utterance was submitted as turn `id`.
    Submitted(CorrelationId),
    /// Recognition is over; dismiss the modal.
    Dismiss,
}

pub struct ClientSession {
    transcript: Transcript,
    ids: IdGenerator,
    outbox: Box<dyn Outbox>,
    speaker: Box<dyn SpeechOutput>,
    listener: Box<dyn SpeechInput>,
    tts_enabled: bool,
    /// Set once the current recognition produced a result.
    heard: bool,
}

impl ClientSession {
    pub fn new(
        outbox: Box<dyn Outbox>,
        speaker: Box<dyn SpeechOutput>,
        listener: Box<dyn SpeechInput>,
    ) -> Self {
        Self {
            transcript: Transcript::new(),
            ids: IdGenerator::new(),
            outbox,
            speaker,
            listener,
            tts_enabled: true,
            heard: false,
        }
    }

    pub fn with_tts(mut self, enabled: bool) -> Self {
        self.tts_enabled = enabled;
        self
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn tts_enabled(&self) -> bool {
        self.tts_enabled
    }

    /// Flip voice output. Turning it off silences any current utterance.
    pub fn toggle_tts(&mut self) -> bool {
        self.tts_enabled = !self.tts_enabled;
        if !self.tts_enabled {
            self.speaker.stop();
        }
        info!("voice output {}", if self.tts_enabled { "on" } else { "off" });
        self.tts_enabled
    }

    pub fn voice_input_available(&self) -> bool {
        self.listener.is_available()
    }

    /// Submit a prompt. Blank input is a no-op.
    ///
    /// The turn is rendered before the request is sent, so it exists even if
    /// the socket drops the message.
    pub fn submit(&mut self, input: &str) -> Option<CorrelationId> {
        let prompt = input.trim();
        if prompt.is_empty() {
            return None;
        }

        let mut id = self.ids.next_id();
        while !self.transcript.open_turn(id.clone(), prompt) {
            id = self.ids.next_id();
        }

        let sent = self.outbox.send(OutboundRequest {
            id: id.clone(),
            prompt: prompt.to_string(),
        });
        debug!("submitted {} (sent: {})", id, sent);
        Some(id)
    }

    /// Reconcile an inbound event; speaks the summary when a turn finishes
    /// and voice output is on.
    pub fn handle_event(&mut self, event: InboundEvent) -> Applied {
        let applied = self.transcript.apply(event);
        if let Applied::Finished { summary, .. } = &applied {
            if self.tts_enabled {
                self.speaker.speak(summary);
            }
        }
        applied
    }

    /// Start listening for one utterance.
    pub fn start_listening(&mut self) -> Recognition {
        self.heard = false;
        self.listener.listen_once()
    }

    /// Stop speech output, e.g. when the voice modal is closed.
    pub fn stop_speaking(&self) {
        self.speaker.stop();
    }

    /// Feed a recognition event; the first result is submitted like typed text.
    pub fn handle_recognition(&mut self, event: RecognitionEvent) -> Option<VoiceUpdate> {
        match event {
            RecognitionEvent::Start => Some(VoiceUpdate::Status("Listening...".to_string())),
            RecognitionEvent::Result(text) => {
                if self.heard {
                    return None;
                }
                self.heard = true;
                match self.submit(&text) {
                    Some(id) => Some(VoiceUpdate::Submitted(id)),
                    None => Some(VoiceUpdate::Status("Didn't catch that.".to_string())),
                }
            }
            RecognitionEvent::Error(message) => Some(VoiceUpdate::Error(format!("Error: {message}"))),
            RecognitionEvent::End => Some(VoiceUpdate::Dismiss),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Sent(Arc<Mutex<Vec<OutboundRequest>>>);

    impl Outbox for Sent {
        fn send(&self, request: OutboundRequest) -> bool {
            self.0.lock().unwrap().push(request);
            true
        }
    }

    #[derive(Clone, Default)]
    struct Spoken(Arc<Mutex<Vec<String>>>);

    impl SpeechOutput for Spoken {
        fn is_available(&self) -> bool {
            true
        }
        fn speak(&self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
        fn stop(&self) {}
    }

    struct Deaf;

    impl SpeechInput for Deaf {
        fn is_available(&self) -> bool {
            false
        }
        fn listen_once(&self) -> Recognition {
            Recognition::from_events(vec![RecognitionEvent::End])
        }
    }

    fn session() -> (ClientSession, Sent, Spoken) {
        let sent = Sent::default();
        let spoken = Spoken::default();
        let session = ClientSession::new(
            Box::new(sent.clone()),
            Box::new(spoken.clone()),
            Box::new(Deaf),
        );
        (session, sent, spoken)
    }

    #[test]
    fn test_blank_submit_is_noop() {
        let (mut s, sent, _) = session();
        assert_eq!(s.submit("   \n"), None);
        assert!(s.transcript().is_empty());
        assert!(sent.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_submit_trims_and_sends_once() {
        let (mut s, sent, _) = session();
        let id = s.submit("  hello  ").unwrap();
        let sent = sent.0.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, id);
        assert_eq!(sent[0].prompt, "hello");
        assert_eq!(s.transcript().get(&id).unwrap().prompt, "hello");
    }

    #[test]
    fn test_first_result_only_is_submitted() {
        let (mut s, sent, _) = session();
        let _ = s.start_listening();
        assert_eq!(
            s.handle_recognition(RecognitionEvent::Start),
            Some(VoiceUpdate::Status("Listening...".to_string()))
        );
        assert!(matches!(
            s.handle_recognition(RecognitionEvent::Result("turn on lights".into())),
            Some(VoiceUpdate::Submitted(_))
        ));
        assert_eq!(s.handle_recognition(RecognitionEvent::Result("again".into())), None);
        assert_eq!(s.handle_recognition(RecognitionEvent::End), Some(VoiceUpdate::Dismiss));
        assert_eq!(sent.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_recognition_error_is_status_text() {
        let (mut s, _, _) = session();
        assert_eq!(
            s.handle_recognition(RecognitionEvent::Error("no-speech".into())),
            Some(VoiceUpdate::Error("Error: no-speech".to_string()))
        );
    }

    #[test]
    fn test_tts_off_never_speaks() {
        let (s, _, spoken) = session();
        let mut s = s.with_tts(false);
        let id = s.submit("x").unwrap();
        s.handle_event(InboundEvent::StartProcessing { id: id.clone() });
        s.handle_event(InboundEvent::Stream { id: id.clone(), message: Some("Hi.".into()) });
        s.handle_event(InboundEvent::Log { id: id.clone(), message: Some("note".into()) });
        s.handle_event(InboundEvent::EndProcessing { id, outcome: None });
        assert!(spoken.0.lock().unwrap().is_empty());
    }

    #[test]
    fn test_tts_toggle() {
        let (mut s, _, _) = session();
        assert!(s.tts_enabled());
        assert!(!s.toggle_tts());
        assert!(s.toggle_tts());
    }
}
