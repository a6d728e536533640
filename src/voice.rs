//! Voice input and output
//!
//! Both directions go through external speech programs, the same way the
//! clipboard fallback shells out to `pbcopy`/`xclip`. A capability is
//! available when its program resolves on `PATH`.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Events reported while listening, in order: `Start`, then at most one of
/// `Result`/`Error`, then `End`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Start,
    Result(String),
    Error(String),
    End,
}

/// Text-to-speech sink.
pub trait SpeechOutput: Send {
    fn is_available(&self) -> bool;

    /// Start speaking `text`, replacing any utterance in progress.
    fn speak(&self, text: &str);

    fn stop(&self);
}

/// One-shot speech recognizer.
pub trait SpeechInput: Send {
    fn is_available(&self) -> bool;

    /// Listen for a single utterance.
    fn listen_once(&self) -> Recognition;
}

/// Handle to a running recognition.
pub struct Recognition {
    events: mpsc::Receiver<RecognitionEvent>,
    task: Option<JoinHandle<()>>,
}

impl Recognition {
    /// A recognition whose events are already known.
    pub fn from_events(events: Vec<RecognitionEvent>) -> Self {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            let _ = tx.try_send(event);
        }
        Self {
            events: rx,
            task: None,
        }
    }

    fn unavailable() -> Self {
        Self::from_events(vec![
            RecognitionEvent::Start,
            RecognitionEvent::Error("speech recognition not available".to_string()),
            RecognitionEvent::End,
        ])
    }

    /// Next event without waiting.
    pub fn try_next(&mut self) -> Option<RecognitionEvent> {
        self.events.try_recv().ok()
    }

    pub async fn next(&mut self) -> Option<RecognitionEvent> {
        self.events.recv().await
    }

    /// Abort listening. The child process is killed on drop.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.events.close();
    }
}

impl Drop for Recognition {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Resolve `program` on `PATH` (or as a path if it contains a separator).
pub fn find_program(program: &str) -> Option<PathBuf> {
    let as_path = Path::new(program);
    if as_path.components().count() > 1 {
        return as_path.is_file().then(|| as_path.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

fn default_speak_command() -> Vec<String> {
    if cfg!(target_os = "macos") {
        vec!["say".to_string()]
    } else {
        vec!["espeak".to_string()]
    }
}

/// Speaks through a command line program; the text is the last argument.
pub struct CommandSpeaker {
    command: Vec<String>,
    current: Mutex<Option<Child>>,
}

impl CommandSpeaker {
    pub fn new(command: Vec<String>) -> Self {
        let command = if command.is_empty() {
            default_speak_command()
        } else {
            command
        };
        Self {
            command,
            current: Mutex::new(None),
        }
    }

    fn kill_current(slot: &mut Option<Child>) {
        if let Some(mut child) = slot.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Default for CommandSpeaker {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl SpeechOutput for CommandSpeaker {
    fn is_available(&self) -> bool {
        self.command
            .first()
            .and_then(|program| find_program(program))
            .is_some()
    }

    fn speak(&self, text: &str) {
        if !self.is_available() {
            debug!("speech output unavailable, skipping utterance");
            return;
        }
        let Some((program, args)) = self.command.split_first() else {
            return;
        };
        let Ok(mut slot) = self.current.lock() else {
            return;
        };
        Self::kill_current(&mut slot);

        match Command::new(program)
            .args(args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => *slot = Some(child),
            Err(e) => warn!("failed to start {}: {}", program, e),
        }
    }

    fn stop(&self) {
        if let Ok(mut slot) = self.current.lock() {
            Self::kill_current(&mut slot);
        }
    }
}

impl Drop for CommandSpeaker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Listens through a command line program that prints one recognized
/// utterance per line on stdout.
pub struct CommandRecognizer {
    command: Vec<String>,
}

impl CommandRecognizer {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl SpeechInput for CommandRecognizer {
    fn is_available(&self) -> bool {
        self.command
            .first()
            .and_then(|program| find_program(program))
            .is_some()
    }

    fn listen_once(&self) -> Recognition {
        if !self.is_available() {
            return Recognition::unavailable();
        }
        let Some((program, args)) = self.command.split_first() else {
            return Recognition::unavailable();
        };

        let (tx, rx) = mpsc::channel(8);
        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let task = tokio::spawn(async move {
            let _ = tx.send(RecognitionEvent::Start).await;
            let outcome = recognize(command).await;
            let _ = tx.send(outcome).await;
            let _ = tx.send(RecognitionEvent::End).await;
        });

        Recognition {
            events: rx,
            task: Some(task),
        }
    }
}

async fn recognize(mut command: tokio::process::Command) -> RecognitionEvent {
    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => return RecognitionEvent::Error(e.to_string()),
    };
    let Some(stdout) = child.stdout.take() else {
        return RecognitionEvent::Error("recognizer has no stdout".to_string());
    };

    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => {
                let _ = child.kill().await;
                return RecognitionEvent::Result(line.trim().to_string());
            }
            Ok(None) => {
                let status = child.wait().await;
                return match status {
                    Ok(s) if !s.success() => {
                        RecognitionEvent::Error(format!("recognizer exited with {s}"))
                    }
                    _ => RecognitionEvent::Error("no speech detected".to_string()),
                };
            }
            Err(e) => return RecognitionEvent::Error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    async fn collect(mut recognition: Recognition) -> Vec<RecognitionEvent> {
        let mut events = Vec::new();
        while let Some(event) = recognition.next().await {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_find_program() {
        assert!(find_program("sh").is_some());
        assert!(find_program("definitely-not-a-real-program-xyz").is_none());
    }

    #[test]
    fn test_missing_speaker_is_unavailable() {
        let speaker = CommandSpeaker::new(vec!["definitely-not-a-real-program-xyz".to_string()]);
        assert!(!speaker.is_available());
        // No-op, must not panic.
        speaker.speak("hello");
        speaker.stop();
    }

    #[tokio::test]
    async fn test_recognizer_reports_first_utterance() {
        let recognizer = CommandRecognizer::new(sh("echo; echo 'open the pod bay doors'; echo second"));
        let events = collect(recognizer.listen_once()).await;
        assert_eq!(
            events,
            vec![
                RecognitionEvent::Start,
                RecognitionEvent::Result("open the pod bay doors".to_string()),
                RecognitionEvent::End,
            ]
        );
    }

    #[tokio::test]
    async fn test_recognizer_reports_silence_as_error() {
        let recognizer = CommandRecognizer::new(sh("exit 0"));
        let events = collect(recognizer.listen_once()).await;
        assert_eq!(events.first(), Some(&RecognitionEvent::Start));
        assert!(matches!(events.get(1), Some(RecognitionEvent::Error(_))));
        assert_eq!(events.last(), Some(&RecognitionEvent::End));
    }

    #[tokio::test]
    async fn test_unavailable_recognizer() {
        let recognizer = CommandRecognizer::new(Vec::new());
        assert!(!recognizer.is_available());
        let events = collect(recognizer.listen_once()).await;
        assert_eq!(events.len(), 3);
        assert!(matches!(events[1], RecognitionEvent::Error(_)));
    }
}
