//! Mock providers for orchestrator tests
//!
//! The mocks implement the STT/LLM/TTS trait contracts and record enough to
//! check the session invariants: stream open/close counts, utterances the
//! generator saw, texts handed to synthesis.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use voicebridge::agent::ResponseGenerator;
use voicebridge::voice::{AudioStream, SpeechToText, SttEvent, SttStream, TextToSpeech};
use voicebridge::{Error, Result};

/// Recognition provider that counts open streams and records sent audio
#[derive(Default)]
pub struct MockStt {
    streams: Mutex<Vec<StreamProbe>>,
    active: Arc<AtomicUsize>,
    max_active: AtomicUsize,
}

/// Test-side view of one opened stream
#[derive(Clone)]
pub struct StreamProbe {
    /// Inject recognition events as the provider would
    pub events: mpsc::Sender<SttEvent>,
    /// Audio chunks the session forwarded to this stream
    pub audio: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Whether the session finished this stream
    pub finished: Arc<AtomicBool>,
}

impl MockStt {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of streams opened so far
    pub fn stream_count(&self) -> usize {
        self.streams.lock().unwrap().len()
    }

    /// Most streams that were ever open at once
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Probe for the `index`-th opened stream
    pub fn probe(&self, index: usize) -> StreamProbe {
        self.streams.lock().unwrap()[index].clone()
    }
}

struct MockSttStream {
    audio: Arc<Mutex<Vec<Vec<u8>>>>,
    finished: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
}

#[async_trait]
impl SttStream for MockSttStream {
    async fn send_audio(&mut self, chunk: Vec<u8>) -> Result<()> {
        if self.finished.load(Ordering::SeqCst) {
            return Err(Error::StreamClosed);
        }
        self.audio.lock().unwrap().push(chunk);
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if !self.finished.swap(true, Ordering::SeqCst) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[async_trait]
impl SpeechToText for MockStt {
    async fn open(&self) -> Result<(Box<dyn SttStream>, mpsc::Receiver<SttEvent>)> {
        let open_now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(open_now, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(32);
        let audio = Arc::new(Mutex::new(Vec::new()));
        let finished = Arc::new(AtomicBool::new(false));

        self.streams.lock().unwrap().push(StreamProbe {
            events: tx,
            audio: Arc::clone(&audio),
            finished: Arc::clone(&finished),
        });

        Ok((
            Box::new(MockSttStream {
                audio,
                finished,
                active: Arc::clone(&self.active),
            }),
            rx,
        ))
    }
}

/// Reply generator that records every utterance it was asked about
pub struct MockResponder {
    calls: Mutex<Vec<String>>,
    reply: String,
    fail: bool,
    hang: bool,
    started: Option<mpsc::Sender<String>>,
}

impl MockResponder {
    /// Always answers with `reply`
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            reply: reply.to_string(),
            fail: false,
            hang: false,
            started: None,
        })
    }

    /// Always fails with an upstream error
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            reply: String::new(),
            fail: true,
            hang: false,
            started: None,
        })
    }

    /// Never completes; announces each call on `started`
    pub fn hanging(started: mpsc::Sender<String>) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            reply: String::new(),
            fail: false,
            hang: true,
            started: Some(started),
        })
    }

    /// Utterances seen so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponseGenerator for MockResponder {
    async fn generate(&self, _session_id: &str, utterance: &str) -> Result<String> {
        self.calls.lock().unwrap().push(utterance.to_string());

        if let Some(started) = self.started.clone() {
            let _ = started.send(utterance.to_string()).await;
        }
        if self.hang {
            futures::future::pending::<()>().await;
        }
        if self.fail {
            return Err(Error::Upstream("mock generation failure".to_string()));
        }
        Ok(self.reply.clone())
    }
}

/// Synthesizer that emits two fixed chunks per reply and reports each text
pub struct MockTts {
    spoken: Mutex<Vec<String>>,
    notify: mpsc::Sender<String>,
    fail: bool,
}

impl MockTts {
    /// Working synthesizer; each synthesized text is announced on the receiver
    pub fn new() -> (Arc<Self>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(16);
        (
            Arc::new(Self {
                spoken: Mutex::new(Vec::new()),
                notify: tx,
                fail: false,
            }),
            rx,
        )
    }

    /// Synthesizer whose provider always rejects the request
    pub fn failing() -> (Arc<Self>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(16);
        (
            Arc::new(Self {
                spoken: Mutex::new(Vec::new()),
                notify: tx,
                fail: true,
            }),
            rx,
        )
    }

    /// Texts synthesized so far, in order
    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextToSpeech for MockTts {
    async fn synthesize(&self, text: &str) -> Result<AudioStream> {
        self.spoken.lock().unwrap().push(text.to_string());
        let _ = self.notify.send(text.to_string()).await;

        if self.fail {
            return Err(Error::Upstream("mock synthesis failure".to_string()));
        }

        let chunks: Vec<Result<Vec<u8>>> = vec![Ok(vec![1, 2, 3]), Ok(vec![4, 5, 6])];
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}
