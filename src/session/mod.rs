//! Per-caller conversation sessions
//!
//! Each session owns one caller's lifecycle: connect, listen, detect the
//! end of the turn, generate a reply, speak it, listen again. All mutations
//! of session state happen on a single worker task that drains the
//! session's event queue, so STT callbacks, audio forwarding, and stop
//! signals can never interleave. Reply generation and playback run on a
//! separate per-session pipeline task, which lets the freshly reopened
//! recognition stream keep accepting caller audio while the previous turn
//! is still being answered.

pub mod keepalive;
pub mod registry;
pub mod transcript;

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::agent::{AgentProfile, ResponseGenerator};
use crate::voice::{SpeechToText, SttEvent, SttStream, TextToSpeech};
use crate::Result;

pub use keepalive::IdleKeepAlive;
pub use registry::{SessionHandle, SessionRegistry};
pub use transcript::TranscriptAccumulator;

/// Scripted reply when a turn ends with nothing recognized
pub const EMPTY_TURN_REPLY: &str = "Sorry, can you please repeat?";

/// Scripted reply when generation fails; the caller never gets silence
pub const GENERATION_FAILED_REPLY: &str =
    "Sorry, I'm having trouble answering right now. Could you say that again?";

/// Depth of the per-session inbound event queue (~5s of 20ms audio frames)
const EVENT_QUEUE_DEPTH: usize = 256;

/// At most one turn waits behind the one being answered
const PENDING_TURN_DEPTH: usize = 1;

/// Lifecycle phase of a conversation session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Connecting,
    Listening,
    Endpointing,
    Thinking,
    Speaking,
    Closed,
}

/// Inbound events processed by a session's worker task
#[derive(Debug)]
pub enum SessionEvent {
    /// Real caller audio
    Audio(Vec<u8>),
    /// Synthetic silence injected by the keep-alive sweep
    Silence(Vec<u8>),
    /// End-of-turn signal from the caller transport
    Stop,
    /// Recognition event, tagged with the stream generation that produced it
    Transcript { generation: u64, event: SttEvent },
    /// Caller went away
    Disconnect,
}

/// Outbound events for the caller transport
#[derive(Debug, Clone)]
pub enum CallerEvent {
    /// Live transcript so far, for display only
    TranscriptUpdate(String),
    /// The reply text that was spoken
    AgentResponse(String),
    /// One chunk of synthesized audio
    Audio(Vec<u8>),
    /// The reply's audio is complete
    AudioStreamEnd,
    /// Synthesis failed; no more audio is coming for this reply
    SynthesisFailed,
}

/// What the response pipeline should do for one turn
#[derive(Debug)]
enum TurnRequest {
    /// Speak scripted text directly (welcome, empty-turn fallback)
    Speak(String),
    /// Generate a reply to the utterance, then speak it
    Respond(String),
}

/// Shared collaborators a session needs from the surrounding process
#[derive(Clone)]
pub struct SessionContext {
    pub stt: Arc<dyn SpeechToText>,
    pub responder: Arc<dyn ResponseGenerator>,
    pub synthesizer: Arc<dyn TextToSpeech>,
    pub registry: Arc<SessionRegistry>,
}

/// One caller's conversation, spawned as a worker/pipeline task pair
pub struct ConversationSession;

impl ConversationSession {
    /// Start a session: open the first recognition stream, queue the
    /// scripted welcome, register the session, and spawn its tasks.
    ///
    /// # Errors
    ///
    /// Returns error if the initial recognition stream cannot be opened.
    pub async fn spawn(
        id: String,
        profile: AgentProfile,
        ctx: SessionContext,
        out: mpsc::Sender<CallerEvent>,
    ) -> Result<SessionHandle> {
        let phase = Arc::new(Mutex::new(Phase::Connecting));
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let (turns_tx, turns_rx) = mpsc::channel(PENDING_TURN_DEPTH);

        let pipeline = tokio::spawn(run_pipeline(
            id.clone(),
            Arc::clone(&ctx.responder),
            Arc::clone(&ctx.synthesizer),
            out.clone(),
            turns_rx,
            Arc::clone(&phase),
        ));

        let handle = SessionHandle::new(events_tx.clone(), Arc::clone(&phase));

        let mut worker = Worker {
            id: id.clone(),
            stt: Arc::clone(&ctx.stt),
            registry: Arc::clone(&ctx.registry),
            events_tx,
            handle: handle.clone(),
            stream: None,
            generation: 0,
            transcript: TranscriptAccumulator::new(),
            out,
            turns: turns_tx.clone(),
            phase,
            pipeline,
        };

        if let Err(e) = worker.open_stream().await {
            worker.pipeline.abort();
            return Err(e);
        }

        ctx.registry.register(id.clone(), handle.clone()).await;

        // Scripted welcome goes straight to synthesis, bypassing the LLM
        let _ = turns_tx
            .send(TurnRequest::Speak(profile.welcome_text.clone()))
            .await;

        worker.set_phase(Phase::Listening);
        tokio::spawn(worker.run(events_rx));

        tracing::info!(session_id = %id, agent = %profile.name, "session started");
        Ok(handle)
    }
}

/// Owns all mutable session state; runs on the single worker task
struct Worker {
    id: String,
    stt: Arc<dyn SpeechToText>,
    registry: Arc<SessionRegistry>,
    /// Cloned into each stream's reader task
    events_tx: mpsc::Sender<SessionEvent>,
    handle: SessionHandle,
    stream: Option<Box<dyn SttStream>>,
    /// Bumped on every stream swap; events from older streams are dropped
    generation: u64,
    transcript: TranscriptAccumulator,
    out: mpsc::Sender<CallerEvent>,
    turns: mpsc::Sender<TurnRequest>,
    phase: Arc<Mutex<Phase>>,
    pipeline: JoinHandle<()>,
}

impl Worker {
    async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Audio(chunk) => {
                    self.handle.touch();
                    self.forward(chunk, false).await;
                }
                // the keep-alive sweep already refreshed the activity clock
                SessionEvent::Silence(frame) => self.forward(frame, true).await,
                SessionEvent::Transcript { generation, event } => {
                    if generation == self.generation {
                        self.on_stt_event(event).await;
                    }
                }
                SessionEvent::Stop => self.end_turn().await,
                SessionEvent::Disconnect => break,
            }
        }
        self.close().await;
    }

    /// Forward one audio chunk to the open recognition stream
    async fn forward(&mut self, chunk: Vec<u8>, synthetic: bool) {
        let Some(stream) = self.stream.as_mut() else {
            tracing::debug!(session_id = %self.id, "no open recognition stream, dropping audio");
            return;
        };

        // Delivery failures do not end the session; the stream is replaced
        // wholesale at the next turn boundary anyway
        if let Err(e) = stream.send_audio(chunk).await {
            if synthetic {
                tracing::debug!(session_id = %self.id, error = %e, "keep-alive frame not delivered");
            } else {
                tracing::warn!(session_id = %self.id, error = %e, "failed to forward caller audio");
            }
        }
    }

    async fn on_stt_event(&mut self, event: SttEvent) {
        match event {
            SttEvent::Transcript(t) => {
                self.transcript.push(&t.text, t.is_final);
                let display = self.transcript.display();
                if !display.is_empty() {
                    let _ = self.out.send(CallerEvent::TranscriptUpdate(display)).await;
                }
            }
            SttEvent::Error(e) => {
                tracing::warn!(session_id = %self.id, error = %e, "recognition stream error");
            }
            SttEvent::Closed => {
                tracing::debug!(session_id = %self.id, "recognition stream closed by provider");
            }
        }
    }

    /// The caller stopped speaking: finalize the utterance, swap in a fresh
    /// recognition stream, and hand the turn to the response pipeline.
    ///
    /// The swap completes before the turn is dispatched so audio arriving
    /// while the reply is generated lands on the new stream, never in a
    /// closing one.
    async fn end_turn(&mut self) {
        self.set_phase(Phase::Endpointing);
        let utterance = self.transcript.finalize();

        if let Some(mut old) = self.stream.take() {
            if let Err(e) = old.finish().await {
                tracing::warn!(session_id = %self.id, error = %e, "failed to finish recognition stream");
            }
        }
        if let Err(e) = self.open_stream().await {
            tracing::error!(session_id = %self.id, error = %e, "failed to reopen recognition stream");
        }

        let request = if utterance.is_empty() {
            TurnRequest::Speak(EMPTY_TURN_REPLY.to_string())
        } else {
            tracing::info!(session_id = %self.id, utterance = %utterance, "turn finalized");
            TurnRequest::Respond(utterance)
        };

        if self.turns.send(request).await.is_err() {
            tracing::warn!(session_id = %self.id, "response pipeline gone, dropping turn");
        }
    }

    /// Open a recognition stream and spawn its reader task
    async fn open_stream(&mut self) -> Result<()> {
        let (stream, mut events) = self.stt.open().await?;

        self.generation += 1;
        let generation = self.generation;
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if tx
                    .send(SessionEvent::Transcript { generation, event })
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        self.stream = Some(stream);
        Ok(())
    }

    async fn close(&mut self) {
        self.set_phase(Phase::Closed);

        // Abandon any in-flight generation or synthesis for this caller
        self.pipeline.abort();

        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.finish().await {
                tracing::debug!(session_id = %self.id, error = %e, "recognition stream close failed");
            }
        }

        self.registry.remove(&self.id).await;
        tracing::info!(session_id = %self.id, "session closed");
    }

    fn set_phase(&self, next: Phase) {
        set_phase(&self.phase, next);
    }
}

fn set_phase(phase: &Arc<Mutex<Phase>>, next: Phase) {
    if let Ok(mut current) = phase.lock() {
        *current = next;
    }
}

/// Response pipeline: turns queued turn requests into spoken replies,
/// strictly in order, concurrently with the worker's resumed listening
async fn run_pipeline(
    id: String,
    responder: Arc<dyn ResponseGenerator>,
    synthesizer: Arc<dyn TextToSpeech>,
    out: mpsc::Sender<CallerEvent>,
    mut turns: mpsc::Receiver<TurnRequest>,
    phase: Arc<Mutex<Phase>>,
) {
    while let Some(request) = turns.recv().await {
        let reply = match request {
            TurnRequest::Speak(text) => text,
            TurnRequest::Respond(utterance) => {
                set_phase(&phase, Phase::Thinking);
                match responder.generate(&id, &utterance).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        tracing::error!(session_id = %id, error = %e, "reply generation failed");
                        GENERATION_FAILED_REPLY.to_string()
                    }
                }
            }
        };

        set_phase(&phase, Phase::Speaking);
        speak(&id, synthesizer.as_ref(), &out, &reply).await;
        set_phase(&phase, Phase::Listening);
    }
}

/// Stream one reply through synthesis, forwarding chunks as they arrive
async fn speak(
    id: &str,
    synthesizer: &dyn TextToSpeech,
    out: &mpsc::Sender<CallerEvent>,
    text: &str,
) {
    let mut audio = match synthesizer.synthesize(text).await {
        Ok(audio) => audio,
        Err(e) => {
            tracing::error!(session_id = %id, error = %e, "speech synthesis failed");
            let _ = out.send(CallerEvent::SynthesisFailed).await;
            return;
        }
    };

    while let Some(chunk) = audio.next().await {
        match chunk {
            Ok(bytes) => {
                if out.send(CallerEvent::Audio(bytes)).await.is_err() {
                    return; // caller gone
                }
            }
            Err(e) => {
                tracing::error!(session_id = %id, error = %e, "speech synthesis interrupted");
                let _ = out.send(CallerEvent::SynthesisFailed).await;
                return;
            }
        }
    }

    let _ = out.send(CallerEvent::AgentResponse(text.to_string())).await;
    let _ = out.send(CallerEvent::AudioStreamEnd).await;
}
