use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use scribe_config::Settings;
use scribe_pipeline::{
    samples_from_le_bytes, Normalizer, OpusIngest, PipelineError, Segmenter, SegmenterConfig,
    VadGate, VadMode, VoiceSegment,
};
use scribe_transport::{InferenceClient, InferenceEvent};

use crate::context::RollingContext;
use crate::log::{LogEntry, LogError, LogOrigin, SessionLog};
use crate::names::{NameCache, NameResolver};

/// Cadence of the background flush pass that closes utterances when the
/// capture source stops delivering audio.
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);
const TEXT_QUEUE: usize = 256;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("session log error: {0}")]
    Log(#[from] LogError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("session stopped")]
    Stopped,
}

/// A text message from the platform's chat surface, logged next to the
/// voice transcriptions.
struct TextMessage {
    user_id: String,
    display_name: String,
    created_ts: f64,
    text: String,
}

/// Shared segment emission path: snapshots the prompt and hands the
/// segment to the transport. Captures only value state, so the
/// segmenters never hold a reference back into the session.
struct Dispatcher {
    client: InferenceClient,
    context: Mutex<RollingContext>,
    base_prompt: String,
}

impl Dispatcher {
    /// Space-joined base prompt plus the current context window.
    fn prompt(&self) -> String {
        let context = self.context.lock().snapshot();
        match (self.base_prompt.is_empty(), context.is_empty()) {
            (true, _) => context,
            (false, true) => self.base_prompt.clone(),
            (false, false) => format!("{} {}", self.base_prompt, context),
        }
    }

    fn dispatch(&self, mut segment: VoiceSegment) {
        let prompt = self.prompt();
        segment.prompt = (!prompt.is_empty()).then_some(prompt);
        debug!(
            participant = %segment.participant_id,
            index = segment.index,
            duration_ms = segment.duration_ms,
            "segment ready for inference"
        );
        self.client.send_segment(&segment);
    }
}

/// One live capture session.
///
/// Owns the full wiring: per-participant normalizer/segmenter state, the
/// inference transport, the rolling prompt context, the display-name
/// cache, and the event-loop task that serializes every session-log
/// write. Created by [`Session::start`], torn down by [`Session::stop`].
pub struct Session {
    session_name: String,
    vad_mode: VadMode,
    settings: Settings,
    normalizer: Normalizer,
    dispatcher: Arc<Dispatcher>,
    segmenters: Arc<DashMap<String, Arc<Mutex<Segmenter>>>>,
    decoders: DashMap<String, Arc<Mutex<OpusIngest>>>,
    names: Arc<NameCache>,
    /// Participants a directory lookup has already been fired for.
    /// One attempt per participant per session; misses fall back to the
    /// raw id.
    requested_names: Arc<DashMap<String, ()>>,
    resolver: Arc<dyn NameResolver>,
    text_tx: mpsc::Sender<TextMessage>,
    event_task: JoinHandle<()>,
    flush_task: AbortHandle,
}

impl Session {
    /// Opens the session log, connects the inference transport and
    /// starts the background tasks. Must be called from within a tokio
    /// runtime.
    pub fn start(
        settings: Settings,
        session_name: &str,
        resolver: Arc<dyn NameResolver>,
    ) -> Result<Self, SessionError> {
        validate_session_name(session_name)?;
        let vad_mode = VadMode::parse(&settings.vad.webrtc_mode).ok_or_else(|| {
            SessionError::Config(format!("unknown VAD mode '{}'", settings.vad.webrtc_mode))
        })?;
        // Surface a bad frame length at start, not on the first packet.
        VadGate::new(settings.vad.frame_ms, settings.vad.db_threshold, vad_mode)?;

        let dir = PathBuf::from(&settings.session.data_dir).join(session_name);
        let log = SessionLog::open(&dir)?;
        info!(session = %session_name, path = %log.path().display(), "session log opened");

        let (client, events) = InferenceClient::connect(settings.inference.url.clone());
        let dispatcher = Arc::new(Dispatcher {
            client,
            context: Mutex::new(RollingContext::new(settings.inference.context_words)),
            base_prompt: settings.inference.prompt.clone(),
        });

        let names = Arc::new(NameCache::new());
        let (text_tx, text_rx) = mpsc::channel(TEXT_QUEUE);
        let event_task = tokio::spawn(event_loop(
            events,
            text_rx,
            log,
            Arc::clone(&names),
            Arc::clone(&dispatcher),
        ));

        let segmenters: Arc<DashMap<String, Arc<Mutex<Segmenter>>>> = Arc::new(DashMap::new());
        let flush_task = tokio::spawn(flush_timer(
            Arc::clone(&segmenters),
            Arc::clone(&dispatcher),
        ))
        .abort_handle();

        Ok(Self {
            session_name: session_name.to_string(),
            vad_mode,
            settings,
            normalizer: Normalizer::new(),
            dispatcher,
            segmenters,
            decoders: DashMap::new(),
            names,
            requested_names: Arc::new(DashMap::new()),
            resolver,
            text_tx,
            event_task,
            flush_task,
        })
    }

    pub fn name(&self) -> &str {
        &self.session_name
    }

    /// Capture boundary: interleaved stereo 16-bit LE samples at 48kHz.
    pub fn ingest_stereo48(&self, participant_id: &str, bytes: &[u8]) -> Result<(), SessionError> {
        let samples = samples_from_le_bytes(bytes);
        self.ingest_samples(participant_id, &samples)
    }

    /// Capture boundary for platforms that deliver raw Opus packets.
    pub fn ingest_opus(&self, participant_id: &str, packet: &[u8]) -> Result<(), SessionError> {
        let stereo = self.decoder_for(participant_id)?.lock().decode(packet)?;
        self.ingest_samples(participant_id, &stereo)
    }

    /// Feeds one concealment frame for a lost Opus packet, keeping the
    /// decoder's prediction state coherent across the gap.
    pub fn ingest_opus_loss(&self, participant_id: &str) -> Result<(), SessionError> {
        let stereo = self.decoder_for(participant_id)?.lock().conceal_loss()?;
        self.ingest_samples(participant_id, &stereo)
    }

    fn ingest_samples(&self, participant_id: &str, stereo48: &[i16]) -> Result<(), SessionError> {
        let mono16 = self.normalizer.normalize(stereo48)?;
        let segmenter = self.segmenter_for(participant_id)?;

        let segments = {
            let mut guard = segmenter.lock();
            guard.push(&mono16);
            guard.flush()?
        };
        for segment in segments {
            self.dispatcher.dispatch(segment);
        }

        self.request_display_name(participant_id);
        Ok(())
    }

    /// Idempotent "stopped speaking" signal: runs a flush pass over
    /// every participant. Passes that would contend with an in-progress
    /// flush are coalesced into it.
    pub fn flush_all(&self) {
        flush_pass(&self.segmenters, &self.dispatcher);
    }

    /// Logs a chat message alongside the voice transcript and feeds it
    /// into the rolling prompt context.
    pub async fn log_text(
        &self,
        user_id: &str,
        display_name: &str,
        created_ts: f64,
        text: &str,
    ) -> Result<(), SessionError> {
        self.text_tx
            .send(TextMessage {
                user_id: user_id.to_string(),
                display_name: display_name.to_string(),
                created_ts,
                text: text.to_string(),
            })
            .await
            .map_err(|_| SessionError::Stopped)
    }

    /// The decoding hint the next emitted segment would carry.
    pub fn prompt_for_next_segment(&self) -> String {
        self.dispatcher.prompt()
    }

    /// Closes the transport and the log. Segments still in flight are
    /// dropped; transcriptions arriving after this point are discarded.
    pub async fn stop(self) {
        info!(session = %self.session_name, "stopping session");
        self.flush_task.abort();
        self.flush_all();
        self.dispatcher.client.stop();
        drop(self.text_tx);
        // The event loop drains and exits once both channels close.
        let _ = tokio::time::timeout(Duration::from_secs(2), self.event_task).await;
    }

    fn segmenter_for(&self, participant_id: &str) -> Result<Arc<Mutex<Segmenter>>, SessionError> {
        if let Some(existing) = self.segmenters.get(participant_id) {
            return Ok(Arc::clone(existing.value()));
        }

        // The gate carries adaptive state, so each participant gets a
        // fresh one.
        let gate = VadGate::new(
            self.settings.vad.frame_ms,
            self.settings.vad.db_threshold,
            self.vad_mode,
        )?;
        let segmenter = Arc::new(Mutex::new(Segmenter::new(
            participant_id,
            Box::new(gate),
            SegmenterConfig {
                silence_gap_ms: self.settings.segmenter.silence_gap_ms,
                min_segment_ms: self.settings.segmenter.min_segment_ms,
                max_segment_ms: self.settings.segmenter.max_segment_ms,
            },
        )));
        debug!(participant = %participant_id, "segmenter created");

        Ok(Arc::clone(
            self.segmenters
                .entry(participant_id.to_string())
                .or_insert(segmenter)
                .value(),
        ))
    }

    fn decoder_for(&self, participant_id: &str) -> Result<Arc<Mutex<OpusIngest>>, SessionError> {
        if let Some(existing) = self.decoders.get(participant_id) {
            return Ok(Arc::clone(existing.value()));
        }
        let decoder = Arc::new(Mutex::new(OpusIngest::new()?));
        Ok(Arc::clone(
            self.decoders
                .entry(participant_id.to_string())
                .or_insert(decoder)
                .value(),
        ))
    }

    fn request_display_name(&self, participant_id: &str) {
        if self.names.contains(participant_id)
            || self.requested_names.contains_key(participant_id)
        {
            return;
        }
        self.requested_names.insert(participant_id.to_string(), ());

        let resolver = Arc::clone(&self.resolver);
        let names = Arc::clone(&self.names);
        let id = participant_id.to_string();
        tokio::spawn(async move {
            match resolver.resolve(&id).await {
                Some(name) => {
                    debug!(participant = %id, display_name = %name, "display name resolved");
                    names.insert(&id, name);
                }
                None => debug!(participant = %id, "display name unresolved, using raw id"),
            }
        });
    }
}

fn validate_session_name(name: &str) -> Result<(), SessionError> {
    let ok = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && name != "."
        && name != "..";
    if ok {
        Ok(())
    } else {
        Err(SessionError::Config(format!(
            "session name '{name}' is not filesystem-safe"
        )))
    }
}

/// One flush pass over all participants. `try_lock` skips segmenters a
/// concurrent pass is already flushing.
fn flush_pass(segmenters: &DashMap<String, Arc<Mutex<Segmenter>>>, dispatcher: &Dispatcher) {
    for entry in segmenters.iter() {
        let Some(mut guard) = entry.value().try_lock() else {
            continue;
        };
        let segments = match guard.flush() {
            Ok(segments) => segments,
            Err(e) => {
                error!(participant = %entry.key(), error = %e, "flush failed");
                continue;
            }
        };
        drop(guard);
        for segment in segments {
            dispatcher.dispatch(segment);
        }
    }
}

async fn flush_timer(
    segmenters: Arc<DashMap<String, Arc<Mutex<Segmenter>>>>,
    dispatcher: Arc<Dispatcher>,
) {
    let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        flush_pass(&segmenters, &dispatcher);
    }
}

/// Single owner of the session log: every committed line passes through
/// here, so writes are serialized by construction.
async fn event_loop(
    mut events: mpsc::Receiver<InferenceEvent>,
    mut text_rx: mpsc::Receiver<TextMessage>,
    mut log: SessionLog,
    names: Arc<NameCache>,
    dispatcher: Arc<Dispatcher>,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    InferenceEvent::Connected => {
                        info!("inference worker ready");
                    }
                    InferenceEvent::Disconnected => {
                        warn!("inference worker lost; in-flight segments dropped");
                    }
                    InferenceEvent::Transcription(t) => {
                        let text = t.text.trim();
                        if text.is_empty() {
                            debug!(participant = %t.id, "empty transcription, skipping");
                            continue;
                        }
                        let entry = LogEntry {
                            user_id: t.id.clone(),
                            display_name: names.display_name(&t.id),
                            start_ts: t.capture_ts,
                            end_ts: t.end_ts,
                            origin: LogOrigin::Voice,
                            text: text.to_string(),
                        };
                        commit(&mut log, &entry);
                        dispatcher.context.lock().push_text(text);
                    }
                    InferenceEvent::WorkerError(e) => {
                        warn!(
                            code = %e.code,
                            message = %e.message,
                            "worker failed a segment; no log entry written"
                        );
                    }
                }
            }
            msg = text_rx.recv() => {
                let Some(msg) = msg else { break };
                let entry = LogEntry {
                    user_id: msg.user_id,
                    display_name: msg.display_name,
                    start_ts: msg.created_ts,
                    end_ts: msg.created_ts,
                    origin: LogOrigin::Text,
                    text: msg.text.clone(),
                };
                commit(&mut log, &entry);
                dispatcher.context.lock().push_text(&msg.text);
            }
        }
    }
}

/// The log is the session's consistency boundary: a failed write means
/// the process must not keep running and silently losing the record.
fn commit(log: &mut SessionLog, entry: &LogEntry) {
    if let Err(e) = log.append(entry) {
        error!(error = %e, "session log write failed");
        std::process::abort();
    }
}
