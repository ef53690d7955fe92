//! End-to-end session tests over real TCP with mocked collaborators

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

use voicelink_config::Settings;
use voicelink_core::{
    AudioSpec, Error, ResponseGenerator, Result as CoreResult, SpeechRecognizer,
    SpeechSynthesizer, SynthesizedSpeech, TextFragmentStream, TurnLogger, TurnRecord, Utterance,
};
use voicelink_server::{AppState, Collaborators, Listener};
use voicelink_transport::{FrameCodec, FrameRead};

const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
const REPLY_PCM: &[u8] = &[0x55; 5000];

// ---------------------------------------------------------------------------
// Mock collaborators
// ---------------------------------------------------------------------------

struct MockRecognizer {
    wake_after: usize,
    fail_transcribe: bool,
    chunks: Mutex<HashMap<String, usize>>,
    utterance_sizes: Mutex<Vec<usize>>,
}

impl MockRecognizer {
    fn new(wake_after: usize) -> Self {
        Self {
            wake_after,
            fail_transcribe: false,
            chunks: Mutex::new(HashMap::new()),
            utterance_sizes: Mutex::new(Vec::new()),
        }
    }

    fn failing_transcribe(wake_after: usize) -> Self {
        Self {
            fail_transcribe: true,
            ..Self::new(wake_after)
        }
    }
}

#[async_trait]
impl SpeechRecognizer for MockRecognizer {
    async fn create_stream(&self, session_id: &str) -> CoreResult<()> {
        self.chunks.lock().insert(session_id.to_string(), 0);
        Ok(())
    }

    async fn process_chunk(&self, session_id: &str, _pcm: &[u8]) -> CoreResult<bool> {
        let mut chunks = self.chunks.lock();
        let seen = chunks.entry(session_id.to_string()).or_insert(0);
        *seen += 1;
        Ok(*seen >= self.wake_after)
    }

    async fn transcribe(&self, utterance: &Utterance) -> CoreResult<String> {
        if self.fail_transcribe {
            return Err(Error::Recognition("mock model failure".to_string()));
        }
        self.utterance_sizes.lock().push(utterance.len());
        Ok("mock transcript".to_string())
    }

    async fn reset_stream(&self, session_id: &str) -> CoreResult<()> {
        self.chunks.lock().insert(session_id.to_string(), 0);
        Ok(())
    }

    async fn destroy_stream(&self, session_id: &str) -> CoreResult<()> {
        self.chunks.lock().remove(session_id);
        Ok(())
    }

    fn model_name(&self) -> &str {
        "mock-recognizer"
    }
}

struct MockGenerator;

#[async_trait]
impl ResponseGenerator for MockGenerator {
    async fn generate(&self, _prompt: &str) -> CoreResult<TextFragmentStream> {
        let fragments: Vec<CoreResult<String>> = vec![
            Ok("It ".to_string()),
            Ok("is ".to_string()),
            Ok("sunny.".to_string()),
        ];
        Ok(Box::pin(futures::stream::iter(fragments)))
    }

    fn model_name(&self) -> &str {
        "mock-generator"
    }
}

struct MockSynthesizer;

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, _text: &str) -> CoreResult<SynthesizedSpeech> {
        Ok(SynthesizedSpeech {
            pcm: REPLY_PCM.to_vec(),
            spec: AudioSpec::default(),
        })
    }

    fn model_name(&self) -> &str {
        "mock-synthesizer"
    }
}

#[derive(Default)]
struct MemoryTurnLogger {
    records: Mutex<Vec<TurnRecord>>,
}

#[async_trait]
impl TurnLogger for MemoryTurnLogger {
    async fn append_turn(&self, record: &TurnRecord) -> CoreResult<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

struct TestServer {
    addr: SocketAddr,
    recognizer: Arc<MockRecognizer>,
    turn_log: Arc<MemoryTurnLogger>,
    _scratch: tempfile::TempDir,
    _shutdown: oneshot::Sender<()>,
}

async fn start_server(recognizer: MockRecognizer, mutate: impl FnOnce(&mut Settings)) -> TestServer {
    let scratch = tempfile::tempdir().unwrap();

    let mut settings = Settings::default();
    settings.server.host = "127.0.0.1".to_string();
    settings.server.port = 0;
    settings.audio.scratch_dir = scratch.path().to_string_lossy().into_owned();
    mutate(&mut settings);

    let recognizer = Arc::new(recognizer);
    let turn_log = Arc::new(MemoryTurnLogger::default());

    let collaborators = Collaborators {
        recognizer: recognizer.clone(),
        generator: Arc::new(MockGenerator),
        synthesizer: Arc::new(MockSynthesizer),
        turn_logger: turn_log.clone(),
    };

    let state = AppState::new(settings, collaborators);
    let listener = Listener::bind(state).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    tokio::spawn(listener.serve(async {
        let _ = shutdown_rx.await;
    }));

    TestServer {
        addr,
        recognizer,
        turn_log,
        _scratch: scratch,
        _shutdown: shutdown_tx,
    }
}

struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    codec: FrameCodec,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
            codec: FrameCodec::default(),
        }
    }

    async fn send_frame(&mut self, payload: &[u8]) {
        self.writer
            .write_all(&(payload.len() as u16).to_be_bytes())
            .await
            .unwrap();
        self.writer.write_all(payload).await.unwrap();
    }

    async fn send_sentinel(&mut self) {
        self.writer.write_all(&0xFFFFu16.to_be_bytes()).await.unwrap();
    }

    async fn send_raw_header(&mut self, declared: u16) {
        self.writer.write_all(&declared.to_be_bytes()).await.unwrap();
    }

    async fn read_token(&mut self) -> String {
        let mut line = String::new();
        tokio::time::timeout(CLIENT_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for control token")
            .unwrap();
        line.trim_end().to_string()
    }

    async fn read_reply(&mut self) -> Vec<u8> {
        let mut audio = Vec::new();
        loop {
            match self
                .codec
                .read_frame(&mut self.reader, CLIENT_TIMEOUT)
                .await
                .unwrap()
            {
                FrameRead::Payload(chunk) => audio.extend_from_slice(&chunk),
                FrameRead::EndOfMessage => break,
            }
        }
        audio
    }

    /// Stream idle chunks until the server confirms the wake phrase
    async fn wake(&mut self, chunks: usize) {
        for _ in 0..chunks {
            self.send_frame(&[0u8; 1024]).await;
        }
        assert_eq!(self.read_token().await, "WAKE_CONFIRMED");
    }

    /// Send a full utterance of `total` bytes in max-sized frames plus the sentinel
    async fn send_utterance(&mut self, total: usize) {
        let mut remaining = total;
        while remaining > 0 {
            let chunk = remaining.min(4000);
            self.send_frame(&vec![0u8; chunk]).await;
            remaining -= chunk;
        }
        self.send_sentinel().await;
    }

    /// Run one complete turn and return the reply audio
    async fn full_turn(&mut self, wake_chunks: usize, utterance_bytes: usize) -> Vec<u8> {
        self.wake(wake_chunks).await;
        self.send_utterance(utterance_bytes).await;
        assert_eq!(self.read_token().await, "DATA_RECEIVED");
        let audio = self.read_reply().await;
        assert_eq!(self.read_token().await, "REPLY_COMPLETE");
        audio
    }

    /// Read until EOF; returns the number of trailing bytes seen
    async fn expect_disconnect(&mut self) -> usize {
        let mut sink = Vec::new();
        tokio::time::timeout(CLIENT_TIMEOUT, self.reader.read_to_end(&mut sink))
            .await
            .expect("timed out waiting for disconnect")
            .unwrap()
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_example_scenario_full_turn() {
    let server = start_server(MockRecognizer::new(2), |_| {}).await;
    let mut client = TestClient::connect(server.addr).await;

    // Wake confirms on the second idle chunk
    let audio = client.full_turn(2, 40_000).await;
    assert_eq!(audio, REPLY_PCM);

    // The pipeline saw exactly one 40,000-byte utterance
    assert_eq!(*server.recognizer.utterance_sizes.lock(), vec![40_000]);

    let records = server.turn_log.records.lock().clone();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].transcript, "mock transcript");
    assert_eq!(records[0].response_text, "It is sunny.");
}

#[tokio::test]
async fn test_second_turn_after_reset() {
    let server = start_server(MockRecognizer::new(2), |_| {}).await;
    let mut client = TestClient::connect(server.addr).await;

    client.full_turn(2, 40_000).await;

    // The wake detector was reset, so confirmation again takes two chunks
    let audio = client.full_turn(2, 36_000).await;
    assert_eq!(audio, REPLY_PCM);

    assert_eq!(server.turn_log.records.lock().len(), 2);
    assert_eq!(
        *server.recognizer.utterance_sizes.lock(),
        vec![40_000, 36_000]
    );
}

#[tokio::test]
async fn test_short_utterance_rejected_then_recovers() {
    let server = start_server(MockRecognizer::new(1), |_| {}).await;
    let mut client = TestClient::connect(server.addr).await;

    client.wake(1).await;
    client.send_utterance(100).await;
    assert_eq!(client.read_token().await, "<ERROR>");

    // Below-minimum audio never reaches recognition
    assert!(server.recognizer.utterance_sizes.lock().is_empty());
    assert!(server.turn_log.records.lock().is_empty());

    // Session regressed to idle and still works
    let audio = client.full_turn(1, 40_000).await;
    assert_eq!(audio, REPLY_PCM);
}

#[tokio::test]
async fn test_recognition_failure_reported_then_recovers() {
    let server = start_server(MockRecognizer::failing_transcribe(1), |_| {}).await;
    let mut client = TestClient::connect(server.addr).await;

    client.wake(1).await;
    client.send_utterance(40_000).await;
    assert_eq!(client.read_token().await, "DATA_RECEIVED");
    assert_eq!(client.read_token().await, "<ERROR>");
    assert!(server.turn_log.records.lock().is_empty());

    // Connection stays open; the next wake still works
    client.wake(1).await;
}

#[tokio::test]
async fn test_capture_timeout_regresses_to_idle() {
    let server = start_server(MockRecognizer::new(1), |settings| {
        settings.audio.capture_timeout_secs = 1;
    })
    .await;
    let mut client = TestClient::connect(server.addr).await;

    client.wake(1).await;
    // Send nothing: capture must give up after the 1s timeout
    assert_eq!(client.read_token().await, "<ERROR>");

    let audio = client.full_turn(1, 40_000).await;
    assert_eq!(audio, REPLY_PCM);
}

#[tokio::test]
async fn test_illegal_frame_aborts_session() {
    let server = start_server(MockRecognizer::new(1), |_| {}).await;

    // Zero-length frame
    let mut client = TestClient::connect(server.addr).await;
    client.send_raw_header(0).await;
    assert_eq!(client.expect_disconnect().await, 0);

    // Oversized frame (> 4096)
    let mut client = TestClient::connect(server.addr).await;
    client.send_raw_header(8192).await;
    assert_eq!(client.expect_disconnect().await, 0);
}

#[tokio::test]
async fn test_session_isolation() {
    let server = start_server(MockRecognizer::new(1), |_| {}).await;
    let addr = server.addr;

    // One peer repeatedly violates the protocol and gets aborted
    let faulty = tokio::spawn(async move {
        for declared in [0u16, 0, 8192] {
            let mut client = TestClient::connect(addr).await;
            client.send_raw_header(declared).await;
            client.expect_disconnect().await;
        }
    });

    // A concurrent healthy peer must complete a full turn regardless
    let healthy = tokio::spawn(async move {
        let mut client = TestClient::connect(addr).await;
        client.full_turn(1, 40_000).await
    });

    let (faulty, audio) = tokio::join!(faulty, healthy);
    faulty.unwrap();
    assert_eq!(audio.unwrap(), REPLY_PCM);
    assert_eq!(server.turn_log.records.lock().len(), 1);
}
