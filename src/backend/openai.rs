//! Client for OpenAI-compatible `/audio/transcriptions` and `/audio/speech`
//! endpoints.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use super::{BackendError, SpeechBackend, TranscriptionBackend};
use crate::types::{
    AudioResult, TextToSpeechOptions, TranscribedSegment, TranscriptionOptions, TranscriptionResult,
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    /// Named in errors when the key is missing.
    pub api_key_env: String,
    pub transcription_model: String,
    pub speech_model: String,
    pub voice: String,
    pub speed: f32,
    pub format: String,
    pub timeout: Duration,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
            transcription_model: "whisper-1".to_string(),
            speech_model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            speed: 1.0,
            format: "mp3".to_string(),
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    segments: Vec<SegmentResponse>,
    #[serde(default)]
    words: Vec<WordResponse>,
}

#[derive(Debug, Deserialize)]
struct SegmentResponse {
    start: f64,
    end: f64,
    text: String,
}

#[derive(Debug, Deserialize)]
struct WordResponse {
    start: f64,
    end: f64,
    word: String,
}

impl From<TranscriptionResponse> for TranscriptionResult {
    fn from(response: TranscriptionResponse) -> Self {
        let segments = if response.segments.is_empty() {
            response
                .words
                .into_iter()
                .map(|w| TranscribedSegment {
                    start: w.start,
                    end: w.end,
                    text: w.word,
                })
                .collect()
        } else {
            response
                .segments
                .into_iter()
                .map(|s| TranscribedSegment {
                    start: s.start,
                    end: s.end,
                    text: s.text.trim().to_string(),
                })
                .collect()
        };

        TranscriptionResult {
            text: response.text.trim().to_string(),
            language: response.language,
            duration_secs: response.duration,
            segments,
        }
    }
}

/// File name and MIME type for an upload, guessed from its magic bytes.
fn sniff_container(audio: &[u8]) -> (&'static str, &'static str) {
    if audio.starts_with(b"RIFF") {
        ("audio.wav", "audio/wav")
    } else if audio.starts_with(b"ID3") || audio.starts_with(&[0xFF, 0xFB]) {
        ("audio.mp3", "audio/mpeg")
    } else if audio.starts_with(b"OggS") {
        ("audio.ogg", "audio/ogg")
    } else if audio.starts_with(b"fLaC") {
        ("audio.flac", "audio/flac")
    } else {
        ("audio.bin", "application/octet-stream")
    }
}

pub struct OpenAiClient {
    http: reqwest::Client,
    settings: OpenAiSettings,
}

impl OpenAiClient {
    pub fn new(settings: OpenAiSettings) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, settings })
    }

    pub fn settings(&self) -> &OpenAiSettings {
        &self.settings
    }

    fn headers(&self) -> Result<HeaderMap, BackendError> {
        let key = self
            .settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| BackendError::MissingApiKey(self.settings.api_key_env.clone()))?;

        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(&format!("Bearer {}", key))
            .map_err(|e| BackendError::Decode(format!("invalid API key: {}", e)))?;
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    fn timeout(&self, timeout_ms: Option<u64>) -> Duration {
        timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.settings.timeout)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<reqwest::Response, BackendError> {
        let response = request.timeout(timeout).send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(timeout)
            } else {
                BackendError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(BackendError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl TranscriptionBackend for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn transcribe(
        &self,
        audio: Vec<u8>,
        options: &TranscriptionOptions,
    ) -> Result<TranscriptionResult, BackendError> {
        let headers = self.headers()?;
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.settings.transcription_model.clone());
        let url = self.endpoint("audio/transcriptions");
        debug!(
            "Sending transcription request to {} (model: {}, {} bytes)",
            url,
            model,
            audio.len()
        );

        let (file_name, mime) = sniff_container(&audio);
        let part = Part::bytes(audio).file_name(file_name).mime_str(mime)?;

        let mut form = Form::new().part("file", part).text("model", model);
        if let Some(language) = options.language.as_deref().filter(|l| !l.is_empty() && *l != "auto") {
            form = form.text("language", language.to_string());
        }
        if let Some(prompt) = &options.prompt {
            form = form.text("prompt", prompt.clone());
        }
        form = match &options.timestamp_granularity {
            Some(granularity) => form
                .text("response_format", "verbose_json")
                .text("timestamp_granularities[]", granularity.clone()),
            None => form.text("response_format", "json"),
        };

        let timeout = self.timeout(options.timeout_ms);
        let request = self.http.post(&url).headers(headers).multipart(form);
        let response = self.send(request, timeout).await?;

        let body = response.text().await?;
        let parsed: TranscriptionResponse =
            serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))?;
        let result = TranscriptionResult::from(parsed);

        info!("Transcription completed ({} chars)", result.text.len());
        Ok(result)
    }
}

#[async_trait]
impl SpeechBackend for OpenAiClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn synthesize(
        &self,
        text: &str,
        options: &TextToSpeechOptions,
    ) -> Result<AudioResult, BackendError> {
        let headers = self.headers()?;
        let settings = &self.settings;
        let model = options.model.as_deref().unwrap_or(&settings.speech_model);
        let voice = options.voice.as_deref().unwrap_or(&settings.voice);
        let format = options.format.as_deref().unwrap_or(&settings.format);
        let speed = options.speed.unwrap_or(settings.speed);

        let url = self.endpoint("audio/speech");
        debug!(
            "Sending speech request to {} (model: {}, voice: {}, {} chars)",
            url,
            model,
            voice,
            text.len()
        );

        let request = self.http.post(&url).headers(headers).json(&serde_json::json!({
            "model": model,
            "input": text,
            "voice": voice,
            "speed": speed,
            "response_format": format,
        }));
        let response = self.send(request, self.timeout(options.timeout_ms)).await?;
        let data = response.bytes().await?.to_vec();

        info!("Synthesized {} bytes of {} audio", data.len(), format);
        Ok(AudioResult {
            data,
            format: format.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer one request with `body`, handing back the raw request text.
    async fn serve_once(
        status: &'static str,
        content_type: &'static str,
        body: Vec<u8>,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}/v1", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request_complete(&request) {
                    break;
                }
            }

            let head = format!(
                "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                content_type,
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });

        (base_url, handle)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let head = text[..header_end].to_ascii_lowercase();
        let body_len = request.len() - (header_end + 4);
        match head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            Some(length) => body_len >= length,
            None => !head.contains("transfer-encoding: chunked") || text.ends_with("0\r\n\r\n"),
        }
    }

    fn client(base_url: String, api_key: Option<&str>) -> OpenAiClient {
        OpenAiClient::new(OpenAiSettings {
            base_url,
            api_key: api_key.map(str::to_string),
            ..OpenAiSettings::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_request() {
        // Nothing listens here; a request would fail differently.
        let client = client("http://127.0.0.1:9/v1".to_string(), None);

        let err = client
            .transcribe(b"RIFF".to_vec(), &TranscriptionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::MissingApiKey(ref env) if env == "OPENAI_API_KEY"));

        let err = client
            .synthesize("hi", &TextToSpeechOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::MissingApiKey(_)));
    }

    #[tokio::test]
    async fn test_transcription_request_and_response() {
        let body = br#"{"text": " hello there ", "language": "english", "duration": 1.5,
            "words": [{"start": 0.0, "end": 0.4, "word": "hello"}, {"start": 0.5, "end": 0.9, "word": "there"}]}"#;
        let (base_url, server) = serve_once("200 OK", "application/json", body.to_vec()).await;
        let client = client(base_url, Some("sk-test"));

        let result = client
            .transcribe(
                b"RIFF....WAVE".to_vec(),
                &TranscriptionOptions {
                    language: Some("en".to_string()),
                    timestamp_granularity: Some("word".to_string()),
                    ..TranscriptionOptions::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(result.text, "hello there");
        assert_eq!(result.language.as_deref(), Some("english"));
        assert_eq!(result.duration_secs, Some(1.5));
        assert_eq!(result.segments.len(), 2);
        assert_eq!(result.segments[1].text, "there");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/audio/transcriptions"));
        assert!(request.contains("Bearer sk-test"));
        assert!(request.contains("whisper-1"));
        assert!(request.contains("verbose_json"));
        assert!(request.contains("filename=\"audio.wav\""));
    }

    #[tokio::test]
    async fn test_speech_request_returns_bytes() {
        let (base_url, server) = serve_once("200 OK", "audio/mpeg", vec![0xFF, 0xFB, 1, 2]).await;
        let client = client(base_url, Some("sk-test"));

        let audio = client
            .synthesize(
                "Hello",
                &TextToSpeechOptions {
                    voice: Some("nova".to_string()),
                    ..TextToSpeechOptions::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(audio.data, vec![0xFF, 0xFB, 1, 2]);
        assert_eq!(audio.format, "mp3");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /v1/audio/speech"));
        assert!(request.contains("\"voice\":\"nova\""));
        assert!(request.contains("\"model\":\"tts-1\""));
    }

    #[tokio::test]
    async fn test_api_error_carries_status() {
        let (base_url, _server) =
            serve_once("401 Unauthorized", "application/json", b"{\"error\":\"bad key\"}".to_vec()).await;
        let client = client(base_url, Some("sk-wrong"));

        let err = client
            .synthesize("Hello", &TextToSpeechOptions::default())
            .await
            .unwrap_err();
        match err {
            BackendError::Api { status, body } => {
                assert_eq!(status, 401);
                assert!(body.contains("bad key"));
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[test]
    fn test_sniff_container() {
        assert_eq!(sniff_container(b"RIFF0000WAVE").1, "audio/wav");
        assert_eq!(sniff_container(b"ID3\x03").1, "audio/mpeg");
        assert_eq!(sniff_container(b"OggS").0, "audio.ogg");
        assert_eq!(sniff_container(b"??").1, "application/octet-stream");
    }
}
