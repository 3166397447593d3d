use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{DynamicImage, ImageBuffer, Rgb};
use infrascan::detection::{DefectDetector, DetectionBatch, RawDetection};
use infrascan::error::{DetectorError, ModelError};
use infrascan::explanation::{ExplanationService, ModelHandle, ModelLoader, VisionModel};
use infrascan::models::{BoundingBox, DefectType, Detection, ImageMetrics};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const MODEL_EXPLANATION: &str = "Model explanation of the region.";
pub const MODEL_ACTION: &str = "Model recommended action.";

/// Creates a grey in-memory image of the given size
pub fn blank_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |_, _| {
        Rgb([128u8, 128u8, 128u8])
    }))
}

/// PNG-encoded bytes of a grey image
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    blank_image(width, height)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("Failed to encode test image");
    bytes
}

pub fn metrics(width: u32, height: u32) -> ImageMetrics {
    ImageMetrics { width, height }
}

/// A validated detection with the box placed at the origin
pub fn detection_at_origin(defect_type: DefectType, confidence: f64, w: f64, h: f64) -> Detection {
    Detection {
        defect_type,
        confidence,
        bounding_box: BoundingBox {
            x1: 0.0,
            y1: 0.0,
            x2: w,
            y2: h,
        },
    }
}

/// Detector returning the same raw detections on every call
pub struct StaticDetector {
    detections: Vec<RawDetection>,
    metrics: Option<ImageMetrics>,
    pub calls: AtomicUsize,
}

impl StaticDetector {
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self {
            detections,
            metrics: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Report these dimensions instead of the decoded image's
    pub fn with_metrics(mut self, metrics: ImageMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn shared(self) -> Arc<dyn DefectDetector> {
        Arc::new(self)
    }
}

#[async_trait]
impl DefectDetector for StaticDetector {
    async fn detect(&self, image: &DynamicImage) -> Result<DetectionBatch, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let metrics = self.metrics.unwrap_or_else(|| ImageMetrics::of(image));
        Ok(DetectionBatch::new(self.detections.clone(), metrics))
    }

    fn name(&self) -> &str {
        "static detector"
    }
}

/// Detector that is never reachable
pub struct FailingDetector;

#[async_trait]
impl DefectDetector for FailingDetector {
    async fn detect(&self, _image: &DynamicImage) -> Result<DetectionBatch, DetectorError> {
        Err(DetectorError::Unavailable("connection refused".to_string()))
    }

    fn name(&self) -> &str {
        "failing detector"
    }
}

/// Model answering with fixed texts. Tracks calls and how many run at once.
#[derive(Default)]
pub struct ScriptedModel {
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

#[async_trait]
impl VisionModel for ScriptedModel {
    async fn generate(&self, prompt: &str, _region: &DynamicImage) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        // Give other callers a chance to overlap
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if prompt.contains("recommended action") {
            Ok(format!("  {}  ", MODEL_ACTION))
        } else {
            Ok(MODEL_EXPLANATION.to_string())
        }
    }
}

/// Model whose every inference fails
#[derive(Default)]
pub struct FailingModel {
    pub calls: AtomicUsize,
}

#[async_trait]
impl VisionModel for FailingModel {
    async fn generate(&self, _prompt: &str, _region: &DynamicImage) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ModelError::Inference("out of memory".to_string()))
    }
}

/// Model that only ever answers with whitespace
pub struct SilentModel;

#[async_trait]
impl VisionModel for SilentModel {
    async fn generate(&self, _prompt: &str, _region: &DynamicImage) -> Result<String, ModelError> {
        Ok("   ".to_string())
    }
}

/// Loader handing out a prepared model and counting loads
pub struct CountingLoader {
    model: Option<Arc<dyn VisionModel>>,
    pub loads: Arc<AtomicUsize>,
}

impl CountingLoader {
    pub fn new(model: Arc<dyn VisionModel>) -> Self {
        Self {
            model: Some(model),
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A loader whose every load attempt fails
    pub fn broken() -> Self {
        Self {
            model: None,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl ModelLoader for CountingLoader {
    async fn load(&self) -> Result<Arc<dyn VisionModel>, ModelError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.model
            .clone()
            .ok_or_else(|| ModelError::Load("weights not found".to_string()))
    }

    fn describe(&self) -> String {
        "counting test loader".to_string()
    }
}

/// Model-preferred service around `model`. Returns the service, the handle
/// and the load counter.
pub fn model_service(
    model: Arc<dyn VisionModel>,
    demote_after_failures: u32,
    max_concurrent_requests: usize,
) -> (ExplanationService, Arc<ModelHandle>, Arc<AtomicUsize>) {
    let loader = CountingLoader::new(model);
    let loads = loader.loads.clone();
    let handle = Arc::new(ModelHandle::new(loader, max_concurrent_requests));
    let service = ExplanationService::model_preferred(handle.clone(), demote_after_failures);
    (service, handle, loads)
}

/// A request seen by [`CannedServer`]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Path and query, e.g. "/generate?prompt=..."
    pub target: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// Minimal HTTP/1.1 responder on a local port answering every request with
/// the same status and JSON body
pub struct CannedServer {
    pub url: String,
    pub requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl CannedServer {
    pub async fn start(status: u16, body: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test server");
        let addr = listener.local_addr().expect("Failed to read test server address");
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let recorded = recorded.clone();
                tokio::spawn(answer(stream, status, body, recorded));
            }
        });

        Self {
            url: format!("http://{}", addr),
            requests,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("request log poisoned").clone()
    }
}

/// Read one request, record it, then respond. Recording comes first so a
/// client that has its response always finds its request in the log.
async fn answer(
    mut stream: TcpStream,
    status: u16,
    body: &'static str,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
) -> Option<()> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        let read = stream.read(&mut chunk).await.ok()?;
        if read == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..read]);
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.lines();
    let target = lines.next()?.split_whitespace().nth(1)?.to_string();
    let mut content_length = 0;
    let mut content_type = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.trim().parse().unwrap_or(0),
                "content-type" => content_type = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }

    while buffer.len() < header_end + content_length {
        let read = stream.read(&mut chunk).await.ok()?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }

    recorded
        .lock()
        .expect("request log poisoned")
        .push(RecordedRequest {
            target,
            content_type,
            body: buffer[header_end..].to_vec(),
        });

    let reason = if status < 400 { "OK" } else { "Error" };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await.ok()?;
    stream.shutdown().await.ok()
}

/// Log lines written by a subscriber installed with [`capture_logs`]
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log buffer poisoned")).to_string()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("log buffer poisoned").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Route log output of the current thread into a buffer until the guard drops.
/// Use with the current-thread test runtime.
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_target(true)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}
