//! Common test utilities for the scanner integration tests.

#![allow(dead_code)]

/// Camera backend wrapper that records open/stop ordering
pub mod mock_camera {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use code_scanner::camera::{
        CameraBackend, CaptureDevice, DeviceCapabilities, ReplayBackend, StreamRequest, VideoSource,
    };
    use code_scanner::core::FrameBuffer;
    use code_scanner::{ScannerResult, Size};

    pub type EventLog = Arc<Mutex<Vec<String>>>;

    /// Delegates to a replay backend and logs `open:<id>` / `stop:<id>`.
    pub struct RecordingBackend {
        inner: ReplayBackend,
        events: EventLog,
    }

    impl RecordingBackend {
        pub fn new(inner: ReplayBackend) -> Self {
            Self {
                inner,
                events: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        pub fn log(&self) -> EventLog {
            Arc::clone(&self.events)
        }
    }

    #[async_trait]
    impl CameraBackend for RecordingBackend {
        async fn enumerate(&self) -> ScannerResult<Vec<CaptureDevice>> {
            self.events.lock().unwrap().push("enumerate".to_string());
            self.inner.enumerate().await
        }

        async fn capabilities(&self, device_id: &str) -> ScannerResult<DeviceCapabilities> {
            self.inner.capabilities(device_id).await
        }

        async fn open(&self, request: &StreamRequest) -> ScannerResult<Box<dyn VideoSource>> {
            let source = self.inner.open(request).await?;
            self.events
                .lock()
                .unwrap()
                .push(format!("open:{}", source.device_id()));
            Ok(Box::new(RecordingSource {
                inner: source,
                events: Arc::clone(&self.events),
            }))
        }
    }

    struct RecordingSource {
        inner: Box<dyn VideoSource>,
        events: EventLog,
    }

    #[async_trait]
    impl VideoSource for RecordingSource {
        fn device_id(&self) -> &str {
            self.inner.device_id()
        }

        fn negotiated_size(&self) -> Size {
            self.inner.negotiated_size()
        }

        fn has_frame_data(&mut self) -> bool {
            self.inner.has_frame_data()
        }

        fn read_frame(&mut self, buffer: &mut FrameBuffer) -> ScannerResult<()> {
            self.inner.read_frame(buffer)
        }

        fn supports_illumination(&self) -> bool {
            self.inner.supports_illumination()
        }

        async fn apply_illumination(&mut self, on: bool) -> ScannerResult<()> {
            self.inner.apply_illumination(on).await
        }

        async fn stop(&mut self) {
            self.events
                .lock()
                .unwrap()
                .push(format!("stop:{}", self.inner.device_id()));
            self.inner.stop().await;
        }
    }
}

/// Decoders with scripted outcomes
pub mod mock_decode {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use code_scanner::{DecodePrimitive, DecodedCode, Point};

    /// Succeeds on the `succeed_on`-th call (1-based) and every call after it.
    pub struct ScriptedDecoder {
        payload: String,
        succeed_on: usize,
        calls: AtomicUsize,
    }

    impl ScriptedDecoder {
        pub fn new(payload: &str, succeed_on: usize) -> Self {
            Self {
                payload: payload.to_string(),
                succeed_on,
                calls: AtomicUsize::new(0),
            }
        }

        /// Never finds anything.
        pub fn never() -> Self {
            Self::new("", usize::MAX)
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl DecodePrimitive for ScriptedDecoder {
        fn decode(&self, rgba: &[u8], width: u32, height: u32) -> Option<DecodedCode> {
            assert_eq!(rgba.len(), (width * height * 4) as usize, "sampled buffer must match frame size");
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            (call >= self.succeed_on).then(|| DecodedCode {
                data: self.payload.clone(),
                corners: [Point::default(); 4],
            })
        }
    }
}

/// Frame and image fixtures
pub mod test_frames {
    use std::io::Cursor;

    use code_scanner::Size;
    use code_scanner::camera::RgbaFrame;

    pub const MODULE_PX: u32 = 6;
    pub const QUIET_MODULES: u32 = 4;

    /// Renders `payload` as a QR code on a white background.
    pub fn qr_image(payload: &str) -> image::RgbaImage {
        let code = qrcode::QrCode::new(payload.as_bytes()).unwrap();
        let modules = code.width() as u32;
        let colors = code.to_colors();
        let side = (modules + QUIET_MODULES * 2) * MODULE_PX;

        image::RgbaImage::from_fn(side, side, |x, y| {
            let mx = (x / MODULE_PX) as i64 - QUIET_MODULES as i64;
            let my = (y / MODULE_PX) as i64 - QUIET_MODULES as i64;
            let inside = mx >= 0 && my >= 0 && mx < modules as i64 && my < modules as i64;
            if inside && colors[(my as u32 * modules + mx as u32) as usize] == qrcode::Color::Dark {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        })
    }

    pub fn qr_frame(payload: &str) -> RgbaFrame {
        RgbaFrame::from_image(&image::DynamicImage::ImageRgba8(qr_image(payload)))
    }

    pub fn blank_frame(size: Size) -> RgbaFrame {
        RgbaFrame::solid(size, [255, 255, 255, 255])
    }

    /// Small grey frame for tests that use a scripted decoder.
    pub fn grey_frame() -> RgbaFrame {
        RgbaFrame::solid(Size::new(8, 6), [128, 128, 128, 255])
    }

    pub fn png_bytes(image: &image::RgbaImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    pub fn qr_png(payload: &str) -> Vec<u8> {
        png_bytes(&qr_image(payload))
    }

    pub fn blank_png(width: u32, height: u32) -> Vec<u8> {
        png_bytes(&image::RgbaImage::from_pixel(width, height, image::Rgba([255, 255, 255, 255])))
    }
}

/// Lookup services with controllable timing
pub mod mock_lookup {
    use std::collections::HashMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use code_scanner::ScannerResult;
    use code_scanner::classify::{MockCatalog, RecordLookup, RecordQuery, ScanDetails};

    /// Sample catalog with a per-key delay.
    pub struct DelayedLookup {
        catalog: MockCatalog,
        delays: HashMap<String, Duration>,
    }

    impl DelayedLookup {
        pub fn new() -> Self {
            Self {
                catalog: MockCatalog::new(),
                delays: HashMap::new(),
            }
        }

        pub fn with_delay(mut self, key: &str, delay: Duration) -> Self {
            self.delays.insert(key.to_string(), delay);
            self
        }
    }

    #[async_trait]
    impl RecordLookup for DelayedLookup {
        async fn resolve(&self, query: &RecordQuery) -> ScannerResult<ScanDetails> {
            if let Some(delay) = self.delays.get(&query.key) {
                tokio::time::sleep(*delay).await;
            }
            self.catalog.resolve(query).await
        }
    }
}

/// Camera whose frame reads block the reading thread
pub mod slow_camera {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use code_scanner::camera::{
        CameraBackend, CaptureDevice, DeviceCapabilities, StreamRequest, VideoSource,
    };
    use code_scanner::core::FrameBuffer;
    use code_scanner::{ScannerResult, Size};

    const FRAME: Size = Size { w: 8, h: 6 };

    /// Opens streams whose `read_frame` sleeps for `read_delay`.
    pub struct SlowBackend {
        read_delay: Duration,
        reads: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
    }

    impl SlowBackend {
        pub fn new(read_delay: Duration) -> Self {
            Self {
                read_delay,
                reads: Arc::new(AtomicUsize::new(0)),
                stops: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Reads started so far.
        pub fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }

        pub fn stops(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CameraBackend for SlowBackend {
        async fn enumerate(&self) -> ScannerResult<Vec<CaptureDevice>> {
            Ok(Vec::new())
        }

        async fn capabilities(&self, _device_id: &str) -> ScannerResult<DeviceCapabilities> {
            Ok(DeviceCapabilities::default())
        }

        async fn open(&self, _request: &StreamRequest) -> ScannerResult<Box<dyn VideoSource>> {
            Ok(Box::new(SlowSource {
                read_delay: self.read_delay,
                reads: Arc::clone(&self.reads),
                stops: Arc::clone(&self.stops),
            }))
        }
    }

    struct SlowSource {
        read_delay: Duration,
        reads: Arc<AtomicUsize>,
        stops: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl VideoSource for SlowSource {
        fn device_id(&self) -> &str {
            "slow-0"
        }

        fn negotiated_size(&self) -> Size {
            FRAME
        }

        fn has_frame_data(&mut self) -> bool {
            true
        }

        fn read_frame(&mut self, buffer: &mut FrameBuffer) -> ScannerResult<()> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.read_delay);
            buffer.ensure_size(FRAME);
            Ok(())
        }

        fn supports_illumination(&self) -> bool {
            false
        }

        async fn apply_illumination(&mut self, _on: bool) -> ScannerResult<()> {
            Ok(())
        }

        async fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }
}
