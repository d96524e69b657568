//! Integration tests for the frame scan loop
//!
//! Covers delivery guarantees (at most one `on_decoded` per start),
//! cancellation from every state, warm-up handling and stream release.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use code_scanner::camera::{Facing, ReplayBackend, ReplayDevice};
use code_scanner::{
    CaptureSession, DecodePrimitive, DecodedCode, DecodedPayload, FrameScanLoop, LoopExit, Point, Provenance,
    QrDecoder, Size, StreamHandle,
};
use common::mock_decode::ScriptedDecoder;
use common::test_frames::{blank_frame, grey_frame, qr_frame};

const INTERVAL: Duration = Duration::from_millis(16);

type Delivered = Arc<Mutex<Vec<DecodedPayload>>>;

async fn open_stream(device: ReplayDevice) -> (CaptureSession, StreamHandle) {
    let backend = Arc::new(ReplayBackend::new().with_device(device));
    let scan_loop = FrameScanLoop::new(Arc::new(ScriptedDecoder::never()), INTERVAL);
    let mut session = CaptureSession::new(backend, scan_loop, Size::new(1280, 720));
    let handle = session.open(None, Facing::Rear).await.unwrap();
    (session, handle)
}

fn camera() -> ReplayDevice {
    ReplayDevice::new("cam-0", "Back Camera").with_frame(grey_frame())
}

fn recorder() -> (Delivered, impl FnOnce(DecodedPayload) + Send + 'static) {
    let delivered: Delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&delivered);
    (delivered, move |payload| sink.lock().unwrap().push(payload))
}

#[tokio::test(start_paused = true)]
async fn test_delivers_exactly_once_and_stops_sampling() {
    let (_session, stream) = open_stream(camera()).await;
    let decoder = Arc::new(ScriptedDecoder::new("product:WH-BT100", 3));
    let scan_loop = FrameScanLoop::new(Arc::clone(&decoder) as Arc<dyn DecodePrimitive>, INTERVAL);

    let (delivered, on_decoded) = recorder();
    let mut handle = scan_loop.start(stream, on_decoded);

    assert_eq!(handle.wait().await, LoopExit::Decoded);
    assert_eq!(decoder.calls(), 3);
    assert_eq!(handle.samples(), 3);

    tokio::time::sleep(INTERVAL * 20).await;
    assert_eq!(decoder.calls(), 3, "no sampling after the decode");

    let delivered = delivered.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].raw, "product:WH-BT100");
    assert_eq!(delivered[0].provenance, Provenance::Live);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_is_idempotent() {
    let (_session, stream) = open_stream(camera()).await;
    let decoder = Arc::new(ScriptedDecoder::never());
    let scan_loop = FrameScanLoop::new(Arc::clone(&decoder) as Arc<dyn DecodePrimitive>, INTERVAL);

    let (delivered, on_decoded) = recorder();
    let mut handle = scan_loop.start(stream, on_decoded);
    tokio::time::sleep(INTERVAL * 5).await;
    assert!(decoder.calls() > 0);

    handle.cancel();
    handle.cancel();
    assert_eq!(handle.wait().await, LoopExit::Cancelled);
    handle.cancel();

    let calls = decoder.calls();
    tokio::time::sleep(INTERVAL * 10).await;
    assert_eq!(decoder.calls(), calls);
    assert!(delivered.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_natural_termination() {
    let (_session, stream) = open_stream(camera()).await;
    let scan_loop = FrameScanLoop::new(Arc::new(ScriptedDecoder::new("order:PO-7781", 1)), INTERVAL);

    let (delivered, on_decoded) = recorder();
    let mut handle = scan_loop.start(stream, on_decoded);
    assert_eq!(handle.wait().await, LoopExit::Decoded);

    handle.cancel();
    handle.cancel();
    assert_eq!(handle.wait().await, LoopExit::Decoded);
    assert_eq!(delivered.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_before_first_sample() {
    let (_session, stream) = open_stream(camera()).await;
    let decoder = Arc::new(ScriptedDecoder::new("product:SW-PRO5", 1));
    let scan_loop = FrameScanLoop::new(Arc::clone(&decoder) as Arc<dyn DecodePrimitive>, INTERVAL);

    let (delivered, on_decoded) = recorder();
    let mut handle = scan_loop.start(stream, on_decoded);
    handle.cancel();

    assert_eq!(handle.wait().await, LoopExit::Cancelled);
    assert_eq!(decoder.calls(), 0);
    assert!(delivered.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_cancels() {
    let (_session, stream) = open_stream(camera()).await;
    let decoder = Arc::new(ScriptedDecoder::never());
    let scan_loop = FrameScanLoop::new(Arc::clone(&decoder) as Arc<dyn DecodePrimitive>, INTERVAL);

    let (_delivered, on_decoded) = recorder();
    let handle = scan_loop.start(stream, on_decoded);
    tokio::time::sleep(INTERVAL * 3).await;
    drop(handle);

    tokio::time::sleep(INTERVAL).await;
    let calls = decoder.calls();
    tokio::time::sleep(INTERVAL * 10).await;
    assert_eq!(decoder.calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_warmup_ticks_are_not_sampled() {
    let (_session, stream) = open_stream(camera().with_warmup(4)).await;
    let decoder = Arc::new(ScriptedDecoder::new("doc:INV-88231", 1));
    let scan_loop = FrameScanLoop::new(Arc::clone(&decoder) as Arc<dyn DecodePrimitive>, INTERVAL);

    let (_delivered, on_decoded) = recorder();
    let mut handle = scan_loop.start(stream, on_decoded);

    assert_eq!(handle.wait().await, LoopExit::Decoded);
    assert_eq!(handle.skipped(), 4);
    assert_eq!(handle.samples(), 1);
    assert_eq!(decoder.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stream_release_stops_loop() {
    let (mut session, stream) = open_stream(camera()).await;
    let scan_loop = FrameScanLoop::new(Arc::new(ScriptedDecoder::never()), INTERVAL);

    let (delivered, on_decoded) = recorder();
    let mut handle = scan_loop.start(stream.clone(), on_decoded);
    tokio::time::sleep(INTERVAL * 3).await;

    assert!(session.close().await);
    assert!(stream.is_closed());
    assert_eq!(handle.wait().await, LoopExit::StreamClosed);
    assert!(delivered.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_decodes_real_code_after_blank_frames() {
    let code = qr_frame("product:WH-BT100");
    let blank = blank_frame(code.size());
    let device = ReplayDevice::new("cam-0", "Back Camera").with_frames([blank.clone(), blank, code.clone()]);
    let (_session, stream) = open_stream(device).await;
    assert_eq!(stream.size(), code.size());

    let scan_loop = FrameScanLoop::new(Arc::new(QrDecoder::new()), INTERVAL);
    let (delivered, on_decoded) = recorder();
    let mut handle = scan_loop.start(stream, on_decoded);

    assert_eq!(handle.wait().await, LoopExit::Decoded);
    assert_eq!(handle.samples(), 3);

    let delivered = delivered.lock().unwrap();
    assert_eq!(delivered[0].raw, "product:WH-BT100");
    assert!(delivered[0].corners.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_panicking_callback_reports_panicked() {
    let (_session, stream) = open_stream(camera()).await;
    let scan_loop = FrameScanLoop::new(Arc::new(ScriptedDecoder::new("order:PO-7781", 1)), INTERVAL);

    let mut handle = scan_loop.start(stream, |_| panic!("presentation layer crashed"));
    assert_eq!(handle.wait().await, LoopExit::Panicked);
    assert_eq!(handle.wait().await, LoopExit::Panicked);
    handle.cancel();
}

/// Blocks each decode until the test opens the gate.
struct GatedDecoder {
    gate: Mutex<mpsc::Receiver<()>>,
    started: AtomicBool,
    released: AtomicBool,
}

impl DecodePrimitive for GatedDecoder {
    fn decode(&self, _rgba: &[u8], _width: u32, _height: u32) -> Option<DecodedCode> {
        self.started.store(true, Ordering::SeqCst);
        let opened = self.gate.lock().unwrap().recv_timeout(Duration::from_secs(2)).is_ok();
        self.released.store(opened, Ordering::SeqCst);
        Some(DecodedCode {
            data: "product:WH-BT100".to_string(),
            corners: [Point::default(); 4],
        })
    }
}

#[tokio::test]
async fn test_decode_does_not_block_the_runtime() {
    let (_session, stream) = open_stream(camera()).await;
    let (open_gate, gate) = mpsc::channel();
    let decoder = Arc::new(GatedDecoder {
        gate: Mutex::new(gate),
        started: AtomicBool::new(false),
        released: AtomicBool::new(false),
    });
    let scan_loop = FrameScanLoop::new(Arc::clone(&decoder) as Arc<dyn DecodePrimitive>, INTERVAL);

    let (delivered, on_decoded) = recorder();
    let mut handle = scan_loop.start(stream, on_decoded);

    // Only reachable while the decoder is parked if it runs off this thread.
    while !decoder.started.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    open_gate.send(()).unwrap();

    assert_eq!(handle.wait().await, LoopExit::Decoded);
    assert!(decoder.released.load(Ordering::SeqCst));
    assert_eq!(delivered.lock().unwrap().len(), 1);
}
