#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use micarray_core::hardware::{PERIOD_FRAMES, SAMPLE_BYTES};
use micarray_core::{
    CaptureDelegate, CaptureDevice, CaptureError, CaptureSession, EngineState, InterruptLine,
    IrqContext, IrqOutcome, Transport,
};

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// What the fake array puts in each fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// Sample (channel, frame) = `channel * 1000 + frame`.
    ChannelRamp,
    /// Every sample of the n-th read (1-based) = `n`.
    Sequence,
}

#[derive(Default)]
struct ArrayState {
    writes: Mutex<Vec<(u16, Vec<u8>)>>,
    reads: AtomicU64,
    active_reads: AtomicUsize,
    max_active_reads: AtomicUsize,
    failing_reads: AtomicUsize,
    fail_writes: AtomicBool,
    sequence: AtomicBool,
    gate: Mutex<Option<Receiver<()>>>,
}

/// Register-level stand-in for the microphone array.
#[derive(Clone, Default)]
pub struct FakeArray {
    state: Arc<ArrayState>,
}

impl FakeArray {
    pub fn with_pattern(pattern: Pattern) -> Self {
        let array = Self::default();
        array
            .state
            .sequence
            .store(pattern == Pattern::Sequence, Ordering::SeqCst);
        array
    }

    pub fn writes(&self) -> Vec<(u16, Vec<u8>)> {
        self.state.writes.lock().clone()
    }

    pub fn clear_writes(&self) {
        self.state.writes.lock().clear();
    }

    pub fn reads(&self) -> u64 {
        self.state.reads.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_reads(&self) -> usize {
        self.state.max_active_reads.load(Ordering::SeqCst)
    }

    pub fn fail_next_reads(&self, count: usize) {
        self.state.failing_reads.store(count, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Block every read until a token is sent. Dropping the sender opens the gate.
    pub fn hold_reads(&self) -> Sender<()> {
        let (tx, rx) = unbounded();
        *self.state.gate.lock() = Some(rx);
        tx
    }

    fn fill(&self, read_number: u64, buf: &mut [u8]) {
        let sequence = self.state.sequence.load(Ordering::SeqCst);
        for (i, sample) in buf.chunks_exact_mut(SAMPLE_BYTES).enumerate() {
            let value = if sequence {
                read_number as i16
            } else {
                let channel = i / PERIOD_FRAMES;
                let frame = i % PERIOD_FRAMES;
                (channel * 1000 + frame) as i16
            };
            sample.copy_from_slice(&value.to_le_bytes());
        }
    }
}

impl Transport for FakeArray {
    fn read(&self, _offset: u16, buf: &mut [u8]) -> io::Result<()> {
        let active = self.state.active_reads.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_active_reads.fetch_max(active, Ordering::SeqCst);

        let gate = self.state.gate.lock().clone();
        if let Some(gate) = gate {
            let _ = gate.recv();
        }

        let number = self.state.reads.fetch_add(1, Ordering::SeqCst) + 1;
        let failing = self
            .state
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let result = if failing {
            Err(io::Error::new(io::ErrorKind::TimedOut, "spi transfer timed out"))
        } else {
            self.fill(number, buf);
            Ok(())
        };

        self.state.active_reads.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn write(&self, offset: u16, data: &[u8]) -> io::Result<()> {
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "spi bus down"));
        }
        self.state.writes.lock().push((offset, data.to_vec()));
        Ok(())
    }
}

/// Interrupt line fired by hand from the test.
#[derive(Clone, Default)]
pub struct ManualLine {
    context: Arc<Mutex<Option<IrqContext>>>,
    refuse: Arc<AtomicBool>,
}

impl ManualLine {
    pub fn fire(&self) -> IrqOutcome {
        match self.context.lock().as_ref() {
            Some(ctx) => ctx.handle(),
            None => IrqOutcome::Unclaimed,
        }
    }

    pub fn is_requested(&self) -> bool {
        self.context.lock().is_some()
    }

    pub fn refuse_requests(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }
}

impl InterruptLine for ManualLine {
    fn request(&mut self, context: IrqContext) -> Result<(), CaptureError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(CaptureError::AllocationFailure("irq 42 busy".into()));
        }
        *self.context.lock() = Some(context);
        Ok(())
    }

    fn release(&mut self) {
        self.context.lock().take();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Period(usize),
    Error(CaptureError),
    State(EngineState),
}

pub struct RecordingDelegate {
    tx: Sender<Event>,
}

impl CaptureDelegate for RecordingDelegate {
    fn on_period_elapsed(&self, position: usize) {
        let _ = self.tx.send(Event::Period(position));
    }

    fn on_error(&self, error: &CaptureError) {
        let _ = self.tx.send(Event::Error(error.clone()));
    }

    fn on_state_changed(&self, state: EngineState) {
        let _ = self.tx.send(Event::State(state));
    }
}

/// Next drain event, skipping state changes.
pub fn next_drain_event(events: &Receiver<Event>) -> Event {
    loop {
        match events.recv_timeout(TIMEOUT).expect("timed out waiting for drain event") {
            Event::State(_) => continue,
            other => return other,
        }
    }
}

pub fn wait_period(events: &Receiver<Event>) -> usize {
    match next_drain_event(events) {
        Event::Period(position) => position,
        other => panic!("expected a period, got {other:?}"),
    }
}

pub struct Rig {
    pub device: CaptureDevice<FakeArray, ManualLine>,
    pub array: FakeArray,
    pub line: ManualLine,
    pub events: Receiver<Event>,
}

pub fn rig(pattern: Pattern) -> Rig {
    let array = FakeArray::with_pattern(pattern);
    let line = ManualLine::default();
    let (tx, events) = unbounded();
    let mut device = CaptureDevice::new(array.clone(), line.clone());
    device.set_delegate(Arc::new(RecordingDelegate { tx }));
    Rig {
        device,
        array,
        line,
        events,
    }
}

/// Open, configure at 48 kHz and allocate a buffer of `periods` periods.
pub fn running_session(
    rig: &Rig,
    channels: u16,
    periods: usize,
) -> CaptureSession<FakeArray, ManualLine> {
    let mut session = rig.device.open().expect("open");
    session.configure(48000, channels).expect("configure");
    session
        .allocate_buffer(PERIOD_FRAMES * SAMPLE_BYTES * channels as usize, periods)
        .expect("allocate");
    session.start().expect("start");
    session
}

pub fn sample_at(bytes: &[u8], index: usize) -> i16 {
    i16::from_le_bytes([bytes[index * SAMPLE_BYTES], bytes[index * SAMPLE_BYTES + 1]])
}
