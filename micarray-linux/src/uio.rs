//! Userspace I/O interrupt line.
//!
//! A UIO node reports interrupts as a 4-byte running event count on `read()`.
//! Writing `1u32` re-enables the interrupt for drivers that mask it in the
//! kernel handler. The node is opened non-blocking and polled from a dedicated
//! thread, which forwards each batch of events to the capture engine.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use micarray_core::{CaptureError, InterruptLine, IrqContext, IrqOutcome};

pub struct UioInterruptLine {
    file: Arc<File>,
    path: PathBuf,
    unmask: bool,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
    poller: Option<JoinHandle<()>>,
}

impl UioInterruptLine {
    pub fn open(path: impl AsRef<Path>, unmask: bool, poll_interval: Duration) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&path)?;
        log::debug!("opened interrupt node {}", path.display());
        Ok(Self {
            file: Arc::new(file),
            path,
            unmask,
            poll_interval,
            running: Arc::new(AtomicBool::new(false)),
            poller: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_requested(&self) -> bool {
        self.poller.is_some()
    }
}

impl InterruptLine for UioInterruptLine {
    fn request(&mut self, context: IrqContext) -> Result<(), CaptureError> {
        if self.poller.is_some() {
            return Err(CaptureError::InvalidState(format!(
                "{} already requested",
                self.path.display()
            )));
        }
        if self.unmask {
            unmask(&*self.file)
                .map_err(|e| CaptureError::AllocationFailure(format!("enable interrupt: {e}")))?;
        }

        self.running.store(true, Ordering::SeqCst);
        let poller = Poller::new(
            Node(Arc::clone(&self.file)),
            self.unmask,
            self.poll_interval,
            Arc::clone(&self.running),
            context,
        );
        let handle = thread::Builder::new()
            .name("micarray-irq".into())
            .spawn(move || poller.run())
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                CaptureError::AllocationFailure(format!("failed to spawn interrupt thread: {e}"))
            })?;

        self.poller = Some(handle);
        log::info!("capture interrupt requested on {}", self.path.display());
        Ok(())
    }

    fn release(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.poller.take() {
            if handle.join().is_err() {
                log::error!("interrupt thread panicked");
            }
            log::info!("capture interrupt released on {}", self.path.display());
        }
    }
}

impl Drop for UioInterruptLine {
    fn drop(&mut self) {
        self.release();
    }
}

fn unmask<W: Write>(mut node: W) -> io::Result<()> {
    node.write_all(&1u32.to_ne_bytes())
}

/// Longest sleep between retries after the node starts failing.
const MAX_BACKOFF: Duration = Duration::from_millis(100);

/// Shared UIO file handle as seen by the polling thread.
struct Node(Arc<File>);

impl Read for Node {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (&*self.0).read(buf)
    }
}

impl Write for Node {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self.0).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Poll {
    Event(u32),
    Idle,
    Failed,
}

struct Poller<N> {
    node: N,
    unmask: bool,
    poll_interval: Duration,
    running: Arc<AtomicBool>,
    context: IrqContext,
    last: Option<u32>,
    failures: u32,
}

impl<N: Read + Write> Poller<N> {
    fn new(
        node: N,
        unmask: bool,
        poll_interval: Duration,
        running: Arc<AtomicBool>,
        context: IrqContext,
    ) -> Self {
        Self {
            node,
            unmask,
            poll_interval,
            running,
            context,
            last: None,
            failures: 0,
        }
    }

    /// Poll until released. Node errors back off and retry; the line stays up.
    fn run(mut self) {
        while self.running.load(Ordering::SeqCst) {
            match self.poll_once() {
                Poll::Event(total) => log::trace!("interrupt {total} delivered"),
                Poll::Idle => thread::sleep(self.poll_interval),
                Poll::Failed => thread::sleep(self.backoff()),
            }
        }
        log::debug!("interrupt thread exiting");
    }

    fn backoff(&self) -> Duration {
        let shift = self.failures.min(16);
        self.poll_interval
            .saturating_mul(1u32 << shift)
            .min(MAX_BACKOFF)
    }

    fn poll_once(&mut self) -> Poll {
        let mut count = [0u8; 4];
        match self.node.read(&mut count) {
            Ok(4) => {
                let total = u32::from_ne_bytes(count);
                self.deliver(total);
                if self.unmask {
                    if let Err(e) = unmask(&mut self.node) {
                        return self.fail("re-enable interrupt", &e);
                    }
                }
                self.recover();
                Poll::Event(total)
            }
            Ok(0) => Poll::Idle,
            Ok(n) => {
                log::warn!("short read of {n} bytes from interrupt node");
                Poll::Idle
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Poll::Idle,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Poll::Idle,
            Err(e) => self.fail("interrupt node read", &e),
        }
    }

    fn deliver(&mut self, total: u32) {
        if let Some(previous) = self.last {
            let missed = total.wrapping_sub(previous).saturating_sub(1);
            if missed > 0 {
                log::debug!("{missed} interrupt(s) coalesced");
            }
        }
        self.last = Some(total);

        if self.context.handle() == IrqOutcome::Unclaimed {
            log::debug!("interrupt {total} unclaimed");
        }
    }

    fn fail(&mut self, what: &str, err: &io::Error) -> Poll {
        self.failures = self.failures.saturating_add(1);
        if self.failures == 1 {
            log::error!("{what} failed: {err}; retrying");
        } else {
            log::debug!("{what} failed ({} in a row): {err}", self.failures);
        }
        Poll::Failed
    }

    fn recover(&mut self) {
        if self.failures > 0 {
            log::info!("interrupt node recovered after {} failure(s)", self.failures);
            self.failures = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Instant;

    use super::*;
    use micarray_core::{CaptureEngine, RingBuffer, Transport};

    struct Zeros;

    impl Transport for Zeros {
        fn read(&self, _offset: u16, buf: &mut [u8]) -> io::Result<()> {
            buf.fill(0);
            Ok(())
        }

        fn write(&self, _offset: u16, _data: &[u8]) -> io::Result<()> {
            Ok(())
        }
    }

    fn running_engine() -> (CaptureEngine<Zeros>, IrqContext) {
        let mut engine = CaptureEngine::new(Arc::new(Zeros), None);
        let context = engine.arm().unwrap();
        engine.install_buffer(RingBuffer::try_new(1, 2).unwrap()).unwrap();
        engine.start().unwrap();
        (engine, context)
    }

    #[test]
    fn event_count_drives_the_engine() {
        let node = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(node.path(), 1u32.to_ne_bytes()).unwrap();

        let (engine, context) = running_engine();
        let mut line = UioInterruptLine::open(node.path(), false, Duration::from_millis(1)).unwrap();
        line.request(context).unwrap();
        assert!(line.is_requested());

        let deadline = Instant::now() + Duration::from_secs(5);
        while engine.diagnostics().periods_elapsed == 0 {
            assert!(Instant::now() < deadline, "interrupt never delivered");
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(engine.diagnostics().interrupts, 1);

        line.release();
        assert!(!line.is_requested());
    }

    #[test]
    fn request_enables_the_interrupt() {
        let node = tempfile::NamedTempFile::new().unwrap();
        let (_engine, context) = running_engine();

        let mut line = UioInterruptLine::open(node.path(), true, Duration::from_millis(1)).unwrap();
        line.request(context).unwrap();
        line.release();

        let written = std::fs::read(node.path()).unwrap();
        assert_eq!(written[..4], 1u32.to_ne_bytes());
    }

    #[test]
    fn second_request_is_refused() {
        let node = tempfile::NamedTempFile::new().unwrap();
        let (_engine, context) = running_engine();

        let mut line = UioInterruptLine::open(node.path(), false, Duration::from_millis(1)).unwrap();
        line.request(context.clone()).unwrap();
        assert!(matches!(line.request(context), Err(CaptureError::InvalidState(_))));
    }

    /// Replays a fixed sequence of reads, then reports nothing pending.
    struct ScriptedNode {
        reads: VecDeque<io::Result<u32>>,
        failing_writes: usize,
        writes: usize,
    }

    impl ScriptedNode {
        fn new(reads: Vec<io::Result<u32>>) -> Self {
            Self {
                reads: reads.into(),
                failing_writes: 0,
                writes: 0,
            }
        }
    }

    impl Read for ScriptedNode {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                Some(Ok(count)) => {
                    buf[..4].copy_from_slice(&count.to_ne_bytes());
                    Ok(4)
                }
                Some(Err(e)) => Err(e),
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }
    }

    impl Write for ScriptedNode {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.failing_writes > 0 {
                self.failing_writes -= 1;
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "irq chip gone"));
            }
            self.writes += 1;
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn poller(node: ScriptedNode, unmask: bool, context: IrqContext) -> Poller<ScriptedNode> {
        Poller::new(
            node,
            unmask,
            Duration::from_millis(1),
            Arc::new(AtomicBool::new(true)),
            context,
        )
    }

    #[test]
    fn read_errors_back_off_and_recover() {
        let (engine, context) = running_engine();
        let node = ScriptedNode::new(vec![
            Err(io::Error::other("uio read: EIO")),
            Err(io::Error::other("uio read: EIO")),
            Ok(1),
        ]);
        let mut poller = poller(node, false, context);

        assert_eq!(poller.poll_once(), Poll::Failed);
        assert_eq!(poller.poll_once(), Poll::Failed);
        assert_eq!(poller.backoff(), Duration::from_millis(4));

        assert_eq!(poller.poll_once(), Poll::Event(1));
        assert_eq!(poller.failures, 0);
        assert_eq!(poller.poll_once(), Poll::Idle);
        assert_eq!(engine.diagnostics().interrupts, 1);
    }

    #[test]
    fn backoff_is_capped() {
        let (_engine, context) = running_engine();
        let mut poller = poller(ScriptedNode::new(Vec::new()), false, context);
        poller.failures = 40;
        assert_eq!(poller.backoff(), MAX_BACKOFF);
    }

    #[test]
    fn failed_unmask_keeps_the_line_up() {
        let (engine, context) = running_engine();
        let mut node = ScriptedNode::new(vec![Ok(1), Ok(2)]);
        node.failing_writes = 1;
        let mut poller = poller(node, true, context);

        // The interrupt is still delivered; only the re-enable failed.
        assert_eq!(poller.poll_once(), Poll::Failed);
        assert_eq!(poller.poll_once(), Poll::Event(2));
        assert_eq!(poller.node.writes, 1);
        assert_eq!(engine.diagnostics().interrupts, 2);
    }

    #[test]
    fn polling_thread_survives_node_errors() {
        let (engine, context) = running_engine();
        let node = ScriptedNode::new(vec![
            Err(io::Error::other("uio read: EIO")),
            Err(io::Error::other("uio read: EIO")),
            Err(io::Error::other("uio read: EIO")),
            Ok(7),
        ]);
        let running = Arc::new(AtomicBool::new(true));
        let poller = Poller::new(node, false, Duration::from_millis(1), Arc::clone(&running), context);
        let handle = thread::spawn(move || poller.run());

        let deadline = Instant::now() + Duration::from_secs(5);
        while engine.diagnostics().periods_elapsed == 0 {
            assert!(Instant::now() < deadline, "interrupt never delivered");
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(engine.diagnostics().transport_errors, 0);

        running.store(false, Ordering::SeqCst);
        handle.join().unwrap();
    }
}
