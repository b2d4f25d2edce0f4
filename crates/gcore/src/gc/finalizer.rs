//! Finalizer Worker - runs finalizers outside the stop-the-world window
//!
//! Sweep hands every garbage object that needs cleanup (a type finalizer,
//! or an associated native resource) to the worker as one batch per epoch.
//! The worker runs each finalizer once, frees the object and reports the
//! epoch as finalized.
//!
//! A panicking finalizer only fails its own object; the rest of the batch
//! still runs and the epoch is still reported.

use super::Epoch;
use crate::alloc::HeapObject;
use crate::error::{GcError, Result};
use crate::object::extra::FLAG_FINALIZED;
use crate::object::ExtraObjectData;
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

/// Garbage object awaiting finalization, with its extra data if any
pub struct FinalizerTask {
    object: HeapObject,
    extra: Option<Box<ExtraObjectData>>,
}

/// Finalization batch of one epoch
#[derive(Default)]
pub struct FinalizerQueue {
    tasks: Vec<FinalizerTask>,
}

impl FinalizerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, object: HeapObject, extra: Option<Box<ExtraObjectData>>) {
        self.tasks.push(FinalizerTask { object, extra });
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Outcome of one batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FinalizerReport {
    pub finalized: usize,
    pub failed: usize,
}

/// Receives finalization progress
pub trait FinalizerListener: Send + Sync + 'static {
    fn on_finalizer_failed(&self, epoch: Epoch, type_name: &'static str);

    /// Every task of the epoch's batch has been processed
    fn on_batch_finished(&self, epoch: Epoch, report: FinalizerReport);
}

type Batch = (Epoch, FinalizerQueue);

struct Worker {
    sender: Sender<Batch>,
    handle: JoinHandle<()>,
}

/// FinalizerProcessor - owner of the finalizer worker thread
///
/// States: Stopped -> Running -> Stopped. Start and stop are idempotent.
pub struct FinalizerProcessor {
    thread_name: String,
    listener: Arc<dyn FinalizerListener>,
    worker: Mutex<Option<Worker>>,
}

impl FinalizerProcessor {
    pub fn new(thread_name: String, listener: Arc<dyn FinalizerListener>) -> Self {
        Self {
            thread_name,
            listener,
            worker: Mutex::new(None),
        }
    }

    /// Start the worker unless it is running
    pub fn start_if_needed(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_none() {
            *worker = Some(self.spawn()?);
        }
        Ok(())
    }

    fn spawn(&self) -> Result<Worker> {
        let (sender, receiver) = channel::unbounded::<Batch>();
        let listener = self.listener.clone();
        let handle = thread::Builder::new()
            .name(self.thread_name.clone())
            .spawn(move || {
                for (epoch, queue) in receiver.iter() {
                    run_batch(epoch, queue, &*listener);
                }
            })
            .map_err(|err| GcError::ThreadSpawn(err.to_string()))?;
        log::debug!(target: "gc", "finalizer worker '{}' started", self.thread_name);
        Ok(Worker { sender, handle })
    }

    /// Stop the worker if it is running
    ///
    /// Blocks until every batch already handed over has been processed.
    pub fn stop_if_running(&self) {
        let Some(Worker { sender, handle }) = self.worker.lock().take() else {
            return;
        };
        drop(sender);
        if handle.join().is_err() {
            log::error!(target: "gc", "finalizer worker '{}' panicked", self.thread_name);
        }
        log::debug!(target: "gc", "finalizer worker '{}' stopped", self.thread_name);
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Identity of the running worker thread
    pub fn worker_thread(&self) -> Option<ThreadId> {
        self.worker
            .lock()
            .as_ref()
            .map(|worker| worker.handle.thread().id())
    }

    /// Batches handed over but not yet picked up
    pub fn pending_batches(&self) -> usize {
        self.worker
            .lock()
            .as_ref()
            .map_or(0, |worker| worker.sender.len())
    }

    /// Hand an epoch's batch to the worker, starting it if needed
    ///
    /// Empty batches are sent too, so every epoch gets reported. When no
    /// worker can be started the batch runs on the calling thread.
    pub fn schedule_tasks(&self, epoch: Epoch, queue: FinalizerQueue) {
        let mut worker = self.worker.lock();
        if worker.is_none() {
            match self.spawn() {
                Ok(spawned) => *worker = Some(spawned),
                Err(err) => {
                    log::warn!(target: "gc", "running epoch {} finalizers inline: {}", epoch, err);
                    drop(worker);
                    run_batch(epoch, queue, &*self.listener);
                    return;
                },
            }
        }

        let Some(running) = worker.as_ref() else {
            return;
        };
        if let Err(channel::SendError((epoch, queue))) = running.sender.send((epoch, queue)) {
            drop(worker);
            run_batch(epoch, queue, &*self.listener);
        }
    }
}

impl Drop for FinalizerProcessor {
    fn drop(&mut self) {
        self.stop_if_running();
    }
}

/// Finalize every task of a batch, then report the epoch
pub(crate) fn run_batch(
    epoch: Epoch,
    queue: FinalizerQueue,
    listener: &dyn FinalizerListener,
) -> FinalizerReport {
    let mut report = FinalizerReport::default();
    for task in queue.tasks {
        if finalize(epoch, task, listener) {
            report.finalized += 1;
        } else {
            report.failed += 1;
        }
    }
    listener.on_batch_finished(epoch, report);
    report
}

fn finalize(epoch: Epoch, task: FinalizerTask, listener: &dyn FinalizerListener) -> bool {
    let obj = task.object.obj_ref();
    let type_info = obj.type_info();
    let mut succeeded = true;

    if let Some(finalizer) = type_info.finalizer() {
        succeeded &= panic::catch_unwind(AssertUnwindSafe(|| finalizer(obj))).is_ok();
    }

    if let Some(extra) = task.extra {
        let released = extra.release_associated_object();
        succeeded &= panic::catch_unwind(AssertUnwindSafe(move || drop(released))).is_ok();
        extra.uninstall();
        extra.set_flag(FLAG_FINALIZED);
    }

    if !succeeded {
        log::error!(
            target: "gc",
            "Epoch #{}: finalizer for {} at {:#x} failed",
            epoch,
            type_info.name(),
            obj.address()
        );
        listener.on_finalizer_failed(epoch, type_info.name());
    }
    succeeded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::Allocator;
    use crate::config::AllocatorFlavor;
    use crate::gc::NoopCollector;
    use crate::object::{ObjRef, TypeInfo};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        failures: AtomicUsize,
        batches: Mutex<Vec<(Epoch, FinalizerReport)>>,
    }

    impl FinalizerListener for Recorder {
        fn on_finalizer_failed(&self, _epoch: Epoch, _type_name: &'static str) {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }

        fn on_batch_finished(&self, epoch: Epoch, report: FinalizerReport) {
            self.batches.lock().push((epoch, report));
        }
    }

    static RAN: AtomicUsize = AtomicUsize::new(0);

    fn count(_: ObjRef) {
        RAN.fetch_add(1, Ordering::Relaxed);
    }

    fn explode(_: ObjRef) {
        panic!("finalizer exploded");
    }

    static COUNTED: TypeInfo = TypeInfo::object("Counted", 8, &[]).with_finalizer(count);
    static EXPLODING: TypeInfo = TypeInfo::object("Exploding", 8, &[]).with_finalizer(explode);

    #[test]
    fn test_failed_finalizer_does_not_stop_batch() {
        let allocator = Allocator::for_collector::<NoopCollector>(AllocatorFlavor::ThreadQueues);
        let recorder = Recorder::default();

        let mut queue = FinalizerQueue::new();
        queue.push(allocator.allocate_object(&COUNTED), None);
        queue.push(allocator.allocate_object(&EXPLODING), None);
        queue.push(allocator.allocate_object(&COUNTED), None);

        let before = RAN.load(Ordering::Relaxed);
        let report = run_batch(7, queue, &recorder);

        assert_eq!(report, FinalizerReport { finalized: 2, failed: 1 });
        assert_eq!(RAN.load(Ordering::Relaxed) - before, 2);
        assert_eq!(recorder.failures.load(Ordering::Relaxed), 1);
        assert_eq!(recorder.batches.lock().as_slice(), &[(7, report)]);
    }

    #[test]
    fn test_worker_lifecycle() {
        let recorder = Arc::new(Recorder::default());
        let processor = FinalizerProcessor::new("test-finalizer".to_string(), recorder.clone());

        assert!(!processor.is_running());
        processor.start_if_needed().unwrap();
        processor.start_if_needed().unwrap();
        assert!(processor.is_running());

        processor.schedule_tasks(1, FinalizerQueue::new());
        processor.schedule_tasks(2, FinalizerQueue::new());
        processor.stop_if_running();
        processor.stop_if_running();

        assert!(!processor.is_running());
        let epochs: Vec<Epoch> = recorder.batches.lock().iter().map(|(e, _)| *e).collect();
        assert_eq!(epochs, vec![1, 2]);
    }

    #[test]
    fn test_schedule_starts_worker_on_demand() {
        let recorder = Arc::new(Recorder::default());
        let processor = FinalizerProcessor::new("on-demand".to_string(), recorder.clone());

        processor.schedule_tasks(3, FinalizerQueue::new());
        assert!(processor.is_running());
        drop(processor);

        assert_eq!(recorder.batches.lock().len(), 1);
    }

    #[derive(Default)]
    struct ThreadRecorder {
        reported_on: Mutex<Option<ThreadId>>,
    }

    impl FinalizerListener for ThreadRecorder {
        fn on_finalizer_failed(&self, _epoch: Epoch, _type_name: &'static str) {}

        fn on_batch_finished(&self, _epoch: Epoch, _report: FinalizerReport) {
            *self.reported_on.lock() = Some(thread::current().id());
        }
    }

    #[test]
    fn test_batches_reported_on_worker_thread() {
        let recorder = Arc::new(ThreadRecorder::default());
        let processor = FinalizerProcessor::new("reporting".to_string(), recorder.clone());
        assert_eq!(processor.worker_thread(), None);

        processor.start_if_needed().unwrap();
        let worker = processor.worker_thread().expect("worker running");
        assert_ne!(worker, thread::current().id());

        processor.schedule_tasks(1, FinalizerQueue::new());
        processor.stop_if_running();

        assert_eq!(*recorder.reported_on.lock(), Some(worker));
        assert_eq!(processor.worker_thread(), None);
    }
}
