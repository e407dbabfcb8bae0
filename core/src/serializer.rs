//! The per-connection / per-registry serialized execution context.
//!
//! A [`Serializer`] is the handle half of a small actor: a task spawned once,
//! reading `Job`s off an unbounded channel and running them strictly one at a
//! time, in submission order, regardless of which worker thread the reactor
//! happens to schedule the task onto. `ChatSession` and `ChatHub` are each
//! backed by exactly one of these; it is the mechanism that makes "every
//! connection's mutable state is touched only by its own serializer" true
//! without a lock around that state.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type Job = Box<dyn FnOnce() -> BoxFuture + Send>;

/// Opaque identity of one actor, used only to detect reentrancy in [`Serializer::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ActorId(u64);

fn next_actor_id() -> ActorId {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    ActorId(NEXT.fetch_add(1, Ordering::Relaxed))
}

tokio::task_local! {
    static CURRENT_ACTOR: ActorId;
}

/// Handle used to submit work onto one actor's serialized execution context.
///
/// Cloning a `Serializer` is cheap (it's a channel sender) and every clone
/// still feeds the same single-threaded-in-effect queue.
#[derive(Clone)]
pub struct Serializer {
    tx: mpsc::UnboundedSender<Job>,
    id: ActorId,
}

impl Serializer {
    /// Spawns the actor task and returns a handle to it plus its `JoinHandle`,
    /// which callers await during shutdown to know the actor has drained.
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let id = next_actor_id();

        let join = tokio::spawn(CURRENT_ACTOR.scope(id, async move {
            while let Some(job) = rx.recv().await {
                job().await;
            }
        }));

        (Serializer { tx, id }, join)
    }

    /// Always defers: the job is pushed onto the queue and runs after every
    /// job already queued, on whatever thread is next free to drive the actor.
    pub fn post<F, Fut>(&self, job: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed: Job = Box::new(move || Box::pin(job()));
        // The receiver only disappears once the actor has been told to stop and
        // has drained its queue; a send failure past that point is expected and
        // silently dropped, matching "pending serialized tasks... observe
        // stopped and exit" — there is nothing left to observe it.
        let _ = self.tx.send(boxed);
    }

    /// Runs the job inline if the caller is already executing inside this
    /// serializer's own task; otherwise behaves exactly like [`post`].
    pub async fn dispatch<F, Fut>(&self, job: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let already_here = CURRENT_ACTOR.try_with(|id| *id == self.id).unwrap_or(false);
        if already_here {
            job().await;
        } else {
            self.post(job);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::sync::Mutex as AsyncMutex;

    #[tokio::test]
    async fn post_preserves_submission_order() {
        let (ser, _join) = Serializer::spawn();
        let log = Arc::new(AsyncMutex::new(Vec::new()));

        for i in 0..50 {
            let log = log.clone();
            ser.post(move || async move {
                log.lock().await.push(i);
            });
        }

        // Give the actor a chance to drain; a oneshot barrier job is a more
        // deterministic way to know "everything before me has run".
        let (tx, rx) = tokio::sync::oneshot::channel();
        ser.post(move || async move {
            let _ = tx.send(());
        });
        rx.await.unwrap();

        let seen = log.lock().await.clone();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn dispatch_runs_inline_when_already_on_actor() {
        let (ser, _join) = Serializer::spawn();
        let flag = Arc::new(AsyncMutex::new(false));

        let ser2 = ser.clone();
        let flag2 = flag.clone();
        let (tx, rx) = tokio::sync::oneshot::channel();
        ser.post(move || async move {
            // We are now running inside the actor's own task: dispatch should
            // run inline rather than re-enqueue behind this very job.
            ser2.dispatch(move || async move {
                *flag2.lock().await = true;
            })
            .await;
            let _ = tx.send(());
        });
        rx.await.unwrap();

        assert!(*flag.lock().await);
    }
}
