use std::{
   io::{
      self,
      Write as _,
   },
   mem,
   sync::{
      Arc,
      Mutex,
      PoisonError,
   },
};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
   Trace,
   runtime::Pool,
};

pub type Output = Arc<Mutex<dyn io::Write + Send>>;

fn stderr() -> Output {
   Arc::new(Mutex::new(io::stderr()))
}

/// Everything an evaluation carries along besides its scope.
#[derive(Clone, bon::Builder)]
pub struct Context {
   #[builder(default)]
   pub trace: Trace,

   #[builder(default)]
   pub cancel: CancellationToken,

   #[builder(default = Arc::new(Pool::default()))]
   pub pool: Arc<Pool>,

   #[builder(default = stderr())]
   pub stderr: Output,

   #[builder(skip)]
   workers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Default for Context {
   fn default() -> Self {
      Self::builder().build()
   }
}

impl Context {
   /// A context for a parallel worker. Shares everything but the trace.
   #[must_use]
   pub fn fork(&self) -> Self {
      Self {
         trace:   Trace::new(self.trace.capacity()),
         cancel:  self.cancel.clone(),
         pool:    self.pool.clone(),
         stderr:  self.stderr.clone(),
         workers: self.workers.clone(),
      }
   }

   /// Writes a line to the run's stderr. Failures to write are logged and
   /// otherwise ignored.
   pub fn log(&self, line: &str) {
      let mut stderr = self.stderr.lock().unwrap_or_else(PoisonError::into_inner);

      if let Err(error) = writeln!(stderr, "{line}") {
         tracing::warn!("Failed to write to stderr: {error}.");
      }
   }

   pub fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) {
      let handle = tokio::spawn(task);

      self
         .workers
         .lock()
         .unwrap_or_else(PoisonError::into_inner)
         .push(handle);
   }

   /// Waits for every worker started so far, including ones they start.
   pub async fn wait(&self) {
      loop {
         let handles = mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));

         if handles.is_empty() {
            return;
         }

         for handle in handles {
            if let Err(error) = handle.await {
               tracing::error!("Worker panicked: {error}.");
            }
         }
      }
   }
}
