//! Browser Session Manager.
//!
//! The rendering engine lives on a dedicated worker thread (engines such as
//! `headless_chrome` are synchronous and not necessarily `Send`). Async
//! callers hand the worker closures to run against a freshly opened page;
//! the page is closed when the closure returns, fails, or panics.

use crate::{Backend, Error, HarvestConfig, PageHandle, Result};
use log::{debug, warn};
use std::sync::mpsc::{self, Sender};
use std::thread;
use tokio::sync::oneshot;

type PageJob = Box<dyn FnOnce(Result<&mut dyn PageHandle>) + Send>;

enum Command {
    WithPage(PageJob),
    Close(oneshot::Sender<Result<()>>),
}

/// Handle to a running rendering engine.
///
/// Dropping the handle without calling [`Session::close`] still shuts the
/// engine down: the worker closes the backend once its command channel
/// disconnects.
pub struct Session {
    cmd_tx: Sender<Command>,
}

impl Session {
    /// Launch backend `B` on a worker thread.
    ///
    /// Fails with [`Error::LaunchError`] when the engine cannot start.
    pub async fn open<B>(config: HarvestConfig) -> Result<Self>
    where
        B: Backend + 'static,
        B::Page: 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (init_tx, init_rx) = oneshot::channel::<Result<()>>();

        thread::spawn(move || {
            let mut backend = match B::launch(&config) {
                Ok(b) => b,
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };
            let _ = init_tx.send(Ok(()));

            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::WithPage(job) => run_scoped(&mut backend, job),
                    Command::Close(resp) => {
                        let _ = resp.send(backend.close());
                        return;
                    }
                }
            }

            debug!("Session handle dropped without close; shutting engine down");
            if let Err(e) = backend.close() {
                warn!("Failed to close browser: {}", e);
            }
        });

        init_rx
            .await
            .map_err(|_| Error::LaunchError("browser worker exited during startup".into()))??;

        Ok(Self { cmd_tx })
    }

    /// Run `f` against a new page; the page is closed afterwards regardless
    /// of the outcome.
    pub async fn with_page<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn PageHandle) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<Result<T>>();
        let job: PageJob = Box::new(move |page| {
            let res = match page {
                Ok(page) => f(page),
                Err(err) => Err(err),
            };
            let _ = tx.send(res);
        });

        self.cmd_tx
            .send(Command::WithPage(job))
            .map_err(|_| Error::Other("browser session is no longer running".into()))?;

        rx.await
            .map_err(|e| Error::Other(format!("Page job canceled: {}", e)))?
    }

    /// Shut the engine down and wait for it to exit.
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Close(tx))
            .map_err(|_| Error::Other("browser session already exited".into()))?;
        rx.await
            .map_err(|e| Error::Other(format!("Close canceled: {}", e)))?
    }
}

// Closes the page on every exit path, unwinding included.
struct PageGuard<P: PageHandle> {
    page: P,
}

impl<P: PageHandle> Drop for PageGuard<P> {
    fn drop(&mut self) {
        if let Err(e) = self.page.close() {
            warn!("Failed to close page: {}", e);
        }
    }
}

fn run_scoped<B>(backend: &mut B, job: PageJob)
where
    B: Backend,
    B::Page: 'static,
{
    match backend.new_page() {
        Ok(page) => {
            let mut guard = PageGuard { page };
            let page: &mut dyn PageHandle = &mut guard.page;
            job(Ok(page));
        }
        Err(err) => job(Err(err)),
    }
}
