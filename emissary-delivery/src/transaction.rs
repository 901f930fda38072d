//! Explicit units of work with two-phase commit.
//!
//! There is no ambient transaction: callers create a [`Transaction`], hand it
//! to [`MailDelivery::send`](crate::MailDelivery::send), and then commit or
//! abort it themselves. Participants implement [`DataManager`].

use std::{
    fmt,
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
};

use async_trait::async_trait;
use emissary_common::internal;
use futures_util::{FutureExt, future::BoxFuture};
use tracing::{error, warn};

use crate::error::{DeliveryError, TransactionError};

type Result<T> = std::result::Result<T, DeliveryError>;

static NEXT_SORT_KEY: AtomicU64 = AtomicU64::new(0);

/// A participant in a [`Transaction`]'s two-phase commit.
///
/// On commit the transaction calls, across all participants in `sort_key`
/// order, `tpc_begin`, then `commit`, then `tpc_vote`, then `tpc_finish`.
/// A failure before `tpc_finish` makes it call `tpc_abort` on every
/// participant instead. A transaction abandoned before commit calls `abort`.
#[async_trait]
pub trait DataManager: Send {
    /// Orders participants within one commit
    fn sort_key(&self) -> u64;

    /// # Errors
    /// If the participant cannot take part in this commit
    fn tpc_begin(&mut self, subtransaction: bool) -> Result<()>;

    /// # Errors
    /// If the participant's changes cannot be prepared
    fn commit(&mut self) -> Result<()>;

    /// # Errors
    /// If the participant votes against committing
    fn tpc_vote(&mut self) -> Result<()>;

    /// Make the participant's effect permanent.
    ///
    /// # Errors
    /// Any error from the effect itself
    async fn tpc_finish(&mut self) -> Result<()>;

    /// # Errors
    /// If undoing the participant's prepared work fails
    fn tpc_abort(&mut self) -> Result<()>;

    /// # Errors
    /// If undoing the participant's staged work fails
    fn abort(&mut self) -> Result<()>;
}

type CommitAction = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;
type AbortAction = Box<dyn FnOnce() -> Result<()> + Send>;

/// Defers a side effect until its transaction commits.
///
/// The commit action runs exactly once, in `tpc_finish`; the optional abort
/// action runs exactly once if the transaction rolls back instead. Errors from
/// either are returned unchanged.
pub struct MailDataManager {
    sort_key: u64,
    on_commit: Option<CommitAction>,
    on_abort: Option<AbortAction>,
}

impl MailDataManager {
    pub fn new<F, Fut>(on_commit: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            sort_key: NEXT_SORT_KEY.fetch_add(1, Ordering::Relaxed),
            on_commit: Some(Box::new(move || on_commit().boxed())),
            on_abort: None,
        }
    }

    #[must_use]
    pub fn with_abort(mut self, on_abort: impl FnOnce() -> Result<()> + Send + 'static) -> Self {
        self.on_abort = Some(Box::new(on_abort));
        self
    }

    /// `true` once either action has run
    pub const fn is_finished(&self) -> bool {
        self.on_commit.is_none()
    }

    fn run_abort(&mut self) -> Result<()> {
        self.on_commit = None;
        self.on_abort.take().map_or(Ok(()), |on_abort| on_abort())
    }
}

impl fmt::Debug for MailDataManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailDataManager")
            .field("sort_key", &self.sort_key)
            .field("pending", &self.on_commit.is_some())
            .field("abortable", &self.on_abort.is_some())
            .finish()
    }
}

#[async_trait]
impl DataManager for MailDataManager {
    fn sort_key(&self) -> u64 {
        self.sort_key
    }

    fn tpc_begin(&mut self, subtransaction: bool) -> Result<()> {
        if subtransaction {
            return Err(TransactionError::SubtransactionsUnsupported.into());
        }

        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn tpc_vote(&mut self) -> Result<()> {
        Ok(())
    }

    async fn tpc_finish(&mut self) -> Result<()> {
        self.on_abort = None;

        match self.on_commit.take() {
            Some(on_commit) => on_commit().await,
            None => Ok(()),
        }
    }

    fn tpc_abort(&mut self) -> Result<()> {
        self.run_abort()
    }

    fn abort(&mut self) -> Result<()> {
        self.run_abort()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Active,
    Committed,
    Aborted,
}

/// A pending unit of work.
///
/// Dropping an active transaction aborts it.
pub struct Transaction {
    resources: Vec<Box<dyn DataManager>>,
    status: Status,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("resources", &self.resources.len())
            .field("status", &self.status)
            .finish()
    }
}

impl Transaction {
    pub const fn new() -> Self {
        Self {
            resources: Vec::new(),
            status: Status::Active,
        }
    }

    /// Enlist a participant
    pub fn join(&mut self, resource: impl DataManager + 'static) {
        self.resources.push(Box::new(resource));
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub const fn status(&self) -> Status {
        self.status
    }

    /// Run the two-phase commit over every participant.
    ///
    /// # Errors
    /// - The first failure of the begin/commit/vote phase, after every
    ///   participant was aborted
    /// - The first failure of the finish phase, after every remaining
    ///   participant was still finished
    pub async fn commit(mut self) -> Result<()> {
        let mut resources = std::mem::take(&mut self.resources);
        resources.sort_by_key(|resource| resource.sort_key());

        if let Err(e) = prepare(&mut resources) {
            self.status = Status::Aborted;
            for resource in &mut resources {
                if let Err(abort_error) = resource.tpc_abort() {
                    warn!(error = %abort_error, "Participant failed to abort");
                }
            }
            return Err(e);
        }

        self.status = Status::Committed;

        let mut first_error = None;
        for resource in &mut resources {
            if let Err(e) = resource.tpc_finish().await {
                if first_error.is_none() {
                    first_error = Some(e);
                } else {
                    error!(error = %e, "Participant failed to finish");
                }
            }
        }

        internal!(
            level = DEBUG,
            "Committed transaction with {} participants",
            resources.len()
        );

        first_error.map_or(Ok(()), Err)
    }

    /// Roll back every participant.
    ///
    /// # Errors
    /// The first participant failure; the others are still aborted
    pub fn abort(mut self) -> Result<()> {
        self.abort_resources()
    }

    fn abort_resources(&mut self) -> Result<()> {
        self.status = Status::Aborted;

        let mut first_error = None;
        for mut resource in self.resources.drain(..) {
            if let Err(e) = resource.abort() {
                if first_error.is_none() {
                    first_error = Some(e);
                } else {
                    warn!(error = %e, "Participant failed to abort");
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

fn prepare(resources: &mut [Box<dyn DataManager>]) -> Result<()> {
    for resource in resources.iter_mut() {
        resource.tpc_begin(false)?;
    }
    for resource in resources.iter_mut() {
        resource.commit()?;
    }
    for resource in resources.iter_mut() {
        resource.tpc_vote()?;
    }

    Ok(())
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.status == Status::Active
            && !self.resources.is_empty()
            && let Err(e) = self.abort_resources()
        {
            warn!(error = %e, "Failed to abort abandoned transaction");
        }
    }
}
