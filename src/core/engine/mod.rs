use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use kanal::{unbounded_async, AsyncReceiver, AsyncSender};
use log::{debug, error, info, warn};
use tokio::select;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::core::dispatch::{CallbackFuture, CallbackResult, Dispatcher, HandlerRegistry};
use crate::core::errors::{CrawlError, CrawlResult};
use crate::core::spider::Spider;
use crate::fetchers::Fetcher;
use crate::http::{Request, Response};
use crate::middleware::Middleware;
use crate::stats::{RunStats, StatsTracker};


/// Engine-level knobs. Per-request behavior (timeouts, retries) lives on the
/// requests themselves.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Upper bound on concurrent in-flight fetches; the permit count of the
    /// admission gate, which is the engine's sole concurrency limit.
    pub concurrency: usize,
    /// Number of worker loops consuming the task queue.
    pub workers: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            workers: 2,
        }
    }
}

impl CrawlConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Running,
    Draining,
    Stopped,
}

struct StateCell(AtomicU8);

impl StateCell {
    fn new() -> Self {
        Self(AtomicU8::new(RunState::Init as u8))
    }

    fn set(&self, state: RunState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    fn get(&self) -> RunState {
        match self.0.load(Ordering::SeqCst) {
            0 => RunState::Init,
            1 => RunState::Running,
            2 => RunState::Draining,
            _ => RunState::Stopped,
        }
    }
}

/// Counts tasks from enqueue to completion and wakes the drain loop when the
/// count falls to zero. Queue length alone cannot tell "drained" from
/// "dequeued but still being worked on".
struct CompletionTracker {
    pending: AtomicUsize,
    notify: Notify,
}

impl CompletionTracker {
    fn new() -> Self {
        Self {
            pending: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    fn task_added(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    fn task_done(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }

    fn is_idle(&self) -> bool {
        self.pending.load(Ordering::SeqCst) == 0
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before the check so a completion landing between the
            // check and the await still wakes us.
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

enum Task {
    Fetch(Box<Request>),
    Run {
        future: CallbackFuture,
        response: Box<Response>,
    },
}

/// State owned by a single run: queue handle, admission gate, completion
/// tracking, cancellation, counters. Built fresh per run so consecutive runs
/// on one crawler never share anything.
pub(crate) struct RunContext {
    queue: AsyncSender<Task>,
    gate: Arc<Semaphore>,
    tracker: CompletionTracker,
    cancel: CancellationToken,
    stats: StatsTracker,
    state: StateCell,
}

impl RunContext {
    fn new(concurrency: usize, cancel: CancellationToken, queue: AsyncSender<Task>) -> Self {
        Self {
            queue,
            gate: Arc::new(Semaphore::new(concurrency.max(1))),
            tracker: CompletionTracker::new(),
            cancel,
            stats: StatsTracker::new(),
            state: StateCell::new(),
        }
    }

    pub(crate) fn enqueue_fetch(&self, request: Request) {
        self.push(Task::Fetch(Box::new(request)));
    }

    pub(crate) fn enqueue_run(&self, future: CallbackFuture, response: Response) {
        self.push(Task::Run {
            future,
            response: Box::new(response),
        });
    }

    pub(crate) fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    fn push(&self, task: Task) {
        self.tracker.task_added();
        // try_send on the unbounded queue only refuses when the queue is
        // closed, i.e. the run is past draining; late tasks are dropped.
        match self.queue.try_send(task) {
            Ok(true) => {}
            Ok(false) | Err(_) => {
                debug!("Queue closed; dropping late task");
                self.tracker.task_done();
            }
        }
    }

    fn close_queue(&self) {
        self.queue.close();
    }
}

/// The crawl engine: a fixed pool of workers consuming a FIFO queue of
/// tasks, with a semaphore bounding in-flight fetches. One instance can run
/// many spiders, sequentially or not; every run gets its own context.
pub struct Crawler {
    fetcher: Box<dyn Fetcher>,
    middleware: Arc<Middleware>,
    handlers: Arc<HandlerRegistry>,
    config: CrawlConfig,
}

impl Crawler {
    pub fn new(fetcher: Box<dyn Fetcher>) -> Self {
        info!("Initializing crawler");
        Self {
            fetcher,
            middleware: Arc::new(Middleware::new()),
            handlers: Arc::new(HandlerRegistry::new()),
            config: CrawlConfig::default(),
        }
    }

    pub fn with_config(mut self, config: CrawlConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.middleware = Arc::new(middleware);
        self
    }

    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = Arc::new(handlers);
        self
    }

    pub async fn run<S: Spider>(&self, spider: S) -> CrawlResult<RunStats> {
        self.run_with_shutdown(spider, CancellationToken::new())
            .await
    }

    /// Run until the queue drains or the token fires. A fired token still
    /// winds the run down through draining and reports totals.
    pub async fn run_with_shutdown<S: Spider>(
        &self,
        spider: S,
        shutdown: CancellationToken,
    ) -> CrawlResult<RunStats> {
        let spider = Arc::new(spider);
        let (sender, receiver) = unbounded_async::<Task>();
        // Workers watch a child token so teardown after a normal drain does
        // not fire the caller's token.
        let ctx = Arc::new(RunContext::new(
            self.config.concurrency,
            shutdown.child_token(),
            sender,
        ));
        let started = Instant::now();

        info!("Starting spider: {}", spider.name());

        if let Err(err) = spider.after_start().await {
            let err = CrawlError::hook("after_start", err);
            error!("{err}");
            ctx.stats.finish();
            ctx.state.set(RunState::Stopped);
            return Err(err);
        }

        let seeds = spider.start_requests()?;
        if seeds.is_empty() {
            warn!("Spider {} has no seed requests", spider.name());
            ctx.stats.finish();
            ctx.state.set(RunState::Stopped);
            return Err(CrawlError::NoSeeds);
        }

        ctx.state.set(RunState::Running);
        let seed_count = seeds.len();
        for request in seeds {
            ctx.enqueue_fetch(request);
        }
        debug!("Enqueued {seed_count} seed requests");

        let mut workers = JoinSet::new();
        for worker_id in 0..self.config.workers.max(1) {
            let dispatcher = Dispatcher::new(
                Arc::clone(&spider),
                Arc::clone(&self.handlers),
                Arc::clone(&ctx),
            );
            workers.spawn(worker_loop(
                worker_id,
                receiver.clone(),
                Arc::clone(&ctx),
                self.fetcher.box_clone(),
                Arc::clone(&self.middleware),
                dispatcher,
                Arc::clone(&spider),
            ));
        }

        let cancelled = select! {
            _ = shutdown.cancelled() => {
                warn!("Shutdown requested; stopping spider {}", spider.name());
                true
            }
            _ = wait_for_drain(&ctx) => false,
        };
        if cancelled {
            ctx.state.set(RunState::Draining);
        }

        // The queue is settled (or the run is being torn down); run the
        // closing lifecycle hook while the workers are still alive.
        let hook_result = spider
            .before_stop()
            .await
            .map_err(|err| CrawlError::hook("before_stop", err));
        if let Err(err) = &hook_result {
            error!("{err}");
        }

        ctx.close_queue();
        ctx.cancel.cancel();
        if cancelled {
            workers.abort_all();
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                if !err.is_cancelled() {
                    let err = CrawlError::TaskError(err.to_string());
                    debug!("Worker ended abnormally: {err}");
                }
            }
        }

        ctx.stats.finish();
        ctx.state.set(RunState::Stopped);

        let stats = ctx.stats.snapshot();
        info!("Total requests: {}", stats.total_requests());
        if stats.requests_failed > 0 {
            info!("Failed requests: {}", stats.requests_failed);
        }
        info!("Time usage: {:?}", started.elapsed());

        hook_result?;
        Ok(stats)
    }
}

/// Drain detection with a second look: after the pending count first hits
/// zero the run is draining, but tasks dispatched by work that finished at
/// that exact moment are still accepted; only a repeat zero observation ends
/// the run.
async fn wait_for_drain(ctx: &RunContext) {
    loop {
        ctx.tracker.wait_idle().await;
        if ctx.state.get() != RunState::Draining {
            debug!("Queue observed empty; draining");
            ctx.state.set(RunState::Draining);
        }
        tokio::task::yield_now().await;
        if ctx.tracker.is_idle() {
            return;
        }
    }
}

async fn worker_loop<S: Spider>(
    worker_id: usize,
    receiver: AsyncReceiver<Task>,
    ctx: Arc<RunContext>,
    fetcher: Box<dyn Fetcher>,
    middleware: Arc<Middleware>,
    dispatcher: Dispatcher<S>,
    spider: Arc<S>,
) {
    debug!("Worker {worker_id} started");
    loop {
        let task = select! {
            _ = ctx.cancel.cancelled() => break,
            task = receiver.recv() => match task {
                Ok(task) => task,
                Err(_) => break,
            },
        };

        match task {
            Task::Fetch(request) => {
                // The permit spans the fetch and its dispatch; the guard
                // drop releases it on every path.
                let Ok(_permit) = ctx.gate.acquire().await else {
                    ctx.tracker.task_done();
                    break;
                };
                handle_fetch(
                    *request,
                    &ctx,
                    fetcher.as_ref(),
                    &middleware,
                    &dispatcher,
                    &spider,
                )
                .await;
            }
            Task::Run { future, response } => {
                handle_run(future, *response, &dispatcher).await;
            }
        }
        ctx.tracker.task_done();
    }
    debug!("Worker {worker_id} stopped");
}

async fn handle_fetch<S: Spider>(
    mut request: Request,
    ctx: &RunContext,
    fetcher: &dyn Fetcher,
    middleware: &Middleware,
    dispatcher: &Dispatcher<S>,
    spider: &Arc<S>,
) {
    let started = Instant::now();
    middleware.run_request(&mut request).await;

    // The retry loop may rewrite its copy of the request; hooks and the
    // callback see the descriptor as it entered the fetch.
    let request = request;
    let mut response = fetcher.fetch(request.clone()).await;

    middleware.run_response(&request, &mut response).await;

    if response.retries > 0 {
        ctx.stats.record_retries(response.retries);
    }

    let elapsed = started.elapsed();
    if response.ok {
        ctx.stats
            .record_success(response.status, response.body.len(), elapsed);
        if let Err(err) = spider.process_succeed_response(&request, &response).await {
            error!("process_succeed_response failed for {}: {}", response.url, err);
        }
    } else {
        ctx.stats.record_failure(response.status, elapsed);
        if let Err(err) = spider.process_failed_response(&request, &response).await {
            error!("process_failed_response failed for {}: {}", response.url, err);
        }
    }

    dispatcher.run_callback(&request, &response).await;
}

async fn handle_run<S: Spider>(
    future: CallbackFuture,
    mut response: Response,
    dispatcher: &Dispatcher<S>,
) {
    let produced = future.await;
    // Hand the payload back through the response slot when the computation
    // resolved to a custom value.
    if let CallbackResult::Custom(value) = &produced {
        response.set_callback_result(value.data());
    }
    dispatcher.dispatch(produced, &response).await;
}
