use crate::{
    manim::ManimError,
    models::{
        options::RenderOptions,
        render_result::{RenderResult, RenderSummary},
        status::Status,
    },
};
use std::{
    future::Future,
    sync::{mpsc::Sender, Arc},
    time::Instant,
};
use tokio::{sync::Semaphore, task::JoinSet};
use uuid::Uuid;

/// One scene handed to a runner.
#[derive(Debug, Clone)]
pub struct SceneJob {
    pub options: Arc<RenderOptions>,
    pub scene: String,
    /// 1-based position in the submitted order.
    pub index: usize,
    pub total: usize,
}

/// Something that can render a single scene. The renderer wrapper is the real one;
/// anything else stands in for it.
pub trait SceneRunner: Send + Sync + 'static {
    fn run_scene(
        &self,
        job: SceneJob,
        events: Sender<Status>,
    ) -> impl Future<Output = RenderResult> + Send;
}

/// Number of pool slots actually used for a run.
pub fn pool_size(requested: usize, scene_count: usize) -> usize {
    requested.min(scene_count).max(1)
}

pub struct Orchestrator<R: SceneRunner> {
    runner: Arc<R>,
}

impl<R: SceneRunner> Orchestrator<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner: Arc::new(runner),
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Render every scene in `options`, one at a time or through the worker pool.
    pub async fn render(&self, options: RenderOptions, events: Sender<Status>) -> RenderSummary {
        let started = Instant::now();
        let options = Arc::new(options);
        let mut summary = RenderSummary::new(Uuid::new_v4(), options.output_path());
        summary.total = options.scenes.len();

        tracing::info!(
            "[{}] Rendering {} scene(s) from {} [{}]",
            summary.id,
            summary.total,
            options.file.display(),
            options.quality
        );

        if summary.total == 0 {
            tracing::error!("[{}] No scenes to render", summary.id);
            return summary;
        }

        if options.wants_pool() {
            let size = pool_size(options.max_workers, summary.total);
            tracing::info!("[{}] Using {size} workers", summary.id);
            match self.render_parallel(&options, size, &events).await {
                Ok(results) => results.into_iter().for_each(|r| summary.record(r)),
                Err(e) => {
                    tracing::warn!("[{}] {e}, rendering one scene at a time", summary.id);
                    let _ = events.send(Status::FallBack {
                        reason: e.to_string(),
                    });
                    // the pool may already have reported some scenes, the rerun starts from zero
                    let _ = events.send(Status::Overall {
                        done: 0,
                        total: summary.total,
                        percent: 0,
                    });
                    summary.fell_back = true;
                    self.render_sequential(&options, &events, &mut summary).await;
                }
            }
        } else {
            self.render_sequential(&options, &events, &mut summary).await;
        }

        summary.elapsed = started.elapsed();
        tracing::info!(
            "[{}] Done: {}/{} succeeded",
            summary.id,
            summary.successful,
            summary.total
        );
        summary
    }

    async fn render_sequential(
        &self,
        options: &Arc<RenderOptions>,
        events: &Sender<Status>,
        summary: &mut RenderSummary,
    ) {
        let total = options.scenes.len();
        for (i, scene) in options.scenes.iter().enumerate() {
            let job = SceneJob {
                options: Arc::clone(options),
                scene: scene.clone(),
                index: i + 1,
                total,
            };
            let _ = events.send(Status::SceneStarted {
                scene: scene.clone(),
                index: i + 1,
                total,
            });
            let result = self.runner.run_scene(job, events.clone()).await;
            let _ = events.send(Status::SceneFinished(result.clone()));
            summary.record(result);
            send_overall(events, i + 1, total);
        }
    }

    // Results come back in completion order. A task that panics or is cancelled breaks the
    // whole pool: the partial results are dropped and the caller starts over sequentially.
    async fn render_parallel(
        &self,
        options: &Arc<RenderOptions>,
        size: usize,
        events: &Sender<Status>,
    ) -> Result<Vec<RenderResult>, ManimError> {
        let total = options.scenes.len();
        let permits = Arc::new(Semaphore::new(size));
        let mut set = JoinSet::new();

        for (i, scene) in options.scenes.iter().enumerate() {
            let runner = Arc::clone(&self.runner);
            let permits = Arc::clone(&permits);
            let events = events.clone();
            let job = SceneJob {
                options: Arc::clone(options),
                scene: scene.clone(),
                index: i + 1,
                total,
            };
            set.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| ManimError::Pool(e.to_string()))?;
                let _ = events.send(Status::SceneStarted {
                    scene: job.scene.clone(),
                    index: job.index,
                    total: job.total,
                });
                Ok::<_, ManimError>(runner.run_scene(job, events).await)
            });
        }

        let mut results = Vec::with_capacity(total);
        while let Some(joined) = set.join_next().await {
            // dropping the set on return aborts the remaining tasks and kills their processes
            let result = joined.map_err(|e| ManimError::Pool(e.to_string()))??;
            let _ = events.send(Status::SceneFinished(result.clone()));
            results.push(result);
            send_overall(events, results.len(), total);
        }

        Ok(results)
    }
}

fn send_overall(events: &Sender<Status>, done: usize, total: usize) {
    let percent = (done * 100 / total.max(1)) as u8;
    let _ = events.send(Status::Overall {
        done,
        total,
        percent,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            mpsc, Mutex,
        },
        time::Duration,
    };

    /// Deterministic stand-in: scenes whose name starts with "Bad" fail.
    #[derive(Default)]
    struct FakeRunner {
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: Mutex<Vec<String>>,
        panic_once: AtomicBool,
    }

    impl SceneRunner for FakeRunner {
        fn run_scene(
            &self,
            job: SceneJob,
            _events: Sender<Status>,
        ) -> impl Future<Output = RenderResult> + Send {
            async move {
                if self.panic_once.swap(false, Ordering::SeqCst) {
                    panic!("worker crashed");
                }
                let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.active.fetch_sub(1, Ordering::SeqCst);
                self.calls.lock().unwrap().push(job.scene.clone());

                let success = !job.scene.starts_with("Bad");
                RenderResult {
                    scene: job.scene,
                    success,
                    exit_code: Some(if success { 0 } else { 1 }),
                    output: String::new(),
                }
            }
        }
    }

    fn options(scenes: &[&str], parallel: bool, workers: usize) -> RenderOptions {
        let mut options =
            RenderOptions::new("scene.py", scenes.iter().map(|s| s.to_string()).collect());
        options.parallel = parallel;
        options.max_workers = workers;
        options
    }

    const SCENES: [&str; 5] = ["KirchhoffsLaws", "BadOne", "FluidSimulation", "BadTwo", "WaterDropEffect"];

    #[test]
    fn pool_size_is_clamped() {
        assert_eq!(pool_size(16, 3), 3);
        assert_eq!(pool_size(2, 3), 2);
        assert_eq!(pool_size(0, 3), 1);
    }

    #[tokio::test]
    async fn sequential_keeps_input_order() {
        let orchestrator = Orchestrator::new(FakeRunner::default());
        let (tx, _rx) = mpsc::channel();
        let summary = orchestrator.render(options(&SCENES, false, 4), tx).await;

        assert_eq!(summary.total, 5);
        assert_eq!(summary.successful, 3);
        assert_eq!(summary.failed, 2);
        assert_eq!(orchestrator.runner().peak.load(Ordering::SeqCst), 1);
        let order: Vec<&str> = summary.results.iter().map(|r| r.scene.as_str()).collect();
        assert_eq!(order, SCENES);
        assert!(!summary.fell_back);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn parallel_matches_sequential_counts() {
        let (tx, _rx) = mpsc::channel();
        let sequential = Orchestrator::new(FakeRunner::default())
            .render(options(&SCENES, false, 1), tx.clone())
            .await;
        let parallel = Orchestrator::new(FakeRunner::default())
            .render(options(&SCENES, true, 3), tx)
            .await;

        assert_eq!(sequential.total, parallel.total);
        assert_eq!(sequential.successful, parallel.successful);
        assert_eq!(sequential.failed, parallel.failed);
        assert_eq!(sequential.output_path, parallel.output_path);

        let scenes: HashSet<&str> = parallel.results.iter().map(|r| r.scene.as_str()).collect();
        assert_eq!(scenes, SCENES.into_iter().collect());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn worker_request_is_clamped_to_scene_count() {
        let orchestrator = Orchestrator::new(FakeRunner::default());
        let (tx, _rx) = mpsc::channel();
        let summary = orchestrator
            .render(options(&["A", "B", "C"], true, 32), tx)
            .await;

        assert_eq!(summary.successful, 3);
        assert!(orchestrator.runner().peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn pool_limits_concurrency_to_worker_count() {
        let orchestrator = Orchestrator::new(FakeRunner::default());
        let (tx, _rx) = mpsc::channel();
        let summary = orchestrator
            .render(options(&["A", "B", "C", "D", "E", "F"], true, 2), tx)
            .await;

        assert_eq!(summary.successful, 6);
        assert_eq!(orchestrator.runner().peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pool_failure_falls_back_to_sequential() {
        let runner = FakeRunner::default();
        runner.panic_once.store(true, Ordering::SeqCst);
        let orchestrator = Orchestrator::new(runner);
        let (tx, rx) = mpsc::channel();
        let summary = orchestrator.render(options(&SCENES, true, 2), tx).await;

        assert!(summary.fell_back);
        assert_eq!(summary.total, 5);
        assert_eq!(summary.successful, 3);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.results.len(), 5);
        let order: Vec<&str> = summary.results.iter().map(|r| r.scene.as_str()).collect();
        assert_eq!(order, SCENES);
        let events: Vec<Status> = rx.try_iter().collect();
        let fallback = events
            .iter()
            .position(|status| matches!(status, Status::FallBack { .. }))
            .unwrap();
        let reset = events[fallback..]
            .iter()
            .find(|status| matches!(status, Status::Overall { .. }));
        assert_eq!(
            reset,
            Some(&Status::Overall {
                done: 0,
                total: 5,
                percent: 0
            })
        );
        let last_overall = events
            .iter()
            .rev()
            .find(|status| matches!(status, Status::Overall { .. }));
        assert_eq!(
            last_overall,
            Some(&Status::Overall {
                done: 5,
                total: 5,
                percent: 100
            })
        );
    }

    #[tokio::test]
    async fn empty_run_renders_nothing() {
        let orchestrator = Orchestrator::new(FakeRunner::default());
        let (tx, _rx) = mpsc::channel();
        let summary = orchestrator.render(options(&[], true, 4), tx).await;
        assert_eq!(summary.total, 0);
        assert_eq!(summary.status_code(), 1);
        assert!(orchestrator.runner().calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn overall_progress_reaches_hundred() {
        let orchestrator = Orchestrator::new(FakeRunner::default());
        let (tx, rx) = mpsc::channel();
        orchestrator.render(options(&["A", "B"], false, 1), tx).await;
        let last = rx
            .try_iter()
            .filter(|status| matches!(status, Status::Overall { .. }))
            .last();
        assert_eq!(
            last,
            Some(Status::Overall {
                done: 2,
                total: 2,
                percent: 100
            })
        );
    }
}
