mod common;

use common::{default_executor, memory_queues, FailingStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use ticket_dispatch::queue::{worker_queue, RESULTS_QUEUE, TASKS_QUEUE};
use ticket_dispatch::service::{HealthStatus, ResultCollector, ResultOutcome};
use ticket_dispatch::worker::{PollConfig, WorkerSource};
use ticket_dispatch::{
    DispatchError, LoadBalancer, SubmissionService, Task, TaskQueueManager, TaskResult, TaskType,
    WorkerPool,
};

fn service(queues: &TaskQueueManager, workers: usize) -> SubmissionService {
    SubmissionService::new(queues.clone(), LoadBalancer::new(queues.clone(), workers))
        .with_result_poll(Duration::from_millis(20))
}

#[tokio::test]
async fn test_submit_assigns_missing_id() {
    let (_, queues) = memory_queues();
    let service = service(&queues, 2);

    let receipt = service
        .submit(Task::with_id("", TaskType::Routing, json!({"channel": "chat"})))
        .await
        .unwrap();

    assert!(!receipt.task_id.is_empty());
    assert_eq!(receipt.worker, 0);

    let queued: Task = queues
        .pop(&worker_queue(0), Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(queued.id, receipt.task_id);
}

#[tokio::test]
async fn test_submit_keeps_caller_id() {
    let (_, queues) = memory_queues();
    let service = service(&queues, 2);

    let receipt = service
        .submit(Task::with_id("ticket-9", "sentiment_analysis", json!({"text": "ok"})))
        .await
        .unwrap();
    assert_eq!(receipt.task_id, "ticket-9");
    assert_eq!(service.queue_length(&worker_queue(0)).await, 1);
}

#[tokio::test]
async fn test_submit_surfaces_store_outage() {
    let queues = TaskQueueManager::new(Arc::new(FailingStore));
    let service = service(&queues, 2);

    let err = service
        .submit(Task::new("routing", json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::StoreUnavailable(_)));
    assert_eq!(service.queue_length(TASKS_QUEUE).await, 0);
}

#[tokio::test]
async fn test_health_degrades_when_a_worker_backs_up() {
    let (_, queues) = memory_queues();
    let balancer = LoadBalancer::new(queues.clone(), 2).with_health_threshold(2);
    let service = SubmissionService::new(queues.clone(), balancer);

    let report = service.health().await;
    assert_eq!(report.status, HealthStatus::Healthy);
    assert_eq!(report.worker_status, vec![true, true]);

    for i in 0..2 {
        queues
            .push(&worker_queue(1), &Task::with_id(format!("x{}", i), "routing", json!({})))
            .await
            .unwrap();
    }

    let report = service.health().await;
    assert_eq!(report.status, HealthStatus::Degraded);
    assert_eq!(report.worker_status, vec![true, false]);
    assert_eq!(serde_json::to_value(&report).unwrap()["status"], "degraded");
}

#[tokio::test]
async fn test_metrics_report_depths_and_counters() {
    let (_, queues) = memory_queues();
    let service = service(&queues, 3);

    for i in 0..4 {
        service
            .submit(Task::with_id(format!("t{}", i), "routing", json!({})))
            .await
            .unwrap();
    }
    queues
        .push(TASKS_QUEUE, &Task::with_id("shared", "routing", json!({})))
        .await
        .unwrap();

    let metrics = service.metrics().await;
    assert_eq!(metrics.tasks_pending, 1);
    assert_eq!(metrics.results_pending, 0);
    assert_eq!(metrics.worker_queues, vec![2, 1, 1]);
    assert_eq!(metrics.queue.pushed, 5);
}

#[tokio::test]
async fn test_await_result_round_trip_through_pool() {
    let (_, queues) = memory_queues();
    let service = service(&queues, 2);

    let mut pool = WorkerPool::new(2)
        .with_source(WorkerSource::Assigned)
        .with_poll(PollConfig {
            pop_timeout: Duration::from_millis(20),
            idle_interval: Duration::from_millis(5),
        });
    pool.start(queues.clone(), default_executor()).unwrap();

    let receipt = service
        .submit(Task::with_id(
            "r1",
            "routing",
            json!({"channel": "email", "priority": "high"}),
        ))
        .await
        .unwrap();

    match service.await_result(&receipt.task_id, Duration::from_secs(5)).await {
        ResultOutcome::Completed(result) => {
            assert_eq!(result.task_id, "r1");
            assert_eq!(result.worker_id, receipt.worker);
        }
        ResultOutcome::TimedOut => panic!("result never arrived"),
    }

    pool.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_await_result_correlates_by_task_id() {
    let (_, queues) = memory_queues();
    let service = service(&queues, 1);

    let other = TaskResult::success(&Task::with_id("other", "routing", json!({})), 0, json!({}));
    let mine = TaskResult::success(&Task::with_id("mine", "routing", json!({})), 0, json!({}));
    queues.push(RESULTS_QUEUE, &other).await.unwrap();
    queues.push(RESULTS_QUEUE, &mine).await.unwrap();

    let outcome = service.await_result("mine", Duration::from_secs(1)).await;
    assert_eq!(outcome, ResultOutcome::Completed(mine));

    // The envelope popped on the way is still available to its own waiter
    let outcome = service.await_result("other", Duration::ZERO).await;
    assert_eq!(outcome, ResultOutcome::Completed(other));
}

#[tokio::test]
async fn test_await_result_times_out_without_retracting() {
    let (_, queues) = memory_queues();
    let service = service(&queues, 1);

    let receipt = service
        .submit(Task::with_id("slow", "routing", json!({})))
        .await
        .unwrap();

    let outcome = service
        .await_result(&receipt.task_id, Duration::from_millis(50))
        .await;
    assert_eq!(outcome, ResultOutcome::TimedOut);
    assert_eq!(service.queue_length(&worker_queue(0)).await, 1);
}

fn finished(id: &str) -> TaskResult {
    TaskResult::success(&Task::with_id(id, "routing", json!({})), 0, json!({}))
}

#[tokio::test(start_paused = true)]
async fn test_unclaimed_results_stay_bounded() {
    let (_, queues) = memory_queues();
    let collector = ResultCollector::new(queues.clone()).with_stash_limits(10, Duration::from_secs(60));

    for i in 0..500 {
        queues
            .push(RESULTS_QUEUE, &finished(&format!("orphan-{}", i)))
            .await
            .unwrap();
    }

    let outcome = collector.await_result("never", Duration::from_millis(50)).await;
    assert_eq!(outcome, ResultOutcome::TimedOut);
    assert_eq!(collector.stashed().await, 10);
    assert_eq!(collector.evicted(), 490);

    // The newest results are the ones kept
    let outcome = collector.await_result("orphan-499", Duration::ZERO).await;
    assert_eq!(outcome, ResultOutcome::Completed(finished("orphan-499")));
    let outcome = collector.await_result("orphan-0", Duration::ZERO).await;
    assert_eq!(outcome, ResultOutcome::TimedOut);
}

#[tokio::test(start_paused = true)]
async fn test_unclaimed_results_expire() {
    let (_, queues) = memory_queues();
    let service = service(&queues, 1).with_result_stash(100, Duration::from_secs(1));

    queues.push(RESULTS_QUEUE, &finished("orphan")).await.unwrap();

    let outcome = service.await_result("never", Duration::from_secs(2)).await;
    assert_eq!(outcome, ResultOutcome::TimedOut);

    let metrics = service.metrics().await;
    assert_eq!(metrics.results_stashed, 0);
    assert_eq!(metrics.results_evicted, 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_waiters_pick_up_each_others_stash() {
    let (_, queues) = memory_queues();
    let collector = ResultCollector::new(queues.clone()).with_poll_interval(Duration::ZERO);

    let publisher = queues.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        for id in ["b", "a"] {
            publisher.push(RESULTS_QUEUE, &finished(id)).await.unwrap();
        }
    });

    let started = tokio::time::Instant::now();
    let wait = |id: &'static str| {
        let collector = collector.clone();
        async move {
            let outcome = collector.await_result(id, Duration::from_secs(3)).await;
            (outcome, started.elapsed())
        }
    };
    let ((a, a_elapsed), (b, b_elapsed)) = tokio::join!(wait("a"), wait("b"));

    assert_eq!(a, ResultOutcome::Completed(finished("a")));
    assert_eq!(b, ResultOutcome::Completed(finished("b")));
    assert!(a_elapsed < Duration::from_secs(1));
    assert!(b_elapsed < Duration::from_secs(1));
}
