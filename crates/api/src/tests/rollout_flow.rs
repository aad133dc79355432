/*
 * SPDX-FileCopyrightText: Copyright (c) 2024-2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */
use model::event::UpdateEventType;
use model::history::HistoryStatus;
use model::job::JobStatus;
use model::router::RouterStatus;

use crate::ApiError;
use crate::fota;
use crate::rollout::RolloutRequest;
use crate::tests::common::*;

const OLD: &str = "RUT9_R_00.07.06.11";
const NEW: &str = "RUT9_R_00.07.06.20";

fn request(router_ids: Option<Vec<String>>, batch_size: i64) -> RolloutRequest {
    RolloutRequest {
        router_ids,
        batch_size,
        include_errors: false,
    }
}

#[tokio::test(start_paused = true)]
async fn single_router_happy_path_produces_the_full_event_sequence() {
    let h = harness().await;
    seed_global_credentials(&h.pool).await;
    db::settings::set_batch_wait_minutes(&h.pool, 0).await.unwrap();
    let router = seed_router(
        &h.pool,
        "edge-1",
        "10.0.0.1",
        RouterStatus::UpdateAvailable,
        Some(OLD),
        Some(NEW),
    )
    .await;
    h.runner.script_update("10.0.0.1", NEW);

    let job = h
        .rollout
        .start(request(Some(vec![router.id.clone()]), 5))
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(job.total_routers, 1);

    let job = wait_for_job(&h.pool, &job.id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.completed_routers, 1);
    assert_eq!(job.failed_routers, 0);

    // The exact protocol a dashboard sees for this job.
    let types: Vec<_> = h.events.for_job(&job.id).iter().map(|e| e.event_type).collect();
    assert_eq!(
        types,
        vec![
            UpdateEventType::JobStarted,
            UpdateEventType::BatchStarted,
            UpdateEventType::RouterStarted,
            UpdateEventType::RouterProgress, // downloading
            UpdateEventType::RouterProgress, // rebooting
            UpdateEventType::RouterCompleted,
            UpdateEventType::BatchCompleted,
            UpdateEventType::JobProgress,
            UpdateEventType::JobCompleted,
        ]
    );
    let stages: Vec<_> = h
        .events
        .of_type(UpdateEventType::RouterProgress)
        .into_iter()
        .filter_map(|e| e.data.status)
        .collect();
    assert_eq!(stages, vec!["downloading", "rebooting"]);

    let completed = &h.events.of_type(UpdateEventType::RouterCompleted)[0];
    assert_eq!(completed.data.firmware_before.as_deref(), Some(OLD));
    assert_eq!(completed.data.firmware_after.as_deref(), Some(NEW));
    let progress = &h.events.of_type(UpdateEventType::JobProgress)[0];
    assert_eq!(progress.data.progress, Some(100));

    // Final durable state.
    let router = db::router::get_by_id(&h.pool, &router.id).await.unwrap();
    assert_eq!(router.status, RouterStatus::UpToDate);
    assert_eq!(router.current_firmware.as_deref(), Some(NEW));
    assert_eq!(router.available_firmware, None);

    let history = db::update_history::get_by_router(&h.pool, &router.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, HistoryStatus::Success);
    assert_eq!(history[0].firmware_before.as_deref(), Some(OLD));
    assert_eq!(history[0].firmware_after.as_deref(), Some(NEW));
    assert!(history[0].completed_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn image_is_downloaded_when_not_yet_present() {
    let h = harness().await;
    seed_global_credentials(&h.pool).await;
    db::settings::set_batch_wait_minutes(&h.pool, 0).await.unwrap();
    let router = seed_router(
        &h.pool,
        "edge-1",
        "10.0.0.1",
        RouterStatus::UpdateAvailable,
        Some(OLD),
        Some(NEW),
    )
    .await;

    h.runner.script(
        "10.0.0.1",
        fota::CMD_CHECK_IMAGE,
        vec![
            FakeResponse::Fail {
                exit_code: 2,
                stderr: "No such file or directory".into(),
            },
            FakeResponse::Ok("-rw-r--r-- firmware.img".into()),
        ],
    );
    h.runner
        .script("10.0.0.1", fota::CMD_FOTA_DOWNLOAD, vec![FakeResponse::Ok("".into())]);
    h.runner
        .script("10.0.0.1", fota::CMD_VERIFY_IMAGE, vec![FakeResponse::Ok("".into())]);
    h.runner
        .script("10.0.0.1", fota::CMD_APPLY_IMAGE, vec![FakeResponse::Closed]);
    h.runner
        .script("10.0.0.1", fota::CMD_READ_VERSION, vec![FakeResponse::Ok(NEW.into())]);

    let job = h
        .rollout
        .start(request(Some(vec![router.id.clone()]), 5))
        .await
        .unwrap();
    let job = wait_for_job(&h.pool, &job.id).await;
    assert_eq!(job.completed_routers, 1);
    assert_eq!(h.runner.calls_of("10.0.0.1", fota::CMD_FOTA_DOWNLOAD), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_verification_fails_the_router_but_not_the_job() {
    let h = harness().await;
    seed_global_credentials(&h.pool).await;
    db::settings::set_batch_wait_minutes(&h.pool, 0).await.unwrap();
    let good = seed_router(
        &h.pool,
        "edge-1",
        "10.0.0.1",
        RouterStatus::UpdateAvailable,
        Some(OLD),
        Some(NEW),
    )
    .await;
    let bad = seed_router(
        &h.pool,
        "edge-2",
        "10.0.0.2",
        RouterStatus::UpdateAvailable,
        Some(OLD),
        Some(NEW),
    )
    .await;

    h.runner.script_update("10.0.0.1", NEW);
    h.runner.script(
        "10.0.0.2",
        fota::CMD_CHECK_IMAGE,
        vec![FakeResponse::Ok("-rw-r--r-- firmware.img".into())],
    );
    h.runner.script(
        "10.0.0.2",
        fota::CMD_VERIFY_IMAGE,
        vec![FakeResponse::Fail {
            exit_code: 1,
            stderr: "Invalid image magic".into(),
        }],
    );

    let job = h.rollout.start(request(None, 5)).await.unwrap();
    let job = wait_for_job(&h.pool, &job.id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.completed_routers, 1);
    assert_eq!(job.failed_routers, 1);

    let failed = h.events.of_type(UpdateEventType::RouterFailed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].data.router_id.as_deref(), Some(bad.id.as_str()));
    assert_eq!(
        failed[0].data.error.as_deref(),
        Some("Firmware image verification failed")
    );

    assert_eq!(
        db::router::get_by_id(&h.pool, &bad.id).await.unwrap().status,
        RouterStatus::Error
    );
    assert_eq!(
        db::router::get_by_id(&h.pool, &good.id).await.unwrap().status,
        RouterStatus::UpToDate
    );
    let history = db::update_history::get_by_router(&h.pool, &bad.id).await.unwrap();
    assert_eq!(history[0].status, HistoryStatus::Failed);
    assert_eq!(
        history[0].error_message.as_deref(),
        Some("Firmware image verification failed")
    );
}

#[tokio::test(start_paused = true)]
async fn missing_credentials_fail_the_router() {
    let h = harness().await;
    // No global credentials seeded.
    db::settings::set_batch_wait_minutes(&h.pool, 0).await.unwrap();
    let router = seed_router(
        &h.pool,
        "edge-1",
        "10.0.0.1",
        RouterStatus::UpdateAvailable,
        Some(OLD),
        Some(NEW),
    )
    .await;

    let job = h
        .rollout
        .start(request(Some(vec![router.id.clone()]), 5))
        .await
        .unwrap();
    let job = wait_for_job(&h.pool, &job.id).await;
    assert_eq!(job.failed_routers, 1);

    let failed = h.events.of_type(UpdateEventType::RouterFailed);
    assert_eq!(failed[0].data.error.as_deref(), Some("No credentials configured"));
}

#[tokio::test(start_paused = true)]
async fn reboot_answer_on_the_final_poll_still_succeeds() {
    let h = harness().await;
    seed_global_credentials(&h.pool).await;
    db::settings::set_batch_wait_minutes(&h.pool, 0).await.unwrap();
    let router = seed_router(
        &h.pool,
        "edge-1",
        "10.0.0.1",
        RouterStatus::UpdateAvailable,
        Some(OLD),
        Some(NEW),
    )
    .await;

    h.runner.script_update("10.0.0.1", NEW);
    // 19 dead polls, then the device answers on the 20th and last attempt.
    let mut polls = vec![FakeResponse::Timeout; 19];
    polls.push(FakeResponse::Ok(NEW.into()));
    h.runner.script("10.0.0.1", fota::CMD_READ_VERSION, polls);

    let job = h
        .rollout
        .start(request(Some(vec![router.id.clone()]), 5))
        .await
        .unwrap();
    let job = wait_for_job(&h.pool, &job.id).await;
    assert_eq!(job.completed_routers, 1);
    assert_eq!(h.runner.calls_of("10.0.0.1", fota::CMD_READ_VERSION), 20);
}

#[tokio::test(start_paused = true)]
async fn reboot_timeout_after_twenty_dead_polls() {
    let h = harness().await;
    seed_global_credentials(&h.pool).await;
    db::settings::set_batch_wait_minutes(&h.pool, 0).await.unwrap();
    let router = seed_router(
        &h.pool,
        "edge-1",
        "10.0.0.1",
        RouterStatus::UpdateAvailable,
        Some(OLD),
        Some(NEW),
    )
    .await;

    h.runner.script_update("10.0.0.1", NEW);
    // Would answer on the 21st attempt, but the poll budget is 20.
    let mut polls = vec![FakeResponse::Timeout; 20];
    polls.push(FakeResponse::Ok(NEW.into()));
    h.runner.script("10.0.0.1", fota::CMD_READ_VERSION, polls);

    let job = h
        .rollout
        .start(request(Some(vec![router.id.clone()]), 5))
        .await
        .unwrap();
    let job = wait_for_job(&h.pool, &job.id).await;
    assert_eq!(job.failed_routers, 1);
    assert_eq!(h.runner.calls_of("10.0.0.1", fota::CMD_READ_VERSION), 20);

    let failed = h.events.of_type(UpdateEventType::RouterFailed);
    assert_eq!(
        failed[0].data.error.as_deref(),
        Some("Router did not come back online after update")
    );
    assert_eq!(
        db::router::get_by_id(&h.pool, &router.id).await.unwrap().status,
        RouterStatus::Error
    );
    let history = db::update_history::get_by_router(&h.pool, &router.id).await.unwrap();
    assert_eq!(history[0].status, HistoryStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn wrong_version_after_reboot_keeps_polling_until_the_flash_settles() {
    let h = harness().await;
    seed_global_credentials(&h.pool).await;
    db::settings::set_batch_wait_minutes(&h.pool, 0).await.unwrap();
    let router = seed_router(
        &h.pool,
        "edge-1",
        "10.0.0.1",
        RouterStatus::UpdateAvailable,
        Some(OLD),
        Some(NEW),
    )
    .await;

    h.runner.script_update("10.0.0.1", NEW);
    // Early in boot the device still reports the old version.
    h.runner.script(
        "10.0.0.1",
        fota::CMD_READ_VERSION,
        vec![FakeResponse::Ok(OLD.into()), FakeResponse::Ok(NEW.into())],
    );

    let job = h
        .rollout
        .start(request(Some(vec![router.id.clone()]), 5))
        .await
        .unwrap();
    let job = wait_for_job(&h.pool, &job.id).await;
    assert_eq!(job.completed_routers, 1);
    assert_eq!(h.runner.calls_of("10.0.0.1", fota::CMD_READ_VERSION), 2);
}

#[tokio::test(start_paused = true)]
async fn twenty_five_routers_in_three_batches_with_two_pauses() {
    let h = harness().await;
    seed_global_credentials(&h.pool).await;
    db::settings::set_batch_wait_minutes(&h.pool, 2).await.unwrap();
    for i in 0..25 {
        let ip = format!("10.0.1.{}", i + 1);
        seed_router(
            &h.pool,
            &format!("edge-{i}"),
            &ip,
            RouterStatus::UpdateAvailable,
            Some(OLD),
            Some(NEW),
        )
        .await;
        h.runner.script_update(&ip, NEW);
    }

    let started = tokio::time::Instant::now();
    let job = h.rollout.start(request(None, 10)).await.unwrap();
    assert_eq!(job.total_routers, 25);
    let job = wait_for_job(&h.pool, &job.id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.completed_routers, 25);
    assert_eq!(job.failed_routers, 0);

    assert_eq!(h.events.of_type(UpdateEventType::BatchStarted).len(), 3);
    assert_eq!(h.events.of_type(UpdateEventType::BatchCompleted).len(), 3);

    // Two inter-batch pauses, each counting 2, 1.
    let waits: Vec<_> = h
        .events
        .of_type(UpdateEventType::BatchWaiting)
        .into_iter()
        .filter_map(|e| e.data.wait_time_remaining)
        .collect();
    assert_eq!(waits, vec![2, 1, 2, 1]);

    // The pauses alone account for at least four minutes of wall clock.
    assert!(started.elapsed() >= std::time::Duration::from_secs(240));

    let progress: Vec<_> = h
        .events
        .of_type(UpdateEventType::JobProgress)
        .into_iter()
        .filter_map(|e| e.data.progress)
        .collect();
    assert_eq!(progress, vec![40, 80, 100]);
}

#[tokio::test(start_paused = true)]
async fn batch_covering_the_whole_set_never_waits() {
    let h = harness().await;
    seed_global_credentials(&h.pool).await;
    db::settings::set_batch_wait_minutes(&h.pool, 2).await.unwrap();
    for i in 0..3 {
        let ip = format!("10.0.1.{}", i + 1);
        seed_router(
            &h.pool,
            &format!("edge-{i}"),
            &ip,
            RouterStatus::UpdateAvailable,
            Some(OLD),
            Some(NEW),
        )
        .await;
        h.runner.script_update(&ip, NEW);
    }

    let job = h.rollout.start(request(None, 5)).await.unwrap();
    let job = wait_for_job(&h.pool, &job.id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(h.events.of_type(UpdateEventType::BatchStarted).len(), 1);
    assert!(h.events.of_type(UpdateEventType::BatchWaiting).is_empty());
}

#[tokio::test(start_paused = true)]
async fn zero_wait_minutes_skips_the_pause_entirely() {
    let h = harness().await;
    seed_global_credentials(&h.pool).await;
    db::settings::set_batch_wait_minutes(&h.pool, 0).await.unwrap();
    for i in 0..10 {
        let ip = format!("10.0.1.{}", i + 1);
        seed_router(
            &h.pool,
            &format!("edge-{i}"),
            &ip,
            RouterStatus::UpdateAvailable,
            Some(OLD),
            Some(NEW),
        )
        .await;
        h.runner.script_update(&ip, NEW);
    }

    let job = h.rollout.start(request(None, 5)).await.unwrap();
    let job = wait_for_job(&h.pool, &job.id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(h.events.of_type(UpdateEventType::BatchStarted).len(), 2);
    assert!(h.events.of_type(UpdateEventType::BatchWaiting).is_empty());
}

#[tokio::test(start_paused = true)]
async fn a_second_rollout_is_rejected_while_one_is_active() {
    let h = harness().await;
    seed_global_credentials(&h.pool).await;
    let active = db::batch_job::insert(&h.pool, 5, 5).await.unwrap();
    db::batch_job::mark_running(&h.pool, &active.id).await.unwrap();
    seed_router(
        &h.pool,
        "edge-1",
        "10.0.0.1",
        RouterStatus::UpdateAvailable,
        Some(OLD),
        Some(NEW),
    )
    .await;

    let err = h.rollout.start(request(None, 5)).await.unwrap_err();
    match err {
        ApiError::Conflict { job_id } => assert_eq!(job_id, active.id),
        other => panic!("expected Conflict, got {other:?}"),
    }

    // No second job row, no events.
    assert_eq!(db::batch_job::get_all(&h.pool).await.unwrap().len(), 1);
    assert!(h.events.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn candidate_resolution_honors_selection_and_include_errors() {
    let h = harness().await;
    seed_global_credentials(&h.pool).await;
    db::settings::set_batch_wait_minutes(&h.pool, 0).await.unwrap();
    let available = seed_router(
        &h.pool,
        "edge-1",
        "10.0.0.1",
        RouterStatus::UpdateAvailable,
        Some(OLD),
        Some(NEW),
    )
    .await;
    seed_router(&h.pool, "edge-2", "10.0.0.2", RouterStatus::Error, Some(OLD), None).await;
    seed_router(
        &h.pool,
        "edge-3",
        "10.0.0.3",
        RouterStatus::Unreachable,
        Some(OLD),
        None,
    )
    .await;
    seed_router(&h.pool, "edge-4", "10.0.0.4", RouterStatus::UpToDate, Some(NEW), None).await;
    for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
        h.runner.script_update(ip, NEW);
    }

    // include_errors pulls in error and unreachable routers.
    let job = h
        .rollout
        .start(RolloutRequest {
            router_ids: None,
            batch_size: 5,
            include_errors: true,
        })
        .await
        .unwrap();
    assert_eq!(job.total_routers, 3);
    wait_for_job(&h.pool, &job.id).await;

    // Explicit selection skips ids that do not exist.
    let job = h
        .rollout
        .start(request(Some(vec![available.id.clone(), "no-such-router".to_string()]), 5))
        .await
        .unwrap();
    assert_eq!(job.total_routers, 1);
    wait_for_job(&h.pool, &job.id).await;
}

#[tokio::test(start_paused = true)]
async fn unknown_batch_size_and_empty_selection_are_validation_errors() {
    let h = harness().await;
    let err = h.rollout.start(request(None, 7)).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));

    let err = h.rollout.start(request(None, 5)).await.unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
    assert!(db::batch_job::get_all(&h.pool).await.unwrap().is_empty());
}
