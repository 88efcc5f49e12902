//! End-to-end deployment tests.
//!
//! These tests run real child processes through the orchestrator and the
//! pipeline and check the resulting PhaseResults and audit log.

use campaign::config::DeploymentSettings;
use campaign::deployment::{
    CustomCheck, DeploymentSummary, PhaseFile, PhaseState, SuccessCriteria, Task,
    ValidationCheck, ValidationKind,
};
use campaign::Error;

use super::fixtures::{echo, fail, failing_phase, passing_phase, pipeline, remove, Workspace};

/// Test: Non-critical failures do not fail the phase
/// Given tasks [echo a, false, echo b], none critical
/// When the phase runs
/// Then all three run, one fails, and the phase still succeeds with warnings
#[tokio::test]
async fn test_non_critical_failure_is_tolerated() {
    let (pipeline, _logger) = pipeline();
    let phase = campaign::deployment::Phase::new("mixed", "Mixed")
        .task(echo("a", "a"))
        .task(fail("f"))
        .task(echo("b", "b"));

    let result = pipeline.orchestrator().execute_phase(&phase).await;

    assert_eq!(result.tasks_executed, 3);
    assert_eq!(result.tasks_succeeded, 2);
    assert_eq!(result.tasks_failed, 1);
    assert!(result.success);
    assert!(!result.warnings.is_empty());
    assert!(result.errors.is_empty());
    assert!(!result.rollback_performed);
}

/// Test: Critical failure triggers rollback
/// Given a critical `false` task and a rollback task that removes a file
/// When the phase runs
/// Then the phase fails, rollback is performed, and the file is gone
#[tokio::test]
async fn test_critical_failure_rolls_back() {
    let workspace = Workspace::new();
    let marker = workspace.touch("rollback-marker");
    assert!(marker.exists());

    let (pipeline, logger) = pipeline();
    let phase = campaign::deployment::Phase::new("risky", "Risky")
        .task(fail("break").critical(true))
        .task(echo("never", "unreachable"))
        .rollback_task(remove("cleanup", &marker));

    let result = pipeline.orchestrator().execute_phase(&phase).await;

    assert!(!result.success);
    assert!(result.rollback_performed);
    assert_eq!(result.tasks_executed, 1);
    assert!(!marker.exists(), "rollback task should delete the marker");
    assert_eq!(result.rollback_steps.len(), 1);
    assert!(result.rollback_steps[0].succeeded());
    assert_eq!(result.final_state, PhaseState::Failed);

    let lines = logger.lines().await;
    assert!(lines.iter().any(|l| l.contains("rollback_started")));
}

/// Test: Critical failure without rollback tasks
/// Given a critical failing task and no rollback tasks
/// When the phase runs
/// Then the phase fails without a rollback
#[tokio::test]
async fn test_critical_failure_without_rollback_tasks() {
    let (pipeline, _logger) = pipeline();
    let result = pipeline.orchestrator().execute_phase(&failing_phase("p")).await;
    assert!(!result.success);
    assert!(!result.rollback_performed);
    assert_eq!(result.tasks_executed, 1);
}

/// Test: Failing rollback is a warning
/// Given a rollback task that cannot succeed
/// When the rollback runs after a critical failure
/// Then the failure is recorded as a warning and later rollback steps still run
#[tokio::test]
async fn test_rollback_failure_is_best_effort() {
    let workspace = Workspace::new();
    let marker = workspace.touch("second");
    let (pipeline, _logger) = pipeline();
    let phase = campaign::deployment::Phase::new("p", "p")
        .task(fail("break").critical(true))
        .rollback_task(remove("first", &workspace.file("does-not-exist")))
        .rollback_task(remove("second", &marker));

    let result = pipeline.orchestrator().execute_phase(&phase).await;

    assert!(result.rollback_performed);
    assert_eq!(result.rollback_steps.len(), 2);
    assert!(!result.rollback_steps[0].succeeded());
    assert!(result.rollback_steps[1].succeeded());
    assert!(result.warnings.iter().any(|w| w.contains("Rollback task")));
    assert!(!marker.exists());
}

/// Test: Validation checks are advisory and always run
/// Given a critical failure and a failing validation check
/// When the phase runs
/// Then the validation result is recorded for every check
#[tokio::test]
async fn test_validation_runs_after_critical_failure() {
    let (pipeline, _logger) = pipeline();
    let phase = failing_phase("p")
        .validation_check(ValidationCheck::new("v1", "lint", "true").kind(ValidationKind::Lint))
        .validation_check(
            ValidationCheck::new("v2", "count", "echo")
                .args(["3 errors"])
                .validate_output(|out| out.starts_with("0 ")),
        );

    let result = pipeline.orchestrator().execute_phase(&phase).await;

    assert_eq!(result.validation_results.len(), 2);
    assert!(result.validation_results[0].success);
    assert!(!result.validation_results[1].success);
    assert_eq!(result.failed_validations().count(), 1);
}

/// Test: Validation failure alone does not fail the phase
#[tokio::test]
async fn test_validation_failure_does_not_flip_success() {
    let (pipeline, _logger) = pipeline();
    let phase = passing_phase("p").validation_check(ValidationCheck::new("v", "build", "false"));

    let result = pipeline.orchestrator().execute_phase(&phase).await;
    assert!(result.success);
    assert!(!result.validation_results[0].success);
}

/// Test: Custom success checks gate the phase
/// Given a phase with a passing and a failing custom check
/// When the phase runs
/// Then the phase fails with a named error
#[tokio::test]
async fn test_custom_check_failure_fails_phase() {
    let (pipeline, _logger) = pipeline();
    let criteria = SuccessCriteria::default()
        .with_custom_check(CustomCheck::new("always", || async { Ok(true) }))
        .with_custom_check(CustomCheck::new("no-any-types", || async { Ok(false) }))
        .with_custom_check(CustomCheck::new("broken", || async {
            Err(Error::Validation("check crashed".into()))
        }));
    let phase = passing_phase("p").success_criteria(criteria);

    let result = pipeline.orchestrator().execute_phase(&phase).await;

    assert!(!result.success);
    assert!(result.errors.iter().any(|e| e == "Custom check failed: no-any-types"));
    assert!(result.errors.iter().any(|e| e.starts_with("Custom check failed: broken")));
    assert!(!result.errors.iter().any(|e| e.contains("always")));
}

/// Test: The pipeline never continues past a failed phase
/// Given pipelines with the failure at every possible position
/// When each runs
/// Then the result count equals the 1-based index of the first failure
#[tokio::test]
async fn test_pipeline_stops_at_first_failure() {
    for len in 1..=4 {
        for fail_at in 0..=len {
            let phases: Vec<_> = (0..len)
                .map(|i| {
                    let id = format!("phase-{}", i);
                    if i == fail_at {
                        failing_phase(&id)
                    } else {
                        passing_phase(&id)
                    }
                })
                .collect();

            let (pipeline, _logger) = pipeline();
            let results = pipeline.execute_deployment(&phases).await.unwrap();
            let expected = if fail_at < len { fail_at + 1 } else { len };
            assert_eq!(results.len(), expected, "len={} fail_at={}", len, fail_at);

            let summary = DeploymentSummary::from_results(phases.len(), &results);
            assert_eq!(summary.succeeded, fail_at >= len);
        }
    }
}

/// Test: Audit log is chronological and persisted
/// Given a two-phase deployment logging to a file
/// When it completes
/// Then the file holds one line per event and save_deployment_log matches it
#[tokio::test]
async fn test_deployment_log_file_matches_memory() {
    let workspace = Workspace::new();
    let live = workspace.file("live.log");
    let logger = campaign::deployment::DeploymentLogger::with_file(&live);
    let pipeline = campaign::deployment::DeploymentPipeline::new(
        campaign::deployment::PhaseOrchestrator::new(logger.clone()),
    );

    pipeline
        .execute_deployment(&[passing_phase("one"), passing_phase("two")])
        .await
        .unwrap();

    let saved = workspace.file("saved.log");
    logger.save_deployment_log(&saved).await.unwrap();

    let live_text = std::fs::read_to_string(&live).unwrap();
    let saved_text = std::fs::read_to_string(&saved).unwrap();
    assert_eq!(live_text, saved_text);

    let lines: Vec<&str> = live_text.lines().collect();
    assert_eq!(lines.len(), logger.len().await);
    assert!(lines.first().unwrap().contains("pipeline_started"));
    assert!(lines.last().unwrap().contains("pipeline_completed"));
    let entries = logger.entries().await;
    assert!(entries.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

/// Test: Phases declared in TOML run through the pipeline
#[tokio::test]
async fn test_phase_file_deployment() {
    let workspace = Workspace::new();
    let marker = workspace.touch("generated.txt");
    let text = format!(
        r#"
        [[phases]]
        id = "prepare"
        name = "Prepare"

        [[phases.tasks]]
        id = "hello"
        name = "Hello"
        command = "echo"
        args = ["hello"]

        [[phases.validation_checks]]
        id = "greeting"
        name = "Greeting"
        command = "echo"
        args = ["hello world"]
        output_contains = "world"

        [[phases]]
        id = "apply"
        name = "Apply"
        prerequisites = ["prepare"]

        [[phases.tasks]]
        id = "transform"
        name = "Transform"
        command = "sh"
        args = ["-c", "exit 3"]
        critical = true
        retries = 2

        [[phases.rollback_tasks]]
        id = "undo"
        name = "Undo"
        command = "rm"
        args = ["{}"]

        [[phases]]
        id = "never"
        name = "Never"
        prerequisites = ["apply"]

        [[phases.tasks]]
        id = "skip"
        name = "Skip"
        command = "true"
        "#,
        marker.display()
    );

    let phases = PhaseFile::parse(&text)
        .unwrap()
        .into_phases(&DeploymentSettings::default())
        .unwrap();
    let (pipeline, _logger) = pipeline();
    let results = pipeline.execute_deployment(&phases).await.unwrap();

    assert_eq!(results.len(), 2);
    assert!(results[0].success);
    assert!(results[0].validation_results[0].success);
    assert!(!results[1].success);
    assert!(results[1].rollback_performed);
    assert!(results[1].errors[0].contains("2 attempt(s)"));
    assert!(!marker.exists());
}

/// Test: Duplicate task ids are rejected before anything runs
#[tokio::test]
async fn test_invalid_phase_list_is_an_error() {
    let (pipeline, logger) = pipeline();
    let phase = passing_phase("p").task(Task::new("work", "again", "true"));
    let err = pipeline.execute_deployment(&[phase]).await.unwrap_err();
    assert!(matches!(err, Error::InvalidPipeline(_)));
    assert!(logger.is_empty().await);
}
