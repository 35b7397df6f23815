//! Admin actions against the in-memory runtime

use indico_config::{Channel, OperatorConfig};
use indico_coordination::{MemoryRecordStore, ReplicaRole, SingletonManager};
use indico_core::{
    ActionError, AdminActions, ExecOutput, MemoryDependencySource, MemoryRuntime,
    ReconcileContext, MAX_ANONYMIZE_EMAILS,
};
use indico_test_utils::{cache_payload, database_payload, queue_payload, replica, DB_URI};
use indico_topology::containers;
use pretty_assertions::assert_eq;
use std::sync::Arc;

struct Fixture {
    sources: MemoryDependencySource,
    runtime: MemoryRuntime,
    store: MemoryRecordStore,
    actions: AdminActions,
    context: ReconcileContext,
}

fn fixture() -> Fixture {
    let sources = MemoryDependencySource::new();
    sources.set(Channel::Database, database_payload());
    sources.set(Channel::Cache, cache_payload());
    sources.set(Channel::Queue, queue_payload());
    let runtime = MemoryRuntime::new();
    let store = MemoryRecordStore::new();
    let actions = AdminActions::new(
        Arc::new(sources.clone()),
        Arc::new(runtime.clone()),
        SingletonManager::new(Arc::new(store.clone())),
    );
    Fixture {
        sources,
        runtime,
        store,
        actions,
        context: ReconcileContext::new(replica(0), ReplicaRole::Coordinator),
    }
}

#[tokio::test]
async fn add_admin_runs_autocreate_with_service_environment() {
    let f = fixture();
    f.runtime.respond(
        "/usr/local/bin/indico autocreate admin",
        ExecOutput::success("Admin created"),
    );

    let report = f
        .actions
        .add_admin(&f.context, "admin@example.com", "s3cret")
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.user, "admin@example.com");
    assert_eq!(report.output, "Admin created");

    let executed = f.runtime.executed();
    let (container, request) = executed.last().unwrap();
    assert_eq!(container, containers::INDICO);
    assert_eq!(
        request.command_line(),
        "/usr/local/bin/indico autocreate admin admin@example.com s3cret"
    );
    assert_eq!(request.user.as_deref(), Some("indico"));
    assert_eq!(request.working_dir.as_deref(), Some("/srv/indico"));
    assert_eq!(request.environment["DB_URI"], DB_URI);
    assert_eq!(f.store.write_count(), 0);
}

#[tokio::test]
async fn add_admin_failure_carries_output() {
    let f = fixture();
    f.runtime.respond(
        "/usr/local/bin/indico autocreate admin",
        ExecOutput::failure(1, "user exists"),
    );

    let err = f
        .actions
        .add_admin(&f.context, "admin@example.com", "s3cret")
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Failed to create admin admin@example.com: user exists");
}

#[tokio::test]
async fn anonymize_joins_outputs() {
    let f = fixture();
    f.runtime.respond(
        "/usr/local/bin/indico anonymize user a@example.com",
        ExecOutput::success("anonymized a\n"),
    );
    f.runtime.respond(
        "/usr/local/bin/indico anonymize user b@example.com",
        ExecOutput::success("anonymized b\n"),
    );

    let report = f
        .actions
        .anonymize_users(&f.context, "a@example.com, b@example.com")
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.user, "a@example.com,b@example.com");
    assert_eq!(report.output, "anonymized a,anonymized b");
    assert_eq!(f.runtime.executed().len(), 2);
}

#[tokio::test]
async fn anonymize_reports_partial_failure() {
    let f = fixture();
    f.runtime.respond(
        "/usr/local/bin/indico anonymize user missing@example.com",
        ExecOutput::failure(1, "no such user"),
    );

    let report = f
        .actions
        .anonymize_users(&f.context, "missing@example.com,ok@example.com")
        .await
        .unwrap();

    assert_eq!(
        report.failure.as_deref(),
        Some("Failed to anonymize one or more users, please verify the results.")
    );
    assert_eq!(report.output, "no such user,");
    assert_eq!(f.runtime.executed().len(), 2);
}

#[tokio::test]
async fn anonymize_rejects_long_lists_up_front() {
    let f = fixture();
    let emails: Vec<String> = (0..=MAX_ANONYMIZE_EMAILS)
        .map(|i| format!("user{i}@example.com"))
        .collect();

    let err = f
        .actions
        .anonymize_users(&f.context, &emails.join(","))
        .await
        .unwrap_err();

    assert!(matches!(err, ActionError::Rejected(_)));
    assert_eq!(
        err.to_string(),
        "Failed to anonymize user: List of more than 50 emails are not allowed"
    );
    assert!(f.runtime.executed().is_empty());
}

#[tokio::test]
async fn actions_need_a_reachable_container() {
    let f = fixture();
    f.runtime.set_reachable(containers::INDICO, false);

    let err = f
        .actions
        .add_admin(&f.context, "admin@example.com", "s3cret")
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Waiting to be able to connect to workload container"
    );
}

#[tokio::test]
async fn actions_need_mandatory_dependencies() {
    let f = fixture();
    f.sources.remove(Channel::Database);

    let err = f
        .actions
        .anonymize_users(&f.context, "a@example.com")
        .await
        .unwrap_err();

    assert!(matches!(err, ActionError::NotReady(_)));
    assert_eq!(err.to_string(), "Waiting for database availability");
}

#[tokio::test]
async fn refresh_pulls_customization_and_upgrades_plugins() {
    let mut f = fixture();
    f.context.options = OperatorConfig::new()
        .with_external_plugins("indico-plugin-a")
        .with_customization_sources("https://git.example.com/custom.git");
    f.runtime.respond("git pull", ExecOutput::success("Already up to date."));
    f.runtime.respond("python3 -m pip install", ExecOutput::success("Requirement already satisfied"));

    let output = f.actions.refresh_external_resources(&f.context).await.unwrap();

    assert_eq!(output, "Already up to date.\nRequirement already satisfied");
    let lines: Vec<String> = f
        .runtime
        .executed()
        .iter()
        .map(|(_, request)| request.command_line())
        .collect();
    assert_eq!(
        lines,
        vec!["git pull", "python3 -m pip install --upgrade indico-plugin-a"]
    );
    let executed = f.runtime.executed();
    assert_eq!(executed[0].1.working_dir.as_deref(), Some("/srv/indico/custom"));
}

#[tokio::test]
async fn refresh_without_sources_runs_nothing() {
    let f = fixture();

    let output = f.actions.refresh_external_resources(&f.context).await.unwrap();

    assert_eq!(output, "");
    assert!(f.runtime.executed().is_empty());
}

#[tokio::test]
async fn failed_pull_fails_the_refresh() {
    let mut f = fixture();
    f.context.options = OperatorConfig::new().with_customization_sources("https://git.example.com/custom.git");
    f.runtime.respond("git pull", ExecOutput::failure(1, ""));

    let err = f.actions.refresh_external_resources(&f.context).await.unwrap_err();

    assert!(matches!(err, ActionError::Failed(_)));
    assert_eq!(f.runtime.executed().len(), 1);
}
