//! End-to-end behavior of the cache graph over a fake API and real project trees.

mod common;

use common::{FakeApi, TEAM, app, descriptor_path, session, wait_for, write_descriptor};
use futures::future::join_all;
use mirror_state::caches::{
    DeploymentsEvent, FileChangeType, GetFileOptions, LinkedProjectsEvent, LocalProjectsEvent,
    WatchedFileEvent,
};
use mirror_state::host::ContextId;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

#[tokio::test]
async fn test_watched_events_apply_in_submission_order() {
    let workspace = TempDir::new().unwrap();
    let roots: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|name| workspace.path().join(name))
        .collect();
    for (index, root) in roots.iter().enumerate() {
        write_descriptor(root, &format!("prj_{index}"));
    }

    let fixture = app(&[workspace.path()], FakeApi::new(), None);
    let local = fixture.app.local_projects().clone();
    let mut events = local.subscribe();

    let submitted = roots.iter().map(|root| {
        let event = WatchedFileEvent::new(FileChangeType::Created, descriptor_path(root)).unwrap();
        local.enqueue_watched_file_event(event)
    });
    let accepted: Vec<bool> = join_all(submitted)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();
    assert_eq!(accepted, vec![true, true, true]);

    // A second create for a known root is a duplicate notification.
    let duplicate = WatchedFileEvent::new(FileChangeType::Created, descriptor_path(&roots[0])).unwrap();
    assert!(!local.enqueue_watched_file_event(duplicate).await.unwrap());

    let mut added = Vec::new();
    let mut will_change = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            LocalProjectsEvent::WillChange => will_change += 1,
            LocalProjectsEvent::DidChange(delta) => {
                assert_eq!(delta.added.len(), 1);
                assert!(delta.removed.is_empty() && delta.changed.is_empty());
                added.push(delta.added[0].root.clone());
            }
        }
    }
    assert_eq!(will_change, 3);
    assert_eq!(added, roots);

    let order: Vec<_> = local.projects().into_iter().map(|project| project.root).collect();
    assert_eq!(order, roots);
}

#[tokio::test]
async fn test_sign_out_clears_links_without_remote_calls() {
    let workspace = TempDir::new().unwrap();
    write_descriptor(&workspace.path().join("web"), "prj_1");
    write_descriptor(&workspace.path().join("docs"), "prj_2");

    let api = FakeApi::new();
    api.add_project("prj_1", "web");
    api.add_project("prj_2", "docs");
    api.add_deployment("prj_1", "dpl_1", "READY", 1);
    api.add_deployment("prj_2", "dpl_2", "READY", 2);

    let fixture = app(&[workspace.path()], api.clone(), Some(session()));
    let app = &fixture.app;
    app.bootstrap().await.unwrap();
    assert_eq!(app.linked_projects().projects().len(), 2);
    assert_eq!(app.projects().projects().len(), 2);
    assert_eq!(app.deployments().deployments().len(), 2);

    let calls_before = api.total_calls();
    let mut linked_events = app.linked_projects().subscribe();
    let mut deployment_events = app.deployments().subscribe();

    app.auth().set_session(None).await.unwrap();
    assert!(app.linked_projects().projects().is_empty());

    wait_for(&mut linked_events, |event| *event == LinkedProjectsEvent::DidChange).await;
    assert!(app.linked_projects().projects().is_empty());

    wait_for(&mut deployment_events, |event| *event == DeploymentsEvent::DidChange).await;
    assert!(app.projects().projects().is_empty());
    assert!(app.deployments().deployments().is_empty());
    assert_eq!(api.total_calls(), calls_before);
}

#[tokio::test]
async fn test_creates_that_add_nothing_are_not_announced() {
    let workspace = TempDir::new().unwrap();
    let excluded = workspace.path().join("node_modules").join("dep");
    write_descriptor(&excluded, "prj_1");
    let broken = workspace.path().join("broken");
    std::fs::create_dir_all(broken.join(".vercel")).unwrap();
    std::fs::write(descriptor_path(&broken), "not json").unwrap();
    let empty = workspace.path().join("empty");
    std::fs::create_dir_all(empty.join(".vercel")).unwrap();

    let fixture = app(&[workspace.path()], FakeApi::new(), None);
    let local = fixture.app.local_projects().clone();
    fixture.app.bootstrap().await.unwrap();
    assert!(local.projects().is_empty());
    let mut events = local.subscribe();

    for root in [&excluded, &broken, &empty] {
        let created = WatchedFileEvent::new(FileChangeType::Created, descriptor_path(root)).unwrap();
        assert!(!local.enqueue_watched_file_event(created).await.unwrap());
    }
    assert!(local.reload().await.unwrap().is_empty());

    assert!(events.try_recv().is_err());
    assert!(local.projects().is_empty());
}

#[tokio::test]
async fn test_project_removed_remotely_unlinks_it() {
    let workspace = TempDir::new().unwrap();
    let root = workspace.path().join("web");
    write_descriptor(&root, "prj_1");

    let api = FakeApi::new();
    api.add_project("prj_1", "web");

    let fixture = app(&[workspace.path()], api.clone(), Some(session()));
    let app = &fixture.app;
    app.bootstrap().await.unwrap();
    assert_eq!(app.linked_projects().projects().len(), 1);

    api.remove_project("prj_1");
    let mut linked_events = app.linked_projects().subscribe();
    let mut project_changes = app.projects().subscribe();

    let changed = WatchedFileEvent::new(FileChangeType::Changed, descriptor_path(&root)).unwrap();
    assert!(app.local_projects().enqueue_watched_file_event(changed).await.unwrap());

    wait_for(&mut linked_events, |event| *event == LinkedProjectsEvent::DidChange).await;
    assert!(app.linked_projects().projects().is_empty());
    assert_eq!(app.local_projects().projects().len(), 1);

    let delta = wait_for(&mut project_changes, |_| true).await;
    assert_eq!(delta.removed.len(), 1);
    assert_eq!(delta.removed[0].id, "prj_1");
    assert!(app.projects().projects().is_empty());
}

#[tokio::test]
async fn test_log_is_cached_only_once_terminal() {
    let workspace = TempDir::new().unwrap();
    write_descriptor(&workspace.path().join("web"), "prj_1");

    let api = FakeApi::new();
    api.add_project("prj_1", "web");
    api.add_deployment("prj_1", "dpl_1", "BUILDING", 1_000);
    api.set_events("dpl_1", &[(1_000, "\u{1b}[32mInstalling\u{1b}[0m"), (2_000, "Building")]);

    let fixture = app(&[workspace.path()], api.clone(), Some(session()));
    let app = &fixture.app;
    app.bootstrap().await.unwrap();
    assert_eq!(app.status_bar().view().text, "Building");

    app.commands().select_deployment(Some("dpl_1")).await.unwrap();
    let options = GetFileOptions {
        team_id: TEAM.to_string(),
        project_id: "prj_1".to_string(),
        deployment_id: "dpl_1".to_string(),
        file_path: "build.log".to_string(),
        api_version: None,
    };

    let first = app.content().get_file(options.clone()).await.unwrap().unwrap();
    app.content().get_file(options.clone()).await.unwrap().unwrap();
    assert_eq!(api.calls("get_deployment_events"), 2);
    assert_eq!((first.ctime, first.mtime), (1_000, 2_000));
    let text = String::from_utf8(first.bytes).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with(" Installing"));
    assert!(lines[1].ends_with(" Building"));
    assert!(!text.contains('\u{1b}'));

    api.set_deployment_state("dpl_1", "READY");
    app.deployments().refresh_deployment("dpl_1").await.unwrap();

    app.content().get_file(options.clone()).await.unwrap().unwrap();
    assert_eq!(api.calls("get_deployment_events"), 3);
    app.content().get_file(options).await.unwrap().unwrap();
    assert_eq!(api.calls("get_deployment_events"), 3);
    assert_eq!(app.content().cached_file_count(), 1);
}

#[tokio::test]
async fn test_output_files_are_cached_until_selection_changes() {
    let workspace = TempDir::new().unwrap();
    write_descriptor(&workspace.path().join("web"), "prj_1");

    let api = FakeApi::new();
    api.add_project("prj_1", "web");
    api.add_deployment("prj_1", "dpl_1", "BUILDING", 1);
    api.add_deployment("prj_1", "dpl_2", "READY", 2);
    api.set_file("dpl_1", "index.html", b"<html></html>");

    let fixture = app(&[workspace.path()], api.clone(), Some(session()));
    let app = &fixture.app;
    app.bootstrap().await.unwrap();
    app.commands().select_deployment(Some("dpl_1")).await.unwrap();

    let options = GetFileOptions {
        team_id: TEAM.to_string(),
        project_id: "prj_1".to_string(),
        deployment_id: "dpl_1".to_string(),
        file_path: "/index.html".to_string(),
        api_version: Some("v6".to_string()),
    };
    let content = app.content().get_file(options.clone()).await.unwrap().unwrap();
    assert_eq!(content.bytes, b"<html></html>");
    assert_eq!(content.size, 13);
    app.content().get_file(options.clone()).await.unwrap();
    assert_eq!(api.calls("get_deployment_file_content_v6"), 1);
    assert_eq!(api.calls("get_deployment_file_content"), 0);

    app.commands().select_deployment(Some("dpl_2")).await.unwrap();
    assert_eq!(app.content().cached_file_count(), 0);
    assert_eq!(
        app.context_keys().get_str(ContextId::SelectedDeploymentForFiles),
        Some(app.deployments().get("dpl_2").unwrap().hash_path)
    );

    app.content().get_file(options).await.unwrap();
    assert_eq!(api.calls("get_deployment_file_content_v6"), 2);
}

/// Records the level and fields of every event.
#[derive(Clone, Default)]
struct EventRecorder {
    events: Arc<Mutex<Vec<(Level, HashMap<String, String>)>>>,
}

impl EventRecorder {
    fn at(&self, level: Level) -> Vec<HashMap<String, String>> {
        self.events
            .lock()
            .iter()
            .filter(|(recorded, _)| *recorded == level)
            .map(|(_, fields)| fields.clone())
            .collect()
    }
}

#[derive(Default)]
struct Fields(HashMap<String, String>);

impl Visit for Fields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for EventRecorder {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = Fields::default();
        event.record(&mut fields);
        self.events.lock().push((*event.metadata().level(), fields.0));
    }
}

#[tokio::test]
async fn test_one_failing_project_does_not_block_the_others() {
    let recorder = EventRecorder::default();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(recorder.clone()));

    let workspace = TempDir::new().unwrap();
    let api = FakeApi::new();
    for n in 1..=3 {
        let id = format!("prj_{n}");
        write_descriptor(&workspace.path().join(format!("app{n}")), &id);
        api.add_project(&id, &format!("app{n}"));
        api.add_deployment(&id, &format!("dpl_{n}"), "READY", n);
    }
    api.fail("list_deployments_by_project_id", "prj_2");

    let fixture = app(&[workspace.path()], api.clone(), Some(session()));
    fixture.app.bootstrap().await.unwrap();

    let projects: BTreeSet<String> = fixture
        .app
        .deployments()
        .deployments()
        .into_iter()
        .map(|deployment| deployment.project.id)
        .collect();
    assert_eq!(projects, BTreeSet::from(["prj_1".to_string(), "prj_3".to_string()]));
    assert_eq!(fixture.app.projects().projects().len(), 3);

    let errors = recorder.at(Level::ERROR);
    let about_prj_2: Vec<_> = errors
        .iter()
        .filter(|fields| fields.get("id").map(String::as_str) == Some("prj_2"))
        .collect();
    assert_eq!(about_prj_2.len(), 1);
    assert_eq!(about_prj_2[0].get("component").map(String::as_str), Some("Deployments"));
}

#[tokio::test]
async fn test_load_logs_carry_structured_fields() {
    let recorder = EventRecorder::default();
    let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(recorder.clone()));

    let workspace = TempDir::new().unwrap();
    write_descriptor(&workspace.path().join("web"), "prj_1");
    write_descriptor(&workspace.path().join("docs"), "prj_2");
    let api = FakeApi::new();
    api.add_project("prj_1", "web");
    api.add_project("prj_2", "docs");
    api.add_deployment("prj_1", "dpl_1", "READY", 1);

    let fixture = app(&[workspace.path()], api, Some(session()));
    fixture.app.bootstrap().await.unwrap();

    let debug = recorder.at(Level::DEBUG);
    let find = |message: &str| {
        debug
            .iter()
            .find(|fields| fields.get("message").map(String::as_str) == Some(message))
            .cloned()
            .unwrap_or_else(|| panic!("no {message:?} event"))
    };

    let local = find("Loaded local projects");
    assert_eq!(local.get("component").map(String::as_str), Some("LocalProjects"));
    assert_eq!(local.get("count").map(String::as_str), Some("2"));

    let deployments = find("Loaded deployments");
    assert_eq!(deployments.get("component").map(String::as_str), Some("Deployments"));
    assert_eq!(deployments.get("count").map(String::as_str), Some("1"));
}

#[tokio::test]
async fn test_reload_is_idempotent() {
    let workspace = TempDir::new().unwrap();
    write_descriptor(&workspace.path().join("web"), "prj_1");
    write_descriptor(&workspace.path().join("apps").join("docs"), "prj_2");
    write_descriptor(&workspace.path().join("node_modules").join("dep"), "prj_3");

    let fixture = app(&[workspace.path()], FakeApi::new(), None);
    let local = fixture.app.local_projects().clone();
    fixture.app.bootstrap().await.unwrap();

    let ids = || -> BTreeSet<String> { local.projects().into_iter().map(|project| project.id).collect() };
    let loaded = ids();
    assert_eq!(loaded.len(), 2);

    assert!(local.reload().await.unwrap().is_empty());
    assert_eq!(ids(), loaded);
    assert!(local.reload().await.unwrap().is_empty());
    assert_eq!(ids(), loaded);
}

#[tokio::test]
async fn test_filter_change_reloads_deployments() {
    let workspace = TempDir::new().unwrap();
    write_descriptor(&workspace.path().join("web"), "prj_1");

    let api = FakeApi::new();
    api.add_project("prj_1", "web");
    api.add_deployment("prj_1", "dpl_1", "READY", 1);

    let fixture = app(&[workspace.path()], api.clone(), Some(session()));
    let app = &fixture.app;
    app.bootstrap().await.unwrap();
    assert_eq!(api.calls("list_deployments_by_project_id"), 1);

    let mut events = app.deployments().subscribe();
    let mut filters = app.filters().filters();
    filters.status.retain(|state| state.as_str() != "ERROR");
    assert!(app.commands().update_filters(filters.clone()).await.unwrap());
    assert!(!app.commands().update_filters(filters).await.unwrap());

    wait_for(&mut events, |event| *event == DeploymentsEvent::DidChange).await;
    assert_eq!(api.calls("list_deployments_by_project_id"), 2);
    assert!(app.context_keys().get_bool(ContextId::DeploymentsFiltered));
}

#[tokio::test]
async fn test_bootstrap_signed_out() {
    let workspace = TempDir::new().unwrap();
    let api = FakeApi::new();
    let fixture = app(&[workspace.path()], api.clone(), None);
    let app = &fixture.app;

    app.bootstrap().await.unwrap();

    assert!(app.context_keys().get_bool(ContextId::IsReady));
    assert!(app.context_keys().get_bool(ContextId::NoProjectsFound));
    assert!(!app.context_keys().get_bool(ContextId::IsAuthenticated));
    assert!(!app.status_bar().view().visible);
    assert_eq!(app.status_bar().view().text, "N/A");
    assert_eq!(api.total_calls(), 0);

    app.shutdown();
}
