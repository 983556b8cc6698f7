//! User-triggered commands: failures reach the notifier, successes touch disk.

mod common;

use common::{FakeApi, TEAM, app, session, write_descriptor};
use mirror_api::Environment;
use mirror_core::MirrorError;
use mirror_state::host::ContextId;
use mirror_state::models::{ENV_FILE, ProjectDescriptor};
use tempfile::TempDir;

#[tokio::test]
async fn test_link_folder_writes_descriptor_once() {
    let workspace = TempDir::new().unwrap();
    let outside = TempDir::new().unwrap();
    let api = FakeApi::new();
    api.add_project("prj_1", "web");

    let fixture = app(&[workspace.path()], api.clone(), Some(session()));
    fixture.app.bootstrap().await.unwrap();
    let commands = fixture.app.commands();

    assert!(
        commands
            .link_folder_to_project(outside.path(), "web", Some(TEAM))
            .await
            .unwrap()
    );
    let descriptor = ProjectDescriptor::read(outside.path()).await.unwrap().unwrap();
    assert_eq!(descriptor, ProjectDescriptor::new("prj_1", TEAM));
    assert_eq!(fixture.notifier.infos.lock().len(), 1);

    let lookups = api.calls("get_project_by_name_or_id");
    assert!(
        !commands
            .link_folder_to_project(outside.path(), "web", Some(TEAM))
            .await
            .unwrap()
    );
    assert_eq!(api.calls("get_project_by_name_or_id"), lookups);
    assert!(fixture.notifier.infos.lock()[1].contains("already linked"));
    assert!(fixture.notifier.errors.lock().is_empty());
}

#[tokio::test]
async fn test_link_folder_to_unknown_project() {
    let workspace = TempDir::new().unwrap();
    let fixture = app(&[workspace.path()], FakeApi::new(), Some(session()));
    fixture.app.bootstrap().await.unwrap();

    let folder = workspace.path().join("site");
    std::fs::create_dir_all(&folder).unwrap();
    let err = fixture
        .app
        .commands()
        .link_folder_to_project(&folder, "missing", None)
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(!ProjectDescriptor::exists(&folder).await);
    assert_eq!(fixture.notifier.errors.lock().len(), 1);
}

#[tokio::test]
async fn test_commands_need_a_session() {
    let workspace = TempDir::new().unwrap();
    let fixture = app(&[workspace.path()], FakeApi::new(), None);
    fixture.app.bootstrap().await.unwrap();

    let err = fixture
        .app
        .commands()
        .link_folder_to_project(workspace.path(), "web", None)
        .await
        .unwrap_err();
    assert!(matches!(err, MirrorError::Unauthenticated(_)));

    let err = fixture
        .app
        .commands()
        .pull_envs(workspace.path(), Environment::Development, false)
        .await
        .unwrap_err();
    assert!(matches!(err, MirrorError::Unauthenticated(_)));

    assert_eq!(
        *fixture.notifier.errors.lock(),
        vec![
            "Sign in to link a folder".to_string(),
            "Sign in to pull environment variables".to_string(),
        ]
    );
    assert_eq!(fixture.api.total_calls(), 0);
}

#[tokio::test]
async fn test_pull_envs_keeps_existing_file() {
    let workspace = TempDir::new().unwrap();
    let root = workspace.path().join("web");
    write_descriptor(&root, "prj_1");

    let api = FakeApi::new();
    api.add_project("prj_1", "web");
    api.set_env("API_URL", "https://example.com");

    let fixture = app(&[workspace.path()], api.clone(), Some(session()));
    fixture.app.bootstrap().await.unwrap();
    let commands = fixture.app.commands();

    let written = commands
        .pull_envs(&root, Environment::Development, false)
        .await
        .unwrap();
    assert_eq!(written, Some(root.join(ENV_FILE)));
    assert_eq!(
        std::fs::read_to_string(root.join(ENV_FILE)).unwrap(),
        "API_URL=\"https://example.com\""
    );

    api.set_env("API_URL", "https://changed.example.com");
    assert_eq!(
        commands
            .pull_envs(&root, Environment::Development, false)
            .await
            .unwrap(),
        None
    );
    assert_eq!(api.calls("pull_project_envs"), 1);

    commands
        .pull_envs(&root, Environment::Development, true)
        .await
        .unwrap();
    assert!(
        std::fs::read_to_string(root.join(ENV_FILE))
            .unwrap()
            .contains("changed.example.com")
    );
}

#[tokio::test]
async fn test_pull_envs_from_unlinked_folder() {
    let workspace = TempDir::new().unwrap();
    let fixture = app(&[workspace.path()], FakeApi::new(), Some(session()));
    fixture.app.bootstrap().await.unwrap();

    let err = fixture
        .app
        .commands()
        .pull_envs(workspace.path(), Environment::Preview, false)
        .await
        .unwrap_err();

    assert!(matches!(err, MirrorError::InvalidInput(_)));
    assert_eq!(fixture.notifier.errors.lock().len(), 1);
}

#[tokio::test]
async fn test_switch_focused_project() {
    let workspace = TempDir::new().unwrap();
    write_descriptor(&workspace.path().join("web"), "prj_1");
    write_descriptor(&workspace.path().join("docs"), "prj_2");

    let api = FakeApi::new();
    api.add_project("prj_1", "web");
    api.add_project("prj_2", "docs");
    api.add_deployment("prj_1", "dpl_1", "READY", 1);
    api.add_deployment("prj_2", "dpl_2", "ERROR", 2);

    let fixture = app(&[workspace.path()], api, Some(session()));
    let app = &fixture.app;
    app.bootstrap().await.unwrap();
    assert_eq!(app.status_bar().view().text, "Error");

    app.commands().switch_focused_project(Some("prj_1")).await.unwrap();
    assert_eq!(
        app.context_keys().get_str(ContextId::FocusedProjectId).as_deref(),
        Some("prj_1")
    );
    app.status_bar().refresh().await;
    assert_eq!(app.status_bar().view().text, "Ready");

    let err = app
        .commands()
        .switch_focused_project(Some("prj_404"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(
        app.context_keys().get_str(ContextId::FocusedProjectId).as_deref(),
        Some("prj_1")
    );

    app.commands().switch_focused_project(None).await.unwrap();
    assert_eq!(app.context_keys().get_str(ContextId::FocusedProjectId), None);
}
