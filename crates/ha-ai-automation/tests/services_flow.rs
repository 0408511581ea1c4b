//! End-to-end tests through the service registry
//!
//! The integration is set up against a real service registry, notification
//! component, frontend registry and `automations.yaml` in a temp dir, with a
//! canned language model.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ha_ai_automation::error::GeneratorResult;
use ha_ai_automation::{
    async_unload_entry, setup_with_generator, AiAutomationConfig, CompletionRequest, EntryOptions,
    FlowResult, IntegrationContext, LoadedEntry, PersistenceMode, TextGenerator,
};
use ha_automation::AutomationsFile;
use ha_components::{register_notification_services, FrontendRegistry, PersistentNotificationManager};
use ha_core::{Context, SupportsResponse};
use ha_registries::{Registries, Storable, Storage};
use ha_service_registry::{ServiceError, ServiceRegistry};
use serde_json::json;
use tempfile::TempDir;

const REPLY: &str = "```yaml\n- alias: Hallway motion\n  trigger:\n    - platform: state\n      entity_id: binary_sensor.hallway_motion\n      to: 'on'\n  action:\n    - service: light.turn_on\n      target:\n        entity_id: light.hallway\n```\n";

struct CannedGenerator;

#[async_trait]
impl TextGenerator for CannedGenerator {
    async fn generate(&self, _request: &CompletionRequest) -> GeneratorResult<String> {
        Ok(REPLY.to_string())
    }
}

/// Remembers the model of every request
#[derive(Default)]
struct ModelRecorder(Mutex<Vec<String>>);

#[async_trait]
impl TextGenerator for ModelRecorder {
    async fn generate(&self, request: &CompletionRequest) -> GeneratorResult<String> {
        self.0.lock().unwrap().push(request.model.clone());
        Ok(REPLY.to_string())
    }
}

struct Host {
    dir: TempDir,
    ctx: IntegrationContext,
    notifications: Arc<PersistentNotificationManager>,
}

fn host() -> Host {
    let dir = TempDir::new().unwrap();
    let services = Arc::new(ServiceRegistry::new());
    let notifications = Arc::new(PersistentNotificationManager::new());
    register_notification_services(&services, notifications.clone());

    let ctx = IntegrationContext {
        config_dir: dir.path().to_path_buf(),
        services,
        registries: Arc::new(Registries::new(dir.path())),
        frontend: Arc::new(FrontendRegistry::new()),
        automations_file: Arc::new(AutomationsFile::new(dir.path().join("automations.yaml"))),
    };
    Host {
        dir,
        ctx,
        notifications,
    }
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

#[tokio::test]
async fn test_create_then_fetch_yaml() {
    let host = host();
    host.ctx
        .registries
        .entities
        .register("demo", "binary_sensor.hallway_motion", None);
    host.ctx.registries.entities.register("demo", "light.hallway", None);

    let config = AiAutomationConfig {
        persistence: PersistenceMode::File,
        ..Default::default()
    };
    setup_with_generator(&host.ctx, config, Arc::new(CannedGenerator)).unwrap();

    let empty = host
        .ctx
        .services
        .call(
            "ai_automation_creator",
            "get_automation_yaml",
            json!({}),
            Context::new(),
            true,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(empty, json!({"yaml": ""}));

    let outcome = host
        .ctx
        .services
        .call(
            "ai_automation_creator",
            "create_automation",
            json!({"description": "Hallway light on motion"}),
            Context::new(),
            true,
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome["saved"], true);
    assert_eq!(outcome["persisted"], "file");
    assert_eq!(outcome["missing_entities"], json!([]));

    let text = read(&host.dir.path().join("automations.yaml"));
    assert!(text.starts_with("# Automations created by AI Automation Creator\n"));
    assert!(text.contains("# AI Generated Automation\n- id: "));
    assert!(text.contains("id: state_hallway_motion"));
    assert!(text.contains("choose:"));

    let saved = host.ctx.automations_file.read_all().await.unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(
        saved[0].id().as_deref(),
        outcome["automation_id"].as_str()
    );

    let latest = host
        .ctx
        .services
        .call(
            "ai_automation_creator",
            "get_automation_yaml",
            json!({}),
            Context::new(),
            true,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(latest["yaml"], outcome["yaml"]);

    let by_request = host
        .ctx
        .services
        .call(
            "ai_automation_creator",
            "get_automation_yaml",
            json!({"request_id": outcome["request_id"]}),
            Context::new(),
            true,
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_request["yaml"], outcome["yaml"]);

    assert!(host
        .notifications
        .get("ai_automation_creator_success")
        .is_some());
}

#[tokio::test]
async fn test_empty_description_rejected() {
    let host = host();
    setup_with_generator(&host.ctx, AiAutomationConfig::default(), Arc::new(CannedGenerator))
        .unwrap();

    for data in [json!({}), json!({"description": ""}), json!({"description": "   "})] {
        let result = host
            .ctx
            .services
            .call(
                "ai_automation_creator",
                "create_automation",
                data,
                Context::new(),
                false,
            )
            .await;
        assert!(matches!(result, Err(ServiceError::InvalidData(_))));
    }

    assert!(!host.dir.path().join("automations.yaml").exists());
    assert!(host.notifications.is_empty());
}

#[tokio::test]
async fn test_service_persistence_uses_host_registration() {
    let host = host();
    host.ctx.services.register(
        "automation",
        "create",
        |_call| async { Ok(None) },
        None,
        SupportsResponse::None,
    );
    setup_with_generator(&host.ctx, AiAutomationConfig::default(), Arc::new(CannedGenerator))
        .unwrap();

    let outcome = host
        .ctx
        .services
        .call(
            "ai_automation_creator",
            "create_automation",
            json!({"description": "Hallway light on motion"}),
            Context::new(),
            true,
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome["persisted"], "registered");
    assert_eq!(
        outcome["missing_entities"],
        json!(["binary_sensor.hallway_motion", "light.hallway"])
    );
    assert!(!host.dir.path().join("automations.yaml").exists());
}

#[tokio::test]
async fn test_get_yaml_unknown_request_id() {
    let host = host();
    setup_with_generator(&host.ctx, AiAutomationConfig::default(), Arc::new(CannedGenerator))
        .unwrap();

    let result = host
        .ctx
        .services
        .call(
            "ai_automation_creator",
            "get_automation_yaml",
            json!({"request_id": "01J00000000000000000000000"}),
            Context::new(),
            true,
        )
        .await;
    assert!(matches!(result, Err(ServiceError::InvalidData(_))));
}

#[tokio::test]
async fn test_unload_removes_services_and_panel() {
    let host = host();
    setup_with_generator(&host.ctx, AiAutomationConfig::default(), Arc::new(CannedGenerator))
        .unwrap();
    assert!(host.ctx.frontend.panel("ai_automation_creator").is_some());

    assert!(async_unload_entry(&host.ctx).await);
    assert!(!host
        .ctx
        .services
        .has_service("ai_automation_creator", "create_automation"));
    assert!(host.ctx.frontend.panel("ai_automation_creator").is_none());
    assert!(host.ctx.frontend.extra_js_urls().is_empty());

    // Setting up again after unload works
    setup_with_generator(&host.ctx, AiAutomationConfig::default(), Arc::new(CannedGenerator))
        .unwrap();
}

#[tokio::test]
async fn test_options_flow_stores_options_and_reloads() {
    let host = host();
    let recorder = Arc::new(ModelRecorder::default());
    let config = AiAutomationConfig {
        persistence: PersistenceMode::File,
        ..Default::default()
    };
    let entry = LoadedEntry::setup_with_generator(host.ctx.clone(), config, recorder.clone())
        .await
        .unwrap();
    assert_eq!(entry.creator().config().model, "gpt-3.5-turbo");

    match entry.options_flow(None).await.unwrap() {
        FlowResult::Form { step_id, data_schema, .. } => {
            assert_eq!(step_id, "init");
            assert_eq!(data_schema[0].default, Some(json!("gpt-3.5-turbo")));
        }
        other => panic!("expected form, got {:?}", other),
    }

    let result = entry
        .options_flow(Some(json!({"model": "gpt-4o-mini"})))
        .await
        .unwrap();
    assert!(result.entry_options().is_some());
    assert_eq!(entry.creator().config().model, "gpt-4o-mini");

    host.ctx
        .services
        .call(
            "ai_automation_creator",
            "create_automation",
            json!({"description": "Hallway light on motion"}),
            Context::new(),
            false,
        )
        .await
        .unwrap();
    assert_eq!(*recorder.0.lock().unwrap(), vec!["gpt-4o-mini".to_string()]);

    let stored: EntryOptions = Storage::new(host.dir.path())
        .load_data()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.model.as_deref(), Some("gpt-4o-mini"));
    assert!(host
        .dir
        .path()
        .join(".storage")
        .join(EntryOptions::KEY)
        .exists());

    // A second setup picks the stored options up
    async_unload_entry(&host.ctx).await;
    let again = LoadedEntry::setup_with_generator(
        host.ctx.clone(),
        AiAutomationConfig::default(),
        Arc::new(CannedGenerator),
    )
    .await
    .unwrap();
    assert_eq!(again.creator().config().model, "gpt-4o-mini");
}

#[tokio::test]
async fn test_options_flow_rejects_bad_input_without_reload() {
    let host = host();
    let entry = LoadedEntry::setup_with_generator(
        host.ctx.clone(),
        AiAutomationConfig::default(),
        Arc::new(CannedGenerator),
    )
    .await
    .unwrap();

    let result = entry.options_flow(Some(json!({"model": 5}))).await.unwrap();
    assert_eq!(
        result.errors().unwrap().get("base").map(String::as_str),
        Some("unknown")
    );
    assert!(!host.dir.path().join(".storage").join(EntryOptions::KEY).exists());
    assert_eq!(entry.creator().config().model, "gpt-3.5-turbo");
}
