//! Handing generated automations to the host

use std::sync::Arc;

use async_trait::async_trait;
use ha_automation::{AppendComments, AutomationDocument, AutomationsFile};
use ha_core::{Context, AUTOMATION_DOMAIN};
use ha_service_registry::{ServiceError, ServiceRegistry};
use serde::Serialize;
use tracing::{info, warn};

use crate::constants::{ENTRY_COMMENT, FILE_HEADER};
use crate::error::{SinkError, SinkResult};

/// How an automation reached the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Persisted {
    /// Registered through `automation.create`
    Registered,
    /// Appended to `automations.yaml`
    File,
}

/// Document in, success or failure out
#[async_trait]
pub trait AutomationRegistry: Send + Sync {
    async fn register(&self, doc: &AutomationDocument, context: &Context) -> SinkResult<Persisted>;
}

/// Appends to `automations.yaml`
pub struct FileAutomationSink {
    file: Arc<AutomationsFile>,
}

impl FileAutomationSink {
    pub fn new(file: Arc<AutomationsFile>) -> Self {
        Self { file }
    }

    async fn append(&self, doc: &AutomationDocument) -> Result<(), ha_automation::AutomationError> {
        self.file
            .append(
                doc,
                Some(AppendComments {
                    file_header: FILE_HEADER,
                    entry: ENTRY_COMMENT,
                }),
            )
            .await
    }
}

#[async_trait]
impl AutomationRegistry for FileAutomationSink {
    async fn register(&self, doc: &AutomationDocument, _context: &Context) -> SinkResult<Persisted> {
        self.append(doc).await?;
        info!(
            "Saved automation {} to {}",
            doc.display_name(),
            self.file.path().display()
        );
        Ok(Persisted::File)
    }
}

/// Registers through `automation.create`
///
/// When the host has no such service or the call fails, the automation is
/// appended to `automations.yaml` and `automation.reload` is called instead.
/// An automation the host rejects as invalid is not written anywhere.
pub struct ServiceAutomationSink {
    services: Arc<ServiceRegistry>,
    fallback: FileAutomationSink,
}

impl ServiceAutomationSink {
    pub fn new(services: Arc<ServiceRegistry>, file: Arc<AutomationsFile>) -> Self {
        Self {
            services,
            fallback: FileAutomationSink::new(file),
        }
    }
}

#[async_trait]
impl AutomationRegistry for ServiceAutomationSink {
    async fn register(&self, doc: &AutomationDocument, context: &Context) -> SinkResult<Persisted> {
        let data = doc.to_json()?;

        let service_error = match self
            .services
            .call(AUTOMATION_DOMAIN, "create", data, context.child(), false)
            .await
        {
            Ok(_) => {
                info!("Registered automation {}", doc.display_name());
                return Ok(Persisted::Registered);
            }
            Err(e @ (ServiceError::NotFound { .. } | ServiceError::CallFailed(_))) => e,
            Err(e) => {
                warn!("Host rejected automation {}: {}", doc.display_name(), e);
                return Err(SinkError::Service(e));
            }
        };

        warn!(
            "automation.create failed ({}), writing {} to automations.yaml",
            service_error,
            doc.display_name()
        );

        if let Err(file) = self.fallback.append(doc).await {
            return Err(SinkError::Fallback {
                service: service_error,
                file,
            });
        }

        if let Err(e) = self
            .services
            .call(
                AUTOMATION_DOMAIN,
                "reload",
                serde_json::json!({}),
                context.child(),
                false,
            )
            .await
        {
            warn!("automation.reload failed after writing the file: {}", e);
        }

        Ok(Persisted::File)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ha_core::SupportsResponse;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn doc() -> AutomationDocument {
        serde_yaml::from_str("id: '1718000000000'\nalias: Sunset lights\n").unwrap()
    }

    fn file(dir: &TempDir) -> Arc<AutomationsFile> {
        Arc::new(AutomationsFile::new(dir.path().join("automations.yaml")))
    }

    #[tokio::test]
    async fn test_file_sink_writes_header_and_comment() {
        let dir = TempDir::new().unwrap();
        let file = file(&dir);
        let sink = FileAutomationSink::new(file.clone());

        assert_eq!(
            sink.register(&doc(), &Context::new()).await.unwrap(),
            Persisted::File
        );

        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.starts_with(
            "# Automations created by AI Automation Creator\n\n\n# AI Generated Automation\n- "
        ));
    }

    #[tokio::test]
    async fn test_service_sink_registers() {
        let dir = TempDir::new().unwrap();
        let services = Arc::new(ServiceRegistry::new());
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();
        services.register(
            "automation",
            "create",
            move |call| {
                let counter = counter.clone();
                async move {
                    assert_eq!(call.get_str("alias"), Some("Sunset lights"));
                    assert!(call.context.parent_id.is_some());
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            },
            None,
            SupportsResponse::None,
        );

        let sink = ServiceAutomationSink::new(services, file(&dir));
        assert_eq!(
            sink.register(&doc(), &Context::new()).await.unwrap(),
            Persisted::Registered
        );
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(!dir.path().join("automations.yaml").exists());
    }

    #[tokio::test]
    async fn test_service_sink_falls_back_to_file_and_reload() {
        let dir = TempDir::new().unwrap();
        let services = Arc::new(ServiceRegistry::new());
        services.register(
            "automation",
            "create",
            |_call| async { Err(ServiceError::CallFailed("host is busy".into())) },
            None,
            SupportsResponse::None,
        );
        let reloads = Arc::new(AtomicUsize::new(0));
        let counter = reloads.clone();
        services.register(
            "automation",
            "reload",
            move |_call| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            },
            None,
            SupportsResponse::None,
        );

        let file = file(&dir);
        let sink = ServiceAutomationSink::new(services, file.clone());
        assert_eq!(
            sink.register(&doc(), &Context::new()).await.unwrap(),
            Persisted::File
        );
        assert_eq!(reloads.load(Ordering::SeqCst), 1);
        assert_eq!(file.read_all().await.unwrap(), vec![doc()]);
    }

    #[tokio::test]
    async fn test_fallback_failure_reports_both_errors() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be makes the write fail
        std::fs::create_dir(dir.path().join("automations.yaml")).unwrap();

        let sink = ServiceAutomationSink::new(Arc::new(ServiceRegistry::new()), file(&dir));
        let result = sink.register(&doc(), &Context::new()).await;
        assert!(matches!(
            result,
            Err(SinkError::Fallback {
                service: ServiceError::NotFound { .. },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_rejected_automation_is_not_written() {
        let dir = TempDir::new().unwrap();
        let services = Arc::new(ServiceRegistry::new());
        services.register(
            "automation",
            "create",
            |_call| async { Err(ServiceError::InvalidData("unknown mode".into())) },
            None,
            SupportsResponse::None,
        );

        let sink = ServiceAutomationSink::new(services, file(&dir));
        let result = sink.register(&doc(), &Context::new()).await;
        assert!(matches!(
            result,
            Err(SinkError::Service(ServiceError::InvalidData(_)))
        ));
        assert!(!dir.path().join("automations.yaml").exists());
    }
}
