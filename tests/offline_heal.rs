use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use locator_heal::{
    heal_offline, CodeUpdateResult, CodeUpdater, FailureContext, FailureType, HealConfig,
    HealError, HealMetrics, HealRequest, HealingStatus, LocatorHealError, OfflineOptions,
};

const OLD_PAGE: &str = r#"<html><body>
  <nav><a href="/home">Home</a><a id="nav-settings" href="/settings">Settings</a></nav>
  <main>
    <button id="save-btn" class="btn primary" data-testid="save"
            style="left: 40px; top: 300px; width: 120px; height: 32px">Save</button>
    <button id="cancel-btn" class="btn" style="left: 180px; top: 300px; width: 120px; height: 32px">Cancel</button>
  </main>
</body></html>"#;

const NEW_PAGE: &str = r#"<html><body>
  <nav><a href="/home">Home</a><a id="nav-settings" href="/settings">Settings</a></nav>
  <main>
    <button id="save-changes" class="btn primary" data-testid="save"
            style="left: 40px; top: 310px; width: 120px; height: 32px">Save</button>
    <button id="cancel-btn" class="btn" style="left: 180px; top: 310px; width: 120px; height: 32px">Cancel</button>
  </main>
</body></html>"#;

fn request(test_file: &str) -> HealRequest {
    HealRequest::new(
        FailureContext::new(test_file, "test_save", "id=save-btn", FailureType::ElementNotFound)
            .with_url("https://app.test/settings"),
    )
    .with_documents(OLD_PAGE, NEW_PAGE)
}

#[tokio::test]
async fn renamed_id_is_healed_from_page_sources() {
    let metrics = Arc::new(HealMetrics::new().unwrap());
    let session = heal_offline(
        &HealConfig::default(),
        request("tests/settings.rs"),
        OfflineOptions {
            metrics: Some(metrics.clone()),
            ..OfflineOptions::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(session.status, HealingStatus::Success, "{:?}", session.error_message);
    assert_eq!(session.successful_locator.as_deref(), Some("id=save-changes"));
    assert!(session.update.is_none());
    assert_eq!(metrics.sessions_succeeded.get(), 1);
}

/// Records update requests instead of touching files.
#[derive(Default)]
struct RecordingUpdater {
    calls: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl CodeUpdater for RecordingUpdater {
    async fn update_locator(
        &self,
        file: &str,
        old_locator: &str,
        new_locator: &str,
    ) -> Result<CodeUpdateResult, HealError> {
        self.calls
            .lock()
            .unwrap()
            .push((file.into(), old_locator.into(), new_locator.into()));
        Ok(CodeUpdateResult {
            success: true,
            backup_path: Some(format!("{file}.bak")),
            error_message: None,
        })
    }
}

#[tokio::test]
async fn healed_locator_is_handed_to_the_updater() {
    let updater = Arc::new(RecordingUpdater::default());
    let session = heal_offline(
        &HealConfig::default(),
        request("tests/settings.rs"),
        OfflineOptions {
            updater: Some(updater.clone()),
            ..OfflineOptions::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(session.status, HealingStatus::Success, "{:?}", session.error_message);
    assert_eq!(
        updater.calls.lock().unwrap().as_slice(),
        &[(
            "tests/settings.rs".to_string(),
            "id=save-btn".to_string(),
            "id=save-changes".to_string()
        )]
    );
    let update = session.update.unwrap();
    assert_eq!(update.backup_path.as_deref(), Some("tests/settings.rs.bak"));
}

#[tokio::test]
async fn unparseable_snapshot_is_rejected_before_healing() {
    let request = HealRequest::new(FailureContext::new(
        "t.rs",
        "case",
        "id=x",
        FailureType::ElementNotFound,
    ))
    .with_documents("{ not json", NEW_PAGE);

    let err = heal_offline(&HealConfig::default(), request, OfflineOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, LocatorHealError::Document(_)));
}
