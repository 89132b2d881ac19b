use std::path::PathBuf;

use authsync::prelude::*;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn name_of(snapshot: Option<&AuthSnapshot>) -> &str {
    snapshot.map_or("nobody", |s| s.display_name.as_str())
}

/// One line per transition, the way a nav bar would re-render.
fn describe(event: &TransitionEvent) -> String {
    let previous = name_of(event.previous.as_ref());
    let current = name_of(event.current.as_ref());
    match event.kind {
        TransitionKind::Login => format!("logged in as {current}"),
        TransitionKind::Logout => format!("{previous} logged out"),
        TransitionKind::UserSwitch => format!("switched from {previous} to {current}"),
        TransitionKind::Unchanged if event.is_authenticated() => format!("still {current}"),
        TransitionKind::Unchanged => "still logged out".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let authority = AuthorityConfig::from_env().ok_or("AUTHSYNC_BASE_URL is not set")?;
    let config = CoreConfig::from_env()?;
    let dir = std::env::var_os("AUTHSYNC_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("authsync"));

    let storage = FileStorage::new(dir);
    tracing::info!(
        authority = %authority.base_url,
        state_dir = %storage.dir().display(),
        "starting session watch"
    );

    let (core, driver) = SessionCoreBuilder::new()
        .config(config)
        .build_http(authority, storage)?;

    let _printer = core.on_transition(|event| {
        if event.kind.is_change() {
            println!("{}", describe(event));
        }
    });

    let driver = tokio::spawn(driver.run());
    core.ready().await;
    println!("ready: {}", name_of(core.current_snapshot().as_ref()));

    // Another process pointed at the same state dir shares the session.
    tokio::signal::ctrl_c().await?;
    core.shutdown();
    driver.await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::Router;
    use axum::routing::{get, post};

    use super::*;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    fn ada() -> AuthSnapshot {
        AuthSnapshot::new(UserId::new("1").unwrap(), "Ada", "ada@example.com", "")
    }

    #[test]
    fn test_describe_login_and_switch() {
        let grace = AuthSnapshot::new(UserId::new("2").unwrap(), "Grace", "", "");
        let login = TransitionEvent {
            kind: TransitionKind::Login,
            previous: None,
            current: Some(ada()),
        };
        let switch = TransitionEvent {
            kind: TransitionKind::UserSwitch,
            previous: Some(ada()),
            current: Some(grace),
        };

        assert_eq!(describe(&login), "logged in as Ada");
        assert_eq!(describe(&switch), "switched from Ada to Grace");
    }

    #[test]
    fn test_describe_logged_out_unchanged() {
        let event = TransitionEvent {
            kind: TransitionKind::Unchanged,
            previous: None,
            current: None,
        };
        assert_eq!(describe(&event), "still logged out");
    }

    #[tokio::test]
    async fn test_two_watchers_share_a_state_dir() {
        let app = Router::new()
            .route(
                "/session-check",
                get(|| async {
                    axum::Json(serde_json::json!({
                        "success": true,
                        "user": { "id": "1", "name": "Ada", "email": "ada@example.com" }
                    }))
                }),
            )
            .route("/logout", post(|| async { "ok" }));
        let base = serve(app).await;
        let dir = tempfile::tempdir().unwrap();

        let (first, _d1) = SessionCoreBuilder::new()
            .poll(PollConfig::disabled())
            .build_http(AuthorityConfig::with_base_url(&base), FileStorage::new(dir.path()))
            .unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), first.force_probe())
            .await
            .unwrap();
        assert!(matches!(result, ProbeResult::Authenticated(_)));

        let (second, _d2) = SessionCoreBuilder::new()
            .poll(PollConfig::disabled())
            .build_http(AuthorityConfig::with_base_url(&base), FileStorage::new(dir.path()))
            .unwrap();
        assert_eq!(name_of(second.current_snapshot().as_ref()), "Ada");
    }
}
