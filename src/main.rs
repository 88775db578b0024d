use std::sync::Arc;
use std::time::Duration;

use ferry::config::Config;
use ferry::context::ServerContext;
use ferry::http::{Body, Env, HandlerResult, Reply, make_handler};
use ferry::server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.server.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();

    let context = ServerContext::new(cfg);
    let handler = Arc::new(make_handler(demo));

    tokio::select! {
        res = server::listener::run(context, handler) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

/// Sample application exercising both completion paths.
fn demo(mut env: Env) -> anyhow::Result<HandlerResult> {
    match env.path.as_str() {
        "/" => {
            let greeting = env
                .config
                .app_value("greeting")
                .and_then(|v| v.as_str())
                .unwrap_or("Hello from ferry")
                .to_string();
            Ok(Reply::ok(format!("{greeting}\n")).into())
        }

        "/deferred" => {
            let (deferred, callback) = env.defer()?;
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                if let Err(e) = callback.call(Reply::ok("ok\n")) {
                    tracing::debug!(error = %e, "client left before the deferred reply");
                }
            });
            Ok(deferred.into())
        }

        "/stream" => {
            let (sender, body) = Body::channel();
            tokio::spawn(async move {
                for i in 0..5 {
                    if sender.send(format!("tick {i}\n")).await.is_err() {
                        tracing::debug!("stream aborted by client");
                        return;
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            });
            Ok(Reply::new(200).header("Content-Type", "text/plain").body(body).into())
        }

        "/boom" => anyhow::bail!("boom"),

        _ => Ok(Reply::not_found().into()),
    }
}
