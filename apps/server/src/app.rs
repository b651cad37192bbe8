//! Server lifecycle: storage bootstrap, accept loop, Ctrl-C shutdown.

use ftecho_server::Server;
use ftecho_transfer::Storage;

use crate::config::Config;

pub async fn run(config: Config) -> anyhow::Result<()> {
    let server_config = config.server_config()?;

    Storage::new(&server_config.storage_root)
        .ensure_root()
        .await?;

    let server = Server::bind(server_config).await?;
    let cancel = server.shutdown_token();
    let mut accept_loop = tokio::spawn(server.run());

    tokio::select! {
        result = &mut accept_loop => {
            result??;
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("SIGINT received, shutting down");
        }
    }

    cancel.cancel();
    accept_loop.await??;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_fails_on_bad_bind_address() {
        let config = Config {
            bind_address: "nowhere".into(),
            ..Config::default()
        };
        assert!(run(config).await.is_err());
    }
}
