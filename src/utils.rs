//utils for graceful shutdown that can be used on the
//any module in the project
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::error;

pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let tc = token.clone();
    //spawn once to listen for ctrl-c
    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install ctrl+C handler: {e}");
            return;
        }
        tc.cancel();
    });
    token
}
