//! Serve command: runs the demo contract in the foreground.

use std::net::IpAddr;

use contractkit_server::{DocsConfig, ServerConfig, StopMode, terminate_signal};
use tracing::info;

use crate::demo;
use crate::error::ClientResult;

/// Options of `contractkit serve`.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub bind: IpAddr,
    pub port: u16,
    pub base_path: String,
    pub obfuscate: bool,
    pub docs: bool,
}

impl ServeOptions {
    pub fn server_config(&self) -> ServerConfig {
        let mut config = ServerConfig::new(self.bind, self.port)
            .with_base_path(self.base_path.clone())
            .with_obfuscate(self.obfuscate);
        if self.docs {
            config = config.with_docs(DocsConfig::new(demo::api_info()));
        }
        config
    }
}

/// Serves until SIGINT/SIGTERM, then stops gracefully.
pub async fn run(options: ServeOptions) -> ClientResult<()> {
    let mut server = demo::server(options.server_config())?;
    let address = server.start().await?;
    println!("Serving on http://{}{}", address, options.base_path);
    if options.docs {
        println!("Docs at http://{}/docs", address);
    }

    terminate_signal().await;
    info!("Shutting down");
    server.stop(StopMode::Graceful).await?;
    Ok(())
}
