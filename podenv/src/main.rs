//! `podenv` binary: serves the Pod mutation webhook or prints its registration.
use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use podenv::{
    manifest::{self, ManifestParams},
    server, MutationRules,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(version, about)]
struct App {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the webhook
    Serve(Serve),
    /// Print the MutatingWebhookConfiguration registering the webhook
    Manifest(Manifest),
}

#[derive(clap::Args)]
struct Serve {
    /// Address to listen on
    #[arg(long, env = "PODENV_ADDR", default_value = "0.0.0.0:8443")]
    addr: SocketAddr,
    /// YAML file with the env and dns rules, the built-in rules when unset
    #[arg(long, env = "PODENV_RULES")]
    rules: Option<PathBuf>,
    /// PEM certificate to serve https with
    #[arg(long, env = "PODENV_TLS_CERT", requires = "tls_key")]
    tls_cert: Option<PathBuf>,
    /// PEM private key to serve https with
    #[arg(long, env = "PODENV_TLS_KEY", requires = "tls_cert")]
    tls_key: Option<PathBuf>,
}

#[derive(clap::Args)]
struct Manifest {
    /// Webhook and configuration name
    #[arg(long, env = "PODENV_WEBHOOK_NAME", default_value = "pod-env.podenv.dev")]
    name: String,
    /// Service in front of the webhook
    #[arg(long, env = "PODENV_SERVICE", default_value = "podenv")]
    service: String,
    /// Namespace of the service
    #[arg(long, short, env = "PODENV_NAMESPACE", default_value = "podenv-system")]
    namespace: String,
    /// Port of the service
    #[arg(long, env = "PODENV_SERVICE_PORT", default_value_t = 443)]
    port: i32,
    /// PEM file with the CA that signed the serving certificate
    #[arg(long, env = "PODENV_CA_BUNDLE")]
    ca_bundle: Option<PathBuf>,
}

impl Serve {
    async fn run(self) -> Result<()> {
        let rules = match &self.rules {
            Some(path) => MutationRules::from_file(path)?,
            None => MutationRules::default(),
        };
        info!(env = rules.env().len(), dns_option = ?rules.dns_option().name, "loaded rules");

        let app = server::router(Arc::new(rules));
        match (self.tls_cert, self.tls_key) {
            (Some(cert), Some(key)) => server::serve_tls(app, self.addr, cert, key).await?,
            (None, None) => server::serve(app, self.addr).await?,
            _ => bail!("--tls-cert and --tls-key must be given together"),
        }
        Ok(())
    }
}

impl Manifest {
    fn run(self) -> Result<()> {
        let ca_bundle = match &self.ca_bundle {
            Some(path) => Some(
                std::fs::read(path).with_context(|| format!("failed to read ca bundle {}", path.display()))?,
            ),
            None => None,
        };
        let params = ManifestParams {
            name: self.name,
            service: self.service,
            namespace: self.namespace,
            port: self.port,
            ca_bundle,
        };
        print!("{}", manifest::to_yaml(&params)?);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    match App::parse().command {
        Command::Serve(serve) => serve.run().await,
        Command::Manifest(manifest) => manifest.run(),
    }
}
