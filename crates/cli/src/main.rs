use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use carto_controller::ControllerConfig;
use carto_core::validate_object;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::{info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser, Debug)]
#[command(name = "cartographer", version, about = "Kubernetes supply chain choreographer")]
struct Cli {
    /// Admission webhook port
    #[arg(long, env = "CARTO_WEBHOOK_PORT", default_value_t = 9443, global = true)]
    port: u16,

    /// Directory holding tls.crt and tls.key; the webhook is disabled when empty
    #[arg(long = "cert-dir", env = "CARTO_CERT_DIR", default_value = "", global = true)]
    cert_dir: String,

    /// Human-readable logs instead of JSON
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    dev: bool,

    /// Log filter used when CARTO_LOG is unset
    #[arg(long = "log-level", env = "CARTO_LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controllers and the admission webhook (default)
    Run,
    /// Print every CRD as a multi-document YAML stream
    Crds,
    /// Check manifests against the admission rules without a cluster
    Validate {
        /// YAML file, may hold several documents
        file: PathBuf,
        #[arg(short = 'o', long = "output", value_enum, default_value_t = Output::Human)]
        output: Output,
    },
}

fn init_tracing(level: &str, dev: bool) {
    let env = std::env::var("CARTO_LOG").unwrap_or_else(|_| level.to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if dev {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
    } else {
        tracing_subscriber::fmt().json().with_env_filter(filter).with_current_span(true).init();
    }
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("CARTO_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid CARTO_METRICS_ADDR; expected host:port");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.dev);

    match &cli.command {
        None | Some(Commands::Run) => {
            init_metrics();
            run(&cli).await
        }
        Some(Commands::Crds) => {
            for crd in carto_core::api::crds() {
                print!("---\n{}", serde_yaml::to_string(&crd)?);
            }
            Ok(())
        }
        Some(Commands::Validate { file, output }) => validate(file, *output),
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let cluster = carto_kubehub::get_kube_cluster().await.context("connecting to the cluster")?;
    let config = ControllerConfig::from_env();

    let handle = axum_server::Handle::new();
    let webhook = if cli.cert_dir.is_empty() {
        info!("no certificate directory; admission webhook disabled");
        None
    } else {
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
        let dir = PathBuf::from(&cli.cert_dir);
        let handle = handle.clone();
        Some(tokio::spawn(async move { carto_controller::webhook::serve(addr, &dir, handle).await }))
    };

    // Controllers stop on SIGINT/SIGTERM; the webhook follows them down.
    let controllers = carto_controller::run(cluster, config);
    tokio::pin!(controllers);
    let Some(mut webhook) = webhook else {
        controllers.await;
        info!("shut down");
        return Ok(());
    };
    tokio::select! {
        () = &mut controllers => {
            handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
            webhook.await.context("joining admission webhook")??;
            info!("shut down");
            Ok(())
        }
        res = &mut webhook => {
            res.context("joining admission webhook")??;
            bail!("admission webhook stopped unexpectedly")
        }
    }
}

/// Outcome of validating one manifest document.
#[derive(Debug, Serialize, PartialEq)]
struct Verdict {
    kind: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn validate_documents(text: &str) -> Result<Vec<Verdict>> {
    let mut verdicts = Vec::new();
    for doc in serde_yaml::Deserializer::from_str(text) {
        let obj = Json::deserialize(doc).context("parsing YAML document")?;
        if obj.is_null() {
            continue;
        }
        let kind = obj["kind"].as_str().unwrap_or_default().to_string();
        let name = obj.pointer("/metadata/name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let error = validate_object(&kind, &obj).err().map(|e| e.to_string());
        verdicts.push(Verdict { kind, name, error });
    }
    Ok(verdicts)
}

fn validate(file: &Path, output: Output) -> Result<()> {
    let text = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let verdicts = validate_documents(&text)?;
    match output {
        Output::Human => {
            for v in &verdicts {
                match &v.error {
                    None => println!("ok    {}/{}", v.kind, v.name),
                    Some(e) => println!("FAIL  {}/{}: {}", v.kind, v.name, e),
                }
            }
        }
        Output::Json => println!("{}", serde_json::to_string_pretty(&verdicts)?),
    }
    let failed = verdicts.iter().filter(|v| v.error.is_some()).count();
    if failed > 0 {
        bail!("{failed} of {} objects failed validation", verdicts.len());
    }
    Ok(())
}
