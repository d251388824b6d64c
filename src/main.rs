//! Logstore Operator - keeps log-storage cluster configuration in sync

use clap::{Parser, Subcommand};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt};

use logstore_operator::config::OperatorConfig;
use logstore_operator::controller;
use logstore_operator::crd::StorageCluster;
use logstore_operator::telemetry::init_logging;

/// Logstore - renders StorageCluster resources into managed ConfigMaps
#[derive(Parser, Debug)]
#[command(name = "logstore-operator", version, about, long_about = None)]
struct Cli {
    /// Print the StorageCluster CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    config: OperatorConfig,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller (default mode)
    Controller {
        /// Install or update the StorageCluster CRD before starting
        #[arg(long, env = "LOGSTORE_INSTALL_CRD")]
        install_crd: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&StorageCluster::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    init_logging(cli.config.log_format)?;

    let install_crd = match cli.command {
        Some(Commands::Controller { install_crd }) => install_crd,
        None => false,
    };
    run_controller(&cli.config, install_crd).await
}

async fn run_controller(config: &OperatorConfig, install_crd: bool) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if install_crd {
        ensure_crd_installed(&client).await?;
    }

    controller::run(client, config).await?;
    Ok(())
}

/// Install or update the StorageCluster CRD using server-side apply
async fn ensure_crd_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply("logstore-operator").force();

    tracing::info!("Installing StorageCluster CRD...");
    crds.patch(
        "storageclusters.logstore.dev",
        &params,
        &Patch::Apply(&StorageCluster::crd()),
    )
    .await
    .map_err(|e| anyhow::anyhow!("Failed to install StorageCluster CRD: {}", e))?;

    tracing::info!("StorageCluster CRD installed/updated");
    Ok(())
}
