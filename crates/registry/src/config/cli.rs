use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Service registry backed by Kubernetes pod labels and annotations.
#[derive(Parser)]
#[command(about, long_about = None, version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stream registry change events to stdout
    Watch(WatchArgs),
    /// Look up a service by name
    Get(GetArgs),
    /// List registered services
    List(ListArgs),
}

#[derive(Args)]
pub struct ConnectionArgs {
    /// Path to a kubeconfig file; in-cluster or ~/.kube/config when omitted
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Namespace to operate in; all namespaces when omitted
    #[arg(long, short)]
    pub namespace: Option<String>,
}

#[derive(Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Restrict the watch to one service
    #[arg(long, short)]
    pub service: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Service name
    pub service: String,
}

#[derive(Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,
}
