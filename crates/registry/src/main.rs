use api_types::ServiceDescriptor;
use clap::Parser;
use error_stack::Report;
use error_stack::ResultExt;
use podmesh_registry::config::Cli;
use podmesh_registry::config::Commands;
use podmesh_registry::config::ConnectionArgs;
use podmesh_registry::config::GetArgs;
use podmesh_registry::config::ListArgs;
use podmesh_registry::config::WatchArgs;
use podmesh_registry::logging;
use podmesh_registry::KubeRegistry;
use podmesh_registry::RegistryError;
use podmesh_registry::RegistryOptions;
use tracing::error;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Report<RegistryError>> {
    logging::init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Watch(args) => run_watch(args).await,
        Commands::Get(args) => run_get(args).await,
        Commands::List(args) => run_list(args).await,
    }
}

async fn connect(connection: ConnectionArgs) -> Result<KubeRegistry, Report<RegistryError>> {
    KubeRegistry::new(RegistryOptions {
        kubeconfig: connection.kubeconfig,
        namespace: connection.namespace,
        pod_name: None,
    })
    .await
}

async fn run_watch(args: WatchArgs) -> Result<(), Report<RegistryError>> {
    let registry = connect(args.connection).await?;
    let mut session = registry.watch(args.service.as_deref()).await?;

    // Ctrl-C stops the session; the stream then reports closed and the
    // loop below winds down normally.
    let handle = session.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping watch");
            handle.stop();
        }
    });

    while let Ok(event) = session.next().await {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{line}"),
            Err(error) => error!(%error, "failed to encode registry event"),
        }
    }
    info!("watch stream closed");
    Ok(())
}

async fn run_get(args: GetArgs) -> Result<(), Report<RegistryError>> {
    let registry = connect(args.connection).await?;
    let services = registry.get_service(&args.service).await?;
    print_services(&services)
}

async fn run_list(args: ListArgs) -> Result<(), Report<RegistryError>> {
    let registry = connect(args.connection).await?;
    let services = registry.list_services().await?;
    print_services(&services)
}

fn print_services(services: &[ServiceDescriptor]) -> Result<(), Report<RegistryError>> {
    let rendered =
        serde_json::to_string_pretty(services).change_context(RegistryError::ApiRequestFailed {
            message: "service listing does not serialize".to_string(),
        })?;
    println!("{rendered}");
    Ok(())
}
