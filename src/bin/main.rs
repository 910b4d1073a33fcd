//! vif-reconcile CLI

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use vif_reconcile::{
    HypervisorGateway, InMemoryHypervisor, Reconciler, VmLocks, VmNetworkConfig, XeGateway,
};

#[derive(Parser)]
#[command(name = "vif-reconcile")]
#[command(about = "Converge XenServer VM network interfaces to a declared layout", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile VMs on a XenServer host
    Apply {
        /// VM network config files (JSON)
        #[arg(short, long = "config", required = true)]
        configs: Vec<PathBuf>,
        /// Only print the planned changes
        #[arg(long)]
        dry_run: bool,
        /// Remote host (default: local)
        #[arg(long)]
        xe_server: Option<String>,
        #[arg(long)]
        xe_port: Option<u16>,
        #[arg(long, requires = "xe_password_file")]
        xe_user: Option<String>,
        /// File holding the password for --xe-user
        #[arg(long, requires = "xe_user")]
        xe_password_file: Option<PathBuf>,
    },
    /// Reconcile against a simulated host loaded from JSON
    Simulate {
        /// Host state file
        #[arg(short, long)]
        state: PathBuf,
        /// VM network config files (JSON)
        #[arg(short, long = "config", required = true)]
        configs: Vec<PathBuf>,
        /// Only print the planned changes
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vif_reconcile=info")),
        )
        .init();

    let cli = Cli::parse();

    let ok = match cli.command {
        Commands::Apply {
            configs,
            dry_run,
            xe_server,
            xe_port,
            xe_user,
            xe_password_file,
        } => {
            let mut gateway = XeGateway::new();
            if let Some(server) = xe_server {
                gateway = gateway.server(server);
            }
            if let Some(port) = xe_port {
                gateway = gateway.port(port);
            }
            if let (Some(user), Some(password_file)) = (xe_user, xe_password_file) {
                gateway = gateway.credentials(user, password_file);
            }
            run_all(Arc::new(Reconciler::new(gateway)), load_configs(&configs)?, dry_run).await
        }
        Commands::Simulate {
            state,
            configs,
            dry_run,
        } => {
            let host = Arc::new(InMemoryHypervisor::load(&state)?);
            let configs = load_configs(&configs)?;
            let vms: Vec<String> = configs.iter().map(|c| c.vm.clone()).collect();

            let ok = run_all(Arc::new(Reconciler::new(host.clone())), configs, dry_run).await;

            println!();
            println!("Simulated host after reconcile:");
            for vm in vms {
                println!("  {}", vm);
                for vif in host.interfaces(&vm) {
                    println!("    {}  {}  ({})", vif.slot, vif.network, vif.reference);
                }
            }
            ok
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn load_configs(paths: &[PathBuf]) -> vif_reconcile::Result<Vec<VmNetworkConfig>> {
    paths.iter().map(VmNetworkConfig::load).collect()
}

/// Reconcile every VM concurrently, one blocking task per config
async fn run_all<G>(reconciler: Arc<Reconciler<G>>, configs: Vec<VmNetworkConfig>, dry_run: bool) -> bool
where
    G: HypervisorGateway + Send + Sync + 'static,
{
    let locks = VmLocks::new();
    let mut tasks = Vec::with_capacity(configs.len());

    for config in configs {
        let reconciler = reconciler.clone();
        let locks = locks.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            locks.run(&config.vm, || reconcile_one(&reconciler, &config, dry_run))
        }));
    }

    let mut ok = true;
    for task in tasks {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                eprintln!("{}", e);
                ok = false;
            }
            Err(e) => {
                eprintln!("reconcile task panicked: {}", e);
                ok = false;
            }
        }
    }
    ok
}

fn reconcile_one<G: HypervisorGateway>(
    reconciler: &Reconciler<G>,
    config: &VmNetworkConfig,
    dry_run: bool,
) -> vif_reconcile::Result<()> {
    let desired = config.desired_interfaces()?;

    if dry_run {
        let plan = reconciler.plan(&config.vm, &desired)?;
        println!("VM {}:", config.vm);
        if plan.diff.is_converged() && plan.slot_map.is_empty() {
            println!("  no interfaces");
        }
        for line in plan.describe() {
            println!("  {}", line);
        }
        return Ok(());
    }

    let report = match reconciler.reconcile(&config.vm, &desired) {
        Ok(report) => report,
        Err(e) => {
            if let Some(slot) = e.failed_slot() {
                eprintln!("VM {}: pass stopped at {}", config.vm, slot);
            }
            return Err(e);
        }
    };

    println!("VM {}:", config.vm);
    for (slot, vif) in &report.destroyed {
        println!("  destroyed {} ({})", slot, vif);
    }
    for (slot, vif) in &report.created {
        println!("  created   {} ({})", slot, vif);
    }
    if report.is_noop() {
        println!("  already converged ({} unchanged)", report.unchanged.len());
    }
    Ok(())
}
