use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use discache::discovery::{ApiResourceList, PartialDiscovery};
use discache::{CachedDiscoveryClient, CachedDiscoveryInterface, Config, DiscoveryInterface};

#[derive(Parser, Debug)]
#[command(name = "discache")]
#[command(about = "Query API discovery through a shared Redis cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/discache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// API server URL, overriding the config file
  #[arg(short, long)]
  server: Option<String>,

  /// Ignore cache entries written before this run
  #[arg(long)]
  invalidate: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List API groups and their versions
  Groups,
  /// List the resources of one group-version (e.g. "v1", "apps/v1")
  Resources { group_version: String },
  /// List resources in each group's preferred version
  ApiResources {
    /// Only namespaced resources
    #[arg(long)]
    namespaced: bool,
  },
  /// Print the server version
  Version,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
    .with_writer(writer)
    .init();

  let args = Args::parse();

  // Load configuration, letting --server stand in for a missing file
  let config = match (Config::load_optional(args.config.as_deref())?, args.server) {
    (Some(config), Some(server)) => Config { server, ..config },
    (Some(config), None) => config,
    (None, Some(server)) => Config::for_server(server),
    (None, None) => Config::load(None)?,
  };

  let client = CachedDiscoveryClient::for_config(&config).await?;
  if args.invalidate {
    client.invalidate();
  }

  match args.command {
    Command::Groups => {
      for group in client.server_groups().await?.groups {
        let name = if group.name.is_empty() {
          "(core)"
        } else {
          group.name.as_str()
        };
        let versions: Vec<_> = group.versions.iter().map(|v| v.version.as_str()).collect();
        let preferred = group
          .preferred_version
          .as_ref()
          .map(|p| p.version.as_str())
          .unwrap_or("-");
        println!("{:<40} {:<30} {}", name, versions.join(","), preferred);
      }
    }
    Command::Resources { group_version } => {
      let list = client.server_resources_for_group_version(&group_version).await?;
      print_resources(&[list]);
    }
    Command::ApiResources { namespaced } => {
      let preferred = if namespaced {
        client.server_preferred_namespaced_resources().await?
      } else {
        client.server_preferred_resources().await?
      };
      print_partial(preferred);
    }
    Command::Version => {
      let version = client.server_version().await?;
      println!("{} ({})", version.git_version, version.platform);
    }
  }

  if client.is_caching() {
    let state = if client.fresh() { "fresh" } else { "stale" };
    eprintln!("cache: {}", state);
  }

  Ok(())
}

fn print_partial(preferred: PartialDiscovery<Vec<ApiResourceList>>) {
  print_resources(&preferred.value);
  for (gv, err) in &preferred.failed {
    eprintln!("warning: {}: {}", gv, err);
  }
}

fn print_resources(lists: &[ApiResourceList]) {
  println!(
    "{:<40} {:<30} {:<10} {}",
    "NAME", "APIVERSION", "NAMESPACED", "KIND"
  );
  for list in lists {
    for resource in &list.resources {
      println!(
        "{:<40} {:<30} {:<10} {}",
        resource.name, list.group_version, resource.namespaced, resource.kind
      );
    }
  }
}
