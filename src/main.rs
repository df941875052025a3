use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use marketwatch_sw::cache::{CacheStore, MemoryStore, SqliteStore};
use marketwatch_sw::clients::Delivery;
use marketwatch_sw::gateway::SYNC_TAG;
use marketwatch_sw::http::{Destination, HttpNetwork, Method, Request, RequestMode, Response};
use marketwatch_sw::{Config, ServiceWorker};

#[derive(Parser, Debug)]
#[command(name = "marketwatch-sw")]
#[command(about = "Offline caching layer for the MarketWatch web app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/marketwatch-sw/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Keep the cache in memory instead of the on-disk database
  #[arg(long, global = true)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Pre-cache the core assets
  Install,
  /// Install, then delete older generations and claim pages
  Activate,
  /// Intercept a single request
  Fetch {
    /// Absolute URL or path relative to the configured origin
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Request destination (image, script, style, font, document, ...)
    #[arg(short, long, default_value = "")]
    destination: String,
    /// Request mode (navigate, cors, no-cors, same-origin)
    #[arg(short, long, default_value = "cors")]
    mode: String,
  },
  /// Send a control message, e.g. '{"type":"GET_CACHE_INFO"}'
  Message { json: String },
  /// Deliver a push payload and optionally click the notification
  Push {
    payload: Option<String>,
    /// Click the notification with this action ("" for the body)
    #[arg(long)]
    click: Option<String>,
  },
  /// Fire a background sync event
  Sync {
    #[arg(default_value = SYNC_TAG)]
    tag: String,
  },
  /// Print bucket entry counts
  Info,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;

  let _guard = init_tracing()?;

  let store: Arc<dyn CacheStore> = if args.ephemeral {
    Arc::new(MemoryStore::new())
  } else {
    Arc::new(SqliteStore::open_at(&Config::data_dir()?.join("cache.db"))?)
  };
  let network = Arc::new(HttpNetwork::new(config.network_timeout())?);

  let (worker, mut rx) = ServiceWorker::new(config, store, network)?;

  // The terminal acts as one open page
  let origin = worker.config().origin_url()?;
  let page = worker.clients().connect(origin).await;
  worker.clients().claim().await;
  debug!(client = page.id.as_str(), "terminal page connected");

  match args.command {
    Command::Install => {
      let report = worker.on_install().await?;
      for (url, reason) in &report.failed {
        println!("failed  {} ({})", url, reason);
      }
      println!(
        "cached {} of {} core assets",
        report.cached.len(),
        report.cached.len() + report.failed.len()
      );
    }
    Command::Activate => {
      worker.on_install().await?;
      let report = worker.on_activate().await?;
      for name in &report.deleted {
        println!("deleted {}", name);
      }
      println!("activated, {} page(s) claimed", report.claimed);
    }
    Command::Fetch {
      url,
      method,
      destination,
      mode,
    } => {
      let mut request = Request::get(worker.config().resolve(&url)?)
        .with_method(Method::parse(&method)?)
        .with_destination(Destination::parse(&destination)?);
      request.mode = RequestMode::parse(&mode)?;

      match worker.on_fetch(&request).await? {
        Some(response) => print_response(&response),
        None => println!("not intercepted: {} {}", request.method.as_str(), request.url),
      }
    }
    Command::Message { json } => {
      let data: serde_json::Value =
        serde_json::from_str(&json).map_err(|e| eyre!("Invalid message JSON: {}", e))?;
      worker.on_message(Some(page.id.as_str()), &data).await;
    }
    Command::Push { payload, click } => {
      let (id, descriptor) = worker.on_push(payload.as_deref().map(str::as_bytes)).await?;
      println!("{}", serde_json::to_string_pretty(&descriptor)?);

      if let Some(action) = click {
        let action = Some(action.as_str()).filter(|a| !a.is_empty());
        let outcome = worker.on_notification_click(id, action).await?;
        println!("{:?}", outcome);
      }
    }
    Command::Sync { tag } => {
      let notified = worker.on_sync(&tag).await;
      println!("sync '{}' fired, {} page(s) notified", tag, notified);
    }
    Command::Info => {
      println!("{}", serde_json::to_string_pretty(&worker.cache_info())?);
    }
  }

  let refreshed = worker.drain_background().await;
  if refreshed > 0 {
    info!(refreshed, "background refreshes finished");
  }

  print_deliveries(&mut rx);
  worker.clients().disconnect(&page.id).await;

  Ok(())
}

/// Log to stderr and to a daily file under the data directory.
fn init_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
  use tracing_subscriber::layer::SubscriberExt;
  use tracing_subscriber::util::SubscriberInitExt;

  let log_dir = Config::data_dir()?.join("logs");
  let file_appender = tracing_appender::rolling::daily(log_dir, "marketwatch-sw.log");
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  tracing_subscriber::registry()
    .with(filter)
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .with(
      tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer),
    )
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}

fn print_response(response: &Response) {
  println!("{} {}", response.status, response.status_text);
  for (name, value) in &response.headers {
    println!("{}: {}", name, value);
  }
  println!();
  println!("{}", response.text());
}

fn print_deliveries(rx: &mut mpsc::UnboundedReceiver<Delivery>) {
  while let Ok(delivery) = rx.try_recv() {
    println!("-> {} {}", delivery.client_id, delivery.message.to_json());
  }
}
