use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config_path: Option<String> = None;
    let mut listen: Option<String> = None;
    let mut database_path: Option<String> = None;
    let mut default_project: Option<String> = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--listen" | "--addr" => {
                listen = Some(args.next().ok_or("missing value for --listen/--addr")?);
            }
            "--db" => {
                database_path = Some(args.next().ok_or("missing value for --db")?);
            }
            "--project" => {
                default_project = Some(args.next().ok_or("missing value for --project")?);
            }
            "--help" | "-h" => {
                println!(
                    "usage: tokencap-gateway [config.json] [--listen HOST:PORT] [--db PATH] [--project ID]"
                );
                return Ok(());
            }
            other if !other.starts_with('-') && config_path.is_none() => {
                config_path = Some(other.to_string());
            }
            other => return Err(format!("unknown arg: {other}").into()),
        }
    }

    let mut config = match config_path {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str::<tokencap::GatewayConfig>(&raw)?
        }
        None => tokencap::GatewayConfig::default(),
    }
    .with_env_credentials();

    if let Some(listen) = listen {
        config.listen = listen;
    }
    if let Some(database_path) = database_path {
        config.database_path = database_path;
    }
    if let Some(default_project) = default_project {
        config.default_project_id = default_project;
    }

    let ledger = tokencap::LedgerStore::new(&config.database_path);
    ledger.init().await?;

    let listen = config.listen.clone();
    let state = tokencap::AppState::new(config, ledger)?;
    let app = tokencap::router(state);

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    tracing::info!(%listen, "tokencap-gateway listening");
    axum::serve(listener, app).await?;
    Ok(())
}
