use anyhow::Result;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use quran_gateway::{
    config::Config,
    console::Console,
    content::{ContentCache, ContentService, TtlPolicy},
    sources::{quran_api::build_http_client, OAuthClientCredentials, QuranApiClient, TokenManager},
    storage::JsonStorage,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging (stdout queda para las respuestas JSON)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("quran_gateway=debug".parse()?)
                .add_directive("reqwest=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("📖 Iniciando Quran Gateway v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    let http = build_http_client(config.request_timeout())?;

    // Token manager solo con credenciales completas
    let tokens = config.credentials().map(|credentials| {
        info!("🔐 Client credentials configured, using bearer auth");
        Arc::new(TokenManager::new(Arc::new(OAuthClientCredentials::new(
            http.clone(),
            credentials.token_url,
            credentials.client_id,
            credentials.client_secret,
        ))))
    });

    let source = QuranApiClient::new(http, config.api_base_url.clone(), tokens.clone());

    // Inicializar caché
    let cache = Arc::new(ContentCache::new(config.cache_default_ttl()));
    let shutdown = CancellationToken::new();
    let sweeper = cache.spawn_sweeper(config.cache_sweep_interval(), shutdown.clone());

    let content = ContentService::new(cache, Arc::new(source), TtlPolicy::default());

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        let result = health_check(&content).await;
        shutdown.cancel();
        return result;
    }

    // Inicializar almacenamiento JSON
    let storage = JsonStorage::new(config.data_dir.clone()).await?;

    let mut console = Console::new(content, tokens, storage, config);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    info!("🚀 Gateway listo, leyendo comandos de stdin");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("⚠️ Señal de shutdown recibida, cerrando...");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Some(output) = console.handle_line(&line).await {
                        println!("{output}");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Error leyendo stdin: {:?}", e);
                    break;
                }
            },
        }
    }

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        error!("Cache sweeper ended abnormally: {:?}", e);
    }

    Ok(())
}

async fn health_check(content: &ContentService) -> Result<()> {
    let chapters = content.chapters(None).await?;
    if chapters.data.is_empty() {
        anyhow::bail!("Upstream returned no chapters");
    }
    println!("OK");
    Ok(())
}
