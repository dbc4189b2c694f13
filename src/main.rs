// Módulos de la aplicación
mod api;
mod app_state;
mod assist;
mod config;
mod guardrails;
mod intent;
mod knowledge;
mod llm;
mod models;
mod stats;
mod variants;

use std::sync::{Arc, Mutex, RwLock};

use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::assist::ReplyParser;
use crate::guardrails::Guardrails;
use crate::intent::IntentClassifier;
use crate::knowledge::{Catalog, Prices, TrainerStore};
use crate::llm::LlmManager;
use crate::stats::StatsStore;
use crate::variants::VariantTable;

#[tokio::main]
async fn main() {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración y asegurar la estructura de datos en disco
    let cfg = config::AppConfig::from_env().expect("Error al cargar la configuración");
    knowledge::ensure_layout(&cfg).expect("Error asegurando el directorio de datos");

    // 3. Cargar stores en memoria (identidad, variantes, catálogo, precios, stats)
    let trainer = TrainerStore::load(&cfg);
    let variants = VariantTable::load(&cfg.variants_path());
    let catalog = Catalog::load(&cfg.catalog_path());
    let prices = Prices::load(&cfg.prices_path());
    let stats = StatsStore::load(&cfg.stats_path());
    info!(
        identity_len = trainer.identity.len(),
        knowledge_len = trainer.knowledge_len(),
        variants_len = variants.len(),
        catalog_len = catalog.areas.len(),
        "datos cargados"
    );

    // 4. Inicializar gestor de LLM, clasificadores y guardas
    let llm = LlmManager::from_config(&cfg).expect("Error inicializando LLM Manager");
    let classifier = IntentClassifier::new().expect("Error compilando el clasificador");
    let guardrails = Guardrails::new().expect("Error compilando las guardas");
    let parser = ReplyParser::new().expect("Error compilando el parser de respuestas");
    info!(
        "➡️  OpenAI habilitado: {} | Modelo: {} | Respaldo: {}",
        llm.api_key_set, llm.chat_model, llm.fallback_model
    );

    // 5. Crear estado compartido de la aplicación
    let app_state = AppState {
        config: cfg.clone(),
        llm,
        classifier: Arc::new(classifier),
        guardrails: Arc::new(guardrails),
        parser: Arc::new(parser),
        trainer: Arc::new(RwLock::new(trainer)),
        variants: Arc::new(RwLock::new(variants)),
        catalog: Arc::new(RwLock::new(catalog)),
        prices: Arc::new(RwLock::new(prices)),
        stats: Arc::new(Mutex::new(stats)),
    };

    // 6. Configurar el router de la API y el servicio de ficheros estáticos
    let app = Router::new()
        .merge(api::create_router(app_state.clone()))
        .fallback_service(ServeDir::new(&cfg.public_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 7. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .expect("No se pudo abrir el puerto");
    info!("🔥 Asistente de ventas escuchando en http://{}", cfg.server_addr);

    axum::serve(listener, app).await.expect("Error del servidor");
}
