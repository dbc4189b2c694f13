use std::sync::{Arc, Mutex, RwLock};

use crate::assist::ReplyParser;
use crate::config::AppConfig;
use crate::guardrails::Guardrails;
use crate::intent::IntentClassifier;
use crate::knowledge::{Catalog, Prices, TrainerStore};
use crate::llm::LlmManager;
use crate::stats::StatsStore;
use crate::variants::VariantTable;

/// Estado compartido de la aplicación. Los stores se reemplazan enteros en
/// las recargas admin; los handlers sólo retienen los locks lo justo para
/// copiar lo que necesitan.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub llm: LlmManager,
    pub classifier: Arc<IntentClassifier>,
    pub guardrails: Arc<Guardrails>,
    pub parser: Arc<ReplyParser>,
    pub trainer: Arc<RwLock<TrainerStore>>,
    pub variants: Arc<RwLock<VariantTable>>,
    pub catalog: Arc<RwLock<Catalog>>,
    pub prices: Arc<RwLock<Prices>>,
    pub stats: Arc<Mutex<StatsStore>>,
}
