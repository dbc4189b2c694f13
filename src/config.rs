//! Carga y gestión de configuración de la aplicación (servidor + LLM + datos).

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use url::Url;

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,

    /// Directorio con los ficheros de datos (variantes, stats, catálogo…).
    pub data_dir: PathBuf,
    /// Directorio de páginas estáticas (panel, agente).
    pub public_dir: PathBuf,

    /// `true` si hay OPENAI_API_KEY en el entorno; los endpoints con modelo
    /// devuelven 400 cuando falta.
    pub openai_api_key_set: bool,
    pub chat_model: String,
    pub fallback_model: String,
    pub llm_timeout: Duration,

    pub payment_link_enabled: bool,
    pub payment_link: String,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| {
            let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
            format!("0.0.0.0:{port}")
        });

        let data_dir = PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()));
        let public_dir =
            PathBuf::from(env::var("PUBLIC_DIR").unwrap_or_else(|_| "public".to_string()));

        let openai_api_key_set = env::var("OPENAI_API_KEY")
            .map(|k| !k.trim().is_empty())
            .unwrap_or(false);
        let chat_model = env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-5".to_string());
        let fallback_model =
            env::var("OPENAI_MODEL_FALLBACK").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        let llm_timeout_secs: u64 = env::var("LLM_TIMEOUT_SECS")
            .unwrap_or_else(|_| "20".to_string())
            .parse()
            .map_err(|_| anyhow!("LLM_TIMEOUT_SECS debe ser un número de segundos"))?;

        let payment_link_enabled = env::var("PAYMENT_LINK_ENABLED")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(true);
        let payment_link = env::var("PAYMENT_LINK_URL")
            .unwrap_or_else(|_| "https://platzi.com/precios/".to_string());
        Url::parse(&payment_link)
            .map_err(|e| anyhow!("PAYMENT_LINK_URL no es una URL válida: {e}"))?;

        Ok(Self {
            server_addr,
            data_dir,
            public_dir,
            openai_api_key_set,
            chat_model,
            fallback_model,
            llm_timeout: Duration::from_secs(llm_timeout_secs),
            payment_link_enabled,
            payment_link,
        })
    }

    // Rutas derivadas dentro de data_dir. El esquema de ficheros es el
    // mismo que maneja el panel de administración.

    pub fn variants_path(&self) -> PathBuf {
        self.data_dir.join("variants.json")
    }

    pub fn stats_path(&self) -> PathBuf {
        self.data_dir.join("stats.json")
    }

    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join("catalog.json")
    }

    pub fn prices_path(&self) -> PathBuf {
        self.data_dir.join("prices.json")
    }

    pub fn identity_path(&self) -> PathBuf {
        self.data_dir.join("trainer_identity.txt")
    }

    pub fn knowledge_dir(&self) -> PathBuf {
        self.data_dir.join("trainer_knowledge")
    }

    pub fn memory_path(&self) -> PathBuf {
        self.data_dir.join("memory.json")
    }
}
