//! Abstracción sobre Rig para el proveedor de chat (OpenAI).
//!
//! Dos intentos por petición: el modelo primario y, ante timeout, error o
//! respuesta vacía, el modelo de respaldo. Sin backoff: el segundo intento
//! sale inmediatamente. Si ambos fallan el error sube a la capa HTTP, que
//! decide la política de enmascarado.

use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::warn;

use crate::config::AppConfig;

/// Gestor del modelo de chat.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub chat_model: String,
    pub fallback_model: String,
    pub timeout: Duration,
    pub api_key_set: bool,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Ok(Self {
            chat_model: cfg.chat_model.clone(),
            fallback_model: cfg.fallback_model.clone(),
            timeout: cfg.llm_timeout,
            api_key_set: cfg.openai_api_key_set,
        })
    }

    /// Lanza la conversación (system + user) y devuelve el contenido crudo
    /// junto al nombre del modelo que respondió.
    ///
    /// La llamada corre en una tarea aparte: si el cliente HTTP corta la
    /// conexión, la petición al modelo ya en vuelo no se aborta.
    pub async fn complete(&self, system: &str, user: &str) -> Result<(String, String)> {
        let this = self.clone();
        let system = system.to_string();
        let user = user.to_string();
        tokio::spawn(async move { this.try_models(&system, &user).await })
            .await
            .unwrap_or_else(|e| Err(anyhow!("tarea de modelo abortada: {e}")))
    }

    async fn try_models(&self, system: &str, user: &str) -> Result<(String, String)> {
        let mut last_err = anyhow!("sin modelos configurados");
        for model in [self.chat_model.as_str(), self.fallback_model.as_str()] {
            match self.complete_with_model(model, system, user).await {
                Ok(content) if !content.trim().is_empty() => {
                    return Ok((content, model.to_string()));
                }
                Ok(_) => {
                    warn!("respuesta vacía de {model}; se intenta el siguiente modelo");
                    last_err = anyhow!("respuesta vacía de {model}");
                }
                Err(e) => {
                    warn!("fallo de {model}: {e}; se intenta el siguiente modelo");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    async fn complete_with_model(
        &self,
        model: &str,
        system: &str,
        user: &str,
    ) -> Result<String> {
        use rig::client::CompletionClient as _;
        use rig::completion::Prompt;
        use rig::providers::openai;

        // Cliente OpenAI de Rig (lee OPENAI_API_KEY del entorno)
        let client = openai::Client::from_env();
        let agent = client.agent(model).preamble(system).build();

        let answer = tokio::time::timeout(self.timeout, agent.prompt(user))
            .await
            .map_err(|_| anyhow!("timeout de {}s con {model}", self.timeout.as_secs()))?
            .map_err(|e| anyhow!("error del modelo {model}: {e}"))?;
        Ok(answer)
    }
}
