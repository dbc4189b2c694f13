//! Modelos de dominio (etapas del embudo, intents y payloads de la API).

use serde::{Deserialize, Serialize};

/// Etapa del embudo comercial en la que va la conversación.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Integracion,
    Sondeo,
    Rebatir,
    PreCierre,
    Cierre,
}

impl Stage {
    /// Parsea el valor recibido por la API; cualquier etapa desconocida
    /// cae en `rebatir` (valor histórico por defecto del widget).
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "integracion" | "integración" => Self::Integracion,
            "sondeo" => Self::Sondeo,
            "pre_cierre" | "precierre" => Self::PreCierre,
            "cierre" => Self::Cierre,
            _ => Self::Rebatir,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integracion => "integracion",
            Self::Sondeo => "sondeo",
            Self::Rebatir => "rebatir",
            Self::PreCierre => "pre_cierre",
            Self::Cierre => "cierre",
        }
    }
}

impl Default for Stage {
    fn default() -> Self {
        Self::Rebatir
    }
}

/// Categoría gruesa del mensaje del cliente. Conjunto cerrado: el
/// clasificador siempre devuelve exactamente una de estas variantes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    Precio,
    Tiempo,
    Cert,
    Competencia,
    Pitch,
    Empleo,
    Default,
}

impl Intent {
    /// Acepta un override explícito del widget; un nombre desconocido
    /// se descarta (devuelve `None`) y se usa el clasificador.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "precio" => Some(Self::Precio),
            "tiempo" => Some(Self::Tiempo),
            "cert" => Some(Self::Cert),
            "competencia" => Some(Self::Competencia),
            "pitch" => Some(Self::Pitch),
            "empleo" => Some(Self::Empleo),
            "_default" | "default" => Some(Self::Default),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Precio => "precio",
            Self::Tiempo => "tiempo",
            Self::Cert => "cert",
            Self::Competencia => "competencia",
            Self::Pitch => "pitch",
            Self::Empleo => "empleo",
            Self::Default => "_default",
        }
    }
}

/// Sentimiento heurístico del mensaje; sólo alimenta el badge del widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentiment {
    Negativo,
    Positivo,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negativo => "negativo",
            Self::Positivo => "positivo",
            Self::Neutral => "neutral",
        }
    }
}

/// Cuerpo de los endpoints de asistencia. Todos los campos son opcionales
/// en el wire; los defaults replican el comportamiento del widget.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssistPayload {
    #[serde(default)]
    pub question: String,
    #[serde(default, rename = "customerName")]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

impl AssistPayload {
    pub fn customer_name(&self) -> String {
        match self.customer_name.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => "Cliente".to_string(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage.as_deref().map(Stage::parse).unwrap_or_default()
    }
}

/// Cuerpo de `POST /trackRate`.
#[derive(Debug, Clone, Deserialize)]
pub struct RatePayload {
    #[serde(default = "default_intent_label")]
    pub intent: String,
    #[serde(default = "default_stage_label")]
    pub stage: String,
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_rating_label")]
    pub rating: String,
}

fn default_intent_label() -> String {
    "_default".to_string()
}

fn default_stage_label() -> String {
    "rebatir".to_string()
}

fn default_rating_label() -> String {
    "regular".to_string()
}

/// Fila proyectada de `GET /stats` y del dashboard HTML.
#[derive(Debug, Clone, Serialize)]
pub struct StatsRow {
    pub intent: String,
    pub stage: String,
    pub text: String,
    pub shown: u64,
    pub wins: f64,
    pub winrate: f64,
    pub good: u64,
    pub regular: u64,
    pub bad: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_desconocido_cae_en_rebatir() {
        assert_eq!(Stage::parse("lo-que-sea"), Stage::Rebatir);
        assert_eq!(Stage::parse(""), Stage::Rebatir);
        assert_eq!(Stage::parse("CIERRE"), Stage::Cierre);
        assert_eq!(Stage::parse("pre_cierre"), Stage::PreCierre);
    }

    #[test]
    fn intent_override_valido_o_none() {
        assert_eq!(Intent::parse("precio"), Some(Intent::Precio));
        assert_eq!(Intent::parse("_default"), Some(Intent::Default));
        assert_eq!(Intent::parse("inventado"), None);
    }

    #[test]
    fn payload_con_defaults() {
        let p: AssistPayload = serde_json::from_str("{}").unwrap();
        assert_eq!(p.customer_name(), "Cliente");
        assert_eq!(p.stage(), Stage::Rebatir);
        assert!(p.question.is_empty());
    }
}
