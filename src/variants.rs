//! Tabla de variantes offline y selector aleatorio ponderado.
//!
//! Las variantes viven en `data/variants.json` bajo claves `intent::stage`;
//! se cargan en memoria al arrancar y sólo cambian vía recarga admin.

use std::collections::HashMap;
use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{Intent, Stage};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    #[serde(default)]
    pub text: String,
    /// Peso relativo; ausente equivale a 1.
    #[serde(default)]
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantBlock {
    #[serde(default)]
    pub variants: Vec<Variant>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariantTable {
    #[serde(default, rename = "byKey")]
    pub by_key: HashMap<String, VariantBlock>,
}

/// Saludo fijo cuando no hay ninguna variante configurada para la clave.
pub fn default_greeting(name: &str) -> String {
    format!("Hola {name}, ¿te muestro una ruta clara para empezar hoy con 10–15 min al día?")
}

impl VariantTable {
    /// Lee la tabla desde disco; un fichero ausente o corrupto deja la
    /// tabla vacía en lugar de tumbar el arranque.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<VariantTable>(&raw) {
                Ok(table) => table,
                Err(e) => {
                    warn!("variants.json malformado ({e}); se usa tabla vacía");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// Resuelve la lista de candidatas: clave exacta, luego `_default` para
    /// la misma etapa, luego `_default::rebatir`.
    fn resolve(&self, intent: Intent, stage: Stage) -> Option<&VariantBlock> {
        let key = format!("{}::{}", intent.as_str(), stage.as_str());
        self.by_key
            .get(&key)
            .or_else(|| self.by_key.get(&format!("_default::{}", stage.as_str())))
            .or_else(|| self.by_key.get("_default::rebatir"))
    }

    /// Selección ponderada: r uniforme en [0, total) y se resta el peso de
    /// cada candidata en orden de lista hasta quedar en no-positivo.
    pub fn pick(&self, intent: Intent, stage: Stage, name: &str, rng: &mut impl Rng) -> String {
        let list = match self.resolve(intent, stage) {
            Some(block) if !block.variants.is_empty() => &block.variants,
            _ => return default_greeting(name),
        };

        let total: f64 = list.iter().map(|v| v.weight.unwrap_or(1.0)).sum();
        if total > 0.0 {
            let mut r = rng.gen::<f64>() * total;
            for v in list {
                r -= v.weight.unwrap_or(1.0);
                if r <= 0.0 {
                    return v.text.replace("{name}", name);
                }
            }
        }
        list[0].text.replace("{name}", name)
    }
}
