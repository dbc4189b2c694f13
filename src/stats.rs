//! Registro en disco de impresiones y valoraciones por (intent, etapa, texto).
//!
//! El proceso es el único escritor del fichero: la tabla vive en memoria y
//! cada mutación persiste el JSON completo. Las entradas nunca se borran;
//! la clave es el texto literal de la respuesta.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::StatsRow;

/// Valoración del asesor sobre una respuesta mostrada.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rating {
    Good,
    Regular,
    Bad,
}

impl Rating {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "good" => Some(Self::Good),
            "regular" => Some(Self::Regular),
            "bad" => Some(Self::Bad),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatEntry {
    #[serde(default)]
    pub shown: u64,
    #[serde(default)]
    pub wins: f64,
    #[serde(default)]
    pub good: u64,
    #[serde(default)]
    pub regular: u64,
    #[serde(default)]
    pub bad: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StatsFile {
    #[serde(default, rename = "byKey")]
    by_key: HashMap<String, HashMap<String, StatEntry>>,
}

pub struct StatsStore {
    path: PathBuf,
    data: StatsFile,
}

impl StatsStore {
    /// Carga la tabla desde disco; fichero ausente o corrupto arranca vacío.
    pub fn load(path: &Path) -> Self {
        let data = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<StatsFile>(&raw) {
                Ok(d) => d,
                Err(e) => {
                    warn!("stats.json malformado ({e}); se arranca con tabla vacía");
                    StatsFile::default()
                }
            },
            Err(_) => StatsFile::default(),
        };
        Self {
            path: path.to_path_buf(),
            data,
        }
    }

    fn entry(&mut self, intent: &str, stage: &str, text: &str) -> &mut StatEntry {
        let key = format!("{intent}::{stage}");
        self.data
            .by_key
            .entry(key)
            .or_default()
            .entry(text.trim().to_string())
            .or_default()
    }

    /// Una respuesta más mostrada al asesor.
    pub fn record_impression(&mut self, intent: &str, stage: &str, text: &str) -> Result<()> {
        self.entry(intent, stage, text).shown += 1;
        self.persist()
    }

    /// Acumula la valoración: good +1.0, regular +0.5, bad +0. El contador
    /// `shown` se eleva a 1 como mínimo; una valoración no debería llegar
    /// antes que la impresión pero la frontera no lo garantiza.
    pub fn record_rating(
        &mut self,
        intent: &str,
        stage: &str,
        text: &str,
        rating: Rating,
    ) -> Result<()> {
        let entry = self.entry(intent, stage, text);
        entry.shown = entry.shown.max(1);
        match rating {
            Rating::Good => {
                entry.good += 1;
                entry.wins += 1.0;
            }
            Rating::Regular => {
                entry.regular += 1;
                entry.wins += 0.5;
            }
            Rating::Bad => {
                entry.bad += 1;
            }
        }
        self.persist()
    }

    /// Proyección para `/stats` y el dashboard: winrate a 3 decimales,
    /// orden descendente por winrate y luego por exposición.
    pub fn rows(&self) -> Vec<StatsRow> {
        let mut out = Vec::new();
        for (key, texts) in &self.data.by_key {
            let (intent, stage) = key.split_once("::").unwrap_or((key.as_str(), ""));
            for (text, e) in texts {
                let winrate = if e.shown > 0 {
                    (e.wins / e.shown as f64 * 1000.0).round() / 1000.0
                } else {
                    0.0
                };
                out.push(StatsRow {
                    intent: intent.to_string(),
                    stage: stage.to_string(),
                    text: text.clone(),
                    shown: e.shown,
                    wins: e.wins,
                    winrate,
                    good: e.good,
                    regular: e.regular,
                    bad: e.bad,
                });
            }
        }
        out.sort_by(|a, b| {
            b.winrate
                .partial_cmp(&a.winrate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.shown.cmp(&a.shown))
        });
        out
    }

    fn persist(&self) -> Result<()> {
        let raw = serde_json::to_string_pretty(&self.data)?;
        std::fs::write(&self.path, raw)
            .with_context(|| format!("escribiendo {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> StatsStore {
        StatsStore::load(&dir.path().join("stats.json"))
    }

    #[test]
    fn impresion_crea_y_acumula() {
        let dir = TempDir::new().unwrap();
        let mut s = store(&dir);
        s.record_impression("precio", "cierre", "X").unwrap();
        s.record_impression("precio", "cierre", "X").unwrap();

        let rows = s.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].shown, 2);
        assert_eq!(rows[0].intent, "precio");
        assert_eq!(rows[0].stage, "cierre");
    }

    #[test]
    fn good_y_bad_sobre_el_mismo_texto() {
        let dir = TempDir::new().unwrap();
        let mut s = store(&dir);
        s.record_impression("precio", "cierre", "X").unwrap();
        s.record_impression("precio", "cierre", "X").unwrap();
        s.record_rating("precio", "cierre", "X", Rating::Good).unwrap();
        s.record_rating("precio", "cierre", "X", Rating::Bad).unwrap();

        let rows = s.rows();
        assert_eq!(rows[0].shown, 2);
        assert_eq!(rows[0].good, 1);
        assert_eq!(rows[0].bad, 1);
        assert_eq!(rows[0].wins, 1.0);
        assert_eq!(rows[0].winrate, 0.5);
    }

    #[test]
    fn valoracion_sin_impresion_eleva_shown_a_uno() {
        let dir = TempDir::new().unwrap();
        let mut s = store(&dir);
        s.record_rating("tiempo", "sondeo", "Y", Rating::Regular).unwrap();

        let rows = s.rows();
        assert_eq!(rows[0].shown, 1);
        assert_eq!(rows[0].regular, 1);
        assert_eq!(rows[0].wins, 0.5);
        assert_eq!(rows[0].winrate, 0.5);
    }

    #[test]
    fn winrate_redondeado_a_tres_decimales() {
        let dir = TempDir::new().unwrap();
        let mut s = store(&dir);
        for _ in 0..3 {
            s.record_impression("cert", "rebatir", "Z").unwrap();
        }
        s.record_rating("cert", "rebatir", "Z", Rating::Good).unwrap();
        // wins 1.0 / shown 3 = 0.333…
        assert_eq!(s.rows()[0].winrate, 0.333);
    }

    #[test]
    fn orden_por_winrate_y_exposicion() {
        let dir = TempDir::new().unwrap();
        let mut s = store(&dir);
        s.record_impression("precio", "cierre", "peor").unwrap();
        s.record_rating("precio", "cierre", "mejor", Rating::Good).unwrap();
        s.record_impression("tiempo", "cierre", "empate-a").unwrap();
        s.record_rating("tiempo", "cierre", "empate-a", Rating::Bad).unwrap();

        let rows = s.rows();
        assert_eq!(rows[0].text, "mejor");
        assert_eq!(rows.last().unwrap().winrate, 0.0);
    }

    #[test]
    fn persiste_y_recarga_desde_disco() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.json");
        {
            let mut s = StatsStore::load(&path);
            s.record_impression("precio", "cierre", "X").unwrap();
            s.record_rating("precio", "cierre", "X", Rating::Good).unwrap();
        }
        let s = StatsStore::load(&path);
        let rows = s.rows();
        assert_eq!(rows[0].shown, 1);
        assert_eq!(rows[0].wins, 1.0);
    }

    #[test]
    fn fichero_corrupto_arranca_vacio() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stats.json");
        std::fs::write(&path, "{no es json").unwrap();
        let s = StatsStore::load(&path);
        assert!(s.rows().is_empty());
    }
}
