//! Carga en memoria de identidad, conocimiento, catálogo y precios.
//!
//! Todo se lee al arrancar (y al recargar desde admin); el fallo de un
//! fichero individual degrada a vacío/default, nunca tumba la carga.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;
use walkdir::WalkDir;

use crate::config::AppConfig;
use crate::models::Intent;

/// Presupuesto de caracteres del snippet de conocimiento inyectado al prompt.
const KNOWLEDGE_BUDGET: usize = 8000;

// ---------------------------------------------------------------------
// IDENTIDAD + CONOCIMIENTO
// ---------------------------------------------------------------------

/// Identidad del entrenador y ficheros de conocimiento, cacheados en memoria.
#[derive(Debug, Clone, Default)]
pub struct TrainerStore {
    pub identity: String,
    /// nombre de fichero → contenido (sólo .md/.txt del directorio de conocimiento).
    pub knowledge: HashMap<String, String>,
}

impl TrainerStore {
    pub fn load(cfg: &AppConfig) -> Self {
        let identity = std::fs::read_to_string(cfg.identity_path())
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        let mut knowledge = HashMap::new();
        for entry in WalkDir::new(cfg.knowledge_dir())
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let name = entry.file_name().to_string_lossy().to_string();
            let lower = name.to_lowercase();
            if !lower.ends_with(".md") && !lower.ends_with(".txt") {
                continue;
            }
            match std::fs::read_to_string(entry.path()) {
                Ok(content) => {
                    let content = content.trim().to_string();
                    if !content.is_empty() {
                        knowledge.insert(name, content);
                    }
                }
                Err(e) => warn!("no se pudo leer {}: {e}", entry.path().display()),
            }
        }

        Self {
            identity,
            knowledge,
        }
    }

    pub fn knowledge_len(&self) -> usize {
        self.knowledge.values().map(|c| c.len()).sum()
    }

    /// Ficheros de conocimiento a inyectar según el intent; `default.md`
    /// va siempre al final.
    fn files_for(intent: Intent) -> &'static [&'static str] {
        match intent {
            Intent::Precio => &["precio.md", "competencia.md", "default.md"],
            Intent::Tiempo => &["tiempo.md", "default.md"],
            Intent::Cert => &["cert.md", "default.md"],
            Intent::Competencia => &["competencia.md", "default.md"],
            Intent::Pitch => &["pitch.md", "default.md"],
            Intent::Empleo => &["empleo.md", "default.md"],
            Intent::Default => &["default.md"],
        }
    }

    /// Concatena los ficheros del intent en el orden del mapa y recorta al
    /// presupuesto de caracteres.
    pub fn snippet_for(&self, intent: Intent) -> String {
        let parts: Vec<String> = Self::files_for(intent)
            .iter()
            .filter_map(|f| {
                self.knowledge
                    .get(*f)
                    .map(|content| format!("# {f}\n{content}"))
            })
            .collect();
        truncate_chars(&parts.join("\n\n---\n\n"), KNOWLEDGE_BUDGET)
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

// ---------------------------------------------------------------------
// CATÁLOGO
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub areas: Vec<Area>,
    #[serde(default)]
    pub platform: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Area {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub micro_goal: Option<String>,
    #[serde(default)]
    pub certification: bool,
    #[serde(default)]
    pub cta: Option<String>,
    #[serde(default)]
    pub routes: Vec<RouteInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouteInfo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub courses: Vec<Course>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Course {
    #[serde(default)]
    pub title: String,
}

impl Catalog {
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<Catalog>(&raw) {
                Ok(c) => c,
                Err(e) => {
                    warn!("catalog.json malformado ({e}); se usa catálogo vacío");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Mejor área por solapamiento de keywords con el texto del cliente.
    /// Devuelve `None` si ninguna keyword aparece.
    pub fn best_area_match(&self, text: &str) -> Option<(&Area, usize)> {
        let s = text.to_lowercase();
        let mut best: Option<(&Area, usize)> = None;
        for area in &self.areas {
            let score = area
                .keywords
                .iter()
                .filter(|kw| s.contains(&kw.to_lowercase()))
                .count();
            if score > best.map(|(_, sc)| sc).unwrap_or(0) {
                best = Some((area, score));
            }
        }
        best
    }

    /// Bloque de contexto seguro para el prompt: área, micro-meta, ruta y
    /// hasta tres cursos de ejemplo.
    pub fn context_for(&self, text: &str) -> String {
        let Some((area, _score)) = self.best_area_match(text) else {
            return String::new();
        };
        let route = area.routes.first();
        let courses: Vec<String> = route
            .map(|r| {
                r.courses
                    .iter()
                    .take(3)
                    .map(|c| format!("- {}", c.title))
                    .collect()
            })
            .unwrap_or_default();

        let mut lines = vec![format!("Área sugerida (catálogo seguro): {}", area.name)];
        if let Some(goal) = &area.micro_goal {
            lines.push(format!("Micro-meta: {goal}"));
        }
        if let Some(r) = route {
            lines.push(format!("Ruta: {}", r.title));
        }
        if !courses.is_empty() {
            lines.push(format!("Cursos (ejemplos):\n{}", courses.join("\n")));
        }
        lines.push(if area.certification {
            "Incluye certificación.".to_string()
        } else {
            "Sin certificación formal.".to_string()
        });
        if let Some(cta) = &area.cta {
            lines.push(format!("CTA sugerida: {cta}"));
        }
        lines.join("\n")
    }

    /// Títulos reales permitidos en las respuestas (rutas, cursos, áreas y
    /// los nombres de plan); todo lo demás que parezca un título se
    /// sustituye en las guardas.
    pub fn allowed_titles(&self) -> Vec<String> {
        let mut titles: Vec<String> = vec![
            "Expert".to_string(),
            "Expert Duo".to_string(),
        ];
        for area in &self.areas {
            titles.push(area.name.clone());
            for route in &area.routes {
                titles.push(route.title.clone());
                for course in &route.courses {
                    titles.push(course.title.clone());
                }
            }
        }
        titles.retain(|t| !t.trim().is_empty());
        titles
    }
}

// ---------------------------------------------------------------------
// PRECIOS
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Prices {
    #[serde(default)]
    pub currencies: HashMap<String, PlanPrices>,
    #[serde(default)]
    pub promo: HashMap<String, PlanPrices>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanPrices {
    #[serde(default, rename = "Expert")]
    pub expert: Option<f64>,
    #[serde(default, rename = "Duo")]
    pub duo: Option<f64>,
    #[serde(default, rename = "Grupos")]
    pub grupos: Option<f64>,
}

impl Prices {
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<Prices>(&raw) {
                Ok(p) => p,
                Err(e) => {
                    warn!("prices.json malformado ({e}); se usa tabla vacía");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Líneas de precio sólo para Expert y Expert Duo, prefiriendo la tabla
    /// de promo cuando existe para esa moneda.
    pub fn price_lines(&self, currency: &str, use_promo: bool) -> Vec<String> {
        if !self.currencies.contains_key(currency) {
            return Vec::new();
        }
        let src = if use_promo {
            match self.promo.get(currency) {
                Some(p) => p,
                None => return Vec::new(),
            }
        } else {
            &self.currencies[currency]
        };

        let mut out = Vec::new();
        if let Some(v) = src.expert {
            out.push(format!("Expert: {}", money(currency, v)));
        }
        if let Some(v) = src.duo {
            out.push(format!("Expert Duo: {}", money(currency, v)));
        }
        out
    }

    /// Bloque de contexto de precios para el prompt (intent precio).
    pub fn context_for(&self, currency: &str, payment_link: &str) -> String {
        let lines = self.price_lines(currency, true);
        if lines.is_empty() {
            return format!(
                "No se hallaron precios para la moneda detectada; referencia única: {payment_link}"
            );
        }
        let mut out = vec![
            format!("Moneda detectada: {currency}"),
            "Planes (solo personales):".to_string(),
        ];
        out.extend(lines.iter().map(|l| format!("- {l}")));
        out.push(format!("Link de pago: {payment_link}"));
        out.join("\n")
    }
}

/// Detección básica de moneda por keywords del texto; fallback COP.
pub fn detect_currency(text: &str) -> &'static str {
    let s = text.to_lowercase();
    let table: &[(&[&str], &str)] = &[
        (&["méxico", "mexico", "mxn", "cdmx"], "MXN"),
        (&["colombia", "cop", "bogotá", "bogota", "medellín", "medellin"], "COP"),
        (&["chile", "clp", "santiago"], "CLP"),
        (&["perú", "peru", "pen", "lima"], "PEN"),
        (&["uruguay", "uyu", "montevideo"], "UYU"),
        (&["guatemala", "gtq"], "GTQ"),
        (&["bolivia", "bob", "la paz", "santa cruz"], "BOB"),
        (&["paraguay", "pyg", "asunción", "asuncion"], "PYG"),
        (&["república dominicana", "republica dominicana", "dop", "santo domingo"], "DOP"),
        (&["costa rica", "crc", "san josé", "san jose"], "CRC"),
        (&["argentina", "ars", "buenos aires"], "ARS"),
        (&["usa", "eeuu", "estados unidos", "usd", "miami", "new york"], "USD"),
        (&["europa", "eur", "euros", "españa", "espana", "madrid", "barcelona"], "EUR"),
    ];
    for (keywords, currency) in table {
        if keywords.iter().any(|kw| s.contains(kw)) {
            return currency;
        }
    }
    "COP"
}

/// Formato rápido con símbolo y agrupación de miles estilo es-CO.
fn money(currency: &str, value: f64) -> String {
    let symbol = match currency {
        "PEN" => "S/",
        "GTQ" => "Q",
        "BOB" => "Bs",
        "PYG" => "₲",
        "DOP" => "RD$",
        "CRC" => "₡",
        "EUR" => "€",
        _ => "$",
    };
    format!("{symbol}{}", group_thousands(value.round() as i64))
}

fn group_thousands(n: i64) -> String {
    let digits = n.abs().to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    if n < 0 {
        format!("-{out}")
    } else {
        out
    }
}

// ---------------------------------------------------------------------
// ESTRUCTURA EN DISCO
// ---------------------------------------------------------------------

/// Asegura el directorio de datos y siembra los ficheros ausentes con sus
/// defaults vacíos. Se ejecuta una vez al arrancar.
pub fn ensure_layout(cfg: &AppConfig) -> Result<()> {
    std::fs::create_dir_all(&cfg.data_dir)
        .with_context(|| format!("creando {}", cfg.data_dir.display()))?;
    std::fs::create_dir_all(cfg.knowledge_dir())
        .with_context(|| format!("creando {}", cfg.knowledge_dir().display()))?;

    let seeds: &[(std::path::PathBuf, String)] = &[
        (cfg.memory_path(), json!({ "items": [] }).to_string()),
        (cfg.variants_path(), json!({ "byKey": {} }).to_string()),
        (cfg.stats_path(), json!({ "byKey": {} }).to_string()),
        (cfg.identity_path(), String::new()),
        (
            cfg.catalog_path(),
            json!({ "areas": [], "platform": {} }).to_string(),
        ),
        (
            cfg.prices_path(),
            json!({ "currencies": {}, "promo": {} }).to_string(),
        ),
    ];
    for (path, default) in seeds {
        if !path.exists() {
            std::fs::write(path, default).with_context(|| format!("sembrando {}", path.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_demo() -> Catalog {
        serde_json::from_value(json!({
            "areas": [
                {
                    "name": "Desarrollo Web",
                    "keywords": ["web", "javascript", "frontend"],
                    "micro_goal": "Tu primera página en 2 semanas",
                    "certification": true,
                    "cta": "Empieza hoy con la ruta de frontend",
                    "routes": [
                        {
                            "title": "Ruta Frontend",
                            "courses": [
                                {"title": "Curso de HTML"},
                                {"title": "Curso de JavaScript"},
                                {"title": "Curso de React"},
                                {"title": "Curso de Vue"}
                            ]
                        }
                    ]
                },
                {
                    "name": "Data Science",
                    "keywords": ["datos", "python"],
                    "certification": false,
                    "routes": []
                }
            ],
            "platform": {}
        }))
        .unwrap()
    }

    #[test]
    fn area_match_por_solapamiento() {
        let c = catalog_demo();
        let (area, score) = c.best_area_match("quiero aprender javascript y frontend").unwrap();
        assert_eq!(area.name, "Desarrollo Web");
        assert_eq!(score, 2);
        assert!(c.best_area_match("quiero cocinar").is_none());
    }

    #[test]
    fn contexto_de_catalogo_incluye_tres_cursos() {
        let c = catalog_demo();
        let ctx = c.context_for("algo de web");
        assert!(ctx.contains("Área sugerida (catálogo seguro): Desarrollo Web"));
        assert!(ctx.contains("Curso de React"));
        assert!(!ctx.contains("Curso de Vue"));
        assert!(ctx.contains("Incluye certificación."));
    }

    #[test]
    fn snippet_respeta_orden_y_presupuesto() {
        let mut store = TrainerStore::default();
        store
            .knowledge
            .insert("precio.md".to_string(), "datos de precio".to_string());
        store
            .knowledge
            .insert("default.md".to_string(), "base".to_string());
        store
            .knowledge
            .insert("empleo.md".to_string(), "no debería entrar".to_string());

        let snippet = store.snippet_for(Intent::Precio);
        let idx_precio = snippet.find("# precio.md").unwrap();
        let idx_default = snippet.find("# default.md").unwrap();
        assert!(idx_precio < idx_default);
        assert!(!snippet.contains("empleo"));

        let mut grande = TrainerStore::default();
        grande
            .knowledge
            .insert("default.md".to_string(), "x".repeat(20_000));
        assert_eq!(grande.snippet_for(Intent::Default).chars().count(), 8000);
    }

    #[test]
    fn moneda_detectada_o_cop() {
        assert_eq!(detect_currency("soy de México"), "MXN");
        assert_eq!(detect_currency("vivo en lima"), "PEN");
        assert_eq!(detect_currency("sin pistas"), "COP");
    }

    #[test]
    fn lineas_de_precio_prefieren_promo_y_omiten_grupos() {
        let p: Prices = serde_json::from_value(json!({
            "currencies": { "COP": { "Expert": 499000, "Duo": 749000, "Grupos": 999000 } },
            "promo": { "COP": { "Expert": 349000, "Duo": 549000 } }
        }))
        .unwrap();

        let lines = p.price_lines("COP", true);
        assert_eq!(lines, vec!["Expert: $349.000", "Expert Duo: $549.000"]);

        let lista = p.price_lines("COP", false);
        assert_eq!(lista[0], "Expert: $499.000");
        assert!(lista.iter().all(|l| !l.contains("Grupos")));

        assert!(p.price_lines("MXN", true).is_empty());
    }

    #[test]
    fn contexto_de_precios_con_y_sin_datos() {
        let p: Prices = serde_json::from_value(json!({
            "currencies": { "COP": { "Expert": 349000 } },
            "promo": { "COP": { "Expert": 349000 } }
        }))
        .unwrap();
        let ctx = p.context_for("COP", "https://pagos.example/");
        assert!(ctx.contains("Moneda detectada: COP"));
        assert!(ctx.contains("Link de pago: https://pagos.example/"));

        let vacio = Prices::default().context_for("COP", "https://pagos.example/");
        assert!(vacio.contains("referencia única"));
    }
}
