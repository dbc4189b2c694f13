//! Cadena de guardas aplicada a cada respuesta candidata antes de
//! devolverla al widget.
//!
//! Orden fijo: recorte de frases/caracteres → limpieza de frases prohibidas
//! → allowlist de títulos del catálogo → resolución de conflicto de plan →
//! inyección del link de pago → re-chequeo duro. La cadena completa es
//! estable: aplicarla sobre su propia salida no cambia nada.

use anyhow::Result;
use regex::Regex;

use crate::models::{Intent, Stage};

/// Presupuesto duro de caracteres estilo WhatsApp.
pub const MAX_REPLY_CHARS: usize = 220;

/// Sustituto genérico para títulos que no existen en el catálogo.
const GENERIC_PATH: &str = "una ruta guiada";

/// Plan detectado en el texto del cliente.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanHint {
    Individual,
    Pareja,
    Grupo,
}

/// Contexto de una pasada de guardas sobre una respuesta.
pub struct GuardContext<'a> {
    pub intent: Intent,
    pub stage: Stage,
    pub customer_name: &'a str,
    /// Títulos reales (rutas/cursos/áreas/planes) que sí pueden mencionarse.
    pub allowed_titles: &'a [String],
    /// Pregunta + contexto del cliente, para detectar el plan que busca.
    pub hint_source: &'a str,
    /// `None` cuando el toggle de link de pago está apagado.
    pub payment_link: Option<&'a str>,
}

pub struct Guardrails {
    banned: Regex,
    url: Regex,
    price_signal: Regex,
    titled_span: Regex,
    duo: Regex,
    grupos: Regex,
    expert: Regex,
    pair_hint: Regex,
    group_hint: Regex,
}

impl Guardrails {
    pub fn new() -> Result<Self> {
        Ok(Self {
            banned: Regex::new(
                r"(?i)\b(te (env[ií]o|mando|paso|agendo|llamo)|llamada|material(es)?)\b",
            )?,
            url: Regex::new(r"(?i)https?://|platzi\.com")?,
            // Código ISO, símbolo de moneda o número de varios dígitos.
            price_signal: Regex::new(
                r"(?i)\b(cop|usd|mxn|clp|pen|uyu|gtq|bob|pyg|dop|crc|ars|eur)\b|[$€₲₡]|\bS/|\bBs\b|\bQ\d|\b\d{3,}\b",
            )?,
            // Span de dos o más palabras capitalizadas, con conectores opcionales.
            titled_span: Regex::new(
                r"\b\p{Lu}[\p{L}\p{N}]*(?:\s+(?:de|del|la|el|los|las|y|e|o|u|en|con|para|a)\s+\p{Lu}[\p{L}\p{N}]*|\s+\p{Lu}[\p{L}\p{N}]*)+",
            )?,
            duo: Regex::new(r"(?i)\bexpert\s+duo\b|\bduo\b")?,
            grupos: Regex::new(r"(?i)\bgrupos?\b")?,
            expert: Regex::new(r"(?i)\bexpert(\s+duo)?\b")?,
            pair_hint: Regex::new(
                r"(?i)\b(duo|pareja|los dos|ambos|entre dos|mi (esposo|esposa|novio|novia|hermano|hermana))\b",
            )?,
            group_hint: Regex::new(r"(?i)\b(equipo|empresa|grupo|grupal|compañeros|colegas)\b")?,
        })
    }

    // -----------------------------------------------------------------
    // RECORTES
    // -----------------------------------------------------------------

    /// Recorte estilo WhatsApp: primeras dos frases y máximo 220 caracteres.
    pub fn clamp(text: &str) -> String {
        Self::clamp_chars(&Self::clamp_sentences(text), MAX_REPLY_CHARS)
    }

    /// Se queda con las dos primeras frases. Frontera de frase: `.`, `!` o
    /// `?` seguido de espacio en blanco.
    fn clamp_sentences(text: &str) -> String {
        let mut sentences: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut chars = text.trim().chars().peekable();

        while let Some(c) = chars.next() {
            current.push(c);
            if matches!(c, '.' | '!' | '?')
                && chars.peek().map_or(false, |n| n.is_whitespace())
            {
                while chars.peek().map_or(false, |n| n.is_whitespace()) {
                    chars.next();
                }
                sentences.push(current.trim().to_string());
                current.clear();
                if sentences.len() == 2 {
                    break;
                }
            }
        }
        if sentences.len() < 2 {
            let rest = current.trim();
            if !rest.is_empty() {
                sentences.push(rest.to_string());
            }
        }
        sentences.join(" ")
    }

    /// Trunca a `max` caracteres; si recorta, deja 219 + `…` para que una
    /// segunda pasada ya no tenga nada que hacer.
    fn clamp_chars(text: &str, max: usize) -> String {
        if text.chars().count() <= max {
            return text.to_string();
        }
        let cut: String = text.chars().take(max - 1).collect();
        format!("{}…", cut.trim_end())
    }

    // -----------------------------------------------------------------
    // FRASES PROHIBIDAS
    // -----------------------------------------------------------------

    /// `true` si el texto sigue prometiendo llamadas, envíos o materiales.
    pub fn violates(&self, text: &str) -> bool {
        self.banned.is_match(text)
    }

    fn strip_banned(&self, text: &str) -> String {
        normalize(&self.banned.replace_all(text, ""))
    }

    /// Saneado simple (recorte + prohibidas); es lo único que aplica el
    /// endpoint de una sola llamada.
    pub fn sanitize(&self, text: &str) -> String {
        self.strip_banned(&Self::clamp(text))
    }

    // -----------------------------------------------------------------
    // TÍTULOS DEL CATÁLOGO
    // -----------------------------------------------------------------

    /// Sustituye spans capitalizados que no llevan ningún título real y
    /// limita a dos las menciones de títulos reales. Un span cuenta como
    /// real si contiene algún título permitido (la palabra capitalizada que
    /// abre la frase suele colarse en el span y no debe invalidarlo). Los
    /// spans con el nombre del cliente no se tocan.
    fn enforce_titles(&self, text: &str, ctx: &GuardContext) -> String {
        let allowed: Vec<String> = ctx
            .allowed_titles
            .iter()
            .map(|t| t.trim().to_lowercase())
            .collect();
        let name = ctx.customer_name.trim().to_lowercase();

        let mut mentions = 0usize;
        let mut out = String::new();
        let mut last = 0usize;
        for m in self.titled_span.find_iter(text) {
            let span_lower = m.as_str().to_lowercase();
            if !name.is_empty() && span_lower.contains(&name) {
                continue;
            }
            if allowed.iter().any(|t| span_lower.contains(t.as_str())) {
                mentions += 1;
                if mentions <= 2 {
                    continue;
                }
            }
            out.push_str(&text[last..m.start()]);
            out.push_str(GENERIC_PATH);
            last = m.end();
        }
        out.push_str(&text[last..]);
        out
    }

    // -----------------------------------------------------------------
    // CONFLICTO DE PLAN
    // -----------------------------------------------------------------

    /// Plan que el cliente trae en su mensaje; pareja y grupo por keywords,
    /// individual en ausencia de señal.
    pub fn plan_hint(&self, text: &str) -> PlanHint {
        if self.pair_hint.is_match(text) {
            PlanHint::Pareja
        } else if self.group_hint.is_match(text) {
            PlanHint::Grupo
        } else {
            PlanHint::Individual
        }
    }

    /// Elimina nombres de plan incompatibles con el hint. "Grupos" no
    /// sobrevive nunca en una respuesta.
    fn resolve_plan_conflict(&self, text: &str, hint: PlanHint) -> String {
        let t = self.grupos.replace_all(text, "").to_string();
        let t = match hint {
            PlanHint::Individual => self.duo.replace_all(&t, "").to_string(),
            PlanHint::Pareja => self.strip_standalone_expert(&t),
            PlanHint::Grupo => t,
        };
        normalize(&t)
    }

    /// Quita "Expert" cuando no forma parte de "Expert Duo".
    fn strip_standalone_expert(&self, text: &str) -> String {
        let mut out = String::new();
        let mut last = 0usize;
        for caps in self.expert.captures_iter(text) {
            if caps.get(1).is_none() {
                let m = caps.get(0).expect("grupo 0 siempre existe");
                out.push_str(&text[last..m.start()]);
                last = m.end();
            }
        }
        out.push_str(&text[last..]);
        out
    }

    // -----------------------------------------------------------------
    // LINK DE PAGO
    // -----------------------------------------------------------------

    /// Anexa el link sólo en cierre, con intención de precio o señal de
    /// precio en el propio texto, y nunca si ya hay una URL. Se une con
    /// coma para no abrir una tercera frase.
    fn inject_payment_link(&self, text: &str, ctx: &GuardContext) -> String {
        let Some(link) = ctx.payment_link else {
            return text.to_string();
        };
        if ctx.stage != Stage::Cierre {
            return text.to_string();
        }
        let price_like = ctx.intent == Intent::Precio || self.price_signal.is_match(text);
        if !price_like || self.url.is_match(text) {
            return text.to_string();
        }
        let base = text.trim_end().trim_end_matches(['.', '!', '?']).trim_end();
        Self::clamp_chars(&format!("{base}, más opciones aquí: {link}"), MAX_REPLY_CHARS)
    }

    // -----------------------------------------------------------------
    // CADENA COMPLETA
    // -----------------------------------------------------------------

    pub fn apply(&self, raw: &str, ctx: &GuardContext) -> String {
        let t = Self::clamp(raw);
        let t = self.strip_banned(&t);
        let t = self.enforce_titles(&t, ctx);
        let t = self.resolve_plan_conflict(&t, self.plan_hint(ctx.hint_source));
        let t = Self::clamp_chars(&t, MAX_REPLY_CHARS);
        let t = self.inject_payment_link(&t, ctx);
        if self.violates(&t) {
            safe_reply(ctx.customer_name)
        } else {
            t
        }
    }
}

/// Respuesta fija cuando una candidata sigue violando las reglas duras
/// después de toda la cadena.
pub fn safe_reply(name: &str) -> String {
    format!("Entendido, {name}; hay una ruta clara para tu objetivo y puedes empezar hoy mismo.")
}

/// Colapsa espacios y corrige espacios huérfanos antes de coma y punto.
fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace(" ,", ",")
        .replace(" .", ".")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guards() -> Guardrails {
        Guardrails::new().unwrap()
    }

    fn ctx<'a>(
        intent: Intent,
        stage: Stage,
        titles: &'a [String],
        hint: &'a str,
        link: Option<&'a str>,
    ) -> GuardContext<'a> {
        GuardContext {
            intent,
            stage,
            customer_name: "Laura",
            allowed_titles: titles,
            hint_source: hint,
            payment_link: link,
        }
    }

    const LINK: &str = "https://platzi.com/precios/";

    #[test]
    fn recorta_a_dos_frases_y_220_caracteres() {
        let tres = "Primera frase. Segunda frase! Tercera que sobra.";
        assert_eq!(Guardrails::clamp(tres), "Primera frase. Segunda frase!");

        let larga = "a".repeat(500);
        let out = Guardrails::clamp(&larga);
        assert!(out.chars().count() <= MAX_REPLY_CHARS);
        assert!(out.ends_with('…'));

        // Con acentos el recorte sigue cayendo en frontera de carácter.
        let acentos = "á".repeat(300);
        let out = Guardrails::clamp(&acentos);
        assert!(out.chars().count() <= MAX_REPLY_CHARS);
    }

    #[test]
    fn recorte_es_idempotente() {
        let larga = format!("{}. {}. {}.", "x".repeat(100), "y".repeat(100), "z".repeat(100));
        let una = Guardrails::clamp(&larga);
        assert_eq!(Guardrails::clamp(&una), una);
    }

    #[test]
    fn sanitize_elimina_frases_prohibidas() {
        let g = guards();
        let out = g.sanitize("Te envío el material hoy. ¿Te parece bien la llamada?");
        let lower = out.to_lowercase();
        assert!(!lower.contains("envío"));
        assert!(!lower.contains("material"));
        assert!(!lower.contains("llamada"));
    }

    #[test]
    fn cadena_completa_es_idempotente() {
        let g = guards();
        let titles = vec!["Ruta Frontend".to_string()];
        let casos = [
            "El plan cuesta $349.000 al año. Puedes empezar hoy con la Ruta Frontend.",
            "Hola Laura, la Ruta Frontend y la Mega Ruta Ninja te sirven. Son $349.000.",
            "Texto plano sin nada especial que recortar.",
        ];
        for raw in casos {
            let c = ctx(Intent::Precio, Stage::Cierre, &titles, "es caro", Some(LINK));
            let once = g.apply(raw, &c);
            let twice = g.apply(&once, &c);
            assert_eq!(once, twice, "la cadena cambió su propia salida: {raw:?}");
        }
    }

    #[test]
    fn link_solo_en_cierre_con_precio() {
        let g = guards();
        let titles: Vec<String> = Vec::new();

        // cierre + intent precio → link presente
        let c = ctx(Intent::Precio, Stage::Cierre, &titles, "", Some(LINK));
        let out = g.apply("Es una gran decisión hoy", &c);
        assert!(out.contains("platzi.com/precios"));

        // cierre + señal de precio en el texto, intent no-precio → link
        let c = ctx(Intent::Default, Stage::Cierre, &titles, "", Some(LINK));
        let out = g.apply("El plan anual queda en $349.000", &c);
        assert!(out.contains("platzi.com/precios"));

        // cierre sin señal ni intent precio → sin link
        let out = g.apply("Mañana seguimos con tu ruta", &c);
        assert!(!out.contains("platzi.com/precios"));

        // etapa distinta de cierre → sin link
        let c = ctx(Intent::Precio, Stage::Sondeo, &titles, "", Some(LINK));
        let out = g.apply("El plan anual queda en $349.000", &c);
        assert!(!out.contains("platzi.com/precios"));

        // toggle apagado → sin link
        let c = ctx(Intent::Precio, Stage::Cierre, &titles, "", None);
        let out = g.apply("El plan anual queda en $349.000", &c);
        assert!(!out.contains("platzi.com/precios"));
    }

    #[test]
    fn link_no_se_duplica() {
        let g = guards();
        let titles: Vec<String> = Vec::new();
        let c = ctx(Intent::Precio, Stage::Cierre, &titles, "", Some(LINK));
        let out = g.apply("Queda en $349.000, mira platzi.com/precios", &c);
        assert_eq!(out.matches("platzi.com/precios").count(), 1);
    }

    #[test]
    fn titulos_desconocidos_se_sustituyen() {
        let g = guards();
        let titles = vec!["Ruta Frontend".to_string()];
        let c = ctx(Intent::Default, Stage::Rebatir, &titles, "", None);

        let out = g.apply("Te recomiendo la Mega Ruta Ninja para empezar", &c);
        assert!(!out.contains("Mega Ruta Ninja"));
        assert!(out.contains("una ruta guiada"));

        // El título real sobrevive; el nombre del cliente no se toca.
        let out = g.apply("Hola Laura, la Ruta Frontend es para ti", &c);
        assert!(out.contains("Ruta Frontend"));
        assert!(out.contains("Laura"));
    }

    #[test]
    fn maximo_dos_menciones_de_titulos_reales() {
        let g = guards();
        let titles = vec!["Ruta Frontend".to_string()];
        let c = ctx(Intent::Default, Stage::Rebatir, &titles, "", None);
        let out = g.apply(
            "Ruta Frontend hoy, Ruta Frontend mañana y Ruta Frontend siempre",
            &c,
        );
        assert_eq!(out.matches("Ruta Frontend").count(), 2);
    }

    #[test]
    fn conflicto_de_plan() {
        let g = guards();
        let titles = vec!["Expert".to_string(), "Expert Duo".to_string()];

        // Sin señal → individual: se elimina el plan Duo.
        let c = ctx(Intent::Precio, Stage::Rebatir, &titles, "es caro", None);
        let out = g.apply("Tienes Expert y Expert Duo disponibles", &c);
        assert!(out.contains("Expert"));
        assert!(!out.contains("Duo"));

        // Señal de pareja → se elimina el Expert suelto, queda Expert Duo.
        let c = ctx(
            Intent::Precio,
            Stage::Rebatir,
            &titles,
            "somos mi esposa y yo, los dos",
            None,
        );
        let out = g.apply("Tienes Expert y Expert Duo disponibles", &c);
        assert!(out.contains("Expert Duo"));
        assert!(!out.replace("Expert Duo", "").contains("Expert"));

        // "Grupos" no sobrevive nunca.
        let c = ctx(Intent::Precio, Stage::Rebatir, &titles, "para mi equipo", None);
        let out = g.apply("También está el plan Grupos", &c);
        assert!(!out.to_lowercase().contains("grupo"));
    }

    #[test]
    fn violacion_persistente_cae_en_respuesta_segura() {
        let g = guards();
        let titles: Vec<String> = Vec::new();
        let c = ctx(Intent::Default, Stage::Rebatir, &titles, "", None);
        // El doble espacio esquiva la limpieza y el re-chequeo lo caza.
        let out = g.apply("Te  envío opciones hoy mismo.", &c);
        assert_eq!(out, safe_reply("Laura"));
    }
}
