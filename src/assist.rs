//! Pipeline completo de generación: clasificar → armar prompt con contexto →
//! llamar al modelo → parsear REPLY/WHY/NEXT → guardas → stats.
//!
//! Flujo:
//!   1. Intent del mensaje (override del widget o clasificador).
//!   2. Snippet de conocimiento + contexto de catálogo + contexto de precios.
//!   3. Llamada al modelo (con respaldo) y parseo del formato de tres líneas.
//!   4. Cadena de guardas sobre la respuesta candidata.
//!   5. Registro de la impresión.

use anyhow::Result;
use regex::Regex;
use tracing::{error, info};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::guardrails::{safe_reply, GuardContext, Guardrails};
use crate::models::{Intent, Sentiment, Stage};

/// Resultado del pipeline; nunca viene vacío. `error_note` sólo se llena
/// cuando el modelo falló y la respuesta es el texto seguro de respaldo.
#[derive(Debug, Clone)]
pub struct AssistOutcome {
    pub reply: String,
    pub why: String,
    pub next: String,
    pub model: String,
    pub intent: Intent,
    pub stage: Stage,
    pub sentiment: Sentiment,
    pub error_note: Option<String>,
}

/// Campos extraídos de la respuesta del modelo; cualquiera puede faltar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedReply {
    pub reply: Option<String>,
    pub why: Option<String>,
    pub next: Option<String>,
}

/// Parser del contrato de tres líneas `REPLY:/WHY:/NEXT:`. El modelo no
/// siempre lo respeta, así que cada campo es opcional y el llamante decide
/// los fallbacks.
pub struct ReplyParser {
    re_reply: Regex,
    re_why: Regex,
    re_next: Regex,
}

impl ReplyParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            re_reply: Regex::new(r"(?is)REPLY:\s*(.*?)(?:\n+\s*WHY:|\n+\s*NEXT:|$)")?,
            re_why: Regex::new(r"(?is)WHY:\s*(.*?)(?:\n+\s*NEXT:|$)")?,
            re_next: Regex::new(r"(?is)NEXT:\s*(.*)$")?,
        })
    }

    pub fn parse(&self, content: &str) -> ParsedReply {
        let grab = |re: &Regex| {
            re.captures(content)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|s| !s.is_empty())
        };
        ParsedReply {
            reply: grab(&self.re_reply),
            why: grab(&self.re_why),
            next: grab(&self.re_next),
        }
    }
}

// ---------------------------------------------------------------------
// FALLBACKS DE COACHING
// ---------------------------------------------------------------------

/// Texto de coaching genérico cuando el modelo no entregó `WHY:`.
pub fn fallback_why(stage: Stage, intent: Intent) -> String {
    match stage {
        Stage::Sondeo => "Generar claridad sin fricción para orientar la ruta.".to_string(),
        Stage::Rebatir => "Convertir objeción en valor: plan anual + hábito real.".to_string(),
        Stage::PreCierre => "Quitar fricción y facilitar decisión hoy.".to_string(),
        Stage::Cierre => "Confirmar activación del plan anual de forma amable.".to_string(),
        Stage::Integracion => {
            format!(
                "Afirmar solución y abrir conversación con sintonía ({}).",
                intent.as_str()
            )
        }
    }
}

/// Siguiente paso genérico cuando el modelo no entregó `NEXT:`.
pub fn fallback_next(stage: Stage) -> String {
    match stage {
        Stage::Sondeo => "Hacer una sola pregunta para orientar la ruta.".to_string(),
        Stage::Rebatir => "Reencuadrar y pedir confirmación simple.".to_string(),
        Stage::PreCierre => "Ofrecer decisión A/B y confirmar.".to_string(),
        Stage::Cierre => "Confirmar activación hoy.".to_string(),
        Stage::Integracion => "Invitar a que la persona comparta y mantener ritmo.".to_string(),
    }
}

// ---------------------------------------------------------------------
// PROMPTS
// ---------------------------------------------------------------------

/// Reglas duras de estilo y formato del mensaje final.
const RULES: &[&str] = &[
    "Eres un asesor comercial de Platzi (Colombia). Voz humana, directa y cálida.",
    "WhatsApp: 1–2 frases, ≤220 caracteres. Nada de llamadas, envíos ni promesas sin base.",
    "Vendes plan ANUAL; conecta característica→beneficio→beneficio de vida.",
    "Usa SOLO lo que el cliente dijo (objetivo, área, certificación, competencia).",
    "NO introduzcas temas no mencionados (ej: tiempo o precio) a menos que el cliente los traiga.",
    "Integración: afirmar solución y abrir conversación (sin sondeo duro ni pre-cierre).",
    "Formato ESTRICTO (3 líneas):",
    "REPLY: <mensaje listo WhatsApp>",
    "WHY: <principio de venta/enseñanza breve>",
    "NEXT: <siguiente paso comercial amable>",
    "Varía redacción entre consultas; evita repetir frases previas.",
    "Nunca menciones 'Grupos' en precios; prioriza Expert y Expert Duo.",
];

/// Mensaje de sistema: identidad + reglas + conocimiento + catálogo + precios.
pub fn build_system(
    identity: &str,
    knowledge: &str,
    catalog_context: &str,
    price_context: &str,
) -> String {
    let mut blocks: Vec<String> = Vec::new();
    if !identity.is_empty() {
        blocks.push(identity.to_string());
    }
    blocks.push(RULES.join("\n"));
    if !knowledge.is_empty() {
        blocks.push(format!("Conocimiento relevante:\n{knowledge}"));
    }
    if !catalog_context.is_empty() {
        blocks.push(format!("Catálogo (guía segura, NO inventes):\n{catalog_context}"));
    }
    if !price_context.is_empty() {
        blocks.push(format!(
            "Precios (mostrar si el cliente pidió precio):\n{price_context}"
        ));
    }
    blocks.join("\n\n")
}

/// Mensaje de usuario con los datos de la conversación.
pub fn build_user(
    name: &str,
    stage: Stage,
    intent: Intent,
    context: Option<&str>,
    question: &str,
) -> String {
    let mut lines = vec![
        format!("Nombre del cliente: {name}"),
        format!("Stage: {}", stage.as_str()),
        format!("Intent: {}", intent.as_str()),
    ];
    if let Some(ctx) = context.filter(|c| !c.trim().is_empty()) {
        lines.push(format!("Contexto adicional: {ctx}"));
    }
    lines.push(
        "Extrae primero la necesidad EXACTA del mensaje del cliente (sin inventar):".to_string(),
    );
    lines.push(format!("Mensaje del cliente: {question}"));
    lines.push("Luego entrega REPLY/WHY/NEXT. Mantén las reglas duras.".to_string());
    lines.join("\n")
}

// ---------------------------------------------------------------------
// PIPELINE
// ---------------------------------------------------------------------

/// Resuelve el intent final: override válido del widget o clasificador.
pub fn resolve_intent(state: &AppState, question: &str, overridden: Option<&str>) -> Intent {
    overridden
        .and_then(Intent::parse)
        .unwrap_or_else(|| state.classifier.classify(question))
}

/// Ejecuta el pipeline completo. No falla: un modelo caído degrada a la
/// respuesta segura con `error_note` (la capa HTTP responde 200 igual).
pub async fn run_trainer(
    state: &AppState,
    question: &str,
    name: &str,
    stage: Stage,
    intent_override: Option<&str>,
    context: Option<&str>,
) -> AssistOutcome {
    let request_id = Uuid::new_v4();
    let intent = resolve_intent(state, question, intent_override);
    let sentiment = state.classifier.sentiment(question);
    let hint_source = format!("{question} {}", context.unwrap_or(""));

    // Se copia todo lo necesario fuera de los locks antes de tocar la red.
    let (identity, knowledge) = {
        let trainer = state.trainer.read().unwrap();
        (trainer.identity.clone(), trainer.snippet_for(intent))
    };
    let (catalog_context, allowed_titles) = {
        let catalog = state.catalog.read().unwrap();
        (catalog.context_for(question), catalog.allowed_titles())
    };
    let price_context = if intent == Intent::Precio {
        let currency = crate::knowledge::detect_currency(&hint_source);
        let prices = state.prices.read().unwrap();
        prices.context_for(currency, &state.config.payment_link)
    } else {
        String::new()
    };

    let system = build_system(&identity, &knowledge, &catalog_context, &price_context);
    let user = build_user(name, stage, intent, context, question);

    info!(%request_id, intent = intent.as_str(), stage = stage.as_str(), "assist_trainer");

    let guard_ctx = GuardContext {
        intent,
        stage,
        customer_name: name,
        allowed_titles: &allowed_titles,
        hint_source: &hint_source,
        payment_link: state
            .config
            .payment_link_enabled
            .then_some(state.config.payment_link.as_str()),
    };

    let (reply, why, next, model, error_note) =
        match state.llm.complete(&system, &user).await {
            Ok((content, model)) => {
                let parsed = state.parser.parse(&content);
                let candidate = parsed
                    .reply
                    .unwrap_or_else(|| Guardrails::clamp(content.trim()));
                let reply = state.guardrails.apply(&candidate, &guard_ctx);
                let why = parsed.why.unwrap_or_else(|| fallback_why(stage, intent));
                let next = parsed.next.unwrap_or_else(|| fallback_next(stage));
                (reply, why, next, model, None)
            }
            Err(e) => {
                error!(%request_id, "ambos modelos fallaron: {e}");
                (
                    safe_reply(name),
                    fallback_why(stage, intent),
                    fallback_next(stage),
                    "static-fallback".to_string(),
                    Some(e.to_string()),
                )
            }
        };

    if let Err(e) = state
        .stats
        .lock()
        .unwrap()
        .record_impression(intent.as_str(), stage.as_str(), &reply)
    {
        error!(%request_id, "no se pudo registrar la impresión: {e}");
    }

    AssistOutcome {
        reply,
        why,
        next,
        model,
        intent,
        stage,
        sentiment,
        error_note,
    }
}
