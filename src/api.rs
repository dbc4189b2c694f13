use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{Html, Redirect},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};

use crate::{
    app_state::AppState,
    assist,
    guardrails::Guardrails,
    knowledge::{Catalog, Prices, TrainerStore},
    models::{AssistPayload, RatePayload},
    stats::Rating,
    variants::{self, VariantTable},
};

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/catalog", get(catalog_handler))
        .route("/prices", get(prices_handler))
        .route("/admin/reloadTrainer", get(reload_trainer_handler))
        .route("/admin/reloadCatalog", get(reload_catalog_handler))
        .route("/assist", post(assist_handler))
        .route("/assist_openai", post(assist_openai_handler))
        .route("/assist_trainer", post(assist_trainer_handler))
        .route("/trackRate", post(track_rate_handler))
        .route("/stats", get(stats_handler))
        .route("/admin/dashboard", get(dashboard_handler))
        .route("/agent", get(agent_redirect))
        .route("/panel", get(panel_redirect))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "service": "asistente-ventas-api",
        "time": Utc::now().to_rfc3339(),
        "openai": state.llm.api_key_set,
        "model_env": state.llm.chat_model,
    }))
}

#[axum::debug_handler]
async fn catalog_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let catalog = state.catalog.read().unwrap().clone();
    Json(with_ok(serde_json::to_value(&catalog).unwrap_or_default()))
}

#[axum::debug_handler]
async fn prices_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let prices = state.prices.read().unwrap().clone();
    Json(with_ok(serde_json::to_value(&prices).unwrap_or_default()))
}

/// Inserta `"ok": true` en la raíz del objeto (las tablas se devuelven tal cual).
fn with_ok(mut value: serde_json::Value) -> serde_json::Value {
    if let serde_json::Value::Object(ref mut map) = value {
        map.insert("ok".to_string(), json!(true));
    }
    value
}

// --- Admin: recargas en caliente ---

#[axum::debug_handler]
async fn reload_trainer_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let fresh = TrainerStore::load(&state.config);
    let variants = VariantTable::load(&state.config.variants_path());

    let identity_len = fresh.identity.len();
    let knowledge_len = fresh.knowledge_len();
    let variants_len = variants.len();

    *state.trainer.write().unwrap() = fresh;
    *state.variants.write().unwrap() = variants;
    info!(identity_len, knowledge_len, variants_len, "entrenador recargado");

    Json(json!({
        "ok": true,
        "identity_len": identity_len,
        "knowledge_len": knowledge_len,
        "variants_len": variants_len,
    }))
}

#[axum::debug_handler]
async fn reload_catalog_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let catalog = Catalog::load(&state.config.catalog_path());
    let prices = Prices::load(&state.config.prices_path());

    let catalog_len = catalog.areas.len();
    let currencies_len = prices.currencies.len();

    *state.catalog.write().unwrap() = catalog;
    *state.prices.write().unwrap() = prices;
    info!(catalog_len, currencies_len, "catálogo y precios recargados");

    Json(json!({
        "ok": true,
        "catalog_len": catalog_len,
        "currencies_len": currencies_len,
    }))
}

// --- Asistencia offline (tabla de variantes) ---

#[axum::debug_handler]
async fn assist_handler(
    State(state): State<AppState>,
    Json(payload): Json<AssistPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let name = payload.customer_name();
    let stage = payload.stage();
    let intent = assist::resolve_intent(&state, &payload.question, payload.intent.as_deref());

    let reply = {
        let table = state.variants.read().unwrap();
        Guardrails::clamp(&table.pick(intent, stage, &name, &mut rand::thread_rng()))
    };

    state
        .stats
        .lock()
        .unwrap()
        .record_impression(intent.as_str(), stage.as_str(), &reply)
        .map_err(|e| {
            error!("fallo registrando impresión: {e}");
            internal_error("assist_failed", &e.to_string())
        })?;

    Ok(Json(json!({
        "ok": true,
        "text": reply,
        "result": {
            "reply": reply,
            "intent": intent.as_str(),
            "stage": stage.as_str(),
            "model": "offline-variants",
        }
    })))
}

// --- Asistencia con modelo, sin pipeline completo ---

#[axum::debug_handler]
async fn assist_openai_handler(
    State(state): State<AppState>,
    Json(payload): Json<AssistPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.llm.api_key_set {
        return Err(missing_api_key());
    }

    let name = payload.customer_name();
    let stage = payload.stage();
    let intent = assist::resolve_intent(&state, &payload.question, payload.intent.as_deref());

    let rules = [
        "Eres un asesor comercial de Platzi (Colombia).",
        "Respondes corto (≤220c, 1–2 frases), sin ofrecer llamadas ni enviar material.",
        "Vendes suscripción ANUAL; conecta características→beneficio→beneficio de vida.",
    ]
    .join("\n");
    let user = format!(
        "Cliente:{name}\nStage:{}\nIntent:{}\nMensaje:{}\nEntrega solo el mensaje final.",
        stage.as_str(),
        intent.as_str(),
        payload.question,
    );

    // Política de errores: un modelo caído no se traslada al widget; se
    // responde 200 con texto seguro y una nota de error.
    let (reply, model, error_note) = match state.llm.complete(&rules, &user).await {
        Ok((raw, model)) => (state.guardrails.sanitize(&raw), model, None),
        Err(e) => {
            warn!("assist_openai degradado a respuesta estática: {e}");
            (
                state.guardrails.sanitize(&variants::default_greeting(&name)),
                "static-fallback".to_string(),
                Some(e.to_string()),
            )
        }
    };

    state
        .stats
        .lock()
        .unwrap()
        .record_impression(intent.as_str(), stage.as_str(), &reply)
        .map_err(|e| {
            error!("fallo registrando impresión: {e}");
            internal_error("openai_failed", &e.to_string())
        })?;

    let mut result = json!({
        "reply": reply,
        "intent": intent.as_str(),
        "stage": stage.as_str(),
        "model": model,
    });
    if let Some(note) = error_note {
        result["error_note"] = json!(note);
    }
    Ok(Json(json!({ "ok": true, "text": reply, "result": result })))
}

// --- Asistencia con pipeline completo (REPLY/WHY/NEXT) ---

#[axum::debug_handler]
async fn assist_trainer_handler(
    State(state): State<AppState>,
    Json(payload): Json<AssistPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.llm.api_key_set {
        return Err(missing_api_key());
    }

    let name = payload.customer_name();
    let stage = payload.stage();
    let outcome = assist::run_trainer(
        &state,
        &payload.question,
        &name,
        stage,
        payload.intent.as_deref(),
        payload.context.as_deref(),
    )
    .await;

    let guide = format!(
        "POR QUÉ: {} · SIGUIENTE PASO: {}",
        outcome.why, outcome.next
    );
    let stage_label = outcome.stage.as_str();
    let mut result = json!({
        "reply": outcome.reply,
        "why": outcome.why,
        "next": outcome.next,
        "guide": guide,
        "sections": { stage_label: outcome.reply },
        "model": outcome.model,
        "confidence": 0.9,
        "intent": outcome.intent.as_str(),
        "stage": outcome.stage.as_str(),
        "sentiment": outcome.sentiment.as_str(),
    });
    if let Some(note) = outcome.error_note {
        result["error_note"] = json!(note);
    }

    Ok(Json(json!({
        "ok": true,
        "text": outcome.reply,
        "whatsapp": outcome.reply,
        "message": outcome.reply,
        "answer": outcome.reply,
        "result": result,
    })))
}

// --- Tracking de valoraciones ---

#[axum::debug_handler]
async fn track_rate_handler(
    State(state): State<AppState>,
    Json(payload): Json<RatePayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if payload.text.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": "missing_text" })),
        ));
    }
    let Some(rating) = Rating::parse(&payload.rating) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "ok": false, "error": "invalid_rating" })),
        ));
    };

    state
        .stats
        .lock()
        .unwrap()
        .record_rating(&payload.intent, &payload.stage, &payload.text, rating)
        .map_err(|e| {
            error!("fallo registrando valoración: {e}");
            internal_error("track_rate_failed", &e.to_string())
        })?;

    Ok(Json(json!({ "ok": true })))
}

// --- Dashboard ---

#[axum::debug_handler]
async fn stats_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let rows = state.stats.lock().unwrap().rows();
    Json(json!({ "ok": true, "rows": rows }))
}

#[axum::debug_handler]
async fn dashboard_handler(State(state): State<AppState>) -> Html<String> {
    let rows = state.stats.lock().unwrap().rows();
    let body: String = rows
        .iter()
        .map(|r| {
            format!(
                "<tr><td>{}</td><td>{}</td><td>{}</td>\
                 <td style=\"text-align:right\">{}</td>\
                 <td style=\"text-align:right\">{}</td>\
                 <td style=\"text-align:right\">{:.1}%</td></tr>",
                escape_html(&r.intent),
                escape_html(&r.stage),
                escape_html(&r.text),
                r.shown,
                r.wins,
                r.winrate * 100.0,
            )
        })
        .collect();

    Html(format!(
        r#"<!doctype html>
<html lang="es"><head>
<meta charset="utf-8"/>
<title>Asistente · Dashboard</title>
<meta name="viewport" content="width=device-width, initial-scale=1"/>
<style>
  body{{font-family:system-ui,-apple-system,Segoe UI,Roboto,Inter,Arial;background:#0b0f19;color:#e2e8f0;margin:0;padding:24px}}
  h1{{margin:0 0 12px;font-size:20px}}
  table{{width:100%;border-collapse:collapse;background:#0f1524;border:1px solid rgba(255,255,255,.08);border-radius:12px;overflow:hidden}}
  th,td{{padding:10px;border-bottom:1px solid rgba(255,255,255,.06);font-size:14px}}
  th{{background:rgba(255,255,255,.04);text-align:left}}
  tr:hover{{background:rgba(255,255,255,.03)}}
  .sub{{opacity:.7;font-size:12px;margin-bottom:16px}}
</style>
</head>
<body>
  <h1>Asistente · Dashboard</h1>
  <div class="sub">Ranking por winrate y exposición</div>
  <div style="margin:12px 0">
    <form method="GET" action="/stats" target="_blank"><button>Ver JSON</button></form>
  </div>
  <table>
    <thead><tr><th>Intent</th><th>Stage</th><th>Texto</th><th>Shown</th><th>Wins</th><th>Winrate</th></tr></thead>
    <tbody>{body}</tbody>
  </table>
</body></html>"#
    ))
}

// --- Páginas estáticas ---

async fn agent_redirect() -> Redirect {
    Redirect::to("/agent.html")
}

async fn panel_redirect() -> Redirect {
    Redirect::to("/panel.html")
}

// --- Utilidades ---

fn missing_api_key() -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "ok": false, "error": "missing_openai_api_key" })),
    )
}

fn internal_error(code: &str, detail: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "ok": false, "error": code, "detail": detail })),
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
