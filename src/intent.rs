//! Clasificadores heurísticos: intent del mensaje y sentimiento.
//!
//! El clasificador de intents es una lista ordenada de pares
//! (expresión regular, etiqueta) evaluada con prioridad fija; la primera
//! coincidencia gana y el resto no se evalúa. Sin puntuación de confianza:
//! si nada coincide, la etiqueta es `_default`.

use anyhow::Result;
use regex::Regex;

use crate::models::{Intent, Sentiment};

pub struct IntentClassifier {
    rules: Vec<(Regex, Intent)>,
    negative: Regex,
    positive: Regex,
}

impl IntentClassifier {
    pub fn new() -> Result<Self> {
        // Orden de prioridad: precio → tiempo → cert → competencia → pitch → empleo.
        let rules = vec![
            (
                Regex::new(r"(precio|caro|costoso|costo|vale|promoci|oferta|descuento)")?,
                Intent::Precio,
            ),
            (
                Regex::new(r"(tiempo|agenda|no tengo tiempo|horario|no alcanzo|ocupad)")?,
                Intent::Tiempo,
            ),
            (
                Regex::new(r"(cert|certificado|certificacion|certificación)")?,
                Intent::Cert,
            ),
            (
                Regex::new(r"(coursera|udemy|alura|competenc|otra plataforma)")?,
                Intent::Competencia,
            ),
            (
                Regex::new(r"(pitch|qué es platzi|que es platzi|platzi)")?,
                Intent::Pitch,
            ),
            (
                Regex::new(r"(empleo|trabajo|vacante|contratar|contratación)")?,
                Intent::Empleo,
            ),
        ];

        // El negativo se prueba primero; "caro" manda aunque haya un "gracias".
        let negative = Regex::new(
            r"(no puedo|caro|dificil|difícil|malo|no me gusta|no sirve|no tengo tiempo|no sé|no se)",
        )?;
        let positive = Regex::new(r"(gracias|excelente|me interesa|bien|listo|perfecto|genial)")?;

        Ok(Self {
            rules,
            negative,
            positive,
        })
    }

    /// Función pura y total: siempre devuelve exactamente una etiqueta.
    pub fn classify(&self, text: &str) -> Intent {
        let s = text.to_lowercase();
        for (re, intent) in &self.rules {
            if re.is_match(&s) {
                return *intent;
            }
        }
        Intent::Default
    }

    /// Heurística cosmética; no participa en ninguna decisión posterior.
    pub fn sentiment(&self, text: &str) -> Sentiment {
        let s = text.to_lowercase();
        if self.negative.is_match(&s) {
            Sentiment::Negativo
        } else if self.positive.is_match(&s) {
            Sentiment::Positivo
        } else {
            Sentiment::Neutral
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> IntentClassifier {
        IntentClassifier::new().unwrap()
    }

    #[test]
    fn cada_keyword_mapea_a_su_etiqueta() {
        let c = classifier();
        assert_eq!(c.classify("el precio es muy caro"), Intent::Precio);
        assert_eq!(c.classify("no tengo tiempo esta semana"), Intent::Tiempo);
        assert_eq!(c.classify("¿dan certificado?"), Intent::Cert);
        assert_eq!(c.classify("en coursera hay algo parecido"), Intent::Competencia);
        assert_eq!(c.classify("¿qué es platzi exactamente?"), Intent::Pitch);
        assert_eq!(c.classify("busco trabajo de backend"), Intent::Empleo);
        assert_eq!(c.classify("hola, buenas tardes"), Intent::Default);
    }

    #[test]
    fn primera_coincidencia_gana() {
        let c = classifier();
        // "caro" (precio) va antes que "tiempo" en la lista de prioridad.
        assert_eq!(c.classify("es caro y no tengo tiempo"), Intent::Precio);
        // "horario" dispara tiempo antes de llegar a cert.
        assert_eq!(c.classify("mi horario choca con la certificación"), Intent::Tiempo);
    }

    #[test]
    fn clasificador_total_sobre_entradas_raras() {
        let c = classifier();
        for text in ["", "   ", "1234", "😅😅😅", "ÑÑÑ"] {
            // Devuelve siempre una de las siete etiquetas sin fallar.
            let _ = c.classify(text);
        }
        assert_eq!(c.classify(""), Intent::Default);
    }

    #[test]
    fn sentimiento_negativo_tiene_prioridad() {
        let c = classifier();
        assert_eq!(c.sentiment("gracias pero es muy caro"), Sentiment::Negativo);
        assert_eq!(c.sentiment("me interesa, gracias"), Sentiment::Positivo);
        assert_eq!(c.sentiment("ok"), Sentiment::Neutral);
    }
}
