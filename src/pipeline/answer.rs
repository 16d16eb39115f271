//! Prompt construction and batched answer generation.

use super::types::{AnswerOutcome, GenerationSettings};
use crate::{
    config::FailurePolicy,
    generation::{GenerationClient, GenerationClientError, GenerationRequest},
};
use futures_util::future::{join_all, try_join_all};

const ANSWER_MARKER: &str = "Answer:";

/// Fill the fixed prompt template with `context` and `query`.
pub fn build_prompt(context: &str, query: &str) -> String {
    format!("Context:\n{context}\n\nQuestion:\n{query}\n\n{ANSWER_MARKER}")
}

/// Text after the last `Answer:` marker of the decoded sequence, trimmed.
///
/// Without a marker the whole text is returned trimmed.
pub fn extract_answer(decoded: &str) -> String {
    decoded
        .rsplit_once(ANSWER_MARKER)
        .map_or(decoded, |(_, answer)| answer)
        .trim()
        .to_string()
}

/// Generate one answer per `(query, context)` pair.
///
/// Empty contexts resolve to [`AnswerOutcome::NoContext`] without calling the model. With
/// [`FailurePolicy::Batch`] the first failure stops the batch and every entry becomes
/// [`AnswerOutcome::Failed`]; with [`FailurePolicy::PerItem`] only the failing entry does.
pub async fn answer_batch(
    queries: &[String],
    contexts: &[String],
    generator: &dyn GenerationClient,
    settings: &GenerationSettings,
) -> Vec<AnswerOutcome> {
    if queries.len() != contexts.len() {
        tracing::error!(
            queries = queries.len(),
            contexts = contexts.len(),
            "Query and context counts differ"
        );
        let reason = format!(
            "{} queries but {} contexts",
            queries.len(),
            contexts.len()
        );
        return vec![AnswerOutcome::Failed(reason); queries.len()];
    }

    let pairs = queries.iter().zip(contexts);
    match settings.failure_policy {
        FailurePolicy::Batch => {
            let answers =
                pairs.map(|(query, context)| answer_one(query, context, generator, settings));
            match try_join_all(answers).await {
                Ok(outcomes) => outcomes,
                Err(error) => {
                    tracing::error!(error = %error, "Error during answer generation");
                    vec![AnswerOutcome::Failed(error.to_string()); queries.len()]
                }
            }
        }
        FailurePolicy::PerItem => join_all(pairs.map(|(query, context)| async move {
            match answer_one(query, context, generator, settings).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::error!(query = %query, error = %error, "Error generating answer");
                    AnswerOutcome::Failed(error.to_string())
                }
            }
        }))
        .await,
    }
}

async fn answer_one(
    query: &str,
    context: &str,
    generator: &dyn GenerationClient,
    settings: &GenerationSettings,
) -> Result<AnswerOutcome, GenerationClientError> {
    if context.is_empty() {
        return Ok(AnswerOutcome::NoContext);
    }

    let prompt = build_prompt(context, query);
    let continuation = generator
        .generate(GenerationRequest {
            model: settings.model.clone(),
            prompt: prompt.clone(),
            max_new_tokens: settings.max_new_tokens,
            temperature: settings.temperature,
            top_p: settings.top_p,
        })
        .await?;

    Ok(AnswerOutcome::Answered(extract_answer(&format!(
        "{prompt}{continuation}"
    ))))
}
