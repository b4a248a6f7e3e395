//! Prompt templates for the LLM-backed agents, and reply parsing.

use attest_application::{AgentError, LlmPrompt};
use attest_domain::{CitationToken, DecisionInput, PlannerInput, SummarizerInput};
use serde::de::DeserializeOwned;
use std::fmt::Write as _;

/// Templates for generating stage prompts
pub struct StagePrompts;

impl StagePrompts {
    pub fn planner(input: &PlannerInput) -> LlmPrompt {
        let system = r#"You decompose a user's question about their documents into retrieval steps.

Reply with a JSON object only:

{"steps": [{"retrieval_query": "...", "goal": "...", "independent": false}]}

- Each step retrieves passages with `retrieval_query` and summarizes them toward `goal`
- Mark a step `independent` only if it needs no earlier step's summary
- Use as few steps as the question needs; one is often enough"#;

        LlmPrompt::json(system, with_correction(&input.query, &input.correction))
    }

    pub fn summarizer(input: &SummarizerInput) -> LlmPrompt {
        let system = r#"You summarize passages to answer a goal. Every claim must cite the passage it comes from.

Cite with the exact token shown before each passage, e.g. [cite:DOC|PAGE|PASSAGE].
Never invent tokens and never cite a passage that is not listed.

Reply with a JSON object only:

{"summary_text": "... [cite:...] ...", "citations": ["[cite:...]"]}"#;

        let mut user = String::new();
        let _ = writeln!(user, "Question: {}", input.query);
        let _ = writeln!(user, "Goal: {}", input.goal);
        if !input.prior_summaries.is_empty() {
            let _ = writeln!(user, "\nEarlier findings:");
            for summary in &input.prior_summaries {
                let _ = writeln!(user, "- {}", summary);
            }
        }
        let _ = writeln!(user, "\nPassages:");
        for passage in &input.passages {
            let token =
                CitationToken::new(passage.doc_id.clone(), passage.page, passage.id.clone());
            let _ = writeln!(user, "\n{}\n{}", token.render(), passage.text);
        }

        LlmPrompt::json(system, with_correction(&user, &input.correction))
    }

    pub fn decision(input: &DecisionInput) -> LlmPrompt {
        let system = r#"You decide whether a summary calls for follow-up actions in external systems.

Available services: jira (create_ticket), slack (post_message), email (send_alert).
Propose nothing unless the summary clearly warrants it.

Reply with a JSON object only:

{"actions": [{"action_type": "...", "target_service": "...", "payload": {}, "confidence": 0.0}]}"#;

        let user = format!(
            "Question: {}\nGoal: {}\n\nSummary:\n{}",
            input.query, input.goal, input.summary
        );
        LlmPrompt::json(system, with_correction(&user, &input.correction))
    }
}

fn with_correction(user: &str, correction: &Option<String>) -> String {
    match correction {
        Some(instruction) => format!(
            "{}\n\nYour previous reply was rejected: {}",
            user.trim_end(),
            instruction
        ),
        None => user.to_string(),
    }
}

/// Parse a JSON reply, tolerating a fenced block or prose around the object.
pub fn parse_reply<T: DeserializeOwned>(raw: &str) -> Result<T, AgentError> {
    let trimmed = raw.trim();
    if let Ok(parsed) = serde_json::from_str(trimmed) {
        return Ok(parsed);
    }

    let mut in_block = false;
    let mut block = String::new();
    for line in trimmed.lines() {
        let marker = line.trim();
        if !in_block && marker.starts_with("```") {
            in_block = true;
            block.clear();
        } else if in_block && marker == "```" {
            if let Ok(parsed) = serde_json::from_str(&block) {
                return Ok(parsed);
            }
            in_block = false;
        } else if in_block {
            block.push_str(line);
            block.push('\n');
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && start < end
    {
        return serde_json::from_str(&trimmed[start..=end])
            .map_err(|e| AgentError::invalid_output(format!("malformed JSON reply: {}", e)));
    }
    Err(AgentError::invalid_output("reply contains no JSON object"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_domain::{PlannerOutput, SummarizerOutput};

    #[test]
    fn test_parse_raw_fenced_and_embedded() {
        let raw: PlannerOutput =
            parse_reply(r#"{"steps": [{"retrieval_query": "login", "goal": "g"}]}"#).unwrap();
        assert_eq!(raw.steps.len(), 1);

        let fenced: PlannerOutput = parse_reply(
            "Here you go:\n```json\n{\"steps\": [{\"retrieval_query\": \"a\", \"goal\": \"b\"}]}\n```",
        )
        .unwrap();
        assert_eq!(fenced.steps[0].retrieval_query, "a");

        let embedded: SummarizerOutput =
            parse_reply("Sure! {\"summary_text\": \"x\", \"citations\": []} Done.").unwrap();
        assert_eq!(embedded.summary_text, "x");
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let err = parse_reply::<PlannerOutput>("I cannot help with that.").unwrap_err();
        assert!(matches!(err, AgentError::InvalidOutput(_)));
    }

    #[test]
    fn test_correction_is_appended() {
        let prompt = StagePrompts::planner(&PlannerInput {
            query: "Summarize login incidents".to_string(),
            user_id: "alice".to_string(),
            correction: Some("reply with a JSON object".to_string()),
        });
        assert!(prompt.json);
        assert!(prompt.user.starts_with("Summarize login incidents"));
        assert!(prompt.user.ends_with("reply with a JSON object"));
    }
}
