//! Author extraction: ask an LLM to read the paper JSON and list authors.
//!
//! The model gets the merged paper document as pretty JSON and is asked for
//! full names only. Chat models answer with a numbered list, often bolded:
//!
//! ```text
//! 1. **Ada Lovelace**
//! 2. Charles Babbage
//! ```
//!
//! [`parse_author_list`] turns that into [`Author`] values. Anything that is
//! not a numbered line (preamble, reasoning, closing remarks) is ignored.

use crate::config::ProcessConfig;
use crate::error::Pdf2JsonError;
use crate::output::{Author, PaperData};
use crate::prompts::{authors_document_message, AUTHORS_QUESTION, AUTHORS_SYSTEM_PROMPT};
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

static RE_NUMBERED_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*\d+\.[ \t]+\*{0,2}(.*?)\*{0,2}[ \t]*\r?$").unwrap());

/// Extract names from a numbered-list answer.
///
/// Surrounding `**` is dropped, names are trimmed, empty entries skipped.
/// Order is preserved.
pub fn parse_author_list(content: &str) -> Vec<Author> {
    RE_NUMBERED_NAME
        .captures_iter(content)
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| !name.is_empty())
        .map(Author::new)
        .collect()
}

/// Build the three-message conversation for `paper`.
pub fn build_messages(paper: &PaperData) -> Result<Vec<ChatMessage>, Pdf2JsonError> {
    let json = serde_json::to_string_pretty(paper)?;
    Ok(vec![
        ChatMessage::system(AUTHORS_SYSTEM_PROMPT),
        ChatMessage::user(authors_document_message(&json)),
        ChatMessage::user(AUTHORS_QUESTION),
    ])
}

/// Resolve the provider: an injected one wins, otherwise the named provider
/// is created through the factory (which reads its key from the environment).
pub fn resolve_provider(config: &ProcessConfig) -> Result<Arc<dyn LLMProvider>, Pdf2JsonError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    ProviderFactory::create_llm_provider(&config.authors_provider, &config.authors_model).map_err(
        |e| Pdf2JsonError::ProviderNotConfigured {
            provider: config.authors_provider.clone(),
            hint: format!("{e}"),
        },
    )
}

/// Ask the configured LLM for the authors of `paper`.
///
/// An empty answer yields no authors rather than an error; a failed or
/// timed-out call is an error.
pub async fn extract_authors(
    paper: &PaperData,
    config: &ProcessConfig,
) -> Result<Vec<Author>, Pdf2JsonError> {
    let provider = resolve_provider(config)?;
    let messages = build_messages(paper)?;
    let timeout = Duration::from_secs(config.api_timeout_secs);

    request_authors(messages, timeout, move |messages| async move {
        let options = CompletionOptions::default();
        let start = Instant::now();
        match provider.chat(&messages, Some(&options)).await {
            Ok(response) => {
                debug!(
                    "Authors call: {} input tokens, {} output tokens, {:?}",
                    response.prompt_tokens,
                    response.completion_tokens,
                    start.elapsed()
                );
                Ok(response.content)
            }
            Err(e) => Err(Pdf2JsonError::LlmApiError {
                message: e.to_string(),
            }),
        }
    })
    .await
}

/// Send `messages` through `chat` within `timeout` and parse the reply.
async fn request_authors<F, Fut>(
    messages: Vec<ChatMessage>,
    timeout: Duration,
    chat: F,
) -> Result<Vec<Author>, Pdf2JsonError>
where
    F: FnOnce(Vec<ChatMessage>) -> Fut,
    Fut: Future<Output = Result<String, Pdf2JsonError>>,
{
    let reply = tokio::time::timeout(timeout, chat(messages))
        .await
        .map_err(|_| Pdf2JsonError::LlmApiError {
            message: format!("timed out after {}s", timeout.as_secs_f64()),
        })??;

    let content = reply.trim();
    if content.is_empty() {
        info!("LLM returned no author list");
        return Ok(Vec::new());
    }

    let authors = parse_author_list(content);
    info!("Extracted {} authors", authors.len());
    Ok(authors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::structure::build;

    fn names(authors: &[Author]) -> Vec<&str> {
        authors.iter().map(|a| a.name.as_str()).collect()
    }

    #[test]
    fn plain_numbered_list() {
        let out = parse_author_list("1. Ada Lovelace\n2. Charles Babbage");
        assert_eq!(names(&out), vec!["Ada Lovelace", "Charles Babbage"]);
    }

    #[test]
    fn bold_names_and_chatter() {
        let content = "The authors are:\n\n1. **Ashish Vaswani**\n2. **Noam Shazeer**  \n\nLet me know if you need more.";
        let out = parse_author_list(content);
        assert_eq!(names(&out), vec!["Ashish Vaswani", "Noam Shazeer"]);
    }

    #[test]
    fn indented_and_multi_digit() {
        let content = "  9. Nine\n 10. Ten\n11.NoSpace";
        let out = parse_author_list(content);
        assert_eq!(names(&out), vec!["Nine", "Ten"]);
    }

    #[test]
    fn empty_entries_dropped() {
        let out = parse_author_list("1. ****\n2.  \n3. Real Name");
        assert_eq!(names(&out), vec!["Real Name"]);
    }

    #[test]
    fn no_list_no_authors() {
        assert!(parse_author_list("I could not find any authors.").is_empty());
        assert!(parse_author_list("").is_empty());
    }

    #[test]
    fn messages_carry_paper_json() {
        let paper = PaperData::new(build("# Attention Is All You Need\n## Abstract\nText"));
        let messages = build_messages(&paper).unwrap();
        assert_eq!(messages.len(), 3);

        let json = serde_json::to_string_pretty(&paper).unwrap();
        assert!(json.contains("\"title\": \"Attention Is All You Need\""));
        assert!(authors_document_message(&json).ends_with(&json));
    }

    #[test]
    fn entries_do_not_bleed_across_lines() {
        let out = parse_author_list("1.\n2. Grace Hopper\r\n3. **Alan Turing**\r\n");
        assert_eq!(names(&out), vec!["Grace Hopper", "Alan Turing"]);
    }

    fn paper() -> PaperData {
        PaperData::new(build("# Attention Is All You Need\n## Abstract\nText"))
    }

    #[tokio::test]
    async fn conversation_reaches_the_model() {
        let messages = build_messages(&paper()).unwrap();
        let out = request_authors(messages, Duration::from_secs(5), |sent| async move {
            assert_eq!(sent.len(), 3);
            Ok::<_, Pdf2JsonError>("1. **Ashish Vaswani**\n2. Noam Shazeer".to_string())
        })
        .await
        .unwrap();
        assert_eq!(names(&out), vec!["Ashish Vaswani", "Noam Shazeer"]);
    }

    #[tokio::test]
    async fn blank_reply_means_no_authors() {
        for reply in ["", "   \n\t "] {
            let messages = build_messages(&paper()).unwrap();
            let out = request_authors(messages, Duration::from_secs(5), |_| async move {
                Ok::<_, Pdf2JsonError>(reply.to_string())
            })
            .await
            .unwrap();
            assert!(out.is_empty(), "reply {reply:?} gave {out:?}");
        }
    }

    #[tokio::test]
    async fn slow_model_times_out() {
        let messages = build_messages(&paper()).unwrap();
        let err = request_authors(messages, Duration::from_millis(20), |_| async {
            std::future::pending::<Result<String, Pdf2JsonError>>().await
        })
        .await
        .unwrap_err();
        match err {
            Pdf2JsonError::LlmApiError { message } => {
                assert!(message.starts_with("timed out"), "got: {message}")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn call_failure_is_propagated() {
        let messages = build_messages(&paper()).unwrap();
        let err = request_authors(messages, Duration::from_secs(5), |_| async {
            Err::<String, _>(Pdf2JsonError::LlmApiError {
                message: "HTTP 429".to_string(),
            })
        })
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "LLM API error: HTTP 429");
    }
}
