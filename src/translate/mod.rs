// Translation pipeline
//
// A call is split into units that are translated independently:
// - normal mode: every non-blank line is one unit, wrapped by strip/restore
// - separator mode: the whole text is one unit and passes through untouched
// Each unit goes through dictionary matching, prompt assembly and the orchestrator.

pub mod dictionary;
pub mod orchestrator;
pub mod prompt;
pub mod symbols;

use tracing::{debug, info};

use crate::backend::SamplingParams;
use crate::error::Result;
use crate::reload::{Runtime, Snapshot};

use dictionary::Dictionary;
use orchestrator::{ChatPrompt, Generation, Orchestrator, RetryPolicy};
use prompt::PromptParts;

/// Returned in place of a translation when every backend refused the content.
pub const SENTINEL: &str = "数据检查错误，输入或者输出包含疑似敏感内容被云服务商拦截。";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslateOptions {
    /// Segment marker the model must leave untouched; enables separator mode
    pub separator: Option<String>,
}

/// Entry point shared by the HTTP handlers and the CLI.
pub struct TranslationService {
    runtime: Snapshot<Runtime>,
    dictionary: Snapshot<Dictionary>,
}

impl TranslationService {
    pub fn new(runtime: Snapshot<Runtime>, dictionary: Snapshot<Dictionary>) -> Self {
        Self { runtime, dictionary }
    }

    pub fn runtime(&self) -> &Snapshot<Runtime> {
        &self.runtime
    }

    pub async fn translate(&self, text: &str, options: &TranslateOptions) -> Result<String> {
        // One snapshot per call, even if a reload lands halfway through
        let runtime = self.runtime.load();
        let dictionary = self.dictionary.load();
        let call = Call {
            runtime: &runtime,
            dictionary: &dictionary,
        };

        if let Some(separator) = options.separator.as_deref().filter(|s| !s.is_empty()) {
            if text.trim().is_empty() {
                return Ok(text.to_string());
            }
            info!("┌─ Translating segmented text ────────");
            info!("│ Source: {}", text);
            let translated = match call.generate(text, Some(separator)).await? {
                Generation::Translated(t) => t,
                Generation::Withheld => SENTINEL.to_string(),
            };
            info!("│ Target: {}", translated);
            info!("└─────────────────────────────────────");
            return Ok(translated);
        }

        let paragraphs: Vec<&str> = text.split('\n').collect();
        let total = paragraphs.len();
        let mut translated = Vec::with_capacity(total);

        for (idx, line) in paragraphs.into_iter().enumerate() {
            // CRLF input: the carriage return stays with the line ending, not the model input
            let (paragraph, line_end) = match line.strip_suffix('\r') {
                Some(body) => (body, "\r"),
                None => (line, ""),
            };
            if paragraph.trim().is_empty() {
                translated.push(line.to_string());
                continue;
            }
            info!("┌─ Translating paragraph {}/{} ────────", idx + 1, total);
            info!("│ Source: {}", paragraph);
            let target = call.translate_paragraph(paragraph).await?;
            info!("│ Target: {}", target);
            info!("└─────────────────────────────────────");
            translated.push(format!("{}{}", target, line_end));
        }

        Ok(translated.join("\n"))
    }
}

struct Call<'a> {
    runtime: &'a Runtime,
    dictionary: &'a Dictionary,
}

impl Call<'_> {
    async fn translate_paragraph(&self, paragraph: &str) -> Result<String> {
        let stripped = symbols::strip(paragraph);
        if stripped.core.trim().is_empty() {
            debug!("Nothing to translate in {:?}", paragraph);
            return Ok(paragraph.to_string());
        }

        match self.generate(&stripped.core, None).await? {
            Generation::Translated(t) => Ok(symbols::restore(&t, &stripped)),
            Generation::Withheld => Ok(symbols::restore(SENTINEL, &stripped)),
        }
    }

    async fn generate(&self, text: &str, separator: Option<&str>) -> Result<Generation> {
        let config = &self.runtime.config;
        let matches = self.dictionary.match_against(text);
        if !matches.is_empty() {
            info!("│ Dictionary: {}", matches);
        }

        let system = prompt::build(&PromptParts {
            persona: config.prompt_persona.as_deref().unwrap_or(prompt::DEFAULT_PERSONA),
            addendum: &config.prompt_user,
            separator,
            dictionary: &matches,
            trailer: prompt::TRAILER,
        });
        debug!("System prompt:\n{}", system);

        let params = &config.model_params;
        let chat = ChatPrompt {
            system,
            user: text.to_string(),
            params: SamplingParams {
                temperature: params.temperature,
                top_p: params.top_p,
                max_tokens: params.token_budget(text.chars().count()),
            },
        };

        Orchestrator::new(&self.runtime.backends, RetryPolicy::from_config(&config.retry))
            .generate(&config.api_priority, &chat)
            .await
    }
}
