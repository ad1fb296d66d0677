//! On-demand streaming transformers: article summarization and two-phase
//! translation, yielding ordered event sequences consumed as SSE.

use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::llm::{ChatMessage, ChatOptions, LlmProviderFactory};
use crate::models::{Article, ArticleContent};
use crate::store::{ArticleStore, ContentStore};

/// Maximum characters per translated body group.
const CONTENT_GROUP_CHARS: usize = 5000;

/// One discrete event in a transformer stream. The transport encodes each as
/// its own SSE message; `complete` and `error` are terminal.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssistantEvent {
    Start {
        article_id: i64,
        title: String,
        operation: String,
    },
    Config {
        provider: String,
        model: String,
        language: String,
    },
    AiProcessing {
        message: String,
    },
    Phase {
        phase: String,
    },
    Content {
        content: String,
    },
    TitleSummaryContent {
        content: String,
    },
    TitleSummaryComplete,
    ContentInfo {
        total_groups: usize,
        total_chars: usize,
    },
    ContentGroup {
        group_index: usize,
        total_groups: usize,
    },
    ContentTranslation {
        content: String,
    },
    Complete {
        full_content: String,
    },
    Error {
        message: String,
    },
}

impl AssistantEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssistantEvent::Complete { .. } | AssistantEvent::Error { .. })
    }
}

pub type AssistantEventStream = BoxStream<'static, AssistantEvent>;

#[derive(Clone)]
pub struct AssistantService {
    articles: ArticleStore,
    contents: ContentStore,
    providers: LlmProviderFactory,
}

impl AssistantService {
    pub fn new(
        articles: ArticleStore,
        contents: ContentStore,
        providers: LlmProviderFactory,
    ) -> Self {
        Self {
            articles,
            contents,
            providers,
        }
    }

    async fn article_and_content(&self, article_id: i64) -> Result<(Article, ArticleContent)> {
        let article = self.articles.get(article_id).await?;
        let content_id = article.content_id.ok_or_else(|| {
            AppError::conflict(format!("Article {} has no extracted content", article_id))
        })?;
        let content = self.contents.get(content_id).await?;
        Ok((article, content))
    }

    /// Split body text into groups of at most `max_chars`, cutting only at
    /// paragraph boundaries. A single paragraph longer than the budget
    /// becomes its own group.
    pub fn split_content_groups(text: &str, max_chars: usize) -> Vec<String> {
        let mut groups = Vec::new();
        let mut current = String::new();
        let mut current_chars = 0usize;

        for paragraph in text.split('\n') {
            let para_chars = paragraph.chars().count();
            // +1 for the newline that rejoins paragraphs.
            if current_chars > 0 && current_chars + para_chars + 1 > max_chars {
                groups.push(std::mem::take(&mut current));
                current_chars = 0;
            }
            if !current.is_empty() {
                current.push('\n');
                current_chars += 1;
            }
            current.push_str(paragraph);
            current_chars += para_chars;
        }
        if !current.trim().is_empty() || groups.is_empty() {
            groups.push(current);
        }
        groups.retain(|g| !g.trim().is_empty());
        if groups.is_empty() {
            groups.push(String::new());
        }
        groups
    }

    fn language_name(language: &str) -> &'static str {
        match language {
            "zh" => "中文",
            "en" => "English",
            _ => "中文",
        }
    }

    /// Summarize an article, streaming model output as `content` events.
    pub fn summarize_article_stream(
        &self,
        user_id: &str,
        article_id: i64,
        language: String,
    ) -> AssistantEventStream {
        let service = self.clone();
        let user_id = user_id.to_string();

        let stream = async_stream::stream! {
            let (article, content) = match service.article_and_content(article_id).await {
                Ok(pair) => pair,
                Err(e) => {
                    yield AssistantEvent::Error { message: e.to_string() };
                    return;
                }
            };

            yield AssistantEvent::Start {
                article_id,
                title: article.title.clone(),
                operation: "summarize".to_string(),
            };

            let provider = match service.providers.create_provider(None, None).await {
                Ok(provider) => provider,
                Err(e) => {
                    yield AssistantEvent::Error { message: e.to_string() };
                    return;
                }
            };

            yield AssistantEvent::Config {
                provider: provider.provider_name().to_string(),
                model: provider.default_model().to_string(),
                language: language.clone(),
            };
            yield AssistantEvent::AiProcessing {
                message: "generating summary".to_string(),
            };

            tracing::info!(user_id = %user_id, article_id, "Streaming article summary");

            let lang_name = Self::language_name(&language);
            let excerpt: String = content.text_content.chars().take(8000).collect();
            let prompt = format!(
                "请用{}为以下文章生成一份简洁的摘要，突出主要内容和核心观点，长度控制在300字以内。\n\n标题：{}\n\n正文：\n{}",
                lang_name, article.title, excerpt
            );

            let mut chunks = match provider
                .chat_stream(
                    &[ChatMessage::user(prompt)],
                    &ChatOptions {
                        max_tokens: Some(800),
                        temperature: Some(0.3),
                        ..Default::default()
                    },
                )
                .await
            {
                Ok(chunks) => chunks,
                Err(e) => {
                    yield AssistantEvent::Error { message: e.to_string() };
                    return;
                }
            };

            let mut full = String::new();
            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(delta) => {
                        full.push_str(&delta);
                        yield AssistantEvent::Content { content: delta };
                    }
                    Err(e) => {
                        yield AssistantEvent::Error { message: e.to_string() };
                        return;
                    }
                }
            }

            yield AssistantEvent::Complete { full_content: full };
        };

        stream.boxed()
    }

    /// Translate an article in two phases: title+summary first, then the
    /// body in paragraph-bounded groups.
    pub fn translate_article_stream(
        &self,
        user_id: &str,
        article_id: i64,
        language: String,
    ) -> AssistantEventStream {
        let service = self.clone();
        let user_id = user_id.to_string();

        let stream = async_stream::stream! {
            let (article, content) = match service.article_and_content(article_id).await {
                Ok(pair) => pair,
                Err(e) => {
                    yield AssistantEvent::Error { message: e.to_string() };
                    return;
                }
            };

            yield AssistantEvent::Start {
                article_id,
                title: article.title.clone(),
                operation: "translate".to_string(),
            };

            let provider = match service.providers.create_provider(None, None).await {
                Ok(provider) => provider,
                Err(e) => {
                    yield AssistantEvent::Error { message: e.to_string() };
                    return;
                }
            };

            yield AssistantEvent::Config {
                provider: provider.provider_name().to_string(),
                model: provider.default_model().to_string(),
                language: language.clone(),
            };

            tracing::info!(user_id = %user_id, article_id, "Streaming article translation");

            let lang_name = Self::language_name(&language);
            let mut full = String::new();

            // Phase one: title and summary.
            yield AssistantEvent::Phase { phase: "title_summary".to_string() };

            let summary = article.best_summary().unwrap_or("");
            let prompt = format!(
                "请将以下标题和摘要翻译为{}，保持原意，直接输出译文：\n\n标题：{}\n\n摘要：{}",
                lang_name, article.title, summary
            );

            let mut chunks = match provider
                .chat_stream(
                    &[ChatMessage::user(prompt)],
                    &ChatOptions {
                        max_tokens: Some(800),
                        temperature: Some(0.2),
                        ..Default::default()
                    },
                )
                .await
            {
                Ok(chunks) => chunks,
                Err(e) => {
                    yield AssistantEvent::Error { message: e.to_string() };
                    return;
                }
            };

            while let Some(chunk) = chunks.next().await {
                match chunk {
                    Ok(delta) => {
                        full.push_str(&delta);
                        yield AssistantEvent::TitleSummaryContent { content: delta };
                    }
                    Err(e) => {
                        yield AssistantEvent::Error { message: e.to_string() };
                        return;
                    }
                }
            }
            yield AssistantEvent::TitleSummaryComplete;

            // Phase two: the body, split at paragraph boundaries.
            yield AssistantEvent::Phase { phase: "content".to_string() };

            let groups = Self::split_content_groups(&content.text_content, CONTENT_GROUP_CHARS);
            let total_groups = groups.len();
            yield AssistantEvent::ContentInfo {
                total_groups,
                total_chars: content.text_content.chars().count(),
            };

            for (index, group) in groups.into_iter().enumerate() {
                if total_groups > 1 {
                    yield AssistantEvent::ContentGroup {
                        group_index: index + 1,
                        total_groups,
                    };
                }

                let prompt = format!(
                    "请将以下正文内容翻译为{}，保持段落结构，直接输出译文：\n\n{}",
                    lang_name, group
                );

                let mut chunks = match provider
                    .chat_stream(
                        &[ChatMessage::user(prompt)],
                        &ChatOptions {
                            max_tokens: Some(4000),
                            temperature: Some(0.2),
                            ..Default::default()
                        },
                    )
                    .await
                {
                    Ok(chunks) => chunks,
                    Err(e) => {
                        yield AssistantEvent::Error { message: e.to_string() };
                        return;
                    }
                };

                while let Some(chunk) = chunks.next().await {
                    match chunk {
                        Ok(delta) => {
                            full.push('\n');
                            full.push_str(&delta);
                            yield AssistantEvent::ContentTranslation { content: delta };
                        }
                        Err(e) => {
                            yield AssistantEvent::Error { message: e.to_string() };
                            return;
                        }
                    }
                }
            }

            yield AssistantEvent::Complete { full_content: full };
        };

        stream.boxed()
    }

    /// Drive a stream to its terminal event server-side; used when the
    /// caller asked for a non-streaming response.
    pub async fn collect_stream(mut stream: AssistantEventStream) -> Vec<AssistantEvent> {
        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouping_respects_paragraph_boundaries() {
        let text = format!("{}\n{}\n{}", "a".repeat(40), "b".repeat(40), "c".repeat(40));
        let groups = AssistantService::split_content_groups(&text, 90);
        assert_eq!(groups.len(), 2);
        assert!(groups[0].contains('a') && groups[0].contains('b'));
        assert!(groups[1].contains('c'));
        // No paragraph is split across groups.
        for group in &groups {
            for paragraph in group.split('\n') {
                assert!(paragraph.chars().all(|c| c == paragraph.chars().next().unwrap()));
            }
        }
    }

    #[test]
    fn grouping_never_exceeds_budget_for_normal_paragraphs() {
        let paragraphs: Vec<String> = (0..20).map(|i| format!("{}", i).repeat(100)).collect();
        let text = paragraphs.join("\n");
        for group in AssistantService::split_content_groups(&text, 500) {
            assert!(group.chars().count() <= 500);
        }
    }

    #[test]
    fn oversized_paragraph_becomes_its_own_group() {
        let text = format!("short\n{}\ntail", "x".repeat(1000));
        let groups = AssistantService::split_content_groups(&text, 100);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[1].chars().count(), 1000);
    }

    #[test]
    fn empty_text_yields_one_empty_group() {
        let groups = AssistantService::split_content_groups("", 100);
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn terminal_events_are_detected() {
        assert!(AssistantEvent::Complete { full_content: String::new() }.is_terminal());
        assert!(AssistantEvent::Error { message: String::new() }.is_terminal());
        assert!(!AssistantEvent::Phase { phase: "content".to_string() }.is_terminal());
    }
}
