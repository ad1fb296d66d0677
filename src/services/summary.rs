//! Bilingual article summarization.
//!
//! One model call produces both the Chinese and the English summary; each is
//! validated independently against the invalid-summary detector before it is
//! written back. Invalid upstream summaries are cleared in the same update.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::llm::{ChatMessage, ChatOptions, LlmProviderFactory};
use crate::models::ArticleStatus;
use crate::store::{ArticleStore, ContentStore};

const MAX_SUMMARY_LENGTH: usize = 200;
const MIN_SOURCE_LENGTH: usize = 50;

/// Coarse pipeline steps external workers may report out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStep {
    ContentSaved,
    SummaryGenerated,
    Vectorized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Failed,
}

/// Result of one summarization pass over an article.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryOutcome {
    pub article_id: i64,
    pub chinese_summary: Option<String>,
    pub english_summary: Option<String>,
    pub original_summary_cleared: bool,
}

pub struct SummaryService {
    articles: ArticleStore,
    contents: ContentStore,
    providers: LlmProviderFactory,
    invalid_patterns: Vec<Regex>,
    tag_pattern: Regex,
    whitespace_pattern: Regex,
    special_pattern: Regex,
    chinese_label: Regex,
    english_label: Regex,
    label_prefix: Regex,
    leading_non_chinese: Regex,
    leading_non_english: Regex,
}

impl SummaryService {
    pub fn new(
        articles: ArticleStore,
        contents: ContentStore,
        providers: LlmProviderFactory,
    ) -> Self {
        let invalid_patterns = [
            r"点击.*?查看",
            r"查看.*?原文",
            r"阅读.*?原文",
            r"继续.*?阅读",
            r"更多.*?内容",
            r"详细.*?内容",
            r"完整.*?文章",
            r"(?i)read\s+more",
            r"(?i)view\s+more",
            r"(?i)click\s+here",
            r"(?i)see\s+more",
            r"分享到",
            r"转发",
            r"关注",
            r"订阅",
            r"来源[:：]",
            r"作者[:：]",
            r"时间[:：]",
            r"^[^a-zA-Z\x{4e00}-\x{9fff}]*>+[^a-zA-Z\x{4e00}-\x{9fff}]*$",
            r"^[^a-zA-Z\x{4e00}-\x{9fff}]*$",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("invalid summary pattern"))
        .collect();

        Self {
            articles,
            contents,
            providers,
            invalid_patterns,
            tag_pattern: Regex::new(r"<[^>]+>").expect("tag pattern"),
            whitespace_pattern: Regex::new(r"\s+").expect("whitespace pattern"),
            special_pattern: Regex::new(r"[^\w\s\x{4e00}-\x{9fff}.,!?;:，。！？；：-]")
                .expect("special char pattern"),
            chinese_label: Regex::new(r"(?s)中文摘要[:：]\s*(.+?)(?:\n\s*English Summary|$)")
                .expect("chinese label pattern"),
            english_label: Regex::new(r"(?is)English Summary[:：]\s*(.+?)(?:\n\s*中文摘要|$)")
                .expect("english label pattern"),
            label_prefix: Regex::new(r"^[^:：]*[:：]\s*").expect("label prefix pattern"),
            leading_non_chinese: Regex::new(r"^[^\x{4e00}-\x{9fff}]*").expect("leading pattern"),
            leading_non_english: Regex::new(r"^[^a-zA-Z]*").expect("leading pattern"),
        }
    }

    /// True for summaries that are empty, too short, reader-link boilerplate
    /// or pure punctuation.
    pub fn is_invalid_summary(&self, summary: &str) -> bool {
        let summary = summary.trim();
        if summary.chars().count() < 10 {
            return true;
        }
        self.invalid_patterns.iter().any(|p| p.is_match(summary))
    }

    /// Strip markup and noise, keeping word characters, CJK and basic
    /// punctuation.
    pub fn clean_text(&self, text: &str) -> String {
        let text = self.tag_pattern.replace_all(text, "");
        let text = self.whitespace_pattern.replace_all(&text, " ");
        let text = self.special_pattern.replace_all(&text, "");
        text.trim().to_string()
    }

    /// Truncate at a sentence boundary in the last 30% of the budget, then a
    /// clause boundary in the last 20%, else hard-cut with an ellipsis.
    pub fn truncate_summary(&self, summary: &str) -> String {
        let chars: Vec<char> = summary.chars().collect();
        if chars.len() <= MAX_SUMMARY_LENGTH {
            return summary.to_string();
        }

        let truncated: Vec<char> = chars[..MAX_SUMMARY_LENGTH - 3].to_vec();

        let sentence_floor = (MAX_SUMMARY_LENGTH as f64 * 0.7) as usize;
        for end in ['。', '！', '？', '.', '!', '?'] {
            if let Some(pos) = truncated.iter().rposition(|&c| c == end) {
                if pos > sentence_floor {
                    return truncated[..=pos].iter().collect();
                }
            }
        }

        let clause_floor = (MAX_SUMMARY_LENGTH as f64 * 0.8) as usize;
        for end in ['，', '；', ',', ';'] {
            if let Some(pos) = truncated.iter().rposition(|&c| c == end) {
                if pos > clause_floor {
                    return truncated[..=pos].iter().collect();
                }
            }
        }

        let mut result: String = truncated.iter().collect();
        result.push_str("...");
        result
    }

    fn build_prompt(text: &str) -> String {
        let excerpt: String = text.chars().take(2000).collect();
        format!(
            "请为以下文章生成中英文双语摘要，要求：\n\n\
             中文摘要要求：\n\
             1. 长度控制在200字以内\n\
             2. 突出文章的主要内容和核心观点\n\
             3. 语言简洁明了，避免重复\n\
             4. 不要包含\"点击查看\"、\"阅读原文\"等无关内容\n\n\
             英文摘要要求：\n\
             1. Keep it within 200 characters\n\
             2. Highlight the main content and key points\n\
             3. Use clear and concise language, avoid repetition\n\
             4. Do not include irrelevant content like \"click to view\", \"read more\", etc.\n\n\
             请按照以下格式输出，不要添加任何其他内容：\n\n\
             中文摘要：[这里是中文摘要内容]\n\n\
             English Summary：[这里是英文摘要内容]\n\n\
             文章内容：\n{}",
            excerpt
        )
    }

    /// Pull the two labeled summaries out of a model response; falls back to
    /// line-based scanning when the labels are mangled.
    pub fn parse_bilingual_summary(&self, text: &str) -> (Option<String>, Option<String>) {
        let mut chinese = self
            .chinese_label
            .captures(text)
            .map(|c| c[1].trim().to_string());
        let mut english = self
            .english_label
            .captures(text)
            .map(|c| c[1].trim().to_string());

        if chinese.is_none() || english.is_none() {
            let mut current: Option<&str> = None;
            let mut chinese_lines = Vec::new();
            let mut english_lines = Vec::new();

            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.contains("中文摘要") || line.contains("中文：") {
                    current = Some("zh");
                    let content = self.label_prefix.replace(line, "").to_string();
                    if !content.is_empty() && content != line {
                        chinese_lines.push(content);
                    }
                } else if line.to_lowercase().contains("english summary")
                    || line.contains("English:")
                {
                    current = Some("en");
                    let content = self.label_prefix.replace(line, "").to_string();
                    if !content.is_empty() && content != line {
                        english_lines.push(content);
                    }
                } else if current == Some("zh") {
                    chinese_lines.push(line.to_string());
                } else if current == Some("en") {
                    english_lines.push(line.to_string());
                }
            }

            if chinese.is_none() && !chinese_lines.is_empty() {
                chinese = Some(chinese_lines.join(" ").trim().to_string());
            }
            if english.is_none() && !english_lines.is_empty() {
                english = Some(english_lines.join(" ").trim().to_string());
            }
        }

        let chinese = chinese
            .map(|s| self.leading_non_chinese.replace(&s, "").trim().to_string())
            .filter(|s| !s.is_empty());
        let english = english
            .map(|s| self.leading_non_english.replace(&s, "").trim().to_string())
            .filter(|s| !s.is_empty());

        (chinese, english)
    }

    /// One-call bilingual generation. Either side may come back `None` when
    /// the model omitted or invalidated it.
    pub async fn generate_bilingual_summary_with_llm(
        &self,
        text: &str,
        provider_name: Option<&str>,
    ) -> Result<(Option<String>, Option<String>)> {
        let clean = self.clean_text(text);
        if clean.chars().count() < MIN_SOURCE_LENGTH {
            return Ok((None, None));
        }

        let provider = self.providers.create_provider(provider_name, None).await?;
        let response = provider
            .chat(
                &[ChatMessage::user(Self::build_prompt(&clean))],
                &ChatOptions {
                    max_tokens: Some(500),
                    temperature: Some(0.3),
                    ..Default::default()
                },
            )
            .await?;

        let content = response.message.content.trim().to_string();
        if content.is_empty() {
            return Ok((None, None));
        }

        let (chinese, english) = self.parse_bilingual_summary(&content);

        let chinese = chinese
            .filter(|s| !self.is_invalid_summary(s))
            .map(|s| self.truncate_summary(&s));
        let english = english
            .filter(|s| !self.is_invalid_summary(s))
            .map(|s| self.truncate_summary(&s));

        Ok((chinese, english))
    }

    /// Generate and persist summaries for one article. At least one of the
    /// two must survive validation or the call fails; a valid upstream
    /// summary is kept, an invalid one is cleared.
    pub async fn generate_article_summaries(
        &self,
        article_id: i64,
        provider_name: Option<&str>,
    ) -> Result<SummaryOutcome> {
        let article = self.articles.get(article_id).await?;
        let content_id = article
            .content_id
            .ok_or_else(|| AppError::conflict(format!("Article {} has no content", article_id)))?;
        let content = self.contents.get(content_id).await?;

        if content.text_content.trim().is_empty() {
            return Err(AppError::conflict(format!(
                "Article {} content is empty",
                article_id
            )));
        }

        let (chinese, english) = self
            .generate_bilingual_summary_with_llm(&content.text_content, provider_name)
            .await?;

        if chinese.is_none() && english.is_none() {
            return Err(AppError::internal(format!(
                "No valid summary produced for article {}",
                article_id
            )));
        }

        let clear_original = match &article.summary {
            Some(summary) => self.is_invalid_summary(summary),
            None => false,
        };

        self.articles
            .update_summaries(
                article_id,
                chinese.as_deref(),
                english.as_deref(),
                clear_original,
            )
            .await?;

        tracing::info!(
            article_id,
            has_chinese = chinese.is_some(),
            has_english = english.is_some(),
            original_cleared = clear_original,
            "Generated article summaries"
        );

        Ok(SummaryOutcome {
            article_id,
            chinese_summary: chinese,
            english_summary: english,
            original_summary_cleared: clear_original,
        })
    }

    /// Step recorder for external workers reporting coarse progress.
    pub async fn update_article_processing_step(
        &self,
        article_id: i64,
        step: ProcessingStep,
        status: StepStatus,
        data: Option<&Value>,
        error_message: Option<&str>,
    ) -> Result<()> {
        // Ensure the article exists before mutating anything.
        self.articles.get(article_id).await?;

        match (step, status) {
            (ProcessingStep::ContentSaved, StepStatus::Ok) => {
                let content_id = data
                    .and_then(|d| d.get("content_id"))
                    .and_then(Value::as_i64)
                    .ok_or_else(|| AppError::MissingField {
                        field: "content_id".to_string(),
                    })?;
                let generated_summary = data
                    .and_then(|d| d.get("generated_summary"))
                    .and_then(Value::as_str);
                self.articles
                    .record_content_saved(article_id, content_id, generated_summary)
                    .await?;
            }
            (ProcessingStep::SummaryGenerated, StepStatus::Ok) => {
                let chinese = data
                    .and_then(|d| d.get("chinese_summary"))
                    .and_then(Value::as_str);
                let english = data
                    .and_then(|d| d.get("english_summary"))
                    .and_then(Value::as_str);
                let clear_original = data
                    .and_then(|d| d.get("original_summary_updated"))
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                self.articles
                    .update_summaries(article_id, chinese, english, clear_original)
                    .await?;
            }
            (ProcessingStep::Vectorized, StepStatus::Ok) => {
                let vector_id = data
                    .and_then(|d| d.get("vector_id"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| AppError::MissingField {
                        field: "vector_id".to_string(),
                    })?;
                let model = data
                    .and_then(|d| d.get("embedding_model"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                let dimension = data
                    .and_then(|d| d.get("vector_dimension"))
                    .and_then(Value::as_i64)
                    .unwrap_or(0) as i32;
                self.articles
                    .mark_vectorized(article_id, vector_id, model, dimension)
                    .await?;
            }
            (ProcessingStep::Vectorized, StepStatus::Failed) => {
                self.articles
                    .mark_vectorization_failed(article_id, error_message.unwrap_or("unknown"))
                    .await?;
            }
            (_, StepStatus::Failed) => {
                self.articles
                    .record_step_failure(
                        article_id,
                        ArticleStatus::Failed,
                        error_message.unwrap_or("unknown"),
                    )
                    .await?;
            }
        }

        tracing::info!(article_id, ?step, ?status, "Recorded processing step");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LlmProviderStore;
    use sqlx::postgres::PgPoolOptions;

    fn service() -> SummaryService {
        // The pool is never connected; these tests only exercise pure logic.
        let pool = PgPoolOptions::new().connect_lazy("postgres://localhost/never").unwrap();
        SummaryService::new(
            ArticleStore::new(pool.clone()),
            ContentStore::new(pool.clone()),
            LlmProviderFactory::new(LlmProviderStore::new(pool), None, None),
        )
    }

    #[tokio::test]
    async fn detector_rejects_reader_links() {
        let s = service();
        assert!(s.is_invalid_summary("点击这里查看更多精彩内容"));
        assert!(s.is_invalid_summary("请阅读完整原文了解更多详情"));
        assert!(s.is_invalid_summary("Please click here for details"));
        assert!(s.is_invalid_summary("Read more at our website today"));
        assert!(s.is_invalid_summary("来源：新华社客户端"));
    }

    #[tokio::test]
    async fn detector_rejects_short_and_punctuation() {
        let s = service();
        assert!(s.is_invalid_summary(""));
        assert!(s.is_invalid_summary("   短   "));
        assert!(s.is_invalid_summary(">>> ..."));
    }

    #[tokio::test]
    async fn detector_accepts_real_summaries() {
        let s = service();
        assert!(!s.is_invalid_summary(
            "研究团队公布了新一代电池材料的实验结果，能量密度提升约三成。"
        ));
        assert!(!s.is_invalid_summary(
            "The team published benchmark results showing a 30% capacity gain."
        ));
    }

    #[tokio::test]
    async fn clean_text_strips_markup() {
        let s = service();
        let cleaned = s.clean_text("<p>Hello   <b>world</b>!</p>\n\n中文★内容");
        assert_eq!(cleaned, "Hello world! 中文内容");
    }

    #[tokio::test]
    async fn truncation_prefers_sentence_boundary() {
        let s = service();
        let mut text = "a".repeat(160);
        text.push('。');
        text.push_str(&"b".repeat(80));
        let truncated = s.truncate_summary(&text);
        assert_eq!(truncated.chars().count(), 161);
        assert!(truncated.ends_with('。'));
    }

    #[tokio::test]
    async fn truncation_hard_cuts_without_boundaries() {
        let s = service();
        let text = "x".repeat(400);
        let truncated = s.truncate_summary(&text);
        assert_eq!(truncated.chars().count(), MAX_SUMMARY_LENGTH);
        assert!(truncated.ends_with("..."));
    }

    #[tokio::test]
    async fn short_summaries_pass_through_untouched() {
        let s = service();
        assert_eq!(s.truncate_summary("short"), "short");
    }

    #[tokio::test]
    async fn parses_labeled_bilingual_output() {
        let s = service();
        let response = "中文摘要：这是一段关于新技术的报道摘要。\n\nEnglish Summary：A report about the new technology.";
        let (zh, en) = s.parse_bilingual_summary(response);
        assert_eq!(zh.as_deref(), Some("这是一段关于新技术的报道摘要。"));
        assert_eq!(en.as_deref(), Some("A report about the new technology."));
    }

    #[tokio::test]
    async fn parses_line_based_fallback() {
        let s = service();
        let response = "中文摘要\n报道内容第一行\n报道内容第二行\nEnglish Summary\nFirst line here";
        let (zh, en) = s.parse_bilingual_summary(response);
        assert_eq!(zh.as_deref(), Some("报道内容第一行 报道内容第二行"));
        assert_eq!(en.as_deref(), Some("First line here"));
    }

    #[tokio::test]
    async fn parse_handles_missing_english_block() {
        let s = service();
        let (zh, en) = s.parse_bilingual_summary("中文摘要：只有中文的摘要内容。");
        assert_eq!(zh.as_deref(), Some("只有中文的摘要内容。"));
        assert!(en.is_none());
    }

    #[tokio::test]
    async fn leading_noise_is_trimmed_per_language() {
        let s = service();
        let (zh, en) = s.parse_bilingual_summary(
            "中文摘要：** 中文内容在此。\n\nEnglish Summary：-- English content here.",
        );
        assert_eq!(zh.as_deref(), Some("中文内容在此。"));
        assert_eq!(en.as_deref(), Some("English content here."));
    }
}
