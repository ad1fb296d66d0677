//! Daily per-feed digest generation, sharded to workers by feed.

use chrono::{NaiveDate, TimeZone, Utc};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::llm::{ChatMessage, ChatOptions, LlmProviderFactory};
use crate::models::{Article, DailySummary, Feed, SummaryLanguage};
use crate::store::digest_store::NewDailySummary;
use crate::store::{ArticleStore, DigestStore, FeedStore};

const ARTICLE_EXCERPT_CHARS: usize = 500;

#[derive(Debug, Serialize)]
pub struct DigestRunReport {
    pub target_date: NaiveDate,
    pub language: SummaryLanguage,
    pub feeds_processed: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub details: Vec<DigestFeedResult>,
}

#[derive(Debug, Serialize)]
pub struct DigestFeedResult {
    pub feed_id: String,
    pub status: String,
    pub article_count: Option<i32>,
    pub error: Option<String>,
}

pub struct DailyDigestService {
    digests: DigestStore,
    articles: ArticleStore,
    feeds: FeedStore,
    providers: LlmProviderFactory,
}

impl DailyDigestService {
    pub fn new(
        digests: DigestStore,
        articles: ArticleStore,
        feeds: FeedStore,
        providers: LlmProviderFactory,
    ) -> Self {
        Self {
            digests,
            articles,
            feeds,
            providers,
        }
    }

    fn day_bounds(date: NaiveDate) -> (chrono::DateTime<Utc>, chrono::DateTime<Utc>) {
        let start = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight"));
        let end = Utc.from_utc_datetime(&date.and_hms_opt(23, 59, 59).expect("end of day"));
        (start, end)
    }

    /// Feeds with crawled articles on `date` that still lack a digest for
    /// `(date, language)`.
    pub async fn feeds_needing_summary(
        &self,
        date: NaiveDate,
        language: SummaryLanguage,
    ) -> Result<Vec<String>> {
        let (start, end) = Self::day_bounds(date);
        let with_articles = self.feeds.feeds_with_articles_on(start, end).await?;
        let done = self.digests.feeds_with_summary(date, language).await?;
        Ok(with_articles
            .into_iter()
            .filter(|feed_id| !done.contains(feed_id))
            .collect())
    }

    /// Generate the digest for one `(feed, date, language)` key. A re-run
    /// for an existing key returns the stored row untouched.
    pub async fn generate_feed_summary(
        &self,
        feed_id: &str,
        date: NaiveDate,
        language: SummaryLanguage,
    ) -> Result<DailySummary> {
        if let Some(existing) = self.digests.get(feed_id, date, language).await? {
            tracing::info!(feed_id, %date, ?language, "Digest already exists, skipping");
            return Ok(existing);
        }

        let feed = self.feeds.get(feed_id).await?;
        let (start, end) = Self::day_bounds(date);
        let articles = self.articles.for_feed_between(feed_id, start, end).await?;
        if articles.is_empty() {
            return Err(AppError::conflict(format!(
                "Feed {} has no articles on {}",
                feed_id, date
            )));
        }

        let article_ids: Vec<i64> = articles.iter().map(|a| a.id).collect();
        let prompt = Self::build_summary_prompt(&feed, &articles, language);

        let provider = self.providers.create_provider(None, None).await?;
        let response = provider
            .chat(
                &[
                    ChatMessage::system(Self::system_prompt(language)),
                    ChatMessage::user(prompt),
                ],
                &ChatOptions {
                    max_tokens: Some(1000),
                    temperature: Some(0.3),
                    ..Default::default()
                },
            )
            .await?;

        let (title, content) =
            Self::parse_summary_response(&response.message.content, &feed.title, language);

        let summary = self
            .digests
            .create(&NewDailySummary {
                feed_id: feed_id.to_string(),
                summary_date: date,
                language,
                summary_title: title,
                summary_content: content,
                article_count: articles.len() as i32,
                article_ids,
                llm_provider: Some(provider.provider_name().to_string()),
                llm_model: Some(response.model),
                generation_cost_tokens: response.usage.total_tokens as i64,
            })
            .await?;

        tracing::info!(
            feed_id,
            %date,
            ?language,
            article_count = summary.article_count,
            "Generated daily digest"
        );
        Ok(summary)
    }

    /// Coordinator-side batch run; per-feed failures are isolated so the
    /// remaining feeds still get their digest.
    pub async fn generate_daily_summaries(
        &self,
        date: NaiveDate,
        language: SummaryLanguage,
    ) -> Result<DigestRunReport> {
        let feed_ids = self.feeds_needing_summary(date, language).await?;
        let mut report = DigestRunReport {
            target_date: date,
            language,
            feeds_processed: 0,
            success_count: 0,
            failed_count: 0,
            details: Vec::new(),
        };

        for feed_id in feed_ids {
            report.feeds_processed += 1;
            match self.generate_feed_summary(&feed_id, date, language).await {
                Ok(summary) => {
                    report.success_count += 1;
                    report.details.push(DigestFeedResult {
                        feed_id,
                        status: "ok".to_string(),
                        article_count: Some(summary.article_count),
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::error!(feed_id = %feed_id, error = %e, "Digest generation failed");
                    report.failed_count += 1;
                    report.details.push(DigestFeedResult {
                        feed_id,
                        status: "failed".to_string(),
                        article_count: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        tracing::info!(
            %date,
            ?language,
            success = report.success_count,
            failed = report.failed_count,
            "Daily digest run complete"
        );
        Ok(report)
    }

    pub async fn summaries_for_date(
        &self,
        date: NaiveDate,
        language: SummaryLanguage,
    ) -> Result<Vec<DailySummary>> {
        self.digests.list_by_date(date, language).await
    }

    fn system_prompt(language: SummaryLanguage) -> &'static str {
        match language {
            SummaryLanguage::Zh => {
                "你是一个专业的新闻摘要生成器。请根据提供的RSS订阅源文章，生成一份简洁而全面的中文每日阅读摘要。\n\n\
                 要求：\n\
                 1. 摘要应该涵盖当天该订阅源的主要内容和亮点\n\
                 2. 使用简洁明了的中文表达\n\
                 3. 突出重要信息和趋势\n\
                 4. 控制在200-300字以内\n\
                 5. 返回JSON格式：{\"title\": \"摘要标题\", \"content\": \"摘要内容\"}\n\n\
                 注意：如果文章数量较少，可以更详细地描述；如果文章很多，则提炼共同主题和重点。"
            }
            SummaryLanguage::En => {
                "You are a professional news summarizer. Please generate a concise and comprehensive \
                 English daily reading summary based on the provided RSS feed articles.\n\n\
                 Requirements:\n\
                 1. The summary should cover the main content and highlights of the day for this feed\n\
                 2. Use clear and concise English expression\n\
                 3. Highlight important information and trends\n\
                 4. Keep it within 200-300 words\n\
                 5. Return in JSON format: {\"title\": \"Summary Title\", \"content\": \"Summary Content\"}\n\n\
                 Note: If there are few articles, you can describe them in more detail; if there are \
                 many articles, extract common themes and key points."
            }
        }
    }

    /// The prompt entry for an article uses whichever of the generated
    /// summary, the feed summary, or the title carries the most text.
    fn richest_text(article: &Article) -> &str {
        [
            article.generated_summary.as_deref(),
            article.summary.as_deref(),
            Some(article.title.as_str()),
        ]
        .into_iter()
        .flatten()
        .max_by_key(|s| s.chars().count())
        .unwrap_or(&article.title)
    }

    fn build_summary_prompt(feed: &Feed, articles: &[Article], language: SummaryLanguage) -> String {
        let mut articles_text = String::new();
        for (i, article) in articles.iter().enumerate() {
            let content = Self::richest_text(article);
            let excerpt: String = content.chars().take(ARTICLE_EXCERPT_CHARS).collect();
            let published = article
                .published_date
                .map(|d| d.to_rfc3339())
                .unwrap_or_default();
            match language {
                SummaryLanguage::Zh => {
                    articles_text.push_str(&format!(
                        "{}. 标题：{}\n   内容：{}\n   发布时间：{}\n\n",
                        i + 1,
                        article.title,
                        excerpt,
                        published
                    ));
                }
                SummaryLanguage::En => {
                    articles_text.push_str(&format!(
                        "{}. Title: {}\n   Content: {}\n   Published: {}\n\n",
                        i + 1,
                        article.title,
                        excerpt,
                        published
                    ));
                }
            }
        }

        let description = feed.description.as_deref().unwrap_or("");
        match language {
            SummaryLanguage::Zh => format!(
                "订阅源信息：\n- 名称：{}\n- 描述：{}\n\n今日文章列表（共{}篇）：\n{}\n请为以上内容生成一份中文每日阅读摘要。",
                feed.title,
                description,
                articles.len(),
                articles_text
            ),
            SummaryLanguage::En => format!(
                "Feed Information:\n- Name: {}\n- Description: {}\n\nToday's Articles (Total: {}):\n{}\nPlease generate an English daily reading summary for the above content.",
                feed.title,
                description,
                articles.len(),
                articles_text
            ),
        }
    }

    /// The model is asked for `{"title", "content"}`; anything unparseable
    /// degrades to the raw text with a default title.
    fn parse_summary_response(
        response: &str,
        feed_title: &str,
        language: SummaryLanguage,
    ) -> (String, String) {
        let text = response.trim();
        let stripped = text
            .strip_prefix("```json")
            .or_else(|| text.strip_prefix("```"))
            .map(|t| t.trim_end_matches("```").trim())
            .unwrap_or(text);

        let default_title = match language {
            SummaryLanguage::Zh => format!("{} 每日摘要", feed_title),
            SummaryLanguage::En => format!("{} Daily Summary", feed_title),
        };

        match serde_json::from_str::<serde_json::Value>(stripped) {
            Ok(value) => {
                let title = value
                    .get("title")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&default_title)
                    .to_string();
                let content = value
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or(text)
                    .to_string();
                (title, content)
            }
            Err(_) => (default_title, text.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArticleStatus, VectorizationStatus};

    fn article(title: &str, summary: Option<&str>, generated: Option<&str>) -> Article {
        Article {
            id: 1,
            feed_id: "f1".to_string(),
            link: "https://example.com/a".to_string(),
            title: title.to_string(),
            summary: summary.map(str::to_string),
            generated_summary: generated.map(str::to_string),
            chinese_summary: None,
            english_summary: None,
            thumbnail_url: None,
            published_date: None,
            status: ArticleStatus::Ok,
            is_locked: false,
            lock_timestamp: None,
            crawler_id: None,
            retry_count: 0,
            max_retries: 3,
            error_message: None,
            content_id: Some(1),
            is_vectorized: false,
            vector_id: None,
            vectorized_at: None,
            embedding_model: None,
            vector_dimension: None,
            vectorization_status: VectorizationStatus::Pending,
            vectorization_error: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn richest_text_picks_the_longest_source() {
        let a = article("Short title", Some("a somewhat longer feed summary"), None);
        assert_eq!(
            DailyDigestService::richest_text(&a),
            "a somewhat longer feed summary"
        );

        let a = article(
            "Short title",
            Some("feed summary"),
            Some("a worker-generated summary that is the longest of the three"),
        );
        assert_eq!(
            DailyDigestService::richest_text(&a),
            "a worker-generated summary that is the longest of the three"
        );

        let a = article("Only the title carries text here", None, None);
        assert_eq!(
            DailyDigestService::richest_text(&a),
            "Only the title carries text here"
        );
    }

    #[test]
    fn parses_json_summary_response() {
        let (title, content) = DailyDigestService::parse_summary_response(
            r#"{"title": "今日要闻", "content": "三件大事。"}"#,
            "科技日报",
            SummaryLanguage::Zh,
        );
        assert_eq!(title, "今日要闻");
        assert_eq!(content, "三件大事。");
    }

    #[test]
    fn parses_fenced_json_response() {
        let (title, content) = DailyDigestService::parse_summary_response(
            "```json\n{\"title\": \"Daily\", \"content\": \"Stuff happened.\"}\n```",
            "Tech Daily",
            SummaryLanguage::En,
        );
        assert_eq!(title, "Daily");
        assert_eq!(content, "Stuff happened.");
    }

    #[test]
    fn falls_back_to_raw_text_with_default_title() {
        let (title, content) = DailyDigestService::parse_summary_response(
            "Just a plain prose summary of the day.",
            "Tech Daily",
            SummaryLanguage::En,
        );
        assert_eq!(title, "Tech Daily Daily Summary");
        assert_eq!(content, "Just a plain prose summary of the day.");
    }

    #[test]
    fn zh_default_title_uses_chinese_suffix() {
        let (title, _) = DailyDigestService::parse_summary_response(
            "非JSON文本",
            "科技日报",
            SummaryLanguage::Zh,
        );
        assert_eq!(title, "科技日报 每日摘要");
    }
}
