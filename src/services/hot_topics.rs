//! Hot-topic aggregation: one model pass clusters a date's raw platform
//! topics into roughly ten unified groups.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};
use crate::llm::{ChatMessage, ChatOptions, LlmProviderFactory};
use crate::models::{NewUnifiedHotTopic, RawHotTopic, UnifiedHotTopic};
use crate::store::HotTopicStore;

const CATEGORY_MAPPING: &[(&str, &str)] = &[
    ("政治", "politics"),
    ("经济", "economy"),
    ("科技", "technology"),
    ("军事", "military"),
    ("社会", "society"),
    ("文化", "culture"),
    ("体育", "sports"),
    ("健康", "health"),
    ("教育", "education"),
    ("环境", "environment"),
    ("国际", "international"),
    ("灾难", "disaster"),
    ("法律", "law"),
    ("旅游", "travel"),
    ("生活", "lifestyle"),
    ("其他", "other"),
];

#[derive(Debug, Serialize)]
pub struct AggregationReport {
    pub topic_date: NaiveDate,
    pub raw_topics: usize,
    pub unified_topics_created: usize,
    pub model_used: String,
}

/// Group shape the model is asked to return; parsed output is untrusted and
/// every group is re-validated before insertion.
#[derive(Debug, Deserialize)]
struct AggregatedGroup {
    unified_title: String,
    #[serde(default)]
    unified_summary: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    related_topic_ids: Vec<i64>,
    #[serde(default)]
    source_platforms: Vec<String>,
}

pub struct HotTopicService {
    topics: HotTopicStore,
    providers: LlmProviderFactory,
}

impl HotTopicService {
    pub fn new(topics: HotTopicStore, providers: LlmProviderFactory) -> Self {
        Self { topics, providers }
    }

    /// Stable hash of a raw topic: sha256 over platform and the lowercased
    /// alphanumeric title. Changing this requires a backfill.
    pub fn stable_hash(platform: &str, title: &str) -> String {
        let normalized: String = title
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric() || c.is_whitespace())
            .collect();
        let unique = format!("{}:{}", platform, normalized.trim());
        let digest = Sha256::digest(unique.as_bytes());
        format!("{:x}", digest)
    }

    fn category_code(category: &str) -> &'static str {
        CATEGORY_MAPPING
            .iter()
            .find(|(zh, _)| *zh == category)
            .map(|(_, code)| *code)
            .unwrap_or("other")
    }

    /// Keep the prefix up to the last complete object and close the array.
    fn fix_truncated_json(text: &str) -> Result<String> {
        let last_brace = text.rfind('}').ok_or_else(|| {
            AppError::internal("truncated aggregation output has no complete object")
        })?;
        let mut fixed = text[..=last_brace].to_string();
        if !fixed.trim_end().ends_with(']') {
            fixed.push_str("\n]");
        }
        Ok(fixed)
    }

    fn unwrap_fenced_json(text: &str) -> &str {
        if let Some(start) = text.find("```json") {
            let rest = &text[start + 7..];
            return rest.split("```").next().unwrap_or(rest).trim();
        }
        if let Some(start) = text.find("```") {
            let rest = &text[start + 3..];
            return rest.split("```").next().unwrap_or(rest).trim();
        }
        text.trim()
    }

    fn parse_groups(text: &str) -> Result<Vec<AggregatedGroup>> {
        let payload = Self::unwrap_fenced_json(text);
        match serde_json::from_str::<Vec<AggregatedGroup>>(payload) {
            Ok(groups) => Ok(groups),
            Err(parse_err) => {
                let fixed = Self::fix_truncated_json(payload)?;
                serde_json::from_str::<Vec<AggregatedGroup>>(&fixed).map_err(|_| {
                    AppError::internal(format!(
                        "aggregation output is not repairable JSON: {}",
                        parse_err
                    ))
                })
            }
        }
    }

    fn build_prompt(topics: &[RawHotTopic], date: NaiveDate) -> String {
        let simplified: Vec<serde_json::Value> = topics
            .iter()
            .filter(|t| !t.topic_title.is_empty())
            .map(|t| {
                let description: String = t
                    .topic_description
                    .as_deref()
                    .unwrap_or("")
                    .chars()
                    .take(50)
                    .collect();
                json!({
                    "id": t.id,
                    "platform": t.platform,
                    "title": t.topic_title,
                    "description": description,
                })
            })
            .collect();

        let topics_json =
            serde_json::to_string_pretty(&simplified).unwrap_or_else(|_| "[]".to_string());
        let categories: Vec<&str> = CATEGORY_MAPPING.iter().map(|(zh, _)| *zh).collect();

        format!(
            "任务：请分析以下来自不同平台在 {} 的热点列表，将描述同一核心事件或话题的热点归为一组，生成约10个聚合组。\n\n\
             标题要求：\n\
             1. 标题不超过30个字，必须简洁精准\n\
             2. 必须包含具体的数据、地点、人物、机构等关键信息\n\
             3. 采用\"主体+动作+关键数据\"的紧凑格式\n\
             4. 避免使用\"相关\"、\"热点\"、\"事件\"等模糊词汇\n\n\
             分类要求：\n\
             请为每个聚合组选择最适合的分类，可选分类：{}\n\n\
             聚合要求：\n\
             1. 识别相似的热点并将它们分组，每组至少包含2个不同平台的热点\n\
             2. 生成约10个高质量的聚合组\n\
             3. 统一标题不超过30个字，必须包含核心信息\n\
             4. 统一摘要60字以内，补充标题中的关键细节\n\
             5. 关键词1-2个，使用核心短语\n\
             6. 包含所有被归入该组的原始热点ID列表\n\
             7. 包含所有涉及的平台名称列表\n\n\
             原始热点数据 (JSON格式):\n```json\n{}\n```\n\n\
             输出格式要求：\n\
             请严格按照以下JSON格式返回结果，返回一个包含约10个组对象的列表。\n\n\
             ```json\n\
             [\n\
             {{\n\
                 \"unified_title\": \"机构+行动+数据（30字内）\",\n\
                 \"unified_summary\": \"事件背景和影响（60字内）\",\n\
                 \"keywords\": [\"核心短语1\", \"核心短语2\"],\n\
                 \"category\": \"政治\",\n\
                 \"related_topic_ids\": [1, 2, 3],\n\
                 \"source_platforms\": [\"平台A\", \"平台B\"]\n\
             }}\n\
             ]\n\
             ```",
            date, categories.join("、"), topics_json
        )
    }

    /// Turn validated groups into insert rows, mapping model-returned ids
    /// back to stable hashes and picking a representative URL.
    fn groups_to_rows(
        groups: Vec<AggregatedGroup>,
        topics: &[RawHotTopic],
        date: NaiveDate,
        model_used: &str,
    ) -> Vec<NewUnifiedHotTopic> {
        let by_id: HashMap<i64, &RawHotTopic> = topics.iter().map(|t| (t.id, t)).collect();

        let mut rows = Vec::new();
        for group in groups {
            if group.unified_title.is_empty() || group.related_topic_ids.is_empty() {
                tracing::warn!(title = %group.unified_title, "Skipping incomplete aggregation group");
                continue;
            }

            let mut related_hashes = Vec::new();
            let mut representative_url = None;
            for topic_id in &group.related_topic_ids {
                let Some(topic) = by_id.get(topic_id) else {
                    continue;
                };
                let hash = if topic.stable_hash.is_empty() {
                    Self::stable_hash(&topic.platform, &topic.topic_title)
                } else {
                    topic.stable_hash.clone()
                };
                related_hashes.push(hash);
                if representative_url.is_none() {
                    representative_url = topic.topic_url.clone();
                }
            }

            if related_hashes.is_empty() {
                tracing::warn!(
                    title = %group.unified_title,
                    "Aggregation group references no known topic ids, skipping"
                );
                continue;
            }

            let mut platforms = group.source_platforms;
            platforms.sort();
            platforms.dedup();

            rows.push(NewUnifiedHotTopic {
                topic_date: date,
                unified_title: group.unified_title,
                unified_summary: group.unified_summary,
                keywords: group.keywords.into_iter().take(2).collect(),
                category: Self::category_code(group.category.as_deref().unwrap_or("其他"))
                    .to_string(),
                topic_count: related_hashes.len() as i32,
                related_topic_hashes: related_hashes,
                source_platforms: platforms,
                representative_url,
                ai_model_used: Some(model_used.to_string()),
            });
        }
        rows
    }

    /// Single-shot aggregation pass for a date, replacing that date's
    /// previous groups.
    pub async fn aggregate_topics_for_date(
        &self,
        date: NaiveDate,
        provider_name: Option<&str>,
        model: Option<&str>,
    ) -> Result<AggregationReport> {
        let raw_topics = self.topics.raw_topics_for_date(date).await?;
        if raw_topics.is_empty() {
            return Err(AppError::not_found(format!("Hot topics for {}", date)));
        }
        tracing::info!(%date, count = raw_topics.len(), "Aggregating raw hot topics");

        let provider = self.providers.create_provider(provider_name, model).await?;
        let prompt = Self::build_prompt(&raw_topics, date);

        let response = provider
            .chat(
                &[ChatMessage::user(prompt)],
                &ChatOptions {
                    max_tokens: Some(6000),
                    temperature: Some(0.2),
                    ..Default::default()
                },
            )
            .await?;

        let groups = Self::parse_groups(&response.message.content)?;
        let rows = Self::groups_to_rows(groups, &raw_topics, date, &response.model);

        let created = self.topics.replace_for_date(date, &rows).await?;

        tracing::info!(%date, created, "Hot topic aggregation complete");
        Ok(AggregationReport {
            topic_date: date,
            raw_topics: raw_topics.len(),
            unified_topics_created: created,
            model_used: response.model,
        })
    }

    pub async fn unified_topics_for_date(&self, date: NaiveDate) -> Result<Vec<UnifiedHotTopic>> {
        self.topics.unified_topics_for_date(date).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn raw(id: i64, platform: &str, title: &str, url: Option<&str>) -> RawHotTopic {
        RawHotTopic {
            id,
            platform: platform.to_string(),
            topic_title: title.to_string(),
            topic_description: None,
            topic_url: url.map(str::to_string),
            stable_hash: HotTopicService::stable_hash(platform, title),
            heat_value: None,
            topic_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            status: "active".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn stable_hash_ignores_case_and_punctuation() {
        let a = HotTopicService::stable_hash("weibo", "A股大跳水！沪指失守3300点");
        let b = HotTopicService::stable_hash("weibo", "a股大跳水沪指失守3300点");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn stable_hash_differs_per_platform() {
        let a = HotTopicService::stable_hash("weibo", "同一个话题");
        let b = HotTopicService::stable_hash("zhihu", "同一个话题");
        assert_ne!(a, b);
    }

    #[test]
    fn category_maps_to_english_code() {
        assert_eq!(HotTopicService::category_code("科技"), "technology");
        assert_eq!(HotTopicService::category_code("不存在"), "other");
    }

    #[test]
    fn parses_fenced_output() {
        let text = "前言\n```json\n[{\"unified_title\": \"标题\", \"related_topic_ids\": [1]}]\n```";
        let groups = HotTopicService::parse_groups(text).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].unified_title, "标题");
    }

    #[test]
    fn repairs_truncated_output() {
        let text = r#"[
            {"unified_title": "完整组", "related_topic_ids": [1], "source_platforms": ["weibo"]},
            {"unified_title": "被截断的组", "related_topic"#;
        let groups = HotTopicService::parse_groups(text).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].unified_title, "完整组");
    }

    #[test]
    fn unrepairable_output_is_an_error() {
        assert!(HotTopicService::parse_groups("not json at all").is_err());
    }

    #[test]
    fn groups_map_ids_to_hashes_and_pick_url() {
        let topics = vec![
            raw(1, "weibo", "话题一", Some("https://example.com/1")),
            raw(2, "zhihu", "话题一", None),
        ];
        let groups = vec![AggregatedGroup {
            unified_title: "统一标题".to_string(),
            unified_summary: Some("摘要".to_string()),
            keywords: vec!["k1".to_string(), "k2".to_string(), "k3".to_string()],
            category: Some("科技".to_string()),
            related_topic_ids: vec![1, 2, 99],
            source_platforms: vec!["weibo".to_string(), "zhihu".to_string(), "weibo".to_string()],
        }];

        let rows = HotTopicService::groups_to_rows(
            groups,
            &topics,
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            "model-x",
        );
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.topic_count, 2);
        assert_eq!(row.related_topic_hashes.len(), 2);
        assert_eq!(row.category, "technology");
        assert_eq!(row.keywords.len(), 2);
        assert_eq!(row.source_platforms, vec!["weibo", "zhihu"]);
        assert_eq!(row.representative_url.as_deref(), Some("https://example.com/1"));
    }

    #[test]
    fn groups_without_known_ids_are_dropped() {
        let topics = vec![raw(1, "weibo", "话题一", None)];
        let groups = vec![AggregatedGroup {
            unified_title: "无效组".to_string(),
            unified_summary: None,
            keywords: vec![],
            category: None,
            related_topic_ids: vec![42],
            source_platforms: vec![],
        }];
        let rows = HotTopicService::groups_to_rows(
            groups,
            &topics,
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            "m",
        );
        assert!(rows.is_empty());
    }
}
