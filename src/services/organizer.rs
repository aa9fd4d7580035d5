//! 层级整理
//!
//! 按学科分组；达到阈值的学科各调用一次 Oracle 得到两级划分，
//! 再把章节/小节写回闪卡。单个学科失败只跳过该学科。

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::config::OrganizerConfig;
use crate::error::{AppError, Result};
use crate::models::flashcard::Flashcard;
use crate::observability::AppMetrics;
use crate::oracle::{Oracle, OracleRequest};
use crate::services::parser::{HierarchyPlan, decode_hierarchy};
use crate::services::prompts;
use crate::storage::FlashcardStore;
use crate::storage::flashcard_store::HierarchyAssignment;

/// 整理结果
#[derive(Debug, Clone, Serialize)]
pub struct OrganizeOutcome {
    pub updated_count: usize,
    pub flashcards: Vec<Flashcard>,
    pub organized_subjects: Vec<String>,
    pub skipped_subjects: Vec<String>,
}

pub struct HierarchyOrganizer {
    oracle: Arc<dyn Oracle>,
    store: Arc<FlashcardStore>,
    metrics: Arc<AppMetrics>,
    config: OrganizerConfig,
    max_output_tokens: u32,
}

impl HierarchyOrganizer {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        store: Arc<FlashcardStore>,
        metrics: Arc<AppMetrics>,
        config: OrganizerConfig,
        max_output_tokens: u32,
    ) -> Self {
        Self {
            oracle,
            store,
            metrics,
            config,
            max_output_tokens,
        }
    }

    pub async fn organize(&self, ids: &[String]) -> Result<OrganizeOutcome> {
        let mut seen = HashSet::new();
        let ids: Vec<&String> = ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .collect();
        if ids.len() < 2 {
            return Err(AppError::Validation(
                "At least two flashcards are required to organize".to_string(),
            ));
        }

        let mut by_subject: BTreeMap<String, Vec<Flashcard>> = BTreeMap::new();
        for id in &ids {
            let card = self
                .store
                .get(id)
                .ok_or_else(|| AppError::NotFound(format!("Flashcard not found: {}", id)))?;
            by_subject.entry(card.subject.clone()).or_default().push(card);
        }

        let mut updated = Vec::new();
        let mut organized_subjects = Vec::new();
        let mut skipped_subjects = Vec::new();

        for (subject, cards) in by_subject {
            if cards.len() < self.config.subject_threshold {
                debug!(
                    subject = %subject,
                    count = cards.len(),
                    "Subject below threshold, skipping"
                );
                skipped_subjects.push(subject);
                continue;
            }

            match self.organize_subject(&subject, &cards).await {
                Ok(ids) => {
                    info!(subject = %subject, updated = ids.len(), "Subject organized");
                    updated.extend(ids);
                    organized_subjects.push(subject);
                }
                Err(e) => {
                    warn!(subject = %subject, error = %e, "Organization failed, subject skipped");
                    skipped_subjects.push(subject);
                }
            }
        }

        // 返回全部输入闪卡的最新状态，保持请求顺序
        let flashcards = ids.iter().filter_map(|id| self.store.get(id)).collect();
        Ok(OrganizeOutcome {
            updated_count: updated.len(),
            flashcards,
            organized_subjects,
            skipped_subjects,
        })
    }

    async fn organize_subject(&self, subject: &str, cards: &[Flashcard]) -> Result<Vec<String>> {
        let request = OracleRequest::new(
            prompts::hierarchy_prompt(subject, cards, self.config.excerpt_chars),
            self.max_output_tokens,
        )
        .with_instruction(prompts::hierarchy_instruction());

        let result = self.oracle.invoke(request).await;
        self.metrics.record_oracle_call(result.is_ok());
        let plan = decode_hierarchy(&result?).into_result()?;

        let candidates: HashSet<&str> = cards.iter().map(|c| c.id.as_str()).collect();
        let assignments = plan_assignments(&plan, &candidates);
        self.store.assign_hierarchy(&assignments).await
    }
}

/// 把整理计划展开为逐张闪卡的赋值
///
/// 只保留候选集合内的 id；同一 id 出现多次时以最后一次为准。
/// 小节赋值总是带上其所属章节。
pub fn plan_assignments(
    plan: &HierarchyPlan,
    candidates: &HashSet<&str>,
) -> Vec<HierarchyAssignment> {
    let mut assignments: BTreeMap<&str, (String, Option<String>)> = BTreeMap::new();

    for section in &plan.sections {
        let section_name = section.name.trim();
        if section_name.is_empty() {
            continue;
        }
        for id in &section.flashcard_ids {
            if let Some(&id) = candidates.get(id.as_str()) {
                assignments.insert(id, (section_name.to_string(), None));
            }
        }
        for subsection in &section.subsections {
            let subsection_name = subsection.name.trim();
            let subsection_name =
                (!subsection_name.is_empty()).then(|| subsection_name.to_string());
            for id in &subsection.flashcard_ids {
                if let Some(&id) = candidates.get(id.as_str()) {
                    assignments.insert(id, (section_name.to_string(), subsection_name.clone()));
                }
            }
        }
    }

    assignments
        .into_iter()
        .map(|(id, (section, subsection))| (id.to_string(), section, subsection))
        .collect()
}
