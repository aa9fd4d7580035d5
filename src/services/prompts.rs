//! 生成指令
//!
//! 指令措辞对 Oracle 是不透明的；这里只保证各流程请求的结构一致。

use crate::models::cache::ExtractionMode;
use crate::models::flashcard::{ChatMessage, ChatRole, Flashcard};
use crate::models::topic::Topic;
use crate::services::parser::QuestionSet;

/// 提示中保留的最近对话条数
const HISTORY_WINDOW: usize = 20;

const TOPIC_SCHEMA: &str = r#"Respond with JSON only:
{"theme": "<overall theme>", "topics": [{"name": "<topic>", "context": "<supporting text from the input>", "subject": "<broad subject>", "section": "<optional>", "subsection": "<optional>"}]}"#;

const HIERARCHY_SCHEMA: &str = r#"Respond with JSON only:
{"sections": [{"name": "<section>", "flashcard_ids": ["<id>"], "subsections": [{"name": "<subsection>", "flashcard_ids": ["<id>"]}]}]}"#;

pub fn extraction_instruction(mode: ExtractionMode) -> String {
    let volume = match mode {
        ExtractionMode::Default => {
            "Extract every distinct concept, fact and term worth studying."
        }
        ExtractionMode::Concise => "Extract only the few most important concepts; merge related details.",
        ExtractionMode::Intelligent => {
            "Extract the concepts a learner needs in order to answer the listed questions."
        }
    };
    format!(
        "You turn study material into flashcard topics. {}\n{}",
        volume, TOPIC_SCHEMA
    )
}

pub fn extraction_prompt(text: &str) -> String {
    format!("Study material:\n\n{}", text)
}

pub fn image_instruction() -> String {
    format!(
        "You read images of study material (slides, notes, diagrams) and turn them into flashcard topics.\n{}",
        TOPIC_SCHEMA
    )
}

pub fn image_prompt() -> String {
    "Extract the study topics shown in this image.".to_string()
}

pub fn questions_instruction() -> String {
    r#"List the questions, explicit or implied, that this material answers or raises. Respond with JSON only: {"questions": ["<question>"]}"#.to_string()
}

pub fn topics_for_questions_prompt(text: &str, questions: &QuestionSet) -> String {
    let listed = questions
        .questions
        .iter()
        .enumerate()
        .map(|(i, q)| format!("{}. {}", i + 1, q))
        .collect::<Vec<_>>()
        .join("\n");
    format!("Questions:\n{}\n\nStudy material:\n\n{}", listed, text)
}

pub fn explanation_instruction() -> String {
    "You write clear, self-contained flashcard explanations in Markdown for a student.".to_string()
}

pub fn explanation_prompt(topic: &Topic, theme: Option<&str>) -> String {
    let mut prompt = format!(
        "Topic: {}\nSubject: {}\nContext: {}",
        topic.name, topic.subject, topic.context
    );
    if let Some(theme) = theme {
        prompt.push_str(&format!("\nOverall theme: {}", theme));
    }
    prompt
}

pub fn hierarchy_instruction() -> String {
    format!(
        "You organize flashcards of one subject into sections, optionally split into subsections. Use only the given ids.\n{}",
        HIERARCHY_SCHEMA
    )
}

pub fn hierarchy_prompt(subject: &str, cards: &[Flashcard], excerpt_chars: usize) -> String {
    let listed = cards
        .iter()
        .map(|c| {
            format!(
                "- id: {} | topic: {} | {}",
                c.id,
                c.topic,
                excerpt(&c.explanation, excerpt_chars)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("Subject: {}\nFlashcards:\n{}", subject, listed)
}

pub fn chat_instruction(card: &Flashcard) -> String {
    format!(
        "You are a tutor answering questions about the flashcard \"{}\" ({}).\nFlashcard content:\n{}",
        card.topic, card.subject, card.explanation
    )
}

pub fn chat_prompt(history: &[ChatMessage], message: &str) -> String {
    let mut prompt = render_history(history);
    if !prompt.is_empty() {
        prompt.push_str("\n\n");
    }
    prompt.push_str(&format!("Student: {}", message));
    prompt
}

pub fn chat_distill_instruction() -> String {
    "Rewrite the flashcard explanation so it incorporates what was clarified in the conversation. Return only the new explanation in Markdown.".to_string()
}

pub fn chat_distill_prompt(card: &Flashcard, history: &[ChatMessage]) -> String {
    format!(
        "Topic: {}\nCurrent explanation:\n{}\n\nConversation:\n{}",
        card.topic,
        card.explanation,
        render_history(history)
    )
}

pub fn subject_distill_instruction() -> String {
    "Write a structured study summary of the subject from the given flashcards.".to_string()
}

pub fn subject_distill_prompt(
    subject: &str,
    cards: &[Flashcard],
    user_prompt: &str,
    excerpt_chars: usize,
) -> String {
    let mut prompt = format!("Subject: {}\n", subject);
    if !user_prompt.trim().is_empty() {
        prompt.push_str(&format!("Learner request: {}\n", user_prompt));
    }
    prompt.push_str("Flashcards:\n");
    prompt.push_str(&render_cards(cards, excerpt_chars));
    prompt
}

pub fn podcast_instruction() -> String {
    "Write a spoken, engaging podcast script that walks a listener through the subject. No stage directions.".to_string()
}

pub fn podcast_prompt(subject: &str, cards: &[Flashcard], excerpt_chars: usize) -> String {
    format!(
        "Subject: {}\nMaterial:\n{}",
        subject,
        render_cards(cards, excerpt_chars)
    )
}

fn render_cards(cards: &[Flashcard], excerpt_chars: usize) -> String {
    cards
        .iter()
        .map(|c| {
            let location = match (&c.section, &c.subsection) {
                (Some(s), Some(ss)) => format!(" [{} / {}]", s, ss),
                (Some(s), None) => format!(" [{}]", s),
                _ => String::new(),
            };
            format!("## {}{}\n{}", c.topic, location, excerpt(&c.explanation, excerpt_chars))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 最近 `HISTORY_WINDOW` 条消息
pub fn recent_history(history: &[ChatMessage]) -> &[ChatMessage] {
    &history[history.len().saturating_sub(HISTORY_WINDOW)..]
}

fn render_history(history: &[ChatMessage]) -> String {
    history
        .iter()
        .map(|m| match m.role {
            ChatRole::User => format!("Student: {}", m.content),
            ChatRole::Assistant => format!("Tutor: {}", m.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 按字符截断
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
