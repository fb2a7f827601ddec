//! Question bank types and the Supabase-backed bank

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ws::protocol::{AnswerOption, Difficulty, QuestionView};

use super::supabase::SupabaseClient;
use super::{QuestionBank, StoreError};

/// A question with its answer key. Never sent to clients as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub prompt: String,
    pub options: [String; 4],
    pub correct: AnswerOption,
    pub difficulty: Difficulty,
    pub category: String,
}

impl Question {
    pub fn is_correct(&self, answer: Option<AnswerOption>) -> bool {
        answer == Some(self.correct)
    }

    /// Client-facing copy without the answer key
    pub fn view(&self) -> QuestionView {
        QuestionView {
            id: self.id,
            prompt: self.prompt.clone(),
            options: self.options.clone(),
            difficulty: self.difficulty,
            category: self.category.clone(),
        }
    }
}

/// Optional filters for a question fetch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionFilter {
    pub difficulty: Option<Difficulty>,
    pub category: Option<String>,
}

impl QuestionFilter {
    pub fn matches(&self, question: &Question) -> bool {
        self.difficulty.map_or(true, |d| d == question.difficulty)
            && self
                .category
                .as_deref()
                .map_or(true, |c| c == question.category)
    }
}

/// Average reward multiplier of a question set
pub fn difficulty_multiplier(questions: &[Question]) -> f64 {
    if questions.is_empty() {
        return 1.0;
    }
    let total: f64 = questions.iter().map(|q| q.difficulty.multiplier()).sum();
    total / questions.len() as f64
}

/// Row shape of the `questions` table
#[derive(Debug, Clone, Deserialize)]
struct QuestionRow {
    id: Uuid,
    prompt: String,
    option_a: String,
    option_b: String,
    option_c: String,
    option_d: String,
    correct_option: AnswerOption,
    difficulty: Difficulty,
    category: String,
}

impl From<QuestionRow> for Question {
    fn from(row: QuestionRow) -> Self {
        Self {
            id: row.id,
            prompt: row.prompt,
            options: [row.option_a, row.option_b, row.option_c, row.option_d],
            correct: row.correct_option,
            difficulty: row.difficulty,
            category: row.category,
        }
    }
}

/// Question bank backed by the `questions` table
#[derive(Clone)]
pub struct SupabaseQuestionBank {
    client: SupabaseClient,
}

impl SupabaseQuestionBank {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    fn query(filter: &QuestionFilter, count: usize) -> String {
        let mut query = format!("select=*&limit={}", count);
        if let Some(difficulty) = filter.difficulty {
            let name = match difficulty {
                Difficulty::Easy => "easy",
                Difficulty::Medium => "medium",
                Difficulty::Hard => "hard",
            };
            query.push_str(&format!("&difficulty=eq.{}", name));
        }
        if let Some(category) = &filter.category {
            query.push_str(&format!("&category=eq.{}", category));
        }
        query
    }
}

impl QuestionBank for SupabaseQuestionBank {
    fn fetch_questions<'a>(
        &'a self,
        filter: &'a QuestionFilter,
        count: usize,
    ) -> BoxFuture<'a, Result<Vec<Question>, StoreError>> {
        Box::pin(async move {
            let rows: Vec<QuestionRow> = self
                .client
                .get("questions", &Self::query(filter, count))
                .await?;
            Ok(rows.into_iter().map(Question::from).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(difficulty: Difficulty, category: &str) -> Question {
        Question {
            id: Uuid::new_v4(),
            prompt: "2 + 2?".to_string(),
            options: ["3".into(), "4".into(), "5".into(), "22".into()],
            correct: AnswerOption::B,
            difficulty,
            category: category.to_string(),
        }
    }

    #[test]
    fn test_is_correct_requires_an_answer() {
        let q = question(Difficulty::Easy, "math");
        assert!(q.is_correct(Some(AnswerOption::B)));
        assert!(!q.is_correct(Some(AnswerOption::A)));
        assert!(!q.is_correct(None));
    }

    #[test]
    fn test_filter_wildcards() {
        let q = question(Difficulty::Hard, "science");
        assert!(QuestionFilter::default().matches(&q));
        assert!(QuestionFilter {
            difficulty: Some(Difficulty::Hard),
            category: None
        }
        .matches(&q));
        assert!(!QuestionFilter {
            difficulty: None,
            category: Some("math".into())
        }
        .matches(&q));
    }

    #[test]
    fn test_difficulty_multiplier_averages() {
        let set = vec![
            question(Difficulty::Easy, "a"),
            question(Difficulty::Hard, "a"),
        ];
        assert!((difficulty_multiplier(&set) - 1.25).abs() < 1e-9);
        assert_eq!(difficulty_multiplier(&[]), 1.0);
    }

    #[test]
    fn test_supabase_query_includes_filters() {
        let query = SupabaseQuestionBank::query(
            &QuestionFilter {
                difficulty: Some(Difficulty::Medium),
                category: Some("history".into()),
            },
            5,
        );
        assert_eq!(query, "select=*&limit=5&difficulty=eq.medium&category=eq.history");
    }
}
