// src/models/quiz.rs

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

use crate::config::{MAX_CHOICES, MIN_CHOICES};

/// Slot a quiz occupies in a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    /// Taken before the course material.
    Survey,
    /// Taken after the course material; drives the certificate score.
    Evaluate,
}

impl Position {
    pub fn as_str(&self) -> &'static str {
        match self {
            Position::Survey => "survey",
            Position::Evaluate => "evaluate",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "survey" => Ok(Position::Survey),
            "evaluate" => Ok(Position::Evaluate),
            other => Err(format!("Unknown quiz position '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Quiz {
    pub id: i64,
    pub label: String,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Question {
    pub id: i64,
    pub label: String,
    pub description: Option<String>,
}

/// Represents the 'choices' table. Only instructors ever see `is_true`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Choice {
    pub id: i64,
    pub question_id: i64,
    /// One of A, B, C or D.
    pub identifier: String,
    pub label: String,
    pub description: Option<String>,
    pub is_true: bool,
}

/// Choice as shown to a learner answering a quiz.
#[derive(Debug, Clone, Serialize)]
pub struct PublicChoice {
    pub id: i64,
    pub identifier: String,
    pub label: String,
    pub description: Option<String>,
}

impl From<Choice> for PublicChoice {
    fn from(c: Choice) -> Self {
        PublicChoice {
            id: c.id,
            identifier: c.identifier,
            label: c.label,
            description: c.description,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct QuestionWithChoices {
    #[serde(flatten)]
    pub question: Question,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuizQuestion {
    pub id: i64,
    pub quiz_id: i64,
    pub question_id: i64,
    pub sort: i64,
}

/// Represents the 'course_quizzes' table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CourseQuiz {
    pub id: i64,
    pub course_id: i64,
    pub quiz_id: i64,
    /// 'survey' or 'evaluate'.
    pub position: String,
    /// In minutes, 0 for unlimited.
    pub duration: i64,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CourseQuizView {
    pub id: i64,
    pub course_id: i64,
    pub quiz_id: i64,
    pub quiz_label: String,
    pub position: String,
    pub duration: i64,
    pub question_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct CourseQuizParams {
    pub position: Option<Position>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 255))]
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChoiceInput {
    #[validate(length(equal = 1))]
    pub identifier: String,
    #[validate(length(min = 1, max = 255))]
    pub label: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(default)]
    pub is_true: bool,
}

/// DTO for creating a question together with its choices.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 255))]
    pub label: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(nested, custom(function = validate_choices))]
    pub choices: Vec<ChoiceInput>,
    /// Appends the new question to this quiz.
    pub quiz_id: Option<i64>,
    pub sort: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateChoiceRequest {
    #[validate(length(min = 1, max = 255))]
    pub label: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub is_true: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AddQuizQuestionRequest {
    pub question_id: i64,
    #[serde(default)]
    pub sort: i64,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCourseQuizRequest {
    pub quiz_id: i64,
    pub position: Position,
    #[validate(range(min = 0, max = 1440))]
    pub duration: Option<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCourseQuizRequest {
    pub position: Option<Position>,
    #[validate(range(min = 0, max = 1440))]
    pub duration: Option<i64>,
}

/// Choice set rules: 2 to 4 choices, identifiers A-D without repeats, exactly one true.
pub fn validate_choices(choices: &[ChoiceInput]) -> Result<(), ValidationError> {
    if choices.len() < MIN_CHOICES || choices.len() > MAX_CHOICES {
        return Err(ValidationError::new("choice_count_out_of_range"));
    }

    let mut seen = HashSet::new();
    for choice in choices {
        if !matches!(choice.identifier.as_str(), "A" | "B" | "C" | "D") {
            return Err(ValidationError::new("invalid_choice_identifier"));
        }
        if !seen.insert(choice.identifier.as_str()) {
            return Err(ValidationError::new("duplicate_choice_identifier"));
        }
    }

    match choices.iter().filter(|c| c.is_true).count() {
        0 => Err(ValidationError::new("must_select_one_true_choice")),
        1 => Ok(()),
        _ => Err(ValidationError::new("multiple_true_choices")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choice(identifier: &str, is_true: bool) -> ChoiceInput {
        ChoiceInput {
            identifier: identifier.to_string(),
            label: format!("Option {}", identifier),
            description: None,
            is_true,
        }
    }

    #[test]
    fn test_position_round_trip_names() {
        assert_eq!("survey".parse::<Position>().unwrap(), Position::Survey);
        assert_eq!(Position::Evaluate.to_string(), "evaluate");
        assert!("before".parse::<Position>().is_err());
    }

    #[test]
    fn test_valid_choice_set() {
        let choices = vec![choice("A", false), choice("B", true), choice("C", false)];
        assert!(validate_choices(&choices).is_ok());
    }

    #[test]
    fn test_choice_count_bounds() {
        assert!(validate_choices(&[choice("A", true)]).is_err());

        let five = vec![
            choice("A", true),
            choice("B", false),
            choice("C", false),
            choice("D", false),
            choice("A", false),
        ];
        assert!(validate_choices(&five).is_err());
    }

    #[test]
    fn test_exactly_one_true() {
        let none = vec![choice("A", false), choice("B", false)];
        assert_eq!(
            validate_choices(&none).unwrap_err().code,
            "must_select_one_true_choice"
        );

        let two = vec![choice("A", true), choice("B", true)];
        assert_eq!(validate_choices(&two).unwrap_err().code, "multiple_true_choices");
    }

    #[test]
    fn test_identifiers_unique_and_in_range() {
        let dup = vec![choice("A", true), choice("A", false)];
        assert!(validate_choices(&dup).is_err());

        let bad = vec![choice("A", true), choice("E", false)];
        assert!(validate_choices(&bad).is_err());
    }
}
