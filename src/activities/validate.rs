//! Structural validation of generated question sets.
//!
//! Validation never fails at the activity level: problems are reported as
//! data in a `ValidationResult`, in question order.

use async_trait::async_trait;
use serde_json::Value;

use crate::core::{Activity, ActivityError};
use crate::domain::{GeneratedContent, ValidationInput, ValidationResult};

fn non_empty_str(question: &Value, field: &str) -> bool {
    question
        .get(field)
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty())
}

/// Options array with at least two entries
fn options(question: &Value) -> Option<&Vec<Value>> {
    question.get("options").and_then(Value::as_array)
}

fn check_answer_fields(question: &Value, n: usize, errors: &mut Vec<String>) {
    if options(question).map_or(true, |o| o.len() < 2) {
        errors.push(format!("question {}: must have at least 2 options", n));
    }
    if !non_empty_str(question, "correct_answer") {
        errors.push(format!("question {}: missing correct_answer", n));
    }
    if !non_empty_str(question, "explanation") {
        errors.push(format!("question {}: missing explanation", n));
    }
    if let Some(options) = options(question) {
        let answer = question.get("correct_answer").unwrap_or(&Value::Null);
        if !options.contains(answer) {
            errors.push(format!("question {}: correct_answer not in options", n));
        }
    }
}

fn check_count(questions: &[Value], expected: Option<u32>, errors: &mut Vec<String>) {
    if let Some(expected) = expected {
        if questions.len() != expected as usize {
            errors.push(format!(
                "expected {} questions, got {}",
                expected,
                questions.len()
            ));
        }
    }
}

/// Validate fill-in-the-blank grammar questions
pub fn validate_grammar_content(
    content: &GeneratedContent,
    expected_count: Option<u32>,
) -> ValidationResult {
    let Some(questions) = content.questions() else {
        return ValidationResult::from_errors(vec![
            "content must have a questions array".to_string()
        ]);
    };

    let mut errors = Vec::new();
    for (index, question) in questions.iter().enumerate() {
        let n = index + 1;
        if !non_empty_str(question, "sentence") {
            errors.push(format!("question {}: missing or invalid sentence", n));
        }
        if !question.get("blank_position").is_some_and(Value::is_number) {
            errors.push(format!("question {}: missing blank_position", n));
        }
        check_answer_fields(question, n, &mut errors);
    }
    check_count(questions, expected_count, &mut errors);

    ValidationResult::from_errors(errors)
}

/// Validate multiple-choice vocabulary questions
pub fn validate_vocabulary_content(
    content: &GeneratedContent,
    expected_count: Option<u32>,
) -> ValidationResult {
    let Some(questions) = content.questions() else {
        return ValidationResult::from_errors(vec![
            "content must have a questions array".to_string()
        ]);
    };

    let mut errors = Vec::new();
    for (index, question) in questions.iter().enumerate() {
        let n = index + 1;
        if !non_empty_str(question, "question") {
            errors.push(format!("question {}: missing or invalid question text", n));
        }
        check_answer_fields(question, n, &mut errors);
    }
    check_count(questions, expected_count, &mut errors);

    ValidationResult::from_errors(errors)
}

/// `validateGrammarContent`
pub struct ValidateGrammarContent;

#[async_trait]
impl Activity for ValidateGrammarContent {
    const NAME: &'static str = "validateGrammarContent";
    type Input = ValidationInput;
    type Output = ValidationResult;

    async fn execute(&self, input: ValidationInput) -> Result<ValidationResult, ActivityError> {
        Ok(validate_grammar_content(&input.content, input.expected_count))
    }
}

/// `validateVocabularyContent`
pub struct ValidateVocabularyContent;

#[async_trait]
impl Activity for ValidateVocabularyContent {
    const NAME: &'static str = "validateVocabularyContent";
    type Input = ValidationInput;
    type Output = ValidationResult;

    async fn execute(&self, input: ValidationInput) -> Result<ValidationResult, ActivityError> {
        Ok(validate_vocabulary_content(&input.content, input.expected_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn grammar_question(answer: &str) -> Value {
        json!({
            "sentence": "Yo ___ estudiante.",
            "blank_position": 1,
            "options": ["soy", "estoy", "es", "está"],
            "correct_answer": answer,
            "explanation": "Ser is used for identity."
        })
    }

    #[test]
    fn test_valid_grammar_content() {
        let content = GeneratedContent(json!({
            "questions": [grammar_question("soy"), grammar_question("estoy")]
        }));

        let result = validate_grammar_content(&content, Some(2));
        assert!(result.valid);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_answer_not_in_options() {
        let content = GeneratedContent(json!({ "questions": [grammar_question("somos")] }));

        let result = validate_grammar_content(&content, None);
        assert!(!result.valid);
        assert_eq!(
            result.errors,
            vec!["question 1: correct_answer not in options".to_string()]
        );
    }

    #[test]
    fn test_missing_questions_array_stops_early() {
        let content = GeneratedContent(json!({ "questions": "none" }));
        let result = validate_grammar_content(&content, Some(5));
        assert_eq!(
            result.errors,
            vec!["content must have a questions array".to_string()]
        );
    }

    #[test]
    fn test_errors_in_question_order() {
        let content = GeneratedContent(json!({
            "questions": [
                { "options": ["a"], "correct_answer": "a" },
                grammar_question("soy")
            ]
        }));

        let result = validate_grammar_content(&content, Some(3));
        assert_eq!(
            result.errors,
            vec![
                "question 1: missing or invalid sentence".to_string(),
                "question 1: missing blank_position".to_string(),
                "question 1: must have at least 2 options".to_string(),
                "question 1: missing explanation".to_string(),
                "expected 3 questions, got 2".to_string(),
            ]
        );
    }

    #[test]
    fn test_validation_is_pure() {
        let content = GeneratedContent(json!({
            "questions": [{ "sentence": "", "options": "x" }]
        }));
        assert_eq!(
            validate_grammar_content(&content, Some(1)),
            validate_grammar_content(&content, Some(1))
        );
    }

    #[test]
    fn test_vocabulary_content() {
        let content = GeneratedContent(json!({
            "questions": [
                {
                    "question": "¿Qué significa 'chamba'?",
                    "options": ["work", "party", "food", "car"],
                    "correct_answer": "work",
                    "explanation": "Chamba is Mexican slang for work."
                },
                {
                    "options": ["a", "b"],
                    "correct_answer": "c",
                    "explanation": "x"
                }
            ]
        }));

        let result = validate_vocabulary_content(&content, None);
        assert_eq!(
            result.errors,
            vec![
                "question 2: missing or invalid question text".to_string(),
                "question 2: correct_answer not in options".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_activity_never_fails() {
        let output = ValidateGrammarContent
            .execute(ValidationInput {
                content: GeneratedContent(json!({})),
                expected_count: None,
            })
            .await
            .unwrap();
        assert!(!output.valid);
    }
}
