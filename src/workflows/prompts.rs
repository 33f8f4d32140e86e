//! Prompt composition for the generation activity.

use crate::domain::{GameType, GenerationPrompt, GrammarRequest, VocabularyRequest};

pub fn grammar_prompt(request: &GrammarRequest) -> GenerationPrompt {
    let GrammarRequest {
        topic,
        difficulty,
        question_count,
        ..
    } = request;

    let system_prompt = format!(
        "You are a Spanish grammar expert creating {difficulty}-level exercises about {topic}. \
         Return JSON with a \"questions\" array."
    );

    let prompt = format!(
        r#"Generate {question_count} fill-in-the-blank grammar questions about "{topic}" at {difficulty} level.

Each question should have:
- sentence: A Spanish sentence with a blank (use ___ to indicate the blank)
- blank_position: The index of the blank word in the sentence (0-based)
- options: 4 possible words/phrases to fill the blank
- correct_answer: The correct option (must be one of the options)
- explanation: Grammar rule explanation

Focus on common grammar challenges for English speakers learning Mexico City Spanish."#
    );

    GenerationPrompt {
        game_type: GameType::Grammar,
        system_prompt,
        prompt,
        schema: None,
    }
}

pub fn vocabulary_prompt(request: &VocabularyRequest) -> GenerationPrompt {
    let VocabularyRequest {
        theme,
        difficulty,
        question_count,
        ..
    } = request;

    let system_prompt = format!(
        "You are a Spanish vocabulary expert creating {difficulty}-level questions about {theme} \
         for Mexico City Spanish learners. Return JSON with a \"questions\" array."
    );

    let prompt = format!(
        r#"Generate {question_count} multiple-choice vocabulary questions about "{theme}" at {difficulty} level.

Each question should have:
- question: The Spanish word or phrase to translate
- options: 4 possible English translations
- correct_answer: The correct English translation (must be one of the options)
- explanation: Why this is the correct answer and context for usage
- hint (optional): A helpful tip

Focus on Mexico City Spanish expressions and vocabulary."#
    );

    GenerationPrompt {
        game_type: GameType::Vocabulary,
        system_prompt,
        prompt,
        schema: None,
    }
}
