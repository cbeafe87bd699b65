//! Clarify-or-answer rules.
//!
//! Questions about products, programs and logistics are answered straight
//! away. Everything else is put to the language collaborator, which decides
//! whether farmer-specific details are missing.

use ragline_common::RulesConfig;

/// Instruction asking the language collaborator for a verdict.
pub const FOLLOW_UP_DECISION_PROMPT: &str = "You are an agriculture assistant.\n\n\
Ask a follow-up question ONLY IF:\n\
- The answer depends on farmer-specific inputs (crop type, symptoms, soil condition, growth stage, location).\n\n\
DO NOT ask follow-up questions for:\n\
- Product explanations\n\
- Programs, fees, timings\n\
- Definitions or general info\n\n\
Reply ONLY with:\n\
ANSWER_DIRECTLY or ASK_FOLLOW_UP";

/// Instruction asking the language collaborator for the clarifying question.
pub const FOLLOW_UP_QUESTION_PROMPT: &str =
    "Ask ONE clear follow-up question to get missing farmer-specific details.";

/// Language collaborator's answer to [`FOLLOW_UP_DECISION_PROMPT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    AnswerDirectly,
    AskFollowUp,
}

impl Verdict {
    /// Only an exact `ASK_FOLLOW_UP` (ignoring case and surrounding
    /// whitespace) asks; anything else answers.
    pub fn parse(reply: &str) -> Self {
        if reply.trim().to_uppercase() == "ASK_FOLLOW_UP" {
            Verdict::AskFollowUp
        } else {
            Verdict::AnswerDirectly
        }
    }
}

/// Keyword rules, lower-cased once at construction.
#[derive(Debug, Clone)]
pub struct QuestionRules {
    knowledge_keywords: Vec<String>,
    products: Vec<String>,
    program_keywords: Vec<String>,
    logistics_keywords: Vec<String>,
}

fn lowered(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn mentions_any(text: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| text.contains(k.as_str()))
}

impl QuestionRules {
    pub fn new(config: &RulesConfig) -> Self {
        Self {
            knowledge_keywords: lowered(&config.knowledge_keywords),
            products: lowered(&config.products),
            program_keywords: lowered(&config.program_keywords),
            logistics_keywords: lowered(&config.logistics_keywords),
        }
    }

    /// A "what is / explain / dosage" question about a known product.
    pub fn is_direct_knowledge_question(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        mentions_any(&text, &self.knowledge_keywords) && mentions_any(&text, &self.products)
    }

    pub fn is_program_or_fee_question(&self, text: &str) -> bool {
        mentions_any(&text.to_lowercase(), &self.program_keywords)
    }

    pub fn is_logistics_question(&self, text: &str) -> bool {
        mentions_any(&text.to_lowercase(), &self.logistics_keywords)
    }

    /// True when the question never needs clarification.
    pub fn requires_direct_answer(&self, text: &str) -> bool {
        self.is_direct_knowledge_question(text)
            || self.is_program_or_fee_question(text)
            || self.is_logistics_question(text)
    }
}

impl Default for QuestionRules {
    fn default() -> Self {
        Self::new(&RulesConfig::default())
    }
}
