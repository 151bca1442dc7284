use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of feedback the reader asks the coach to focus on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedbackPreference {
    #[default]
    Comprehensive,
    Specificity,
    EmotionalExpression,
    Structure,
    RecommendationStrength,
}

impl FeedbackPreference {
    /// Selector order; the first entry is the default.
    pub const ALL: [FeedbackPreference; 5] = [
        FeedbackPreference::Comprehensive,
        FeedbackPreference::Specificity,
        FeedbackPreference::EmotionalExpression,
        FeedbackPreference::Structure,
        FeedbackPreference::RecommendationStrength,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackPreference::Comprehensive => "comprehensive",
            FeedbackPreference::Specificity => "specificity",
            FeedbackPreference::EmotionalExpression => "emotional-expression",
            FeedbackPreference::Structure => "structure",
            FeedbackPreference::RecommendationStrength => "recommendation-strength",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FeedbackPreference::Comprehensive => "Comprehensive feedback",
            FeedbackPreference::Specificity => "Be more specific",
            FeedbackPreference::EmotionalExpression => "Express feelings better",
            FeedbackPreference::Structure => "Improve structure",
            FeedbackPreference::RecommendationStrength => "Strengthen the recommendation",
        }
    }

    /// The instruction clause this preference contributes to the system message.
    pub fn instruction(self) -> &'static str {
        match self {
            FeedbackPreference::Comprehensive => {
                "Suggest ways to raise the overall quality of the review."
            }
            FeedbackPreference::Specificity => {
                "Suggest ways to make the wording more specific and detailed."
            }
            FeedbackPreference::EmotionalExpression => {
                "Suggest ways to convey the reader's feelings and impressions more vividly."
            }
            FeedbackPreference::Structure => {
                "Suggest ways to improve the organization and flow of the review."
            }
            FeedbackPreference::RecommendationStrength => {
                "Suggest ways to make the review appeal more strongly to other readers."
            }
        }
    }
}

impl fmt::Display for FeedbackPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown feedback preference '{0}' (expected one of: comprehensive, specificity, emotional-expression, structure, recommendation-strength)")]
pub struct UnknownPreference(pub String);

impl FromStr for FeedbackPreference {
    type Err = UnknownPreference;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        FeedbackPreference::ALL
            .into_iter()
            .find(|p| p.as_str() == wanted)
            .ok_or_else(|| UnknownPreference(s.to_string()))
    }
}

/// Optional information about the book being reviewed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
}

impl BookMetadata {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
        }
    }

    /// `Book: <title> by <author>`, or `None` when no title was given.
    fn attribution(&self) -> Option<String> {
        let title = self.title.trim();
        if title.is_empty() {
            return None;
        }
        let author = self.author.trim();
        if author.is_empty() {
            Some(format!("Book: {}", title))
        } else {
            Some(format!("Book: {} by {}", title, author))
        }
    }
}

const PERSONA: &str = "You are a friendly and knowledgeable book-review feedback coach.";

const ROLE_GUIDELINES: [&str; 3] = [
    "Always keep a positive, encouraging attitude toward the user's review.",
    "Start by recognizing and praising what the review does well.",
    "Offer constructive improvement ideas in a warm, approachable tone.",
];

const RESPONSE_FORMAT: &str = "Response format:\n\
1. 👍 **What you did well** - praise the specific strengths of the review\n\
2. 💡 **Suggestions** - point out directions for growth in a friendly tone\n\
3. ✨ **Extra ideas** - tips that would make the review richer";

const TONE: &str =
    "Always answer in the language the review is written in, with a friendly and encouraging voice.";

/// Builds the system message for the next request.
///
/// The result depends only on the arguments, so changing the preference or the
/// book details affects future replies without touching earlier turns.
pub fn compose(preference: FeedbackPreference, book: &BookMetadata) -> String {
    let mut text = String::with_capacity(768);
    text.push_str(PERSONA);
    text.push_str("\n\nRole:\n");
    for guideline in ROLE_GUIDELINES {
        text.push_str("- ");
        text.push_str(guideline);
        text.push('\n');
    }
    text.push_str("- ");
    text.push_str(preference.instruction());
    text.push('\n');

    if let Some(attribution) = book.attribution() {
        text.push('\n');
        text.push_str(&attribution);
        text.push('\n');
    }

    text.push('\n');
    text.push_str(RESPONSE_FORMAT);
    text.push_str("\n\n");
    text.push_str(TONE);
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_preference_contributes_only_its_own_clause() {
        for preference in FeedbackPreference::ALL {
            let text = compose(preference, &BookMetadata::default());
            assert!(!text.is_empty());
            assert!(text.contains(preference.instruction()));
            for other in FeedbackPreference::ALL.into_iter().filter(|o| *o != preference) {
                assert!(
                    !text.contains(other.instruction()),
                    "{} prompt leaked the {} clause",
                    preference,
                    other
                );
            }
        }
    }

    #[test]
    fn test_no_book_clause_without_title() {
        for preference in FeedbackPreference::ALL {
            let text = compose(preference, &BookMetadata::default());
            assert!(!text.contains("Book:"));
        }
        // An author alone is not enough to attribute a book.
        let text = compose(
            FeedbackPreference::Comprehensive,
            &BookMetadata::new("", "Herbert"),
        );
        assert!(!text.contains("Book:"));
        assert!(!text.contains("Herbert"));
    }

    #[test]
    fn test_book_clause_includes_title_and_author() {
        for preference in FeedbackPreference::ALL {
            let text = compose(preference, &BookMetadata::new("Title", "Author"));
            assert!(text.contains("Book: Title by Author"));
        }
    }

    #[test]
    fn test_title_without_author() {
        let text = compose(FeedbackPreference::Structure, &BookMetadata::new("Dune", ""));
        assert!(text.contains("Book: Dune\n"));
        assert!(!text.contains("Dune by"));
    }

    #[test]
    fn test_compose_is_deterministic() {
        let book = BookMetadata::new("Dune", "Herbert");
        assert_eq!(
            compose(FeedbackPreference::Specificity, &book),
            compose(FeedbackPreference::Specificity, &book)
        );
    }

    #[test]
    fn test_preference_parsing() {
        assert_eq!(
            "structure".parse::<FeedbackPreference>().unwrap(),
            FeedbackPreference::Structure
        );
        assert_eq!(
            "Emotional_Expression".parse::<FeedbackPreference>().unwrap(),
            FeedbackPreference::EmotionalExpression
        );
        assert!("poetry".parse::<FeedbackPreference>().is_err());
        assert_eq!(FeedbackPreference::default(), FeedbackPreference::ALL[0]);
    }

    #[test]
    fn test_preference_serde_uses_slugs() {
        let json = serde_json::to_string(&FeedbackPreference::RecommendationStrength).unwrap();
        assert_eq!(json, "\"recommendation-strength\"");
        let parsed: FeedbackPreference = serde_json::from_str("\"emotional-expression\"").unwrap();
        assert_eq!(parsed, FeedbackPreference::EmotionalExpression);
    }
}
